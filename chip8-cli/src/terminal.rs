//! Terminal presentation and keyboard input.
use std::{
    io::{self, Stdout, Write},
    time::Duration,
};

use chip8::{constants::*, KeyCode};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode as TermKey, KeyEvent, KeyModifiers},
    queue, style, terminal,
};
use log::{trace, warn};

use crate::keymap::KeyMap;

const PIXEL_ON: &str = "██";
const PIXEL_OFF: &str = "  ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    Chip8(KeyCode),
    Quit,
}

/// Raw mode terminal session on stdout.
///
/// The terminal is restored when this is dropped, including
/// when the driving loop exits with an error.
pub struct Terminal {
    stdout: Stdout,
}

impl Terminal {
    pub fn new() -> io::Result<Self> {
        let mut stdout = io::stdout();

        terminal::enable_raw_mode()?;
        queue!(
            stdout,
            terminal::EnterAlternateScreen,
            cursor::Hide,
            terminal::Clear(terminal::ClearType::All)
        )?;
        stdout.flush()?;

        Ok(Self { stdout })
    }

    /// Blit the display buffer to the screen.
    pub fn draw(&mut self, display: &DisplayBuffer) -> io::Result<()> {
        for (y, row) in render_rows(display).iter().enumerate() {
            queue!(self.stdout, cursor::MoveTo(0, y as u16), style::Print(row))?;
        }
        self.stdout.flush()
    }

    /// Sound the terminal bell.
    pub fn beep(&mut self) -> io::Result<()> {
        queue!(self.stdout, style::Print('\x07'))?;
        self.stdout.flush()
    }

    /// Drain pending keyboard events without blocking.
    pub fn poll_input(&mut self, keymap: &KeyMap) -> io::Result<Vec<InputKind>> {
        let mut inputs = Vec::new();

        while event::poll(Duration::ZERO)? {
            if let Event::Key(key_event) = event::read()? {
                match map_event(keymap, key_event) {
                    Some(input) => inputs.push(input),
                    None => trace!("no input mapping for {:?}", key_event.code),
                }
            }
        }

        Ok(inputs)
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        let result = queue!(
            self.stdout,
            cursor::Show,
            terminal::LeaveAlternateScreen
        )
        .and_then(|_| self.stdout.flush())
        .and_then(|_| terminal::disable_raw_mode());

        if let Err(err) = result {
            warn!("failed to restore terminal: {err}");
        }
    }
}

/// Map a terminal key event to either a Chip-8 key or an application action.
fn map_event(keymap: &KeyMap, key_event: KeyEvent) -> Option<InputKind> {
    match key_event.code {
        TermKey::Esc => Some(InputKind::Quit),
        // Raw mode swallows the interrupt signal.
        TermKey::Char('c') if key_event.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(InputKind::Quit)
        }
        TermKey::Char(c) => keymap.map_key(c).map(InputKind::Chip8),
        _ => None,
    }
}

/// Render each display row as a line of double width cells.
pub fn render_rows(display: &DisplayBuffer) -> Vec<String> {
    display
        .chunks(DISPLAY_WIDTH)
        .map(|row| {
            row.iter()
                .map(|px| if *px { PIXEL_ON } else { PIXEL_OFF })
                .collect::<String>()
        })
        .collect()
}

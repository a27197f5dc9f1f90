//! Entrypoint for CLI
mod clock;
mod error;
mod keymap;
mod terminal;

use std::{env, error::Error, fs, time::Instant};

use chip8::{prelude::*, IMPL_VERSION};
use log::{debug, error, info, LevelFilter};

use self::{
    clock::{Clock, Hz},
    error::AppResult,
    keymap::{HeldKeys, KeyMap},
    terminal::{InputKind, Terminal},
};

/// One instruction per tick, so the timers count down at their nominal 60Hz.
const CYCLE_FREQUENCY: Hz = Hz(60);

/// Cycles executed by `dump` when no count is given.
const DEFAULT_DUMP_CYCLES: usize = 1000;

static USAGE: &str = r#"
usage: chip8 CMD FILE [CYCLES]

commands:
    run     Run the target ROM file in the terminal
    dump    Run the target ROM headless and print the display

keys:
    1 2 3 4 / q w e r / a s d f / z x c v, Esc to quit

environment:
    CHIP8_KEYMAP    YAML file replacing the built in key map
    RUST_LOG        Log level (error, warn, info, debug, trace)

examples:
    chip8 run breakout.rom
    chip8 dump maze.rom 2000
"#;

fn run_interactive(filepath: impl AsRef<str>) -> AppResult<()> {
    let bytecode = fs::read(filepath.as_ref())?;
    let keymap = KeyMap::load()?;
    debug!("key map: {keymap:?}");

    let mut vm = Chip8Vm::new(Chip8Conf::default());
    vm.load_program(&bytecode)?;
    info!("loaded {} ({} bytes)", filepath.as_ref(), bytecode.len());

    let mut held = HeldKeys::new(keymap.hold_cycles());
    let mut clock = Clock::new(CYCLE_FREQUENCY.into());
    let mut term = Terminal::new()?;

    loop {
        clock.wait();

        for input in term.poll_input(&keymap)? {
            match input {
                InputKind::Chip8(key) => held.press(key),
                InputKind::Quit => {
                    info!("exit");
                    return Ok(());
                }
            }
        }
        held.apply(&mut vm);

        let cycle = vm.step_cycle()?;

        if cycle.beep {
            term.beep()?;
        }

        if vm.draw_pending() {
            term.draw(vm.read_framebuffer())?;
            vm.clear_draw_pending();
        }

        held.tick();
    }
}

fn run_headless(filepath: impl AsRef<str>, cycles: usize) -> AppResult<()> {
    println!("Running {} for {cycles} cycles", filepath.as_ref());

    let bytecode = fs::read(filepath.as_ref())?;

    let mut vm = Chip8Vm::new(Chip8Conf::default());
    vm.load_program(&bytecode)?;

    let start = Instant::now();
    let result = vm.run_steps(cycles);
    let end = Instant::now();

    println!(
        "time taken: {}ms",
        end.duration_since(start).as_nanos() as f64 / 1000000.0
    ); // to millis
    println!("{}", vm.dump_display()?);

    let beeps = result?;
    if vm.is_waiting_for_key() {
        println!("stalled waiting for key at 0x{:04X}", vm.pc());
    }
    println!("beeps: {beeps}");

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    simple_logger::SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .env()
        .init()?;

    let result = match parse_args() {
        Some(Cmd::Run { filepath }) => run_interactive(filepath),
        Some(Cmd::Dump { filepath, cycles }) => run_headless(filepath, cycles),
        None => {
            print_usage();
            // FreeBSD EX_USAGE (64)
            std::process::exit(64)
        }
    };

    if let Err(err) = result {
        if err.is_fatal_vm_error() {
            error!("emulation halted: {err}");
        } else {
            error!("{err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn parse_args() -> Option<Cmd> {
    let mut args = env::args().skip(1);
    match args.next() {
        Some(cmd) => {
            // don't format me T.T
            match cmd.as_str() {
                "run" => Some(Cmd::Run {
                    filepath: args.next()?,
                }),
                "dump" => Some(Cmd::Dump {
                    filepath: args.next()?,
                    cycles: match args.next() {
                        Some(count) => count.parse().ok()?,
                        None => DEFAULT_DUMP_CYCLES,
                    },
                }),
                _ => None,
            }
        }
        None => None,
    }
}

fn print_usage() {
    println!("Chip8 v{IMPL_VERSION}");
    println!("{USAGE}");
}

enum Cmd {
    /// Run file in the terminal
    Run { filepath: String },
    /// Run file without a display and print the result
    Dump { filepath: String, cycles: usize },
}

//! Keyboard mapping configuration.
use std::{env, fs};

use chip8::{constants::KEY_COUNT, Chip8Vm, KeyCode};
use log::{debug, info};
use serde::Deserialize;

use crate::error::AppResult;

/// Environment variable pointing to a key map file that replaces the built in one.
pub const KEYMAP_ENV: &str = "CHIP8_KEYMAP";

const DEFAULT_KEYMAP: &str = include_str!("../keymap.yaml");

/// Maps host keyboard characters to Chip-8 keypad keys.
#[derive(Debug)]
pub struct KeyMap {
    keys: Box<[(char, KeyCode)]>,
    hold_cycles: u32,
}

#[derive(Debug, Deserialize)]
struct KeyMapDef {
    #[serde(default = "default_hold_cycles")]
    key_hold_cycles: u32,
    keys: Vec<InputDef>,
}

#[derive(Debug, Deserialize)]
struct InputDef {
    chip8: KeyCode,
    keyboard_keys: Vec<char>,
}

fn default_hold_cycles() -> u32 {
    6
}

impl KeyMap {
    /// Load the key map named by [`KEYMAP_ENV`], or the built in one.
    pub fn load() -> AppResult<Self> {
        match env::var(KEYMAP_ENV) {
            Ok(filepath) => {
                info!("loading key map from {filepath}");
                let source = fs::read_to_string(filepath)?;
                Ok(Self::from_yaml(&source)?)
            }
            Err(_) => Ok(Self::builtin()?),
        }
    }

    /// Standard `1234`/`qwer`/`asdf`/`zxcv` layout.
    pub fn builtin() -> Result<Self, serde_yaml::Error> {
        Self::from_yaml(DEFAULT_KEYMAP)
    }

    pub fn from_yaml(source: &str) -> Result<Self, serde_yaml::Error> {
        let def: KeyMapDef = serde_yaml::from_str(source)?;
        debug!("loaded input definitions: {:#?}", def);

        let keys = def
            .keys
            .iter()
            // flatten each definition into one pair per keyboard character
            .flat_map(|input| {
                input
                    .keyboard_keys
                    .iter()
                    .map(move |c| (c.to_ascii_lowercase(), input.chip8))
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(KeyMap {
            keys,
            hold_cycles: def.key_hold_cycles,
        })
    }

    /// Given a host keyboard character, map it to a Chip-8 key.
    pub fn map_key(&self, key: char) -> Option<KeyCode> {
        let key = key.to_ascii_lowercase();
        self.keys
            .iter()
            .find(|(c, _)| *c == key)
            .map(|(_, keycode)| *keycode)
    }

    pub fn hold_cycles(&self) -> u32 {
        self.hold_cycles
    }
}

/// Keypad state synthesized from press events.
///
/// A pressed key stays down for a fixed number of cycles, and
/// repeated presses from keyboard auto-repeat keep it down.
#[derive(Debug)]
pub struct HeldKeys {
    remaining: [u32; KEY_COUNT as usize],
    hold_cycles: u32,
}

impl HeldKeys {
    pub fn new(hold_cycles: u32) -> Self {
        Self {
            remaining: [0; KEY_COUNT as usize],
            hold_cycles,
        }
    }

    pub fn press(&mut self, key: KeyCode) {
        self.remaining[key.as_u8() as usize] = self.hold_cycles.max(1);
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.remaining[key.as_u8() as usize] > 0
    }

    /// Write the current key state into the machine.
    pub fn apply(&self, vm: &mut Chip8Vm) {
        for key in KeyCode::ALL {
            vm.set_key(key, self.is_pressed(key));
        }
    }

    /// Count down one cycle, releasing keys that ran out.
    pub fn tick(&mut self) {
        for remaining in self.remaining.iter_mut() {
            *remaining = remaining.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_keymap() {
        let keymap = KeyMap::builtin().unwrap();
        assert_eq!(keymap.hold_cycles(), 6);
        assert_eq!(keymap.map_key('1'), Some(KeyCode::Key1));
        assert_eq!(keymap.map_key('4'), Some(KeyCode::KeyC));
        assert_eq!(keymap.map_key('x'), Some(KeyCode::Key0));
        assert_eq!(keymap.map_key('V'), Some(KeyCode::KeyF));
        assert_eq!(keymap.map_key('p'), None);

        // Every keypad key is reachable.
        for key in KeyCode::ALL {
            assert!(keymap.keys.iter().any(|(_, k)| *k == key), "{key} unmapped");
        }
    }

    #[test]
    fn test_custom_keymap() {
        let keymap = KeyMap::from_yaml(
            r#"
keys:
  - chip8: 10
    keyboard_keys: ['j', 'K']
"#,
        )
        .unwrap();
        assert_eq!(keymap.hold_cycles(), 6);
        assert_eq!(keymap.map_key('j'), Some(KeyCode::KeyA));
        assert_eq!(keymap.map_key('k'), Some(KeyCode::KeyA));
        assert_eq!(keymap.map_key('1'), None);
    }

    #[test]
    fn test_invalid_keymap() {
        let result = KeyMap::from_yaml("keys:\n  - chip8: 16\n    keyboard_keys: ['a']\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_held_keys() {
        let mut held = HeldKeys::new(2);
        held.press(KeyCode::Key7);
        assert!(held.is_pressed(KeyCode::Key7));
        assert!(!held.is_pressed(KeyCode::Key8));

        held.tick();
        assert!(held.is_pressed(KeyCode::Key7));
        held.tick();
        assert!(!held.is_pressed(KeyCode::Key7));
    }

    #[test]
    fn test_apply_held_keys() {
        let mut vm = Chip8Vm::new(Default::default());
        // LD v0, K
        vm.load_program(&[0xF0, 0x0A]).unwrap();
        assert_eq!(vm.step_cycle().unwrap().flow, chip8::Flow::KeyWait);

        let mut held = HeldKeys::new(1);
        held.press(KeyCode::Key9);
        held.apply(&mut vm);
        vm.step_cycle().unwrap();
        assert_eq!(vm.registers()[0], 9);

        held.tick();
        held.apply(&mut vm);
        assert!(!vm.is_waiting_for_key());
    }
}

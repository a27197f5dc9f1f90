//! Chip-8 virtual machine.
//!
//! The [`Chip8Vm`](prelude::Chip8Vm) owns all machine state and exposes a
//! single cycle primitive. Pacing, display output, keyboard input and audio
//! are left to the caller.
pub mod constants;
mod cpu;
mod devices;
mod error;
mod opcode;
mod vm;

pub use self::{
    devices::{InvalidKeyCode, KeyCode},
    error::{Chip8Error, Chip8Result},
    opcode::Opcode,
    vm::{Chip8Conf, Chip8Vm, Cycle, Flow},
};

/// Version of the interpreter crate.
pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use super::{
        devices::KeyCode,
        error::{Chip8Error, Chip8Result},
        vm::{Chip8Conf, Chip8Vm, Cycle, Flow},
    };
}

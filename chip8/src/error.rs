//! Result and errors.
use std::fmt::{self, Display, Formatter};

use crate::constants::{Address, KEY_COUNT, MAX_PROGRAM_SIZE};

pub type Chip8Result<T> = std::result::Result<T, Chip8Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chip8Error {
    /// Attempt to load a program that can't fit in memory.
    ProgramTooLarge { size: usize },
    /// Key index outside of the 16 key keypad.
    InvalidKeyIndex(u8),
    /// Instruction fetch or memory access outside of addressable RAM.
    MemoryOutOfBounds { address: usize },
    /// Subroutine call with a full call stack.
    StackOverflow { pc: Address },
    /// Subroutine return with an empty call stack.
    StackUnderflow { pc: Address },
    /// Instruction word that does not decode to any operation.
    UnknownOpcode { opcode: u16, pc: Address },
}

impl Chip8Error {
    /// Errors raised while executing an instruction leave the machine
    /// in an undefined state, and it must be discarded.
    ///
    /// Validation errors have no side effects.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::ProgramTooLarge { .. } | Self::InvalidKeyIndex(_)
        )
    }
}

impl Display for Chip8Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProgramTooLarge { size } => write!(
                f,
                "program of {size} bytes is too large for VM memory (max {MAX_PROGRAM_SIZE})"
            ),
            Self::InvalidKeyIndex(index) => {
                write!(f, "key index {index} out of range 0 <= key < {KEY_COUNT}")
            }
            Self::MemoryOutOfBounds { address } => {
                write!(f, "memory access out of bounds at 0x{address:04X}")
            }
            Self::StackOverflow { pc } => write!(f, "call stack overflow at 0x{pc:04X}"),
            Self::StackUnderflow { pc } => write!(f, "call stack underflow at 0x{pc:04X}"),
            Self::UnknownOpcode { opcode, pc } => {
                write!(f, "unknown opcode {opcode:04X} at 0x{pc:04X}")
            }
        }
    }
}

impl std::error::Error for Chip8Error {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(!Chip8Error::ProgramTooLarge { size: 4000 }.is_fatal());
        assert!(!Chip8Error::InvalidKeyIndex(16).is_fatal());
        assert!(Chip8Error::MemoryOutOfBounds { address: 0x1000 }.is_fatal());
        assert!(Chip8Error::StackOverflow { pc: 0x200 }.is_fatal());
        assert!(Chip8Error::StackUnderflow { pc: 0x200 }.is_fatal());
        assert!(Chip8Error::UnknownOpcode {
            opcode: 0xFFFF,
            pc: 0x200
        }
        .is_fatal());
    }

    #[test]
    fn test_display() {
        let err = Chip8Error::UnknownOpcode {
            opcode: 0x5AB1,
            pc: 0x20A,
        };
        assert_eq!(err.to_string(), "unknown opcode 5AB1 at 0x020A");
    }
}

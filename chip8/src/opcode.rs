//! Helpers for extracting operands from instruction words.
use std::fmt;

use crate::{
    constants::*,
    error::{Chip8Error, Chip8Result},
};

/// A single 16-bit instruction, stored big-endian in memory.
///
/// ```text
/// | op   | x    | y    | n    |
/// | F000 | 0F00 | 00F0 | 000F |
///               | nn          |
///        | nnn                |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode(pub u16);

impl Opcode {
    /// Read the instruction located at the given address.
    #[inline]
    pub fn fetch(ram: &[u8], pc: usize) -> Chip8Result<Self> {
        match (ram.get(pc), ram.get(pc + 1)) {
            (Some(&a), Some(&b)) => Ok(Self(u16::from_be_bytes([a, b]))),
            _ => Err(Chip8Error::MemoryOutOfBounds {
                address: pc.max(ram.len()),
            }),
        }
    }

    /// Opcode identity in the first 4-bit nibble, shifted down.
    #[inline(always)]
    pub fn op(self) -> u8 {
        ((self.0 & 0xF000) >> 12) as u8
    }

    #[inline(always)]
    pub fn x(self) -> usize {
        ((self.0 & 0x0F00) >> 8) as usize
    }

    #[inline(always)]
    pub fn y(self) -> usize {
        ((self.0 & 0x00F0) >> 4) as usize
    }

    #[inline(always)]
    pub fn n(self) -> u8 {
        (self.0 & 0x000F) as u8
    }

    #[inline(always)]
    pub fn nn(self) -> u8 {
        (self.0 & 0x00FF) as u8
    }

    #[inline(always)]
    pub fn nnn(self) -> Address {
        self.0 & 0x0FFF
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

impl From<Opcode> for u16 {
    fn from(opcode: Opcode) -> Self {
        opcode.0
    }
}

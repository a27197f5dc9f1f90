//! CPU and memory state.
use crate::{
    constants::*,
    error::{Chip8Error, Chip8Result},
    opcode::Opcode,
};

/// Core state for a chip8 interpreter.
pub struct Chip8Cpu {
    // ------------------------------------------------------------------------
    // Registers
    /// Program counter pointing to the current position in the bytecode.
    pub(crate) pc: Address,
    /// Stack pointer, the number of return addresses on the stack.
    pub(crate) sp: usize,
    /// General purpose registers for temporary values.
    ///
    /// Register 16 (VF) is used for either the carry flag or borrow switch depending on opcode.
    pub(crate) registers: [u8; REGISTER_COUNT],
    /// Pointer register used for temporarily storing an address. Since addresses are 12 bits, only the
    /// lowest (rightmost) bits are used.
    pub(crate) address: Address,
    /// (DT) Delay timer that counts down to 0.
    pub(crate) delay_timer: u8,
    /// (ST) Sound timer that counts down to 0. A beep is emitted when it runs out.
    pub(crate) sound_timer: u8,
    /// Keyboard input state. Pressed is a 1 bit, released is a 0 bit.
    pub(crate) key_state: u16,
    /// Destination register of an `Fx0A` instruction that is waiting for a keypress.
    pub(crate) key_wait: Option<usize>,
    /// Set when the display buffer changed, until the presentation layer consumes it.
    pub(crate) draw_flag: bool,
    /// Instruction word fetched by the most recent cycle.
    pub(crate) opcode: Opcode,

    // ------------------------------------------------------------------------
    // Memory
    /// Main memory storage space.
    pub(crate) ram: Box<[u8; MEM_SIZE]>,
    /// Stack of return pointers used for jumping when a routine call finishes.
    pub(crate) stack: [Address; STACK_SIZE],
    /// Screen buffer that is drawn too.
    pub(crate) display: Box<DisplayBuffer>,
}

impl Default for Chip8Cpu {
    fn default() -> Self {
        let mut cpu = Self {
            pc: 0,
            sp: 0,
            registers: [0; REGISTER_COUNT],
            address: 0,
            delay_timer: 0,
            sound_timer: 0,
            key_state: 0,
            key_wait: None,
            draw_flag: false,
            opcode: Opcode(0),

            ram: Box::new([0; MEM_SIZE]),
            stack: [0; STACK_SIZE],
            display: Box::new([false; DISPLAY_BUFFER_SIZE]),
        };
        cpu.reset();
        cpu
    }
}

impl Chip8Cpu {
    pub fn new() -> Self {
        Default::default()
    }

    /// Zero all state, reload the font and point the program counter
    /// at the start of program memory.
    pub(crate) fn reset(&mut self) {
        self.clear_memory();
        self.ram[FONTSET_START as usize..FONTSET_START as usize + FONTSET_DATA_LENGTH]
            .copy_from_slice(&FONTSET);

        self.registers.fill(0);
        self.address = 0;
        self.pc = MEM_START as Address;
        self.sp = 0;
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.key_state = 0;
        self.key_wait = None;
        self.draw_flag = false;
        self.opcode = Opcode(0);
    }

    /// Erase the contents of the memory buffers `ram`, `stack` and `display`.
    pub(crate) fn clear_memory(&mut self) {
        self.ram.fill(0);
        self.stack.fill(0);
        self.display.fill(false);
    }

    pub fn clear_display(&mut self) {
        self.display.fill(false);
        self.draw_flag = true;
    }

    // ------------------------------------------------------------------------
    // Keyboard

    pub fn set_key_state(&mut self, key_id: u8, state: bool) -> Chip8Result<()> {
        if key_id >= KEY_COUNT {
            return Err(Chip8Error::InvalidKeyIndex(key_id));
        }

        if state {
            self.key_state |= 1 << key_id;
        } else {
            self.key_state &= !(1 << key_id);
        }

        Ok(())
    }

    /// Keys outside the keypad are never pressed.
    pub fn key_state(&self, key_id: u8) -> bool {
        if key_id < KEY_COUNT {
            self.key_state & (1 << key_id) > 0
        } else {
            false
        }
    }

    /// Check whether any key is pressed down.
    #[inline(always)]
    pub fn any_key(&self) -> bool {
        self.key_state > 0
    }

    /// Retrieve the value of the first key that is pressed down.
    #[inline]
    pub fn first_key(&self) -> Option<u8> {
        if self.any_key() {
            Some(self.key_state.trailing_zeros() as u8)
        } else {
            None
        }
    }

    /// Clear the keyboard input state, setting all keys to up.
    #[inline(always)]
    pub fn clear_keys(&mut self) {
        self.key_state = 0;
    }

    // ------------------------------------------------------------------------
    // Timers

    /// Count down both timers by one cycle.
    ///
    /// Returns `true` when the sound timer runs out during this tick.
    #[inline]
    pub fn tick_timers(&mut self) -> bool {
        self.delay_timer = self.delay_timer.saturating_sub(1);

        let beep = self.sound_timer == 1;
        self.sound_timer = self.sound_timer.saturating_sub(1);
        beep
    }

    // ------------------------------------------------------------------------
    // Stack

    /// Push a return address onto the call stack.
    pub(crate) fn push(&mut self, return_address: Address) -> Chip8Result<()> {
        if self.sp >= STACK_SIZE {
            return Err(Chip8Error::StackOverflow { pc: self.pc });
        }
        self.stack[self.sp] = return_address;
        self.sp += 1;
        Ok(())
    }

    /// Pop the most recent return address off the call stack.
    pub(crate) fn pop(&mut self) -> Chip8Result<Address> {
        if self.sp == 0 {
            return Err(Chip8Error::StackUnderflow { pc: self.pc });
        }
        self.sp -= 1;
        Ok(self.stack[self.sp])
    }

    // ------------------------------------------------------------------------
    // Memory

    /// Borrow `len` bytes of RAM starting at `addr`.
    pub(crate) fn read(&self, addr: usize, len: usize) -> Chip8Result<&[u8]> {
        self.ram
            .get(addr..addr + len)
            .ok_or(Chip8Error::MemoryOutOfBounds {
                address: addr.max(MEM_SIZE),
            })
    }

    /// Mutably borrow `len` bytes of RAM starting at `addr`.
    pub(crate) fn write(&mut self, addr: usize, len: usize) -> Chip8Result<&mut [u8]> {
        self.ram
            .get_mut(addr..addr + len)
            .ok_or(Chip8Error::MemoryOutOfBounds {
                address: addr.max(MEM_SIZE),
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_state() {
        let mut cpu = Chip8Cpu::default();

        cpu.set_key_state(0, true).unwrap();
        assert_eq!(cpu.key_state, 0b00000000_00000001);
        assert!(cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(!cpu.key_state(7));

        cpu.set_key_state(7, true).unwrap();
        assert_eq!(cpu.key_state, 0b00000000_10000001);
        assert!(cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(cpu.key_state(7));

        cpu.set_key_state(0, false).unwrap();
        assert_eq!(cpu.key_state, 0b00000000_10000000);
        assert!(!cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(cpu.key_state(7));

        cpu.set_key_state(15, true).unwrap();
        assert_eq!(cpu.key_state, 0b10000000_10000000);
        assert!(!cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(cpu.key_state(7));
        assert!(cpu.key_state(15));
        assert_eq!(cpu.first_key(), Some(7));

        assert_eq!(
            cpu.set_key_state(16, true),
            Err(Chip8Error::InvalidKeyIndex(16))
        );
        assert_eq!(cpu.key_state, 0b10000000_10000000);
        assert!(!cpu.key_state(16));
    }

    #[test]
    fn test_reset_loads_font() {
        let cpu = Chip8Cpu::default();
        assert_eq!(&cpu.ram[..FONTSET_DATA_LENGTH], &FONTSET[..]);
        assert!(cpu.ram[FONTSET_DATA_LENGTH..].iter().all(|b| *b == 0));
        assert_eq!(cpu.pc, 0x200);
    }

    #[test]
    fn test_timers() {
        let mut cpu = Chip8Cpu::default();
        cpu.delay_timer = 2;
        cpu.sound_timer = 2;

        assert!(!cpu.tick_timers());
        assert_eq!((cpu.delay_timer, cpu.sound_timer), (1, 1));
        assert!(cpu.tick_timers());
        assert_eq!((cpu.delay_timer, cpu.sound_timer), (0, 0));
        assert!(!cpu.tick_timers());
        assert_eq!((cpu.delay_timer, cpu.sound_timer), (0, 0));
    }

    #[test]
    fn test_stack() {
        let mut cpu = Chip8Cpu::default();
        for i in 0..STACK_SIZE {
            cpu.push(0x200 + i as Address * 2).unwrap();
        }
        assert_eq!(cpu.push(0x300), Err(Chip8Error::StackOverflow { pc: 0x200 }));

        for i in (0..STACK_SIZE).rev() {
            assert_eq!(cpu.pop(), Ok(0x200 + i as Address * 2));
        }
        assert_eq!(cpu.pop(), Err(Chip8Error::StackUnderflow { pc: 0x200 }));
    }

    #[test]
    fn test_memory_bounds() {
        let mut cpu = Chip8Cpu::default();
        assert_eq!(cpu.read(MEM_SIZE - 3, 3).unwrap().len(), 3);
        assert!(cpu.write(MEM_SIZE - 1, 1).is_ok());
        assert_eq!(
            cpu.read(MEM_SIZE - 2, 3),
            Err(Chip8Error::MemoryOutOfBounds { address: MEM_SIZE })
        );
        assert_eq!(
            cpu.write(0xFFF, 16).unwrap_err(),
            Chip8Error::MemoryOutOfBounds { address: 0x1000 }
        );
    }
}

//! Virtual machine.
use std::fmt::{self, Write};

use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    constants::*,
    cpu::Chip8Cpu,
    devices::KeyCode,
    error::{Chip8Error, Chip8Result},
    opcode::Opcode,
};

/// Chip-8 interpreter.
///
/// Owns the complete machine state. The caller drives execution by
/// repeatedly calling [`Chip8Vm::step_cycle`], and feeds input and
/// consumes display output between cycles.
pub struct Chip8Vm {
    cpu: Chip8Cpu,
    rng: StdRng,
    conf: Chip8Conf,
}

/// VM Configuration Parameters.
#[derive(Debug, Default, Clone)]
pub struct Chip8Conf {
    /// Seed for the generator behind `Cxnn` (`RND Vx, byte`).
    ///
    /// When `None` the generator is seeded from system entropy.
    pub rng_seed: Option<u64>,
}

/// What the executed instruction did, for the benefit of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Flow {
    Ok,
    /// Program counter has jumped to a new address.
    ///
    /// This is useful for the caller to avoid being
    /// blocked on infinite or long running loops.
    ///
    /// This is returned when the interpreter encounters:
    ///
    /// - 1nnn (`JP addr`)
    /// - 2nnn (`CALL addr`)
    /// - 00EE (`RET`)
    /// - Bnnn (`JP V0, addr`)
    Jump,
    /// Display buffer was changed.
    Draw,
    /// Sound timer was loaded.
    Sound,
    /// Wait for a keypress.
    ///
    /// This is triggered by the opcode `Fx0A` (`LD Vx, K`), which stops
    /// execution until a key is pressed, and loads the key value into `Vx`.
    /// Neither the program counter nor the timers advance while waiting.
    KeyWait,
}

/// Outcome of a single call to [`Chip8Vm::step_cycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cycle {
    pub flow: Flow,
    /// The sound timer ran out during this cycle.
    pub beep: bool,
}

impl Chip8Vm {
    pub fn new(conf: Chip8Conf) -> Self {
        let rng = match conf.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Chip8Vm {
            cpu: Chip8Cpu::new(),
            rng,
            conf,
        }
    }

    /// Configuration that was used to instantiate the VM.
    pub fn config(&self) -> &Chip8Conf {
        &self.conf
    }

    /// Clear all machine state in preparation for a fresh program.
    ///
    /// Memory, registers, stack, timers, display and keyboard are zeroed,
    /// the built in font is reloaded and the program counter points at
    /// the start of program memory.
    pub fn reset(&mut self) {
        self.cpu.reset();
        debug!("machine reset");
    }

    /// Copy a program into memory at [`MEM_START`].
    ///
    /// Nothing else is touched, so this is expected to follow a [`Chip8Vm::reset`].
    pub fn load_program(&mut self, bytecode: &[u8]) -> Chip8Result<()> {
        if bytecode.len() > MAX_PROGRAM_SIZE {
            return Err(Chip8Error::ProgramTooLarge {
                size: bytecode.len(),
            });
        }

        self.cpu.ram[MEM_START..MEM_START + bytecode.len()].copy_from_slice(bytecode);
        debug!("loaded program of {} bytes", bytecode.len());

        Ok(())
    }
}

/// Presentation and input
impl Chip8Vm {
    pub fn read_framebuffer(&self) -> &DisplayBuffer {
        &self.cpu.display
    }

    /// State of the pixel at the given column and row.
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        x < DISPLAY_WIDTH && y < DISPLAY_HEIGHT && self.cpu.display[x + y * DISPLAY_WIDTH]
    }

    /// Whether the display buffer changed since the last frame was consumed.
    pub fn draw_pending(&self) -> bool {
        self.cpu.draw_flag
    }

    pub fn clear_draw_pending(&mut self) {
        self.cpu.draw_flag = false;
    }

    /// Sets the keyboard key input state by key index.
    pub fn set_key_state(&mut self, index: u8, pressed: bool) -> Chip8Result<()> {
        self.cpu.set_key_state(index, pressed)
    }

    /// Sets the keyboard key input state.
    pub fn set_key(&mut self, key: KeyCode, pressed: bool) {
        // Every keycode is a valid index.
        let _ = self.cpu.set_key_state(key.as_u8(), pressed);
    }

    /// Clear the keyboard input state, setting all keys to up.
    pub fn clear_keys(&mut self) {
        self.cpu.clear_keys()
    }

    /// The machine is stalled on `Fx0A` until a key is pressed.
    pub fn is_waiting_for_key(&self) -> bool {
        self.cpu.key_wait.is_some()
    }
}

/// Machine state inspection
impl Chip8Vm {
    pub fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.cpu.registers
    }

    /// Address register `I`.
    pub fn index(&self) -> Address {
        self.cpu.address
    }

    pub fn pc(&self) -> Address {
        self.cpu.pc
    }

    pub fn sp(&self) -> usize {
        self.cpu.sp
    }

    pub fn delay_timer(&self) -> u8 {
        self.cpu.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.cpu.sound_timer
    }

    pub fn memory(&self) -> &[u8] {
        &self.cpu.ram[..]
    }

    /// Instruction fetched by the most recent cycle.
    pub fn opcode(&self) -> Opcode {
        self.cpu.opcode
    }
}

/// Interpreter
impl Chip8Vm {
    /// Execute one instruction, then count down the timers once.
    ///
    /// Errors are fatal for this machine. There is no rollback of a
    /// partially executed instruction.
    pub fn step_cycle(&mut self) -> Chip8Result<Cycle> {
        let flow = match self.cpu.key_wait {
            Some(vx) => match self.cpu.first_key() {
                Some(k) => {
                    debug!("key {k:X} resumed machine");
                    self.cpu.registers[vx] = k;
                    self.cpu.key_wait = None;
                    self.next();
                    Flow::Ok
                }
                None => Flow::KeyWait,
            },
            None => {
                let opcode = Opcode::fetch(&self.cpu.ram[..], self.cpu.pc as usize)?;
                self.cpu.opcode = opcode;
                self.execute(opcode)?
            }
        };

        // A stalled machine does not consume the timer tick.
        if flow == Flow::KeyWait {
            return Ok(Cycle { flow, beep: false });
        }

        let beep = self.cpu.tick_timers();
        Ok(Cycle { flow, beep })
    }

    /// Step up to `step_count` cycles, stopping at the first error.
    ///
    /// Returns the number of beeps emitted.
    pub fn run_steps(&mut self, step_count: usize) -> Chip8Result<usize> {
        let mut beeps = 0;

        for _ in 0..step_count {
            if self.step_cycle()?.beep {
                beeps += 1;
            }
        }

        Ok(beeps)
    }

    /// Advance to the next instruction.
    #[inline(always)]
    fn next(&mut self) {
        self.cpu.pc += 2;
    }

    /// Skip the next instruction when the condition holds.
    #[inline(always)]
    fn skip_if(&mut self, condition: bool) {
        self.cpu.pc += if condition { 4 } else { 2 };
    }

    #[inline]
    fn unknown(&self, opcode: Opcode) -> Chip8Error {
        Chip8Error::UnknownOpcode {
            opcode: opcode.0,
            pc: self.cpu.pc,
        }
    }

    fn execute(&mut self, opcode: Opcode) -> Chip8Result<Flow> {
        let (vx, vy, nn, nnn) = (opcode.x(), opcode.y(), opcode.nn(), opcode.nnn());

        let mut control_flow = Flow::Ok;

        match opcode.op() {
            0x0 => match nnn {
                // 00E0 (CLS)
                //
                // Clear display
                0x0E0 => {
                    self.cpu.clear_display();
                    self.next();
                    control_flow = Flow::Draw;
                }
                // 00EE (RET)
                //
                // Return from a subroutine.
                // Set the program counter to the value at the top of the stack.
                // Subtract 1 from the stack pointer.
                0x0EE => {
                    self.cpu.pc = self.cpu.pop()?;
                    control_flow = Flow::Jump;
                }
                _ => return Err(self.unknown(opcode)),
            },
            // 1NNN (JP addr)
            //
            // Jump to address.
            0x1 => {
                self.cpu.pc = nnn;
                control_flow = Flow::Jump;
            }
            // 2NNN (CALL addr)
            //
            // Call subroutine at NNN.
            0x2 => {
                self.cpu.push(self.cpu.pc + 2)?;
                self.cpu.pc = nnn;
                control_flow = Flow::Jump;
            }
            // 3XNN (SE Vx, byte)
            //
            // Skip the next instruction if register VX equals value NN.
            0x3 => self.skip_if(self.cpu.registers[vx] == nn),
            // 4XNN (SNE Vx, byte)
            //
            // Skip the next instruction if register VX does not equal value NN.
            0x4 => self.skip_if(self.cpu.registers[vx] != nn),
            // 5XY0 (SE Vx, Vy)
            //
            // Skip the next instruction if register VX equals value VY.
            0x5 if opcode.n() == 0 => {
                self.skip_if(self.cpu.registers[vx] == self.cpu.registers[vy])
            }
            // 6XNN (LD Vx, byte)
            //
            // Set register VX to value NN.
            0x6 => {
                self.cpu.registers[vx] = nn;
                self.next();
            }
            // 7xnn (ADD Vx, byte)
            //
            // Add value NN to register VX. Carry flag is not set.
            0x7 => {
                self.cpu.registers[vx] = self.cpu.registers[vx].wrapping_add(nn);
                self.next();
            }
            // Arithmetic instructions indentified by n
            0x8 => self.exec_math(opcode)?,
            // 9xy0 (SNE Vx, Vy)
            //
            // Skip next instruction if Vx != Vy.
            0x9 if opcode.n() == 0 => {
                self.skip_if(self.cpu.registers[vx] != self.cpu.registers[vy])
            }
            // Annn (LD I, addr)
            //
            // Set address register I to value NNN.
            0xA => {
                self.cpu.address = nnn;
                self.next();
            }
            // Bnnn (JP V0, addr)
            //
            // Jump to address NNN offset by register V0.
            // A target past the end of memory fails on the next fetch.
            0xB => {
                self.cpu.pc = nnn + self.cpu.registers[0] as Address;
                control_flow = Flow::Jump;
            }
            // CXNN (RND Vx, byte)
            //
            // Generate random number.
            // Set register VX to the result of bitwise AND between a random number and NN.
            0xC => {
                self.cpu.registers[vx] = nn & self.rng.gen::<u8>();
                self.next();
            }
            // Dxyn (DRW Vx, Vy, nibble)
            //
            // Draw sprite to the display buffer, at coordinate as per registers Vx and Vy.
            // Sprite is encoded as 8 pixels wide, N pixels high, stored in bits located in
            // memory pointed to by address register I.
            //
            // If the sprite is drawn outside of the display area, it is wrapped around to the other side.
            //
            // If the drawing operation erases existing pixels in the display buffer, register VF is set to
            // 1, and set to 0 if no display bits are unset. This is used for collision detection.
            0xD => {
                self.draw_sprite(vx, vy, opcode.n() as usize)?;
                self.next();
                control_flow = Flow::Draw;
            }
            // Key and miscellaneous instructions identified by nn
            0xE | 0xF => control_flow = self.exec_misc(opcode)?,
            // Unsupported operation.
            _ => return Err(self.unknown(opcode)),
        }

        Ok(control_flow)
    }

    fn draw_sprite(&mut self, vx: usize, vy: usize, height: usize) -> Chip8Result<()> {
        let (x, y) = (
            self.cpu.registers[vx] as usize,
            self.cpu.registers[vy] as usize,
        );

        // Copy out the rows so the display can be borrowed mutably.
        let mut sprite = [0u8; 0xF];
        sprite[..height].copy_from_slice(self.cpu.read(self.cpu.address as usize, height)?);

        let mut is_erased = false;

        for (r, row) in sprite[..height].iter().enumerate() {
            // Each row is 8 bits representing the 8 pixels of the sprite.
            for c in 0..SPRITE_WIDTH {
                let d = (x + c) % DISPLAY_WIDTH + ((y + r) % DISPLAY_HEIGHT) * DISPLAY_WIDTH;

                let old_px = self.cpu.display[d];
                let new_px = (row >> (7 - c) & 1) != 0;

                // XOR erases a pixel when both the old and new values are both 1.
                is_erased |= old_px && new_px;

                self.cpu.display[d] = old_px ^ new_px;
            }
        }

        // If a pixel was erased, then a collision occurred.
        self.cpu.registers[FLAG_REGISTER] = is_erased as u8;
        self.cpu.draw_flag = true;

        Ok(())
    }

    /// Execute an arithmetic instruction
    ///
    /// The flag register is written last, so it holds the flag
    /// even when it is also the destination.
    #[inline]
    fn exec_math(&mut self, opcode: Opcode) -> Chip8Result<()> {
        debug_assert_eq!(opcode.op(), 0x8);

        let (vx, vy) = (opcode.x(), opcode.y());
        let (x, y) = (self.cpu.registers[vx], self.cpu.registers[vy]);

        let (result, flag) = match opcode.n() {
            // 8XY0 (LD Vx, Vy)
            //
            // Store the value of register VY in register VX.
            0x0 => (y, None),
            // 8XY1 (OR Vx, Vy)
            0x1 => (x | y, None),
            // 8XY2 (AND Vx, Vy)
            0x2 => (x & y, None),
            // 8XY3 (XOR Vx, Vy)
            0x3 => (x ^ y, None),
            // 8XY4 (ADD Vx, Vy)
            //
            // ADDs VX to VY, and stores the result in VX.
            // Overflow is wrapped.
            // If overflow, set VF to 1, else 0.
            0x4 => {
                let (result, carry) = x.overflowing_add(y);
                (result, Some(carry as u8))
            }
            // 8XY5 (SUB Vx, Vy)
            //
            // Subtracts VY from VX, and stores the result in VX.
            // VF is set to 0 when there is a borrow, set to 1 when there isn't.
            0x5 => (x.wrapping_sub(y), Some((x >= y) as u8)),
            // 8XY6 (SHR Vx)
            //
            // If the least-significant bit of Vx is 1, then VF is set to 1, otherwise 0.
            // Shift VX right by 1.
            // VY is unused.
            0x6 => (x >> 1, Some(x & 1)),
            // 8XY7 (SUBN Vx, Vy)
            //
            // Subtracts VX from VY, and stores the result in VX.
            // VF is set to 0 when there is a borrow, set to 1 when there isn't.
            0x7 => (y.wrapping_sub(x), Some((y >= x) as u8)),
            // 8XYE (SHL Vx)
            //
            // If the most-significant bit of Vx is 1, then VF is set to 1, otherwise 0.
            // Shift VX left by 1.
            // VY is unused.
            0xE => (x << 1, Some((x >> 7) & 1)),
            // Unsupported operation.
            _ => return Err(self.unknown(opcode)),
        };

        self.cpu.registers[vx] = result;
        if let Some(flag) = flag {
            self.cpu.registers[FLAG_REGISTER] = flag;
        }
        self.next();

        Ok(())
    }

    /// Execute a key or miscellaneous instruction
    #[inline]
    fn exec_misc(&mut self, opcode: Opcode) -> Chip8Result<Flow> {
        let vx = opcode.x();

        let mut control_flow = Flow::Ok;

        match (opcode.op(), opcode.nn()) {
            // ----------------------------------------------------------------
            // Ex9E (SKP Vx)
            //
            // Skip the next instruction if the key in Vx is pressed.
            (0xE, 0x9E) => {
                let key = self.cpu.registers[vx] & 0xF;
                self.skip_if(self.cpu.key_state(key));
            }
            // ExA1 (SKNP Vx)
            //
            // Skip the next instruction if the key in Vx is not pressed.
            (0xE, 0xA1) => {
                let key = self.cpu.registers[vx] & 0xF;
                self.skip_if(!self.cpu.key_state(key));
            }
            // ----------------------------------------------------------------
            // Fx07 (LD Vx, DT)
            //
            // Set Vx = delay timer value.
            (0xF, 0x07) => {
                self.cpu.registers[vx] = self.cpu.delay_timer;
                self.next();
            }
            // Fx0A (LD Vx, K)
            //
            // Wait for a key press, store the value of the key in Vx.
            // All execution stops until a key is pressed, then the value of that key is stored in Vx.
            (0xF, 0x0A) => match self.cpu.first_key() {
                Some(k) => {
                    self.cpu.registers[vx] = k;
                    self.next();
                }
                None => {
                    // stall the machine, resumed at the top of the next cycle
                    debug!("waiting for key at {:04X}", self.cpu.pc);
                    self.cpu.key_wait = Some(vx);
                    control_flow = Flow::KeyWait;
                }
            },
            // Fx15 (LD DT, Vx)
            //
            // Set delay timer = Vx.
            (0xF, 0x15) => {
                self.cpu.delay_timer = self.cpu.registers[vx];
                self.next();
            }
            // Fx18 (LD ST, Vx)
            //
            // Set sound timer = Vx.
            (0xF, 0x18) => {
                self.cpu.sound_timer = self.cpu.registers[vx];
                self.next();
                control_flow = Flow::Sound;
            }
            // Fx1E (ADD I, Vx)
            //
            // Add Vx to I. VF is set when the result leaves the address space,
            // and I wraps around to stay within it.
            (0xF, 0x1E) => {
                let sum = self.cpu.address + self.cpu.registers[vx] as Address;
                self.cpu.registers[FLAG_REGISTER] = (sum > ADDRESS_MASK) as u8;
                self.cpu.address = sum & ADDRESS_MASK;
                self.next();
            }
            // Fx29 (LD F, Vx)
            //
            // Set I = location of sprite for digit Vx.
            (0xF, 0x29) => {
                let x = self.cpu.registers[vx] as Address;
                self.cpu.address = FONTSET_START + x * FONTSET_HEIGHT;
                self.next();
            }
            // Fx33 (LD B, Vx)
            //
            // Store the binary-coded decimal representation of Vx
            // in the memory locations I, I+1, and I+2.
            #[rustfmt::skip]
            (0xF, 0x33) => {
                let x = self.cpu.registers[vx];
                let bcd = self.cpu.write(self.cpu.address as usize, 3)?;
                bcd[0] = x / 100 % 10;
                bcd[1] = x / 10  % 10;
                bcd[2] = x       % 10;
                self.next();
            }
            // Fx55 (LD [I], Vx)
            //
            // Store registers V0 through Vx in memory starting at location I.
            (0xF, 0x55) => {
                let registers = self.cpu.registers;
                self.cpu
                    .write(self.cpu.address as usize, vx + 1)?
                    .copy_from_slice(&registers[..=vx]);
                self.next();
            }
            // Fx65 (LD Vx, [I])
            //
            // Read registers V0 through Vx from memory starting at location I.
            (0xF, 0x65) => {
                let mut values = [0u8; REGISTER_COUNT];
                values[..=vx].copy_from_slice(self.cpu.read(self.cpu.address as usize, vx + 1)?);
                self.cpu.registers[..=vx].copy_from_slice(&values[..=vx]);
                self.next();
            }
            // ----------------------------------------------------------------
            // Unsupported operation.
            _ => return Err(self.unknown(opcode)),
        }

        Ok(control_flow)
    }
}

/// Troubleshooting
impl Chip8Vm {
    /// Returns the contents of the display as a human readable string.
    pub fn dump_display(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        for y in 0..DISPLAY_HEIGHT {
            for x in 0..DISPLAY_WIDTH {
                if self.cpu.display[x + y * DISPLAY_WIDTH] {
                    write!(buf, "#")?;
                } else {
                    write!(buf, ".")?;
                }
            }
            writeln!(buf)?;
        }

        Ok(buf)
    }
}

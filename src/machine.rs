use crate::frame::{CallFrame, CallType, MAX_LOCALS};
use crate::header::Header;
use crate::iocard::IoCard;
use crate::memory::{Memory, PackedKind};
use crate::screen::Screen;
use crate::zobject::ObjectTable;
use crate::zrand::ZRand;
use log::{debug, info};

/// The whole Z-Machine as one owned value: story image, object database,
/// RNG, I/O card, and the frame stack. No globals anywhere.
pub struct Machine {
    pub memory: Memory,
    pub header: Header,
    pub objects: ObjectTable,
    pub rng: ZRand,
    pub io: IoCard,
    /// Address of the next instruction
    pub pc: usize,
    /// The active frame; suspended frames live in `frames`, oldest first
    pub frame: CallFrame,
    pub frames: Vec<CallFrame>,
    /// Set when an interrupt-called routine returns; the nested decode loop
    /// consumes it
    pub interrupt_return: Option<u16>,
    pub undo_snapshot: Option<Vec<u8>>,
    globals: usize,
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine").field("pc", &self.pc).finish()
    }
}

impl Machine {
    pub fn new(bytes: Vec<u8>, screen: Box<dyn Screen>) -> Result<Machine, String> {
        let header = Header::new(&bytes)?;
        let memory = Memory::new(bytes)?;
        let objects = ObjectTable::new(header.object_table_addr, header.version);
        let globals = header.global_variables as usize;
        let pc = header.initial_pc as usize;
        Ok(Machine {
            memory,
            objects,
            rng: ZRand::new_uniform(),
            io: IoCard::new(screen),
            pc,
            frame: CallFrame::initial(pc),
            frames: Vec::new(),
            interrupt_return: None,
            undo_snapshot: None,
            globals,
            header,
        })
    }

    /// Prepare the screen and stamp our capabilities into the header.
    /// Called once at startup and again after RESTART.
    pub fn initialize(&mut self) -> Result<(), String> {
        self.io
            .screen
            .initialize(self.header.version)
            .map_err(String::from)?;
        self.stamp_header()?;
        if self.header.version >= 5 && self.header.terminating_chars != 0 {
            let mut terminators = Vec::new();
            let mut addr = self.header.terminating_chars as usize;
            loop {
                let b = self.memory.fetch_byte(addr)?;
                if b == 0 {
                    break;
                }
                terminators.push(b);
                addr += 1;
            }
            self.io.screen.set_terminating_characters(&terminators);
        }
        info!(
            "machine ready: version {}, pc {:05x}",
            self.header.version, self.pc
        );
        Ok(())
    }

    /// RESTART: dynamic memory back to the pristine image (transcript bit
    /// kept), frame stack reset, screen told to start over.
    pub fn restart(&mut self) -> Result<(), String> {
        self.memory.reset_dynamic();
        self.pc = self.header.initial_pc as usize;
        self.frame = CallFrame::initial(self.pc);
        self.frames.clear();
        self.interrupt_return = None;
        self.io.screen.restart().map_err(String::from)?;
        self.stamp_header()?;
        debug!("restarted at {:05x}", self.pc);
        Ok(())
    }

    /// Tell the story what this interpreter can do. Which bits exist
    /// depends on the version.
    fn stamp_header(&mut self) -> Result<(), String> {
        let version = self.header.version;
        let screen = &self.io.screen;
        let mut flags1 = self.memory.fetch_byte(0x01)?;
        if version <= 3 {
            // Bit 4 is "status line NOT available".
            if screen.has_status_line() {
                flags1 &= !0x10;
            } else {
                flags1 |= 0x10;
            }
            if screen.has_upper_window() {
                flags1 |= 0x20;
            } else {
                flags1 &= !0x20;
            }
            if screen.default_font_proportional() {
                flags1 |= 0x40;
            } else {
                flags1 &= !0x40;
            }
        } else {
            flags1 &= !0x9d;
            if version >= 5 && screen.has_colors() {
                flags1 |= 0x01;
            }
            if screen.has_bold() {
                flags1 |= 0x04;
            }
            if screen.has_italic() {
                flags1 |= 0x08;
            }
            if screen.has_fixed_width() {
                flags1 |= 0x10;
            }
            if screen.has_timed_input() {
                flags1 |= 0x80;
            }
        }
        self.memory.put_byte(0x01, flags1)?;

        if version >= 4 {
            self.memory.put_byte(0x1e, 6)?; // interpreter number
            self.memory.put_byte(0x1f, b'L')?; // interpreter version
            let (width, height) = screen.screen_chars();
            self.memory.put_byte(0x20, height.min(255) as u8)?;
            self.memory.put_byte(0x21, width.min(255) as u8)?;
        }
        if version >= 5 {
            let (unit_w, unit_h) = screen.screen_units();
            self.memory.put_word(0x22, unit_w)?;
            self.memory.put_word(0x24, unit_h)?;
            let (font_w, font_h) = screen.font_size();
            self.memory.put_byte(0x26, font_w)?;
            self.memory.put_byte(0x27, font_h)?;
            self.memory.put_byte(0x2c, screen.default_background())?;
            self.memory.put_byte(0x2d, screen.default_foreground())?;
        }
        // Standard revision 1.0
        self.memory.put_word(0x32, 0x0100)?;
        Ok(())
    }

    // -- variables ---------------------------------------------------------

    fn global_addr(&self, var: u8) -> usize {
        self.globals + (var as usize - 16) * 2
    }

    /// Read a variable: 0 pops the routine stack, 1-15 are locals (reads
    /// past num_locals yield 0), 16-255 are globals.
    pub fn read_variable(&mut self, var: u8) -> Result<u16, String> {
        match var {
            0 => self.frame.pop(),
            1..=15 => {
                let index = (var - 1) as usize;
                if index >= self.frame.num_locals as usize {
                    debug!(
                        "read of local {} but routine has {} locals - 0",
                        var, self.frame.num_locals
                    );
                    return Ok(0);
                }
                Ok(self.frame.locals[index])
            }
            _ => self.memory.fetch_word(self.global_addr(var)),
        }
    }

    /// Write a variable: 0 pushes the routine stack.
    pub fn write_variable(&mut self, var: u8, value: u16) -> Result<(), String> {
        match var {
            0 => {
                self.frame.push(value);
                Ok(())
            }
            1..=15 => {
                let index = (var - 1) as usize;
                if index >= self.frame.num_locals as usize {
                    debug!(
                        "write to local {} but routine has {} locals - ignored",
                        var, self.frame.num_locals
                    );
                    return Ok(());
                }
                self.frame.locals[index] = value;
                Ok(())
            }
            _ => {
                let addr = self.global_addr(var);
                self.memory.put_word(addr, value)
            }
        }
    }

    /// Indirect variable reference (LOAD, STORE, INC, DEC, PULL): variable
    /// 0 reads or writes the top of stack in place.
    pub fn read_variable_indirect(&mut self, var: u8) -> Result<u16, String> {
        if var == 0 {
            self.frame.peek()
        } else {
            self.read_variable(var)
        }
    }

    pub fn write_variable_indirect(&mut self, var: u8, value: u16) -> Result<(), String> {
        if var == 0 {
            self.frame.poke(value)
        } else {
            self.write_variable(var, value)
        }
    }

    // -- calls and returns -------------------------------------------------

    /// Invoke the routine at a (non-zero) packed address. The caller has
    /// already advanced PC past the whole call instruction; for a Function
    /// call the byte just behind PC is the store variable, and the saved PC
    /// backs up onto it so the return can deliver the result.
    pub fn call_routine(
        &mut self,
        packed: u16,
        args: &[u16],
        call_type: CallType,
    ) -> Result<(), String> {
        let addr = self.memory.unpack(packed, PackedKind::Routine);
        let num_locals = self.memory.fetch_byte(addr)? as usize;
        if num_locals > MAX_LOCALS {
            return Err(format!(
                "Corrupt routine header at {:05x}: {} locals",
                addr, num_locals
            ));
        }

        let return_pc = match call_type {
            CallType::Function => self.pc - 1,
            _ => self.pc,
        };

        let mut frame = CallFrame {
            pc: 0,
            locals: [0; MAX_LOCALS],
            num_locals: num_locals as u8,
            stack: Vec::new(),
            call_type,
            arg_count: args.len().min(num_locals) as u8,
            frame_number: self.frame.frame_number + 1,
        };

        let mut body = addr + 1;
        if self.header.version <= 4 {
            // Initial local values follow the header byte.
            for local in frame.locals.iter_mut().take(num_locals) {
                *local = self.memory.fetch_word(body)?;
                body += 2;
            }
        }
        for (i, &arg) in args.iter().take(num_locals).enumerate() {
            frame.locals[i] = arg;
        }

        let mut suspended = std::mem::replace(&mut self.frame, frame);
        suspended.pc = return_pc;
        self.frames.push(suspended);
        self.pc = body;

        debug!(
            "call {:05x} ({:?}, {} args, {} locals), depth {}",
            addr,
            call_type,
            args.len(),
            num_locals,
            self.frames.len()
        );
        Ok(())
    }

    /// Return from the current routine. Function calls deliver the value
    /// through the store byte the saved PC points at; procedure calls
    /// discard it; interrupt returns flag the nested decode loop.
    pub fn return_value(&mut self, value: u16) -> Result<(), String> {
        let caller = self
            .frames
            .pop()
            .ok_or("Stack underflow: return from the bottom frame")?;
        self.pc = caller.pc;
        let finished = std::mem::replace(&mut self.frame, caller);
        debug!(
            "return {} ({:?}), depth {}",
            value,
            finished.call_type,
            self.frames.len()
        );
        match finished.call_type {
            CallType::Procedure => Ok(()),
            CallType::Function => {
                let store = self.memory.fetch_byte(self.pc)?;
                self.pc += 1;
                self.write_variable(store, value)
            }
            CallType::Interrupt => {
                self.interrupt_return = Some(value);
                Ok(())
            }
        }
    }

    /// CATCH: the token naming the current frame.
    pub fn catch_token(&self) -> u16 {
        self.frame.frame_number as u16
    }

    /// THROW: unwind suspended frames until the frame named by `token` is
    /// current. The caller then performs an ordinary RET.
    pub fn unwind_to(&mut self, token: u16) -> Result<(), String> {
        while self.frame.frame_number != token as u32 {
            let parent = self
                .frames
                .pop()
                .ok_or("Stack underflow: throw to a dead frame")?;
            self.pc = parent.pc;
            self.frame = parent;
        }
        Ok(())
    }
}

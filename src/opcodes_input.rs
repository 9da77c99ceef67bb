//! READ and READ_CHAR, the reentrant interrupt dispatch they rely on, the
//! V1-3 status line refresh, and the save/restore opcode bodies that wrap
//! the state serializer.

use crate::frame::CallType;
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::savestate;
use log::{debug, info};

/// What a nested interrupt dispatch produced.
pub enum InterruptFlow {
    /// The routine returned this value
    Return(u16),
    /// QUIT executed inside the interrupt
    Quit,
    /// RESTART executed inside the interrupt
    Restart,
}

impl Interpreter {
    /// sread (V1-4) / aread (V5+).
    pub(crate) fn op_read(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<ExecutionResult, String> {
        self.need(inst, operands, 1)?;
        let version = self.version();
        let text_buffer = operands[0] as usize;
        let parse_buffer = operands.get(1).copied().unwrap_or(0) as usize;
        let time = operands.get(2).copied().unwrap_or(0);
        let routine = operands.get(3).copied().unwrap_or(0);
        let wait = if routine != 0 { time } else { 0 };

        if version <= 3 {
            self.refresh_status()?;
        }

        let capacity = {
            let declared = self.machine.memory.fetch_byte(text_buffer)? as usize;
            if version <= 4 {
                declared.saturating_sub(1)
            } else {
                declared
            }
        };
        // V5+ may hand us a buffer with typed-ahead text to keep.
        let mut prefill = if version >= 5 {
            self.machine.read_input_buffer(text_buffer)?
        } else {
            String::new()
        };

        let (line, terminator) = loop {
            match self.machine.io.read_line(&prefill, capacity, wait, &[])? {
                crate::screen::LineInput::Line { text, terminator } => break (text, terminator),
                crate::screen::LineInput::Timeout { partial } => {
                    prefill = partial;
                    match self.call_interrupt(routine)? {
                        InterruptFlow::Quit => return Ok(ExecutionResult::Quit),
                        InterruptFlow::Restart => return Ok(ExecutionResult::Restart),
                        InterruptFlow::Return(0) => continue,
                        InterruptFlow::Return(_) => {
                            // The interrupt asked to abort: the read
                            // produces nothing and V5+ stores terminator 0.
                            debug!("read aborted by interrupt routine");
                            self.store_to(inst, 0)?;
                            return Ok(ExecutionResult::Continue);
                        }
                    }
                }
            }
        };

        let input = line.to_lowercase();
        self.machine.write_input_buffer(text_buffer, &input)?;
        if parse_buffer != 0 {
            self.machine
                .tokenise_buffer(text_buffer, parse_buffer, 0, false)?;
        }
        if version >= 5 {
            self.store_to(inst, terminator)?;
        }
        debug!("read: '{}' terminated by {}", input, terminator);
        Ok(ExecutionResult::Continue)
    }

    /// read_char (V4+).
    pub(crate) fn op_read_char(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<ExecutionResult, String> {
        if operands.first().copied().unwrap_or(1) != 1 {
            debug!("read_char with device operand != 1");
        }
        let time = operands.get(1).copied().unwrap_or(0);
        let routine = operands.get(2).copied().unwrap_or(0);
        let wait = if routine != 0 { time } else { 0 };

        let key = loop {
            match self.machine.io.read_char(wait)? {
                Some(key) => break key,
                None => match self.call_interrupt(routine)? {
                    InterruptFlow::Quit => return Ok(ExecutionResult::Quit),
                    InterruptFlow::Restart => return Ok(ExecutionResult::Restart),
                    InterruptFlow::Return(0) => continue,
                    InterruptFlow::Return(_) => {
                        debug!("read_char aborted by interrupt routine");
                        break 0;
                    }
                },
            }
        };
        self.store_to(inst, key)?;
        Ok(ExecutionResult::Continue)
    }

    /// Run an interrupt routine to completion through a nested decode
    /// loop. The routine gets an ordinary frame with the Interrupt call
    /// type; its return sets the flag that pops us back out, so interrupts
    /// may themselves read input and take further interrupts.
    pub(crate) fn call_interrupt(&mut self, packed: u16) -> Result<InterruptFlow, String> {
        if packed == 0 {
            return Ok(InterruptFlow::Return(0));
        }
        debug!("interrupt dispatch to packed {:04x}", packed);
        self.machine
            .call_routine(packed, &[], CallType::Interrupt)?;
        loop {
            let result = self.step()?;
            if let Some(value) = self.machine.interrupt_return.take() {
                debug!("interrupt returned {}", value);
                return Ok(InterruptFlow::Return(value));
            }
            match result {
                ExecutionResult::Quit => return Ok(InterruptFlow::Quit),
                ExecutionResult::Restart => return Ok(InterruptFlow::Restart),
                _ => {}
            }
        }
    }

    /// V1-3 status line: location object name from global 16, then either
    /// score/turns (globals 17/18) or hours/minutes when flags1 bit 1 marks
    /// a time game.
    pub(crate) fn refresh_status(&mut self) -> Result<(), String> {
        let location = self.machine.read_variable(16)?;
        let name = self
            .machine
            .objects
            .get_object_name(&self.machine.memory, location)?;
        let a = self.machine.read_variable(17)? as i16;
        let b = self.machine.read_variable(18)? as i16;
        let time_game =
            self.version() == 3 && self.machine.memory.fetch_byte(0x01)? & 0x02 != 0;
        self.machine
            .io
            .screen
            .show_status(&name, a, b, time_game)
            .map_err(String::from)
    }

    // -- save and restore --------------------------------------------------

    /// 0OP save, V1-3 form: branch on success. The state is serialized
    /// with PC sitting on this instruction's own branch argument, so a
    /// later restore re-takes the branch as a success.
    pub(crate) fn op_save(&mut self, inst: &Instruction) -> Result<ExecutionResult, String> {
        if self.version() >= 4 {
            return self.do_save_store(inst);
        }
        let branch = inst
            .branch
            .as_ref()
            .ok_or("save decoded without branch info")?;
        let after = self.machine.pc;
        self.machine.pc = after - branch.length;
        let result = savestate::save_game(&mut self.machine);
        self.machine.pc = after;
        let ok = match result {
            Ok(()) => true,
            Err(e) => {
                info!("save failed: {e}");
                false
            }
        };
        self.do_branch(inst, ok)
    }

    /// 0OP restore, V1-3 form: on success the restored PC points at the
    /// original save's branch argument, which we take as if save had
    /// succeeded. On failure, branch false.
    pub(crate) fn op_restore(&mut self, inst: &Instruction) -> Result<ExecutionResult, String> {
        if self.version() >= 4 {
            return self.do_restore_store(inst);
        }
        match savestate::restore_game(&mut self.machine) {
            Ok(()) => self.take_branch_at_pc(true),
            Err(e) => {
                info!("restore failed: {e}");
                self.do_branch(inst, false)
            }
        }
    }

    /// Store-form save (0OP in V4, EXT:0 in V5+): the store receives 1 on
    /// success, 0 on failure; the serialized PC is already past the store
    /// byte, which is how the restore side finds it again.
    pub(crate) fn do_save_store(&mut self, inst: &Instruction) -> Result<ExecutionResult, String> {
        let value = match savestate::save_game(&mut self.machine) {
            Ok(()) => 1,
            Err(e) => {
                info!("save failed: {e}");
                0
            }
        };
        self.store_to(inst, value)?;
        Ok(ExecutionResult::Continue)
    }

    /// Store-form restore: on success, write 2 through the store byte just
    /// behind the restored PC; on failure store 0 and continue here.
    pub(crate) fn do_restore_store(&mut self, inst: &Instruction) -> Result<ExecutionResult, String> {
        match savestate::restore_game(&mut self.machine) {
            Ok(()) => {
                self.store_through_restored_pc(2)?;
                Ok(ExecutionResult::Branched)
            }
            Err(e) => {
                info!("restore failed: {e}");
                self.store_to(inst, 0)?;
                Ok(ExecutionResult::Continue)
            }
        }
    }

    /// Deliver a result through the store variable found at PC - 1 of the
    /// just-restored frame.
    pub(crate) fn store_through_restored_pc(&mut self, value: u16) -> Result<(), String> {
        let store = self.machine.memory.fetch_byte(self.machine.pc - 1)?;
        self.machine.write_variable(store, value)
    }

    /// Read and apply a branch argument at PC directly from memory. Used
    /// after a V1-3 restore, where the instruction owning the branch was
    /// decoded in a previous life.
    pub(crate) fn take_branch_at_pc(&mut self, condition: bool) -> Result<ExecutionResult, String> {
        let first = self.machine.memory.fetch_byte(self.machine.pc)?;
        self.machine.pc += 1;
        let on_true = first & 0x80 != 0;
        let offset = if first & 0x40 != 0 {
            (first & 0x3f) as i16
        } else {
            let second = self.machine.memory.fetch_byte(self.machine.pc)?;
            self.machine.pc += 1;
            let raw = (((first & 0x3f) as i16) << 8) | second as i16;
            if raw & 0x2000 != 0 {
                raw | 0xc000u16 as i16
            } else {
                raw
            }
        };
        if condition != on_true {
            return Ok(ExecutionResult::Branched);
        }
        match offset {
            0 => self.do_return(0),
            1 => self.do_return(1),
            offset => {
                self.machine.pc = (self.machine.pc as i64 + offset as i64 - 2) as usize;
                Ok(ExecutionResult::Branched)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::build_machine;
    use crate::interpreter::Outcome;
    use crate::screen::{HeadlessScreen, ScriptedInput};
    use test_log::test;

    fn headless(interp: &mut Interpreter) -> &mut HeadlessScreen {
        interp
            .machine
            .io
            .screen
            .as_any_mut()
            .downcast_mut::<HeadlessScreen>()
            .unwrap()
    }

    /// V3 program: sread text parse ; quit, with "look" scripted. Needs a
    /// dictionary so the parse buffer fills in.
    #[test]
    fn read_fills_text_and_parse_buffers() {
        // Dictionary with one word "look" lives in dynamic memory.
        let mut machine = build_machine(3, &[0xe4, 0x0f, 0x0a, 0x00, 0x0b, 0x00, 0xba]);
        let dict = 0x0900usize;
        machine.memory.put_word(0x08, dict as u16).unwrap();
        machine.header.dictionary = dict as u16;
        machine.memory.put_byte(dict, 0).unwrap(); // no separators
        machine.memory.put_byte(dict + 1, 7).unwrap(); // entry length
        machine.memory.put_word(dict + 2, 1).unwrap(); // one entry
        let entry = dict + 4;
        machine
            .memory
            .put_word(entry, (17 << 10) | (20 << 5) | 20)
            .unwrap();
        machine
            .memory
            .put_word(entry + 2, 0x8000 | (16 << 10) | (5 << 5) | 5)
            .unwrap();
        // Buffers: text at 0x0a00, parse at 0x0b00.
        machine.memory.put_byte(0x0a00, 20).unwrap();
        machine.memory.put_byte(0x0b00, 5).unwrap();

        let mut interp = Interpreter::new(machine);
        headless(&mut interp).push_input(ScriptedInput::Line("LOOK".to_string()));
        assert_eq!(interp.run_with_limit(Some(10)).unwrap(), Outcome::Quit);

        // Text buffer: lowercased, NUL-terminated at +1.
        assert_eq!(interp.machine.read_input_buffer(0x0a00).unwrap(), "look");
        // Parse buffer: one word, dictionary address, length 4, position 1.
        assert_eq!(interp.machine.memory.fetch_byte(0x0b01).unwrap(), 1);
        assert_eq!(
            interp.machine.memory.fetch_word(0x0b02).unwrap(),
            entry as u16
        );
        assert_eq!(interp.machine.memory.fetch_byte(0x0b04).unwrap(), 4);
        assert_eq!(interp.machine.memory.fetch_byte(0x0b05).unwrap(), 1);
    }

    #[test]
    fn timed_read_dispatches_interrupts_then_aborts() {
        // V5: aread text parse time=10 routine -> G0; quit. The interrupt
        // routine increments G1 and asks to abort once it reaches 3.
        let program = &[
            0xe4u8, 0x05, // aread, types large large small small
            0x0a, 0x00, // text buffer 0x0a00
            0x0b, 0x00, // parse buffer 0x0b00
            0x0a, // time 10
            0x90, // routine packed 0x90 -> 0x0240
            0x10, // -> G0
            0xba,
        ];
        let mut machine = build_machine(5, program);
        // Interrupt routine at 0x90 * 4 = 0x240: inc G1; jl G1 #3 [TRUE rfalse]; rtrue
        let r = 0x240usize;
        machine.memory.put_byte(r, 0).unwrap(); // no locals
        machine.memory.put_byte(r + 1, 0x95).unwrap(); // inc (small const var number)
        machine.memory.put_byte(r + 2, 0x11).unwrap(); // G1
        machine.memory.put_byte(r + 3, 0x42).unwrap(); // jl G1 #3 (var,small)
        machine.memory.put_byte(r + 4, 0x11).unwrap();
        machine.memory.put_byte(r + 5, 0x03).unwrap();
        machine.memory.put_byte(r + 6, 0xc0).unwrap(); // branch true -> rfalse
        machine.memory.put_byte(r + 7, 0xb0).unwrap(); // rtrue
        machine.memory.put_byte(0x0a00, 20).unwrap();
        machine.memory.put_byte(0x0b00, 5).unwrap();

        let mut interp = Interpreter::new(machine);
        for _ in 0..5 {
            headless(&mut interp).push_input(ScriptedInput::Timeout);
        }
        assert_eq!(interp.run_with_limit(Some(100)).unwrap(), Outcome::Quit);
        // Three dispatches: G1 counted to 3, read aborted storing 0.
        assert_eq!(interp.machine.memory.fetch_word(0x102).unwrap(), 3);
        assert_eq!(interp.machine.memory.fetch_word(0x100).unwrap(), 0);
    }

    #[test]
    fn read_char_stores_scripted_key() {
        // read_char 1 -> G0; quit
        let program = &[0xf6, 0x7f, 0x01, 0x10, 0xba];
        let mut machine = build_machine(4, program);
        machine.memory.put_byte(0x0a00, 20).unwrap();
        let mut interp = Interpreter::new(machine);
        headless(&mut interp).push_input(ScriptedInput::Char(b'y' as u16));
        interp.run_with_limit(Some(10)).unwrap();
        assert_eq!(interp.machine.memory.fetch_word(0x100).unwrap(), b'y' as u16);
    }

    #[test]
    fn v4_save_and_restore_store_protocol() {
        use std::env::temp_dir;
        // save -> G0; je G0 #2 [TRUE -> quit]; restore -> G1; quit.
        // The restore rewinds execution to the save's store byte, writes 2
        // there, and the je takes the success path the second time around.
        let program = &[0xb5, 0x10, 0x41, 0x10, 0x02, 0xc4, 0xb6, 0x11, 0xba];
        let mut machine = build_machine(4, program);
        let path = temp_dir().join(format!("lantern-test-{}.sav", std::process::id()));
        let path_str = path.to_string_lossy().to_string();
        machine
            .io
            .screen
            .as_any_mut()
            .downcast_mut::<HeadlessScreen>()
            .unwrap()
            .set_save_path(&path_str);
        let mut interp = Interpreter::new(machine);
        let outcome = interp.run_with_limit(Some(20)).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(outcome, Outcome::Quit);
        // The first pass stored 1; the restore delivered 2 through the
        // save's store byte.
        assert_eq!(interp.machine.memory.fetch_word(0x100).unwrap(), 2);
    }

    #[test]
    fn cancelled_save_signals_failure() {
        // V4 save -> G0; quit. No save path configured: dialog "cancelled".
        let program = &[0xb5, 0x10, 0xba];
        let machine = build_machine(4, program);
        let mut interp = Interpreter::new(machine);
        interp.machine.memory.put_word(0x100, 0xffff).unwrap();
        interp.run_with_limit(Some(10)).unwrap();
        assert_eq!(interp.machine.memory.fetch_word(0x100).unwrap(), 0);
    }

    #[test]
    fn status_line_reads_the_three_globals() {
        let mut machine = build_machine(3, &[0xbc, 0xba]); // show_status; quit
        // Object table with one named object ("fa").
        let base = 0x0200usize;
        machine.memory.put_word(0x0a, base as u16).unwrap();
        machine.header.object_table_addr = base as u16;
        machine.objects = crate::zobject::ObjectTable::new(base as u16, 3);
        let entry = base + 62;
        let pt = 0x0300usize;
        machine.memory.put_word(entry + 7, pt as u16).unwrap();
        machine.memory.put_byte(pt, 1).unwrap();
        machine
            .memory
            .put_word(pt + 1, 0x8000 | (11 << 10) | (6 << 5) | 5)
            .unwrap();
        let mut interp = Interpreter::new(machine);
        interp.machine.write_variable(16, 1).unwrap();
        interp.machine.write_variable(17, 5).unwrap();
        interp.machine.write_variable(18, 12).unwrap();
        assert_eq!(interp.run_with_limit(Some(5)).unwrap(), Outcome::Quit);
    }
}

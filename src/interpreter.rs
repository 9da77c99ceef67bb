use crate::frame::CallType;
use crate::instruction::{Instruction, InstructionForm, OperandCount, OperandType};
use crate::machine::Machine;
use crate::text;
use log::{debug, trace};

/// Result of executing one instruction
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    /// Continue at the already-advanced PC
    Continue,
    /// A branch or restore moved PC
    Branched,
    /// A routine was called, PC points at its body
    Called,
    /// A routine returned
    Returned(u16),
    /// QUIT executed
    Quit,
    /// RESTART executed; the top-level driver reinitializes
    Restart,
}

/// Why the decode loop stopped
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Quit,
    Restart,
    LimitReached,
}

/// The CPU: fetch, decode, dispatch, repeat.
pub struct Interpreter {
    pub machine: Machine,
    instruction_count: u64,
}

impl Interpreter {
    pub fn new(machine: Machine) -> Self {
        Interpreter {
            machine,
            instruction_count: 0,
        }
    }

    /// Run until QUIT or RESTART.
    pub fn run(&mut self) -> Result<Outcome, String> {
        self.run_with_limit(None)
    }

    /// Run with an optional instruction limit (tests use this).
    pub fn run_with_limit(&mut self, max_instructions: Option<u64>) -> Result<Outcome, String> {
        loop {
            match self.step()? {
                ExecutionResult::Quit => return Ok(Outcome::Quit),
                ExecutionResult::Restart => return Ok(Outcome::Restart),
                _ => {}
            }
            self.instruction_count += 1;
            if let Some(limit) = max_instructions {
                if self.instruction_count >= limit {
                    debug!("instruction limit {} reached", limit);
                    return Ok(Outcome::LimitReached);
                }
            }
        }
    }

    /// Fetch, decode, and execute the instruction at PC.
    pub fn step(&mut self) -> Result<ExecutionResult, String> {
        let pc = self.machine.pc;
        let version = self.machine.header.version;
        let inst = Instruction::decode(&self.machine.memory, pc, version)
            .map_err(|e| format!("Decode failed at {pc:05x}: {e}"))?;
        trace!("{:05x}: {}", pc, inst.format_with_version(version));
        self.machine.pc += inst.size;
        self.execute(&inst)
    }

    /// Execute a decoded instruction.
    pub fn execute(&mut self, inst: &Instruction) -> Result<ExecutionResult, String> {
        let operands = self.resolve_operands(inst)?;
        match inst.form {
            InstructionForm::Short => match inst.operand_count {
                OperandCount::OP0 => self.execute_0op(inst),
                _ => {
                    if operands.is_empty() {
                        return Err(format!("{} without its operand", inst.name(self.version())));
                    }
                    self.execute_1op(inst, operands[0])
                }
            },
            InstructionForm::Long => self.execute_2op(inst, &operands),
            InstructionForm::Variable => {
                if inst.operand_count == OperandCount::OP2 {
                    self.execute_2op(inst, &operands)
                } else {
                    self.execute_var(inst, &operands)
                }
            }
            InstructionForm::Extended => self.execute_ext(inst, &operands),
        }
    }

    pub fn version(&self) -> u8 {
        self.machine.header.version
    }

    /// Turn raw operands into values: variables resolve through the frame
    /// (variable 0 pops), constants pass through.
    fn resolve_operands(&mut self, inst: &Instruction) -> Result<Vec<u16>, String> {
        let mut values = Vec::with_capacity(inst.operands.len());
        for (i, &operand) in inst.operands.iter().enumerate() {
            values.push(match inst.operand_types[i] {
                OperandType::Variable => self.machine.read_variable(operand as u8)?,
                _ => operand,
            });
        }
        Ok(values)
    }

    /// Route a string through the output streams, honouring embedded
    /// newlines.
    pub fn print_text(&mut self, s: &str) -> Result<(), String> {
        self.machine.io.sync_transcript(&mut self.machine.memory)?;
        let mut first = true;
        for segment in s.split('\n') {
            if !first {
                self.machine.io.new_line()?;
            }
            if !segment.is_empty() {
                self.machine.io.print(segment)?;
            }
            first = false;
        }
        Ok(())
    }

    /// Apply the branch protocol: offsets 0 and 1 return from the routine,
    /// anything else moves PC relative to the post-branch address.
    pub fn do_branch(&mut self, inst: &Instruction, condition: bool) -> Result<ExecutionResult, String> {
        let branch = inst
            .branch
            .as_ref()
            .ok_or_else(|| format!("{} decoded without branch info", inst.name(self.version())))?;
        if condition != branch.on_true {
            return Ok(ExecutionResult::Continue);
        }
        match branch.offset {
            0 => self.do_return(0),
            1 => self.do_return(1),
            offset => {
                self.machine.pc = (self.machine.pc as i64 + offset as i64 - 2) as usize;
                Ok(ExecutionResult::Branched)
            }
        }
    }

    pub fn do_return(&mut self, value: u16) -> Result<ExecutionResult, String> {
        self.machine.return_value(value)?;
        Ok(ExecutionResult::Returned(value))
    }

    /// Call helper shared by every call opcode. A packed address of zero
    /// calls nothing: functions store 0, procedures do nothing at all.
    pub fn do_call(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
        call_type: CallType,
    ) -> Result<ExecutionResult, String> {
        if operands.is_empty() {
            return Err(format!("{} without a routine operand", inst.name(self.version())));
        }
        let packed = operands[0];
        if packed == 0 {
            if call_type == CallType::Function {
                if let Some(store) = inst.store_var {
                    self.machine.write_variable(store, 0)?;
                }
            }
            return Ok(ExecutionResult::Continue);
        }
        self.machine.call_routine(packed, &operands[1..], call_type)?;
        Ok(ExecutionResult::Called)
    }

    /// Signed byte/word array address: base plus a signed index.
    pub(crate) fn array_addr(&self, base: u16, index: u16, scale: i64) -> Result<usize, String> {
        let addr = base as i64 + (index as i16 as i64) * scale;
        if addr < 0 {
            return Err(format!("Memory fault: array access at negative address {addr}"));
        }
        Ok(addr as usize)
    }

    // -- 0OP ---------------------------------------------------------------

    fn execute_0op(&mut self, inst: &Instruction) -> Result<ExecutionResult, String> {
        let version = self.version();
        match inst.opcode {
            0x00 => self.do_return(1),
            0x01 => self.do_return(0),
            0x02 => {
                if let Some(ref s) = inst.text {
                    self.print_text(s)?;
                }
                Ok(ExecutionResult::Continue)
            }
            0x03 => {
                if let Some(ref s) = inst.text {
                    self.print_text(s)?;
                }
                self.machine.io.new_line()?;
                self.do_return(1)
            }
            0x04 => Ok(ExecutionResult::Continue),
            0x05 => {
                if version >= 5 {
                    return Err(unsupported(inst, version));
                }
                self.op_save(inst)
            }
            0x06 => {
                if version >= 5 {
                    return Err(unsupported(inst, version));
                }
                self.op_restore(inst)
            }
            0x07 => Ok(ExecutionResult::Restart),
            0x08 => {
                let value = self.machine.frame.pop()?;
                self.do_return(value)
            }
            0x09 => {
                if version <= 4 {
                    self.machine.frame.pop()?;
                    Ok(ExecutionResult::Continue)
                } else {
                    let token = self.machine.catch_token();
                    self.store_to(inst, token)?;
                    Ok(ExecutionResult::Continue)
                }
            }
            0x0a => Ok(ExecutionResult::Quit),
            0x0b => {
                self.machine.io.new_line()?;
                Ok(ExecutionResult::Continue)
            }
            0x0c => {
                // show_status is a no-op from V4 on.
                if version <= 3 {
                    self.refresh_status()?;
                }
                Ok(ExecutionResult::Continue)
            }
            0x0d if version >= 3 => {
                let computed = self.machine.memory.checksum();
                let expected = self.machine.header.checksum_file;
                debug!("verify: computed {:04x}, header {:04x}", computed, expected);
                self.do_branch(inst, computed == expected)
            }
            0x0f if version >= 5 => {
                // piracy: be gullible.
                self.do_branch(inst, true)
            }
            _ => Err(unsupported(inst, version)),
        }
    }

    // -- 1OP ---------------------------------------------------------------

    fn execute_1op(&mut self, inst: &Instruction, operand: u16) -> Result<ExecutionResult, String> {
        let version = self.version();
        match inst.opcode {
            0x00 => self.do_branch(inst, operand == 0),
            0x01 => {
                let sibling = self.machine.objects.get_sibling(&self.machine.memory, operand)?;
                self.store_to(inst, sibling)?;
                self.do_branch(inst, sibling != 0)
            }
            0x02 => {
                let child = self.machine.objects.get_child(&self.machine.memory, operand)?;
                self.store_to(inst, child)?;
                self.do_branch(inst, child != 0)
            }
            0x03 => {
                let parent = self.machine.objects.get_parent(&self.machine.memory, operand)?;
                self.store_to(inst, parent)?;
                Ok(ExecutionResult::Continue)
            }
            0x04 => {
                let len = self
                    .machine
                    .objects
                    .get_property_len(&self.machine.memory, operand as usize)?;
                self.store_to(inst, len)?;
                Ok(ExecutionResult::Continue)
            }
            0x05 => {
                let var = operand as u8;
                let value = self.machine.read_variable_indirect(var)?;
                self.machine.write_variable_indirect(var, value.wrapping_add(1))?;
                Ok(ExecutionResult::Continue)
            }
            0x06 => {
                let var = operand as u8;
                let value = self.machine.read_variable_indirect(var)?;
                self.machine.write_variable_indirect(var, value.wrapping_sub(1))?;
                Ok(ExecutionResult::Continue)
            }
            0x07 => {
                let (s, _) = text::decode_string(&self.machine.memory, operand as usize)?;
                self.print_text(&s)?;
                Ok(ExecutionResult::Continue)
            }
            0x08 if version >= 4 => self.do_call(inst, &[operand], CallType::Function),
            0x09 => {
                let parent = self.machine.objects.get_parent(&self.machine.memory, operand)?;
                self.machine
                    .objects
                    .remove_object(&mut self.machine.memory, parent, operand)?;
                Ok(ExecutionResult::Continue)
            }
            0x0a => {
                let name = self
                    .machine
                    .objects
                    .get_object_name(&self.machine.memory, operand)?;
                self.print_text(&name)?;
                Ok(ExecutionResult::Continue)
            }
            0x0b => self.do_return(operand),
            0x0c => {
                let offset = operand as i16;
                self.machine.pc = (self.machine.pc as i64 + offset as i64 - 2) as usize;
                Ok(ExecutionResult::Branched)
            }
            0x0d => {
                let s = text::decode_packed(&self.machine.memory, operand)?;
                self.print_text(&s)?;
                Ok(ExecutionResult::Continue)
            }
            0x0e => {
                let value = self.machine.read_variable_indirect(operand as u8)?;
                self.store_to(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            0x0f => {
                if version <= 4 {
                    let width = inst.operand_types[0] == OperandType::SmallConstant;
                    let value = if width { !operand & 0xff } else { !operand };
                    self.store_to(inst, value)?;
                    Ok(ExecutionResult::Continue)
                } else {
                    self.do_call(inst, &[operand], CallType::Procedure)
                }
            }
            _ => Err(unsupported(inst, version)),
        }
    }

    // -- 2OP ---------------------------------------------------------------

    fn execute_2op(&mut self, inst: &Instruction, operands: &[u16]) -> Result<ExecutionResult, String> {
        let version = self.version();
        if operands.len() < 2 {
            return Err(format!(
                "{} needs two operands, got {}",
                inst.name(version),
                operands.len()
            ));
        }
        let (a, b) = (operands[0], operands[1]);
        match inst.opcode {
            0x01 => {
                let hit = operands[1..].iter().any(|&other| other == a);
                self.do_branch(inst, hit)
            }
            0x02 => self.do_branch(inst, (a as i16) < (b as i16)),
            0x03 => self.do_branch(inst, (a as i16) > (b as i16)),
            0x04 => {
                let var = a as u8;
                let value = self.machine.read_variable_indirect(var)?.wrapping_sub(1);
                self.machine.write_variable_indirect(var, value)?;
                self.do_branch(inst, (value as i16) < (b as i16))
            }
            0x05 => {
                let var = a as u8;
                let value = self.machine.read_variable_indirect(var)?.wrapping_add(1);
                self.machine.write_variable_indirect(var, value)?;
                self.do_branch(inst, (value as i16) > (b as i16))
            }
            0x06 => {
                let parent = self.machine.objects.get_parent(&self.machine.memory, a)?;
                self.do_branch(inst, parent == b)
            }
            0x07 => self.do_branch(inst, a & b == b),
            0x08 => {
                self.store_to(inst, a | b)?;
                Ok(ExecutionResult::Continue)
            }
            0x09 => {
                self.store_to(inst, a & b)?;
                Ok(ExecutionResult::Continue)
            }
            0x0a => {
                let set = self
                    .machine
                    .objects
                    .test_attribute(&self.machine.memory, a, b)?;
                self.do_branch(inst, set)
            }
            0x0b => {
                self.machine
                    .objects
                    .set_attribute(&mut self.machine.memory, a, b, true)?;
                Ok(ExecutionResult::Continue)
            }
            0x0c => {
                self.machine
                    .objects
                    .set_attribute(&mut self.machine.memory, a, b, false)?;
                Ok(ExecutionResult::Continue)
            }
            0x0d => {
                self.machine.write_variable_indirect(a as u8, b)?;
                Ok(ExecutionResult::Continue)
            }
            0x0e => {
                self.machine
                    .objects
                    .insert_object(&mut self.machine.memory, a, b)?;
                Ok(ExecutionResult::Continue)
            }
            0x0f => {
                let addr = self.array_addr(a, b, 2)?;
                let value = self.machine.memory.fetch_word(addr)?;
                self.store_to(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            0x10 => {
                let addr = self.array_addr(a, b, 1)?;
                let value = self.machine.memory.fetch_byte(addr)? as u16;
                self.store_to(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            0x11 => {
                let value = self
                    .machine
                    .objects
                    .get_property(&self.machine.memory, a, b as u8)?;
                self.store_to(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            0x12 => {
                let addr = self
                    .machine
                    .objects
                    .get_property_addr(&self.machine.memory, a, b as u8)?;
                self.store_to(inst, addr as u16)?;
                Ok(ExecutionResult::Continue)
            }
            0x13 => {
                let next = self
                    .machine
                    .objects
                    .get_next_property(&self.machine.memory, a, b as u8)?;
                self.store_to(inst, next as u16)?;
                Ok(ExecutionResult::Continue)
            }
            0x14 => {
                self.store_to(inst, (a as i16).wrapping_add(b as i16) as u16)?;
                Ok(ExecutionResult::Continue)
            }
            0x15 => {
                self.store_to(inst, (a as i16).wrapping_sub(b as i16) as u16)?;
                Ok(ExecutionResult::Continue)
            }
            0x16 => {
                self.store_to(inst, (a as i16).wrapping_mul(b as i16) as u16)?;
                Ok(ExecutionResult::Continue)
            }
            0x17 => {
                if b == 0 {
                    return Err("Division by zero".to_string());
                }
                let value = (a as i16).wrapping_div(b as i16);
                self.store_to(inst, value as u16)?;
                Ok(ExecutionResult::Continue)
            }
            0x18 => {
                // Modulo by zero yields the dividend; otherwise the
                // remainder takes the dividend's sign.
                let value = if b == 0 {
                    a
                } else {
                    (a as i16).wrapping_rem(b as i16) as u16
                };
                self.store_to(inst, value)?;
                Ok(ExecutionResult::Continue)
            }
            0x19 if version >= 4 => self.do_call(inst, &operands[..2], CallType::Function),
            0x1a if version >= 5 => self.do_call(inst, &operands[..2], CallType::Procedure),
            0x1b if version >= 5 => {
                self.machine.io.screen.set_color(a, b).map_err(String::from)?;
                Ok(ExecutionResult::Continue)
            }
            0x1c if version >= 5 => {
                self.machine.unwind_to(b)?;
                self.do_return(a)
            }
            _ => Err(unsupported(inst, version)),
        }
    }
}

/// Fatal message for anything the dispatch tables do not map.
pub fn unsupported(inst: &Instruction, version: u8) -> String {
    match inst.ext_opcode {
        Some(ext) => format!(
            "Unsupported opcode: EXT:{:02x} ({}) in version {}",
            ext,
            inst.name(version),
            version
        ),
        None => format!(
            "Unsupported opcode: {:?}:{:02x} ({}) in version {}",
            inst.operand_count,
            inst.opcode,
            inst.name(version),
            version
        ),
    }
}

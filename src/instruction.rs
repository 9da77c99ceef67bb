use crate::memory::Memory;
use crate::opcode_tables;
use crate::text;
use std::fmt::{Display, Error, Formatter, Write};

/// Operand types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperandType {
    /// Large constant (2 bytes)
    LargeConstant,
    /// Small constant (1 byte)
    SmallConstant,
    /// Variable number
    Variable,
    /// Omitted (not present)
    Omitted,
}

impl OperandType {
    /// Parse operand type from a 2-bit value
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b00 => OperandType::LargeConstant,
            0b01 => OperandType::SmallConstant,
            0b10 => OperandType::Variable,
            _ => OperandType::Omitted,
        }
    }
}

/// Instruction forms
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InstructionForm {
    Long,
    Short,
    Extended,
    Variable,
}

/// Operand count categories
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperandCount {
    OP0,
    OP1,
    OP2,
    VAR,
}

/// Branch information
#[derive(Debug, Clone)]
pub struct BranchInfo {
    /// True if branch on true, false if branch on false
    pub on_true: bool,
    /// Branch offset (0-1 = return false/true, otherwise a jump)
    pub offset: i16,
    /// Encoded length of the branch argument, 1 or 2 bytes. SAVE needs it
    /// to serialize a PC that sits on its own branch data.
    pub length: usize,
}

/// A decoded Z-Machine instruction
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Opcode number within its form
    pub opcode: u8,
    /// Extended opcode for 0xBE instructions
    pub ext_opcode: Option<u8>,
    pub form: InstructionForm,
    pub operand_count: OperandCount,
    /// Operand types (up to 8)
    pub operand_types: Vec<OperandType>,
    /// Raw operand values; variables are still variable numbers here
    pub operands: Vec<u16>,
    /// Variable to store a result into (if the opcode stores)
    pub store_var: Option<u8>,
    pub branch: Option<BranchInfo>,
    /// Decoded inline string for the print opcodes
    pub text: Option<String>,
    /// Total size of the instruction in bytes
    pub size: usize,
}

impl Instruction {
    /// Decode the instruction at `addr`.
    pub fn decode(mem: &Memory, addr: usize, version: u8) -> Result<Self, String> {
        let mut offset = addr;
        let opcode_byte = mem.fetch_byte(offset)?;
        offset += 1;

        // Form from the top two bits; 0xBE is carved out of short form as
        // the extended escape in V5+.
        let form = match opcode_byte >> 6 {
            0b11 => InstructionForm::Variable,
            0b10 => {
                if opcode_byte == 0xbe && version >= 5 {
                    InstructionForm::Extended
                } else {
                    InstructionForm::Short
                }
            }
            _ => InstructionForm::Long,
        };

        let (opcode, ext_opcode, operand_count) = match form {
            InstructionForm::Long => (opcode_byte & 0x1f, None, OperandCount::OP2),
            InstructionForm::Short => {
                let op_count = if (opcode_byte >> 4) & 0x03 == 0x03 {
                    OperandCount::OP0
                } else {
                    OperandCount::OP1
                };
                (opcode_byte & 0x0f, None, op_count)
            }
            InstructionForm::Variable => {
                let op_count = if opcode_byte & 0x20 == 0 {
                    OperandCount::OP2
                } else {
                    OperandCount::VAR
                };
                (opcode_byte & 0x1f, None, op_count)
            }
            InstructionForm::Extended => {
                let ext = mem.fetch_byte(offset)?;
                offset += 1;
                (opcode_byte, Some(ext), OperandCount::VAR)
            }
        };

        // Operand types.
        let mut operand_types = Vec::new();
        match form {
            InstructionForm::Long => {
                // Bits 6 and 5 pick variable vs small constant.
                operand_types.push(if opcode_byte & 0x40 != 0 {
                    OperandType::Variable
                } else {
                    OperandType::SmallConstant
                });
                operand_types.push(if opcode_byte & 0x20 != 0 {
                    OperandType::Variable
                } else {
                    OperandType::SmallConstant
                });
            }
            InstructionForm::Short => {
                if operand_count != OperandCount::OP0 {
                    let op_type = OperandType::from_bits((opcode_byte >> 4) & 0x03);
                    if op_type != OperandType::Omitted {
                        operand_types.push(op_type);
                    }
                }
            }
            InstructionForm::Variable | InstructionForm::Extended => {
                // call_vs2 and call_vn2 carry two type bytes for up to
                // eight operands.
                let type_byte_count =
                    if form == InstructionForm::Variable && (opcode_byte == 0xec || opcode_byte == 0xfa) {
                        2
                    } else {
                        1
                    };
                let mut done = false;
                for _ in 0..type_byte_count {
                    let type_byte = mem.fetch_byte(offset)?;
                    offset += 1;
                    for i in 0..4 {
                        let op_type = OperandType::from_bits(type_byte >> (6 - i * 2));
                        if op_type == OperandType::Omitted {
                            done = true;
                        }
                        if !done {
                            operand_types.push(op_type);
                        }
                    }
                }
            }
        }

        // Operand values.
        let mut operands = Vec::new();
        for op_type in &operand_types {
            match op_type {
                OperandType::LargeConstant => {
                    operands.push(mem.fetch_word(offset)?);
                    offset += 2;
                }
                OperandType::SmallConstant | OperandType::Variable => {
                    operands.push(mem.fetch_byte(offset)? as u16);
                    offset += 1;
                }
                OperandType::Omitted => break,
            }
        }

        // Store byte.
        let store_var =
            if opcode_tables::stores_result(opcode, ext_opcode, form, operand_count, version) {
                let var = mem.fetch_byte(offset)?;
                offset += 1;
                Some(var)
            } else {
                None
            };

        // Branch argument: one byte with a 6-bit unsigned offset, or two
        // bytes with a 14-bit signed one.
        let branch = if opcode_tables::has_branch(opcode, ext_opcode, form, operand_count, version)
        {
            let first = mem.fetch_byte(offset)?;
            offset += 1;
            let on_true = first & 0x80 != 0;
            let (offset_val, length) = if first & 0x40 != 0 {
                ((first & 0x3f) as i16, 1)
            } else {
                let second = mem.fetch_byte(offset)?;
                offset += 1;
                let raw = (((first & 0x3f) as i16) << 8) | second as i16;
                let value = if raw & 0x2000 != 0 {
                    raw | 0xc000u16 as i16
                } else {
                    raw
                };
                (value, 2)
            };
            Some(BranchInfo {
                on_true,
                offset: offset_val,
                length,
            })
        } else {
            None
        };

        // Inline text for the print opcodes.
        let text = if opcode_tables::has_text(opcode, ext_opcode, form, operand_count) {
            let (string, len) = text::decode_string(mem, offset)?;
            offset += len;
            Some(string)
        } else {
            None
        };

        Ok(Instruction {
            opcode,
            ext_opcode,
            form,
            operand_count,
            operand_types,
            operands,
            store_var,
            branch,
            text,
            size: offset - addr,
        })
    }

    /// Human-readable mnemonic, for traces and error messages.
    pub fn name(&self, version: u8) -> &'static str {
        opcode_tables::instruction_name(
            self.opcode,
            self.ext_opcode,
            self.form,
            self.operand_count,
            version,
        )
    }

    /// Format the instruction with version-correct naming.
    pub fn format_with_version(&self, version: u8) -> String {
        let mut result = String::from(self.name(version));
        for (i, op) in self.operands.iter().enumerate() {
            result.push_str(if i == 0 { " " } else { ", " });
            match self.operand_types[i] {
                OperandType::Variable => write!(result, "V{op:02x}").unwrap(),
                _ => write!(result, "#{op:04x}").unwrap(),
            }
        }
        if let Some(var) = self.store_var {
            write!(result, " -> V{var:02x}").unwrap();
        }
        if let Some(ref branch) = self.branch {
            write!(
                result,
                " [{}{}]",
                if branch.on_true { "TRUE" } else { "FALSE" },
                match branch.offset {
                    0 => " RFALSE".to_string(),
                    1 => " RTRUE".to_string(),
                    n => format!(" {n:+}"),
                }
            )
            .unwrap();
        }
        result
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.format_with_version(3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem(version: u8, program: &[u8]) -> Memory {
        let mut bytes = vec![0u8; 0x1000];
        bytes[0] = version;
        bytes[0x0e] = 0x10;
        bytes[0x100..0x100 + program.len()].copy_from_slice(program);
        Memory::new(bytes).unwrap()
    }

    #[test]
    fn operand_type_from_bits() {
        assert_eq!(OperandType::from_bits(0b00), OperandType::LargeConstant);
        assert_eq!(OperandType::from_bits(0b01), OperandType::SmallConstant);
        assert_eq!(OperandType::from_bits(0b10), OperandType::Variable);
        assert_eq!(OperandType::from_bits(0b11), OperandType::Omitted);
    }

    #[test]
    fn decode_long_form_je() {
        // je #34 #78, branch on true to "return false"
        let m = mem(3, &[0x41, 0x34, 0x78, 0xc0]);
        let inst = Instruction::decode(&m, 0x100, 3).unwrap();
        assert_eq!(inst.form, InstructionForm::Long);
        assert_eq!(inst.opcode, 0x01);
        assert_eq!(inst.operands, vec![0x34, 0x78]);
        let branch = inst.branch.unwrap();
        assert!(branch.on_true);
        assert_eq!(branch.offset, 0);
        assert_eq!(branch.length, 1);
        assert_eq!(inst.size, 4);
    }

    #[test]
    fn decode_two_byte_branch_sign_extends() {
        // jz V05 with a 14-bit negative branch offset
        let m = mem(3, &[0xa0, 0x05, 0x3f, 0xf6]);
        let inst = Instruction::decode(&m, 0x100, 3).unwrap();
        let branch = inst.branch.unwrap();
        assert!(!branch.on_true);
        assert_eq!(branch.offset, -10);
        assert_eq!(branch.length, 2);
    }

    #[test]
    fn decode_short_form_jump() {
        let m = mem(3, &[0x9c, 0x34]);
        let inst = Instruction::decode(&m, 0x100, 3).unwrap();
        assert_eq!(inst.form, InstructionForm::Short);
        assert_eq!(inst.opcode, 0x0c);
        assert_eq!(inst.operands, vec![0x34]);
        assert_eq!(inst.size, 2);
    }

    #[test]
    fn decode_variable_form_call() {
        // call #1234 V01 V02 V03 -> stack
        let m = mem(3, &[0xe0, 0x2a, 0x12, 0x34, 0x01, 0x02, 0x03, 0x00]);
        let inst = Instruction::decode(&m, 0x100, 3).unwrap();
        assert_eq!(inst.form, InstructionForm::Variable);
        assert_eq!(inst.operand_count, OperandCount::VAR);
        assert_eq!(inst.operands, vec![0x1234, 0x01, 0x02, 0x03]);
        assert_eq!(inst.store_var, Some(0x00));
        assert_eq!(inst.size, 8);
    }

    #[test]
    fn decode_variable_je_0xc1_takes_many_operands() {
        // je in variable form with three operands and a branch
        let m = mem(3, &[0xc1, 0x57, 0x07, 0x01, 0x02, 0x80 | 0x40 | 0x05]);
        let inst = Instruction::decode(&m, 0x100, 3).unwrap();
        assert_eq!(inst.operand_count, OperandCount::OP2);
        assert_eq!(inst.opcode, 0x01);
        assert_eq!(inst.operands.len(), 3);
        assert!(inst.branch.is_some());
    }

    #[test]
    fn decode_call_vs2_reads_two_type_bytes() {
        // call_vs2 with 5 operands: large + 4 smalls
        let m = mem(
            4,
            &[0xec, 0x15, 0x7f, 0x12, 0x34, 0x01, 0x02, 0x03, 0x04, 0x00],
        );
        let inst = Instruction::decode(&m, 0x100, 4).unwrap();
        assert_eq!(inst.opcode, 0x0c);
        assert_eq!(inst.operands, vec![0x1234, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(inst.store_var, Some(0));
        assert_eq!(inst.size, 10);
    }

    #[test]
    fn omitted_types_stop_later_type_bytes() {
        // call_vs2 where the first type byte ends the list: second type
        // byte is still consumed but contributes nothing.
        let m = mem(4, &[0xec, 0x7f, 0xff, 0x12, 0x00]);
        let inst = Instruction::decode(&m, 0x100, 4).unwrap();
        assert_eq!(inst.operands, vec![0x12]);
        assert_eq!(inst.size, 5);
    }

    #[test]
    fn extended_form_only_in_v5() {
        // 0xbe is variable-form opcode 0x1e in V4
        let m4 = mem(4, &[0xbe, 0x02, 0x5f, 0x04, 0x01, 0x00]);
        let inst = Instruction::decode(&m4, 0x100, 4).unwrap();
        assert_eq!(inst.form, InstructionForm::Short);

        let m5 = mem(5, &[0xbe, 0x02, 0x5f, 0x04, 0x01, 0x00]);
        let inst = Instruction::decode(&m5, 0x100, 5).unwrap();
        assert_eq!(inst.form, InstructionForm::Extended);
        assert_eq!(inst.ext_opcode, Some(0x02));
        assert_eq!(inst.operands, vec![0x04, 0x01]);
        assert_eq!(inst.store_var, Some(0));
    }

    #[test]
    fn decode_inline_text() {
        // print "hi": h=14,i=15 -> word(14,15,5)|end
        let word = 0x8000u16 | (14 << 10) | (15 << 5) | 5;
        let m = mem(3, &[0xb2, (word >> 8) as u8, (word & 0xff) as u8]);
        let inst = Instruction::decode(&m, 0x100, 3).unwrap();
        assert_eq!(inst.text.as_deref(), Some("hi"));
        assert_eq!(inst.size, 3);
    }

    #[test]
    fn decode_past_file_end_is_a_fault() {
        let bytes = {
            let mut b = vec![0u8; 0x101];
            b[0] = 3;
            b[0x0e] = 0x10;
            b[0x100] = 0xe0; // variable call, but the type byte is past EOF
            b
        };
        let m = Memory::new(bytes).unwrap();
        assert!(Instruction::decode(&m, 0x100, 3).is_err());
    }
}

//! Per-opcode facts the decoder needs: does it store, does it branch, does
//! it carry inline text, and what is it called. All version-aware, because
//! several slots changed meaning between V4 and V5.

use crate::instruction::{InstructionForm, OperandCount};
use lazy_static::lazy_static;
use std::collections::HashMap;

/// Which opcode set a decoded (form, count) pair selects.
fn is_2op(form: InstructionForm, count: OperandCount) -> bool {
    matches!(form, InstructionForm::Long)
        || (form == InstructionForm::Variable && count == OperandCount::OP2)
}

/// Does this instruction read a store-variable byte?
pub fn stores_result(
    opcode: u8,
    ext_opcode: Option<u8>,
    form: InstructionForm,
    count: OperandCount,
    version: u8,
) -> bool {
    if form == InstructionForm::Extended {
        return matches!(
            ext_opcode.unwrap_or(0xff),
            0x00 | 0x01 | 0x02 | 0x03 | 0x04 | 0x09 | 0x0a
        );
    }
    if is_2op(form, count) {
        return matches!(opcode, 0x08 | 0x09 | 0x0f..=0x19);
    }
    match count {
        OperandCount::OP1 => match opcode {
            0x01..=0x04 | 0x0e => true,
            0x08 => true,                 // call_1s (V4+)
            0x0f => version <= 4,         // not; call_1n in V5+ does not store
            _ => false,
        },
        OperandCount::OP0 => match opcode {
            0x05 | 0x06 => version == 4,  // save/restore store only in V4
            0x09 => version >= 5,         // catch
            _ => false,
        },
        OperandCount::VAR => match opcode {
            0x00 | 0x07 | 0x0c | 0x16 | 0x17 => true,
            0x04 => version >= 5,         // aread
            0x18 => true,                 // not (V5+)
            _ => false,
        },
        OperandCount::OP2 => false,
    }
}

/// Does this instruction read a branch argument?
pub fn has_branch(
    opcode: u8,
    _ext_opcode: Option<u8>,
    form: InstructionForm,
    count: OperandCount,
    version: u8,
) -> bool {
    if form == InstructionForm::Extended {
        return false;
    }
    if is_2op(form, count) {
        return matches!(opcode, 0x01..=0x07 | 0x0a);
    }
    match count {
        OperandCount::OP1 => matches!(opcode, 0x00..=0x02),
        OperandCount::OP0 => match opcode {
            0x05 | 0x06 => version <= 3, // save/restore branch in V1-3
            0x0d => version >= 3,        // verify
            0x0f => version >= 5,        // piracy
            _ => false,
        },
        OperandCount::VAR => matches!(opcode, 0x17 | 0x1f),
        OperandCount::OP2 => false,
    }
}

/// Does this instruction carry an inline Z-string?
pub fn has_text(opcode: u8, _ext_opcode: Option<u8>, form: InstructionForm, count: OperandCount) -> bool {
    form == InstructionForm::Short && count == OperandCount::OP0 && matches!(opcode, 0x02 | 0x03)
}

lazy_static! {
    static ref EXT_NAMES: HashMap<u8, &'static str> = {
        let mut m = HashMap::new();
        m.insert(0x00, "save");
        m.insert(0x01, "restore");
        m.insert(0x02, "log_shift");
        m.insert(0x03, "art_shift");
        m.insert(0x04, "set_font");
        m.insert(0x05, "draw_picture");
        m.insert(0x06, "picture_data");
        m.insert(0x07, "erase_picture");
        m.insert(0x08, "set_margins");
        m.insert(0x09, "save_undo");
        m.insert(0x0a, "restore_undo");
        m.insert(0x0b, "print_unicode");
        m.insert(0x0c, "check_unicode");
        m.insert(0x10, "move_window");
        m.insert(0x11, "window_size");
        m.insert(0x12, "window_style");
        m.insert(0x13, "get_wind_prop");
        m.insert(0x14, "scroll_window");
        m.insert(0x15, "pop_stack");
        m.insert(0x16, "read_mouse");
        m.insert(0x17, "mouse_window");
        m.insert(0x18, "push_stack");
        m.insert(0x19, "put_wind_prop");
        m.insert(0x1a, "print_form");
        m.insert(0x1b, "make_menu");
        m.insert(0x1c, "picture_table");
        m
    };
}

/// Mnemonic for a decoded instruction.
pub fn instruction_name(
    opcode: u8,
    ext_opcode: Option<u8>,
    form: InstructionForm,
    count: OperandCount,
    version: u8,
) -> &'static str {
    match form {
        InstructionForm::Extended => EXT_NAMES
            .get(&ext_opcode.unwrap_or(0xff))
            .copied()
            .unwrap_or("unknown_ext"),
        _ if is_2op(form, count) => name_2op(opcode),
        _ => match count {
            OperandCount::OP0 => name_0op(opcode, version),
            OperandCount::OP1 => name_1op(opcode, version),
            _ => name_var(opcode, version),
        },
    }
}

fn name_2op(opcode: u8) -> &'static str {
    match opcode {
        0x01 => "je",
        0x02 => "jl",
        0x03 => "jg",
        0x04 => "dec_chk",
        0x05 => "inc_chk",
        0x06 => "jin",
        0x07 => "test",
        0x08 => "or",
        0x09 => "and",
        0x0a => "test_attr",
        0x0b => "set_attr",
        0x0c => "clear_attr",
        0x0d => "store",
        0x0e => "insert_obj",
        0x0f => "loadw",
        0x10 => "loadb",
        0x11 => "get_prop",
        0x12 => "get_prop_addr",
        0x13 => "get_next_prop",
        0x14 => "add",
        0x15 => "sub",
        0x16 => "mul",
        0x17 => "div",
        0x18 => "mod",
        0x19 => "call_2s",
        0x1a => "call_2n",
        0x1b => "set_colour",
        0x1c => "throw",
        _ => "unknown_2op",
    }
}

fn name_1op(opcode: u8, version: u8) -> &'static str {
    match opcode {
        0x00 => "jz",
        0x01 => "get_sibling",
        0x02 => "get_child",
        0x03 => "get_parent",
        0x04 => "get_prop_len",
        0x05 => "inc",
        0x06 => "dec",
        0x07 => "print_addr",
        0x08 => "call_1s",
        0x09 => "remove_obj",
        0x0a => "print_obj",
        0x0b => "ret",
        0x0c => "jump",
        0x0d => "print_paddr",
        0x0e => "load",
        0x0f => {
            if version <= 4 {
                "not"
            } else {
                "call_1n"
            }
        }
        _ => "unknown_1op",
    }
}

fn name_0op(opcode: u8, version: u8) -> &'static str {
    match opcode {
        0x00 => "rtrue",
        0x01 => "rfalse",
        0x02 => "print",
        0x03 => "print_ret",
        0x04 => "nop",
        0x05 => "save",
        0x06 => "restore",
        0x07 => "restart",
        0x08 => "ret_popped",
        0x09 => {
            if version <= 4 {
                "pop"
            } else {
                "catch"
            }
        }
        0x0a => "quit",
        0x0b => "new_line",
        0x0c => "show_status",
        0x0d => "verify",
        0x0e => "extended",
        0x0f => "piracy",
        _ => "unknown_0op",
    }
}

fn name_var(opcode: u8, version: u8) -> &'static str {
    match opcode {
        0x00 => {
            if version <= 3 {
                "call"
            } else {
                "call_vs"
            }
        }
        0x01 => "storew",
        0x02 => "storeb",
        0x03 => "put_prop",
        0x04 => {
            if version <= 4 {
                "sread"
            } else {
                "aread"
            }
        }
        0x05 => "print_char",
        0x06 => "print_num",
        0x07 => "random",
        0x08 => "push",
        0x09 => "pull",
        0x0a => "split_window",
        0x0b => "set_window",
        0x0c => "call_vs2",
        0x0d => "erase_window",
        0x0e => "erase_line",
        0x0f => "set_cursor",
        0x10 => "get_cursor",
        0x11 => "set_text_style",
        0x12 => "buffer_mode",
        0x13 => "output_stream",
        0x14 => "input_stream",
        0x15 => "sound_effect",
        0x16 => "read_char",
        0x17 => "scan_table",
        0x18 => "not",
        0x19 => "call_vn",
        0x1a => "call_vn2",
        0x1b => "tokenise",
        0x1c => "encode_text",
        0x1d => "copy_table",
        0x1e => "print_table",
        0x1f => "check_arg_count",
        _ => "unknown_var",
    }
}

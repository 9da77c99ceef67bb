//! End-to-end execution tests: small hand-assembled story images driven
//! through the full decode loop.

use crate::interpreter::{Interpreter, Outcome};
use crate::machine::Machine;
use crate::test_utils::{build_machine, screen_output};
use crate::zobject::ObjectTable;
use test_log::test;

/// Give a machine a V3 object table at 0x0200 with the tree
/// 3 -> (7 -> 8 -> 9) and an unparented object 2.
fn install_objects(machine: &mut Machine) {
    let base = 0x0200usize;
    machine.memory.put_word(0x0a, base as u16).unwrap();
    machine.header.object_table_addr = base as u16;
    machine.objects = ObjectTable::new(base as u16, 3);
    let entry = |n: usize| base + 62 + (n - 1) * 9;
    machine.memory.put_byte(entry(3) + 6, 7).unwrap();
    machine.memory.put_byte(entry(7) + 4, 3).unwrap();
    machine.memory.put_byte(entry(7) + 5, 8).unwrap();
    machine.memory.put_byte(entry(8) + 4, 3).unwrap();
    machine.memory.put_byte(entry(8) + 5, 9).unwrap();
    machine.memory.put_byte(entry(9) + 4, 3).unwrap();
}

#[test]
fn object_opcodes_drive_the_tree() {
    // insert_obj 8 2; set_attr 8 3; jin 8 2 [TRUE +4] quit;
    // test_attr 8 3 [TRUE +4] quit; store G0 1; quit
    let program = &[
        0x0e, 0x08, 0x02, // insert_obj
        0x0b, 0x08, 0x03, // set_attr
        0x06, 0x08, 0x02, 0xc4, // jin [TRUE -> 0x200c]
        0xba, 0x00, // quit (jin fell through)
        0x0a, 0x08, 0x03, 0xc4, // test_attr [TRUE -> 0x2012]
        0xba, 0x00, // quit (attribute missing)
        0x0d, 0x10, 0x01, // store G0 1
        0xba,
    ];
    let mut machine = build_machine(3, program);
    install_objects(&mut machine);
    let mut interp = Interpreter::new(machine);
    assert_eq!(interp.run_with_limit(Some(50)).unwrap(), Outcome::Quit);
    assert_eq!(interp.machine.memory.fetch_word(0x100).unwrap(), 1);

    let m = &interp.machine;
    assert_eq!(m.objects.get_parent(&m.memory, 8).unwrap(), 2);
    assert_eq!(m.objects.get_child(&m.memory, 2).unwrap(), 8);
    // The old chain reads 7 -> 9 now.
    assert_eq!(m.objects.get_child(&m.memory, 3).unwrap(), 7);
    assert_eq!(m.objects.get_sibling(&m.memory, 7).unwrap(), 9);
}

#[test]
fn print_paddr_unpacks_by_version() {
    // print_paddr #0x0c00 ; quit — the string lives at 0x1800 in a V3 image.
    let program = &[0x8d, 0x0c, 0x00, 0xba];
    let mut machine = build_machine(3, program);
    let word = 0x8000u16 | (14 << 10) | (15 << 5) | 5; // "hi"
    machine.memory.put_word(0x1800, word).unwrap();
    let mut interp = Interpreter::new(machine);
    interp.run_with_limit(Some(10)).unwrap();
    assert_eq!(screen_output(&interp.machine), "hi");
}

#[test]
fn output_stream_three_captures_prints() {
    // output_stream 3 #0x0900; print "hi"; output_stream -3; print "hi"; quit
    let word = 0x8000u16 | (14 << 10) | (15 << 5) | 5;
    let program = &[
        0xf3, 0x4f, 0x03, 0x09, 0x00, // output_stream 3 table
        0xb2, (word >> 8) as u8, (word & 0xff) as u8, // print "hi"
        0xf3, 0x3f, 0xff, 0xfd, // output_stream -3
        0xb2, (word >> 8) as u8, (word & 0xff) as u8, // print "hi"
        0xba,
    ];
    let machine = build_machine(3, program);
    let mut interp = Interpreter::new(machine);
    assert_eq!(interp.run_with_limit(Some(20)).unwrap(), Outcome::Quit);
    // The first print went into the table, only the second to the screen.
    assert_eq!(interp.machine.memory.fetch_word(0x900).unwrap(), 2);
    assert_eq!(interp.machine.memory.dump(0x902, 2).unwrap(), b"hi");
    assert_eq!(screen_output(&interp.machine), "hi");
}

#[test]
fn verify_checks_the_checksum() {
    // verify [TRUE +6]; store G0 1; quit; store G0 2; quit
    let program = &[
        0xbd, 0xc6, // verify
        0x0d, 0x10, 0x01, // store G0 1
        0xba, // quit
        0x0d, 0x10, 0x02, // store G0 2
        0xba,
    ];
    let mut machine = build_machine(3, program);
    // File length 0x80 bytes; everything in 0x40..0x80 is zero, so the
    // checksum is zero, which is what the header claims.
    machine.memory.put_word(0x1a, 0x40).unwrap();
    let mut interp = Interpreter::new(machine);
    interp.run_with_limit(Some(10)).unwrap();
    assert_eq!(interp.machine.memory.fetch_word(0x100).unwrap(), 2);

    // Break the recorded checksum: verify now falls through.
    let mut machine = build_machine(3, program);
    machine.memory.put_word(0x1a, 0x40).unwrap();
    machine.memory.put_word(0x1c, 0xbeef).unwrap();
    machine.header.checksum_file = 0xbeef;
    let mut interp = Interpreter::new(machine);
    interp.run_with_limit(Some(10)).unwrap();
    assert_eq!(interp.machine.memory.fetch_word(0x100).unwrap(), 1);
}

#[test]
fn restart_resets_dynamic_memory_but_keeps_transcript_bit() {
    // store G0 5; restart
    let program = &[0x0d, 0x10, 0x05, 0xb7];
    let mut machine = build_machine(3, program);
    machine.memory.put_word(0x10, 0x0001).unwrap(); // transcript on
    let mut interp = Interpreter::new(machine);
    assert_eq!(interp.run_with_limit(Some(10)).unwrap(), Outcome::Restart);
    assert_eq!(interp.machine.memory.fetch_word(0x100).unwrap(), 5);

    interp.machine.restart().unwrap();
    assert_eq!(interp.machine.memory.fetch_word(0x100).unwrap(), 0);
    assert_eq!(interp.machine.memory.fetch_word(0x10).unwrap() & 1, 1);
    assert_eq!(interp.machine.pc, 0x2000);
    assert!(interp.machine.frames.is_empty());
}

#[test]
fn nested_calls_to_three_levels_return_in_order() {
    // main: call 0x840 -> G0; quit
    // A: call 0x850 -> stack; add stack #1 -> stack... simpler:
    // A: call 0x850 -> L01; add L01 #1 -> L01... use ret (add later).
    let mut machine = build_machine(3, &[0xe0, 0x3f, 0x08, 0x40, 0x10, 0xba]);
    // Routine A at 0x1080: 1 local; call B -> L01; add L01 #10 -> L01; ret L01
    let a = 0x1080usize;
    machine.memory.put_byte(a, 1).unwrap();
    machine.memory.put_word(a + 1, 0).unwrap();
    machine.memory.put_byte(a + 3, 0xe0).unwrap(); // call
    machine.memory.put_byte(a + 4, 0x3f).unwrap(); // one large operand
    machine.memory.put_word(a + 5, 0x0848).unwrap(); // routine B packed
    machine.memory.put_byte(a + 7, 0x01).unwrap(); // -> L01
    machine.memory.put_byte(a + 8, 0x54).unwrap(); // add L01 #10 (var,small)
    machine.memory.put_byte(a + 9, 0x01).unwrap();
    machine.memory.put_byte(a + 10, 0x0a).unwrap();
    machine.memory.put_byte(a + 11, 0x01).unwrap(); // -> L01
    machine.memory.put_byte(a + 12, 0xab).unwrap(); // ret L01
    machine.memory.put_byte(a + 13, 0x01).unwrap();
    // Routine B at 0x1090: no locals; ret #32
    let b = 0x1090usize;
    machine.memory.put_byte(b, 0).unwrap();
    machine.memory.put_byte(b + 1, 0x9b).unwrap(); // ret small constant
    machine.memory.put_byte(b + 2, 32).unwrap();
    let mut interp = Interpreter::new(machine);
    assert_eq!(interp.run_with_limit(Some(50)).unwrap(), Outcome::Quit);
    assert_eq!(interp.machine.memory.fetch_word(0x100).unwrap(), 42);
}

#[test]
fn frame_numbers_grow_with_depth() {
    let mut machine = build_machine(3, &[0xba]);
    machine.memory.put_byte(0x1080, 0).unwrap();
    machine.pc = 0x2000;
    assert_eq!(machine.frame.frame_number, 0);
    machine
        .call_routine(0x840, &[], crate::frame::CallType::Procedure)
        .unwrap();
    assert_eq!(machine.frame.frame_number, 1);
    machine
        .call_routine(0x840, &[], crate::frame::CallType::Procedure)
        .unwrap();
    assert_eq!(machine.frame.frame_number, 2);
}

#[test]
fn v8_story_unpacks_routine_addresses_by_eight() {
    // call 0x210 -> G0; quit. 0x210 * 8 = 0x1080.
    let mut machine = build_machine(8, &[0xe0, 0x3f, 0x02, 0x10, 0x10, 0xba]);
    machine.memory.put_byte(0x1080, 0).unwrap(); // no locals (V8 zeroes them)
    machine.memory.put_byte(0x1081, 0x9b).unwrap(); // ret #9
    machine.memory.put_byte(0x1082, 9).unwrap();
    let mut interp = Interpreter::new(machine);
    interp.run_with_limit(Some(10)).unwrap();
    assert_eq!(interp.machine.memory.fetch_word(0x100).unwrap(), 9);
}

#[test]
fn version_six_stories_are_rejected() {
    let mut bytes = vec![0u8; 0x1000];
    bytes[0] = 6;
    bytes[0x0e] = 0x04;
    let err = Machine::new(bytes, Box::new(crate::screen::HeadlessScreen::new())).unwrap_err();
    assert!(err.contains("version"), "{err}");
}

#[test]
fn piracy_branches_gullibly() {
    // V5: piracy [TRUE +4]; quit; store G0 1; quit
    let program = &[0xbf, 0xc4, 0xba, 0x00, 0x0d, 0x10, 0x01, 0xba];
    let machine = build_machine(5, program);
    let mut interp = Interpreter::new(machine);
    interp.run_with_limit(Some(10)).unwrap();
    assert_eq!(interp.machine.memory.fetch_word(0x100).unwrap(), 1);
}

#[test]
fn ret_popped_returns_the_stack_top() {
    // call 0x840 -> G0; quit. Routine: push #21; ret_popped
    let mut machine = build_machine(3, &[0xe0, 0x3f, 0x08, 0x40, 0x10, 0xba]);
    machine.memory.put_byte(0x1080, 0).unwrap();
    machine.memory.put_byte(0x1081, 0xe8).unwrap(); // push
    machine.memory.put_byte(0x1082, 0x7f).unwrap();
    machine.memory.put_byte(0x1083, 21).unwrap();
    machine.memory.put_byte(0x1084, 0xb8).unwrap(); // ret_popped
    let mut interp = Interpreter::new(machine);
    interp.run_with_limit(Some(20)).unwrap();
    assert_eq!(interp.machine.memory.fetch_word(0x100).unwrap(), 21);
}

#[test]
fn signed_division_identity_holds() {
    // div G0 G1 -> G2; mod G0 G1 -> G3; quit
    let program = &[
        0xd7, 0xaf, 0x10, 0x11, 0x12, // div
        0xd8, 0xaf, 0x10, 0x11, 0x13, // mod
        0xba,
    ];
    for (a, b) in [
        (13i16, 4i16),
        (-13, 4),
        (13, -4),
        (-13, -4),
        (32767, -1),
        (-32768, 1),
        (7, 7),
        (-1, 3),
    ] {
        let machine = build_machine(3, program);
        let mut interp = Interpreter::new(machine);
        interp.machine.write_variable(16, a as u16).unwrap();
        interp.machine.write_variable(17, b as u16).unwrap();
        assert_eq!(interp.run_with_limit(Some(10)).unwrap(), Outcome::Quit);
        let q = interp.machine.read_variable(18).unwrap() as i16;
        let r = interp.machine.read_variable(19).unwrap() as i16;
        assert_eq!(q.wrapping_mul(b).wrapping_add(r), a, "a={a} b={b}");
        // The remainder is zero or takes the dividend's sign.
        assert!(r == 0 || (r < 0) == (a < 0), "a={a} b={b} r={r}");
    }
}

#[test]
fn routine_stacks_are_private_to_each_frame() {
    // main pushes #7, calls a routine that pops (underflow), which is fatal.
    let mut machine = build_machine(3, &[
        0xe8, 0x7f, 0x07, // push 7
        0xe0, 0x3f, 0x08, 0x40, 0x10, // call 0x840 -> G0
        0xba,
    ]);
    machine.memory.put_byte(0x1080, 0).unwrap();
    machine.memory.put_byte(0x1081, 0xb8).unwrap(); // ret_popped on empty stack
    let mut interp = Interpreter::new(machine);
    let err = interp.run_with_limit(Some(20)).unwrap_err();
    assert!(err.contains("underflow"), "{err}");
}

//! Shared helpers for the test suite: synthetic story images with a
//! header, a globals table, and a program planted at the initial PC.

use crate::machine::Machine;
use crate::screen::HeadlessScreen;

/// A minimal story image: globals at 0x0100, static base 0x1000, program
/// at 0x2000. Routines used by tests usually live at 0x1080 and up.
pub fn build_machine(version: u8, program: &[u8]) -> Machine {
    let mut bytes = vec![0u8; 0x4000];
    bytes[0x00] = version;
    bytes[0x06] = 0x20; // initial pc 0x2000
    bytes[0x07] = 0x00;
    bytes[0x0c] = 0x01; // globals at 0x0100
    bytes[0x0e] = 0x10; // static base 0x1000
    bytes[0x2000..0x2000 + program.len()].copy_from_slice(program);
    Machine::new(bytes, Box::new(HeadlessScreen::new())).unwrap()
}

/// Everything the headless screen has printed so far.
pub fn screen_output(machine: &Machine) -> String {
    machine
        .io
        .screen
        .as_any()
        .downcast_ref::<HeadlessScreen>()
        .unwrap()
        .output()
        .to_string()
}

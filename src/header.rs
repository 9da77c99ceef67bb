use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

/// Read a big-endian header word out of the raw image.
pub fn get_mem_addr(bytes: &[u8], offset: usize) -> u16 {
    ((bytes[offset] as u16) << 8) | bytes[offset + 1] as u16
}

/// The parsed story-file header. Parsed once at load; everything here is a
/// cached copy of the fixed-offset fields, the image itself stays the truth.
pub struct Header {
    pub version: u8,
    pub flags1: u8,
    pub release: u16,
    pub serial: String,
    pub base_high_mem: u16,
    pub base_static_mem: u16,
    pub initial_pc: u16,
    pub dictionary: u16,
    pub object_table_addr: u16,
    pub global_variables: u16,
    pub abbrev_table: u16,
    pub len_file: usize,
    pub checksum_file: u16,
    pub interpreter_number_and_version: u16,
    /// Terminating-characters table, V5+ (0 = none)
    pub terminating_chars: u16,
    /// Custom alphabet table, V5+ (0 = built-in alphabets)
    pub alphabet_table: u16,
    pub routine_offset: u16,
    pub string_offset: u16,
}

impl Header {
    pub fn new(bytes: &[u8]) -> Result<Header, String> {
        if bytes.len() < 64 {
            return Err("Story file too small for header".to_string());
        }
        let version = bytes[0];
        match version {
            1..=5 | 7 | 8 => {}
            6 => return Err("Unsupported story file version: 6".to_string()),
            v => return Err(format!("Unsupported story file version: {v}")),
        }

        let len_scale = match version {
            1..=3 => 2,
            4 | 5 => 4,
            _ => 8,
        };

        Ok(Header {
            version,
            flags1: bytes[1],
            release: get_mem_addr(bytes, 2),
            serial: bytes[0x12..0x18].iter().map(|&b| b as char).collect(),
            base_high_mem: get_mem_addr(bytes, 4),
            base_static_mem: get_mem_addr(bytes, 0x0e),
            initial_pc: get_mem_addr(bytes, 6),
            dictionary: get_mem_addr(bytes, 0x08),
            object_table_addr: get_mem_addr(bytes, 0x0a),
            global_variables: get_mem_addr(bytes, 0x0c),
            abbrev_table: get_mem_addr(bytes, 0x18),
            len_file: get_mem_addr(bytes, 0x1a) as usize * len_scale,
            checksum_file: get_mem_addr(bytes, 0x1c),
            interpreter_number_and_version: get_mem_addr(bytes, 0x1e),
            terminating_chars: get_mem_addr(bytes, 0x2e),
            alphabet_table: get_mem_addr(bytes, 0x34),
            routine_offset: get_mem_addr(bytes, 0x28),
            string_offset: get_mem_addr(bytes, 0x2a),
        })
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "
Z-code version:           {}
Release number:           {}
Size of resident memory:  {:#06x}
Start PC:                 {:#06x}
Dictionary address:       {:#06x}
Object table address:     {:#06x}
Global variables address: {:#06x}
Size of dynamic memory:   {:#06x}
Serial number:            {}
Abbreviations address:    {:#06x}
File size:                {:#06x}
Checksum:                 {:#06x}
",
            self.version,
            self.release,
            self.base_high_mem,
            self.initial_pc,
            self.dictionary,
            self.object_table_addr,
            self.global_variables,
            self.base_static_mem,
            self.serial,
            self.abbrev_table,
            self.len_file,
            self.checksum_file,
        )
    }
}

use log::debug;

/// Kinds of packed address. V6-7 unpack routines and strings with
/// different header offsets, so the caller has to say which it wants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PackedKind {
    Routine,
    ZString,
}

/// The story image: one flat byte buffer plus the cached layout facts
/// needed to police access and unpack addresses.
pub struct Memory {
    bytes: Vec<u8>,
    /// Pristine copy of the image, kept for RESTART and checksum verification
    pristine: Vec<u8>,
    /// First byte above dynamic memory (header word 0x0E)
    dynamic_size: usize,
    version: u8,
    /// Routine offset (header word 0x28), in 8-byte units, V6-7 only
    routine_offset: u16,
    /// String offset (header word 0x2A), in 8-byte units, V6-7 only
    string_offset: u16,
}

impl Memory {
    /// Wrap a loaded story image. The header must already have passed
    /// version validation; this only needs enough of it to unpack addresses.
    pub fn new(bytes: Vec<u8>) -> Result<Self, String> {
        if bytes.len() < 64 {
            return Err("Story file too small for header".to_string());
        }
        let version = bytes[0];
        let dynamic_size = (((bytes[0x0e] as usize) << 8) | bytes[0x0f] as usize).min(bytes.len());
        let routine_offset = ((bytes[0x28] as u16) << 8) | bytes[0x29] as u16;
        let string_offset = ((bytes[0x2a] as u16) << 8) | bytes[0x2b] as u16;
        let pristine = bytes.clone();

        Ok(Memory {
            bytes,
            pristine,
            dynamic_size,
            version,
            routine_offset,
            string_offset,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn dynamic_size(&self) -> usize {
        self.dynamic_size
    }

    pub fn pristine_bytes(&self) -> &[u8] {
        &self.pristine
    }

    /// Read a byte. Any address at or past the end of the file is a fault.
    pub fn fetch_byte(&self, addr: usize) -> Result<u8, String> {
        self.bytes
            .get(addr)
            .copied()
            .ok_or_else(|| format!("Memory fault: read byte at {:05x} beyond file end", addr))
    }

    /// Read a big-endian word.
    pub fn fetch_word(&self, addr: usize) -> Result<u16, String> {
        if addr + 1 >= self.bytes.len() {
            return Err(format!(
                "Memory fault: read word at {:05x} beyond file end",
                addr
            ));
        }
        Ok(((self.bytes[addr] as u16) << 8) | self.bytes[addr + 1] as u16)
    }

    /// Write a byte. The dynamic/static boundary is not policed here; the
    /// bytecode is trusted input and the only hard rule is the file end.
    pub fn put_byte(&mut self, addr: usize, value: u8) -> Result<(), String> {
        if addr >= self.bytes.len() {
            return Err(format!(
                "Memory fault: write byte at {:05x} beyond file end",
                addr
            ));
        }
        self.bytes[addr] = value;
        Ok(())
    }

    /// Write a big-endian word.
    pub fn put_word(&mut self, addr: usize, value: u16) -> Result<(), String> {
        if addr + 1 >= self.bytes.len() {
            return Err(format!(
                "Memory fault: write word at {:05x} beyond file end",
                addr
            ));
        }
        self.bytes[addr] = (value >> 8) as u8;
        self.bytes[addr + 1] = (value & 0xff) as u8;
        Ok(())
    }

    /// Copy a range out of the image (used by the state serializer).
    pub fn dump(&self, start: usize, len: usize) -> Result<Vec<u8>, String> {
        if start + len > self.bytes.len() {
            return Err(format!(
                "Memory fault: dump of {:05x}..{:05x} beyond file end",
                start,
                start + len
            ));
        }
        Ok(self.bytes[start..start + len].to_vec())
    }

    /// Copy bytes into the image (used by the state serializer).
    pub fn load(&mut self, start: usize, data: &[u8]) -> Result<(), String> {
        if start + data.len() > self.bytes.len() {
            return Err(format!(
                "Memory fault: load of {:05x}..{:05x} beyond file end",
                start,
                start + data.len()
            ));
        }
        self.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Restore dynamic memory from the pristine image for RESTART, keeping
    /// the transcript and fixed-font bits of flags2 as the saved game rules
    /// require.
    pub fn reset_dynamic(&mut self) {
        let keep = self.flags2_preserved_bits();
        let n = self.dynamic_size;
        self.bytes[..n].copy_from_slice(&self.pristine[..n]);
        let flags2 = ((self.bytes[0x10] as u16) << 8 | self.bytes[0x11] as u16) & !0x0003 | keep;
        self.bytes[0x10] = (flags2 >> 8) as u8;
        self.bytes[0x11] = (flags2 & 0xff) as u8;
        debug!("dynamic memory reset ({} bytes), flags2 bits kept {:04x}", n, keep);
    }

    /// The low two bits of flags2 (transcripting, force fixed pitch) survive
    /// both RESTART and RESTORE.
    pub fn flags2_preserved_bits(&self) -> u16 {
        (((self.bytes[0x10] as u16) << 8) | self.bytes[0x11] as u16) & 0x0003
    }

    /// Unpack a packed routine or string address to a byte address.
    pub fn unpack(&self, packed: u16, kind: PackedKind) -> usize {
        let p = packed as usize;
        match self.version {
            1..=3 => p * 2,
            4 | 5 => p * 4,
            6 | 7 => {
                let offset = match kind {
                    PackedKind::Routine => self.routine_offset as usize,
                    PackedKind::ZString => self.string_offset as usize,
                };
                p * 4 + offset * 8
            }
            _ => p * 8,
        }
    }

    /// Checksum over bytes 0x40..file-length of the pristine image, mod
    /// 0x10000, as VERIFY expects.
    pub fn checksum(&self) -> u16 {
        let file_len =
            ((((self.pristine[0x1a] as usize) << 8) | self.pristine[0x1b] as usize) * scale(self.version))
                .min(self.pristine.len());
        let mut sum = 0u16;
        for &b in &self.pristine[0x40..file_len.max(0x40)] {
            sum = sum.wrapping_add(b as u16);
        }
        sum
    }
}

/// File-length units in the header are version dependent.
fn scale(version: u8) -> usize {
    match version {
        1..=3 => 2,
        4 | 5 => 4,
        _ => 8,
    }
}

use crate::memory::{Memory, PackedKind};
use bitreader::BitReader;
use log::{debug, trace};

/// The built-in alphabet rows, indexed by Z-characters 6..=31. Position 0
/// of A2 stands in for the ZSCII escape and position 1 of the V2+ row for
/// newline; both are handled before the table lookup.
pub const ALPHABET_A0: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const ALPHABET_A1: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALPHABET_A2: &[u8] = b" \r0123456789.,!?_#'\"/\\-:()";
const ALPHABET_A2_V1: &[u8] = b" 0123456789.,!?_#'\"/\\<-:()";

/// How many Z-characters a dictionary word holds: 6 in V1-3, 9 in V4+.
pub fn dictionary_resolution(version: u8) -> usize {
    if version <= 3 {
        6
    } else {
        9
    }
}

/// Split one Z-string word into its end flag and three 5-bit Z-characters.
fn split_word(bytes: [u8; 2]) -> Result<(bool, [u8; 3]), String> {
    let mut br = BitReader::new(&bytes);
    let last = br
        .read_u8(1)
        .map_err(|e| format!("Z-string word read failed: {e}"))?
        == 1;
    let mut chars = [0u8; 3];
    for c in chars.iter_mut() {
        *c = br
            .read_u8(5)
            .map_err(|e| format!("Z-string word read failed: {e}"))?;
    }
    Ok((last, chars))
}

/// Resolve the three alphabet rows for this story: the built-in tables, or
/// the custom table from header word 0x34 in V5+.
fn alphabet_rows(mem: &Memory) -> Result<[[u8; 26]; 3], String> {
    let version = mem.fetch_byte(0)?;
    let mut rows = [[0u8; 26]; 3];
    rows[0].copy_from_slice(ALPHABET_A0);
    rows[1].copy_from_slice(ALPHABET_A1);
    rows[2].copy_from_slice(if version == 1 { ALPHABET_A2_V1 } else { ALPHABET_A2 });

    if version >= 5 {
        let table = mem.fetch_word(0x34)? as usize;
        if table != 0 {
            for (row, chunk) in rows.iter_mut().enumerate() {
                for (i, slot) in chunk.iter_mut().enumerate() {
                    *slot = mem.fetch_byte(table + row * 26 + i)?;
                }
            }
            // Escape and newline keep their fixed meanings even under a
            // custom table.
            rows[2][0] = b' ';
            rows[2][1] = b'\r';
        }
    }
    Ok(rows)
}

/// Map a ZSCII code to an output character.
fn zscii_to_char(code: u16) -> char {
    match code {
        13 => '\n',
        32..=126 => (code as u8) as char,
        _ => {
            trace!("ZSCII code {} outside the printable range", code);
            '?'
        }
    }
}

/// Decode a Z-string from memory starting at the given byte address.
/// Returns the decoded string and the number of bytes consumed.
pub fn decode_string(mem: &Memory, addr: usize) -> Result<(String, usize), String> {
    decode_with_depth(mem, addr, 0)
}

/// Decode the string at a packed address.
pub fn decode_packed(mem: &Memory, packed: u16) -> Result<String, String> {
    let addr = mem.unpack(packed, PackedKind::ZString);
    let (s, _) = decode_string(mem, addr)?;
    Ok(s)
}

fn decode_with_depth(mem: &Memory, addr: usize, depth: u8) -> Result<(String, usize), String> {
    let version = mem.fetch_byte(0)?;
    let rows = alphabet_rows(mem)?;
    let abbrev_table = mem.fetch_word(0x18)? as usize;

    // Collect the whole Z-character stream first; shifts and escapes are
    // easier to interpret over the flat sequence.
    let mut zchars = Vec::new();
    let mut offset = addr;
    loop {
        let hi = mem.fetch_byte(offset)?;
        let lo = mem.fetch_byte(offset + 1)?;
        offset += 2;
        let (last, chars) = split_word([hi, lo])?;
        zchars.extend_from_slice(&chars);
        if last {
            break;
        }
    }

    let mut result = String::new();
    // Alphabet state: `current` applies to the next character only, then
    // reverts to `locked`. Locking shifts (V1-2) move both.
    let mut current = 0usize;
    let mut locked = 0usize;

    let mut i = 0;
    while i < zchars.len() {
        let zc = zchars[i];
        i += 1;

        // Abbreviation markers: Z-char 1 in V2, 1-3 in V3+.
        let abbrev_set = match zc {
            1 if version == 2 => Some(1u8),
            1..=3 if version >= 3 => Some(zc),
            _ => None,
        };
        if let Some(set) = abbrev_set {
            let Some(&index) = zchars.get(i) else { break };
            i += 1;
            if depth > 0 {
                debug!("nested abbreviation ignored at {:05x}", addr);
                continue;
            }
            let entry = abbrev_table + ((set as usize - 1) * 32 + index as usize) * 2;
            let string_addr = mem.fetch_word(entry)? as usize * 2;
            let (expansion, _) = decode_with_depth(mem, string_addr, depth + 1)?;
            result.push_str(&expansion);
            current = locked;
            continue;
        }

        match zc {
            0 => result.push(' '),
            1 => {
                // V1 only reaches here: Z-char 1 is newline.
                result.push('\n');
            }
            2 | 3 if version <= 2 => {
                // Temporary shift up/down.
                current = if zc == 2 { (current + 1) % 3 } else { (current + 2) % 3 };
                continue;
            }
            4 | 5 if version <= 2 => {
                // Locking shift up/down.
                locked = if zc == 4 { (locked + 1) % 3 } else { (locked + 2) % 3 };
                current = locked;
                continue;
            }
            4 => {
                current = 1;
                continue;
            }
            5 => {
                current = 2;
                continue;
            }
            6..=31 => {
                if current == 2 && zc == 6 {
                    // ZSCII escape: next two Z-chars form a ten-bit code.
                    if i + 1 < zchars.len() {
                        let code = ((zchars[i] as u16) << 5) | zchars[i + 1] as u16;
                        i += 2;
                        result.push(zscii_to_char(code));
                    } else {
                        debug!("ZSCII escape truncated at end of string {:05x}", addr);
                    }
                } else if current == 2 && zc == 7 && version >= 2 {
                    result.push('\n');
                } else {
                    result.push(rows[current][(zc - 6) as usize] as char);
                }
                current = locked;
            }
            _ => unreachable!(),
        }
    }

    Ok((result, offset - addr))
}

/// Encode a string as a raw Z-character sequence, shifts included.
pub fn encode_zchars(mem: &Memory, s: &str) -> Result<Vec<u8>, String> {
    let version = mem.fetch_byte(0)?;
    let rows = alphabet_rows(mem)?;
    let shift_a1: u8 = if version <= 2 { 2 } else { 4 };
    let shift_a2: u8 = if version <= 2 { 3 } else { 5 };

    let mut out = Vec::new();
    for ch in s.chars() {
        if ch == ' ' {
            out.push(0);
            continue;
        }
        if ch == '\n' {
            if version == 1 {
                out.push(1);
            } else {
                out.push(shift_a2);
                out.push(7);
            }
            continue;
        }
        let b = if ch.is_ascii() { ch as u8 } else { b'?' };
        // The first A2 slot is the escape; V2+ also reserves slot 1 for
        // newline, V1 starts its printable characters there.
        let a2_start = if version == 1 { 1 } else { 2 };
        if let Some(pos) = rows[0].iter().position(|&c| c == b) {
            out.push(pos as u8 + 6);
        } else if let Some(pos) = rows[1].iter().position(|&c| c == b) {
            out.push(shift_a1);
            out.push(pos as u8 + 6);
        } else if let Some(pos) = rows[2][a2_start..].iter().position(|&c| c == b) {
            out.push(shift_a2);
            out.push(pos as u8 + 6 + a2_start as u8);
        } else {
            // Ten-bit ZSCII literal.
            out.push(shift_a2);
            out.push(6);
            out.push((b >> 5) & 0x1f);
            out.push(b & 0x1f);
        }
    }
    Ok(out)
}

/// Pack Z-characters into words, three per word, padding the tail with
/// Z-char 5 and setting the end flag on the last word.
pub fn zchars_to_words(zchars: &[u8]) -> Vec<u16> {
    let mut padded = zchars.to_vec();
    while padded.len() % 3 != 0 {
        padded.push(5);
    }
    if padded.is_empty() {
        padded = vec![5, 5, 5];
    }
    let mut words = Vec::with_capacity(padded.len() / 3);
    for chunk in padded.chunks(3) {
        words.push(((chunk[0] as u16) << 10) | ((chunk[1] as u16) << 5) | chunk[2] as u16);
    }
    let last = words.len() - 1;
    words[last] |= 0x8000;
    words
}

/// Encode a word to the fixed dictionary width for this version, truncated
/// or padded with Z-char 5.
pub fn encode_dictionary_word(mem: &Memory, word: &str) -> Result<Vec<u16>, String> {
    let version = mem.fetch_byte(0)?;
    let resolution = dictionary_resolution(version);
    let mut zchars = encode_zchars(mem, &word.to_lowercase())?;
    zchars.truncate(resolution);
    while zchars.len() < resolution {
        zchars.push(5);
    }
    Ok(zchars_to_words(&zchars))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn mem_with(version: u8, strings: &[(usize, &[u16])]) -> Memory {
        let mut bytes = vec![0u8; 0x1000];
        bytes[0] = version;
        bytes[0x0e] = 0x10; // static base, past everything we poke
        for &(addr, words) in strings {
            for (i, w) in words.iter().enumerate() {
                bytes[addr + i * 2] = (w >> 8) as u8;
                bytes[addr + i * 2 + 1] = (w & 0xff) as u8;
            }
        }
        Memory::new(bytes).unwrap()
    }

    fn pack(chars: [u8; 3], last: bool) -> u16 {
        let w = ((chars[0] as u16) << 10) | ((chars[1] as u16) << 5) | chars[2] as u16;
        if last {
            w | 0x8000
        } else {
            w
        }
    }

    #[test]
    fn decodes_plain_lowercase() {
        // "hello" = h(14) e(11) l(18) l(18) o(21)
        let mem = mem_with(
            3,
            &[(0x100, &[pack([14, 11, 18], false), pack([18, 21, 5], true)])],
        );
        let (s, len) = decode_string(&mem, 0x100).unwrap();
        assert_eq!(s, "hello");
        assert_eq!(len, 4);
    }

    #[test]
    fn decodes_space_and_shift() {
        // "a B" = a(12) space(0) shift-A1(4) b(13)... wait: a = 'a'-'a'+6 = 6
        let mem = mem_with(3, &[(0x100, &[pack([6, 0, 4], false), pack([7, 5, 5], true)])]);
        let (s, _) = decode_string(&mem, 0x100).unwrap();
        assert_eq!(s, "a B");
    }

    #[test]
    fn temporary_shift_reverts_after_one_char() {
        // shift-A2, '0' (zc 8), then 'a' must come from A0 again
        let mem = mem_with(3, &[(0x100, &[pack([5, 8, 6], true)])]);
        let (s, _) = decode_string(&mem, 0x100).unwrap();
        assert_eq!(s, "0a");
    }

    #[test]
    fn v1_locking_shift_persists() {
        // zc4 locks A1, then two letters both uppercase
        let mem = mem_with(1, &[(0x100, &[pack([4, 6, 7], true)])]);
        let (s, _) = decode_string(&mem, 0x100).unwrap();
        assert_eq!(s, "AB");
    }

    #[test]
    fn v1_newline_is_zchar_one() {
        let mem = mem_with(1, &[(0x100, &[pack([6, 1, 7], true)])]);
        let (s, _) = decode_string(&mem, 0x100).unwrap();
        assert_eq!(s, "a\nb");
    }

    #[test]
    fn zscii_escape_decodes_ten_bit_literal() {
        // shift-A2, escape(6), then 64+1 -> '@' is 64 = (2<<5)|0
        let mem = mem_with(3, &[(0x100, &[pack([5, 6, 2], false), pack([0, 5, 5], true)])]);
        let (s, _) = decode_string(&mem, 0x100).unwrap();
        assert_eq!(s, "@");
    }

    #[test]
    fn abbreviation_expands() {
        let mut bytes = vec![0u8; 0x1000];
        bytes[0] = 3;
        bytes[0x0e] = 0x10;
        bytes[0x18] = 0x02; // abbreviation table at 0x200
        bytes[0x19] = 0x00;
        // entry 0 of set 1 -> word address 0x180 -> byte address 0x300
        bytes[0x200] = 0x01;
        bytes[0x201] = 0x80;
        // abbreviation string "the " at 0x300
        let the = [pack([25, 13, 10], false), pack([0, 5, 5], true)];
        bytes[0x300] = (the[0] >> 8) as u8;
        bytes[0x301] = (the[0] & 0xff) as u8;
        bytes[0x302] = (the[1] >> 8) as u8;
        bytes[0x303] = (the[1] & 0xff) as u8;
        // main string: abbrev(1) index 0, then "x"
        let main = [pack([1, 0, 29], true)];
        bytes[0x100] = (main[0] >> 8) as u8;
        bytes[0x101] = (main[0] & 0xff) as u8;
        let mem = Memory::new(bytes).unwrap();
        let (s, _) = decode_string(&mem, 0x100).unwrap();
        assert_eq!(s, "the x");
    }

    #[test]
    fn encode_decode_round_trip() {
        let mem = mem_with(3, &[]);
        for input in ["hello", "Take The LAMP", "x-29!", "mixed CASE and 123.", "a@b"] {
            let zchars = encode_zchars(&mem, input).unwrap();
            let words = zchars_to_words(&zchars);
            let mut bytes = vec![0u8; 0x1000];
            bytes[0] = 3;
            bytes[0x0e] = 0x10;
            for (i, w) in words.iter().enumerate() {
                bytes[0x100 + i * 2] = (w >> 8) as u8;
                bytes[0x100 + i * 2 + 1] = (w & 0xff) as u8;
            }
            let m2 = Memory::new(bytes).unwrap();
            let (s, _) = decode_string(&m2, 0x100).unwrap();
            // Trailing Z-char-5 padding decodes to nothing.
            assert_eq!(s, input);
        }
    }

    #[test]
    fn dictionary_word_width_by_version() {
        let mem = mem_with(3, &[]);
        assert_eq!(encode_dictionary_word(&mem, "look").unwrap().len(), 2);
        let mem = mem_with(5, &[]);
        assert_eq!(encode_dictionary_word(&mem, "look").unwrap().len(), 3);
    }

    #[test]
    fn dictionary_word_truncates_long_words() {
        let mem = mem_with(3, &[]);
        let a = encode_dictionary_word(&mem, "lantern").unwrap();
        let b = encode_dictionary_word(&mem, "lanter").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, encode_dictionary_word(&mem, "lamp").unwrap());
    }
}

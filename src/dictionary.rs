//! Dictionary lookup and tokenisation. The dictionary header is a list of
//! separator characters, an entry length, and a signed entry count; a
//! negative count marks an unsorted dictionary that must be scanned
//! linearly.

use crate::machine::Machine;
use crate::text;
use log::debug;

impl Machine {
    /// The word separators the story declares (plus space, which always
    /// separates and never becomes a token).
    pub fn dictionary_separators(&self, dict_addr: usize) -> Result<Vec<u8>, String> {
        let count = self.memory.fetch_byte(dict_addr)? as usize;
        let mut seps = Vec::with_capacity(count);
        for i in 0..count {
            seps.push(self.memory.fetch_byte(dict_addr + 1 + i)?);
        }
        Ok(seps)
    }

    /// Look a word up, returning the byte address of its entry or 0.
    pub fn lookup_word(&self, dict_addr: usize, word: &str) -> Result<u16, String> {
        let sep_count = self.memory.fetch_byte(dict_addr)? as usize;
        let entry_length = self.memory.fetch_byte(dict_addr + 1 + sep_count)? as usize;
        let entry_count = self.memory.fetch_word(dict_addr + 2 + sep_count)? as i16;
        let entries = dict_addr + 4 + sep_count;

        let encoded = text::encode_dictionary_word(&self.memory, word)?;
        let key_len = encoded.len();

        if entry_count < 0 {
            // Unsorted dictionary: linear scan.
            for i in 0..(-(entry_count as i32)) as usize {
                let addr = entries + i * entry_length;
                if self.entry_matches(addr, &encoded)? {
                    return Ok(addr as u16);
                }
            }
            return Ok(0);
        }

        let mut low = 0i32;
        let mut high = entry_count as i32 - 1;
        while low <= high {
            let mid = (low + high) / 2;
            let addr = entries + mid as usize * entry_length;
            let mut ordering = std::cmp::Ordering::Equal;
            for k in 0..key_len {
                let entry_word = self.memory.fetch_word(addr + k * 2)?;
                ordering = encoded[k].cmp(&entry_word);
                if ordering != std::cmp::Ordering::Equal {
                    break;
                }
            }
            match ordering {
                std::cmp::Ordering::Less => high = mid - 1,
                std::cmp::Ordering::Greater => low = mid + 1,
                std::cmp::Ordering::Equal => {
                    debug!("dictionary hit '{}' at {:04x}", word, addr);
                    return Ok(addr as u16);
                }
            }
        }
        debug!("dictionary miss '{}'", word);
        Ok(0)
    }

    fn entry_matches(&self, addr: usize, encoded: &[u16]) -> Result<bool, String> {
        for (k, &w) in encoded.iter().enumerate() {
            if self.memory.fetch_word(addr + k * 2)? != w {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Read the text the buffer currently holds: NUL-terminated from
    /// `text+1` in V1-4, length-prefixed from `text+2` in V5+.
    pub fn read_input_buffer(&self, text_buffer: usize) -> Result<String, String> {
        let mut out = String::new();
        if self.header.version <= 4 {
            let mut addr = text_buffer + 1;
            loop {
                let b = self.memory.fetch_byte(addr)?;
                if b == 0 {
                    break;
                }
                out.push(b as char);
                addr += 1;
            }
        } else {
            let len = self.memory.fetch_byte(text_buffer + 1)? as usize;
            for i in 0..len {
                out.push(self.memory.fetch_byte(text_buffer + 2 + i)? as char);
            }
        }
        Ok(out)
    }

    /// Store an input line into the text buffer, clipped to its declared
    /// capacity. Returns the text actually stored.
    pub fn write_input_buffer(&mut self, text_buffer: usize, input: &str) -> Result<String, String> {
        let max_len = self.memory.fetch_byte(text_buffer)? as usize;
        if self.header.version <= 4 {
            // max_len is "maximum characters minus 1"; the text is
            // NUL-terminated.
            let keep: String = input.chars().take(max_len.saturating_sub(1)).collect();
            for (i, ch) in keep.bytes().enumerate() {
                self.memory.put_byte(text_buffer + 1 + i, ch)?;
            }
            self.memory.put_byte(text_buffer + 1 + keep.len(), 0)?;
            Ok(keep)
        } else {
            let keep: String = input.chars().take(max_len).collect();
            self.memory.put_byte(text_buffer + 1, keep.len() as u8)?;
            for (i, ch) in keep.bytes().enumerate() {
                self.memory.put_byte(text_buffer + 2 + i, ch)?;
            }
            Ok(keep)
        }
    }

    /// Split the buffer's text into tokens and write 4-byte parse records:
    /// dictionary address, token length, position in the text buffer.
    /// `dict_addr` of 0 means the story's main dictionary; when
    /// `keep_unmatched` is set, records for words the dictionary lacks keep
    /// their previous address bytes (the VAR:tokenise flag).
    pub fn tokenise_buffer(
        &mut self,
        text_buffer: usize,
        parse_buffer: usize,
        dict_addr: usize,
        keep_unmatched: bool,
    ) -> Result<(), String> {
        let dict = if dict_addr == 0 {
            self.header.dictionary as usize
        } else {
            dict_addr
        };
        let text = self.read_input_buffer(text_buffer)?;
        let separators = self.dictionary_separators(dict)?;
        let position_base = if self.header.version <= 4 { 1 } else { 2 };

        // Split into (byte offset, token) pairs. Space separates silently;
        // declared separators separate and are tokens themselves.
        let mut tokens: Vec<(usize, String)> = Vec::new();
        let mut current = String::new();
        let mut start = 0usize;
        for (i, ch) in text.bytes().enumerate() {
            if ch == b' ' {
                if !current.is_empty() {
                    tokens.push((start, std::mem::take(&mut current)));
                }
            } else if separators.contains(&ch) {
                if !current.is_empty() {
                    tokens.push((start, std::mem::take(&mut current)));
                }
                tokens.push((i, (ch as char).to_string()));
            } else {
                if current.is_empty() {
                    start = i;
                }
                current.push(ch as char);
            }
        }
        if !current.is_empty() {
            tokens.push((start, current));
        }

        let max_words = self.memory.fetch_byte(parse_buffer)? as usize;
        let count = tokens.len().min(max_words);
        self.memory.put_byte(parse_buffer + 1, count as u8)?;

        for (i, (offset, word)) in tokens.iter().take(count).enumerate() {
            let record = parse_buffer + 2 + i * 4;
            let addr = self.lookup_word(dict, word)?;
            if addr != 0 || !keep_unmatched {
                self.memory.put_word(record, addr)?;
            }
            self.memory.put_byte(record + 2, word.len() as u8)?;
            self.memory.put_byte(record + 3, (offset + position_base) as u8)?;
            debug!(
                "token '{}' -> addr {:04x}, len {}, pos {}",
                word,
                addr,
                word.len(),
                offset + position_base
            );
        }
        Ok(())
    }
}

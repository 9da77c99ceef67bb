use crate::memory::Memory;
use crate::screen::{LineInput, Screen};
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};

/// Stream 3 may nest this deep before further selections fault.
const STREAM3_MAX_DEPTH: usize = 16;

/// A pending memory-table capture: the table address and the ZSCII bytes
/// collected so far. Flushed into memory when the stream is deselected.
struct TableCapture {
    table: usize,
    chars: Vec<u8>,
}

/// The output-stream multiplexer and input-stream selector. Stream 1 is the
/// screen, 2 the transcript file, 3 a stack of memory tables, 4 the script
/// of player inputs. While any stream-3 capture is active it receives
/// output exclusively.
pub struct IoCard {
    pub screen: Box<dyn Screen>,
    screen_selected: bool,
    transcript: Option<File>,
    transcript_path: Option<String>,
    tables: Vec<TableCapture>,
    script: Option<File>,
    /// 0 = keyboard, 1 = command file
    input_stream: u8,
    commands: Option<BufReader<File>>,
}

impl IoCard {
    pub fn new(screen: Box<dyn Screen>) -> Self {
        IoCard {
            screen,
            screen_selected: true,
            transcript: None,
            transcript_path: None,
            tables: Vec::new(),
            script: None,
            input_stream: 0,
            commands: None,
        }
    }

    /// Use this transcript path without asking, when the story turns the
    /// stream on.
    pub fn preset_transcript_path(&mut self, path: impl Into<String>) {
        self.transcript_path = Some(path.into());
    }

    /// Route a decoded string to whatever is selected.
    pub fn print(&mut self, s: &str) -> Result<(), String> {
        if let Some(capture) = self.tables.last_mut() {
            for ch in s.chars() {
                capture.chars.push(match ch {
                    '\n' => 13,
                    c if c.is_ascii() => c as u8,
                    _ => b'?',
                });
            }
            return Ok(());
        }
        if self.screen_selected {
            self.screen.show_string(s).map_err(String::from)?;
        }
        if let Some(ref mut file) = self.transcript {
            file.write_all(s.as_bytes())
                .map_err(|e| format!("Transcript write failed: {e}"))?;
        }
        Ok(())
    }

    pub fn new_line(&mut self) -> Result<(), String> {
        if let Some(capture) = self.tables.last_mut() {
            capture.chars.push(13);
            return Ok(());
        }
        if self.screen_selected {
            self.screen.new_line().map_err(String::from)?;
        }
        if let Some(ref mut file) = self.transcript {
            file.write_all(b"\n")
                .map_err(|e| format!("Transcript write failed: {e}"))?;
        }
        Ok(())
    }

    /// Select or deselect an output stream. Positive selects, negative
    /// deselects; stream 3 needs the table address when selected.
    pub fn select_output(
        &mut self,
        mem: &mut Memory,
        stream: i16,
        table: usize,
    ) -> Result<(), String> {
        match stream {
            0 => Ok(()),
            1 => {
                self.screen_selected = true;
                Ok(())
            }
            -1 => {
                self.screen_selected = false;
                Ok(())
            }
            2 => self.open_transcript(mem),
            -2 => {
                self.transcript = None;
                self.set_transcript_bit(mem, false)?;
                Ok(())
            }
            3 => {
                if self.tables.len() >= STREAM3_MAX_DEPTH {
                    return Err("Output stream 3 nested deeper than 16".to_string());
                }
                self.tables.push(TableCapture {
                    table,
                    chars: Vec::new(),
                });
                Ok(())
            }
            -3 => {
                let capture = self
                    .tables
                    .pop()
                    .ok_or("Output stream 3 deselected while inactive")?;
                mem.put_word(capture.table, capture.chars.len() as u16)?;
                for (i, &b) in capture.chars.iter().enumerate() {
                    mem.put_byte(capture.table + 2 + i, b)?;
                }
                debug!(
                    "stream 3 flushed {} chars to {:04x}",
                    capture.chars.len(),
                    capture.table
                );
                Ok(())
            }
            4 => {
                if self.script.is_none() {
                    if let Some(path) =
                        self.ask_filename("Script commands to", "commands.rec", true)?
                    {
                        self.script = Some(
                            OpenOptions::new()
                                .create(true)
                                .append(true)
                                .open(&path)
                                .map_err(|e| format!("Cannot open command script: {e}"))?,
                        );
                    }
                }
                Ok(())
            }
            -4 => {
                self.script = None;
                Ok(())
            }
            s => Err(format!("Unknown output stream {s}")),
        }
    }

    /// Select the input stream: 0 keyboard, 1 a command file.
    pub fn select_input(&mut self, stream: u16) -> Result<(), String> {
        match stream {
            0 => {
                self.input_stream = 0;
                self.commands = None;
                Ok(())
            }
            1 => {
                if let Some(path) = self.ask_filename("Replay commands from", "commands.rec", false)?
                {
                    let file = File::open(&path)
                        .map_err(|e| format!("Cannot open command file: {e}"))?;
                    self.commands = Some(BufReader::new(file));
                    self.input_stream = 1;
                }
                Ok(())
            }
            s => Err(format!("Unknown input stream {s}")),
        }
    }

    /// Read one input line from the selected stream. Falls back to the
    /// keyboard when the command file runs dry.
    pub fn read_line(
        &mut self,
        prefill: &str,
        max_len: usize,
        time_tenths: u16,
        terminators: &[u8],
    ) -> Result<LineInput, String> {
        if self.input_stream == 1 {
            if let Some(ref mut reader) = self.commands {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => {
                        debug!("command file exhausted, back to keyboard");
                        self.input_stream = 0;
                        self.commands = None;
                    }
                    Ok(_) => {
                        let text = line.trim_end_matches(['\n', '\r']).to_string();
                        self.screen
                            .show_string(&format!("{text}\n"))
                            .map_err(String::from)?;
                        return Ok(LineInput::Line {
                            text,
                            terminator: 13,
                        });
                    }
                    Err(e) => return Err(format!("Command file read failed: {e}")),
                }
            } else {
                self.input_stream = 0;
            }
        }
        let result = self
            .screen
            .read_line(prefill, max_len, time_tenths, terminators)
            .map_err(String::from)?;
        if let (LineInput::Line { text, .. }, Some(file)) = (&result, self.script.as_mut()) {
            writeln!(file, "{text}").map_err(|e| format!("Command script write failed: {e}"))?;
        }
        Ok(result)
    }

    pub fn read_char(&mut self, time_tenths: u16) -> Result<Option<u16>, String> {
        self.screen.read_char(time_tenths).map_err(String::from)
    }

    fn open_transcript(&mut self, mem: &mut Memory) -> Result<(), String> {
        if self.transcript.is_some() {
            return Ok(());
        }
        let path = match self.transcript_path.clone() {
            Some(path) => Some(path),
            None => self.ask_filename("Transcript to", "transcript.txt", true)?,
        };
        match path {
            Some(path) => {
                self.transcript = Some(
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)
                        .map_err(|e| format!("Cannot open transcript: {e}"))?,
                );
                self.transcript_path = Some(path);
                self.set_transcript_bit(mem, true)?;
                Ok(())
            }
            None => {
                // Cancelled dialog: stream stays off, not an engine fault.
                self.set_transcript_bit(mem, false)?;
                Ok(())
            }
        }
    }

    /// Keep flags2 bit 0 in step with the transcript stream.
    fn set_transcript_bit(&mut self, mem: &mut Memory, on: bool) -> Result<(), String> {
        let flags2 = mem.fetch_word(0x10)?;
        let flags2 = if on { flags2 | 1 } else { flags2 & !1 };
        mem.put_word(0x10, flags2)
    }

    /// The story toggled flags2 bit 0 directly; follow it.
    pub fn sync_transcript(&mut self, mem: &mut Memory) -> Result<(), String> {
        let want = mem.fetch_word(0x10)? & 1 != 0;
        if want && self.transcript.is_none() {
            self.open_transcript(mem)?;
        } else if !want && self.transcript.is_some() {
            self.transcript = None;
        }
        Ok(())
    }

    fn ask_filename(
        &mut self,
        title: &str,
        suggested: &str,
        for_save: bool,
    ) -> Result<Option<String>, String> {
        self.screen
            .get_filename(title, suggested, for_save)
            .map_err(String::from)
    }
}

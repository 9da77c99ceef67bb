//! The screen collaborator: the interface the engine talks to for all
//! display, input, and file-dialog needs, plus the two implementations the
//! crate ships. Anything fancier (windowed rendering, paging, fonts) lives
//! behind this trait in other front ends.

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    style::{Attribute, SetAttribute},
    terminal::{self, Clear, ClearType},
};
use log::{debug, info};
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Screen error type
#[derive(Debug, Clone)]
pub struct ScreenError {
    pub message: String,
}

impl ScreenError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ScreenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Screen error: {}", self.message)
    }
}

impl std::error::Error for ScreenError {}

impl From<io::Error> for ScreenError {
    fn from(error: io::Error) -> Self {
        Self::new(format!("I/O error: {error}"))
    }
}

impl From<ScreenError> for String {
    fn from(error: ScreenError) -> String {
        error.message
    }
}

/// Outcome of a line read: a terminator arrived, or the wait timed out with
/// a partial line the caller should hand back on resume.
#[derive(Debug, Clone)]
pub enum LineInput {
    Line { text: String, terminator: u16 },
    Timeout { partial: String },
}

/// The UI contract. The engine owns one of these behind the IOCard and
/// never assumes more than this interface promises.
pub trait Screen {
    /// Prepare the display for a story of this version. Called again after
    /// RESTART.
    fn initialize(&mut self, version: u8) -> Result<(), ScreenError>;

    /// Display a fatal error. The caller stops executing afterwards.
    fn fatal(&mut self, message: &str);

    // Capability queries, used to stamp the header at initialization.
    fn has_status_line(&self) -> bool;
    fn has_upper_window(&self) -> bool;
    fn has_colors(&self) -> bool;
    fn has_bold(&self) -> bool;
    fn has_italic(&self) -> bool;
    fn has_fixed_width(&self) -> bool;
    fn has_timed_input(&self) -> bool;
    fn default_font_proportional(&self) -> bool;
    fn default_background(&self) -> u8;
    fn default_foreground(&self) -> u8;
    /// (width, height) in characters
    fn screen_chars(&self) -> (u16, u16);
    /// (width, height) in units
    fn screen_units(&self) -> (u16, u16);
    /// (width, height) of a font cell in units
    fn font_size(&self) -> (u8, u8);

    // Output
    fn show_string(&mut self, s: &str) -> Result<(), ScreenError>;
    fn new_line(&mut self) -> Result<(), ScreenError>;
    /// V1-3 status line: location name plus score/turns or hours/minutes.
    fn show_status(&mut self, name: &str, a: i16, b: i16, time_game: bool)
        -> Result<(), ScreenError>;
    fn scroll_window(&mut self, lines: u16) -> Result<(), ScreenError>;
    fn erase_line(&mut self) -> Result<(), ScreenError>;
    fn erase_window(&mut self, window: i16) -> Result<(), ScreenError>;
    fn split_screen(&mut self, lines: u16) -> Result<(), ScreenError>;
    fn set_current_window(&mut self, window: u16) -> Result<(), ScreenError>;
    /// 1-based (line, column)
    fn set_cursor(&mut self, line: u16, column: u16) -> Result<(), ScreenError>;
    fn get_cursor(&mut self) -> Result<(u16, u16), ScreenError>;
    fn set_text_style(&mut self, bits: u16) -> Result<(), ScreenError>;
    fn set_buffer_mode(&mut self, buffered: bool) -> Result<(), ScreenError>;
    fn set_color(&mut self, fg: u16, bg: u16) -> Result<(), ScreenError>;
    /// Returns the previous font, or 0 if the requested font is unavailable.
    fn set_font(&mut self, font: u16) -> Result<u16, ScreenError>;

    // Input
    fn read_line(
        &mut self,
        prefill: &str,
        max_len: usize,
        time_tenths: u16,
        terminators: &[u8],
    ) -> Result<LineInput, ScreenError>;
    /// None means the wait timed out.
    fn read_char(&mut self, time_tenths: u16) -> Result<Option<u16>, ScreenError>;
    fn set_terminating_characters(&mut self, chars: &[u8]);

    /// Ask the player for a file path. None means cancelled.
    fn get_filename(
        &mut self,
        title: &str,
        suggested: &str,
        for_save: bool,
    ) -> Result<Option<String>, ScreenError>;

    // Lifecycle
    fn quit(&mut self);
    fn restart(&mut self) -> Result<(), ScreenError>;

    /// Escape hatch for tests and front-end-specific wiring.
    fn as_any(&self) -> &dyn std::any::Any;
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// Pick a screen for the current environment: a real terminal when stdin
/// and stdout are ttys, the headless buffer otherwise.
pub fn auto_screen(force_headless: bool) -> Box<dyn Screen> {
    let interactive = atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stdout);
    if force_headless || !interactive {
        debug!("using headless screen (interactive={interactive})");
        Box::new(HeadlessScreen::new())
    } else {
        debug!("using terminal screen");
        Box::new(TerminalScreen::new())
    }
}

// ---------------------------------------------------------------------------
// Terminal screen
// ---------------------------------------------------------------------------

/// A plain terminal front end built on crossterm: scrolling lower window,
/// a reverse-video status line for V1-3, cursor-addressed upper window for
/// V4+ without any paging or buffering cleverness.
pub struct TerminalScreen {
    version: u8,
    size: (u16, u16),
    upper_lines: u16,
    current_window: u16,
    upper_cursor: (u16, u16),
    terminators: Vec<u8>,
}

impl TerminalScreen {
    pub fn new() -> Self {
        let size = terminal::size().unwrap_or((80, 24));
        TerminalScreen {
            version: 3,
            size,
            upper_lines: 0,
            current_window: 0,
            upper_cursor: (1, 1),
            terminators: Vec::new(),
        }
    }

    fn key_to_zscii(key: &KeyEvent) -> Option<u16> {
        match key.code {
            KeyCode::Enter => Some(13),
            KeyCode::Backspace => Some(8),
            KeyCode::Esc => Some(27),
            KeyCode::Up => Some(129),
            KeyCode::Down => Some(130),
            KeyCode::Left => Some(131),
            KeyCode::Right => Some(132),
            KeyCode::F(n) if (1..=12).contains(&n) => Some(132 + n as u16),
            KeyCode::Delete => Some(8),
            KeyCode::Char(c) if c.is_ascii() => Some(c as u16),
            _ => None,
        }
    }

    /// Wait for one key event, honouring an optional deadline.
    fn next_key(&self, deadline: Option<Instant>) -> Result<Option<KeyEvent>, ScreenError> {
        loop {
            let wait = match deadline {
                Some(d) => match d.checked_duration_since(Instant::now()) {
                    Some(remaining) => remaining.min(Duration::from_millis(100)),
                    None => return Ok(None),
                },
                None => Duration::from_secs(3600),
            };
            if event::poll(wait)? {
                if let Event::Key(key) = event::read()? {
                    // crossterm reports releases on some platforms; only
                    // presses count.
                    if key.kind == event::KeyEventKind::Press {
                        return Ok(Some(key));
                    }
                }
            } else if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(None);
            }
        }
    }
}

impl Default for TerminalScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen for TerminalScreen {
    fn initialize(&mut self, version: u8) -> Result<(), ScreenError> {
        self.version = version;
        self.size = terminal::size().unwrap_or((80, 24));
        self.upper_lines = if version <= 3 { 1 } else { 0 };
        execute!(io::stdout(), Clear(ClearType::All), cursor::MoveTo(0, self.upper_lines))?;
        info!("terminal screen initialized, {}x{}", self.size.0, self.size.1);
        Ok(())
    }

    fn fatal(&mut self, message: &str) {
        let _ = terminal::disable_raw_mode();
        eprintln!("\nFatal: {message}");
    }

    fn has_status_line(&self) -> bool {
        true
    }
    fn has_upper_window(&self) -> bool {
        true
    }
    fn has_colors(&self) -> bool {
        false
    }
    fn has_bold(&self) -> bool {
        true
    }
    fn has_italic(&self) -> bool {
        true
    }
    fn has_fixed_width(&self) -> bool {
        true
    }
    fn has_timed_input(&self) -> bool {
        true
    }
    fn default_font_proportional(&self) -> bool {
        false
    }
    fn default_background(&self) -> u8 {
        2 // black
    }
    fn default_foreground(&self) -> u8 {
        9 // white
    }
    fn screen_chars(&self) -> (u16, u16) {
        self.size
    }
    fn screen_units(&self) -> (u16, u16) {
        self.size
    }
    fn font_size(&self) -> (u8, u8) {
        (1, 1)
    }

    fn show_string(&mut self, s: &str) -> Result<(), ScreenError> {
        let mut out = io::stdout();
        if self.current_window == 1 {
            // Upper window text lands where the cursor was put.
            let (line, col) = self.upper_cursor;
            execute!(
                out,
                cursor::SavePosition,
                cursor::MoveTo(col.saturating_sub(1), line.saturating_sub(1))
            )?;
            write!(out, "{s}")?;
            self.upper_cursor.1 += s.chars().count() as u16;
            execute!(out, cursor::RestorePosition)?;
        } else {
            write!(out, "{s}")?;
        }
        out.flush()?;
        Ok(())
    }

    fn new_line(&mut self) -> Result<(), ScreenError> {
        if self.current_window == 1 {
            self.upper_cursor = (self.upper_cursor.0 + 1, 1);
            return Ok(());
        }
        let mut out = io::stdout();
        write!(out, "\r\n")?;
        out.flush()?;
        Ok(())
    }

    fn show_status(
        &mut self,
        name: &str,
        a: i16,
        b: i16,
        time_game: bool,
    ) -> Result<(), ScreenError> {
        let right = if time_game {
            format!("Time: {:02}:{:02}", a, b)
        } else {
            format!("Score: {a}  Moves: {b}")
        };
        let width = self.size.0 as usize;
        let mut line = format!(" {name}");
        let pad = width.saturating_sub(line.chars().count() + right.len() + 2);
        line.push_str(&" ".repeat(pad));
        line.push_str(&right);
        line.push_str("  ");
        line.truncate(width);

        let mut out = io::stdout();
        execute!(
            out,
            cursor::SavePosition,
            cursor::MoveTo(0, 0),
            SetAttribute(Attribute::Reverse)
        )?;
        write!(out, "{line:<width$}")?;
        execute!(out, SetAttribute(Attribute::Reset), cursor::RestorePosition)?;
        out.flush()?;
        Ok(())
    }

    fn scroll_window(&mut self, lines: u16) -> Result<(), ScreenError> {
        execute!(io::stdout(), terminal::ScrollUp(lines))?;
        Ok(())
    }

    fn erase_line(&mut self) -> Result<(), ScreenError> {
        execute!(io::stdout(), Clear(ClearType::UntilNewLine))?;
        Ok(())
    }

    fn erase_window(&mut self, window: i16) -> Result<(), ScreenError> {
        let mut out = io::stdout();
        match window {
            -1 | -2 => {
                execute!(out, Clear(ClearType::All), cursor::MoveTo(0, self.upper_lines))?;
                if window == -1 {
                    self.upper_lines = if self.version <= 3 { 1 } else { 0 };
                    self.current_window = 0;
                }
            }
            1 => {
                execute!(out, cursor::SavePosition)?;
                for row in 0..self.upper_lines {
                    execute!(out, cursor::MoveTo(0, row), Clear(ClearType::CurrentLine))?;
                }
                execute!(out, cursor::RestorePosition)?;
            }
            _ => {
                execute!(out, Clear(ClearType::All), cursor::MoveTo(0, self.upper_lines))?;
            }
        }
        Ok(())
    }

    fn split_screen(&mut self, lines: u16) -> Result<(), ScreenError> {
        self.upper_lines = lines;
        self.upper_cursor = (1, 1);
        Ok(())
    }

    fn set_current_window(&mut self, window: u16) -> Result<(), ScreenError> {
        self.current_window = window;
        if window == 1 {
            self.upper_cursor = (1, 1);
        }
        Ok(())
    }

    fn set_cursor(&mut self, line: u16, column: u16) -> Result<(), ScreenError> {
        if self.current_window == 1 {
            self.upper_cursor = (line, column);
        } else {
            execute!(
                io::stdout(),
                cursor::MoveTo(column.saturating_sub(1), line.saturating_sub(1) + self.upper_lines)
            )?;
        }
        Ok(())
    }

    fn get_cursor(&mut self) -> Result<(u16, u16), ScreenError> {
        if self.current_window == 1 {
            return Ok(self.upper_cursor);
        }
        let (col, row) = cursor::position()?;
        Ok((row + 1, col + 1))
    }

    fn set_text_style(&mut self, bits: u16) -> Result<(), ScreenError> {
        let mut out = io::stdout();
        execute!(out, SetAttribute(Attribute::Reset))?;
        if bits & 1 != 0 {
            execute!(out, SetAttribute(Attribute::Reverse))?;
        }
        if bits & 2 != 0 {
            execute!(out, SetAttribute(Attribute::Bold))?;
        }
        if bits & 4 != 0 {
            execute!(out, SetAttribute(Attribute::Italic))?;
        }
        Ok(())
    }

    fn set_buffer_mode(&mut self, _buffered: bool) -> Result<(), ScreenError> {
        // Nothing buffers here; the terminal scrolls as text arrives.
        Ok(())
    }

    fn set_color(&mut self, _fg: u16, _bg: u16) -> Result<(), ScreenError> {
        Ok(())
    }

    fn set_font(&mut self, font: u16) -> Result<u16, ScreenError> {
        // Only the normal font exists here.
        if font == 1 || font == 0 {
            Ok(1)
        } else {
            Ok(0)
        }
    }

    fn read_line(
        &mut self,
        prefill: &str,
        max_len: usize,
        time_tenths: u16,
        terminators: &[u8],
    ) -> Result<LineInput, ScreenError> {
        if !atty::is(atty::Stream::Stdin) {
            // Piped input: one blocking line, no timeout semantics.
            let mut line = String::new();
            if io::stdin().read_line(&mut line)? == 0 {
                return Ok(LineInput::Line {
                    text: prefill.to_string(),
                    terminator: 13,
                });
            }
            let text = format!("{prefill}{}", line.trim_end_matches(['\n', '\r']));
            return Ok(LineInput::Line { text, terminator: 13 });
        }

        terminal::enable_raw_mode()?;
        let deadline =
            (time_tenths > 0).then(|| Instant::now() + Duration::from_millis(time_tenths as u64 * 100));
        let mut buffer = String::from(prefill);
        let result = loop {
            let key = match self.next_key(deadline) {
                Ok(Some(key)) => key,
                Ok(None) => break LineInput::Timeout { partial: buffer },
                Err(e) => {
                    terminal::disable_raw_mode()?;
                    return Err(e);
                }
            };
            if key.modifiers.contains(KeyModifiers::CONTROL) {
                if let KeyCode::Char('c') = key.code {
                    terminal::disable_raw_mode()?;
                    std::process::exit(130);
                }
                continue;
            }
            match key.code {
                KeyCode::Enter => {
                    write!(io::stdout(), "\r\n")?;
                    io::stdout().flush()?;
                    break LineInput::Line {
                        text: buffer,
                        terminator: 13,
                    };
                }
                KeyCode::Backspace => {
                    if buffer.pop().is_some() {
                        write!(io::stdout(), "\u{8} \u{8}")?;
                        io::stdout().flush()?;
                    }
                }
                KeyCode::Char(c) if c.is_ascii() && !c.is_control() => {
                    if buffer.len() < max_len {
                        buffer.push(c);
                        write!(io::stdout(), "{c}")?;
                        io::stdout().flush()?;
                    }
                }
                _ => {
                    // Function keys can terminate input when the story asked
                    // for them.
                    if let Some(z) = Self::key_to_zscii(&key) {
                        let wanted = self.terminators.contains(&(z as u8))
                            || terminators.contains(&(z as u8))
                            || terminators.contains(&255);
                        if z >= 129 && wanted {
                            break LineInput::Line {
                                text: buffer,
                                terminator: z,
                            };
                        }
                    }
                }
            }
        };
        terminal::disable_raw_mode()?;
        Ok(result)
    }

    fn read_char(&mut self, time_tenths: u16) -> Result<Option<u16>, ScreenError> {
        if !atty::is(atty::Stream::Stdin) {
            let mut byte = [0u8; 1];
            use std::io::Read;
            return match io::stdin().read(&mut byte) {
                Ok(0) => Ok(Some(13)),
                Ok(_) => Ok(Some(if byte[0] == b'\n' { 13 } else { byte[0] as u16 })),
                Err(e) => Err(e.into()),
            };
        }
        terminal::enable_raw_mode()?;
        let deadline =
            (time_tenths > 0).then(|| Instant::now() + Duration::from_millis(time_tenths as u64 * 100));
        let result = loop {
            match self.next_key(deadline)? {
                None => break None,
                Some(key) => {
                    if let Some(z) = Self::key_to_zscii(&key) {
                        break Some(z);
                    }
                }
            }
        };
        terminal::disable_raw_mode()?;
        Ok(result)
    }

    fn set_terminating_characters(&mut self, chars: &[u8]) {
        self.terminators = chars.to_vec();
    }

    fn get_filename(
        &mut self,
        title: &str,
        suggested: &str,
        _for_save: bool,
    ) -> Result<Option<String>, ScreenError> {
        self.show_string(&format!("\n{title} [{suggested}]: "))?;
        match self.read_line("", 255, 0, &[])? {
            LineInput::Line { text, .. } => {
                let path = if text.trim().is_empty() {
                    suggested.to_string()
                } else {
                    text.trim().to_string()
                };
                if path.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(path))
                }
            }
            LineInput::Timeout { .. } => Ok(None),
        }
    }

    fn quit(&mut self) {
        let _ = terminal::disable_raw_mode();
        println!();
    }

    fn restart(&mut self) -> Result<(), ScreenError> {
        self.initialize(self.version)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Headless screen
// ---------------------------------------------------------------------------

/// What a scripted headless read should produce next.
#[derive(Debug, Clone)]
pub enum ScriptedInput {
    Line(String),
    Char(u16),
    /// One timeout tick; the engine will run the interrupt routine and ask
    /// again.
    Timeout,
}

/// Collects output and plays back scripted input. Used by the test suite
/// and when stdin/stdout are not terminals.
pub struct HeadlessScreen {
    output: String,
    inputs: VecDeque<ScriptedInput>,
    pub fatal_message: Option<String>,
    save_path: Option<String>,
    terminators: Vec<u8>,
    size: (u16, u16),
    cursor: (u16, u16),
    quit_called: bool,
}

impl HeadlessScreen {
    pub fn new() -> Self {
        HeadlessScreen {
            output: String::new(),
            inputs: VecDeque::new(),
            fatal_message: None,
            save_path: None,
            terminators: Vec::new(),
            size: (80, 24),
            cursor: (1, 1),
            quit_called: false,
        }
    }

    pub fn push_input(&mut self, input: ScriptedInput) {
        self.inputs.push_back(input);
    }

    pub fn set_save_path(&mut self, path: impl Into<String>) {
        self.save_path = Some(path.into());
    }

    pub fn set_size(&mut self, width: u16, height: u16) {
        self.size = (width, height);
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn quit_was_called(&self) -> bool {
        self.quit_called
    }
}

impl Default for HeadlessScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen for HeadlessScreen {
    fn initialize(&mut self, _version: u8) -> Result<(), ScreenError> {
        Ok(())
    }

    fn fatal(&mut self, message: &str) {
        debug!("headless fatal: {message}");
        self.fatal_message = Some(message.to_string());
    }

    fn has_status_line(&self) -> bool {
        false
    }
    fn has_upper_window(&self) -> bool {
        false
    }
    fn has_colors(&self) -> bool {
        false
    }
    fn has_bold(&self) -> bool {
        false
    }
    fn has_italic(&self) -> bool {
        false
    }
    fn has_fixed_width(&self) -> bool {
        true
    }
    fn has_timed_input(&self) -> bool {
        true
    }
    fn default_font_proportional(&self) -> bool {
        false
    }
    fn default_background(&self) -> u8 {
        2
    }
    fn default_foreground(&self) -> u8 {
        9
    }
    fn screen_chars(&self) -> (u16, u16) {
        self.size
    }
    fn screen_units(&self) -> (u16, u16) {
        self.size
    }
    fn font_size(&self) -> (u8, u8) {
        (1, 1)
    }

    fn show_string(&mut self, s: &str) -> Result<(), ScreenError> {
        self.output.push_str(s);
        Ok(())
    }

    fn new_line(&mut self) -> Result<(), ScreenError> {
        self.output.push('\n');
        Ok(())
    }

    fn show_status(
        &mut self,
        name: &str,
        a: i16,
        b: i16,
        time_game: bool,
    ) -> Result<(), ScreenError> {
        debug!("headless status: {name} {a} {b} time={time_game}");
        Ok(())
    }

    fn scroll_window(&mut self, _lines: u16) -> Result<(), ScreenError> {
        Ok(())
    }
    fn erase_line(&mut self) -> Result<(), ScreenError> {
        Ok(())
    }
    fn erase_window(&mut self, _window: i16) -> Result<(), ScreenError> {
        Ok(())
    }
    fn split_screen(&mut self, _lines: u16) -> Result<(), ScreenError> {
        Ok(())
    }
    fn set_current_window(&mut self, _window: u16) -> Result<(), ScreenError> {
        Ok(())
    }
    fn set_cursor(&mut self, line: u16, column: u16) -> Result<(), ScreenError> {
        self.cursor = (line, column);
        Ok(())
    }
    fn get_cursor(&mut self) -> Result<(u16, u16), ScreenError> {
        Ok(self.cursor)
    }
    fn set_text_style(&mut self, _bits: u16) -> Result<(), ScreenError> {
        Ok(())
    }
    fn set_buffer_mode(&mut self, _buffered: bool) -> Result<(), ScreenError> {
        Ok(())
    }
    fn set_color(&mut self, _fg: u16, _bg: u16) -> Result<(), ScreenError> {
        Ok(())
    }
    fn set_font(&mut self, font: u16) -> Result<u16, ScreenError> {
        Ok(if font <= 1 { 1 } else { 0 })
    }

    fn read_line(
        &mut self,
        prefill: &str,
        max_len: usize,
        _time_tenths: u16,
        _terminators: &[u8],
    ) -> Result<LineInput, ScreenError> {
        match self.inputs.pop_front() {
            Some(ScriptedInput::Line(text)) => {
                let mut full = format!("{prefill}{text}");
                full.truncate(max_len);
                self.output.push_str(&text);
                self.output.push('\n');
                Ok(LineInput::Line {
                    text: full,
                    terminator: 13,
                })
            }
            Some(ScriptedInput::Timeout) => Ok(LineInput::Timeout {
                partial: prefill.to_string(),
            }),
            Some(ScriptedInput::Char(c)) => Ok(LineInput::Line {
                text: prefill.to_string(),
                terminator: c,
            }),
            None => Ok(LineInput::Line {
                text: prefill.to_string(),
                terminator: 13,
            }),
        }
    }

    fn read_char(&mut self, _time_tenths: u16) -> Result<Option<u16>, ScreenError> {
        match self.inputs.pop_front() {
            Some(ScriptedInput::Char(c)) => Ok(Some(c)),
            Some(ScriptedInput::Line(text)) => {
                Ok(Some(text.bytes().next().map(u16::from).unwrap_or(13)))
            }
            Some(ScriptedInput::Timeout) => Ok(None),
            None => Ok(Some(13)),
        }
    }

    fn set_terminating_characters(&mut self, chars: &[u8]) {
        self.terminators = chars.to_vec();
    }

    fn get_filename(
        &mut self,
        _title: &str,
        _suggested: &str,
        _for_save: bool,
    ) -> Result<Option<String>, ScreenError> {
        Ok(self.save_path.clone())
    }

    fn quit(&mut self) {
        self.quit_called = true;
    }

    fn restart(&mut self) -> Result<(), ScreenError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_collects_output() {
        let mut screen = HeadlessScreen::new();
        screen.show_string("West of House").unwrap();
        screen.new_line().unwrap();
        assert_eq!(screen.output(), "West of House\n");
    }

    #[test]
    fn headless_scripted_line_input() {
        let mut screen = HeadlessScreen::new();
        screen.push_input(ScriptedInput::Line("look".to_string()));
        match screen.read_line("", 80, 0, &[]).unwrap() {
            LineInput::Line { text, terminator } => {
                assert_eq!(text, "look");
                assert_eq!(terminator, 13);
            }
            other => panic!("unexpected input: {other:?}"),
        }
    }

    #[test]
    fn headless_timeout_preserves_prefill() {
        let mut screen = HeadlessScreen::new();
        screen.push_input(ScriptedInput::Timeout);
        match screen.read_line("go no", 80, 10, &[]).unwrap() {
            LineInput::Timeout { partial } => assert_eq!(partial, "go no"),
            other => panic!("unexpected input: {other:?}"),
        }
    }
}

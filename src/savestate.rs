//! Full-state serialization for SAVE, RESTORE, and the undo pair. The
//! layout is the current frame, the suspended frames oldest first, then the
//! dynamic memory image, every integer a big-endian i32. A short
//! identification preamble keeps a save from being restored into the wrong
//! story.

use crate::frame::{CallFrame, CallType, MAX_LOCALS};
use crate::machine::Machine;
use log::{debug, info};
use std::fs;

const MAGIC: &[u8; 4] = b"LSAV";

fn push_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        if self.pos + n > self.data.len() {
            return Err("Save file truncated".to_string());
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn i32(&mut self) -> Result<i32, String> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn rest(self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

fn write_frame(buf: &mut Vec<u8>, frame: &CallFrame) {
    push_i32(buf, frame.pc as i32);
    for &local in &frame.locals {
        push_i32(buf, local as i32);
    }
    push_i32(buf, frame.num_locals as i32);
    push_i32(buf, frame.call_type.as_u32() as i32);
    push_i32(buf, frame.arg_count as i32);
    push_i32(buf, frame.frame_number as i32);
    push_i32(buf, frame.stack.len() as i32);
    for &value in &frame.stack {
        push_i32(buf, value as i32);
    }
}

fn read_frame(reader: &mut Reader) -> Result<CallFrame, String> {
    let pc = reader.i32()? as usize;
    let mut locals = [0u16; MAX_LOCALS];
    for local in locals.iter_mut() {
        *local = reader.i32()? as u16;
    }
    let num_locals = reader.i32()?;
    if !(0..=MAX_LOCALS as i32).contains(&num_locals) {
        return Err(format!("Bad local count {num_locals} in saved state"));
    }
    let call_type = CallType::from_u32(reader.i32()? as u32)?;
    let arg_count = reader.i32()? as u8;
    let frame_number = reader.i32()? as u32;
    let depth = reader.i32()?;
    if depth < 0 {
        return Err(format!("Bad stack depth {depth} in saved state"));
    }
    let mut stack = Vec::with_capacity(depth as usize);
    for _ in 0..depth {
        stack.push(reader.i32()? as u16);
    }
    Ok(CallFrame {
        pc,
        locals,
        num_locals: num_locals as u8,
        stack,
        call_type,
        arg_count,
        frame_number,
    })
}

/// Serialize the machine: identification, frames, dynamic memory.
pub fn capture(m: &Machine) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&m.header.release.to_be_bytes());
    buf.extend_from_slice(&m.memory.dump(0x12, 6)?);
    buf.extend_from_slice(&m.header.checksum_file.to_be_bytes());

    let mut current = m.frame.clone();
    current.pc = m.pc;
    write_frame(&mut buf, &current);
    push_i32(&mut buf, m.frames.len() as i32);
    for frame in &m.frames {
        write_frame(&mut buf, frame);
    }
    buf.extend_from_slice(&m.memory.dump(0, m.memory.dynamic_size())?);
    debug!(
        "captured state: {} suspended frames, {} bytes dynamic",
        m.frames.len(),
        m.memory.dynamic_size()
    );
    Ok(buf)
}

/// Replace machine state from a capture. The transcript bit of flags2
/// survives the restore.
pub fn apply(m: &mut Machine, data: &[u8]) -> Result<(), String> {
    let mut reader = Reader::new(data);
    if reader.take(4)? != MAGIC {
        return Err("Not a saved game".to_string());
    }
    let release = reader.take(2)?;
    let serial = reader.take(6)?;
    let checksum = reader.take(2)?;
    if release != m.header.release.to_be_bytes()
        || serial != &m.memory.pristine_bytes()[0x12..0x18]
        || checksum != m.header.checksum_file.to_be_bytes()
    {
        return Err("Saved game belongs to a different story".to_string());
    }

    let current = read_frame(&mut reader)?;
    let suspended_count = reader.i32()?;
    if suspended_count < 0 {
        return Err(format!("Bad frame count {suspended_count} in saved state"));
    }
    let mut frames = Vec::with_capacity(suspended_count as usize);
    for _ in 0..suspended_count {
        frames.push(read_frame(&mut reader)?);
    }

    let dynamic = reader.rest();
    if dynamic.len() != m.memory.dynamic_size() {
        return Err(format!(
            "Saved dynamic memory is {} bytes, story wants {}",
            dynamic.len(),
            m.memory.dynamic_size()
        ));
    }

    let kept = m.memory.flags2_preserved_bits();
    m.memory.load(0, dynamic)?;
    let flags2 = (m.memory.fetch_word(0x10)? & !0x0003) | kept;
    m.memory.put_word(0x10, flags2)?;

    m.pc = current.pc;
    m.frame = current;
    m.frames = frames;
    m.interrupt_return = None;
    info!("state restored, pc {:05x}", m.pc);
    Ok(())
}

/// SAVE to a file picked through the screen's dialog. Any failure,
/// including a cancelled dialog, comes back as Err and the caller signals
/// it per version; nothing here is fatal.
pub fn save_game(m: &mut Machine) -> Result<(), String> {
    let path = m
        .io
        .screen
        .get_filename("Save to", "story.sav", true)
        .map_err(String::from)?
        .ok_or("Save cancelled")?;
    let data = capture(m)?;
    fs::write(&path, &data).map_err(|e| format!("Cannot write save file: {e}"))?;
    info!("saved to {path}");
    Ok(())
}

/// RESTORE from a file picked through the screen's dialog.
pub fn restore_game(m: &mut Machine) -> Result<(), String> {
    let path = m
        .io
        .screen
        .get_filename("Restore from", "story.sav", false)
        .map_err(String::from)?
        .ok_or("Restore cancelled")?;
    let data = fs::read(&path).map_err(|e| format!("Cannot read save file: {e}"))?;
    apply(m, &data)
}

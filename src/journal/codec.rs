//! Binary layout of the work queue log.
//!
//! An `i32` entry count, then per entry a `u16` opcode character, the
//! relative path as a length-prefixed modified UTF-8 string and, for moves
//! only, a second string naming the source. Integers are big-endian.

use crate::sandbox::{FileOp, SandboxError, WorkQueue};
use crate::security::SandboxPath;

/// Serialize a queue in replay order
pub fn encode(queue: &WorkQueue) -> Result<Vec<u8>, SandboxError> {
    let count = i32::try_from(queue.len()).map_err(|_| {
        SandboxError::InvalidPath(format!("Too many entries to journal: {}", queue.len()))
    })?;

    let mut out = Vec::with_capacity(4 + queue.len() * 32);
    out.extend_from_slice(&count.to_be_bytes());

    for (path, op) in queue.iter() {
        out.extend_from_slice(&(op.opcode() as u16).to_be_bytes());
        write_utf(&mut out, path.as_str())?;
        if let FileOp::Move { from } = op {
            write_utf(&mut out, from.as_str())?;
        }
    }

    Ok(out)
}

/// Rebuild a queue from its serialized form
pub fn decode(bytes: &[u8]) -> Result<WorkQueue, SandboxError> {
    let mut reader = Reader { bytes, pos: 0 };

    let count = reader.read_i32()?;
    if count < 0 {
        return Err(corrupt(format!("negative entry count {}", count)));
    }

    let mut queue = WorkQueue::new();
    for _ in 0..count {
        let opcode = reader.read_u16()?;
        let path = reader.read_path()?;
        let op = match char::from_u32(u32::from(opcode)) {
            Some('D') => FileOp::Delete,
            Some('A') => FileOp::Add,
            Some('O') => FileOp::MovedOut,
            Some('K') => FileOp::MkDir,
            Some('L') => FileOp::RmDir,
            Some('M') => FileOp::Move {
                from: reader.read_path()?,
            },
            _ => return Err(corrupt(format!("unknown opcode {:#06x} for {}", opcode, path))),
        };
        if queue.get(&path).is_some() {
            return Err(corrupt(format!("duplicate entry for {}", path)));
        }
        queue.replace(path, op);
    }

    if reader.pos != bytes.len() {
        return Err(corrupt(format!(
            "{} trailing bytes after {} entries",
            bytes.len() - reader.pos,
            count
        )));
    }

    Ok(queue)
}

fn corrupt(message: String) -> SandboxError {
    SandboxError::CorruptLog(message)
}

/// Append a string as a `u16` byte length plus modified UTF-8.
///
/// Each UTF-16 code unit is encoded on its own, so NUL takes two bytes and
/// supplementary characters take six.
fn write_utf(out: &mut Vec<u8>, s: &str) -> Result<(), SandboxError> {
    let mut encoded = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => encoded.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                encoded.push(0xC0 | (unit >> 6) as u8);
                encoded.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                encoded.push(0xE0 | (unit >> 12) as u8);
                encoded.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                encoded.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }

    let len = u16::try_from(encoded.len()).map_err(|_| {
        SandboxError::InvalidPath(format!(
            "Path too long to journal ({} encoded bytes)",
            encoded.len()
        ))
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&encoded);
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], SandboxError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                corrupt(format!(
                    "truncated at byte {} (wanted {} more, have {})",
                    self.pos,
                    n,
                    self.bytes.len() - self.pos
                ))
            })?;
        let bytes = self.bytes;
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, SandboxError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_i32(&mut self) -> Result<i32, SandboxError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_utf(&mut self) -> Result<String, SandboxError> {
        let len = usize::from(self.read_u16()?);
        let bytes = self.take(len)?;

        let mut units = Vec::with_capacity(len);
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            match b >> 4 {
                0x0..=0x7 => {
                    units.push(u16::from(b));
                    i += 1;
                }
                0xC | 0xD => {
                    let b2 = continuation(bytes, i + 1)?;
                    units.push((u16::from(b & 0x1F) << 6) | u16::from(b2 & 0x3F));
                    i += 2;
                }
                0xE => {
                    let b2 = continuation(bytes, i + 1)?;
                    let b3 = continuation(bytes, i + 2)?;
                    units.push(
                        (u16::from(b & 0x0F) << 12)
                            | (u16::from(b2 & 0x3F) << 6)
                            | u16::from(b3 & 0x3F),
                    );
                    i += 3;
                }
                _ => return Err(corrupt(format!("malformed string byte {:#04x}", b))),
            }
        }

        String::from_utf16(&units).map_err(|_| corrupt("unpaired surrogate in string".to_string()))
    }

    fn read_path(&mut self) -> Result<SandboxPath, SandboxError> {
        let raw = self.read_utf()?;
        SandboxPath::parse(&raw).map_err(|e| corrupt(format!("bad path {:?}: {}", raw, e)))
    }
}

fn continuation(bytes: &[u8], at: usize) -> Result<u8, SandboxError> {
    match bytes.get(at) {
        Some(b) if b & 0xC0 == 0x80 => Ok(*b),
        _ => Err(corrupt(format!("malformed string continuation at offset {}", at))),
    }
}

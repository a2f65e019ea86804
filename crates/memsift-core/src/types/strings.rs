//! Text and byte strings.
//!
//! A str stores its character data inline after the header with a fixed
//! width per char: 1 (Latin-1), 2 (UCS-2 LE), or 4 (UCS-4 LE), chosen at
//! allocation from the widest character present. A bytes object is a
//! var-sized header followed by raw data.

use crate::addr::MappedAddr;
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::memory::Cursor;
use crate::types::{ObjectHeader, Reason, HEADER_SIZE, VAR_HEADER_SIZE};

/// str: `{header, length: i64, hash: u64, kind: u32, pad, data...}`
pub const STR_HEADER_SIZE: u64 = 40;

const MAX_LEN: i64 = 0x7FFF_FFFF;

#[derive(Debug, Clone, Copy)]
pub struct StrObject {
    pub header: ObjectHeader,
    pub length: i64,
    pub hash: u64,
    pub kind: u32,
}

impl StrObject {
    pub fn parse(cur: &mut Cursor<'_>) -> Result<Self> {
        let header = ObjectHeader::parse(cur)?;
        let length = cur.get_i64l()?;
        let hash = cur.get_u64l()?;
        let kind = cur.get_u32l()?;
        cur.get_u32l()?; // pad
        Ok(Self {
            header,
            length,
            hash,
            kind,
        })
    }

    pub fn read(env: &Environment, addr: MappedAddr) -> Result<Self> {
        Self::parse(&mut env.store().read(addr, STR_HEADER_SIZE)?)
    }

    pub fn data_size(&self) -> u64 {
        self.length as u64 * self.kind as u64
    }
}

pub fn validate_str(env: &Environment, addr: MappedAddr) -> Option<Reason> {
    let Ok(s) = StrObject::read(env, addr) else {
        return Some("unreadable_object");
    };
    if !matches!(s.kind, 1 | 2 | 4) {
        return Some("invalid_str_kind");
    }
    if s.length < 0 || s.length > MAX_LEN {
        return Some("invalid_str_length");
    }
    if !env
        .store()
        .exists_range(addr.offset_bytes(STR_HEADER_SIZE as i64), s.data_size())
    {
        return Some("invalid_str_data_range");
    }
    None
}

/// Character count without decoding.
pub fn str_len(env: &Environment, addr: MappedAddr) -> Result<u64> {
    let s = StrObject::read(env, addr)?;
    if s.length < 0 {
        return Err(Error::InvalidObject("invalid_str_length"));
    }
    Ok(s.length as u64)
}

/// Decode the full character data.
pub fn decode_str(env: &Environment, addr: MappedAddr) -> Result<String> {
    let s = StrObject::read(env, addr)?;
    if s.length < 0 || !matches!(s.kind, 1 | 2 | 4) {
        return Err(Error::InvalidObject("invalid_str_header"));
    }
    let data = env
        .store()
        .read_slice(addr.offset_bytes(STR_HEADER_SIZE as i64), s.data_size())?;
    let mut out = String::with_capacity(s.length as usize);
    match s.kind {
        1 => {
            for &b in data {
                out.push(b as char);
            }
        }
        2 => {
            for unit in data.chunks_exact(2) {
                let u = u16::from_le_bytes([unit[0], unit[1]]);
                out.push(char::from_u32(u as u32).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
        }
        _ => {
            for unit in data.chunks_exact(4) {
                let u = u32::from_le_bytes([unit[0], unit[1], unit[2], unit[3]]);
                out.push(char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
        }
    }
    Ok(out)
}

/// Quote and escape a decoded string, truncating at `max_chars` with a
/// trailing ellipsis. Deterministic for a fixed configuration.
pub fn quote_str(text: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    let mut truncated = false;
    for (i, c) in text.chars().enumerate() {
        if i >= max_chars {
            truncated = true;
            break;
        }
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    if truncated {
        out.push_str("...");
    }
    out
}

#[derive(Debug, Clone, Copy)]
pub struct BytesObject {
    pub header: ObjectHeader,
    pub size: i64,
}

impl BytesObject {
    pub fn read(env: &Environment, addr: MappedAddr) -> Result<Self> {
        let mut cur = env.store().read(addr, VAR_HEADER_SIZE)?;
        let header = ObjectHeader::parse(&mut cur)?;
        let size = cur.get_i64l()?;
        Ok(Self { header, size })
    }
}

pub fn validate_bytes(env: &Environment, addr: MappedAddr) -> Option<Reason> {
    let Ok(b) = BytesObject::read(env, addr) else {
        return Some("unreadable_object");
    };
    if b.size < 0 || b.size > MAX_LEN {
        return Some("invalid_bytes_size");
    }
    if !env
        .store()
        .exists_range(addr.offset_bytes(VAR_HEADER_SIZE as i64), b.size as u64)
    {
        return Some("invalid_bytes_data_range");
    }
    None
}

pub fn bytes_len(env: &Environment, addr: MappedAddr) -> Result<u64> {
    let b = BytesObject::read(env, addr)?;
    if b.size < 0 {
        return Err(Error::InvalidObject("invalid_bytes_size"));
    }
    Ok(b.size as u64)
}

pub fn bytes_data<'e>(env: &'e Environment, addr: MappedAddr) -> Result<&'e [u8]> {
    let b = BytesObject::read(env, addr)?;
    if b.size < 0 {
        return Err(Error::InvalidObject("invalid_bytes_size"));
    }
    env.store()
        .read_slice(addr.offset_bytes(VAR_HEADER_SIZE as i64), b.size as u64)
}

/// `b"..."` form. When `force_hex` is set (or the data is not printable
/// ASCII) every byte renders as a `\xNN` escape.
pub fn quote_bytes(data: &[u8], max_bytes: usize, force_hex: bool) -> String {
    let truncated = data.len() > max_bytes;
    let data = &data[..data.len().min(max_bytes)];
    let printable = !force_hex
        && data
            .iter()
            .all(|&b| (0x20..0x7F).contains(&b) || matches!(b, b'\n' | b'\r' | b'\t'));

    let mut out = String::with_capacity(data.len() + 3);
    out.push_str("b\"");
    for &b in data {
        if printable {
            match b {
                b'"' => out.push_str("\\\""),
                b'\\' => out.push_str("\\\\"),
                b'\n' => out.push_str("\\n"),
                b'\r' => out.push_str("\\r"),
                b'\t' => out.push_str("\\t"),
                b => out.push(b as char),
            }
        } else {
            out.push_str(&format!("\\x{:02X}", b));
        }
    }
    out.push('"');
    if truncated {
        out.push_str("...");
    }
    out
}

const _: () = assert!(STR_HEADER_SIZE == HEADER_SIZE + 24);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_str_escapes_and_truncates() {
        assert_eq!(quote_str("abc", 100), "\"abc\"");
        assert_eq!(quote_str("a\"b\\c\n", 100), "\"a\\\"b\\\\c\\n\"");
        assert_eq!(quote_str("abcdef", 3), "\"abc\"...");
    }

    #[test]
    fn test_quote_bytes() {
        assert_eq!(quote_bytes(b"abc", 100, false), "b\"abc\"");
        assert_eq!(quote_bytes(&[0x00, 0xFF], 100, false), "b\"\\x00\\xFF\"");
        assert_eq!(quote_bytes(b"ab", 100, true), "b\"\\x61\\x62\"");
        assert_eq!(quote_bytes(b"abcd", 2, false), "b\"ab\"...");
    }
}

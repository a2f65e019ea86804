//! The dictionary decoder.
//!
//! A dict points at a separate keys object and, when "split", at a
//! parallel values array. The keys object is a fixed header followed by an
//! indirection table of `dk_size` signed slots (1/2/4/8 bytes wide,
//! derived from `dk_size`) and then `dk_usable + dk_nentries` key entries
//! `{hash, key, value}`. A non-negative table slot indexes the entry
//! array; the entry's key is paired with `values[slot]` when the split
//! array is present and with the entry's own value field otherwise.

use std::collections::HashSet;

use crate::addr::MappedAddr;
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::memory::Cursor;
use crate::types::{shallow_reason, strings, ObjectHeader, Reason, TypeKind};

/// dict: `{header, ma_used: i64, ma_keys: addr, ma_values: addr}`
pub const SIZE: u64 = 40;
/// keys object header: `{dk_refcnt: u64, dk_size: i64, dk_usable: i64, dk_nentries: i64}`
pub const KEYS_HEADER_SIZE: u64 = 32;
/// key entry: `{hash: u64, key: addr, value: addr}`
pub const ENTRY_SIZE: u64 = 24;

const MAX_TABLE_SIZE: i64 = 1 << 32;

#[derive(Debug, Clone, Copy)]
pub struct DictObject {
    pub header: ObjectHeader,
    pub used: i64,
    pub keys: MappedAddr,
    pub values: MappedAddr,
}

#[derive(Debug, Clone, Copy)]
pub struct DictKeys {
    pub refcnt: u64,
    pub size: i64,
    pub usable: i64,
    pub nentries: i64,
}

impl DictObject {
    pub fn read(env: &Environment, addr: MappedAddr) -> Result<Self> {
        let mut cur = env.store().read(addr, SIZE)?;
        let header = ObjectHeader::parse(&mut cur)?;
        let used = cur.get_i64l()?;
        let keys = MappedAddr::new(cur.get_u64l()?);
        let values = MappedAddr::new(cur.get_u64l()?);
        Ok(Self {
            header,
            used,
            keys,
            values,
        })
    }

    /// True when the values live in a separate parallel array rather than
    /// inside the key entries.
    pub fn is_split(&self) -> bool {
        !self.values.is_null()
    }
}

impl DictKeys {
    pub fn read(env: &Environment, addr: MappedAddr) -> Result<Self> {
        let mut cur = env.store().read(addr, KEYS_HEADER_SIZE)?;
        Ok(Self {
            refcnt: cur.get_u64l()?,
            size: cur.get_i64l()?,
            usable: cur.get_i64l()?,
            nentries: cur.get_i64l()?,
        })
    }

    /// Indirection-table slot width, derived from the capacity. Callers
    /// must not assume a fixed width.
    pub fn bytes_per_table_value(&self) -> u64 {
        if self.size <= 0x7F {
            1
        } else if self.size <= 0x7FFF {
            2
        } else if self.size <= 0x7FFF_FFFF {
            4
        } else {
            8
        }
    }

    pub fn num_entries(&self) -> i64 {
        self.usable + self.nentries
    }

    fn table_size_bytes(&self) -> u64 {
        self.size as u64 * self.bytes_per_table_value()
    }
}

/// One key/value address pair as stored, keys skipped when null.
pub type DictItem = (MappedAddr, MappedAddr);

fn read_table(env: &Environment, keys_addr: MappedAddr, keys: &DictKeys) -> Result<Vec<i64>> {
    let table_addr = keys_addr.offset_bytes(KEYS_HEADER_SIZE as i64);
    let mut cur = env.store().read(table_addr, keys.table_size_bytes())?;
    let mut table = Vec::with_capacity(keys.size as usize);
    while !cur.eof() {
        table.push(match keys.bytes_per_table_value() {
            1 => cur.get_i8()? as i64,
            2 => cur.get_i16l()? as i64,
            4 => cur.get_i32l()? as i64,
            _ => cur.get_i64l()?,
        });
    }
    Ok(table)
}

fn entries_addr(keys_addr: MappedAddr, keys: &DictKeys) -> MappedAddr {
    keys_addr.offset_bytes((KEYS_HEADER_SIZE + keys.table_size_bytes()) as i64)
}

fn read_entries<'e>(
    env: &'e Environment,
    keys_addr: MappedAddr,
    keys: &DictKeys,
) -> Result<Cursor<'e>> {
    env.store().read(
        entries_addr(keys_addr, keys),
        keys.num_entries() as u64 * ENTRY_SIZE,
    )
}

fn read_values<'e>(
    env: &'e Environment,
    dict: &DictObject,
    keys: &DictKeys,
) -> Result<Option<Cursor<'e>>> {
    if !dict.is_split() {
        return Ok(None);
    }
    Ok(Some(
        env.store().read(dict.values, keys.num_entries() as u64 * 8)?,
    ))
}

/// Decode all present key/value pairs in table order.
pub fn get_items(env: &Environment, addr: MappedAddr) -> Result<Vec<DictItem>> {
    let dict = DictObject::read(env, addr)?;
    let keys = DictKeys::read(env, dict.keys)?;
    check_counts(&dict, &keys).map_err(Error::InvalidObject)?;

    let table = read_table(env, dict.keys, &keys)?;
    let entries = read_entries(env, dict.keys, &keys)?;
    let values = read_values(env, &dict, &keys)?;

    let mut items = Vec::new();
    for slot in table {
        if slot < 0 {
            continue;
        }
        if slot >= keys.num_entries() {
            return Err(Error::InvalidObject("invalid_ma_keys_table"));
        }
        let mut entry = entries.clone();
        entry.seek(slot as usize * ENTRY_SIZE as usize)?;
        entry.get_u64l()?; // hash
        let key = MappedAddr::new(entry.get_u64l()?);
        let entry_value = MappedAddr::new(entry.get_u64l()?);
        if key.is_null() {
            continue;
        }
        let value = match &values {
            Some(values) => {
                let mut v = values.clone();
                v.seek(slot as usize * 8)?;
                MappedAddr::new(v.get_u64l()?)
            }
            None => entry_value,
        };
        items.push((key, value));
    }
    Ok(items)
}

/// Look up the value whose key is a str equal to `wanted`.
pub fn value_for_str_key(
    env: &Environment,
    addr: MappedAddr,
    wanted: &str,
) -> Result<Option<MappedAddr>> {
    for (key, value) in get_items(env, addr)? {
        if crate::types::object_kind(env, key) != Some(TypeKind::Str) {
            continue;
        }
        match strings::decode_str(env, key) {
            Ok(text) if text == wanted => return Ok(Some(value)),
            _ => continue,
        }
    }
    Ok(None)
}

fn check_counts(dict: &DictObject, keys: &DictKeys) -> std::result::Result<(), Reason> {
    if keys.size <= 0 || keys.size > MAX_TABLE_SIZE || !(keys.size as u64).is_power_of_two() {
        return Err("invalid_dk_size");
    }
    if keys.usable < 0 || keys.nentries < 0 || keys.num_entries() > keys.size {
        return Err("invalid_dk_counts");
    }
    if dict.used < 0 || dict.used > keys.nentries {
        return Err("invalid_ma_used");
    }
    Ok(())
}

pub fn validate(env: &Environment, addr: MappedAddr) -> Option<Reason> {
    let Ok(dict) = DictObject::read(env, addr) else {
        return Some("unreadable_object");
    };
    if !env.store().obj_valid(dict.keys, 8, KEYS_HEADER_SIZE) {
        return Some("invalid_ma_keys");
    }
    let Ok(keys) = DictKeys::read(env, dict.keys) else {
        return Some("invalid_ma_keys");
    };
    if let Err(reason) = check_counts(&dict, &keys) {
        return Some(reason);
    }

    let table_addr = dict.keys.offset_bytes(KEYS_HEADER_SIZE as i64);
    if !env.store().exists_range(table_addr, keys.table_size_bytes()) {
        return Some("invalid_ma_keys_table");
    }
    if !env.store().exists_range(
        entries_addr(dict.keys, &keys),
        keys.num_entries() as u64 * ENTRY_SIZE,
    ) {
        return Some("invalid_ma_keys_entries");
    }
    if dict.is_split() {
        if !env.store().obj_valid(dict.values, 8, keys.num_entries() as u64 * 8) {
            return Some("invalid_ma_values");
        }
    }

    let Ok(items) = get_items(env, addr) else {
        return Some("invalid_ma_keys_table");
    };
    for (key, value) in items {
        if let Some(reason) = shallow_reason(env, key) {
            return Some(reason);
        }
        if let Some(reason) = shallow_reason(env, value) {
            return Some(reason);
        }
    }
    None
}

/// The keys object, the split values array, and every present key and
/// value address, one hop only.
pub fn direct_referents(env: &Environment, addr: MappedAddr) -> Result<HashSet<MappedAddr>> {
    let dict = DictObject::read(env, addr)?;
    let mut out = HashSet::new();
    out.insert(dict.keys);
    out.insert(dict.values);
    for (key, value) in get_items(env, addr)? {
        out.insert(key);
        out.insert(value);
    }
    Ok(out)
}

//! Sets: a hash table of `{key, hash}` entries with `mask + 1` slots.

use std::collections::HashSet;

use crate::addr::MappedAddr;
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::types::{shallow_reason, ObjectHeader, Reason};

/// set: `{header, fill: i64, used: i64, mask: i64, table: addr}`
pub const SIZE: u64 = 48;
/// table entry: `{key: addr, hash: u64}`
pub const ENTRY_SIZE: u64 = 16;

const MAX_TABLE_SIZE: i64 = 1 << 32;

#[derive(Debug, Clone, Copy)]
pub struct SetObject {
    pub header: ObjectHeader,
    pub fill: i64,
    pub used: i64,
    pub mask: i64,
    pub table: MappedAddr,
}

impl SetObject {
    pub fn read(env: &Environment, addr: MappedAddr) -> Result<Self> {
        let mut cur = env.store().read(addr, SIZE)?;
        let header = ObjectHeader::parse(&mut cur)?;
        let fill = cur.get_i64l()?;
        let used = cur.get_i64l()?;
        let mask = cur.get_i64l()?;
        let table = MappedAddr::new(cur.get_u64l()?);
        Ok(Self {
            header,
            fill,
            used,
            mask,
            table,
        })
    }

    pub fn table_slots(&self) -> i64 {
        self.mask + 1
    }
}

/// Non-null keys in table order.
pub fn get_items(env: &Environment, addr: MappedAddr) -> Result<Vec<MappedAddr>> {
    let set = SetObject::read(env, addr)?;
    if set.mask < 0 || set.table_slots() > MAX_TABLE_SIZE {
        return Err(Error::InvalidObject("invalid_set_mask"));
    }
    let mut cur = env
        .store()
        .read(set.table, set.table_slots() as u64 * ENTRY_SIZE)?;
    let mut items = Vec::new();
    while !cur.eof() {
        let key = MappedAddr::new(cur.get_u64l()?);
        cur.get_u64l()?; // hash
        if !key.is_null() {
            items.push(key);
        }
    }
    Ok(items)
}

pub fn validate(env: &Environment, addr: MappedAddr) -> Option<Reason> {
    let Ok(set) = SetObject::read(env, addr) else {
        return Some("unreadable_object");
    };
    if set.mask < 0
        || set.table_slots() > MAX_TABLE_SIZE
        || !(set.table_slots() as u64).is_power_of_two()
    {
        return Some("invalid_set_mask");
    }
    if set.fill > set.table_slots() {
        return Some("invalid_fill");
    }
    if set.used > set.fill || set.used < 0 {
        return Some("invalid_used");
    }
    if !env
        .store()
        .obj_valid(set.table, 8, set.table_slots() as u64 * ENTRY_SIZE)
    {
        return Some("invalid_table");
    }
    let Ok(items) = get_items(env, addr) else {
        return Some("invalid_table");
    };
    for item in items {
        if let Some(reason) = shallow_reason(env, item) {
            return Some(reason);
        }
    }
    None
}

pub fn direct_referents(env: &Environment, addr: MappedAddr) -> Result<HashSet<MappedAddr>> {
    Ok(get_items(env, addr)?.into_iter().collect())
}

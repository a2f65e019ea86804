//! Tuples (inline element array) and lists (out-of-line element array).

use std::collections::HashSet;

use crate::addr::MappedAddr;
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::memory::Cursor;
use crate::types::{shallow_reason, ObjectHeader, Reason, HEADER_SIZE, VAR_HEADER_SIZE};

/// list: `{header, ob_size: i64, items: addr, allocated: i64}`
pub const LIST_SIZE: u64 = 40;

const MAX_ELEMENTS: i64 = 0x100_0000;

#[derive(Debug, Clone, Copy)]
pub struct TupleObject {
    pub header: ObjectHeader,
    pub size: i64,
}

impl TupleObject {
    pub fn read(env: &Environment, addr: MappedAddr) -> Result<Self> {
        let mut cur = env.store().read(addr, VAR_HEADER_SIZE)?;
        let header = ObjectHeader::parse(&mut cur)?;
        let size = cur.get_i64l()?;
        Ok(Self { header, size })
    }
}

pub fn tuple_items(env: &Environment, addr: MappedAddr) -> Result<Vec<MappedAddr>> {
    let t = TupleObject::read(env, addr)?;
    if t.size < 0 || t.size > MAX_ELEMENTS {
        return Err(Error::InvalidObject("invalid_tuple_size"));
    }
    let mut cur = env
        .store()
        .read(addr.offset_bytes(VAR_HEADER_SIZE as i64), t.size as u64 * 8)?;
    read_ptr_array(&mut cur, t.size as usize)
}

pub fn validate_tuple(env: &Environment, addr: MappedAddr) -> Option<Reason> {
    let Ok(t) = TupleObject::read(env, addr) else {
        return Some("unreadable_object");
    };
    if t.size < 0 || t.size > MAX_ELEMENTS {
        return Some("invalid_tuple_size");
    }
    let Ok(items) = tuple_items(env, addr) else {
        return Some("invalid_tuple_items_range");
    };
    for item in items {
        if let Some(reason) = shallow_reason(env, item) {
            return Some(reason);
        }
    }
    None
}

pub fn tuple_referents(env: &Environment, addr: MappedAddr) -> Result<HashSet<MappedAddr>> {
    Ok(tuple_items(env, addr)?.into_iter().collect())
}

#[derive(Debug, Clone, Copy)]
pub struct ListObject {
    pub header: ObjectHeader,
    pub size: i64,
    pub items: MappedAddr,
    pub allocated: i64,
}

impl ListObject {
    pub fn read(env: &Environment, addr: MappedAddr) -> Result<Self> {
        let mut cur = env.store().read(addr, LIST_SIZE)?;
        let header = ObjectHeader::parse(&mut cur)?;
        let size = cur.get_i64l()?;
        let items = MappedAddr::new(cur.get_u64l()?);
        let allocated = cur.get_i64l()?;
        Ok(Self {
            header,
            size,
            items,
            allocated,
        })
    }
}

pub fn list_items(env: &Environment, addr: MappedAddr) -> Result<Vec<MappedAddr>> {
    let l = ListObject::read(env, addr)?;
    if l.size < 0 || l.size > MAX_ELEMENTS {
        return Err(Error::InvalidObject("invalid_list_size"));
    }
    if l.size == 0 {
        return Ok(Vec::new());
    }
    let mut cur = env.store().read(l.items, l.size as u64 * 8)?;
    read_ptr_array(&mut cur, l.size as usize)
}

pub fn validate_list(env: &Environment, addr: MappedAddr) -> Option<Reason> {
    let Ok(l) = ListObject::read(env, addr) else {
        return Some("unreadable_object");
    };
    if l.size < 0 || l.allocated < 0 || l.size > l.allocated || l.allocated > MAX_ELEMENTS {
        return Some("invalid_list_size");
    }
    if l.size > 0 {
        if !env.store().obj_valid(l.items, 8, l.size as u64 * 8) {
            return Some("invalid_list_items_ptr");
        }
        let Ok(items) = list_items(env, addr) else {
            return Some("invalid_list_items_range");
        };
        for item in items {
            if let Some(reason) = shallow_reason(env, item) {
                return Some(reason);
            }
        }
    }
    None
}

pub fn list_referents(env: &Environment, addr: MappedAddr) -> Result<HashSet<MappedAddr>> {
    Ok(list_items(env, addr)?.into_iter().collect())
}

pub(crate) fn read_ptr_array(cur: &mut Cursor<'_>, count: usize) -> Result<Vec<MappedAddr>> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(MappedAddr::new(cur.get_u64l()?));
    }
    Ok(out)
}

const _: () = assert!(LIST_SIZE == HEADER_SIZE + 24);

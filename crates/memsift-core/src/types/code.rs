//! Code objects: where a frame's behavior is defined.

use std::collections::HashSet;

use crate::addr::MappedAddr;
use crate::env::Environment;
use crate::error::Result;
use crate::types::{typed_reason, ObjectHeader, Reason, TypeKind};

/// code: `{header, co_filename: addr, co_name: addr, co_varnames: addr,
/// co_firstlineno: u32, co_argcount: u32}`
pub const SIZE: u64 = 48;

#[derive(Debug, Clone, Copy)]
pub struct CodeObject {
    pub header: ObjectHeader,
    pub filename: MappedAddr,
    pub name: MappedAddr,
    pub varnames: MappedAddr,
    pub firstlineno: u32,
    pub argcount: u32,
}

impl CodeObject {
    pub fn read(env: &Environment, addr: MappedAddr) -> Result<Self> {
        let mut cur = env.store().read(addr, SIZE)?;
        let header = ObjectHeader::parse(&mut cur)?;
        let filename = MappedAddr::new(cur.get_u64l()?);
        let name = MappedAddr::new(cur.get_u64l()?);
        let varnames = MappedAddr::new(cur.get_u64l()?);
        let firstlineno = cur.get_u32l()?;
        let argcount = cur.get_u32l()?;
        Ok(Self {
            header,
            filename,
            name,
            varnames,
            firstlineno,
            argcount,
        })
    }
}

pub fn validate(env: &Environment, addr: MappedAddr) -> Option<Reason> {
    let Ok(code) = CodeObject::read(env, addr) else {
        return Some("unreadable_object");
    };
    if !code.filename.is_null() {
        if let Some(reason) = typed_reason(env, code.filename, TypeKind::Str) {
            return Some(reason);
        }
    }
    if !code.name.is_null() {
        if let Some(reason) = typed_reason(env, code.name, TypeKind::Str) {
            return Some(reason);
        }
    }
    if !code.varnames.is_null() {
        if let Some(reason) = typed_reason(env, code.varnames, TypeKind::Tuple) {
            return Some(reason);
        }
    }
    None
}

pub fn direct_referents(env: &Environment, addr: MappedAddr) -> Result<HashSet<MappedAddr>> {
    let code = CodeObject::read(env, addr)?;
    Ok([code.filename, code.name, code.varnames].into_iter().collect())
}

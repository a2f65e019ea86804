//! Modules: a header plus the attribute dict. The module's name is the
//! dict's `"__name__"` value.

use std::collections::HashSet;

use crate::addr::MappedAddr;
use crate::env::Environment;
use crate::error::Result;
use crate::types::{dict, strings, typed_reason, ObjectHeader, Reason, TypeKind};

/// module: `{header, dict: addr}`
pub const SIZE: u64 = 24;

#[derive(Debug, Clone, Copy)]
pub struct ModuleObject {
    pub header: ObjectHeader,
    pub dict: MappedAddr,
}

impl ModuleObject {
    pub fn read(env: &Environment, addr: MappedAddr) -> Result<Self> {
        let mut cur = env.store().read(addr, SIZE)?;
        let header = ObjectHeader::parse(&mut cur)?;
        let dict = MappedAddr::new(cur.get_u64l()?);
        Ok(Self { header, dict })
    }
}

pub fn validate(env: &Environment, addr: MappedAddr) -> Option<Reason> {
    let Ok(module) = ModuleObject::read(env, addr) else {
        return Some("unreadable_object");
    };
    // The dict can be null for a torn-down module.
    if !module.dict.is_null() {
        if let Some(reason) = typed_reason(env, module.dict, TypeKind::Dict) {
            return Some(reason);
        }
    }
    None
}

/// The `"__name__"` attribute, when the module has a valid dict that
/// carries one.
pub fn module_name(env: &Environment, addr: MappedAddr) -> Result<Option<String>> {
    let module = ModuleObject::read(env, addr)?;
    if module.dict.is_null() {
        return Ok(None);
    }
    match dict::value_for_str_key(env, module.dict, "__name__")? {
        Some(value) => Ok(strings::decode_str(env, value).ok()),
        None => Ok(None),
    }
}

pub fn direct_referents(env: &Environment, addr: MappedAddr) -> Result<HashSet<MappedAddr>> {
    let module = ModuleObject::read(env, addr)?;
    let mut out = HashSet::new();
    out.insert(module.dict);
    Ok(out)
}

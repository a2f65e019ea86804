//! The meta-type: objects whose instances are themselves type descriptors.

use std::collections::HashSet;

use crate::addr::MappedAddr;
use crate::env::Environment;
use crate::error::Result;
use crate::memory::{Cursor, RegionStore};
use crate::types::{ObjectHeader, Reason};

/// `{header, name: addr, basicsize: u64, itemsize: u64, flags: u64}`
pub const SIZE: u64 = 48;

const MAX_NAME_LEN: usize = 255;
const MAX_BASIC_SIZE: u64 = 0x10000;
const MAX_ITEM_SIZE: u64 = 0x1000;

#[derive(Debug, Clone, Copy)]
pub struct TypeObject {
    pub header: ObjectHeader,
    pub name: MappedAddr,
    pub basicsize: u64,
    pub itemsize: u64,
    pub flags: u64,
}

impl TypeObject {
    pub fn parse(cur: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            header: ObjectHeader::parse(cur)?,
            name: MappedAddr::new(cur.get_u64l()?),
            basicsize: cur.get_u64l()?,
            itemsize: cur.get_u64l()?,
            flags: cur.get_u64l()?,
        })
    }

    pub fn parse_bytes(bytes: &[u8]) -> Result<Self> {
        Self::parse(&mut Cursor::new(bytes, 0))
    }

    pub fn read(env: &Environment, addr: MappedAddr) -> Result<Self> {
        Self::parse(&mut env.store().read(addr, SIZE)?)
    }

    /// The NUL-terminated name this type claims for itself.
    pub fn name_bytes(&self, store: &RegionStore) -> Result<Vec<u8>> {
        Ok(store.get_cstr(self.name)?.to_vec())
    }

    pub fn name(&self, store: &RegionStore) -> Result<String> {
        Ok(String::from_utf8_lossy(store.get_cstr(self.name)?).into_owned())
    }
}

/// Structural checks that do not need the type map: used both during
/// bootstrap (when no types are known yet) and as part of full validation.
pub fn validate_shape(store: &RegionStore, ty: &TypeObject) -> Option<Reason> {
    if ty.name.is_null() || !store.exists(ty.name) {
        return Some("invalid_type_name_ptr");
    }
    let Ok(name) = store.get_cstr(ty.name) else {
        return Some("invalid_type_name");
    };
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Some("invalid_type_name");
    }
    // Names are identifier-like: printable ASCII, no spaces.
    if !name.iter().all(|&b| (0x21..0x7F).contains(&b)) {
        return Some("invalid_type_name");
    }
    if ty.basicsize < super::HEADER_SIZE || ty.basicsize > MAX_BASIC_SIZE {
        return Some("invalid_type_basicsize");
    }
    if ty.itemsize > MAX_ITEM_SIZE {
        return Some("invalid_type_itemsize");
    }
    None
}

pub fn validate(env: &Environment, addr: MappedAddr) -> Option<Reason> {
    let Ok(ty) = TypeObject::read(env, addr) else {
        return Some("unreadable_object");
    };
    if !env.is_known_type(ty.header.type_of) {
        return Some("unknown_type");
    }
    validate_shape(env.store(), &ty)
}

pub fn direct_referents(_env: &Environment, _addr: MappedAddr) -> Result<HashSet<MappedAddr>> {
    // The name field points at a raw character string, not an object.
    Ok(HashSet::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x40000u64.to_le_bytes());
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.extend_from_slice(&0x41000u64.to_le_bytes());
        bytes.extend_from_slice(&40u64.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        let ty = TypeObject::parse_bytes(&bytes).unwrap();
        assert_eq!(ty.header.type_of.get(), 0x40000);
        assert_eq!(ty.name.get(), 0x41000);
        assert_eq!(ty.basicsize, 40);
    }
}

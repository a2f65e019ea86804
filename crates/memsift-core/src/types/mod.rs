//! Decoders for the target runtime's object layouts.
//!
//! Every supported type knows its size, how to decide whether bytes at an
//! address plausibly form one of its instances, which target addresses the
//! object references, and how to pretty-print itself. Dispatch is keyed on
//! the object's "type-of" pointer (the first field of every object header)
//! through the environment's type map, not on a trait-object hierarchy.
//!
//! Layouts are pinned for one target-runtime version; supporting another
//! version means replacing this module, not the rest of the analyzer.

pub mod asyncobj;
pub mod code;
pub mod dict;
pub mod frame;
pub mod module;
pub mod scalars;
pub mod seq;
pub mod set;
pub mod strings;
pub mod thread;
pub mod typeobj;

use std::collections::HashSet;

use crate::addr::MappedAddr;
use crate::env::Environment;
use crate::error::Result;
use crate::memory::Cursor;

/// All objects begin with `{type_of: addr, refcnt: u64}`.
pub const HEADER_SIZE: u64 = 16;
/// Variable-size objects extend the header with `ob_size: i64`.
pub const VAR_HEADER_SIZE: u64 = 24;

/// Why an object failed validation. Short, machine-checkable, and shown in
/// repr output as `<T !reason>`.
pub type Reason = &'static str;

/// The fixed set of decodable target-runtime types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Type,
    None,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    Tuple,
    List,
    Dict,
    Set,
    Module,
    Frame,
    Code,
    Task,
    Future,
    GatheringFuture,
}

impl TypeKind {
    /// Map a type name from the environment to its decoder. Collision
    /// suffixes (`name+ADDR`) are stripped first.
    pub fn from_name(name: &str) -> Option<Self> {
        let base = name.split('+').next().unwrap_or(name);
        Some(match base {
            "type" => Self::Type,
            "NoneType" => Self::None,
            "bool" => Self::Bool,
            "int" => Self::Int,
            "float" => Self::Float,
            "str" => Self::Str,
            "bytes" => Self::Bytes,
            "tuple" => Self::Tuple,
            "list" => Self::List,
            "dict" => Self::Dict,
            "set" => Self::Set,
            "module" => Self::Module,
            "frame" => Self::Frame,
            "code" => Self::Code,
            "_asyncio.Task" => Self::Task,
            "_asyncio.Future" => Self::Future,
            "_GatheringFuture" => Self::GatheringFuture,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::None => "NoneType",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Bytes => "bytes",
            Self::Tuple => "tuple",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Set => "set",
            Self::Module => "module",
            Self::Frame => "frame",
            Self::Code => "code",
            Self::Task => "_asyncio.Task",
            Self::Future => "_asyncio.Future",
            Self::GatheringFuture => "_GatheringFuture",
        }
    }
}

/// The common object header: the type-of pointer at offset 0, then the
/// reference count.
#[derive(Debug, Clone, Copy)]
pub struct ObjectHeader {
    pub type_of: MappedAddr,
    pub refcnt: u64,
}

impl ObjectHeader {
    pub fn parse(cur: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            type_of: MappedAddr::new(cur.get_u64l()?),
            refcnt: cur.get_u64l()?,
        })
    }

    pub fn read(env: &Environment, addr: MappedAddr) -> Result<Self> {
        Self::parse(&mut env.store().read(addr, HEADER_SIZE)?)
    }
}

/// Header-level check: the address is non-null, aligned, readable, and its
/// self-claimed type is one of the known type addresses. This is as deep
/// as validators look at objects one pointer hop away; the full per-type
/// validator runs when traversal actually visits them.
pub fn shallow_reason(env: &Environment, addr: MappedAddr) -> Option<Reason> {
    if addr.is_null() {
        return Some("null_object");
    }
    if !addr.is_aligned(8) {
        return Some("misaligned_object");
    }
    let Ok(header) = ObjectHeader::read(env, addr) else {
        return Some("unreadable_object");
    };
    if env.kind_of(header.type_of).is_none() {
        return Some("unknown_type");
    }
    None
}

/// Shallow check plus "the object's type is exactly `kind`".
pub fn typed_reason(env: &Environment, addr: MappedAddr, kind: TypeKind) -> Option<Reason> {
    if let Some(reason) = shallow_reason(env, addr) {
        return Some(reason);
    }
    let Ok(header) = ObjectHeader::read(env, addr) else {
        return Some("unreadable_object");
    };
    if env.kind_of(header.type_of) != Some(kind) {
        return Some("wrong_type");
    }
    None
}

/// Full validation of the object at `addr`, dispatched on its type-of
/// pointer. `None` means the bytes plausibly form a valid object.
pub fn validate(env: &Environment, addr: MappedAddr) -> Option<Reason> {
    if let Some(reason) = shallow_reason(env, addr) {
        return Some(reason);
    }
    let Ok(header) = ObjectHeader::read(env, addr) else {
        return Some("unreadable_object");
    };
    let Some(kind) = env.kind_of(header.type_of) else {
        return Some("unknown_type");
    };
    match kind {
        TypeKind::Type => typeobj::validate(env, addr),
        TypeKind::None | TypeKind::Bool | TypeKind::Int | TypeKind::Float => {
            scalars::validate(env, addr, kind)
        }
        TypeKind::Str => strings::validate_str(env, addr),
        TypeKind::Bytes => strings::validate_bytes(env, addr),
        TypeKind::Tuple => seq::validate_tuple(env, addr),
        TypeKind::List => seq::validate_list(env, addr),
        TypeKind::Dict => dict::validate(env, addr),
        TypeKind::Set => set::validate(env, addr),
        TypeKind::Module => module::validate(env, addr),
        TypeKind::Frame => frame::validate(env, addr),
        TypeKind::Code => code::validate(env, addr),
        TypeKind::Task | TypeKind::Future | TypeKind::GatheringFuture => {
            asyncobj::validate(env, addr, kind)
        }
    }
}

/// Addresses stored as outgoing references in the object's own bytes (or
/// its directly indexed side tables). Never a deep walk. Errors from
/// structural reads mean the object should be treated as referencing
/// nothing.
pub fn direct_referents(env: &Environment, addr: MappedAddr) -> Result<HashSet<MappedAddr>> {
    let header = ObjectHeader::read(env, addr)?;
    let Some(kind) = env.kind_of(header.type_of) else {
        return Ok(HashSet::new());
    };
    match kind {
        TypeKind::Type
        | TypeKind::None
        | TypeKind::Bool
        | TypeKind::Int
        | TypeKind::Float
        | TypeKind::Str
        | TypeKind::Bytes => Ok(HashSet::new()),
        TypeKind::Tuple => seq::tuple_referents(env, addr),
        TypeKind::List => seq::list_referents(env, addr),
        TypeKind::Dict => dict::direct_referents(env, addr),
        TypeKind::Set => set::direct_referents(env, addr),
        TypeKind::Module => module::direct_referents(env, addr),
        TypeKind::Frame => frame::direct_referents(env, addr),
        TypeKind::Code => code::direct_referents(env, addr),
        TypeKind::Task | TypeKind::Future | TypeKind::GatheringFuture => {
            asyncobj::direct_referents(env, addr, kind)
        }
    }
}

/// The decoder for the type of the object at `addr`, if its type is known.
pub fn object_kind(env: &Environment, addr: MappedAddr) -> Option<TypeKind> {
    let header = ObjectHeader::read(env, addr).ok()?;
    env.kind_of(header.type_of)
}

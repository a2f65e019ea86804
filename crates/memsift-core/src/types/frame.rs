//! Execution frames and the stack structure they form through `f_back`.

use std::collections::HashSet;

use crate::addr::MappedAddr;
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::types::{code, seq, typed_reason, ObjectHeader, Reason, TypeKind};

/// Fixed part of a frame; the inline tail of local-variable slots starts
/// here and parallels the code object's var-names tuple.
pub const FIXED_SIZE: u64 = 104;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Created,
    Suspended,
    Executing,
    Returned,
    Unwinding,
    Raised,
    Cleared,
}

impl FrameState {
    pub fn from_raw(raw: i8) -> Option<Self> {
        Some(match raw {
            -2 => Self::Created,
            -1 => Self::Suspended,
            0 => Self::Executing,
            1 => Self::Returned,
            2 => Self::Unwinding,
            3 => Self::Raised,
            4 => Self::Cleared,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Suspended => "suspended",
            Self::Executing => "executing",
            Self::Returned => "returned",
            Self::Unwinding => "unwinding",
            Self::Raised => "raised",
            Self::Cleared => "cleared",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameObject {
    pub header: ObjectHeader,
    pub back: MappedAddr,
    pub code: MappedAddr,
    pub builtins: MappedAddr,
    pub globals: MappedAddr,
    pub locals: MappedAddr,
    pub valuestack: MappedAddr,
    pub trace: MappedAddr,
    pub gen: MappedAddr,
    pub lasti: i32,
    pub lineno: i32,
    pub stackdepth: i32,
    pub iblock: i32,
    pub state_raw: i8,
}

impl FrameObject {
    pub fn read(env: &Environment, addr: MappedAddr) -> Result<Self> {
        let mut cur = env.store().read(addr, FIXED_SIZE)?;
        let header = ObjectHeader::parse(&mut cur)?;
        let back = MappedAddr::new(cur.get_u64l()?);
        let code = MappedAddr::new(cur.get_u64l()?);
        let builtins = MappedAddr::new(cur.get_u64l()?);
        let globals = MappedAddr::new(cur.get_u64l()?);
        let locals = MappedAddr::new(cur.get_u64l()?);
        let valuestack = MappedAddr::new(cur.get_u64l()?);
        let trace = MappedAddr::new(cur.get_u64l()?);
        let gen = MappedAddr::new(cur.get_u64l()?);
        let lasti = cur.get_i32l()?;
        let lineno = cur.get_i32l()?;
        let stackdepth = cur.get_i32l()?;
        let iblock = cur.get_i32l()?;
        let state_raw = cur.get_i8()?;
        Ok(Self {
            header,
            back,
            code,
            builtins,
            globals,
            locals,
            valuestack,
            trace,
            gen,
            lasti,
            lineno,
            stackdepth,
            iblock,
            state_raw,
        })
    }

    pub fn state(&self) -> Option<FrameState> {
        FrameState::from_raw(self.state_raw)
    }

    pub fn state_name(&self) -> String {
        match self.state() {
            Some(state) => state.name().to_string(),
            None => format!("state:{:02X}", self.state_raw as u8),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == Some(FrameState::Executing)
    }

    /// Executing now, or paused in a way that can resume.
    pub fn is_runnable_or_running(&self) -> bool {
        matches!(
            self.state(),
            Some(FrameState::Created | FrameState::Suspended | FrameState::Executing)
        )
    }
}

/// Local variable names from the code object's var-names tuple, paired
/// with the frame's inline slot tail. Slots holding null stay in the list
/// so callers see unbound locals.
pub fn locals(env: &Environment, addr: MappedAddr) -> Result<Vec<(MappedAddr, MappedAddr)>> {
    let frame = FrameObject::read(env, addr)?;
    if frame.code.is_null() {
        return Ok(Vec::new());
    }
    let code = code::CodeObject::read(env, frame.code)?;
    let names = seq::tuple_items(env, code.varnames)?;
    let mut slots = env
        .store()
        .read(addr.offset_bytes(FIXED_SIZE as i64), names.len() as u64 * 8)?;
    let slots = seq::read_ptr_array(&mut slots, names.len())?;
    Ok(names.into_iter().zip(slots).collect())
}

pub fn validate(env: &Environment, addr: MappedAddr) -> Option<Reason> {
    let Ok(frame) = FrameObject::read(env, addr) else {
        return Some("unreadable_object");
    };
    if frame.state().is_none() {
        return Some("invalid_f_state");
    }
    let store = env.store();
    if !store.obj_valid_or_null(frame.back, 8, super::HEADER_SIZE) {
        return Some("invalid_f_back");
    }
    if !store.obj_valid_or_null(frame.code, 8, super::HEADER_SIZE) {
        return Some("invalid_f_code");
    }
    if !store.obj_valid_or_null(frame.builtins, 8, super::HEADER_SIZE) {
        return Some("invalid_f_builtins");
    }
    if !store.obj_valid_or_null(frame.globals, 8, super::HEADER_SIZE) {
        return Some("invalid_f_globals");
    }
    if !store.obj_valid_or_null(frame.locals, 8, super::HEADER_SIZE) {
        return Some("invalid_f_locals");
    }
    if !store.obj_valid_or_null(frame.valuestack, 1, 1) {
        return Some("invalid_f_valuestack");
    }
    if !store.obj_valid_or_null(frame.trace, 1, 1) {
        return Some("invalid_f_trace");
    }
    if !store.obj_valid_or_null(frame.gen, 1, 1) {
        return Some("invalid_f_gen");
    }

    if !frame.code.is_null() {
        if let Some(reason) = typed_reason(env, frame.code, TypeKind::Code) {
            return Some(reason);
        }
        if let Some(reason) = code::validate(env, frame.code) {
            return Some(reason);
        }
        let Ok(code_obj) = code::CodeObject::read(env, frame.code) else {
            return Some("invalid_f_code");
        };
        if let Some(reason) = typed_reason(env, code_obj.varnames, TypeKind::Tuple) {
            return Some(reason);
        }
        let Ok(names) = seq::tuple_items(env, code_obj.varnames) else {
            return Some("invalid_f_code");
        };
        // The inline slot tail must fit alongside the var-names tuple.
        if !store.exists_range(addr, FIXED_SIZE + names.len() as u64 * 8) {
            return Some("invalid_f_localsplus_range");
        }
        for name in &names {
            if let Some(reason) = typed_reason(env, *name, TypeKind::Str) {
                return Some(reason);
            }
        }
        let Ok(pairs) = locals(env, addr) else {
            return Some("invalid_f_localsplus_range");
        };
        for (_, value) in pairs {
            if !value.is_null() {
                if let Some(reason) = super::shallow_reason(env, value) {
                    return Some(reason);
                }
            }
        }
    }
    None
}

pub fn direct_referents(env: &Environment, addr: MappedAddr) -> Result<HashSet<MappedAddr>> {
    let frame = FrameObject::read(env, addr)?;
    let mut out: HashSet<MappedAddr> = [
        frame.back,
        frame.code,
        frame.builtins,
        frame.globals,
        frame.locals,
        frame.trace,
        frame.gen,
    ]
    .into_iter()
    .collect();
    match locals(env, addr) {
        Ok(pairs) => {
            for (name, value) in pairs {
                out.insert(name);
                out.insert(value);
            }
        }
        Err(Error::OutOfRange { .. }) | Err(Error::InvalidObject(_)) => {}
        Err(e) => return Err(e),
    }
    Ok(out)
}

//! Futures, tasks, and gathering futures: the awaiter graph's node types.
//!
//! A task awaits whatever `fut_waiter` points at; a plain future awaits
//! nothing; a gathering future awaits every element of its children list.

use std::collections::HashSet;

use crate::addr::MappedAddr;
use crate::env::Environment;
use crate::error::Result;
use crate::types::{seq, typed_reason, ObjectHeader, Reason, TypeKind};

/// future: `{header, fut_loop: addr, fut_result: addr, fut_state: u32, pad}`
pub const FUTURE_SIZE: u64 = 40;
/// task: future + `{fut_waiter: addr, task_coro: addr}`
pub const TASK_SIZE: u64 = 56;
/// gathering future: future + `{children: addr}`
pub const GATHERING_SIZE: u64 = 48;

pub const STATE_PENDING: u32 = 0;
pub const STATE_CANCELLED: u32 = 1;
pub const STATE_FINISHED: u32 = 2;

#[derive(Debug, Clone, Copy)]
pub struct FutureObject {
    pub header: ObjectHeader,
    pub fut_loop: MappedAddr,
    pub result: MappedAddr,
    pub state: u32,
    /// Task only; null for the other kinds.
    pub waiter: MappedAddr,
    /// Task only.
    pub coro: MappedAddr,
    /// Gathering future only.
    pub children: MappedAddr,
}

impl FutureObject {
    pub fn read(env: &Environment, addr: MappedAddr, kind: TypeKind) -> Result<Self> {
        let size = match kind {
            TypeKind::Task => TASK_SIZE,
            TypeKind::GatheringFuture => GATHERING_SIZE,
            _ => FUTURE_SIZE,
        };
        let mut cur = env.store().read(addr, size)?;
        let header = ObjectHeader::parse(&mut cur)?;
        let fut_loop = MappedAddr::new(cur.get_u64l()?);
        let result = MappedAddr::new(cur.get_u64l()?);
        let state = cur.get_u32l()?;
        cur.get_u32l()?; // pad
        let mut waiter = MappedAddr::NULL;
        let mut coro = MappedAddr::NULL;
        let mut children = MappedAddr::NULL;
        match kind {
            TypeKind::Task => {
                waiter = MappedAddr::new(cur.get_u64l()?);
                coro = MappedAddr::new(cur.get_u64l()?);
            }
            TypeKind::GatheringFuture => {
                children = MappedAddr::new(cur.get_u64l()?);
            }
            _ => {}
        }
        Ok(Self {
            header,
            fut_loop,
            result,
            state,
            waiter,
            coro,
            children,
        })
    }

    pub fn state_name(&self) -> String {
        match self.state {
            STATE_PENDING => "pending".to_string(),
            STATE_CANCELLED => "cancelled".to_string(),
            STATE_FINISHED => "finished".to_string(),
            other => format!("state:{}", other),
        }
    }
}

pub fn validate(env: &Environment, addr: MappedAddr, kind: TypeKind) -> Option<Reason> {
    let Ok(fut) = FutureObject::read(env, addr, kind) else {
        return Some("unreadable_object");
    };
    if fut.state > STATE_FINISHED {
        return Some("invalid_fut_state");
    }
    let store = env.store();
    if !store.obj_valid_or_null(fut.fut_loop, 8, super::HEADER_SIZE) {
        return Some("invalid_fut_loop");
    }
    if !store.obj_valid_or_null(fut.result, 8, super::HEADER_SIZE) {
        return Some("invalid_fut_result");
    }
    match kind {
        TypeKind::Task => {
            if !store.obj_valid_or_null(fut.waiter, 8, super::HEADER_SIZE) {
                return Some("invalid_fut_waiter");
            }
            if !store.obj_valid_or_null(fut.coro, 8, super::HEADER_SIZE) {
                return Some("invalid_task_coro");
            }
        }
        TypeKind::GatheringFuture => {
            if fut.children.is_null() {
                return Some("invalid_gather_children");
            }
            if let Some(reason) = typed_reason(env, fut.children, TypeKind::List) {
                return Some(reason);
            }
        }
        _ => {}
    }
    None
}

/// Awaited children of a gathering future: the elements of its list.
pub fn children(env: &Environment, addr: MappedAddr) -> Result<Vec<MappedAddr>> {
    let fut = FutureObject::read(env, addr, TypeKind::GatheringFuture)?;
    seq::list_items(env, fut.children)
}

pub fn direct_referents(
    env: &Environment,
    addr: MappedAddr,
    kind: TypeKind,
) -> Result<HashSet<MappedAddr>> {
    let fut = FutureObject::read(env, addr, kind)?;
    let mut out = HashSet::new();
    out.insert(fut.fut_loop);
    out.insert(fut.result);
    match kind {
        TypeKind::Task => {
            out.insert(fut.waiter);
            out.insert(fut.coro);
        }
        TypeKind::GatheringFuture => {
            out.insert(fut.children);
            for child in children(env, addr)? {
                out.insert(child);
            }
        }
        _ => {}
    }
    Ok(out)
}

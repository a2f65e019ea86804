//! Thread states. These are interpreter bookkeeping records, not heap
//! objects: they carry no type-of header and are recognized purely
//! structurally, anchored by a valid current frame.

use crate::addr::MappedAddr;
use crate::env::Environment;
use crate::error::Result;
use crate::memory::Cursor;
use crate::types::{frame, typed_reason, Reason, TypeKind};

/// `{next: addr, interp: addr, frame: addr, thread_id: u64}`
pub const SIZE: u64 = 32;

#[derive(Debug, Clone, Copy)]
pub struct ThreadState {
    pub next: MappedAddr,
    pub interp: MappedAddr,
    pub frame: MappedAddr,
    pub thread_id: u64,
}

impl ThreadState {
    pub fn parse(cur: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            next: MappedAddr::new(cur.get_u64l()?),
            interp: MappedAddr::new(cur.get_u64l()?),
            frame: MappedAddr::new(cur.get_u64l()?),
            thread_id: cur.get_u64l()?,
        })
    }

    pub fn parse_bytes(bytes: &[u8]) -> Result<Self> {
        Self::parse(&mut Cursor::new(bytes, 0))
    }

    pub fn read(env: &Environment, addr: MappedAddr) -> Result<Self> {
        Self::parse(&mut env.store().read(addr, SIZE)?)
    }
}

/// Without a header to anchor on, the frame pointer does the heavy
/// lifting: it must reference a fully valid frame object. That keeps the
/// sweep from matching arbitrary pointer-dense memory.
pub fn validate(env: &Environment, addr: MappedAddr) -> Option<Reason> {
    let Ok(ts) = ThreadState::read(env, addr) else {
        return Some("unreadable_object");
    };
    if ts.thread_id == 0 {
        return Some("invalid_thread_id");
    }
    if !env.store().obj_valid_or_null(ts.next, 8, SIZE) {
        return Some("invalid_ts_next");
    }
    if ts.interp.is_null() || !env.store().obj_valid(ts.interp, 8, 8) {
        return Some("invalid_ts_interp");
    }
    if ts.frame.is_null() {
        return Some("invalid_ts_frame");
    }
    if let Some(reason) = typed_reason(env, ts.frame, TypeKind::Frame) {
        return Some(reason);
    }
    if let Some(reason) = frame::validate(env, ts.frame) {
        return Some(reason);
    }
    None
}

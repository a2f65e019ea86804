//! None, bool, int, and float: header plus at most one inline value.

use crate::addr::MappedAddr;
use crate::env::Environment;
use crate::error::Result;
use crate::types::{Reason, TypeKind, HEADER_SIZE};

pub const NONE_SIZE: u64 = 16;
pub const VALUE_SIZE: u64 = 24;

pub fn validate(env: &Environment, addr: MappedAddr, kind: TypeKind) -> Option<Reason> {
    let store = env.store();
    match kind {
        TypeKind::None => {
            if !store.exists_range(addr, NONE_SIZE) {
                return Some("unreadable_object");
            }
        }
        TypeKind::Bool => {
            let Ok(value) = bool_value(env, addr) else {
                return Some("unreadable_object");
            };
            if value > 1 {
                return Some("invalid_bool_value");
            }
        }
        TypeKind::Int | TypeKind::Float => {
            if !store.exists_range(addr, VALUE_SIZE) {
                return Some("unreadable_object");
            }
        }
        _ => unreachable!("scalar validator dispatched for {:?}", kind),
    }
    None
}

pub fn bool_value(env: &Environment, addr: MappedAddr) -> Result<u64> {
    env.store().read_u64(addr.offset_bytes(HEADER_SIZE as i64))
}

pub fn int_value(env: &Environment, addr: MappedAddr) -> Result<i64> {
    env.store()
        .read(addr.offset_bytes(HEADER_SIZE as i64), 8)?
        .get_i64l()
}

pub fn float_value(env: &Environment, addr: MappedAddr) -> Result<f64> {
    env.store()
        .read(addr.offset_bytes(HEADER_SIZE as i64), 8)?
        .get_f64l()
}

/// Inline repr for a scalar. Floats always carry a decimal point or
/// exponent so they are distinguishable from ints.
pub fn repr(env: &Environment, addr: MappedAddr, kind: TypeKind) -> Result<String> {
    Ok(match kind {
        TypeKind::None => "None".to_string(),
        TypeKind::Bool => {
            if bool_value(env, addr)? != 0 {
                "True".to_string()
            } else {
                "False".to_string()
            }
        }
        TypeKind::Int => int_value(env, addr)?.to_string(),
        TypeKind::Float => {
            let value = float_value(env, addr)?;
            if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e16 {
                format!("{:.1}", value)
            } else {
                format!("{}", value)
            }
        }
        _ => unreachable!("scalar repr dispatched for {:?}", kind),
    })
}

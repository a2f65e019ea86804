//! Offline forensic analysis of process-memory snapshots.
//!
//! A snapshot is a set of raw memory regions captured from a paused target
//! process. This crate maps those regions, sweeps them in parallel,
//! reconstructs the target runtime's heap objects from their pinned
//! C-level layouts, and answers investigative queries over the resulting
//! reference graph.

pub mod addr;
pub mod env;
pub mod error;
pub mod memory;
pub mod query;
pub mod traverse;
pub mod types;
pub mod util;

pub use addr::MappedAddr;
pub use env::{Environment, TypeInsert};
pub use error::{Error, Result};
pub use memory::{Cursor, RegionStore, ScanConfig};
pub use query::{QueryConfig, StacksReport, StringStats, TaskGraph, TypeCount};
pub use traverse::{ReprOptions, Traversal};
pub use types::TypeKind;
pub use util::format_size;

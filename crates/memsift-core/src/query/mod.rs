//! Investigative queries composed from the scanner and the type catalog.
//!
//! Every query sweeps the snapshot once, accumulates results behind a
//! single mutex (or per-thread accumulators merged after the join), and
//! returns sorted data so output is deterministic. A bad object never
//! terminates a sweep; it is simply skipped.

mod stacks;
mod strings;
mod tasks;

pub use stacks::{find_all_stacks, find_all_threads, StacksReport, Traceback};
pub use strings::{aggregate_strings, StringStats, SIZE_BUCKETS};
pub use tasks::{async_task_graph, TaskGraph};

use std::collections::HashMap;
use std::sync::Mutex;

use crate::addr::MappedAddr;
use crate::env::Environment;
use crate::error::Result;
use crate::memory::ScanConfig;
use crate::traverse::ReprOptions;
use crate::types::{self, module, ObjectHeader, HEADER_SIZE};

/// How a query runs its sweep.
#[derive(Debug, Clone, Copy)]
pub struct QueryConfig {
    /// Worker thread count; 0 means available parallelism.
    pub threads: usize,
    /// Print scan progress to stderr.
    pub progress: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            progress: true,
        }
    }
}

impl QueryConfig {
    fn effective_threads(&self) -> usize {
        if self.threads != 0 {
            return self.threads;
        }
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
    }

    fn scan(&self, stride: u64, object_size: u64) -> ScanConfig {
        ScanConfig {
            stride,
            threads: self.effective_threads(),
            object_size,
            progress: self.progress,
        }
    }
}

/// An address paired with its rendered representation.
pub type ReprHit = (MappedAddr, String);

/// Raw byte search over all readable memory. Addresses are returned
/// sorted. The common pointer case (8 aligned bytes) compares words
/// directly instead of memcmp-ing slices.
pub fn find_data(
    env: &Environment,
    needle: &[u8],
    alignment: u64,
    cfg: &QueryConfig,
) -> Vec<MappedAddr> {
    let hits: Mutex<Vec<MappedAddr>> = Mutex::new(Vec::new());
    if needle.len() == 8 && alignment == 8 {
        let target = u64::from_le_bytes(needle.try_into().unwrap());
        env.store().scan(&cfg.scan(8, 8), |bytes, addr, _| {
            let value = u64::from_le_bytes(bytes.try_into().unwrap());
            if value == target {
                hits.lock().unwrap().push(addr);
            }
        });
    } else {
        env.store()
            .scan(&cfg.scan(alignment, needle.len() as u64), |bytes, addr, _| {
                if bytes == needle {
                    hits.lock().unwrap().push(addr);
                }
            });
    }
    let mut hits = hits.into_inner().unwrap();
    hits.sort_unstable();
    hits
}

/// One row of the count-by-type report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCount {
    pub count: u64,
    pub name: String,
    pub type_addr: MappedAddr,
}

/// Count validating instances of every known type. Counts accumulate in
/// per-thread maps (no sharing during the scan) and merge after the join.
pub fn count_by_type(env: &Environment, cfg: &QueryConfig) -> Result<Vec<TypeCount>> {
    if env.base_type().is_null() {
        return Err(crate::error::Error::MissingBaseType);
    }
    let threads = cfg.effective_threads();
    let per_thread: Vec<Mutex<HashMap<u64, u64>>> =
        (0..threads).map(|_| Mutex::new(HashMap::new())).collect();

    env.store()
        .scan(&cfg.scan(8, HEADER_SIZE), |bytes, addr, thread_index| {
            let Ok(header) = ObjectHeader::parse(&mut crate::memory::Cursor::new(bytes, 0)) else {
                return;
            };
            if !env.is_known_type(header.type_of) {
                return;
            }
            if env.invalid_reason(addr).is_some() {
                return;
            }
            *per_thread[thread_index]
                .lock()
                .unwrap()
                .entry(header.type_of.get())
                .or_insert(0) += 1;
        });

    let mut merged: HashMap<u64, u64> = HashMap::new();
    for acc in per_thread {
        for (type_addr, count) in acc.into_inner().unwrap() {
            *merged.entry(type_addr).or_insert(0) += count;
        }
    }

    let mut rows: Vec<TypeCount> = merged
        .into_iter()
        .filter_map(|(type_addr, count)| {
            let addr = MappedAddr::new(type_addr);
            env.type_name(addr).map(|name| TypeCount {
                count,
                name: name.to_string(),
                type_addr: addr,
            })
        })
        .collect();
    rows.sort_by(|a, b| (a.count, &a.name).cmp(&(b.count, &b.name)));
    Ok(rows)
}

/// Result of a find-all-objects sweep.
#[derive(Debug)]
pub struct ObjectsFound {
    pub count: usize,
    /// Empty when the query ran in count-only mode.
    pub items: Vec<ReprHit>,
}

/// All validating objects whose type-of pointer equals `type_addr`.
pub fn find_all_objects(
    env: &Environment,
    type_addr: MappedAddr,
    opts: ReprOptions,
    count_only: bool,
    cfg: &QueryConfig,
) -> ObjectsFound {
    let count = std::sync::atomic::AtomicUsize::new(0);
    let items: Mutex<Vec<ReprHit>> = Mutex::new(Vec::new());

    env.store().scan(&cfg.scan(8, HEADER_SIZE), |bytes, addr, _| {
        let Ok(header) = ObjectHeader::parse(&mut crate::memory::Cursor::new(bytes, 0)) else {
            return;
        };
        if header.type_of != type_addr {
            return;
        }
        if env.invalid_reason(addr).is_some() {
            return;
        }
        if count_only {
            count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return;
        }
        let mut t = env.traverse(opts);
        let repr = t.repr(addr);
        if !t.is_valid {
            return;
        }
        items.lock().unwrap().push((addr, repr));
    });

    let mut items = items.into_inner().unwrap();
    items.sort_by_key(|(addr, _)| *addr);
    let count = if count_only {
        count.into_inner()
    } else {
        items.len()
    };
    ObjectsFound { count, items }
}

/// All validating objects whose direct referents include `target`.
/// Referent extraction looks only at each object's own bytes plus its
/// directly indexed side tables, never a deep walk.
pub fn find_references(
    env: &Environment,
    target: MappedAddr,
    opts: ReprOptions,
    cfg: &QueryConfig,
) -> Vec<ReprHit> {
    let items: Mutex<Vec<ReprHit>> = Mutex::new(Vec::new());

    env.store().scan(&cfg.scan(8, HEADER_SIZE), |_, addr, _| {
        if env.invalid_reason(addr).is_some() {
            return;
        }
        let referents = match types::direct_referents(env, addr) {
            Ok(referents) => referents,
            Err(_) => return,
        };
        if !referents.contains(&target) {
            return;
        }
        let mut t = env.traverse(opts);
        let repr = t.repr(addr);
        if !t.is_valid {
            return;
        }
        items.lock().unwrap().push((addr, repr));
    });

    let mut items = items.into_inner().unwrap();
    items.sort_by_key(|(addr, _)| *addr);
    items
}

/// All modules whose dict's `"__name__"` decodes to `name`.
pub fn find_module(
    env: &Environment,
    name: &str,
    opts: ReprOptions,
    cfg: &QueryConfig,
) -> Result<Vec<ReprHit>> {
    let module_type = env.get_type("module")?;
    let items: Mutex<Vec<ReprHit>> = Mutex::new(Vec::new());

    env.store().scan(&cfg.scan(8, HEADER_SIZE), |bytes, addr, _| {
        let Ok(header) = ObjectHeader::parse(&mut crate::memory::Cursor::new(bytes, 0)) else {
            return;
        };
        if header.type_of != module_type {
            return;
        }
        if env.invalid_reason(addr).is_some() {
            return;
        }
        match module::module_name(env, addr) {
            Ok(Some(found)) if found == name => {}
            _ => return,
        }
        let mut t = env.traverse(opts);
        let repr = t.repr(addr);
        if !t.is_valid {
            return;
        }
        items.lock().unwrap().push((addr, repr));
    });

    let mut items = items.into_inner().unwrap();
    items.sort_by_key(|(addr, _)| *addr);
    Ok(items)
}

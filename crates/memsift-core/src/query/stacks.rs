//! Thread discovery and call-stack reconstruction.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use crate::addr::MappedAddr;
use crate::env::Environment;
use crate::error::Result;
use crate::memory::Cursor;
use crate::query::{QueryConfig, ReprHit};
use crate::traverse::{repr_thread, ReprOptions};
use crate::types::{frame, thread, ObjectHeader, HEADER_SIZE};

/// Structurally valid thread states, sorted by address.
pub fn find_all_threads(
    env: &Environment,
    opts: ReprOptions,
    cfg: &QueryConfig,
) -> Vec<ReprHit> {
    let items: Mutex<Vec<ReprHit>> = Mutex::new(Vec::new());

    env.store().scan(&cfg.scan(8, thread::SIZE), |_, addr, _| {
        if thread::validate(env, addr).is_some() {
            return;
        }
        let mut t = env.traverse(opts);
        let repr = repr_thread(&mut t, addr);
        if !t.is_valid {
            return;
        }
        items.lock().unwrap().push((addr, repr));
    });

    let mut items = items.into_inner().unwrap();
    items.sort_by_key(|(addr, _)| *addr);
    items
}

/// One reconstructed stack: the root frame (most recent call) and the
/// chain of prior frames behind it.
#[derive(Debug)]
pub struct Traceback {
    pub root: MappedAddr,
    pub frames: Vec<ReprHit>,
    /// Set when a back pointer referenced a frame missing from the
    /// discovered set; the chain stops there with a warning.
    pub missing_back: Option<MappedAddr>,
}

#[derive(Debug)]
pub struct StacksReport {
    pub tracebacks: Vec<Traceback>,
    /// Frames discovered but filtered out by the runnability predicate.
    pub skipped_frames: usize,
}

/// Collect running (or, with `include_runnable`, resumable) frames and
/// organize them into stacks. A root is a frame that is no other
/// discovered frame's back pointer.
pub fn find_all_stacks(
    env: &Environment,
    include_runnable: bool,
    opts: ReprOptions,
    cfg: &QueryConfig,
) -> Result<StacksReport> {
    let frame_type = env.get_type("frame")?;

    let back_for_frame: Mutex<BTreeMap<u64, MappedAddr>> = Mutex::new(BTreeMap::new());
    let skipped = std::sync::atomic::AtomicUsize::new(0);

    env.store().scan(&cfg.scan(8, HEADER_SIZE), |bytes, addr, _| {
        let Ok(header) = ObjectHeader::parse(&mut Cursor::new(bytes, 0)) else {
            return;
        };
        if header.type_of != frame_type {
            return;
        }
        if env.invalid_reason(addr).is_some() {
            return;
        }
        let Ok(f) = frame::FrameObject::read(env, addr) else {
            return;
        };
        let wanted = if include_runnable {
            f.is_runnable_or_running()
        } else {
            f.is_running()
        };
        if !wanted {
            skipped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return;
        }
        back_for_frame.lock().unwrap().insert(addr.get(), f.back);
    });

    let back_for_frame = back_for_frame.into_inner().unwrap();

    // Roots: discovered frames that nobody points back to.
    let mut roots: Vec<u64> = back_for_frame.keys().copied().collect();
    let backs: HashSet<u64> = back_for_frame.values().map(|a| a.get()).collect();
    roots.retain(|addr| !backs.contains(addr));

    let mut tracebacks = Vec::new();
    for root in roots {
        let mut frames = Vec::new();
        let mut missing_back = None;
        let mut seen = HashSet::new();
        let mut current = MappedAddr::new(root);
        while !current.is_null() {
            let Some(back) = back_for_frame.get(&current.get()) else {
                // The previous frame pointed here, but this frame was
                // never discovered (or was filtered out).
                missing_back = Some(current);
                break;
            };
            if !seen.insert(current.get()) {
                break;
            }
            let mut t = env.traverse(ReprOptions {
                frame_omit_back: true,
                is_short: true,
                ..opts
            });
            frames.push((current, t.repr(current)));
            current = *back;
        }
        tracebacks.push(Traceback {
            root: MappedAddr::new(root),
            frames,
            missing_back,
        });
    }

    Ok(StacksReport {
        tracebacks,
        skipped_frames: skipped.into_inner(),
    })
}

//! The asynchronous awaiter graph.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Write;
use std::sync::Mutex;

use tracing::warn;

use crate::addr::MappedAddr;
use crate::env::Environment;
use crate::error::Result;
use crate::memory::Cursor;
use crate::query::QueryConfig;
use crate::traverse::ReprOptions;
use crate::types::{asyncobj, ObjectHeader, TypeKind, HEADER_SIZE};

/// Forward adjacency over discovered tasks and futures: node → the set of
/// objects it awaits. Roots are nodes that appear as keys but never as a
/// target.
#[derive(Debug)]
pub struct TaskGraph {
    pub edges: BTreeMap<u64, BTreeSet<u64>>,
    pub reprs: HashMap<u64, String>,
    pub roots: Vec<MappedAddr>,
}

/// Discover every Task, Future, and GatheringFuture and build the awaiter
/// relation. A task awaits its `fut_waiter`; a future awaits nothing; a
/// gathering future awaits each of its children.
pub fn async_task_graph(
    env: &Environment,
    opts: ReprOptions,
    cfg: &QueryConfig,
) -> Result<TaskGraph> {
    let task_type = env.get_type("_asyncio.Task")?;
    let future_type = env.get_type("_asyncio.Future")?;
    let gathering_type = env.get_type("_GatheringFuture")?;

    let state: Mutex<(BTreeMap<u64, BTreeSet<u64>>, HashMap<u64, String>)> =
        Mutex::new((BTreeMap::new(), HashMap::new()));

    env.store().scan(&cfg.scan(8, HEADER_SIZE), |bytes, addr, _| {
        let Ok(header) = ObjectHeader::parse(&mut Cursor::new(bytes, 0)) else {
            return;
        };
        let kind = if header.type_of == task_type {
            TypeKind::Task
        } else if header.type_of == future_type {
            TypeKind::Future
        } else if header.type_of == gathering_type {
            TypeKind::GatheringFuture
        } else {
            return;
        };
        if env.invalid_reason(addr).is_some() {
            return;
        }

        let mut t = env.traverse(ReprOptions {
            is_short: true,
            ..opts
        });
        let repr = t.repr(addr);
        if !t.is_valid {
            return;
        }

        let mut targets = BTreeSet::new();
        match kind {
            TypeKind::Task => {
                let Ok(fut) = asyncobj::FutureObject::read(env, addr, kind) else {
                    return;
                };
                targets.insert(fut.waiter.get());
            }
            TypeKind::GatheringFuture => match asyncobj::children(env, addr) {
                Ok(children) => {
                    for child in children {
                        targets.insert(child.get());
                    }
                }
                Err(e) => {
                    warn!("{} gather missing children ({})", addr, e);
                }
            },
            _ => {}
        }

        let mut state = state.lock().unwrap();
        state.0.entry(addr.get()).or_default().extend(targets);
        state.1.insert(addr.get(), repr);
    });

    let (edges, reprs) = state.into_inner().unwrap();

    let mut awaited: HashSet<u64> = HashSet::new();
    for targets in edges.values() {
        awaited.extend(targets.iter().copied());
    }
    let roots: Vec<MappedAddr> = edges
        .keys()
        .copied()
        .filter(|addr| !awaited.contains(addr))
        .map(MappedAddr::new)
        .collect();

    Ok(TaskGraph { edges, reprs, roots })
}

impl TaskGraph {
    /// Indented tree of awaiters, one block per root. Already-printed
    /// nodes render as `<!seen>` markers; awaited targets missing from
    /// the discovered set get a warning line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            let mut seen = HashSet::new();
            self.render_node(&mut out, root.get(), 0, &mut seen);
        }
        out
    }

    fn render_node(&self, out: &mut String, addr: u64, depth: usize, seen: &mut HashSet<u64>) {
        if addr == 0 {
            return;
        }
        let addr_seen = !seen.insert(addr);
        let indent = "  ".repeat(depth);
        if addr_seen {
            let _ = writeln!(out, "{}<!seen>@{}", indent, MappedAddr::<()>::new(addr));
            return;
        }
        match self.reprs.get(&addr) {
            Some(repr) => {
                let _ = writeln!(out, "{}{}", indent, repr);
            }
            None => {
                let _ = writeln!(
                    out,
                    "{}<warning: await target @{} missing from graph>",
                    indent,
                    MappedAddr::<()>::new(addr)
                );
                return;
            }
        }
        if let Some(targets) = self.edges.get(&addr) {
            for &target in targets {
                self.render_node(out, target, depth + 1, seen);
            }
        }
    }
}

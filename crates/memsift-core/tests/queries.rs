//! Query-layer behavior over handcrafted snapshots.

mod common;

use common::{quiet_query, Fixture, HEAP};
use memsift_core::types::dict;
use memsift_core::{query, MappedAddr, ReprOptions};

fn addr(a: u64) -> MappedAddr {
    MappedAddr::new(a)
}

#[test]
fn dict_items_match_what_was_written() {
    let mut fixture = Fixture::new();
    let key_a = HEAP + 0x100;
    let key_b = HEAP + 0x140;
    let val_1 = HEAP + 0x180;
    let val_2 = HEAP + 0x1C0;
    fixture.put_str(key_a, "a");
    fixture.put_str(key_b, "b");
    fixture.put_int(val_1, 1);
    fixture.put_int(val_2, 2);
    fixture.put_dict(HEAP, HEAP + 0x200, &[(key_a, val_1), (key_b, val_2)]);
    let (_dir, env) = fixture.build();

    // Property 7: get_items yields exactly the written key/value pairs.
    let items = dict::get_items(&env, addr(HEAP)).unwrap();
    assert_eq!(
        items,
        vec![(addr(key_a), addr(val_1)), (addr(key_b), addr(val_2))]
    );

    // Property 4: every direct referent is null or mapped.
    assert!(env.invalid_reason(addr(HEAP)).is_none());
    for referent in env.direct_referents(addr(HEAP)).unwrap() {
        assert!(
            referent.is_null() || env.store().exists(referent),
            "referent {} is neither null nor mapped",
            referent
        );
    }
}

#[test]
fn find_references_enumerates_exactly_the_one_hop_holders() {
    let mut fixture = Fixture::new();
    let target = HEAP + 0x100;
    fixture.put_int(target, 7);
    fixture.put_str(HEAP + 0x140, "a");
    // d = {"a": target}, l = [target], t = (target,)
    let d = HEAP + 0x200;
    fixture.put_dict(d, HEAP + 0x280, &[(HEAP + 0x140, target)]);
    let l = HEAP + 0x400;
    fixture.put_list(l, HEAP + 0x440, &[target]);
    let t = HEAP + 0x480;
    fixture.put_tuple(t, &[target]);
    // An unrelated holder that must not match.
    fixture.put_int(HEAP + 0x4C0, 7);
    fixture.put_tuple(HEAP + 0x500, &[HEAP + 0x4C0]);
    let (_dir, env) = fixture.build();

    let hits = query::find_references(&env, addr(target), ReprOptions::default(), &quiet_query());
    let holders: Vec<u64> = hits.iter().map(|(a, _)| a.get()).collect();
    assert_eq!(holders, vec![d, l, t]);
}

#[test]
fn find_all_objects_by_type_counts_and_renders() {
    let mut fixture = Fixture::new();
    fixture.put_int(HEAP + 0x100, 7);
    fixture.put_int(HEAP + 0x140, 9);
    fixture.put_str(HEAP + 0x180, "not an int");
    let (_dir, env) = fixture.build();

    let int_type = env.get_type("int").unwrap();
    let found = query::find_all_objects(
        &env,
        int_type,
        ReprOptions::default(),
        false,
        &quiet_query(),
    );
    assert_eq!(found.count, 2);
    let reprs: Vec<&str> = found.items.iter().map(|(_, r)| r.as_str()).collect();
    assert_eq!(reprs, vec!["7", "9"]);

    let counted = query::find_all_objects(
        &env,
        int_type,
        ReprOptions::default(),
        true,
        &quiet_query(),
    );
    assert_eq!(counted.count, 2);
    assert!(counted.items.is_empty());
}

#[test]
fn count_by_type_merges_per_thread_accumulators() {
    let mut fixture = Fixture::new();
    fixture.put_int(HEAP + 0x100, 1);
    fixture.put_int(HEAP + 0x140, 2);
    fixture.put_str(HEAP + 0x180, "s");
    let (_dir, env) = fixture.build();

    let rows = query::count_by_type(&env, &quiet_query()).unwrap();
    let get = |name: &str| rows.iter().find(|row| row.name == name).map(|row| row.count);
    assert_eq!(get("int"), Some(2));
    assert_eq!(get("str"), Some(1));
    // Every synthetic type object is an instance of the base type.
    assert_eq!(get("type"), Some(common::TYPE_NAMES.len() as u64));

    // Sorted ascending by (count, name).
    for pair in rows.windows(2) {
        assert!((pair[0].count, &pair[0].name) <= (pair[1].count, &pair[1].name));
    }
}

#[test]
fn find_module_matches_the_dunder_name() {
    let mut fixture = Fixture::new();
    fixture.put_str(HEAP + 0x100, "__name__");
    fixture.put_str(HEAP + 0x140, "sys");
    let md = HEAP + 0x200;
    fixture.put_dict(md, HEAP + 0x280, &[(HEAP + 0x100, HEAP + 0x140)]);
    let module = HEAP + 0x400;
    fixture.put_module(module, md);
    // A module with a different name.
    fixture.put_str(HEAP + 0x440, "os");
    let md2 = HEAP + 0x480;
    fixture.put_dict(md2, HEAP + 0x500, &[(HEAP + 0x100, HEAP + 0x440)]);
    fixture.put_module(HEAP + 0x600, md2);
    let (_dir, env) = fixture.build();

    let hits = query::find_module(&env, "sys", ReprOptions::default(), &quiet_query()).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, addr(module));
    assert!(hits[0].1.contains("\"sys\""));
}

#[test]
fn find_all_threads_requires_a_live_frame() {
    let mut fixture = Fixture::new();
    let frame = HEAP + 0x100;
    fixture.put_frame(frame, 0, 0, 12);
    let thread = HEAP + 0x400;
    fixture.put_thread(thread, 0, HEAP, frame, 42);
    // A null frame never validates as a thread state.
    fixture.put_thread(HEAP + 0x440, 0, HEAP, 0, 43);
    let (_dir, env) = fixture.build();

    let threads = query::find_all_threads(&env, ReprOptions::default(), &quiet_query());
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].0, addr(thread));
    assert!(threads[0].1.starts_with("<thread id=42 frame=<frame executing"));
}

#[test]
fn aggregate_strings_buckets_and_prints_the_window() {
    let mut fixture = Fixture::new();
    fixture.put_str(HEAP + 0x100, "a");
    fixture.put_str(HEAP + 0x140, "abc");
    fixture.put_str(HEAP + 0x180, "hello");
    let (_dir, env) = fixture.build();

    let stats = query::aggregate_strings(
        &env,
        false,
        4, // print-smaller-than
        0, // print-larger-than
        ReprOptions::default(),
        &quiet_query(),
    )
    .unwrap();

    assert_eq!(stats.total_objects, 3);
    assert_eq!(stats.total_bytes, 1 + 3 + 5);
    assert_eq!(stats.histogram[1], 1); // len 1
    assert_eq!(stats.histogram[3], 2); // len 3 and len 5 share the <=5 bucket
    let printed: Vec<&str> = stats.printed.iter().map(|(_, r)| r.as_str()).collect();
    assert_eq!(printed, vec!["\"a\"", "\"abc\""]);

    // Default window (0, 0) prints nothing.
    let stats = query::aggregate_strings(
        &env,
        false,
        0,
        0,
        ReprOptions::default(),
        &quiet_query(),
    )
    .unwrap();
    assert!(stats.printed.is_empty());
}

#[test]
fn aggregate_bytes_mode_uses_bytes_objects() {
    let mut fixture = Fixture::new();
    fixture.put_bytes_object(HEAP + 0x100, b"\x00\x01\x02\x03");
    fixture.put_str(HEAP + 0x140, "ignored in bytes mode");
    let (_dir, env) = fixture.build();

    let stats = query::aggregate_strings(
        &env,
        true,
        0,
        0,
        ReprOptions::default(),
        &quiet_query(),
    )
    .unwrap();
    assert_eq!(stats.total_objects, 1);
    assert_eq!(stats.total_bytes, 4);
}

#[test]
fn async_task_graph_roots_have_no_predecessor() {
    let mut fixture = Fixture::new();
    let fut1 = HEAP + 0x100;
    let fut2 = HEAP + 0x140;
    let task = HEAP + 0x180;
    let children = HEAP + 0x200;
    let gather = HEAP + 0x280;
    fixture.put_future(fut1, 0);
    fixture.put_future(fut2, 0);
    fixture.put_task(task, 0, fut1, 0);
    fixture.put_list(children, HEAP + 0x240, &[task, fut2]);
    fixture.put_gathering(gather, 0, children);
    let (_dir, env) = fixture.build();

    let graph =
        query::async_task_graph(&env, ReprOptions::default(), &quiet_query()).unwrap();

    // Property 10: the only node nobody awaits is the gathering future.
    assert_eq!(graph.roots, vec![addr(gather)]);
    assert_eq!(
        graph.edges.get(&task).unwrap().iter().copied().collect::<Vec<_>>(),
        vec![fut1]
    );
    assert!(graph.edges.get(&fut1).unwrap().is_empty());
    let gather_targets: Vec<u64> = graph.edges.get(&gather).unwrap().iter().copied().collect();
    assert_eq!(gather_targets, vec![fut2, task]);

    let rendered = graph.render();
    assert!(rendered.contains("GatheringFuture"));
    assert!(rendered.contains("Task"));
    // Every awaited node appears indented under its awaiter.
    assert!(rendered.lines().any(|line| line.starts_with("  <")));
}

#[test]
fn one_bad_object_does_not_stop_a_sweep() {
    let mut fixture = Fixture::new();
    // A dict whose keys pointer is garbage: invalid, but skipped cleanly.
    fixture.put_header(HEAP + 0x100, fixture.ty("dict"));
    fixture.put_i64(HEAP + 0x110, 1);
    fixture.put_u64(HEAP + 0x118, 0xFFFF_FFFF_0000);
    // A perfectly good int after it.
    fixture.put_int(HEAP + 0x140, 5);
    let (_dir, env) = fixture.build();

    assert!(env.invalid_reason(addr(HEAP + 0x100)).is_some());

    let int_type = env.get_type("int").unwrap();
    let found = query::find_all_objects(
        &env,
        int_type,
        ReprOptions::default(),
        false,
        &quiet_query(),
    );
    assert_eq!(found.count, 1);
}

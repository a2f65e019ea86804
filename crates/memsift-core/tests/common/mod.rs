//! Handcrafted-snapshot builder for end-to-end tests.
//!
//! Lays out regions and runtime objects at fixed target addresses, writes
//! them as a `mem.<start>.<end>.bin` directory, and opens an `Environment`
//! over the result.

#![allow(dead_code)]

use std::collections::BTreeMap;

use memsift_core::{Environment, MappedAddr};

/// Where the synthetic type objects live.
pub const TYPE_REGION: u64 = 0x40000;
pub const BASE_TYPE: u64 = 0x40000;
/// General-purpose heap region.
pub const HEAP: u64 = 0x100000;
pub const HEAP_SIZE: usize = 0x4000;

pub const TYPE_NAMES: [&str; 17] = [
    "type",
    "NoneType",
    "bool",
    "int",
    "float",
    "str",
    "bytes",
    "tuple",
    "list",
    "dict",
    "set",
    "module",
    "frame",
    "code",
    "_asyncio.Task",
    "_asyncio.Future",
    "_GatheringFuture",
];

pub struct Fixture {
    regions: Vec<(u64, Vec<u8>)>,
    pub types: BTreeMap<&'static str, u64>,
}

impl Fixture {
    /// A fixture with the full set of type objects laid out in their own
    /// region, plus an empty heap region.
    pub fn new() -> Self {
        let mut fixture = Self {
            regions: Vec::new(),
            types: BTreeMap::new(),
        };
        fixture.add_region(TYPE_REGION, 0x2000);
        fixture.add_region(HEAP, HEAP_SIZE);

        for (i, name) in TYPE_NAMES.iter().enumerate() {
            let addr = TYPE_REGION + i as u64 * 0x40;
            let name_addr = TYPE_REGION + 0x1000 + i as u64 * 0x20;
            fixture.types.insert(name, addr);
            fixture.put_cstr(name_addr, name);
            fixture.put_type_object(addr, BASE_TYPE, name_addr, 16);
        }
        fixture
    }

    /// A fixture with no predeclared types at all.
    pub fn empty() -> Self {
        Self {
            regions: Vec::new(),
            types: BTreeMap::new(),
        }
    }

    pub fn add_region(&mut self, start: u64, size: usize) {
        self.regions.push((start, vec![0u8; size]));
    }

    pub fn ty(&self, name: &str) -> u64 {
        *self.types.get(name).expect("type not in fixture")
    }

    pub fn write(&mut self, addr: u64, bytes: &[u8]) {
        let (start, data) = self
            .regions
            .iter_mut()
            .find(|(start, data)| addr >= *start && addr + bytes.len() as u64 <= start + data.len() as u64)
            .expect("write outside any fixture region");
        let offset = (addr - *start) as usize;
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn put_u64(&mut self, addr: u64, value: u64) {
        self.write(addr, &value.to_le_bytes());
    }

    pub fn put_u32(&mut self, addr: u64, value: u32) {
        self.write(addr, &value.to_le_bytes());
    }

    pub fn put_i64(&mut self, addr: u64, value: i64) {
        self.write(addr, &value.to_le_bytes());
    }

    pub fn put_i32(&mut self, addr: u64, value: i32) {
        self.write(addr, &value.to_le_bytes());
    }

    pub fn put_cstr(&mut self, addr: u64, text: &str) {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        self.write(addr, &bytes);
    }

    // --- object emitters ---

    pub fn put_header(&mut self, addr: u64, type_addr: u64) {
        self.put_u64(addr, type_addr);
        self.put_u64(addr + 8, 1); // refcnt
    }

    pub fn put_type_object(&mut self, addr: u64, type_of: u64, name_addr: u64, basicsize: u64) {
        self.put_u64(addr, type_of);
        self.put_u64(addr + 8, 1);
        self.put_u64(addr + 16, name_addr);
        self.put_u64(addr + 24, basicsize);
        self.put_u64(addr + 32, 0); // itemsize
        self.put_u64(addr + 40, 0); // flags
    }

    pub fn put_none(&mut self, addr: u64) {
        self.put_header(addr, self.ty("NoneType"));
    }

    pub fn put_bool(&mut self, addr: u64, value: bool) {
        self.put_header(addr, self.ty("bool"));
        self.put_u64(addr + 16, value as u64);
    }

    pub fn put_int(&mut self, addr: u64, value: i64) {
        self.put_header(addr, self.ty("int"));
        self.put_i64(addr + 16, value);
    }

    pub fn put_float(&mut self, addr: u64, value: f64) {
        self.put_header(addr, self.ty("float"));
        self.put_u64(addr + 16, value.to_bits());
    }

    /// Latin-1 str (kind 1); `text` must be one byte per char.
    pub fn put_str(&mut self, addr: u64, text: &str) {
        assert!(text.chars().all(|c| (c as u32) < 0x100));
        self.put_header(addr, self.ty("str"));
        self.put_i64(addr + 16, text.chars().count() as i64);
        self.put_u64(addr + 24, 0); // hash
        self.put_u32(addr + 32, 1); // kind
        self.put_u32(addr + 36, 0); // pad
        let data: Vec<u8> = text.chars().map(|c| c as u8).collect();
        self.write(addr + 40, &data);
    }

    pub fn put_bytes_object(&mut self, addr: u64, data: &[u8]) {
        self.put_header(addr, self.ty("bytes"));
        self.put_i64(addr + 16, data.len() as i64);
        self.write(addr + 24, data);
    }

    pub fn put_tuple(&mut self, addr: u64, items: &[u64]) {
        self.put_header(addr, self.ty("tuple"));
        self.put_i64(addr + 16, items.len() as i64);
        for (i, item) in items.iter().enumerate() {
            self.put_u64(addr + 24 + i as u64 * 8, *item);
        }
    }

    pub fn put_list(&mut self, addr: u64, items_addr: u64, items: &[u64]) {
        self.put_header(addr, self.ty("list"));
        self.put_i64(addr + 16, items.len() as i64);
        self.put_u64(addr + 24, items_addr);
        self.put_i64(addr + 32, items.len() as i64); // allocated
        for (i, item) in items.iter().enumerate() {
            self.put_u64(items_addr + i as u64 * 8, *item);
        }
    }

    /// A combined dict: object at `addr`, keys object at `keys_addr`,
    /// 8-slot table, entries in insertion order.
    pub fn put_dict(&mut self, addr: u64, keys_addr: u64, items: &[(u64, u64)]) {
        const DK_SIZE: u64 = 8;
        assert!(items.len() as u64 <= DK_SIZE);

        self.put_header(addr, self.ty("dict"));
        self.put_i64(addr + 16, items.len() as i64); // ma_used
        self.put_u64(addr + 24, keys_addr);
        self.put_u64(addr + 32, 0); // ma_values: not split

        self.put_u64(keys_addr, 1); // dk_refcnt
        self.put_i64(keys_addr + 8, DK_SIZE as i64);
        self.put_i64(keys_addr + 16, (DK_SIZE - items.len() as u64) as i64); // dk_usable
        self.put_i64(keys_addr + 24, items.len() as i64); // dk_nentries

        // dk_size of 8 means 1-byte table slots.
        let table_addr = keys_addr + 32;
        let mut table = vec![-1i8; DK_SIZE as usize];
        for (i, slot) in table.iter_mut().enumerate().take(items.len()) {
            *slot = i as i8;
        }
        let table_bytes: Vec<u8> = table.iter().map(|&v| v as u8).collect();
        self.write(table_addr, &table_bytes);

        let entries_addr = table_addr + DK_SIZE;
        for (i, (key, value)) in items.iter().enumerate() {
            let entry = entries_addr + i as u64 * 24;
            self.put_u64(entry, 0x1111 + i as u64); // hash
            self.put_u64(entry + 8, *key);
            self.put_u64(entry + 16, *value);
        }
    }

    pub fn put_set(&mut self, addr: u64, table_addr: u64, items: &[u64]) {
        let slots = (items.len().max(1) * 2).next_power_of_two() as u64;
        self.put_header(addr, self.ty("set"));
        self.put_i64(addr + 16, items.len() as i64); // fill
        self.put_i64(addr + 24, items.len() as i64); // used
        self.put_i64(addr + 32, (slots - 1) as i64); // mask
        self.put_u64(addr + 40, table_addr);
        for (i, item) in items.iter().enumerate() {
            self.put_u64(table_addr + i as u64 * 16, *item);
            self.put_u64(table_addr + i as u64 * 16 + 8, 0x2222 + i as u64);
        }
    }

    pub fn put_module(&mut self, addr: u64, dict_addr: u64) {
        self.put_header(addr, self.ty("module"));
        self.put_u64(addr + 16, dict_addr);
    }

    pub fn put_code(
        &mut self,
        addr: u64,
        filename_addr: u64,
        name_addr: u64,
        varnames_addr: u64,
        firstlineno: u32,
    ) {
        self.put_header(addr, self.ty("code"));
        self.put_u64(addr + 16, filename_addr);
        self.put_u64(addr + 24, name_addr);
        self.put_u64(addr + 32, varnames_addr);
        self.put_u32(addr + 40, firstlineno);
        self.put_u32(addr + 44, 0); // argcount
    }

    /// Frame with no code object; `state` uses the raw on-disk encoding
    /// (0 = executing, -1 = suspended).
    pub fn put_frame(&mut self, addr: u64, back: u64, state: i8, lineno: i32) {
        self.put_frame_with_code(addr, back, 0, state, lineno, &[]);
    }

    pub fn put_frame_with_code(
        &mut self,
        addr: u64,
        back: u64,
        code: u64,
        state: i8,
        lineno: i32,
        local_slots: &[u64],
    ) {
        self.put_header(addr, self.ty("frame"));
        self.put_u64(addr + 16, back);
        self.put_u64(addr + 24, code);
        self.put_u64(addr + 32, 0); // builtins
        self.put_u64(addr + 40, 0); // globals
        self.put_u64(addr + 48, 0); // locals
        self.put_u64(addr + 56, 0); // valuestack
        self.put_u64(addr + 64, 0); // trace
        self.put_u64(addr + 72, 0); // gen
        self.put_i32(addr + 80, 0); // lasti
        self.put_i32(addr + 84, lineno);
        self.put_i32(addr + 88, 0); // stackdepth
        self.put_i32(addr + 92, 0); // iblock
        self.write(addr + 96, &[state as u8]);
        for (i, slot) in local_slots.iter().enumerate() {
            self.put_u64(addr + 104 + i as u64 * 8, *slot);
        }
    }

    pub fn put_thread(&mut self, addr: u64, next: u64, interp: u64, frame: u64, thread_id: u64) {
        self.put_u64(addr, next);
        self.put_u64(addr + 8, interp);
        self.put_u64(addr + 16, frame);
        self.put_u64(addr + 24, thread_id);
    }

    pub fn put_future(&mut self, addr: u64, state: u32) {
        self.put_header(addr, self.ty("_asyncio.Future"));
        self.put_u64(addr + 16, 0); // fut_loop
        self.put_u64(addr + 24, 0); // fut_result
        self.put_u32(addr + 32, state);
        self.put_u32(addr + 36, 0);
    }

    pub fn put_task(&mut self, addr: u64, state: u32, waiter: u64, coro: u64) {
        self.put_header(addr, self.ty("_asyncio.Task"));
        self.put_u64(addr + 16, 0);
        self.put_u64(addr + 24, 0);
        self.put_u32(addr + 32, state);
        self.put_u32(addr + 36, 0);
        self.put_u64(addr + 40, waiter);
        self.put_u64(addr + 48, coro);
    }

    pub fn put_gathering(&mut self, addr: u64, state: u32, children_list: u64) {
        self.put_header(addr, self.ty("_GatheringFuture"));
        self.put_u64(addr + 16, 0);
        self.put_u64(addr + 24, 0);
        self.put_u32(addr + 32, state);
        self.put_u32(addr + 36, 0);
        self.put_u64(addr + 40, children_list);
    }

    // --- building ---

    pub fn write_snapshot(&self) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (start, bytes) in &self.regions {
            let name = format!("mem.{:016X}.{:016X}.bin", start, start + bytes.len() as u64);
            std::fs::write(dir.path().join(name), bytes).unwrap();
        }
        dir
    }

    /// Write the snapshot and open an environment with the fixture's
    /// types preregistered.
    pub fn build(self) -> (tempfile::TempDir, Environment) {
        let types = self.types.clone();
        let (dir, mut env) = self.build_unregistered();
        for (name, addr) in types {
            env.insert_type(name, MappedAddr::new(addr));
        }
        env.set_base_type(MappedAddr::new(BASE_TYPE)).unwrap();
        (dir, env)
    }

    /// Write the snapshot and open an environment with empty analysis
    /// state, for exercising the bootstrap scans.
    pub fn build_unregistered(self) -> (tempfile::TempDir, Environment) {
        let dir = self.write_snapshot();
        let env = Environment::open(dir.path()).unwrap();
        (dir, env)
    }
}

/// Query config for tests: single-threaded-ish, no progress spam.
pub fn quiet_query() -> memsift_core::QueryConfig {
    memsift_core::QueryConfig {
        threads: 2,
        progress: false,
    }
}

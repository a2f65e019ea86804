//! Persistent analysis state for one snapshot.
//!
//! The environment owns the region store plus everything learned about the
//! snapshot so far: the base meta-type address and the name → address map
//! of known type objects. It persists itself to a sidecar file adjacent to
//! the snapshot after every mutation, and is strictly read-only while a
//! scan is running.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::addr::MappedAddr;
use crate::error::{Error, Result};
use crate::memory::{RegionStore, ScanConfig};
use crate::traverse::{ReprOptions, Traversal};
use crate::types::{self, typeobj, Reason, TypeKind};

const SIDECAR_NAME: &str = "analysis.json";

/// Serialized form of the analysis state. Addresses are 16-digit hex
/// strings and the type map is ordered, so saving the same state twice
/// produces identical bytes.
#[derive(Debug, Default, Serialize, Deserialize)]
struct AnalysisData {
    base_type: String,
    types: BTreeMap<String, String>,
}

/// Outcome of inserting a discovered type object.
#[derive(Debug, PartialEq, Eq)]
pub enum TypeInsert {
    Inserted,
    AlreadyKnown,
    /// Another address already owns this name; the new one was stored
    /// under `stored_as`.
    Collision { stored_as: String, existing: MappedAddr },
}

pub struct Environment {
    store: RegionStore,
    snapshot_path: PathBuf,
    sidecar_path: PathBuf,
    base_type: MappedAddr,
    types: BTreeMap<String, MappedAddr>,
    // Derived reverse indexes, rebuilt whenever `types` changes.
    name_by_addr: HashMap<u64, String>,
    kind_by_addr: HashMap<u64, TypeKind>,
}

impl Environment {
    /// Open the snapshot at `path` and load the analysis sidecar if one
    /// was persisted by an earlier session.
    pub fn open(path: &Path) -> Result<Self> {
        let store = RegionStore::open(path)?;
        let sidecar_path = if path.is_dir() {
            path.join(SIDECAR_NAME)
        } else {
            let mut name = path.as_os_str().to_owned();
            name.push(".");
            name.push(SIDECAR_NAME);
            PathBuf::from(name)
        };

        let mut env = Self {
            store,
            snapshot_path: path.to_path_buf(),
            sidecar_path,
            base_type: MappedAddr::NULL,
            types: BTreeMap::new(),
            name_by_addr: HashMap::new(),
            kind_by_addr: HashMap::new(),
        };
        env.load_sidecar()?;
        Ok(env)
    }

    fn load_sidecar(&mut self) -> Result<()> {
        let text = match std::fs::read_to_string(&self.sidecar_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let data: AnalysisData = serde_json::from_str(&text)?;
        self.base_type = MappedAddr::new(parse_hex_addr(&data.base_type)?);
        self.types = data
            .types
            .iter()
            .map(|(name, addr)| Ok((name.clone(), MappedAddr::new(parse_hex_addr(addr)?))))
            .collect::<Result<_>>()?;
        self.rebuild_indexes();
        debug!(
            "Loaded analysis data: base type {}, {} types",
            self.base_type,
            self.types.len()
        );
        Ok(())
    }

    /// Persist the current state. Called after every mutation.
    pub fn save(&self) -> Result<()> {
        let data = AnalysisData {
            base_type: format!("{}", self.base_type),
            types: self
                .types
                .iter()
                .map(|(name, addr)| (name.clone(), format!("{}", addr)))
                .collect(),
        };
        let mut text = serde_json::to_string_pretty(&data)?;
        text.push('\n');
        std::fs::write(&self.sidecar_path, text)?;
        Ok(())
    }

    fn rebuild_indexes(&mut self) {
        self.name_by_addr.clear();
        self.kind_by_addr.clear();
        for (name, addr) in &self.types {
            // First insertion wins the reverse mapping, so a collided
            // `name+ADDR` entry never shadows the bare name's address.
            self.name_by_addr.entry(addr.get()).or_insert_with(|| name.clone());
            if let Some(kind) = TypeKind::from_name(name) {
                self.kind_by_addr.entry(addr.get()).or_insert(kind);
            }
        }
    }

    pub fn store(&self) -> &RegionStore {
        &self.store
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn base_type(&self) -> MappedAddr {
        self.base_type
    }

    pub fn types(&self) -> &BTreeMap<String, MappedAddr> {
        &self.types
    }

    pub fn get_type(&self, name: &str) -> Result<MappedAddr> {
        self.types
            .get(name)
            .copied()
            .ok_or_else(|| Error::MissingType(name.to_string()))
    }

    pub fn get_type_if_exists(&self, name: &str) -> Option<MappedAddr> {
        self.types.get(name).copied()
    }

    pub fn type_name(&self, addr: MappedAddr) -> Option<&str> {
        self.name_by_addr.get(&addr.get()).map(String::as_str)
    }

    /// Decoder for the type object at `addr`, if it is known and one of
    /// the supported layouts.
    pub fn kind_of(&self, addr: MappedAddr) -> Option<TypeKind> {
        self.kind_by_addr.get(&addr.get()).copied()
    }

    pub fn is_known_type(&self, addr: MappedAddr) -> bool {
        self.name_by_addr.contains_key(&addr.get())
    }

    /// Record the base meta-type and persist.
    pub fn set_base_type(&mut self, addr: MappedAddr) -> Result<()> {
        self.base_type = addr;
        self.save()
    }

    /// Insert a discovered type object, handling name collisions: the
    /// first insertion wins the bare name and a later different address
    /// is stored under `name+ADDR`.
    pub fn insert_type(&mut self, name: &str, addr: MappedAddr) -> TypeInsert {
        if let Some(&existing) = self.types.get(name) {
            if existing == addr {
                return TypeInsert::AlreadyKnown;
            }
            let stored_as = format!("{}+{}", name, addr);
            self.types.insert(stored_as.clone(), addr);
            self.rebuild_indexes();
            return TypeInsert::Collision { stored_as, existing };
        }
        self.types.insert(name.to_string(), addr);
        self.rebuild_indexes();
        TypeInsert::Inserted
    }

    pub fn traverse(&self, opts: ReprOptions) -> Traversal<'_> {
        Traversal::new(self, opts)
    }

    /// Full validation of the object at `addr`. `None` means valid.
    pub fn invalid_reason(&self, addr: MappedAddr) -> Option<Reason> {
        types::validate(self, addr)
    }

    pub fn direct_referents(&self, addr: MappedAddr) -> Result<HashSet<MappedAddr>> {
        types::direct_referents(self, addr)
    }

    /// Run the bootstrap scans for whatever analysis state is missing.
    pub fn prepare(&mut self, threads: usize, progress: bool) -> Result<()> {
        if self.base_type.is_null() {
            info!("Base type object not present in analysis data; looking for it");
            self.find_base_type(threads, progress)?;
        }
        if self.types.is_empty() {
            info!("No type objects are present in analysis data; looking for them");
            self.find_all_types(threads, progress)?;
        }
        Ok(())
    }

    /// Sweep for the base meta-type: a type object that is its own type
    /// and whose name decodes to `"type"`. Exactly one candidate is
    /// persisted; zero or multiple leaves the state unchanged.
    pub fn find_base_type(&mut self, threads: usize, progress: bool) -> Result<MappedAddr> {
        let candidates: Mutex<Vec<MappedAddr>> = Mutex::new(Vec::new());
        let store = &self.store;
        let cfg = ScanConfig {
            stride: 8,
            threads,
            object_size: typeobj::SIZE,
            progress,
        };
        store.scan(&cfg, |bytes, addr, _| {
            let Ok(ty) = typeobj::TypeObject::parse_bytes(bytes) else {
                return;
            };
            if ty.header.type_of != addr {
                return;
            }
            if typeobj::validate_shape(store, &ty).is_some() {
                return;
            }
            if ty.name_bytes(store).ok() != Some(b"type".to_vec()) {
                return;
            }
            candidates.lock().unwrap().push(addr);
        });

        let mut candidates = candidates.into_inner().unwrap();
        candidates.sort_unstable();
        candidates.dedup();
        match candidates.as_slice() {
            [addr] => {
                info!("Base type object found at {}", addr);
                self.set_base_type(*addr)?;
                Ok(*addr)
            }
            [] => Err(Error::AmbiguousBaseType(0)),
            many => Err(Error::AmbiguousBaseType(many.len())),
        }
    }

    /// Sweep for every validating type object whose type-of field equals
    /// the base meta-type, and record them by name.
    pub fn find_all_types(&mut self, threads: usize, progress: bool) -> Result<usize> {
        if self.base_type.is_null() {
            return Err(Error::MissingBaseType);
        }
        let base_type = self.base_type;
        let found: Mutex<Vec<(String, MappedAddr)>> = Mutex::new(Vec::new());
        let store = &self.store;
        let cfg = ScanConfig {
            stride: 8,
            threads,
            object_size: typeobj::SIZE,
            progress,
        };
        store.scan(&cfg, |bytes, addr, _| {
            let Ok(ty) = typeobj::TypeObject::parse_bytes(bytes) else {
                return;
            };
            if ty.header.type_of != base_type {
                return;
            }
            if typeobj::validate_shape(store, &ty).is_some() {
                return;
            }
            let Ok(name) = ty.name(store) else {
                return;
            };
            found.lock().unwrap().push((name, addr));
        });

        let mut found = found.into_inner().unwrap();
        found.sort();
        found.dedup();

        self.types.clear();
        let mut inserted = 0usize;
        for (name, addr) in found {
            match self.insert_type(&name, addr) {
                TypeInsert::Inserted => {
                    info!("Found <type {}> at {}", name, addr);
                    inserted += 1;
                }
                TypeInsert::AlreadyKnown => {}
                TypeInsert::Collision { stored_as, existing } => {
                    warn!(
                        "Found <type {}> at {}, but it already exists at {}; recorded as {}",
                        name, addr, existing, stored_as
                    );
                    inserted += 1;
                }
            }
        }
        if inserted > 0 {
            self.save()?;
        }
        Ok(inserted)
    }
}

fn parse_hex_addr(text: &str) -> Result<u64> {
    if text.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(text, 16).map_err(|_| {
        Error::snapshot("analysis data", format!("bad address in sidecar: {:?}", text))
    })
}

//! The region index: maps target-process addresses to locally mapped bytes.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use tracing::debug;

use crate::addr::MappedAddr;
use crate::error::{Error, Result};
use crate::memory::cursor::Cursor;

/// One captured region: `size` bytes at target address `start`, backed by a
/// byte range of one of the store's mapped files.
#[derive(Debug, Clone, Copy)]
struct View {
    start: u64,
    size: u64,
    file: usize,
    file_offset: usize,
}

/// Owns the memory-mapped snapshot files and the address-ordered region
/// index over them. Everything else in the analyzer borrows bytes from
/// here; the mappings are released when the store is dropped.
pub struct RegionStore {
    files: Vec<Mmap>,
    regions: BTreeMap<u64, View>,
    total_bytes: u64,
}

impl RegionStore {
    /// Open a snapshot. `path` is either a directory of per-region files
    /// named `mem.<hex-start>.<hex-end>.bin`, or a single file of
    /// `{start: u64 LE, end: u64 LE, bytes[end-start]}` records.
    pub fn open(path: &Path) -> Result<Self> {
        let mut store = Self {
            files: Vec::new(),
            regions: BTreeMap::new(),
            total_bytes: 0,
        };
        if path.is_dir() {
            store.open_directory(path)?;
        } else {
            store.open_single_file(path)?;
        }
        debug!(
            "Opened snapshot {}: {} regions, {} bytes",
            path.display(),
            store.regions.len(),
            store.total_bytes
        );
        Ok(store)
    }

    fn open_directory(&mut self, path: &Path) -> Result<()> {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let filename = entry.file_name();
            let Some(filename) = filename.to_str() else {
                continue;
            };
            // Region files have exactly four dot-separated tokens:
            // mem.<start-hex>.<end-hex>.bin. Anything else (sidecars,
            // foreign files) is skipped.
            let tokens: Vec<&str> = filename.split('.').collect();
            if tokens.len() != 4 || tokens[0] != "mem" || tokens[3] != "bin" {
                continue;
            }
            let Ok(start) = u64::from_str_radix(tokens[1], 16) else {
                continue;
            };

            let file = File::open(entry.path())?;
            let map = unsafe { Mmap::map(&file) }.map_err(|e| {
                Error::snapshot(entry.path().display().to_string(), e.to_string())
            })?;
            let size = map.len() as u64;
            if size > 0 {
                self.insert_region(start, size, map, 0);
            }
        }
        if self.regions.is_empty() {
            return Err(Error::snapshot(
                path.display().to_string(),
                "no mem.<start>.<end>.bin region files found",
            ));
        }
        Ok(())
    }

    fn open_single_file(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        let map = unsafe { Mmap::map(&file) }
            .map_err(|e| Error::snapshot(path.display().to_string(), e.to_string()))?;

        let file_index = self.files.len();
        let mut offset = 0usize;
        let data: &[u8] = &map;
        let mut pending: Vec<View> = Vec::new();
        while offset < data.len() {
            let mut header = Cursor::new(&data[offset..], offset as u64);
            let start = header.get_u64l().map_err(|_| {
                Error::snapshot(path.display().to_string(), "truncated region header")
            })?;
            let end = header.get_u64l().map_err(|_| {
                Error::snapshot(path.display().to_string(), "truncated region header")
            })?;
            if end < start {
                return Err(Error::snapshot(
                    path.display().to_string(),
                    format!("region end {:016X} precedes start {:016X}", end, start),
                ));
            }
            let size = end - start;
            let data_offset = offset + 16;
            if data_offset + size as usize > data.len() {
                return Err(Error::snapshot(
                    path.display().to_string(),
                    format!("region at {:016X} extends past end of file", start),
                ));
            }
            if size > 0 {
                pending.push(View {
                    start,
                    size,
                    file: file_index,
                    file_offset: data_offset,
                });
            }
            offset = data_offset + size as usize;
        }

        self.files.push(map);
        for view in pending {
            self.regions.insert(view.start, view);
            self.total_bytes += view.size;
        }
        Ok(())
    }

    fn insert_region(&mut self, start: u64, size: u64, map: Mmap, file_offset: usize) {
        let file = self.files.len();
        self.files.push(map);
        self.regions.insert(
            start,
            View {
                start,
                size,
                file,
                file_offset,
            },
        );
        self.total_bytes += size;
    }

    /// Last region whose start is <= `addr`, if it actually contains `addr`.
    fn find(&self, addr: u64) -> Option<&View> {
        let (_, view) = self.regions.range(..=addr).next_back()?;
        if addr < view.start + view.size {
            Some(view)
        } else {
            None
        }
    }

    fn view_bytes(&self, view: &View) -> &[u8] {
        &self.files[view.file][view.file_offset..view.file_offset + view.size as usize]
    }

    pub fn exists<T>(&self, addr: MappedAddr<T>) -> bool {
        self.find(addr.get()).is_some()
    }

    pub fn exists_range<T>(&self, addr: MappedAddr<T>, size: u64) -> bool {
        match self.find(addr.get()) {
            Some(view) => match (addr.get() - view.start).checked_add(size) {
                Some(end) => end <= view.size,
                None => false,
            },
            None => false,
        }
    }

    /// Non-null, aligned, and readable for at least `size` bytes. The
    /// baseline pointer-field check used by every validator.
    pub fn obj_valid<T>(&self, addr: MappedAddr<T>, alignment: u64, size: u64) -> bool {
        !addr.is_null() && addr.is_aligned(alignment) && self.exists_range(addr, size)
    }

    pub fn obj_valid_or_null<T>(&self, addr: MappedAddr<T>, alignment: u64, size: u64) -> bool {
        addr.is_null() || self.obj_valid(addr, alignment, size)
    }

    /// Bounds-checked slice of exactly `size` bytes at `addr`.
    pub fn read_slice<T>(&self, addr: MappedAddr<T>, size: u64) -> Result<&[u8]> {
        let view = self.find(addr.get()).ok_or(Error::OutOfRange {
            addr: addr.get(),
            size,
        })?;
        let offset = addr.get() - view.start;
        let end = offset.checked_add(size).ok_or(Error::OutOfRange {
            addr: addr.get(),
            size,
        })?;
        if end > view.size {
            return Err(Error::OutOfRange {
                addr: addr.get(),
                size,
            });
        }
        let bytes = self.view_bytes(view);
        Ok(&bytes[offset as usize..(offset + size) as usize])
    }

    /// Bounded cursor over `[addr, addr+size)`.
    pub fn read<T>(&self, addr: MappedAddr<T>, size: u64) -> Result<Cursor<'_>> {
        Ok(Cursor::new(self.read_slice(addr, size)?, addr.get()))
    }

    /// Bounded cursor from `addr` to the end of its containing region.
    pub fn read_to_end<T>(&self, addr: MappedAddr<T>) -> Result<Cursor<'_>> {
        let view = self.find(addr.get()).ok_or(Error::OutOfRange {
            addr: addr.get(),
            size: 1,
        })?;
        let offset = (addr.get() - view.start) as usize;
        let bytes = self.view_bytes(view);
        Ok(Cursor::new(&bytes[offset..], addr.get()))
    }

    pub fn read_u64<T>(&self, addr: MappedAddr<T>) -> Result<u64> {
        self.read(addr, 8)?.get_u64l()
    }

    pub fn read_addr<T>(&self, addr: MappedAddr<T>) -> Result<MappedAddr> {
        Ok(MappedAddr::new(self.read_u64(addr)?))
    }

    /// NUL-terminated byte string starting at `addr`, NUL excluded.
    pub fn get_cstr<T>(&self, addr: MappedAddr<T>) -> Result<&[u8]> {
        self.read_to_end(addr)?.get_cstr()
    }

    /// `(start, size)` of the region containing `addr`.
    pub fn region_for_address<T>(&self, addr: MappedAddr<T>) -> Result<(MappedAddr, u64)> {
        let view = self.find(addr.get()).ok_or(Error::OutOfRange {
            addr: addr.get(),
            size: 1,
        })?;
        Ok((MappedAddr::new(view.start), view.size))
    }

    /// All regions as `(start, size)`, sorted by start address.
    pub fn all_regions(&self) -> Vec<(MappedAddr, u64)> {
        self.regions
            .values()
            .map(|view| (MappedAddr::new(view.start), view.size))
            .collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Raw bytes of every region, in the same order as `all_regions`.
    /// Used by the scanner to avoid a map lookup per visited address.
    pub(crate) fn region_slices(&self) -> Vec<&[u8]> {
        self.regions.values().map(|view| self.view_bytes(view)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_snapshot_dir(regions: &[(u64, Vec<u8>)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (start, bytes) in regions {
            let name = format!("mem.{:016X}.{:016X}.bin", start, start + bytes.len() as u64);
            std::fs::write(dir.path().join(name), bytes).unwrap();
        }
        dir
    }

    #[test]
    fn test_directory_snapshot_lookup() {
        let dir = write_snapshot_dir(&[
            (0x1000, vec![0xAA; 0x100]),
            (0x3000, vec![0xBB; 0x80]),
        ]);
        let store = RegionStore::open(dir.path()).unwrap();

        assert_eq!(store.region_count(), 2);
        assert_eq!(store.total_bytes(), 0x180);
        assert!(store.exists(MappedAddr::<()>::new(0x1000)));
        assert!(store.exists(MappedAddr::<()>::new(0x10FF)));
        assert!(!store.exists(MappedAddr::<()>::new(0x1100)));
        assert!(!store.exists(MappedAddr::<()>::new(0x0FFF)));
        assert!(store.exists(MappedAddr::<()>::new(0x3040)));

        assert!(store.exists_range(MappedAddr::<()>::new(0x10F8), 8));
        assert!(!store.exists_range(MappedAddr::<()>::new(0x10F9), 8));

        let slice = store.read_slice(MappedAddr::<()>::new(0x3000), 4).unwrap();
        assert_eq!(slice, &[0xBB; 4]);
    }

    #[test]
    fn test_read_does_not_cross_region_boundary() {
        let dir = write_snapshot_dir(&[(0x1000, vec![0u8; 0x100]), (0x1100, vec![1u8; 0x100])]);
        let store = RegionStore::open(dir.path()).unwrap();
        // Regions are adjacent in the address space but separately mapped;
        // a read is only valid within a single region.
        assert!(store.read_slice(MappedAddr::<()>::new(0x10FC), 8).is_err());
        assert!(!store.exists_range(MappedAddr::<()>::new(0x10FC), 8));
    }

    #[test]
    fn test_foreign_files_are_skipped() {
        let dir = write_snapshot_dir(&[(0x1000, vec![0u8; 0x40])]);
        std::fs::write(dir.path().join("analysis.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("mem.notahex.zzz.bin"), b"junk").unwrap();
        std::fs::write(dir.path().join("README"), b"hello").unwrap();
        let store = RegionStore::open(dir.path()).unwrap();
        assert_eq!(store.region_count(), 1);
    }

    #[test]
    fn test_single_file_snapshot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for (start, bytes) in [(0x5000u64, vec![7u8; 0x20]), (0x9000, vec![9u8; 0x10])] {
            file.write_all(&start.to_le_bytes()).unwrap();
            file.write_all(&(start + bytes.len() as u64).to_le_bytes()).unwrap();
            file.write_all(&bytes).unwrap();
        }
        file.flush().unwrap();

        let store = RegionStore::open(file.path()).unwrap();
        assert_eq!(store.region_count(), 2);
        assert_eq!(store.total_bytes(), 0x30);
        assert_eq!(
            store.read_slice(MappedAddr::<()>::new(0x9008), 8).unwrap(),
            &[9u8; 8]
        );
        assert_eq!(
            store.region_for_address(MappedAddr::<()>::new(0x5010)).unwrap(),
            (MappedAddr::new(0x5000), 0x20)
        );
    }

    #[test]
    fn test_get_cstr() {
        let mut bytes = vec![0u8; 0x40];
        bytes[0x10..0x15].copy_from_slice(b"type\0");
        let dir = write_snapshot_dir(&[(0x2000, bytes)]);
        let store = RegionStore::open(dir.path()).unwrap();
        assert_eq!(store.get_cstr(MappedAddr::<()>::new(0x2010)).unwrap(), b"type");
    }
}

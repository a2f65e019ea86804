//! Parallel sweep over every aligned position in every region.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::addr::MappedAddr;
use crate::memory::store::RegionStore;
use crate::util::format_size;

/// Blocks handed out to workers. Strides are capped at this so every
/// stride-aligned address falls inside exactly one block.
const BLOCK_STRIDE: u64 = 0x1000;

/// Configuration for one sweep.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Distance between visited addresses. Power of two, at most 4096.
    pub stride: u64,
    /// Worker thread count; 0 means available parallelism.
    pub threads: usize,
    /// Bytes the callback sees at each address. Positions where this many
    /// bytes would spill past the region's end are skipped.
    pub object_size: u64,
    /// Print progress lines to stderr while the sweep runs.
    pub progress: bool,
}

impl ScanConfig {
    pub fn new(stride: u64, object_size: u64) -> Self {
        Self {
            stride,
            threads: 0,
            object_size,
            progress: true,
        }
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.progress = false;
        self
    }

    fn effective_threads(&self) -> usize {
        if self.threads != 0 {
            return self.threads;
        }
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
    }
}

impl RegionStore {
    /// Invoke `callback(bytes, addr, thread_index)` for every
    /// stride-aligned offset of every region where `object_size` bytes
    /// fit, exactly once, across a pool of worker threads.
    ///
    /// Each region is tiled into 4096-byte blocks and the blocks of all
    /// regions are concatenated into one counter space; a shared atomic
    /// hands out blocks to whichever worker asks next. Workers translate a
    /// block offset back to its region with a monotone walk over the
    /// cumulative block counts, which stays cheap because each worker's
    /// offsets are non-decreasing.
    pub fn scan<F>(&self, cfg: &ScanConfig, callback: F)
    where
        F: Fn(&[u8], MappedAddr, usize) + Sync,
    {
        assert!(
            cfg.stride > 0 && cfg.stride.is_power_of_two(),
            "scan stride must be a power of two"
        );
        assert!(
            cfg.stride <= BLOCK_STRIDE,
            "scan stride must not be greater than 0x1000"
        );

        let regions = self.all_regions();
        let slices = self.region_slices();

        // Cumulative block-space offsets, one entry past the end. Each
        // region is rounded up to whole blocks so no block straddles two
        // regions.
        let mut block_offsets: Vec<u64> = Vec::with_capacity(regions.len() + 1);
        block_offsets.push(0);
        for (_, size) in &regions {
            let padded = size.div_ceil(BLOCK_STRIDE) * BLOCK_STRIDE;
            block_offsets.push(block_offsets.last().unwrap() + padded);
        }
        let total = *block_offsets.last().unwrap();
        if total == 0 {
            return;
        }

        let counter = AtomicU64::new(0);
        let num_threads = cfg.effective_threads();

        std::thread::scope(|scope| {
            for thread_index in 0..num_threads {
                let counter = &counter;
                let regions = &regions;
                let slices = &slices;
                let block_offsets = &block_offsets;
                let callback = &callback;
                scope.spawn(move || {
                    let mut region_index = 0usize;
                    loop {
                        let offset = counter.fetch_add(BLOCK_STRIDE, Ordering::Relaxed);
                        if offset >= total {
                            break;
                        }
                        while offset >= block_offsets[region_index + 1] {
                            region_index += 1;
                        }
                        let (region_start, region_size) = regions[region_index];
                        let bytes = slices[region_index];
                        let base = offset - block_offsets[region_index];
                        let mut z = 0;
                        while z < BLOCK_STRIDE {
                            let pos = base + z;
                            if pos + cfg.object_size > region_size {
                                break;
                            }
                            callback(
                                &bytes[pos as usize..(pos + cfg.object_size) as usize],
                                region_start.offset_bytes(pos as i64),
                                thread_index,
                            );
                            z += cfg.stride;
                        }
                    }
                });
            }

            // Progress sampling happens on the calling thread; workers are
            // joined when the scope closes.
            if cfg.progress {
                let mut region_index = 0usize;
                loop {
                    let offset = counter.load(Ordering::Relaxed);
                    if offset >= total {
                        break;
                    }
                    while offset >= block_offsets[region_index + 1] {
                        region_index += 1;
                    }
                    let addr = regions[region_index]
                        .0
                        .offset_bytes((offset - block_offsets[region_index]) as i64);
                    eprint!(
                        "... {} ({}/{} regions, {}/{}, {:.1}%)\x1b[K\r",
                        addr,
                        region_index,
                        regions.len(),
                        format_size(offset),
                        format_size(total),
                        offset as f64 / total as f64 * 100.0
                    );
                    std::thread::sleep(Duration::from_millis(100));
                }
                eprint!("\x1b[K\r");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn store_with_regions(regions: &[(u64, Vec<u8>)]) -> (tempfile::TempDir, RegionStore) {
        let dir = tempfile::tempdir().unwrap();
        for (start, bytes) in regions {
            let name = format!("mem.{:016X}.{:016X}.bin", start, start + bytes.len() as u64);
            std::fs::write(dir.path().join(name), bytes).unwrap();
        }
        let store = RegionStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_scan_visits_every_aligned_address_once() {
        let (_dir, store) = store_with_regions(&[
            (0x10000, vec![0u8; 0x2000]),
            (0x40000, vec![0u8; 0x1830]),
            (0x80000, vec![0u8; 0x18]),
        ]);

        let visited = Mutex::new(Vec::new());
        let cfg = ScanConfig::new(8, 8).threads(4).quiet();
        store.scan(&cfg, |bytes, addr, _| {
            assert_eq!(bytes.len(), 8);
            visited.lock().unwrap().push(addr.get());
        });

        let mut visited = visited.into_inner().unwrap();
        visited.sort_unstable();
        let before_dedup = visited.len();
        visited.dedup();
        assert_eq!(before_dedup, visited.len(), "addresses visited twice");

        // floor((size - object_size) / stride) + 1 per region.
        let expected: u64 = [(0x2000u64), 0x1830, 0x18]
            .iter()
            .map(|size| (size - 8) / 8 + 1)
            .sum();
        assert_eq!(visited.len() as u64, expected);

        // Spot-check boundaries: last visitable position of each region is
        // present, the position after it is not.
        assert!(visited.contains(&(0x10000 + 0x2000 - 8)));
        assert!(!visited.contains(&(0x10000 + 0x2000)));
        assert!(visited.contains(&(0x40000 + 0x1830 - 8)));
        assert!(visited.contains(&(0x80000 + 0x10)));
    }

    #[test]
    fn test_scan_larger_objects_skip_region_tails() {
        let (_dir, store) = store_with_regions(&[(0x10000, vec![0u8; 0x1000])]);
        let count = Mutex::new(0u64);
        let cfg = ScanConfig::new(16, 0x40).threads(2).quiet();
        store.scan(&cfg, |bytes, _, _| {
            assert_eq!(bytes.len(), 0x40);
            *count.lock().unwrap() += 1;
        });
        assert_eq!(*count.lock().unwrap(), (0x1000 - 0x40) / 16 + 1);
    }

    #[test]
    fn test_scan_thread_index_in_range() {
        let (_dir, store) = store_with_regions(&[(0x10000, vec![0u8; 0x4000])]);
        let cfg = ScanConfig::new(8, 8).threads(3).quiet();
        store.scan(&cfg, |_, _, thread_index| {
            assert!(thread_index < 3);
        });
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_scan_rejects_non_power_of_two_stride() {
        let (_dir, store) = store_with_regions(&[(0x10000, vec![0u8; 0x1000])]);
        store.scan(&ScanConfig::new(24, 8).quiet(), |_, _, _| {});
    }

    #[test]
    #[should_panic(expected = "0x1000")]
    fn test_scan_rejects_oversized_stride() {
        let (_dir, store) = store_with_regions(&[(0x10000, vec![0u8; 0x1000])]);
        store.scan(&ScanConfig::new(0x2000, 8).quiet(), |_, _, _| {});
    }
}

//! String statistics: a log-scaled histogram of str (or bytes) lengths.

use std::sync::Mutex;

use crate::env::Environment;
use crate::error::Result;
use crate::memory::Cursor;
use crate::query::{QueryConfig, ReprHit};
use crate::traverse::ReprOptions;
use crate::types::{strings, ObjectHeader, HEADER_SIZE};

/// Bucket upper bounds; a final overflow bucket catches anything larger.
pub const SIZE_BUCKETS: [u64; 29] = [
    0, 1, 2, 5, 10, 20, 50, 100, 200, 500, 1000, 2000, 5000, 10000, 20000, 50000, 100000, 200000,
    500000, 1000000, 2000000, 5000000, 10000000, 20000000, 50000000, 100000000, 200000000,
    500000000, 1000000000,
];

#[derive(Debug)]
pub struct StringStats {
    pub total_objects: u64,
    pub total_bytes: u64,
    /// One count per `SIZE_BUCKETS` entry, plus an overflow slot.
    pub histogram: Vec<u64>,
    /// Objects whose size fell inside the requested print window.
    pub printed: Vec<ReprHit>,
}

fn bucket_index(size: u64) -> usize {
    SIZE_BUCKETS.partition_point(|&bound| bound < size)
}

/// Sweep all str objects (or bytes objects with `bytes_mode`) and bucket
/// their lengths. Objects with `print_larger_than <= len <
/// print_smaller_than` are rendered; with the defaults of 0 the window is
/// empty and nothing is rendered.
pub fn aggregate_strings(
    env: &Environment,
    bytes_mode: bool,
    print_smaller_than: u64,
    print_larger_than: u64,
    opts: ReprOptions,
    cfg: &QueryConfig,
) -> Result<StringStats> {
    let type_addr = env.get_type(if bytes_mode { "bytes" } else { "str" })?;

    struct Accumulator {
        total_objects: u64,
        total_bytes: u64,
        histogram: Vec<u64>,
        printed: Vec<ReprHit>,
    }
    let acc = Mutex::new(Accumulator {
        total_objects: 0,
        total_bytes: 0,
        histogram: vec![0; SIZE_BUCKETS.len() + 1],
        printed: Vec::new(),
    });

    env.store().scan(&cfg.scan(8, HEADER_SIZE), |bytes, addr, _| {
        let Ok(header) = ObjectHeader::parse(&mut Cursor::new(bytes, 0)) else {
            return;
        };
        if header.type_of != type_addr {
            return;
        }
        if env.invalid_reason(addr).is_some() {
            return;
        }
        let size = if bytes_mode {
            strings::bytes_len(env, addr)
        } else {
            strings::str_len(env, addr)
        };
        let Ok(size) = size else {
            return;
        };

        let repr = if size >= print_larger_than && size < print_smaller_than {
            let mut t = env.traverse(opts);
            let repr = t.repr(addr);
            t.is_valid.then_some(repr)
        } else {
            None
        };

        let mut acc = acc.lock().unwrap();
        acc.histogram[bucket_index(size)] += 1;
        acc.total_objects += 1;
        acc.total_bytes += size;
        if let Some(repr) = repr {
            acc.printed.push((addr, repr));
        }
    });

    let acc = acc.into_inner().unwrap();
    let mut printed = acc.printed;
    printed.sort_by_key(|(addr, _)| *addr);
    Ok(StringStats {
        total_objects: acc.total_objects,
        total_bytes: acc.total_bytes,
        histogram: acc.histogram,
        printed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(1), 1);
        assert_eq!(bucket_index(2), 2);
        assert_eq!(bucket_index(3), 3);
        assert_eq!(bucket_index(5), 3);
        assert_eq!(bucket_index(6), 4);
        assert_eq!(bucket_index(1000000000), 28);
        assert_eq!(bucket_index(2000000000), 29);
    }
}

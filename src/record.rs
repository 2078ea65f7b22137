//! The record-source contract and the small in-memory sort used on a
//! freshly read page.

use std::cmp::Ordering;

use crate::error::SortError;
use crate::metrics::Metrics;

/// Pulls fixed-size records one at a time. `out` is always exactly
/// `record_size` bytes. Implementations are expected to be cheap and
/// synchronous; this crate never buffers ahead of what it's about to
/// consume.
///
/// The concrete source (reading from an upstream table, a device sensor
/// log, a generator) is the caller's concern; this trait is only the
/// contract the run generator pulls through.
pub trait RecordSource {
    /// Writes the next record into `out` and returns `true`, or returns
    /// `false` at end of input and leaves `out` untouched.
    fn next(&mut self, out: &mut [u8]) -> Result<bool, SortError>;
}

/// A comparator over whole records, keyed however the caller likes (first
/// `key_size` bytes, a parsed numeric field, etc). Supplied externally;
/// this crate only ever calls it.
pub type Comparator<'a> = dyn FnMut(&[u8], &[u8]) -> Ordering + 'a;

/// Sorts the first `count` records in `page` in place.
///
/// `page` holds `count` contiguous `record_size`-byte records (no page
/// header). Any stable or unstable O(n log n) sort is sufficient here —
/// this wraps the standard library's, which is what a page this small
/// should use rather than a hand-rolled routine.
pub fn sort_records(
    page: &mut [u8],
    record_size: usize,
    count: usize,
    cmp: &mut Comparator,
    metrics: &mut Metrics,
) {
    if count <= 1 {
        return;
    }
    let mut records: Vec<Vec<u8>> = (0..count)
        .map(|i| page[i * record_size..(i + 1) * record_size].to_vec())
        .collect();
    records.sort_by(|a, b| {
        metrics.num_compar += 1;
        cmp(a, b)
    });
    for (i, record) in records.into_iter().enumerate() {
        page[i * record_size..(i + 1) * record_size].copy_from_slice(&record);
        metrics.num_memcpys += 1;
    }
}

//! Run generation via replacement selection.
//!
//! Produces sorted runs ("sublists") substantially longer than the buffer
//! by keeping a priority heap of candidate records plus an overflow list of
//! records that arrived too late for the run currently being written. Runs
//! are written back-to-back into the scratch file starting at offset 0;
//! each run's pages carry block ids `0, 1, 2, ...` relative to the run's own
//! start, which is what lets the finishing phase rediscover run boundaries
//! by scanning backward (see [`crate::minsort::discover_sublists`]).

use std::cmp::Ordering;
use std::io::{Seek, Write};

use crate::config::ExternalSortConfig;
use crate::error::SortError;
use crate::heap::{heapify, shift_up};
use crate::metrics::Metrics;
use crate::page::write_page;
use crate::record::{sort_records, Comparator, RecordSource};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunGenResult {
    pub num_runs: u32,
    pub total_pages: u32,
}

/// Folds `distinct_this_run` into the engine-wide `avg_distinct_x10` estimate.
///
/// The update term divides by the post-increment run count rather than the
/// pre-increment one, carrying one extra unit of inertia per sample. This is
/// a deliberate property of the estimator the adaptive controller was tuned
/// against, not a bug to clean up here.
fn fold_distinct_estimate(metrics: &mut Metrics, distinct_this_run: u32) {
    metrics.num_runs += 1;
    let n = metrics.num_runs as i64;
    let avg = metrics.avg_distinct_x10 as i64;
    let distinct = distinct_this_run as i64;
    metrics.avg_distinct_x10 = (avg + (distinct * 10 - avg) / n) as u32;
}

/// Buffers `source` one page at a time, sorting each freshly read page with
/// [`sort_records`] before handing its records out one by one (spec 4.D:
/// "sorts the records inside one freshly read page", feeding spec 4.E step
/// 2a/2b). Reading this way instead of straight off `source` lets the
/// per-record selection below treat successive reads as already
/// nondecreasing within a page, which is what makes the heap/overflow-list
/// merge below a linear scan rather than a per-record heap churn.
struct PageBatchReader<'a, S: RecordSource> {
    source: &'a mut S,
    record_size: usize,
    values_per_page: usize,
    buf: Vec<u8>,
    len: usize,
    pos: usize,
}

impl<'a, S: RecordSource> PageBatchReader<'a, S> {
    fn new(source: &'a mut S, record_size: usize, values_per_page: usize) -> Self {
        PageBatchReader {
            source,
            record_size,
            values_per_page,
            buf: vec![0u8; values_per_page * record_size],
            len: 0,
            pos: 0,
        }
    }

    fn refill(&mut self, cmp: &mut Comparator, metrics: &mut Metrics) -> Result<(), SortError> {
        let rs = self.record_size;
        let mut tmp = vec![0u8; rs];
        let mut n = 0usize;
        while n < self.values_per_page {
            if !self.source.next(&mut tmp)? {
                break;
            }
            self.buf[n * rs..(n + 1) * rs].copy_from_slice(&tmp);
            n += 1;
        }
        if n > 1 {
            sort_records(&mut self.buf[..n * rs], rs, n, cmp, metrics);
        }
        self.len = n;
        self.pos = 0;
        Ok(())
    }

    /// Writes the next record into `out`, reading (and sorting) a new page
    /// from `source` when the current one is exhausted. Returns `false`
    /// only once `source` itself has nothing left to give.
    fn next(&mut self, out: &mut [u8], cmp: &mut Comparator, metrics: &mut Metrics) -> Result<bool, SortError> {
        if self.pos >= self.len {
            self.refill(cmp, metrics)?;
            if self.len == 0 {
                return Ok(false);
            }
        }
        let rs = self.record_size;
        out.copy_from_slice(&self.buf[self.pos * rs..(self.pos + 1) * rs]);
        self.pos += 1;
        Ok(true)
    }
}

/// Runs replacement selection over `source`, writing sorted runs to
/// `scratch` starting at its current position (callers typically pass a
/// file seeked to offset 0).
///
/// `work` is reused for both the active heap and the overflow list: the
/// heap occupies a prefix that shrinks over the run, the list a suffix that
/// grows to meet it, so the two never need more than `work.len()` records
/// of storage between them. `work.len()` must equal
/// `(cfg.num_pages - 1) * cfg.values_per_page()`.
pub fn generate_runs<S: RecordSource, F: Write + Seek>(
    source: &mut S,
    scratch: &mut F,
    cfg: &ExternalSortConfig,
    work: &mut [u8],
    cmp: &mut Comparator,
    metrics: &mut Metrics,
) -> Result<RunGenResult, SortError> {
    let rs = cfg.record_size;
    let values_per_page = cfg.values_per_page();
    let cap_total = work.len() / rs;
    debug_assert_eq!(cap_total, (cfg.num_pages as usize - 1) * values_per_page);

    let mut tmp = vec![0u8; rs];
    let mut min_rec = vec![0u8; rs];
    let mut moved = vec![0u8; rs];
    let mut out_page = vec![0u8; cfg.page_size];

    let mut heap_len = 0usize;
    let mut list_len = 0usize;
    while heap_len < cap_total {
        if !source.next(&mut tmp)? {
            break;
        }
        shift_up(work, rs, heap_len, &tmp, cmp, metrics);
        heap_len += 1;
    }

    // Every subsequent read goes through the page-batched, page-sorted
    // reader: the rest of this function's selection logic is correct
    // regardless of the order records arrive in (it's plain replacement
    // selection), but feeding it a presorted page at a time is what spec
    // 4.E actually describes and is what makes component D load-bearing.
    let mut reader = PageBatchReader::new(source, rs, values_per_page);

    let mut write_offset: u64 = scratch.stream_position().map_err(|e| SortError::write(0, e))?;
    let mut total_pages: u32 = 0;
    let mut num_runs: u32 = 0;

    let mut block_id: u32 = 0;
    let mut out_count: usize = 0;
    let mut last_emitted: Option<Vec<u8>> = None;
    let mut distinct_this_run: u32 = 0;

    while heap_len > 0 {
        min_rec.copy_from_slice(&work[0..rs]);

        let is_new_key = match &last_emitted {
            Some(prev) => cmp(prev, &min_rec) != Ordering::Equal,
            None => true,
        };
        if is_new_key && distinct_this_run < 255 {
            distinct_this_run += 1;
        }
        last_emitted = Some(min_rec.clone());

        if out_count == values_per_page {
            write_page(scratch, write_offset, &mut out_page, block_id, out_count as u16, metrics)?;
            write_offset += cfg.page_size as u64;
            total_pages += 1;
            block_id += 1;
            out_count = 0;
        }
        let slot = crate::config::PAGE_HEADER_SIZE + out_count * rs;
        out_page[slot..slot + rs].copy_from_slice(&min_rec);
        out_count += 1;

        if reader.next(&mut tmp, cmp, metrics)? {
            if cmp(&tmp, &min_rec) != Ordering::Less {
                heapify(work, rs, heap_len, &tmp, cmp, metrics);
            } else {
                heap_len -= 1;
                if heap_len > 0 {
                    moved.copy_from_slice(&work[heap_len * rs..(heap_len + 1) * rs]);
                    heapify(work, rs, heap_len, &moved, cmp, metrics);
                }
                list_len += 1;
                let list_slot = cap_total - list_len;
                work[list_slot * rs..(list_slot + 1) * rs].copy_from_slice(&tmp);
                metrics.num_memcpys += 1;
            }
        } else {
            heap_len -= 1;
            if heap_len > 0 {
                moved.copy_from_slice(&work[heap_len * rs..(heap_len + 1) * rs]);
                heapify(work, rs, heap_len, &moved, cmp, metrics);
            }
        }

        if heap_len == 0 {
            if out_count > 0 {
                write_page(scratch, write_offset, &mut out_page, block_id, out_count as u16, metrics)?;
                write_offset += cfg.page_size as u64;
                total_pages += 1;
                block_id += 1;
                out_count = 0;
            }
            num_runs += 1;
            fold_distinct_estimate(metrics, distinct_this_run);
            distinct_this_run = 0;
            last_emitted = None;
            block_id = 0;

            if list_len > 0 {
                for i in 0..list_len {
                    let src_slot = cap_total - list_len + i;
                    moved.copy_from_slice(&work[src_slot * rs..(src_slot + 1) * rs]);
                    shift_up(work, rs, i, &moved, cmp, metrics);
                }
                heap_len = list_len;
                list_len = 0;
                while heap_len < cap_total {
                    if !reader.next(&mut tmp, cmp, metrics)? {
                        break;
                    }
                    shift_up(work, rs, heap_len, &tmp, cmp, metrics);
                    heap_len += 1;
                }
            }
        }
    }

    Ok(RunGenResult { num_runs, total_pages })
}

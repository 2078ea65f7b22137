//! The adaptive controller and the sort engine's single entry point.
//!
//! [`external_sort`] runs replacement selection over the caller's iterator,
//! then picks a finishing algorithm from the distinct-value estimate that
//! run generation collected: a [`flash_minsort`](crate::minsort) scan when
//! keys repeat heavily, or [`nob_merge_all`](crate::merge::nob_merge_all)
//! otherwise. See `spec.md` §4.I for the cost model this mirrors.

use std::io::{Read, Seek, SeekFrom, Write};
use std::time::Instant;

use crate::config::ExternalSortConfig;
use crate::error::SortError;
use crate::merge::nob_merge_all;
use crate::metrics::Metrics;
use crate::minsort::{discover_sublists, flash_minsort_regions, flash_minsort_sublists, SublistInfo};
use crate::record::{Comparator, RecordSource};
use crate::rungen::generate_runs;

/// Which finishing algorithm the adaptive controller picked, and the cost
/// figures that drove the choice. Exposed mainly so callers (and tests) can
/// confirm the decision without re-deriving it from raw metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptiveDecision {
    /// Distinct keys are rare enough that tracking one minimum per sublist
    /// out-performs merging; sublists are already sorted so only their
    /// current key and file offset need to be held in memory.
    MinSortSublists,
    /// Same as `MinSortSublists`, but there isn't buffer room to hold a
    /// cursor per sublist, so the more general (costlier) region scan is
    /// used instead.
    MinSortRegions,
    /// Keys are distinct enough that a multi-way merge wins.
    NobMerge,
}

/// Cost estimates behind one [`AdaptiveDecision`], in the same integer
/// units the decision was made from (tenths, to mirror the reference
/// implementation's fixed-point arithmetic exactly — see `spec.md` §9 on
/// why floating point must not be allowed to drift the boundary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveCost {
    pub num_passes: u32,
    pub nob_cost: u32,
    pub minsort_cost: u32,
    pub sublist_version_possible: bool,
}

/// Applies the cost model from `spec.md` §4.I: estimate the number of
/// NOB-merge passes `num_sublists` would take at fan-in `cfg.num_pages`,
/// compare that against the running `avg_distinct` estimate, and pick
/// whichever finisher the comparison favors.
pub fn choose_finisher(num_sublists: u32, avg_distinct_x10: u32, cfg: &ExternalSortConfig) -> (AdaptiveDecision, AdaptiveCost) {
    let m = cfg.num_pages as f64;
    let num_passes = if num_sublists <= 1 {
        0
    } else {
        ((num_sublists as f64).ln() / m.ln()).ceil() as u32
    };
    let nob_cost = num_passes * (10 + cfg.write_to_read_ratio_x10) / 10;

    // +4 bytes per sublist for the file-offset pointer the sorted-sublist
    // variant keeps alongside each sublist's current key.
    let buffer_size_bytes = (cfg.num_pages as usize - 1) * cfg.page_size;
    let sublist_version_possible = (num_sublists as usize) <= buffer_size_bytes / (cfg.key_size + 4);

    let mut avg_distinct = avg_distinct_x10;
    if sublist_version_possible && avg_distinct / 10 > cfg.values_per_page() as u32 {
        avg_distinct = cfg.values_per_page() as u32 * 10;
    }
    let minsort_cost = avg_distinct / 10;

    let decision = if minsort_cost < nob_cost {
        if sublist_version_possible {
            AdaptiveDecision::MinSortSublists
        } else {
            AdaptiveDecision::MinSortRegions
        }
    } else {
        AdaptiveDecision::NobMerge
    };

    (decision, AdaptiveCost { num_passes, nob_cost, minsort_cost, sublist_version_possible })
}

/// Where the sorted sequence ended up, plus the counters collected while
/// getting it there.
#[derive(Debug, Clone, Copy)]
pub struct SortOutcome {
    /// Byte offset into the scratch file at which the sorted sequence
    /// begins. Zero when there was nothing to sort, or when run generation
    /// alone already produced a single sorted run.
    pub result_offset: u64,
    pub metrics: Metrics,
    /// Which finisher ran, or `None` when run generation alone already
    /// produced the sorted result (zero or one run) and no finishing pass
    /// was needed.
    pub decision: Option<AdaptiveDecision>,
}

/// Sorts `source`'s records through `scratch`, using `buffer` as the
/// engine's entire working set.
///
/// `buffer` must hold at least `(cfg.num_pages - 1) * cfg.values_per_page()
/// * cfg.record_size` bytes — the replacement-selection heap and overflow
/// list during run generation; the finishing pass (MinSort or NOB-merge)
/// manages its own small, `cfg.num_pages`-proportional allocations
/// separately; see DESIGN.md for why those aren't carved from the same
/// slice.
///
/// `run_gen_only` stops after producing runs, skipping the finishing pass
/// entirely — useful for benchmarking run generation in isolation or for
/// callers that want to pick their own finisher.
pub fn external_sort<S: RecordSource, F: Read + Write + Seek>(
    source: &mut S,
    scratch: &mut F,
    cfg: &ExternalSortConfig,
    buffer: &mut [u8],
    cmp: &mut Comparator,
    run_gen_only: bool,
) -> Result<SortOutcome, SortError> {
    cfg.validate()?;

    let total_start = Instant::now();
    let mut metrics = Metrics::new();

    let work_len = (cfg.num_pages as usize - 1) * cfg.values_per_page() * cfg.record_size;
    if buffer.len() < work_len {
        return Err(SortError::InvalidConfig(format!(
            "buffer too small: {} bytes given, {work_len} required for {} pages",
            buffer.len(),
            cfg.num_pages
        )));
    }
    let work = &mut buffer[..work_len];

    scratch.seek(SeekFrom::Start(0)).map_err(|e| SortError::write(0, e))?;
    let gen_start = Instant::now();
    let run_result = generate_runs(source, scratch, cfg, work, cmp, &mut metrics)?;
    metrics.gen_time = gen_start.elapsed();

    if run_result.num_runs == 0 || run_gen_only {
        metrics.time = total_start.elapsed();
        return Ok(SortOutcome { result_offset: 0, metrics, decision: None });
    }

    if run_result.num_runs == 1 {
        metrics.time = total_start.elapsed();
        return Ok(SortOutcome { result_offset: 0, metrics, decision: None });
    }

    let last_write_pos = scratch.stream_position().map_err(|e| SortError::write(0, e))?;
    let sublists: Vec<SublistInfo> = discover_sublists(scratch, run_result.total_pages, cfg.page_size, &mut metrics)?;

    let (decision, _cost) = choose_finisher(sublists.len() as u32, metrics.avg_distinct_x10, cfg);

    let result_offset = match decision {
        AdaptiveDecision::MinSortSublists => {
            flash_minsort_sublists(scratch, &sublists, cfg, last_write_pos, cmp, &mut metrics)?;
            last_write_pos
        }
        AdaptiveDecision::MinSortRegions => {
            flash_minsort_regions(scratch, run_result.total_pages, cfg, sublists.len() as u32, last_write_pos, cmp, &mut metrics)?;
            last_write_pos
        }
        AdaptiveDecision::NobMerge => {
            let (result, _passes) = nob_merge_all(scratch, sublists, cfg, last_write_pos, cmp, &mut metrics)?;
            result.start_offset
        }
    };

    metrics.time = total_start.elapsed();
    Ok(SortOutcome { result_offset, metrics, decision: Some(decision) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageHeader;
    use std::io::Cursor;

    fn cfg(num_pages: u32) -> ExternalSortConfig {
        ExternalSortConfig {
            record_size: 4,
            key_size: 4,
            page_size: 6 + 4 * 8, // 8 records/page
            num_pages,
            write_to_read_ratio_x10: 10,
        }
    }

    struct VecSource {
        values: Vec<i32>,
        pos: usize,
    }
    impl RecordSource for VecSource {
        fn next(&mut self, out: &mut [u8]) -> Result<bool, SortError> {
            if self.pos >= self.values.len() {
                return Ok(false);
            }
            out[0..4].copy_from_slice(&self.values[self.pos].to_le_bytes());
            self.pos += 1;
            Ok(true)
        }
    }

    fn key_cmp(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        i32::from_le_bytes(a[0..4].try_into().unwrap()).cmp(&i32::from_le_bytes(b[0..4].try_into().unwrap()))
    }

    fn read_sorted(bytes: &[u8], page_size: usize, start: u64, count: usize) -> Vec<i32> {
        let mut got = Vec::with_capacity(count);
        let mut off = start as usize;
        while got.len() < count {
            let header = PageHeader::decode(&bytes[off..off + 6]);
            for i in 0..header.count as usize {
                let rec_off = off + 6 + i * 4;
                got.push(i32::from_le_bytes(bytes[rec_off..rec_off + 4].try_into().unwrap()));
            }
            off += page_size;
        }
        got
    }

    #[test]
    fn empty_input_reports_zero_offset_and_no_runs() {
        let cfg = cfg(3);
        let mut source = VecSource { values: vec![], pos: 0 };
        let mut scratch = Cursor::new(vec![0u8; cfg.page_size * 64]);
        let mut buffer = vec![0u8; (cfg.num_pages as usize - 1) * cfg.values_per_page() * cfg.record_size];
        let mut cmp = key_cmp;
        let outcome = external_sort(&mut source, &mut scratch, &cfg, &mut buffer, &mut cmp, false).unwrap();
        assert_eq!(outcome.result_offset, 0);
        assert_eq!(outcome.metrics.num_runs, 0);
    }

    #[test]
    fn already_sorted_input_yields_single_run_and_skips_finishing() {
        let cfg = cfg(3);
        let values: Vec<i32> = (0..(cfg.values_per_page() as i32 * 2)).collect();
        let mut source = VecSource { values: values.clone(), pos: 0 };
        let mut scratch = Cursor::new(vec![0u8; cfg.page_size * 64]);
        let mut buffer = vec![0u8; (cfg.num_pages as usize - 1) * cfg.values_per_page() * cfg.record_size];
        let mut cmp = key_cmp;
        let outcome = external_sort(&mut source, &mut scratch, &cfg, &mut buffer, &mut cmp, false).unwrap();
        assert_eq!(outcome.metrics.num_runs, 1);
        assert_eq!(outcome.result_offset, 0);

        let bytes = scratch.into_inner();
        let got = read_sorted(&bytes, cfg.page_size, 0, values.len());
        assert_eq!(got, values);
    }

    #[test]
    fn reverse_sorted_input_ends_up_sorted_after_finishing() {
        let cfg = cfg(3);
        let n = cfg.values_per_page() as i32 * 6;
        let values: Vec<i32> = (0..n).rev().collect();
        let mut source = VecSource { values: values.clone(), pos: 0 };
        let mut scratch = Cursor::new(vec![0u8; cfg.page_size * 256]);
        let mut buffer = vec![0u8; (cfg.num_pages as usize - 1) * cfg.values_per_page() * cfg.record_size];
        let mut cmp = key_cmp;
        let outcome = external_sort(&mut source, &mut scratch, &cfg, &mut buffer, &mut cmp, false).unwrap();
        assert!(outcome.metrics.num_runs > 1);

        let mut expected = values;
        expected.sort();
        let bytes = scratch.into_inner();
        let got = read_sorted(&bytes, cfg.page_size, outcome.result_offset, expected.len());
        assert_eq!(got, expected);
    }

    #[test]
    fn adaptive_decision_prefers_minsort_for_low_cardinality() {
        let cfg = cfg(4);
        // 4 sublists at fan-in 4 take one merge pass (nob_cost = 2); an
        // avg_distinct_x10 of 10 (minsort_cost = 1) undercuts that, so
        // MinSort should win.
        let (decision, cost) = choose_finisher(4, 10, &cfg);
        assert!(cost.minsort_cost < cost.nob_cost);
        assert_eq!(decision, AdaptiveDecision::MinSortSublists);
    }

    #[test]
    fn adaptive_decision_prefers_nob_merge_for_high_cardinality() {
        let cfg = cfg(4);
        let (decision, cost) = choose_finisher(4, 10_000, &cfg);
        assert!(cost.minsort_cost >= cost.nob_cost || !cost.sublist_version_possible);
        assert_eq!(decision, AdaptiveDecision::NobMerge);
    }

    #[test]
    fn buffer_too_small_is_rejected() {
        let cfg = cfg(3);
        let mut source = VecSource { values: vec![1, 2, 3], pos: 0 };
        let mut scratch = Cursor::new(vec![0u8; cfg.page_size * 16]);
        let mut buffer = vec![0u8; 1];
        let mut cmp = key_cmp;
        let err = external_sort(&mut source, &mut scratch, &cfg, &mut buffer, &mut cmp, false).unwrap_err();
        assert!(matches!(err, SortError::InvalidConfig(_)));
    }
}

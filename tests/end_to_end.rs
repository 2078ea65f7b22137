//! End-to-end scenarios driving [`external_sort`] through a real scratch
//! file on disk, covering the key distributions and boundary cases the
//! adaptive controller is meant to tell apart.

use std::cmp::Ordering;

use adaptive_extsort::common::file_source::FileRecordSource;
use adaptive_extsort::common::generator::{generate_keys, KeyDistribution};
use adaptive_extsort::common::scratch::create_sized;
use adaptive_extsort::{external_sort, AdaptiveDecision, ExternalSortConfig, RecordSource, SortError};

fn cfg(num_pages: u32) -> ExternalSortConfig {
    ExternalSortConfig {
        record_size: 8,
        key_size: 4,
        page_size: 256,
        num_pages,
        write_to_read_ratio_x10: 10,
    }
}

fn key_cmp(a: &[u8], b: &[u8]) -> Ordering {
    u32::from_le_bytes(a[0..4].try_into().unwrap()).cmp(&u32::from_le_bytes(b[0..4].try_into().unwrap()))
}

struct VecSource {
    values: Vec<u32>,
    pos: usize,
}

impl RecordSource for VecSource {
    fn next(&mut self, out: &mut [u8]) -> Result<bool, SortError> {
        if self.pos >= self.values.len() {
            return Ok(false);
        }
        out[0..4].copy_from_slice(&self.values[self.pos].to_le_bytes());
        out[4..8].copy_from_slice(&(self.pos as u32).to_le_bytes());
        self.pos += 1;
        Ok(true)
    }
}

fn read_sorted(bytes: &[u8], page_size: usize, start: u64, count: usize) -> Vec<u32> {
    let mut got = Vec::with_capacity(count);
    let mut off = start as usize;
    while got.len() < count {
        let header = adaptive_extsort::page::PageHeader::decode(&bytes[off..off + 6]);
        for i in 0..header.count as usize {
            let rec_off = off + 6 + i * 8;
            got.push(u32::from_le_bytes(bytes[rec_off..rec_off + 4].try_into().unwrap()));
        }
        off += page_size;
    }
    got
}

fn sort_in_memory(values: &[u32], cfg: &ExternalSortConfig) -> (Vec<u32>, adaptive_extsort::Metrics) {
    let mut source = VecSource { values: values.to_vec(), pos: 0 };
    let total_pages_estimate = values.len() / cfg.values_per_page() + 8;
    let scratch_len = total_pages_estimate as u64 * cfg.page_size as u64 * 4;
    let mut scratch = std::io::Cursor::new(vec![0u8; scratch_len as usize]);
    let mut buffer = vec![0u8; (cfg.num_pages as usize - 1) * cfg.values_per_page() * cfg.record_size];
    let mut cmp = key_cmp;
    let outcome = external_sort(&mut source, &mut scratch, cfg, &mut buffer, &mut cmp, false).unwrap();
    let bytes = scratch.into_inner();
    let got = read_sorted(&bytes, cfg.page_size, outcome.result_offset, values.len());
    (got, outcome.metrics)
}

#[test]
fn already_sorted_needs_no_finishing_pass() {
    let cfg = cfg(4);
    let values = generate_keys(KeyDistribution::Sorted, 2_000, 1);
    let (got, metrics) = sort_in_memory(&values, &cfg);
    assert_eq!(metrics.num_runs, 1);
    assert_eq!(got, values);
}

#[test]
fn reverse_sorted_needs_many_runs_but_still_sorts() {
    let cfg = cfg(4);
    let values = generate_keys(KeyDistribution::ReverseSorted, 2_000, 2);
    let (got, metrics) = sort_in_memory(&values, &cfg);
    assert!(metrics.num_runs > 1);
    let mut expected = values;
    expected.sort();
    assert_eq!(got, expected);
}

#[test]
fn low_cardinality_input_picks_minsort() {
    let cfg = cfg(8);
    let values = generate_keys(KeyDistribution::UniformLowCardinality { cardinality: 16 }, 3_000, 3);
    let (got, metrics) = sort_in_memory(&values, &cfg);
    let mut expected = values;
    expected.sort();
    assert_eq!(got, expected);

    let sublists_estimate = metrics.num_runs.max(1);
    let (decision, _) = adaptive_extsort::sort::choose_finisher(sublists_estimate, metrics.avg_distinct_x10, &cfg);
    assert!(matches!(decision, AdaptiveDecision::MinSortSublists | AdaptiveDecision::MinSortRegions));
}

#[test]
fn fully_distinct_input_picks_nob_merge() {
    let cfg = cfg(8);
    let values = generate_keys(KeyDistribution::AllDistinctRandom, 3_000, 4);
    let (got, metrics) = sort_in_memory(&values, &cfg);
    let mut expected = values;
    expected.sort();
    assert_eq!(got, expected);

    let sublists_estimate = metrics.num_runs.max(1);
    let (decision, _) = adaptive_extsort::sort::choose_finisher(sublists_estimate, metrics.avg_distinct_x10, &cfg);
    assert_eq!(decision, AdaptiveDecision::NobMerge);
}

#[test]
fn mostly_sorted_input_produces_fewer_runs_than_fully_random() {
    let cfg = cfg(4);
    let mostly_sorted = generate_keys(KeyDistribution::MostlySorted { sorted_run: 500 }, 5_000, 5);
    let fully_random = generate_keys(KeyDistribution::AllDistinctRandom, 5_000, 6);

    let (_, mostly_metrics) = sort_in_memory(&mostly_sorted, &cfg);
    let (_, random_metrics) = sort_in_memory(&fully_random, &cfg);

    assert!(mostly_metrics.num_runs <= random_metrics.num_runs);
}

#[test]
fn empty_input_sorts_to_nothing() {
    let cfg = cfg(3);
    let (got, metrics) = sort_in_memory(&[], &cfg);
    assert!(got.is_empty());
    assert_eq!(metrics.num_runs, 0);
}

#[test]
fn minimum_buffer_of_two_pages_still_sorts() {
    let cfg = cfg(2);
    let values = generate_keys(KeyDistribution::ReverseSorted, 500, 7);
    let (got, _) = sort_in_memory(&values, &cfg);
    let mut expected = values;
    expected.sort();
    assert_eq!(got, expected);
}

#[test]
fn all_duplicate_keys_sort_trivially() {
    let cfg = cfg(4);
    let values = vec![42u32; 1_000];
    let (got, metrics) = sort_in_memory(&values, &cfg);
    assert_eq!(got, values);
    assert_eq!(metrics.num_runs, 1);
}

#[test]
fn thirty_two_to_sixty_four_sublists_triggers_the_minsort_cutin() {
    // One record per run, forced by a reverse-sorted sequence that never
    // fits more than one value in the replacement-selection heap, yields
    // exactly `count` runs/sublists.
    let cfg = ExternalSortConfig { record_size: 8, key_size: 4, page_size: 6 + 8, num_pages: 2, write_to_read_ratio_x10: 10 };
    let values = generate_keys(KeyDistribution::ReverseSorted, 40, 8);
    let (got, metrics) = sort_in_memory(&values, &cfg);
    assert_eq!(metrics.num_runs, 40);
    let mut expected = values;
    expected.sort();
    assert_eq!(got, expected);
}

#[test]
fn sorts_through_a_real_scratch_file_on_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let input_path = tmp.path().join("input.bin");
    let scratch_path = tmp.path().join("scratch.bin");

    let cfg = cfg(4);
    let values = generate_keys(KeyDistribution::AllDistinctRandom, 1_000, 9);
    {
        let mut file = std::fs::File::create(&input_path).unwrap();
        use std::io::Write;
        for (i, v) in values.iter().enumerate() {
            let mut rec = [0u8; 8];
            rec[0..4].copy_from_slice(&v.to_le_bytes());
            rec[4..8].copy_from_slice(&(i as u32).to_le_bytes());
            file.write_all(&rec).unwrap();
        }
    }

    let file = std::fs::OpenOptions::new().read(true).open(&input_path).unwrap();
    let mut source = FileRecordSource::open(file, cfg.record_size).unwrap();
    assert_eq!(source.total_records(), values.len() as u64);

    let scratch_pages = (values.len() / cfg.values_per_page() + 8) as u64 * 4;
    let mut scratch = create_sized(&scratch_path, scratch_pages * cfg.page_size as u64).unwrap();
    let mut buffer = vec![0u8; (cfg.num_pages as usize - 1) * cfg.values_per_page() * cfg.record_size];
    let mut cmp = key_cmp;

    let outcome = external_sort(&mut source, &mut scratch, &cfg, &mut buffer, &mut cmp, false).unwrap();

    use std::io::{Read, Seek, SeekFrom};
    scratch.seek(SeekFrom::Start(0)).unwrap();
    let mut all = Vec::new();
    scratch.read_to_end(&mut all).unwrap();
    let got = read_sorted(&all, cfg.page_size, outcome.result_offset, values.len());

    let mut expected = values;
    expected.sort();
    assert_eq!(got, expected);
}

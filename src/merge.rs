//! NOB-merge: a multi-way merge whose output page has no dedicated slot of
//! its own.
//!
//! Every other k-way merge spends one buffer page purely on output. This one
//! doesn't: slot 0 holds *both* an input sublist and the records already
//! merged into it, reusing whatever cells its own input has finished with.
//! When a winning record comes from another slot and slot 0 has no free
//! cell to receive it (its input and output cursors have collided), the
//! record slot 0 was about to read gets displaced into the winner's slot —
//! parked in a small heap there — rather than ever growing a separate
//! output buffer. That displacement is what buys the Mth buffer page back
//! for input fan-in instead of burning it on output.
//!
//! The parked heap itself is kept in its own small auxiliary array per slot
//! rather than literally co-resident with that slot's page bytes — see
//! DESIGN.md for why a disjoint owned `Vec` stands in for the pointer
//! aliasing the reference implementation uses; the observable merge order
//! and the no-dedicated-output-page property are unaffected.

use std::cmp::Ordering;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::config::{ExternalSortConfig, PAGE_HEADER_SIZE};
use crate::error::SortError;
use crate::heap::{heapify, shift_up};
use crate::metrics::Metrics;
use crate::minsort::{flash_minsort_sublists, SublistInfo};
use crate::page::{read_page, write_page, PageHeader};
use crate::record::Comparator;

/// The output slot (slot 0) of one merge group: a page-sized buffer doing
/// double duty as the tail of sublist 0's input and the head of the merged
/// output.
struct OutputSlot {
    /// `values_per_page` contiguous records; no page header lives here.
    records: Vec<u8>,
    record_size: usize,
    capacity: usize,
    /// Next record this slot will contribute as input, or `count` if none
    /// is currently loaded (`input_live` says whether more ever will be).
    record1: usize,
    /// Count of valid input records presently loaded at `records[..count]`.
    count: usize,
    /// Whether sublist 0 has more pages once `record1` reaches `count`.
    input_live: bool,
    page_offset: u64,
    block_id: u32,
    blocks_in_sublist: u32,
    /// Next cell to receive a merged output record.
    record2: usize,
}

impl OutputSlot {
    fn current_input(&self) -> Option<&[u8]> {
        if self.record1 < self.count {
            let s = self.record1 * self.record_size;
            Some(&self.records[s..s + self.record_size])
        } else {
            None
        }
    }

    /// Cells `[record1, count)` hold live unconsumed input and must not be
    /// overwritten; everything at or past `free_from()` is fair game for an
    /// output write.
    fn free_from(&self) -> usize {
        if self.record1 < self.count {
            self.record1
        } else {
            self.capacity
        }
    }

    fn load_page<F: Read + Seek>(&mut self, file: &mut F, cfg: &ExternalSortConfig, metrics: &mut Metrics) -> Result<(), SortError> {
        let mut page_buf = vec![0u8; cfg.page_size];
        let header = read_page(file, self.page_offset, &mut page_buf, metrics)?;
        self.block_id = header.block_id;
        let count = header.count as usize;
        self.records[..count * self.record_size]
            .copy_from_slice(&page_buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + count * self.record_size]);
        self.count = count;
        self.record1 = 0;
        self.input_live = self.block_id + 1 < self.blocks_in_sublist;
        Ok(())
    }

    /// Called once slot 0's current page's input is fully consumed while
    /// more pages of its own sublist remain. Loads the next page, landing
    /// it right after whatever unflushed output already sits in
    /// `[0, record2)` when it fits; otherwise flushes that output prefix as
    /// a short interior page first.
    #[allow(clippy::too_many_arguments)]
    fn refill<F: Read + Write + Seek>(
        &mut self,
        file: &mut F,
        cfg: &ExternalSortConfig,
        out_offset: &mut u64,
        out_block_id: &mut u32,
        metrics: &mut Metrics,
    ) -> Result<(), SortError> {
        let next_offset = self.page_offset + cfg.page_size as u64;
        let mut page_buf = vec![0u8; cfg.page_size];
        let header = read_page(file, next_offset, &mut page_buf, metrics)?;
        self.page_offset = next_offset;
        self.block_id = header.block_id;
        self.blocks_in_sublist = self.blocks_in_sublist.max(self.block_id + 1);
        let new_count = header.count as usize;
        let rs = self.record_size;

        if self.record2 + new_count > self.capacity {
            if self.record2 > 0 {
                let mut flush_page = vec![0u8; cfg.page_size];
                flush_page[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + self.record2 * rs]
                    .copy_from_slice(&self.records[..self.record2 * rs]);
                write_page(file, *out_offset, &mut flush_page, *out_block_id, self.record2 as u16, metrics)?;
                *out_offset += cfg.page_size as u64;
                *out_block_id += 1;
            }
            self.record2 = 0;
            self.records[..new_count * rs].copy_from_slice(&page_buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + new_count * rs]);
            self.count = new_count;
            self.record1 = 0;
        } else {
            let at = self.record2;
            self.records[at * rs..(at + new_count) * rs]
                .copy_from_slice(&page_buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + new_count * rs]);
            self.count = at + new_count;
            self.record1 = at;
        }
        self.input_live = self.block_id + 1 < self.blocks_in_sublist;
        Ok(())
    }
}

/// A pure input slot: holds one page of a sublist's records, plus a heap of
/// output records parked here because slot 0 had no room for them when they
/// were selected.
struct InputSlot {
    records: Vec<u8>,
    record_size: usize,
    record1: usize,
    count: usize,
    input_live: bool,
    page_offset: u64,
    block_id: u32,
    blocks_in_sublist: u32,
    parked: Vec<u8>,
    parked_len: usize,
}

impl InputSlot {
    fn current_input(&self) -> Option<&[u8]> {
        if self.record1 < self.count {
            let s = self.record1 * self.record_size;
            Some(&self.records[s..s + self.record_size])
        } else {
            None
        }
    }

    fn parked_top(&self) -> Option<&[u8]> {
        if self.parked_len > 0 {
            Some(&self.parked[0..self.record_size])
        } else {
            None
        }
    }

    fn park(&mut self, record: &[u8], cmp: &mut Comparator, metrics: &mut Metrics) {
        shift_up(&mut self.parked, self.record_size, self.parked_len, record, cmp, metrics);
        self.parked_len += 1;
    }

    fn pop_parked(&mut self, cmp: &mut Comparator, metrics: &mut Metrics) {
        self.parked_len -= 1;
        if self.parked_len > 0 {
            let rs = self.record_size;
            let last = self.parked[self.parked_len * rs..(self.parked_len + 1) * rs].to_vec();
            heapify(&mut self.parked, rs, self.parked_len, &last, cmp, metrics);
        }
    }

    fn advance_input<F: Read + Seek>(&mut self, file: &mut F, cfg: &ExternalSortConfig, metrics: &mut Metrics) -> Result<(), SortError> {
        self.record1 += 1;
        if self.record1 < self.count {
            return Ok(());
        }
        if self.block_id + 1 < self.blocks_in_sublist {
            let next_offset = self.page_offset + cfg.page_size as u64;
            let mut page_buf = vec![0u8; cfg.page_size];
            let header = read_page(file, next_offset, &mut page_buf, metrics)?;
            self.page_offset = next_offset;
            self.block_id = header.block_id;
            let new_count = header.count as usize;
            self.records[..new_count * self.record_size]
                .copy_from_slice(&page_buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + new_count * self.record_size]);
            self.count = new_count;
            self.record1 = 0;
        } else {
            self.input_live = false;
        }
        Ok(())
    }
}

enum Winner {
    Slot0(Vec<u8>),
    Input(usize, Vec<u8>),
    Parked(usize, Vec<u8>),
}

impl Winner {
    fn bytes(&self) -> &[u8] {
        match self {
            Winner::Slot0(b) | Winner::Input(_, b) | Winner::Parked(_, b) => b,
        }
    }
}

/// Merges up to `cfg.num_pages` sublists (one buffer page each, no page
/// dedicated solely to output) into a single run starting at
/// `out_start_offset`.
pub fn nob_merge_group<F: Read + Write + Seek>(
    file: &mut F,
    sublists: &[SublistInfo],
    cfg: &ExternalSortConfig,
    out_start_offset: u64,
    cmp: &mut Comparator,
    metrics: &mut Metrics,
) -> Result<SublistInfo, SortError> {
    let fan_in = cfg.num_pages as usize;
    assert!(sublists.len() <= fan_in, "nob_merge_group called with more sublists than the buffer has slots for");
    let rs = cfg.record_size;
    let vpp = cfg.values_per_page();

    // Read each sublist's first record to pick which one occupies slot 0:
    // the one whose first record sorts smallest, which minimizes how often
    // the first merge steps need to displace a record out of slot 0 before
    // any input has been consumed from it. `info.num_pages` already gives
    // each sublist's length (from the backward walk in
    // `discover_sublists`), so no extra last-page read is needed here.
    let mut first_keys: Vec<Vec<u8>> = Vec::with_capacity(sublists.len());
    for info in sublists {
        let first_rec_offset = info.start_offset + PAGE_HEADER_SIZE as u64;
        let mut key = vec![0u8; rs];
        file.seek(SeekFrom::Start(first_rec_offset)).map_err(|e| SortError::read(first_rec_offset, e))?;
        file.read_exact(&mut key).map_err(|e| SortError::read(first_rec_offset, e))?;
        metrics.num_reads += 1;
        first_keys.push(key);
    }
    let slot0_pos = first_keys
        .iter()
        .enumerate()
        .min_by(|(ia, a), (ib, b)| cmp(a, b).then_with(|| ia.cmp(ib)))
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut slot0 = OutputSlot {
        records: vec![0u8; vpp * rs],
        record_size: rs,
        capacity: vpp,
        record1: 0,
        count: 0,
        input_live: true,
        page_offset: sublists[slot0_pos].start_offset,
        block_id: 0,
        blocks_in_sublist: sublists[slot0_pos].num_pages,
        record2: 0,
    };
    slot0.load_page(file, cfg, metrics)?;

    let mut ins: Vec<InputSlot> = Vec::new();
    for (i, info) in sublists.iter().enumerate() {
        if i == slot0_pos {
            continue;
        }
        let mut buf = vec![0u8; cfg.page_size];
        let header = read_page(file, info.start_offset, &mut buf, metrics)?;
        let count = header.count as usize;
        let mut records = vec![0u8; vpp * rs];
        records[..count * rs].copy_from_slice(&buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + count * rs]);
        ins.push(InputSlot {
            records,
            record_size: rs,
            record1: 0,
            count,
            input_live: header.block_id + 1 < info.num_pages,
            page_offset: info.start_offset,
            block_id: header.block_id,
            blocks_in_sublist: info.num_pages,
            parked: vec![0u8; vpp * rs],
            parked_len: 0,
        });
    }

    let mut out_offset = out_start_offset;
    let mut out_block_id: u32 = 0;

    loop {
        let mut winner: Option<Winner> = None;
        if let Some(rec) = slot0.current_input() {
            winner = Some(Winner::Slot0(rec.to_vec()));
        }
        for (i, s) in ins.iter().enumerate() {
            if let Some(rec) = s.current_input() {
                let take = winner.as_ref().is_none_or(|w| cmp(rec, w.bytes()) == Ordering::Less);
                if take {
                    winner = Some(Winner::Input(i, rec.to_vec()));
                }
            }
            if let Some(rec) = s.parked_top() {
                let take = winner.as_ref().is_none_or(|w| cmp(rec, w.bytes()) == Ordering::Less);
                if take {
                    winner = Some(Winner::Parked(i, rec.to_vec()));
                }
            }
        }
        metrics.num_compar += ins.len() as u64;

        let Some(winner) = winner else { break };

        match winner {
            Winner::Slot0(rec) => {
                if slot0.record2 < slot0.record1 {
                    let at = slot0.record2 * rs;
                    slot0.records[at..at + rs].copy_from_slice(&rec);
                    metrics.num_memcpys += 1;
                }
                slot0.record1 += 1;
                slot0.record2 += 1;
            }
            Winner::Input(i, rec) => {
                place_in_slot0(&mut slot0, &mut ins[i], &rec, rs, cmp, metrics);
                slot0.record2 += 1;
                ins[i].advance_input(file, cfg, metrics)?;
            }
            Winner::Parked(i, rec) => {
                place_in_slot0(&mut slot0, &mut ins[i], &rec, rs, cmp, metrics);
                slot0.record2 += 1;
                ins[i].pop_parked(cmp, metrics);
            }
        }

        if slot0.record2 == slot0.capacity {
            let mut page = vec![0u8; cfg.page_size];
            page[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + slot0.capacity * rs].copy_from_slice(&slot0.records);
            write_page(file, out_offset, &mut page, out_block_id, slot0.capacity as u16, metrics)?;
            out_offset += cfg.page_size as u64;
            out_block_id += 1;
            slot0.record2 = 0;
            slot0.record1 = 0;
            slot0.count = 0;
            if slot0.input_live {
                slot0.load_page(file, cfg, metrics)?;
            }
        } else if slot0.record1 == slot0.count && slot0.input_live {
            slot0.refill(file, cfg, &mut out_offset, &mut out_block_id, metrics)?;
        }
    }

    if slot0.record2 > 0 {
        let mut page = vec![0u8; cfg.page_size];
        page[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + slot0.record2 * rs].copy_from_slice(&slot0.records[..slot0.record2 * rs]);
        write_page(file, out_offset, &mut page, out_block_id, slot0.record2 as u16, metrics)?;
        out_block_id += 1;
    }

    Ok(SublistInfo { start_offset: out_start_offset, num_pages: out_block_id })
}

/// Writes `rec` (the winning record, from slot `src`) into slot 0's next
/// output cell, displacing whatever live input record is there into `src`'s
/// parked heap if slot 0 has no free cell.
fn place_in_slot0(
    slot0: &mut OutputSlot,
    src: &mut InputSlot,
    rec: &[u8],
    rs: usize,
    cmp: &mut Comparator,
    metrics: &mut Metrics,
) {
    let free_from = slot0.free_from();
    if slot0.record2 == free_from {
        let at = slot0.record2 * rs;
        let displaced = slot0.records[at..at + rs].to_vec();
        slot0.records[at..at + rs].copy_from_slice(rec);
        metrics.num_memcpys += 1;
        slot0.record1 += 1;
        src.park(&displaced, cmp, metrics);
    } else {
        let at = slot0.record2 * rs;
        slot0.records[at..at + rs].copy_from_slice(rec);
        metrics.num_memcpys += 1;
    }
}

/// Repeatedly merges `sublists` in groups of `cfg.num_pages` until one
/// sorted run remains, or until the adaptive cut-in hands off to
/// MinSort-over-sorted-sublists (see `spec.md` 4.H). Writes intermediate
/// runs starting at `scratch_start`, wrapping the write cursor back to
/// `scratch_start` every third pass to bound file growth.
pub fn nob_merge_all<F: Read + Write + Seek>(
    file: &mut F,
    mut sublists: Vec<SublistInfo>,
    cfg: &ExternalSortConfig,
    scratch_start: u64,
    cmp: &mut Comparator,
    metrics: &mut Metrics,
) -> Result<(SublistInfo, u32), SortError> {
    let fan_in = cfg.num_pages as usize;
    let mut pass_number: u32 = 1;
    let mut write_cursor = scratch_start;

    while sublists.len() > 1 {
        if (32..=64).contains(&sublists.len()) {
            let written = flash_minsort_sublists(file, &sublists, cfg, write_cursor, cmp, metrics)?;
            let num_pages = written.div_ceil(cfg.values_per_page() as u64) as u32;
            return Ok((SublistInfo { start_offset: write_cursor, num_pages }, pass_number));
        }

        if pass_number % 3 == 0 {
            write_cursor = scratch_start;
        }

        let mut merged = Vec::new();
        for chunk in sublists.chunks(fan_in) {
            let result = nob_merge_group(file, chunk, cfg, write_cursor, cmp, metrics)?;
            write_cursor += result.num_pages as u64 * cfg.page_size as u64;
            merged.push(result);
        }
        sublists = merged;
        pass_number += 1;
    }

    Ok((sublists.into_iter().next().unwrap(), pass_number - 1))
}

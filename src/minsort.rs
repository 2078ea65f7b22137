//! Flash MinSort: a finishing pass whose memory cost is proportional to the
//! number of sublists (or regions) rather than the number of pages.
//!
//! Two variants live here:
//!
//! - [`flash_minsort_sublists`] merges sublists that are already internally
//!   sorted (the output of [`crate::rungen::generate_runs`]). Each sublist
//!   needs only its current key and file offset in memory — a forward
//!   cursor — so the number of sublists can far exceed the number of buffer
//!   pages, which is exactly the situation the adaptive controller reaches
//!   for this finisher in (32 to 64 sublists, too many for NOB-merge's
//!   one-slot-per-sublist buffer).
//! - [`flash_minsort_regions`] is the more general form that makes no
//!   sortedness assumption: it partitions raw pages into regions and
//!   repeatedly rescans each region for its next unconsumed minimum. It
//!   costs a full region rescan per extracted record, so it only pays off
//!   when distinct keys are rare (which is also the adaptive controller's
//!   cost signal). The default entry point never reaches this variant —
//!   selecting it would require skipping run generation entirely, which
//!   this crate's adaptive pipeline does not do — but it is implemented
//!   here as a standalone building block.

use std::cmp::Ordering;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::config::{ExternalSortConfig, PAGE_HEADER_SIZE};
use crate::error::SortError;
use crate::metrics::Metrics;
use crate::page::{read_page, write_page, PageHeader};
use crate::record::Comparator;

#[derive(Debug, Clone, Copy)]
pub struct SublistInfo {
    pub start_offset: u64,
    pub num_pages: u32,
}

/// Finds every sublist in `[0, total_pages)` by reading one header per
/// sublist, walking backward from the end of the file.
///
/// A sublist is a maximal run of pages whose block ids count up `0, 1, 2,
/// ...`; the last page of a sublist therefore carries `block_id + 1 ==
/// num_pages_in_sublist`, which is enough to jump straight to the previous
/// sublist's last page without reading anything in between.
pub fn discover_sublists<F: Read + Seek>(
    file: &mut F,
    total_pages: u32,
    page_size: usize,
    metrics: &mut Metrics,
) -> Result<Vec<SublistInfo>, SortError> {
    let mut sublists = Vec::new();
    let mut header_buf = [0u8; PAGE_HEADER_SIZE];
    let mut remaining = total_pages as i64;

    while remaining > 0 {
        let last_page_idx = remaining - 1;
        let offset = last_page_idx as u64 * page_size as u64;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| SortError::read(offset, e))?;
        file.read_exact(&mut header_buf)
            .map_err(|e| SortError::read(offset, e))?;
        metrics.num_reads += 1;
        let header = PageHeader::decode(&header_buf);
        let sublist_len = header.block_id + 1;
        let start_page = last_page_idx + 1 - sublist_len as i64;
        sublists.push(SublistInfo {
            start_offset: start_page as u64 * page_size as u64,
            num_pages: sublist_len,
        });
        remaining = start_page;
    }

    sublists.reverse();
    Ok(sublists)
}

struct SublistCursor {
    page_start_offset: u64,
    block_id: u32,
    blocks_in_sublist: u32,
    slot_in_page: u16,
    records_in_page: u16,
    current_offset: u64,
    current_key: Vec<u8>,
    exhausted: bool,
}

impl SublistCursor {
    fn init<F: Read + Seek>(
        file: &mut F,
        info: &SublistInfo,
        cfg: &ExternalSortConfig,
        header_buf: &mut [u8],
        metrics: &mut Metrics,
    ) -> Result<Self, SortError> {
        let header = read_page_header_only(file, info.start_offset, header_buf, metrics)?;
        let current_offset = info.start_offset + PAGE_HEADER_SIZE as u64;
        let mut key = vec![0u8; cfg.key_size];
        read_exact_at(file, current_offset, &mut key, metrics)?;
        Ok(SublistCursor {
            page_start_offset: info.start_offset,
            block_id: header.block_id,
            blocks_in_sublist: info.num_pages,
            slot_in_page: 0,
            records_in_page: header.count,
            current_offset,
            current_key: key,
            exhausted: header.count == 0,
        })
    }

    fn advance<F: Read + Seek>(
        &mut self,
        file: &mut F,
        cfg: &ExternalSortConfig,
        header_buf: &mut [u8],
        metrics: &mut Metrics,
    ) -> Result<(), SortError> {
        if (self.slot_in_page as usize + 1) < self.records_in_page as usize {
            self.slot_in_page += 1;
            self.current_offset += cfg.record_size as u64;
        } else if self.block_id + 1 < self.blocks_in_sublist {
            let next_page_offset = self.page_start_offset + cfg.page_size as u64;
            let header = read_page_header_only(file, next_page_offset, header_buf, metrics)?;
            self.page_start_offset = next_page_offset;
            self.block_id = header.block_id;
            self.records_in_page = header.count;
            self.slot_in_page = 0;
            self.current_offset = next_page_offset + PAGE_HEADER_SIZE as u64;
        } else {
            self.exhausted = true;
            return Ok(());
        }
        read_exact_at(file, self.current_offset, &mut self.current_key, metrics)?;
        Ok(())
    }
}

fn read_page_header_only<F: Read + Seek>(
    file: &mut F,
    offset: u64,
    buf: &mut [u8],
    metrics: &mut Metrics,
) -> Result<PageHeader, SortError> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| SortError::read(offset, e))?;
    file.read_exact(buf).map_err(|e| SortError::read(offset, e))?;
    metrics.num_reads += 1;
    Ok(PageHeader::decode(buf))
}

fn read_exact_at<F: Read + Seek>(
    file: &mut F,
    offset: u64,
    buf: &mut [u8],
    metrics: &mut Metrics,
) -> Result<(), SortError> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| SortError::read(offset, e))?;
    file.read_exact(buf).map_err(|e| SortError::read(offset, e))?;
    metrics.num_reads += 1;
    Ok(())
}

/// Output-page writer shared by both MinSort variants: buffers records into
/// one page at a time and flushes on demand.
struct PageWriter {
    buf: Vec<u8>,
    count: u16,
    capacity: u16,
    block_id: u32,
    offset: u64,
    record_size: usize,
}

impl PageWriter {
    fn new(cfg: &ExternalSortConfig, start_offset: u64) -> Self {
        PageWriter {
            buf: vec![0u8; cfg.page_size],
            count: 0,
            capacity: cfg.values_per_page() as u16,
            block_id: 0,
            offset: start_offset,
            record_size: cfg.record_size,
        }
    }

    fn push<F: Write + Seek>(&mut self, record: &[u8], file: &mut F, metrics: &mut Metrics) -> Result<(), SortError> {
        if self.count == self.capacity {
            self.flush(file, metrics)?;
        }
        let slot = PAGE_HEADER_SIZE + self.count as usize * self.record_size;
        self.buf[slot..slot + self.record_size].copy_from_slice(record);
        self.count += 1;
        Ok(())
    }

    fn flush<F: Write + Seek>(&mut self, file: &mut F, metrics: &mut Metrics) -> Result<(), SortError> {
        if self.count == 0 {
            return Ok(());
        }
        write_page(file, self.offset, &mut self.buf, self.block_id, self.count, metrics)?;
        self.offset += self.buf.len() as u64;
        self.block_id += 1;
        self.count = 0;
        Ok(())
    }
}

/// Merges already-sorted sublists by tracking only a `(key, file offset)`
/// cursor per sublist. Writes the merged output starting at
/// `out_start_offset` and returns the number of records written.
pub fn flash_minsort_sublists<F: Read + Write + Seek>(
    file: &mut F,
    sublists: &[SublistInfo],
    cfg: &ExternalSortConfig,
    out_start_offset: u64,
    cmp: &mut Comparator,
    metrics: &mut Metrics,
) -> Result<u64, SortError> {
    let mut header_buf = [0u8; PAGE_HEADER_SIZE];
    let mut cursors: Vec<SublistCursor> = sublists
        .iter()
        .map(|info| SublistCursor::init(file, info, cfg, &mut header_buf, metrics))
        .collect::<Result<_, _>>()?;

    let mut record_buf = vec![0u8; cfg.record_size];
    let mut writer = PageWriter::new(cfg, out_start_offset);
    let mut written: u64 = 0;

    loop {
        let winner = cursors
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.exhausted)
            .min_by(|(ia, a), (ib, b)| {
                metrics.num_compar += 1;
                cmp(&a.current_key, &b.current_key).then_with(|| ia.cmp(ib))
            })
            .map(|(i, _)| i);

        let Some(winner) = winner else { break };

        let offset = cursors[winner].current_offset;
        read_exact_at(file, offset, &mut record_buf, metrics)?;
        writer.push(&record_buf, file, metrics)?;
        written += 1;

        cursors[winner].advance(file, cfg, &mut header_buf, metrics)?;
    }

    writer.flush(file, metrics)?;
    Ok(written)
}

struct Region {
    start_page: u32,
    end_page: u32,
    last: Option<(Vec<u8>, u32, u16)>,
    exhausted: bool,
}

fn tuple_order(
    cmp: &mut Comparator,
    a: &(Vec<u8>, u32, u16),
    b: &(Vec<u8>, u32, u16),
) -> Ordering {
    cmp(&a.0, &b.0).then_with(|| a.1.cmp(&b.1)).then_with(|| a.2.cmp(&b.2))
}

impl Region {
    fn next_candidate<F: Read + Seek>(
        &self,
        file: &mut F,
        cfg: &ExternalSortConfig,
        cmp: &mut Comparator,
        metrics: &mut Metrics,
    ) -> Result<Option<(Vec<u8>, u32, u16)>, SortError> {
        let mut best: Option<(Vec<u8>, u32, u16)> = None;
        let mut page_buf = vec![0u8; cfg.page_size];
        for page_idx in self.start_page..self.end_page {
            let offset = page_idx as u64 * cfg.page_size as u64;
            let header = read_page(file, offset, &mut page_buf, metrics)?;
            for slot in 0..header.count {
                let rec_offset = PAGE_HEADER_SIZE + slot as usize * cfg.record_size;
                let key = &page_buf[rec_offset..rec_offset + cfg.key_size];
                let candidate = (key.to_vec(), page_idx, slot);
                if let Some(last) = &self.last {
                    if tuple_order(cmp, &candidate, last) != Ordering::Greater {
                        continue;
                    }
                }
                let better = match &best {
                    None => true,
                    Some(b) => tuple_order(cmp, &candidate, b) == Ordering::Less,
                };
                if better {
                    best = Some(candidate);
                }
            }
        }
        Ok(best)
    }
}

/// Repeatedly extracts the global minimum across `num_regions` contiguous
/// page ranges of raw, unsorted data, at the cost of rescanning a region on
/// every extraction from it. Intended for input that has not been run
/// through replacement selection at all.
pub fn flash_minsort_regions<F: Read + Write + Seek>(
    file: &mut F,
    total_pages: u32,
    cfg: &ExternalSortConfig,
    num_regions: u32,
    out_start_offset: u64,
    cmp: &mut Comparator,
    metrics: &mut Metrics,
) -> Result<u64, SortError> {
    let num_regions = num_regions.max(1).min(total_pages.max(1));
    let base = total_pages / num_regions;
    let extra = total_pages % num_regions;
    let mut regions = Vec::with_capacity(num_regions as usize);
    let mut cursor = 0u32;
    for r in 0..num_regions {
        let len = base + if r < extra { 1 } else { 0 };
        regions.push(Region { start_page: cursor, end_page: cursor + len, last: None, exhausted: len == 0 });
        cursor += len;
    }

    let mut writer = PageWriter::new(cfg, out_start_offset);
    let mut written: u64 = 0;
    let mut record_buf = vec![0u8; cfg.record_size];

    loop {
        let mut winner: Option<(usize, (Vec<u8>, u32, u16))> = None;
        for (idx, region) in regions.iter().enumerate() {
            if region.exhausted {
                continue;
            }
            if let Some(candidate) = region.next_candidate(file, cfg, cmp, metrics)? {
                let take = match &winner {
                    None => true,
                    Some((_, w)) => tuple_order(cmp, &candidate, w) == Ordering::Less,
                };
                if take {
                    winner = Some((idx, candidate));
                }
            }
        }

        let Some((idx, (_, page_idx, slot))) = winner else { break };
        let offset = page_idx as u64 * cfg.page_size as u64 + PAGE_HEADER_SIZE as u64 + slot as usize as u64 * cfg.record_size as u64;
        read_exact_at(file, offset, &mut record_buf, metrics)?;
        writer.push(&record_buf, file, metrics)?;
        written += 1;

        let candidate_key = record_buf[..cfg.key_size].to_vec();
        regions[idx].last = Some((candidate_key, page_idx, slot));
    }
    for region in &mut regions {
        if region.next_candidate(file, cfg, cmp, metrics)?.is_none() {
            region.exhausted = true;
        }
    }

    writer.flush(file, metrics)?;
    Ok(written)
}

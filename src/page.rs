//! Page codec: the fixed-size unit the scratch file is organized in.
//!
//! A page is `page_size` bytes: a 6-byte header (`block_id: u32` little
//! endian, `count: u16` little endian) followed by up to
//! [`crate::config::ExternalSortConfig::values_per_page`] records. `block_id`
//! numbers a page within its run; `count` is how many of the page's record
//! slots are populated (the last page of a run is often partial).

use std::io::{Read, Seek, SeekFrom, Write};

use crate::config::PAGE_HEADER_SIZE;
use crate::error::SortError;
use crate::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub block_id: u32,
    pub count: u16,
}

impl PageHeader {
    pub fn decode(buf: &[u8]) -> Self {
        let block_id = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let count = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        PageHeader { block_id, count }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.block_id.to_le_bytes());
        buf[4..6].copy_from_slice(&self.count.to_le_bytes());
    }
}

/// Byte slice for the records in a page buffer, past the header.
pub fn records_of(page_buf: &[u8]) -> &[u8] {
    &page_buf[PAGE_HEADER_SIZE..]
}

pub fn records_of_mut(page_buf: &mut [u8]) -> &mut [u8] {
    &mut page_buf[PAGE_HEADER_SIZE..]
}

/// Reads one page at `offset` into `buf` (exactly `page_size` bytes long).
pub fn read_page<F: Read + Seek>(
    file: &mut F,
    offset: u64,
    buf: &mut [u8],
    metrics: &mut Metrics,
) -> Result<PageHeader, SortError> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| SortError::read(offset, e))?;
    file.read_exact(buf)
        .map_err(|e| SortError::read(offset, e))?;
    metrics.num_reads += 1;
    Ok(PageHeader::decode(buf))
}

/// Writes `buf` (already containing encoded records) to `offset`, stamping
/// the header with `block_id`/`count` first.
pub fn write_page<F: Write + Seek>(
    file: &mut F,
    offset: u64,
    buf: &mut [u8],
    block_id: u32,
    count: u16,
    metrics: &mut Metrics,
) -> Result<(), SortError> {
    PageHeader { block_id, count }.encode(buf);
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| SortError::write(offset, e))?;
    file.write_all(buf).map_err(|e| SortError::write(offset, e))?;
    metrics.num_writes += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_round_trips() {
        let mut buf = [0u8; 16];
        let h = PageHeader { block_id: 0x1234_5678, count: 7 };
        h.encode(&mut buf);
        assert_eq!(PageHeader::decode(&buf), h);
    }

    #[test]
    fn write_then_read_page() {
        let mut metrics = Metrics::new();
        let mut backing = vec![0u8; 32];
        let mut cursor = Cursor::new(&mut backing);
        let mut page = [0u8; 16];
        page[6..10].copy_from_slice(b"abcd");
        write_page(&mut cursor, 0, &mut page, 3, 1, &mut metrics).unwrap();

        let mut read_buf = [0u8; 16];
        let header = read_page(&mut cursor, 0, &mut read_buf, &mut metrics).unwrap();
        assert_eq!(header.block_id, 3);
        assert_eq!(header.count, 1);
        assert_eq!(&read_buf[6..10], b"abcd");
        assert_eq!(metrics.num_reads, 1);
        assert_eq!(metrics.num_writes, 1);
    }
}

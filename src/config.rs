//! Engine configuration: record geometry and buffer shape.

use crate::error::SortError;

/// Size in bytes of a page header: a 4-byte little-endian block id followed
/// by a 2-byte little-endian record count.
pub const PAGE_HEADER_SIZE: usize = 6;

/// Fixed shape of the records being sorted and the buffer the engine is
/// given to work with.
///
/// The caller owns the scratch file and the buffer; this struct only
/// describes their geometry. `num_pages` is the size of the buffer the
/// engine is handed, in pages — as few as 2 suffice for Flash MinSort, 3
/// or more enable NOB-merge.
#[derive(Debug, Clone)]
pub struct ExternalSortConfig {
    /// Bytes per record, header excluded.
    pub record_size: usize,
    /// Bytes at the front of each record used as the sort key.
    pub key_size: usize,
    /// Bytes per page, header included.
    pub page_size: usize,
    /// Number of pages available in the caller's buffer.
    pub num_pages: u32,
    /// Estimated ratio of a write's cost to a read's cost, in tenths
    /// (e.g. `15` means writes cost 1.5x reads). Used only by the
    /// adaptive controller's cost model.
    pub write_to_read_ratio_x10: u32,
}

impl ExternalSortConfig {
    pub fn validate(&self) -> Result<(), SortError> {
        if self.record_size == 0 {
            return Err(SortError::InvalidConfig("record_size must be > 0".into()));
        }
        if self.key_size == 0 || self.key_size > self.record_size {
            return Err(SortError::InvalidConfig(
                "key_size must be > 0 and <= record_size".into(),
            ));
        }
        if self.page_size <= PAGE_HEADER_SIZE {
            return Err(SortError::InvalidConfig(format!(
                "page_size must exceed the {PAGE_HEADER_SIZE}-byte header"
            )));
        }
        if self.values_per_page() == 0 {
            return Err(SortError::InvalidConfig(
                "page_size too small to hold a single record".into(),
            ));
        }
        if self.num_pages < 2 {
            return Err(SortError::InvalidConfig(
                "at least 2 buffer pages are required".into(),
            ));
        }
        Ok(())
    }

    /// Maximum whole records a page can hold alongside its header.
    pub fn values_per_page(&self) -> usize {
        (self.page_size - PAGE_HEADER_SIZE) / self.record_size
    }
}

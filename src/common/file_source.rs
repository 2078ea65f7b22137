//! A [`RecordSource`] backed by a flat file of fixed-size records.
//!
//! This is the demo CLI's stand-in for the record-iterator collaborator the
//! engine treats as external (`spec.md` §1): real deployments plug in
//! whatever actually produces records (a device's flash-resident table, a
//! sensor log), this crate never assumes a file.

use std::fs::File;
use std::io::{BufReader, Read};

use crate::error::SortError;
use crate::record::RecordSource;

pub struct FileRecordSource {
    reader: BufReader<File>,
    record_size: usize,
    total_records: u64,
    records_read: u64,
}

impl FileRecordSource {
    pub fn open(file: File, record_size: usize) -> std::io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(FileRecordSource {
            reader: BufReader::new(file),
            record_size,
            total_records: len / record_size as u64,
            records_read: 0,
        })
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }
}

impl RecordSource for FileRecordSource {
    fn next(&mut self, out: &mut [u8]) -> Result<bool, SortError> {
        if self.records_read >= self.total_records {
            return Ok(false);
        }
        self.reader
            .read_exact(&mut out[..self.record_size])
            .map_err(|e| SortError::read(self.records_read * self.record_size as u64, e))?;
        self.records_read += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom, Write};

    #[test]
    fn reads_every_record_then_stops() {
        let mut tmp = tempfile::tempfile().unwrap();
        tmp.write_all(&[1u8, 2, 3, 4, 5, 6]).unwrap();
        tmp.seek(SeekFrom::Start(0)).unwrap();
        let mut source = FileRecordSource::open(tmp, 2).unwrap();
        assert_eq!(source.total_records(), 3);

        let mut buf = [0u8; 2];
        assert!(source.next(&mut buf).unwrap());
        assert_eq!(buf, [1, 2]);
        assert!(source.next(&mut buf).unwrap());
        assert_eq!(buf, [3, 4]);
        assert!(source.next(&mut buf).unwrap());
        assert_eq!(buf, [5, 6]);
        assert!(!source.next(&mut buf).unwrap());
    }
}

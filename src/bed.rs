//! Streaming reader for tab-delimited interval files (BED and similar).
//!
//! Only the first three columns are interpreted. Every column is kept raw on
//! the record so annotation rules can pull values by 1-based column number.

use crate::error::{AnnoError, Result};
use crate::record::Record;
use crate::streaming::{parse_u64_fast, should_skip_line, split_tabs, trim_line_end};
use std::io::BufRead;

/// A streaming BED file reader.
pub struct BedReader<R: BufRead> {
    reader: R,
    line_number: usize,
    buffer: String,
}

impl<R: BufRead> BedReader<R> {
    /// Create a new BED reader from any buffered source.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            buffer: String::with_capacity(1024),
        }
    }

    /// Read the next BED record.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        loop {
            self.buffer.clear();
            let bytes_read = self.reader.read_line(&mut self.buffer)?;
            if bytes_read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let line = trim_line_end(&self.buffer);
            if should_skip_line(line.as_bytes()) {
                continue;
            }

            return self.parse_line(line).map(Some);
        }
    }

    fn parse_line(&self, line: &str) -> Result<Record> {
        let fields = split_tabs(line);

        if fields.len() < 3 {
            return Err(self.error(format!(
                "Expected at least 3 fields, got {}",
                fields.len()
            )));
        }

        let start = self.parse_position(fields[1], "start")?;
        let end = self.parse_position(fields[2], "end")?;

        if start > end {
            return Err(self.error(format!("Start ({}) > end ({})", start, end)));
        }

        let mut record = Record::new(fields[0], start, end);
        record.columns = fields.iter().map(|s| s.to_string()).collect();
        Ok(record)
    }

    fn parse_position(&self, s: &str, field_name: &str) -> Result<u64> {
        parse_u64_fast(s.as_bytes())
            .ok_or_else(|| self.error(format!("Invalid {} position: '{}'", field_name, s)))
    }

    fn error(&self, message: String) -> AnnoError {
        AnnoError::Parse {
            line: self.line_number,
            message,
        }
    }

    /// Get an iterator over all records.
    pub fn records(self) -> BedRecordIter<R> {
        BedRecordIter { reader: self }
    }
}

/// Iterator over BED records.
pub struct BedRecordIter<R: BufRead> {
    reader: BedReader<R>,
}

impl<R: BufRead> Iterator for BedRecordIter<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Interval;

    fn parse(content: &str) -> Result<Vec<Record>> {
        BedReader::new(content.as_bytes()).records().collect()
    }

    #[test]
    fn test_parse_bed3() {
        let records = parse("chr1\t100\t200\nchr1\t300\t400\n").unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].chrom(), "chr1");
        assert_eq!(records[0].start(), 100);
        assert_eq!(records[0].end(), 200);
    }

    #[test]
    fn test_extra_columns_are_kept() {
        let records = parse("chr1\t100\t200\tBRCA1\t0.5\r\n").unwrap();
        assert_eq!(records[0].column(4), Some("BRCA1"));
        assert_eq!(records[0].column(5), Some("0.5"));
    }

    #[test]
    fn test_skip_comments_and_track_lines() {
        let content = "# comment\ntrack name=test\nbrowser position chr1:1-1000\nchr1\t100\t200\n";
        assert_eq!(parse(content).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_bed() {
        assert!(parse("chr1\t100\n").is_err());
        assert!(parse("chr1\tx\t100\n").is_err());

        let err = parse("chr1\t1\t2\nchr1\t300\t200\n").unwrap_err();
        match err {
            AnnoError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}

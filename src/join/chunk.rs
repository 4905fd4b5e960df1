//! Cutting the query stream into chunks and annotating a chunk.

use super::AnnotatedRecord;
use crate::annotate::{Annotator, EndpointMode};
use crate::genome::same_chrom;
use crate::interval::Interval;
use crate::record::Record;
use crate::report::ErrorReporter;
use std::mem;
use std::sync::Arc;

/// Groups consecutive query records into chunks.
///
/// A chunk is closed when it holds `max_chunk` records, when the chromosome
/// changes, or when the start-to-start gap to the next record exceeds
/// `max_gap`.
#[derive(Debug)]
pub struct ChunkBuilder {
    max_chunk: usize,
    max_gap: u64,
    current: Vec<Record>,
}

impl ChunkBuilder {
    pub fn new(max_chunk: usize, max_gap: u64) -> Self {
        let max_chunk = max_chunk.max(1);
        Self {
            max_chunk,
            max_gap,
            current: Vec::with_capacity(max_chunk.min(8192)),
        }
    }

    /// Add a record; returns the previous chunk if this record closed it.
    pub fn push(&mut self, record: Record) -> Option<Vec<Record>> {
        let closed = match self.current.last() {
            Some(prev) => {
                self.current.len() >= self.max_chunk
                    || !same_chrom(prev.chrom(), record.chrom())
                    || record.start().saturating_sub(prev.start()) > self.max_gap
            }
            None => false,
        };
        let done = closed.then(|| self.take());
        self.current.push(record);
        done
    }

    /// The final, possibly undersized chunk.
    pub fn finish(&mut self) -> Option<Vec<Record>> {
        (!self.current.is_empty()).then(|| self.take())
    }

    fn take(&mut self) -> Vec<Record> {
        mem::replace(
            &mut self.current,
            Vec::with_capacity(self.max_chunk.min(8192)),
        )
    }
}

/// A chunk of query records with its own snapshot of candidates.
#[derive(Debug)]
pub struct Chunk {
    pub serial: u64,
    /// Ordinal of the first record in the chunk.
    pub first_ordinal: u64,
    pub records: Vec<Record>,
    /// One start-sorted snapshot per source.
    pub candidates: Vec<Vec<Arc<Record>>>,
}

impl Chunk {
    /// Annotate every record. Per-record problems go to `reporter`; every
    /// record is returned.
    pub fn annotate(
        self,
        annotator: &Annotator,
        mode: EndpointMode,
        reporter: &ErrorReporter,
    ) -> Vec<AnnotatedRecord> {
        let Chunk {
            first_ordinal,
            records,
            candidates,
            ..
        } = self;
        records
            .into_iter()
            .zip(first_ordinal..)
            .map(|(mut record, ordinal)| {
                if let Err(e) = annotator.annotate_ends(&mut record, &candidates, mode) {
                    reporter.report(&e.to_string());
                }
                AnnotatedRecord { ordinal, record }
            })
            .collect()
    }
}

/// Window `[lo, hi)` covering every record of a chunk.
pub(crate) fn extent(records: &[Record]) -> (u64, u64) {
    let lo = records.first().map_or(0, |r| r.start());
    let hi = records.iter().map(|r| r.effective_end()).max().unwrap_or(lo);
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn starts(chunk: &[Record]) -> Vec<u64> {
        chunk.iter().map(|r| r.start()).collect()
    }

    #[test]
    fn test_closes_on_size() {
        let mut builder = ChunkBuilder::new(2, 1000);
        assert!(builder.push(Record::new("chr1", 1, 2)).is_none());
        assert!(builder.push(Record::new("chr1", 2, 3)).is_none());
        let chunk = builder.push(Record::new("chr1", 3, 4)).unwrap();
        assert_eq!(starts(&chunk), vec![1, 2]);
        assert_eq!(starts(&builder.finish().unwrap()), vec![3]);
        assert!(builder.finish().is_none());
    }

    #[test]
    fn test_closes_on_gap_and_chromosome() {
        let mut builder = ChunkBuilder::new(100, 50);
        builder.push(Record::new("chr1", 0, 1));
        builder.push(Record::new("chr1", 50, 51));
        let gap = builder.push(Record::new("chr1", 101, 102)).unwrap();
        assert_eq!(starts(&gap), vec![0, 50]);

        let chrom = builder.push(Record::new("chr2", 101, 102)).unwrap();
        assert_eq!(starts(&chrom), vec![101]);
    }

    #[test]
    fn test_extent() {
        let records = vec![
            Record::new("chr1", 10, 500),
            Record::new("chr1", 20, 20),
            Record::new("chr1", 30, 40),
        ];
        assert_eq!(extent(&records), (10, 500));
        assert_eq!(extent(&records[1..2]), (20, 21));
    }
}

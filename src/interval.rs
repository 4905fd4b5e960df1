//! Core interval types for genomic region representation.

use crate::genome::same_chrom;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Positional capability shared by query and annotation records.
///
/// Coordinates are 0-based, half-open. A zero-length interval (`start == end`)
/// is treated as the single base at `start` when testing overlap.
pub trait Interval {
    fn chrom(&self) -> &str;
    fn start(&self) -> u64;
    fn end(&self) -> u64;

    /// End used for overlap tests: zero-length intervals cover one base.
    #[inline]
    fn effective_end(&self) -> u64 {
        self.end().max(self.start() + 1)
    }

    /// Check if this interval overlaps with another.
    #[inline]
    fn overlaps<I: Interval + ?Sized>(&self, other: &I) -> bool
    where
        Self: Sized,
    {
        same_chrom(self.chrom(), other.chrom())
            && self.start() < other.effective_end()
            && other.start() < self.effective_end()
    }
}

/// A bare genomic span with chromosome, start, and end positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

impl Span {
    /// Create a new span.
    #[inline]
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
        }
    }

    /// Zero-length span at a single position.
    #[inline]
    pub fn point(chrom: impl Into<String>, pos: u64) -> Self {
        Self::new(chrom, pos, pos)
    }

    /// Returns the length of the span.
    #[inline]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the span has zero length.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// The left and right endpoints as zero-length spans.
    ///
    /// The right endpoint is the last base covered (`end - 1`).
    pub fn endpoints(&self) -> (Span, Span) {
        let last = self.end.saturating_sub(1).max(self.start);
        (
            Span::point(self.chrom.clone(), self.start),
            Span::point(self.chrom.clone(), last),
        )
    }
}

impl Interval for Span {
    #[inline]
    fn chrom(&self) -> &str {
        &self.chrom
    }

    #[inline]
    fn start(&self) -> u64 {
        self.start
    }

    #[inline]
    fn end(&self) -> u64 {
        self.end
    }
}

impl<T: Interval> Interval for Arc<T> {
    #[inline]
    fn chrom(&self) -> &str {
        (**self).chrom()
    }

    #[inline]
    fn start(&self) -> u64 {
        (**self).start()
    }

    #[inline]
    fn end(&self) -> u64 {
        (**self).end()
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chrom, self.start, self.end)
    }
}

impl Ord for Span {
    fn cmp(&self, other: &Self) -> Ordering {
        self.chrom
            .cmp(&other.chrom)
            .then(self.start.cmp(&other.start))
            .then(self.end.cmp(&other.end))
    }
}

impl PartialOrd for Span {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_overlap() {
        let a = Span::new("chr1", 100, 200);
        let b = Span::new("chr1", 150, 250);
        let c = Span::new("chr1", 200, 300);
        let d = Span::new("chr2", 100, 200);

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // Adjacent, not overlapping
        assert!(!a.overlaps(&d)); // Different chromosome
    }

    #[test]
    fn test_overlap_ignores_chr_prefix() {
        let a = Span::new("chr1", 100, 200);
        let b = Span::new("1", 150, 250);
        assert!(a.overlaps(&b));
    }

    #[test]
    fn test_zero_length_is_a_point() {
        let a = Span::new("chr1", 100, 200);
        assert!(a.overlaps(&Span::point("chr1", 100)));
        assert!(a.overlaps(&Span::point("chr1", 199)));
        assert!(!a.overlaps(&Span::point("chr1", 200)));
        assert!(Span::point("chr1", 5).overlaps(&Span::point("chr1", 5)));
        assert!(!Span::point("chr1", 5).overlaps(&Span::point("chr1", 6)));
    }

    #[test]
    fn test_endpoints() {
        let (left, right) = Span::new("chr1", 100, 200).endpoints();
        assert_eq!(left, Span::point("chr1", 100));
        assert_eq!(right, Span::point("chr1", 199));

        let (left, right) = Span::point("chr1", 7).endpoints();
        assert_eq!(left.start, 7);
        assert_eq!(right.start, 7);
    }

    #[test]
    fn test_span_ordering() {
        let mut spans = [
            Span::new("chr2", 100, 200),
            Span::new("chr1", 200, 300),
            Span::new("chr1", 100, 200),
        ];
        spans.sort();

        assert_eq!(spans[0].chrom, "chr1");
        assert_eq!(spans[0].start, 100);
        assert_eq!(spans[1].start, 200);
        assert_eq!(spans[2].chrom, "chr2");
    }
}

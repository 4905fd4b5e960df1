//! Sort validation for streaming operations.
//!
//! The join merges every stream in one pass, so each stream must be sorted.
//! Validation happens inline, as records are pulled, and checks that:
//! 1. All records for a chromosome are contiguous (no interleaving)
//! 2. Chromosomes advance according to the run's [`ChromOrder`], where both
//!    chromosomes are ranked
//! 3. Within a chromosome, start positions are non-decreasing

use crate::error::{AnnoError, Result};
use crate::genome::{chrom_base, ChromOrder};
use rustc_hash::FxHashSet;
use std::cmp::Ordering;

/// Inline sort validator for use within streaming loops.
#[derive(Debug)]
pub struct SortValidator {
    file: String,
    order: ChromOrder,
    prev_chrom: Option<String>,
    prev_start: u64,
    seen_chroms: FxHashSet<String>,
    record_count: usize,
    defines_order: bool,
}

impl SortValidator {
    /// Create a validator; `file` names the stream in error messages.
    pub fn new(file: impl Into<String>, order: ChromOrder) -> Self {
        Self {
            file: file.into(),
            order,
            prev_chrom: None,
            prev_start: 0,
            seen_chroms: FxHashSet::default(),
            record_count: 0,
            defines_order: false,
        }
    }

    /// Validator for the query, which ranks chromosomes as it reaches them.
    pub fn defining(file: impl Into<String>, order: ChromOrder) -> Self {
        Self {
            defines_order: true,
            ..Self::new(file, order)
        }
    }

    /// Validate that the given record maintains sort order.
    #[inline]
    pub fn validate(&mut self, chrom: &str, start: u64) -> Result<()> {
        self.record_count += 1;

        if self.prev_chrom.is_none() && self.defines_order {
            self.order.observe(chrom);
        }
        if let Some(ref pc) = self.prev_chrom {
            if chrom_base(chrom) != chrom_base(pc) {
                if self.seen_chroms.contains(chrom_base(chrom)) {
                    return Err(self.error(format!(
                        "chromosome '{}' at record {} was seen earlier (chromosomes must be contiguous)",
                        chrom, self.record_count
                    )));
                }
                if self.defines_order {
                    self.order.observe(chrom);
                }
                if self.order.compare(chrom, pc) == Some(Ordering::Less) {
                    return Err(self.error(format!(
                        "chromosome '{}' at record {} comes after '{}' but sorts before it",
                        chrom, self.record_count, pc
                    )));
                }
                self.seen_chroms.insert(chrom_base(pc).to_string());
            } else if start < self.prev_start {
                return Err(self.error(format!(
                    "position {} at record {} comes after {} on {}",
                    start, self.record_count, self.prev_start, chrom
                )));
            }
        }

        self.prev_chrom = Some(chrom.to_string());
        self.prev_start = start;

        Ok(())
    }

    fn error(&self, message: String) -> AnnoError {
        AnnoError::OutOfOrder {
            file: self.file.clone(),
            message,
        }
    }

    /// Get the number of records validated.
    pub fn record_count(&self) -> usize {
        self.record_count
    }
}

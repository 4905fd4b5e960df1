//! Shared streaming utilities.
//!
//! This module provides components reused by the readers and the join:
//! - Low-allocation text parsing
//! - Inline sort validation
//! - Active set management with automatic compaction

pub mod active_set;
pub mod parsing;
pub mod validation;

pub use active_set::ActiveSet;
pub use parsing::{parse_u64_fast, should_skip_line, split_tabs, trim_line_end};
pub use validation::SortValidator;

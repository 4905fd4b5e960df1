//! Windowed, order-preserving parallel join of a query stream against
//! annotation sources.

mod chunk;
mod engine;
mod reorder;

pub use chunk::{Chunk, ChunkBuilder};
pub use engine::{JoinEngine, JoinStream};
pub use reorder::ReorderBuffer;

use crate::record::Record;

/// A query record after annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedRecord {
    /// Position of the record in the query stream, from 0.
    pub ordinal: u64,
    pub record: Record,
}

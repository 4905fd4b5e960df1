// Clippy allows for the whole crate
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

//! annojoin: annotate a sorted variant or interval stream with values from
//! sorted annotation sources.
//!
//! The query is cut into chunks that are annotated in parallel and emitted
//! strictly in input order. Each annotation source is streamed once; values
//! from overlapping (or allele-identical) intervals are aggregated into new
//! fields on the query record.
//!
//! # Example
//!
//! ```rust,no_run
//! use annojoin::prelude::*;
//! use std::sync::Arc;
//!
//! let config = Config::from_path("conf.toml").unwrap();
//! let sources = config
//!     .annotation
//!     .iter()
//!     .map(|a| AnnotationSource::from_config(a, &config.resolve(a), true, false))
//!     .collect::<Result<Vec<_>>>()
//!     .unwrap();
//!
//! let reader = VcfReader::new(open_input("query.vcf.gz").unwrap()).unwrap();
//! let mut annotator = Annotator::new(Vec::new());
//! let cursors = annotator.setup(&reader.header().schema(), sources).unwrap();
//!
//! let engine = JoinEngine::new(JoinConfig::default());
//! for record in engine.run(reader.records(), cursors, Arc::new(annotator)).unwrap() {
//!     println!("{:?}", record.unwrap().record.fields);
//! }
//! ```

pub mod annotate;
pub mod bed;
pub mod config;
pub mod error;
pub mod genome;
pub mod interval;
pub mod io;
pub mod join;
pub mod record;
pub mod report;
pub mod source;
pub mod streaming;
pub mod vcf;

// Re-export commonly used types
pub use annotate::{Annotator, EndpointMode, Op, ScriptEvaluator};
pub use error::{AnnoError, Result};
pub use interval::{Interval, Span};
pub use join::{AnnotatedRecord, JoinEngine, JoinStream};
pub use record::{Record, Value};
pub use report::ErrorReporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::annotate::{Annotator, EndpointMode, PostRule, ScriptEvaluator};
    pub use crate::config::{Config, JoinConfig};
    pub use crate::error::{AnnoError, Result};
    pub use crate::interval::Interval;
    pub use crate::io::open_input;
    pub use crate::join::{AnnotatedRecord, JoinEngine, JoinStream};
    pub use crate::record::{Record, Value};
    pub use crate::report::ErrorReporter;
    pub use crate::source::{AnnotationSource, MatchMode};
    pub use crate::vcf::{VcfReader, VcfWriter};
}

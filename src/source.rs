//! Annotation sources and the cursors that stream them.
//!
//! An [`AnnotationSource`] pairs a sorted record stream with the rules that
//! say which values to pull from matching records. Once bound to a query by
//! [`Annotator::setup`](crate::annotate::Annotator::setup) it becomes a
//! [`SourceCursor`]: a forward-only window over the stream that hands the
//! join an immutable snapshot of candidates for each chunk.

use crate::annotate::Op;
use crate::bed::BedReader;
use crate::config::AnnotationConfig;
use crate::error::{AnnoError, Result};
use crate::genome::{same_chrom, ChromOrder};
use crate::interval::Interval;
use crate::io::open_input;
use crate::record::{Record, Schema, Value};
use crate::streaming::{ActiveSet, SortValidator};
use crate::vcf::VcfReader;
use serde::Deserialize;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

/// VCF column holding the variant ID.
const ID_COLUMN: usize = 3;

/// How annotation intervals are matched to a query record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Same position and the same alleles.
    Exact,
    /// Any overlap.
    Overlap,
}

/// Where a rule reads its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    /// A named payload field (VCF INFO).
    Info(String),
    /// A 1-based raw column.
    Column(usize),
}

impl FieldRef {
    fn label(&self) -> String {
        match self {
            FieldRef::Info(name) => name.clone(),
            FieldRef::Column(n) => format!("column {}", n),
        }
    }
}

/// One (field, op, output name) triple.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: FieldRef,
    pub op: Op,
    pub name: String,
}

impl FieldRule {
    pub fn new(field: FieldRef, op: Op, name: impl Into<String>) -> Self {
        Self {
            field,
            op,
            name: name.into(),
        }
    }

    /// The value this rule reads from an annotation record, if present.
    pub fn extract<'a>(&self, record: &'a Record) -> Option<Cow<'a, Value>> {
        match &self.field {
            FieldRef::Info(name) => record.fields.get(name).map(Cow::Borrowed),
            FieldRef::Column(n) => record
                .column(*n)
                .filter(|s| !s.is_empty() && *s != ".")
                .map(|s| Cow::Owned(Value::Str(s.to_string()))),
        }
    }

    pub fn label(&self) -> String {
        self.field.label()
    }
}

/// Static description of a source: what it is called, how it matches, what
/// it extracts and what its records declare.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub name: String,
    pub match_mode: MatchMode,
    pub rules: Vec<FieldRule>,
    pub schema: Schema,
}

/// A boxed record stream that can be moved to the producer thread.
pub type RecordStream = Box<dyn Iterator<Item = Result<Record>> + Send>;

/// An unbound annotation source.
pub struct AnnotationSource {
    spec: SourceSpec,
    stream: RecordStream,
}

impl AnnotationSource {
    /// Validate `spec` against its own schema.
    ///
    /// `scripting` says whether scripted ops can be evaluated at all.
    pub fn new(spec: SourceSpec, stream: RecordStream, scripting: bool) -> Result<Self> {
        let fail = |message: String| Err(AnnoError::config(format!("{}: {}", spec.name, message)));

        if spec.rules.is_empty() {
            return fail("no fields to annotate".to_string());
        }
        if spec.match_mode == MatchMode::Exact && !spec.schema.has_alleles {
            return fail("exact matching needs a source with alleles".to_string());
        }
        for rule in &spec.rules {
            match &rule.field {
                FieldRef::Info(name) if !spec.schema.has_field(name) => {
                    return fail(format!("field '{}' is not declared in the header", name));
                }
                FieldRef::Column(0) => return fail("columns are 1-based, got 0".to_string()),
                _ => {}
            }
            if rule.op.is_script() && !scripting {
                return fail(format!("op '{}' needs a script evaluator", rule.op.name()));
            }
        }

        Ok(Self { spec, stream })
    }

    /// Build a source from a config section, opening `path`.
    ///
    /// VCF files (by extension) are read with their header schema; anything
    /// else is read as BED. With `strict`, VCF sources default to exact
    /// matching.
    pub fn from_config(
        config: &AnnotationConfig,
        path: &Path,
        strict: bool,
        scripting: bool,
    ) -> Result<Self> {
        let name = path.display().to_string();
        let input = open_input(path)?;
        let is_vcf = is_vcf_path(&name);

        let (schema, stream) = if is_vcf {
            let reader = VcfReader::new(input)?;
            let schema = reader.header().schema();
            let stream: RecordStream = Box::new(reader.records());
            (schema, stream)
        } else {
            let stream: RecordStream = Box::new(BedReader::new(input).records());
            (Schema::intervals(), stream)
        };

        let names = config.output_names();
        let refs: Vec<FieldRef> = if config.columns.is_empty() {
            config
                .fields
                .iter()
                .map(|f| match f.as_str() {
                    "ID" if is_vcf => FieldRef::Column(ID_COLUMN),
                    _ => FieldRef::Info(f.clone()),
                })
                .collect()
        } else {
            config.columns.iter().map(|&c| FieldRef::Column(c)).collect()
        };

        let mut rules = Vec::with_capacity(refs.len());
        for ((field, op), out) in refs.into_iter().zip(&config.ops).zip(names) {
            rules.push(FieldRule::new(field, Op::parse(op)?, out));
        }

        let match_mode = config.match_mode.unwrap_or(if strict && is_vcf {
            MatchMode::Exact
        } else {
            MatchMode::Overlap
        });

        log::debug!(
            "{}: {} rules, {:?} matching",
            name,
            rules.len(),
            match_mode
        );

        Self::new(
            SourceSpec {
                name,
                match_mode,
                rules,
                schema,
            },
            stream,
            scripting,
        )
    }

    /// Build a source over in-memory records.
    pub fn from_records(spec: SourceSpec, records: Vec<Record>, scripting: bool) -> Result<Self> {
        Self::new(spec, Box::new(records.into_iter().map(Ok::<_, AnnoError>)), scripting)
    }

    pub fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    /// Split into the static spec and a cursor over the stream.
    pub fn into_cursor(self, order: ChromOrder) -> (SourceSpec, SourceCursor) {
        let cursor = SourceCursor::new(self.spec.name.clone(), self.stream, order);
        (self.spec, cursor)
    }
}

fn is_vcf_path(name: &str) -> bool {
    [".vcf", ".vcf.gz", ".vcf.bgz"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

/// Forward-only cursor over one source.
///
/// Records are pulled lazily and validated for sort order as they arrive.
/// Records that may still reach a later window stay in the active set, so a
/// long interval is offered to every window it overlaps.
pub struct SourceCursor {
    name: String,
    stream: RecordStream,
    pending: Option<Record>,
    active: ActiveSet<Arc<Record>>,
    active_chrom: Option<String>,
    reached_chrom: bool,
    order: ChromOrder,
    validator: SortValidator,
    exhausted: bool,
}

impl SourceCursor {
    pub fn new(name: impl Into<String>, stream: RecordStream, order: ChromOrder) -> Self {
        let name = name.into();
        Self {
            validator: SortValidator::new(name.clone(), order.clone()),
            order,
            name,
            stream,
            pending: None,
            active: ActiveSet::new(),
            active_chrom: None,
            reached_chrom: false,
            exhausted: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pull (and validate) the next record into `pending` if it is empty.
    fn fill(&mut self) -> Result<()> {
        if self.pending.is_none() && !self.exhausted {
            match self.stream.next() {
                Some(record) => {
                    let record = record?;
                    self.validator.validate(record.chrom(), record.start())?;
                    self.pending = Some(record);
                }
                None => self.exhausted = true,
            }
        }
        Ok(())
    }

    fn enter_chrom(&mut self, chrom: &str) {
        let same = self
            .active_chrom
            .as_deref()
            .is_some_and(|c| same_chrom(c, chrom));
        if !same {
            self.order.observe(chrom);
            self.active.clear();
            self.active_chrom = Some(chrom.to_string());
            self.reached_chrom = false;
        }
    }

    /// Where a source chromosome falls relative to the query's `chrom`.
    ///
    /// A chromosome the query has not ranked yet that shows up before any
    /// record of `chrom` precedes `chrom` in this source, so the query has
    /// already passed it. After `chrom` it may still be ahead of the query.
    fn placement(&self, next: &str, chrom: &str) -> Ordering {
        match self.order.compare(next, chrom) {
            Some(ordering) => ordering,
            None if self.reached_chrom => Ordering::Greater,
            None => Ordering::Less,
        }
    }

    /// Drop everything ending at or before `pos` on `chrom`, including
    /// records on chromosomes that come before it.
    pub fn advance_past(&mut self, chrom: &str, pos: u64) -> Result<()> {
        self.enter_chrom(chrom);
        loop {
            self.fill()?;
            let Some(next) = self.pending.as_ref() else { break };
            match self.placement(next.chrom(), chrom) {
                Ordering::Less => {}
                Ordering::Equal if next.effective_end() <= pos => self.reached_chrom = true,
                _ => break,
            }
            self.pending = None;
        }
        self.active.expire_before(pos);
        Ok(())
    }

    /// Snapshot of records overlapping `[start, end)` on `chrom`, in start
    /// order.
    ///
    /// Call [`advance_past`](Self::advance_past) with `chrom` and `start`
    /// first. Successive calls must not move backwards.
    pub fn window(&mut self, chrom: &str, start: u64, end: u64) -> Result<Vec<Arc<Record>>> {
        loop {
            self.fill()?;
            let Some(next) = self.pending.as_ref() else { break };
            if self.placement(next.chrom(), chrom) != Ordering::Equal || next.start() >= end {
                break;
            }
            if let Some(record) = self.pending.take() {
                self.reached_chrom = true;
                self.active.push(Arc::new(record));
            }
        }
        Ok(self
            .active
            .iter_overlapping(start, end)
            .cloned()
            .collect())
    }
}

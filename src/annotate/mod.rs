//! Annotating one query record from the candidate intervals of each source.
//!
//! Annotation is a pure function of the record and its candidates: the
//! join engine hands every worker an immutable snapshot per source, and the
//! [`Annotator`] filters it down to the matching intervals and writes the
//! aggregated values into the record's fields.

mod ops;
mod post;

pub use ops::{Op, ScriptEvaluator, SCRIPT_PREFIX};
pub use post::{PostOp, PostRule};

use crate::error::{AnnoError, Result};
use crate::genome::{same_chrom, ChromOrder};
use crate::interval::{Interval, Span};
use crate::record::{Alleles, FieldMeta, Record, Schema, Value};
use crate::source::{AnnotationSource, FieldRef, MatchMode, SourceCursor, SourceSpec};
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// Whether the endpoints of a record are annotated as well as the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointMode {
    #[default]
    Interval,
    /// Also annotate `start` and `end - 1` as points, writing
    /// `<name>_left` and `<name>_right`.
    Both,
}

/// A field the annotator may add to query records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputField {
    pub name: String,
    pub meta: FieldMeta,
}

pub struct Annotator {
    sources: Vec<SourceSpec>,
    post: Vec<PostRule>,
    evaluator: Option<Arc<dyn ScriptEvaluator>>,
    order: ChromOrder,
}

impl Annotator {
    pub fn new(post: Vec<PostRule>) -> Self {
        Self {
            sources: Vec::new(),
            post,
            evaluator: None,
            order: ChromOrder::default(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn with_chrom_order(mut self, order: ChromOrder) -> Self {
        self.order = order;
        self
    }

    pub fn chrom_order(&self) -> &ChromOrder {
        &self.order
    }

    /// Sources bound by [`setup`](Self::setup), in declaration order.
    pub fn sources(&self) -> &[SourceSpec] {
        &self.sources
    }

    /// Bind the sources to a query stream described by `query`.
    ///
    /// Returns one cursor per source, in the same order. Fails if a source
    /// matches on alleles the query doesn't have, if a scripted op has no
    /// evaluator, or if a post-annotation reads a field nothing produces.
    pub fn setup(
        &mut self,
        query: &Schema,
        sources: Vec<AnnotationSource>,
    ) -> Result<Vec<SourceCursor>> {
        let mut known: FxHashSet<String> = query.fields.keys().cloned().collect();
        let mut specs = Vec::with_capacity(sources.len());
        let mut cursors = Vec::with_capacity(sources.len());

        for source in sources {
            let spec = source.spec();
            if spec.match_mode == MatchMode::Exact && !query.has_alleles {
                return Err(AnnoError::SchemaMismatch(format!(
                    "{} is matched exactly but the query has no alleles",
                    spec.name
                )));
            }
            if let Some(rule) = spec.rules.iter().find(|r| r.op.is_script()) {
                if self.evaluator.is_none() {
                    return Err(AnnoError::config(format!(
                        "{}: op for '{}' needs a script evaluator",
                        spec.name, rule.name
                    )));
                }
            }
            known.extend(spec.rules.iter().map(|r| r.name.clone()));

            let (spec, cursor) = source.into_cursor(self.order.clone());
            specs.push(spec);
            cursors.push(cursor);
        }

        for rule in &self.post {
            if rule.op.is_script() && self.evaluator.is_none() {
                return Err(AnnoError::config(format!(
                    "postannotation {} needs a script evaluator",
                    rule.name
                )));
            }
            if let Some(missing) = rule.fields.iter().find(|f| !known.contains(*f)) {
                return Err(AnnoError::config(format!(
                    "postannotation {} uses undefined field '{}'",
                    rule.name, missing
                )));
            }
            known.insert(rule.name.clone());
        }

        log::debug!(
            "bound {} sources and {} postannotations",
            specs.len(),
            self.post.len()
        );
        self.sources = specs;
        Ok(cursors)
    }

    /// Annotate `record` from `candidates` (one start-sorted snapshot per
    /// source), then run post-annotation.
    ///
    /// Fields are only ever added or overwritten. Returns the first non-fatal
    /// problem met on the way; the record is fully annotated regardless.
    pub fn annotate_ends(
        &self,
        record: &mut Record,
        candidates: &[Vec<Arc<Record>>],
        mode: EndpointMode,
    ) -> Result<()> {
        let mut warning = None;
        let mut out: Vec<(String, Value)> = Vec::new();
        let script = self.evaluator.as_deref();

        for (i, spec) in self.sources.iter().enumerate() {
            let cands = candidates.get(i).map_or(&[][..], Vec::as_slice);

            let matched = if spec.match_mode == MatchMode::Exact && record.alleles.is_none() {
                ops::note(
                    &mut warning,
                    AnnoError::Match(format!(
                        "query records without alleles cannot be matched exactly against {}",
                        spec.name
                    )),
                );
                Vec::new()
            } else {
                matches(&record.span, record.alleles.as_ref(), cands, spec.match_mode)
            };
            aggregate(spec, &matched, "", script, &mut out, &mut warning);

            if mode == EndpointMode::Both {
                let (left, right) = record.span.endpoints();
                for (end, suffix) in [(left, "_left"), (right, "_right")] {
                    let matched = matches(&end, None, cands, MatchMode::Overlap);
                    aggregate(spec, &matched, suffix, script, &mut out, &mut warning);
                }
            }
        }

        for (name, value) in out {
            record.fields.insert(name, value);
        }
        for rule in &self.post {
            rule.apply(&mut record.fields, script, &mut warning);
        }

        warning.map_or(Ok(()), Err)
    }

    /// Every field annotation may add, with header metadata.
    pub fn output_fields(&self, mode: EndpointMode) -> Vec<OutputField> {
        let mut fields = Vec::new();
        for spec in &self.sources {
            for rule in &spec.rules {
                let source_meta = match &rule.field {
                    FieldRef::Info(name) => spec.schema.field(name),
                    FieldRef::Column(_) => None,
                };
                let description = format!(
                    "calculated by {} of overlapping values in {} from {}",
                    rule.op.name(),
                    rule.label(),
                    spec.name
                );
                let meta = rule.op.output_meta(source_meta, description);
                if mode == EndpointMode::Both {
                    for suffix in ["_left", "_right"] {
                        fields.push(OutputField {
                            name: format!("{}{}", rule.name, suffix),
                            meta: meta.clone(),
                        });
                    }
                }
                fields.push(OutputField {
                    name: rule.name.clone(),
                    meta,
                });
            }
        }
        fields.extend(self.post.iter().map(|rule| OutputField {
            name: rule.name.clone(),
            meta: rule.meta(),
        }));
        fields
    }
}

/// Candidates matching `target` under `mode`. `cands` must be sorted by start.
fn matches<'a>(
    target: &Span,
    alleles: Option<&Alleles>,
    cands: &'a [Arc<Record>],
    mode: MatchMode,
) -> Vec<&'a Record> {
    let limit = cands.partition_point(|c| c.start() < target.effective_end());
    cands[..limit]
        .iter()
        .map(|c| &**c)
        .filter(|c| c.effective_end() > target.start() && same_chrom(c.chrom(), target.chrom()))
        .filter(|c| match mode {
            MatchMode::Overlap => true,
            MatchMode::Exact => {
                c.start() == target.start()
                    && c.end() == target.end()
                    && match (alleles, c.alleles.as_ref()) {
                        (Some(q), Some(a)) => q.same_as(a),
                        _ => false,
                    }
            }
        })
        .collect()
}

fn aggregate(
    spec: &SourceSpec,
    matched: &[&Record],
    suffix: &str,
    script: Option<&dyn ScriptEvaluator>,
    out: &mut Vec<(String, Value)>,
    warning: &mut Option<AnnoError>,
) {
    if matched.is_empty() {
        return;
    }
    for rule in &spec.rules {
        let values: Vec<_> = if rule.op.needs_values() {
            matched.iter().filter_map(|r| rule.extract(r)).collect()
        } else {
            Vec::new()
        };
        if rule.op.needs_values() && values.is_empty() {
            continue;
        }
        let refs: Vec<&Value> = values.iter().map(|v| &**v).collect();
        let label = format!("{} from {}", rule.label(), spec.name);
        if let Some(value) = rule.op.aggregate(&refs, matched.len(), &label, script, warning) {
            out.push((format!("{}{}", rule.name, suffix), value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PostAnnotationConfig;
    use crate::source::FieldRule;

    fn vcf_schema(fields: &[&str]) -> Schema {
        let mut schema = Schema {
            has_alleles: true,
            ..Schema::default()
        };
        for f in fields {
            schema.fields.insert(
                f.to_string(),
                FieldMeta {
                    number: "1".into(),
                    ty: "Float".into(),
                    description: String::new(),
                },
            );
        }
        schema
    }

    fn source(match_mode: MatchMode, rules: Vec<FieldRule>) -> AnnotationSource {
        AnnotationSource::from_records(
            SourceSpec {
                name: "db".into(),
                match_mode,
                rules,
                schema: vcf_schema(&["AF"]),
            },
            Vec::new(),
            true,
        )
        .unwrap()
    }

    fn af(start: u64, end: u64, value: &str) -> Arc<Record> {
        Arc::new(
            Record::new("chr1", start, end)
                .with_alleles("A", &["G"])
                .with_field("AF", Value::Str(value.into())),
        )
    }

    fn overlap_annotator() -> Annotator {
        let mut annotator = Annotator::new(Vec::new());
        annotator
            .setup(
                &vcf_schema(&[]),
                vec![source(
                    MatchMode::Overlap,
                    vec![
                        FieldRule::new(FieldRef::Info("AF".into()), Op::Mean, "af_mean"),
                        FieldRule::new(FieldRef::Info("AF".into()), Op::Count, "af_n"),
                    ],
                )],
            )
            .unwrap();
        annotator
    }

    #[test]
    fn test_overlap_aggregation() {
        let annotator = overlap_annotator();
        let cands = vec![vec![af(50, 150, "1"), af(120, 130, "2"), af(180, 250, "3")]];
        let mut rec = Record::new("chr1", 100, 200);

        annotator
            .annotate_ends(&mut rec, &cands, EndpointMode::Interval)
            .unwrap();
        assert_eq!(rec.fields.get("af_mean"), Some(&Value::Float(2.0)));
        assert_eq!(rec.fields.get("af_n"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_no_match_adds_nothing() {
        let annotator = overlap_annotator();
        let cands = vec![vec![af(10, 20, "1")]];
        let mut rec = Record::new("chr1", 100, 200).with_field("DP", Value::Int(4));

        annotator
            .annotate_ends(&mut rec, &cands, EndpointMode::Interval)
            .unwrap();
        assert_eq!(rec.fields.len(), 1);
    }

    #[test]
    fn test_exact_matching() {
        let mut annotator = Annotator::new(Vec::new());
        annotator
            .setup(
                &vcf_schema(&[]),
                vec![source(
                    MatchMode::Exact,
                    vec![FieldRule::new(FieldRef::Info("AF".into()), Op::First, "af")],
                )],
            )
            .unwrap();

        let cands = vec![vec![af(99, 100, "0.3")]];
        let mut same = Record::new("chr1", 99, 100).with_alleles("A", &["G"]);
        let mut other = Record::new("chr1", 99, 100).with_alleles("A", &["T"]);
        annotator
            .annotate_ends(&mut same, &cands, EndpointMode::Interval)
            .unwrap();
        annotator
            .annotate_ends(&mut other, &cands, EndpointMode::Interval)
            .unwrap();

        assert_eq!(same.fields.get("af"), Some(&Value::Str("0.3".into())));
        assert!(!other.fields.contains("af"));

        let mut bare = Record::new("chr1", 99, 100);
        let err = annotator
            .annotate_ends(&mut bare, &cands, EndpointMode::Interval)
            .unwrap_err();
        assert!(matches!(err, AnnoError::Match(_)));

        // one message per source, so the reporter can fold repeats
        let mut elsewhere = Record::new("chr1", 5000, 5001);
        let again = annotator
            .annotate_ends(&mut elsewhere, &cands, EndpointMode::Interval)
            .unwrap_err();
        assert_eq!(err.to_string(), again.to_string());
    }

    #[test]
    fn test_exact_needs_query_alleles() {
        let mut annotator = Annotator::new(Vec::new());
        let err = annotator
            .setup(
                &Schema::intervals(),
                vec![source(
                    MatchMode::Exact,
                    vec![FieldRule::new(FieldRef::Info("AF".into()), Op::First, "af")],
                )],
            )
            .err()
            .unwrap();
        assert!(matches!(err, AnnoError::SchemaMismatch(_)));
    }

    #[test]
    fn test_script_op_needs_evaluator() {
        let mut annotator = Annotator::new(Vec::new());
        let err = annotator
            .setup(
                &vcf_schema(&[]),
                vec![source(
                    MatchMode::Overlap,
                    vec![FieldRule::new(
                        FieldRef::Info("AF".into()),
                        Op::Script("mean(vals)".into()),
                        "af",
                    )],
                )],
            )
            .err()
            .unwrap();
        assert!(matches!(err, AnnoError::Configuration(_)));
    }

    #[test]
    fn test_endpoints() {
        let annotator = overlap_annotator();
        let cands = vec![vec![af(90, 101, "1"), af(150, 160, "5"), af(199, 300, "9")]];
        let mut rec = Record::new("chr1", 100, 200);

        annotator
            .annotate_ends(&mut rec, &cands, EndpointMode::Both)
            .unwrap();
        assert_eq!(rec.fields.get("af_n"), Some(&Value::Int(3)));
        assert_eq!(rec.fields.get("af_n_left"), Some(&Value::Int(1)));
        assert_eq!(rec.fields.get("af_mean_left"), Some(&Value::Float(1.0)));
        assert_eq!(rec.fields.get("af_mean_right"), Some(&Value::Float(9.0)));

        let names: Vec<_> = annotator
            .output_fields(EndpointMode::Both)
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert!(names.contains(&"af_mean_right".to_string()));
    }

    fn post(fields: &[&str], op: &str, name: &str) -> PostRule {
        PostRule::from_config(&PostAnnotationConfig {
            fields: fields.iter().map(|s| s.to_string()).collect(),
            op: op.into(),
            name: name.into(),
            ty: "Float".into(),
        })
        .unwrap()
    }

    #[test]
    fn test_post_inputs_must_be_defined() {
        let mut annotator = Annotator::new(vec![
            post(&["af_n", "DP"], "div2", "ratio"),
            post(&["ratio"], "max", "ratio_max"),
        ]);
        let sources = vec![source(
            MatchMode::Overlap,
            vec![FieldRule::new(FieldRef::Info("AF".into()), Op::Count, "af_n")],
        )];
        assert!(annotator.setup(&vcf_schema(&["DP"]), sources).is_ok());

        let mut annotator = Annotator::new(vec![post(&["af_n", "missing"], "div2", "ratio")]);
        let sources = vec![source(
            MatchMode::Overlap,
            vec![FieldRule::new(FieldRef::Info("AF".into()), Op::Count, "af_n")],
        )];
        let err = annotator.setup(&vcf_schema(&[]), sources).err().unwrap();
        assert!(matches!(err, AnnoError::Configuration(_)));
    }

    #[test]
    fn test_post_runs_after_sources() {
        let mut annotator = Annotator::new(vec![post(&["af_n", "DP"], "div2", "ratio")]);
        annotator
            .setup(
                &vcf_schema(&["DP"]),
                vec![source(
                    MatchMode::Overlap,
                    vec![FieldRule::new(FieldRef::Info("AF".into()), Op::Count, "af_n")],
                )],
            )
            .unwrap();

        let cands = vec![vec![af(0, 10, "1"), af(5, 10, "1")]];
        let mut rec = Record::new("chr1", 5, 6).with_field("DP", Value::Str("8".into()));
        annotator
            .annotate_ends(&mut rec, &cands, EndpointMode::Interval)
            .unwrap();
        assert_eq!(rec.fields.get("ratio"), Some(&Value::Float(0.25)));
    }
}

//! Aggregation ops: reduce the values pulled from every matched annotation
//! interval into a single output value.

use crate::error::{AnnoError, Result};
use crate::record::{FieldMeta, Value};

/// Prefix marking an op whose body is evaluated by a [`ScriptEvaluator`].
pub const SCRIPT_PREFIX: &str = "lua:";

/// Evaluates `lua:` expressions over matched values.
///
/// No evaluator ships with the crate; callers inject one when their config
/// uses scripted ops.
pub trait ScriptEvaluator: Send + Sync {
    fn eval(&self, expr: &str, values: &[Value]) -> std::result::Result<Value, String>;
}

/// Keep the first non-fatal error seen for a record.
#[inline]
pub(crate) fn note(slot: &mut Option<AnnoError>, err: AnnoError) {
    if slot.is_none() {
        *slot = Some(err);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Numeric {
    Mean,
    Max,
    Min,
    Sum,
}

impl Numeric {
    fn name(self) -> &'static str {
        match self {
            Numeric::Mean => "mean",
            Numeric::Max => "max",
            Numeric::Min => "min",
            Numeric::Sum => "sum",
        }
    }

    /// Reduce every comma-separated part of `values`.
    ///
    /// Parts that are not numbers are skipped and reported; `.` is a missing
    /// value and skipped silently.
    pub(crate) fn reduce(
        self,
        values: &[&Value],
        label: &str,
        warning: &mut Option<AnnoError>,
    ) -> Option<Value> {
        let mut ints: Vec<i64> = Vec::new();
        let mut floats: Vec<f64> = Vec::new();
        let mut all_int = true;

        for value in values {
            for part in value.parts() {
                let part = part.trim();
                if part.is_empty() || part == "." {
                    continue;
                }
                if let Ok(n) = part.parse::<i64>() {
                    ints.push(n);
                    floats.push(n as f64);
                } else if let Ok(x) = part.parse::<f64>() {
                    all_int = false;
                    floats.push(x);
                } else {
                    note(
                        warning,
                        AnnoError::Aggregation(format!(
                            "non-numeric value '{}' in {} for op {}",
                            part,
                            label,
                            self.name()
                        )),
                    );
                }
            }
        }

        if floats.is_empty() {
            return None;
        }

        let as_int = |result: Option<i64>, fallback: f64| match result {
            Some(n) if all_int => Value::Int(n),
            _ => Value::Float(fallback),
        };

        Some(match self {
            Numeric::Mean => Value::Float(floats.iter().sum::<f64>() / floats.len() as f64),
            Numeric::Sum => as_int(
                ints.iter().try_fold(0i64, |acc, &n| acc.checked_add(n)),
                floats.iter().sum(),
            ),
            Numeric::Max => as_int(
                ints.iter().copied().max(),
                floats.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ),
            Numeric::Min => as_int(
                ints.iter().copied().min(),
                floats.iter().copied().fold(f64::INFINITY, f64::min),
            ),
        })
    }
}

/// An aggregation op applied to one field of one annotation source.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Number of matched intervals.
    Count,
    /// Flag set when anything matched.
    Flag,
    Mean,
    Max,
    Min,
    Sum,
    /// Distinct values in first-seen order.
    ///
    /// Values are compared as text, so non-numeric values are kept rather
    /// than reported as aggregation errors.
    Uniq,
    /// First part of the first value.
    First,
    /// First matched value, verbatim.
    SelfValue,
    /// Every value joined by `,`.
    Concat,
    Script(String),
}

impl Op {
    pub fn parse(text: &str) -> Result<Op> {
        if let Some(expr) = text.strip_prefix(SCRIPT_PREFIX) {
            if expr.trim().is_empty() {
                return Err(AnnoError::config(format!("empty script op '{}'", text)));
            }
            return Ok(Op::Script(expr.to_string()));
        }
        Ok(match text {
            "count" => Op::Count,
            "flag" => Op::Flag,
            "mean" => Op::Mean,
            "max" => Op::Max,
            "min" => Op::Min,
            "sum" => Op::Sum,
            "uniq" => Op::Uniq,
            "first" => Op::First,
            "self" => Op::SelfValue,
            "concat" => Op::Concat,
            other => {
                return Err(AnnoError::config(format!(
                    "unknown op '{}'; expected one of count, flag, mean, max, min, sum, uniq, first, self, concat or lua:<expr>",
                    other
                )))
            }
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Op::Count => "count",
            Op::Flag => "flag",
            Op::Mean => "mean",
            Op::Max => "max",
            Op::Min => "min",
            Op::Sum => "sum",
            Op::Uniq => "uniq",
            Op::First => "first",
            Op::SelfValue => "self",
            Op::Concat => "concat",
            Op::Script(_) => "lua",
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, Op::Script(_))
    }

    /// `count` and `flag` only look at how many intervals matched.
    pub fn needs_values(&self) -> bool {
        !matches!(self, Op::Count | Op::Flag)
    }

    fn numeric(&self) -> Option<Numeric> {
        match self {
            Op::Mean => Some(Numeric::Mean),
            Op::Max => Some(Numeric::Max),
            Op::Min => Some(Numeric::Min),
            Op::Sum => Some(Numeric::Sum),
            _ => None,
        }
    }

    /// Header metadata of the output field, given the source field's own.
    pub fn output_meta(&self, source: Option<&FieldMeta>, description: String) -> FieldMeta {
        let source_type = || source.map_or("String".to_string(), |m| m.ty.clone());
        let (number, ty) = match self {
            Op::Count => ("1".to_string(), "Integer".to_string()),
            Op::Flag => ("0".to_string(), "Flag".to_string()),
            Op::Mean | Op::Max | Op::Min | Op::Sum => ("1".to_string(), "Float".to_string()),
            Op::Uniq | Op::Concat => (".".to_string(), "String".to_string()),
            Op::First => ("1".to_string(), source_type()),
            Op::SelfValue => (
                source.map_or(".".to_string(), |m| m.number.clone()),
                source_type(),
            ),
            Op::Script(_) => ("1".to_string(), "String".to_string()),
        };
        FieldMeta {
            number,
            ty,
            description,
        }
    }

    /// Reduce the values extracted from `matched` intervals.
    ///
    /// Returns `None` when nothing should be written. The first non-fatal
    /// problem is stored in `warning`.
    pub fn aggregate(
        &self,
        values: &[&Value],
        matched: usize,
        label: &str,
        script: Option<&dyn ScriptEvaluator>,
        warning: &mut Option<AnnoError>,
    ) -> Option<Value> {
        if matched == 0 {
            return None;
        }
        if let Some(numeric) = self.numeric() {
            return numeric.reduce(values, label, warning);
        }
        match self {
            Op::Count => Some(Value::Int(matched as i64)),
            Op::Flag => Some(Value::Flag),
            Op::Uniq => {
                let mut seen: Vec<String> = Vec::new();
                for value in values {
                    for part in value.parts() {
                        if !part.is_empty() && !seen.iter().any(|s| *s == part) {
                            seen.push(part.into_owned());
                        }
                    }
                }
                (!seen.is_empty()).then(|| Value::Str(seen.join(",")))
            }
            Op::Concat => {
                let joined: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                (!joined.is_empty()).then(|| Value::Str(joined.join(",")))
            }
            Op::First => values
                .first()
                .and_then(|v| v.parts().into_iter().next())
                .map(|p| Value::Str(p.into_owned())),
            Op::SelfValue => values.first().map(|v| (*v).clone()),
            Op::Script(expr) => run_script(expr, values, script, warning),
            Op::Mean | Op::Max | Op::Min | Op::Sum => None,
        }
    }
}

pub(crate) fn run_script(
    expr: &str,
    values: &[&Value],
    script: Option<&dyn ScriptEvaluator>,
    warning: &mut Option<AnnoError>,
) -> Option<Value> {
    let Some(evaluator) = script else {
        note(
            warning,
            AnnoError::Scripting(format!("no script evaluator for '{}'", expr)),
        );
        return None;
    };
    let owned: Vec<Value> = values.iter().map(|v| (*v).clone()).collect();
    match evaluator.eval(expr, &owned) {
        Ok(value) => Some(value),
        Err(message) => {
            note(
                warning,
                AnnoError::Scripting(format!("{}: {}", expr, message)),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| Value::Str(s.to_string())).collect()
    }

    fn run(op: &str, values: &[Value]) -> (Option<Value>, Option<AnnoError>) {
        let refs: Vec<&Value> = values.iter().collect();
        let mut warning = None;
        let out = Op::parse(op)
            .unwrap()
            .aggregate(&refs, values.len(), "AF", None, &mut warning);
        (out, warning)
    }

    #[test]
    fn test_mean_and_count() {
        let values = strs(&["1", "2", "3"]);
        assert_eq!(run("mean", &values).0, Some(Value::Float(2.0)));
        assert_eq!(run("count", &values).0, Some(Value::Int(3)));
        assert_eq!(run("flag", &values).0, Some(Value::Flag));
    }

    #[test]
    fn test_integral_reductions_stay_integers() {
        let values = strs(&["4", "1,7", "2"]);
        assert_eq!(run("sum", &values).0, Some(Value::Int(14)));
        assert_eq!(run("max", &values).0, Some(Value::Int(7)));
        assert_eq!(run("min", &values).0, Some(Value::Int(1)));

        let mixed = strs(&["0.5", "2"]);
        assert_eq!(run("max", &mixed).0, Some(Value::Float(2.0)));
        assert_eq!(run("sum", &mixed).0, Some(Value::Float(2.5)));
    }

    #[test]
    fn test_bad_numeric_value_is_skipped_and_reported() {
        let values = strs(&["1", "oops", "3", "."]);
        let (out, warning) = run("mean", &values);
        assert_eq!(out, Some(Value::Float(2.0)));
        let warning = warning.unwrap();
        assert!(!warning.is_fatal());
        assert_eq!(
            warning.to_string(),
            "aggregation error: non-numeric value 'oops' in AF for op mean"
        );
    }

    #[test]
    fn test_string_ops() {
        let values = strs(&["b,a", "a", "c"]);
        assert_eq!(run("uniq", &values).0, Some(Value::Str("b,a,c".into())));
        assert_eq!(run("concat", &values).0, Some(Value::Str("b,a,a,c".into())));
        assert_eq!(run("first", &values).0, Some(Value::Str("b".into())));
        assert_eq!(run("self", &values).0, Some(Value::Str("b,a".into())));
    }

    #[test]
    fn test_uniq_keeps_text_values() {
        let values = strs(&["1", "BRCA1", "1"]);
        let (out, warning) = run("uniq", &values);
        assert_eq!(out, Some(Value::Str("1,BRCA1".into())));
        assert!(warning.is_none());
    }

    #[test]
    fn test_no_match_writes_nothing() {
        let mut warning = None;
        assert_eq!(Op::Count.aggregate(&[], 0, "x", None, &mut warning), None);
        assert_eq!(Op::Flag.aggregate(&[], 0, "x", None, &mut warning), None);
    }

    #[test]
    fn test_parse_ops() {
        assert_eq!(Op::parse("self").unwrap(), Op::SelfValue);
        assert_eq!(
            Op::parse("lua:sum(vals)").unwrap(),
            Op::Script("sum(vals)".into())
        );
        assert!(Op::parse("lua:").is_err());
        assert!(matches!(
            Op::parse("median"),
            Err(AnnoError::Configuration(_))
        ));
    }

    struct Joiner;

    impl ScriptEvaluator for Joiner {
        fn eval(&self, expr: &str, values: &[Value]) -> std::result::Result<Value, String> {
            if expr == "fail" {
                return Err("boom".into());
            }
            Ok(Value::Str(format!("{}:{}", expr, values.len())))
        }
    }

    #[test]
    fn test_script_ops() {
        let values = strs(&["1", "2"]);
        let refs: Vec<&Value> = values.iter().collect();
        let mut warning = None;

        let out = Op::parse("lua:n")
            .unwrap()
            .aggregate(&refs, 2, "AF", Some(&Joiner), &mut warning);
        assert_eq!(out, Some(Value::Str("n:2".into())));
        assert!(warning.is_none());

        let out = Op::parse("lua:fail")
            .unwrap()
            .aggregate(&refs, 2, "AF", Some(&Joiner), &mut warning);
        assert_eq!(out, None);
        assert!(matches!(warning, Some(AnnoError::Scripting(_))));
    }
}

//! Post-annotation: derive new fields from fields already on the record.

use super::ops::{note, run_script, Numeric, ScriptEvaluator, SCRIPT_PREFIX};
use crate::config::PostAnnotationConfig;
use crate::error::{AnnoError, Result};
use crate::record::{FieldMeta, Fields, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum PostOp {
    /// First field divided by the second.
    Div2,
    Sum,
    Mean,
    Max,
    Min,
    First,
    Concat,
    Script(String),
}

impl PostOp {
    pub fn parse(text: &str) -> Result<PostOp> {
        if let Some(expr) = text.strip_prefix(SCRIPT_PREFIX) {
            if expr.trim().is_empty() {
                return Err(AnnoError::config(format!("empty script op '{}'", text)));
            }
            return Ok(PostOp::Script(expr.to_string()));
        }
        Ok(match text {
            "div2" => PostOp::Div2,
            "sum" => PostOp::Sum,
            "mean" => PostOp::Mean,
            "max" => PostOp::Max,
            "min" => PostOp::Min,
            "first" => PostOp::First,
            "concat" => PostOp::Concat,
            other => {
                return Err(AnnoError::config(format!(
                    "unknown postannotation op '{}'",
                    other
                )))
            }
        })
    }

    pub fn is_script(&self) -> bool {
        matches!(self, PostOp::Script(_))
    }
}

/// A validated `[[postannotation]]` section.
#[derive(Debug, Clone)]
pub struct PostRule {
    pub fields: Vec<String>,
    pub op: PostOp,
    pub name: String,
    pub ty: String,
}

impl PostRule {
    /// Build a rule, rejecting sections that cannot be applied. Whether a
    /// script evaluator exists is checked later, by the annotator.
    pub fn from_config(config: &PostAnnotationConfig) -> Result<Self> {
        config.check(true)?;
        Ok(Self {
            fields: config.fields.clone(),
            op: PostOp::parse(&config.op)?,
            name: config.name.clone(),
            ty: config.ty.clone(),
        })
    }

    pub fn meta(&self) -> FieldMeta {
        FieldMeta {
            number: if self.ty == "Flag" { "0" } else { "1" }.to_string(),
            ty: self.ty.clone(),
            description: format!(
                "calculated by {} of fields: {}",
                self.op_name(),
                self.fields.join(",")
            ),
        }
    }

    fn op_name(&self) -> &str {
        match &self.op {
            PostOp::Div2 => "div2",
            PostOp::Sum => "sum",
            PostOp::Mean => "mean",
            PostOp::Max => "max",
            PostOp::Min => "min",
            PostOp::First => "first",
            PostOp::Concat => "concat",
            PostOp::Script(_) => "lua",
        }
    }

    /// Compute this rule from `fields` and store the result under `name`.
    ///
    /// Nothing is written when none of the inputs are present (div2 needs
    /// both).
    pub fn apply(
        &self,
        fields: &mut Fields,
        script: Option<&dyn ScriptEvaluator>,
        warning: &mut Option<AnnoError>,
    ) {
        let inputs: Vec<&Value> = self.fields.iter().filter_map(|f| fields.get(f)).collect();
        if inputs.is_empty() && !self.op.is_script() {
            return;
        }

        let result = match &self.op {
            PostOp::Div2 => self.div2(fields, warning),
            PostOp::Sum => Numeric::Sum.reduce(&inputs, &self.name, warning),
            PostOp::Mean => Numeric::Mean.reduce(&inputs, &self.name, warning),
            PostOp::Max => Numeric::Max.reduce(&inputs, &self.name, warning),
            PostOp::Min => Numeric::Min.reduce(&inputs, &self.name, warning),
            PostOp::First => inputs.first().map(|v| (*v).clone()),
            PostOp::Concat => Some(Value::Str(
                inputs
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            )),
            PostOp::Script(expr) => run_script(expr, &inputs, script, warning),
        };

        if let Some(value) = result.and_then(|v| self.coerce(v, warning)) {
            fields.insert(self.name.clone(), value);
        }
    }

    fn div2(&self, fields: &Fields, warning: &mut Option<AnnoError>) -> Option<Value> {
        let (Some(num), Some(den)) = (self.fields.first(), self.fields.get(1)) else {
            note(
                warning,
                AnnoError::Aggregation(format!("div2 for {} needs two fields", self.name)),
            );
            return None;
        };
        let (num, den) = (fields.get(num)?, fields.get(den)?);
        let (Some(num), Some(den)) = (num.as_f64(), den.as_f64()) else {
            note(
                warning,
                AnnoError::Aggregation(format!("non-numeric input to div2 for {}", self.name)),
            );
            return None;
        };
        if den == 0.0 {
            note(
                warning,
                AnnoError::Aggregation(format!("division by zero in div2 for {}", self.name)),
            );
            return None;
        }
        Some(Value::Float(num / den))
    }

    fn coerce(&self, value: Value, warning: &mut Option<AnnoError>) -> Option<Value> {
        match self.ty.as_str() {
            "Flag" => Some(Value::Flag),
            "String" => Some(Value::Str(value.to_string())),
            "Integer" => match value {
                Value::Int(n) => Some(Value::Int(n)),
                other => match other.as_f64() {
                    Some(x) => Some(Value::Int(x.round() as i64)),
                    None => {
                        note(
                            warning,
                            AnnoError::Aggregation(format!(
                                "cannot store '{}' as Integer in {}",
                                other, self.name
                            )),
                        );
                        None
                    }
                },
            },
            _ => match value.as_f64() {
                Some(x) => Some(Value::Float(x)),
                None => Some(value),
            },
        }
    }
}

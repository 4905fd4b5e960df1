//! Records flowing through the join: positional span, alleles, and payload.

use crate::interval::{Interval, Span};
use rustc_hash::FxHashMap;
use std::borrow::Cow;
use std::fmt;

/// A payload value.
///
/// Values parsed from text stay as [`Value::Str`] so that untouched fields
/// are written back byte for byte; numeric ops parse on demand.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Flag,
}

impl Value {
    /// Split a value into its comma-separated parts.
    pub fn parts(&self) -> Vec<Cow<'_, str>> {
        match self {
            Value::Str(s) => s.split(',').map(Cow::Borrowed).collect(),
            Value::Flag => Vec::new(),
            other => vec![Cow::Owned(other.to_string())],
        }
    }

    /// Numeric view of a scalar value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Flag => None,
        }
    }

    /// Best-effort typed value from raw text.
    pub fn parse(text: &str) -> Value {
        if let Ok(n) = text.parse::<i64>() {
            Value::Int(n)
        } else if let Ok(x) = text.parse::<f64>() {
            Value::Float(x)
        } else {
            Value::Str(text.to_string())
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => f.write_str(itoa::Buffer::new().format(*n)),
            Value::Float(x) => f.write_str(ryu::Buffer::new().format(*x)),
            Value::Str(s) => f.write_str(s),
            Value::Flag => Ok(()),
        }
    }
}

/// Ordered field map. Insertion order is kept for output; inserting an
/// existing key overwrites it in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(String, Value)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reference and alternate alleles of a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alleles {
    pub reference: String,
    pub alternates: Vec<String>,
}

impl Alleles {
    pub fn new(reference: impl Into<String>, alternates: Vec<String>) -> Self {
        Self {
            reference: reference.into(),
            alternates,
        }
    }

    /// Same reference and the same set of alternates, ignoring order.
    pub fn same_as(&self, other: &Alleles) -> bool {
        self.reference == other.reference
            && self.alternates.len() == other.alternates.len()
            && self
                .alternates
                .iter()
                .all(|alt| other.alternates.contains(alt))
    }
}

/// Header metadata for one payload field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    pub number: String,
    pub ty: String,
    pub description: String,
}

/// What a stream can offer to the join: allele-level comparison and the set
/// of payload fields it declares.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub has_alleles: bool,
    pub fields: FxHashMap<String, FieldMeta>,
}

impl Schema {
    /// Schema of a plain interval stream (no alleles, no declared fields).
    pub fn intervals() -> Self {
        Self::default()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.get(name)
    }
}

/// A query or annotation record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub span: Span,
    pub alleles: Option<Alleles>,
    pub fields: Fields,
    /// Raw text columns as read, kept for column extraction and output.
    pub columns: Vec<String>,
}

impl Record {
    /// Create a record with no alleles, payload, or columns.
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            span: Span::new(chrom, start, end),
            alleles: None,
            fields: Fields::new(),
            columns: Vec::new(),
        }
    }

    pub fn with_alleles(mut self, reference: &str, alternates: &[&str]) -> Self {
        self.alleles = Some(Alleles::new(
            reference,
            alternates.iter().map(|a| a.to_string()).collect(),
        ));
        self
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key, value);
        self
    }

    /// 1-based raw column.
    #[inline]
    pub fn column(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.columns.get(i))
            .map(String::as_str)
    }
}

impl Interval for Record {
    #[inline]
    fn chrom(&self) -> &str {
        &self.span.chrom
    }

    #[inline]
    fn start(&self) -> u64 {
        self.span.start
    }

    #[inline]
    fn end(&self) -> u64 {
        self.span.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_overwrite_in_place() {
        let mut fields = Fields::new();
        fields.insert("a", Value::Int(1));
        fields.insert("b", Value::Int(2));
        fields.insert("a", Value::Int(3));

        let keys: Vec<_> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(fields.get("a"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_value_parts_and_numbers() {
        let v = Value::Str("1,2.5,x".to_string());
        let parts: Vec<_> = v.parts().into_iter().map(|p| p.into_owned()).collect();
        assert_eq!(parts, vec!["1", "2.5", "x"]);
        assert_eq!(Value::Str(" 4 ".into()).as_f64(), Some(4.0));
        assert_eq!(Value::Flag.as_f64(), None);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::parse("7"), Value::Int(7));
        assert_eq!(Value::parse("0.5"), Value::Float(0.5));
        assert_eq!(Value::parse("BRCA1"), Value::Str("BRCA1".into()));
    }

    #[test]
    fn test_alleles_compare_as_sets() {
        let a = Alleles::new("A", vec!["C".into(), "G".into()]);
        let b = Alleles::new("A", vec!["G".into(), "C".into()]);
        let c = Alleles::new("A", vec!["C".into()]);
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
    }

    #[test]
    fn test_column_is_one_based() {
        let mut rec = Record::new("chr1", 1, 2);
        rec.columns = vec!["chr1".into(), "1".into(), "2".into(), "gene".into()];
        assert_eq!(rec.column(4), Some("gene"));
        assert_eq!(rec.column(0), None);
        assert_eq!(rec.column(5), None);
    }
}

//! Run configuration.
//!
//! Annotation sources and post-annotation rules come from a TOML file:
//!
//! ```toml
//! [[annotation]]
//! file = "ExAC.vcf.gz"
//! fields = ["AC", "AN"]
//! names = ["exac_ac", "exac_an"]
//! ops = ["first", "first"]
//!
//! [[annotation]]
//! file = "genes.bed.gz"
//! columns = [4]
//! names = ["gene"]
//! ops = ["uniq"]
//!
//! [[postannotation]]
//! fields = ["exac_ac", "exac_an"]
//! op = "div2"
//! name = "exac_af"
//! type = "Float"
//! ```
//!
//! Join tuning (`JoinConfig`) has defaults that can be overridden from the
//! environment and then from the command line.

use crate::annotate::{EndpointMode, Op, PostOp};
use crate::error::{AnnoError, Result};
use crate::source::MatchMode;
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};

/// Environment variable overriding [`JoinConfig::max_gap`].
pub const MAX_GAP_ENV: &str = "ANNOJOIN_MAX_GAP";
/// Environment variable overriding [`JoinConfig::max_chunk`].
pub const MAX_CHUNK_ENV: &str = "ANNOJOIN_MAX_CHUNK";

pub const DEFAULT_MAX_GAP: u64 = 20_000;
pub const DEFAULT_MAX_CHUNK: usize = 8_000;
pub const DEFAULT_THREADS: usize = 2;

/// Value types accepted for post-annotation outputs.
const POST_TYPES: [&str; 4] = ["Float", "Integer", "String", "Flag"];

/// Parsed configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub annotation: Vec<AnnotationConfig>,
    #[serde(default, rename = "postannotation")]
    pub post_annotation: Vec<PostAnnotationConfig>,
    /// Prepended to relative annotation paths.
    #[serde(skip)]
    pub base: Option<PathBuf>,
}

/// One `[[annotation]]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnotationConfig {
    pub file: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub columns: Vec<usize>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub ops: Vec<String>,
    #[serde(default, rename = "match")]
    pub match_mode: Option<MatchMode>,
}

/// One `[[postannotation]]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostAnnotationConfig {
    #[serde(default)]
    pub fields: Vec<String>,
    pub op: String,
    pub name: String,
    #[serde(default = "default_post_type", rename = "type")]
    pub ty: String,
}

fn default_post_type() -> String {
    "Float".to_string()
}

impl Config {
    /// Load a config file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| {
            let mut message = e.to_string();
            if message.contains("invalid") || message.contains("expected") {
                message.push_str(
                    "\nNOTE: values must be quoted, e.g. fields=['AC', 'AN'] instead of fields=[AC, AN]",
                );
            }
            AnnoError::Configuration(message)
        })
    }

    /// Validate every section. `scripting` says whether a script file was
    /// supplied; `lua:` ops are rejected without one.
    pub fn check(&self, scripting: bool) -> Result<()> {
        for annotation in &self.annotation {
            annotation.check(scripting)?;
        }
        for post in &self.post_annotation {
            post.check(scripting).map_err(|e| {
                AnnoError::config(format!(
                    "error in postannotation section {}: {}",
                    post.name, e
                ))
            })?;
        }
        Ok(())
    }

    /// Resolve an annotation file against the base path.
    pub fn resolve(&self, annotation: &AnnotationConfig) -> PathBuf {
        let file = Path::new(&annotation.file);
        match &self.base {
            Some(base) if file.is_relative() => base.join(file),
            _ => file.to_path_buf(),
        }
    }
}

impl AnnotationConfig {
    /// Number of (field, op, name) rules this section declares.
    pub fn rule_count(&self) -> usize {
        self.fields.len().max(self.columns.len())
    }

    /// Output names; VCF fields default to their own name.
    pub fn output_names(&self) -> Vec<String> {
        if self.names.is_empty() {
            self.fields.clone()
        } else {
            self.names.clone()
        }
    }

    pub fn check(&self, scripting: bool) -> Result<()> {
        let fail = |message: String| Err(AnnoError::config(format!("{}: {}", self.file, message)));

        if self.fields.is_empty() == self.columns.is_empty() {
            return fail("specify exactly one of 'fields' or 'columns'".to_string());
        }
        let n = self.rule_count();
        if self.ops.len() != n {
            return fail(format!("expected {} ops, got {}", n, self.ops.len()));
        }
        let names = self.output_names();
        if names.len() != n {
            return fail(format!("expected {} names, got {}", n, names.len()));
        }
        if let Some(&bad) = self.columns.iter().find(|&&c| c == 0) {
            return fail(format!("columns are 1-based, got {}", bad));
        }
        for op in &self.ops {
            let op = Op::parse(op)?;
            if op.is_script() && !scripting {
                return fail("requested lua op without specifying a script file".to_string());
            }
        }
        Ok(())
    }
}

impl PostAnnotationConfig {
    pub fn check(&self, scripting: bool) -> Result<()> {
        if self.name.is_empty() {
            return Err(AnnoError::config("missing name"));
        }
        let op = PostOp::parse(&self.op)?;
        if op.is_script() && !scripting {
            return Err(AnnoError::config(
                "requested lua op without specifying a script file",
            ));
        }
        if !op.is_script() && self.fields.is_empty() {
            return Err(AnnoError::config("no input fields"));
        }
        if op == PostOp::Div2 && self.fields.len() != 2 {
            return Err(AnnoError::config("div2 takes exactly two fields"));
        }
        if !POST_TYPES.contains(&self.ty.as_str()) {
            return Err(AnnoError::config(format!(
                "unknown type '{}', expected one of {:?}",
                self.ty, POST_TYPES
            )));
        }
        Ok(())
    }
}

/// Tuning for the join engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinConfig {
    /// Maximum query records per chunk.
    pub max_chunk: usize,
    /// A start-to-start gap larger than this closes the current chunk.
    pub max_gap: u64,
    /// Annotation worker threads.
    pub threads: usize,
    pub ends: EndpointMode,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            max_chunk: DEFAULT_MAX_CHUNK,
            max_gap: DEFAULT_MAX_GAP,
            threads: DEFAULT_THREADS,
            ends: EndpointMode::Interval,
        }
    }
}

impl JoinConfig {
    /// Defaults with `ANNOJOIN_MAX_GAP` / `ANNOJOIN_MAX_CHUNK` applied.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_gap: env_get(MAX_GAP_ENV, defaults.max_gap),
            max_chunk: env_get(MAX_CHUNK_ENV, defaults.max_chunk),
            ..defaults
        }
    }
}

fn env_get<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match std::env::var(name) {
        Ok(raw) if !raw.is_empty() => match raw.parse() {
            Ok(value) => {
                log::info!("using {} of {}", name, value);
                value
            }
            Err(_) => {
                log::warn!("couldn't parse {}, using {}", name, default);
                default
            }
        },
        _ => default,
    }
}

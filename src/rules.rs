//! Transform rules loaded from a `transforms.yml` file.
//!
//! ```yaml
//! rename:
//!   CustomerID: customer_id
//! cast:
//!   customerid: int64
//! drop:
//!   - _sdc_sequence
//! keep:
//!   - _sdc_batched_at
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::error::{DbtGenError, DbtGenResult};

/// Cast types accepted in the `cast` section, optionally followed by `(p[, s])`.
const KNOWN_TYPES: &[&str] = &[
    "int",
    "int64",
    "integer",
    "bigint",
    "smallint",
    "number",
    "numeric",
    "decimal",
    "float",
    "float64",
    "double",
    "real",
    "string",
    "varchar",
    "text",
    "char",
    "bool",
    "boolean",
    "date",
    "datetime",
    "time",
    "timestamp",
    "timestamp_ntz",
    "timestamp_tz",
    "timestamp_ltz",
    "variant",
    "json",
    "bytes",
    "binary",
];

/// What to do with one source column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRule {
    pub match_name: String,
    pub target_name: Option<String>,
    pub cast_type: Option<String>,
    pub drop: bool,
}

impl TransformRule {
    fn new(match_name: impl Into<String>) -> Self {
        Self {
            match_name: match_name.into(),
            target_name: None,
            cast_type: None,
            drop: false,
        }
    }

    pub fn rename(match_name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            target_name: Some(target.into()),
            ..Self::new(match_name)
        }
    }

    pub fn cast(match_name: impl Into<String>, cast_type: impl Into<String>) -> Self {
        Self {
            cast_type: Some(cast_type.into()),
            ..Self::new(match_name)
        }
    }

    pub fn drop(match_name: impl Into<String>) -> Self {
        Self {
            drop: true,
            ..Self::new(match_name)
        }
    }

    /// A rule that only retains the column.
    pub fn keep(match_name: impl Into<String>) -> Self {
        Self::new(match_name)
    }

    fn same_action(&self, other: &TransformRule) -> bool {
        self.target_name == other.target_name
            && self.cast_type == other.cast_type
            && self.drop == other.drop
    }

    fn describe(&self) -> &'static str {
        match (self.drop, &self.target_name, &self.cast_type) {
            (true, _, _) => "dropped",
            (false, Some(_), _) => "renamed",
            (false, None, Some(_)) => "cast",
            (false, None, None) => "kept",
        }
    }
}

/// Ordered rule set for one invocation. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformSpec {
    rules: Vec<TransformRule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TransformFile {
    rename: Mapping,
    cast: Mapping,
    drop: Vec<String>,
    keep: Vec<String>,
}

impl TransformSpec {
    /// An empty rule set: every column passes through.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a rule set from individual rules.
    ///
    /// Repeated rules for the same column are merged when identical and
    /// rejected when their actions conflict.
    pub fn from_rules(rules: impl IntoIterator<Item = TransformRule>) -> DbtGenResult<Self> {
        let mut spec = Self::new();
        for mut rule in rules {
            if let Some(cast_type) = rule.cast_type.take() {
                rule.cast_type = Some(validate_cast_type(&rule.match_name, &cast_type)?);
            }
            match spec.rules.iter().find(|r| r.match_name == rule.match_name) {
                Some(existing) if existing.same_action(&rule) => {}
                Some(existing) => return Err(conflict(existing, &rule)),
                None => spec.rules.push(rule),
            }
        }
        Ok(spec)
    }

    /// Parse a transforms YAML document.
    pub fn from_yaml(text: &str) -> DbtGenResult<Self> {
        let blank = text.lines().map(str::trim).all(|l| l.is_empty() || l.starts_with('#'));
        if blank {
            return Ok(Self::new());
        }
        let doc: Value = serde_yaml::from_str(text)
            .map_err(|e| DbtGenError::InvalidTransformSpec(format!("invalid YAML: {}", e)))?;
        if doc.is_null() {
            return Ok(Self::new());
        }
        let file: TransformFile = serde_yaml::from_value(doc)
            .map_err(|e| DbtGenError::InvalidTransformSpec(e.to_string()))?;

        let mut spec = Self::new();
        for (key, value) in &file.rename {
            let name = scalar(key, "rename")?;
            let target = scalar(value, "rename")?;
            spec.entry(&name).target_name = Some(target);
        }
        for (key, value) in &file.cast {
            let name = scalar(key, "cast")?;
            let cast_type = validate_cast_type(&name, &scalar(value, "cast")?)?;
            spec.entry(&name).cast_type = Some(cast_type);
        }
        for name in &file.keep {
            spec.entry(name);
        }
        for name in &file.drop {
            match spec.rules.iter().find(|r| &r.match_name == name) {
                Some(existing) if existing.drop => {}
                Some(existing) => return Err(conflict(existing, &TransformRule::drop(name))),
                None => spec.rules.push(TransformRule::drop(name)),
            }
        }
        Ok(spec)
    }

    /// Load and parse a transforms file.
    pub fn load(path: impl AsRef<Path>) -> DbtGenResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| DbtGenError::in_file(path, e.into()))?;
        let spec = Self::from_yaml(&content).map_err(|e| DbtGenError::in_file(path, e))?;
        tracing::info!("Loaded {} transform rule(s) from {}", spec.len(), path.display());
        for rule in &spec.rules {
            tracing::debug!(
                "Rule '{}': target={:?}, cast={:?}, drop={}",
                rule.match_name,
                rule.target_name,
                rule.cast_type,
                rule.drop
            );
        }
        Ok(spec)
    }

    /// Reject rules that become ambiguous under the given matching policy.
    pub fn validate(&self, case_sensitive: bool) -> DbtGenResult<()> {
        if case_sensitive {
            return Ok(());
        }
        let mut seen: HashMap<String, &TransformRule> = HashMap::new();
        for rule in &self.rules {
            let key = rule.match_name.to_ascii_lowercase();
            match seen.get(&key) {
                Some(prev) if !prev.same_action(rule) => {
                    return Err(DbtGenError::InvalidTransformSpec(format!(
                        "rules for '{}' and '{}' conflict when matching case-insensitively",
                        prev.match_name, rule.match_name
                    )));
                }
                Some(_) => {}
                None => {
                    seen.insert(key, rule);
                }
            }
        }
        Ok(())
    }

    /// Find the rule for a source column. Stored names keep their casing;
    /// folding only happens at comparison time.
    pub fn lookup(&self, name: &str, case_sensitive: bool) -> Option<&TransformRule> {
        if case_sensitive {
            self.rules.iter().find(|r| r.match_name == name)
        } else {
            self.rules
                .iter()
                .find(|r| r.match_name.eq_ignore_ascii_case(name))
        }
    }

    pub fn rules(&self) -> &[TransformRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn entry(&mut self, name: &str) -> &mut TransformRule {
        let idx = match self.rules.iter().position(|r| r.match_name == name) {
            Some(idx) => idx,
            None => {
                self.rules.push(TransformRule::new(name));
                self.rules.len() - 1
            }
        };
        &mut self.rules[idx]
    }
}

fn conflict(existing: &TransformRule, rule: &TransformRule) -> DbtGenError {
    let (before, after) = (existing.describe(), rule.describe());
    if before == after {
        DbtGenError::InvalidTransformSpec(format!(
            "column '{}' has conflicting '{}' rules",
            rule.match_name, after
        ))
    } else {
        DbtGenError::InvalidTransformSpec(format!(
            "column '{}' is both {} and {}",
            rule.match_name, before, after
        ))
    }
}

fn scalar(value: &Value, section: &str) -> DbtGenResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(DbtGenError::InvalidTransformSpec(format!(
            "'{}' entries must be plain names, got {:?}",
            section, other
        ))),
    }
}

fn validate_cast_type(column: &str, cast_type: &str) -> DbtGenResult<String> {
    let normalized = cast_type.trim().to_ascii_lowercase();
    let (base, params) = match normalized.split_once('(') {
        Some((base, rest)) => (base.trim(), Some(rest)),
        None => (normalized.as_str(), None),
    };
    let params_ok = params.is_none_or(|rest| {
        rest.strip_suffix(')').is_some_and(|inner| {
            inner.split(',').all(|p| p.trim().parse::<u32>().is_ok())
        })
    });

    if KNOWN_TYPES.contains(&base) && params_ok {
        Ok(normalized)
    } else {
        Err(DbtGenError::InvalidTransformSpec(format!(
            "unknown cast type '{}' for column '{}'",
            cast_type, column
        )))
    }
}

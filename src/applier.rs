//! Rule applier: turns extracted columns into output columns.
//!
//! Per column, in source order:
//!
//! 1. drop metadata columns unless a rule rescues them
//! 2. drop columns whose rule says so
//! 3. resolve the output name (explicit target, split heuristic, or lower-cased
//!    identifier); `src.CustomerID` resolves through its last part, expressions
//!    such as `upper(name)` have no name
//! 4. resolve the cast (explicit rule first, then the dialect heuristics, which
//!    need a name)
//! 5. alias only when the surface form changed

use std::collections::HashSet;

use crate::ast::{Column, OutputColumn};
use crate::config::ProcessingOptions;
use crate::dialect::Dialect;
use crate::error::{DbtGenError, DbtGenResult};
use crate::parser::trailing_identifier;
use crate::rules::{TransformRule, TransformSpec};

/// Apply a rule set to a column list.
///
/// Fails with `InvalidTransformSpec` before touching any column if the rules
/// are ambiguous under the matching policy, and with `EmptyProjection` when
/// nothing survives.
pub fn apply(
    columns: &[Column],
    spec: &TransformSpec,
    options: &ProcessingOptions,
    dialect: Dialect,
) -> DbtGenResult<Vec<OutputColumn>> {
    spec.validate(options.case_sensitive)?;

    let mut output = Vec::with_capacity(columns.len());
    let mut names: HashSet<String> = HashSet::new();

    for column in columns {
        let rule = lookup(column, spec, options);

        if rule.is_some_and(|r| r.drop) {
            tracing::debug!("Dropping '{}' (rule)", column.source_name);
            continue;
        }
        if options.drop_metadata && column.is_metadata && rule.is_none() {
            tracing::debug!("Dropping '{}' (metadata)", column.source_name);
            continue;
        }

        let (out, name) = transform_column(column, rule, options, dialect);
        tracing::debug!("Column '{}' -> {:?}", column.source_name, out);
        let key = name.as_deref().unwrap_or(out.expression.as_str()).to_ascii_lowercase();
        if !names.insert(key) {
            tracing::warn!(
                "Output column '{}' appears more than once (from '{}')",
                name.as_deref().unwrap_or(out.expression.as_str()),
                column.source_name
            );
        }
        output.push(out);
    }

    for rule in spec.rules() {
        let matched = columns
            .iter()
            .any(|c| lookup(c, spec, options).is_some_and(|r| std::ptr::eq(r, rule)));
        if !matched {
            tracing::debug!("Rule '{}' matched no column", rule.match_name);
        }
    }

    if output.is_empty() {
        return Err(DbtGenError::EmptyProjection {
            dropped: columns.len(),
        });
    }
    Ok(output)
}

/// Rules match the full source name first, then the bare identifier of a
/// qualified reference (`src.CustomerID` matches a `customerid` rule).
fn lookup<'a>(
    column: &Column,
    spec: &'a TransformSpec,
    options: &ProcessingOptions,
) -> Option<&'a TransformRule> {
    spec.lookup(&column.source_name, options.case_sensitive).or_else(|| {
        trailing_identifier(&column.source_name)
            .map(unquote)
            .filter(|ident| *ident != column.source_name)
            .and_then(|ident| spec.lookup(ident, options.case_sensitive))
    })
}

/// Build the output column, returning it with the name it is visible under
/// when one can be derived.
fn transform_column(
    column: &Column,
    rule: Option<&TransformRule>,
    options: &ProcessingOptions,
    dialect: Dialect,
) -> (OutputColumn, Option<String>) {
    let heuristics = dialect.supports_heuristics();
    let ident = trailing_identifier(&column.source_name);

    let name = match (rule.and_then(|r| r.target_name.as_deref()), ident) {
        (Some(target), _) => Some(target.to_string()),
        (None, None) => None,
        // Quoted identifiers keep their casing.
        (None, Some(ident)) if is_quoted(ident) => Some(ident.to_string()),
        (None, Some(ident)) if heuristics && options.split_columns => Some(split_identifier(ident)),
        (None, Some(ident)) if options.case_sensitive => Some(ident.to_string()),
        (None, Some(ident)) => Some(ident.to_lowercase()),
    };

    // Unquoted references are case-insensitive in every supported warehouse,
    // so re-casing them needs no alias.
    let expression = if !options.case_sensitive
        && !column.is_aliased()
        && is_plain_reference(&column.expression)
    {
        column.expression.to_lowercase()
    } else {
        column.expression.clone()
    };

    let cast = resolve_cast(rule, ident, name.as_deref(), options, dialect);
    let out = match (cast, name.as_deref()) {
        (Some(sql_type), Some(name)) => {
            OutputColumn::aliased(dialect.cast(&expression, &sql_type), name)
        }
        (Some(sql_type), None) => OutputColumn::bare(dialect.cast(&expression, &sql_type)),
        (None, Some(name)) if trailing_identifier(&expression) == Some(name) => {
            OutputColumn::bare(expression)
        }
        (None, Some(name)) => OutputColumn::aliased(expression, name),
        (None, None) => OutputColumn::bare(expression),
    };
    (out.with_comments(column.comments.clone()), name)
}

fn resolve_cast(
    rule: Option<&TransformRule>,
    ident: Option<&str>,
    name: Option<&str>,
    options: &ProcessingOptions,
    dialect: Dialect,
) -> Option<String> {
    let heuristics = dialect.supports_heuristics();

    if let Some(explicit) = rule.and_then(|r| r.cast_type.as_deref()) {
        if heuristics && options.convert_timestamp && explicit == "timestamp" {
            return dialect.timestamp_type().map(str::to_string);
        }
        return Some(explicit.to_string());
    }
    if !heuristics {
        return None;
    }
    if options.id_as_int && name.is_some_and(|n| is_id_name(unquote(n))) {
        return dialect.int_type().map(str::to_string);
    }
    if options.convert_timestamp && ident.is_some_and(|i| is_timestamp_name(unquote(i))) {
        return dialect.timestamp_type().map(str::to_string);
    }
    None
}

/// Insert `_` at lower→upper and letter→digit transitions, then lower-case.
///
/// `currencyCode` becomes `currency_code`; already-flattened names such as
/// `currencycode` have no detectable boundary and stay as they are.
pub fn split_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    for c in name.chars() {
        if let Some(p) = prev {
            let case_step = p.is_lowercase() && c.is_uppercase();
            let digit_step = p.is_alphabetic() && c.is_ascii_digit();
            if case_step || digit_step {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
        prev = Some(c);
    }
    out
}

fn is_id_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with("id")
}

fn is_timestamp_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with("_at")
}

fn is_quoted(ident: &str) -> bool {
    ident.starts_with(['"', '`'])
}

fn unquote(ident: &str) -> &str {
    if is_quoted(ident) && ident.len() >= 2 {
        &ident[1..ident.len() - 1]
    } else {
        ident
    }
}

/// `customerid` or `src.customerid`, with no quoted parts.
fn is_plain_reference(expression: &str) -> bool {
    expression.split('.').all(|part| {
        let mut chars = part.chars();
        chars
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
            && chars.all(|c| c.is_alphanumeric() || c == '_')
    })
}

//! SQL emitter.
//!
//! Writes a transformed column list back into the model, replacing only the
//! located list and copying everything around it verbatim.

use crate::ast::{OutputColumn, Projection};
use crate::error::{DbtGenError, DbtGenResult};
use crate::parser::locate;

/// Trait for converting nodes to SQL.
pub trait ToSql {
    /// Convert this node to a SQL string.
    fn to_sql(&self) -> String;
}

impl ToSql for OutputColumn {
    fn to_sql(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} as {}", self.expression, alias),
            None => self.expression.clone(),
        }
    }
}

/// Replace the column list of `original_sql` with `columns`.
pub fn emit(
    original_sql: &str,
    columns: &[OutputColumn],
    leading_commas: bool,
) -> DbtGenResult<String> {
    let projection = locate(original_sql)?;
    rewrite(original_sql, &projection, columns, leading_commas)
}

/// Like [`emit`], for a projection that was already located in `sql`.
///
/// Multi-line lists get one column per line at the first column's
/// indentation. Lists that started on the `select` line stay inline.
///
/// Comments written between two columns stay with the column before them
/// and end up on that column's line. A comment on a line of its own between
/// columns is moved up to the previous column. `--` comments are rewritten as
/// `/* */` wherever a line break cannot follow them.
pub fn rewrite(
    sql: &str,
    projection: &Projection,
    columns: &[OutputColumn],
    leading_commas: bool,
) -> DbtGenResult<String> {
    if columns.is_empty() {
        return Err(DbtGenError::EmptyProjection {
            dropped: projection.columns.len(),
        });
    }

    let suffix = &sql[projection.list.end..];
    let line_follows = suffix.trim_start_matches([' ', '\t']).starts_with(['\n', '\r']);

    let mut list = String::new();
    for (i, column) in columns.iter().enumerate() {
        let last = i + 1 == columns.len();
        let line_safe = if last {
            line_follows
        } else {
            projection.indent.is_some()
        };
        let notes: String = column
            .comments
            .iter()
            .map(|c| format!(" {}", render_comment(c, line_safe)))
            .collect();

        list.push_str(&column.to_sql());
        match &projection.indent {
            _ if last => list.push_str(&notes),
            Some(indent) if leading_commas => {
                list.push_str(&notes);
                list.push('\n');
                list.push_str(indent);
                list.push_str(", ");
            }
            Some(indent) => {
                list.push(',');
                list.push_str(&notes);
                list.push('\n');
                list.push_str(indent);
            }
            None => {
                list.push(',');
                list.push_str(&notes);
                list.push(' ');
            }
        }
    }

    let mut out = String::with_capacity(sql.len() + list.len());
    out.push_str(&sql[..projection.list.start]);
    out.push_str(&list);
    out.push_str(suffix);
    Ok(out)
}

fn render_comment(comment: &str, line_safe: bool) -> String {
    match comment.strip_prefix("--") {
        Some(text) if !line_safe => format!("/* {} */", text.trim().replace("*/", "* /")),
        _ => comment.to_string(),
    }
}

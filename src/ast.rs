//! Data model shared by the extractor, the rule applier and the emitter.

use std::ops::Range;

use serde::Serialize;

use crate::parser::trailing_identifier;

/// Prefix marking ingestion metadata columns (`_sdc_*`, `_fivetran_*`, ...).
pub const METADATA_PREFIX: char = '_';

/// One entry of a model's column list, as written in the source SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    /// The alias if present, else the bare expression.
    pub source_name: String,
    /// The expression part of the entry, without any `as <alias>` suffix.
    pub expression: String,
    /// Zero-based index in the original select list.
    pub position: usize,
    pub is_metadata: bool,
    /// Comments written between this column and the next one.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
}

impl Column {
    pub fn new(expression: impl Into<String>, alias: Option<String>, position: usize) -> Self {
        let expression = expression.into();
        let source_name = alias.unwrap_or_else(|| expression.clone());
        let is_metadata = trailing_identifier(&source_name)
            .unwrap_or(source_name.as_str())
            .starts_with(METADATA_PREFIX);
        Self {
            source_name,
            expression,
            position,
            is_metadata,
            comments: Vec::new(),
        }
    }

    /// Whether the entry carried an explicit `as <alias>`.
    pub fn is_aliased(&self) -> bool {
        self.source_name != self.expression
    }

    /// A column that re-emits itself unchanged, used for no-op transforms.
    pub fn passthrough(&self) -> OutputColumn {
        let out = if self.is_aliased() {
            OutputColumn::aliased(self.expression.clone(), self.source_name.clone())
        } else {
            OutputColumn::bare(self.expression.clone())
        };
        out.with_comments(self.comments.clone())
    }
}

/// The emitted form of a column: `cast(id as int64) as id` or a bare `customerid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    pub expression: String,
    pub alias: Option<String>,
    /// Source comments re-emitted after the column.
    pub comments: Vec<String>,
}

impl OutputColumn {
    pub fn bare(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            alias: None,
            comments: Vec::new(),
        }
    }

    pub fn aliased(expression: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            alias: Some(alias.into()),
            comments: Vec::new(),
        }
    }

    pub fn with_comments(mut self, comments: Vec<String>) -> Self {
        self.comments = comments;
        self
    }

    /// The name this column is visible under downstream.
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.expression)
    }
}

/// The located column list of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub columns: Vec<Column>,
    /// Byte range from the first column's first character to the last column's last.
    pub list: Range<usize>,
    /// Leading whitespace of the first column's line, or `None` when the list
    /// starts on the same line as `select`.
    pub indent: Option<String>,
}

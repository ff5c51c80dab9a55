//! Target warehouse profiles.

use std::fmt;

/// Supported dialect profiles.
///
/// `Generic` applies transform-file rules only. `BigQuery` and `Snowflake`
/// additionally enable the split/id/timestamp heuristics when asked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Generic,
    BigQuery,
    Snowflake,
}

impl Dialect {
    /// Whether the heuristic flags (`split_columns`, `id_as_int`,
    /// `convert_timestamp`) have any effect.
    pub fn supports_heuristics(&self) -> bool {
        !matches!(self, Dialect::Generic)
    }

    /// Integer type used for `id` columns.
    pub fn int_type(&self) -> Option<&'static str> {
        match self {
            Dialect::Generic => None,
            Dialect::BigQuery => Some("int64"),
            Dialect::Snowflake => Some("integer"),
        }
    }

    /// Type used for timestamp conversion.
    pub fn timestamp_type(&self) -> Option<&'static str> {
        match self {
            Dialect::Generic => None,
            Dialect::BigQuery => Some("timestamp"),
            Dialect::Snowflake => Some("timestamp_ntz"),
        }
    }

    pub fn cast(&self, expression: &str, sql_type: &str) -> String {
        format!("cast({} as {})", expression, sql_type)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Generic => "generic",
            Dialect::BigQuery => "bigquery",
            Dialect::Snowflake => "snowflake",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

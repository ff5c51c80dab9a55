//! # dbtgen: base model column transforms
//!
//! Rewrites the column list of generated dbt base models: rename, drop,
//! cast and re-case columns, then re-emit the model with the surrounding
//! SQL untouched.
//!
//! ## Quick Example
//!
//! ```
//! use dbtgen::prelude::*;
//!
//! let model = "select\n    customerid,\n    _sdc_sequence\nfrom source";
//! let spec = TransformSpec::from_yaml("rename:\n  customerid: customer_id\n").unwrap();
//!
//! let sql = dbtgen::transform(model, &spec, &ProcessingOptions::default(), Dialect::Generic, false)
//!     .unwrap();
//! assert_eq!(sql, "select\n    customerid as customer_id\nfrom source");
//! ```
//!
//! ## Pipeline
//!
//! | Stage     | Module       | Output                 |
//! |-----------|--------------|------------------------|
//! | Extract   | `parser`     | `Vec<Column>`          |
//! | Apply     | `applier`    | `Vec<OutputColumn>`    |
//! | Emit      | `transpiler` | SQL text               |
//!
//! The dialect (`Generic`, `BigQuery`, `Snowflake`) only parameterizes the
//! apply stage.

pub mod applier;
pub mod ast;
pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod parser;
pub mod rules;
pub mod transpiler;

pub mod prelude {
    pub use crate::applier::apply;
    pub use crate::ast::*;
    pub use crate::config::{DbtGenConfig, EmitOptions, ProcessingOptions};
    pub use crate::dialect::Dialect;
    pub use crate::engine::{BatchReport, ModelProcessor};
    pub use crate::error::*;
    pub use crate::parser::{extract, locate};
    pub use crate::rules::{TransformRule, TransformSpec};
    pub use crate::transpiler::{ToSql, emit};
}

/// Transform one model's SQL text in a single call.
pub fn transform(
    sql: &str,
    spec: &rules::TransformSpec,
    options: &config::ProcessingOptions,
    dialect: dialect::Dialect,
    leading_commas: bool,
) -> Result<String, error::DbtGenError> {
    let projection = parser::locate(sql)?;
    let columns = applier::apply(&projection.columns, spec, options, dialect)?;
    transpiler::rewrite(sql, &projection, &columns, leading_commas)
}

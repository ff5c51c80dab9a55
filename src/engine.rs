//! Per-file pipeline and the directory batch driver.
//!
//! Each model is independent: extract, apply, emit, then write. Output is
//! only written once the whole file has been transformed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::config::{DbtGenConfig, EmitOptions, ProcessingOptions};
use crate::dialect::Dialect;
use crate::error::{DbtGenError, DbtGenResult};
use crate::rules::TransformSpec;

/// Transforms models with one rule set, dialect and option set.
#[derive(Debug, Clone)]
pub struct ModelProcessor {
    spec: Arc<TransformSpec>,
    options: ProcessingOptions,
    dialect: Dialect,
    emit: EmitOptions,
}

impl ModelProcessor {
    pub fn new(spec: TransformSpec, dialect: Dialect) -> Self {
        Self {
            spec: Arc::new(spec),
            options: ProcessingOptions::default(),
            dialect,
            emit: EmitOptions::default(),
        }
    }

    pub fn from_config(spec: TransformSpec, dialect: Dialect, config: &DbtGenConfig) -> Self {
        Self::new(spec, dialect)
            .with_options(config.processing())
            .with_emit(config.emit())
    }

    pub fn with_options(mut self, options: ProcessingOptions) -> Self {
        if !self.dialect.supports_heuristics()
            && (options.split_columns || options.id_as_int || options.convert_timestamp)
        {
            tracing::debug!("Heuristic flags have no effect with the {} dialect", self.dialect);
        }
        self.options = options;
        self
    }

    pub fn with_emit(mut self, emit: EmitOptions) -> Self {
        self.emit = emit;
        self
    }

    /// Transform one model's SQL text.
    pub fn process_sql(&self, sql: &str) -> DbtGenResult<String> {
        crate::transform(
            sql,
            &self.spec,
            &self.options,
            self.dialect,
            self.emit.leading_commas,
        )
    }

    /// Transform `input` and write the result to `output`.
    pub fn process_file(&self, input: &Path, output: &Path) -> DbtGenResult<()> {
        let attributed = |e: DbtGenError| DbtGenError::in_file(input, e);

        let sql = fs::read_to_string(input).map_err(|e| attributed(e.into()))?;
        let transformed = self.process_sql(&sql).map_err(attributed)?;
        fs::write(output, transformed).map_err(|e| attributed(e.into()))?;

        tracing::info!("Transformed {} -> {}", input.display(), output.display());
        Ok(())
    }

    /// Transform every `.sql` file in `model_dir` into `output_dir`, one
    /// blocking task per file.
    ///
    /// With `fail_fast`, tasks not yet started are cancelled after the first
    /// failure; files already being processed still complete.
    pub async fn process_dir(
        &self,
        model_dir: &Path,
        output_dir: &Path,
        fail_fast: bool,
    ) -> DbtGenResult<BatchReport> {
        if !output_dir.is_dir() {
            return Err(DbtGenError::Config(format!(
                "output directory {} does not exist",
                output_dir.display()
            )));
        }

        let files = sql_files(model_dir)?;
        tracing::info!("Found {} model(s) in {}", files.len(), model_dir.display());

        let mut tasks = JoinSet::new();
        for input in files {
            let Some(file_name) = input.file_name() else {
                continue;
            };
            let output = output_dir.join(file_name);
            let processor = self.clone();
            tasks.spawn_blocking(move || processor.process_file(&input, &output).map(|()| output));
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(DbtGenError::Worker(e.to_string())));
            match result {
                Ok(path) => report.written.push(path),
                Err(err) => {
                    tracing::error!("{}", err);
                    report.failed.push(err);
                    if fail_fast {
                        tasks.abort_all();
                        break;
                    }
                }
            }
        }

        report.written.sort();
        report.failed.sort_by_key(|e| e.to_string());
        Ok(report)
    }
}

/// Outcome of a directory run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<DbtGenError>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The `.sql` files directly inside `dir`, sorted by name.
pub fn sql_files(dir: &Path) -> DbtGenResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| DbtGenError::in_file(dir, e.into()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| DbtGenError::in_file(dir, e.into()))?.path();
        let is_sql = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"));
        if is_sql && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

//! Processing options and the `dbtgen.toml` configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{DbtGenError, DbtGenResult};

/// Flags threaded through the rule applier. Never mutated after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingOptions {
    /// Drop columns prefixed with `_` unless a rule rescues them.
    pub drop_metadata: bool,
    /// Match rules and keep identifiers exactly as written.
    pub case_sensitive: bool,
    /// Split `currencyCode` into `currency_code` (BigQuery/Snowflake only).
    pub split_columns: bool,
    /// Cast `*id` columns to the dialect's integer type (BigQuery/Snowflake only).
    pub id_as_int: bool,
    /// Cast `*_at` columns to the dialect's timestamp type (BigQuery/Snowflake only).
    pub convert_timestamp: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            drop_metadata: true,
            case_sensitive: false,
            split_columns: false,
            id_as_int: false,
            convert_timestamp: false,
        }
    }
}

/// Formatting of the rewritten column list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitOptions {
    pub leading_commas: bool,
}

/// Contents of `dbtgen.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbtGenConfig {
    pub drop_metadata: bool,
    pub case_sensitive: bool,
    pub split_columns: bool,
    pub id_as_int: bool,
    pub convert_timestamp: bool,
    pub leading_commas: bool,
    /// Stop a batch at the first failing model.
    pub fail_fast: bool,
}

impl Default for DbtGenConfig {
    fn default() -> Self {
        let processing = ProcessingOptions::default();
        Self {
            drop_metadata: processing.drop_metadata,
            case_sensitive: processing.case_sensitive,
            split_columns: processing.split_columns,
            id_as_int: processing.id_as_int,
            convert_timestamp: processing.convert_timestamp,
            leading_commas: false,
            fail_fast: false,
        }
    }
}

impl DbtGenConfig {
    pub const FILE_NAME: &'static str = "dbtgen.toml";

    /// Create a new configuration builder
    pub fn builder() -> DbtGenConfigBuilder {
        DbtGenConfigBuilder::default()
    }

    /// Continue building from this configuration.
    pub fn into_builder(self) -> DbtGenConfigBuilder {
        DbtGenConfigBuilder { config: self }
    }

    pub fn from_toml(text: &str) -> DbtGenResult<Self> {
        toml::from_str(text).map_err(|e| DbtGenError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> DbtGenResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| DbtGenError::in_file(path, e.into()))?;
        let config = Self::from_toml(&content).map_err(|e| DbtGenError::in_file(path, e))?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Candidate locations, in priority order: `./dbtgen.toml`, then
    /// `<config dir>/dbtgen/config.toml`.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(Self::FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("dbtgen").join("config.toml"));
        }
        paths
    }

    /// Load the first configuration file found, or the defaults.
    pub fn discover() -> DbtGenResult<Self> {
        match Self::search_paths().into_iter().find(|p| p.is_file()) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn processing(&self) -> ProcessingOptions {
        ProcessingOptions {
            drop_metadata: self.drop_metadata,
            case_sensitive: self.case_sensitive,
            split_columns: self.split_columns,
            id_as_int: self.id_as_int,
            convert_timestamp: self.convert_timestamp,
        }
    }

    pub fn emit(&self) -> EmitOptions {
        EmitOptions {
            leading_commas: self.leading_commas,
        }
    }
}

/// Builder for DbtGenConfig
#[derive(Debug, Default)]
pub struct DbtGenConfigBuilder {
    config: DbtGenConfig,
}

impl DbtGenConfigBuilder {
    pub fn drop_metadata(mut self, value: bool) -> Self {
        self.config.drop_metadata = value;
        self
    }

    pub fn case_sensitive(mut self, value: bool) -> Self {
        self.config.case_sensitive = value;
        self
    }

    pub fn split_columns(mut self, value: bool) -> Self {
        self.config.split_columns = value;
        self
    }

    pub fn id_as_int(mut self, value: bool) -> Self {
        self.config.id_as_int = value;
        self
    }

    pub fn convert_timestamp(mut self, value: bool) -> Self {
        self.config.convert_timestamp = value;
        self
    }

    pub fn leading_commas(mut self, value: bool) -> Self {
        self.config.leading_commas = value;
        self
    }

    pub fn fail_fast(mut self, value: bool) -> Self {
        self.config.fail_fast = value;
        self
    }

    /// Build the configuration
    pub fn build(self) -> DbtGenConfig {
        self.config
    }
}

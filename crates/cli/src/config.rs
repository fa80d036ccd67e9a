use std::path::{Path, PathBuf};

use mojifix_core::error::CoreError;
use mojifix_core::replacement_map::ReplacementMap;
use mojifix_core::target::{validate_batch_size, DEFAULT_BATCH_SIZE};

/// Repair configuration loaded from environment variables.
///
/// Command-line flags take precedence through [`RepairConfig::with_overrides`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairConfig {
    /// PostgreSQL connection string. Required by every database command.
    pub database_url: Option<String>,
    /// Rows per chunk (default: `500`).
    pub batch_size: usize,
    /// JSON replacement map; the built-in map when absent.
    pub map_path: Option<PathBuf>,
}

impl RepairConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var             | Default     |
    /// |---------------------|-------------|
    /// | `DATABASE_URL`      | (none)      |
    /// | `REPAIR_BATCH_SIZE` | `500`       |
    /// | `REPAIR_MAP_PATH`   | (built-in)  |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RepairConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());

        let batch_size = match lookup("REPAIR_BATCH_SIZE") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                CoreError::Config(format!("REPAIR_BATCH_SIZE must be a positive integer, got '{raw}'"))
            })?,
            None => DEFAULT_BATCH_SIZE,
        };
        validate_batch_size(batch_size).map_err(|e| CoreError::Config(e.to_string()))?;

        let map_path = lookup("REPAIR_MAP_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            database_url,
            batch_size,
            map_path,
        })
    }

    /// Apply command-line flags on top of the environment.
    pub fn with_overrides(
        mut self,
        database_url: Option<String>,
        batch_size: Option<usize>,
        map_path: Option<PathBuf>,
    ) -> Result<Self, CoreError> {
        if let Some(url) = database_url {
            self.database_url = Some(url);
        }
        if let Some(size) = batch_size {
            validate_batch_size(size).map_err(|e| CoreError::Config(e.to_string()))?;
            self.batch_size = size;
        }
        if let Some(path) = map_path {
            self.map_path = Some(path);
        }
        Ok(self)
    }

    pub fn database_url(&self) -> Result<&str, CoreError> {
        self.database_url.as_deref().ok_or_else(|| {
            CoreError::Config("DATABASE_URL must be set (or pass --database-url)".to_string())
        })
    }

    /// The configured map file, or the built-in map.
    pub fn load_map(&self) -> Result<ReplacementMap, CoreError> {
        match &self.map_path {
            Some(path) => load_map_file(path),
            None => ReplacementMap::canonical(),
        }
    }
}

fn load_map_file(path: &Path) -> Result<ReplacementMap, CoreError> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        CoreError::Config(format!("Cannot read replacement map {}: {e}", path.display()))
    })?;
    let map = ReplacementMap::from_json_str(&json)?;
    tracing::info!(path = %path.display(), entries = map.len(), "Loaded replacement map");
    Ok(map)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

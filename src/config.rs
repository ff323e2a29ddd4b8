use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine configuration, loadable from a JSON file with per-field defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database holding the operation log.
    pub db_path: PathBuf,
    /// Directory for soft-deleted files pending the retention window.
    pub holding_dir: PathBuf,
    /// Days a soft-deleted file stays recoverable.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Maximum undo stack depth; older entries stay queryable but are not
    /// reachable through undo.
    #[serde(default = "default_stack_depth")]
    pub stack_depth: usize,
    /// Hours between automatic cleanup passes.
    #[serde(default = "default_autoclean_interval_hours")]
    pub autoclean_interval_hours: u32,
    /// Retention bound applied by automatic cleanup, in days.
    #[serde(default)]
    pub cleanup_max_age_days: Option<u32>,
    /// Record-count bound applied by automatic cleanup.
    #[serde(default)]
    pub cleanup_max_count: Option<usize>,
    /// Store-size bound applied by automatic cleanup, in bytes.
    #[serde(default)]
    pub cleanup_max_size_bytes: Option<u64>,
}

fn default_retention_days() -> u32 {
    30
}

fn default_stack_depth() -> usize {
    1000
}

fn default_autoclean_interval_hours() -> u32 {
    24
}

impl Config {
    /// Defaults rooted under `base` (typically `~/.oplog` or a per-project
    /// directory).
    pub fn with_base(base: &Path) -> Self {
        Self {
            db_path: base.join("oplog.db"),
            holding_dir: base.join("holding"),
            retention_days: default_retention_days(),
            stack_depth: default_stack_depth(),
            autoclean_interval_hours: default_autoclean_interval_hours(),
            cleanup_max_age_days: None,
            cleanup_max_count: None,
            cleanup_max_size_bytes: None,
        }
    }

    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open config {}", path.display()))?;
        let reader = std::io::BufReader::new(file);
        let config = serde_json::from_reader(reader)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }
}

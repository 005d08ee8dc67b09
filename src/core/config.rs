use std::path::{Path, PathBuf};

use tracing::warn;

use crate::core::errors::{GraphError, Result};

/// Which buffering backend groups stream updates by source vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferingSystem {
    /// In-memory sharded gutters, one per vertex.
    Standalone,
    /// Disk-backed gutter tree under `disk_directory`.
    Tree,
}

/// Engine configuration, read once at construction.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Buffering backend for the update stream.
    pub buffering_system: BufferingSystem,

    /// Snapshot backend for resumable queries: clone supernodes in memory,
    /// or serialize them to a backup file in `disk_directory`.
    pub snapshot_in_memory: bool,

    /// Location for the gutter tree and the supernode backup file.
    pub disk_directory: PathBuf,

    /// Number of worker threads applying buffered batches to supernodes.
    pub num_workers: usize,

    /// Updates buffered per source vertex before a batch is emitted.
    pub gutter_capacity: usize,

    /// Sketch failure factor; bucket depth grows with `log2` of this.
    pub sketch_fail_factor: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            buffering_system: BufferingSystem::Standalone,
            snapshot_in_memory: true,
            disk_directory: PathBuf::from("."),
            num_workers: 4,
            gutter_capacity: 64,
            sketch_fail_factor: 100,
        }
    }
}

impl GraphConfig {
    /// Parse a `key=value` configuration file.
    ///
    /// Recognized keys: `buffering_system` (`standalone` | `tree`),
    /// `snapshot_in_memory`, `disk_directory`, `num_workers`,
    /// `gutter_capacity`, `sketch_fail_factor`. Blank lines and lines
    /// starting with `#` are skipped; unknown keys are logged and ignored.
    pub fn from_file(path: &Path) -> Result<GraphConfig> {
        let contents = std::fs::read_to_string(path).map_err(|e| GraphError::ConfigError {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut config = GraphConfig::default();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| GraphError::ConfigError {
                message: format!("malformed line in {}: {:?}", path.display(), line),
            })?;
            let key = key.trim();
            let value = value.trim();
            match key {
                "buffering_system" => {
                    config.buffering_system = match value {
                        "standalone" => BufferingSystem::Standalone,
                        "tree" => BufferingSystem::Tree,
                        other => {
                            return Err(GraphError::ConfigError {
                                message: format!("unknown buffering_system {:?}", other),
                            })
                        }
                    }
                }
                "snapshot_in_memory" => config.snapshot_in_memory = parse_bool(key, value)?,
                "disk_directory" => config.disk_directory = PathBuf::from(value),
                "num_workers" => config.num_workers = parse_num(key, value)?,
                "gutter_capacity" => config.gutter_capacity = parse_num(key, value)?,
                "sketch_fail_factor" => config.sketch_fail_factor = parse_num(key, value)?,
                unknown => warn!(key = unknown, "ignoring unrecognized configuration key"),
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(GraphError::ConfigError {
                message: "num_workers must be at least 1".to_string(),
            });
        }
        if self.gutter_capacity == 0 {
            return Err(GraphError::ConfigError {
                message: "gutter_capacity must be at least 1".to_string(),
            });
        }
        if self.sketch_fail_factor < 2 {
            return Err(GraphError::ConfigError {
                message: "sketch_fail_factor must be at least 2".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" | "on" => Ok(true),
        "false" | "0" | "off" => Ok(false),
        other => Err(GraphError::ConfigError {
            message: format!("{} expects a boolean, got {:?}", key, other),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| GraphError::ConfigError {
        message: format!("{} expects a number, got {:?}", key, value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = GraphConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffering_system, BufferingSystem::Standalone);
        assert!(config.snapshot_in_memory);
    }

    #[test]
    fn test_from_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# streaming engine configuration").unwrap();
        writeln!(file, "buffering_system=tree").unwrap();
        writeln!(file, "snapshot_in_memory=false").unwrap();
        writeln!(file, "disk_directory=/tmp/gutters").unwrap();
        writeln!(file, "num_workers=8").unwrap();
        writeln!(file, "mystery_knob=42").unwrap();
        file.flush().unwrap();

        let config = GraphConfig::from_file(file.path()).unwrap();
        assert_eq!(config.buffering_system, BufferingSystem::Tree);
        assert!(!config.snapshot_in_memory);
        assert_eq!(config.disk_directory, PathBuf::from("/tmp/gutters"));
        assert_eq!(config.num_workers, 8);
        // untouched keys keep their defaults
        assert_eq!(config.gutter_capacity, 64);
    }

    #[test]
    fn test_from_file_rejects_bad_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "buffering_system=ring").unwrap();
        file.flush().unwrap();
        assert!(GraphConfig::from_file(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "num_workers=many").unwrap();
        file.flush().unwrap();
        assert!(GraphConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = GraphConfig::default();
        config.num_workers = 0;
        assert!(config.validate().is_err());
    }
}

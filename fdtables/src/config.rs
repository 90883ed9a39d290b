use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::scanner::ScanOptions;
use crate::export::{DEFAULT_BINARY_PATH, DEFAULT_TEXT_PATH};

/// Configuration loaded from ~/.config/fdtables/config.toml.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Directory laid out like /proc.
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
    /// Processes resolved concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Per-process resolution timeout in milliseconds, 0 to disable.
    #[serde(default)]
    pub timeout_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            proc_root: default_proc_root(),
            workers: default_workers(),
            timeout_ms: 0,
        }
    }
}

impl ScanConfig {
    pub fn options(&self) -> ScanOptions {
        ScanOptions {
            workers: self.workers.max(1),
            timeout: (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms)),
        }
    }
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

fn default_workers() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_text_path")]
    pub text_path: PathBuf,
    #[serde(default = "default_binary_path")]
    pub binary_path: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            text_path: default_text_path(),
            binary_path: default_binary_path(),
        }
    }
}

fn default_text_path() -> PathBuf {
    PathBuf::from(DEFAULT_TEXT_PATH)
}

fn default_binary_path() -> PathBuf {
    PathBuf::from(DEFAULT_BINARY_PATH)
}

impl Config {
    /// Load config from the default path, or return defaults if not found.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading config from {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("parsing config from {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("fdtables")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.scan.proc_root, PathBuf::from("/proc"));
        assert_eq!(config.export.text_path, PathBuf::from("compositeTable.txt"));
        assert_eq!(config.scan.options(), ScanOptions::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scan]\nworkers = 8\ntimeout_ms = 250\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.scan.workers, 8);
        assert_eq!(config.scan.proc_root, PathBuf::from("/proc"));
        assert_eq!(config.export, ExportConfig::default());
        assert_eq!(
            config.scan.options(),
            ScanOptions {
                workers: 8,
                timeout: Some(Duration::from_millis(250)),
            }
        );
    }

    #[test]
    fn zero_workers_means_sequential() {
        let scan = ScanConfig {
            workers: 0,
            ..ScanConfig::default()
        };
        assert_eq!(scan.options().workers, 1);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scan]\nworkers = \"many\"\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing config"));
    }
}

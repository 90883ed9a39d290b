use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// A directory laid out like Linux `/proc`.
///
/// Everything the scanner reads goes through this root, so tests can point
/// it at a fake tree.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn process_dir(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    pub fn status_path(&self, pid: u32) -> PathBuf {
        self.process_dir(pid).join("status")
    }

    pub fn fd_dir(&self, pid: u32) -> PathBuf {
        self.process_dir(pid).join("fd")
    }

    /// List every process id visible under the root.
    ///
    /// Only entries whose name is a positive integer count. Failure to read
    /// the root itself is fatal; a single unreadable entry is ignored.
    pub fn list_pids(&self) -> Result<Vec<u32>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("reading {}", self.root.display()))?;

        let pids = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| parse_pid(e.file_name().to_str()?))
            .collect();
        Ok(pids)
    }
}

fn parse_pid(name: &str) -> Option<u32> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    name.parse().ok().filter(|&pid| pid > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_names() {
        assert_eq!(parse_pid("1"), Some(1));
        assert_eq!(parse_pid("4242"), Some(4242));
        assert_eq!(parse_pid("0"), None);
        assert_eq!(parse_pid("self"), None);
        assert_eq!(parse_pid("12a"), None);
        assert_eq!(parse_pid("-3"), None);
        assert_eq!(parse_pid(""), None);
        assert_eq!(parse_pid("99999999999"), None);
    }

    #[test]
    fn lists_only_numeric_entries() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["1", "27", "self", "sys", "0"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("uptime"), "1.0 2.0").unwrap();

        let mut pids = ProcFs::new(dir.path()).list_pids().unwrap();
        pids.sort_unstable();
        assert_eq!(pids, vec![1, 27]);
    }

    #[test]
    fn missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let procfs = ProcFs::new(dir.path().join("nope"));
        let err = procfs.list_pids().unwrap_err();
        assert!(format!("{err:#}").contains("nope"));
    }
}

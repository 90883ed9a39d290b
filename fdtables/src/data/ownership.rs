use std::fmt;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;

use super::procfs::ProcFs;

/// Result of checking a process against the invoking user.
///
/// Only `Owned` lets a process through. Descriptor targets can reveal what
/// other users are doing, so anything we cannot confirm is treated as not
/// ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    NotOwned { uid: u32 },
    Unavailable(io::ErrorKind),
}

impl Ownership {
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned)
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owned => write!(f, "owned"),
            Self::NotOwned { uid } => write!(f, "owned by uid {uid}"),
            Self::Unavailable(kind) => write!(f, "owner unavailable ({kind})"),
        }
    }
}

/// Check the owner of `<proc>/<pid>/status` against `uid`.
pub fn check(procfs: &ProcFs, pid: u32, uid: u32) -> Ownership {
    match fs::metadata(procfs.status_path(pid)) {
        Ok(meta) if meta.uid() == uid => Ownership::Owned,
        Ok(meta) => Ownership::NotOwned { uid: meta.uid() },
        Err(e) => Ownership::Unavailable(e.kind()),
    }
}

/// Uid of the user running this program.
pub fn invoking_uid() -> u32 {
    nix::unistd::getuid().as_raw()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_status_file_is_owned() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("10")).unwrap();
        fs::write(dir.path().join("10/status"), "Name:\tcat\n").unwrap();
        let procfs = ProcFs::new(dir.path());

        assert_eq!(check(&procfs, 10, invoking_uid()), Ownership::Owned);
    }

    #[test]
    fn other_uid_is_not_owned() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("10")).unwrap();
        fs::write(dir.path().join("10/status"), "Name:\tcat\n").unwrap();
        let procfs = ProcFs::new(dir.path());

        let other = invoking_uid().wrapping_add(1);
        let result = check(&procfs, 10, other);
        assert_eq!(result, Ownership::NotOwned { uid: invoking_uid() });
        assert!(!result.is_owned());
    }

    #[test]
    fn vanished_process_is_not_owned() {
        let dir = tempfile::tempdir().unwrap();
        let procfs = ProcFs::new(dir.path());

        let result = check(&procfs, 77, invoking_uid());
        assert_eq!(result, Ownership::Unavailable(io::ErrorKind::NotFound));
        assert!(!result.is_owned());
    }
}

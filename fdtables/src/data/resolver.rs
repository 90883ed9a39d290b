use std::fmt;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use fdtables_common::{cap_target, DescriptorRecord};

use super::procfs::ProcFs;

/// Why a single descriptor entry produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Directory entry whose name is not a descriptor number.
    NotADescriptor,
    /// The directory entry itself could not be read.
    EntryUnreadable(io::ErrorKind),
    /// readlink failed, usually because the descriptor closed meanwhile.
    LinkUnreadable(io::ErrorKind),
    /// stat on the link target failed.
    MetadataUnavailable(io::ErrorKind),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotADescriptor => write!(f, "not a descriptor"),
            Self::EntryUnreadable(kind) => write!(f, "entry unreadable ({kind})"),
            Self::LinkUnreadable(kind) => write!(f, "readlink failed ({kind})"),
            Self::MetadataUnavailable(kind) => write!(f, "stat failed ({kind})"),
        }
    }
}

/// Outcome for one entry of a process's descriptor table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Record {
        record: DescriptorRecord,
        /// The target was longer than the buffer and got cut.
        truncated: bool,
    },
    Skipped {
        entry: String,
        reason: SkipReason,
    },
}

/// Walk `<proc>/<pid>/fd` and resolve every entry.
///
/// Only failure to open the descriptor table fails the whole call. Every
/// entry read from it yields a [`Resolution`], in directory order.
pub fn resolve_process(procfs: &ProcFs, pid: u32) -> io::Result<Vec<Resolution>> {
    let fd_dir = procfs.fd_dir(pid);
    let entries = fs::read_dir(&fd_dir)?;

    let mut out = Vec::new();
    for entry in entries {
        let resolution = match entry {
            Ok(entry) => {
                let name = entry.file_name().to_string_lossy().into_owned();
                resolve_entry(pid, &fd_dir, name)
            }
            Err(e) => Resolution::Skipped {
                entry: String::from("?"),
                reason: SkipReason::EntryUnreadable(e.kind()),
            },
        };
        if let Resolution::Skipped { entry, reason } = &resolution {
            log::debug!("pid {pid}: skipping fd entry {entry}: {reason}");
        }
        out.push(resolution);
    }
    Ok(out)
}

fn resolve_entry(pid: u32, fd_dir: &Path, name: String) -> Resolution {
    let fd = match parse_fd(&name) {
        Some(fd) => fd,
        None => {
            return Resolution::Skipped {
                entry: name,
                reason: SkipReason::NotADescriptor,
            }
        }
    };

    let link = fd_dir.join(&name);
    let mut target = match fs::read_link(&link) {
        Ok(t) => t.to_string_lossy().into_owned(),
        Err(e) => {
            return Resolution::Skipped {
                entry: name,
                reason: SkipReason::LinkUnreadable(e.kind()),
            }
        }
    };
    let truncated = cap_target(&mut target);

    // Follows the link, so sockets and pipes report their own inode
    let inode = match fs::metadata(&link) {
        Ok(meta) => meta.ino(),
        Err(e) => {
            return Resolution::Skipped {
                entry: name,
                reason: SkipReason::MetadataUnavailable(e.kind()),
            }
        }
    };

    Resolution::Record {
        record: DescriptorRecord {
            pid,
            fd,
            target,
            inode,
        },
        truncated,
    }
}

fn parse_fd(name: &str) -> Option<u32> {
    if name == "." || name == ".." || name.is_empty() {
        return None;
    }
    if !name.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

//! Shared descriptor record type and the binary export layout.
//!
//! The binary layout is a flat concatenation of records with no header and
//! no record count. Each record is:
//!
//! | field  | width                | notes                          |
//! |--------|----------------------|--------------------------------|
//! | pid    | 4 bytes, signed      |                                |
//! | fd     | 4 bytes, signed      |                                |
//! | len    | `usize`              | target length including NUL    |
//! | target | `len` bytes          | NUL-terminated                 |
//! | inode  | `usize`              |                                |
//!
//! All integers are written in native byte order without padding, so a file
//! is only readable on a machine with the same word size and endianness as
//! the one that wrote it. Readers stop at end-of-file.

use std::io::{self, Read, Write};

/// Capacity of the target buffer, terminator included. At most
/// `TARGET_PATH_MAX - 1` bytes of target text are kept.
pub const TARGET_PATH_MAX: usize = 1024;

/// One open file descriptor observed during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorRecord {
    /// Process that held the descriptor at scan time.
    pub pid: u32,
    /// Process-local descriptor number.
    pub fd: u32,
    /// Resolved link target (path, `pipe:[N]`, `socket:[N]`, device).
    pub target: String,
    /// Inode of the target at resolution time.
    pub inode: u64,
}

impl DescriptorRecord {
    pub fn new(pid: u32, fd: u32, target: impl Into<String>, inode: u64) -> Self {
        Self {
            pid,
            fd,
            target: target.into(),
            inode,
        }
    }
}

/// Truncate `target` so it fits the target buffer with its terminator.
/// Cuts on a character boundary. Returns true when anything was dropped.
pub fn cap_target(target: &mut String) -> bool {
    let limit = TARGET_PATH_MAX - 1;
    if target.len() <= limit {
        return false;
    }
    let mut end = limit;
    while !target.is_char_boundary(end) {
        end -= 1;
    }
    target.truncate(end);
    true
}

/// Append one record to `out` in the binary layout.
pub fn write_record<W: Write>(out: &mut W, record: &DescriptorRecord) -> io::Result<()> {
    let pid = i32::try_from(record.pid)
        .map_err(|_| invalid_data(format!("pid {} does not fit in i32", record.pid)))?;
    let fd = i32::try_from(record.fd)
        .map_err(|_| invalid_data(format!("fd {} does not fit in i32", record.fd)))?;
    let inode = usize::try_from(record.inode)
        .map_err(|_| invalid_data(format!("inode {} does not fit in usize", record.inode)))?;

    out.write_all(&pid.to_ne_bytes())?;
    out.write_all(&fd.to_ne_bytes())?;
    out.write_all(&(record.target.len() + 1).to_ne_bytes())?;
    out.write_all(record.target.as_bytes())?;
    out.write_all(&[0u8])?;
    out.write_all(&inode.to_ne_bytes())?;
    Ok(())
}

/// Iterates records from a binary export until end-of-file.
///
/// A file that ends in the middle of a record yields one
/// `UnexpectedEof` error and then stops.
pub struct RecordReader<R> {
    inner: R,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }

    fn read_record(&mut self) -> io::Result<Option<DescriptorRecord>> {
        let mut pid = [0u8; 4];
        if !read_exact_or_eof(&mut self.inner, &mut pid)? {
            return Ok(None);
        }
        let pid = i32::from_ne_bytes(pid);

        let mut fd = [0u8; 4];
        self.inner.read_exact(&mut fd)?;
        let fd = i32::from_ne_bytes(fd);

        let len = self.read_word()?;
        if len == 0 || len > TARGET_PATH_MAX {
            return Err(invalid_data(format!("target length {len} out of range")));
        }
        let mut target = vec![0u8; len];
        self.inner.read_exact(&mut target)?;
        if target.pop() != Some(0) {
            return Err(invalid_data("target is not NUL-terminated".to_string()));
        }
        let target = String::from_utf8(target)
            .map_err(|e| invalid_data(format!("target is not UTF-8: {e}")))?;

        let inode = self.read_word()?;

        let pid = u32::try_from(pid).map_err(|_| invalid_data(format!("negative pid {pid}")))?;
        let fd = u32::try_from(fd).map_err(|_| invalid_data(format!("negative fd {fd}")))?;

        Ok(Some(DescriptorRecord {
            pid,
            fd,
            target,
            inode: inode as u64,
        }))
    }

    fn read_word(&mut self) -> io::Result<usize> {
        let mut buf = [0u8; std::mem::size_of::<usize>()];
        self.inner.read_exact(&mut buf)?;
        Ok(usize::from_ne_bytes(buf))
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = io::Result<DescriptorRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Fill `buf` completely, or return false if the reader was already at
/// end-of-file. EOF after a partial read is an error.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated record header",
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

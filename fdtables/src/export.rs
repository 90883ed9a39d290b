//! Persisted copies of the composite table.
//!
//! The binary layout is described in `fdtables_common`. It depends on the
//! word size and byte order of the machine that wrote it.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::data::inventory::{Inventory, PidFilter};
use crate::views;

pub const DEFAULT_TEXT_PATH: &str = "compositeTable.txt";
pub const DEFAULT_BINARY_PATH: &str = "compositeTable.bin";

/// Composite layout, same as the on-screen view.
pub fn write_text<W: Write>(out: &mut W, inv: &Inventory, filter: PidFilter) -> io::Result<()> {
    views::write_composite(out, inv, filter)
}

/// Flat concatenation of binary records for every included descriptor.
pub fn write_binary<W: Write>(out: &mut W, inv: &Inventory, filter: PidFilter) -> io::Result<()> {
    for record in inv.filtered(filter) {
        fdtables_common::write_record(out, record)?;
    }
    Ok(())
}

pub fn save_text(path: &Path, inv: &Inventory, filter: PidFilter) -> Result<()> {
    save_with(path, |out| write_text(out, inv, filter))
}

pub fn save_binary(path: &Path, inv: &Inventory, filter: PidFilter) -> Result<()> {
    save_with(path, |out| write_binary(out, inv, filter))
}

/// Create `path` and fill it with `write`. A failed write removes the
/// file, so a partial export never looks complete.
fn save_with<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    let written = write(&mut out).and_then(|()| out.flush());
    drop(out);

    if let Err(e) = written {
        if let Err(rm) = fs::remove_file(path) {
            log::warn!("removing partial {}: {rm}", path.display());
        }
        return Err(e).with_context(|| format!("writing {}", path.display()));
    }
    log::info!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use fdtables_common::{DescriptorRecord, RecordReader};

    fn inventory() -> Inventory {
        Inventory::from(vec![
            DescriptorRecord::new(10, 3, "/tmp/a", 55),
            DescriptorRecord::new(10, 4, "/tmp/b", 56),
            DescriptorRecord::new(12, 0, "/dev/pts/3", 6),
            DescriptorRecord::new(12, 9, "anon_inode:[eventfd]", 1057),
        ])
    }

    fn read_back(path: &Path) -> Vec<DescriptorRecord> {
        let file = File::open(path).unwrap();
        RecordReader::new(io::BufReader::new(file))
            .collect::<io::Result<_>>()
            .unwrap()
    }

    #[test]
    fn binary_export_reads_back_as_written() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory();

        let all = dir.path().join("all.bin");
        save_binary(&all, &inv, PidFilter::All).unwrap();
        assert_eq!(read_back(&all), inv.records());

        let one = dir.path().join("one.bin");
        save_binary(&one, &inv, PidFilter::Pid(12)).unwrap();
        let expected: Vec<DescriptorRecord> = inv.filtered(PidFilter::Pid(12)).cloned().collect();
        assert_eq!(read_back(&one), expected);
    }

    #[test]
    fn empty_selection_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("none.bin");
        save_binary(&path, &inventory(), PidFilter::Pid(404)).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn text_export_matches_composite_view() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory();
        let path = dir.path().join("table.txt");
        save_text(&path, &inv, PidFilter::Pid(10)).unwrap();

        let mut shown = Vec::new();
        views::write_composite(&mut shown, &inv, PidFilter::Pid(10)).unwrap();
        assert_eq!(fs::read(&path).unwrap(), shown);
    }

    #[test]
    fn failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.bin");
        let err = save_with(&path, |out| {
            write_binary(out, &inventory(), PidFilter::All)?;
            Err(io::Error::new(io::ErrorKind::InvalidData, "inode too wide"))
        })
        .unwrap_err();

        assert!(format!("{err:#}").contains("inode too wide"));
        assert!(!path.exists());
    }

    #[test]
    fn unopenable_destination_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("table.txt");
        let err = save_text(&path, &inventory(), PidFilter::All).unwrap_err();
        assert!(format!("{err:#}").contains("missing-dir"));
        assert!(!path.exists());
    }
}

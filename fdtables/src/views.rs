//! Text views over a finished inventory.
//!
//! Every view only reads the inventory and writes to the given sink, so
//! each can run any number of times against the same snapshot.

use std::io::{self, Write};

use fdtables_common::DescriptorRecord;

use crate::data::inventory::{Inventory, PidFilter};

const WIDE_RULE: &str = "\t\t===============================================";
const NARROW_RULE: &str = "\t\t============";

/// The tabular views selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    PerProcess,
    SystemWide,
    Vnodes,
    Composite,
}

impl View {
    /// All tabular views in the order they are printed.
    pub fn all() -> &'static [View] {
        &[Self::PerProcess, Self::SystemWide, Self::Vnodes, Self::Composite]
    }

    pub fn write<W: Write>(
        self,
        out: &mut W,
        inv: &Inventory,
        filter: PidFilter,
    ) -> io::Result<()> {
        match self {
            Self::PerProcess => write_per_process(out, inv, filter),
            Self::SystemWide => write_system_wide(out, inv, filter),
            Self::Vnodes => write_vnodes(out, inv, filter),
            Self::Composite => write_composite(out, inv, filter),
        }
    }
}

/// Full records. With no filter, rows are numbered from 0; with a pid
/// filter only that process's rows are shown, unnumbered.
pub fn write_composite<W: Write>(
    out: &mut W,
    inv: &Inventory,
    filter: PidFilter,
) -> io::Result<()> {
    writeln!(out, "\t\tPID\tFD\tFilename\tInode ")?;
    writeln!(out, "{WIDE_RULE}")?;
    match filter {
        PidFilter::All => {
            for (i, r) in inv.iter().enumerate() {
                writeln!(out, "{i}\t\t{} \t{} \t{} \t{}", r.pid, r.fd, r.target, r.inode)?;
            }
        }
        PidFilter::Pid(_) => {
            for r in inv.filtered(filter) {
                writeln!(out, "\t\t{} \t{} \t{} \t{}", r.pid, r.fd, r.target, r.inode)?;
            }
        }
    }
    writeln!(out, "{WIDE_RULE}")
}

pub fn write_per_process<W: Write>(
    out: &mut W,
    inv: &Inventory,
    filter: PidFilter,
) -> io::Result<()> {
    writeln!(out, "\t\tPID\tFD ")?;
    writeln!(out, "{NARROW_RULE}")?;
    for r in inv.filtered(filter) {
        writeln!(out, "\t\t{} \t{}", r.pid, r.fd)?;
    }
    writeln!(out, "{NARROW_RULE}")
}

pub fn write_system_wide<W: Write>(
    out: &mut W,
    inv: &Inventory,
    filter: PidFilter,
) -> io::Result<()> {
    writeln!(out, "\t\tPID\tFD\tFilename ")?;
    writeln!(out, "{WIDE_RULE}")?;
    for r in inv.filtered(filter) {
        writeln!(out, "\t\t{} \t{} \t{}", r.pid, r.fd, r.target)?;
    }
    writeln!(out, "{WIDE_RULE}")
}

pub fn write_vnodes<W: Write>(
    out: &mut W,
    inv: &Inventory,
    filter: PidFilter,
) -> io::Result<()> {
    writeln!(out, "\t\tFD\t\tInode ")?;
    writeln!(out, "{WIDE_RULE}")?;
    for r in inv.filtered(filter) {
        writeln!(out, "\t\t{} \t\t{}", r.fd, r.inode)?;
    }
    writeln!(out, "{WIDE_RULE}")
}

/// Records whose descriptor number exceeds `threshold`, across the whole
/// inventory regardless of any pid filter.
pub fn offenders(inv: &Inventory, threshold: i64) -> impl Iterator<Item = &DescriptorRecord> {
    inv.iter().filter(move |r| i64::from(r.fd) > threshold)
}

/// Alarm report: `pid(fd)` entries joined by commas on one line.
pub fn write_threshold<W: Write>(out: &mut W, inv: &Inventory, threshold: i64) -> io::Result<()> {
    writeln!(out, "## Offending processes -- #FD Threshold={threshold}")?;
    let line = offenders(inv, threshold)
        .map(|r| format!("{}({})", r.pid, r.fd))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(out, "{line}")
}

//! Reader for binary composite-table exports.
//!
//! Prints every record in the composite layout and exits non-zero if the
//! file ends in the middle of a record. The file must come from a machine
//! with the same word size and byte order.
//!
//! Run: ./target/release/fdtables-decode compositeTable.bin

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use fdtables::{DescriptorRecord, Inventory, PidFilter};
use fdtables_common::RecordReader;

#[derive(Parser)]
#[command(name = "fdtables-decode", about = "Print a binary fdtables export")]
struct Cli {
    /// Export to read
    #[arg(default_value = fdtables::export::DEFAULT_BINARY_PATH)]
    file: PathBuf,

    /// Only show this process (0 = all)
    #[arg(long, default_value_t = 0)]
    pid: u32,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let file = File::open(&cli.file)
        .with_context(|| format!("opening {}", cli.file.display()))?;

    let mut records: Vec<DescriptorRecord> = Vec::new();
    let mut error = None;
    for item in RecordReader::new(BufReader::new(file)) {
        match item {
            Ok(record) => records.push(record),
            Err(e) => error = Some(e),
        }
    }
    log::info!("{}: {} records", cli.file.display(), records.len());

    let inventory = Inventory::from(records);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    fdtables::views::write_composite(&mut out, &inventory, PidFilter::from(cli.pid))?;
    out.flush()?;

    if let Some(e) = error {
        return Err(e).with_context(|| {
            format!(
                "{} is malformed after record {}",
                cli.file.display(),
                inventory.len()
            )
        });
    }
    Ok(())
}

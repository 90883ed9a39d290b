use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use fdtables::config::Config;
use fdtables::data::ownership;
use fdtables::data::procfs::ProcFs;
use fdtables::export;
use fdtables::views::{self, View};
use fdtables::{Inventory, PidFilter, Scanner};

#[derive(Parser, Debug)]
#[command(
    name = "fdtables",
    about = "Show the open file descriptors of your own processes"
)]
struct Cli {
    /// Only show this process (0 = all)
    pid: Option<u32>,

    /// Show pid, fd, target and inode
    #[arg(long)]
    composite: bool,

    /// Show pid and fd
    #[arg(long)]
    per_process: bool,

    /// Show pid, fd and target
    #[arg(long, alias = "systemWide")]
    system_wide: bool,

    /// Show fd and inode
    #[arg(long, alias = "Vnodes")]
    vnodes: bool,

    /// List every process holding a descriptor numbered above N
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    threshold: Option<i64>,

    /// Save the composite table as text
    #[arg(long, alias = "output_TXT")]
    output_txt: bool,

    /// Save the composite table in binary form
    #[arg(long, alias = "output_binary")]
    output_binary: bool,

    /// Resolve this many processes concurrently
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Give up on a process after this many milliseconds (0 = never)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Read processes from this directory instead of /proc
    #[arg(long, value_name = "DIR")]
    proc_root: Option<PathBuf>,
}

impl Cli {
    fn filter(&self) -> PidFilter {
        PidFilter::from(self.pid.unwrap_or(0))
    }

    /// Tabular views to print, in print order.
    ///
    /// Explicit view flags win. Without any, a pid filter prints every
    /// view for that process; a bare invocation prints the composite table;
    /// a threshold or export request on its own prints no table.
    fn views(&self) -> Vec<View> {
        let selected: Vec<View> = [
            (self.per_process, View::PerProcess),
            (self.system_wide, View::SystemWide),
            (self.vnodes, View::Vnodes),
            (self.composite, View::Composite),
        ]
        .into_iter()
        .filter_map(|(on, view)| on.then_some(view))
        .collect();

        if !selected.is_empty() {
            return selected;
        }
        if self.filter() != PidFilter::All {
            return View::all().to_vec();
        }
        if self.threshold.is_some() || self.output_txt || self.output_binary {
            return Vec::new();
        }
        vec![View::Composite]
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut config = Config::load().unwrap_or_else(|e| {
        log::warn!("{e:#}; using defaults");
        Config::default()
    });

    // CLI overrides
    if let Some(workers) = cli.workers {
        config.scan.workers = workers;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.scan.timeout_ms = timeout_ms;
    }
    if let Some(root) = &cli.proc_root {
        config.scan.proc_root = root.clone();
    }

    let scanner = Scanner::new(
        ProcFs::new(&config.scan.proc_root),
        ownership::invoking_uid(),
        config.scan.options(),
    );
    let (inventory, report) = scanner.scan()?;
    log::debug!("{report:?}");

    let stdout = io::stdout();
    emit(&cli, &config, &inventory, &mut stdout.lock());

    Ok(())
}

/// Print the requested tables, then write the requested exports.
///
/// A failure on either side is reported and the rest carries on.
fn emit<W: Write>(cli: &Cli, config: &Config, inventory: &Inventory, out: &mut W) {
    let filter = cli.filter();

    if let Err(e) = print_tables(cli, inventory, out) {
        log::error!("writing output failed: {e}");
        eprintln!("fdtables: writing output failed: {e}");
    }

    if cli.output_txt {
        if let Err(e) = export::save_text(&config.export.text_path, inventory, filter) {
            log::error!("text export failed: {e:#}");
            eprintln!("fdtables: text export failed: {e:#}");
        }
    }
    if cli.output_binary {
        if let Err(e) = export::save_binary(&config.export.binary_path, inventory, filter) {
            log::error!("binary export failed: {e:#}");
            eprintln!("fdtables: binary export failed: {e:#}");
        }
    }
}

fn print_tables<W: Write>(cli: &Cli, inventory: &Inventory, out: &mut W) -> io::Result<()> {
    let filter = cli.filter();
    if let PidFilter::Pid(pid) = filter {
        writeln!(out, "target PID is: {pid}")?;
    }
    for view in cli.views() {
        view.write(out, inventory, filter)?;
    }
    if let Some(threshold) = cli.threshold {
        views::write_threshold(out, inventory, threshold)?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["fdtables"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn bare_invocation_prints_composite() {
        let cli = parse(&[]);
        assert_eq!(cli.filter(), PidFilter::All);
        assert_eq!(cli.views(), vec![View::Composite]);
    }

    #[test]
    fn pid_alone_prints_every_view() {
        let cli = parse(&["4242"]);
        assert_eq!(cli.filter(), PidFilter::Pid(4242));
        assert_eq!(cli.views(), View::all().to_vec());
    }

    #[test]
    fn pid_zero_is_all() {
        let cli = parse(&["0"]);
        assert_eq!(cli.filter(), PidFilter::All);
        assert_eq!(cli.views(), vec![View::Composite]);
    }

    #[test]
    fn explicit_views_keep_print_order() {
        let cli = parse(&["--composite", "--vnodes", "--per-process"]);
        assert_eq!(
            cli.views(),
            vec![View::PerProcess, View::Vnodes, View::Composite]
        );
    }

    #[test]
    fn legacy_spellings_are_accepted() {
        let cli = parse(&["--systemWide", "--Vnodes", "--output_TXT", "--output_binary"]);
        assert!(cli.system_wide && cli.vnodes && cli.output_txt && cli.output_binary);
    }

    #[test]
    fn threshold_alone_prints_only_the_alarm() {
        let cli = parse(&["--threshold=5"]);
        assert_eq!(cli.threshold, Some(5));
        assert!(cli.views().is_empty());
    }

    #[test]
    fn threshold_with_pid_keeps_pid_views() {
        let cli = parse(&["--threshold=5", "10"]);
        assert_eq!(cli.views(), View::all().to_vec());
        assert_eq!(cli.threshold, Some(5));
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn exports_run_when_stdout_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.export.text_path = dir.path().join("table.txt");
        config.export.binary_path = dir.path().join("table.bin");
        let inventory = Inventory::from(vec![
            fdtables::DescriptorRecord::new(10, 3, "/tmp/a", 55),
            fdtables::DescriptorRecord::new(10, 4, "/tmp/b", 56),
        ]);

        let cli = parse(&["--composite", "--output-txt", "--output-binary"]);
        emit(&cli, &config, &inventory, &mut ClosedPipe);

        assert!(config.export.text_path.exists());
        assert!(config.export.binary_path.exists());
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(Cli::try_parse_from(["fdtables", "--bogus"]).is_err());
        assert!(Cli::try_parse_from(["fdtables", "abc"]).is_err());
    }
}

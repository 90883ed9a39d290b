use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use super::inventory::Inventory;
use super::ownership::{self, Ownership};
use super::procfs::ProcFs;
use super::resolver::{self, Resolution};

/// Why a whole process contributed no records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSkip {
    NotOwned(Ownership),
    /// `<proc>/<pid>/fd` could not be opened (exited, or no permission).
    FdTableUnreadable(io::ErrorKind),
    /// Resolution did not finish within the configured timeout.
    TimedOut,
}

impl fmt::Display for ProcessSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOwned(o) => write!(f, "not owned: {o}"),
            Self::FdTableUnreadable(kind) => write!(f, "fd table unreadable ({kind})"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Scanned { pid: u32, resolutions: Vec<Resolution> },
    Skipped { pid: u32, reason: ProcessSkip },
}

/// Counters describing how complete a scan was.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub processes_seen: usize,
    pub processes_scanned: usize,
    pub not_owned: usize,
    pub fd_tables_unreadable: usize,
    pub timed_out: usize,
    pub descriptors_recorded: usize,
    pub descriptors_skipped: usize,
    pub targets_truncated: usize,
}

impl ScanReport {
    fn count_skip(&mut self, reason: ProcessSkip) {
        match reason {
            ProcessSkip::NotOwned(_) => self.not_owned += 1,
            ProcessSkip::FdTableUnreadable(_) => self.fd_tables_unreadable += 1,
            ProcessSkip::TimedOut => self.timed_out += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Processes resolved concurrently. 1 means a plain sequential scan.
    pub workers: usize,
    /// Per-process resolution limit. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            timeout: None,
        }
    }
}

/// Drives one snapshot: enumerate, filter by owner, resolve, collect.
pub struct Scanner {
    procfs: ProcFs,
    uid: u32,
    options: ScanOptions,
}

impl Scanner {
    pub fn new(procfs: ProcFs, uid: u32, options: ScanOptions) -> Self {
        Self { procfs, uid, options }
    }

    /// Scanner for the real `/proc` and the invoking user.
    pub fn for_current_user(options: ScanOptions) -> Self {
        Self::new(ProcFs::default(), ownership::invoking_uid(), options)
    }

    /// Build the full inventory.
    ///
    /// Fails only if the proc root cannot be listed. Anything that goes
    /// wrong for a single process or descriptor is skipped and counted in
    /// the returned report.
    pub fn scan(&self) -> Result<(Inventory, ScanReport)> {
        let pids = self.procfs.list_pids()?;

        let mut report = ScanReport {
            processes_seen: pids.len(),
            ..Default::default()
        };

        // Ownership is settled before any resolution work is scheduled
        let mut outcomes: Vec<Option<ProcessOutcome>> = Vec::with_capacity(pids.len());
        let mut owned = Vec::new();
        for pid in pids {
            let owner = ownership::check(&self.procfs, pid, self.uid);
            if owner.is_owned() {
                owned.push((outcomes.len(), pid));
                outcomes.push(None);
            } else {
                log::debug!("pid {pid}: {owner}");
                outcomes.push(Some(ProcessOutcome::Skipped {
                    pid,
                    reason: ProcessSkip::NotOwned(owner),
                }));
            }
        }

        let owned_pids: Vec<u32> = owned.iter().map(|&(_, pid)| pid).collect();
        let sequential = self.options.workers <= 1 && self.options.timeout.is_none();
        let resolved: Vec<ProcessOutcome> = if sequential {
            owned_pids
                .iter()
                .map(|&pid| outcome_for(pid, resolver::resolve_process(&self.procfs, pid)))
                .collect()
        } else {
            let procfs = self.procfs.clone();
            run_pool(
                &owned_pids,
                self.options,
                Arc::new(move |pid: u32| resolver::resolve_process(&procfs, pid)),
            )
        };
        for ((slot, _), outcome) in owned.into_iter().zip(resolved) {
            outcomes[slot] = Some(outcome);
        }

        let mut inventory = Inventory::new();
        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                ProcessOutcome::Scanned { resolutions, .. } => {
                    report.processes_scanned += 1;
                    let mut records = Vec::with_capacity(resolutions.len());
                    for resolution in resolutions {
                        match resolution {
                            Resolution::Record { record, truncated } => {
                                if truncated {
                                    report.targets_truncated += 1;
                                }
                                records.push(record);
                            }
                            Resolution::Skipped { .. } => report.descriptors_skipped += 1,
                        }
                    }
                    report.descriptors_recorded += records.len();
                    inventory.append_process(records);
                }
                ProcessOutcome::Skipped { reason, .. } => report.count_skip(reason),
            }
        }

        log::info!(
            "scan of {}: {} processes seen, {} scanned, {} descriptors ({} skipped)",
            self.procfs.root().display(),
            report.processes_seen,
            report.processes_scanned,
            report.descriptors_recorded,
            report.descriptors_skipped
        );
        Ok((inventory, report))
    }
}

fn outcome_for(pid: u32, result: io::Result<Vec<Resolution>>) -> ProcessOutcome {
    match result {
        Ok(resolutions) => ProcessOutcome::Scanned { pid, resolutions },
        Err(e) => {
            log::debug!("pid {pid}: cannot open fd table: {e}");
            ProcessOutcome::Skipped {
                pid,
                reason: ProcessSkip::FdTableUnreadable(e.kind()),
            }
        }
    }
}

type ResolveFn = dyn Fn(u32) -> io::Result<Vec<Resolution>> + Send + Sync;

/// Resolve `pids` with at most `options.workers` job threads alive.
///
/// Each job runs on its own thread so a job stuck in a filesystem call can
/// be abandoned once its deadline passes. An abandoned thread keeps its
/// slot until its late result arrives, and that result is dropped. If every
/// slot is held by an abandoned thread, the pids not yet started are marked
/// timed out. The returned outcomes line up with `pids`.
fn run_pool(pids: &[u32], options: ScanOptions, job: Arc<ResolveFn>) -> Vec<ProcessOutcome> {
    let workers = options.workers.max(1);
    let (tx, rx) = mpsc::channel::<(usize, io::Result<Vec<Resolution>>)>();

    let mut results: Vec<Option<ProcessOutcome>> = (0..pids.len()).map(|_| None).collect();
    let mut in_flight: HashMap<usize, Option<Instant>> = HashMap::new();
    let mut abandoned = 0usize;
    let mut next = 0;

    loop {
        while in_flight.len() + abandoned < workers && next < pids.len() {
            let idx = next;
            let pid = pids[idx];
            next += 1;

            let job_tx = tx.clone();
            let job_fn = Arc::clone(&job);
            let spawned = std::thread::Builder::new()
                .name(format!("fd-resolve-{pid}"))
                .spawn(move || {
                    let _ = job_tx.send((idx, job_fn(pid)));
                });
            match spawned {
                Ok(_) => {
                    in_flight.insert(idx, options.timeout.map(|t| Instant::now() + t));
                }
                Err(e) => {
                    log::warn!("pid {pid}: cannot spawn resolver thread ({e}), resolving inline");
                    results[idx] = Some(outcome_for(pid, job(pid)));
                }
            }
        }

        if in_flight.is_empty() {
            if next < pids.len() {
                log::warn!(
                    "all {workers} resolver slots held by stuck jobs, skipping {} processes",
                    pids.len() - next
                );
            }
            break;
        }

        let earliest = in_flight.values().flatten().min().copied();
        let received = match earliest {
            Some(deadline) => {
                rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok((idx, result)) => {
                if in_flight.remove(&idx).is_some() {
                    results[idx] = Some(outcome_for(pids[idx], result));
                } else {
                    // Late result from an abandoned job frees its slot
                    abandoned = abandoned.saturating_sub(1);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let now = Instant::now();
                let expired: Vec<usize> = in_flight
                    .iter()
                    .filter(|(_, deadline)| matches!(deadline, Some(d) if *d <= now))
                    .map(|(&idx, _)| idx)
                    .collect();
                for idx in expired {
                    in_flight.remove(&idx);
                    abandoned += 1;
                    log::warn!("pid {}: descriptor resolution timed out", pids[idx]);
                    results[idx] = Some(ProcessOutcome::Skipped {
                        pid: pids[idx],
                        reason: ProcessSkip::TimedOut,
                    });
                }
            }
            // We hold a sender, so this only happens if every job thread died
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    results
        .into_iter()
        .zip(pids)
        .map(|(outcome, &pid)| {
            outcome.unwrap_or(ProcessOutcome::Skipped {
                pid,
                reason: ProcessSkip::TimedOut,
            })
        })
        .collect()
}

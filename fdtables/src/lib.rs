//! Snapshot of the invoking user's open file descriptors, read from /proc.
//!
//! [`Scanner::scan`] builds an [`Inventory`] once; the functions in
//! [`views`] and [`export`] then render or persist it as often as needed.

pub mod config;
pub mod data;
pub mod export;
pub mod views;

pub use data::inventory::{Inventory, PidFilter};
pub use data::scanner::{ScanOptions, ScanReport, Scanner};
pub use fdtables_common::DescriptorRecord;

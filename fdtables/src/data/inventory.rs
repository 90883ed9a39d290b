use fdtables_common::DescriptorRecord;

/// Which processes a view or export includes.
///
/// On the command line a pid of 0 means "no filter".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PidFilter {
    #[default]
    All,
    Pid(u32),
}

impl PidFilter {
    pub fn matches(&self, record: &DescriptorRecord) -> bool {
        match self {
            Self::All => true,
            Self::Pid(pid) => record.pid == *pid,
        }
    }
}

impl From<u32> for PidFilter {
    fn from(pid: u32) -> Self {
        if pid == 0 { Self::All } else { Self::Pid(pid) }
    }
}

/// Descriptor records from one scan, in discovery order.
///
/// Only the scanner appends, one whole process at a time. Once
/// [`Scanner::scan`](super::scanner::Scanner::scan) returns, the inventory
/// is read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    records: Vec<DescriptorRecord>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append all records for one process as a contiguous group.
    pub(crate) fn append_process(&mut self, records: Vec<DescriptorRecord>) {
        self.records.extend(records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DescriptorRecord> {
        self.records.iter()
    }

    pub fn filtered(&self, filter: PidFilter) -> impl Iterator<Item = &DescriptorRecord> {
        self.records.iter().filter(move |r| filter.matches(r))
    }

    pub fn records(&self) -> &[DescriptorRecord] {
        &self.records
    }
}

impl From<Vec<DescriptorRecord>> for Inventory {
    fn from(records: Vec<DescriptorRecord>) -> Self {
        Self { records }
    }
}

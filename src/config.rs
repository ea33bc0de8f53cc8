//! Open-time options for [`crate::KmerCountStore`].

use crate::encode::CasePolicy;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    min_count: Option<u32>,
    max_count: Option<u32>,
    canonical_fallback: Option<bool>,
    mmap: bool,
    read_buffer_size: usize,
    case_policy: CasePolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            min_count: None,
            max_count: None,
            canonical_fallback: None,
            mmap: true,
            read_buffer_size: 64 * 1024,
            case_policy: CasePolicy::Strict,
        }
    }
}

impl StoreConfig {
    /// Ignore records counted fewer than `n` times. Must not be below the
    /// database's own minimum.
    pub fn min_count(mut self, n: u32) -> Self {
        self.min_count = Some(n);
        self
    }
    /// Ignore records counted more than `n` times. Must not be above the
    /// database's own maximum.
    pub fn max_count(mut self, n: u32) -> Self {
        self.max_count = Some(n);
        self
    }
    /// Retry point queries with the reverse complement. Defaults to the
    /// database's both-strands flag.
    pub fn canonical_fallback(mut self, yes: bool) -> Self {
        self.canonical_fallback = Some(yes);
        self
    }
    /// Memory-map the suffix file in random-access mode (default: true).
    /// When disabled the file is read into memory.
    pub fn mmap(mut self, yes: bool) -> Self {
        self.mmap = yes;
        self
    }
    /// Read buffer for listing mode.
    pub fn read_buffer_size(mut self, n: usize) -> Self {
        self.read_buffer_size = n.max(4096);
        self
    }
    /// How `counts_for_read` treats lowercase bases (default: strict).
    pub fn case_policy(mut self, p: CasePolicy) -> Self {
        self.case_policy = p;
        self
    }

    pub(crate) fn min_count_override(&self) -> Option<u32> {
        self.min_count
    }
    pub(crate) fn max_count_override(&self) -> Option<u32> {
        self.max_count
    }
    pub(crate) fn canonical_fallback_override(&self) -> Option<bool> {
        self.canonical_fallback
    }
    pub(crate) fn mmap_flag(&self) -> bool {
        self.mmap
    }
    pub(crate) fn buffer_size(&self) -> usize {
        self.read_buffer_size
    }
    pub(crate) fn case_policy_value(&self) -> CasePolicy {
        self.case_policy
    }
}

//! KmerCountStore: a KMC database opened for random access or for listing.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use crate::config::StoreConfig;
use crate::io::{
    DatabaseInfo, LookupTables, PRE_EXT, PrefixFile, SUF_EXT, SuffixData, SuffixStream,
    base_path, decode_counter, sibling,
};
use crate::kmer::{Kmer, KmerError};

/// Errors returned by [`KmerCountStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// One of the database files does not exist.
    #[error("KMC database file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },
    /// Markers, sizes or parameters are inconsistent.
    #[error("Invalid KMC database: {0}")]
    CorruptHeader(String),
    /// Layout version other than KMC1 (0) and KMC2 (0x200).
    #[error("Unsupported KMC database version {0:#x}")]
    UnsupportedVersion(u32),
    /// Counter mode other than plain integer counters.
    #[error("Unsupported KMC counter mode {0}")]
    UnsupportedMode(u32),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Operation not available in the mode the handle was opened in.
    #[error("{operation} is not available on a handle opened for {mode}")]
    WrongMode {
        operation: &'static str,
        mode: OpenMode,
    },
    /// Handle already closed.
    #[error("KMC database handle is closed")]
    Closed,
    /// Query k-mer length differs from the database's k.
    #[error("k-mer of length {got} queried against a database with k = {expected}")]
    LengthMismatch { expected: u32, got: usize },
    /// Count thresholds outside the database's range.
    #[error("Invalid count threshold: {0}")]
    Threshold(String),
    /// K-mer construction failed.
    #[error(transparent)]
    Kmer(#[from] KmerError),
}

/// Access mode, fixed when a database is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Point queries; lookup tables and suffix records resident.
    RandomAccess,
    /// Forward-only streaming over every record.
    Listing,
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::RandomAccess => f.write_str("random access"),
            OpenMode::Listing => f.write_str("listing"),
        }
    }
}

/// Random-access state.
struct RandomAccess {
    tables: LookupTables,
    suffixes: SuffixData,
}

/// Listing state: record cursor plus the lookup-table slot it falls in.
struct Listing {
    tables: LookupTables,
    stream: SuffixStream,
    table_index: usize,
    record_index: u64,
}

enum Storage {
    RandomAccess(RandomAccess),
    Listing(Listing),
    Closed,
}

/// Handle on a KMC database.
///
/// Point queries (`count_kmer`) take `&self` and only read resident data, so a
/// random-access handle can be shared between threads. Listing calls take
/// `&mut self`.
pub struct KmerCountStore {
    base: PathBuf,
    info: DatabaseInfo,
    min_count: u32,
    max_count: u32,
    // records with a count inside [min_count, max_count]
    kmer_count: u64,
    canonical_fallback: bool,
    config: StoreConfig,
    storage: Storage,
}

impl KmerCountStore {
    /// Open `<path>.kmc_pre` / `<path>.kmc_suf` with default options.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self, StoreError> {
        Self::open_with(path, mode, &StoreConfig::default())
    }

    /// Open for point queries.
    pub fn open_random_access(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(path, OpenMode::RandomAccess)
    }

    /// Open for listing.
    pub fn open_iterator(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(path, OpenMode::Listing)
    }

    /// Open with explicit options. Either the whole handle is returned or
    /// nothing: files opened before a failure are closed on the way out.
    pub fn open_with(
        path: impl AsRef<Path>,
        mode: OpenMode,
        cfg: &StoreConfig,
    ) -> Result<Self, StoreError> {
        let base = base_path(path.as_ref());
        let PrefixFile { info, tables } = PrefixFile::read(&sibling(&base, PRE_EXT))?;
        let suf_path = sibling(&base, SUF_EXT);

        let storage = match mode {
            OpenMode::RandomAccess => Storage::RandomAccess(RandomAccess {
                suffixes: SuffixData::open(&suf_path, &info, cfg.mmap_flag())?,
                tables,
            }),
            OpenMode::Listing => Storage::Listing(Listing {
                stream: SuffixStream::open(&suf_path, &info, cfg.buffer_size())?,
                tables,
                table_index: 0,
                record_index: 0,
            }),
        };

        let mut store = KmerCountStore {
            base,
            min_count: info.min_count,
            max_count: info.max_count,
            kmer_count: info.total_kmers,
            canonical_fallback: cfg
                .canonical_fallback_override()
                .unwrap_or(info.both_strands),
            config: cfg.clone(),
            info,
            storage,
        };
        store.set_thresholds(
            cfg.min_count_override().unwrap_or(store.min_count),
            cfg.max_count_override().unwrap_or(store.max_count),
        )?;

        info!(
            "Opened KMC database {} for {mode}: version {:#x}, k={}, {} of {} k-mers in [{}, {}]",
            store.base.display(),
            store.info.version,
            store.info.kmer_length,
            store.kmer_count,
            store.info.total_kmers,
            store.min_count,
            store.max_count
        );
        Ok(store)
    }

    /// k of this database.
    #[inline]
    pub fn kmer_length(&self) -> u32 {
        self.info.kmer_length
    }

    /// Number of records whose count lies inside the current thresholds,
    /// which is what a full listing yields. Equals the header total until the
    /// thresholds are narrowed.
    #[inline]
    pub fn kmer_count(&self) -> u64 {
        self.kmer_count
    }

    /// Header parameters.
    #[inline]
    pub fn info(&self) -> &DatabaseInfo {
        &self.info
    }

    /// Base path the handle was opened from.
    pub fn path(&self) -> &Path {
        &self.base
    }

    /// Current mode; `None` once closed.
    pub fn mode(&self) -> Option<OpenMode> {
        match self.storage {
            Storage::RandomAccess(_) => Some(OpenMode::RandomAccess),
            Storage::Listing(_) => Some(OpenMode::Listing),
            Storage::Closed => None,
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.storage, Storage::Closed)
    }

    pub fn min_count(&self) -> u32 {
        self.min_count
    }

    pub fn max_count(&self) -> u32 {
        self.max_count
    }

    /// Raise the lower count threshold. Lowering it below the database's own
    /// minimum fails.
    pub fn set_min_count(&mut self, n: u32) -> Result<(), StoreError> {
        self.set_thresholds(n, self.max_count)
    }

    /// Lower the upper count threshold. Raising it above the database's own
    /// maximum fails.
    pub fn set_max_count(&mut self, n: u32) -> Result<(), StoreError> {
        self.set_thresholds(self.min_count, n)
    }

    fn set_thresholds(&mut self, min: u32, max: u32) -> Result<(), StoreError> {
        if min < self.info.min_count {
            return Err(StoreError::Threshold(format!(
                "min count {min} is below the database minimum {}",
                self.info.min_count
            )));
        }
        if max > self.info.max_count {
            return Err(StoreError::Threshold(format!(
                "max count {max} is above the database maximum {}",
                self.info.max_count
            )));
        }
        if (min, max) == (self.min_count, self.max_count) {
            return Ok(());
        }
        self.kmer_count = self.count_in_range(min, max)?;
        self.min_count = min;
        self.max_count = max;
        debug!(
            "{}: {} k-mers with counts in [{min}, {max}]",
            self.base.display(),
            self.kmer_count
        );
        Ok(())
    }

    /// Records with a count in `min..=max`. Listing handles scan a second
    /// stream so the cursor is left alone.
    fn count_in_range(&self, min: u32, max: u32) -> Result<u64, StoreError> {
        if (min, max) == (self.info.min_count, self.info.max_count) {
            return Ok(self.info.total_kmers);
        }
        let suffix_len = self.info.suffix_len();
        let record_size = self.info.record_size();
        let range = min as u64..=max as u64;
        let mut n = 0;
        match &self.storage {
            Storage::RandomAccess(ra) => {
                for i in 0..self.info.total_kmers {
                    let record = ra.suffixes.record(i, record_size);
                    if range.contains(&decode_counter(&record[suffix_len..])) {
                        n += 1;
                    }
                }
            }
            Storage::Listing(_) => {
                let path = sibling(&self.base, SUF_EXT);
                let mut stream = SuffixStream::open(&path, &self.info, self.config.buffer_size())?;
                for _ in 0..self.info.total_kmers {
                    let record = stream.read_record()?;
                    if range.contains(&decode_counter(&record[suffix_len..])) {
                        n += 1;
                    }
                }
            }
            Storage::Closed => return Err(StoreError::Closed),
        }
        Ok(n)
    }

    /// Count of `kmer`. On databases built over both strands the reverse
    /// complement is tried when the direct form is not stored. Absent k-mers
    /// count 0.
    pub fn count_kmer(&self, kmer: &Kmer) -> Result<u64, StoreError> {
        let ra = self.random_access("count_kmer")?;
        self.check_len(kmer)?;

        if let Some(n) = self.accept(ra.lookup(kmer, &self.info)) {
            return Ok(n);
        }
        if self.canonical_fallback {
            let rc = kmer.reverse_complement();
            if rc != *kmer {
                if let Some(n) = self.accept(ra.lookup(&rc, &self.info)) {
                    return Ok(n);
                }
            }
        }
        Ok(0)
    }

    /// Count of every k-length window of `read`, in order. Windows with a
    /// base outside the alphabet count 0.
    pub fn counts_for_read(&self, read: &str) -> Result<Vec<u64>, StoreError> {
        self.random_access("counts_for_read")?;
        let k = self.info.kmer_length as usize;
        let policy = self.config.case_policy_value();
        read.as_bytes()
            .windows(k)
            .map(|window| match Kmer::from_bytes(window, policy) {
                Ok(kmer) => self.count_kmer(&kmer),
                Err(KmerError::InvalidBase { .. }) => Ok(0),
                Err(e) => Err(e.into()),
            })
            .collect()
    }

    /// Decode the next record into `kmer` and return its count; `None` once
    /// every record has been produced. `kmer` must have length k.
    pub fn read_next(&mut self, kmer: &mut Kmer) -> Result<Option<u64>, StoreError> {
        let (min, max) = (self.min_count, self.max_count);
        let info = &self.info;
        let listing = match &mut self.storage {
            Storage::Listing(l) => l,
            Storage::RandomAccess(_) => {
                return Err(StoreError::WrongMode {
                    operation: "read_next",
                    mode: OpenMode::RandomAccess,
                });
            }
            Storage::Closed => return Err(StoreError::Closed),
        };
        if kmer.len() != info.kmer_length as usize {
            return Err(StoreError::LengthMismatch {
                expected: info.kmer_length,
                got: kmer.len(),
            });
        }
        while let Some(n) = listing.next_record(kmer, info)? {
            if n >= min as u64 && n <= max as u64 {
                return Ok(Some(n));
            }
        }
        Ok(None)
    }

    /// Next `(k-mer, count)` pair in stored order.
    pub fn next_kmer(&mut self) -> Result<Option<(Kmer, u64)>, StoreError> {
        let mut kmer = Kmer::with_len(self.info.kmer_length as usize)?;
        Ok(self.read_next(&mut kmer)?.map(|n| (kmer, n)))
    }

    /// Iterator over the remaining records.
    pub fn records(&mut self) -> Records<'_> {
        Records {
            store: self,
            done: false,
        }
    }

    /// Rewind listing to the first record.
    pub fn restart(&mut self) -> Result<(), StoreError> {
        match &mut self.storage {
            Storage::Listing(l) => {
                l.stream.rewind()?;
                l.table_index = 0;
                l.record_index = 0;
                debug!("Restarted listing of {}", self.base.display());
                Ok(())
            }
            Storage::RandomAccess(_) => Err(StoreError::WrongMode {
                operation: "restart",
                mode: OpenMode::RandomAccess,
            }),
            Storage::Closed => Err(StoreError::Closed),
        }
    }

    /// Release file handles and mappings. Closing twice is a no-op.
    ///
    /// Always returns `true`: the handle only owns read-only `File`s and
    /// mappings, whose release has no failure to report.
    pub fn close(&mut self) -> bool {
        match std::mem::replace(&mut self.storage, Storage::Closed) {
            Storage::Closed => debug!("{} already closed", self.base.display()),
            open => {
                drop(open);
                debug!("Closed KMC database {}", self.base.display());
            }
        }
        true
    }

    fn random_access(&self, operation: &'static str) -> Result<&RandomAccess, StoreError> {
        match &self.storage {
            Storage::RandomAccess(ra) => Ok(ra),
            Storage::Listing(_) => Err(StoreError::WrongMode {
                operation,
                mode: OpenMode::Listing,
            }),
            Storage::Closed => Err(StoreError::Closed),
        }
    }

    fn check_len(&self, kmer: &Kmer) -> Result<(), StoreError> {
        if kmer.len() != self.info.kmer_length as usize {
            return Err(StoreError::LengthMismatch {
                expected: self.info.kmer_length,
                got: kmer.len(),
            });
        }
        Ok(())
    }

    #[inline]
    fn accept(&self, count: Option<u64>) -> Option<u64> {
        count.filter(|&n| n >= self.min_count as u64 && n <= self.max_count as u64)
    }
}

impl RandomAccess {
    /// Stored count of exactly this orientation.
    fn lookup(&self, kmer: &Kmer, info: &DatabaseInfo) -> Option<u64> {
        let suffix_len = info.suffix_len();
        let record_size = info.record_size();
        let first = kmer.packed_len() - suffix_len;
        let key: Vec<u8> = (first..kmer.packed_len())
            .map(|i| kmer.packed_byte(i))
            .collect();

        let Range { start, end } = self.tables.range_of(kmer);
        let i = lower_bound(start, end, |i| {
            self.suffixes.record(i, record_size)[..suffix_len].cmp(key.as_slice())
        });
        if i == end {
            return None;
        }
        let record = self.suffixes.record(i, record_size);
        if record[..suffix_len] == key[..] {
            Some(decode_counter(&record[suffix_len..]))
        } else {
            None
        }
    }
}

impl Listing {
    /// Next raw record regardless of thresholds.
    fn next_record(&mut self, kmer: &mut Kmer, info: &DatabaseInfo) -> Result<Option<u64>, StoreError> {
        if self.record_index >= info.total_kmers {
            return Ok(None);
        }
        let table = self.tables.table();
        // skip slots whose record range is already consumed (or empty)
        while table[self.table_index + 1] <= self.record_index {
            self.table_index += 1;
        }
        let prefix = (self.table_index % self.tables.single_size()) as u64;

        let suffix_len = info.suffix_len();
        let record = self.stream.read_record()?;
        kmer.reset_with_prefix(prefix, self.tables.prefix_len());
        let first = kmer.packed_len() - suffix_len;
        for (j, &b) in record[..suffix_len].iter().enumerate() {
            kmer.or_packed_byte(first + j, b);
        }
        let count = decode_counter(&record[suffix_len..]);
        self.record_index += 1;
        Ok(Some(count))
    }
}

/// First index in `start..end` whose record is not less than the key.
fn lower_bound(mut lo: u64, mut hi: u64, cmp: impl Fn(u64) -> Ordering) -> u64 {
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if cmp(mid) == Ordering::Less {
            lo = mid + 1
        } else {
            hi = mid
        }
    }
    lo
}

/// Iterator returned by [`KmerCountStore::records`].
pub struct Records<'a> {
    store: &'a mut KmerCountStore,
    done: bool,
}

impl Iterator for Records<'_> {
    type Item = Result<(Kmer, u64), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.store.next_kmer() {
            Ok(Some(pair)) => Some(Ok(pair)),
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

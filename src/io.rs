//! On-disk KMC layout: `<base>.kmc_pre` + `<base>.kmc_suf`.
//! All integers are little-endian.
//!
//! `.kmc_pre`:
//! ```text
//! "KMCP" | lookup tables (u64 *) | [v0x200: signature map (u32 * (4^m + 1))]
//!        | header | header_offset: u32 | "KMCP"
//! ```
//! The header is the `header_offset` bytes ending 8 bytes before EOF; its last
//! four bytes are the version (0 = KMC1, 0x200 = KMC2/KMC3).
//!
//! `.kmc_suf`:
//! ```text
//! "KMCS" | record * total_kmers | "KMCS"
//! record = suffix bytes ((k - lut_prefix_length) / 4) | counter (counter_size bytes)
//! ```
//! Records are sorted by suffix inside each lookup-table range; the ranges
//! follow table order (bin-major for v0x200).

use byteorder::{ByteOrder, LittleEndian as LE, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::kmer::{Kmer, MAX_KMER_LEN};
use crate::mmer::{MAX_SIGNATURE_LEN, MIN_SIGNATURE_LEN, MmerNorm};
use crate::store::StoreError;

pub const PRE_MARKER: &[u8; 4] = b"KMCP";
pub const SUF_MARKER: &[u8; 4] = b"KMCS";
pub const PRE_EXT: &str = "kmc_pre";
pub const SUF_EXT: &str = "kmc_suf";

pub const KMC_VERSION1: u32 = 0;
pub const KMC_VERSION2: u32 = 0x200;

/// Longest lookup prefix the reader accepts (4^16 table entries).
pub const MAX_LUT_PREFIX_LEN: u32 = 16;

// header fields + both_strands byte + version
const HEADER_LEN_V1: usize = 6 * 4 + 8 + 1 + 4;
const HEADER_LEN_V2: usize = 7 * 4 + 8 + 1 + 4;

/// Database parameters read from the `.kmc_pre` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Layout version: [`KMC_VERSION1`] or [`KMC_VERSION2`].
    pub version: u32,
    /// k.
    pub kmer_length: u32,
    /// Counter mode; 0 = integer counters (the only supported mode).
    pub mode: u32,
    /// Bytes per stored counter.
    pub counter_size: u32,
    /// Bases per lookup-table prefix.
    pub lut_prefix_length: u32,
    /// Signature length (v0x200 only, 0 otherwise).
    pub signature_len: u32,
    /// Smallest count the database was built with.
    pub min_count: u32,
    /// Largest count the database was built with.
    pub max_count: u32,
    /// Whether k-mers were stored in canonical form.
    pub both_strands: bool,
    /// Number of stored records.
    pub total_kmers: u64,
}

impl DatabaseInfo {
    pub fn read_from<R: Read>(r: &mut R, version: u32) -> std::io::Result<Self> {
        let kmer_length = r.read_u32::<LE>()?;
        let mode = r.read_u32::<LE>()?;
        let counter_size = r.read_u32::<LE>()?;
        let lut_prefix_length = r.read_u32::<LE>()?;
        let signature_len = if version == KMC_VERSION2 {
            r.read_u32::<LE>()?
        } else {
            0
        };
        let min_count = r.read_u32::<LE>()?;
        let max_count = r.read_u32::<LE>()?;
        let total_kmers = r.read_u64::<LE>()?;
        // stored inverted: 0 means canonical
        let both_strands = r.read_u8()? == 0;

        Ok(DatabaseInfo {
            version,
            kmer_length,
            mode,
            counter_size,
            lut_prefix_length,
            signature_len,
            min_count,
            max_count,
            both_strands,
            total_kmers,
        })
    }

    /// Bytes of suffix per record.
    #[inline]
    pub fn suffix_len(&self) -> usize {
        ((self.kmer_length - self.lut_prefix_length) / 4) as usize
    }

    /// Bytes per `.kmc_suf` record.
    #[inline]
    pub fn record_size(&self) -> usize {
        self.suffix_len() + self.counter_size as usize
    }

    fn validate(&self) -> Result<(), StoreError> {
        let k = self.kmer_length;
        if k == 0 || k as usize > MAX_KMER_LEN {
            return Err(corrupt(format!("k-mer length {k} out of range")));
        }
        if self.mode != 0 {
            return Err(StoreError::UnsupportedMode(self.mode));
        }
        let lut = self.lut_prefix_length;
        if lut > MAX_LUT_PREFIX_LEN || lut > k || (k - lut) % 4 != 0 {
            return Err(corrupt(format!(
                "lookup prefix length {lut} does not fit k = {k}"
            )));
        }
        if self.counter_size > 8 {
            return Err(corrupt(format!("counter size {}", self.counter_size)));
        }
        if self.version == KMC_VERSION2 {
            let m = self.signature_len as usize;
            if !(MIN_SIGNATURE_LEN..=MAX_SIGNATURE_LEN).contains(&m) || m > k as usize {
                return Err(corrupt(format!("signature length {m} for k = {k}")));
            }
        }
        Ok(())
    }
}

fn corrupt(msg: impl Into<String>) -> StoreError {
    StoreError::CorruptHeader(msg.into())
}

/// Open `path`, reporting a missing file as [`StoreError::FileNotFound`].
pub(crate) fn open_file(path: &Path) -> Result<File, StoreError> {
    File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StoreError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => StoreError::Io(e),
    })
}

/// Strip a trailing `.kmc_pre` / `.kmc_suf` from a user-supplied path.
pub(crate) fn base_path(path: &Path) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some(PRE_EXT) | Some(SUF_EXT) => path.with_extension(""),
        _ => path.to_path_buf(),
    }
}

/// `<base>.<ext>` without touching dots already in `base`.
pub(crate) fn sibling(base: &Path, ext: &str) -> PathBuf {
    let mut s = base.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

/// KMC2 bin selection.
#[derive(Clone)]
struct Bins {
    norm: MmerNorm,
    map: Vec<u32>,
}

/// Lookup tables from `.kmc_pre`, with the `total_kmers` guard appended.
pub(crate) struct LookupTables {
    table: Vec<u64>,
    single_size: usize,
    prefix_len: usize,
    bins: Option<Bins>,
}

impl LookupTables {
    /// Every table entry plus the trailing guard.
    #[inline]
    pub(crate) fn table(&self) -> &[u64] {
        &self.table
    }

    /// Entries in one table: `4^lut_prefix_length`.
    #[inline]
    pub(crate) fn single_size(&self) -> usize {
        self.single_size
    }

    #[inline]
    pub(crate) fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    /// Number of tables (1 for KMC1).
    pub(crate) fn bin_count(&self) -> usize {
        (self.table.len() - 1) / self.single_size
    }

    /// Record index range that may hold `kmer`.
    pub(crate) fn range_of(&self, kmer: &Kmer) -> Range<u64> {
        let bin = match &self.bins {
            Some(b) => b.map[b.norm.signature(kmer) as usize] as usize,
            None => 0,
        };
        let idx = bin * self.single_size + kmer.prefix(self.prefix_len) as usize;
        self.table[idx]..self.table[idx + 1]
    }
}

/// Parsed `.kmc_pre`.
pub(crate) struct PrefixFile {
    pub info: DatabaseInfo,
    pub tables: LookupTables,
}

impl PrefixFile {
    pub(crate) fn read(path: &Path) -> Result<Self, StoreError> {
        let mut file = open_file(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        drop(file);
        Self::parse(&bytes)
    }

    fn parse(bytes: &[u8]) -> Result<Self, StoreError> {
        let len = bytes.len();
        if len < 4 + HEADER_LEN_V1 + 8 {
            return Err(corrupt(format!("prefix file of {len} bytes is too short")));
        }
        if &bytes[..4] != PRE_MARKER || &bytes[len - 4..] != PRE_MARKER {
            return Err(corrupt("missing KMCP marker"));
        }

        let mut tail = Cursor::new(&bytes[len - 12..len - 4]);
        let version = tail.read_u32::<LE>()?;
        let header_offset = tail.read_u32::<LE>()? as usize;
        let min_header = match version {
            KMC_VERSION1 => HEADER_LEN_V1,
            KMC_VERSION2 => HEADER_LEN_V2,
            v => return Err(StoreError::UnsupportedVersion(v)),
        };
        if header_offset < min_header || header_offset + 8 + 4 > len {
            return Err(corrupt(format!("header offset {header_offset}")));
        }
        let header_start = len - 8 - header_offset;

        let info = DatabaseInfo::read_from(&mut Cursor::new(&bytes[header_start..]), version)?;
        info.validate()?;

        let prefix_len = info.lut_prefix_length as usize;
        let single_size = 1usize << (2 * prefix_len);

        let (tables_end, bins) = if version == KMC_VERSION2 {
            let norm = MmerNorm::new(info.signature_len as usize)
                .ok_or_else(|| corrupt("signature length"))?;
            let map_bytes = norm.map_size() * 4;
            if header_start < 4 + map_bytes {
                return Err(corrupt("signature map does not fit"));
            }
            let map_start = header_start - map_bytes;
            let mut map = vec![0u32; norm.map_size()];
            LE::read_u32_into(&bytes[map_start..header_start], &mut map);
            (map_start, Some(Bins { norm, map }))
        } else {
            (header_start, None)
        };

        let table_bytes = &bytes[4..tables_end];
        if table_bytes.len() % 8 != 0 {
            return Err(corrupt("lookup table is not a whole number of entries"));
        }
        let entries = table_bytes.len() / 8;
        let used = match &bins {
            None if entries >= single_size => single_size,
            Some(_) if entries >= single_size && entries % single_size == 0 => entries,
            _ => {
                return Err(corrupt(format!(
                    "{entries} lookup entries for prefix length {prefix_len}"
                )));
            }
        };
        let mut table = vec![0u64; used + 1];
        LE::read_u64_into(&table_bytes[..used * 8], &mut table[..used]);
        table[used] = info.total_kmers;

        if table.windows(2).any(|w| w[0] > w[1]) {
            return Err(corrupt("lookup table is not monotone"));
        }
        if let Some(b) = &bins {
            let bin_count = used / single_size;
            if b.map.iter().any(|&bin| bin as usize >= bin_count) {
                return Err(corrupt("signature map points past the last bin"));
            }
        }

        Ok(PrefixFile {
            info,
            tables: LookupTables {
                table,
                single_size,
                prefix_len,
                bins,
            },
        })
    }
}

/// Counter stored after a record's suffix. Presence-only databases
/// (`counter_size == 0`) report 1.
#[inline]
pub(crate) fn decode_counter(bytes: &[u8]) -> u64 {
    if bytes.is_empty() {
        1
    } else {
        LE::read_uint(bytes, bytes.len())
    }
}

fn check_suffix_len(info: &DatabaseInfo, file_len: u64) -> Result<(), StoreError> {
    let expected = (info.record_size() as u64)
        .checked_mul(info.total_kmers)
        .and_then(|n| n.checked_add(8));
    if expected != Some(file_len) {
        return Err(corrupt(format!(
            "suffix file holds {file_len} bytes, header describes {} records of {} bytes",
            info.total_kmers,
            info.record_size()
        )));
    }
    Ok(())
}

/// Resident suffix records for random access.
pub(crate) enum SuffixData {
    Mapped(memmap2::Mmap),
    Loaded(Vec<u8>),
}

impl SuffixData {
    pub(crate) fn open(path: &Path, info: &DatabaseInfo, mmap: bool) -> Result<Self, StoreError> {
        let mut file = open_file(path)?;
        check_suffix_len(info, file.metadata()?.len())?;
        let data = if mmap {
            let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
            SuffixData::Mapped(map)
        } else {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            SuffixData::Loaded(buf)
        };
        let bytes = data.as_bytes();
        if &bytes[..4] != SUF_MARKER || &bytes[bytes.len() - 4..] != SUF_MARKER {
            return Err(corrupt("missing KMCS marker"));
        }
        Ok(data)
    }

    #[inline]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        match self {
            SuffixData::Mapped(m) => &m[..],
            SuffixData::Loaded(v) => v.as_slice(),
        }
    }

    /// Record `i` (suffix then counter).
    #[inline]
    pub(crate) fn record(&self, i: u64, record_size: usize) -> &[u8] {
        let start = 4 + i as usize * record_size;
        &self.as_bytes()[start..start + record_size]
    }
}

/// Forward-only reader over `.kmc_suf` records for listing.
pub(crate) struct SuffixStream {
    reader: BufReader<File>,
    record: Vec<u8>,
}

impl SuffixStream {
    pub(crate) fn open(
        path: &Path,
        info: &DatabaseInfo,
        buffer_size: usize,
    ) -> Result<Self, StoreError> {
        let file = open_file(path)?;
        check_suffix_len(info, file.metadata()?.len())?;
        let mut reader = BufReader::with_capacity(buffer_size, file);

        let mut marker = [0u8; 4];
        reader.seek(SeekFrom::End(-4))?;
        reader.read_exact(&mut marker)?;
        let tail_ok = &marker == SUF_MARKER;
        reader.seek(SeekFrom::Start(0))?;
        reader.read_exact(&mut marker)?;
        if !tail_ok || &marker != SUF_MARKER {
            return Err(corrupt("missing KMCS marker"));
        }

        Ok(SuffixStream {
            reader,
            record: vec![0u8; info.record_size()],
        })
    }

    /// Next record in file order.
    pub(crate) fn read_record(&mut self) -> std::io::Result<&[u8]> {
        self.reader.read_exact(&mut self.record)?;
        Ok(&self.record)
    }

    /// Back to the first record.
    pub(crate) fn rewind(&mut self) -> std::io::Result<()> {
        self.reader.seek(SeekFrom::Start(4))?;
        Ok(())
    }
}

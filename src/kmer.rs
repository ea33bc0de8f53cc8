//! Packed k-mer value type.
//!
//! Bit layout (matches the KMC on-disk records):
//! - `ba = (4 - k % 4) % 4` zero padding bases come first, so `k + ba` fills
//!   whole bytes.
//! - base `i` sits at 2-bit slot `p = i + ba`: word `p / 32`, bits
//!   `62 - 2 * (p % 32)` and up. First bases are in the most significant bits.
//! - every bit outside the bases is zero.
//!
//! Read as big-endian bytes, a packed k-mer is therefore `padding+prefix`
//! bytes followed by `suffix` bytes, which is what the store compares against.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::encode::{CasePolicy, code_mask, code_to_base, map_base, revcomp};

/// Longest k-mer a KMC database can hold.
pub const MAX_KMER_LEN: usize = 256;

/// Errors raised while building or converting k-mers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KmerError {
    /// Zero-length k-mer.
    #[error("k-mer must contain at least one base")]
    Empty,
    /// Longer than [`MAX_KMER_LEN`].
    #[error("k-mer length {len} exceeds the maximum of 256")]
    TooLong { len: usize },
    /// Character outside {A,C,G,T} (or {a,c,g,t} when lowercase is accepted).
    #[error("invalid base {base:?} at position {position}")]
    InvalidBase { base: char, position: usize },
    /// Integer view requested for `k > 32`.
    #[error("a {len}-mer does not fit in a 64-bit word")]
    Unrepresentable { len: usize },
    /// Integer has bits set above the lower `2k`.
    #[error("value {value:#x} does not encode a {len}-mer")]
    ValueOutOfRange { value: u64, len: usize },
}

/// A fixed-length DNA k-mer in packed 2-bit form.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Kmer {
    len: usize,
    words: Vec<u64>,
}

#[allow(clippy::len_without_is_empty)]
impl Kmer {
    /// All-`A` k-mer of length `len`, used as a slot for iteration.
    pub fn with_len(len: usize) -> Result<Self, KmerError> {
        if len == 0 {
            return Err(KmerError::Empty);
        }
        if len > MAX_KMER_LEN {
            return Err(KmerError::TooLong { len });
        }
        let ba = byte_alignment(len);
        Ok(Kmer {
            len,
            words: vec![0; (len + ba).div_ceil(32)],
        })
    }

    /// Encode `seq`, validating every byte against `policy`.
    pub fn from_bytes(seq: &[u8], policy: CasePolicy) -> Result<Self, KmerError> {
        let mut kmer = Kmer::with_len(seq.len())?;
        for (i, &b) in seq.iter().enumerate() {
            let code = map_base(b, policy).ok_or(KmerError::InvalidBase {
                base: b as char,
                position: i,
            })?;
            kmer.or_symbol(i, code);
        }
        Ok(kmer)
    }

    /// Inverse of [`Kmer::as_u64`].
    pub fn from_u64(value: u64, len: usize) -> Result<Self, KmerError> {
        let mut kmer = Kmer::with_len(len)?;
        kmer.set_u64(value)?;
        Ok(kmer)
    }

    /// Number of bases.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Zero padding bases in front of the first base.
    #[inline]
    pub fn byte_alignment(&self) -> usize {
        byte_alignment(self.len)
    }

    /// Packed words, most significant bases first.
    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// 2-bit code of base `i`.
    ///
    /// # Panics
    /// If `i >= len()`.
    #[inline]
    pub fn symbol(&self, i: usize) -> u8 {
        assert!(i < self.len, "base {i} out of range for a {}-mer", self.len);
        let (w, shift) = slot(i + self.byte_alignment());
        ((self.words[w] >> shift) & 0b11) as u8
    }

    /// Codes right-aligned in one word: `words[0] >> (64 - 2 * (k + ba))`.
    pub fn as_u64(&self) -> Result<u64, KmerError> {
        if self.len > 32 {
            return Err(KmerError::Unrepresentable { len: self.len });
        }
        let offset = self.len + self.byte_alignment();
        Ok(self.words[0] >> (64 - 2 * offset))
    }

    /// Overwrite this k-mer with the right-aligned codes in `value`.
    pub fn set_u64(&mut self, value: u64) -> Result<(), KmerError> {
        if self.len > 32 {
            return Err(KmerError::Unrepresentable { len: self.len });
        }
        if value & !code_mask(self.len) != 0 {
            return Err(KmerError::ValueOutOfRange {
                value,
                len: self.len,
            });
        }
        self.store_u64(value);
        Ok(())
    }

    /// Right-aligned big-integer view, most significant word first.
    /// For `k <= 32` this is `[as_u64()]`.
    pub fn to_long(&self) -> Vec<u64> {
        let n = (2 * self.len).div_ceil(64);
        let mut out = vec![0u64; n];
        for i in 0..self.len {
            let p = 2 * (self.len - 1 - i);
            out[n - 1 - p / 64] |= (self.symbol(i) as u64) << (p % 64);
        }
        out
    }

    /// Reverse complement: reversed order, A<->T, C<->G.
    pub fn reverse_complement(&self) -> Kmer {
        let mut rc = Kmer {
            len: self.len,
            words: vec![0; self.words.len()],
        };
        if self.len <= 32 {
            let offset = self.len + self.byte_alignment();
            rc.store_u64(revcomp(self.words[0] >> (64 - 2 * offset), self.len));
        } else {
            for i in 0..self.len {
                rc.or_symbol(i, self.symbol(self.len - 1 - i) ^ 0b11);
            }
        }
        rc
    }

    /// Whether this orientation is the smaller of the pair.
    pub fn is_canonical(&self) -> bool {
        self.words <= self.reverse_complement().words
    }

    /// The smaller of this k-mer and its reverse complement.
    pub fn canonical(&self) -> Kmer {
        let rc = self.reverse_complement();
        if self.words <= rc.words { self.clone() } else { rc }
    }

    // ----- packed-byte access used by the store -----

    /// Number of bytes covered by padding + bases.
    #[inline]
    pub(crate) fn packed_len(&self) -> usize {
        (self.len + self.byte_alignment()) / 4
    }

    /// Big-endian byte `i` of the packed words.
    #[inline]
    pub(crate) fn packed_byte(&self, i: usize) -> u8 {
        (self.words[i / 8] >> (56 - 8 * (i % 8))) as u8
    }

    /// OR `b` into big-endian byte `i`. The byte must be clear.
    #[inline]
    pub(crate) fn or_packed_byte(&mut self, i: usize, b: u8) {
        self.words[i / 8] |= (b as u64) << (56 - 8 * (i % 8));
    }

    /// Value of the padding plus the first `prefix_len` bases.
    #[inline]
    pub(crate) fn prefix(&self, prefix_len: usize) -> u64 {
        let bits = 2 * (self.byte_alignment() + prefix_len);
        debug_assert!(bits <= 64);
        if bits == 0 { 0 } else { self.words[0] >> (64 - bits) }
    }

    /// Clear every base, then place `prefix` as the first `prefix_len` bases.
    pub(crate) fn reset_with_prefix(&mut self, prefix: u64, prefix_len: usize) {
        self.words.iter_mut().for_each(|w| *w = 0);
        let bits = 2 * (self.byte_alignment() + prefix_len);
        debug_assert!(bits <= 64);
        if bits != 0 {
            self.words[0] = prefix << (64 - bits);
        }
    }

    #[inline]
    fn or_symbol(&mut self, i: usize, code: u8) {
        let (w, shift) = slot(i + self.byte_alignment());
        self.words[w] |= (code as u64 & 0b11) << shift;
    }

    /// `len <= 32` and `value` already masked.
    #[inline]
    fn store_u64(&mut self, value: u64) {
        let offset = self.len + self.byte_alignment();
        self.words[0] = value << (64 - 2 * offset);
    }
}

/// Padding bases before the first base of a `len`-mer.
#[inline]
pub fn byte_alignment(len: usize) -> usize {
    (4 - len % 4) % 4
}

/// (word index, bit shift) of 2-bit slot `p`.
#[inline]
fn slot(p: usize) -> (usize, usize) {
    (p / 32, 62 - 2 * (p % 32))
}

impl FromStr for Kmer {
    type Err = KmerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kmer::from_bytes(s.as_bytes(), CasePolicy::Strict)
    }
}

impl fmt::Display for Kmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: String = (0..self.len).map(|i| code_to_base(self.symbol(i))).collect();
        f.write_str(&s)
    }
}

impl fmt::Debug for Kmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kmer({self})")
    }
}

//! KMC2 signatures: minimizers with KMC's exclusion rules.
//!
//! A KMC2 database splits its lookup tables into bins. The bin of a k-mer is
//! `signature_map[signature]`, where the signature is the smallest normalized
//! m-mer of the k-mer. Normalization maps an m-mer and its reverse complement
//! to the same value and pushes "disallowed" m-mers (low-complexity prefixes
//! and suffixes) to the sentinel `4^m`.

use crate::encode::revcomp;
use crate::kmer::Kmer;

/// Shortest and longest signature length accepted by the reader.
pub const MIN_SIGNATURE_LEN: usize = 3;
pub const MAX_SIGNATURE_LEN: usize = 11;

/// Normalization table for m-mers of one length.
#[derive(Clone)]
pub struct MmerNorm {
    len: usize,
    norm: Vec<u32>,
}

#[allow(clippy::len_without_is_empty)]
impl MmerNorm {
    /// Build the table for `len`-mers. `None` outside
    /// `MIN_SIGNATURE_LEN..=MAX_SIGNATURE_LEN`.
    pub fn new(len: usize) -> Option<Self> {
        if !(MIN_SIGNATURE_LEN..=MAX_SIGNATURE_LEN).contains(&len) {
            return None;
        }
        let special = 1u32 << (2 * len);
        let norm = (0..special)
            .map(|mmer| {
                let rev = revcomp(mmer as u64, len) as u32;
                let fwd_val = if is_allowed(mmer, len) { mmer } else { special };
                let rev_val = if is_allowed(rev, len) { rev } else { special };
                fwd_val.min(rev_val)
            })
            .collect();
        Some(MmerNorm { len, norm })
    }

    /// Signature length.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Size of a signature map for this length: `4^m + 1`.
    #[inline]
    pub fn map_size(&self) -> usize {
        (1usize << (2 * self.len)) + 1
    }

    /// Normalized value of a raw m-mer code.
    #[inline]
    pub fn normalize(&self, mmer: u32) -> u32 {
        self.norm[mmer as usize]
    }

    /// Smallest normalized m-mer of `kmer`. The k-mer must be at least
    /// `len()` long. Equal for a k-mer and its reverse complement.
    pub fn signature(&self, kmer: &Kmer) -> u32 {
        debug_assert!(kmer.len() >= self.len);
        let mask = (1u32 << (2 * self.len)) - 1;
        let mut cur = 0u32;
        for i in 0..self.len {
            cur = (cur << 2) | kmer.symbol(i) as u32;
        }
        let mut min = self.normalize(cur);
        for i in self.len..kmer.len() {
            cur = ((cur << 2) | kmer.symbol(i) as u32) & mask;
            min = min.min(self.normalize(cur));
        }
        min
    }
}

/// KMC's minimizer filter: reject m-mers with low-complexity ends or an
/// inner `AA`.
fn is_allowed(mut mmer: u32, len: usize) -> bool {
    if (mmer & 0x3f) == 0x3f {
        return false; // TTT suffix
    }
    if (mmer & 0x3f) == 0x3b {
        return false; // TGT suffix
    }
    if (mmer & 0x3c) == 0x3c {
        return false; // TT* suffix
    }

    for _ in 0..len - 3 {
        if (mmer & 0xf) == 0 {
            return false; // AA inside
        }
        mmer >>= 2;
    }

    if mmer == 0 {
        return false; // AAA prefix
    }
    if mmer == 0x04 {
        return false; // ACA prefix
    }
    if (mmer & 0xf) == 0 {
        return false; // *AA prefix
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_bounds() {
        assert!(MmerNorm::new(2).is_none());
        assert!(MmerNorm::new(12).is_none());
        let norm = MmerNorm::new(3).unwrap();
        assert_eq!(norm.map_size(), 65);
    }

    #[test]
    fn excluded_mmers_go_to_sentinel() {
        let norm = MmerNorm::new(3).unwrap();
        let special = 64;
        // AAA and its reverse complement TTT are both excluded
        assert_eq!(norm.normalize(0b00_00_00), special);
        assert_eq!(norm.normalize(0b11_11_11), special);
        // ACG and its reverse complement CGT are both allowed
        assert_eq!(norm.normalize(0b00_01_10), 0b00_01_10u32.min(0b01_10_11));
    }

    #[test]
    fn normalization_is_strand_symmetric() {
        let norm = MmerNorm::new(5).unwrap();
        for mmer in 0..(1u32 << 10) {
            let rev = revcomp(mmer as u64, 5) as u32;
            assert_eq!(norm.normalize(mmer), norm.normalize(rev));
        }
    }

    #[test]
    fn signature_is_strand_symmetric() {
        let norm = MmerNorm::new(4).unwrap();
        let kmer: Kmer = "GATTACAGGCTTAACG".parse().unwrap();
        assert_eq!(norm.signature(&kmer), norm.signature(&kmer.reverse_complement()));
    }
}

//! 2-bit nucleotide mapping and single-word helpers.
//!
//! Conventions
//! - Codes: A=00, C=01, G=10, T=11. Complement is `code ^ 0b11`.
//! - `revcomp` works on **LSB-aligned** codes (lower `2k` bits), the same
//!   shape `Kmer::as_u64` returns.
//! - The packed, byte-aligned layout lives in [`crate::kmer`].

/// Marker for bytes outside the alphabet.
pub const INVALID: u8 = 0xFF;

/// 256-entry LUT: ASCII -> 2-bit, uppercase only, [`INVALID`] otherwise.
pub static MAP_LUT: [u8; 256] = {
    let mut t = [INVALID; 256];
    t[b'A' as usize] = 0;
    t[b'C' as usize] = 1;
    t[b'G' as usize] = 2;
    t[b'T' as usize] = 3;
    t
};

/// Same as [`MAP_LUT`] but also accepting lowercase bases.
pub static MAP_LUT_ANY_CASE: [u8; 256] = {
    let mut t = MAP_LUT;
    t[b'a' as usize] = 0;
    t[b'c' as usize] = 1;
    t[b'g' as usize] = 2;
    t[b't' as usize] = 3;
    t
};

/// 2-bit code -> uppercase ASCII base.
pub const BASES: [u8; 4] = *b"ACGT";

/// How lowercase input is treated when building k-mers from text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CasePolicy {
    /// Only `A`, `C`, `G`, `T` are accepted.
    #[default]
    Strict,
    /// `a`, `c`, `g`, `t` are accepted and mapped like their uppercase forms.
    AcceptLowercase,
}

impl CasePolicy {
    #[inline]
    fn lut(self) -> &'static [u8; 256] {
        match self {
            CasePolicy::Strict => &MAP_LUT,
            CasePolicy::AcceptLowercase => &MAP_LUT_ANY_CASE,
        }
    }
}

/// 2-bit code of `b` under `policy`. `None` if outside the alphabet.
#[inline]
pub fn map_base(b: u8, policy: CasePolicy) -> Option<u8> {
    let v = policy.lut()[b as usize];
    if v <= 3 { Some(v) } else { None }
}

/// ASCII base for a 2-bit code (only the low two bits are used).
#[inline]
pub fn code_to_base(code: u8) -> char {
    BASES[(code & 0b11) as usize] as char
}

/// Reverse-complement an **LSB-aligned** code of `k` bases, `1 <= k <= 32`.
/// Bits above `2k` are ignored.
#[inline]
pub fn revcomp(code_lsb: u64, k: usize) -> u64 {
    debug_assert!((1..=32).contains(&k));
    // complement, then reverse the 2-bit groups of the whole word
    let mut x = !code_lsb;
    x = ((x >> 2) & 0x3333_3333_3333_3333) | ((x & 0x3333_3333_3333_3333) << 2);
    x = ((x >> 4) & 0x0F0F_0F0F_0F0F_0F0F) | ((x & 0x0F0F_0F0F_0F0F_0F0F) << 4);
    x.swap_bytes() >> (64 - 2 * k)
}

/// Mask covering the lower `2k` bits.
#[inline]
pub fn code_mask(k: usize) -> u64 {
    if k >= 32 { u64::MAX } else { (1u64 << (2 * k)) - 1 }
}

//! Writes small KMC databases for the integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use kmc_rs::encode::revcomp;
use kmc_rs::{KMC_VERSION1, KMC_VERSION2, Kmer, MmerNorm};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// In-memory description of a database to write.
pub struct Fixture {
    pub k: usize,
    pub lut_prefix_len: usize,
    pub counter_size: usize,
    pub min_count: u32,
    pub max_count: u32,
    /// `(signature length, bin count)` for a 0x200 layout.
    pub bins: Option<(usize, usize)>,
    /// Header flag; `false` for databases counting each strand separately.
    pub both_strands: bool,
    pub entries: Vec<(Kmer, u64)>,
}

impl Fixture {
    pub fn kmc1(k: usize, lut_prefix_len: usize, entries: Vec<(Kmer, u64)>) -> Self {
        Fixture {
            k,
            lut_prefix_len,
            counter_size: 1,
            min_count: 1,
            max_count: 255,
            bins: None,
            both_strands: true,
            entries,
        }
    }

    pub fn kmc2(
        k: usize,
        lut_prefix_len: usize,
        signature_len: usize,
        bin_count: usize,
        entries: Vec<(Kmer, u64)>,
    ) -> Self {
        Fixture {
            bins: Some((signature_len, bin_count)),
            ..Fixture::kmc1(k, lut_prefix_len, entries)
        }
    }

    fn suffix_len(&self) -> usize {
        (self.k - self.lut_prefix_len) / 4
    }

    fn single_size(&self) -> usize {
        1 << (2 * self.lut_prefix_len)
    }

    /// Lookup-table slot of `kmer`: `bin * 4^lut + prefix`.
    fn slot(&self, kmer: &Kmer) -> usize {
        let bin = match self.bins {
            Some((m, count)) => {
                let sig = MmerNorm::new(m).unwrap().signature(kmer) as usize;
                sig % count
            }
            None => 0,
        };
        let bits = 2 * (kmer.byte_alignment() + self.lut_prefix_len);
        bin * self.single_size() + (kmer.words()[0] >> (64 - bits)) as usize
    }

    fn suffix_bytes(&self, kmer: &Kmer) -> Vec<u8> {
        let packed = packed_bytes(kmer);
        packed[packed.len() - self.suffix_len()..].to_vec()
    }

    /// Entries in the order the `.kmc_suf` file stores them.
    pub fn stored_order(&self) -> Vec<(Kmer, u64)> {
        let mut sorted = self.entries.clone();
        sorted.sort_by_cached_key(|(kmer, _)| (self.slot(kmer), self.suffix_bytes(kmer)));
        sorted
    }

    /// Write `<dir>/<name>.kmc_pre` and `.kmc_suf`; returns the base path.
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let base = dir.join(name);
        let records = self.stored_order();
        let table_len = self.single_size() * self.bins.map_or(1, |(_, n)| n);

        let mut starts = vec![0u64; table_len + 1];
        for (kmer, _) in &records {
            starts[self.slot(kmer) + 1] += 1;
        }
        for i in 1..starts.len() {
            starts[i] += starts[i - 1];
        }

        let mut pre = b"KMCP".to_vec();
        for &s in &starts[..table_len] {
            pre.extend_from_slice(&s.to_le_bytes());
        }
        if let Some((m, count)) = self.bins {
            let map_size = (1usize << (2 * m)) + 1;
            for s in 0..map_size {
                pre.extend_from_slice(&((s % count) as u32).to_le_bytes());
            }
        }
        let header = self.header(records.len() as u64);
        pre.extend_from_slice(&header);
        pre.extend_from_slice(&(header.len() as u32).to_le_bytes());
        pre.extend_from_slice(b"KMCP");
        fs::write(base.with_extension("kmc_pre"), pre).unwrap();

        let mut suf = b"KMCS".to_vec();
        for (kmer, count) in &records {
            suf.extend_from_slice(&self.suffix_bytes(kmer));
            suf.extend_from_slice(&count.to_le_bytes()[..self.counter_size]);
        }
        suf.extend_from_slice(b"KMCS");
        fs::write(base.with_extension("kmc_suf"), suf).unwrap();

        base
    }

    fn header(&self, total: u64) -> Vec<u8> {
        let mut h = Vec::new();
        for v in [self.k as u32, 0, self.counter_size as u32, self.lut_prefix_len as u32] {
            h.extend_from_slice(&v.to_le_bytes());
        }
        if let Some((m, _)) = self.bins {
            h.extend_from_slice(&(m as u32).to_le_bytes());
        }
        h.extend_from_slice(&self.min_count.to_le_bytes());
        h.extend_from_slice(&self.max_count.to_le_bytes());
        h.extend_from_slice(&total.to_le_bytes());
        h.push(if self.both_strands { 0 } else { 1 });
        let version = if self.bins.is_some() {
            KMC_VERSION2
        } else {
            KMC_VERSION1
        };
        h.extend_from_slice(&version.to_le_bytes());
        h
    }
}

/// Big-endian bytes of the packed words covering padding + bases.
pub fn packed_bytes(kmer: &Kmer) -> Vec<u8> {
    let n = (kmer.len() + kmer.byte_alignment()) / 4;
    kmer.words()
        .iter()
        .flat_map(|w| w.to_be_bytes())
        .take(n)
        .collect()
}

/// TAAGA with count 4 plus the 290 smallest other canonical 5-mers, each
/// counted `1 + code % 9` times.
pub fn five_mer_entries() -> Vec<(Kmer, u64)> {
    let taaga: Kmer = "TAAGA".parse().unwrap();
    let taaga_code = taaga.as_u64().unwrap();
    let mut entries = vec![(taaga, 4)];
    entries.extend(
        (0..1024u64)
            .filter(|&v| v <= revcomp(v, 5) && v != taaga_code)
            .take(290)
            .map(|v| (Kmer::from_u64(v, 5).unwrap(), 1 + v % 9)),
    );
    entries
}

/// Canonical 5-mers not present in [`five_mer_entries`].
pub fn absent_five_mers() -> Vec<Kmer> {
    let stored: Vec<u64> = five_mer_entries()
        .iter()
        .map(|(k, _)| k.as_u64().unwrap())
        .collect();
    (0..1024u64)
        .filter(|&v| v <= revcomp(v, 5) && !stored.contains(&v))
        .map(|v| Kmer::from_u64(v, 5).unwrap())
        .collect()
}

/// `n` distinct canonical k-mers drawn from a fixed-seed generator.
pub fn long_entries(k: usize, n: usize) -> Vec<(Kmer, u64)> {
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        let seq: String = (0..k).map(|_| b"ACGT"[(next() & 3) as usize] as char).collect();
        let kmer = seq.parse::<Kmer>().unwrap().canonical();
        if seen.insert(kmer.clone()) {
            let count = 1 + next() % 200;
            out.push((kmer, count));
        }
    }
    out
}

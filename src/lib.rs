//! Read-only access to KMC k-mer count databases (edition 2024).
//!
//! A database is the pair `<base>.kmc_pre` + `<base>.kmc_suf` written by KMC
//! (layout version 0 for KMC1, 0x200 for KMC2/KMC3). It is opened either for
//! point queries or for listing; the mode is fixed for the life of the handle.
//!
//! - [`Kmer`]: packed 2-bit k-mer, byte-aligned the same way KMC stores it.
//! - [`KmerCountStore`]: `count_kmer` in random-access mode, `read_next` /
//!   [`Records`] in listing mode.
//! - [`StoreConfig`]: count thresholds, canonical fallback, mmap and buffering.
//!
//! ```no_run
//! use kmc_rs::{Kmer, KmerCountStore};
//!
//! let store = KmerCountStore::open_random_access("data/test1")?;
//! let kmer: Kmer = "TCTTA".parse()?;
//! println!("{kmer}: {}", store.count_kmer(&kmer)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod config;
pub mod encode;
mod io;
pub mod kmer;
pub mod mmer;
mod store;

pub use config::StoreConfig;
pub use encode::CasePolicy;
pub use io::{DatabaseInfo, KMC_VERSION1, KMC_VERSION2};
pub use kmer::{Kmer, KmerError, MAX_KMER_LEN};
pub use mmer::MmerNorm;
pub use store::{KmerCountStore, OpenMode, Records, StoreError};

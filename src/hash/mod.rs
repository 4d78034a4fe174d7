//! File hashing
//!
//! Two tiers of hash function:
//! - fast kinds detect likely changes cheaply and may flag unchanged files
//! - full kinds checksum the whole content and are authoritative

pub mod digest;
mod engine;

pub use engine::{ComputedHashes, HashEngine};

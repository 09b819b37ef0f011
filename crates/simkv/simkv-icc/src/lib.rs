//! `simkv-icc`: the shared mutable state workers and dispatch policies
//! coordinate through — the bucketed index (version counters + waiter
//! lists) and the exclusive-bucket map used by dynamic-CREW.
//!
//! Everything here is single-threaded: "concurrency control" means
//! cooperative ordering between process steps, not real atomics.

mod bucket_version;
mod exclusive_map;
mod index;

pub use bucket_version::{BucketVersion, is_odd};
pub use exclusive_map::ExclusiveBucketMap;
pub use index::BucketedIndex;

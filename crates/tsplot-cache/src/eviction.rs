//! Pluggable eviction hook.
//!
//! Fragments are kept for the life of a series; no bounded policy is
//! shipped (there is no LRU/size-bound logic to run), but the trait seam
//! exists so a host can plug one in without touching the coordinator.

use uuid::Uuid;

use crate::fragment::Fragment;

pub trait EvictionPolicy: Send + Sync {
    /// Called after a fragment (placeholder or populated) is inserted into
    /// a series/resolution's interval index.
    fn on_insert(&self, uuid: Uuid, pwe: u8, fragment: &Fragment);
}

/// The default policy: retain every fragment for the life of the cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unbounded;

impl EvictionPolicy for Unbounded {
    fn on_insert(&self, _uuid: Uuid, _pwe: u8, _fragment: &Fragment) {}
}

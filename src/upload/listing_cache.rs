//! Per-run cache of remote folder listings.
//!
//! Shared by all upload workers of one phase. A commit into a folder drops
//! that folder's entry and bumps its generation, so a listing that was taken
//! before the commit can never be stored after it.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    names: Option<Arc<HashSet<String>>>,
}

/// Folder path to the set of entry names seen in it.
#[derive(Debug, Default)]
pub struct ListingCache {
    folders: DashMap<String, Slot>,
}

impl ListingCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached listing of `folder`, if any.
    #[must_use]
    pub fn get(&self, folder: &str) -> Option<Arc<HashSet<String>>> {
        self.folders.get(folder).and_then(|slot| slot.names.clone())
    }

    /// Current generation of `folder`; read it before listing the folder.
    #[must_use]
    pub fn generation(&self, folder: &str) -> u64 {
        self.folders.get(folder).map_or(0, |slot| slot.generation)
    }

    /// Stores a listing taken at `generation` and returns the shared copy.
    ///
    /// The listing is not cached when the folder was invalidated since
    /// `generation` was read.
    pub fn insert(
        &self,
        folder: &str,
        generation: u64,
        names: HashSet<String>,
    ) -> Arc<HashSet<String>> {
        let names = Arc::new(names);
        let mut slot = self.folders.entry(folder.to_string()).or_default();
        if slot.generation == generation {
            slot.names = Some(Arc::clone(&names));
        }
        names
    }

    /// Drops the cached listing of `folder`.
    pub fn invalidate(&self, folder: &str) {
        let mut slot = self.folders.entry(folder.to_string()).or_default();
        slot.generation += 1;
        slot.names = None;
    }
}

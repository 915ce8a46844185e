//! Per-location searcher cache.
//!
//! Each index location gets a [`Slot`] holding the currently installed
//! [`SearcherSnapshot`]. A `get` returns the installed snapshot while the
//! index on disk is unchanged, and opens a fresh one when a writer has
//! committed since. Snapshots are handed out as `Arc`s: a query that started
//! on an older generation keeps running against it, and the old generation is
//! released when its last holder drops it.
//!
//! Refreshes for one location are serialized by the slot's refresh lock. A
//! caller that finds a refresh in flight takes the still-installed previous
//! snapshot instead of waiting; only the very first open of a location makes
//! concurrent callers wait.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tantivy::{Index, Searcher};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::search::tantivy::{IndexVersion, manual_reader, open_index};

/// Shared, ready-to-query handle.
pub type SearcherHandle = Arc<SearcherSnapshot>;

/// Immutable point-in-time view of one index.
pub struct SearcherSnapshot {
    location: PathBuf,
    searcher: Searcher,
    version: IndexVersion,
    generation: u64,
}

impl SearcherSnapshot {
    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    pub fn index(&self) -> &Index {
        self.searcher.index()
    }

    pub fn schema(&self) -> tantivy::schema::Schema {
        self.searcher.schema().clone()
    }

    pub fn version(&self) -> &IndexVersion {
        &self.version
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn num_docs(&self) -> u64 {
        self.searcher.num_docs()
    }
}

impl std::fmt::Debug for SearcherSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearcherSnapshot")
            .field("location", &self.location)
            .field("version", &self.version)
            .field("generation", &self.generation)
            .finish()
    }
}

struct Installed {
    handle: SearcherHandle,
    checked_at: Instant,
}

#[derive(Default)]
struct Slot {
    installed: RwLock<Option<Installed>>,
    refresh: Mutex<()>,
}

impl Slot {
    fn current(&self) -> Option<SearcherHandle> {
        self.installed.read().as_ref().map(|i| Arc::clone(&i.handle))
    }

    fn fresh_enough(&self, interval: Duration) -> Option<SearcherHandle> {
        let installed = self.installed.read();
        let current = installed.as_ref()?;
        (current.checked_at.elapsed() < interval).then(|| Arc::clone(&current.handle))
    }

    fn install(&self, handle: SearcherHandle) {
        *self.installed.write() = Some(Installed {
            handle,
            checked_at: Instant::now(),
        });
    }

    fn mark_checked(&self) {
        if let Some(current) = self.installed.write().as_mut() {
            current.checked_at = Instant::now();
        }
    }
}

/// Location -> live snapshot map. Create one per process and share it.
pub struct SearcherCache {
    slots: RwLock<HashMap<PathBuf, Arc<Slot>>>,
    refresh_interval: Duration,
}

impl Default for SearcherCache {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl SearcherCache {
    /// `refresh_interval` bounds how often the on-disk version is checked per
    /// location. Zero checks on every `get`.
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            refresh_interval,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    fn slot(&self, location: &Path) -> Arc<Slot> {
        if let Some(slot) = self.slots.read().get(location) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(slots.entry(location.to_path_buf()).or_default())
    }

    /// Snapshot for `location`, opened or refreshed as needed.
    pub fn get(&self, location: &Path) -> EngineResult<SearcherHandle> {
        let slot = self.slot(location);

        if let Some(handle) = slot.fresh_enough(self.refresh_interval) {
            debug!(location = %location.display(), generation = handle.generation, "searcher cache hit");
            return Ok(handle);
        }

        let _refresh = match slot.refresh.try_lock() {
            Some(guard) => guard,
            None => {
                if let Some(handle) = slot.current() {
                    debug!(location = %location.display(), "refresh in flight; serving previous generation");
                    return Ok(handle);
                }
                slot.refresh.lock()
            }
        };

        // Another caller may have finished the refresh while we waited.
        if let Some(handle) = slot.fresh_enough(self.refresh_interval) {
            return Ok(handle);
        }

        let previous = slot.current();
        if let Some(prev) = &previous {
            let on_disk = IndexVersion::load(prev.index())
                .map_err(|e| EngineError::unavailable(location, e))?;
            if on_disk == prev.version {
                slot.mark_checked();
                return Ok(Arc::clone(prev));
            }
        }

        let generation = previous.as_ref().map_or(1, |p| p.generation + 1);
        let snapshot = match open_snapshot(location, generation) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if previous.is_none() {
                    self.forget_empty(location, &slot);
                }
                return Err(e);
            }
        };
        let handle = Arc::new(snapshot);
        info!(
            location = %location.display(),
            generation = generation,
            opstamp = handle.version.opstamp,
            docs = handle.num_docs(),
            "installed searcher"
        );
        slot.install(Arc::clone(&handle));
        Ok(handle)
    }

    /// Drop a slot that never got a snapshot. The caller holds the slot's
    /// refresh lock, so no other open is in flight.
    fn forget_empty(&self, location: &Path, slot: &Arc<Slot>) {
        let mut slots = self.slots.write();
        if let Some(current) = slots.get(location)
            && Arc::ptr_eq(current, slot)
            && slot.current().is_none()
        {
            slots.remove(location);
        }
    }

    /// Generation currently installed for `location`, if any.
    pub fn generation(&self, location: &Path) -> Option<u64> {
        self.slots
            .read()
            .get(location)
            .and_then(|slot| slot.current())
            .map(|h| h.generation)
    }

    /// Forget `location`. Outstanding handles stay valid.
    pub fn invalidate(&self, location: &Path) -> bool {
        self.slots.write().remove(location).is_some()
    }

    /// Drop every slot; used at shutdown.
    pub fn clear(&self) {
        self.slots.write().clear();
    }

    /// Number of locations with a slot.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn open_snapshot(location: &Path, generation: u64) -> EngineResult<SearcherSnapshot> {
    let start = Instant::now();
    let unavailable = |e| EngineError::unavailable(location, e);
    let index = open_index(location).map_err(unavailable)?;
    // Version first: if a commit lands in between, the reader is newer than
    // the recorded version and the next check reopens once more.
    let version = IndexVersion::load(&index).map_err(unavailable)?;
    let reader = manual_reader(&index).map_err(unavailable)?;
    let searcher = reader.searcher();
    debug!(
        location = %location.display(),
        elapsed_ms = start.elapsed().as_millis(),
        "opened searcher"
    );
    Ok(SearcherSnapshot {
        location: location.to_path_buf(),
        searcher,
        version,
        generation,
    })
}

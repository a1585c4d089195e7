//! Load-state registry: one entry per catalogued model.
//!
//! The registry enforces the lifecycle Unloaded -> Loading -> {Ready,
//! Failed} -> Unloading -> Unloaded with exactly one transition in flight
//! per key. Callers that arrive behind an in-flight load wait for it and
//! observe its outcome instead of starting a second load.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::error::ServeError;

use super::catalog::{ModelCatalog, ModelKey};
use super::loader::{LoadedModel, ModelLoader};

/// Lifecycle state of one registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Unloaded,
    Loading,
    Ready,
    Unloading,
    Failed,
}

struct EntryCell {
    state: LoadState,
    /// Present only in Ready.
    handle: Option<Arc<LoadedModel>>,
    /// Present only in Failed.
    error: Option<String>,
    since: Instant,
}

struct EntrySlot {
    key: ModelKey,
    /// Serializes load/unload transitions for this key. Held across the
    /// slow loader calls; never held while reading status.
    transition: Mutex<()>,
    cell: RwLock<EntryCell>,
    /// Batches currently dispatched against the Ready handle.
    in_flight: AtomicU32,
    drained: Notify,
}

impl EntrySlot {
    fn new(key: ModelKey) -> Self {
        Self {
            key,
            transition: Mutex::new(()),
            cell: RwLock::new(EntryCell {
                state: LoadState::Unloaded,
                handle: None,
                error: None,
                since: Instant::now(),
            }),
            in_flight: AtomicU32::new(0),
            drained: Notify::new(),
        }
    }

    fn state(&self) -> LoadState {
        self.cell.read().state
    }

    fn error_detail(&self) -> Option<String> {
        self.cell.read().error.clone()
    }

    /// Ready fast path: clone the handle and open a flight while the read
    /// lock still observes Ready, so an unload cannot slip in between the
    /// check and the acquisition.
    fn acquire_ready(slot: &Arc<Self>) -> Option<ReadyModel> {
        let cell = slot.cell.read();
        match (cell.state, &cell.handle) {
            (LoadState::Ready, Some(handle)) => {
                let handle = Arc::clone(handle);
                slot.in_flight.fetch_add(1, Ordering::SeqCst);
                Some(ReadyModel {
                    handle,
                    _flight: FlightGuard {
                        slot: Arc::clone(slot),
                    },
                })
            }
            _ => None,
        }
    }

    fn set_state(&self, next: LoadState) {
        let mut cell = self.cell.write();
        let held_ms = cell.since.elapsed().as_millis() as u64;
        debug!(model = %self.key, from = ?cell.state, to = ?next, held_ms, "registry transition");
        cell.state = next;
        cell.since = Instant::now();
    }

    fn promote_ready(slot: &Arc<Self>, handle: Arc<LoadedModel>) -> ReadyModel {
        {
            let mut cell = slot.cell.write();
            debug!(model = %slot.key, from = ?cell.state, to = ?LoadState::Ready, "registry transition");
            cell.state = LoadState::Ready;
            cell.handle = Some(Arc::clone(&handle));
            cell.error = None;
            cell.since = Instant::now();
        }
        slot.in_flight.fetch_add(1, Ordering::SeqCst);
        ReadyModel {
            handle,
            _flight: FlightGuard {
                slot: Arc::clone(slot),
            },
        }
    }

    fn park_failed(&self, detail: String) {
        let mut cell = self.cell.write();
        debug!(model = %self.key, from = ?cell.state, to = ?LoadState::Failed, "registry transition");
        cell.state = LoadState::Failed;
        cell.handle = None;
        cell.error = Some(detail);
        cell.since = Instant::now();
    }

    /// Move to Unloading and take the handle out of the cell. After the
    /// write lock drops, no new flight can open.
    fn begin_unloading(&self) -> Option<Arc<LoadedModel>> {
        let mut cell = self.cell.write();
        debug!(model = %self.key, from = ?cell.state, to = ?LoadState::Unloading, "registry transition");
        cell.state = LoadState::Unloading;
        cell.since = Instant::now();
        cell.handle.take()
    }

    fn clear_unloaded(&self) {
        let mut cell = self.cell.write();
        debug!(model = %self.key, from = ?cell.state, to = ?LoadState::Unloaded, "registry transition");
        cell.state = LoadState::Unloaded;
        cell.handle = None;
        cell.error = None;
        cell.since = Instant::now();
    }

    async fn wait_drained(&self) {
        loop {
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            self.drained.notified().await;
        }
    }
}

/// RAII marker for one batch dispatched against a Ready handle. Unload
/// waits until every guard for the key has dropped.
struct FlightGuard {
    slot: Arc<EntrySlot>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if self.slot.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.slot.drained.notify_one();
        }
    }
}

/// A Ready handle plus the in-flight marker that keeps it valid until the
/// batch using it completes.
pub struct ReadyModel {
    handle: Arc<LoadedModel>,
    _flight: FlightGuard,
}

impl ReadyModel {
    pub fn model(&self) -> &LoadedModel {
        &self.handle
    }
}

/// Tracks load state for every catalogued model.
///
/// Per-key slots are allocated once from the catalogue; there is no
/// global lock, and keys transition fully independently.
pub struct ModelRegistry {
    catalog: Arc<ModelCatalog>,
    loader: ModelLoader,
    slots: HashMap<ModelKey, Arc<EntrySlot>>,
}

impl ModelRegistry {
    pub fn new(catalog: Arc<ModelCatalog>) -> Self {
        let slots = catalog
            .keys()
            .iter()
            .map(|key| (key.clone(), Arc::new(EntrySlot::new(key.clone()))))
            .collect();
        Self {
            catalog,
            loader: ModelLoader::new(),
            slots,
        }
    }

    fn slot(&self, key: &ModelKey) -> Result<&Arc<EntrySlot>, ServeError> {
        self.slots
            .get(key)
            .ok_or_else(|| ServeError::ModelNotFound(key.clone()))
    }

    /// Resolve a Ready handle, loading on demand.
    ///
    /// Ready entries return immediately without touching the transition
    /// lock. Otherwise the caller queues on the per-key transition mutex;
    /// a caller that observed Loading reports that attempt's outcome
    /// rather than launching a second load, while a caller that saw
    /// Unloaded or Failed may start a fresh attempt.
    pub async fn ensure_ready(&self, key: &ModelKey) -> Result<ReadyModel, ServeError> {
        let slot = self.slot(key)?;
        if let Some(ready) = EntrySlot::acquire_ready(slot) {
            return Ok(ready);
        }

        let observed = slot.state();
        let _transition = slot.transition.lock().await;

        // The in-flight transition we queued behind has settled.
        if let Some(ready) = EntrySlot::acquire_ready(slot) {
            return Ok(ready);
        }
        if slot.state() == LoadState::Failed && observed == LoadState::Loading {
            return Err(ServeError::ModelLoadFailed {
                key: key.clone(),
                detail: slot.error_detail().unwrap_or_default(),
            });
        }

        let descriptor = self
            .catalog
            .get(key)
            .ok_or_else(|| ServeError::ModelNotFound(key.clone()))?;

        slot.set_state(LoadState::Loading);
        match self.loader.load(descriptor).await {
            Ok(handle) => Ok(EntrySlot::promote_ready(slot, handle)),
            Err(error) => {
                let detail = error.to_string();
                slot.park_failed(detail.clone());
                Err(ServeError::ModelLoadFailed {
                    key: key.clone(),
                    detail,
                })
            }
        }
    }

    /// Unload a model, waiting for batches dispatched against its handle.
    ///
    /// An entry already Unloaded is a no-op. A contended key (load or
    /// unload in flight) fails with `Busy` instead of racing. A Failed
    /// entry clears to Unloaded without a loader call.
    pub async fn unload(&self, key: &ModelKey) -> Result<LoadState, ServeError> {
        let slot = self.slot(key)?;
        let Ok(_transition) = slot.transition.try_lock() else {
            return Err(ServeError::Busy { key: key.clone() });
        };

        match slot.state() {
            LoadState::Unloaded => Ok(LoadState::Unloaded),
            LoadState::Failed => {
                slot.clear_unloaded();
                Ok(LoadState::Unloaded)
            }
            LoadState::Ready => {
                let handle = slot.begin_unloading();
                slot.wait_drained().await;
                let outcome = match &handle {
                    Some(handle) => self.loader.unload(handle).await,
                    None => Ok(()),
                };
                slot.clear_unloaded();
                match outcome {
                    Ok(()) => Ok(LoadState::Unloaded),
                    Err(error) => Err(ServeError::ModelUnloadFailed {
                        key: key.clone(),
                        detail: error.to_string(),
                    }),
                }
            }
            // Loading/Unloading cannot be observed while holding the
            // transition lock; report contention if it ever happens.
            LoadState::Loading | LoadState::Unloading => Err(ServeError::Busy { key: key.clone() }),
        }
    }

    /// Current state for one key. Non-blocking.
    pub fn status(&self, key: &ModelKey) -> Result<LoadState, ServeError> {
        Ok(self.slot(key)?.state())
    }

    /// Current state for every key, in catalogue order. Non-blocking.
    pub fn list_status(&self) -> Vec<(ModelKey, LoadState)> {
        self.catalog
            .keys()
            .iter()
            .map(|key| {
                let state = self
                    .slots
                    .get(key)
                    .map(|slot| slot.state())
                    .unwrap_or(LoadState::Unloaded);
                (key.clone(), state)
            })
            .collect()
    }

    /// Number of entries currently Ready.
    pub fn ready_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.state() == LoadState::Ready)
            .count()
    }

    /// Stored failure detail for a Failed entry.
    pub fn error_detail(&self, key: &ModelKey) -> Option<String> {
        self.slots.get(key).and_then(|slot| slot.error_detail())
    }
}

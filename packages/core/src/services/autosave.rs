//! Expand/Collapse Auto-Save
//!
//! Expand state is lightweight and non-destructive, so unlike every other edit it
//! is saved without an explicit save action: each toggle resets a debounce timer
//! and, after a quiet period, the latest state of every toggled node goes out as
//! one batch of `nodeUpdates[{nodeId, expanded}]`.
//!
//! # Rules
//!
//! - Toggles on temporary nodes wait until the node has a permanent id
//! - `shutdown()` (and dropping the last handle) flushes instead of discarding
//! - A failed flush keeps the toggles for the next attempt unless newer ones
//!   replaced them
//! - These batches never carry creates, so they never race an identifier remap
//!   and need no single-flight guard

use crate::db::batch::{BatchRequest, NodeUpdate};
use crate::db::{DocumentStore, StoreError};
use crate::services::identifier::{is_temporary, remap_keys, IdRemap, Remappable};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

struct AutosaveInner {
    store: Arc<dyn DocumentStore>,
    debounce: Duration,
    pending: Mutex<HashMap<String, bool>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl AutosaveInner {
    /// Remove every sendable toggle and build its request
    fn take_request(&self) -> Option<(BatchRequest, HashMap<String, bool>)> {
        let mut pending = self.pending.lock().ok()?;
        let ready: Vec<String> = pending
            .keys()
            .filter(|id| !is_temporary(id))
            .cloned()
            .collect();
        if ready.is_empty() {
            return None;
        }
        let taken: HashMap<String, bool> = ready
            .into_iter()
            .filter_map(|id| pending.remove(&id).map(|expanded| (id, expanded)))
            .collect();

        let mut node_updates: Vec<NodeUpdate> = taken
            .iter()
            .map(|(id, expanded)| NodeUpdate {
                node_id: id.clone(),
                expanded: Some(*expanded),
                ..NodeUpdate::default()
            })
            .collect();
        node_updates.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        let request = BatchRequest {
            node_updates,
            ..BatchRequest::default()
        };
        Some((request, taken))
    }

    /// Put back toggles a failed flush took, unless newer ones arrived meanwhile
    fn restore(&self, taken: HashMap<String, bool>) {
        if let Ok(mut pending) = self.pending.lock() {
            for (id, expanded) in taken {
                pending.entry(id).or_insert(expanded);
            }
        }
    }

    async fn flush(&self) -> Result<usize, StoreError> {
        let Some((request, taken)) = self.take_request() else {
            return Ok(0);
        };
        let count = taken.len();
        let outcome = match self.store.save_batch(&request).await {
            Ok(response) if response.success => {
                for warning in response.errors() {
                    tracing::warn!("Expansion auto-save warning: {}", warning);
                }
                Ok(count)
            }
            Ok(response) => Err(StoreError::rejected(response.errors().to_vec())),
            Err(err) => Err(err),
        };
        match &outcome {
            Ok(count) => tracing::debug!("Auto-saved expand state of {} nodes", count),
            Err(err) => {
                tracing::warn!("Expansion auto-save failed, will retry: {}", err);
                self.restore(taken);
            }
        }
        outcome
    }

    fn cancel_timer(&self) {
        if let Ok(mut timer) = self.timer.lock() {
            if let Some(handle) = timer.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for AutosaveInner {
    fn drop(&mut self) {
        let Some((request, _)) = self.take_request() else {
            return;
        };
        match Handle::try_current() {
            Ok(handle) => {
                let store = Arc::clone(&self.store);
                handle.spawn(async move {
                    if let Err(err) = store.save_batch(&request).await {
                        tracing::warn!("Final expansion auto-save failed: {}", err);
                    }
                });
            }
            Err(_) => tracing::warn!(
                "Dropping {} expand toggles: no runtime to flush them on",
                request.node_updates.len()
            ),
        }
    }
}

/// Debounced saver for node expand/collapse state
#[derive(Clone)]
pub struct ExpansionAutosave {
    inner: Arc<AutosaveInner>,
}

impl std::fmt::Debug for ExpansionAutosave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpansionAutosave")
            .field("debounce", &self.inner.debounce)
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl ExpansionAutosave {
    pub fn new(store: Arc<dyn DocumentStore>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(AutosaveInner {
                store,
                debounce,
                pending: Mutex::new(HashMap::new()),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Record a toggle and restart the quiet period
    pub fn toggle(&self, node_id: &str, expanded: bool) {
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.insert(node_id.to_string(), expanded);
        }
        self.schedule();
    }

    fn schedule(&self) {
        self.inner.cancel_timer();
        let Ok(handle) = Handle::try_current() else {
            tracing::debug!("No runtime for the auto-save timer; toggles wait for shutdown()");
            return;
        };
        let weak: Weak<AutosaveInner> = Arc::downgrade(&self.inner);
        let debounce = self.inner.debounce;
        let task = handle.spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Some(inner) = weak.upgrade() {
                // Errors are logged and the toggles kept by flush().
                let _ = inner.flush().await;
            }
        });
        if let Ok(mut timer) = self.inner.timer.lock() {
            *timer = Some(task);
        }
    }

    /// Send every sendable toggle now
    pub async fn flush(&self) -> Result<usize, StoreError> {
        self.inner.flush().await
    }

    /// Stop the timer and flush immediately
    pub async fn shutdown(&self) -> Result<usize, StoreError> {
        self.inner.cancel_timer();
        self.inner.flush().await
    }

    /// Toggles not yet sent, including those waiting for a permanent id
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn pending(&self, node_id: &str) -> Option<bool> {
        self.inner
            .pending
            .lock()
            .ok()
            .and_then(|p| p.get(node_id).copied())
    }

    /// Drop toggles of deleted nodes
    pub fn forget(&self, ids: &HashSet<String>) {
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.retain(|id, _| !ids.contains(id));
        }
    }
}

impl Remappable for ExpansionAutosave {
    fn remap_ids(&mut self, remap: &IdRemap) -> usize {
        let rewritten = match self.inner.pending.lock() {
            Ok(mut pending) => remap_keys(&mut pending, remap),
            Err(_) => 0,
        };
        if rewritten > 0 {
            self.schedule();
        }
        rewritten
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn autosave() -> (Arc<MemoryStore>, ExpansionAutosave) {
        let store = Arc::new(MemoryStore::new());
        let autosave = ExpansionAutosave::new(store.clone(), Duration::from_millis(1200));
        (store, autosave)
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggles_are_debounced_into_one_batch() {
        let (store, autosave) = autosave();

        autosave.toggle("n1", true);
        tokio::time::sleep(Duration::from_millis(800)).await;
        autosave.toggle("n1", false);
        autosave.toggle("n2", true);
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(store.requests().await.is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        let requests = store.requests().await;
        assert_eq!(requests.len(), 1);
        let updates = &requests[0].node_updates;
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].node_id, "n1");
        assert_eq!(updates[0].expanded, Some(false));
        assert_eq!(autosave.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_immediately() {
        let (store, autosave) = autosave();
        autosave.toggle("n1", true);

        assert_eq!(autosave.shutdown().await.unwrap(), 1);
        assert_eq!(store.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_temporary_nodes_wait_for_remap() {
        let (store, mut autosave) = autosave();
        autosave.toggle("tmp-a", true);

        assert_eq!(autosave.flush().await.unwrap(), 0);
        assert!(store.requests().await.is_empty());

        let remap = IdRemap::new(
            [("tmp-a".to_string(), "n1".to_string())].into(),
            Default::default(),
        );
        autosave.remap_ids(&remap);
        assert_eq!(autosave.pending("n1"), Some(true));
        assert_eq!(autosave.shutdown().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_toggles() {
        let (store, autosave) = autosave();
        store.fail_next(StoreError::transport("offline")).await;
        autosave.toggle("n1", true);

        assert!(autosave.flush().await.is_err());
        assert_eq!(autosave.pending("n1"), Some(true));
        assert_eq!(autosave.flush().await.unwrap(), 1);
    }
}

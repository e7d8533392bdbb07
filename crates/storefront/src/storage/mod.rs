//! Durable key-value storage for shopper state.
//!
//! This is the server-side stand-in for browser local storage: a synchronous
//! string-to-string map, partitioned per shopper, with change notifications
//! delivered to every other handle on the same partition.
//!
//! # Concepts
//!
//! - [`StorageBackend`] - where the bytes live ([`MemoryBackend`], [`FileBackend`]).
//! - [`StorageService`] - one backend plus the change-event channel. Shared
//!   process-wide through `AppState`.
//! - [`StorageArea`] - one browsing context's view of one partition. Every
//!   area gets its own [`ContextId`], the analogue of a browser tab.
//! - [`StorageSubscription`] - change events for a partition, excluding the
//!   subscriber's own writes (browsers never deliver a `storage` event to the
//!   tab that made the change).
//!
//! Writes are full-value overwrites. Two contexts writing the same key race
//! last-write-wins; nothing here merges.

mod file;
mod memory;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Buffered change events per subscriber before it starts lagging.
pub(crate) const EVENT_CAPACITY: usize = 256;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The key cannot be stored by this backend.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// A synchronous key-value backend.
///
/// Implementations must be safe to share between request handlers.
pub trait StorageBackend: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`. Deleting an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be modified.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Identifies one storage handle (one "tab").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

/// A change made through some [`StorageArea`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Partition the change happened in.
    pub partition: String,
    /// Key within the partition.
    pub key: String,
    /// New value, or `None` when the key was removed.
    pub new_value: Option<String>,
    /// Context that made the change.
    pub origin: ContextId,
}

/// Shared storage service: a backend plus the change-event channel.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct StorageService {
    inner: Arc<StorageServiceInner>,
}

struct StorageServiceInner {
    backend: Arc<dyn StorageBackend>,
    events: broadcast::Sender<StorageEvent>,
    next_context: AtomicU64,
}

impl StorageService {
    /// Create a service over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(StorageServiceInner {
                backend,
                events,
                next_context: AtomicU64::new(1),
            }),
        }
    }

    /// Create a service backed by process memory (nothing survives a restart).
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Open a new browsing context on `partition`.
    #[must_use]
    pub fn area(&self, partition: &str) -> StorageArea {
        let context = ContextId(self.inner.next_context.fetch_add(1, Ordering::Relaxed));
        StorageArea {
            service: self.clone(),
            partition: partition.to_owned(),
            context,
        }
    }
}

/// One browsing context's handle on a storage partition.
#[derive(Clone)]
pub struct StorageArea {
    service: StorageService,
    partition: String,
    context: ContextId,
}

impl std::fmt::Debug for StorageArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageArea")
            .field("partition", &self.partition)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl StorageArea {
    /// Partition this area reads and writes.
    #[must_use]
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// This handle's context id.
    #[must_use]
    pub const fn context(&self) -> ContextId {
        self.context
    }

    fn slot(&self, key: &str) -> String {
        format!("{}:{key}", self.partition)
    }

    /// Read `key` from this partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.service.inner.backend.get(&self.slot(key))
    }

    /// Write `key` and notify other contexts on the partition.
    ///
    /// Writing the value already stored is a no-op and sends no event.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or written.
    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let slot = self.slot(key);
        let backend = &self.service.inner.backend;
        if backend.get(&slot)?.as_deref() == Some(value) {
            return Ok(());
        }
        backend.set(&slot, value)?;
        self.notify(key, Some(value.to_owned()));
        Ok(())
    }

    /// Remove `key` and notify other contexts on the partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be modified.
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let slot = self.slot(key);
        let backend = &self.service.inner.backend;
        if backend.get(&slot)?.is_none() {
            return Ok(());
        }
        backend.remove(&slot)?;
        self.notify(key, None);
        Ok(())
    }

    /// Subscribe to changes other contexts make on this partition.
    #[must_use]
    pub fn subscribe(&self) -> StorageSubscription {
        StorageSubscription {
            receiver: self.service.inner.events.subscribe(),
            partition: self.partition.clone(),
            context: self.context,
            missed: false,
        }
    }

    fn notify(&self, key: &str, new_value: Option<String>) {
        // No receivers is the common case for request-scoped stores
        let _ = self.service.inner.events.send(StorageEvent {
            partition: self.partition.clone(),
            key: key.to_owned(),
            new_value,
            origin: self.context,
        });
    }
}

/// Change events for one partition, excluding the subscriber's own writes.
pub struct StorageSubscription {
    receiver: broadcast::Receiver<StorageEvent>,
    partition: String,
    context: ContextId,
    missed: bool,
}

impl StorageSubscription {
    fn accepts(&self, event: &StorageEvent) -> bool {
        event.partition == self.partition && event.origin != self.context
    }

    fn record_lag(&mut self, skipped: u64) {
        tracing::warn!(
            partition = %self.partition,
            skipped,
            "storage subscriber lagged; events were dropped"
        );
        self.missed = true;
    }

    /// Next pending event, without waiting.
    pub fn try_next(&mut self) -> Option<StorageEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the next event. Returns `None` once the service is dropped.
    pub async fn next(&mut self) -> Option<StorageEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Whether events were dropped since the last call, resetting the flag.
    ///
    /// A lagging subscriber cannot tell which keys changed and should reload.
    pub fn take_missed(&mut self) -> bool {
        std::mem::take(&mut self.missed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_areas_share_partition_data() {
        let service = StorageService::in_memory();
        let tab_a = service.area("shopper-1");
        let tab_b = service.area("shopper-1");

        tab_a.set("cart-storage", "{}").unwrap();
        assert_eq!(tab_b.get("cart-storage").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_partitions_are_isolated() {
        let service = StorageService::in_memory();
        service.area("shopper-1").set("k", "one").unwrap();
        assert_eq!(service.area("shopper-2").get("k").unwrap(), None);
    }

    #[test]
    fn test_events_skip_own_context() {
        let service = StorageService::in_memory();
        let tab_a = service.area("shopper-1");
        let tab_b = service.area("shopper-1");
        let mut own = tab_a.subscribe();
        let mut other = tab_b.subscribe();

        tab_a.set("wishlist-storage", "[1]").unwrap();

        assert!(own.try_next().is_none());
        let event = other.try_next().unwrap();
        assert_eq!(event.key, "wishlist-storage");
        assert_eq!(event.new_value.as_deref(), Some("[1]"));
        assert_eq!(event.origin, tab_a.context());
    }

    #[test]
    fn test_events_filtered_by_partition() {
        let service = StorageService::in_memory();
        let mut watcher = service.area("shopper-1").subscribe();
        service.area("shopper-2").set("k", "v").unwrap();
        assert!(watcher.try_next().is_none());
    }

    #[test]
    fn test_unchanged_write_sends_no_event() {
        let service = StorageService::in_memory();
        let writer = service.area("p");
        let mut watcher = service.area("p").subscribe();

        writer.set("k", "v").unwrap();
        writer.set("k", "v").unwrap();

        assert!(watcher.try_next().is_some());
        assert!(watcher.try_next().is_none());
    }

    #[test]
    fn test_remove_notifies_with_none() {
        let service = StorageService::in_memory();
        let writer = service.area("p");
        writer.set("k", "v").unwrap();
        let mut watcher = service.area("p").subscribe();

        writer.remove("k").unwrap();
        writer.remove("k").unwrap();

        assert_eq!(watcher.try_next().unwrap().new_value, None);
        assert!(watcher.try_next().is_none());
    }

    #[test]
    fn test_lag_is_reported() {
        let service = StorageService::in_memory();
        let writer = service.area("p");
        let mut watcher = service.area("p").subscribe();

        for i in 0..(EVENT_CAPACITY + 10) {
            writer.set("k", &i.to_string()).unwrap();
        }

        let mut received = 0;
        while watcher.try_next().is_some() {
            received += 1;
        }
        assert!(received <= EVENT_CAPACITY);
        assert!(watcher.take_missed());
        assert!(!watcher.take_missed());
    }

    #[tokio::test]
    async fn test_next_waits_for_other_context() {
        let service = StorageService::in_memory();
        let writer = service.area("p");
        let mut watcher = service.area("p").subscribe();

        let handle = tokio::spawn(async move { watcher.next().await });
        tokio::task::yield_now().await;
        writer.set("k", "v").unwrap();

        let event = handle.await.unwrap().unwrap();
        assert_eq!(event.key, "k");
    }
}

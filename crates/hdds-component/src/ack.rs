// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Acknowledgement manager: pending messages keyed by correlation id.
//!
//! Each dispatch registers an entry holding a single-slot result channel.
//! The ack loop resolves entries by id, in any order. The registration is a
//! guard: dropping it (or calling [`Registration::dispose`]) removes the entry
//! and closes the channel, so every exit path of a dispatch cleans up.

use crate::error::{ComponentError, ComponentResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, trace};
use uuid::Uuid;

/// Default bound on how long `resolve` waits to hand over a result.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(1);

struct PendingAck<T> {
    tx: mpsc::Sender<T>,
    delivered: AtomicBool,
}

/// Registry of outstanding messages awaiting acknowledgement.
pub struct AckManager<T> {
    pending: RwLock<HashMap<String, Arc<PendingAck<T>>>>,
    resolve_timeout: Duration,
}

/// A pending acknowledgement owned by the dispatcher.
pub struct Registration<'a, T> {
    id: String,
    results: mpsc::Receiver<T>,
    manager: &'a AckManager<T>,
}

impl<T: Send + 'static> Default for AckManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> AckManager<T> {
    pub fn new() -> Self {
        Self::with_resolve_timeout(DEFAULT_RESOLVE_TIMEOUT)
    }

    pub fn with_resolve_timeout(resolve_timeout: Duration) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            resolve_timeout,
        }
    }

    /// Register a new pending message under a fresh id.
    pub fn register(&self) -> Registration<'_, T> {
        let id = Uuid::new_v4().to_string();
        let (tx, results) = mpsc::channel(1);
        let entry = Arc::new(PendingAck {
            tx,
            delivered: AtomicBool::new(false),
        });

        self.pending.write().insert(id.clone(), entry);
        trace!(message_id = %id, "registered pending ack");

        Registration {
            id,
            results,
            manager: self,
        }
    }

    /// Deliver `result` to the dispatcher waiting on `id`.
    ///
    /// Unknown ids, already-acknowledged ids and ids whose dispatcher is gone
    /// yield [`ComponentError::MessageNotFound`]. If the result cannot be
    /// handed over within the resolve timeout it is dropped and `Ok` returned.
    pub async fn resolve(&self, id: &str, result: T) -> ComponentResult<()> {
        let entry = self
            .pending
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ComponentError::MessageNotFound(id.to_string()))?;

        if entry.delivered.swap(true, Ordering::AcqRel) {
            return Err(ComponentError::MessageNotFound(id.to_string()));
        }

        match entry.tx.send_timeout(result, self.resolve_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                debug!(message_id = %id, "no consumer took the ack result, dropping it");
                Ok(())
            }
            Err(SendTimeoutError::Closed(_)) => Err(ComponentError::MessageNotFound(id.to_string())),
        }
    }

    /// Ids of all outstanding messages.
    #[cfg(test)]
    pub(crate) fn pending_ids(&self) -> Vec<String> {
        self.pending.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.read().is_empty()
    }
}

impl<T> Registration<'_, T> {
    /// Correlation id of this message.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the acknowledgement result.
    ///
    /// Returns `None` if the entry was removed without a result.
    pub async fn recv(&mut self) -> Option<T> {
        self.results.recv().await
    }

    /// Remove the entry and close its channel.
    pub fn dispose(self) {}
}

impl<T> Drop for Registration<'_, T> {
    fn drop(&mut self) {
        if self.manager.pending.write().remove(&self.id).is_some() {
            trace!(message_id = %self.id, "disposed pending ack");
        }
        self.results.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_register_adds_pending() {
        let manager = AckManager::<()>::new();
        assert!(manager.is_empty());

        let registration = manager.register();
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.pending_ids(), vec![registration.id().to_string()]);
    }

    #[test]
    fn test_dispose_removes_pending() {
        let manager = AckManager::<()>::new();
        let registration = manager.register();
        registration.dispose();
        assert!(manager.is_empty());
    }

    #[test]
    fn test_drop_removes_pending() {
        let manager = AckManager::<()>::new();
        {
            let _registration = manager.register();
            assert_eq!(manager.len(), 1);
        }
        assert!(manager.is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let manager = AckManager::<()>::new();
        let registrations: Vec<_> = (0..100).map(|_| manager.register()).collect();
        let ids: HashSet<_> = registrations.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids.len(), 100);
        assert_eq!(manager.len(), 100);
    }

    #[tokio::test]
    async fn test_resolve_unknown_id_is_not_found() {
        let manager = AckManager::<()>::new();
        let result = manager.resolve("fake-id", ()).await;
        assert!(matches!(result, Err(ComponentError::MessageNotFound(id)) if id == "fake-id"));
    }

    #[tokio::test]
    async fn test_resolve_delivers_result() {
        let manager = AckManager::<u32>::new();
        let mut registration = manager.register();
        let id = registration.id().to_string();

        manager.resolve(&id, 42).await.unwrap();
        assert_eq!(registration.recv().await, Some(42));
    }

    #[tokio::test]
    async fn test_duplicate_ack_is_not_found() {
        let manager = AckManager::<u32>::new();
        let _registration = manager.register();
        let id = manager.pending_ids().remove(0);

        manager.resolve(&id, 1).await.unwrap();
        assert!(matches!(
            manager.resolve(&id, 2).await,
            Err(ComponentError::MessageNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_after_dispose_is_not_found() {
        let manager = AckManager::<u32>::new();
        let registration = manager.register();
        let id = registration.id().to_string();
        registration.dispose();

        assert!(matches!(
            manager.resolve(&id, 1).await,
            Err(ComponentError::MessageNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_gives_up_when_nobody_takes_the_result() {
        let manager = AckManager::<u32>::with_resolve_timeout(Duration::from_millis(50));

        // A slot that is already full and never drained.
        let (tx, _rx) = mpsc::channel(1);
        tx.try_send(0).unwrap();
        manager.pending.write().insert(
            "stuck".to_string(),
            Arc::new(PendingAck {
                tx,
                delivered: AtomicBool::new(false),
            }),
        );

        let started = std::time::Instant::now();
        manager.resolve("stuck", 1).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}

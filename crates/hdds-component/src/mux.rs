// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Instance multiplexer: one lazily built component instance per routing key.
//!
//! Lookups take a lock-free fast path. On a miss the caller takes a per-key
//! construction lock, rechecks, and builds the instance, so concurrent first
//! calls for one key build it once while other keys proceed independently.

use crate::context::Metadata;
use crate::error::{ComponentError, ComponentResult};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info};

/// Metadata header selecting the component instance.
pub const INSTANCE_ID_METADATA: &str = "x-component-instance";

/// Routing key used when the header is absent.
pub const DEFAULT_INSTANCE_ID: &str = "#default__instance#";

/// Builds a fresh component instance.
pub type Factory<T> = Arc<dyn Fn() -> ComponentResult<Arc<T>> + Send + Sync>;

/// Routing key for a call: first `x-component-instance` value, or the default key.
pub fn routing_key(metadata: &Metadata) -> &str {
    metadata
        .first(INSTANCE_ID_METADATA)
        .unwrap_or(DEFAULT_INSTANCE_ID)
}

/// Cache of constructed instances keyed by routing key.
pub struct Multiplexer<T: ?Sized> {
    instances: DashMap<String, Arc<T>>,
    construction: DashMap<String, Arc<Mutex<()>>>,
}

impl<T: ?Sized> Default for Multiplexer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Multiplexer<T> {
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
            construction: DashMap::new(),
        }
    }

    /// Instance for `key`, built with `factory` on first use.
    pub fn get<F>(&self, key: &str, factory: F) -> Arc<T>
    where
        F: FnOnce() -> Arc<T>,
    {
        match self.get_or_try(key, || Ok::<_, Infallible>(factory())) {
            Ok(instance) => instance,
            Err(never) => match never {},
        }
    }

    /// Instance for `key`, built with a fallible `factory` on first use.
    ///
    /// A failed construction caches nothing; the next call retries.
    pub fn get_or_try<F, E>(&self, key: &str, factory: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<Arc<T>, E>,
    {
        if let Some(instance) = self.instances.get(key) {
            return Ok(instance.value().clone());
        }

        let lock = self
            .construction
            .entry(key.to_string())
            .or_default()
            .clone();
        let built = {
            let _guard = lock.lock();
            let existing = self.instances.get(key).map(|i| i.value().clone());
            match existing {
                Some(instance) => Ok(instance),
                None => {
                    let built = factory();
                    if let Ok(instance) = &built {
                        self.instances.insert(key.to_string(), instance.clone());
                        debug!(key, "constructed instance");
                    }
                    built
                }
            }
        };
        drop(lock);
        // The last caller out removes the lock entry.
        self.construction
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        built
    }

    /// Drop the instance for `key`; the next lookup builds a new one.
    pub fn evict(&self, key: &str) -> Option<Arc<T>> {
        self.instances.remove(key).map(|(_, instance)| instance)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.instances.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.instances.iter().map(|e| e.key().clone()).collect()
    }
}

/// A factory paired with its multiplexer.
pub struct InstanceSource<T: ?Sized> {
    factory: Factory<T>,
    instances: Multiplexer<T>,
}

impl<T: ?Sized> InstanceSource<T> {
    pub fn new(factory: Factory<T>) -> Self {
        Self {
            factory,
            instances: Multiplexer::new(),
        }
    }

    /// Resolve the instance addressed by the call metadata.
    pub fn instance(&self, metadata: &Metadata) -> ComponentResult<Arc<T>> {
        let key = routing_key(metadata);
        info!("received request for instance {}", key);

        self.instances.get_or_try(key, || {
            (self.factory)().map_err(|e| ComponentError::Construction {
                key: key.to_string(),
                reason: e.to_string(),
            })
        })
    }

    pub fn instances(&self) -> &Multiplexer<T> {
        &self.instances
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Barrier};
    use std::thread;
    use std::time::Duration;

    trait Named: Send + Sync {
        fn name(&self) -> String;
    }

    struct Instance(usize);

    impl Named for Instance {
        fn name(&self) -> String {
            format!("instance-{}", self.0)
        }
    }

    #[test]
    fn test_routing_key() {
        assert_eq!(routing_key(&Metadata::new()), DEFAULT_INSTANCE_ID);

        let metadata = Metadata::from_pairs([(INSTANCE_ID_METADATA, "a"), (INSTANCE_ID_METADATA, "b")]);
        assert_eq!(routing_key(&metadata), "a");
    }

    #[test]
    fn test_same_key_returns_same_instance() {
        let mux: Multiplexer<dyn Named> = Multiplexer::new();
        let built = AtomicUsize::new(0);
        let factory = || -> Arc<dyn Named> { Arc::new(Instance(built.fetch_add(1, Ordering::SeqCst))) };

        let first = mux.get("a", factory);
        let second = mux.get("a", factory);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(built.load(Ordering::SeqCst), 1);

        let other = mux.get("b", factory);
        assert_eq!(other.name(), "instance-1");
        assert_eq!(mux.len(), 2);
    }

    #[test]
    fn test_concurrent_first_lookups_build_once() {
        let mux: Arc<Multiplexer<dyn Named>> = Arc::new(Multiplexer::new());
        let built = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mux = mux.clone();
                let built = built.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    mux.get("shared", || {
                        thread::sleep(Duration::from_millis(20));
                        Arc::new(Instance(built.fetch_add(1, Ordering::SeqCst))) as Arc<dyn Named>
                    })
                })
            })
            .collect();

        let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
    }

    #[test]
    fn test_different_keys_do_not_block_each_other() {
        let mux: Arc<Multiplexer<dyn Named>> = Arc::new(Multiplexer::new());
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();

        let slow = thread::spawn({
            let mux = mux.clone();
            move || {
                mux.get("slow", || {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Arc::new(Instance(0)) as Arc<dyn Named>
                })
            }
        });

        started_rx.recv().unwrap();
        let fast = mux.get("fast", || Arc::new(Instance(1)) as Arc<dyn Named>);
        assert_eq!(fast.name(), "instance-1");
        assert!(!mux.contains("slow"));

        release_tx.send(()).unwrap();
        assert_eq!(slow.join().unwrap().name(), "instance-0");
    }

    #[test]
    fn test_failed_construction_is_not_cached() {
        let mux: Multiplexer<dyn Named> = Multiplexer::new();

        let result = mux.get_or_try("a", || Err::<Arc<dyn Named>, _>("unavailable"));
        assert_eq!(result.err(), Some("unavailable"));
        assert!(mux.is_empty());

        let instance = mux
            .get_or_try("a", || Ok::<_, &str>(Arc::new(Instance(7)) as Arc<dyn Named>))
            .unwrap();
        assert_eq!(instance.name(), "instance-7");
    }

    #[test]
    fn test_failed_constructions_leave_no_locks_behind() {
        let mux: Multiplexer<dyn Named> = Multiplexer::new();
        for i in 0..64 {
            let key = format!("tenant-{}", i);
            let result = mux.get_or_try(&key, || Err::<Arc<dyn Named>, _>("unavailable"));
            assert!(result.is_err());
        }
        assert!(mux.is_empty());
        assert!(mux.construction.is_empty());

        mux.get("a", || Arc::new(Instance(1)) as Arc<dyn Named>);
        mux.get("a", || Arc::new(Instance(2)) as Arc<dyn Named>);
        assert!(mux.construction.is_empty());
    }

    #[test]
    fn test_concurrent_lookups_release_construction_locks() {
        let mux: Arc<Multiplexer<dyn Named>> = Arc::new(Multiplexer::new());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mux = mux.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    mux.get_or_try("flaky", || {
                        thread::sleep(Duration::from_millis(5));
                        Err::<Arc<dyn Named>, _>("unavailable")
                    })
                    .is_err()
                })
            })
            .collect();

        assert!(handles.into_iter().all(|h| h.join().unwrap()));
        assert!(mux.construction.is_empty());
    }

    #[test]
    fn test_evict_rebuilds() {
        let mux: Multiplexer<dyn Named> = Multiplexer::new();
        let first = mux.get("a", || Arc::new(Instance(1)) as Arc<dyn Named>);
        assert!(mux.evict("a").is_some());
        assert!(mux.evict("a").is_none());

        let second = mux.get("a", || Arc::new(Instance(2)) as Arc<dyn Named>);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(mux.keys(), vec!["a".to_string()]);
    }

    #[test]
    fn test_instance_source_routes_by_metadata() {
        let built = Arc::new(AtomicUsize::new(0));
        let factory: Factory<dyn Named> = {
            let built = built.clone();
            Arc::new(move || Ok(Arc::new(Instance(built.fetch_add(1, Ordering::SeqCst))) as Arc<dyn Named>))
        };
        let source = InstanceSource::new(factory);

        let default = source.instance(&Metadata::new()).unwrap();
        let tenant = source
            .instance(&Metadata::from_pairs([(INSTANCE_ID_METADATA, "tenant-a")]))
            .unwrap();
        let again = source.instance(&Metadata::new()).unwrap();

        assert!(Arc::ptr_eq(&default, &again));
        assert!(!Arc::ptr_eq(&default, &tenant));
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert!(source.instances().contains(DEFAULT_INSTANCE_ID));
    }

    #[test]
    fn test_instance_source_reports_construction_failure() {
        let factory: Factory<dyn Named> = Arc::new(|| Err(ComponentError::component("no backend")));
        let source = InstanceSource::new(factory);

        let err = match source.instance(&Metadata::new()) {
            Err(err) => err,
            Ok(_) => panic!("construction should fail"),
        };
        match err {
            ComponentError::Construction { key, reason } => {
                assert_eq!(key, DEFAULT_INSTANCE_ID);
                assert_eq!(reason, "no backend");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(source.instances().is_empty());
    }
}

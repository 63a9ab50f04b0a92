//! Last-known-good snapshots of upstream entities, one store per resource type.
//!
//! Entries are written only by successful upstream reads and consulted only on
//! fallback. There is no eviction, expiry or size bound: the store lives as
//! long as the process.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::model::{EntityId, Identified, ResourceKind};

/// Fallback lookup statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub resource: ResourceKind,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Concurrent id → entity store.
///
/// Individual `put`/`get` calls are atomic; `values` is not a consistent
/// snapshot when writers race with it.
#[derive(Debug)]
pub struct ResourceCache<T> {
    resource: ResourceKind,
    entries: DashMap<EntityId, T>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> ResourceCache<T>
where
    T: Identified + Clone,
{
    pub fn new(resource: ResourceKind) -> Self {
        Self {
            resource,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn resource(&self) -> ResourceKind {
        self.resource
    }

    /// Store `entity` under `id`, replacing any previous snapshot
    pub fn put(&self, id: EntityId, entity: T) {
        self.entries.insert(id, entity);
    }

    /// Store every entity under its own id
    pub fn put_all<'a, I>(&self, entities: I)
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let mut written = 0usize;
        for entity in entities {
            self.entries.insert(entity.id(), entity.clone());
            written += 1;
        }
        debug!(resource = %self.resource, written, "Cached entities after successful fetch");
    }

    pub fn get(&self, id: EntityId) -> Option<T> {
        let found = self.entries.get(&id).map(|entry| entry.value().clone());
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Every cached entity, in no particular order
    pub fn values(&self) -> Vec<T> {
        let values: Vec<T> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        if values.is_empty() {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        values
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStats {
            resource: self.resource,
            entries: self.entries.len(),
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

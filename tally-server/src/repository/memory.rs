use std::collections::BTreeMap;

use parking_lot::Mutex;
use tally_metrics::Metric;

use crate::repository::{Repository, StoreError};

/// Merges `incoming` into the list of metrics and returns the stored result.
fn merge_into(metrics: &mut Vec<Metric>, incoming: Metric) -> Metric {
    match metrics.iter_mut().find(|m| m.id == incoming.id) {
        Some(stored) => {
            stored.merge(&incoming);
            stored.clone()
        }
        None => {
            metrics.push(incoming.clone());
            incoming
        }
    }
}

/// An in-memory repository backed by a plain list.
///
/// Lookups scan the list, which is fine for the few dozen metrics a single agent reports. Use
/// [`IndexedRepository`] for larger data sets.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    metrics: Mutex<Vec<Metric>>,
}

impl MemoryRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Repository for MemoryRepository {
    async fn update(&self, metric: Metric) -> Result<Metric, StoreError> {
        Ok(merge_into(&mut self.metrics.lock(), metric))
    }

    async fn bulk_update(&self, metrics: Vec<Metric>) -> Result<(), StoreError> {
        let mut stored = self.metrics.lock();
        for metric in metrics {
            merge_into(&mut stored, metric);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Metric>, StoreError> {
        Ok(self.metrics.lock().iter().find(|m| m.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Metric>, StoreError> {
        Ok(self.metrics.lock().clone())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// An in-memory repository indexed by metric id.
///
/// Lists metrics ordered by id.
#[derive(Debug, Default)]
pub struct IndexedRepository {
    metrics: Mutex<BTreeMap<String, Metric>>,
}

impl IndexedRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    fn merge_locked(metrics: &mut BTreeMap<String, Metric>, incoming: Metric) -> Metric {
        match metrics.get_mut(&incoming.id) {
            Some(stored) => {
                stored.merge(&incoming);
                stored.clone()
            }
            None => {
                metrics.insert(incoming.id.clone(), incoming.clone());
                incoming
            }
        }
    }
}

#[async_trait::async_trait]
impl Repository for IndexedRepository {
    async fn update(&self, metric: Metric) -> Result<Metric, StoreError> {
        Ok(Self::merge_locked(&mut self.metrics.lock(), metric))
    }

    async fn bulk_update(&self, metrics: Vec<Metric>) -> Result<(), StoreError> {
        let mut stored = self.metrics.lock();
        for metric in metrics {
            Self::merge_locked(&mut stored, metric);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Metric>, StoreError> {
        Ok(self.metrics.lock().get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Metric>, StoreError> {
        Ok(self.metrics.lock().values().cloned().collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

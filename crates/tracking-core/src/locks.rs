//! Per-shipment async locks.
//!
//! Simulation ticks, simulation (re)starts and device reports for the same
//! shipment take the shipment's lock around their writes so samples land in
//! timestamp order. Locks for different shipments never contend.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
pub struct ShipmentLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ShipmentLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `shipment_id`.
    pub async fn lock(&self, shipment_id: &str) -> ShipmentGuard {
        // clone the mutex out so the dashmap shard is not held across the await
        let mutex = Arc::clone(
            self.inner.entry(shipment_id.to_string()).or_insert_with(Arc::default).value(),
        );
        let guard = mutex.lock_owned().await;

        ShipmentGuard {
            shipment_id: shipment_id.to_string(),
            locks: Arc::clone(&self.inner),
            guard: Some(guard),
        }
    }

    /// Number of shipments with a live lock entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[derive(Debug)]
pub struct ShipmentGuard {
    shipment_id: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ShipmentGuard {
    fn drop(&mut self) {
        // release first so the strong count reflects waiters only
        self.guard.take();
        self.locks.remove_if(&self.shipment_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

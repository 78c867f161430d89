//! Per-endpoint concurrency gates.
//!
//! At most one in-flight job per endpoint from this process. A held gate is
//! never waited on: the orchestrator skips to its next candidate instead.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::endpoint::RoutingKey;

/// Process-wide gate table. Cloning shares the same table, so the host process
/// builds one and hands clones to everything that routes requests; tests build
/// their own for isolation.
#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    gates: Arc<Mutex<HashMap<RoutingKey, Arc<Semaphore>>>>,
}

/// Proof of exclusive use of one endpoint. Dropping it frees the endpoint.
#[derive(Debug)]
pub struct GateGuard {
    key: RoutingKey,
    _permit: OwnedSemaphorePermit,
}

impl GateGuard {
    pub fn key(&self) -> &RoutingKey {
        &self.key
    }
}

impl RoutingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lazily create the gate for `key`. The table lock is held only for the
    /// lookup so two callers can never create two gates for one endpoint.
    fn gate_for(&self, key: &RoutingKey) -> Arc<Semaphore> {
        let mut gates = self.gates.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        gates
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    /// Take the endpoint's gate if nobody holds it; `None` means skip it.
    pub fn acquire_if_free(&self, key: &RoutingKey) -> Option<GateGuard> {
        let permit = self.gate_for(key).try_acquire_owned().ok()?;
        Some(GateGuard {
            key: key.clone(),
            _permit: permit,
        })
    }

    /// Read-only: never takes the permit, so it cannot make a free gate look busy.
    pub fn is_held(&self, key: &RoutingKey) -> bool {
        let gates = self.gates.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        gates.get(key).is_some_and(|gate| gate.available_permits() == 0)
    }
}

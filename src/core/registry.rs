//! In-process registry of fingerprints with work in flight.
//!
//! Two runs for the same title and text would otherwise race on the same
//! artifact paths. The registry hands out one async mutex per fingerprint;
//! holding its guard serializes all same-fingerprint work in this process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::domain::Fingerprint;

#[derive(Default)]
pub struct RunRegistry {
    slots: Mutex<HashMap<Fingerprint, Arc<AsyncMutex<()>>>>,
}

/// Exclusive claim on a fingerprint. Dropping it releases the claim.
pub struct RunClaim {
    fingerprint: Fingerprint,
    _guard: OwnedMutexGuard<()>,
}

impl RunClaim {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other task holds `fingerprint`, then claim it
    pub async fn claim(&self, fingerprint: &Fingerprint) -> RunClaim {
        let slot = self.slot(fingerprint);
        if slot.try_lock().is_err() {
            debug!(%fingerprint, "Waiting for in-flight run on same fingerprint");
        }
        RunClaim {
            fingerprint: fingerprint.clone(),
            _guard: slot.lock_owned().await,
        }
    }

    /// Claim without waiting; `None` if the fingerprint is busy
    pub fn try_claim(&self, fingerprint: &Fingerprint) -> Option<RunClaim> {
        let slot = self.slot(fingerprint);
        let guard = slot.try_lock_owned().ok()?;
        Some(RunClaim {
            fingerprint: fingerprint.clone(),
            _guard: guard,
        })
    }

    /// Whether some task currently holds `fingerprint`
    pub fn is_busy(&self, fingerprint: &Fingerprint) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .get(fingerprint)
            .map(|slot| slot.try_lock().is_err())
            .unwrap_or(false)
    }

    fn slot(&self, fingerprint: &Fingerprint) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        // Drop slots nobody holds or waits on
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        slots
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

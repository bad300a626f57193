use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    error::{AppError, Result},
    models::booking::SlotInstanceKey,
};

/// Entry count above which idle locks are swept on acquire.
const SWEEP_THRESHOLD: usize = 1024;

/// Per-slot-instance lock table. Admissions for the same `(date, slot)`
/// queue behind each other; different slot instances never contend.
#[derive(Clone)]
pub struct SlotLocks {
    inflight: Arc<StdMutex<HashMap<SlotInstanceKey, Arc<Mutex<()>>>>>,
    wait: Duration,
}

/// Held for the whole decision scope of one admission.
pub struct SlotGuard {
    _guard: OwnedMutexGuard<()>,
    key: SlotInstanceKey,
}

impl SlotGuard {
    pub fn key(&self) -> SlotInstanceKey {
        self.key
    }
}

impl SlotLocks {
    pub fn new(wait: Duration) -> Self {
        Self {
            inflight: Arc::new(StdMutex::new(HashMap::new())),
            wait,
        }
    }

    /// Waits at most the configured bound for exclusive access to `key`.
    pub async fn acquire(&self, key: SlotInstanceKey) -> Result<SlotGuard> {
        let lock = {
            let mut inflight = self
                .inflight
                .lock()
                .map_err(|_| AppError::Internal(anyhow::anyhow!("slot lock table poisoned")))?;
            if inflight.len() > SWEEP_THRESHOLD {
                // Only the table holds an idle entry.
                inflight.retain(|_, l| Arc::strong_count(l) > 1);
            }
            Arc::clone(
                inflight
                    .entry(key)
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        match tokio::time::timeout(self.wait, lock.lock_owned()).await {
            Ok(guard) => Ok(SlotGuard { _guard: guard, key }),
            Err(_) => {
                tracing::warn!(slot = %key, wait_ms = self.wait.as_millis() as u64, "Slot lock wait timed out");
                Err(AppError::ServiceUnavailable(format!(
                    "Timed out waiting for slot {}, please retry",
                    key
                )))
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inflight.lock().map(|m| m.len()).unwrap_or(0)
    }
}

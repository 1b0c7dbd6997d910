//! Per-identity serialization.
//!
//! Resolve-then-create is only idempotent if no other task does the same for
//! the same (kind, xid) in between. `XidLocks` hands out one async mutex per
//! key; unrelated keys never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use kubegraph_core::{EntityKind, Xid};

type Key = (EntityKind, Xid);

#[derive(Default)]
pub struct XidLocks {
    slots: Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>,
}

impl XidLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to (kind, xid).
    pub async fn lock(&self, kind: EntityKind, xid: &Xid) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            // Drop slots nobody holds or waits on.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            let slot = slots
                .entry((kind, xid.clone()))
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone();
            slot
        };
        slot.lock_owned().await
    }

    /// Number of keys currently held or awaited.
    pub fn active(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let held = slots
            .values()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count();
        held
    }
}

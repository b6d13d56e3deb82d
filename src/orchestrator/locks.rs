//! Per-session lock registry.
//!
//! All state-mutating work for one session serializes behind one async
//! mutex, giving deterministic event ordering and race-free counters while
//! unrelated sessions proceed in parallel. Handles live in a sharded map so
//! the registry itself never becomes a global choke point.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

const SHARDS: usize = 16;

#[derive(Clone)]
pub struct SessionLocks {
    shards: Arc<Vec<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>>,
}

impl Default for SessionLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLocks {
    pub fn new() -> Self {
        let shards = (0..SHARDS)
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>();
        Self {
            shards: Arc::new(shards),
        }
    }

    /// Get (or create) the lock handle for a session.
    pub fn handle(&self, session_id: Uuid) -> Arc<AsyncMutex<()>> {
        let shard = &self.shards[shard_index(session_id)];
        let mut map = shard.lock();
        map.entry(session_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop the handle for a finished session. Outstanding guards keep the
    /// mutex alive through their own Arc.
    pub fn release(&self, session_id: Uuid) {
        let shard = &self.shards[shard_index(session_id)];
        shard.lock().remove(&session_id);
    }
}

fn shard_index(session_id: Uuid) -> usize {
    (session_id.as_u128() % SHARDS as u128) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_same_session_same_handle() {
        let locks = SessionLocks::new();
        let id = Uuid::new_v4();
        assert!(Arc::ptr_eq(&locks.handle(id), &locks.handle(id)));
        assert!(!Arc::ptr_eq(&locks.handle(id), &locks.handle(Uuid::new_v4())));
    }

    #[test]
    fn test_release_forgets_handle() {
        let locks = SessionLocks::new();
        let id = Uuid::new_v4();
        let before = locks.handle(id);
        locks.release(id);
        assert!(!Arc::ptr_eq(&before, &locks.handle(id)));
    }

    #[tokio::test]
    async fn test_lock_serializes_critical_sections() {
        let locks = SessionLocks::new();
        let id = Uuid::new_v4();
        let counter = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let counter = counter.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let lock = locks.handle(id);
                let _guard = lock.lock().await;
                let active = counter.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(active, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}

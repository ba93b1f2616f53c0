// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-process implementation of [`DistributedLock`].
//!
//! Each lock name maps to a single-permit semaphore. Held permits are kept by
//! name so any task can release a lock it (or another task) acquired, matching
//! the semantics of a cluster semaphore. A name's semaphore is dropped on
//! release once no other task references it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::debug;

use crate::domain::lock::{DistributedLock, LockError};

pub struct InMemoryDistributedLock {
    semaphores: DashMap<String, Arc<Semaphore>>,
    held: DashMap<String, OwnedSemaphorePermit>,
}

impl InMemoryDistributedLock {
    pub fn new() -> Self {
        Self {
            semaphores: DashMap::new(),
            held: DashMap::new(),
        }
    }

    pub fn is_held(&self, name: &str) -> bool {
        self.held.contains_key(name)
    }

    fn semaphore(&self, name: &str) -> Arc<Semaphore> {
        self.semaphores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .value()
            .clone()
    }
}

impl Default for InMemoryDistributedLock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistributedLock for InMemoryDistributedLock {
    async fn try_acquire(&self, name: &str) -> Result<bool, LockError> {
        match self.semaphore(name).try_acquire_owned() {
            Ok(permit) => {
                self.held.insert(name.to_string(), permit);
                debug!(lock = %name, "Lock acquired");
                Ok(true)
            }
            Err(TryAcquireError::NoPermits) => Ok(false),
            Err(TryAcquireError::Closed) => Err(LockError::Unavailable(name.to_string())),
        }
    }

    async fn try_acquire_for(&self, name: &str, timeout: Duration) -> Result<bool, LockError> {
        let semaphore = self.semaphore(name);
        match tokio::time::timeout(timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => {
                self.held.insert(name.to_string(), permit);
                debug!(lock = %name, "Lock acquired");
                Ok(true)
            }
            Ok(Err(_)) => Err(LockError::Unavailable(name.to_string())),
            Err(_) => Ok(false),
        }
    }

    async fn release(&self, name: &str) -> Result<(), LockError> {
        let Some((_, permit)) = self.held.remove(name) else {
            return Err(LockError::NotHeld(name.to_string()));
        };
        drop(permit);
        // Waiters and in-flight acquirers hold their own reference.
        self.semaphores
            .remove_if(name, |_, semaphore| Arc::strong_count(semaphore) == 1);
        debug!(lock = %name, "Lock released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_is_not_reentrant() {
        let lock = InMemoryDistributedLock::new();

        assert!(lock.try_acquire("container-1").await.unwrap());
        assert!(!lock.try_acquire("container-1").await.unwrap());
        assert!(lock.try_acquire("container-2").await.unwrap());

        lock.release("container-1").await.unwrap();
        assert!(lock.try_acquire("container-1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_wait_times_out() {
        let lock = InMemoryDistributedLock::new();
        assert!(lock.try_acquire("container").await.unwrap());

        let acquired = lock
            .try_acquire_for("container", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!acquired);
        assert!(lock.is_held("container"));
    }

    #[tokio::test]
    async fn test_waiter_acquires_after_release() {
        let lock = Arc::new(InMemoryDistributedLock::new());
        assert!(lock.try_acquire("container").await.unwrap());

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move {
                lock.try_acquire_for("container", Duration::from_secs(5)).await
            })
        };
        tokio::task::yield_now().await;
        lock.release("container").await.unwrap();

        assert!(waiter.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_released_names_are_forgotten() {
        let lock = InMemoryDistributedLock::new();

        for i in 0..1_000 {
            let name = format!("signature-{}", i);
            assert!(lock.try_acquire(&name).await.unwrap());
            lock.release(&name).await.unwrap();
        }
        assert!(lock.try_acquire("held").await.unwrap());
        assert!(!lock.try_acquire("held").await.unwrap());

        assert_eq!(lock.semaphores.len(), 1);
        assert_eq!(lock.held.len(), 1);
    }

    #[tokio::test]
    async fn test_release_keeps_semaphore_with_waiter() {
        let lock = Arc::new(InMemoryDistributedLock::new());
        assert!(lock.try_acquire("container").await.unwrap());

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move {
                lock.try_acquire_for("container", Duration::from_secs(5)).await
            })
        };
        // Registry entry, held permit and the waiter's pending acquire.
        let references = |lock: &InMemoryDistributedLock| {
            lock.semaphores
                .get("container")
                .map(|s| Arc::strong_count(s.value()))
        };
        while references(&lock) != Some(3) {
            tokio::task::yield_now().await;
        }
        lock.release("container").await.unwrap();

        assert!(waiter.await.unwrap().unwrap());
        assert!(lock.is_held("container"));
        assert!(!lock.try_acquire("container").await.unwrap());

        lock.release("container").await.unwrap();
        assert!(lock.semaphores.is_empty());
    }

    #[tokio::test]
    async fn test_release_unheld_lock() {
        let lock = InMemoryDistributedLock::new();
        assert_eq!(
            lock.release("nobody").await,
            Err(LockError::NotHeld("nobody".to_string()))
        );
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Named, cluster-wide, non-reentrant locks.
//!
//! Two lock scopes are used:
//!
//! - **Container lock**, named by the container id. Held by whoever mutates a
//!   [`crate::domain::session::Session`]. Public operations and background
//!   merges both take it with a bounded wait.
//! - **Operation lock**, named by a signature or certificate id. Held by the
//!   status-polling task for one operation so concurrent attempts against the
//!   same provider session collapse to one. Always taken with a zero wait.
//!
//! Locks are released by name. Re-acquiring a held name from the same task
//! does not succeed.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("Lock service unavailable: {0}")]
    Unavailable(String),

    #[error("Lock {0} is not held")]
    NotHeld(String),
}

#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Acquire without waiting. `Ok(false)` when someone else holds the lock.
    async fn try_acquire(&self, name: &str) -> Result<bool, LockError>;

    /// Acquire, waiting at most `timeout`.
    async fn try_acquire_for(&self, name: &str, timeout: Duration) -> Result<bool, LockError>;

    async fn release(&self, name: &str) -> Result<(), LockError>;
}

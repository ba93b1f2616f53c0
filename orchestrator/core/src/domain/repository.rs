// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Session store interface.
//!
//! The store is a plain key/value repository. It provides no atomicity across
//! read-modify-write sequences; callers serialize those through the container
//! lock in [`crate::domain::lock`].

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::session::{ContainerId, Session};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &ContainerId) -> Result<Option<Session>, RepositoryError>;

    /// Upsert the session. Implementations advance [`Session::version`].
    async fn update(&self, session: &Session) -> Result<(), RepositoryError>;

    async fn remove(&self, id: &ContainerId) -> Result<(), RepositoryError>;

    /// Ids of every stored session, used by the reprocessing sweep.
    async fn list_ids(&self) -> Result<Vec<ContainerId>, RepositoryError>;
}

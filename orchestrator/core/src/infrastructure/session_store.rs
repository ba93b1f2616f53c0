// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::repository::{RepositoryError, SessionStore};
use crate::domain::session::{ContainerId, Session};

/// Single-node session store. Sessions are cloned in and out, so a caller's
/// copy never aliases the stored one.
pub struct InMemorySessionStore {
    // Maps ContainerId -> Session
    sessions: Arc<RwLock<HashMap<ContainerId, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &ContainerId) -> Result<Option<Session>, RepositoryError> {
        let guard = self.sessions.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn update(&self, session: &Session) -> Result<(), RepositoryError> {
        let mut stored = session.clone();
        let mut guard = self.sessions.write().await;
        let current = guard.get(&session.session_id).map(Session::version).unwrap_or(0);
        while stored.version() <= current {
            stored.increment_version();
        }
        guard.insert(stored.session_id, stored);
        Ok(())
    }

    async fn remove(&self, id: &ContainerId) -> Result<(), RepositoryError> {
        let mut guard = self.sessions.write().await;
        guard
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn list_ids(&self) -> Result<Vec<ContainerId>, RepositoryError> {
        let guard = self.sessions.read().await;
        Ok(guard.keys().copied().collect())
    }
}

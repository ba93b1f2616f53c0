// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Container-type capability consumed by the signing orchestrator.

use async_trait::async_trait;

use crate::domain::errors::SigningError;
use crate::domain::session::{ContainerId, Session, SignatureId};
use crate::domain::signing::{DataToSign, FinishedSignature, SignatureParameters};

/// Operations that differ between container flavors (ASiC, hashcode).
#[async_trait]
pub trait ContainerSigningCapability: Send + Sync {
    /// Human-readable flavor name, used in logs.
    fn flavor(&self) -> &'static str;

    /// Whether this flavor owns the given session.
    fn supports(&self, session: &Session) -> bool;

    async fn get_session(&self, container_id: &ContainerId) -> Result<Session, SigningError>;

    /// Fail with [`SigningError::NothingToSign`] when the container has no
    /// data files or any data file is empty.
    fn verify_signing_object_existence(&self, session: &Session) -> Result<(), SigningError>;

    async fn build_data_to_sign(
        &self,
        session: &Session,
        parameters: &SignatureParameters,
    ) -> Result<DataToSign, SigningError>;

    fn add_signature_to_session(
        &self,
        session: &mut Session,
        signature: &FinishedSignature,
        signature_id: SignatureId,
    ) -> Result<(), SigningError>;

    /// See [`crate::domain::session::data_files_hash`].
    fn generate_data_files_hash(&self, session: &Session) -> Result<String, SigningError>;
}

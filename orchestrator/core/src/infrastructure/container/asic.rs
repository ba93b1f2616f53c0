// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! ASiC container flavor: data files are held in full.

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256, Sha512};

use super::{load_session, EMPTY_DATA_FILES, NO_DATA_FILES};
use crate::domain::container::ContainerSigningCapability;
use crate::domain::errors::SigningError;
use crate::domain::repository::SessionStore;
use crate::domain::session::{
    data_files_hash, ContainerId, ContainerPayload, ContainerSignature, DataFile, Session, SignatureId,
};
use crate::domain::signing::{
    DataFileDigest, DataToSign, DigestAlgorithm, FinishedSignature, SignatureParameters, SigningEngine,
};

pub struct AsicContainerFlavor {
    store: Arc<dyn SessionStore>,
    engine: Arc<dyn SigningEngine>,
}

impl AsicContainerFlavor {
    pub fn new(store: Arc<dyn SessionStore>, engine: Arc<dyn SigningEngine>) -> Self {
        Self { store, engine }
    }

    fn data_files(session: &Session) -> Result<&[DataFile], SigningError> {
        match &session.container {
            ContainerPayload::Asic { data_files, .. } => Ok(data_files),
            ContainerPayload::Hashcode { .. } => Err(SigningError::InvalidSession(format!(
                "Session {} is not an ASiC container",
                session.session_id
            ))),
        }
    }
}

#[async_trait]
impl ContainerSigningCapability for AsicContainerFlavor {
    fn flavor(&self) -> &'static str {
        "asic"
    }

    fn supports(&self, session: &Session) -> bool {
        matches!(session.container, ContainerPayload::Asic { .. })
    }

    async fn get_session(&self, container_id: &ContainerId) -> Result<Session, SigningError> {
        let session = load_session(self.store.as_ref(), container_id).await?;
        Self::data_files(&session)?;
        Ok(session)
    }

    fn verify_signing_object_existence(&self, session: &Session) -> Result<(), SigningError> {
        let data_files = Self::data_files(session)?;
        if data_files.is_empty() {
            return Err(SigningError::NothingToSign(NO_DATA_FILES.to_string()));
        }
        if data_files.iter().any(|f| f.content.is_empty()) {
            return Err(SigningError::NothingToSign(EMPTY_DATA_FILES.to_string()));
        }
        Ok(())
    }

    async fn build_data_to_sign(
        &self,
        session: &Session,
        parameters: &SignatureParameters,
    ) -> Result<DataToSign, SigningError> {
        let algorithm = parameters
            .data_file_digest_algorithm
            .unwrap_or(DigestAlgorithm::Sha256);
        let digests: Vec<DataFileDigest> = Self::data_files(session)?
            .iter()
            .map(|f| DataFileDigest {
                file_name: f.file_name.clone(),
                digest_algorithm: algorithm,
                digest: match algorithm {
                    DigestAlgorithm::Sha256 => Sha256::digest(&f.content).to_vec(),
                    DigestAlgorithm::Sha512 => Sha512::digest(&f.content).to_vec(),
                },
            })
            .collect();

        Ok(self.engine.build_data_to_sign(&digests, parameters).await?)
    }

    fn add_signature_to_session(
        &self,
        session: &mut Session,
        signature: &FinishedSignature,
        signature_id: SignatureId,
    ) -> Result<(), SigningError> {
        match &mut session.container {
            ContainerPayload::Asic { signatures, .. } => {
                signatures.push(ContainerSignature {
                    generated_signature_id: signature_id,
                    signature_id: signature.id.clone(),
                    signature: signature.ades_signature.clone(),
                });
                Ok(())
            }
            ContainerPayload::Hashcode { .. } => Err(SigningError::InvalidSession(
                "Unable to attach signature to a hashcode container".to_string(),
            )),
        }
    }

    fn generate_data_files_hash(&self, session: &Session) -> Result<String, SigningError> {
        let digests: Vec<(String, Vec<u8>)> = Self::data_files(session)?
            .iter()
            .map(|f| (f.file_name.clone(), Sha256::digest(&f.content).to_vec()))
            .collect();
        Ok(data_files_hash(
            digests.iter().map(|(name, digest)| (name.as_str(), digest.as_slice())),
        ))
    }
}

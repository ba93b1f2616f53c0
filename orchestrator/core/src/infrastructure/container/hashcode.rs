// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Hashcode container flavor: data files are represented by their digests.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use super::{load_session, EMPTY_DATA_FILES, NO_DATA_FILES};
use crate::domain::container::ContainerSigningCapability;
use crate::domain::errors::SigningError;
use crate::domain::repository::SessionStore;
use crate::domain::session::{
    data_files_hash, ContainerId, ContainerPayload, ContainerSignature, HashcodeDataFile, Session, SignatureId,
};
use crate::domain::signing::{
    DataFileDigest, DataToSign, DigestAlgorithm, FinishedSignature, SignatureParameters, SigningEngine,
};

pub struct HashcodeContainerFlavor {
    store: Arc<dyn SessionStore>,
    engine: Arc<dyn SigningEngine>,
}

impl HashcodeContainerFlavor {
    pub fn new(store: Arc<dyn SessionStore>, engine: Arc<dyn SigningEngine>) -> Self {
        Self { store, engine }
    }

    fn data_files(session: &Session) -> Result<&[HashcodeDataFile], SigningError> {
        match &session.container {
            ContainerPayload::Hashcode { data_files, .. } => Ok(data_files),
            ContainerPayload::Asic { .. } => Err(SigningError::InvalidSession(format!(
                "Session {} is not a hashcode container",
                session.session_id
            ))),
        }
    }

    /// SHA-512 when every file carries one, else SHA-256.
    fn digest_algorithm(data_files: &[HashcodeDataFile]) -> DigestAlgorithm {
        if data_files.iter().all(|f| f.file_hash_sha512.is_some()) {
            DigestAlgorithm::Sha512
        } else {
            DigestAlgorithm::Sha256
        }
    }

    fn decode_digest(file: &HashcodeDataFile, algorithm: DigestAlgorithm) -> Result<Vec<u8>, SigningError> {
        let encoded = match algorithm {
            DigestAlgorithm::Sha256 => file.file_hash_sha256.as_deref(),
            DigestAlgorithm::Sha512 => file.file_hash_sha512.as_deref(),
        }
        .ok_or_else(|| {
            SigningError::InvalidRequest(format!(
                "Data file {} has no {:?} digest",
                file.file_name, algorithm
            ))
        })?;

        BASE64.decode(encoded).map_err(|e| {
            SigningError::InvalidRequest(format!("Invalid digest for data file {}: {}", file.file_name, e))
        })
    }
}

#[async_trait]
impl ContainerSigningCapability for HashcodeContainerFlavor {
    fn flavor(&self) -> &'static str {
        "hashcode"
    }

    fn supports(&self, session: &Session) -> bool {
        matches!(session.container, ContainerPayload::Hashcode { .. })
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
        if data_files.iter().any(|f| f.file_size.unwrap_or(0) < 1) {
            return Err(SigningError::NothingToSign(EMPTY_DATA_FILES.to_string()));
        }
        Ok(())
    }

    async fn build_data_to_sign(
        &self,
        session: &Session,
        parameters: &SignatureParameters,
    ) -> Result<DataToSign, SigningError> {
        let data_files = Self::data_files(session)?;
        let algorithm = parameters
            .data_file_digest_algorithm
            .unwrap_or_else(|| Self::digest_algorithm(data_files));

        let digests = data_files
            .iter()
            .map(|f| {
                Ok(DataFileDigest {
                    file_name: f.file_name.clone(),
                    digest_algorithm: algorithm,
                    digest: Self::decode_digest(f, algorithm)?,
                })
            })
            .collect::<Result<Vec<_>, SigningError>>()?;

        Ok(self.engine.build_data_to_sign(&digests, parameters).await?)
    }

    fn add_signature_to_session(
        &self,
        session: &mut Session,
        signature: &FinishedSignature,
        signature_id: SignatureId,
    ) -> Result<(), SigningError> {
        match &mut session.container {
            ContainerPayload::Hashcode { signatures, .. } => {
                signatures.push(ContainerSignature {
                    generated_signature_id: signature_id,
                    signature_id: signature.id.clone(),
                    signature: signature.ades_signature.clone(),
                });
                Ok(())
            }
            ContainerPayload::Asic { .. } => Err(SigningError::InvalidSession(
                "Unable to attach signature to an ASiC container".to_string(),
            )),
        }
    }

    fn generate_data_files_hash(&self, session: &Session) -> Result<String, SigningError> {
        let entries: Vec<(String, String)> = Self::data_files(session)?
            .iter()
            .map(|f| {
                let digest = format!(
                    "{}{}",
                    f.file_hash_sha256.as_deref().unwrap_or_default(),
                    f.file_hash_sha512.as_deref().unwrap_or_default()
                );
                (f.file_name.clone(), digest)
            })
            .collect();
        Ok(data_files_hash(
            entries.iter().map(|(name, digest)| (name.as_str(), digest.as_bytes())),
        ))
    }
}

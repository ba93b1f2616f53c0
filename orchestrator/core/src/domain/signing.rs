// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Signature Engine Boundary
//!
//! Value objects exchanged with the AdES signature engine and the
//! [`SigningEngine`] trait the orchestrator finalizes signatures through.
//! The engine itself (XAdES/ASiC internals, OCSP and TSA clients) lives outside
//! this crate; it reports every outbound provider call to a
//! [`ProviderRequestObserver`] so the orchestrator can audit it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::session::SignatureId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
}

/// AdES baseline profile of the produced signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignatureProfile {
    #[serde(rename = "B")]
    B,
    #[serde(rename = "T")]
    T,
    #[default]
    #[serde(rename = "LT")]
    Lt,
    #[serde(rename = "LTA")]
    Lta,
}

/// DER-encoded X.509 signer certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningCertificate {
    der: Vec<u8>,
}

impl SigningCertificate {
    pub fn new(der: Vec<u8>) -> Self {
        Self { der }
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn is_empty(&self) -> bool {
        self.der.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureParameters {
    pub signature_profile: SignatureProfile,
    pub signing_certificate: Option<SigningCertificate>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub country: Option<String>,
    pub state_or_province: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    /// Overrides the digest algorithm picked from the data files.
    pub data_file_digest_algorithm: Option<DigestAlgorithm>,
}

/// A data file reference handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFileDigest {
    pub file_name: String,
    pub digest_algorithm: DigestAlgorithm,
    pub digest: Vec<u8>,
}

/// Bytes the signer must sign plus everything needed to finalize them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataToSign {
    /// Engine-level signature element id.
    pub signature_id: String,
    pub digest_algorithm: DigestAlgorithm,
    pub data: Vec<u8>,
    pub parameters: SignatureParameters,
}

/// Returned by `prepare_remote_signature`.
#[derive(Debug, Clone)]
pub struct DataToSignWrapper {
    pub data_to_sign: DataToSign,
    pub generated_signature_id: SignatureId,
}

/// Returned when a device signing flow starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningChallenge {
    /// Verification code shown on the signer's device.
    pub challenge_id: String,
    pub generated_signature_id: SignatureId,
}

/// A complete AdES signature produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedSignature {
    pub id: String,
    pub profile: SignatureProfile,
    pub ades_signature: Vec<u8>,
    /// Issuing CA of the OCSP responder certificate, when known.
    pub ocsp_responder_issuer: Option<String>,
    /// Issuing CA of the timestamp token, when known.
    pub timestamp_issuer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl SignatureValidation {
    pub fn valid() -> Self {
        Self { valid: true, errors: Vec::new() }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self { valid: false, errors }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Technical failure: {0}")]
    Technical(String),

    #[error("Certificate failure: {0}")]
    Certificate(String),

    #[error("Request to {service_url} failed: {message}")]
    Network { service_url: String, message: String },

    #[error("Data files removed from container: {0}")]
    RemovedDataFiles(String),
}

/// Receives every outbound provider request the engine makes while finalizing.
pub trait ProviderRequestObserver: Send + Sync {
    fn on_request(&self, url: &str);
}

#[async_trait]
pub trait SigningEngine: Send + Sync {
    async fn build_data_to_sign(
        &self,
        data_files: &[DataFileDigest],
        parameters: &SignatureParameters,
    ) -> Result<DataToSign, EngineError>;

    /// Produce the finished signature, fetching OCSP/TSA material as the profile requires.
    async fn finalize(
        &self,
        data_to_sign: &DataToSign,
        signature_value: &[u8],
        observer: &dyn ProviderRequestObserver,
    ) -> Result<FinishedSignature, EngineError>;

    async fn validate(&self, signature: &FinishedSignature) -> Result<SignatureValidation, EngineError>;
}

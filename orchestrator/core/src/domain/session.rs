// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Container Session Aggregate
//!
//! Domain model for one container's signing lifecycle. A [`Session`] owns every
//! in-flight [`SignatureSession`] and [`CertificateSession`] started against the
//! container, plus the signer certificates resolved by a Smart-ID certificate
//! choice.
//!
//! ## Signature Session Lifecycle
//!
//! ```text
//! INIT ──start_signing──▶ OUTSTANDING ──poll (non-terminal)──▶ OUTSTANDING
//! OUTSTANDING ──poll (terminal)──▶ RESULT ──status check──▶ removed
//! OUTSTANDING ──poll error──▶ EXCEPTION ──status check (attempts exhausted)──▶ removed
//! ```
//!
//! ## Invariants
//!
//! - At most one [`SignatureSession`] exists per generated [`SignatureId`].
//! - `data_files_hash` is computed by [`data_files_hash`] when signing starts and
//!   must still match the container's data files at finalize time.
//! - [`SessionStatus::processing_counter`] never decreases; every non-`RESULT`
//!   status write increments it.
//! - A `Session` is only mutated by a caller holding the container-scoped
//!   distributed lock (see [`crate::domain::lock`]).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::signing::{DataToSign, SigningCertificate};

/// Identifier of a container session. Doubles as the container lock name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub Uuid);

impl ContainerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ContainerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generated identifier of one signing operation, returned to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureId(pub Uuid);

impl SignatureId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for SignatureId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SignatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generated identifier of one Smart-ID certificate choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CertificateId(pub Uuid);

impl CertificateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CertificateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CertificateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SigningType {
    Remote,
    MobileId,
    SmartId,
}

impl std::fmt::Display for SigningType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote => write!(f, "REMOTE"),
            Self::MobileId => write!(f, "MOBILE_ID"),
            Self::SmartId => write!(f, "SMART_ID"),
        }
    }
}

/// Identity under which requests are made to a Mobile-ID/Smart-ID provider.
///
/// Passed explicitly through every public entry point; the polling task reads it
/// back from the stored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingPartyInfo {
    pub name: String,
    pub uuid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    /// Waiting for the provider; a poll is scheduled or will be reprocessed.
    Outstanding,
    /// The provider reported a terminal status; waiting for the client to consume it.
    Result,
    /// The last poll failed; the error is kept in `status_error`.
    Exception,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusError {
    pub error_code: String,
    pub error_message: String,
}

/// Polling bookkeeping shared by signature and certificate sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Provider status label (e.g. `OUTSTANDING_TRANSACTION`, `SIGNATURE`).
    pub status: Option<String>,
    pub status_error: Option<StatusError>,
    processing_status: ProcessingStatus,
    processing_counter: u32,
    processing_status_timestamp: DateTime<Utc>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            status: None,
            status_error: None,
            processing_status: ProcessingStatus::Outstanding,
            processing_counter: 0,
            processing_status_timestamp: Utc::now(),
        }
    }
}

impl SessionStatus {
    pub fn processing_status(&self) -> ProcessingStatus {
        self.processing_status
    }

    pub fn processing_counter(&self) -> u32 {
        self.processing_counter
    }

    pub fn processing_status_timestamp(&self) -> DateTime<Utc> {
        self.processing_status_timestamp
    }

    /// Record a processing outcome. Every non-`RESULT` write counts as one
    /// processing attempt.
    pub fn set_processing_status(&mut self, processing_status: ProcessingStatus) {
        self.processing_status = processing_status;
        self.processing_status_timestamp = Utc::now();
        if processing_status != ProcessingStatus::Result {
            self.processing_counter = self.processing_counter.saturating_add(1);
        }
    }

    pub fn set_status_error(&mut self, error_code: impl Into<String>, error_message: impl Into<String>) {
        self.status_error = Some(StatusError {
            error_code: error_code.into(),
            error_message: error_message.into(),
        });
    }

    pub fn clear_status_error(&mut self) {
        self.status_error = None;
    }

    pub fn is_attempts_exhausted(&self, max_processing_attempts: u32) -> bool {
        self.processing_counter >= max_processing_attempts
    }

    /// Whether the reprocessing sweep should re-run the poll for this status.
    ///
    /// `OUTSTANDING` entries qualify once older than `processing_timeout`,
    /// `EXCEPTION` entries once older than `exception_timeout`, and only while
    /// the counter has not passed `max_processing_attempts`.
    pub fn is_reprocessable(
        &self,
        now: DateTime<Utc>,
        processing_timeout: std::time::Duration,
        exception_timeout: std::time::Duration,
        max_processing_attempts: u32,
    ) -> bool {
        let older_than = |timeout: std::time::Duration| {
            chrono::Duration::from_std(timeout)
                .map(|t| self.processing_status_timestamp < now - t)
                .unwrap_or(false)
        };
        let timed_out = match self.processing_status {
            ProcessingStatus::Outstanding => older_than(processing_timeout),
            ProcessingStatus::Exception => older_than(exception_timeout),
            ProcessingStatus::Result => false,
        };
        timed_out && self.processing_counter <= max_processing_attempts
    }
}

/// One in-flight or completed signing operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureSession {
    pub data_to_sign: DataToSign,
    pub signing_type: SigningType,
    pub relying_party_info: Option<RelyingPartyInfo>,
    /// Provider-side correlation id; absent for remote signing.
    pub session_code: Option<String>,
    pub data_files_hash: String,
    /// Raw signature value, set once the provider reports completion.
    pub signature: Option<Vec<u8>>,
    pub session_status: SessionStatus,
}

impl SignatureSession {
    pub fn remote(data_to_sign: DataToSign, data_files_hash: String) -> Self {
        Self {
            data_to_sign,
            signing_type: SigningType::Remote,
            relying_party_info: None,
            session_code: None,
            data_files_hash,
            signature: None,
            session_status: SessionStatus::default(),
        }
    }

    pub fn device(
        signing_type: SigningType,
        relying_party_info: RelyingPartyInfo,
        data_to_sign: DataToSign,
        session_code: String,
        data_files_hash: String,
    ) -> Self {
        Self {
            data_to_sign,
            signing_type,
            relying_party_info: Some(relying_party_info),
            session_code: Some(session_code),
            data_files_hash,
            signature: None,
            session_status: SessionStatus::default(),
        }
    }
}

/// A Smart-ID certificate choice in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateSession {
    pub relying_party_info: RelyingPartyInfo,
    pub session_code: String,
    /// Signer's document number, resolved once the choice completes.
    pub document_number: Option<String>,
    pub session_status: SessionStatus,
}

impl CertificateSession {
    pub fn new(relying_party_info: RelyingPartyInfo, session_code: String) -> Self {
        Self {
            relying_party_info,
            session_code,
            document_number: None,
            session_status: SessionStatus::default(),
        }
    }
}

/// Attached data file (ASiC containers keep the full content).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl DataFile {
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
        }
    }
}

/// Hashcode data file: only base64 digests and the size of the original file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashcodeDataFile {
    pub file_name: String,
    pub file_hash_sha256: Option<String>,
    pub file_hash_sha512: Option<String>,
    pub file_size: Option<u64>,
    pub mime_type: Option<String>,
}

/// A finished signature attached to the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSignature {
    pub generated_signature_id: SignatureId,
    pub signature_id: String,
    pub signature: Vec<u8>,
}

/// Container-specific payload of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContainerPayload {
    Asic {
        data_files: Vec<DataFile>,
        #[serde(default)]
        signatures: Vec<ContainerSignature>,
    },
    Hashcode {
        data_files: Vec<HashcodeDataFile>,
        #[serde(default)]
        signatures: Vec<ContainerSignature>,
    },
}

impl ContainerPayload {
    pub fn signatures(&self) -> &[ContainerSignature] {
        match self {
            Self::Asic { signatures, .. } | Self::Hashcode { signatures, .. } => signatures,
        }
    }
}

/// Aggregate root for one container's signing lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: ContainerId,
    pub client_name: String,
    pub service_name: String,
    pub service_uuid: String,
    pub container: ContainerPayload,
    signature_sessions: HashMap<SignatureId, SignatureSession>,
    certificate_sessions: HashMap<CertificateId, CertificateSession>,
    /// Signer certificates keyed by Smart-ID document number.
    certificates: HashMap<String, SigningCertificate>,
    version: u64,
}

impl Session {
    pub fn new(
        client_name: impl Into<String>,
        service_name: impl Into<String>,
        service_uuid: impl Into<String>,
        container: ContainerPayload,
    ) -> Self {
        Self {
            session_id: ContainerId::new(),
            client_name: client_name.into(),
            service_name: service_name.into(),
            service_uuid: service_uuid.into(),
            container,
            signature_sessions: HashMap::new(),
            certificate_sessions: HashMap::new(),
            certificates: HashMap::new(),
            version: 0,
        }
    }

    /// Store version, advanced by the session store on every update.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn increment_version(&mut self) {
        self.version += 1;
    }

    pub fn add_signature_session(&mut self, signature_id: SignatureId, signature_session: SignatureSession) {
        self.signature_sessions.insert(signature_id, signature_session);
    }

    pub fn signature_session(&self, signature_id: &SignatureId) -> Option<&SignatureSession> {
        self.signature_sessions.get(signature_id)
    }

    pub fn signature_session_mut(&mut self, signature_id: &SignatureId) -> Option<&mut SignatureSession> {
        self.signature_sessions.get_mut(signature_id)
    }

    pub fn remove_signature_session(&mut self, signature_id: &SignatureId) -> Option<SignatureSession> {
        self.signature_sessions.remove(signature_id)
    }

    pub fn signature_sessions(&self) -> impl Iterator<Item = (&SignatureId, &SignatureSession)> {
        self.signature_sessions.iter()
    }

    pub fn add_certificate_session(&mut self, certificate_id: CertificateId, certificate_session: CertificateSession) {
        self.certificate_sessions.insert(certificate_id, certificate_session);
    }

    pub fn certificate_session(&self, certificate_id: &CertificateId) -> Option<&CertificateSession> {
        self.certificate_sessions.get(certificate_id)
    }

    pub fn certificate_session_mut(&mut self, certificate_id: &CertificateId) -> Option<&mut CertificateSession> {
        self.certificate_sessions.get_mut(certificate_id)
    }

    pub fn remove_certificate_session(&mut self, certificate_id: &CertificateId) -> Option<CertificateSession> {
        self.certificate_sessions.remove(certificate_id)
    }

    pub fn certificate_sessions(&self) -> impl Iterator<Item = (&CertificateId, &CertificateSession)> {
        self.certificate_sessions.iter()
    }

    pub fn add_certificate(&mut self, document_number: impl Into<String>, certificate: SigningCertificate) {
        self.certificates.insert(document_number.into(), certificate);
    }

    pub fn certificate(&self, document_number: &str) -> Option<&SigningCertificate> {
        self.certificates.get(document_number)
    }

    pub fn clear_certificate(&mut self, document_number: &str) -> Option<SigningCertificate> {
        self.certificates.remove(document_number)
    }

    pub fn has_pending_operations(&self) -> bool {
        !self.signature_sessions.is_empty() || !self.certificate_sessions.is_empty()
    }
}

/// Digest over a set of `(file name, content digest)` pairs.
///
/// Order-agnostic: entries are sorted before hashing. Every record is length
/// prefixed so a byte moved between name and digest changes the result.
pub fn data_files_hash<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut entries: Vec<(&str, &[u8])> = entries.into_iter().collect();
    entries.sort();

    let mut hasher = Sha256::new();
    for (name, digest) in entries {
        hasher.update((name.len() as u64).to_be_bytes());
        hasher.update(name.as_bytes());
        hasher.update((digest.len() as u64).to_be_bytes());
        hasher.update(digest);
    }
    hex::encode(hasher.finalize())
}

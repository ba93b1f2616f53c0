// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Error taxonomy surfaced to gateway clients.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::lock::LockError;
use crate::domain::provider::BackendError;
use crate::domain::repository::RepositoryError;
use crate::domain::session::ContainerId;
use crate::domain::signing::EngineError;

/// Stable client-facing error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InternalServerError,
    InvalidSessionDataException,
    InvalidCertificateException,
    InvalidContainerException,
    ClientException,
    SmartidException,
    MidException,
    ConnectionLimitException,
    SignatureCreationException,
    RequestValidationException,
    ResourceNotFoundException,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
            Self::InvalidSessionDataException => "INVALID_SESSION_DATA_EXCEPTION",
            Self::InvalidCertificateException => "INVALID_CERTIFICATE_EXCEPTION",
            Self::InvalidContainerException => "INVALID_CONTAINER_EXCEPTION",
            Self::ClientException => "CLIENT_EXCEPTION",
            Self::SmartidException => "SMARTID_EXCEPTION",
            Self::MidException => "MID_EXCEPTION",
            Self::ConnectionLimitException => "CONNECTION_LIMIT_EXCEPTION",
            Self::SignatureCreationException => "SIGNATURE_CREATION_EXCEPTION",
            Self::RequestValidationException => "REQUEST_VALIDATION_EXCEPTION",
            Self::ResourceNotFoundException => "RESOURCE_NOT_FOUND_EXCEPTION",
        }
    }

    /// Parse a stored code, falling back to `INTERNAL_SERVER_ERROR` for
    /// missing or unknown values.
    pub fn parse_lenient(code: Option<&str>) -> Self {
        code.and_then(|c| c.parse().ok())
            .unwrap_or(Self::InternalServerError)
    }
}

impl FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INTERNAL_SERVER_ERROR" => Ok(Self::InternalServerError),
            "INVALID_SESSION_DATA_EXCEPTION" => Ok(Self::InvalidSessionDataException),
            "INVALID_CERTIFICATE_EXCEPTION" => Ok(Self::InvalidCertificateException),
            "INVALID_CONTAINER_EXCEPTION" => Ok(Self::InvalidContainerException),
            "CLIENT_EXCEPTION" => Ok(Self::ClientException),
            "SMARTID_EXCEPTION" => Ok(Self::SmartidException),
            "MID_EXCEPTION" => Ok(Self::MidException),
            "CONNECTION_LIMIT_EXCEPTION" => Ok(Self::ConnectionLimitException),
            "SIGNATURE_CREATION_EXCEPTION" => Ok(Self::SignatureCreationException),
            "REQUEST_VALIDATION_EXCEPTION" => Ok(Self::RequestValidationException),
            "RESOURCE_NOT_FOUND_EXCEPTION" => Ok(Self::ResourceNotFoundException),
            other => Err(format!("unknown error code: {other}")),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("Invalid session data: {0}")]
    InvalidSession(String),

    #[error("Nothing to sign: {0}")]
    NothingToSign(String),

    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Unable to create signature: {0}")]
    SignatureCreation(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An error recorded during background polling, surfaced on status check.
    #[error("{code}: {message}")]
    Api { code: ErrorCode, message: String },

    #[error("Container {0} is locked by another operation")]
    ContainerBusy(ContainerId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl SigningError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidSession(_) | Self::NothingToSign(_) => ErrorCode::InvalidSessionDataException,
            Self::InvalidCertificate(_) => ErrorCode::InvalidCertificateException,
            Self::SignatureCreation(_) => ErrorCode::SignatureCreationException,
            Self::InvalidRequest(_) => ErrorCode::RequestValidationException,
            Self::Api { code, .. } => *code,
            Self::ContainerBusy(_) => ErrorCode::ConnectionLimitException,
            Self::Repository(RepositoryError::NotFound(_)) => ErrorCode::ResourceNotFoundException,
            Self::Repository(_) | Self::Lock(_) => ErrorCode::InternalServerError,
            Self::Backend(_) => ErrorCode::ClientException,
        }
    }
}

impl From<EngineError> for SigningError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::RemovedDataFiles(message) => Self::InvalidRequest(message),
            other => Self::SignatureCreation(other.to_string()),
        }
    }
}

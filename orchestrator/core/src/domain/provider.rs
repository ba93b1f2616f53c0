// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Mobile-ID / Smart-ID Provider Boundary
//!
//! [`SigningBackend`] is the seam between the orchestrator and a device signing
//! provider. Each backend reports its own status vocabulary through
//! [`ProviderStatus`], so the polling and status-check logic is written once
//! and instantiated per provider.
//!
//! | Provider | Success label | Certificate label | Running label |
//! |----------|---------------|-------------------|---------------|
//! | Mobile-ID | `SIGNATURE` | n/a | `OUTSTANDING_TRANSACTION` |
//! | Smart-ID | `SIGNATURE` | `CERTIFICATE` | `OUTSTANDING_TRANSACTION` |

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::errors::ErrorCode;
use crate::domain::session::{RelyingPartyInfo, SigningType};
use crate::domain::signing::{DataToSign, SigningCertificate};

/// Label reported while the provider has not reached a terminal state.
pub const OUTSTANDING_TRANSACTION: &str = "OUTSTANDING_TRANSACTION";

/// Label of a completed signing transaction, for every provider.
pub const SIGNATURE: &str = "SIGNATURE";

/// Provider status vocabulary.
pub trait ProviderStatus: Clone + Debug + Send + Sync + 'static {
    /// Label stored and returned for a signing session.
    fn signing_label(&self) -> &'static str;

    /// Label stored and returned for a certificate-choice session.
    fn certificate_label(&self) -> &'static str;

    /// Whether the provider is still waiting on the signer.
    fn is_running(&self) -> bool;

    /// Whether the provider completed successfully.
    fn is_success(&self) -> bool;

    /// Error code recorded when a poll against this provider fails.
    fn provider_error_code() -> ErrorCode
    where
        Self: Sized;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MobileIdStatus {
    OutstandingTransaction,
    Signature,
    ExpiredTransaction,
    UserCancel,
    NotValid,
    PhoneAbsent,
    SendingError,
    SimError,
    InternalError,
}

impl ProviderStatus for MobileIdStatus {
    fn signing_label(&self) -> &'static str {
        match self {
            Self::OutstandingTransaction => OUTSTANDING_TRANSACTION,
            Self::Signature => SIGNATURE,
            Self::ExpiredTransaction => "EXPIRED_TRANSACTION",
            Self::UserCancel => "USER_CANCEL",
            Self::NotValid => "NOT_VALID",
            Self::PhoneAbsent => "PHONE_ABSENT",
            Self::SendingError => "SENDING_ERROR",
            Self::SimError => "SIM_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    fn certificate_label(&self) -> &'static str {
        self.signing_label()
    }

    fn is_running(&self) -> bool {
        matches!(self, Self::OutstandingTransaction)
    }

    fn is_success(&self) -> bool {
        matches!(self, Self::Signature)
    }

    fn provider_error_code() -> ErrorCode {
        ErrorCode::MidException
    }
}

/// Smart-ID session end results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SmartIdStatus {
    Running,
    Ok,
    UserRefused,
    UserRefusedCertChoice,
    UserRefusedConfirmationMessage,
    UserRefusedConfirmationMessageWithVcChoice,
    UserRefusedDisplayTextAndPin,
    UserRefusedVcChoice,
    WrongVc,
    Timeout,
    DocumentUnusable,
    RequiredInteractionNotSupportedByApp,
    UserAccountNotFound,
    InternalError,
}

impl SmartIdStatus {
    fn failure_label(&self) -> &'static str {
        match self {
            Self::Running => OUTSTANDING_TRANSACTION,
            Self::UserRefused
            | Self::UserRefusedCertChoice
            | Self::UserRefusedConfirmationMessage
            | Self::UserRefusedConfirmationMessageWithVcChoice
            | Self::UserRefusedDisplayTextAndPin
            | Self::UserRefusedVcChoice => "USER_CANCEL",
            Self::WrongVc => "WRONG_VC_SELECTED",
            Self::Timeout => "EXPIRED_TRANSACTION",
            Self::DocumentUnusable => "DOCUMENT_NOT_USABLE",
            Self::RequiredInteractionNotSupportedByApp => "NOT_SUPPORTED",
            Self::UserAccountNotFound => "ACCOUNT_NOT_FOUND",
            Self::InternalError | Self::Ok => "ERROR",
        }
    }
}

impl ProviderStatus for SmartIdStatus {
    fn signing_label(&self) -> &'static str {
        match self {
            Self::Ok => SIGNATURE,
            other => other.failure_label(),
        }
    }

    fn certificate_label(&self) -> &'static str {
        match self {
            Self::Ok => "CERTIFICATE",
            other => other.failure_label(),
        }
    }

    fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    fn is_success(&self) -> bool {
        matches!(self, Self::Ok)
    }

    fn provider_error_code() -> ErrorCode {
        ErrorCode::SmartidException
    }
}

/// Signer-identifying inputs for a provider request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerRequest {
    pub person_identifier: Option<String>,
    pub country: Option<String>,
    pub phone_no: Option<String>,
    /// Smart-ID document number; set when a certificate choice already resolved it.
    pub document_number: Option<String>,
    pub language: Option<String>,
    pub message_to_display: Option<String>,
    /// Smart-ID certificate level ("QUALIFIED" or "ADVANCED"). Filled from
    /// configuration when unset.
    pub certificate_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedSigning {
    pub session_code: String,
    pub challenge_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCertificate {
    pub document_number: Option<String>,
    pub certificate: SigningCertificate,
}

#[derive(Debug, Clone)]
pub struct StatusResponse<S> {
    pub status: S,
    pub signature: Option<Vec<u8>>,
    pub certificate: Option<ProviderCertificate>,
}

impl<S> StatusResponse<S> {
    pub fn status(status: S) -> Self {
        Self {
            status,
            signature: None,
            certificate: None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Provider rejected the request: {0}")]
    Provider(String),

    #[error("Provider request failed: {0}")]
    Transport(String),

    #[error("Operation not supported by provider: {0}")]
    Unsupported(&'static str),
}

#[async_trait]
pub trait SigningBackend: Send + Sync {
    type Status: ProviderStatus;

    fn signing_type(&self) -> SigningType;

    async fn get_certificate(
        &self,
        relying_party: &RelyingPartyInfo,
        signer: &SignerRequest,
    ) -> Result<ProviderCertificate, BackendError>;

    async fn initiate_signing(
        &self,
        relying_party: &RelyingPartyInfo,
        data_to_sign: &DataToSign,
        signer: &SignerRequest,
    ) -> Result<InitiatedSigning, BackendError>;

    async fn get_signature_status(
        &self,
        relying_party: &RelyingPartyInfo,
        session_code: &str,
    ) -> Result<StatusResponse<Self::Status>, BackendError>;

    /// Start a certificate choice and return the provider session code.
    async fn initiate_certificate_choice(
        &self,
        _relying_party: &RelyingPartyInfo,
        _signer: &SignerRequest,
    ) -> Result<String, BackendError> {
        Err(BackendError::Unsupported("certificate choice"))
    }

    async fn get_certificate_status(
        &self,
        _relying_party: &RelyingPartyInfo,
        _session_code: &str,
    ) -> Result<StatusResponse<Self::Status>, BackendError> {
        Err(BackendError::Unsupported("certificate status"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smart_id_label_mapping() {
        assert_eq!(SmartIdStatus::Ok.signing_label(), "SIGNATURE");
        assert_eq!(SmartIdStatus::Ok.certificate_label(), "CERTIFICATE");
        assert_eq!(SmartIdStatus::UserRefusedVcChoice.signing_label(), "USER_CANCEL");
        assert_eq!(SmartIdStatus::WrongVc.signing_label(), "WRONG_VC_SELECTED");
        assert_eq!(SmartIdStatus::Timeout.certificate_label(), "EXPIRED_TRANSACTION");
        assert_eq!(SmartIdStatus::DocumentUnusable.signing_label(), "DOCUMENT_NOT_USABLE");
        assert_eq!(SmartIdStatus::RequiredInteractionNotSupportedByApp.signing_label(), "NOT_SUPPORTED");
        assert_eq!(SmartIdStatus::UserAccountNotFound.signing_label(), "ACCOUNT_NOT_FOUND");
        assert_eq!(SmartIdStatus::InternalError.signing_label(), "ERROR");
        assert_eq!(SmartIdStatus::Running.signing_label(), OUTSTANDING_TRANSACTION);
        assert!(SmartIdStatus::Running.is_running());
        assert!(!SmartIdStatus::Timeout.is_running());
    }

    #[test]
    fn test_mobile_id_terminal_states() {
        assert!(MobileIdStatus::OutstandingTransaction.is_running());
        assert!(MobileIdStatus::Signature.is_success());
        assert!(!MobileIdStatus::UserCancel.is_success());
        assert!(!MobileIdStatus::UserCancel.is_running());
        assert_eq!(MobileIdStatus::provider_error_code(), ErrorCode::MidException);
    }
}

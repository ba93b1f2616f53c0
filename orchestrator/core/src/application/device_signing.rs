// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Device Signing Service (Mobile-ID / Smart-ID)
//!
//! Starts a signing transaction with the provider, then polls its status in
//! the background until a terminal state is reached. The client observes the
//! outcome through [`DeviceSigningService::get_signature_status`], which also
//! finalizes the signature on success.
//!
//! Mobile-ID and Smart-ID differ only in their [`SigningBackend`] and status
//! vocabulary, so one generic service serves both.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn, Instrument};

use super::signing_orchestrator::{no_data_to_sign, SigningOrchestrator};
use super::status_polling::{
    attempts_exhausted_error, poll_exclusively, polling_error_code, record_exception, PollOutcome,
};
use crate::domain::errors::SigningError;
use crate::domain::events::{param, AuditLog, EventName};
use crate::domain::gateway_config::GatewayConfigSpec;
use crate::domain::provider::{
    MobileIdStatus, ProviderStatus, SignerRequest, SigningBackend, SmartIdStatus, StatusResponse,
    OUTSTANDING_TRANSACTION, SIGNATURE,
};
use crate::domain::session::{
    ContainerId, ProcessingStatus, RelyingPartyInfo, SignatureId, SignatureSession, SigningType,
};
use crate::domain::signing::{SignatureParameters, SigningChallenge};
use crate::infrastructure::task_executor::DelayedTaskExecutor;

pub type MobileIdSigningService = DeviceSigningService<MobileIdStatus>;
pub type SmartIdSigningService = DeviceSigningService<SmartIdStatus>;

pub struct DeviceSigningService<S: ProviderStatus> {
    orchestrator: Arc<SigningOrchestrator>,
    backend: Arc<dyn SigningBackend<Status = S>>,
    executor: Arc<DelayedTaskExecutor>,
    polling_delay: Duration,
    max_processing_attempts: u32,
    /// Certificate level requested from the provider unless the signer sets one.
    certificate_level: Option<String>,
}

impl<S: ProviderStatus> Clone for DeviceSigningService<S> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            backend: self.backend.clone(),
            executor: self.executor.clone(),
            polling_delay: self.polling_delay,
            max_processing_attempts: self.max_processing_attempts,
            certificate_level: self.certificate_level.clone(),
        }
    }
}

impl DeviceSigningService<MobileIdStatus> {
    pub fn mobile_id(
        orchestrator: Arc<SigningOrchestrator>,
        backend: Arc<dyn SigningBackend<Status = MobileIdStatus>>,
        executor: Arc<DelayedTaskExecutor>,
        config: &GatewayConfigSpec,
    ) -> Self {
        Self::new(
            orchestrator,
            backend,
            executor,
            config.mobile_id.status_polling_delay,
            config.status_reprocessing.max_processing_attempts,
        )
    }
}

impl DeviceSigningService<SmartIdStatus> {
    pub fn smart_id(
        orchestrator: Arc<SigningOrchestrator>,
        backend: Arc<dyn SigningBackend<Status = SmartIdStatus>>,
        executor: Arc<DelayedTaskExecutor>,
        config: &GatewayConfigSpec,
    ) -> Self {
        Self {
            certificate_level: Some(config.smart_id.certificate_level.clone()),
            ..Self::new(
                orchestrator,
                backend,
                executor,
                config.smart_id.status_polling_delay,
                config.status_reprocessing.max_processing_attempts,
            )
        }
    }
}

impl<S: ProviderStatus> DeviceSigningService<S> {
    pub fn new(
        orchestrator: Arc<SigningOrchestrator>,
        backend: Arc<dyn SigningBackend<Status = S>>,
        executor: Arc<DelayedTaskExecutor>,
        polling_delay: Duration,
        max_processing_attempts: u32,
    ) -> Self {
        Self {
            orchestrator,
            backend,
            executor,
            polling_delay,
            max_processing_attempts,
            certificate_level: None,
        }
    }

    pub fn orchestrator(&self) -> &Arc<SigningOrchestrator> {
        &self.orchestrator
    }

    pub fn signing_type(&self) -> SigningType {
        self.backend.signing_type()
    }

    /// Start a signing transaction and schedule the first status poll.
    ///
    /// Provider calls run without the container lock; the lock is only taken
    /// to store the new signature session.
    pub async fn start_signing(
        &self,
        container_id: &ContainerId,
        relying_party: RelyingPartyInfo,
        mut signer: SignerRequest,
        mut parameters: SignatureParameters,
    ) -> Result<SigningChallenge, SigningError> {
        let container = self.orchestrator.container();
        if signer.certificate_level.is_none() {
            signer.certificate_level = self.certificate_level.clone();
        }

        let session = container.get_session(container_id).await?;
        container.verify_signing_object_existence(&session)?;

        let cached = signer
            .document_number
            .as_deref()
            .and_then(|doc| session.certificate(doc).cloned());
        let certificate = match cached {
            Some(certificate) => {
                debug!(container_id = %container_id, "Using certificate from certificate choice");
                certificate
            }
            None => self.backend.get_certificate(&relying_party, &signer).await?.certificate,
        };
        if certificate.is_empty() {
            return Err(SigningError::InvalidCertificate(
                "Provider returned an empty signing certificate".to_string(),
            ));
        }
        parameters.signing_certificate = Some(certificate);

        let data_to_sign = container.build_data_to_sign(&session, &parameters).await?;
        let data_files_hash = container.generate_data_files_hash(&session)?;
        let initiated = self
            .backend
            .initiate_signing(&relying_party, &data_to_sign, &signer)
            .await?;

        let generated_signature_id = SignatureId::new();
        let signature_session = SignatureSession::device(
            self.backend.signing_type(),
            relying_party,
            data_to_sign,
            initiated.session_code,
            data_files_hash,
        );

        self.orchestrator
            .with_container_lock(container_id, async {
                let mut session = container.get_session(container_id).await?;
                session.add_signature_session(generated_signature_id, signature_session);
                if let Some(doc) = signer.document_number.as_deref() {
                    session.clear_certificate(doc);
                }
                self.orchestrator.store().update(&session).await?;
                Ok(())
            })
            .await?;

        info!(
            container_id = %container_id,
            signature_id = %generated_signature_id,
            signing_type = %self.backend.signing_type(),
            flavor = container.flavor(),
            "Device signing started"
        );
        self.schedule_signature_poll(*container_id, generated_signature_id, self.polling_delay);

        Ok(SigningChallenge {
            challenge_id: initiated.challenge_id,
            generated_signature_id,
        })
    }

    /// Report the signing status. On a successful terminal status the
    /// signature is finalized and attached; any terminal status consumes the
    /// signature session.
    pub async fn get_signature_status(
        &self,
        container_id: &ContainerId,
        signature_id: SignatureId,
    ) -> Result<String, SigningError> {
        let audit = self.orchestrator.open_audit_log();
        let result = self.consume_signature_status(&audit, container_id, signature_id).await;
        audit.flush();
        result
    }

    async fn consume_signature_status(
        &self,
        audit: &dyn AuditLog,
        container_id: &ContainerId,
        signature_id: SignatureId,
    ) -> Result<String, SigningError> {
        self.orchestrator
            .with_container_lock(container_id, async {
                let mut session = self.orchestrator.container().get_session(container_id).await?;
                let signature_session = session
                    .signature_session(&signature_id)
                    .ok_or_else(|| no_data_to_sign(signature_id))?;
                if signature_session.signing_type != self.backend.signing_type() {
                    return Err(SigningError::InvalidSession(format!(
                        "Unable to get signature status for signing type: {}",
                        signature_session.signing_type
                    )));
                }
                let status = signature_session.session_status.clone();
                let raw_signature = signature_session.signature.clone();

                match status.processing_status() {
                    ProcessingStatus::Result => {
                        let label = status.status.clone().unwrap_or_default();
                        let finalized = match raw_signature {
                            Some(raw) if status.status_error.is_none() && label == SIGNATURE => {
                                self.orchestrator
                                    .finalize_and_attach(audit, &mut session, signature_id, &raw)
                                    .await
                            }
                            _ => Ok(()),
                        };
                        session.remove_signature_session(&signature_id);
                        self.orchestrator.store().update(&session).await?;
                        finalized?;
                        info!(
                            container_id = %container_id,
                            signature_id = %signature_id,
                            status = %label,
                            "Signature status consumed"
                        );
                        Ok(label)
                    }
                    _ if status.is_attempts_exhausted(self.max_processing_attempts) => {
                        warn!(
                            container_id = %container_id,
                            signature_id = %signature_id,
                            attempts = status.processing_counter(),
                            "Status polling attempts exhausted"
                        );
                        session.remove_signature_session(&signature_id);
                        self.orchestrator.store().update(&session).await?;
                        Err(attempts_exhausted_error(&status))
                    }
                    _ => Ok(OUTSTANDING_TRANSACTION.to_string()),
                }
            })
            .await
    }

    /// Schedule a background status poll after `delay`.
    pub fn schedule_signature_poll(
        &self,
        container_id: ContainerId,
        signature_id: SignatureId,
        delay: Duration,
    ) {
        let service = self.clone();
        self.executor.schedule(delay, async move {
            service.poll_signature_status(container_id, signature_id).await;
        });
    }

    /// One status-polling attempt. Safe to run concurrently; at most one
    /// attempt per signature talks to the provider at a time.
    pub async fn poll_signature_status(
        &self,
        container_id: ContainerId,
        signature_id: SignatureId,
    ) -> PollOutcome {
        let operation_id = signature_id.to_string();
        let span = tracing::info_span!(
            "signature_status_poll",
            container_id = %container_id,
            signature_id = %signature_id,
            signing_type = %self.backend.signing_type()
        );

        let audit = self.orchestrator.open_audit_log();
        let outcome = poll_exclusively(
            self.orchestrator.lock(),
            &operation_id,
            self.fetch_and_merge(&audit, container_id, signature_id, &operation_id),
            |err| self.record_polling_exception(container_id, signature_id, &operation_id, err),
        )
        .instrument(span)
        .await;

        audit.flush();
        outcome
    }

    async fn fetch_and_merge(
        &self,
        audit: &dyn AuditLog,
        container_id: ContainerId,
        signature_id: SignatureId,
        operation_id: &str,
    ) -> Result<(), SigningError> {
        let Some(session) = self.orchestrator.store().get(&container_id).await? else {
            warn!("Session expired, status polling stopped");
            return Ok(());
        };
        let Some(signature_session) = session.signature_session(&signature_id) else {
            warn!("Signature session no longer present, status polling stopped");
            return Ok(());
        };
        if signature_session.session_status.processing_status() == ProcessingStatus::Result {
            debug!("Signature status already resolved");
            return Ok(());
        }
        let relying_party = signature_session.relying_party_info.clone().ok_or_else(|| {
            SigningError::InvalidSession("Signature session has no relying party".to_string())
        })?;
        let session_code = signature_session.session_code.clone().ok_or_else(|| {
            SigningError::InvalidSession(
                "Signature session has no provider session code".to_string(),
            )
        })?;

        let event = audit.log_start_event(EventName::SignatureStatusPoll);
        audit.add_parameter(event, param::CONTAINER_ID, &container_id.to_string());
        audit.add_parameter(event, param::SIGNATURE_ID, &signature_id.to_string());

        let response = match self
            .backend
            .get_signature_status(&relying_party, &session_code)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                audit.log_exception_event(event, S::provider_error_code().as_str(), &e.to_string());
                return Err(e.into());
            }
        };
        audit.add_parameter(event, param::PROVIDER_STATUS, response.status.signing_label());
        audit.log_end_event(event);

        self.orchestrator
            .merge_into_session(&container_id, operation_id, move |session| {
                let Some(signature_session) = session.signature_session_mut(&signature_id) else {
                    warn!("Signature session removed while polling");
                    return false;
                };
                apply_signature_response::<S>(
                    &mut signature_session.session_status,
                    &mut signature_session.signature,
                    response,
                );
                true
            })
            .await?;
        Ok(())
    }

    async fn record_polling_exception(
        &self,
        container_id: ContainerId,
        signature_id: SignatureId,
        operation_id: &str,
        err: SigningError,
    ) {
        let code = polling_error_code::<S>(&err);
        let message = err.to_string();
        let recorded = self
            .orchestrator
            .merge_into_session(&container_id, operation_id, |session| {
                match session.signature_session_mut(&signature_id) {
                    Some(signature_session) => {
                        record_exception(&mut signature_session.session_status, code, &message);
                        true
                    }
                    None => false,
                }
            })
            .await;
        if let Err(e) = recorded {
            warn!(error = %e, "Unable to record status polling exception");
        }
    }
}

fn apply_signature_response<S: ProviderStatus>(
    status: &mut crate::domain::session::SessionStatus,
    signature: &mut Option<Vec<u8>>,
    response: StatusResponse<S>,
) {
    let label = response.status.signing_label();
    status.status = Some(label.to_string());

    if response.status.is_running() {
        status.set_processing_status(ProcessingStatus::Outstanding);
        return;
    }

    if response.status.is_success() && response.signature.is_none() {
        record_exception(status, S::provider_error_code(), "No signature in provider response");
        return;
    }

    *signature = response.signature;
    status.clear_status_error();
    status.set_processing_status(ProcessingStatus::Result);
}

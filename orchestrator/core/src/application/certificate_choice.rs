// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Smart-ID Certificate Choice
//!
//! Lets a signer pick a Smart-ID certificate before signing. The resolved
//! certificate is cached on the session under the signer's document number;
//! a later Smart-ID `start_signing` with that document number uses it instead
//! of fetching one from the provider.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn, Instrument};

use super::signing_orchestrator::SigningOrchestrator;
use super::status_polling::{
    attempts_exhausted_error, poll_exclusively, polling_error_code, record_exception, PollOutcome,
};
use crate::domain::errors::{ErrorCode, SigningError};
use crate::domain::events::{param, AuditLog, EventName};
use crate::domain::gateway_config::GatewayConfigSpec;
use crate::domain::provider::{
    ProviderCertificate, ProviderStatus, SignerRequest, SigningBackend, SmartIdStatus,
    StatusResponse, OUTSTANDING_TRANSACTION,
};
use crate::domain::session::{
    CertificateId, CertificateSession, ContainerId, ProcessingStatus, RelyingPartyInfo, Session,
};
use crate::infrastructure::task_executor::DelayedTaskExecutor;

/// Reported by [`CertificateChoiceService::get_certificate_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateStatus {
    pub status: String,
    pub document_number: Option<String>,
}

#[derive(Clone)]
pub struct CertificateChoiceService {
    orchestrator: Arc<SigningOrchestrator>,
    backend: Arc<dyn SigningBackend<Status = SmartIdStatus>>,
    executor: Arc<DelayedTaskExecutor>,
    polling_delay: Duration,
    max_processing_attempts: u32,
    certificate_level: String,
}

impl CertificateChoiceService {
    pub fn new(
        orchestrator: Arc<SigningOrchestrator>,
        backend: Arc<dyn SigningBackend<Status = SmartIdStatus>>,
        executor: Arc<DelayedTaskExecutor>,
        config: &GatewayConfigSpec,
    ) -> Self {
        Self {
            orchestrator,
            backend,
            executor,
            polling_delay: config.smart_id.status_polling_delay,
            max_processing_attempts: config.status_reprocessing.max_processing_attempts,
            certificate_level: config.smart_id.certificate_level.clone(),
        }
    }

    pub fn orchestrator(&self) -> &Arc<SigningOrchestrator> {
        &self.orchestrator
    }

    pub async fn init_certificate_choice(
        &self,
        container_id: &ContainerId,
        relying_party: RelyingPartyInfo,
        mut signer: SignerRequest,
    ) -> Result<CertificateId, SigningError> {
        let container = self.orchestrator.container();
        container.get_session(container_id).await?;
        if signer.certificate_level.is_none() {
            signer.certificate_level = Some(self.certificate_level.clone());
        }

        let session_code = self
            .backend
            .initiate_certificate_choice(&relying_party, &signer)
            .await?;
        let certificate_id = CertificateId::new();
        let certificate_session = CertificateSession::new(relying_party, session_code);

        self.orchestrator
            .with_container_lock(container_id, async {
                let mut session = container.get_session(container_id).await?;
                session.add_certificate_session(certificate_id, certificate_session);
                self.orchestrator.store().update(&session).await?;
                Ok(())
            })
            .await?;

        info!(
            container_id = %container_id,
            certificate_id = %certificate_id,
            "Certificate choice started"
        );
        self.schedule_certificate_poll(*container_id, certificate_id, self.polling_delay);
        Ok(certificate_id)
    }

    /// Report the certificate-choice status. A terminal status consumes the
    /// certificate session.
    pub async fn get_certificate_status(
        &self,
        container_id: &ContainerId,
        certificate_id: CertificateId,
    ) -> Result<CertificateStatus, SigningError> {
        self.orchestrator
            .with_container_lock(container_id, async {
                let mut session = self.orchestrator.container().get_session(container_id).await?;
                let certificate_session =
                    session.certificate_session(&certificate_id).ok_or_else(|| {
                        SigningError::InvalidSession(format!(
                            "Unable to find certificate session with certificate Id: {}",
                            certificate_id
                        ))
                    })?;
                let status = certificate_session.session_status.clone();
                let document_number = certificate_session.document_number.clone();

                match status.processing_status() {
                    ProcessingStatus::Result => {
                        session.remove_certificate_session(&certificate_id);
                        self.orchestrator.store().update(&session).await?;
                        if status.status_error.is_some() {
                            return Err(attempts_exhausted_error(&status));
                        }
                        Ok(CertificateStatus {
                            status: status.status.clone().unwrap_or_default(),
                            document_number,
                        })
                    }
                    _ if status.is_attempts_exhausted(self.max_processing_attempts) => {
                        warn!(
                            container_id = %container_id,
                            certificate_id = %certificate_id,
                            attempts = status.processing_counter(),
                            "Certificate status polling attempts exhausted"
                        );
                        session.remove_certificate_session(&certificate_id);
                        self.orchestrator.store().update(&session).await?;
                        Err(attempts_exhausted_error(&status))
                    }
                    _ => Ok(CertificateStatus {
                        status: OUTSTANDING_TRANSACTION.to_string(),
                        document_number: None,
                    }),
                }
            })
            .await
    }

    pub fn schedule_certificate_poll(
        &self,
        container_id: ContainerId,
        certificate_id: CertificateId,
        delay: Duration,
    ) {
        let service = self.clone();
        self.executor.schedule(delay, async move {
            service.poll_certificate_status(container_id, certificate_id).await;
        });
    }

    pub async fn poll_certificate_status(
        &self,
        container_id: ContainerId,
        certificate_id: CertificateId,
    ) -> PollOutcome {
        let operation_id = certificate_id.to_string();
        let span = tracing::info_span!(
            "certificate_status_poll",
            container_id = %container_id,
            certificate_id = %certificate_id
        );

        let audit = self.orchestrator.open_audit_log();
        let outcome = poll_exclusively(
            self.orchestrator.lock(),
            &operation_id,
            self.fetch_and_merge(&audit, container_id, certificate_id, &operation_id),
            |err| self.record_polling_exception(container_id, certificate_id, &operation_id, err),
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
        certificate_id: CertificateId,
        operation_id: &str,
    ) -> Result<(), SigningError> {
        let Some(session) = self.orchestrator.store().get(&container_id).await? else {
            warn!("Session expired, certificate status polling stopped");
            return Ok(());
        };
        let Some(certificate_session) = session.certificate_session(&certificate_id) else {
            warn!("Certificate session no longer present, status polling stopped");
            return Ok(());
        };
        if certificate_session.session_status.processing_status() == ProcessingStatus::Result {
            return Ok(());
        }
        let relying_party = certificate_session.relying_party_info.clone();
        let session_code = certificate_session.session_code.clone();

        let event = audit.log_start_event(EventName::CertificateStatusPoll);
        audit.add_parameter(event, param::CONTAINER_ID, &container_id.to_string());
        audit.add_parameter(event, param::CERTIFICATE_ID, &certificate_id.to_string());

        let response = match self
            .backend
            .get_certificate_status(&relying_party, &session_code)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let code = ErrorCode::SmartidException;
                audit.log_exception_event(event, code.as_str(), &e.to_string());
                return Err(e.into());
            }
        };
        audit.add_parameter(event, param::PROVIDER_STATUS, response.status.certificate_label());
        audit.log_end_event(event);

        self.orchestrator
            .merge_into_session(&container_id, operation_id, move |session| {
                apply_certificate_response(session, &certificate_id, response)
            })
            .await?;
        Ok(())
    }

    async fn record_polling_exception(
        &self,
        container_id: ContainerId,
        certificate_id: CertificateId,
        operation_id: &str,
        err: SigningError,
    ) {
        let code = polling_error_code::<SmartIdStatus>(&err);
        let message = err.to_string();
        let recorded = self
            .orchestrator
            .merge_into_session(&container_id, operation_id, |session| {
                match session.certificate_session_mut(&certificate_id) {
                    Some(certificate_session) => {
                        record_exception(&mut certificate_session.session_status, code, &message);
                        true
                    }
                    None => false,
                }
            })
            .await;
        if let Err(e) = recorded {
            warn!(error = %e, "Unable to record certificate polling exception");
        }
    }
}

/// Merge a certificate-status response into the session. Returns whether the
/// session changed.
fn apply_certificate_response(
    session: &mut Session,
    certificate_id: &CertificateId,
    response: StatusResponse<SmartIdStatus>,
) -> bool {
    if session.certificate_session(certificate_id).is_none() {
        warn!("Certificate session removed while polling");
        return false;
    }

    let resolved = match (response.status.is_success(), response.certificate) {
        (
            true,
            Some(ProviderCertificate {
                document_number: Some(document_number),
                certificate,
            }),
        ) => {
            session.add_certificate(document_number.clone(), certificate);
            Some(document_number)
        }
        _ => None,
    };

    let Some(certificate_session) = session.certificate_session_mut(certificate_id) else {
        return false;
    };
    let status = &mut certificate_session.session_status;
    status.status = Some(response.status.certificate_label().to_string());

    if response.status.is_running() {
        status.set_processing_status(ProcessingStatus::Outstanding);
        return true;
    }

    if response.status.is_success() && resolved.is_none() {
        status.set_status_error(
            ErrorCode::SmartidException.as_str(),
            "No certificate found from Smart-ID response",
        );
    } else {
        status.clear_status_error();
    }
    certificate_session.document_number = resolved;
    certificate_session.session_status.set_processing_status(ProcessingStatus::Result);
    true
}

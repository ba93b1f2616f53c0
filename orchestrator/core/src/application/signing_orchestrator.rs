// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Signing Orchestrator
//!
//! Shared signing machinery for every flow: remote signing, and the
//! finalize/attach step the Mobile-ID and Smart-ID services reuse once the
//! provider has returned a raw signature.
//!
//! ## Finalize Flow
//!
//! ```text
//! finalize_signature(container, signature_id, raw)
//!   1. take container lock (bounded wait)
//!   2. load session, look up SignatureSession
//!   3. recompute data-files hash; on mismatch remove the SignatureSession,
//!      persist, fail
//!   4. engine.finalize(data_to_sign, raw)  ── audited: FINALIZE_SIGNATURE,
//!      one event per OCSP/TSA request
//!   5. engine.validate(signature); fail when invalid
//!   6. attach signature, remove SignatureSession, persist
//!   7. release container lock, flush the operation's audit log
//! ```
//!
//! Every operation records its audit events in its own
//! [`SigningEventLog`]; the shared [`AuditSink`] only sees flushed batches.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::domain::container::ContainerSigningCapability;
use crate::domain::errors::SigningError;
use crate::domain::events::{error_code, param, AuditLog, AuditSink, EventId, EventName};
use crate::domain::gateway_config::{GatewayConfigSpec, ServiceEndpoints};
use crate::domain::lock::DistributedLock;
use crate::domain::repository::SessionStore;
use crate::domain::session::{ContainerId, Session, SignatureId, SignatureSession, SigningType};
use crate::domain::signing::{
    DataToSign, DataToSignWrapper, EngineError, FinishedSignature, ProviderRequestObserver,
    SignatureParameters, SigningEngine,
};
use crate::infrastructure::audit::SigningEventLog;

pub struct SigningOrchestrator {
    container: Arc<dyn ContainerSigningCapability>,
    store: Arc<dyn SessionStore>,
    lock: Arc<dyn DistributedLock>,
    engine: Arc<dyn SigningEngine>,
    audit_sink: Arc<dyn AuditSink>,
    endpoints: ServiceEndpoints,
    container_lock_timeout: Duration,
}

impl SigningOrchestrator {
    pub fn new(
        container: Arc<dyn ContainerSigningCapability>,
        store: Arc<dyn SessionStore>,
        lock: Arc<dyn DistributedLock>,
        engine: Arc<dyn SigningEngine>,
        audit_sink: Arc<dyn AuditSink>,
        config: &GatewayConfigSpec,
    ) -> Self {
        Self {
            container,
            store,
            lock,
            engine,
            audit_sink,
            endpoints: config.endpoints.clone(),
            container_lock_timeout: config.locking.container_lock_timeout,
        }
    }

    pub fn container(&self) -> &dyn ContainerSigningCapability {
        self.container.as_ref()
    }

    pub(crate) fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    pub(crate) fn lock(&self) -> &dyn DistributedLock {
        self.lock.as_ref()
    }

    /// Fresh audit log for one operation. The caller flushes it when the
    /// operation ends.
    pub(crate) fn open_audit_log(&self) -> SigningEventLog {
        SigningEventLog::new(self.audit_sink.clone())
    }

    /// Build data-to-sign for a client that signs with its own key.
    pub async fn prepare_remote_signature(
        &self,
        container_id: &ContainerId,
        parameters: SignatureParameters,
    ) -> Result<DataToSignWrapper, SigningError> {
        self.with_container_lock(container_id, async {
            let mut session = self.container.get_session(container_id).await?;
            self.container.verify_signing_object_existence(&session)?;

            let data_to_sign = self.container.build_data_to_sign(&session, &parameters).await?;
            let data_files_hash = self.container.generate_data_files_hash(&session)?;
            let generated_signature_id = SignatureId::new();

            session.add_signature_session(
                generated_signature_id,
                SignatureSession::remote(data_to_sign.clone(), data_files_hash),
            );
            self.store.update(&session).await?;

            info!(
                container_id = %container_id,
                signature_id = %generated_signature_id,
                flavor = self.container.flavor(),
                "Remote signing prepared"
            );
            Ok(DataToSignWrapper {
                data_to_sign,
                generated_signature_id,
            })
        })
        .await
    }

    /// Finalize a remote signature with the client-supplied signature value.
    pub async fn finalize_signature(
        &self,
        container_id: &ContainerId,
        signature_id: SignatureId,
        signature_value: &[u8],
    ) -> Result<(), SigningError> {
        let audit = self.open_audit_log();
        let result = self
            .finalize_remote_signature(&audit, container_id, signature_id, signature_value)
            .await;
        audit.flush();
        result
    }

    async fn finalize_remote_signature(
        &self,
        audit: &dyn AuditLog,
        container_id: &ContainerId,
        signature_id: SignatureId,
        signature_value: &[u8],
    ) -> Result<(), SigningError> {
        self.with_container_lock(container_id, async {
            let mut session = self.container.get_session(container_id).await?;
            let signing_type = session
                .signature_session(&signature_id)
                .map(|s| s.signing_type)
                .ok_or_else(|| no_data_to_sign(signature_id))?;
            if signing_type != SigningType::Remote {
                return Err(SigningError::InvalidSession(format!(
                    "Unable to finalize signature for signing type: {}",
                    signing_type
                )));
            }

            self.finalize_and_attach(audit, &mut session, signature_id, signature_value).await?;
            session.remove_signature_session(&signature_id);
            self.store.update(&session).await?;

            info!(
                container_id = %container_id,
                signature_id = %signature_id,
                "Remote signature finalized"
            );
            Ok(())
        })
        .await
    }

    pub fn generate_data_files_hash(&self, session: &Session) -> Result<String, SigningError> {
        self.container.generate_data_files_hash(session)
    }

    /// Finalize the signature session's signature and attach it to the
    /// container. The caller holds the container lock and persists the session.
    pub(crate) async fn finalize_and_attach(
        &self,
        audit: &dyn AuditLog,
        session: &mut Session,
        signature_id: SignatureId,
        signature_value: &[u8],
    ) -> Result<(), SigningError> {
        let signature = self
            .finalize_session_signature(audit, session, signature_id, signature_value)
            .await;
        match signature {
            Ok(signature) => {
                metrics::counter!("siga_signatures_finalized_total", "outcome" => "success")
                    .increment(1);
                self.container.add_signature_to_session(session, &signature, signature_id)
            }
            Err(e) => {
                metrics::counter!("siga_signatures_finalized_total", "outcome" => "failure")
                    .increment(1);
                Err(e)
            }
        }
    }

    async fn finalize_session_signature(
        &self,
        audit: &dyn AuditLog,
        session: &mut Session,
        signature_id: SignatureId,
        signature_value: &[u8],
    ) -> Result<FinishedSignature, SigningError> {
        let (stored_hash, data_to_sign) = session
            .signature_session(&signature_id)
            .map(|s| (s.data_files_hash.clone(), s.data_to_sign.clone()))
            .ok_or_else(|| no_data_to_sign(signature_id))?;

        let current_hash = self.container.generate_data_files_hash(session)?;
        if stored_hash != current_hash {
            warn!(
                container_id = %session.session_id,
                signature_id = %signature_id,
                "Container data files changed after signing was initiated"
            );
            session.remove_signature_session(&signature_id);
            self.store.update(session).await?;
            return Err(SigningError::InvalidSession(
                "Unable to finalize signature. Container data files have been changed after signing was initiated. Repeat signing process"
                    .to_string(),
            ));
        }

        let signature = self.finalize_with_audit(audit, &data_to_sign, signature_value).await?;

        let validation = self.engine.validate(&signature).await?;
        if !validation.valid {
            return Err(SigningError::SignatureCreation(format!(
                "Signature is not valid: {}",
                validation.errors.join("; ")
            )));
        }
        Ok(signature)
    }

    async fn finalize_with_audit(
        &self,
        audit: &dyn AuditLog,
        data_to_sign: &DataToSign,
        signature_value: &[u8],
    ) -> Result<FinishedSignature, SigningError> {
        let start = audit.log_start_event(EventName::FinalizeSignature);
        audit.add_parameter(start, param::SIGNATURE_ID, &data_to_sign.signature_id);

        let observer = RequestAuditObserver {
            audit,
            endpoints: &self.endpoints,
        };

        match self.engine.finalize(data_to_sign, signature_value, &observer).await {
            Ok(signature) => {
                log_end_event(audit, start, &signature);
                Ok(signature)
            }
            Err(e) => {
                error!(
                    signature_id = %data_to_sign.signature_id,
                    error = %e,
                    "Unable to finalize signature"
                );
                self.log_exception_event(audit, start, &e);
                Err(e.into())
            }
        }
    }

    fn log_exception_event(&self, audit: &dyn AuditLog, start: EventId, err: &EngineError) {
        let message = err.to_string();
        match err {
            EngineError::Network { service_url, .. } => {
                let kind = self.endpoints.classify(service_url);
                let exception = audit.log_exception_event(
                    start,
                    error_code::SIGNATURE_FINALIZING_REQUEST_ERROR,
                    &message,
                );
                audit.add_parameter(exception, param::FAILED_SERVICE, &kind.to_string());
                audit.add_parameter(exception, param::REQUEST_URL, service_url);

                let failed = audit
                    .first_matching_after(start, &|e| e.has_parameter_value(service_url));
                if let Some(event) = failed {
                    audit.mark_exception(
                        event,
                        error_code::SIGNATURE_FINALIZING_REQUEST_ERROR,
                        &message,
                    );
                }
            }
            _ => {
                audit.log_exception_for_intermediate_events(
                    start,
                    error_code::SIGNATURE_FINALIZING_ERROR,
                    &message,
                );
                audit.log_exception_event(start, error_code::SIGNATURE_FINALIZING_ERROR, &message);
            }
        }
    }

    /// Run `operation` while holding the container lock. Fails with
    /// [`SigningError::ContainerBusy`] when the lock is not obtained in time.
    pub(crate) async fn with_container_lock<T, F>(
        &self,
        container_id: &ContainerId,
        operation: F,
    ) -> Result<T, SigningError>
    where
        F: Future<Output = Result<T, SigningError>>,
    {
        let name = container_id.to_string();
        if !self.lock.try_acquire_for(&name, self.container_lock_timeout).await? {
            metrics::counter!("siga_container_lock_timeouts_total").increment(1);
            return Err(SigningError::ContainerBusy(*container_id));
        }
        debug!(container_id = %container_id, "Container lock acquired");

        let result = operation.await;
        self.release_container_lock(&name).await;
        result
    }

    /// Reload the session under the container lock, apply a provider response
    /// and persist it when `apply` reports a change.
    ///
    /// Returns `Ok(false)` without touching the session when the lock is not
    /// obtained in time; the response is dropped and reprocessing recovers it.
    pub(crate) async fn merge_into_session<F>(
        &self,
        container_id: &ContainerId,
        operation_id: &str,
        apply: F,
    ) -> Result<bool, SigningError>
    where
        F: FnOnce(&mut Session) -> bool + Send,
    {
        let name = container_id.to_string();
        if !self.lock.try_acquire_for(&name, self.container_lock_timeout).await? {
            error!(
                container_id = %container_id,
                operation_id = %operation_id,
                "Unable to acquire container lock, dropping provider response"
            );
            metrics::counter!("siga_poll_responses_dropped_total").increment(1);
            return Ok(false);
        }

        let result: Result<bool, SigningError> = async {
            let Some(mut session) = self.store.get(container_id).await? else {
                warn!(
                    container_id = %container_id,
                    "Session expired before provider response was stored"
                );
                return Ok(false);
            };
            if !apply(&mut session) {
                return Ok(false);
            }
            self.store.update(&session).await?;
            Ok(true)
        }
        .await;

        self.release_container_lock(&name).await;
        result
    }

    async fn release_container_lock(&self, name: &str) {
        match self.lock.release(name).await {
            Ok(()) => debug!(container_id = %name, "Container lock released"),
            Err(e) => warn!(container_id = %name, error = %e, "Failed to release container lock"),
        }
    }
}

fn log_end_event(audit: &dyn AuditLog, start: EventId, signature: &FinishedSignature) {
    if let Some(issuer) = &signature.timestamp_issuer {
        if let Some(event) = audit.last_matching(&|e| e.name == EventName::TsaRequest) {
            audit.add_parameter(event, param::ISSUING_CA, issuer);
        }
    }
    if let Some(issuer) = &signature.ocsp_responder_issuer {
        if let Some(event) = audit.last_matching(&|e| e.name == EventName::OcspRequest) {
            audit.add_parameter(event, param::ISSUING_CA, issuer);
        }
    }
    let end = audit.log_end_event(start);
    audit.add_parameter(end, param::SIGNATURE_ID, &signature.id);
}

pub(crate) fn no_data_to_sign(signature_id: SignatureId) -> SigningError {
    SigningError::InvalidSession(format!(
        "Unable to finalize signature. No data to sign with signature Id: {}",
        signature_id
    ))
}

/// Opens one audit event per provider request the engine makes.
struct RequestAuditObserver<'a> {
    audit: &'a dyn AuditLog,
    endpoints: &'a ServiceEndpoints,
}

impl ProviderRequestObserver for RequestAuditObserver<'_> {
    fn on_request(&self, url: &str) {
        let kind = self.endpoints.classify(url);
        let event = self.audit.log_start_event(kind.event_name());
        self.audit.add_parameter(event, param::REQUEST_URL, url);
        debug!(request_url = %url, kind = %kind, "Provider request");
    }
}

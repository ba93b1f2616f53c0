// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Status Reprocessing
//!
//! Periodic sweep that re-runs status polls lost to a crash, a dropped
//! provider response, or a failed attempt. A signature or certificate session
//! qualifies when it has been `OUTSTANDING` longer than the processing timeout,
//! or in `EXCEPTION` longer than the exception timeout, and its processing
//! counter has not passed the attempt budget.
//!
//! Re-polls are scheduled with zero delay and run under the same operation
//! lock as first-time polls, so a sweep overlapping a live poll is a no-op.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::certificate_choice::CertificateChoiceService;
use super::device_signing::{MobileIdSigningService, SmartIdSigningService};
use super::signing_orchestrator::SigningOrchestrator;
use crate::domain::errors::SigningError;
use crate::domain::gateway_config::ReprocessingConfig;
use crate::domain::repository::SessionStore;
use crate::domain::session::{Session, SessionStatus, SigningType};

/// Signing services bound to one container flavor.
#[derive(Clone)]
pub struct ContainerSigningServices {
    pub orchestrator: Arc<SigningOrchestrator>,
    pub mobile_id: Option<MobileIdSigningService>,
    pub smart_id: Option<SmartIdSigningService>,
    pub certificate_choice: Option<CertificateChoiceService>,
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReprocessingReport {
    pub sessions_scanned: usize,
    pub signatures_rescheduled: usize,
    pub certificates_rescheduled: usize,
}

pub struct StatusReprocessingService {
    store: Arc<dyn SessionStore>,
    services: Vec<ContainerSigningServices>,
    config: ReprocessingConfig,
}

impl StatusReprocessingService {
    pub fn new(store: Arc<dyn SessionStore>, config: ReprocessingConfig) -> Self {
        Self {
            store,
            services: Vec::new(),
            config,
        }
    }

    pub fn register(mut self, services: ContainerSigningServices) -> Self {
        self.services.push(services);
        self
    }

    /// Run the sweep on a fixed-rate schedule until `shutdown` is cancelled.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.config.initial_delay) => {}
            }

            let mut interval = tokio::time::interval(self.config.fixed_rate);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Status reprocessing stopped");
                        return;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = self.process_failed_status_requests().await {
                            warn!(error = %e, "Status reprocessing sweep failed");
                        }
                    }
                }
            }
        })
    }

    /// One sweep over every stored session.
    pub async fn process_failed_status_requests(&self) -> Result<ReprocessingReport, SigningError> {
        self.process_failed_status_requests_at(Utc::now()).await
    }

    /// One sweep, judging staleness relative to `now`.
    pub async fn process_failed_status_requests_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ReprocessingReport, SigningError> {
        let mut report = ReprocessingReport::default();

        for container_id in self.store.list_ids().await? {
            let Some(session) = self.store.get(&container_id).await? else {
                continue;
            };
            report.sessions_scanned += 1;
            if !session.has_pending_operations() {
                continue;
            }
            let Some(services) = self.services_for(&session) else {
                debug!(
                    container_id = %container_id,
                    "No signing services registered for container flavor"
                );
                continue;
            };

            for (signature_id, signature_session) in session.signature_sessions() {
                if !self.is_reprocessable(&signature_session.session_status, now) {
                    continue;
                }
                let signature_id = *signature_id;
                let scheduled = match signature_session.signing_type {
                    SigningType::MobileId => services.mobile_id.as_ref().map(|service| {
                        service.schedule_signature_poll(container_id, signature_id, Duration::ZERO);
                    }),
                    SigningType::SmartId => services.smart_id.as_ref().map(|service| {
                        service.schedule_signature_poll(container_id, signature_id, Duration::ZERO);
                    }),
                    SigningType::Remote => None,
                };
                if scheduled.is_some() {
                    debug!(
                        container_id = %container_id,
                        signature_id = %signature_id,
                        "Signature status rescheduled"
                    );
                    report.signatures_rescheduled += 1;
                }
            }

            if let Some(certificate_choice) = &services.certificate_choice {
                for (certificate_id, certificate_session) in session.certificate_sessions() {
                    if self.is_reprocessable(&certificate_session.session_status, now) {
                        certificate_choice.schedule_certificate_poll(
                            container_id,
                            *certificate_id,
                            Duration::ZERO,
                        );
                        report.certificates_rescheduled += 1;
                    }
                }
            }
        }

        if report.signatures_rescheduled + report.certificates_rescheduled > 0 {
            info!(
                signatures = report.signatures_rescheduled,
                certificates = report.certificates_rescheduled,
                "Rescheduled stalled status polls"
            );
            let rescheduled = report.signatures_rescheduled + report.certificates_rescheduled;
            metrics::counter!("siga_polls_rescheduled_total").increment(rescheduled as u64);
        }
        Ok(report)
    }

    fn services_for(&self, session: &Session) -> Option<&ContainerSigningServices> {
        self.services
            .iter()
            .find(|s| s.orchestrator.container().supports(session))
    }

    fn is_reprocessable(&self, status: &SessionStatus, now: DateTime<Utc>) -> bool {
        status.is_reprocessable(
            now,
            self.config.processing_timeout,
            self.config.exception_timeout,
            self.config.max_processing_attempts,
        )
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Signing Gateway
//!
//! Composition root. Wires the signing services for both container flavors
//! from a [`GatewayConfigManifest`] and owns the background machinery: the
//! bounded polling executor and the status reprocessing sweep.
//!
//! ```text
//! SigningGateway::build(manifest, collaborators)
//!   ├─ DelayedTaskExecutor(max_concurrent_polls)
//!   ├─ ASiC     ─ SigningOrchestrator ─ Mobile-ID / Smart-ID / certificate choice
//!   ├─ hashcode ─ SigningOrchestrator ─ Mobile-ID / Smart-ID / certificate choice
//!   └─ StatusReprocessingService(both flavors)
//! start()    → reprocessing sweep on its fixed-rate schedule
//! shutdown() → stop the sweep, drain polls within shutdown_timeout
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::certificate_choice::CertificateChoiceService;
use super::device_signing::{MobileIdSigningService, SmartIdSigningService};
use super::reprocessing::{ContainerSigningServices, StatusReprocessingService};
use super::signing_orchestrator::SigningOrchestrator;
use crate::domain::container::ContainerSigningCapability;
use crate::domain::events::AuditSink;
use crate::domain::gateway_config::{GatewayConfigManifest, GatewayConfigSpec};
use crate::domain::lock::DistributedLock;
use crate::domain::provider::{MobileIdStatus, SigningBackend, SmartIdStatus};
use crate::domain::repository::SessionStore;
use crate::domain::signing::SigningEngine;
use crate::infrastructure::container::{AsicContainerFlavor, HashcodeContainerFlavor};
use crate::infrastructure::task_executor::DelayedTaskExecutor;

/// External collaborators the gateway is built around.
#[derive(Clone)]
pub struct GatewayCollaborators {
    pub store: Arc<dyn SessionStore>,
    pub lock: Arc<dyn DistributedLock>,
    pub engine: Arc<dyn SigningEngine>,
    pub audit_sink: Arc<dyn AuditSink>,
    /// `None` disables Mobile-ID signing.
    pub mobile_id: Option<Arc<dyn SigningBackend<Status = MobileIdStatus>>>,
    /// `None` disables Smart-ID signing and certificate choice.
    pub smart_id: Option<Arc<dyn SigningBackend<Status = SmartIdStatus>>>,
}

pub struct SigningGateway {
    asic: ContainerSigningServices,
    hashcode: ContainerSigningServices,
    executor: Arc<DelayedTaskExecutor>,
    reprocessing: Arc<StatusReprocessingService>,
    shutdown: CancellationToken,
    shutdown_timeout: Duration,
}

impl SigningGateway {
    pub fn build(manifest: &GatewayConfigManifest, collaborators: GatewayCollaborators) -> Self {
        let spec = &manifest.spec;
        let executor = Arc::new(DelayedTaskExecutor::new(spec.executor.max_concurrent_polls));

        let asic_flavor = Arc::new(AsicContainerFlavor::new(
            collaborators.store.clone(),
            collaborators.engine.clone(),
        ));
        let hashcode_flavor = Arc::new(HashcodeContainerFlavor::new(
            collaborators.store.clone(),
            collaborators.engine.clone(),
        ));
        let asic = services_for(asic_flavor, &collaborators, &executor, spec);
        let hashcode = services_for(hashcode_flavor, &collaborators, &executor, spec);

        let reprocessing = StatusReprocessingService::new(
            collaborators.store.clone(),
            spec.status_reprocessing.clone(),
        )
        .register(asic.clone())
        .register(hashcode.clone());

        info!(
            gateway = %manifest.metadata.name,
            max_concurrent_polls = spec.executor.max_concurrent_polls,
            mobile_id = asic.mobile_id.is_some(),
            smart_id = asic.smart_id.is_some(),
            "Signing gateway assembled"
        );

        Self {
            asic,
            hashcode,
            executor,
            reprocessing: Arc::new(reprocessing),
            shutdown: CancellationToken::new(),
            shutdown_timeout: spec.executor.shutdown_timeout,
        }
    }

    pub fn asic(&self) -> &ContainerSigningServices {
        &self.asic
    }

    pub fn hashcode(&self) -> &ContainerSigningServices {
        &self.hashcode
    }

    pub fn executor(&self) -> &Arc<DelayedTaskExecutor> {
        &self.executor
    }

    pub fn reprocessing(&self) -> &Arc<StatusReprocessingService> {
        &self.reprocessing
    }

    /// Start the reprocessing sweep. Stops when [`Self::shutdown`] runs.
    pub fn start(&self) -> JoinHandle<()> {
        self.reprocessing.clone().start(self.shutdown.child_token())
    }

    /// Stop the sweep and wait up to the configured shutdown timeout for
    /// in-flight polls. Returns `false` when polls were still running.
    pub async fn shutdown(&self) -> bool {
        self.shutdown.cancel();
        let drained = self.executor.shutdown(self.shutdown_timeout).await;
        info!(drained, "Signing gateway stopped");
        drained
    }
}

fn services_for(
    container: Arc<dyn ContainerSigningCapability>,
    collaborators: &GatewayCollaborators,
    executor: &Arc<DelayedTaskExecutor>,
    spec: &GatewayConfigSpec,
) -> ContainerSigningServices {
    let orchestrator = Arc::new(SigningOrchestrator::new(
        container,
        collaborators.store.clone(),
        collaborators.lock.clone(),
        collaborators.engine.clone(),
        collaborators.audit_sink.clone(),
        spec,
    ));

    let mobile_id = collaborators.mobile_id.clone().map(|backend| {
        MobileIdSigningService::mobile_id(orchestrator.clone(), backend, executor.clone(), spec)
    });
    let smart_id = collaborators.smart_id.clone().map(|backend| {
        SmartIdSigningService::smart_id(orchestrator.clone(), backend, executor.clone(), spec)
    });
    let certificate_choice = collaborators.smart_id.clone().map(|backend| {
        CertificateChoiceService::new(orchestrator.clone(), backend, executor.clone(), spec)
    });

    ContainerSigningServices {
        orchestrator,
        mobile_id,
        smart_id,
        certificate_choice,
    }
}

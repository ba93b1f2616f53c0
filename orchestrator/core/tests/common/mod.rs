// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use siga_core::application::{
    CertificateChoiceService, MobileIdSigningService, SigningOrchestrator, SmartIdSigningService,
};
use siga_core::domain::events::{AuditSink, SigningEvent};
use siga_core::domain::gateway_config::{GatewayConfigSpec, ServiceEndpoints};
use siga_core::domain::provider::{
    BackendError, InitiatedSigning, MobileIdStatus, ProviderCertificate, ProviderStatus, SignerRequest,
    SigningBackend, SmartIdStatus, StatusResponse,
};
use siga_core::domain::repository::SessionStore;
use siga_core::domain::session::{
    ContainerId, ContainerPayload, DataFile, RelyingPartyInfo, Session, SigningType,
};
use siga_core::domain::signing::{
    DataFileDigest, DataToSign, EngineError, FinishedSignature, ProviderRequestObserver,
    SignatureParameters, SignatureProfile, SignatureValidation, SigningCertificate, SigningEngine,
};
use siga_core::infrastructure::container::AsicContainerFlavor;
use siga_core::infrastructure::{DelayedTaskExecutor, InMemoryDistributedLock, InMemorySessionStore};

pub const TSA_URL: &str = "http://tsa.test/tsa";
pub const OCSP_URL: &str = "http://ocsp.test/ocsp";

/// Collects flushed audit batches, one per operation.
#[derive(Default)]
pub struct RecordingAuditSink {
    batches: Mutex<Vec<Vec<SigningEvent>>>,
}

impl RecordingAuditSink {
    pub fn batches(&self) -> Vec<Vec<SigningEvent>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<SigningEvent> {
        self.batches().into_iter().flatten().collect()
    }
}

impl AuditSink for RecordingAuditSink {
    fn write(&self, events: Vec<SigningEvent>) {
        self.batches.lock().unwrap().push(events);
    }
}

/// Signature engine double. Reports a TSA and an OCSP request on every
/// finalize, then succeeds unless a failure is configured. When a gate is
/// set, finalize waits for a permit between the two requests.
pub struct MockEngine {
    pub finalize_calls: AtomicUsize,
    pub fail_with: Mutex<Option<EngineError>>,
    pub valid: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            finalize_calls: AtomicUsize::new(0),
            fail_with: Mutex::new(None),
            valid: AtomicBool::new(true),
            gate: Mutex::new(None),
        }
    }

    pub fn gate_finalize(&self, gate: Arc<Semaphore>) {
        *self.gate.lock().unwrap() = Some(gate);
    }

    pub fn fail_with(&self, err: EngineError) {
        *self.fail_with.lock().unwrap() = Some(err);
    }

    pub fn finalize_calls(&self) -> usize {
        self.finalize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SigningEngine for MockEngine {
    async fn build_data_to_sign(
        &self,
        data_files: &[DataFileDigest],
        parameters: &SignatureParameters,
    ) -> Result<DataToSign, EngineError> {
        let data = data_files.iter().flat_map(|f| f.digest.clone()).collect();
        Ok(DataToSign {
            signature_id: format!("S-{}", uuid::Uuid::new_v4()),
            digest_algorithm: data_files
                .first()
                .map(|f| f.digest_algorithm)
                .ok_or_else(|| EngineError::Technical("no data files".into()))?,
            data,
            parameters: parameters.clone(),
        })
    }

    async fn finalize(
        &self,
        data_to_sign: &DataToSign,
        signature_value: &[u8],
        observer: &dyn ProviderRequestObserver,
    ) -> Result<FinishedSignature, EngineError> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        observer.on_request(TSA_URL);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| EngineError::Technical(e.to_string()))?;
        }
        observer.on_request(OCSP_URL);

        if let Some(err) = self.fail_with.lock().unwrap().clone() {
            return Err(err);
        }

        let mut ades_signature = signature_value.to_vec();
        ades_signature.extend_from_slice(b"-ades");
        Ok(FinishedSignature {
            id: data_to_sign.signature_id.clone(),
            profile: SignatureProfile::Lt,
            ades_signature,
            ocsp_responder_issuer: Some("TEST OCSP CA".to_string()),
            timestamp_issuer: Some("TEST TSA CA".to_string()),
        })
    }

    async fn validate(&self, _signature: &FinishedSignature) -> Result<SignatureValidation, EngineError> {
        if self.valid.load(Ordering::SeqCst) {
            Ok(SignatureValidation::valid())
        } else {
            Ok(SignatureValidation::invalid(vec!["signature value mismatch".to_string()]))
        }
    }
}

/// Provider double with scripted status responses.
///
/// Status calls pop from the scripted queue and fall back to `running` once
/// it is empty. When a gate is set, `get_signature_status` waits for a permit.
pub struct MockBackend<S: ProviderStatus> {
    signing_type: SigningType,
    running: S,
    signature_statuses: Mutex<VecDeque<Result<StatusResponse<S>, BackendError>>>,
    certificate_statuses: Mutex<VecDeque<Result<StatusResponse<S>, BackendError>>>,
    gate: Option<Arc<Semaphore>>,
    initiate_gate: Mutex<Option<Arc<Semaphore>>>,
    certificate_levels: Mutex<Vec<Option<String>>>,
    pub certificate_calls: AtomicUsize,
    pub initiate_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub certificate_status_calls: AtomicUsize,
}

impl<S: ProviderStatus> MockBackend<S> {
    pub fn new(signing_type: SigningType, running: S) -> Self {
        Self {
            signing_type,
            running,
            signature_statuses: Mutex::new(VecDeque::new()),
            certificate_statuses: Mutex::new(VecDeque::new()),
            gate: None,
            initiate_gate: Mutex::new(None),
            certificate_levels: Mutex::new(Vec::new()),
            certificate_calls: AtomicUsize::new(0),
            initiate_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            certificate_status_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Make `initiate_signing` wait for a permit on `gate`.
    pub fn gate_initiation(&self, gate: Arc<Semaphore>) {
        *self.initiate_gate.lock().unwrap() = Some(gate);
    }

    /// Certificate levels seen by `initiate_signing` and
    /// `initiate_certificate_choice`, in call order.
    pub fn certificate_levels(&self) -> Vec<Option<String>> {
        self.certificate_levels.lock().unwrap().clone()
    }

    pub fn initiate_calls(&self) -> usize {
        self.initiate_calls.load(Ordering::SeqCst)
    }

    pub fn push_status(&self, response: Result<StatusResponse<S>, BackendError>) {
        self.signature_statuses.lock().unwrap().push_back(response);
    }

    pub fn push_certificate_status(&self, response: Result<StatusResponse<S>, BackendError>) {
        self.certificate_statuses.lock().unwrap().push_back(response);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn certificate_calls(&self) -> usize {
        self.certificate_calls.load(Ordering::SeqCst)
    }
}

pub fn mobile_id_backend() -> MockBackend<MobileIdStatus> {
    MockBackend::new(SigningType::MobileId, MobileIdStatus::OutstandingTransaction)
}

pub fn smart_id_backend() -> MockBackend<SmartIdStatus> {
    MockBackend::new(SigningType::SmartId, SmartIdStatus::Running)
}

pub fn signed<S>(status: S, signature: &[u8]) -> Result<StatusResponse<S>, BackendError> {
    Ok(StatusResponse {
        status,
        signature: Some(signature.to_vec()),
        certificate: None,
    })
}

pub fn certificate_chosen(document_number: &str) -> Result<StatusResponse<SmartIdStatus>, BackendError> {
    Ok(StatusResponse {
        status: SmartIdStatus::Ok,
        signature: None,
        certificate: Some(ProviderCertificate {
            document_number: Some(document_number.to_string()),
            certificate: SigningCertificate::new(b"chosen-certificate".to_vec()),
        }),
    })
}

#[async_trait]
impl<S: ProviderStatus> SigningBackend for MockBackend<S> {
    type Status = S;

    fn signing_type(&self) -> SigningType {
        self.signing_type
    }

    async fn get_certificate(
        &self,
        _relying_party: &RelyingPartyInfo,
        signer: &SignerRequest,
    ) -> Result<ProviderCertificate, BackendError> {
        self.certificate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderCertificate {
            document_number: signer.document_number.clone(),
            certificate: SigningCertificate::new(b"fetched-certificate".to_vec()),
        })
    }

    async fn initiate_signing(
        &self,
        _relying_party: &RelyingPartyInfo,
        _data_to_sign: &DataToSign,
        signer: &SignerRequest,
    ) -> Result<InitiatedSigning, BackendError> {
        self.certificate_levels.lock().unwrap().push(signer.certificate_level.clone());
        let n = self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.initiate_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.map_err(|e| BackendError::Transport(e.to_string()))?;
        }
        Ok(InitiatedSigning {
            session_code: format!("session-code-{}", n),
            challenge_id: "0696".to_string(),
        })
    }

    async fn get_signature_status(
        &self,
        _relying_party: &RelyingPartyInfo,
        _session_code: &str,
    ) -> Result<StatusResponse<S>, BackendError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.map_err(|e| BackendError::Transport(e.to_string()))?;
        }
        let next = self.signature_statuses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(StatusResponse::status(self.running.clone())))
    }

    async fn initiate_certificate_choice(
        &self,
        _relying_party: &RelyingPartyInfo,
        signer: &SignerRequest,
    ) -> Result<String, BackendError> {
        self.certificate_levels.lock().unwrap().push(signer.certificate_level.clone());
        Ok("certificate-session-code".to_string())
    }

    async fn get_certificate_status(
        &self,
        _relying_party: &RelyingPartyInfo,
        _session_code: &str,
    ) -> Result<StatusResponse<S>, BackendError> {
        self.certificate_status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.certificate_statuses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(StatusResponse::status(self.running.clone())))
    }
}

/// Scheduled polls never fire during a test; tests drive polls directly.
pub fn test_config() -> GatewayConfigSpec {
    let mut config = GatewayConfigSpec::default();
    config.mobile_id.status_polling_delay = Duration::from_secs(3600);
    config.smart_id.status_polling_delay = Duration::from_secs(3600);
    config.status_reprocessing.max_processing_attempts = 3;
    config.locking.container_lock_timeout = Duration::from_millis(100);
    config.endpoints = ServiceEndpoints {
        tsa_url: Some(TSA_URL.to_string()),
        ocsp_urls: vec![OCSP_URL.to_string()],
    };
    config
}

pub fn relying_party() -> RelyingPartyInfo {
    RelyingPartyInfo {
        name: "DEMO".to_string(),
        uuid: "00000000-0000-0000-0000-000000000000".to_string(),
    }
}

pub struct Harness {
    pub store: Arc<InMemorySessionStore>,
    pub lock: Arc<InMemoryDistributedLock>,
    pub audit: Arc<RecordingAuditSink>,
    pub engine: Arc<MockEngine>,
    pub executor: Arc<DelayedTaskExecutor>,
    pub orchestrator: Arc<SigningOrchestrator>,
    pub config: GatewayConfigSpec,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: GatewayConfigSpec) -> Self {
        let store = Arc::new(InMemorySessionStore::new());
        let lock = Arc::new(InMemoryDistributedLock::new());
        let audit = Arc::new(RecordingAuditSink::default());
        let engine = Arc::new(MockEngine::new());
        let executor = Arc::new(DelayedTaskExecutor::new(8));
        let container = Arc::new(AsicContainerFlavor::new(store.clone(), engine.clone()));
        let orchestrator = Arc::new(SigningOrchestrator::new(
            container,
            store.clone(),
            lock.clone(),
            engine.clone(),
            audit.clone(),
            &config,
        ));

        Self {
            store,
            lock,
            audit,
            engine,
            executor,
            orchestrator,
            config,
        }
    }

    pub async fn asic_session(&self, files: &[(&str, &str)]) -> ContainerId {
        let data_files = files
            .iter()
            .map(|(name, content)| DataFile::new(*name, content.as_bytes().to_vec()))
            .collect();
        let session = Session::new(
            "client",
            "service",
            "service-uuid",
            ContainerPayload::Asic {
                data_files,
                signatures: vec![],
            },
        );
        let id = session.session_id;
        self.store.update(&session).await.unwrap();
        id
    }

    pub async fn session(&self, id: &ContainerId) -> Session {
        self.store.get(id).await.unwrap().unwrap()
    }

    /// Replace the content of `file_name` in the stored container.
    pub async fn change_data_file(&self, id: &ContainerId, file_name: &str, content: &str) {
        let mut session = self.session(id).await;
        if let ContainerPayload::Asic { data_files, .. } = &mut session.container {
            for file in data_files.iter_mut().filter(|f| f.file_name == file_name) {
                file.content = content.as_bytes().to_vec();
            }
        }
        self.store.update(&session).await.unwrap();
    }

    pub fn mobile_id(&self, backend: Arc<MockBackend<MobileIdStatus>>) -> MobileIdSigningService {
        MobileIdSigningService::mobile_id(self.orchestrator.clone(), backend, self.executor.clone(), &self.config)
    }

    pub fn smart_id(&self, backend: Arc<MockBackend<SmartIdStatus>>) -> SmartIdSigningService {
        SmartIdSigningService::smart_id(self.orchestrator.clone(), backend, self.executor.clone(), &self.config)
    }

    pub fn certificate_choice(&self, backend: Arc<MockBackend<SmartIdStatus>>) -> CertificateChoiceService {
        CertificateChoiceService::new(self.orchestrator.clone(), backend, self.executor.clone(), &self.config)
    }
}

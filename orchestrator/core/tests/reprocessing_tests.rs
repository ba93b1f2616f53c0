// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Reprocessing sweep over stalled status polls.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{mobile_id_backend, relying_party, signed, smart_id_backend, Harness};
use siga_core::application::{ContainerSigningServices, StatusReprocessingService};
use siga_core::domain::provider::{MobileIdStatus, SignerRequest};
use siga_core::domain::session::{ContainerId, ProcessingStatus};
use siga_core::domain::signing::SignatureParameters;
use tokio_util::sync::CancellationToken;

fn reprocessing(harness: &Harness, services: ContainerSigningServices) -> StatusReprocessingService {
    StatusReprocessingService::new(harness.store.clone(), harness.config.status_reprocessing.clone())
        .register(services)
}

async fn wait_for(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn test_stalled_signature_poll_is_rescheduled() {
    let harness = Harness::new();
    let id = harness.asic_session(&[("a.txt", "1")]).await;
    let backend = Arc::new(mobile_id_backend());
    backend.push_status(signed(MobileIdStatus::Signature, b"sig"));
    let mobile_id = harness.mobile_id(backend.clone());
    let signature_id = mobile_id
        .start_signing(&id, relying_party(), SignerRequest::default(), SignatureParameters::default())
        .await
        .unwrap()
        .generated_signature_id;
    let sweep = reprocessing(
        &harness,
        ContainerSigningServices {
            orchestrator: harness.orchestrator.clone(),
            mobile_id: Some(mobile_id.clone()),
            smart_id: None,
            certificate_choice: None,
        },
    );

    let fresh = sweep.process_failed_status_requests_at(Utc::now()).await.unwrap();
    assert_eq!(fresh.sessions_scanned, 1);
    assert_eq!(fresh.signatures_rescheduled, 0);

    let stale = sweep
        .process_failed_status_requests_at(Utc::now() + chrono::Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(stale.signatures_rescheduled, 1);

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let resolved = harness
                .session(&id)
                .await
                .signature_session(&signature_id)
                .map(|s| s.session_status.processing_status())
                == Some(ProcessingStatus::Result);
            if resolved {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("rescheduled poll did not complete");
    assert_eq!(backend.status_calls(), 1);
    assert_eq!(mobile_id.get_signature_status(&id, signature_id).await.unwrap(), "SIGNATURE");
}

#[tokio::test]
async fn test_resolved_and_exhausted_sessions_are_left_alone() {
    let mut config = common::test_config();
    config.status_reprocessing.max_processing_attempts = 0;
    let harness = Harness::with_config(config);
    let backend = Arc::new(mobile_id_backend());
    let mobile_id = harness.mobile_id(backend.clone());

    let exhausted = harness.asic_session(&[("a.txt", "1")]).await;
    let exhausted_signature = mobile_id
        .start_signing(&exhausted, relying_party(), SignerRequest::default(), SignatureParameters::default())
        .await
        .unwrap()
        .generated_signature_id;
    // One recorded attempt puts the counter past a budget of zero.
    mobile_id.poll_signature_status(exhausted, exhausted_signature).await;

    let remote: ContainerId = harness.asic_session(&[("b.txt", "2")]).await;
    harness
        .orchestrator
        .prepare_remote_signature(&remote, SignatureParameters::default())
        .await
        .unwrap();

    let sweep = reprocessing(
        &harness,
        ContainerSigningServices {
            orchestrator: harness.orchestrator.clone(),
            mobile_id: Some(mobile_id),
            smart_id: None,
            certificate_choice: None,
        },
    );
    let report = sweep
        .process_failed_status_requests_at(Utc::now() + chrono::Duration::minutes(1))
        .await
        .unwrap();

    assert_eq!(report.sessions_scanned, 2);
    assert_eq!(report.signatures_rescheduled, 0);
    assert_eq!(backend.status_calls(), 1);
}

#[tokio::test]
async fn test_stalled_certificate_choice_is_rescheduled() {
    let harness = Harness::new();
    let id = harness.asic_session(&[("a.txt", "1")]).await;
    let backend = Arc::new(smart_id_backend());
    let choice = harness.certificate_choice(backend.clone());
    choice
        .init_certificate_choice(&id, relying_party(), SignerRequest::default())
        .await
        .unwrap();
    let sweep = reprocessing(
        &harness,
        ContainerSigningServices {
            orchestrator: harness.orchestrator.clone(),
            mobile_id: None,
            smart_id: Some(harness.smart_id(backend.clone())),
            certificate_choice: Some(choice),
        },
    );

    let report = sweep
        .process_failed_status_requests_at(Utc::now() + chrono::Duration::minutes(1))
        .await
        .unwrap();

    assert_eq!(report.certificates_rescheduled, 1);
    assert_eq!(report.signatures_rescheduled, 0);
    wait_for(|| backend.certificate_status_calls.load(std::sync::atomic::Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn test_sweep_stops_on_cancellation() {
    let harness = Harness::new();
    let sweep = Arc::new(reprocessing(
        &harness,
        ContainerSigningServices {
            orchestrator: harness.orchestrator.clone(),
            mobile_id: None,
            smart_id: None,
            certificate_choice: None,
        },
    ));
    let shutdown = CancellationToken::new();

    let handle = sweep.start(shutdown.clone());
    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("sweep did not stop")
        .unwrap();
}

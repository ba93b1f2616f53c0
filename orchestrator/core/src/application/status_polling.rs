// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Status Polling Discipline
//!
//! Every background poll (signature status, certificate-choice status) runs
//! under the same lock discipline:
//!
//! ```text
//! try_acquire(operation lock)      ── zero wait; held elsewhere ⇒ exit quietly
//!   reload session                 ── gone ⇒ exit
//!   call provider                  ── no container lock held
//!   try_acquire_for(container lock, timeout)
//!     reload session, merge, persist
//!   release(container lock)
//!   on error: record EXCEPTION     ── again under the container lock
//! release(operation lock)          ── on every path
//! ```
//!
//! Holding the operation lock across the provider call collapses concurrent
//! polls for one provider session into a single call. Releasing the container
//! lock during the provider call keeps other operations on the container
//! responsive.

use std::future::Future;

use tracing::{debug, error, warn};

use crate::domain::errors::{ErrorCode, SigningError};
use crate::domain::lock::DistributedLock;
use crate::domain::provider::ProviderStatus;
use crate::domain::session::{ProcessingStatus, SessionStatus};

/// Outcome of a single polling attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Another task holds the operation lock.
    Skipped,
    Completed,
    Failed,
}

/// Run `poll` while holding the operation lock named `operation_id`.
///
/// When `poll` fails, `on_error` runs before the operation lock is released.
pub(crate) async fn poll_exclusively<P, E, Fut>(
    lock: &dyn DistributedLock,
    operation_id: &str,
    poll: P,
    on_error: E,
) -> PollOutcome
where
    P: Future<Output = Result<(), SigningError>>,
    E: FnOnce(SigningError) -> Fut,
    Fut: Future<Output = ()>,
{
    match lock.try_acquire(operation_id).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(operation_id = %operation_id, "Status polling already in progress");
            metrics::counter!("siga_polls_skipped_total").increment(1);
            return PollOutcome::Skipped;
        }
        Err(e) => {
            warn!(operation_id = %operation_id, error = %e, "Unable to acquire operation lock");
            return PollOutcome::Skipped;
        }
    }
    debug!(operation_id = %operation_id, "Status polling locked");
    metrics::counter!("siga_polls_started_total").increment(1);

    let outcome = match poll.await {
        Ok(()) => PollOutcome::Completed,
        Err(e) => {
            error!(operation_id = %operation_id, error = %e, "Status polling failed");
            metrics::counter!("siga_poll_exceptions_total").increment(1);
            on_error(e).await;
            PollOutcome::Failed
        }
    };

    if let Err(e) = lock.release(operation_id).await {
        warn!(operation_id = %operation_id, error = %e, "Failed to release operation lock");
    }
    debug!(operation_id = %operation_id, "Status polling unlocked");
    outcome
}

/// Error code recorded for a failed poll against provider `S`.
pub(crate) fn polling_error_code<S: ProviderStatus>(err: &SigningError) -> ErrorCode {
    match err {
        SigningError::Backend(_) => S::provider_error_code(),
        other => other.error_code(),
    }
}

pub(crate) fn record_exception(status: &mut SessionStatus, code: ErrorCode, message: &str) {
    status.set_processing_status(ProcessingStatus::Exception);
    status.set_status_error(code.as_str(), message);
}

/// Error surfaced by a status check once the attempt budget is spent.
pub(crate) fn attempts_exhausted_error(status: &SessionStatus) -> SigningError {
    let code =
        ErrorCode::parse_lenient(status.status_error.as_ref().map(|e| e.error_code.as_str()));
    let message = status
        .status_error
        .as_ref()
        .map(|e| e.error_message.clone())
        .unwrap_or_else(|| "Status polling attempts exhausted".to_string());
    SigningError::Api { code, message }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod signing_orchestrator;
pub mod status_polling;
pub mod device_signing;
pub mod certificate_choice;
pub mod reprocessing;
pub mod gateway;

// Re-export services for convenience
pub use signing_orchestrator::SigningOrchestrator;
pub use status_polling::PollOutcome;
pub use device_signing::{DeviceSigningService, MobileIdSigningService, SmartIdSigningService};
pub use certificate_choice::{CertificateChoiceService, CertificateStatus};
pub use reprocessing::{ContainerSigningServices, ReprocessingReport, StatusReprocessingService};
pub use gateway::{GatewayCollaborators, SigningGateway};

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Container flavors implementing [`crate::domain::container::ContainerSigningCapability`].

pub mod asic;
pub mod hashcode;

pub use asic::AsicContainerFlavor;
pub use hashcode::HashcodeContainerFlavor;

use crate::domain::errors::SigningError;
use crate::domain::repository::SessionStore;
use crate::domain::session::{ContainerId, Session};

pub(crate) const NO_DATA_FILES: &str = "Unable to create signature. Data files must be added to container";
pub(crate) const EMPTY_DATA_FILES: &str = "Unable to sign container with empty datafiles";

pub(crate) async fn load_session(
    store: &dyn SessionStore,
    container_id: &ContainerId,
) -> Result<Session, SigningError> {
    store
        .get(container_id)
        .await?
        .ok_or_else(|| SigningError::InvalidSession(format!("Session {} not found", container_id)))
}

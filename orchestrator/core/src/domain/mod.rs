// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Signing-session aggregate, collaborator traits and value objects.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure domain model; no I/O beyond the config loader

pub mod session;
pub mod signing;
pub mod provider;
pub mod container;
pub mod repository;
pub mod lock;
pub mod events;
pub mod errors;
pub mod gateway_config;

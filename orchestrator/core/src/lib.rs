// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! SiGa Core
//!
//! Signing-session orchestration and distributed status polling for the SiGa
//! signing gateway: remote signing, Mobile-ID and Smart-ID signing, and the
//! Smart-ID certificate choice.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, application services and in-process infrastructure

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;

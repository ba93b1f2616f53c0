// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod session_store;
pub mod distributed_lock;
pub mod task_executor;
pub mod audit;
pub mod container;

pub use audit::{SigningEventLog, TracingAuditSink};
pub use distributed_lock::InMemoryDistributedLock;
pub use session_store::InMemorySessionStore;
pub use task_executor::DelayedTaskExecutor;

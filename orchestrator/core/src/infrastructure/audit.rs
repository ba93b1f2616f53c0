// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Signing Event Log
//!
//! [`SigningEventLog`] buffers the [`SigningEvent`]s of one operation (a
//! finalize, a status check, a status poll) and hands them to an
//! [`AuditSink`] on [`AuditLog::flush`]. Operations never share a buffer, so
//! lookups such as [`AuditLog::last_matching`] only see their own events.
//!
//! [`TracingAuditSink`] writes flushed events to the structured tracing log.
//! Exception events are emitted at `WARN`, everything else at `INFO`.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::domain::events::{AuditLog, AuditSink, EventId, EventName, EventResult, SigningEvent};

pub struct SigningEventLog {
    events: Mutex<Vec<SigningEvent>>,
    sink: Arc<dyn AuditSink>,
}

impl SigningEventLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            sink,
        }
    }

    fn with_event(&self, id: EventId, f: impl FnOnce(&mut SigningEvent)) {
        let mut events = self.events.lock();
        if let Some(event) = events.iter_mut().find(|e| e.id == id) {
            f(event);
        }
    }

    fn push(&self, event: SigningEvent) -> EventId {
        let id = event.id;
        self.events.lock().push(event);
        id
    }

    fn close(&self, start: EventId, result: EventResult) -> Option<SigningEvent> {
        let events = self.events.lock();
        events
            .iter()
            .find(|e| e.id == start)
            .map(|s| SigningEvent::finish(s, result))
    }
}

impl AuditLog for SigningEventLog {
    fn log_start_event(&self, name: EventName) -> EventId {
        self.push(SigningEvent::start(name))
    }

    fn add_parameter(&self, event: EventId, key: &str, value: &str) {
        self.with_event(event, |e| {
            e.parameters.insert(key.to_string(), value.to_string());
        });
    }

    fn log_end_event(&self, start: EventId) -> EventId {
        self.with_event(start, |e| {
            if e.result.is_none() {
                e.result = Some(EventResult::Success);
            }
        });
        match self.close(start, EventResult::Success) {
            Some(end) => self.push(end),
            None => start,
        }
    }

    fn log_exception_event(&self, start: EventId, error_code: &str, error_message: &str) -> EventId {
        self.with_event(start, |e| e.mark_exception(error_code, error_message));
        match self.close(start, EventResult::Exception) {
            Some(mut end) => {
                end.error_code = Some(error_code.to_string());
                end.error_message = Some(error_message.to_string());
                self.push(end)
            }
            None => start,
        }
    }

    fn log_exception_for_intermediate_events(&self, start: EventId, error_code: &str, error_message: &str) {
        let mut events = self.events.lock();
        let Some(position) = events.iter().position(|e| e.id == start) else {
            return;
        };
        for event in events.iter_mut().skip(position + 1) {
            if event.result.is_none() && event.correlation_id.is_none() {
                event.mark_exception(error_code, error_message);
            }
        }
    }

    fn last_matching(&self, predicate: &dyn Fn(&SigningEvent) -> bool) -> Option<EventId> {
        let events = self.events.lock();
        events.iter().rev().find(|e| predicate(e)).map(|e| e.id)
    }

    fn first_matching_after(&self, after: EventId, predicate: &dyn Fn(&SigningEvent) -> bool) -> Option<EventId> {
        let events = self.events.lock();
        let position = events.iter().position(|e| e.id == after)?;
        events
            .iter()
            .skip(position + 1)
            .find(|e| predicate(e))
            .map(|e| e.id)
    }

    fn mark_exception(&self, event: EventId, error_code: &str, error_message: &str) {
        self.with_event(event, |e| e.mark_exception(error_code, error_message));
    }

    fn events(&self) -> Vec<SigningEvent> {
        self.events.lock().clone()
    }

    fn flush(&self) {
        let drained: Vec<SigningEvent> = std::mem::take(&mut *self.events.lock());
        if !drained.is_empty() {
            self.sink.write(drained);
        }
    }
}

/// Writes audit events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn write(&self, events: Vec<SigningEvent>) {
        for event in events {
            match event.result {
                Some(EventResult::Exception) => warn!(
                    event_id = %event.id,
                    name = ?event.name,
                    event_type = ?event.event_type,
                    error_code = event.error_code.as_deref().unwrap_or(""),
                    error_message = event.error_message.as_deref().unwrap_or(""),
                    parameters = ?event.parameters,
                    "Signing event"
                ),
                _ => info!(
                    event_id = %event.id,
                    name = ?event.name,
                    event_type = ?event.event_type,
                    result = ?event.result,
                    parameters = ?event.parameters,
                    "Signing event"
                ),
            }
        }
    }
}

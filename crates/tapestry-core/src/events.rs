//! §4.11 Event Emitter: fire-and-forget structured progress events.
//!
//! The teacher's `progress.rs` prints `MINNA_PROGRESS:{json}`/
//! `MINNA_RESULT:{json}` lines for a single desktop IPC consumer. This
//! generalizes the same "structured event, not prose" shape to a
//! broadcast channel so any number of streaming search/sync callers can
//! subscribe, and drops events rather than blocking when a receiver falls
//! behind (`emit` must never block the operation it's reporting on).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// The stable event kinds named in §4.11/§4.9.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    OperationStarted,
    OperationProgress,
    OperationCompleted,
    OperationSkipped,
    OperationFailed,
    SyncPending,
    SyncStarted,
    SyncCompleted,
    SyncFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub request_id: Uuid,
    pub ts: DateTime<Utc>,
    pub kind: EventKind,
    pub payload: serde_json::Value,
}

/// Fans out events to however many subscribers are currently attached to a
/// request or sync job. Capacity bounds memory if no one is listening;
/// exceeding it drops the oldest buffered event for slow subscribers rather
/// than blocking the emitter.
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<Event>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Fire-and-forget: a full channel or zero subscribers both silently
    /// drop the event, matching the "legal to drop events" rule.
    pub fn emit(&self, request_id: Uuid, kind: EventKind, payload: serde_json::Value) {
        let event = Event {
            request_id,
            ts: Utc::now(),
            kind,
            payload,
        };
        let _ = self.sender.send(event);
    }

    pub fn operation_started(&self, request_id: Uuid, operation: &str) {
        self.emit(
            request_id,
            EventKind::OperationStarted,
            serde_json::json!({ "operation": operation }),
        );
    }

    pub fn operation_progress(&self, request_id: Uuid, operation: &str, detail: serde_json::Value) {
        self.emit(
            request_id,
            EventKind::OperationProgress,
            serde_json::json!({ "operation": operation, "detail": detail }),
        );
    }

    pub fn operation_completed(&self, request_id: Uuid, operation: &str, detail: serde_json::Value) {
        self.emit(
            request_id,
            EventKind::OperationCompleted,
            serde_json::json!({ "operation": operation, "detail": detail }),
        );
    }

    pub fn operation_skipped(&self, request_id: Uuid, operation: &str, reason: &str) {
        self.emit(
            request_id,
            EventKind::OperationSkipped,
            serde_json::json!({ "operation": operation, "reason": reason }),
        );
    }

    pub fn operation_failed(&self, request_id: Uuid, operation: &str, error: &str) {
        self.emit(
            request_id,
            EventKind::OperationFailed,
            serde_json::json!({ "operation": operation, "error": error }),
        );
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_events() {
        let emitter = EventEmitter::new(16);
        let mut receiver = emitter.subscribe();
        let request_id = Uuid::new_v4();

        emitter.operation_started(request_id, "embed_query");
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::OperationStarted);
        assert_eq!(event.request_id, request_id);
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let emitter = EventEmitter::new(4);
        emitter.operation_failed(Uuid::new_v4(), "search", "boom");
    }
}

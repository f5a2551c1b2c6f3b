//! Event types for request progress reporting.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Events emitted while one request is being handled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssistantEvent {
    /// Request handling started
    Started { request_id: Uuid, label: String },
    /// Capability download or preparation progress, 0-100
    Progress { request_id: Uuid, percent: f32 },
    /// A degraded path was taken
    Degraded { request_id: Uuid, reason: String },
    /// Final text is ready
    Completed { request_id: Uuid, duration_ms: u64 },
}

impl AssistantEvent {
    pub fn request_id(&self) -> Uuid {
        match self {
            AssistantEvent::Started { request_id, .. } => *request_id,
            AssistantEvent::Progress { request_id, .. } => *request_id,
            AssistantEvent::Degraded { request_id, .. } => *request_id,
            AssistantEvent::Completed { request_id, .. } => *request_id,
        }
    }
}

/// Relays progress for one request.
///
/// Zero or more events, values clamped to [0, 100], not necessarily
/// monotonic. Completion of the operation ends the sequence. Sending never
/// fails even if nobody is listening.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    request_id: Uuid,
    tx: Option<UnboundedSender<AssistantEvent>>,
}

impl ProgressReporter {
    pub fn new(request_id: Uuid, tx: UnboundedSender<AssistantEvent>) -> Self {
        Self {
            request_id,
            tx: Some(tx),
        }
    }

    /// A reporter that drops everything.
    pub fn silent() -> Self {
        Self {
            request_id: Uuid::nil(),
            tx: None,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn report(&self, percent: f32) {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        self.emit(AssistantEvent::Progress {
            request_id: self.request_id,
            percent,
        });
    }

    pub fn emit(&self, event: AssistantEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

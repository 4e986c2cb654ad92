use std::sync::atomic::{AtomicU64, Ordering};

use super::super::events::{TurnEvent, TurnEventPayload, TurnEventSink, TurnLifecycle};
use super::super::types::{TurnId, TurnStatus};

pub(super) struct TurnEventEmitter {
    turn_id: TurnId,
    seq: AtomicU64,
    sink: Option<TurnEventSink>,
}

impl TurnEventEmitter {
    pub(super) fn new(turn_id: TurnId, sink: Option<TurnEventSink>) -> Self {
        Self {
            turn_id,
            seq: AtomicU64::new(1),
            sink,
        }
    }

    pub(super) fn emit(&self, payload: TurnEventPayload) {
        let Some(sink) = &self.sink else {
            return;
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        (sink)(TurnEvent {
            turn_id: self.turn_id,
            seq,
            timestamp: chrono::Utc::now(),
            payload,
        });
    }

    pub(super) fn lifecycle(&self, state: TurnLifecycle) {
        self.emit(TurnEventPayload::Lifecycle { state });
    }

    pub(super) fn finished(&self, status: TurnStatus, error: Option<&str>) {
        let state = match status {
            TurnStatus::Completed => TurnLifecycle::Completed,
            TurnStatus::BudgetExceeded => TurnLifecycle::BudgetExceeded,
            TurnStatus::Canceled => TurnLifecycle::Canceled,
            TurnStatus::Failed => TurnLifecycle::Failed {
                error: error.unwrap_or("turn failed").to_string(),
            },
        };
        self.lifecycle(state);
    }

    pub(super) fn notice(&self, message: impl Into<String>) {
        self.emit(TurnEventPayload::SystemNotice {
            message: message.into(),
        });
    }
}

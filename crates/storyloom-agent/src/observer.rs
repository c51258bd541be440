// ABOUTME: RunObserver forwards workflow events of one run to an optional channel subscriber.
// ABOUTME: Streaming is a side channel: emitting never blocks and never alters control flow.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::mpsc;
use ulid::Ulid;

use storyloom_core::{EventPayload, WorkflowEvent};

/// Granularity of a streamed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Step-level events only.
    #[default]
    Updates,
    /// Step-level events plus model text increments.
    Tokens,
}

/// Event sink for a single run.
pub struct RunObserver {
    run_id: Ulid,
    tx: Option<mpsc::UnboundedSender<WorkflowEvent>>,
    mode: StreamMode,
    next_seq: AtomicU64,
}

impl RunObserver {
    /// An observer that drops every event.
    pub fn silent(run_id: Ulid) -> Self {
        Self {
            run_id,
            tx: None,
            mode: StreamMode::Updates,
            next_seq: AtomicU64::new(0),
        }
    }

    /// An observer that sends events to `tx`.
    pub fn channel(run_id: Ulid, tx: mpsc::UnboundedSender<WorkflowEvent>, mode: StreamMode) -> Self {
        Self {
            run_id,
            tx: Some(tx),
            mode,
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn run_id(&self) -> Ulid {
        self.run_id
    }

    /// True when model calls should stream text increments to this observer.
    pub fn wants_tokens(&self) -> bool {
        self.tx.is_some() && self.mode == StreamMode::Tokens
    }

    /// Emit an event. A dropped receiver is ignored; the run carries on.
    pub fn emit(&self, payload: EventPayload) {
        let Some(tx) = &self.tx else {
            return;
        };
        let event = WorkflowEvent {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            run_id: self.run_id,
            timestamp: Utc::now(),
            payload,
        };
        if tx.send(event).is_err() {
            tracing::debug!(run_id = %self.run_id, "event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyloom_core::WorkflowStep;

    #[test]
    fn silent_observer_never_wants_tokens() {
        let observer = RunObserver::silent(Ulid::new());
        assert!(!observer.wants_tokens());
        observer.emit(EventPayload::StepStarted {
            step: WorkflowStep::Init,
        });
    }

    #[test]
    fn channel_observer_numbers_events_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let run_id = Ulid::new();
        let observer = RunObserver::channel(run_id, tx, StreamMode::Tokens);
        assert!(observer.wants_tokens());

        observer.emit(EventPayload::StepStarted {
            step: WorkflowStep::Init,
        });
        observer.emit(EventPayload::StepStarted {
            step: WorkflowStep::Write,
        });

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);
        assert_eq!(first.run_id, run_id);
    }

    #[test]
    fn emitting_after_receiver_drop_is_harmless() {
        let (tx, rx) = mpsc::unbounded_channel();
        let observer = RunObserver::channel(Ulid::new(), tx, StreamMode::Updates);
        drop(rx);
        observer.emit(EventPayload::StepStarted {
            step: WorkflowStep::Review,
        });
        assert!(!observer.wants_tokens());
    }

    #[test]
    fn stream_mode_deserializes_snake_case() {
        let mode: StreamMode = serde_json::from_str("\"tokens\"").unwrap();
        assert_eq!(mode, StreamMode::Tokens);
        assert_eq!(StreamMode::default(), StreamMode::Updates);
    }
}

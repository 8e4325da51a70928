//! Orchestration events.
//!
//! The engine narrates a run through a closed tagged union delivered over a
//! bounded channel. Presentation layers (CLI, web, tests) subscribe to the
//! receiver; the engine never knows who is listening, and a dropped
//! receiver simply mutes the narration without affecting the run.

use crate::types::Stage;
use serde::Serialize;
use tokio::sync::mpsc;

/// Everything the engine reports while a run is in flight.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResearchEvent {
    /// The orchestrator moved between stages.
    StageTransitioned {
        /// Stage being left.
        from: Stage,
        /// Stage being entered.
        to: Stage,
    },
    /// The run suspended with a clarifying question for the caller.
    ClarificationRequested {
        /// The question to put to the user.
        question: String,
    },
    /// A research unit acquired a slot and began executing.
    UnitStarted {
        /// Supervision round, starting at 1.
        round: u32,
        /// Index of the unit within its round's dispatch order.
        unit: u32,
        /// The sub-task instructions handed to the unit.
        instructions: String,
    },
    /// A research unit finished, successfully or not.
    UnitFinished {
        /// Supervision round, starting at 1.
        round: u32,
        /// Index of the unit within its round's dispatch order.
        unit: u32,
        /// Notes the unit contributed. Zero for failed units.
        note_count: usize,
        /// Wall-clock duration of the unit.
        duration_ms: u64,
        /// Whether the unit failed and was recorded as empty notes.
        failed: bool,
    },
    /// An incremental chunk of the final report, in order.
    ReportToken {
        /// The token text.
        text: String,
    },
    /// The run reached a terminal point for this invocation.
    RunCompleted {
        /// `Done` for a finished report, `AwaitingClarification` when the
        /// run suspended with a question.
        stage: Stage,
    },
}

/// Sending half of the event channel, cheap to clone into spawned units.
///
/// Sends apply backpressure through the channel bound; once the receiver
/// is dropped, emission becomes a no-op so headless runs proceed
/// unhindered.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<mpsc::Sender<ResearchEvent>>,
}

impl EventSink {
    /// Create a bounded channel and its sink.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ResearchEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every event. Used for headless runs.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an event, waiting for channel capacity if the consumer is
    /// behind. Silently drops the event if nobody is listening.
    pub async fn emit(&self, event: ResearchEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).await.is_err() {
                tracing::trace!("event receiver dropped; continuing without narration");
            }
        }
    }
}

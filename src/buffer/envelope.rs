//! Command envelopes and their state machine (`spec.md` §4.4).

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::domain::command::Command;
use crate::handlers::error::HandlerError;

/// `Enqueued -> Dispatching -> Executing -> {Committed | Failed} ->
/// Completed`. Cancellation before `Dispatching` yields `Cancelled`;
/// cancellation during `Executing` is best-effort (`spec.md` §4.4, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Enqueued,
    Dispatching,
    Executing,
    Committed,
    Failed,
    Completed,
    Cancelled,
    CancelledAfterCommit,
}

/// The result delivered back to the producer through `result_sink`.
pub type EnvelopeResult = Result<crate::handlers::commands::CommandOutcome, HandlerError>;

/// A single typed command traveling through the buffer, paired with the
/// sink that resolves the producer's `Enqueue` future.
pub struct Envelope {
    pub id: u64,
    pub command: Command,
    pub enqueued_at: DateTime<Utc>,
    pub correlation_id: String,
    pub result_sink: oneshot::Sender<EnvelopeResult>,
}

impl Envelope {
    pub fn new(
        id: u64,
        command: Command,
        correlation_id: String,
    ) -> (Self, oneshot::Receiver<EnvelopeResult>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                id,
                command,
                enqueued_at: Utc::now(),
                correlation_id,
                result_sink: tx,
            },
            rx,
        )
    }
}

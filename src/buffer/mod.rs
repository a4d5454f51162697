//! Command Buffer (C4): the single-writer FIFO that serialises mutations
//! while queries run concurrently against the graph (`spec.md` §4.4).

pub mod envelope;
pub mod stats;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{instrument, warn};

use crate::domain::command::Command;
use crate::handlers::commands::CommandOutcome;
use crate::handlers::error::HandlerError;

pub use envelope::{Envelope, EnvelopeResult, EnvelopeState};
pub use stats::{BufferStats, BufferStatsSnapshot};

/// Errors `enqueue` can return without ever touching a handler.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("command buffer is at capacity")]
    Full,
    #[error("command buffer is shutting down")]
    ShuttingDown,
}

/// A boxed async dispatch function: the consumer's bridge to C5.
pub type Dispatch = Arc<dyn Fn(Command) -> BoxFuture<'static, Result<CommandOutcome, HandlerError>> + Send + Sync>;

/// The producer-facing half: cheap to clone, safe to share across tasks.
#[derive(Clone)]
pub struct CommandBuffer {
    sender: mpsc::Sender<Envelope>,
    stats: Arc<BufferStats>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
    high_watermark: usize,
    low_watermark: usize,
    backpressured: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

/// The single-consumer half, moved into the tenant worker's consumer task.
pub struct CommandConsumer {
    receiver: mpsc::Receiver<Envelope>,
    stats: Arc<BufferStats>,
    low_watermark: usize,
    backpressured: Arc<AtomicBool>,
}

/// Default queue capacity (`spec.md` §4.4).
pub const DEFAULT_CAPACITY: usize = 10_000;
/// Default high watermark, as a fraction of capacity (`spec.md` §5).
pub const DEFAULT_HIGH_WATERMARK_PCT: f64 = 0.8;
/// Default low watermark, as a fraction of capacity (`spec.md` §5).
pub const DEFAULT_LOW_WATERMARK_PCT: f64 = 0.5;

impl CommandBuffer {
    #[must_use]
    pub fn new(capacity: usize, high_watermark_pct: f64, low_watermark_pct: f64) -> (Self, CommandConsumer) {
        let (sender, receiver) = mpsc::channel(capacity);
        let stats = Arc::new(BufferStats::default());
        let backpressured = Arc::new(AtomicBool::new(false));
        let high_watermark = ((capacity as f64) * high_watermark_pct).round() as usize;
        let low_watermark = ((capacity as f64) * low_watermark_pct).round() as usize;

        let producer = Self {
            sender,
            stats: stats.clone(),
            next_id: Arc::new(AtomicU64::new(1)),
            capacity,
            high_watermark,
            low_watermark,
            backpressured: backpressured.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let consumer = CommandConsumer {
            receiver,
            stats,
            low_watermark,
            backpressured,
        };
        (producer, consumer)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn stats(&self) -> BufferStatsSnapshot {
        self.stats.snapshot()
    }

    #[must_use]
    pub fn is_backpressured(&self) -> bool {
        self.backpressured.load(Ordering::Relaxed)
    }

    /// Stops accepting new commands. Already-enqueued commands still
    /// drain through the consumer; new `enqueue` calls fail fast with
    /// `ShuttingDown`.
    pub fn stop(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Appends a command, waiting if the buffer is momentarily between
    /// high and low watermark rather than failing immediately. Used by
    /// producers that can tolerate a short queueing delay.
    #[instrument(skip_all, fields(correlation_id = %correlation_id))]
    pub async fn enqueue_waiting(
        &self,
        command: Command,
        correlation_id: String,
    ) -> Result<CommandOutcome, HandlerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HandlerError::Buffer(BufferError::ShuttingDown));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (envelope, rx) = Envelope::new(id, command, correlation_id);
        self.sender
            .send(envelope)
            .await
            .map_err(|_| HandlerError::Buffer(BufferError::ShuttingDown))?;
        self.note_enqueued();
        rx.await.map_err(|_| HandlerError::Buffer(BufferError::ShuttingDown))?
    }

    /// Appends a command, failing immediately with `Full` if the queue is
    /// at capacity (the default, sub-millisecond-latency path in
    /// `spec.md` §4.4 and §5).
    #[instrument(skip_all, fields(correlation_id = %correlation_id))]
    pub async fn enqueue(&self, command: Command, correlation_id: String) -> Result<CommandOutcome, HandlerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HandlerError::Buffer(BufferError::ShuttingDown));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (envelope, rx) = Envelope::new(id, command, correlation_id);
        match self.sender.try_send(envelope) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(depth = self.stats.queue_depth(), "buffer full, rejecting enqueue");
                return Err(HandlerError::Buffer(BufferError::Full));
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                return Err(HandlerError::Buffer(BufferError::ShuttingDown));
            }
        }
        self.note_enqueued();
        rx.await.map_err(|_| HandlerError::Buffer(BufferError::ShuttingDown))?
    }

    fn note_enqueued(&self) {
        self.stats.record_enqueued();
        if self.stats.queue_depth() as usize >= self.high_watermark {
            self.backpressured.store(true, Ordering::Relaxed);
        }
    }
}

impl CommandConsumer {
    /// The consumer loop: dequeues, dispatches to C5, writes the result
    /// into the envelope's sink. Runs until `shutdown` signals true or
    /// the channel closes (`spec.md` §4.4, §5).
    #[instrument(skip_all)]
    pub async fn run(mut self, dispatch: Dispatch, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                maybe_envelope = self.receiver.recv() => {
                    match maybe_envelope {
                        Some(envelope) => self.dispatch_one(&dispatch, envelope).await,
                        None => break,
                    }
                }
            }
        }
        // Drain whatever was already enqueued before the channel closed.
        while let Ok(envelope) = self.receiver.try_recv() {
            self.dispatch_one(&dispatch, envelope).await;
        }
    }

    #[instrument(skip_all, fields(command_id = envelope.id, correlation_id = %envelope.correlation_id))]
    async fn dispatch_one(&mut self, dispatch: &Dispatch, envelope: Envelope) {
        self.stats.record_dequeued();
        if (self.stats.queue_depth() as usize) <= self.low_watermark {
            self.backpressured.store(false, Ordering::Relaxed);
        }

        let started = Utc::now();
        let outcome = dispatch(envelope.command).await;
        let latency_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;

        match &outcome {
            Ok(_) => self.stats.record_completed(latency_ms),
            Err(_) => self.stats.record_failed(latency_ms),
        }
        let _ = envelope.result_sink.send(outcome);
    }
}

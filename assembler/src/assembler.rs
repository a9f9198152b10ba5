//! Per-answer assembly state machine
//!
//! One [`MessageAssembler`] per in-flight answer; a single producer (the
//! decoder) drives transitions, and events are applied in strict arrival
//! order. Snapshots publish through a watch channel so any number of
//! readers can observe the latest state while the next event is applied.

use bytes::Bytes;
use futures_util::Stream;
use shared_types::{Citation, Message, Role, StreamEvent};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::decoder::{DecodeError, EventDecoder};

/// Assembly phase of one in-flight answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Thinking,
    Answering,
    Complete,
    Aborted,
}

/// What the assembler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Accepted,
    /// Out-of-order or post-terminal event; discarded.
    Violation,
}

/// How a drive loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// A terminal event was observed; the message is frozen complete.
    Completed,
    /// The stream ended before a terminal event. Accumulated content is
    /// preserved; the message must render as interrupted, not finished.
    Interrupted,
    /// Cancelled externally. Accumulated content is preserved.
    Aborted,
}

/// State machine that folds stream events into one [`Message`].
pub struct MessageAssembler {
    phase: Phase,
    started: bool,
    thinking_closed: bool,
    message: Message,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self {
            phase: Phase::Answering,
            started: false,
            thinking_closed: false,
            message: Message::new(Role::Assistant),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Read-only view of the message built so far.
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn snapshot(&self) -> Message {
        self.message.clone()
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    /// Apply one event in arrival order.
    pub fn apply(&mut self, event: StreamEvent) -> Applied {
        if matches!(self.phase, Phase::Complete | Phase::Aborted) {
            tracing::warn!(
                phase = ?self.phase,
                kind = event_kind(&event),
                "event after terminal state; discarding"
            );
            return Applied::Violation;
        }

        if !self.started {
            self.started = true;
            if matches!(event, StreamEvent::Thinking { .. }) {
                self.phase = Phase::Thinking;
            }
        }

        match event {
            StreamEvent::Thinking { content } => {
                if self.phase != Phase::Thinking || self.thinking_closed {
                    tracing::warn!("thinking delta after reasoning phase ended; discarding");
                    return Applied::Violation;
                }
                self.message
                    .thinking
                    .get_or_insert_with(String::new)
                    .push_str(&content);
                Applied::Accepted
            }
            StreamEvent::ThinkingDone => {
                // Idempotent: a repeat is a no-op, never a violation.
                self.thinking_closed = true;
                if self.phase == Phase::Thinking {
                    self.phase = Phase::Answering;
                }
                Applied::Accepted
            }
            StreamEvent::Chunk { content } => {
                // Some models begin answering before signaling the end of
                // reasoning; the first chunk forces the transition.
                if self.phase == Phase::Thinking {
                    self.phase = Phase::Answering;
                }
                self.message.content.push_str(&content);
                Applied::Accepted
            }
            StreamEvent::Citation { number, source } => {
                let citation = Citation::from_source(number, source);
                if let Some(previous) = self.message.citations.insert(citation) {
                    tracing::debug!(
                        number = previous.number,
                        "citation payload replaced (last write wins)"
                    );
                }
                Applied::Accepted
            }
            StreamEvent::Done => {
                self.phase = Phase::Complete;
                self.message.is_complete = true;
                Applied::Accepted
            }
        }
    }

    /// Cooperative cancellation: keep everything accumulated so far and
    /// stop accepting events. No-op once complete.
    pub fn abort(&mut self) {
        if self.phase != Phase::Complete {
            self.phase = Phase::Aborted;
        }
    }
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self::new()
    }
}

fn event_kind(event: &StreamEvent) -> &'static str {
    match event {
        StreamEvent::Chunk { .. } => "chunk",
        StreamEvent::Citation { .. } => "citation",
        StreamEvent::Thinking { .. } => "thinking",
        StreamEvent::ThinkingDone => "thinking_done",
        StreamEvent::Done => "done",
    }
}

/// Drive a decoder to completion, applying events in arrival order.
///
/// Malformed frames are skipped with a warning; protocol violations are
/// discarded inside the assembler. Each accepted event publishes a fresh
/// snapshot. The token cancels cooperatively between frames.
pub async fn drive<S, E>(
    decoder: &mut EventDecoder<S>,
    assembler: &mut MessageAssembler,
    snapshots: &watch::Sender<Message>,
    cancel: &CancellationToken,
) -> StreamOutcome
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                assembler.abort();
                snapshots.send_replace(assembler.snapshot());
                return StreamOutcome::Aborted;
            }
            next = decoder.next_event() => next,
        };

        match next {
            None => break,
            Some(Err(DecodeError::MalformedFrame(err))) => {
                tracing::warn!(%err, "skipping malformed frame");
            }
            Some(Err(DecodeError::Transport(err))) => {
                tracing::warn!(%err, "stream transport failed before completion");
                break;
            }
            Some(Ok(event)) => {
                if assembler.apply(event) == Applied::Accepted {
                    snapshots.send_replace(assembler.snapshot());
                }
                if assembler.phase() == Phase::Complete {
                    return StreamOutcome::Completed;
                }
            }
        }
    }

    // Stream ended without a terminal event.
    assembler.abort();
    snapshots.send_replace(assembler.snapshot());
    StreamOutcome::Interrupted
}

/// Owned handle for one in-flight answer, scoped to that answer's lifetime.
///
/// Creating a handle spawns the drive task; there is no process-wide
/// registry. Dropping the handle does not stop assembly — use
/// [`AssemblyHandle::cancel`] for that.
pub struct AssemblyHandle {
    snapshots: watch::Receiver<Message>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<(StreamOutcome, Message)>,
}

impl AssemblyHandle {
    pub fn spawn<S, E>(decoder: EventDecoder<S>) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let (tx, rx) = watch::channel(Message::new(Role::Assistant));
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let mut decoder = decoder;
            let mut assembler = MessageAssembler::new();
            let outcome = drive(&mut decoder, &mut assembler, &tx, &task_cancel).await;
            (outcome, assembler.into_message())
        });
        Self {
            snapshots: rx,
            cancel,
            task,
        }
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Message {
        self.snapshots.borrow().clone()
    }

    /// A receiver that observes every subsequent snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Message> {
        self.snapshots.clone()
    }

    /// Request cooperative cancellation; the stream consumer stops reading
    /// and releases the underlying connection at the next frame boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for assembly to finish and take the final message.
    pub async fn join(self) -> (StreamOutcome, Message) {
        match self.task.await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(%err, "assembly task failed");
                (StreamOutcome::Aborted, self.snapshots.borrow().clone())
            }
        }
    }
}

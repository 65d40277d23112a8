//! The uniform, event-driven handle over one RPC call attempt.
//!
//! A stream delivers `ready`, zero or more `message`s, and exactly
//! one terminal event (`complete`, `canceled`, or `error`). The same
//! handle underlies unary calls (exactly one message expected) and
//! server streams; the adapters in [`RpcStream`] promote it into a
//! single value, a vector, or a transformed stream.
//!
//! The lifecycle is an explicit phase machine guarded in one place:
//! producers emit through an [`EventSink`] whose transition function
//! drops anything the current phase forbids: a message before
//! `ready`, a second `ready`, anything after a terminal. Consumers
//! therefore never observe an out-of-grammar sequence, no matter how
//! a producer misbehaves.
//!
//! A stream is dormant until [`RpcStream::start`] is called; nothing
//! runs and nothing is emitted before that. [`RpcStream::cancel`] is
//! idempotent and emits `canceled` from any phase that has not yet
//! produced a terminal event, including before start.

mod adapt;

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};

use crate::error::ClientError;

/// One lifecycle event of a stream.
#[derive(Debug, Clone)]
pub enum StreamEvent<T> {
    /// The call is established; messages may follow.
    Ready,
    /// One decoded response message.
    Message(T),
    /// Terminal: the peer finished the stream successfully.
    Complete,
    /// Terminal: the caller canceled the stream.
    Canceled,
    /// Terminal: the call failed.
    Error(ClientError),
}

impl<T> StreamEvent<T> {
    /// Whether this event ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Canceled | Self::Error(_))
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Message(_) => "message",
            Self::Complete => "complete",
            Self::Canceled => "canceled",
            Self::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Started,
    Ready,
    Done,
}

struct Shared<T> {
    phase: Mutex<Phase>,
    events: mpsc::UnboundedSender<StreamEvent<T>>,
    cancel: watch::Sender<bool>,
}

impl<T> Shared<T> {
    /// The single guarded transition function. Returns whether the
    /// event was accepted and delivered.
    fn emit(&self, event: StreamEvent<T>) -> bool {
        let mut phase = self.phase.lock().expect("stream phase lock poisoned");
        let accepted = match (&event, *phase) {
            (_, Phase::Done) => false,
            (StreamEvent::Ready, Phase::Ready) => false,
            (StreamEvent::Ready, _) => {
                *phase = Phase::Ready;
                true
            }
            (StreamEvent::Message(_), Phase::Ready) => true,
            (StreamEvent::Message(_), _) => false,
            (StreamEvent::Complete | StreamEvent::Canceled | StreamEvent::Error(_), _) => {
                *phase = Phase::Done;
                true
            }
        };
        if !accepted {
            tracing::trace!(event = event.label(), "dropping out-of-grammar stream event");
            return false;
        }
        // Deliver under the lock so event order equals transition
        // order even with concurrent emitters.
        self.events.send(event).is_ok()
    }
}

/// The producer half of a stream: emits events through the guarded
/// transition function and observes cancellation.
pub struct EventSink<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> EventSink<T> {
    /// Emit `ready`. Accepted at most once per stream.
    pub fn ready(&self) -> bool {
        self.shared.emit(StreamEvent::Ready)
    }

    /// Emit one message. Accepted only after `ready` and before the
    /// terminal event.
    pub fn message(&self, value: T) -> bool {
        self.shared.emit(StreamEvent::Message(value))
    }

    /// Emit the `complete` terminal.
    pub fn complete(&self) -> bool {
        self.shared.emit(StreamEvent::Complete)
    }

    /// Emit the `canceled` terminal.
    pub fn canceled(&self) -> bool {
        self.shared.emit(StreamEvent::Canceled)
    }

    /// Emit the `error` terminal.
    pub fn error(&self, error: ClientError) -> bool {
        self.shared.emit(StreamEvent::Error(error))
    }

    /// Whether a terminal event has already been delivered.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        *self.shared.phase.lock().expect("stream phase lock poisoned") == Phase::Done
    }

    /// Resolves when the consumer cancels the stream. Producers
    /// select on this to abandon in-flight work.
    pub async fn cancelled(&self) {
        let mut rx = self.shared.cancel.subscribe();
        // The sender lives in the shared state, so wait_for can only
        // fail if the whole stream is gone; stay pending then.
        if rx.wait_for(|canceled| *canceled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

type Producer<T> = Box<dyn FnOnce(EventSink<T>) -> BoxFuture<'static, ()> + Send>;

/// The consumer handle over one RPC call attempt.
///
/// Obtained from a stream producer; dormant until [`start`] is
/// called. Events arrive through [`next`]; after the terminal event,
/// `next` returns `None`.
///
/// [`start`]: RpcStream::start
/// [`next`]: RpcStream::next
pub struct RpcStream<T> {
    shared: Arc<Shared<T>>,
    events: mpsc::UnboundedReceiver<StreamEvent<T>>,
    producer: Option<Producer<T>>,
    terminated: bool,
}

impl<T: Send + 'static> RpcStream<T> {
    /// Create a stream from a one-shot producer. The producer runs on
    /// its own task once the stream is started and emits through the
    /// provided sink.
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(EventSink<T>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel_tx, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            phase: Mutex::new(Phase::Idle),
            events: events_tx,
            cancel: cancel_tx,
        });
        Self {
            shared,
            events: events_rx,
            producer: Some(Box::new(move |sink| Box::pin(producer(sink)))),
            terminated: false,
        }
    }

    /// A stream that terminates immediately with the given error once
    /// started. Used when a call fails before any work can begin.
    pub fn failed(error: ClientError) -> Self {
        Self::new(move |sink: EventSink<T>| async move {
            sink.error(error);
        })
    }

    /// Start the stream. Idempotent; a no-op after cancellation.
    pub fn start(&mut self) {
        let Some(producer) = self.producer.take() else {
            return;
        };
        {
            let mut phase = self.shared.phase.lock().expect("stream phase lock poisoned");
            if *phase != Phase::Idle {
                // Canceled before start: the producer never runs.
                return;
            }
            *phase = Phase::Started;
        }
        let sink = EventSink {
            shared: Arc::clone(&self.shared),
        };
        let guard_sink = sink.clone();
        tokio::spawn(async move {
            producer(sink).await;
            // A producer that falls off the end without a terminal
            // would otherwise hang the consumer forever.
            if !guard_sink.is_terminated() {
                guard_sink.error(ClientError::protocol(
                    "stream producer exited without a terminal event",
                ));
            }
        });
    }

    /// Request termination. Emits `canceled` unless a terminal event
    /// has already fired; idempotent; safe before start.
    pub fn cancel(&self) {
        self.shared.cancel.send_replace(true);
        self.shared.emit(StreamEvent::Canceled);
    }

    /// Receive the next event. Returns `None` after the terminal
    /// event has been delivered.
    pub async fn next(&mut self) -> Option<StreamEvent<T>> {
        if self.terminated {
            return None;
        }
        let event = self.events.recv().await?;
        if event.is_terminal() {
            self.terminated = true;
        }
        Some(event)
    }
}

impl<T> std::fmt::Debug for RpcStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcStream")
            .field("phase", &*self.shared.phase.lock().expect("stream phase lock poisoned"))
            .field("started", &self.producer.is_none())
            .finish()
    }
}

//! Retry supervision for streams.
//!
//! [`retry_stream`] wraps a stream factory in a handle that looks
//! like a plain stream but transparently re-invokes the factory when
//! an attempt fails, sleeping an exponential backoff between
//! attempts. Each retry is observable as a
//! [`RetryEvent::RetryingError`] before either the next attempt
//! starts or the terminal `error` fires.
//!
//! The wrapper owns at most one upstream attempt at a time; on retry
//! the failed attempt is dropped and a fresh one takes the slot, so
//! only the currently open attempt is cancellable. Messages from an
//! attempt are forwarded only while that attempt is in its `ready`
//! window, which is what keeps abandoned attempts silent.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use webrpckit_core::error::{ClientError, RpcKind};
use webrpckit_core::stream::{RpcStream, StreamEvent};

/// Configuration for exponential backoff between retry attempts.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Multiplier applied per retry.
    pub multiplier: f64,
}

impl ExponentialBackoff {
    /// Create a backoff schedule with the default multiplier of 2.
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            multiplier: 2.0,
        }
    }

    /// Set the multiplier.
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// The delay before retry number `attempt` (0-indexed):
    /// `min(max_delay, initial_delay · multiplier^attempt)`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(30))
    }
}

/// Whether an error is worth another attempt by default.
///
/// Protocol violations and the kinds that indicate a caller or
/// deployment bug (`invalidArgument`, `permissionDenied`,
/// `unauthenticated`, `notFound`, `unimplemented`) do not retry;
/// everything else does.
#[must_use]
pub fn default_is_retryable(error: &ClientError) -> bool {
    match error {
        ClientError::Protocol { .. } => false,
        ClientError::RequestContext { .. } => true,
        ClientError::Rpc { kind, .. } => !matches!(
            kind,
            RpcKind::InvalidArgument
                | RpcKind::PermissionDenied
                | RpcKind::Unauthenticated
                | RpcKind::NotFound
                | RpcKind::Unimplemented
        ),
    }
}

/// Options for [`retry_stream`].
#[derive(Clone)]
pub struct RetryOptions {
    max_retries: i32,
    backoff: ExponentialBackoff,
    is_retryable: Arc<dyn Fn(&ClientError) -> bool + Send + Sync>,
}

impl RetryOptions {
    /// Defaults: 3 retries since the last `ready`, the default
    /// backoff schedule, [`default_is_retryable`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum retries counted since the last `ready`; −1 retries
    /// without bound.
    #[must_use]
    pub fn max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Replace the backoff schedule.
    #[must_use]
    pub fn backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the retryability predicate.
    #[must_use]
    pub fn retryable_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ClientError) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Arc::new(predicate);
        self
    }

    fn has_budget(&self, retries: u32) -> bool {
        self.max_retries < 0 || i64::from(retries) < i64::from(self.max_retries)
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: ExponentialBackoff::default(),
            is_retryable: Arc::new(default_is_retryable),
        }
    }
}

impl std::fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .finish()
    }
}

/// One lifecycle event of a retrying stream: the plain stream grammar
/// plus retry observations.
#[derive(Debug, Clone)]
pub enum RetryEvent<T> {
    /// The current attempt is established.
    Ready,
    /// One message from the current attempt's ready window.
    Message(T),
    /// Terminal: an attempt finished successfully.
    Complete,
    /// Terminal: the wrapper was canceled.
    Canceled,
    /// Terminal: retries are exhausted or the error is not retryable.
    Error(ClientError),
    /// An attempt failed. Fires before every retry and, with
    /// `abandoned`, immediately before the terminal `Error`.
    RetryingError {
        /// The attempt's error.
        error: ClientError,
        /// Failures observed since the last `Ready`.
        retries_since_ready: u32,
        /// When true, no further attempt follows.
        abandoned: bool,
    },
}

impl<T> RetryEvent<T> {
    /// Whether this event ends the retrying stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Canceled | Self::Error(_))
    }
}

struct RetryShared<T> {
    events: mpsc::UnboundedSender<RetryEvent<T>>,
    cancel: watch::Sender<bool>,
    done: Mutex<bool>,
}

impl<T> RetryShared<T> {
    /// Guarded emit: nothing is delivered after the terminal event.
    fn emit(&self, event: RetryEvent<T>) -> bool {
        let mut done = self.done.lock().expect("retry state lock poisoned");
        if *done {
            return false;
        }
        if event.is_terminal() {
            *done = true;
        }
        self.events.send(event).is_ok()
    }
}

type Factory<T> = Box<dyn FnMut() -> RpcStream<T> + Send>;

/// A supervised sequence of stream attempts presenting itself as a
/// single stream. Built by [`retry_stream`].
pub struct RetryingStream<T> {
    shared: Arc<RetryShared<T>>,
    events: mpsc::UnboundedReceiver<RetryEvent<T>>,
    factory: Option<(Factory<T>, RetryOptions)>,
    terminated: bool,
}

/// Wrap a stream factory in a retrying stream.
///
/// The factory is invoked once per attempt; the first invocation
/// happens when the returned stream is started.
pub fn retry_stream<T, F>(factory: F, options: RetryOptions) -> RetryingStream<T>
where
    T: Send + 'static,
    F: FnMut() -> RpcStream<T> + Send + 'static,
{
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (cancel_tx, _) = watch::channel(false);
    RetryingStream {
        shared: Arc::new(RetryShared {
            events: events_tx,
            cancel: cancel_tx,
            done: Mutex::new(false),
        }),
        events: events_rx,
        factory: Some((Box::new(factory), options)),
        terminated: false,
    }
}

impl<T: Send + 'static> RetryingStream<T> {
    /// Start supervising. Idempotent; a no-op after cancellation.
    pub fn start(&mut self) {
        let Some((factory, options)) = self.factory.take() else {
            return;
        };
        let shared = Arc::clone(&self.shared);
        tokio::spawn(supervise(shared, factory, options));
    }

    /// Cancel the wrapper and whichever attempt is currently open.
    /// Emits `Canceled` unless a terminal event has already fired.
    pub fn cancel(&self) {
        self.shared.cancel.send_replace(true);
        self.shared.emit(RetryEvent::Canceled);
    }

    /// Receive the next event. Returns `None` after the terminal
    /// event has been delivered.
    pub async fn next(&mut self) -> Option<RetryEvent<T>> {
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

async fn supervise<T: Send + 'static>(
    shared: Arc<RetryShared<T>>,
    mut factory: Factory<T>,
    options: RetryOptions,
) {
    let mut cancel_rx = shared.cancel.subscribe();
    let mut retries: u32 = 0;

    'attempts: loop {
        if *cancel_rx.borrow() {
            return;
        }

        let mut upstream = factory();
        upstream.start();
        let mut attempt_ready = false;
        let mut cancel_forwarded = false;

        loop {
            let event = if cancel_forwarded {
                upstream.next().await
            } else {
                tokio::select! {
                    changed = cancel_rx.wait_for(|canceled| *canceled) => {
                        // A closed watch means the handle is gone;
                        // wind the attempt down either way.
                        let _ = changed;
                        upstream.cancel();
                        cancel_forwarded = true;
                        continue;
                    }
                    event = upstream.next() => event,
                }
            };

            match event {
                Some(StreamEvent::Ready) => {
                    retries = 0;
                    attempt_ready = true;
                    shared.emit(RetryEvent::Ready);
                }
                Some(StreamEvent::Message(message)) => {
                    if attempt_ready {
                        shared.emit(RetryEvent::Message(message));
                    }
                }
                Some(StreamEvent::Complete) => {
                    shared.emit(RetryEvent::Complete);
                    return;
                }
                Some(StreamEvent::Canceled) => {
                    shared.emit(RetryEvent::Canceled);
                    return;
                }
                Some(StreamEvent::Error(error)) => {
                    if (options.is_retryable)(&error) && options.has_budget(retries) {
                        let delay = options.backoff.delay_for_attempt(retries);
                        debug!(
                            error = %error,
                            retries_since_ready = retries,
                            delay_ms = delay.as_millis(),
                            "attempt failed, retrying"
                        );
                        shared.emit(RetryEvent::RetryingError {
                            error,
                            retries_since_ready: retries,
                            abandoned: false,
                        });
                        retries += 1;
                        tokio::select! {
                            changed = cancel_rx.wait_for(|canceled| *canceled) => {
                                let _ = changed;
                                return;
                            }
                            () = tokio::time::sleep(delay) => {}
                        }
                        continue 'attempts;
                    }
                    warn!(
                        error = %error,
                        retries_since_ready = retries,
                        "abandoning stream"
                    );
                    shared.emit(RetryEvent::RetryingError {
                        error: error.clone(),
                        retries_since_ready: retries,
                        abandoned: true,
                    });
                    shared.emit(RetryEvent::Error(error));
                    return;
                }
                None => return,
            }
        }
    }
}

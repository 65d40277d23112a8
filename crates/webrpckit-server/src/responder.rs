//! The callback surface handed to server-stream handlers.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};

use webrpckit_core::codec::CodecError;
use webrpckit_core::error::{RpcKind, ServerError, ServerRpcError};
use webrpckit_core::frame::{encode_frame, FrameKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponderState {
    NotReady,
    Ready,
    End,
}

pub(crate) struct ResponderInner {
    state: Mutex<ResponderState>,
    frames: mpsc::UnboundedSender<Bytes>,
    ready_signal: Mutex<Option<oneshot::Sender<()>>>,
    closed: watch::Sender<bool>,
    violation: Mutex<Option<String>>,
}

impl ResponderInner {
    /// Record a protocol violation; the first one wins and poisons
    /// the call even if the handler returns `Ok`.
    fn violate(&self, message: String) -> ServerError {
        let mut violation = self.violation.lock().expect("responder lock poisoned");
        if violation.is_none() {
            *violation = Some(message.clone());
        }
        ServerError::handler_protocol(message)
    }

    /// The recorded violation, if any. Read by the engine after the
    /// handler settles.
    pub(crate) fn take_violation(&self) -> Option<String> {
        self.violation.lock().expect("responder lock poisoned").take()
    }

    /// Whether `ready()` ever ran. Disambiguates a handler that
    /// settled right after declaring readiness.
    pub(crate) fn ready_was_called(&self) -> bool {
        *self.state.lock().expect("responder lock poisoned") != ResponderState::NotReady
    }

    /// Transition to `End`; late sends fail from here on.
    pub(crate) fn finish(&self) {
        *self.state.lock().expect("responder lock poisoned") = ResponderState::End;
    }

    /// Mark the client as disconnected.
    pub(crate) fn mark_closed(&self) {
        self.closed.send_replace(true);
    }
}

/// Guard owned by the response body; flips the responder's closed
/// flag when the client goes away and the body stream is dropped.
pub(crate) struct DisconnectGuard(pub(crate) Arc<ResponderInner>);

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.0.mark_closed();
    }
}

/// The callbacks a server-stream handler drives its response with.
///
/// The responder moves through `not ready → ready → end`:
/// [`ready`](Self::ready) may be called at most once and flushes the
/// response headers; [`send`](Self::send) is legal only after that.
/// Misuse fails the call with an `internal` status even if the
/// handler itself returns `Ok`.
///
/// When the client disconnects, [`closed`](Self::closed) resolves and
/// subsequent sends fail with the `canceled` kind, so handlers can
/// stop producing.
pub struct StreamResponder<Resp> {
    inner: Arc<ResponderInner>,
    encode: Arc<dyn Fn(&Resp) -> Result<Bytes, CodecError> + Send + Sync>,
}

impl<Resp> StreamResponder<Resp> {
    pub(crate) fn new<E>(encode: E) -> (Self, ResponderChannels)
    where
        E: Fn(&Resp) -> Result<Bytes, CodecError> + Send + Sync + 'static,
    {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (closed_tx, _) = watch::channel(false);
        let inner = Arc::new(ResponderInner {
            state: Mutex::new(ResponderState::NotReady),
            frames: frames_tx,
            ready_signal: Mutex::new(Some(ready_tx)),
            closed: closed_tx,
            violation: Mutex::new(None),
        });
        let responder = Self {
            inner: Arc::clone(&inner),
            encode: Arc::new(encode),
        };
        let channels = ResponderChannels {
            inner,
            frames: frames_rx,
            ready: ready_rx,
        };
        (responder, channels)
    }

    /// Declare the stream ready: flushes the 200 response with its
    /// context headers and arms disconnect notification.
    ///
    /// # Errors
    ///
    /// Calling it more than once, or after the call has ended, is a
    /// protocol violation that poisons the call.
    pub fn ready(&self) -> Result<(), ServerError> {
        let mut state = self.inner.state.lock().expect("responder lock poisoned");
        match *state {
            ResponderState::NotReady => {
                *state = ResponderState::Ready;
                drop(state);
                if let Some(signal) = self
                    .inner
                    .ready_signal
                    .lock()
                    .expect("responder lock poisoned")
                    .take()
                {
                    let _ = signal.send(());
                }
                Ok(())
            }
            ResponderState::Ready => {
                drop(state);
                Err(self.inner.violate("ready() called twice".to_owned()))
            }
            ResponderState::End => {
                drop(state);
                Err(self
                    .inner
                    .violate("ready() called after the call ended".to_owned()))
            }
        }
    }

    /// Write one message frame.
    ///
    /// # Errors
    ///
    /// Sending before [`ready`](Self::ready) or after the call ended
    /// is a protocol violation; an encode failure likewise fails the
    /// call; sending after the client disconnected fails with the
    /// `canceled` kind.
    pub fn send(&self, message: &Resp) -> Result<(), ServerError> {
        let state = *self.inner.state.lock().expect("responder lock poisoned");
        match state {
            ResponderState::NotReady => {
                return Err(self
                    .inner
                    .violate("send() called before ready()".to_owned()));
            }
            ResponderState::End => {
                return Err(self
                    .inner
                    .violate("send() called after the call ended".to_owned()));
            }
            ResponderState::Ready => {}
        }
        let payload = (self.encode)(message)
            .map_err(|e| self.inner.violate(format!("message encoding failed: {e}")))?;
        self.inner
            .frames
            .send(encode_frame(FrameKind::Message, &payload))
            .map_err(|_| {
                ServerError::from(
                    ServerRpcError::new(RpcKind::Canceled)
                        .with_internal_message("client disconnected"),
                )
            })
    }

    /// Whether the client has disconnected.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Resolves when the client disconnects. Handlers producing slow
    /// streams select on this to stop early.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        if rx.wait_for(|closed| *closed).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// The engine's half of a responder pair.
pub(crate) struct ResponderChannels {
    pub(crate) inner: Arc<ResponderInner>,
    pub(crate) frames: mpsc::UnboundedReceiver<Bytes>,
    pub(crate) ready: oneshot::Receiver<()>,
}

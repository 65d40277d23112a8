//! Adapters promoting a stream into other call shapes.

use crate::error::{ClientError, RpcKind};

use super::{EventSink, RpcStream, StreamEvent};

impl<T: Send + 'static> RpcStream<T> {
    /// Promote the stream into a single-value result.
    ///
    /// Exactly one message followed by `complete` fulfills with the
    /// value. Zero or multiple messages are protocol violations;
    /// `error` propagates; `canceled` fails with the `canceled` kind.
    pub async fn unary(mut self) -> Result<T, ClientError> {
        self.start();
        let mut value = None;
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::Ready => {}
                StreamEvent::Message(message) => {
                    if value.is_some() {
                        self.cancel();
                        return Err(ClientError::protocol(
                            "unary call received more than one response message",
                        ));
                    }
                    value = Some(message);
                }
                StreamEvent::Complete => {
                    return value.ok_or_else(|| {
                        ClientError::protocol(
                            "unary call completed without a response message",
                        )
                    });
                }
                StreamEvent::Canceled => {
                    return Err(ClientError::rpc_with_message(
                        RpcKind::Canceled,
                        "call canceled",
                    ));
                }
                StreamEvent::Error(error) => return Err(error),
            }
        }
        // Unreachable: every stream delivers a terminal event.
        Err(ClientError::protocol("stream ended without a terminal event"))
    }

    /// Collect every message into a vector; resolves on `complete`,
    /// rejects on `error` or `canceled`.
    pub async fn collect(mut self) -> Result<Vec<T>, ClientError> {
        self.start();
        let mut messages = Vec::new();
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::Ready => {}
                StreamEvent::Message(message) => messages.push(message),
                StreamEvent::Complete => return Ok(messages),
                StreamEvent::Canceled => {
                    return Err(ClientError::rpc_with_message(
                        RpcKind::Canceled,
                        "call canceled",
                    ));
                }
                StreamEvent::Error(error) => return Err(error),
            }
        }
        Err(ClientError::protocol("stream ended without a terminal event"))
    }

    /// Transform every message with `f`, preserving the event grammar.
    ///
    /// An `Err` from `f` terminates the stream with that error and
    /// cancels the source. Canceling the returned stream cancels the
    /// source.
    #[must_use]
    pub fn map<U, F>(mut self, mut f: F) -> RpcStream<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Result<U, ClientError> + Send + 'static,
    {
        RpcStream::new(move |sink: EventSink<U>| async move {
            self.start();
            loop {
                tokio::select! {
                    () = sink.cancelled() => {
                        self.cancel();
                        return;
                    }
                    event = self.next() => match event {
                        Some(StreamEvent::Ready) => {
                            sink.ready();
                        }
                        Some(StreamEvent::Message(message)) => match f(message) {
                            Ok(mapped) => {
                                sink.message(mapped);
                            }
                            Err(error) => {
                                sink.error(error);
                                self.cancel();
                                return;
                            }
                        },
                        Some(StreamEvent::Complete) => {
                            sink.complete();
                            return;
                        }
                        Some(StreamEvent::Canceled) => {
                            sink.canceled();
                            return;
                        }
                        Some(StreamEvent::Error(error)) => {
                            sink.error(error);
                            return;
                        }
                        None => return,
                    },
                }
            }
        })
    }
}

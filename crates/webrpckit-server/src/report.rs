//! The error report sink.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use webrpckit_core::error::ServerError;

/// Where a failure happened, as passed to the report sink.
#[derive(Debug, Clone, Copy)]
pub struct ErrorSite<'a> {
    /// The request path of the failing call.
    pub url: &'a str,
}

/// A sink observing every failure the server captures, including
/// secondary failures during error serialization.
pub type ErrorReporter = Arc<dyn Fn(&ServerError, ErrorSite<'_>) + Send + Sync>;

/// Invoke the sink under a panic guard: a panicking sink is logged
/// and never escalated.
pub(crate) fn report(sink: Option<&ErrorReporter>, error: &ServerError, url: &str) {
    tracing::debug!(%url, error = %error, "call failed");
    let Some(sink) = sink else { return };
    if catch_unwind(AssertUnwindSafe(|| sink(error, ErrorSite { url }))).is_err() {
        tracing::error!(%url, "error report sink panicked");
    }
}

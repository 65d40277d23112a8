//! The closed set of RPC failure kinds and their wire mappings.
//!
//! Kinds are shared between client and server. Two mapping tables live
//! here: the gRPC numeric status codes carried in `grpc-status`
//! trailers, and the HTTP status codes used when an error is reported
//! before any response body has been written.

use std::fmt;

/// Every RPC failure is classified as exactly one of these kinds.
///
/// The set mirrors the canonical gRPC status taxonomy, minus the codes
/// this framework never produces (`deadline exceeded`, `aborted`,
/// `out of range`, `data loss`), which decode as [`RpcKind::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcKind {
    /// Catch-all for errors with no better classification.
    Unknown,
    /// The call was canceled, usually by the caller.
    Canceled,
    /// The request was malformed or failed validation.
    InvalidArgument,
    /// A referenced entity does not exist.
    NotFound,
    /// An entity the call tried to create already exists.
    AlreadyExists,
    /// A quota or rate limit was exhausted.
    ResourceExhausted,
    /// The caller is known but not allowed to perform the operation.
    PermissionDenied,
    /// The system is not in a state required for the operation.
    FailedPrecondition,
    /// The method exists in no registered schema.
    Unimplemented,
    /// An invariant inside the server was broken.
    Internal,
    /// The service is currently unreachable or shutting down.
    Unavailable,
    /// The caller presented no valid credentials.
    Unauthenticated,
}

/// All kinds, in declaration order. Handy for exhaustiveness tests.
pub const ALL_KINDS: [RpcKind; 12] = [
    RpcKind::Unknown,
    RpcKind::Canceled,
    RpcKind::InvalidArgument,
    RpcKind::NotFound,
    RpcKind::AlreadyExists,
    RpcKind::ResourceExhausted,
    RpcKind::PermissionDenied,
    RpcKind::FailedPrecondition,
    RpcKind::Unimplemented,
    RpcKind::Internal,
    RpcKind::Unavailable,
    RpcKind::Unauthenticated,
];

impl RpcKind {
    /// The canonical gRPC numeric status code for this kind.
    #[must_use]
    pub const fn grpc_status(self) -> u32 {
        match self {
            Self::Canceled => 1,
            Self::Unknown => 2,
            Self::InvalidArgument => 3,
            Self::NotFound => 5,
            Self::AlreadyExists => 6,
            Self::PermissionDenied => 7,
            Self::ResourceExhausted => 8,
            Self::FailedPrecondition => 9,
            Self::Unimplemented => 12,
            Self::Internal => 13,
            Self::Unavailable => 14,
            Self::Unauthenticated => 16,
        }
    }

    /// Decode a `grpc-status` trailer value back into a kind.
    ///
    /// Codes this framework never emits (including 0, which is
    /// success and should be handled before mapping) decode as
    /// [`RpcKind::Unknown`].
    #[must_use]
    pub const fn from_grpc_status(code: u32) -> Self {
        match code {
            1 => Self::Canceled,
            3 => Self::InvalidArgument,
            5 => Self::NotFound,
            6 => Self::AlreadyExists,
            7 => Self::PermissionDenied,
            8 => Self::ResourceExhausted,
            9 => Self::FailedPrecondition,
            12 => Self::Unimplemented,
            13 => Self::Internal,
            14 => Self::Unavailable,
            16 => Self::Unauthenticated,
            _ => Self::Unknown,
        }
    }

    /// The HTTP status the server answers with when this kind is
    /// reported before response headers have been flushed.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::Unknown | Self::Canceled | Self::Internal => 500,
            Self::InvalidArgument | Self::FailedPrecondition => 400,
            Self::NotFound => 404,
            Self::AlreadyExists => 409,
            Self::ResourceExhausted => 429,
            Self::PermissionDenied => 403,
            Self::Unimplemented => 501,
            Self::Unavailable => 503,
            Self::Unauthenticated => 401,
        }
    }

    /// Classify an HTTP status received without any `grpc-status`
    /// metadata.
    ///
    /// This is the inbound-only superset of [`RpcKind::http_status`]:
    /// 413 decodes as [`RpcKind::InvalidArgument`] (request too
    /// large), 502 and 504 as [`RpcKind::Unavailable`] (intermediary
    /// failures). Unmapped statuses decode as [`RpcKind::Unknown`].
    #[must_use]
    pub const fn from_http_status(status: u16) -> Self {
        match status {
            400 | 413 => Self::InvalidArgument,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 => Self::AlreadyExists,
            429 => Self::ResourceExhausted,
            500 => Self::Internal,
            501 => Self::Unimplemented,
            502 | 503 | 504 => Self::Unavailable,
            _ => Self::Unknown,
        }
    }

    /// The lower-camel name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Canceled => "canceled",
            Self::InvalidArgument => "invalidArgument",
            Self::NotFound => "notFound",
            Self::AlreadyExists => "alreadyExists",
            Self::ResourceExhausted => "resourceExhausted",
            Self::PermissionDenied => "permissionDenied",
            Self::FailedPrecondition => "failedPrecondition",
            Self::Unimplemented => "unimplemented",
            Self::Internal => "internal",
            Self::Unavailable => "unavailable",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}

impl fmt::Display for RpcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

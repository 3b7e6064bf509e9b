//! Structured error taxonomy (Feathers-style: kind + status code + class name).
//!
//! Every error that can reach a client is a `KlipError`: an `ErrorKind`, a
//! client-safe message, and an optional structured `data` payload, carried
//! through `anyhow::Error` so it can flow through ordinary `?` propagation.
//! Transport crates (`klipnote-http`) downcast the `anyhow` chain back to a
//! `KlipError` at the boundary and map it to a response.

use std::fmt;

use anyhow::Error as AnyError;

pub type KlipResult<T> = std::result::Result<T, AnyError>;

/// Error kinds named in spec §7, plus the general HTTP-class kinds every
/// backend-fronting service needs (store unavailable, bad request shape, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Upload admission: declared content-type not in the allow-list.
    UnsupportedFormat,
    /// Upload admission: probe failed or media is otherwise unreadable.
    InvalidMedia,
    /// Upload admission: probed duration exceeds `MaxDurationHours`.
    DurationExceeded,
    /// Upload admission: body exceeded `MaxFileSize`.
    PayloadTooLarge,
    /// Unknown or malformed job id. Never leaked for any other reason.
    NotFound,
    /// Job exists but the transcript has not been committed yet.
    NotReady,
    /// Export request shape is invalid (bad segment list, unknown format).
    InvalidFormat,
    /// Generic malformed-request shape (JSON parse failure, missing field).
    BadRequest,
    /// Job Store mutator attempted to violate the status/progress monotonicity
    /// invariant. Logged only; never returned to a client.
    InvariantViolation,
    /// Fatal system error (store unavailable, disk full, ...).
    GeneralError,
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::UnsupportedFormat => 400,
            ErrorKind::InvalidMedia => 400,
            ErrorKind::DurationExceeded => 400,
            ErrorKind::PayloadTooLarge => 413,
            ErrorKind::NotFound => 404,
            ErrorKind::NotReady => 409,
            ErrorKind::InvalidFormat => 400,
            ErrorKind::BadRequest => 400,
            ErrorKind::InvariantViolation => 500,
            ErrorKind::GeneralError => 500,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "UnsupportedFormat",
            ErrorKind::InvalidMedia => "InvalidMedia",
            ErrorKind::DurationExceeded => "DurationExceeded",
            ErrorKind::PayloadTooLarge => "PayloadTooLarge",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::NotReady => "NotReady",
            ErrorKind::InvalidFormat => "InvalidFormat",
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::InvariantViolation => "InvariantViolation",
            ErrorKind::GeneralError => "GeneralError",
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "unsupported-format",
            ErrorKind::InvalidMedia => "invalid-media",
            ErrorKind::DurationExceeded => "duration-exceeded",
            ErrorKind::PayloadTooLarge => "payload-too-large",
            ErrorKind::NotFound => "not-found",
            ErrorKind::NotReady => "not-ready",
            ErrorKind::InvalidFormat => "invalid-format",
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::InvariantViolation => "invariant-violation",
            ErrorKind::GeneralError => "general-error",
        }
    }
}

pub type ErrorValue = serde_json::Value;

/// A structured KlipNote error, carried through `anyhow::Error`.
#[derive(Debug)]
pub struct KlipError {
    pub kind: ErrorKind,
    pub message: String,
    pub data: Option<ErrorValue>,
    pub source: Option<AnyError>,
}

impl KlipError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            source: None,
        }
    }

    pub fn with_data(mut self, data: ErrorValue) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    pub fn from_anyhow(err: &AnyError) -> Option<&KlipError> {
        err.downcast_ref::<KlipError>()
    }

    /// Turn any error into a KlipError: keep it if it already is one,
    /// otherwise wrap as a 500 GeneralError (never leaking the cause message).
    pub fn normalize(err: AnyError) -> KlipError {
        match err.downcast::<KlipError>() {
            Ok(klip) => klip,
            Err(other) => {
                KlipError::new(ErrorKind::GeneralError, "internal error").with_source(other)
            }
        }
    }

    /// Drop the chained `source` before this crosses a trust boundary.
    pub fn sanitize_for_client(&self) -> KlipError {
        KlipError {
            kind: self.kind,
            message: self.message.clone(),
            data: self.data.clone(),
            source: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        });
        if let Some(d) = &self.data {
            base["data"] = d.clone();
        }
        base
    }

    // ---- Constructors, one per kind ----

    pub fn unsupported_format(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedFormat, msg)
    }
    pub fn invalid_media(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidMedia, msg)
    }
    pub fn duration_exceeded(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::DurationExceeded, msg)
    }
    pub fn payload_too_large(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::PayloadTooLarge, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotReady, msg)
    }
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidFormat, msg)
    }
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }
    pub fn invariant_violation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvariantViolation, msg)
    }
    pub fn general_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::GeneralError, msg)
    }
}

impl fmt::Display for KlipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for KlipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// `return Err(KlipError::not_found("...").into_anyhow())` in one line.
#[macro_export]
macro_rules! bail_klip {
    ($ctor:ident, $msg:expr) => {
        return Err($crate::error::KlipError::$ctor($msg).into_anyhow());
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::error::KlipError::$ctor(format!($fmt, $($arg)*)).into_anyhow());
    };
}

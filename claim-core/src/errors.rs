//! # Errors
//!
//! Store and registrar failures travel as `anyhow::Error` wrapping a
//! [`ClaimError`]. Callers branch on the kind with [`ClaimError::kind_of`];
//! the sign-in flow, for instance, treats `Unavailable` as a soft miss.

use std::fmt;

use anyhow::Error as AnyError;

pub type ClaimResult<T> = std::result::Result<T, AnyError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input rejected before reaching the store.
    BadRequest,
    /// The store refused the read or write.
    Forbidden,
    NotFound,
    /// Uniqueness or ownership clash, e.g. a record already linked to
    /// another identity.
    Conflict,
    /// Store or provider missing, offline or unreachable.
    Unavailable,
    GeneralError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::GeneralError => "general-error",
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Unavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct ClaimError {
    pub kind: ErrorKind,
    pub message: String,
    pub source: Option<AnyError>,
}

impl ClaimError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    pub fn from_anyhow(err: &AnyError) -> Option<&ClaimError> {
        err.downcast_ref::<ClaimError>()
    }

    /// Kind carried by `err`. Foreign errors count as `GeneralError`.
    pub fn kind_of(err: &AnyError) -> ErrorKind {
        Self::from_anyhow(err)
            .map(|e| e.kind)
            .unwrap_or(ErrorKind::GeneralError)
    }

    /// Recover the `ClaimError` inside `err`, or wrap a foreign error as a
    /// `GeneralError` keeping it as the source.
    pub fn normalize(err: AnyError) -> ClaimError {
        match err.downcast::<ClaimError>() {
            Ok(claim) => claim,
            Err(other) => ClaimError::general_error(other.to_string()).with_source(other),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, msg)
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, msg)
    }

    pub fn general_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::GeneralError, msg)
    }
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ClaimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Return early with a `ClaimError` of the given constructor.
///
/// ```ignore
/// bail_claim!(conflict, "'{}' already has a reservation", email);
/// ```
#[macro_export]
macro_rules! bail_claim {
    ($ctor:ident, $msg:expr) => {
        return Err($crate::errors::ClaimError::$ctor($msg).into_anyhow())
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::ClaimError::$ctor(format!($fmt, $($arg)*)).into_anyhow())
    };
}

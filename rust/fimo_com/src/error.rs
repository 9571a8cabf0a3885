//! Error type of the interface layer.

use crate::hresult::HResult;
use std::{borrow::Cow, fmt};

/// A failed status code, optionally annotated with a message.
///
/// Errors are produced when a failure status crosses into Rust code, e.g. by
/// [`Interface::cast`](crate::Interface::cast) when the object does not implement the requested
/// interface. The status code is retained, so that it can be handed back across a boundary
/// through [`HResult::from`].
#[derive(Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({code})")]
pub struct Error {
    code: HResult,
    message: Cow<'static, str>,
}

impl Error {
    /// Constructs a new error from a status code and a message.
    pub fn new(code: HResult, message: impl Into<Cow<'static, str>>) -> Self {
        debug_assert!(code.is_err(), "{code} is not a failure code");
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns the status code of the error.
    pub fn code(&self) -> HResult {
        self.code
    }

    /// Returns the message of the error.
    ///
    /// Errors constructed from a bare status code carry the description of the code.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<HResult> for Error {
    fn from(code: HResult) -> Self {
        Self {
            code,
            message: Cow::Borrowed(code.message().unwrap_or("Unknown failure")),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("code", &self.code)
            .field("message", &self.message())
            .finish()
    }
}

/// A [`Result`](std::result::Result) with an [`Error`] error type.
pub type Result<T = (), E = Error> = core::result::Result<T, E>;

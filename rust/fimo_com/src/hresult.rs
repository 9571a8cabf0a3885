//! Status codes.

use crate::error::{Error, Result};
use std::fmt::{Debug, Display, Formatter};

/// A 32-bit status code.
///
/// Non-negative values denote success, negative values denote a failure. The type has the same
/// layout as an `i32` and converts freely from and to it.
#[repr(transparent)]
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HResult(pub i32);

static_assertions::assert_eq_size!(HResult, i32);

mod __private {
    use paste::paste;

    macro_rules! new_status {
        ($prefix:ident, $code:ident, $value:literal, $($doc:literal),+) => {
            paste! {
                impl super::HResult {
                    $(
                        #[doc = $doc]
                    )+
                    pub const [<$prefix _ $code>]: Self = Self({
                        let raw: u32 = $value;
                        raw as i32
                    });
                }
            }
        };
    }

    new_status!(S, OK, 0x0000_0000, "Operation successful");
    new_status!(S, FALSE, 0x0000_0001, "Operation successful but returned no results");
    new_status!(E, NOTIMPL, 0x8000_4001, "Not implemented");
    new_status!(E, NOINTERFACE, 0x8000_4002, "No such interface supported");
    new_status!(E, POINTER, 0x8000_4003, "Pointer that is not valid");
    new_status!(E, ABORT, 0x8000_4004, "Operation aborted");
    new_status!(E, FAIL, 0x8000_4005, "Unspecified failure");
    new_status!(E, UNEXPECTED, 0x8000_FFFF, "Unexpected failure");
    new_status!(E, ACCESSDENIED, 0x8007_0005, "General access denied error");
    new_status!(E, HANDLE, 0x8007_0006, "Handle that is not valid");
    new_status!(E, OUTOFMEMORY, 0x8007_000E, "Failed to allocate necessary memory");
    new_status!(E, INVALIDARG, 0x8007_0057, "One or more arguments are not valid");
    new_status!(
        CLASS,
        E_NOAGGREGATION,
        0x8004_0110,
        "Class does not support aggregation"
    );
}

impl HResult {
    /// Returns whether the code denotes success.
    pub const fn is_ok(self) -> bool {
        self.0 >= 0
    }

    /// Returns whether the code denotes a failure.
    pub const fn is_err(self) -> bool {
        self.0 < 0
    }

    /// Converts the code into a [`Result`], mapping failures to an [`Error`].
    ///
    /// # Examples
    ///
    /// ```
    /// use fimo_com::HResult;
    ///
    /// assert!(HResult::S_FALSE.ok().is_ok());
    /// let err = HResult::E_NOINTERFACE.ok().unwrap_err();
    /// assert_eq!(err.code(), HResult::E_NOINTERFACE);
    /// ```
    pub fn ok(self) -> Result {
        if self.is_ok() {
            Ok(())
        } else {
            Err(Error::from(self))
        }
    }

    /// Converts a result into a status code, mapping `Ok` to [`HResult::S_OK`].
    pub fn from_result<T>(result: Result<T>) -> Self {
        match result {
            Ok(_) => Self::S_OK,
            Err(err) => err.code(),
        }
    }

    /// Returns the facility of the code.
    pub const fn facility(self) -> u16 {
        ((self.0 as u32 >> 16) & 0x1FFF) as u16
    }

    /// Returns the facility specific part of the code.
    pub const fn code(self) -> u16 {
        (self.0 as u32 & 0xFFFF) as u16
    }

    /// Returns a description of well-known codes.
    pub fn message(self) -> Option<&'static str> {
        let message = match self {
            Self::S_OK => "Operation successful",
            Self::S_FALSE => "Operation successful but returned no results",
            Self::E_NOTIMPL => "Not implemented",
            Self::E_NOINTERFACE => "No such interface supported",
            Self::E_POINTER => "Pointer that is not valid",
            Self::E_ABORT => "Operation aborted",
            Self::E_FAIL => "Unspecified failure",
            Self::E_UNEXPECTED => "Unexpected failure",
            Self::E_ACCESSDENIED => "General access denied error",
            Self::E_HANDLE => "Handle that is not valid",
            Self::E_OUTOFMEMORY => "Failed to allocate necessary memory",
            Self::E_INVALIDARG => "One or more arguments are not valid",
            Self::CLASS_E_NOAGGREGATION => "Class does not support aggregation",
            _ => return None,
        };
        Some(message)
    }
}

impl From<i32> for HResult {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<HResult> for i32 {
    fn from(value: HResult) -> Self {
        value.0
    }
}

impl From<Error> for HResult {
    fn from(value: Error) -> Self {
        value.code()
    }
}

impl PartialEq<i32> for HResult {
    fn eq(&self, other: &i32) -> bool {
        self.0 == *other
    }
}

impl Debug for HResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "HResult({self})")
    }
}

impl Display for HResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010X}", self.0 as u32)
    }
}

/// Converts a status code into a [`Result`].
///
/// Shorthand for [`HResult::ok`].
pub fn check_hresult(code: impl Into<HResult>) -> Result {
    code.into().ok()
}

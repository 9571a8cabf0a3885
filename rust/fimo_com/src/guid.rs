//! Interface and class identities.

use std::{
    cmp::Ordering,
    fmt::{Debug, Display, Formatter},
    hash::{Hash, Hasher},
    str::FromStr,
};

#[cfg(feature = "macros")]
pub use fimo_com_macros::guid;

/// A 128-bit identity naming an interface or a class.
///
/// # Layout
///
/// The identity is laid out as the C struct
///
/// ```c
/// struct Guid {
///     uint32_t data1;
///     uint16_t data2;
///     uint16_t data3;
///     uint8_t  data4[8];
/// };
/// ```
///
/// Comparisons operate on the raw bytes of that layout. The ordering is only meant to allow the
/// usage of identities as keys of ordered containers and carries no further meaning.
#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct Guid {
    /// First field of the identity.
    pub data1: u32,
    /// Second field of the identity.
    pub data2: u16,
    /// Third field of the identity.
    pub data3: u16,
    /// Remaining bytes of the identity.
    pub data4: [u8; 8],
}

static_assertions::assert_eq_size!(Guid, [u8; 16]);
static_assertions::assert_eq_align!(Guid, u32);

impl Guid {
    /// The all-zero identity.
    pub const NIL: Self = Self::from_values(0, 0, 0, [0; 8]);

    /// Constructs an identity from its four raw fields.
    ///
    /// # Examples
    ///
    /// ```
    /// use fimo_com::guid::Guid;
    ///
    /// let id = Guid::from_values(0x00000000, 0x0000, 0x0000, [0xC0, 0, 0, 0, 0, 0, 0, 0x46]);
    /// assert_eq!(id.to_string(), "00000000-0000-0000-c000-000000000046");
    /// ```
    pub const fn from_values(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// Constructs an identity from its big-endian 128-bit representation.
    ///
    /// The value `0x00112233_4455_6677_8899_aabbccddeeff` yields the identity
    /// `00112233-4455-6677-8899-aabbccddeeff`.
    pub const fn from_u128(value: u128) -> Self {
        let bytes = value.to_be_bytes();
        Self::from_values(
            (value >> 96) as u32,
            (value >> 80) as u16,
            (value >> 64) as u16,
            [
                bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14],
                bytes[15],
            ],
        )
    }

    /// Returns the big-endian 128-bit representation of the identity.
    pub const fn to_u128(&self) -> u128 {
        ((self.data1 as u128) << 96)
            | ((self.data2 as u128) << 80)
            | ((self.data3 as u128) << 64)
            | (u64::from_be_bytes(self.data4) as u128)
    }

    /// Returns the identity associated with the type `T`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fimo_com::{guid::Guid, IUnknown, Interface};
    ///
    /// assert_eq!(Guid::of::<IUnknown>(), IUnknown::IID);
    /// ```
    pub const fn of<T: Identified + ?Sized>() -> Self {
        T::GUID
    }

    /// Returns the raw bytes of the in-memory representation.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        // Safety: `Guid` is `repr(C)` without padding and has the size of `[u8; 16]`.
        unsafe { &*std::ptr::from_ref(self).cast::<[u8; 16]>() }
    }

    /// Checks whether two identities are equal in a const context.
    pub const fn const_eq(&self, other: &Self) -> bool {
        let lhs = self.as_bytes();
        let rhs = other.as_bytes();
        let mut i = 0;
        while i < lhs.len() {
            if lhs[i] != rhs[i] {
                return false;
            }
            i += 1;
        }
        true
    }

    /// Checks whether the identity is [`Guid::NIL`].
    pub const fn is_nil(&self) -> bool {
        self.const_eq(&Self::NIL)
    }
}

/// Types with an identity known at compile time.
pub trait Identified {
    /// Identity of the type.
    const GUID: Guid;
}

impl PartialEq for Guid {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Guid {}

impl PartialOrd for Guid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Guid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl Hash for Guid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl Debug for Guid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Guid({self})")
    }
}

impl Display for Guid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&uuid::Uuid::from(*self).hyphenated(), f)
    }
}

impl From<uuid::Uuid> for Guid {
    fn from(value: uuid::Uuid) -> Self {
        let (data1, data2, data3, data4) = value.as_fields();
        Self::from_values(data1, data2, data3, *data4)
    }
}

impl From<Guid> for uuid::Uuid {
    fn from(value: Guid) -> Self {
        uuid::Uuid::from_fields(value.data1, value.data2, value.data3, &value.data4)
    }
}

/// Error returned when parsing a [`Guid`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid identity string: {0}")]
pub struct GuidParseError(#[from] uuid::Error);

impl FromStr for Guid {
    type Err = GuidParseError;

    /// Parses an identity, optionally enclosed in braces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(s);
        Ok(uuid::Uuid::try_parse(s)?.into())
    }
}

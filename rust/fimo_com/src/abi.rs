//! Mapping between host values and their binary representation.
//!
//! Every value crossing the foreign call boundary has a wire type, which is bit-identical to
//! the host type. For plain values the wire type is the value itself, newtype enumerations are
//! passed as their underlying integer and the owning handles are passed as raw pointers.
//!
//! The functions of this module are the only sanctioned way of converting between the two
//! representations. They are aware of the ownership semantics of the host type, i.e. copying a
//! handle to or from its wire representation acquires a new reference, while detaching and
//! attaching transfer the ownership of the existing one.

use std::{
    ffi::c_void,
    marker::PhantomData,
    mem::{ManuallyDrop, MaybeUninit},
};

/// Associates a host type with its binary compatible wire type.
///
/// # Safety
///
/// `Self` and `Self::Abi` must have the same size and alignment, and every valid value of
/// `Self` must be a valid value of `Self::Abi` when reinterpreted. The reverse need not hold:
/// the functions converting from the wire type are `unsafe` and require that the wire value
/// is a valid representation of `Self`.
pub unsafe trait Abi: Sized {
    /// Wire representation of the type.
    type Abi: Copy;
}

struct LayoutCheck<T>(PhantomData<T>);

impl<T: Abi> LayoutCheck<T> {
    const OK: () = assert!(
        size_of::<T>() == size_of::<T::Abi>() && align_of::<T>() == align_of::<T::Abi>(),
        "the host type and its wire type must share the same layout"
    );
}

/// Reinterprets a value as its wire representation.
///
/// Ownership is not transferred, i.e. the returned value is only valid as long as `value` is
/// alive and unchanged. For handles this returns the raw pointer without acquiring a reference.
#[inline]
pub fn get_abi<T: Abi>(value: &T) -> T::Abi {
    let () = LayoutCheck::<T>::OK;
    // Safety: The layouts match and every `T` is a valid `T::Abi`.
    unsafe { std::mem::transmute_copy(value) }
}

/// Returns the storage of `value` as a writable wire slot.
///
/// Values requiring drop glue are reset to their default value first, which releases any
/// reference held by a handle. The slot can then be handed to a foreign function that writes a
/// fresh value into it.
#[inline]
pub fn put_abi<T: Abi + Default>(value: &mut T) -> *mut T::Abi {
    let () = LayoutCheck::<T>::OK;
    if std::mem::needs_drop::<T>() {
        *value = T::default();
    }
    std::ptr::from_mut(value).cast()
}

/// Assigns a copy of a wire value to `value`.
///
/// The wire value remains owned by the caller. For handles, this acquires a new reference.
///
/// # Safety
///
/// `abi` must be a valid representation of a `T` and remain valid for the duration of the call.
#[inline]
pub unsafe fn copy_from_abi<T: Abi + Clone>(value: &mut T, abi: T::Abi) {
    let () = LayoutCheck::<T>::OK;
    // Safety: The caller guarantees that the value is a valid `T`. It is never dropped.
    let borrowed = unsafe { ManuallyDrop::new(std::mem::transmute_copy::<T::Abi, T>(&abi)) };
    value.clone_from(&borrowed);
}

/// Writes a copy of `value` into a wire slot.
///
/// The previous content of the slot is overwritten without being released and the caller
/// receives the ownership of the copy. For handles, this acquires a new reference.
#[inline]
pub fn copy_to_abi<T: Abi + Clone>(value: &T, abi: &mut T::Abi) {
    let () = LayoutCheck::<T>::OK;
    let copy = ManuallyDrop::new(value.clone());
    // Safety: The layouts match and every `T` is a valid `T::Abi`.
    *abi = unsafe { std::mem::transmute_copy(&*copy) };
}

/// Moves `value` out as its wire representation.
///
/// The host side relinquishes the ownership of any resource held by `value`. For handles the
/// reference is not released.
#[inline]
pub fn detach_abi<T: Abi>(value: T) -> T::Abi {
    let () = LayoutCheck::<T>::OK;
    let value = ManuallyDrop::new(value);
    // Safety: The layouts match and every `T` is a valid `T::Abi`.
    unsafe { std::mem::transmute_copy(&*value) }
}

/// Replaces `value` by taking ownership of a wire value.
///
/// The previous value is dropped. For handles, the held reference is released and the new one
/// is adopted without acquiring another reference.
///
/// # Safety
///
/// `abi` must be a valid representation of a `T` whose ownership is transferred to the callee.
#[inline]
pub unsafe fn attach_abi<T: Abi>(value: &mut T, abi: T::Abi) {
    // Safety: Upheld by the caller.
    *value = unsafe { from_abi(abi) };
}

/// Constructs a value by taking ownership of a wire value.
///
/// # Safety
///
/// `abi` must be a valid representation of a `T` whose ownership is transferred to the callee.
#[inline]
pub unsafe fn from_abi<T: Abi>(abi: T::Abi) -> T {
    let () = LayoutCheck::<T>::OK;
    // Safety: Upheld by the caller.
    unsafe { std::mem::transmute_copy(&abi) }
}

/// Returns an uninitialized wire slot, to be filled by a foreign function.
pub fn uninit_abi<T: Abi>() -> MaybeUninit<T::Abi> {
    MaybeUninit::uninit()
}

macro_rules! identity_abi {
    ($($T:ty),* $(,)?) => {
        $(
            // Safety: The wire type is the type itself.
            unsafe impl Abi for $T {
                type Abi = Self;
            }
        )*
    };
}

identity_abi! {
    bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64,
    crate::guid::Guid,
}

// Safety: Raw pointers carry no ownership.
unsafe impl<T> Abi for *const T {
    type Abi = Self;
}

// Safety: Raw pointers carry no ownership.
unsafe impl<T> Abi for *mut T {
    type Abi = Self;
}

// Safety: `HResult` is a transparent wrapper around an `i32`.
unsafe impl Abi for crate::hresult::HResult {
    type Abi = i32;
}

// Safety: Arrays have the layout of `N` consecutive elements.
unsafe impl<T: Abi, const N: usize> Abi for [T; N] {
    type Abi = [T::Abi; N];
}

/// Wire type of a raw interface pointer.
pub type RawPtr = *mut c_void;

/// Declares a newtype enumeration whose wire representation is the underlying integer.
///
/// Enumerations defined by foreign interfaces may receive values that are unknown to the host.
/// Instead of a Rust `enum`, for which an unknown discriminant would be undefined behavior,
/// the enumeration is declared as a transparent wrapper with one associated constant per
/// variant.
///
/// # Examples
///
/// ```
/// use fimo_com::{abi, newtype_enum};
///
/// newtype_enum! {
///     /// Access mode of a stream.
///     pub enum AccessMode: u32 {
///         /// Read access.
///         READ = 1,
///         /// Write access.
///         WRITE = 2,
///     }
/// }
///
/// let mode = AccessMode::WRITE;
/// assert_eq!(abi::get_abi(&mode), 2);
/// ```
#[macro_export]
macro_rules! newtype_enum {
    (
        $(#[$attr:meta])*
        $vis:vis enum $name:ident: $repr:ty {
            $(
                $(#[$variant_attr:meta])*
                $variant:ident = $value:expr
            ),* $(,)?
        }
    ) => {
        $(#[$attr])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        $vis struct $name(pub $repr);

        impl $name {
            $(
                $(#[$variant_attr])*
                pub const $variant: Self = Self($value);
            )*
        }

        // Safety: The type is a transparent wrapper around the underlying integer.
        unsafe impl $crate::abi::Abi for $name {
            type Abi = $repr;
        }

        impl ::core::convert::From<$repr> for $name {
            fn from(value: $repr) -> Self {
                Self(value)
            }
        }

        impl ::core::convert::From<$name> for $repr {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{guid::Guid, hresult::HResult};

    newtype_enum! {
        enum Mode: i32 {
            IDLE = 0,
            RUNNING = 1,
        }
    }

    #[test]
    fn plain_values() {
        let mut value = 5u32;
        assert_eq!(get_abi(&value), 5);

        // Safety: Any `u32` is valid.
        unsafe { *put_abi(&mut value) = 7 };
        assert_eq!(value, 7);

        let mut slot = 0;
        copy_to_abi(&value, &mut slot);
        assert_eq!(slot, 7);

        // Safety: Any `u32` is valid.
        unsafe { copy_from_abi(&mut value, 11) };
        assert_eq!(value, 11);
        assert_eq!(detach_abi(value), 11);
    }

    #[test]
    fn status_is_passed_as_integer() {
        let code = HResult::E_NOINTERFACE;
        let raw: i32 = get_abi(&code);
        assert_eq!(raw, code.0);

        // Safety: Any `i32` is a valid status.
        let code: HResult = unsafe { from_abi(-1) };
        assert!(code.is_err());
    }

    #[test]
    fn enumerations_are_passed_as_integer() {
        let mut mode = Mode::RUNNING;
        assert_eq!(get_abi(&mode), 1);

        // Safety: Any `i32` is a valid `Mode`.
        unsafe { attach_abi(&mut mode, 42) };
        assert_eq!(mode, Mode(42));
        assert_ne!(mode, Mode::IDLE);
        assert_eq!(i32::from(mode), 42);
    }

    #[test]
    fn identities_and_arrays() {
        let ids = [Guid::from_u128(1), Guid::from_u128(2)];
        let raw = get_abi(&ids);
        assert_eq!(raw, ids);

        let mut out = uninit_abi::<u64>();
        out.write(3);
        // Safety: The slot was initialized above.
        assert_eq!(unsafe { out.assume_init() }, 3);
    }
}

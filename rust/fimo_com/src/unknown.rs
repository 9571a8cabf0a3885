//! Base capability shared by every interface.

use crate::{
    abi::{Abi, RawPtr},
    cast::{self, CastTarget},
    error::Result,
    guid::{Guid, Identified},
    hresult::HResult,
};
use std::{
    cmp::Ordering,
    ffi::c_void,
    fmt::{Debug, Formatter, Pointer},
    hash::{Hash, Hasher},
    ptr::NonNull,
};

/// Layout of the base interface table.
///
/// Every interface table starts with these three entries, in this order. Interface tables are
/// append-only: once published, the layout of a table may not change, as other binaries depend
/// on the offsets of its entries.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct IUnknownVtbl {
    /// Queries the object for the interface with the given identity.
    ///
    /// On success, writes a pointer carrying one new reference to the last argument. On
    /// failure, writes a null pointer.
    pub query_interface: unsafe extern "system" fn(RawPtr, *const Guid, *mut RawPtr) -> HResult,
    /// Increments the reference count, returning the new count.
    pub add_ref: unsafe extern "system" fn(RawPtr) -> u32,
    /// Decrements the reference count, returning the new count.
    ///
    /// The object is destroyed once the count reaches zero.
    pub release: unsafe extern "system" fn(RawPtr) -> u32,
}

/// Owning handle to the base capability of an object.
///
/// The handle owns exactly one reference to the object and releases it on drop. Cloning the
/// handle acquires a new reference. Two handles compare equal if they refer to the same
/// object, even if they were obtained through different interfaces.
///
/// # Layout
///
/// The handle has the layout of a non-null pointer to the object, whose first field is a
/// pointer to an [`IUnknownVtbl`] compatible table. `Option<IUnknown>` has the layout of a
/// nullable pointer.
#[repr(transparent)]
pub struct IUnknown(NonNull<c_void>);

static_assertions::assert_eq_size!(IUnknown, RawPtr);
static_assertions::assert_eq_size!(Option<IUnknown>, RawPtr);

// Safety: The reference count of an object is updated atomically.
unsafe impl Send for IUnknown {}

// Safety: The reference count of an object is updated atomically.
unsafe impl Sync for IUnknown {}

impl IUnknown {
    fn raw_vtable(&self) -> &IUnknownVtbl {
        // Safety: The first field of every object is a pointer to a table starting with the
        // base entries.
        unsafe { &**self.0.as_ptr().cast::<*const IUnknownVtbl>() }
    }

    /// Returns the canonical identity pointer of the object.
    ///
    /// Objects may expose distinct pointers for each interface they implement. The pointer
    /// returned for the [`IUnknown`] identity is the same for all of them.
    fn canonical(&self) -> NonNull<c_void> {
        self.try_cast::<IUnknown>().map_or(self.0, |x| x.0)
    }
}

impl Clone for IUnknown {
    fn clone(&self) -> Self {
        // Safety: We own a reference, so the object is alive.
        unsafe { (self.raw_vtable().add_ref)(self.0.as_ptr()) };
        Self(self.0)
    }
}

impl Drop for IUnknown {
    fn drop(&mut self) {
        // Safety: We own the reference.
        unsafe { (self.raw_vtable().release)(self.0.as_ptr()) };
    }
}

impl PartialEq for IUnknown {
    fn eq(&self, other: &Self) -> bool {
        if self.0 == other.0 {
            return true;
        }
        self.canonical() == other.canonical()
    }
}

impl Eq for IUnknown {}

impl PartialOrd for IUnknown {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IUnknown {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.0 == other.0 {
            return Ordering::Equal;
        }
        self.canonical().cmp(&other.canonical())
    }
}

impl Hash for IUnknown {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl Debug for IUnknown {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("IUnknown").field(&self.0).finish()
    }
}

impl Pointer for IUnknown {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Pointer::fmt(&self.0, f)
    }
}

/// Interface projection types.
///
/// An interface is a transparent, non-null, owning handle to an object, bound to the table
/// type of the interface. All interfaces share the layout of [`IUnknown`], so that each of them
/// can be reinterpreted as the base capability.
///
/// # Safety
///
/// - The type must be a `#[repr(transparent)]` wrapper around an [`IUnknown`] or around
///   another interface.
/// - `Vtable` must be `#[repr(C)]` and start with an [`IUnknownVtbl`].
/// - `IID` must uniquely identify the interface.
///
/// The [`interface!`](crate::interface) macro declares types satisfying these requirements.
pub unsafe trait Interface: Sized + Clone {
    /// Interface table of the interface.
    type Vtable: 'static;

    /// Unique identity of the interface.
    const IID: Guid;

    /// Returns the raw interface pointer, without acquiring a reference.
    fn as_raw(&self) -> RawPtr {
        // Safety: The interface is a transparent wrapper around a pointer.
        unsafe { std::mem::transmute_copy(self) }
    }

    /// Returns the raw interface pointer, transferring the ownership to the caller.
    fn into_raw(self) -> RawPtr {
        let this = std::mem::ManuallyDrop::new(self);
        this.as_raw()
    }

    /// Takes ownership of a raw interface pointer.
    ///
    /// No reference is acquired.
    ///
    /// # Safety
    ///
    /// `raw` must be a non-null pointer to an object implementing the interface, which carries
    /// one reference owned by the caller.
    unsafe fn from_raw(raw: RawPtr) -> Self {
        debug_assert!(!raw.is_null());
        // Safety: The interface is a transparent wrapper around a pointer.
        unsafe { std::mem::transmute_copy(&raw) }
    }

    /// Borrows a raw interface pointer as an interface.
    ///
    /// Returns `None` if `raw` is null.
    ///
    /// # Safety
    ///
    /// If not null, `raw` must point to an object implementing the interface and must remain
    /// alive for the lifetime `'a`.
    unsafe fn from_raw_borrowed<'a>(raw: &'a RawPtr) -> Option<&'a Self> {
        if raw.is_null() {
            None
        } else {
            // Safety: The interface is a transparent wrapper around a pointer.
            unsafe { Some(&*std::ptr::from_ref(raw).cast::<Self>()) }
        }
    }

    /// Returns the interface table of the object.
    fn vtable(&self) -> &Self::Vtable {
        // Safety: The first field of the object is a pointer to the interface table.
        unsafe { &**self.as_raw().cast::<*const Self::Vtable>() }
    }

    /// Returns the object as its base capability.
    fn as_unknown(&self) -> &IUnknown {
        // Safety: All interfaces share the layout of an `IUnknown`.
        unsafe { &*std::ptr::from_ref(self).cast::<IUnknown>() }
    }

    /// Queries the object for an interface, using the raw calling convention.
    ///
    /// On success, `out` receives a pointer carrying one reference owned by the caller.
    ///
    /// # Safety
    ///
    /// `out` must be valid for writes.
    unsafe fn query(&self, iid: &Guid, out: *mut RawPtr) -> HResult {
        let unknown = self.as_unknown();
        // Safety: The caller guarantees that `out` is writable.
        unsafe { (unknown.raw_vtable().query_interface)(self.as_raw(), iid, out) }
    }

    /// Casts the object to another interface or implementation.
    ///
    /// Returns an error carrying the status code of the query if the object does not support
    /// the requested identity.
    fn cast<T: CastTarget>(&self) -> Result<T::Output> {
        // Safety: The pointer is valid, as we own a reference to the object.
        let result = unsafe { cast::cast_raw::<T>(self.as_raw()) };
        result.and_then(|x| x.ok_or_else(|| HResult::E_POINTER.into()))
    }

    /// Casts the object to another interface or implementation.
    ///
    /// Returns `None` if the object does not support the requested identity.
    fn try_cast<T: CastTarget>(&self) -> Option<T::Output> {
        // Safety: The pointer is valid, as we own a reference to the object.
        unsafe { cast::try_cast_raw::<T>(self.as_raw()) }
    }
}

impl<I: Interface> Identified for I {
    const GUID: Guid = I::IID;
}

// Safety: `IUnknown` is a transparent pointer to an object and its table is the base table.
unsafe impl Interface for IUnknown {
    type Vtable = IUnknownVtbl;

    const IID: Guid = Guid::from_values(
        0x00000000,
        0x0000,
        0x0000,
        [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
    );
}

// Safety: `IUnknown` is a transparent, non-null interface pointer.
unsafe impl Abi for IUnknown {
    type Abi = RawPtr;
}

// Safety: Interfaces are non-null pointers, so `None` is represented by the null pointer.
unsafe impl<I: Interface> Abi for Option<I> {
    type Abi = RawPtr;
}

/// Declares an interface projection type.
///
/// The declared type is a transparent wrapper around an [`IUnknown`], implementing
/// [`Interface`], [`Abi`](crate::abi::Abi), `Clone`, `Debug`, the identity based comparisons
/// and the conversions to [`IUnknown`]. The methods of the interface are left to the declaration.
///
/// # Examples
///
/// ```
/// use fimo_com::{guid, interface, IUnknownVtbl, Interface};
///
/// #[repr(C)]
/// pub struct IPingVtbl {
///     pub base: IUnknownVtbl,
///     pub ping: unsafe extern "system" fn(*mut std::ffi::c_void) -> u32,
/// }
///
/// interface! {
///     /// Pings the object.
///     pub interface IPing: IPingVtbl = guid!("5bd0a2f4-3f7e-4d58-9a55-a8d8f9b31f52");
/// }
///
/// impl IPing {
///     pub fn ping(&self) -> u32 {
///         // Safety: The table belongs to the object.
///         unsafe { (self.vtable().ping)(self.as_raw()) }
///     }
/// }
/// ```
#[macro_export]
macro_rules! interface {
    (
        $(#[$attr:meta])*
        $vis:vis interface $name:ident: $vtable:ty = $iid:expr;
    ) => {
        $(#[$attr])*
        #[repr(transparent)]
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis struct $name($crate::IUnknown);

        // Safety: The type is a transparent wrapper around an `IUnknown`.
        unsafe impl $crate::Interface for $name {
            type Vtable = $vtable;

            const IID: $crate::guid::Guid = $iid;
        }

        // Safety: The type is a transparent, non-null interface pointer.
        unsafe impl $crate::abi::Abi for $name {
            type Abi = $crate::abi::RawPtr;
        }

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.debug_tuple(::core::stringify!($name))
                    .field(&$crate::Interface::as_raw(self))
                    .finish()
            }
        }

        impl ::core::convert::From<$name> for $crate::IUnknown {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl ::core::convert::AsRef<$crate::IUnknown> for $name {
            fn as_ref(&self) -> &$crate::IUnknown {
                &self.0
            }
        }
    };
}

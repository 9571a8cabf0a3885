//! Objects implemented in Rust.
//!
//! A Rust type exposes interfaces by implementing [`Implementation`], usually through the
//! [`implement!`](crate::implement) macro. Its values are then allocated inside a [`ComBox`],
//! whose layout starts with one table pointer per exposed interface, followed by the reference
//! count and the value itself:
//!
//! ```text
//! +-----------+
//! | tables[0] | ---> IUnknownVtbl        <- identity pointer
//! | tables[1] | ---> first interface table
//! |    ...    |
//! | count     |
//! | value     |
//! +-----------+
//! ```
//!
//! The address of the `n`-th table pointer is the interface pointer handed out for the `n`-th
//! interface. The first slot always exposes [`IUnknown`] and its address is the canonical
//! identity of the object. Since the slot of each interface is known at compile time, the
//! object can be recovered from any of its interface pointers by a constant offset.

use crate::{
    abi::{Abi, RawPtr},
    cast::CastTarget,
    error::Result,
    guid::{Guid, Identified},
    hresult::HResult,
    unknown::{IUnknown, IUnknownVtbl, Interface},
};
use std::{
    ffi::c_void,
    fmt::{Debug, Formatter},
    marker::PhantomData,
    ops::Deref,
    process::abort,
    ptr::NonNull,
    sync::atomic::{self, AtomicU32, Ordering},
};

/// Types that can be exposed as objects.
///
/// # Safety
///
/// - `INTERFACES` must start with [`IUnknown::IID`] and must not contain duplicates.
/// - `Tables` must be an array of `INTERFACES.len()` pointers.
/// - The `n`-th pointer of `TABLES` must point to a table for the `n`-th interface of
///   `INTERFACES`, produced by [`VtableFor::VTABLE`].
///
/// The [`implement!`](crate::implement) macro generates implementations satisfying these
/// requirements.
pub unsafe trait Implementation: Send + Sync + Sized + 'static {
    /// Class id of the type.
    ///
    /// Querying an object for its class id yields its identity pointer, which allows recovering
    /// the original object from any of its interfaces.
    const CLSID: Guid;

    /// Ids of the exposed interfaces, in slot order.
    const INTERFACES: &'static [Guid];

    /// Array of the table pointers.
    type Tables: Copy + AsRef<[*const c_void]> + 'static;

    /// Table pointers of the exposed interfaces, in slot order.
    const TABLES: Self::Tables;
}

/// Interfaces able to provide a table for the implementation `T`.
///
/// # Safety
///
/// The table must start with [`IUnknownVtbl::new::<T, Self>()`](IUnknownVtbl::new) and its
/// remaining entries must expect the interface pointer of `Self` for an object of type
/// [`ComBox<T>`].
pub unsafe trait VtableFor<T: Implementation>: Interface {
    /// Table of the interface for objects of type `T`.
    const VTABLE: Self::Vtable;
}

// Safety: The table is the base table.
unsafe impl<T: Implementation> VtableFor<T> for IUnknown {
    const VTABLE: IUnknownVtbl = IUnknownVtbl::new::<T, IUnknown>();
}

struct SlotOf<T, I>(PhantomData<fn() -> (T, I)>);

impl<T: Implementation, I: Interface> SlotOf<T, I> {
    const INDEX: usize = {
        let interfaces = T::INTERFACES;
        let mut i = 0;
        loop {
            if i == interfaces.len() {
                panic!("the interface is not exposed by the implementation");
            }
            if interfaces[i].const_eq(&I::IID) {
                break i;
            }
            i += 1;
        }
    };
}

struct LayoutCheck<T>(PhantomData<T>);

impl<T: Implementation> LayoutCheck<T> {
    const OK: () = {
        let interfaces = T::INTERFACES;
        assert!(
            !interfaces.is_empty() && interfaces[0].const_eq(&IUnknown::IID),
            "the first slot must expose IUnknown"
        );
        assert!(
            size_of::<T::Tables>() == interfaces.len() * size_of::<*const c_void>(),
            "one table is required per exposed interface"
        );
    };
}

impl IUnknownVtbl {
    /// Constructs the base entries for the interface `I` of the implementation `T`.
    pub const fn new<T: Implementation, I: Interface>() -> Self {
        unsafe extern "system" fn query_interface<T: Implementation, I: Interface>(
            this: RawPtr,
            iid: *const Guid,
            out: *mut RawPtr,
        ) -> HResult {
            // Safety: The table is only reachable through slot `I` of a `ComBox<T>`.
            unsafe { ComBox::query_interface(ComBox::<T>::box_from_slot::<I>(this), iid, out) }
        }

        unsafe extern "system" fn add_ref<T: Implementation, I: Interface>(this: RawPtr) -> u32 {
            // Safety: The table is only reachable through slot `I` of a `ComBox<T>`.
            unsafe { ComBox::add_ref(ComBox::<T>::box_from_slot::<I>(this)) }
        }

        unsafe extern "system" fn release<T: Implementation, I: Interface>(this: RawPtr) -> u32 {
            // Safety: The table is only reachable through slot `I` of a `ComBox<T>`.
            unsafe { ComBox::release(ComBox::<T>::box_from_slot::<I>(this)) }
        }

        Self {
            query_interface: query_interface::<T, I>,
            add_ref: add_ref::<T, I>,
            release: release::<T, I>,
        }
    }
}

/// Going above this limit aborts the process.
const MAX_REFCOUNT: u32 = i32::MAX as u32;

/// Atomic reference count of an object.
#[derive(Debug)]
pub struct RefCount(AtomicU32);

impl RefCount {
    /// Constructs a count of one.
    pub const fn new() -> Self {
        Self(AtomicU32::new(1))
    }

    /// Returns the current count.
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Increments the count, returning the new count.
    pub fn increment(&self) -> u32 {
        // New references can only be created from an existing one, so no synchronization is
        // required.
        let old = self.0.fetch_add(1, Ordering::Relaxed);
        if old > MAX_REFCOUNT {
            log::error!("reference count overflow");
            abort();
        }
        old + 1
    }

    /// Decrements the count, returning the new count.
    ///
    /// When zero is returned, all accesses through other references happen before the return.
    pub fn decrement(&self) -> u32 {
        let old = self.0.fetch_sub(1, Ordering::Release);
        if old == 1 {
            atomic::fence(Ordering::Acquire);
        }
        old - 1
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

/// Heap representation of an object implemented in Rust.
#[repr(C)]
pub struct ComBox<T: Implementation> {
    tables: T::Tables,
    count: RefCount,
    value: T,
}

impl<T: Implementation> ComBox<T> {
    /// # Safety
    ///
    /// `this` must be the interface pointer for `I` of a `ComBox<T>`.
    unsafe fn box_from_slot<I: Interface>(this: RawPtr) -> *const Self {
        let slot = SlotOf::<T, I>::INDEX;
        // Safety: The interface pointer is the address of the table pointer at index `slot`.
        unsafe { this.cast::<*const c_void>().sub(slot).cast::<Self>().cast_const() }
    }

    /// Recovers the object from the interface pointer of `I`.
    ///
    /// Fails to compile if `I` is not exposed by `T`.
    ///
    /// # Safety
    ///
    /// `this` must be the interface pointer for `I` of a `ComBox<T>`, which must remain alive
    /// for the lifetime `'a`.
    pub unsafe fn from_slot<'a, I: Interface>(this: RawPtr) -> &'a Self {
        // Safety: Upheld by the caller.
        unsafe { &*Self::box_from_slot::<I>(this) }
    }

    /// Returns the wrapped value.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Returns the current reference count.
    pub fn count(&self) -> u32 {
        self.count.get()
    }

    /// # Safety
    ///
    /// `this` must point to a `ComBox<T>`.
    unsafe fn slot(this: *const Self, index: usize) -> RawPtr {
        debug_assert!(index < T::INTERFACES.len());
        // Safety: The object starts with an array of `T::INTERFACES.len()` table pointers.
        unsafe { this.cast::<*const c_void>().add(index).cast_mut().cast() }
    }

    /// # Safety
    ///
    /// `this` must point to a live `ComBox<T>`.
    unsafe fn add_ref(this: *const Self) -> u32 {
        // Safety: Upheld by the caller.
        let count = unsafe { (*this).count.increment() };
        #[cfg(feature = "trace-refcount")]
        log::trace!("add_ref {} at {this:p}: {count}", T::CLSID);
        count
    }

    /// # Safety
    ///
    /// `this` must point to a live `ComBox<T>` allocated by [`ComObject::new`]. The caller must
    /// own a reference, which is consumed.
    unsafe fn release(this: *const Self) -> u32 {
        // Safety: Upheld by the caller.
        let count = unsafe { (*this).count.decrement() };
        #[cfg(feature = "trace-refcount")]
        log::trace!("release {} at {this:p}: {count}", T::CLSID);
        if count == 0 {
            log::trace!("destroying {} at {this:p}", T::CLSID);
            // Safety: This was the last reference, and the object was allocated by a `Box`.
            drop(unsafe { Box::from_raw(this.cast_mut()) });
        }
        count
    }

    /// # Safety
    ///
    /// `this` must point to a live `ComBox<T>`. `out` must be null or valid for writes, and
    /// `iid` must be null or valid for reads.
    unsafe fn query_interface(this: *const Self, iid: *const Guid, out: *mut RawPtr) -> HResult {
        if out.is_null() {
            return HResult::E_POINTER;
        }
        // Safety: The caller guarantees that a non-null `iid` is readable.
        let Some(iid) = (unsafe { iid.as_ref() }) else {
            // Safety: `out` is writable.
            unsafe { out.write(std::ptr::null_mut()) };
            return HResult::E_POINTER;
        };

        let slot = if *iid == T::CLSID {
            Some(0)
        } else {
            T::INTERFACES.iter().position(|x| x == iid)
        };

        match slot {
            Some(slot) => {
                // Safety: The object is alive and `out` is writable.
                unsafe {
                    Self::add_ref(this);
                    out.write(Self::slot(this, slot));
                }
                HResult::S_OK
            }
            None => {
                log::trace!("{} does not expose {iid}", T::CLSID);
                // Safety: `out` is writable.
                unsafe { out.write(std::ptr::null_mut()) };
                HResult::E_NOINTERFACE
            }
        }
    }
}

/// Owning handle to an object implemented in Rust.
///
/// Unlike the interface projections, the handle knows the concrete type of the object and
/// dereferences to it. It participates in the cast protocol like any other handle: casting an
/// interface to `ComObject<T>` recovers the object if it was created from `T`.
///
/// # Examples
///
/// ```
/// use fimo_com::{guid, implement, ComObject, IUnknown, Interface};
///
/// struct Answer {
///     value: u32,
/// }
///
/// implement!(Answer = guid!("0b1a6d2c-54c3-4d8e-a2cf-9b0c0c9f7e11"));
///
/// let object = ComObject::new(Answer { value: 42 });
/// let unknown: IUnknown = object.to_interface();
/// assert_eq!(ComObject::strong_count(&object), 2);
///
/// let recovered = unknown.cast::<ComObject<Answer>>().unwrap();
/// assert_eq!(recovered.value, 42);
/// ```
#[repr(transparent)]
pub struct ComObject<T: Implementation>(NonNull<ComBox<T>>);

// Safety: The count is atomic and `T` is `Send + Sync`.
unsafe impl<T: Implementation> Send for ComObject<T> {}

// Safety: The count is atomic and `T` is `Send + Sync`.
unsafe impl<T: Implementation> Sync for ComObject<T> {}

impl<T: Implementation> ComObject<T> {
    /// Allocates a new object wrapping `value`.
    pub fn new(value: T) -> Self {
        let () = LayoutCheck::<T>::OK;
        let object = Box::new(ComBox {
            tables: T::TABLES,
            count: RefCount::new(),
            value,
        });
        // Safety: Boxes are never null.
        let object = unsafe { NonNull::new_unchecked(Box::into_raw(object)) };
        log::trace!("created {} at {object:p}", T::CLSID);
        Self(object)
    }

    fn inner(&self) -> &ComBox<T> {
        // Safety: We own a reference, so the object is alive.
        unsafe { self.0.as_ref() }
    }

    /// Returns the current reference count of the object.
    pub fn strong_count(this: &Self) -> u32 {
        this.inner().count()
    }

    /// Returns the object as its base capability.
    pub fn as_unknown(&self) -> &IUnknown {
        // Safety: The handle is a pointer to the first slot, which exposes `IUnknown`.
        unsafe { &*std::ptr::from_ref(self).cast::<IUnknown>() }
    }

    /// Returns a new handle to the interface `I` of the object.
    ///
    /// Fails to compile if `I` is not exposed by `T`.
    pub fn to_interface<I: Interface>(&self) -> I {
        let this = self.0.as_ptr().cast_const();
        // Safety: We own a reference, so the object is alive. The slot exposes `I` and carries
        // the reference acquired here.
        unsafe {
            let raw = ComBox::slot(this, SlotOf::<T, I>::INDEX);
            ComBox::add_ref(this);
            I::from_raw(raw)
        }
    }

    /// Returns the identity pointer, transferring the ownership to the caller.
    pub fn into_raw(this: Self) -> RawPtr {
        let this = std::mem::ManuallyDrop::new(this);
        this.0.as_ptr().cast()
    }

    /// Takes ownership of an identity pointer.
    ///
    /// # Safety
    ///
    /// `raw` must be the identity pointer of a live `ComBox<T>` and carry one reference.
    pub unsafe fn from_raw(raw: RawPtr) -> Self {
        debug_assert!(!raw.is_null());
        // Safety: The identity pointer is the address of the object.
        unsafe { Self(NonNull::new_unchecked(raw.cast())) }
    }

    /// Casts the object to an interface or implementation.
    pub fn cast<U: CastTarget>(&self) -> Result<U::Output> {
        self.as_unknown().cast::<U>()
    }

    /// Casts the object to an interface or implementation.
    pub fn try_cast<U: CastTarget>(&self) -> Option<U::Output> {
        self.as_unknown().try_cast::<U>()
    }
}

impl<T: Implementation> Deref for ComObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.inner().get()
    }
}

impl<T: Implementation> Clone for ComObject<T> {
    fn clone(&self) -> Self {
        // Safety: We own a reference, so the object is alive.
        unsafe { ComBox::add_ref(self.0.as_ptr()) };
        Self(self.0)
    }
}

impl<T: Implementation> Drop for ComObject<T> {
    fn drop(&mut self) {
        // Safety: We own the reference.
        unsafe { ComBox::release(self.0.as_ptr()) };
    }
}

impl<T: Implementation> PartialEq for ComObject<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: Implementation> Eq for ComObject<T> {}

impl<T: Implementation + Debug> Debug for ComObject<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComObject")
            .field("ptr", &self.0)
            .field("value", &**self)
            .finish()
    }
}

impl<T: Implementation> From<ComObject<T>> for IUnknown {
    fn from(value: ComObject<T>) -> Self {
        // Safety: The identity pointer exposes `IUnknown` and carries the reference.
        unsafe { IUnknown::from_raw(ComObject::into_raw(value)) }
    }
}

impl<T: Implementation> Identified for ComObject<T> {
    const GUID: Guid = T::CLSID;
}

// Safety: A query for the class id returns the identity pointer of the `ComBox<T>`.
unsafe impl<T: Implementation> CastTarget for ComObject<T> {
    type Output = Self;

    unsafe fn wrap(raw: NonNull<c_void>) -> Self::Output {
        // Safety: Upheld by the caller.
        unsafe { Self::from_raw(raw.as_ptr()) }
    }
}

// Safety: `ComObject<T>` is a transparent pointer to the identity slot.
unsafe impl<T: Implementation> Abi for ComObject<T> {
    type Abi = RawPtr;
}

/// Counts the interfaces passed to [`implement!`](crate::implement).
#[doc(hidden)]
#[macro_export]
macro_rules! __count_interfaces {
    () => { 0usize };
    ($head:ty $(, $tail:ty)*) => { 1usize + $crate::__count_interfaces!($($tail),*) };
}

/// Exposes a type as an object implementing a list of interfaces.
///
/// The type is assigned a class id and its interfaces are placed in the listed order, after
/// [`IUnknown`]. Every listed interface must implement [`VtableFor`] for the type.
///
/// ```
/// use fimo_com::{guid, implement};
///
/// struct Empty;
///
/// implement!(Empty = guid!("9f1c6b0e-0f7a-4b0d-8a0c-2b3b1c4d5e6f"));
/// ```
#[macro_export]
macro_rules! implement {
    ($ty:ty = $clsid:expr $(; $($interface:ty),+ $(,)?)?) => {
        // Safety: The tables are produced by the declarations of the interfaces, in slot order.
        unsafe impl $crate::Implementation for $ty {
            const CLSID: $crate::guid::Guid = $clsid;

            const INTERFACES: &'static [$crate::guid::Guid] = &[
                <$crate::IUnknown as $crate::Interface>::IID,
                $($(<$interface as $crate::Interface>::IID,)+)?
            ];

            type Tables = [
                *const ::core::ffi::c_void;
                1 + $crate::__count_interfaces!($($($interface),+)?)
            ];

            const TABLES: Self::Tables = [
                &const { <$crate::IUnknown as $crate::VtableFor<$ty>>::VTABLE } as *const _
                    as *const ::core::ffi::c_void,
                $($(
                    &const { <$interface as $crate::VtableFor<$ty>>::VTABLE } as *const _
                        as *const ::core::ffi::c_void,
                )+)?
            ];
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Plain {
        value: u32,
    }

    crate::implement!(Plain = Guid::from_u128(0x6f0d0b3e_1c4a_4e7b_9a2d_3f5e6a7b8c9d));

    #[test]
    fn count_transitions() {
        let count = RefCount::new();
        assert_eq!(count.increment(), 2);
        assert_eq!(count.decrement(), 1);
        assert_eq!(count.decrement(), 0);
    }

    #[test]
    fn identity_slot() {
        let object = ComObject::new(Plain { value: 5 });
        assert_eq!(object.value, 5);
        assert_eq!(ComObject::strong_count(&object), 1);
        assert_eq!(object.as_unknown().as_raw(), object.0.as_ptr().cast());

        let unknown = object.to_interface::<IUnknown>();
        assert_eq!(ComObject::strong_count(&object), 2);
        assert_eq!(&unknown, object.as_unknown());
        drop(unknown);
        assert_eq!(ComObject::strong_count(&object), 1);
    }

    #[test]
    fn recover_from_class_id() {
        let object = ComObject::new(Plain { value: 7 });
        let unknown = IUnknown::from(object.clone());
        let recovered = unknown.cast::<ComObject<Plain>>().unwrap();
        assert_eq!(recovered, object);
        assert_eq!(ComObject::strong_count(&object), 3);
    }
}

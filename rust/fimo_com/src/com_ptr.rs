//! Nullable owning interface handle.

use crate::{
    abi::{Abi, RawPtr},
    cast::{self, CastTarget},
    error::Result,
    guid::Guid,
    hresult::HResult,
    unknown::Interface,
};
use std::{
    cmp::Ordering,
    ffi::c_void,
    fmt::{Debug, Formatter},
    hash::{Hash, Hasher},
};

/// A nullable owning handle bound to the interface `I`.
///
/// The handle holds zero or one reference to an object implementing `I`, and releases it when
/// dropped or when its value is replaced. Cloning a non-null handle acquires a new reference.
///
/// The handle is laid out as a single, possibly null, interface pointer. It can therefore be
/// passed directly as an in or out parameter of a foreign function, through the functions of
/// the [`abi`](crate::abi) module or through [`ComPtr::put`].
///
/// # Examples
///
/// ```
/// use fimo_com::{ComPtr, IUnknown};
///
/// let ptr = ComPtr::<IUnknown>::null();
/// assert!(ptr.is_null());
/// assert!(ptr.try_cast::<IUnknown>().is_none());
/// ```
#[repr(transparent)]
pub struct ComPtr<I: Interface>(Option<I>);

static_assertions::assert_eq_size!(ComPtr<crate::IUnknown>, RawPtr);
static_assertions::assert_eq_align!(ComPtr<crate::IUnknown>, RawPtr);

impl<I: Interface> ComPtr<I> {
    /// Constructs a null handle.
    pub const fn null() -> Self {
        Self(None)
    }

    /// Constructs a handle owning `value`.
    pub const fn new(value: I) -> Self {
        Self(Some(value))
    }

    /// Takes ownership of a raw interface pointer, which may be null.
    ///
    /// No reference is acquired.
    ///
    /// # Safety
    ///
    /// If not null, `raw` must point to an object implementing `I` and carry one reference
    /// owned by the caller.
    pub unsafe fn from_raw(raw: RawPtr) -> Self {
        if raw.is_null() {
            Self::null()
        } else {
            // Safety: Upheld by the caller.
            Self(Some(unsafe { I::from_raw(raw) }))
        }
    }

    /// Returns whether the handle is null.
    pub const fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Returns whether the handle holds a reference.
    pub const fn is_some(&self) -> bool {
        self.0.is_some()
    }

    /// Borrows the held interface.
    pub const fn get(&self) -> Option<&I> {
        self.0.as_ref()
    }

    /// Returns the held interface, consuming the handle.
    pub fn into_inner(self) -> Option<I> {
        self.0
    }

    /// Moves the held reference out, leaving a null handle behind.
    pub fn take(&mut self) -> Self {
        Self(self.0.take())
    }

    /// Returns the raw interface pointer, without acquiring a reference.
    pub fn as_raw(&self) -> RawPtr {
        self.0.as_ref().map_or(std::ptr::null_mut(), I::as_raw)
    }

    /// Releases the held reference and adopts `raw` without acquiring a reference.
    ///
    /// # Safety
    ///
    /// Same requirements as [`ComPtr::from_raw`].
    pub unsafe fn attach(&mut self, raw: RawPtr) {
        // Safety: Upheld by the caller.
        *self = unsafe { Self::from_raw(raw) };
    }

    /// Returns the raw interface pointer and resets the handle to null.
    ///
    /// The reference is not released, the caller becomes its owner.
    pub fn detach(&mut self) -> RawPtr {
        self.0.take().map_or(std::ptr::null_mut(), I::into_raw)
    }

    /// Returns the address of the internal pointer, to be filled by a foreign function.
    ///
    /// The handle is expected to be null. A held reference is released first.
    pub fn put(&mut self) -> *mut RawPtr {
        debug_assert!(self.is_null(), "the handle must be null before being filled");
        crate::abi::put_abi(self)
    }

    /// Same as [`ComPtr::put`], for functions taking an untyped out parameter.
    pub fn put_void(&mut self) -> *mut *mut c_void {
        self.put()
    }

    /// Writes a copy of the held pointer to `out`, acquiring a new reference.
    ///
    /// A null pointer is written if the handle is null. The previous content of `out` is not
    /// released.
    ///
    /// # Safety
    ///
    /// `out` must be valid for writes.
    pub unsafe fn copy_to(&self, out: *mut RawPtr) {
        let raw = self.0.clone().map_or(std::ptr::null_mut(), I::into_raw);
        // Safety: Upheld by the caller.
        unsafe { out.write(raw) };
    }

    /// Replaces the held reference with a copy of `raw`, acquiring a new reference.
    ///
    /// Nothing happens if `raw` is the pointer already held.
    ///
    /// # Safety
    ///
    /// If not null, `raw` must point to a live object implementing `I`.
    pub unsafe fn copy_from(&mut self, raw: RawPtr) {
        if self.as_raw() != raw {
            // Safety: Upheld by the caller.
            let borrowed = unsafe { I::from_raw_borrowed(&raw) };
            self.0 = borrowed.cloned();
        }
    }

    /// Converts the handle into a handle to a base interface of `I`.
    ///
    /// The held reference is transferred without querying the object.
    pub fn upcast<U>(self) -> ComPtr<U>
    where
        U: Interface,
        I: Into<U>,
    {
        ComPtr(self.0.map(Into::into))
    }

    /// Swaps the references held by two handles.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.0, &mut other.0);
    }

    /// Casts the object to another interface or implementation.
    ///
    /// Returns `Ok(None)` if the handle is null, and an error carrying the status of the query
    /// if the object does not support the requested identity.
    pub fn cast<T: CastTarget>(&self) -> Result<Option<T::Output>> {
        // Safety: If not null, we own a reference to the object.
        unsafe { cast::cast_raw::<T>(self.as_raw()) }
    }

    /// Casts the object to another interface or implementation.
    ///
    /// Returns `None` if the handle is null or if the object does not support the requested
    /// identity.
    pub fn try_cast<T: CastTarget>(&self) -> Option<T::Output> {
        // Safety: If not null, we own a reference to the object.
        unsafe { cast::try_cast_raw::<T>(self.as_raw()) }
    }

    /// Casts the object into an existing handle.
    ///
    /// On failure, `to` is left untouched. A null handle casts to a null handle.
    pub fn cast_into<T: Interface>(&self, to: &mut ComPtr<T>) -> Result {
        *to = ComPtr(self.cast::<T>()?);
        Ok(())
    }

    /// Casts the object into an existing handle.
    ///
    /// On failure, `to` is reset to null. Returns whether `to` holds a reference afterwards.
    pub fn try_cast_into<T: Interface>(&self, to: &mut ComPtr<T>) -> bool {
        *to = ComPtr(self.try_cast::<T>());
        to.is_some()
    }

    /// Fills the handle by calling a factory function.
    ///
    /// `f` is called with the identity of `I` and the address of the internal pointer. The
    /// handle is reset to null first. A failure status is returned as an error.
    ///
    /// # Safety
    ///
    /// On success, `f` must write a null pointer or a pointer to an object implementing `I`,
    /// carrying one reference. On failure, it must write nothing but a null pointer.
    pub unsafe fn capture<F>(&mut self, f: F) -> Result
    where
        F: FnOnce(&Guid, *mut *mut c_void) -> HResult,
    {
        *self = Self::null();
        f(&I::IID, self.put_void()).ok()
    }

    /// Fills the handle by calling a factory function.
    ///
    /// Same as [`ComPtr::capture`], but returns whether the call succeeded.
    ///
    /// # Safety
    ///
    /// Same requirements as [`ComPtr::capture`].
    pub unsafe fn try_capture<F>(&mut self, f: F) -> bool
    where
        F: FnOnce(&Guid, *mut *mut c_void) -> HResult,
    {
        *self = Self::null();
        f(&I::IID, self.put_void()).is_ok()
    }
}

impl<I: Interface> Clone for ComPtr<I> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }

    fn clone_from(&mut self, source: &Self) {
        if self.as_raw() != source.as_raw() {
            self.0.clone_from(&source.0);
        }
    }
}

impl<I: Interface> Default for ComPtr<I> {
    fn default() -> Self {
        Self::null()
    }
}

impl<I: Interface + PartialEq> PartialEq for ComPtr<I> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<I: Interface + Eq> Eq for ComPtr<I> {}

impl<I: Interface + PartialOrd> PartialOrd for ComPtr<I> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl<I: Interface + Ord> Ord for ComPtr<I> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<I: Interface + Hash> Hash for ComPtr<I> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<I: Interface> From<I> for ComPtr<I> {
    fn from(value: I) -> Self {
        Self::new(value)
    }
}

impl<I: Interface> From<Option<I>> for ComPtr<I> {
    fn from(value: Option<I>) -> Self {
        Self(value)
    }
}

impl<I: Interface> From<ComPtr<I>> for Option<I> {
    fn from(value: ComPtr<I>) -> Self {
        value.0
    }
}

impl<I: Interface> Debug for ComPtr<I> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ComPtr").field(&self.as_raw()).finish()
    }
}

// Safety: `ComPtr<I>` is a transparent, nullable interface pointer.
unsafe impl<I: Interface> Abi for ComPtr<I> {
    type Abi = RawPtr;
}

//! Dynamic cast protocol.
//!
//! Casting asks an object for another interface by identity. The object answers through the
//! `query_interface` entry of its base table, which hands back a pointer carrying one new
//! reference. That reference is adopted by the produced handle as is.

use crate::{
    abi::RawPtr,
    error::Result,
    guid::{Guid, Identified},
    hresult::HResult,
    unknown::{IUnknownVtbl, Interface},
};
use std::{ffi::c_void, ptr::NonNull};

/// Types that can be produced by a cast.
///
/// Interface projections adopt the returned pointer. Local implementations, whose identity is
/// their class id, recover their object from the returned identity pointer.
///
/// # Safety
///
/// An object answering a query for `Self::GUID` must return a pointer that `wrap` can adopt.
pub unsafe trait CastTarget: Identified {
    /// Handle produced by a successful cast.
    type Output;

    /// Adopts a pointer returned by a successful query for `Self::GUID`.
    ///
    /// # Safety
    ///
    /// `raw` must be the result of such a query and carry one reference, which is transferred
    /// to the returned handle.
    unsafe fn wrap(raw: NonNull<c_void>) -> Self::Output;
}

// Safety: A query for an interface id returns a pointer to an object implementing it.
unsafe impl<I: Interface> CastTarget for I {
    type Output = I;

    unsafe fn wrap(raw: NonNull<c_void>) -> Self::Output {
        // Safety: The pointer carries one reference to an object implementing `I`.
        unsafe { I::from_raw(raw.as_ptr()) }
    }
}

/// Queries the object behind `raw` for the identity of `T`.
///
/// Returns `Ok(None)` if `raw` is null. Otherwise, a failed query is returned as an error
/// carrying the status of the query. A query reporting success without returning a pointer is
/// reported as [`HResult::E_POINTER`].
///
/// The source reference is left untouched.
///
/// # Safety
///
/// If not null, `raw` must point to a live object.
pub unsafe fn cast_raw<T: CastTarget + ?Sized>(raw: RawPtr) -> Result<Option<T::Output>> {
    if raw.is_null() {
        return Ok(None);
    }

    let iid = Guid::of::<T>();
    let mut out: RawPtr = std::ptr::null_mut();
    // Safety: Every object starts with a pointer to a table beginning with the base entries.
    let hr = unsafe {
        let vtable = &**raw.cast::<*const IUnknownVtbl>();
        (vtable.query_interface)(raw, &iid, &mut out)
    };
    if hr.is_err() {
        log::trace!("query for {iid} failed with {hr}");
        debug_assert!(out.is_null(), "failed queries must not return a pointer");
        return Err(hr.into());
    }

    match NonNull::new(out) {
        // Safety: The query succeeded, so the pointer carries one reference.
        Some(out) => Ok(Some(unsafe { T::wrap(out) })),
        None => {
            log::debug!("query for {iid} succeeded without returning a pointer");
            Err(HResult::E_POINTER.into())
        }
    }
}

/// Queries the object behind `raw` for the identity of `T`, discarding the failure status.
///
/// Returns `None` if `raw` is null or if the object does not support the identity.
///
/// # Safety
///
/// If not null, `raw` must point to a live object.
pub unsafe fn try_cast_raw<T: CastTarget + ?Sized>(raw: RawPtr) -> Option<T::Output> {
    // Safety: Upheld by the caller.
    unsafe { cast_raw::<T>(raw) }.ok().flatten()
}

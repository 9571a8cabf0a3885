//! Reference counted, dynamically queryable interface objects used by the Fimo engine.
//!
//! An object exposes one or more interfaces, each being a table of function pointers named by
//! a [`Guid`]. Every table starts with the three entries of [`IUnknownVtbl`], which allow
//! querying the object for another interface and managing its reference count. Handles to
//! objects are owning: [`IUnknown`] and the interfaces declared with [`interface!`] hold one
//! non-null reference, [`ComPtr`] holds zero or one, and [`ComObject`] holds one reference to an
//! object implemented in Rust. All of them are laid out as a single pointer.
//!
//! Converting between the handles and their raw pointers is done through the [`abi`] module.

#[cfg(test)]
extern crate self as fimo_com;

pub mod abi;
pub mod cast;
pub mod error;
pub mod guid;
pub mod hresult;

mod com_ptr;
mod object;
mod unknown;

pub use cast::CastTarget;
pub use com_ptr::ComPtr;
pub use error::{Error, Result};
pub use guid::{Guid, Identified};
pub use hresult::HResult;
pub use object::{ComBox, ComObject, Implementation, RefCount, VtableFor};
pub use unknown::{IUnknown, IUnknownVtbl, Interface};

#[cfg(feature = "macros")]
pub use guid::guid;

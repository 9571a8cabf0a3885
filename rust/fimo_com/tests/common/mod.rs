#![allow(dead_code)]

use fimo_com::{
    abi::RawPtr, guid, implement, interface, ComBox, Error, Guid, HResult, IUnknown,
    IUnknownVtbl, Implementation, Interface, Result, VtableFor,
};
use std::{
    ffi::c_void,
    sync::{
        atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering},
        Arc,
    },
};

#[repr(C)]
pub struct IValueVtbl {
    pub base: IUnknownVtbl,
    pub get: unsafe extern "system" fn(RawPtr) -> i32,
    pub set: unsafe extern "system" fn(RawPtr, i32) -> HResult,
}

interface! {
    /// A mutable integer.
    pub interface IValue: IValueVtbl = guid!("3c8e5f1a-7d2b-4c6e-9f0a-1b2c3d4e5f60");
}

impl IValue {
    pub fn get(&self) -> i32 {
        // Safety: The table belongs to the object.
        unsafe { (self.vtable().get)(self.as_raw()) }
    }

    pub fn set(&self, value: i32) -> Result {
        // Safety: The table belongs to the object.
        unsafe { (self.vtable().set)(self.as_raw(), value) }.ok()
    }
}

#[repr(C)]
pub struct INamedVtbl {
    pub base: IUnknownVtbl,
    pub name: unsafe extern "system" fn(RawPtr, *mut *const u8, *mut usize),
}

interface! {
    /// An object with a name.
    pub interface INamed: INamedVtbl = guid!("a4d1c9e7-2f3b-4a8c-b5d6-e7f809a1b2c3");
}

impl INamed {
    pub fn name(&self) -> &str {
        let mut ptr = std::ptr::null();
        let mut len = 0;
        // Safety: The table belongs to the object, and the name lives as long as the object.
        unsafe {
            (self.vtable().name)(self.as_raw(), &mut ptr, &mut len);
            std::str::from_utf8_unchecked(std::slice::from_raw_parts(ptr, len))
        }
    }
}

#[repr(C)]
pub struct IMissingVtbl {
    pub base: IUnknownVtbl,
}

interface! {
    /// Implemented by nobody.
    pub interface IMissing: IMissingVtbl = guid!("0f9e8d7c-6b5a-4938-2716-05f4e3d2c1b0");
}

pub trait ValueImpl {
    fn get(&self) -> i32;
    fn set(&self, value: i32) -> Result;
}

pub trait NamedImpl {
    fn name(&self) -> &str;
}

// Safety: The entries expect the slot of `IValue` of a `ComBox<T>`.
unsafe impl<T: Implementation + ValueImpl> VtableFor<T> for IValue {
    const VTABLE: IValueVtbl = {
        unsafe extern "system" fn get<T: Implementation + ValueImpl>(this: RawPtr) -> i32 {
            // Safety: Called through the table of the `IValue` slot.
            let this = unsafe { ComBox::<T>::from_slot::<IValue>(this) };
            this.get().get()
        }

        unsafe extern "system" fn set<T: Implementation + ValueImpl>(
            this: RawPtr,
            value: i32,
        ) -> HResult {
            // Safety: Called through the table of the `IValue` slot.
            let this = unsafe { ComBox::<T>::from_slot::<IValue>(this) };
            HResult::from_result(this.get().set(value))
        }

        IValueVtbl {
            base: IUnknownVtbl::new::<T, IValue>(),
            get: get::<T>,
            set: set::<T>,
        }
    };
}

// Safety: The entries expect the slot of `INamed` of a `ComBox<T>`.
unsafe impl<T: Implementation + NamedImpl> VtableFor<T> for INamed {
    const VTABLE: INamedVtbl = {
        unsafe extern "system" fn name<T: Implementation + NamedImpl>(
            this: RawPtr,
            ptr: *mut *const u8,
            len: *mut usize,
        ) {
            // Safety: Called through the table of the `INamed` slot, the out parameters are
            // writable.
            unsafe {
                let this = ComBox::<T>::from_slot::<INamed>(this);
                let name = this.get().name();
                ptr.write(name.as_ptr());
                len.write(name.len());
            }
        }

        INamedVtbl {
            base: IUnknownVtbl::new::<T, INamed>(),
            name: name::<T>,
        }
    };
}

/// Local object exposing [`IValue`] and [`INamed`].
#[derive(Debug)]
pub struct Counter {
    value: AtomicI32,
    name: String,
}

impl Counter {
    pub fn new(name: &str, value: i32) -> Self {
        Self {
            value: AtomicI32::new(value),
            name: name.to_owned(),
        }
    }
}

impl ValueImpl for Counter {
    fn get(&self) -> i32 {
        self.value.load(Ordering::SeqCst)
    }

    fn set(&self, value: i32) -> Result {
        if value < 0 {
            return Err(Error::new(HResult::E_INVALIDARG, "negative value"));
        }
        self.value.store(value, Ordering::SeqCst);
        Ok(())
    }
}

impl NamedImpl for Counter {
    fn name(&self) -> &str {
        &self.name
    }
}

implement!(Counter = guid!("5e6f7a8b-9c0d-4e1f-a2b3-c4d5e6f7a8b9"); IValue, INamed);

/// Local object exposing only [`IValue`].
#[derive(Debug)]
pub struct Constant(pub i32);

impl ValueImpl for Constant {
    fn get(&self) -> i32 {
        self.0
    }

    fn set(&self, _value: i32) -> Result {
        Err(HResult::E_ACCESSDENIED.into())
    }
}

implement!(Constant = guid!("c1d2e3f4-a5b6-4c7d-8e9f-0a1b2c3d4e5f"); IValue);

/// Observable state of a [`Foreign`] object, outliving the object.
#[derive(Debug, Default)]
pub struct Probe {
    count: AtomicU32,
    destroyed: AtomicBool,
    queries: AtomicU32,
}

impl Probe {
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }
}

/// Object written against the raw calling convention, exposing [`IValue`] through a single
/// table, like an object created by another binary would.
#[repr(C)]
pub struct Foreign {
    vtable: &'static IValueVtbl,
    value: AtomicI32,
    probe: Arc<Probe>,
}

impl Foreign {
    const VTABLE: IValueVtbl = IValueVtbl {
        base: IUnknownVtbl {
            query_interface: Self::query_interface,
            add_ref: Self::add_ref,
            release: Self::release,
        },
        get: Self::get,
        set: Self::set,
    };

    /// Creates a new object, returning its pointer carrying one reference.
    pub fn create(value: i32) -> (RawPtr, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        probe.count.store(1, Ordering::SeqCst);
        let this = Box::new(Self {
            vtable: &Self::VTABLE,
            value: AtomicI32::new(value),
            probe: probe.clone(),
        });
        (Box::into_raw(this).cast(), probe)
    }

    /// Creates a new object as an [`IValue`].
    pub fn new_value(value: i32) -> (IValue, Arc<Probe>) {
        let (raw, probe) = Self::create(value);
        // Safety: The object implements `IValue` and the pointer carries one reference.
        (unsafe { IValue::from_raw(raw) }, probe)
    }

    unsafe extern "system" fn query_interface(
        this: RawPtr,
        iid: *const Guid,
        out: *mut RawPtr,
    ) -> HResult {
        // Safety: Called through the table of a live object with valid parameters.
        unsafe {
            let object = &*this.cast::<Self>();
            object.probe.queries.fetch_add(1, Ordering::SeqCst);
            let iid = &*iid;
            if *iid == IUnknown::IID || *iid == IValue::IID {
                Self::add_ref(this);
                out.write(this);
                HResult::S_OK
            } else {
                out.write(std::ptr::null_mut());
                HResult::E_NOINTERFACE
            }
        }
    }

    unsafe extern "system" fn add_ref(this: RawPtr) -> u32 {
        // Safety: Called through the table of a live object.
        let object = unsafe { &*this.cast::<Self>() };
        object.probe.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    unsafe extern "system" fn release(this: RawPtr) -> u32 {
        // Safety: Called through the table of a live object.
        let object = unsafe { &*this.cast::<Self>() };
        let count = object.probe.count.fetch_sub(1, Ordering::SeqCst) - 1;
        if count == 0 {
            object.probe.destroyed.store(true, Ordering::SeqCst);
            // Safety: This was the last reference.
            drop(unsafe { Box::from_raw(this.cast::<Self>()) });
        }
        count
    }

    unsafe extern "system" fn get(this: RawPtr) -> i32 {
        // Safety: Called through the table of a live object.
        let object = unsafe { &*this.cast::<Self>() };
        object.value.load(Ordering::SeqCst)
    }

    unsafe extern "system" fn set(this: RawPtr, value: i32) -> HResult {
        // Safety: Called through the table of a live object.
        let object = unsafe { &*this.cast::<Self>() };
        object.value.store(value, Ordering::SeqCst);
        HResult::S_OK
    }
}

/// Foreign factory creating [`Foreign`] objects through an out parameter.
///
/// # Safety
///
/// `out` must be valid for writes.
pub unsafe extern "system" fn create_foreign(iid: &Guid, out: *mut *mut c_void) -> HResult {
    let (raw, _probe) = Foreign::create(0);
    // Safety: `raw` points to a live object and `out` is writable.
    unsafe {
        let hr = Foreign::query_interface(raw, iid, out);
        Foreign::release(raw);
        hr
    }
}

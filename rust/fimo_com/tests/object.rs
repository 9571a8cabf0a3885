mod common;

use common::{Constant, Counter, INamed, IValue};
use fimo_com::{
    abi::RawPtr, guid, implement, ComObject, Guid, HResult, IUnknown, Implementation, Interface,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[test]
fn interfaces_dispatch_to_the_value() {
    let object = ComObject::new(Counter::new("counter", 1));
    let value: IValue = object.to_interface();
    let named: INamed = object.to_interface();

    assert_eq!(value.get(), 1);
    value.set(10).unwrap();
    assert_eq!(value.get(), 10);
    assert_eq!(named.name(), "counter");

    let err = value.set(-1).unwrap_err();
    assert_eq!(err.code(), HResult::E_INVALIDARG);
    assert_eq!(value.get(), 10);

    let constant = ComObject::new(Constant(3));
    let value: IValue = constant.to_interface();
    assert_eq!(value.get(), 3);
    assert_eq!(value.set(4).unwrap_err().code(), HResult::E_ACCESSDENIED);
}

#[test]
fn class_id_query_returns_identity() {
    let object = ComObject::new(Counter::new("identity", 0));
    let value: IValue = object.to_interface();
    assert_eq!(Guid::of::<ComObject<Counter>>(), Counter::CLSID);

    let mut out: RawPtr = std::ptr::null_mut();
    // Safety: `out` is a valid local.
    let hr = unsafe { value.query(&Counter::CLSID, &mut out) };
    assert_eq!(hr, HResult::S_OK);
    assert_eq!(out, object.as_unknown().as_raw());
    assert_eq!(ComObject::strong_count(&object), 3);

    // Safety: `out` carries the reference acquired by the query.
    drop(unsafe { ComObject::<Counter>::from_raw(out) });
    assert_eq!(ComObject::strong_count(&object), 2);
}

#[test]
fn exposed_interfaces_are_ordered() {
    assert_eq!(
        Counter::INTERFACES,
        &[IUnknown::IID, IValue::IID, INamed::IID]
    );
    assert_eq!(Constant::INTERFACES, &[IUnknown::IID, IValue::IID]);
}

struct Tracked(Arc<AtomicBool>);

impl Drop for Tracked {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

implement!(Tracked = guid!("7a8b9c0d-1e2f-4a3b-8c4d-5e6f7a8b9c0d"));

#[test]
fn last_reference_destroys_the_value() {
    let dropped = Arc::new(AtomicBool::new(false));
    let object = ComObject::new(Tracked(dropped.clone()));
    let unknown = IUnknown::from(object.clone());
    let copy = unknown.clone();
    assert_eq!(ComObject::strong_count(&object), 3);

    drop(object);
    drop(unknown);
    assert!(!dropped.load(Ordering::SeqCst));

    let recovered = copy.cast::<ComObject<Tracked>>().unwrap();
    assert_eq!(ComObject::strong_count(&recovered), 2);
    drop(copy);
    drop(recovered);
    assert!(dropped.load(Ordering::SeqCst));
}

#[test]
fn values_are_shared_across_threads() {
    let object = ComObject::new(Counter::new("threads", 0));

    std::thread::scope(|s| {
        for i in 0..4 {
            let object = object.clone();
            s.spawn(move || {
                let value: IValue = object.to_interface();
                let named = value.cast::<INamed>().unwrap();
                assert_eq!(named.name(), "threads");
                value.set(i).unwrap();
            });
        }
    });

    assert_eq!(ComObject::strong_count(&object), 1);
}

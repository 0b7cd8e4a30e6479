//! Zombie mode: destroyed instances keep a poisoned header so stale
//! retains and releases are caught.
//!
//! Zombie mode is process-wide, so these tests live in their own binary.

use oxiobj::config::{set_zombies, zombies_enabled};
use oxiobj::runtime::{
    ClassDescriptor, InstanceLayout, InterfaceLayout, OBJECT, Object, ObjectInterface,
    release_raw, retain_raw,
};
use oxiobj::{Id, alloc, construct, object_type};
use std::mem::offset_of;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts how often it is dropped.
struct Probe(&'static AtomicUsize);

impl Drop for Probe {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[repr(C)]
#[allow(dead_code)]
struct Probed {
    object: Object,
    interface: Option<&'static ObjectInterface>,
    probe: Option<Box<Probe>>,
}

object_type! {
    Probed: Object [object],
    descriptor PROBED,
}

static PROBED: ClassDescriptor = ClassDescriptor::new(
    "ZombieProbed",
    Some(&OBJECT),
    InstanceLayout::of::<Probed>(),
    InterfaceLayout::of::<ObjectInterface>(offset_of!(Probed, interface)),
);

fn destroyed_object() -> std::ptr::NonNull<Object> {
    set_zombies(true);
    let ptr = Id::into_raw(alloc::<Object>().unwrap());
    // SAFETY: `ptr` carries the single reference from `into_raw`.
    unsafe { release_raw(ptr) };
    ptr
}

#[test]
#[should_panic(expected = "over-released")]
fn test_release_after_destroy_is_fatal() {
    let ptr = destroyed_object();
    // SAFETY: zombie mode keeps the block allocated.
    unsafe { release_raw(ptr) };
}

#[test]
#[should_panic(expected = "retained after it was destroyed")]
fn test_retain_after_destroy_is_fatal() {
    let ptr = destroyed_object();
    // SAFETY: zombie mode keeps the block allocated.
    unsafe { retain_raw(ptr) };
}

#[test]
fn test_zombie_runs_destructors_exactly_once() {
    static DROPS: AtomicUsize = AtomicUsize::new(0);
    set_zombies(true);
    assert!(zombies_enabled());

    let probed = construct::<Probed>(|this| {
        this.probe = Some(Box::new(Probe(&DROPS)));
        Ok(())
    })
    .unwrap();
    let ptr = Id::into_raw(probed);

    // SAFETY: `ptr` carries the single reference from `into_raw`.
    unsafe { release_raw(ptr) };
    assert_eq!(DROPS.load(Ordering::SeqCst), 1);

    let stale = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: zombie mode keeps the block allocated.
        unsafe { release_raw(ptr) };
    }));
    assert!(stale.is_err());
    assert_eq!(DROPS.load(Ordering::SeqCst), 1);
}

#[test]
fn test_balanced_release_destroys_once_then_detects_extra_release() {
    static DROPS: AtomicUsize = AtomicUsize::new(0);
    set_zombies(true);

    let probed = construct::<Probed>(|this| {
        this.probe = Some(Box::new(Probe(&DROPS)));
        Ok(())
    })
    .unwrap();
    let ptr = Id::into_raw(probed);
    // SAFETY: the block stays allocated for the whole test in zombie mode.
    let count = || unsafe { ptr.as_ref() }.object.retain_count();

    // SAFETY: `ptr` carries the reference from `into_raw`.
    unsafe { retain_raw(ptr) };
    assert_eq!(count(), 2);

    // SAFETY: two references are held, one per release.
    unsafe { release_raw(ptr) };
    assert_eq!(count(), 1);
    assert_eq!(DROPS.load(Ordering::SeqCst), 0);

    // SAFETY: the last reference.
    unsafe { release_raw(ptr) };
    assert_eq!(DROPS.load(Ordering::SeqCst), 1);

    let extra = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: zombie mode keeps the block allocated.
        unsafe { release_raw(ptr) };
    }));
    let payload = extra.unwrap_err();
    let message = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .unwrap_or_default();
    assert!(message.contains("over-released"));
    assert_eq!(DROPS.load(Ordering::SeqCst), 1);
}

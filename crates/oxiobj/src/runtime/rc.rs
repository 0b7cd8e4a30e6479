//! Atomic reference counting.
//!
//! [`Id<T>`] is the owning handle to a runtime instance: cloning it retains,
//! dropping it releases. The count lives in the hidden header and starts at
//! one when the instance is allocated. When the last release brings it to
//! zero, the destructor chain runs and the block is freed.
//!
//! # Thread Safety
//!
//! Retain uses a relaxed increment: a thread can only retain through a
//! reference it already holds, so no ordering is needed. Release uses a
//! release decrement, and the thread that reaches zero issues an acquire
//! fence before destroying, so every write made through other handles
//! happens-before the destructor.
//!
//! Releasing an instance whose count is already zero is a programming error
//! reported through [`fatal`]. Without zombie mode the block may already be
//! back in the allocator at that point, so detection is best effort; with
//! zombie mode (see [`config`](crate::config)) it is reliable.
//!
//! There is no cycle collection: instances that hold `Id`s to each other in
//! a cycle are never destroyed.

use crate::error::{Misuse, Result, fatal};
use crate::runtime::instance::{Liveness, deallocate, header_of};
use crate::runtime::object::{Object, ObjectType};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::{Ordering, fence};

/// Owning, reference-counted handle to an instance of `T`.
///
/// # Example
///
/// ```rust
/// use oxiobj::runtime::{Id, Object, alloc};
///
/// let obj = alloc::<Object>().unwrap();
/// assert_eq!(Id::retain_count(&obj), 1);
///
/// let other = obj.clone();
/// assert_eq!(Id::retain_count(&obj), 2);
/// assert!(Id::ptr_eq(&obj, &other));
///
/// drop(other);
/// assert_eq!(Id::retain_count(&obj), 1);
/// ```
#[repr(transparent)]
pub struct Id<T: ObjectType> {
    ptr: NonNull<T>,
    _owns: PhantomData<T>,
}

impl<T: ObjectType> Id<T> {
    /// Takes over one reference to `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must point at a live runtime instance whose class is `T` or a
    /// subclass, and the caller must own one reference that it transfers to
    /// the handle.
    #[must_use]
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        Id {
            ptr,
            _owns: PhantomData,
        }
    }

    /// Gives up the handle without releasing its reference.
    #[must_use]
    pub fn into_raw(this: Self) -> NonNull<T> {
        let ptr = this.ptr;
        std::mem::forget(this);
        ptr
    }

    /// The instance pointer; the reference stays with the handle.
    #[must_use]
    pub fn as_ptr(this: &Self) -> NonNull<T> {
        this.ptr
    }

    /// Current reference count.
    #[must_use]
    pub fn retain_count(this: &Self) -> usize {
        this.as_object().retain_count()
    }

    /// Mutable access when this handle is the only reference.
    #[must_use]
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        // SAFETY: the handle keeps the instance live.
        let header = unsafe { header_of(this.ptr.cast::<Object>()) };
        if header.refcount.load(Ordering::Acquire) == 1 {
            // SAFETY: a count of one means no other handle exists, and `this`
            // is borrowed mutably for the returned lifetime.
            Some(unsafe { &mut *this.ptr.as_ptr() })
        } else {
            None
        }
    }

    /// Whether two handles refer to the same instance.
    #[must_use]
    pub fn ptr_eq<U: ObjectType>(this: &Self, other: &Id<U>) -> bool {
        this.ptr.cast::<u8>() == other.ptr.cast::<u8>()
    }

    /// Converts into a handle to the root object.
    #[must_use]
    pub fn into_object(this: Self) -> Id<Object> {
        // SAFETY: every instance is an `Object`; the reference moves over.
        unsafe { Id::from_raw(Id::into_raw(this).cast::<Object>()) }
    }

    /// Retains the instance as `U` if its class is `U` or a subclass.
    ///
    /// # Errors
    ///
    /// [`Error::TypeMismatch`](crate::Error::TypeMismatch) otherwise; the
    /// count is unchanged in that case.
    pub fn cast<U: ObjectType>(this: &Self) -> Result<Id<U>> {
        let target = this.as_object().try_cast::<U>()?;
        // SAFETY: `this` keeps the instance live. Only shared borrows can
        // coexist with a live handle, so the new one aliases nothing mutable.
        Ok(unsafe { Id::from_raw(retain_raw(NonNull::from(target))) })
    }

    /// Converts the handle to `U` without touching the count, handing the
    /// original back when the class does not match.
    ///
    /// # Errors
    ///
    /// Returns `this` unchanged when `U` is not in the instance's ancestry.
    pub fn downcast<U: ObjectType>(this: Self) -> std::result::Result<Id<U>, Self> {
        if this.as_object().is::<U>() {
            // SAFETY: the class inherits from `U`; the reference moves over.
            Ok(unsafe { Id::from_raw(Id::into_raw(this).cast::<U>()) })
        } else {
            Err(this)
        }
    }
}

impl<T: ObjectType> Deref for Id<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the handle keeps the instance live.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ObjectType> Clone for Id<T> {
    fn clone(&self) -> Self {
        // SAFETY: the handle keeps the instance live.
        unsafe { Id::from_raw(retain_raw(self.ptr)) }
    }
}

impl<T: ObjectType> Drop for Id<T> {
    fn drop(&mut self) {
        // SAFETY: this handle owns one reference.
        unsafe { release_raw(self.ptr) };
    }
}

// SAFETY: the count is atomic and `T: Send + Sync` covers the shared
// instance, same as `Arc<T>`.
unsafe impl<T: ObjectType + Send + Sync> Send for Id<T> {}
unsafe impl<T: ObjectType + Send + Sync> Sync for Id<T> {}

impl<T: ObjectType> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_object().is_equal(other.as_object())
    }
}

impl<T: ObjectType> Eq for Id<T> {}

impl<T: ObjectType> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.as_object().hash_code());
    }
}

impl<T: ObjectType> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Id")
            .field("class", &self.as_object().class().name())
            .field("retain_count", &Id::retain_count(self))
            .finish()
    }
}

impl<T: ObjectType> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_object().description())
    }
}

/// Takes a new reference to the instance behind `obj`. Same as cloning it.
///
/// A new handle can only come from an existing one. A plain `&T` may be a
/// reborrow of the exclusive access handed out by
/// [`construct`](crate::runtime::construct) or [`Id::get_mut`], so it is
/// not accepted:
///
/// ```compile_fail
/// use oxiobj::runtime::{Object, construct, retain};
///
/// let _ = construct::<Object>(|this| {
///     let alias = retain(&*this);
///     drop(alias);
///     Ok(())
/// });
/// ```
#[must_use]
pub fn retain<T: ObjectType>(obj: &Id<T>) -> Id<T> {
    Id::clone(obj)
}

/// Gives up a reference. Same as dropping the handle.
pub fn release<T: ObjectType>(obj: Id<T>) {
    drop(obj);
}

/// Increments the count of the instance at `ptr` and returns `ptr`.
///
/// # Safety
///
/// `ptr` must point at a runtime instance that is live, or a zombie.
///
/// # Panics
///
/// Through [`fatal`] when the instance was already destroyed or the count
/// would overflow.
pub unsafe fn retain_raw<T: ObjectType>(ptr: NonNull<T>) -> NonNull<T> {
    let object = ptr.cast::<Object>();
    // SAFETY: upheld by the caller.
    let header = unsafe { header_of(object) };
    let liveness = header.liveness(object);
    let class = header.class.name();

    if liveness == Liveness::Zombie {
        fatal(Misuse::RetainAfterRelease { class });
    }

    let old = header.refcount.fetch_add(1, Ordering::Relaxed);
    if old <= 0 {
        fatal(Misuse::RetainAfterRelease { class });
    }
    if old == isize::MAX {
        fatal(Misuse::RefCountOverflow { class });
    }
    ptr
}

/// Decrements the count of the instance at `ptr`, destroying it when the
/// count reaches zero.
///
/// # Safety
///
/// The caller must own a reference to the instance and must not use `ptr`
/// afterwards unless it holds another reference.
///
/// # Panics
///
/// Through [`fatal`] when the count was already zero (over-release) or the
/// header is corrupt.
pub unsafe fn release_raw<T: ObjectType>(ptr: NonNull<T>) {
    let object = ptr.cast::<Object>();
    // SAFETY: upheld by the caller.
    let header = unsafe { header_of(object) };
    let liveness = header.liveness(object);
    let class = header.class.name();

    if liveness == Liveness::Zombie {
        fatal(Misuse::OverRelease { class });
    }

    let old = header.refcount.fetch_sub(1, Ordering::Release);
    if old == 1 {
        fence(Ordering::Acquire);
        // SAFETY: the count reached zero, so this was the last reference.
        unsafe { deallocate(object) };
    } else if old <= 0 {
        fatal(Misuse::OverRelease { class });
    }
}

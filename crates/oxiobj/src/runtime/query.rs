//! Type queries over live instances.
//!
//! Membership is decided by descriptor identity along the instance's
//! ancestry chain, never by name, so two classes that happen to share a name
//! are still told apart. A failed cast is an ordinary [`Error::TypeMismatch`](crate::Error::TypeMismatch)
//! value.

use crate::error::Result;
use crate::runtime::class::ClassDescriptor;
use crate::runtime::object::ObjectType;

/// Whether `obj` is an instance of the class `descriptor` describes or of a
/// subclass. Dispatches through the `is_kind_of` slot, so classes may
/// override the answer.
#[must_use]
pub fn is_kind_of<T: ObjectType>(obj: &T, descriptor: &'static ClassDescriptor) -> bool {
    obj.as_object().is_kind_of(descriptor)
}

/// Views `obj` as `U` when `U` is its class or an ancestor of it.
///
/// Unlike [`is_kind_of`] this always walks the real ancestry: a cast is only
/// sound when the memory layout really begins with a `U`.
///
/// # Errors
///
/// [`Error::TypeMismatch`](crate::Error::TypeMismatch) naming both classes when `U` is not an ancestor.
pub fn cast<T: ObjectType, U: ObjectType>(obj: &T) -> Result<&U> {
    obj.as_object().try_cast::<U>()
}

/// Mutable variant of [`cast`].
///
/// # Errors
///
/// [`Error::TypeMismatch`](crate::Error::TypeMismatch) naming both classes when `U` is not an ancestor.
pub fn cast_mut<T: ObjectType, U: ObjectType>(obj: &mut T) -> Result<&mut U> {
    obj.as_object_mut().try_cast_mut::<U>()
}

/// Like [`cast`] but reports a mismatch as `None`.
#[must_use]
pub fn downcast_ref<T: ObjectType, U: ObjectType>(obj: &T) -> Option<&U> {
    cast::<T, U>(obj).ok()
}

//! The root object type and the contract every class type implements.
//!
//! # Architecture
//!
//! Every class is a `#[repr(C)]` struct whose first field is its superclass
//! struct, ending in [`Object`]. A class's interface struct mirrors that
//! shape, ending in [`ObjectInterface`]. Because of this prefix layout a
//! pointer to any instance is also a valid pointer to each of its ancestors,
//! and a table pointer for a class is also a valid table pointer for each
//! ancestor.
//!
//! Instances are only ever created by the allocator in
//! [`instance`](crate::runtime::instance), which zero-fills them, writes the
//! hidden header and stores the class's table pointer at every ancestor's
//! interface offset.
//!
//! # Root behavior
//!
//! | Slot          | Default                                               |
//! |---------------|-------------------------------------------------------|
//! | `copy`        | new instance of the same class, run through `init`    |
//! | `dealloc`     | nothing (end of the destructor chain)                 |
//! | `equals`      | identity                                              |
//! | `hash`        | hash of the instance address                          |
//! | `is_kind_of`  | ancestry walk by descriptor identity                  |
//! | `init`        | succeeds without touching the instance                |
//! | `description` | `<ClassName@0xADDR>`                                  |

use crate::error::{Error, Result};
use crate::runtime::class::{Class, ClassDescriptor, InstanceLayout, InterfaceLayout};
use crate::runtime::instance::{self, header_of};
use crate::runtime::interface::{Interface, InterfaceBuilder};
use crate::runtime::rc::Id;
use std::hash::Hasher;
use std::mem::offset_of;
use std::ptr::NonNull;

/// A type whose instances are managed by the runtime.
///
/// Implement it with [`object_type!`](crate::object_type), never by hand.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with the `Super` struct as the first
/// field, `Interface` must extend `Super::Interface` the same way, and
/// `descriptor()` must return the descriptor whose superclass is
/// `Super::descriptor()` and whose layouts were built from `Self` and
/// `Self::Interface`. Every field must be valid when all of its bytes are
/// zero (`Option<Box<_>>`, `Option<Id<_>>`, integers, atomics; not
/// `Option<String>` or `Option<Vec<_>>`), since instances start zero-filled.
/// The field at the interface offset must be an
/// `Option<&'static Self::Interface>`.
pub unsafe trait ObjectType: Sized + 'static {
    /// The superclass type. The root uses itself.
    type Super: ObjectType;

    /// The dispatch table type of this class.
    type Interface: Interface;

    /// The class descriptor.
    fn descriptor() -> &'static ClassDescriptor;

    /// Dispatch table of this instance's dynamic class, viewed as
    /// `Self::Interface`.
    ///
    /// Reads the class from the hidden header, so it always resolves to the
    /// most derived overrides.
    fn interface(&self) -> &'static Self::Interface {
        let class = self.as_object().class();
        // SAFETY: an instance of `Self` has a dynamic class at or below
        // `Self`, whose table starts with `Self::Interface`.
        unsafe { class.interface_unchecked::<Self::Interface>() }
    }

    /// This instance viewed as the root object.
    fn as_object(&self) -> &Object {
        // SAFETY: `Object` is the first field at every level of the
        // `#[repr(C)]` prefix chain.
        unsafe { &*(self as *const Self).cast::<Object>() }
    }

    /// This instance viewed as the root object, mutably.
    fn as_object_mut(&mut self) -> &mut Object {
        // SAFETY: as in `as_object`.
        unsafe { &mut *(self as *mut Self).cast::<Object>() }
    }
}

/// The root of every class hierarchy.
///
/// Holds the per-instance table pointer for the root level. User code only
/// ever sees `Object` behind a reference or an [`Id`].
#[repr(C)]
pub struct Object {
    // Written by the allocator through its byte offset.
    #[allow(dead_code)]
    interface: Option<&'static ObjectInterface>,
}

/// Dispatch table of [`Object`], the first field of every interface.
#[repr(C)]
pub struct ObjectInterface {
    /// Creates a new, independently owned instance of the same class.
    pub copy: Option<fn(&Object) -> Result<Id<Object>>>,
    /// Instance destructor. Overrides must finish with
    /// `send_super!(Type, this, dealloc)` so every level runs, most derived
    /// first.
    pub dealloc: Option<fn(&mut Object)>,
    /// Value equality. Must agree with `hash`.
    pub equals: Option<fn(&Object, &Object) -> bool>,
    /// Hash consistent with `equals`.
    pub hash: Option<fn(&Object) -> u64>,
    /// Whether the instance is of the described class or a subclass.
    pub is_kind_of: Option<fn(&Object, &'static ClassDescriptor) -> bool>,
    /// Default no-argument constructor.
    pub init: Option<fn(&mut Object) -> Result<()>>,
    /// Human-readable rendering.
    pub description: Option<fn(&Object) -> String>,
}

unsafe impl ObjectType for Object {
    type Super = Object;
    type Interface = ObjectInterface;

    fn descriptor() -> &'static ClassDescriptor {
        &OBJECT
    }
}

// SAFETY: `ObjectInterface` is a `#[repr(C)]` struct of `Option<fn>` slots.
unsafe impl Interface for ObjectInterface {}

/// Descriptor of the root class.
pub static OBJECT: ClassDescriptor = ClassDescriptor::new(
    "Object",
    None,
    InstanceLayout::of::<Object>(),
    InterfaceLayout::of::<ObjectInterface>(offset_of!(Object, interface)),
)
.with_initialize(initialize);

fn initialize(builder: &mut InterfaceBuilder<'_>) {
    let object = builder.interface::<Object>();
    object.copy = Some(copy);
    object.dealloc = Some(dealloc);
    object.equals = Some(equals);
    object.hash = Some(hash);
    object.is_kind_of = Some(is_kind_of);
    object.init = Some(init);
    object.description = Some(description);
}

fn copy(this: &Object) -> Result<Id<Object>> {
    instance::construct_class(this.class().descriptor(), |fresh| {
        crate::send_mut!(fresh, init)
    })
}

fn dealloc(_this: &mut Object) {}

fn equals(this: &Object, other: &Object) -> bool {
    std::ptr::eq(this, other)
}

fn hash(this: &Object) -> u64 {
    let mut hasher = fxhash::FxHasher64::default();
    hasher.write_usize(this as *const Object as usize);
    hasher.finish()
}

fn is_kind_of(this: &Object, descriptor: &'static ClassDescriptor) -> bool {
    this.class().inherits_from(descriptor)
}

fn init(_this: &mut Object) -> Result<()> {
    Ok(())
}

fn description(this: &Object) -> String {
    format!("<{}@{:p}>", this.class().name(), this)
}

impl Object {
    /// The dynamic class of this instance, read from the hidden header.
    #[must_use]
    pub fn class(&self) -> Class {
        // SAFETY: `self` is a live runtime instance.
        unsafe { header_of(NonNull::from(self)) }.class
    }

    /// Current reference count.
    #[must_use]
    pub fn retain_count(&self) -> usize {
        // SAFETY: `self` is a live runtime instance.
        let count = unsafe { header_of(NonNull::from(self)) }.refcount();
        usize::try_from(count).unwrap_or(0)
    }

    /// Whether this instance is of the class `descriptor` describes or a
    /// subclass of it. Dispatches through the `is_kind_of` slot.
    #[must_use]
    pub fn is_kind_of(&self, descriptor: &'static ClassDescriptor) -> bool {
        crate::send!(self, is_kind_of, descriptor)
    }

    /// Whether this instance is of class `T` or a subclass of it.
    #[must_use]
    pub fn is<T: ObjectType>(&self) -> bool {
        self.is_kind_of(T::descriptor())
    }

    /// Value equality through the `equals` slot.
    #[must_use]
    pub fn is_equal(&self, other: &Object) -> bool {
        crate::send!(self, equals, other)
    }

    /// Hash through the `hash` slot.
    #[must_use]
    pub fn hash_code(&self) -> u64 {
        crate::send!(self, hash)
    }

    /// Rendering through the `description` slot.
    #[must_use]
    pub fn description(&self) -> String {
        crate::send!(self, description)
    }

    /// A new instance of the same class, through the `copy` slot.
    ///
    /// # Errors
    ///
    /// Whatever the class's `copy` implementation reports, typically
    /// [`Error::OutOfMemory`] or [`Error::ConstructionFailed`].
    pub fn copy(&self) -> Result<Id<Object>> {
        crate::send!(self, copy)
    }

    /// Views this instance as `T` if its class is `T` or a subclass.
    ///
    /// # Errors
    ///
    /// [`Error::TypeMismatch`] when `T` is not in the instance's ancestry.
    pub fn try_cast<T: ObjectType>(&self) -> Result<&T> {
        self.check_kind::<T>()?;
        // SAFETY: the instance's dynamic class inherits from `T`, so its
        // memory begins with a `T`.
        Ok(unsafe { &*(self as *const Object).cast::<T>() })
    }

    /// Mutable variant of [`Object::try_cast`].
    ///
    /// # Errors
    ///
    /// [`Error::TypeMismatch`] when `T` is not in the instance's ancestry.
    pub fn try_cast_mut<T: ObjectType>(&mut self) -> Result<&mut T> {
        self.check_kind::<T>()?;
        // SAFETY: as in `try_cast`.
        Ok(unsafe { &mut *(self as *mut Object).cast::<T>() })
    }

    fn check_kind<T: ObjectType>(&self) -> Result<()> {
        let class = self.class();
        if class.inherits_from(T::descriptor()) {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                expected: T::descriptor().name(),
                found: class.name(),
            })
        }
    }
}

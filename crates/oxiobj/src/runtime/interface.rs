//! Interface (dispatch table) composition.
//!
//! An interface is a `#[repr(C)]` struct of `Option<fn(..)>` slots whose first
//! field is the parent class's interface. A class's composed table therefore
//! starts with a complete copy of every ancestor's table, and a slot keeps the
//! same offset all the way down the hierarchy.
//!
//! Composition happens once per class, inside
//! [`ClassDescriptor::ensure_initialized`]: the superclass table is copied
//! byte for byte into a zeroed buffer, then the class's initialize hook
//! receives an [`InterfaceBuilder`] and overwrites or adds the slots it
//! implements.

use crate::error::{Misuse, fatal};
use crate::runtime::class::{Class, ClassDescriptor};
use crate::runtime::object::ObjectType;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Marker for dispatch table structs.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]`, consist only of pointer-sized
/// `Option<fn(..)>` slots, and place the parent interface as the first field
/// (the root interface has no parent field). The all-zero bit pattern must be
/// valid, which `Option<fn>` guarantees.
pub unsafe trait Interface: Sized + 'static {}

/// Write access to the table of the class being initialized.
///
/// Only ever handed to an initialize hook. Reads of the table return the
/// slots inherited from the superclass until the hook overwrites them.
pub struct InterfaceBuilder<'a> {
    descriptor: &'static ClassDescriptor,
    superclass: Option<Class>,
    table: NonNull<u8>,
    _table: PhantomData<&'a mut [u8]>,
}

impl<'a> InterfaceBuilder<'a> {
    pub(crate) fn new(
        descriptor: &'static ClassDescriptor,
        superclass: Option<Class>,
        table: NonNull<u8>,
    ) -> Self {
        InterfaceBuilder {
            descriptor,
            superclass,
            table,
            _table: PhantomData,
        }
    }

    /// Name of the class being initialized.
    #[must_use]
    pub fn class_name(&self) -> &'static str {
        self.descriptor.name()
    }

    /// Descriptor of the class being initialized.
    #[must_use]
    pub fn descriptor(&self) -> &'static ClassDescriptor {
        self.descriptor
    }

    /// The already-ready superclass, `None` for a root class.
    #[must_use]
    pub fn superclass(&self) -> Option<Class> {
        self.superclass
    }

    /// Returns the table viewed as the interface of `T`.
    ///
    /// `T` is normally the class being initialized; any ancestor is accepted
    /// too, which gives access to just the inherited prefix.
    ///
    /// # Panics
    ///
    /// Through [`fatal`] when `T` is neither the class being initialized nor
    /// one of its ancestors, or when `T::Interface` is larger than the table.
    pub fn interface<T: ObjectType>(&mut self) -> &mut T::Interface {
        if !self.descriptor.inherits_from(T::descriptor()) {
            fatal(Misuse::ForeignInterface {
                class: self.descriptor.name(),
                requested: T::descriptor().name(),
            });
        }
        if std::mem::size_of::<T::Interface>() > self.descriptor.interface_layout().size() {
            fatal(Misuse::MalformedClass {
                class: self.descriptor.name(),
                reason: format!(
                    "interface of `{}` does not fit in the declared table",
                    T::descriptor().name()
                ),
            });
        }

        // SAFETY: the table is exclusively ours until the class is published,
        // sized for the class's interface (checked above) and aligned for it.
        // Every interface starts with its ancestors', so the prefix is valid as
        // `T::Interface`.
        unsafe { &mut *self.table.as_ptr().cast::<T::Interface>() }
    }
}

/// Index of the first null pointer-sized slot among the first `slots` words
/// of `table`, if any.
pub(crate) fn first_unbound_slot(table: NonNull<u8>, slots: usize) -> Option<usize> {
    let words = table.as_ptr().cast::<*const ()>();
    // SAFETY: the table holds `slots` pointer-aligned words.
    (0..slots).find(|&slot| unsafe { words.add(slot).read() }.is_null())
}

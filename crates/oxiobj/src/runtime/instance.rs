//! Instance allocation, construction and destruction.
//!
//! # Memory layout
//!
//! Each instance is one block from the system allocator:
//!
//! ```text
//! block start                       instance pointer (what callers see)
//! |                                 |
//! v                                 v
//! +-------------+-------------------+---------------------------------+
//! | padding     | Header            | instance struct (zero-filled)   |
//! |             | magic | rc | class| Object | ... | subclass fields  |
//! +-------------+-------------------+---------------------------------+
//! ```
//!
//! The header sits immediately before the instance. The block is aligned to
//! the larger of the header's and the instance's alignment, and the padding
//! keeps the instance on that alignment.
//!
//! # Destruction
//!
//! When the count reaches zero the `dealloc` slot of the dynamic class runs.
//! Overrides chain upward with `send_super!`, so cleanup runs from the most
//! derived class to the root. Rust drop glue for the instance fields runs
//! next, then the block is returned to the allocator, or kept as a zombie when
//! zombie mode is on.

use crate::config::zombies_enabled;
use crate::error::{Error, Misuse, Result, fatal};
use crate::runtime::class::{Class, ClassDescriptor};
use crate::runtime::object::{Object, ObjectType};
use crate::runtime::rc::Id;
use oxiobj_log::{debug, trace, warn};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicIsize, AtomicU32, Ordering};

/// Marker of a live instance.
pub(crate) const LIVE: u32 = 0x4f42_4a21;
/// Marker of a destroyed instance kept in zombie mode.
pub(crate) const ZOMBIE: u32 = 0x5a4f_4d42;

/// Hidden per-instance header.
#[repr(C)]
pub(crate) struct Header {
    pub(crate) magic: AtomicU32,
    pub(crate) refcount: AtomicIsize,
    pub(crate) class: Class,
}

/// What the marker says about an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Liveness {
    Live,
    Zombie,
}

impl Header {
    pub(crate) fn refcount(&self) -> isize {
        self.refcount.load(Ordering::Relaxed)
    }

    /// Reads the marker; anything unknown is reported as a corrupt header.
    pub(crate) fn liveness(&self, instance: NonNull<Object>) -> Liveness {
        match self.magic.load(Ordering::Acquire) {
            LIVE => Liveness::Live,
            ZOMBIE => Liveness::Zombie,
            magic => fatal(Misuse::CorruptHeader {
                addr: instance.as_ptr() as usize,
                magic,
            }),
        }
    }
}

/// Returns the header in front of `instance`.
///
/// # Safety
///
/// `instance` must point at an instance produced by this module whose block
/// has not been returned to the allocator.
pub(crate) unsafe fn header_of<'a>(instance: NonNull<Object>) -> &'a Header {
    // SAFETY: the header occupies the bytes right before the instance.
    unsafe {
        &*instance
            .as_ptr()
            .cast::<u8>()
            .sub(std::mem::size_of::<Header>())
            .cast::<Header>()
    }
}

/// Allocates a zero-filled instance of `class` with a count of one and the
/// class's table pointer stored at every ancestor's interface offset.
fn allocate(class: Class) -> Result<NonNull<Object>> {
    let layout = class.block_layout();

    // SAFETY: the layout always has a non-zero size (header plus instance).
    let block = unsafe { std::alloc::alloc_zeroed(layout) };
    let Some(block) = NonNull::new(block) else {
        return Err(Error::OutOfMemory {
            class: class.name(),
            size: layout.size(),
        });
    };

    let table = class.interface_ptr().as_ptr().cast_const();

    // SAFETY: the block is `header_offset + instance_size` bytes; the header
    // ends exactly at `header_offset` and every interface offset was checked
    // to leave room for a pointer inside the instance.
    unsafe {
        let instance = block.as_ptr().add(class.header_offset());
        instance
            .sub(std::mem::size_of::<Header>())
            .cast::<Header>()
            .write(Header {
                magic: AtomicU32::new(LIVE),
                refcount: AtomicIsize::new(1),
                class,
            });

        for ancestor in class.ancestors() {
            let offset = ancestor.descriptor().interface_layout().offset();
            instance.add(offset).cast::<*const u8>().write(table);
        }

        trace!("allocated <{}@{:p}>", class.name(), instance);
        Ok(NonNull::new_unchecked(instance.cast::<Object>()))
    }
}

/// Destroys an instance whose count just reached zero.
///
/// # Safety
///
/// `instance` must be live with a count of zero and no remaining references.
pub(crate) unsafe fn deallocate(instance: NonNull<Object>) {
    // SAFETY: live per the caller's contract.
    let header = unsafe { header_of(instance) };
    let class = header.class;
    trace!("deallocating <{}@{:p}>", class.name(), instance);

    // SAFETY: nothing else references the instance any more.
    let this = unsafe { &mut *instance.as_ptr() };
    crate::send_mut!(this, dealloc);

    // SAFETY: the dynamic class's layout describes the whole instance, and
    // its fields are not touched again.
    unsafe { (class.descriptor().instance_layout().drop_glue())(instance.as_ptr().cast()) };

    if zombies_enabled() {
        header.magic.store(ZOMBIE, Ordering::Release);
        warn!("<{}@{:p}> kept as zombie", class.name(), instance);
        return;
    }

    // SAFETY: the block was allocated in `allocate` with this layout.
    unsafe {
        let block = instance.as_ptr().cast::<u8>().sub(class.header_offset());
        std::alloc::dealloc(block, class.block_layout());
    }
}

/// Allocates a zero-filled instance of `T` with a count of one.
///
/// No constructor runs; fields hold their all-zero values.
///
/// # Errors
///
/// [`Error::OutOfMemory`] when the system allocator fails.
pub fn alloc<T: ObjectType>() -> Result<Id<T>> {
    let class = T::descriptor().ensure_initialized();
    let instance = allocate(class)?;
    // SAFETY: a fresh instance of `T`'s class; we own its single reference.
    Ok(unsafe { Id::from_raw(instance.cast::<T>()) })
}

/// Allocates a zero-filled instance of the class `descriptor` describes,
/// typed as the root object.
///
/// # Errors
///
/// [`Error::OutOfMemory`] when the system allocator fails.
pub fn alloc_class(descriptor: &'static ClassDescriptor) -> Result<Id<Object>> {
    let instance = allocate(descriptor.ensure_initialized())?;
    // SAFETY: a fresh instance; we own its single reference.
    Ok(unsafe { Id::from_raw(instance) })
}

/// Allocates an instance of `T` and runs `init` on it.
///
/// `init` is the constructor chain: it usually calls the superclass
/// constructor through `send_super!` first and then sets its own fields. If
/// it fails, the half-built instance is released exactly once (running the
/// destructor chain) and the error is returned.
///
/// # Errors
///
/// [`Error::OutOfMemory`] from allocation, or whatever `init` returns.
pub fn construct<T: ObjectType>(init: impl FnOnce(&mut T) -> Result<()>) -> Result<Id<T>> {
    finish(alloc::<T>()?, init)
}

/// Untyped variant of [`construct`] for a class known only by descriptor.
///
/// # Errors
///
/// [`Error::OutOfMemory`] from allocation, or whatever `init` returns.
pub fn construct_class(
    descriptor: &'static ClassDescriptor,
    init: impl FnOnce(&mut Object) -> Result<()>,
) -> Result<Id<Object>> {
    finish(alloc_class(descriptor)?, init)
}

fn finish<T: ObjectType>(
    mut instance: Id<T>,
    init: impl FnOnce(&mut T) -> Result<()>,
) -> Result<Id<T>> {
    let class = instance.as_object().class();
    let outcome = match Id::get_mut(&mut instance) {
        Some(this) => init(this),
        None => Err(Error::construction(
            class.name(),
            "instance was shared before construction finished",
        )),
    };

    match outcome {
        Ok(()) => Ok(instance),
        Err(error) => {
            debug!("construction of `{}` failed: {error}", class.name());
            drop(instance);
            Err(error)
        }
    }
}

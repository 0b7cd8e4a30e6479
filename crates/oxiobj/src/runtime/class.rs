//! Class descriptors and their lazily built runtime records.
//!
//! A [`ClassDescriptor`] is the immutable, author-supplied description of a
//! class, declared as a `static`. The first time anything needs the class, the
//! descriptor is turned into a runtime record (exposed through the [`Class`]
//! handle) holding the composed dispatch table.
//!
//! # Initialization protocol
//!
//! Each descriptor carries an atomic readiness state:
//!
//! ```text
//! UNINITIALIZED --CAS--> INITIALIZING --store(Release)--> READY
//!                              |
//!                              +--(hook panicked)--> POISONED
//! ```
//!
//! The thread that wins the compare-and-swap initializes the superclass
//! first, composes the table, runs the initialize hook and publishes the
//! record with a release store. Every other thread spins with acquire loads
//! until it observes READY, so all writes to the table happen-before any use of
//! it. The same thread observing INITIALIZING again means initialization
//! re-entered itself, which is reported through [`fatal`].
//!
//! Records and tables live in the global arena and are never freed.

use crate::error::{Misuse, fatal};
use crate::runtime::instance::Header;
use crate::runtime::interface::{InterfaceBuilder, first_unbound_slot};
use crate::runtime::object::ObjectType;
use crate::runtime::registry;
use oxiobj_log::debug;
use oxiobj_mem::global_arena;
use std::alloc::Layout;
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU8, AtomicU64, Ordering};

const UNINITIALIZED: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;
const POISONED: u8 = 3;

/// Spins before the waiting thread starts yielding its time slice.
const SPIN_LIMIT: u32 = 64;

/// Size, alignment and field drop glue of a class's instance struct.
#[derive(Clone, Copy)]
pub struct InstanceLayout {
    size: usize,
    align: usize,
    drop_fields: unsafe fn(*mut u8),
}

unsafe fn drop_fields<T>(instance: *mut u8) {
    // SAFETY: the caller passes the start of a live, fully zero-initialized or
    // constructed `T` that is never used again.
    unsafe { ptr::drop_in_place(instance.cast::<T>()) }
}

impl InstanceLayout {
    /// Layout of the instance struct `T` (superclass fields included).
    #[must_use]
    pub const fn of<T>() -> Self {
        InstanceLayout {
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            drop_fields: drop_fields::<T>,
        }
    }

    /// Instance size in bytes, excluding the hidden header.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Required alignment of the instance.
    #[must_use]
    pub const fn align(&self) -> usize {
        self.align
    }

    pub(crate) fn drop_glue(&self) -> unsafe fn(*mut u8) {
        self.drop_fields
    }
}

impl fmt::Debug for InstanceLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceLayout")
            .field("size", &self.size)
            .field("align", &self.align)
            .finish()
    }
}

/// Where the per-instance table pointer lives and how large the table is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceLayout {
    offset: usize,
    size: usize,
    align: usize,
}

impl InterfaceLayout {
    /// Layout for the interface struct `I`, whose pointer is stored at byte
    /// `offset` of the instance (usually `offset_of!(MyType, interface)`).
    #[must_use]
    pub const fn of<I>(offset: usize) -> Self {
        InterfaceLayout {
            offset,
            size: std::mem::size_of::<I>(),
            align: std::mem::align_of::<I>(),
        }
    }

    /// Byte offset of the table pointer field inside the instance.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Size of the dispatch table in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Number of pointer-sized slots in the table.
    #[must_use]
    pub const fn slots(&self) -> usize {
        self.size / std::mem::size_of::<usize>()
    }
}

/// Immutable class metadata, declared once per class as a `static`.
///
/// # Example
///
/// ```rust
/// use oxiobj::runtime::{ClassDescriptor, InstanceLayout, InterfaceLayout, Object, ObjectInterface, OBJECT};
/// use std::mem::offset_of;
///
/// #[repr(C)]
/// pub struct Counter {
///     object: Object,
///     interface: Option<&'static CounterInterface>,
/// }
///
/// #[repr(C)]
/// pub struct CounterInterface {
///     object: ObjectInterface,
/// }
///
/// static COUNTER: ClassDescriptor = ClassDescriptor::new(
///     "DocCounter",
///     Some(&OBJECT),
///     InstanceLayout::of::<Counter>(),
///     InterfaceLayout::of::<CounterInterface>(offset_of!(Counter, interface)),
/// );
///
/// let class = COUNTER.ensure_initialized();
/// assert_eq!(class.name(), "DocCounter");
/// assert_eq!(class.superclass().unwrap().name(), "Object");
/// ```
pub struct ClassDescriptor {
    name: &'static str,
    superclass: Option<&'static ClassDescriptor>,
    instance: InstanceLayout,
    interface: InterfaceLayout,
    initialize: Option<fn(&mut InterfaceBuilder<'_>)>,
    destroy: Option<fn(Class)>,
    state: AtomicU8,
    owner: AtomicU64,
    record: AtomicPtr<ClassInner>,
}

impl ClassDescriptor {
    /// Describes a class. `superclass` is `None` only for a root class.
    #[must_use]
    pub const fn new(
        name: &'static str,
        superclass: Option<&'static ClassDescriptor>,
        instance: InstanceLayout,
        interface: InterfaceLayout,
    ) -> Self {
        ClassDescriptor {
            name,
            superclass,
            instance,
            interface,
            initialize: None,
            destroy: None,
            state: AtomicU8::new(UNINITIALIZED),
            owner: AtomicU64::new(0),
            record: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Sets the hook that binds this class's slots. It runs exactly once,
    /// after the superclass table has been copied in.
    #[must_use]
    pub const fn with_initialize(mut self, hook: fn(&mut InterfaceBuilder<'_>)) -> Self {
        self.initialize = Some(hook);
        self
    }

    /// Sets the class-level cleanup hook run by [`registry::shutdown`].
    #[must_use]
    pub const fn with_destroy(mut self, hook: fn(Class)) -> Self {
        self.destroy = Some(hook);
        self
    }

    /// The class name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The superclass descriptor, `None` for a root class.
    #[must_use]
    pub const fn superclass(&self) -> Option<&'static ClassDescriptor> {
        self.superclass
    }

    /// Instance layout of this class.
    #[must_use]
    pub const fn instance_layout(&self) -> InstanceLayout {
        self.instance
    }

    /// Interface layout of this class.
    #[must_use]
    pub const fn interface_layout(&self) -> InterfaceLayout {
        self.interface
    }

    pub(crate) fn destroy_hook(&self) -> Option<fn(Class)> {
        self.destroy
    }

    /// Returns whether the class has finished initializing.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    /// Returns the runtime record if the class is already initialized,
    /// without triggering initialization.
    #[must_use]
    pub fn class(&self) -> Option<Class> {
        if self.state.load(Ordering::Acquire) != READY {
            return None;
        }
        NonNull::new(self.record.load(Ordering::Acquire)).map(|inner| Class { inner })
    }

    /// Returns whether `ancestor` is this descriptor or one of its
    /// superclasses. Walks descriptors only; nothing is initialized.
    #[must_use]
    pub fn inherits_from(&self, ancestor: &ClassDescriptor) -> bool {
        let mut current = Some(self);
        while let Some(descriptor) = current {
            if ptr::eq(descriptor, ancestor) {
                return true;
            }
            current = descriptor.superclass;
        }
        false
    }

    /// Initializes the class (and transitively its superclasses) if needed
    /// and returns its runtime record.
    ///
    /// Safe to call concurrently from any number of threads: exactly one of
    /// them runs the initialize hook, the others wait until the record is
    /// ready.
    ///
    /// # Panics
    ///
    /// Through [`fatal`] when initialization re-enters itself on the same
    /// thread, when the descriptor is malformed, when a slot is left unbound,
    /// or when an earlier initialization attempt panicked.
    pub fn ensure_initialized(&'static self) -> Class {
        match self.class() {
            Some(class) => class,
            None => self.initialize_slow(),
        }
    }

    #[cold]
    fn initialize_slow(&'static self) -> Class {
        let token = thread_token();
        let mut spins = 0u32;

        loop {
            match self.state.compare_exchange(
                UNINITIALIZED,
                INITIALIZING,
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.owner.store(token, Ordering::Relaxed);
                    return self.compose();
                }
                Err(READY) => {
                    if let Some(class) = self.class() {
                        return class;
                    }
                }
                Err(INITIALIZING) => {
                    if self.owner.load(Ordering::Relaxed) == token {
                        fatal(Misuse::ReentrantInitialization { class: self.name });
                    }
                    if spins < SPIN_LIMIT {
                        spins += 1;
                        std::hint::spin_loop();
                    } else {
                        std::thread::yield_now();
                    }
                }
                Err(_) => fatal(Misuse::PoisonedClass { class: self.name }),
            }
        }
    }

    /// Builds the record. Only the thread that moved the state to
    /// INITIALIZING gets here.
    fn compose(&'static self) -> Class {
        let poison = PoisonOnUnwind(self);
        debug!("initializing class `{}`", self.name);

        let superclass = self.superclass.map(ClassDescriptor::ensure_initialized);
        let (block, header_offset) = match self.validate(superclass) {
            Ok(layout) => layout,
            Err(reason) => fatal(Misuse::MalformedClass { class: self.name, reason }),
        };

        let arena = global_arena();
        let table = arena.alloc_zeroed_bytes(self.interface.size, self.interface.align);

        if let Some(superclass) = superclass {
            // SAFETY: the superclass table is READY (immutable) and holds
            // `interface_size` bytes; the new table is at least that large.
            unsafe {
                ptr::copy_nonoverlapping(
                    superclass.interface_ptr().as_ptr(),
                    table.as_ptr(),
                    superclass.interface_size(),
                );
            }
        }

        if let Some(initialize) = self.initialize {
            let mut builder = InterfaceBuilder::new(self, superclass, table);
            initialize(&mut builder);
        }

        if let Some(slot) = first_unbound_slot(table, self.interface.slots()) {
            fatal(Misuse::UnboundSlot { class: self.name, slot });
        }

        let inner = arena.alloc(ClassInner {
            descriptor: self,
            superclass,
            interface: table,
            block,
            header_offset,
            depth: superclass.map_or(0, |s| s.depth() + 1),
        });
        let class = Class {
            inner: NonNull::from(inner),
        };

        // Registered first: whoever observes READY must also find the class
        // by name and at shutdown.
        registry::register(class);

        self.record.store(class.inner.as_ptr(), Ordering::Release);
        self.state.store(READY, Ordering::Release);
        std::mem::forget(poison);
        debug!(
            "class `{}` ready ({} slots, {} byte instances)",
            self.name,
            self.interface.slots(),
            self.instance.size
        );

        class
    }

    /// Checks the descriptor against itself and its superclass and computes
    /// the block layout (header + instance) and the header offset.
    fn validate(&self, superclass: Option<Class>) -> Result<(Layout, usize), String> {
        let word = std::mem::size_of::<usize>();

        if !self.instance.align.is_power_of_two() || !self.interface.align.is_power_of_two() {
            return Err("alignment is not a power of two".to_string());
        }
        if self.interface.size == 0 || self.interface.size % word != 0 {
            return Err(format!(
                "interface size {} is not a whole number of {word}-byte slots",
                self.interface.size
            ));
        }
        if self.interface.offset % word != 0
            || self.interface.offset + word > self.instance.size
        {
            return Err(format!(
                "interface pointer at offset {} does not fit an aligned slot in a {} byte instance",
                self.interface.offset, self.instance.size
            ));
        }

        if let Some(superclass) = superclass {
            if self.instance.size < superclass.instance_size() {
                return Err(format!(
                    "instance size {} is smaller than superclass `{}` ({})",
                    self.instance.size,
                    superclass.name(),
                    superclass.instance_size()
                ));
            }
            if self.interface.size < superclass.interface_size() {
                return Err(format!(
                    "interface size {} is smaller than superclass `{}` ({})",
                    self.interface.size,
                    superclass.name(),
                    superclass.interface_size()
                ));
            }
        }

        let align = self.instance.align.max(std::mem::align_of::<Header>());
        let header_offset = std::mem::size_of::<Header>().next_multiple_of(align);
        let block = header_offset
            .checked_add(self.instance.size)
            .and_then(|size| Layout::from_size_align(size, align).ok())
            .ok_or_else(|| format!("instance size {} overflows", self.instance.size))?;

        Ok((block, header_offset))
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state.load(Ordering::Acquire) {
            UNINITIALIZED => "uninitialized",
            INITIALIZING => "initializing",
            READY => "ready",
            _ => "poisoned",
        };
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("superclass", &self.superclass.map(|s| s.name))
            .field("instance", &self.instance)
            .field("interface", &self.interface)
            .field("state", &state)
            .finish()
    }
}

/// Marks the descriptor POISONED if composition unwinds.
struct PoisonOnUnwind(&'static ClassDescriptor);

impl Drop for PoisonOnUnwind {
    fn drop(&mut self) {
        self.0.state.store(POISONED, Ordering::Release);
        self.0.owner.store(0, Ordering::Relaxed);
    }
}

/// Non-zero token identifying the current thread.
fn thread_token() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static TOKEN: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TOKEN.with(|token| *token)
}

/// Runtime record of an initialized class, allocated in the global arena.
struct ClassInner {
    descriptor: &'static ClassDescriptor,
    superclass: Option<Class>,
    interface: NonNull<u8>,
    block: Layout,
    header_offset: usize,
    depth: usize,
}

/// Handle to the runtime record of an initialized class.
///
/// Records are never freed, so the handle is `Copy` and valid for the rest of
/// the process. Two handles are equal when they name the same record.
#[derive(Clone, Copy)]
pub struct Class {
    inner: NonNull<ClassInner>,
}

// SAFETY: the record is immutable after publication and lives in the arena
// for the whole process.
unsafe impl Send for Class {}
unsafe impl Sync for Class {}

impl Class {
    fn inner(&self) -> &'static ClassInner {
        // SAFETY: records are arena-allocated and never freed.
        unsafe { &*self.inner.as_ptr() }
    }

    /// The class name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner().descriptor.name
    }

    /// The descriptor this record was built from.
    #[must_use]
    pub fn descriptor(&self) -> &'static ClassDescriptor {
        self.inner().descriptor
    }

    /// The superclass record, `None` for a root class.
    #[must_use]
    pub fn superclass(&self) -> Option<Class> {
        self.inner().superclass
    }

    /// Number of superclasses between this class and its root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.inner().depth
    }

    /// Instance size in bytes, excluding the hidden header.
    #[must_use]
    pub fn instance_size(&self) -> usize {
        self.inner().descriptor.instance.size
    }

    /// Size of the composed dispatch table in bytes.
    #[must_use]
    pub fn interface_size(&self) -> usize {
        self.inner().descriptor.interface.size
    }

    pub(crate) fn interface_ptr(&self) -> NonNull<u8> {
        self.inner().interface
    }

    pub(crate) fn block_layout(&self) -> Layout {
        self.inner().block
    }

    pub(crate) fn header_offset(&self) -> usize {
        self.inner().header_offset
    }

    /// Iterates over this class and its superclasses, most derived first.
    #[must_use]
    pub fn ancestors(&self) -> Ancestors {
        Ancestors { next: Some(*self) }
    }

    /// Returns whether `other` is this class or one of its superclasses.
    #[must_use]
    pub fn is_subclass_of(&self, other: Class) -> bool {
        self.ancestors().any(|ancestor| ancestor == other)
    }

    /// Returns whether `descriptor` describes this class or a superclass.
    #[must_use]
    pub fn inherits_from(&self, descriptor: &ClassDescriptor) -> bool {
        self.ancestors()
            .any(|ancestor| ptr::eq(ancestor.descriptor(), descriptor))
    }

    /// Views this class's composed table as the interface of `T`, which must
    /// be this class or an ancestor.
    #[must_use]
    pub fn interface_of<T: ObjectType>(&self) -> Option<&'static T::Interface> {
        if self.inherits_from(T::descriptor()) {
            // SAFETY: the table begins with the interface of every ancestor.
            Some(unsafe { self.interface_unchecked::<T::Interface>() })
        } else {
            None
        }
    }

    /// # Safety
    ///
    /// `I` must be the interface type of this class or of one of its
    /// ancestors.
    pub(crate) unsafe fn interface_unchecked<I>(&self) -> &'static I {
        // SAFETY: upheld by the caller; the table is immutable once READY.
        unsafe { &*self.interface_ptr().as_ptr().cast::<I>() }
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.inner.as_ptr(), other.inner.as_ptr())
    }
}

impl Eq for Class {}

impl std::hash::Hash for Class {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        ptr::hash(self.inner.as_ptr(), state);
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name())
            .field("super_class", &self.superclass().map(|c| c.name()))
            .finish()
    }
}

/// Iterator over an ancestry chain, see [`Class::ancestors`].
pub struct Ancestors {
    next: Option<Class>,
}

impl Iterator for Ancestors {
    type Item = Class;

    fn next(&mut self) -> Option<Class> {
        let current = self.next?;
        self.next = current.superclass();
        Some(current)
    }
}

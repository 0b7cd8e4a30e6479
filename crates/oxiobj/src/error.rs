//! Error types for the `oxiobj` runtime.
//!
//! Failures come in two families:
//!
//! - [`Error`]: recoverable conditions handed back to the caller as values
//!   (allocation failure, a failed constructor, a checked cast outside the
//!   ancestry chain).
//! - [`Misuse`]: broken invariants in the program using the runtime
//!   (over-release, re-entrant class initialization, malformed descriptors).
//!   These are never returned. They are logged and then raised as a panic by
//!   [`fatal`], because continuing would risk use-after-free or calls through a
//!   half-built dispatch table.

use std::fmt;

/// Recoverable runtime errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The system allocator could not provide an instance block.
    OutOfMemory {
        /// Class being instantiated.
        class: &'static str,
        /// Requested block size in bytes, header included.
        size: usize,
    },

    /// A constructor in the chain rejected the instance.
    ConstructionFailed {
        /// Class being constructed.
        class: &'static str,
        /// Human-readable reason supplied by the constructor.
        reason: String,
    },

    /// A checked cast named a class outside the instance's ancestry chain.
    TypeMismatch {
        /// Class the caller asked for.
        expected: &'static str,
        /// Dynamic class of the instance.
        found: &'static str,
    },
}

impl Error {
    /// Convenience constructor for constructor failures.
    pub fn construction(class: &'static str, reason: impl Into<String>) -> Self {
        Error::ConstructionFailed {
            class,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory { class, size } => {
                write!(f, "Out of memory allocating {size} bytes for `{class}`")
            }
            Error::ConstructionFailed { class, reason } => {
                write!(f, "Construction of `{class}` failed: {reason}")
            }
            Error::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: `{found}` is not a kind of `{expected}`")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type for `oxiobj` runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Programmer errors that terminate the current thread via [`fatal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Misuse {
    /// `release` on an instance whose count already reached zero.
    OverRelease {
        /// Dynamic class of the instance.
        class: &'static str,
    },

    /// `retain` on an instance that has already been destroyed.
    RetainAfterRelease {
        /// Dynamic class of the instance.
        class: &'static str,
    },

    /// The reference count would exceed `isize::MAX`.
    RefCountOverflow {
        /// Dynamic class of the instance.
        class: &'static str,
    },

    /// The hidden header does not carry a known marker.
    CorruptHeader {
        /// Address of the instance.
        addr: usize,
        /// Marker value that was found.
        magic: u32,
    },

    /// A class's initialization re-entered itself on the initializing thread.
    ReentrantInitialization {
        /// Class whose initialization re-entered.
        class: &'static str,
    },

    /// A class's initialize hook panicked; the class can never become ready.
    PoisonedClass {
        /// Class that failed to initialize.
        class: &'static str,
    },

    /// A descriptor is inconsistent with itself or with its superclass.
    MalformedClass {
        /// Offending class.
        class: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A dispatch slot was still unbound after the initialize hook ran.
    UnboundSlot {
        /// Offending class.
        class: &'static str,
        /// Slot index, counted in pointer-sized words from the table start.
        slot: usize,
    },

    /// An initialize hook asked for the interface of a class that is not the
    /// class being initialized nor one of its ancestors.
    ForeignInterface {
        /// Class being initialized.
        class: &'static str,
        /// Interface owner that was requested.
        requested: &'static str,
    },

    /// A superclass call was made from a root class.
    NoSuperclass {
        /// Root class that has no superclass.
        class: &'static str,
    },
}

impl fmt::Display for Misuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Misuse::OverRelease { class } => {
                write!(f, "Instance of `{class}` over-released (released after its count reached zero)")
            }
            Misuse::RetainAfterRelease { class } => {
                write!(f, "Instance of `{class}` retained after it was destroyed")
            }
            Misuse::RefCountOverflow { class } => {
                write!(f, "Reference count overflow on instance of `{class}`")
            }
            Misuse::CorruptHeader { addr, magic } => {
                write!(f, "Corrupt instance header at {addr:#x} (marker {magic:#010x})")
            }
            Misuse::ReentrantInitialization { class } => {
                write!(f, "Class `{class}` re-entered its own initialization")
            }
            Misuse::PoisonedClass { class } => {
                write!(f, "Class `{class}` failed to initialize and is poisoned")
            }
            Misuse::MalformedClass { class, reason } => {
                write!(f, "Malformed class `{class}`: {reason}")
            }
            Misuse::UnboundSlot { class, slot } => {
                write!(f, "Class `{class}` left interface slot {slot} unbound")
            }
            Misuse::ForeignInterface { class, requested } => {
                write!(
                    f,
                    "Class `{class}` requested the interface of `{requested}`, which is not an ancestor"
                )
            }
            Misuse::NoSuperclass { class } => {
                write!(f, "Superclass call from root class `{class}`")
            }
        }
    }
}

/// Reports a broken invariant and unwinds.
///
/// The diagnostic is logged at error level first (with a captured backtrace
/// when the `fatal_backtrace` feature is enabled), then the thread panics with
/// the same message.
#[cold]
#[track_caller]
pub fn fatal(misuse: Misuse) -> ! {
    oxiobj_log::error!("{misuse}");

    #[cfg(feature = "fatal_backtrace")]
    {
        let trace = backtrace::Backtrace::new();
        oxiobj_log::error!("backtrace:\n{trace:?}");
    }

    panic!("{misuse}");
}

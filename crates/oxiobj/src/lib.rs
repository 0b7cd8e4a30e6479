//! `oxiobj`: classes, single inheritance and reference counting for Rust structs
//!
//! `oxiobj` is a small object runtime. A class is a `#[repr(C)]` struct that
//! embeds its superclass struct as its first field, plus a dispatch table
//! ("interface") that embeds its superclass's table the same way. The runtime
//! provides:
//!
//! - **Lazy, thread-safe class setup**: the first use of a class composes its
//!   table from the superclass's and runs the class's initialize hook exactly
//!   once, no matter how many threads race on it
//! - **Virtual dispatch** through the table of the instance's dynamic class,
//!   with explicit superclass calls
//! - **Atomic reference counting** with a hidden per-instance header, and
//!   fatal diagnostics for over-release
//! - **Type queries**: `is_kind_of`, checked casts and lookup by class name
//!
//! # Example
//!
//! ```rust
//! use oxiobj::runtime::{
//!     alloc, ClassDescriptor, InstanceLayout, InterfaceBuilder, InterfaceLayout, Object,
//!     ObjectInterface, OBJECT,
//! };
//! use oxiobj::{object_type, send};
//! use std::mem::offset_of;
//!
//! #[repr(C)]
//! pub struct Greeter {
//!     object: Object,
//!     interface: Option<&'static GreeterInterface>,
//! }
//!
//! #[repr(C)]
//! pub struct GreeterInterface {
//!     object: ObjectInterface,
//!     greet: Option<fn(&Greeter) -> String>,
//! }
//!
//! object_type! {
//!     Greeter: Object [object],
//!     interface GreeterInterface [object],
//!     descriptor GREETER,
//! }
//!
//! fn greet(_: &Greeter) -> String {
//!     "hello".to_string()
//! }
//!
//! fn initialize(builder: &mut InterfaceBuilder<'_>) {
//!     builder.interface::<Greeter>().greet = Some(greet);
//! }
//!
//! pub static GREETER: ClassDescriptor = ClassDescriptor::new(
//!     "Greeter",
//!     Some(&OBJECT),
//!     InstanceLayout::of::<Greeter>(),
//!     InterfaceLayout::of::<GreeterInterface>(offset_of!(Greeter, interface)),
//! )
//! .with_initialize(initialize);
//!
//! let greeter = alloc::<Greeter>().unwrap();
//! assert_eq!(send!(greeter, greet), "hello");
//! assert!(greeter.is_kind_of(&OBJECT));
//! ```

pub mod config;
pub mod error;
mod macros;
pub mod runtime;

pub use error::{Error, Misuse, Result};
pub use runtime::{
    Class, ClassDescriptor, Id, Object, ObjectType, Runtime, alloc, class_for_name, construct,
    release, retain,
};

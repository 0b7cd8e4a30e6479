//! `oxiobj` runtime module.
//!
//! # Architecture
//!
//! - [`class`]: class descriptors, one-time thread-safe initialization and
//!   the runtime records built from them
//! - [`interface`]: dispatch table composition
//! - [`object`]: the root [`Object`] and the [`ObjectType`] contract
//! - [`instance`]: allocation with the hidden header, construction and the
//!   destructor chain
//! - [`rc`]: the [`Id`] handle and retain/release
//! - [`dispatch`]: support for `send!`, `send_mut!` and `send_super!`
//! - [`query`]: `is_kind_of` and checked casts
//! - [`registry`]: lookup by name and the shutdown pass
//!
//! Class records and tables live in the global arena from
//! [`oxiobj_mem`] and are never freed. Instances come from the system
//! allocator and live until their count drops to zero.

pub mod class;
pub mod dispatch;
pub mod instance;
pub mod interface;
pub mod object;
pub mod query;
pub mod rc;
pub mod registry;

pub use class::{Ancestors, Class, ClassDescriptor, InstanceLayout, InterfaceLayout};
pub use dispatch::{super_interface, unbound_slot, unbound_super_slot};
pub use instance::{alloc, alloc_class, construct, construct_class};
pub use interface::{Interface, InterfaceBuilder};
pub use object::{OBJECT, Object, ObjectInterface, ObjectType};
pub use query::{cast, cast_mut, downcast_ref, is_kind_of};
pub use rc::{Id, release, release_raw, retain, retain_raw};
pub use registry::{all_classes, class_count, class_for_name, is_shut_down, shutdown};

use crate::config::RuntimeConfig;
use oxiobj_log::info;

/// Scope guard for a configured runtime.
///
/// Applies a [`RuntimeConfig`] when started and runs [`shutdown`] when
/// dropped, so class destroy hooks run at the end of the owning scope
/// (typically `main`).
///
/// ```rust
/// use oxiobj::config::RuntimeConfig;
/// use oxiobj::runtime::{Runtime, alloc, Object};
///
/// let runtime = Runtime::start(RuntimeConfig::default());
/// let obj = alloc::<Object>().unwrap();
/// drop(obj);
/// drop(runtime);
/// ```
#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
}

impl Runtime {
    /// Applies `config` and returns the guard.
    #[must_use]
    pub fn start(config: RuntimeConfig) -> Self {
        config.apply();
        info!(
            "runtime started (log level {}, zombies {})",
            config.log_level.as_str(),
            if config.zombies { "on" } else { "off" }
        );
        Runtime { config }
    }

    /// Starts with the configuration read from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Runtime::start(RuntimeConfig::from_env())
    }

    /// The configuration the runtime was started with.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        shutdown();
    }
}

//! Process-wide class registry.
//!
//! Every class is added here once its record is ready, in the order
//! initialization finished. The registry backs lookup by name and the
//! shutdown pass that runs class destroy hooks.

use crate::runtime::class::Class;
use oxiobj_log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{OnceLock, PoisonError, RwLock};

struct ClassRegistry {
    state: RwLock<RegistryState>,
    shut_down: AtomicBool,
}

#[derive(Default)]
struct RegistryState {
    order: Vec<Class>,
    by_name: HashMap<&'static str, Class>,
}

static REGISTRY: OnceLock<ClassRegistry> = OnceLock::new();

fn registry() -> &'static ClassRegistry {
    REGISTRY.get_or_init(|| ClassRegistry {
        state: RwLock::new(RegistryState::default()),
        shut_down: AtomicBool::new(false),
    })
}

/// Records a freshly initialized class.
pub(crate) fn register(class: Class) {
    let mut state = registry()
        .state
        .write()
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(existing) = state.by_name.get(class.name()) {
        warn!(
            "class name `{}` registered twice; lookups keep resolving to {:?}",
            class.name(),
            existing
        );
    } else {
        state.by_name.insert(class.name(), class);
    }
    state.order.push(class);
    trace!("registered class `{}` (#{})", class.name(), state.order.len());
}

/// Looks up an initialized class by name.
///
/// Classes that have never been initialized are not known to the registry,
/// so they are not found.
///
/// ```rust
/// use oxiobj::runtime::{class_for_name, OBJECT};
///
/// OBJECT.ensure_initialized();
/// assert_eq!(class_for_name("Object").unwrap().name(), "Object");
/// assert!(class_for_name("NoSuchClass").is_none());
/// ```
#[must_use]
pub fn class_for_name(name: &str) -> Option<Class> {
    registry()
        .state
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .by_name
        .get(name)
        .copied()
}

/// All initialized classes, in registration order.
#[must_use]
pub fn all_classes() -> Vec<Class> {
    registry()
        .state
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .order
        .clone()
}

/// Number of initialized classes.
#[must_use]
pub fn class_count() -> usize {
    registry()
        .state
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .order
        .len()
}

/// Runs the destroy hook of every registered class, in registration order.
///
/// Only the first call does anything; later calls return zero. Returns the
/// number of hooks that ran. Instances are not touched: classes stay usable,
/// the hooks only release class-level resources.
pub fn shutdown() -> usize {
    let registry = registry();
    if registry.shut_down.swap(true, Ordering::AcqRel) {
        debug!("shutdown already ran");
        return 0;
    }

    // Hooks run without the lock so they can query the registry.
    let classes = all_classes();
    let mut ran = 0;
    for class in classes {
        if let Some(destroy) = class.descriptor().destroy_hook() {
            debug!("destroying class `{}`", class.name());
            destroy(class);
            ran += 1;
        }
    }

    info!("runtime shut down ({ran} destroy hooks)");
    ran
}

/// Whether [`shutdown`] has run.
#[must_use]
pub fn is_shut_down() -> bool {
    registry().shut_down.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::class::{ClassDescriptor, InstanceLayout, InterfaceLayout};
    use crate::runtime::object::{OBJECT, Object, ObjectInterface};
    use std::mem::offset_of;
    use std::thread;

    #[repr(C)]
    struct Named {
        object: Object,
        interface: Option<&'static ObjectInterface>,
    }

    static FIRST: ClassDescriptor = ClassDescriptor::new(
        "RegistryTestFirst",
        Some(&OBJECT),
        InstanceLayout::of::<Named>(),
        InterfaceLayout::of::<ObjectInterface>(offset_of!(Named, interface)),
    );

    static SECOND: ClassDescriptor = ClassDescriptor::new(
        "RegistryTestSecond",
        Some(&FIRST),
        InstanceLayout::of::<Named>(),
        InterfaceLayout::of::<ObjectInterface>(offset_of!(Named, interface)),
    );

    static DUPLICATE: ClassDescriptor = ClassDescriptor::new(
        "RegistryTestFirst",
        Some(&OBJECT),
        InstanceLayout::of::<Named>(),
        InterfaceLayout::of::<ObjectInterface>(offset_of!(Named, interface)),
    );

    #[test]
    fn test_lookup_by_name() {
        let second = SECOND.ensure_initialized();

        assert_eq!(class_for_name("RegistryTestSecond"), Some(second));
        assert_eq!(class_for_name("RegistryTestFirst"), FIRST.class());
        assert!(class_for_name("RegistryTestMissing").is_none());
    }

    #[test]
    fn test_superclass_registered_before_subclass() {
        SECOND.ensure_initialized();
        let names: Vec<_> = all_classes().iter().map(|c| c.name()).collect();

        let object = names.iter().position(|n| *n == "Object").unwrap();
        let first = names.iter().position(|n| *n == "RegistryTestFirst").unwrap();
        let second = names.iter().position(|n| *n == "RegistryTestSecond").unwrap();
        assert!(object < first);
        assert!(first < second);
        assert!(class_count() >= 3);
    }

    #[test]
    fn test_duplicate_name_keeps_first_registration() {
        let first = FIRST.ensure_initialized();
        let duplicate = DUPLICATE.ensure_initialized();

        assert_ne!(first, duplicate);
        assert_eq!(class_for_name("RegistryTestFirst"), Some(first));
    }

    #[test]
    fn test_concurrent_lookups() {
        OBJECT.ensure_initialized();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                thread::spawn(|| {
                    for _ in 0..100 {
                        assert!(class_for_name("Object").is_some());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}

//! Support functions behind the dispatch macros.
//!
//! [`send!`](crate::send) and [`send_mut!`](crate::send_mut) resolve a slot in
//! the table of the receiver's dynamic class. [`send_super!`](crate::send_super)
//! resolves it in the frozen table of a statically named class's superclass,
//! which is how overrides call the implementation they replaced.

use crate::error::{Misuse, fatal};
use crate::runtime::object::ObjectType;
use std::ptr;

/// Table of `T`'s superclass, as composed when that superclass initialized.
///
/// # Panics
///
/// Through [`fatal`] when `T` is a root class, or when `T::Super` does not
/// name the superclass in `T`'s descriptor.
pub fn super_interface<T: ObjectType>() -> &'static <T::Super as ObjectType>::Interface {
    let class = T::descriptor().ensure_initialized();
    let Some(superclass) = class.superclass() else {
        fatal(Misuse::NoSuperclass { class: class.name() });
    };

    let declared = <T::Super as ObjectType>::descriptor();
    if !ptr::eq(superclass.descriptor(), declared) {
        fatal(Misuse::MalformedClass {
            class: class.name(),
            reason: format!(
                "superclass type is `{}` but the descriptor names `{}`",
                declared.name(),
                superclass.name()
            ),
        });
    }

    // SAFETY: the superclass table was composed for `T::Super`'s interface
    // and is immutable once ready.
    unsafe { superclass.interface_unchecked() }
}

/// Reports a call through a slot that holds no function.
///
/// Composed tables are checked for unbound slots when a class initializes,
/// so this only fires on tables corrupted after the fact.
#[cold]
#[track_caller]
pub fn unbound_slot<T: ObjectType>(receiver: &T, method: &'static str) -> ! {
    let class = receiver.as_object().class();
    fatal(Misuse::MalformedClass {
        class: class.name(),
        reason: format!("slot `{method}` is unbound"),
    })
}

/// Superclass-call variant of [`unbound_slot`].
#[cold]
#[track_caller]
pub fn unbound_super_slot<T: ObjectType>(method: &'static str) -> ! {
    fatal(Misuse::MalformedClass {
        class: T::descriptor().name(),
        reason: format!("superclass slot `{method}` is unbound"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::instance::{alloc, construct};
    use crate::runtime::{
        ClassDescriptor, InstanceLayout, InterfaceBuilder, InterfaceLayout, OBJECT, Object,
        ObjectInterface,
    };
    use std::mem::offset_of;

    #[repr(C)]
    struct Animal {
        object: Object,
        interface: Option<&'static AnimalInterface>,
        legs: u32,
    }

    #[repr(C)]
    struct AnimalInterface {
        object: ObjectInterface,
        speak: Option<fn(&Animal) -> String>,
        set_legs: Option<fn(&mut Animal, u32)>,
    }

    crate::object_type! {
        Animal: Object [object],
        interface AnimalInterface [object],
        descriptor ANIMAL,
    }

    fn animal_speak(_this: &Animal) -> String {
        "...".to_string()
    }

    fn animal_set_legs(this: &mut Animal, legs: u32) {
        this.legs = legs;
    }

    fn initialize_animal(builder: &mut InterfaceBuilder<'_>) {
        let animal = builder.interface::<Animal>();
        animal.speak = Some(animal_speak);
        animal.set_legs = Some(animal_set_legs);
    }

    static ANIMAL: ClassDescriptor = ClassDescriptor::new(
        "DispatchTestAnimal",
        Some(&OBJECT),
        InstanceLayout::of::<Animal>(),
        InterfaceLayout::of::<AnimalInterface>(offset_of!(Animal, interface)),
    )
    .with_initialize(initialize_animal);

    #[repr(C)]
    struct Dog {
        animal: Animal,
    }

    crate::object_type! {
        Dog: Animal [animal],
        descriptor DOG,
    }

    fn dog_speak(this: &Animal) -> String {
        let inherited = crate::send_super!(Dog, this, speak);
        format!("woof ({inherited}, {} legs)", this.legs)
    }

    fn initialize_dog(builder: &mut InterfaceBuilder<'_>) {
        builder.interface::<Dog>().speak = Some(dog_speak);
    }

    static DOG: ClassDescriptor = ClassDescriptor::new(
        "DispatchTestDog",
        Some(&ANIMAL),
        InstanceLayout::of::<Dog>(),
        InterfaceLayout::of::<AnimalInterface>(offset_of!(Animal, interface)),
    )
    .with_initialize(initialize_dog);

    #[test]
    fn test_send_uses_dynamic_class() {
        let dog = alloc::<Dog>().unwrap();
        let as_animal: &Animal = &dog;

        assert!(crate::send!(as_animal, speak).starts_with("woof"));
    }

    #[test]
    fn test_send_super_reaches_parent_implementation() {
        let dog = construct::<Dog>(|this| {
            crate::send_mut!(this, set_legs, 4);
            Ok(())
        })
        .unwrap();

        assert_eq!(crate::send!(dog, speak), "woof (..., 4 legs)");
    }

    #[test]
    fn test_super_interface_is_parent_table() {
        let parent = super_interface::<Dog>();
        let animal_table = ANIMAL.ensure_initialized().interface_of::<Animal>().unwrap();

        assert!(ptr::eq(parent, animal_table));
    }

    #[test]
    #[should_panic(expected = "Superclass call from root class `Object`")]
    fn test_super_interface_from_root_is_fatal() {
        let _ = super_interface::<Object>();
    }
}

//! Declaration and dispatch macros.

/// Declares a struct as a runtime class type.
///
/// Implements [`ObjectType`](crate::runtime::ObjectType) and `Deref`/`DerefMut`
/// from the class to its superclass. With an `interface` clause, it also
/// implements [`Interface`](crate::runtime::Interface) and the same `Deref`
/// chain for the interface struct. Without one, the class reuses its
/// superclass's interface. The bracketed identifiers name the field holding
/// the superclass part, checked at compile time to sit at offset zero.
///
/// ```rust
/// use oxiobj::object_type;
/// use oxiobj::runtime::{
///     ClassDescriptor, InstanceLayout, InterfaceBuilder, InterfaceLayout, Object, ObjectInterface,
///     OBJECT,
/// };
/// use std::mem::offset_of;
///
/// #[repr(C)]
/// pub struct Shape {
///     object: Object,
///     interface: Option<&'static ShapeInterface>,
/// }
///
/// #[repr(C)]
/// pub struct ShapeInterface {
///     object: ObjectInterface,
///     area: Option<fn(&Shape) -> f64>,
/// }
///
/// object_type! {
///     Shape: Object [object],
///     interface ShapeInterface [object],
///     descriptor SHAPE,
/// }
///
/// fn zero_area(_: &Shape) -> f64 {
///     0.0
/// }
///
/// fn initialize_shape(builder: &mut InterfaceBuilder<'_>) {
///     builder.interface::<Shape>().area = Some(zero_area);
/// }
///
/// pub static SHAPE: ClassDescriptor = ClassDescriptor::new(
///     "DocShape",
///     Some(&OBJECT),
///     InstanceLayout::of::<Shape>(),
///     InterfaceLayout::of::<ShapeInterface>(offset_of!(Shape, interface)),
/// )
/// .with_initialize(initialize_shape);
///
/// let shape = oxiobj::runtime::alloc::<Shape>().unwrap();
/// assert_eq!(oxiobj::send!(shape, area), 0.0);
/// ```
#[macro_export]
macro_rules! object_type {
    (@object $ty:ty, $sup:ty, $sup_field:ident, $iface:ty, $desc:path) => {
        unsafe impl $crate::runtime::ObjectType for $ty {
            type Super = $sup;
            type Interface = $iface;

            fn descriptor() -> &'static $crate::runtime::ClassDescriptor {
                &$desc
            }
        }

        impl ::core::ops::Deref for $ty {
            type Target = $sup;

            fn deref(&self) -> &$sup {
                &self.$sup_field
            }
        }

        impl ::core::ops::DerefMut for $ty {
            fn deref_mut(&mut self) -> &mut $sup {
                &mut self.$sup_field
            }
        }

        const _: () = assert!(
            ::core::mem::offset_of!($ty, $sup_field) == 0,
            "the superclass must be the first field"
        );
    };

    (
        $ty:ty : $sup:ty [$sup_field:ident],
        interface $iface:ty [$iface_sup_field:ident],
        descriptor $desc:path $(,)?
    ) => {
        $crate::object_type!(@object $ty, $sup, $sup_field, $iface, $desc);

        unsafe impl $crate::runtime::Interface for $iface {}

        impl ::core::ops::Deref for $iface {
            type Target = <$sup as $crate::runtime::ObjectType>::Interface;

            fn deref(&self) -> &Self::Target {
                &self.$iface_sup_field
            }
        }

        impl ::core::ops::DerefMut for $iface {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.$iface_sup_field
            }
        }

        const _: () = assert!(
            ::core::mem::offset_of!($iface, $iface_sup_field) == 0,
            "the parent interface must be the first field"
        );
    };

    (
        $ty:ty : $sup:ty [$sup_field:ident],
        descriptor $desc:path $(,)?
    ) => {
        $crate::object_type!(
            @object $ty,
            $sup,
            $sup_field,
            <$sup as $crate::runtime::ObjectType>::Interface,
            $desc
        );
    };
}

/// Calls a slot through the receiver's dynamic class.
///
/// `send!(receiver, slot, args...)` looks `slot` up in the table of the
/// instance's class (read from its header) and calls it with the receiver
/// and the arguments. The receiver can be an `Id<T>`, `&T` or `&mut T`; it
/// is passed on as a shared reference.
#[macro_export]
macro_rules! send {
    ($obj:expr, $method:ident $(, $arg:expr)* $(,)?) => {{
        let receiver = &*$obj;
        match $crate::runtime::ObjectType::interface(receiver).$method {
            ::core::option::Option::Some(imp) => imp(receiver $(, $arg)*),
            ::core::option::Option::None => {
                $crate::runtime::unbound_slot(receiver, ::core::stringify!($method))
            }
        }
    }};
}

/// Like [`send!`] but passes the receiver as a mutable reference.
#[macro_export]
macro_rules! send_mut {
    ($obj:expr, $method:ident $(, $arg:expr)* $(,)?) => {{
        let receiver = &mut *$obj;
        match $crate::runtime::ObjectType::interface(&*receiver).$method {
            ::core::option::Option::Some(imp) => imp(receiver $(, $arg)*),
            ::core::option::Option::None => {
                $crate::runtime::unbound_slot(&*receiver, ::core::stringify!($method))
            }
        }
    }};
}

/// Calls the superclass implementation of a slot.
///
/// `send_super!(Type, receiver, slot, args...)` resolves `slot` in the table
/// of `Type`'s superclass, where `Type` is the class whose implementation is
/// making the call (not the receiver's dynamic class). The receiver is passed
/// through as written, so both `&T` and `&mut T` work.
#[macro_export]
macro_rules! send_super {
    ($ty:ty, $obj:expr, $method:ident $(, $arg:expr)* $(,)?) => {{
        match $crate::runtime::super_interface::<$ty>().$method {
            ::core::option::Option::Some(imp) => imp($obj $(, $arg)*),
            ::core::option::Option::None => {
                $crate::runtime::unbound_super_slot::<$ty>(::core::stringify!($method))
            }
        }
    }};
}

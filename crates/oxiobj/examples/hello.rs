//! A class with a constructor, an override and a custom method.
//!
//! Run with: `OXIOBJ_LOG=debug cargo run --example hello`

use oxiobj::runtime::{
    ClassDescriptor, InstanceLayout, InterfaceBuilder, InterfaceLayout, OBJECT, Object,
    ObjectInterface,
};
use oxiobj::{Id, Result, Runtime, construct, object_type, send, send_mut, send_super};
use std::mem::offset_of;

const DEFAULT_GREETING: &str = "Hello World!";

#[repr(C)]
pub struct Hello {
    object: Object,
    interface: Option<&'static HelloInterface>,
    greeting: Option<Box<str>>,
}

#[repr(C)]
pub struct HelloInterface {
    object: ObjectInterface,
    /// Initializes with `greeting`, or the default greeting when `None`.
    init_with_greeting: Option<fn(&mut Hello, Option<&str>) -> Result<()>>,
    /// Prints the greeting.
    say_hello: Option<fn(&Hello)>,
}

object_type! {
    Hello: Object [object],
    interface HelloInterface [object],
    descriptor HELLO,
}

impl Hello {
    /// Allocates and initializes a new greeter.
    pub fn with_greeting(greeting: Option<&str>) -> Result<Id<Hello>> {
        construct::<Hello>(|this| send_mut!(this, init_with_greeting, greeting))
    }

    pub fn greeting(&self) -> &str {
        self.greeting.as_deref().unwrap_or(DEFAULT_GREETING)
    }
}

fn init_with_greeting(this: &mut Hello, greeting: Option<&str>) -> Result<()> {
    send_super!(Hello, this, init)?;
    this.greeting = Some(greeting.unwrap_or(DEFAULT_GREETING).into());
    Ok(())
}

fn say_hello(this: &Hello) {
    println!("{}", this.greeting());
}

fn description(this: &Object) -> String {
    match this.try_cast::<Hello>() {
        Ok(hello) => format!("<Hello: {:?}>", hello.greeting()),
        Err(_) => send_super!(Hello, this, description),
    }
}

fn initialize(builder: &mut InterfaceBuilder<'_>) {
    let hello = builder.interface::<Hello>();
    hello.init_with_greeting = Some(init_with_greeting);
    hello.say_hello = Some(say_hello);
    hello.description = Some(description);
}

pub static HELLO: ClassDescriptor = ClassDescriptor::new(
    "Hello",
    Some(&OBJECT),
    InstanceLayout::of::<Hello>(),
    InterfaceLayout::of::<HelloInterface>(offset_of!(Hello, interface)),
)
.with_initialize(initialize);

fn main() -> Result<()> {
    let _runtime = Runtime::from_env();

    let hello = Hello::with_greeting(None)?;
    send!(hello, say_hello);

    let custom = Hello::with_greeting(Some("Hello from oxiobj!"))?;
    send!(custom, say_hello);
    println!("{custom}");

    assert!(hello.is_kind_of(&OBJECT));
    assert_eq!(Id::retain_count(&hello), 1);
    Ok(())
}

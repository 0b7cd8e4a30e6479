// Common test fixtures for integration tests
//
// A three-level hierarchy Root -> Mid -> Leaf plus an unrelated Other class.
// Every instance can carry a journal that records constructor and destructor
// events, so tests can assert ordering without sharing global state.

#![allow(dead_code)]

use oxiobj::runtime::{
    ClassDescriptor, InstanceLayout, InterfaceBuilder, InterfaceLayout, OBJECT, Object,
    ObjectInterface,
};
use oxiobj::{Error, Id, Result, construct, object_type, send_mut, send_super};
use std::mem::offset_of;
use std::sync::{Arc, Mutex};

/// Shared event log.
pub type Journal = Arc<Mutex<Vec<&'static str>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<&'static str> {
    journal.lock().unwrap().clone()
}

// ============================================================================
// Root
// ============================================================================

#[repr(C)]
pub struct Root {
    object: Object,
    interface: Option<&'static RootInterface>,
    journal: Option<Box<Journal>>,
    pub serial: u64,
}

#[repr(C)]
pub struct RootInterface {
    object: ObjectInterface,
    pub describe: Option<fn(&Root) -> String>,
    pub init_root: Option<fn(&mut Root, &Journal, u64) -> Result<()>>,
}

object_type! {
    Root: Object [object],
    interface RootInterface [object],
    descriptor ROOT,
}

impl Root {
    pub fn record(&self, event: &'static str) {
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(event);
        }
    }
}

fn root_describe(_this: &Root) -> String {
    "root".to_string()
}

fn root_init(this: &mut Root, journal: &Journal, serial: u64) -> Result<()> {
    send_super!(Root, this, init)?;
    this.journal = Some(Box::new(Arc::clone(journal)));
    this.serial = serial;
    this.record("init root");
    Ok(())
}

fn root_dealloc(this: &mut Object) {
    if let Ok(root) = this.try_cast::<Root>() {
        root.record("dealloc root");
    }
    send_super!(Root, this, dealloc);
}

fn root_equals(this: &Object, other: &Object) -> bool {
    match (this.try_cast::<Root>(), other.try_cast::<Root>()) {
        (Ok(a), Ok(b)) => a.serial == b.serial,
        _ => false,
    }
}

fn root_hash(this: &Object) -> u64 {
    this.try_cast::<Root>().map_or(0, |root| root.serial)
}

fn initialize_root(builder: &mut InterfaceBuilder<'_>) {
    let root = builder.interface::<Root>();
    root.describe = Some(root_describe);
    root.init_root = Some(root_init);
    root.dealloc = Some(root_dealloc);
    root.equals = Some(root_equals);
    root.hash = Some(root_hash);
}

pub static ROOT: ClassDescriptor = ClassDescriptor::new(
    "FixtureRoot",
    Some(&OBJECT),
    InstanceLayout::of::<Root>(),
    InterfaceLayout::of::<RootInterface>(offset_of!(Root, interface)),
)
.with_initialize(initialize_root);

// ============================================================================
// Mid
// ============================================================================

#[repr(C)]
pub struct Mid {
    root: Root,
    interface: Option<&'static MidInterface>,
    pub depth: u32,
}

#[repr(C)]
pub struct MidInterface {
    root: RootInterface,
    pub init_mid: Option<fn(&mut Mid, &Journal, u32) -> Result<()>>,
}

object_type! {
    Mid: Root [root],
    interface MidInterface [root],
    descriptor MID,
}

fn mid_describe(_this: &Root) -> String {
    "mid".to_string()
}

fn mid_init(this: &mut Mid, journal: &Journal, depth: u32) -> Result<()> {
    send_super!(Mid, this, init_root, journal, u64::from(depth))?;
    this.record("init mid");
    if depth == 0 {
        return Err(Error::construction("FixtureMid", "depth must be positive"));
    }
    this.depth = depth;
    Ok(())
}

fn mid_dealloc(this: &mut Object) {
    if let Ok(mid) = this.try_cast::<Mid>() {
        mid.record("dealloc mid");
    }
    send_super!(Mid, this, dealloc);
}

fn initialize_mid(builder: &mut InterfaceBuilder<'_>) {
    let mid = builder.interface::<Mid>();
    mid.describe = Some(mid_describe);
    mid.init_mid = Some(mid_init);
    mid.dealloc = Some(mid_dealloc);
}

pub static MID: ClassDescriptor = ClassDescriptor::new(
    "FixtureMid",
    Some(&ROOT),
    InstanceLayout::of::<Mid>(),
    InterfaceLayout::of::<MidInterface>(offset_of!(Mid, interface)),
)
.with_initialize(initialize_mid);

// ============================================================================
// Leaf
// ============================================================================

#[repr(C)]
pub struct Leaf {
    mid: Mid,
    interface: Option<&'static LeafInterface>,
    pub petals: u32,
}

#[repr(C)]
pub struct LeafInterface {
    mid: MidInterface,
    pub init_leaf: Option<fn(&mut Leaf, &Journal) -> Result<()>>,
    pub petal_count: Option<fn(&Leaf) -> u32>,
}

object_type! {
    Leaf: Mid [mid],
    interface LeafInterface [mid],
    descriptor LEAF,
}

fn leaf_init(this: &mut Leaf, journal: &Journal) -> Result<()> {
    send_super!(Leaf, this, init_mid, journal, 3)?;
    this.record("init leaf");
    this.petals = 5;
    Ok(())
}

fn leaf_dealloc(this: &mut Object) {
    if let Ok(leaf) = this.try_cast::<Leaf>() {
        leaf.record("dealloc leaf");
    }
    send_super!(Leaf, this, dealloc);
}

fn leaf_petal_count(this: &Leaf) -> u32 {
    this.petals
}

fn initialize_leaf(builder: &mut InterfaceBuilder<'_>) {
    let leaf = builder.interface::<Leaf>();
    leaf.init_leaf = Some(leaf_init);
    leaf.petal_count = Some(leaf_petal_count);
    leaf.dealloc = Some(leaf_dealloc);
}

pub static LEAF: ClassDescriptor = ClassDescriptor::new(
    "FixtureLeaf",
    Some(&MID),
    InstanceLayout::of::<Leaf>(),
    InterfaceLayout::of::<LeafInterface>(offset_of!(Leaf, interface)),
)
.with_initialize(initialize_leaf);

// ============================================================================
// Other (unrelated to the hierarchy above)
// ============================================================================

#[repr(C)]
pub struct Other {
    object: Object,
    interface: Option<&'static ObjectInterface>,
}

object_type! {
    Other: Object [object],
    descriptor OTHER,
}

impl std::fmt::Debug for Other {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Other").finish_non_exhaustive()
    }
}

pub static OTHER: ClassDescriptor = ClassDescriptor::new(
    "FixtureOther",
    Some(&OBJECT),
    InstanceLayout::of::<Other>(),
    InterfaceLayout::of::<ObjectInterface>(offset_of!(Other, interface)),
);

// ============================================================================
// Constructors
// ============================================================================

pub fn new_root(journal: &Journal, serial: u64) -> Result<Id<Root>> {
    construct::<Root>(|this| send_mut!(this, init_root, journal, serial))
}

pub fn new_mid(journal: &Journal, depth: u32) -> Result<Id<Mid>> {
    construct::<Mid>(|this| send_mut!(this, init_mid, journal, depth))
}

pub fn new_leaf(journal: &Journal) -> Result<Id<Leaf>> {
    construct::<Leaf>(|this| send_mut!(this, init_leaf, journal))
}

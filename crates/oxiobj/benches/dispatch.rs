// Dispatch and query benchmarks
//
// Measures:
// - Virtual call through send! against a direct function call
// - Superclass call through send_super!
// - ensure_initialized on an already ready class
// - is_kind_of at increasing hierarchy depth
// - Class lookup by name

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use oxiobj::runtime::{
    ClassDescriptor, InstanceLayout, InterfaceBuilder, InterfaceLayout, OBJECT, Object,
    ObjectInterface, alloc, class_for_name,
};
use oxiobj::{object_type, send, send_super};
use std::mem::offset_of;

#[repr(C)]
struct Counter {
    object: Object,
    interface: Option<&'static CounterInterface>,
    value: u64,
}

#[repr(C)]
struct CounterInterface {
    object: ObjectInterface,
    get: Option<fn(&Counter) -> u64>,
}

object_type! {
    Counter: Object [object],
    interface CounterInterface [object],
    descriptor COUNTER,
}

fn counter_get(this: &Counter) -> u64 {
    this.value
}

fn initialize_counter(builder: &mut InterfaceBuilder<'_>) {
    builder.interface::<Counter>().get = Some(counter_get);
}

static COUNTER: ClassDescriptor = ClassDescriptor::new(
    "BenchCounter",
    Some(&OBJECT),
    InstanceLayout::of::<Counter>(),
    InterfaceLayout::of::<CounterInterface>(offset_of!(Counter, interface)),
)
.with_initialize(initialize_counter);

#[repr(C)]
struct Doubled {
    counter: Counter,
}

object_type! {
    Doubled: Counter [counter],
    descriptor DOUBLED,
}

fn doubled_get(this: &Counter) -> u64 {
    let base = send_super!(Doubled, this, get);
    base * 2
}

fn initialize_doubled(builder: &mut InterfaceBuilder<'_>) {
    builder.interface::<Doubled>().get = Some(doubled_get);
}

static DOUBLED: ClassDescriptor = ClassDescriptor::new(
    "BenchDoubled",
    Some(&COUNTER),
    InstanceLayout::of::<Doubled>(),
    InterfaceLayout::of::<CounterInterface>(offset_of!(Counter, interface)),
)
.with_initialize(initialize_doubled);

fn bench_send(c: &mut Criterion) {
    let counter = alloc::<Counter>().unwrap();
    let doubled = alloc::<Doubled>().unwrap();

    c.bench_function("direct_call", |b| b.iter(|| counter_get(black_box(&counter))));
    c.bench_function("send", |b| b.iter(|| send!(black_box(&*counter), get)));
    c.bench_function("send_override_with_super", |b| {
        b.iter(|| send!(black_box(&*doubled), get))
    });
}

fn bench_ensure_initialized(c: &mut Criterion) {
    COUNTER.ensure_initialized();

    c.bench_function("ensure_initialized_ready", |b| {
        b.iter(|| black_box(&COUNTER).ensure_initialized())
    });
}

fn bench_is_kind_of(c: &mut Criterion) {
    let doubled = alloc::<Doubled>().unwrap();
    let mut group = c.benchmark_group("is_kind_of");

    for (depth, target) in [(0, &DOUBLED), (1, &COUNTER), (2, &OBJECT)] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &target, |b, &target| {
            b.iter(|| doubled.is_kind_of(black_box(target)))
        });
    }

    group.finish();
}

fn bench_class_for_name(c: &mut Criterion) {
    DOUBLED.ensure_initialized();

    c.bench_function("class_for_name_hit", |b| {
        b.iter(|| class_for_name(black_box("BenchDoubled")))
    });
    c.bench_function("class_for_name_miss", |b| {
        b.iter(|| class_for_name(black_box("BenchMissing")))
    });
}

criterion_group!(
    benches,
    bench_send,
    bench_ensure_initialized,
    bench_is_kind_of,
    bench_class_for_name
);
criterion_main!(benches);

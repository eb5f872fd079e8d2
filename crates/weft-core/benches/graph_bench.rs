//! Benchmarks for the reactive graph hot paths.
//!
//! Run with: cargo bench -p weft-core --bench graph_bench

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use weft_core::{Expression, Handler, Listener, Reactivity, Reference, Value};

// =============================================================================
// Reference fan-out
// =============================================================================

fn bench_reference_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference/set");

    for subscribers in [0usize, 1, 8, 64] {
        let cell = Reference::new(0u64);
        let handlers: Vec<_> = (0..subscribers)
            .map(|_| Handler::new(|v: &u64| {
                black_box(*v);
            }))
            .collect();
        for h in &handlers {
            cell.subscribe(h);
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                let mut n = 0u64;
                b.iter(|| {
                    n = n.wrapping_add(1);
                    cell.set(black_box(n));
                })
            },
        );
    }

    let cell = Reference::new(7u64);
    cell.subscribe(&Handler::new(|v: &u64| {
        black_box(*v);
    }));
    group.bench_function("unchanged", |b| b.iter(|| cell.set(black_box(7))));

    group.finish();
}

// =============================================================================
// Expression recompute
// =============================================================================

fn bench_expression(c: &mut Criterion) {
    let mut group = c.benchmark_group("expression");

    let a = Reference::new(1i64);
    let b_src = Reference::new(2i64);
    let sum = Expression::linked(|&(x, y): &(i64, i64)| x + y, (a.clone(), b_src.clone()));
    group.bench_function("recompute_2", |b| {
        let mut n = 0i64;
        b.iter(|| {
            n += 1;
            a.set(black_box(n));
            black_box(sum.get())
        })
    });

    // Chain of depth 8: every write walks the whole chain.
    let root = Reference::new(0i64);
    let mut tail = Expression::linked(|&(x,): &(i64,)| x + 1, (root.clone(),));
    for _ in 1..8 {
        tail = Expression::linked(|&(x,): &(i64,)| x + 1, (tail.clone(),));
    }
    group.bench_function("chain_8", |b| {
        let mut n = 0i64;
        b.iter(|| {
            n += 1;
            root.set(black_box(n));
            black_box(tail.get())
        })
    });

    group.bench_function("toggle_resync", |b| {
        b.iter(|| {
            sum.disable();
            a.set(black_box(-1));
            sum.enable();
            black_box(sum.get())
        })
    });

    group.finish();
}

// =============================================================================
// Listener freeze/thaw
// =============================================================================

fn bench_listener_thaw(c: &mut Criterion) {
    let mut group = c.benchmark_group("listener/thaw");

    for keys in [8usize, 256] {
        let listener: Listener<usize, u32> = Listener::new();
        group.bench_with_input(BenchmarkId::new("collapse_x4", keys), &keys, |b, &keys| {
            b.iter(|| {
                listener.disable_reactivity();
                for round in 0..4u32 {
                    for k in 0..keys {
                        listener.emit_added(k, round);
                    }
                }
                listener.enable_reactivity();
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_reference_set,
    bench_expression,
    bench_listener_thaw
);
criterion_main!(benches);

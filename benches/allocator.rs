//! Allocator benchmarks
//!
//! Measures the arena bump path against the system allocator, and the cost
//! of resetting an arena between batches.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kx::{Allocator, Arena, Layout, SystemAlloc};

fn bench_small_allocations(c: &mut Criterion) {
    let mut group = c.benchmark_group("small_alloc");

    for size in [8usize, 32, 128].iter() {
        let layout = Layout::from_size_align(*size, 8).unwrap();

        group.bench_with_input(BenchmarkId::new("arena", size), size, |b, _| {
            let mut arena = Arena::new();
            b.iter(|| {
                for _ in 0..1000 {
                    black_box(arena.alloc_layout(black_box(layout)));
                }
                arena.reset();
            });
        });

        group.bench_with_input(BenchmarkId::new("system", size), size, |b, _| {
            let system = SystemAlloc;
            b.iter(|| {
                for _ in 0..1000 {
                    let ptr = system.allocate_or_abort(black_box(layout));
                    unsafe { system.release(black_box(ptr), layout) };
                }
            });
        });
    }

    group.finish();
}

fn bench_mixed_alignment(c: &mut Criterion) {
    let layouts: Vec<Layout> = (0..1000)
        .map(|i| Layout::from_size_align(1 + i % 200, 1 << (i % 6)).unwrap())
        .collect();

    c.bench_function("arena_mixed_alignment", |b| {
        let mut arena = Arena::new();
        b.iter(|| {
            for layout in &layouts {
                black_box(arena.alloc_layout(*layout));
            }
            arena.reset();
        });
    });
}

fn bench_chunk_growth(c: &mut Criterion) {
    c.bench_function("arena_fresh_growth_1mb", |b| {
        b.iter(|| {
            let arena = Arena::new();
            let layout = Layout::from_size_align(1024, 16).unwrap();
            for _ in 0..1024 {
                black_box(arena.alloc_layout(layout));
            }
            black_box(arena.chunk_count())
        });
    });
}

criterion_group!(
    benches,
    bench_small_allocations,
    bench_mixed_alignment,
    bench_chunk_growth
);
criterion_main!(benches);

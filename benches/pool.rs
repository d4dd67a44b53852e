//! Buffer pool benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pulsewire::hot_path::BufferPool;

fn bench_acquire_release(c: &mut Criterion) {
    let pool = BufferPool::new(1024, 2048, false);

    c.bench_function("pool_acquire_release", |b| {
        b.iter(|| {
            let buf = pool.acquire().unwrap();
            pool.release(black_box(buf));
        })
    });
}

fn bench_acquire_release_zeroing(c: &mut Criterion) {
    let pool = BufferPool::new(1024, 2048, true);

    c.bench_function("pool_acquire_release_zeroed", |b| {
        b.iter(|| {
            let buf = pool.acquire().unwrap();
            pool.release(black_box(buf));
        })
    });
}

criterion_group!(benches, bench_acquire_release, bench_acquire_release_zeroing);
criterion_main!(benches);

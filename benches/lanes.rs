//! Lane queue throughput benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pulsewire::hot_path::LaneQueue;

fn bench_enqueue_dequeue(c: &mut Criterion) {
    let queue = LaneQueue::with_capacity(1024).unwrap();

    c.bench_function("lane_enqueue_dequeue_pair", |b| {
        b.iter(|| {
            queue.enqueue(black_box(42u64)).unwrap();
            black_box(queue.dequeue().unwrap());
        })
    });
}

fn bench_batch_cycle(c: &mut Criterion) {
    let queue = LaneQueue::with_capacity(1024).unwrap();

    c.bench_function("lane_batch_64", |b| {
        b.iter(|| {
            for i in 0u64..64 {
                queue.enqueue(black_box(i)).unwrap();
            }
            for _ in 0..64 {
                black_box(queue.dequeue().unwrap());
            }
        })
    });
}

fn bench_contended(c: &mut Criterion) {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let queue = Arc::new(LaneQueue::with_capacity(1024).unwrap());
    let stop = Arc::new(AtomicBool::new(false));

    let producer = {
        let queue = Arc::clone(&queue);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            let mut i = 0u64;
            while !stop.load(Ordering::Relaxed) {
                if queue.enqueue(i).is_ok() {
                    i += 1;
                }
            }
        })
    };

    c.bench_function("lane_dequeue_under_contention", |b| {
        b.iter(|| {
            black_box(queue.dequeue());
        })
    });

    stop.store(true, Ordering::Relaxed);
    producer.join().unwrap();
}

criterion_group!(benches, bench_enqueue_dequeue, bench_batch_cycle, bench_contended);
criterion_main!(benches);

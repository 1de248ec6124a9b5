//! Throughput of `InputQueue`'s append/pop path in isolation, away from
//! any worker-thread scheduling overhead.

use std::num::NonZeroUsize;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowgraph::queue::InputQueue;
use flowgraph::record::RecordBox;

fn bench_append_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("input_queue_append_pop");
    for capacity in [1usize, 8, 64] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("non_sticky", capacity),
            &capacity,
            |b, &capacity| {
                let queue = InputQueue::new(NonZeroUsize::new(capacity).unwrap(), false);
                b.iter(|| {
                    queue.append(RecordBox::new(1i32), false);
                    black_box(queue.pop());
                });
            },
        );
        group.bench_with_input(BenchmarkId::new("sticky", capacity), &capacity, |b, &capacity| {
            let queue = InputQueue::new(NonZeroUsize::new(capacity).unwrap(), true);
            queue.append(RecordBox::new(1i32), false);
            b.iter(|| {
                black_box(queue.pop());
            });
        });
    }
    group.finish();
}

fn bench_overflow_pressure(c: &mut Criterion) {
    c.bench_function("input_queue_overflow_drop_oldest", |b| {
        let queue = InputQueue::new(NonZeroUsize::new(4).unwrap(), false);
        b.iter(|| {
            for i in 0..8i32 {
                queue.append(RecordBox::new(i), false);
            }
            while !queue.is_empty() {
                black_box(queue.pop());
            }
        });
    });
}

criterion_group!(benches, bench_append_pop, bench_overflow_pressure);
criterion_main!(benches);

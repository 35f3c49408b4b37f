use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use foundation_handoff::{
    create_store, Backing, CancelToken, Exchange, ExchangeConfig, Handoff, SharedStore,
};
use std::thread;
use std::time::Duration;

const MESSAGES: u64 = 10_000;

/// Benchmark one producer thread pushing into a store drained by the bench thread.
fn bench_store_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("handoff_throughput");

    for backing in [
        Backing::Manual { capacity: 1 },
        Backing::Manual { capacity: 64 },
        Backing::Queue { capacity: Some(64) },
        Backing::Queue { capacity: None },
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(backing),
            &backing,
            |b, backing| {
                b.iter_batched(
                    || create_store::<u64>(*backing).unwrap(),
                    |store: SharedStore| {
                        let producer_store = store.clone();
                        let producer = thread::spawn(move || {
                            let cancel = CancelToken::new();
                            for value in 1..=MESSAGES {
                                producer_store.put(value, &cancel).unwrap();
                            }
                        });

                        let cancel = CancelToken::new();
                        for _ in 0..MESSAGES {
                            black_box(store.take(&cancel).unwrap());
                        }
                        producer.join().unwrap();
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

/// Benchmark an uncontended put immediately followed by a take.
fn bench_uncontended_round_trip(c: &mut Criterion) {
    let store = create_store::<u64>(Backing::Manual { capacity: 1 }).unwrap();
    let cancel = CancelToken::new();

    c.bench_function("manual_put_take_uncontended", |b| {
        b.iter(|| {
            store.put(black_box(7), &cancel).unwrap();
            black_box(store.take(&cancel).unwrap());
        });
    });
}

/// Benchmark a timed take that always expires.
fn bench_take_timeout(c: &mut Criterion) {
    let store = create_store::<u64>(Backing::Manual { capacity: 1 }).unwrap();
    let cancel = CancelToken::new();

    c.bench_function("manual_take_timeout_100us", |b| {
        b.iter(|| {
            black_box(store.take_timeout(Duration::from_micros(100), &cancel).is_err());
        });
    });
}

/// Benchmark the full orchestrated exchange without pacing.
fn bench_exchange(c: &mut Criterion) {
    c.bench_function("exchange_unpaced_1000", |b| {
        b.iter(|| {
            let config = ExchangeConfig::unpaced().count(1000);
            black_box(Exchange::new(config).run().unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_store_throughput,
    bench_uncontended_round_trip,
    bench_take_timeout,
    bench_exchange,
);
criterion_main!(benches);

//! View Folding Benchmarks - Hot-Path Performance Validation
//!
//! Benchmarks the merge step that runs on every accepted push frame.
//!
//! Run with: cargo bench --bench fold_bench

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use serde_json::json;

use live_feed_sync::domain::{Envelope, MergePolicy, PayloadShape, ViewState};

/// Benchmark a push into a full 50-entry ring.
fn bench_ring_push(c: &mut Criterion) {
    let policy = MergePolicy::RingBuffer { capacity: 50 };
    let mut view = ViewState::new(policy, false);
    for i in 0..50 {
        view.apply_push(policy, PayloadShape::Any, None, json!({"seq": i}));
    }

    c.bench_function("ring_push_full_50", |b| {
        b.iter(|| {
            view.apply_push(
                policy,
                PayloadShape::Any,
                None,
                black_box(json!({"seq": 1, "symbol": "BTC-USD", "side": "buy"})),
            )
        });
    });
}

/// Benchmark wholesale replacement with a 100-item list.
fn bench_replace(c: &mut Criterion) {
    let payload = json!((0..100).map(|i| json!({"id": i, "edge": 0.01})).collect::<Vec<_>>());
    let mut view = ViewState::new(MergePolicy::Replace, false);

    c.bench_function("replace_100_items", |b| {
        b.iter_batched(
            || payload.clone(),
            |p| view.apply_push(MergePolicy::Replace, PayloadShape::Array, None, p),
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark keyed upsert across a handful of exchanges.
fn bench_keyed_upsert(c: &mut Criterion) {
    let keys = ["binance", "okx", "kraken", "bybit"];
    let mut view = ViewState::new(MergePolicy::KeyedUpsert, false);
    let mut n = 0usize;

    c.bench_function("keyed_upsert_4_keys", |b| {
        b.iter(|| {
            n = (n + 1) % keys.len();
            view.apply_push(
                MergePolicy::KeyedUpsert,
                PayloadShape::Object,
                Some(keys[n]),
                black_box(json!({"last": 64_000.5, "bid": 63_999.0, "ask": 64_001.0})),
            )
        });
    });
}

/// Benchmark frame parse + envelope split.
fn bench_envelope(c: &mut Criterion) {
    let frame = r#"{"type":"signal","data":{"seq":42,"symbol":"ETH-USD","score":0.73}}"#;

    c.bench_function("parse_envelope", |b| {
        b.iter(|| {
            let value: serde_json::Value = serde_json::from_str(black_box(frame)).unwrap();
            Envelope::from_value(value).unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_ring_push,
    bench_replace,
    bench_keyed_upsert,
    bench_envelope,
);
criterion_main!(benches);

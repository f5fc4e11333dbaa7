//! Throughput Benchmark for PulseKV
//!
//! Measures the storage engine, the request parser and the dispatcher
//! under a few simple workloads.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pulsekv::commands::CommandHandler;
use pulsekv::protocol::{encode_command, RespParser};
use pulsekv::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;

/// Benchmark PUT operations
fn bench_put(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("put");
    group.throughput(Throughput::Elements(1));

    group.bench_function("put_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            engine.put(key, Bytes::from("small_value"), None);
            i += 1;
        });
    });

    group.bench_function("put_large", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(64 * 1024)); // 64KB value
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            engine.put(key, value.clone(), None);
            i += 1;
        });
    });

    group.bench_function("put_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("ttl:{}", i));
            engine.put(key, Bytes::from("value"), Some(Duration::from_secs(3600)));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..100_000 {
        let key = Bytes::from(format!("key:{}", i));
        let value = Bytes::from(format!("value:{}", i));
        engine.put(key, value, None);
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i % 100_000));
            black_box(engine.get(&key));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("missing:{}", i));
            black_box(engine.get(&key));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let engine = Arc::new(StorageEngine::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = Bytes::from(format!("key:{}:{}", t, i));
                            engine.put(key.clone(), Bytes::from("value"), None);
                            engine.get(&key);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(engine.len());
        });
    });

    group.finish();
}

/// Benchmark request decoding
fn bench_parse(c: &mut Criterion) {
    let mut parser = RespParser::new();
    let set = encode_command(&["SET", "user:101", "Nora"]);
    let blob = vec![b'x'; 16 * 1024];
    let large = encode_command(&[&b"SET"[..], &b"blob"[..], &blob[..]]);

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(1));

    group.bench_function("parse_set", |b| {
        b.iter(|| black_box(parser.parse(black_box(&set)).unwrap()));
    });

    group.bench_function("parse_set_16k", |b| {
        b.iter(|| black_box(parser.parse(black_box(&large)).unwrap()));
    });

    group.finish();
}

/// Benchmark the full decode -> dispatch -> encode path
fn bench_dispatch(c: &mut Criterion) {
    let handler = CommandHandler::new(Arc::new(StorageEngine::new()));
    let mut parser = RespParser::new();
    let request = encode_command(&["SET", "key", "value"]);

    c.bench_function("dispatch_set", |b| {
        b.iter(|| {
            let (args, _) = parser.parse(&request).unwrap().unwrap();
            black_box(handler.execute(args).serialize());
        });
    });
}

criterion_group!(
    benches,
    bench_put,
    bench_get,
    bench_concurrent,
    bench_parse,
    bench_dispatch,
);

criterion_main!(benches);

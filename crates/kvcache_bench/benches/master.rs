//! Master operation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kvcache_bench::{keys, mounted_service};
use kvcache_master::{Allocator, NodeId, SegmentId, SegmentRegistry};
use kvcache_plugin::connect;
use std::sync::Arc;

/// Benchmark a full put followed by a remove.
fn bench_put_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_cycle");

    for replicas in [1usize, 2, 3].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(replicas),
            replicas,
            |b, &replicas| {
                let service = mounted_service(4);
                b.iter(|| {
                    service.put_start("bench", 4096, replicas).unwrap();
                    service.put_end("bench").unwrap();
                    service.remove(black_box("bench")).unwrap();
                });
            },
        );
    }
    group.finish();
}

/// Benchmark replica lookups against a populated table.
fn bench_get_replica_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_replica_list");

    for count in [100, 10_000].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let service = mounted_service(4);
            let keys = keys(count);
            for key in &keys {
                service.put_start(key, 1024, 2).unwrap();
                service.put_end(key).unwrap();
            }

            let mut i = 0;
            b.iter(|| {
                let key = &keys[i % keys.len()];
                i += 1;
                black_box(service.get_replica_list(key).unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark allocator reserve and release on a fragmented segment set.
fn bench_allocator(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator");

    for segments in [1, 16, 128].iter() {
        group.bench_with_input(
            BenchmarkId::new("reserve_release", segments),
            segments,
            |b, &segments| {
                let registry = Arc::new(SegmentRegistry::new());
                for i in 0..segments {
                    registry
                        .mount(
                            &SegmentId::new(format!("seg-{i}")),
                            &NodeId::new(format!("node-{i}")),
                            1 << 30,
                        )
                        .unwrap();
                }
                let allocator = Allocator::new(registry);

                // Leave holes behind so first fit has to walk the free map.
                let held: Vec<_> = (0..256)
                    .map(|_| allocator.reserve(4096, 1).unwrap())
                    .collect();
                for allocation in held.iter().step_by(2) {
                    allocator.release(allocation);
                }

                b.iter(|| {
                    let allocation = allocator.reserve(black_box(8192), 1).unwrap();
                    allocator.release(&allocation);
                });
            },
        );
    }
    group.finish();
}

/// Benchmark segment mounts that persist to a file metadata store.
fn bench_persisted_mount(c: &mut Criterion) {
    c.bench_function("persisted_mount", |b| {
        let dir = tempfile::tempdir().unwrap();
        let conn = format!("file://{}", dir.path().display());
        let registry = SegmentRegistry::with_store(connect::metadata_store(&conn).unwrap());
        let owner = NodeId::new("node-0");

        let mut i = 0u64;
        b.iter(|| {
            let id = SegmentId::new(format!("seg-{i}"));
            i += 1;
            registry.mount(&id, &owner, 1 << 20).unwrap();
            registry.unmount(&id, true).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_put_cycle,
    bench_get_replica_list,
    bench_allocator,
    bench_persisted_mount,
);
criterion_main!(benches);

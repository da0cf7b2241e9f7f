// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for sample-ring draining and address resolution.

use arena_registry::{ArenaRegistry, RegistryLimits};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sample_profilers::{InMemoryRing, RingBuffer};

const PAGE: usize = 4096;
const EXTENT_SPAN: usize = 1 << 20;

fn registry_with_extents(n: usize) -> ArenaRegistry {
    let registry = ArenaRegistry::new(RegistryLimits {
        max_arenas: n.max(1),
        max_sites_per_arena: 1,
    })
    .unwrap();
    for i in 0..n {
        let arena = registry.create_arena(i as u32).unwrap();
        let start = 0x1000_0000 + i * EXTENT_SPAN;
        registry.register_extent(arena, start, start + EXTENT_SPAN).unwrap();
    }
    registry
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    for extents in [16usize, 256, 1024] {
        let registry = registry_with_extents(extents);
        let last = 0x1000_0000 + (extents - 1) * EXTENT_SPAN + 64;
        group.bench_with_input(BenchmarkId::from_parameter(extents), &last, |b, &addr| {
            let guard = registry.extents().read().unwrap();
            b.iter(|| guard.resolve(std::hint::black_box(addr)))
        });
    }
    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    let registry = registry_with_extents(64);
    c.bench_function("drain_1000_samples", |b| {
        let mem = InMemoryRing::new(PAGE, 16);
        let mut writer = mem.writer(PAGE);
        let mut ring = RingBuffer::new(mem, PAGE).unwrap();
        b.iter(|| {
            for i in 0..1000usize {
                let addr = 0x1000_0000 + (i % 64) * EXTENT_SPAN + i;
                writer.write_sample(1, addr as u64);
            }
            writer.publish();
            let guard = registry.extents().read().unwrap();
            let mut hits = 0u64;
            ring.drain(|addr| {
                if guard.resolve(addr as usize).is_some() {
                    hits += 1;
                }
            });
            hits
        })
    });
}

criterion_group!(benches, bench_resolve, bench_drain);
criterion_main!(benches);

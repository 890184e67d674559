// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Benchmarks for the disk queue.
//!
//! Measures:
//! - Single push latency with batched and per-message syncs
//! - Push then pop throughput at different message sizes
//! - Drain rate of a pre-filled queue

use std::{hint::black_box, thread, time::Duration};

use bytes::Bytes;
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use diskq_queue::{Queue, QueueBuilder};
use tempfile::TempDir;

/// Message sizes to benchmark (bytes)
const MESSAGE_SIZES: &[usize] = &[64, 256, 1024, 4096, 16384];

/// Number of messages for throughput tests
const BATCH_SIZE: usize = 10_000;

fn create_queue(temp_dir: &TempDir, sync_every: u64) -> Queue {
    QueueBuilder::new(temp_dir.path())
        .name("bench")
        .max_bytes_per_file(64 * 1024 * 1024)
        .sync_every(sync_every)
        .sync_timeout(Duration::from_secs(1))
        .open()
        .unwrap()
}

fn generate_message(size: usize) -> Bytes { Bytes::from(vec![0xABu8; size]) }

// =============================================================================
// Push Latency
// =============================================================================

fn bench_push_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_latency");

    for &size in MESSAGE_SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let queue = create_queue(&temp_dir, 1000);
            let msg = generate_message(size);

            b.iter(|| {
                queue.push(black_box(msg.clone())).unwrap();
            });

            queue.close().unwrap();
        });
    }

    group.finish();
}

/// Every push triggers an fsync of the segment and a metadata rewrite.
fn bench_push_latency_sync_every_message(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_latency_sync_every_message");
    group.sample_size(50);

    for &size in &[64, 256, 1024] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let queue = create_queue(&temp_dir, 1);
            let msg = generate_message(size);

            b.iter(|| {
                queue.push(black_box(msg.clone())).unwrap();
            });

            queue.close().unwrap();
        });
    }

    group.finish();
}

// =============================================================================
// Throughput
// =============================================================================

/// One producer thread and one consumer moving `BATCH_SIZE` messages.
fn bench_push_pop_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_pop_throughput");
    group.sample_size(20);

    for &size in MESSAGE_SIZES {
        group.throughput(Throughput::Bytes((size * BATCH_SIZE) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let temp_dir = TempDir::new().unwrap();
                    let queue = create_queue(&temp_dir, 1000);
                    (temp_dir, queue, generate_message(size))
                },
                |(temp_dir, queue, msg)| {
                    let pop = queue.pop();
                    thread::scope(|s| {
                        s.spawn(|| {
                            for _ in 0..BATCH_SIZE {
                                queue.push(msg.clone()).unwrap();
                            }
                        });
                        for _ in 0..BATCH_SIZE {
                            black_box(pop.recv().unwrap());
                        }
                    });
                    queue.close().unwrap();
                    drop(temp_dir);
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

/// Pops everything from a queue filled before measurement starts.
fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain");
    group.sample_size(20);

    let msg_size = 256;
    for &count in &[1000, 5000, 10000] {
        group.throughput(Throughput::Bytes((msg_size * count) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let temp_dir = TempDir::new().unwrap();
                    let queue = create_queue(&temp_dir, 1000);
                    let msg = generate_message(msg_size);
                    for _ in 0..count {
                        queue.push(msg.clone()).unwrap();
                    }
                    (temp_dir, queue)
                },
                |(temp_dir, queue)| {
                    let pop = queue.pop();
                    for _ in 0..count {
                        black_box(pop.recv().unwrap());
                    }
                    queue.close().unwrap();
                    drop(temp_dir);
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_push_latency,
    bench_push_latency_sync_every_message,
    bench_push_pop_throughput,
    bench_drain,
);
criterion_main!(benches);

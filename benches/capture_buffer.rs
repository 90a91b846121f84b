//! Criterion benchmarks for the capture hot path.
//!
//! Every `capture` call goes through a `CaptureBuffer` pop, and every frame a
//! driver acquires goes through a push, so these set the baseline cost of
//! the hand-off between acquisition threads and consumers.
//!
//! Key metrics:
//! - Uncontended push/pop latency for small and image-sized frames
//! - Producer/consumer throughput across threads for several buffer sizes
//! - End-to-end capture from the test pattern camera
//!
//! Run with: cargo bench --bench capture_buffer

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sensor_hal::config::HalConfig;
use sensor_hal::{CaptureBuffer, Hal};
use std::sync::Arc;
use std::thread;

/// Push then pop on one thread; no waiting involved.
fn push_pop_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("capture_buffer_push_pop");

    let sizes = vec![("scalar", 8), ("vga_mono", 640 * 480), ("hd_rgb", 1280 * 720 * 3)];

    for (name, size) in sizes {
        let buffer = CaptureBuffer::new(35).unwrap();
        let frame = vec![0u8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("push_pop", name), &size, |b, _| {
            b.iter(|| {
                buffer.push(black_box(frame.clone())).unwrap();
                black_box(buffer.pop().unwrap());
            });
        });
    }

    group.finish();
}

/// One producer thread and one consumer, varying the buffer depth.
fn producer_consumer_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("capture_buffer_threads");
    let frames = 10_000u64;

    for capacity in [1usize, 4, 35, 256] {
        group.throughput(Throughput::Elements(frames));
        group.bench_with_input(
            BenchmarkId::new("capacity", capacity),
            &capacity,
            |b, &capacity| {
                b.iter(|| {
                    let buffer = Arc::new(CaptureBuffer::new(capacity).unwrap());
                    let producer = {
                        let buffer = Arc::clone(&buffer);
                        thread::spawn(move || {
                            for i in 0..frames {
                                buffer.push(i).unwrap();
                            }
                            buffer.finish();
                        })
                    };

                    let mut received = 0u64;
                    while let Ok(frame) = buffer.pop() {
                        black_box(frame);
                        received += 1;
                    }
                    producer.join().unwrap();
                    assert_eq!(received, frames);
                });
            },
        );
    }

    group.finish();
}

/// Full `create` + `capture` path through the registry.
fn test_pattern_capture(c: &mut Criterion) {
    let hal = Hal::from_config(&HalConfig::default()).unwrap();
    let camera = hal
        .cameras()
        .create("test://?width=320&height=240", None)
        .unwrap();
    let converted = hal
        .cameras()
        .create("convert:[fmt=RGB8]//test://?width=320&height=240", None)
        .unwrap();

    let mut group = c.benchmark_group("camera_capture");
    group.throughput(Throughput::Bytes(320 * 240));
    group.bench_function("test_pattern", |b| {
        b.iter(|| black_box(camera.capture().unwrap()));
    });
    group.bench_function("test_pattern_to_rgb8", |b| {
        b.iter(|| black_box(converted.capture().unwrap()));
    });
    group.finish();
}

criterion_group!(
    benches,
    push_pop_uncontended,
    producer_consumer_throughput,
    test_pattern_capture
);
criterion_main!(benches);

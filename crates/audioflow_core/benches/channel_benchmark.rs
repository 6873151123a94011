//! Flow-controlled channel benchmarks
//!
//! Measures the queue every capture buffer and playback chunk passes through.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use audioflow_core::{AudioBuffer, FlowControlledChannel};

fn benchmark_push_pull(c: &mut Criterion) {
    let mut group = c.benchmark_group("flow_controlled_channel");

    // Typical hardware buffer sizes, stereo f32
    for frames in [128usize, 256, 512, 1024].iter() {
        let bytes = frames * 2 * 4;
        let channel = FlowControlledChannel::new(16384);
        let buffer = AudioBuffer::new(vec![0u8; bytes]);

        group.throughput(Throughput::Bytes(bytes as u64));
        group.bench_function(format!("push_pull_{}_frames", frames), |b| {
            b.iter(|| {
                channel.push(black_box(buffer.clone()), bytes);
                black_box(channel.try_pull());
            })
        });
    }

    group.finish();
}

fn benchmark_burst(c: &mut Criterion) {
    let channel = FlowControlledChannel::new(16384);

    c.bench_function("burst_of_16", |b| {
        b.iter(|| {
            for i in 0..16u32 {
                channel.push(black_box(i), 1024);
            }
            while let Some(Some(item)) = channel.try_pull() {
                black_box(item.ok());
            }
        })
    });
}

criterion_group!(benches, benchmark_push_pull, benchmark_burst);
criterion_main!(benches);

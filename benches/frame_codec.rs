//! Criterion benchmarks for frame encode and decode throughput.

use bytes::BufMut;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use framelink::{Compression, FrameHeader, OutboundFrame, frame::HEADER_SIZE};

const PAYLOAD_SIZES: &[usize] = &[64, 4 * 1024, 64 * 1024];

fn payload(len: usize) -> Vec<u8> { (0..len).map(|i| (i % 251) as u8).collect() }

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame/encode");
    for &size in PAYLOAD_SIZES {
        let body = payload(size);
        group.throughput(Throughput::Bytes(size as u64));
        for compression in [Compression::None, Compression::Lz4, Compression::Zstd] {
            group.bench_function(
                BenchmarkId::new(format!("{compression:?}"), size),
                |b| {
                    b.iter(|| {
                        let mut frame = OutboundFrame::new();
                        frame.set_method_id(7);
                        frame.set_compression(compression);
                        frame.set_min_compression_bytes(0);
                        frame.buffer_mut().put_slice(&body);
                        black_box(frame.encode(1).expect("encode"))
                    });
                },
            );
        }
    }
    group.finish();
}

fn bench_header_decode(c: &mut Criterion) {
    let mut frame = OutboundFrame::new();
    frame.buffer_mut().put_slice(&payload(256));
    let wire = frame.encode(9).expect("encode");
    let mut header_buf = [0u8; HEADER_SIZE];
    header_buf.copy_from_slice(&wire[..HEADER_SIZE]);

    c.bench_function("frame/decode_header", |b| {
        b.iter(|| black_box(FrameHeader::decode(black_box(&header_buf)).expect("decode")));
    });
}

criterion_group!(benches, bench_encode, bench_header_decode);
criterion_main!(benches);

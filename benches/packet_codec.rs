//! Benchmarks for packet encoding, decoding and dispatch
//!
//! Covers the per-packet work on the hot path:
//! - Building data packets of typical subtitle payload sizes
//! - Decoding and typed field access on received buffers
//! - Queue-to-decoder dispatch through a running session
//!
//! Platform: Cross-platform (headless graphics, mock controllers)

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use subtrack::protocol::decode;
use subtrack::test_utils::{MockControllerFactory, wait_until};
use subtrack::{CcAttributes, DataType, PacketCodec, RenderSession};

const PAYLOAD_SIZES: [usize; 3] = [64, 1024, 16 * 1024];

fn bench_encode(c: &mut Criterion) {
    let codec = PacketCodec::default();
    let mut group = c.benchmark_group("encode");

    for size in PAYLOAD_SIZES {
        let payload = vec![0x47u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("ttml_data", size), &payload, |b, payload| {
            b.iter(|| black_box(codec.encode_ttml_data(black_box(payload), -3500)))
        });
        group.bench_with_input(BenchmarkId::new("pes_data", size), &payload, |b, payload| {
            b.iter(|| black_box(codec.encode_pes_data(black_box(payload))))
        });
    }

    group.bench_function("cc_attributes", |b| {
        let attributes = CcAttributes::default();
        b.iter(|| black_box(codec.encode_cc_attributes(black_box(&attributes))))
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let codec = PacketCodec::default();
    let mut group = c.benchmark_group("decode");

    for size in PAYLOAD_SIZES {
        let buffer = codec.encode_webvtt_data(&vec![b'a'; size], 3000);
        group.throughput(Throughput::Bytes(buffer.len() as u64));
        group.bench_with_input(BenchmarkId::new("webvtt_data", size), &buffer, |b, buffer| {
            b.iter(|| {
                let packet = decode(black_box(buffer)).unwrap();
                black_box((packet.display_offset_ms().unwrap(), packet.data().unwrap().len()))
            })
        });
    }

    let selection = codec.encode_cc_selection(subtrack::CcServiceType::Cea608, 1000);
    group.bench_function("cc_selection", |b| {
        b.iter(|| black_box(decode(black_box(&selection)).unwrap().selection().unwrap()))
    });

    group.finish();
}

fn bench_session_dispatch(c: &mut Criterion) {
    let factory = MockControllerFactory::new();
    factory.set_wait_time(std::time::Duration::from_millis(1));
    let mut session = RenderSession::builder("bench").controllers(Arc::new(factory.clone())).build();
    session.start().unwrap();
    session.select_ttml_service(1920, 1080).unwrap();
    let payload = vec![b'x'; 1024];

    c.bench_function("session_send_ttml_1k", |b| {
        b.iter(|| {
            black_box(session.send_data(DataType::Ttml, black_box(&payload), 0));
        })
    });

    wait_until(std::time::Duration::from_secs(5), || session.queued_packets() == 0);
    session.stop();
}

criterion_group!(benches, bench_encode, bench_decode, bench_session_dispatch);
criterion_main!(benches);

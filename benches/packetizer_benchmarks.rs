//! Benchmarks for the capture hot paths
//!
//! Run with: cargo bench --bench packetizer_benchmarks
//!
//! Covers NAL parsing, RTP packetization and raw frame demuxing at the
//! sizes a live 720p/1080p capture produces.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ffcapture::demux::{AudioChunk, VideoFrame};
use ffcapture::h264::{split_annex_b, NalParser, NalUnit};
use ffcapture::rtp::{H264Packetizer, PacketizerConfig};
use std::time::Duration;

/// NAL unit of `size` bytes with a pattern free of start codes.
fn generate_nal(header: u8, size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    data.push(header);
    data.extend((1..size).map(|i| (i % 251) as u8 + 1));
    data
}

/// SPS, PPS, one IDR slice and `p_frames` P slices.
fn generate_stream(idr_size: usize, p_size: usize, p_frames: usize) -> Vec<u8> {
    let mut stream = Vec::new();
    let mut push = |nal: Vec<u8>| {
        stream.extend_from_slice(&[0, 0, 0, 1]);
        stream.extend(nal);
    };
    push(vec![0x67, 0x42, 0xC0, 0x1F, 0x8C, 0x8D, 0x40]);
    push(vec![0x68, 0xCE, 0x3C, 0x80]);
    push(generate_nal(0x65, idr_size));
    for _ in 0..p_frames {
        push(generate_nal(0x41, p_size));
    }
    stream
}

fn bench_rtp_packetization(c: &mut Criterion) {
    let mut group = c.benchmark_group("RTP Packetization");
    group.measurement_time(Duration::from_secs(5));

    let nal_sizes = [
        (512, "512B"),     // single packet
        (4096, "4KB"),     // P slice
        (65536, "64KB"),   // 720p IDR
        (262144, "256KB"), // 1080p IDR
    ];

    for (size, name) in nal_sizes {
        let nal = NalUnit::parse(Bytes::from(generate_nal(0x65, size))).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("h264_packetize", name), &nal, |b, nal| {
            let mut packetizer = H264Packetizer::new(PacketizerConfig::default()).unwrap();
            b.iter(|| {
                let packets = packetizer.packetize(black_box(nal));
                black_box(packets);
            });
        });
    }

    group.finish();
}

fn bench_nal_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("NAL Parsing");
    group.measurement_time(Duration::from_secs(5));

    let stream = generate_stream(65536, 8192, 29);
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("split_annex_b", |b| {
        b.iter(|| black_box(split_annex_b(black_box(&stream))));
    });

    for chunk in [1024usize, 4096, 65536] {
        group.bench_with_input(BenchmarkId::new("streaming", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut parser = NalParser::new();
                let mut count = 0;
                for piece in stream.chunks(chunk) {
                    count += parser.feed(piece).len();
                }
                count += parser.flush().map_or(0, |_| 1);
                black_box(count)
            });
        });
    }

    group.finish();
}

fn bench_demux(c: &mut Criterion) {
    let mut group = c.benchmark_group("Raw Demux");

    let resolutions = [(640u32, 480u32, "480p"), (1280, 720, "720p"), (1920, 1080, "1080p")];
    for (width, height, name) in resolutions {
        let data = vec![0x80u8; (width * height * 3 / 2) as usize];
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("yuv420p", name), &data, |b, data| {
            b.iter(|| black_box(VideoFrame::from_yuv420p(black_box(data), width, height).unwrap()));
        });
    }

    // 20 ms of 48 kHz stereo
    let pcm = vec![0x11u8; 3840];
    group.throughput(Throughput::Bytes(pcm.len() as u64));
    group.bench_function("s16le_20ms_stereo", |b| {
        b.iter(|| black_box(AudioChunk::from_s16le(black_box(&pcm), 2, 48000).unwrap()));
    });

    group.finish();
}

criterion_group!(
    capture_benches,
    bench_rtp_packetization,
    bench_nal_parsing,
    bench_demux,
);

criterion_main!(capture_benches);

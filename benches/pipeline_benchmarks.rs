use std::sync::Arc;
use std::time::Instant;

use airplay_bridge::audio::{AudioPipeline, FrameQueue, JitterConfig, StreamParameters, StreamResampler};
use airplay_bridge::protocol::rtp::RtpPacket;
use airplay_bridge::protocol::rtsp::{Method, RtspServerCodec};
use airplay_bridge::testing::{RequestBuilder, encode_request, ramp_packet};
use bytes::Bytes;
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

const FRAMES: u32 = 352;

fn pcm_payload() -> Bytes {
    ramp_packet(0, FRAMES as usize)
        .iter()
        .flat_map(|s| s.to_be_bytes())
        .collect::<Vec<u8>>()
        .into()
}

fn pipeline_benchmark(c: &mut Criterion) {
    let params = StreamParameters::pcm(44_100, 2, FRAMES);
    let payload = pcm_payload();

    for output_rate in [44_100, 16_000] {
        c.bench_function(&format!("pipeline_pcm_to_{output_rate}"), |b| {
            b.iter_batched(
                || {
                    let queue = Arc::new(FrameQueue::new(1024));
                    let pipeline =
                        AudioPipeline::new(&params, output_rate, JitterConfig::default(), queue)
                            .unwrap();
                    (pipeline, payload.clone())
                },
                |(mut pipeline, payload)| {
                    let now = Instant::now();
                    for seq in 0..256u16 {
                        black_box(pipeline.push_packet(seq, payload.clone(), now));
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
}

fn resampler_benchmark(c: &mut Criterion) {
    let input = ramp_packet(0, FRAMES as usize);

    c.bench_function("resample_44100_to_16000", |b| {
        let mut resampler = StreamResampler::new(44_100, 16_000, 2);
        b.iter(|| black_box(resampler.process(black_box(&input))));
    });
}

fn codec_benchmark(c: &mut Criterion) {
    let packet = RtpPacket::audio(100, 35_200, 0x1234, pcm_payload().to_vec(), false).encode();
    c.bench_function("rtp_decode", |b| {
        b.iter(|| black_box(RtpPacket::decode(black_box(&packet)).unwrap()));
    });

    let request = encode_request(
        &RequestBuilder::new(Method::SetParameter, "rtsp://127.0.0.1/3413821438")
            .cseq(7)
            .session("0000BEEF")
            .content_type("text/parameters")
            .body(b"volume: -15.000000\r\n".to_vec())
            .build(),
    );
    c.bench_function("rtsp_request_decode", |b| {
        b.iter(|| {
            let mut codec = RtspServerCodec::new();
            codec.feed(black_box(&request));
            black_box(codec.decode().unwrap())
        });
    });
}

criterion_group!(benches, pipeline_benchmark, resampler_benchmark, codec_benchmark);
criterion_main!(benches);

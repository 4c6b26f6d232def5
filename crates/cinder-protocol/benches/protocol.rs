//! Parse and serialize micro-benchmarks.
//!
//! Run with `cargo bench -p cinder-protocol`.

use std::hint::black_box;

use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, Criterion};

use cinder_protocol::{parse_frame, parse_frame_bytes, Frame};

fn bench_parse_command(c: &mut Criterion) {
    let input = b"*3\r\n$3\r\nSET\r\n$8\r\nsome:key\r\n$11\r\nhello world\r\n";

    c.bench_function("parse_set_command", |b| {
        b.iter(|| black_box(parse_frame(black_box(input))));
    });

    let zero_copy = Bytes::from_static(input);
    c.bench_function("parse_set_command_zerocopy", |b| {
        b.iter(|| black_box(parse_frame_bytes(black_box(&zero_copy))));
    });
}

fn bench_parse_pipeline(c: &mut Criterion) {
    let mut pipeline = Vec::new();
    for i in 0..100 {
        pipeline.extend_from_slice(format!("*2\r\n$3\r\nGET\r\n$6\r\nkey:{i:02}\r\n").as_bytes());
    }
    let pipeline = Bytes::from(pipeline);

    c.bench_function("parse_pipeline_100", |b| {
        b.iter(|| {
            let mut remaining = pipeline.clone();
            while let Ok(Some((frame, consumed))) = parse_frame_bytes(&remaining) {
                black_box(frame);
                remaining = remaining.slice(consumed..);
                if remaining.is_empty() {
                    break;
                }
            }
        });
    });
}

fn bench_serialize(c: &mut Criterion) {
    let reply = Frame::Array(vec![
        Frame::bulk("one"),
        Frame::bulk("two"),
        Frame::Integer(42),
        Frame::NullBulk,
    ]);

    c.bench_function("serialize_array_reply", |b| {
        let mut buf = BytesMut::with_capacity(256);
        b.iter(|| {
            buf.clear();
            reply.serialize(&mut buf);
            black_box(&buf);
        });
    });
}

criterion_group!(benches, bench_parse_command, bench_parse_pipeline, bench_serialize);
criterion_main!(benches);

use std::hint::black_box;
use std::io::Cursor;

use criterion::{Criterion, criterion_group, criterion_main};
use yaap_protocol::{
    Code, MethodCall, MethodReply, Request, Response, codec::DEFAULT_MAX_MESSAGE_SIZE,
    payload::PayloadWriter,
};

fn shift_batch(calls: usize, bytes: usize) -> Request {
    let mut args = PayloadWriter::new();
    args.u32((bytes * 8) as u32).bytes(&vec![0xA5; bytes]);
    let payload = args.into_inner();
    Request::new(
        0x1234_5678,
        (0..calls)
            .map(|_| MethodCall::new(3, 9, payload.clone()))
            .collect(),
    )
}

fn bench_request_decoding(c: &mut Criterion) {
    let mut data = Vec::new();
    shift_batch(64, 512).write_to(&mut data).unwrap();
    c.bench_function("decode_shift_batch", |b| {
        b.iter(|| {
            Request::from_reader(&mut Cursor::new(black_box(&data)), DEFAULT_MAX_MESSAGE_SIZE)
                .unwrap()
        });
    });
}

fn bench_response_encoding(c: &mut Criterion) {
    let response = Response {
        status: vec![],
        errors: vec![],
        replies: (0..64)
            .map(|_| MethodReply::new(Code::SUCCESS, vec![0x5A; 516]))
            .collect(),
    };
    c.bench_function("encode_shift_replies", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(response.encoded_len());
            black_box(&response).write_to(&mut out).unwrap();
            out
        });
    });
}

criterion_group!(benches, bench_request_decoding, bench_response_encoding);
criterion_main!(benches);

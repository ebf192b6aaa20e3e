use astrid::core::chat_stream::{SseEventParser, StreamEvent};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

fn text_stream(deltas: usize) -> Vec<u8> {
    let mut body = String::new();
    for i in 0..deltas {
        body.push_str(&format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"token {i} \"}}}}]}}\n\n"
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body.into_bytes()
}

fn tool_call_stream(fragments: usize) -> Vec<u8> {
    let mut body = String::from(
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"calculator\",\"arguments\":\"\"}}]}}]}\n\n",
    );
    for _ in 0..fragments {
        body.push_str(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"1+\"}}]}}]}\n\n",
        );
    }
    body.push_str("data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n");
    body.push_str("data: [DONE]\n\n");
    body.into_bytes()
}

fn parse_in_chunks(body: &[u8], chunk_size: usize) -> usize {
    let mut parser = SseEventParser::new();
    let mut events: Vec<StreamEvent> = Vec::new();
    for chunk in body.chunks(chunk_size) {
        parser.push_chunk(chunk, &mut events);
    }
    parser.finish(&mut events);
    events.len()
}

fn bench_sse_parse(c: &mut Criterion) {
    for (name, body) in [
        ("text_deltas", text_stream(2_000)),
        ("tool_call_fragments", tool_call_stream(2_000)),
    ] {
        let mut group = c.benchmark_group(format!("sse_parse_{name}"));
        group.throughput(Throughput::Bytes(body.len() as u64));
        // Small chunks force more line reassembly across reads.
        for &chunk_size in &[64usize, 1024, 16 * 1024] {
            group.bench_with_input(
                BenchmarkId::from_parameter(chunk_size),
                &chunk_size,
                |b, &size| b.iter(|| black_box(parse_in_chunks(black_box(&body), size))),
            );
        }
        group.finish();
    }
}

criterion_group!(benches, bench_sse_parse);
criterion_main!(benches);

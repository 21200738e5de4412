use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn ngram_bench(c: &mut Criterion) {
    let sample = include_str!("../src/shard/reader.rs");

    c.bench_function("scan_trigrams", |b| {
        b.iter(|| {
            let n = zoekt_shard::ngram::ngrams(black_box(sample)).count();
            black_box(n)
        })
    });

    c.bench_function("build_small_shard", |b| {
        b.iter(|| {
            let mut builder = zoekt_shard::IndexBuilder::new(None).unwrap();
            builder.add_file("reader.rs", sample.as_bytes()).unwrap();
            let mut buf = Vec::new();
            builder.write(&mut buf).unwrap();
            black_box(buf.len())
        })
    });
}

criterion_group!(benches, ngram_bench);
criterion_main!(benches);

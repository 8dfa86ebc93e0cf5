//! Benchmarks for the progress aggregator, which runs once per extractor sample.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use ytbulk::services::progress::{aggregate, format_bytes};
use ytbulk::services::{ProgressSample, UrlFilter};

fn bench_aggregate(c: &mut Criterion) {
    let sample =
        ProgressSample::downloading(734_003_200, Some(1_073_741_824)).with_speed(5_242_880.0, 65);

    c.bench_function("aggregate", |b| {
        b.iter(|| aggregate(black_box(3), black_box(10), black_box(&sample)))
    });
}

fn bench_format_bytes(c: &mut Criterion) {
    c.bench_function("format_bytes", |b| {
        b.iter(|| format_bytes(black_box(1_099_511_627_776)))
    });
}

fn bench_url_filter(c: &mut Criterion) {
    let filter = UrlFilter::new();
    let input = (0..200)
        .map(|i| {
            if i % 10 == 0 {
                format!("https://example.com/{}", i)
            } else {
                format!("https://www.youtube.com/watch?v=video{:06}", i)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    c.bench_function("filter_200_lines", |b| {
        b.iter(|| filter.filter_text(black_box(&input)))
    });
}

criterion_group!(benches, bench_aggregate, bench_format_bytes, bench_url_filter);
criterion_main!(benches);

//! Criterion microbenches for urlset parsing hot paths.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the performance of:
//! - directory listing scanning (parse_listing)
//! - annotation conversion (from_annotation_str + convert)
//! - suffix cache parsing (from_cache_str)

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::fmt::Write;
use std::hint::black_box;

use urlset::annotation::{convert, from_annotation_str, ClassMapping, ConvertOptions};
use urlset::suffix::{from_cache_str, parse_listing};

fn listing_fixture(files: usize) -> String {
    let mut page = String::from("<html><body><pre>\n");
    for n in 0..files {
        let name = format!("image-{n:07}_T{n:05}x.jpg");
        let _ = writeln!(page, "<a href=\"{name}\">{name}</a>   01-Jan-2024 00:00   183201");
    }
    page.push_str("</pre></body></html>\n");
    page
}

fn annotation_fixture(images: usize) -> String {
    let mut yaml = String::from("images:\n");
    for n in 0..images {
        let _ = writeln!(yaml, "  - meta: image-{n:07}.jpg, 1920, 1080");
        yaml.push_str("    annotations:\n");
        for b in 0..4 {
            let x = (n * 7 + b * 40) % 1800;
            let _ = writeln!(yaml, "      - 10, {x}, 200, {}, 400, 0", x + 60);
        }
    }
    yaml
}

fn cache_fixture(records: usize) -> String {
    let mut text = String::new();
    for n in 0..records {
        let _ = writeln!(text, "{},{n:07},T{n:05}x", 145 + n % 10);
    }
    text
}

/// Benchmark scanning a listing page for suffixed file names.
fn bench_parse_listing(c: &mut Criterion) {
    let page = listing_fixture(2000);
    let mut group = c.benchmark_group("listing_parse");
    group.throughput(Throughput::Bytes(page.len() as u64));

    group.bench_function("parse_listing", |b| {
        b.iter(|| black_box(parse_listing(black_box(&page))))
    });

    group.finish();
}

/// Benchmark parsing and converting an annotation export.
fn bench_convert(c: &mut Criterion) {
    let yaml = annotation_fixture(500);
    let opts = ConvertOptions {
        class_mapping: ClassMapping::new([(1, 1), (3, 1), (10, 0)]),
    };
    let mut group = c.benchmark_group("annotation_convert");
    group.throughput(Throughput::Bytes(yaml.len() as u64));

    group.bench_function("from_annotation_str+convert", |b| {
        b.iter(|| {
            let source = from_annotation_str(black_box(&yaml)).unwrap();
            black_box(convert(&source, &opts))
        })
    });

    group.finish();
}

/// Benchmark loading a suffix cache.
fn bench_cache_parse(c: &mut Criterion) {
    let text = cache_fixture(20_000);
    let mut group = c.benchmark_group("cache_parse");
    group.throughput(Throughput::Bytes(text.len() as u64));

    group.bench_function("from_cache_str", |b| {
        b.iter(|| black_box(from_cache_str(black_box(&text)).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_parse_listing, bench_convert, bench_cache_parse);
criterion_main!(benches);

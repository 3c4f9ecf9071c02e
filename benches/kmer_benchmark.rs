#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::uninlined_format_args,
    clippy::semicolon_if_nothing_returned
)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kmtricks::kmer::Kmer;

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("Kmer::encode");

    for k in [11, 21, 31] {
        let seq = "ACGT".repeat(k / 4 + 1);
        let seq = &seq.as_bytes()[..k];

        group.bench_with_input(BenchmarkId::from_parameter(k), &seq, |b, seq| {
            b.iter(|| Kmer::<u64>::encode(black_box(seq)))
        });
    }

    group.finish();
}

fn bench_canonical_no_alloc(c: &mut Criterion) {
    // "AAAA..." is already its own reverse complement's lexical min.
    let mut group = c.benchmark_group("Kmer::canonical_no_alloc");

    for k in [11, 21, 31] {
        let seq = "A".repeat(k);
        let kmer = Kmer::<u64>::encode(seq.as_bytes()).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(k), &kmer, |b, &kmer| {
            b.iter(|| black_box(kmer).canonical())
        });
    }

    group.finish();
}

fn bench_canonical_needs_swap(c: &mut Criterion) {
    let mut group = c.benchmark_group("Kmer::canonical_needs_swap");

    for k in [11, 21, 31] {
        let seq = "T".repeat(k);
        let kmer = Kmer::<u64>::encode(seq.as_bytes()).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(k), &kmer, |b, &kmer| {
            b.iter(|| black_box(kmer).canonical())
        });
    }

    group.finish();
}

fn bench_reverse_complement(c: &mut Criterion) {
    let mut group = c.benchmark_group("Kmer::reverse_complement");

    for k in [11, 21, 31] {
        let seq = "ACGT".repeat(k / 4 + 1);
        let kmer = Kmer::<u64>::encode(&seq.as_bytes()[..k]).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(k), &kmer, |b, &kmer| {
            b.iter(|| black_box(kmer).reverse_complement())
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("Kmer::decode");

    for k in [11, 21, 31] {
        let seq = "ACGT".repeat(k / 4 + 1);
        let kmer = Kmer::<u64>::encode(&seq.as_bytes()[..k]).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(k), &kmer, |b, &kmer| {
            b.iter(|| black_box(kmer).decode())
        });
    }

    group.finish();
}

fn bench_fast_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("Kmer::fast_hash");

    for k in [11, 21, 31] {
        let seq = "ACGT".repeat(k / 4 + 1);
        let kmer = Kmer::<u64>::encode(&seq.as_bytes()[..k]).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(k), &kmer, |b, &kmer| {
            b.iter(|| black_box(kmer).fast_hash())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_canonical_no_alloc,
    bench_canonical_needs_swap,
    bench_reverse_complement,
    bench_decode,
    bench_fast_hash,
);
criterion_main!(benches);

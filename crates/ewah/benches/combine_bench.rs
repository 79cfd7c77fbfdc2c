use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ewah::Bitmap;

/// Every 3rd bit over ~1M positions: literal-heavy.
fn literal_heavy() -> Bitmap {
    Bitmap::from_positions((0..1_000_000u64).filter(|i| i % 3 == 0))
}

/// A few long stretches: run-heavy.
fn run_heavy() -> Bitmap {
    let mut bm = Bitmap::new();
    for start in (0..1_000_000u64).step_by(200_000) {
        for i in start..start + 50_000 {
            bm.set(i);
        }
    }
    bm
}

fn combinators(c: &mut Criterion) {
    let a = literal_heavy();
    let b = run_heavy();

    let mut group = c.benchmark_group("combine");
    group.throughput(Throughput::Bytes((a.size_in_bytes() + b.size_in_bytes()) as u64));

    group.bench_function("and", |bench| {
        bench.iter(|| black_box(&a).and(black_box(&b)))
    });

    group.bench_function("or", |bench| {
        bench.iter(|| black_box(&a).or(black_box(&b)))
    });

    group.bench_function("xor", |bench| {
        bench.iter(|| black_box(&a).xor(black_box(&b)))
    });

    group.bench_function("and_not", |bench| {
        bench.iter(|| black_box(&a).and_not(black_box(&b)))
    });

    group.bench_function("intersects", |bench| {
        bench.iter(|| black_box(&a).intersects(black_box(&b)))
    });

    group.finish();
}

fn construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    group.bench_function("set_every_3rd_of_100k", |bench| {
        bench.iter(|| {
            let mut bm = Bitmap::new();
            for i in (0..100_000u64).step_by(3) {
                bm.set(i);
            }
            bm
        })
    });

    group.bench_function("contiguous_100k", |bench| {
        bench.iter(|| {
            let mut bm = Bitmap::new();
            for i in 0..100_000u64 {
                bm.set(i);
            }
            bm
        })
    });

    group.finish();
}

fn queries(c: &mut Criterion) {
    let bm = literal_heavy();

    let mut group = c.benchmark_group("query");

    group.bench_function("cardinality", |bench| {
        bench.iter(|| black_box(&bm).cardinality())
    });

    group.bench_function("iterate_all", |bench| {
        bench.iter(|| black_box(&bm).iter().count())
    });

    group.bench_function("runs_all", |bench| {
        bench.iter(|| black_box(&bm).runs().count())
    });

    group.bench_function("contains_miss", |bench| {
        bench.iter(|| black_box(&bm).contains(black_box(999_998)))
    });

    group.finish();
}

fn aggregation(c: &mut Criterion) {
    let parts: Vec<Bitmap> = (0..16u64)
        .map(|k| Bitmap::from_positions((k * 31..500_000).step_by(97)))
        .collect();

    let mut group = c.benchmark_group("aggregate");

    group.bench_function("union_of_16", |bench| {
        bench.iter(|| Bitmap::union_of(black_box(&parts)))
    });

    group.bench_function("intersection_of_16", |bench| {
        bench.iter(|| Bitmap::intersection_of(black_box(&parts)))
    });

    group.finish();
}

fn serialization(c: &mut Criterion) {
    let bm = literal_heavy();
    let bytes = bm.to_bytes().unwrap();

    let mut group = c.benchmark_group("serialize");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("encode", |bench| {
        bench.iter(|| black_box(&bm).to_bytes().unwrap())
    });

    group.bench_function("decode", |bench| {
        bench.iter(|| Bitmap::from_bytes(black_box(&bytes)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, combinators, construction, queries, aggregation, serialization);
criterion_main!(benches);

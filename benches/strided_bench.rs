use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strided_nd::{DType, NdArray};

fn square(size: usize) -> NdArray {
    let n = (size * size) as f64;
    let side = size as isize;
    match NdArray::arange(0.0, n, 1.0, None).and_then(|a| a.reshape(&[side, side])) {
        Ok(a) => a,
        Err(err) => panic!("square({size}) failed: {err}"),
    }
}

fn bench_materialize_transposed(c: &mut Criterion) {
    let mut group = c.benchmark_group("materialize_transposed");
    for size in [100usize, 500, 1000] {
        group.throughput(Throughput::Elements((size * size) as u64));
        let a = square(size);
        let a_t = match a.transpose(None) {
            Ok(t) => t,
            Err(err) => panic!("transpose failed: {err}"),
        };

        group.bench_with_input(BenchmarkId::new("contiguous", size), &size, |b, _| {
            b.iter(|| a.materialize())
        });
        group.bench_with_input(BenchmarkId::new("transposed", size), &size, |b, _| {
            b.iter(|| a_t.materialize())
        });
    }
    group.finish();
}

fn bench_add_mixed_strides(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_mixed_strides");
    for size in [100usize, 500, 1000] {
        group.throughput(Throughput::Elements((size * size) as u64));
        let a = square(size);
        let b = square(size);
        let a_t = match a.transpose(None) {
            Ok(t) => t,
            Err(err) => panic!("transpose failed: {err}"),
        };

        group.bench_with_input(BenchmarkId::new("contiguous", size), &size, |bench, _| {
            bench.iter(|| a.add(&b))
        });
        group.bench_with_input(BenchmarkId::new("transposed", size), &size, |bench, _| {
            bench.iter(|| a_t.add(&b))
        });
    }
    group.finish();
}

fn bench_add_broadcast_row(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_broadcast_row");
    for size in [100usize, 500, 1000] {
        group.throughput(Throughput::Elements((size * size) as u64));
        let a = square(size);
        let row = NdArray::ones(&[1, size], DType::Float64);

        group.bench_with_input(BenchmarkId::new("row", size), &size, |bench, _| {
            bench.iter(|| a.add(&row))
        });
        group.bench_with_input(BenchmarkId::new("scalar", size), &size, |bench, _| {
            bench.iter(|| a.add(1.0))
        });
    }
    group.finish();
}

fn bench_mixed_dtype_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_dtype_add");
    for size in [100usize, 500] {
        group.throughput(Throughput::Elements((size * size) as u64));
        let a = square(size).astype(DType::Int32);
        let b = square(size).astype(DType::Float32);

        group.bench_with_input(BenchmarkId::new("int32_float32", size), &size, |bench, _| {
            bench.iter(|| a.add(&b))
        });
    }
    group.finish();
}

fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce");
    for size in [100usize, 500, 1000] {
        group.throughput(Throughput::Elements((size * size) as u64));
        let a = square(size);
        let a_t = match a.transpose(None) {
            Ok(t) => t,
            Err(err) => panic!("transpose failed: {err}"),
        };

        group.bench_with_input(BenchmarkId::new("sum", size), &size, |bench, _| {
            bench.iter(|| a.sum())
        });
        group.bench_with_input(BenchmarkId::new("sum_transposed", size), &size, |bench, _| {
            bench.iter(|| a_t.sum())
        });
        group.bench_with_input(BenchmarkId::new("sum_axis0", size), &size, |bench, _| {
            bench.iter(|| a.sum_axis(0, false))
        });
        group.bench_with_input(BenchmarkId::new("sum_axis1", size), &size, |bench, _| {
            bench.iter(|| a.sum_axis(1, false))
        });
        group.bench_with_input(BenchmarkId::new("var_axis0", size), &size, |bench, _| {
            bench.iter(|| a.var_axis(0, false, 0))
        });
    }
    group.finish();
}

fn bench_slice_and_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("slice_and_copy");
    for size in [100usize, 500, 1000] {
        let a = square(size);
        group.throughput(Throughput::Elements((size * size / 4) as u64));

        group.bench_with_input(BenchmarkId::new("every_other", size), &size, |bench, _| {
            bench.iter(|| match a.slice(&["::2", "::-2"]) {
                Ok(v) => v.materialize(),
                Err(err) => panic!("slice failed: {err}"),
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_materialize_transposed,
    bench_add_mixed_strides,
    bench_add_broadcast_row,
    bench_mixed_dtype_add,
    bench_reduce,
    bench_slice_and_copy
);
criterion_main!(benches);

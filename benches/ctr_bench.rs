use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use fips_rng::context::{set_entropy_source, EntropySource};
use fips_rng::global::{acquire_global_context, release_global_context};
use std::time::Duration;

fn rng_benchmark(c: &mut Criterion) {
    // External entropy keeps the bench process out of the jitter pool.
    set_entropy_source(EntropySource::External);
    let rng = acquire_global_context().unwrap();

    let mut group = c.benchmark_group("global_rng");
    group.measurement_time(Duration::new(10, 0));
    //
    // Measure the latency for filling small buffers. This reflects the
    // use-case of generating symmetric encryption keys and nonces.
    //
    for len in [16usize, 32] {
        let title = format!("{}_bytes", len);
        let mut buf = vec![0u8; len];
        group.bench_function(&title, |b| b.iter(|| rng.generate(&mut buf).unwrap()));
    }
    //
    // Measure throughput at the largest single request the generator
    // permits (2^19 bits).
    //
    let mut buf = vec![0u8; 1 << 16];
    group.throughput(Throughput::Bytes(buf.len() as u64));
    group.bench_function("64_KiB", |b| b.iter(|| rng.generate(&mut buf).unwrap()));
    group.finish();

    drop(rng);
    release_global_context();
}

criterion_group!(benches, rng_benchmark);
criterion_main!(benches);

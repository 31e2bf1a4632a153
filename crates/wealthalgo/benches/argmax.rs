use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use wealthalgo::dev_oracle::DevCoprocessor;
use wealthalgo::*;
use wealthcrypto::*;

fn bench_argmax(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xbe7c);
    let (pk, sk) = keygen(1024, &mut rng).unwrap();
    let mut oracle = DevCoprocessor::new(sk);

    let mut group = c.benchmark_group("encrypted_argmax");
    for k in [3usize, 8] {
        let values: Vec<EncInt> = (0..k as u64)
            .map(|i| EncInt::new(encrypt_amount(&pk, 1_000 + (i * 7919) % 500, &mut rng)))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(k), &values, |bencher, values| {
            bencher.iter(|| {
                let mut ctx = ProtoCtx::new(&pk, &mut oracle);
                let idx = encrypted_argmax(values, &mut ctx).unwrap();
                black_box(reveal_winner(&idx, &mut ctx).unwrap());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_argmax);
criterion_main!(benches);

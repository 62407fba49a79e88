use criterion::{ BenchmarkId, Criterion, criterion_group, criterion_main };
use num_complex::Complex64 as C64;
use rand::{ SeedableRng, rngs::StdRng };
use mps_engine::{ *, factories::random_mps };

fn random_state(n: usize, bond: usize, seed: u64) -> MPS<C64> {
    let mut rng = StdRng::seed_from_u64(seed);
    random_mps(&vec![2; n], bond, &mut rng).unwrap()
}

fn bench_canonicalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonicalize");

    for &bond in &[8, 16, 32] {
        let psi = random_state(20, bond, 42);
        group.bench_with_input(BenchmarkId::new("qr", bond), &bond, |b, _| {
            b.iter_batched(
                || psi.clone(),
                |psi| CanonicalMPS::new(psi, Some(10), Some(NO_TRUNCATION)).unwrap(),
                criterion::BatchSize::SmallInput,
            );
        });
        let truncating = DEFAULT_STRATEGY.with_max_bond_dimension(bond / 2);
        group.bench_with_input(BenchmarkId::new("svd", bond), &bond, |b, _| {
            b.iter_batched(
                || psi.clone(),
                |psi| CanonicalMPS::new(psi, Some(10), Some(truncating)).unwrap(),
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_combine(c: &mut Criterion) {
    let mut group = c.benchmark_group("combine");

    for &bond in &[8, 16, 32] {
        let states: Vec<MPS<C64>>
            = (0..3).map(|k| random_state(20, bond, 100 + k)).collect();
        let weights = [C64::new(1.0, 0.0), C64::new(-0.5, 0.0), C64::new(0.0, 0.25)];
        for mode in [Simplification::CanonicalForm, Simplification::Variational] {
            let strategy = DEFAULT_STRATEGY
                .with_simplification(mode)
                .with_max_bond_dimension(bond)
                .with_max_sweeps(4);
            group.bench_with_input(
                BenchmarkId::new(mode.to_string(), bond),
                &bond,
                |b, _| {
                    b.iter(|| {
                        combine(&weights, &states, InitialGuess::default(), &strategy)
                            .unwrap()
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_canonicalize, bench_combine);
criterion_main!(benches);

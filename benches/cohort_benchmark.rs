// Measures how cohort simulation scales with population size, and what the
// background-mortality embedding costs per step.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use markov_cohort::cohort::Cohort;
use markov_cohort::outcomes::CohortOutcomes;
use markov_cohort::params::{ModelInputs, TherapyParameters};
use markov_cohort::states::Therapy;
use markov_cohort::transition::{BackgroundMortality, MortalityEmbedding, TransitionMatrix};
use std::sync::Arc;

/// Population sizes on the x-axis.
const POPULATION_SIZES: [usize; 4] = [100, 1_000, 10_000, 50_000];

fn bench_cohort_simulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("cohort_simulation");
    group.sample_size(20);

    for (label, inputs) in [
        ("annual", ModelInputs::default()),
        ("quarterly_with_mortality", {
            let mut inputs = ModelInputs::default();
            inputs.background_mortality.enabled = true;
            inputs.step_length = 0.25;
            inputs.horizon_steps = 400;
            inputs
        }),
    ] {
        let params = Arc::new(TherapyParameters::new(&inputs, Therapy::Mono).expect("parameters"));
        for &population in &POPULATION_SIZES {
            group.throughput(Throughput::Elements(population as u64));
            group.bench_with_input(BenchmarkId::new(label, population), &population, |b, &n| {
                b.iter(|| {
                    let cohort = Cohort::new(1, Arc::clone(&params), n)
                        .expect("cohort")
                        .simulate();
                    black_box(CohortOutcomes::from_cohort(&cohort));
                });
            });
        }
    }
    group.finish();
}

fn bench_mortality_embedding(c: &mut Criterion) {
    let base = TransitionMatrix::from_counts(&ModelInputs::default().transition_counts)
        .expect("base matrix");
    c.bench_function("mortality_embedding", |b| {
        b.iter(|| {
            MortalityEmbedding::new(
                black_box(&base),
                BackgroundMortality {
                    annual_probability: 0.00815,
                    step_length: 0.25,
                },
            )
            .expect("embedding")
        });
    });
}

criterion_group!(benches, bench_cohort_simulation, bench_mortality_embedding);
criterion_main!(benches);

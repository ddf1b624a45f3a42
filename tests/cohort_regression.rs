use markov_cohort::cohort::Cohort;
use markov_cohort::comparison::TherapyComparison;
use markov_cohort::outcomes::CohortOutcomes;
use markov_cohort::params::{ModelInputs, TherapyParameters};
use markov_cohort::states::{HealthState, Therapy};
use markov_cohort::stats::SummaryStatistic;
use markov_cohort::transition::TransitionMatrix;

const COHORT_ID: u64 = 1;

fn reference_inputs() -> ModelInputs {
    let inputs = ModelInputs {
        transition_counts: vec![
            vec![1251, 350, 116, 17],
            vec![0, 731, 512, 15],
            vec![0, 0, 1312, 437],
        ],
        annual_state_costs: vec![2756.0, 3025.0, 9007.0],
        annual_state_utilities: vec![0.75, 0.50, 0.25],
        discount_rate: 0.03,
        population_size: 1000,
        horizon_steps: 100,
        combo_relative_risk: 0.509,
        ..ModelInputs::default()
    };
    assert!(!inputs.background_mortality.enabled);
    inputs
}

fn run(inputs: &ModelInputs, therapy: Therapy) -> CohortOutcomes {
    let params = TherapyParameters::new(inputs, therapy).expect("parameters");
    let cohort = Cohort::new(COHORT_ID, params, inputs.population_size)
        .expect("cohort")
        .simulate();
    CohortOutcomes::from_cohort(&cohort)
}

#[test]
fn mono_therapy_survival_is_plausible() {
    let mono = run(&reference_inputs(), Therapy::Mono);
    let mean = mono.survival_time().mean().expect("some patients die");
    assert!(mean > 1.0 && mean < 20.0, "mean survival {mean}");

    let ci = mono.survival_time().confidence_interval(0.05).expect("ci");
    assert!(ci.lower < mean && mean < ci.upper);
}

#[test]
fn combination_therapy_lives_longer_and_costs_more() {
    let inputs = reference_inputs();
    let mono = run(&inputs, Therapy::Mono);
    let combo = run(&inputs, Therapy::Combo);

    let mono_survival = mono.survival_time().mean().expect("mono deaths");
    let combo_survival = combo.survival_time().mean().expect("combo deaths");
    assert!(
        combo_survival > mono_survival,
        "combo {combo_survival} vs mono {mono_survival}"
    );

    let mono_cost = mono.discounted_cost().mean().expect("mono cost");
    let combo_cost = combo.discounted_cost().mean().expect("combo cost");
    assert!(combo_cost > mono_cost, "combo {combo_cost} vs mono {mono_cost}");

    let comparison = TherapyComparison::new(&mono, &combo).expect("paired cohorts");
    assert!(comparison.incremental_utility().mean().expect("utility") > 0.0);
    assert!(comparison.icer().expect("icer") > 0.0);
}

#[test]
fn survival_path_starts_full_and_never_rises() {
    let inputs = reference_inputs();
    for therapy in [Therapy::Mono, Therapy::Combo] {
        let outcomes = run(&inputs, therapy);
        let path = outcomes.survival_curve();
        assert_eq!(path.value_at(0.0), inputs.population_size);

        let steps = path.steps();
        assert_eq!(steps[0], (0.0, inputs.population_size));
        for pair in steps.windows(2) {
            assert!(pair[1].0 > pair[0].0);
            assert!(pair[1].1 <= pair[0].1);
        }

        let deaths = outcomes.survival_times().len();
        assert!(deaths <= inputs.population_size);
        assert_eq!(path.value_at(f64::INFINITY), inputs.population_size - deaths);
        assert_eq!(outcomes.discounted_cost().count(), inputs.population_size);
        assert_eq!(outcomes.discounted_utility().count(), inputs.population_size);
        assert!(outcomes.costs().iter().all(|&c| c >= 0.0));
        assert!(outcomes.utilities().iter().all(|&u| u >= 0.0));
    }
}

#[test]
fn onset_times_never_exceed_survival_horizon() {
    let inputs = reference_inputs();
    let outcomes = run(&inputs, Therapy::Mono);
    let horizon = inputs.horizon_steps as f64 * inputs.step_length;
    assert!(!outcomes.onset_times().is_empty());
    assert!(outcomes.onset_times().iter().all(|&t| t > 0.0 && t <= horizon));
    assert_eq!(
        outcomes.onset_free_survival_time().count(),
        outcomes.onset_times().len()
    );
    let onset_free = outcomes.onset_free_curve();
    assert_eq!(
        onset_free.value_at(f64::INFINITY),
        inputs.population_size - outcomes.onset_times().len()
    );
}

#[test]
fn same_cohort_id_reproduces_outcomes() {
    let inputs = ModelInputs {
        population_size: 250,
        ..reference_inputs()
    };
    let a = run(&inputs, Therapy::Combo);
    let b = run(&inputs, Therapy::Combo);
    assert_eq!(a.survival_times(), b.survival_times());
    assert_eq!(a.costs(), b.costs());
    assert_eq!(a.survival_curve(), b.survival_curve());
}

#[test]
fn relative_risk_scales_forward_probabilities_exactly() {
    let inputs = reference_inputs();
    let base = TransitionMatrix::from_counts(&inputs.transition_counts).expect("base");
    let combo = base.with_relative_risk(inputs.combo_relative_risk).expect("combo");
    for from in &HealthState::ALL[..3] {
        for to in &HealthState::ALL[from.index() + 1..4] {
            assert_eq!(
                combo.probability(*from, *to),
                base.probability(*from, *to) * inputs.combo_relative_risk
            );
        }
        let row_sum: f64 = combo.row(*from).sum();
        assert!((row_sum - 1.0).abs() < 1e-9);
    }
}

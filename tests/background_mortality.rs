use markov_cohort::cohort::Cohort;
use markov_cohort::outcomes::CohortOutcomes;
use markov_cohort::params::{ModelInputs, SurvivalEndpoint, TherapyParameters};
use markov_cohort::states::{HealthState, Therapy};
use markov_cohort::stats::SummaryStatistic;
use markov_cohort::transition::{BackgroundMortality, MortalityEmbedding, TransitionMatrix};

fn embedded_inputs(step_length: f64) -> ModelInputs {
    let mut inputs = ModelInputs {
        population_size: 400,
        step_length,
        horizon_steps: (100.0 / step_length).round() as usize,
        ..ModelInputs::default()
    };
    inputs.background_mortality.enabled = true;
    inputs
}

fn embed(step_length: f64) -> MortalityEmbedding {
    let base = TransitionMatrix::from_counts(&ModelInputs::default().transition_counts)
        .expect("base matrix");
    MortalityEmbedding::new(
        &base,
        BackgroundMortality {
            annual_probability: 0.00815,
            step_length,
        },
    )
    .expect("embedding")
}

#[test]
fn embedded_matrix_is_a_valid_five_state_chain() {
    let embedding = embed(0.25);
    let matrix = &embedding.matrix;
    assert!(matrix.has_background_mortality());
    assert_eq!(matrix.num_states(), 5);
    for state in HealthState::ALL {
        let row = matrix.row(state);
        assert!(row.iter().all(|&p| p >= 0.0));
        assert!((row.sum() - 1.0).abs() < 1e-9);
        if state.is_terminal() {
            assert_eq!(matrix.probability(state, state), 1.0);
        } else {
            assert!(matrix.probability(state, HealthState::BackgroundDeath) > 0.0);
        }
    }
}

#[test]
fn multiple_transition_bound_grows_with_step_length() {
    let bounds: Vec<f64> = [0.05, 0.1, 0.25, 0.5, 1.0]
        .iter()
        .map(|&step| embed(step).multiple_transition_bound)
        .collect();
    assert!(bounds[0] >= 0.0);
    assert!(bounds.windows(2).all(|w| w[1] > w[0]), "{bounds:?}");
}

#[test]
fn any_death_endpoint_counts_more_deaths_than_disease_only() {
    let mut disease_only = embedded_inputs(0.5);
    disease_only.survival_endpoint = SurvivalEndpoint::DiseaseDeath;
    let mut any_death = disease_only.clone();
    any_death.survival_endpoint = SurvivalEndpoint::AnyDeath;

    let run = |inputs: &ModelInputs| {
        let params = TherapyParameters::new(inputs, Therapy::Mono).expect("parameters");
        let cohort = Cohort::new(3, params, inputs.population_size)
            .expect("cohort")
            .simulate();
        let background = cohort
            .patients()
            .iter()
            .filter(|p| p.current_state() == HealthState::BackgroundDeath)
            .count();
        (CohortOutcomes::from_cohort(&cohort), background)
    };
    let (disease, background) = run(&disease_only);
    let (any, background_again) = run(&any_death);

    // Same cohort id and matrix, so the same patients die the same way.
    assert_eq!(background, background_again);
    assert!(background > 0);
    assert_eq!(
        any.survival_times().len(),
        disease.survival_times().len() + background
    );
    assert_eq!(
        any.discounted_cost().mean(),
        disease.discounted_cost().mean()
    );
}

#[test]
fn sub_annual_steps_report_survival_in_years() {
    let quarterly = embedded_inputs(0.25);
    let params = TherapyParameters::new(&quarterly, Therapy::Mono).expect("parameters");
    assert_eq!(params.horizon_years(), 100.0);
    let cohort = Cohort::new(0, params, quarterly.population_size)
        .expect("cohort")
        .simulate();
    let outcomes = CohortOutcomes::from_cohort(&cohort);

    // Survival times land on multiples of an eighth of a year.
    for &t in outcomes.survival_times() {
        let eighths = t / 0.125;
        assert!((eighths - eighths.round()).abs() < 1e-9, "{t}");
    }
    let mean = outcomes.survival_time().mean().expect("deaths");
    assert!(mean > 1.0 && mean < 20.0, "mean survival {mean}");
}

#[test]
fn step_length_without_embedding_is_rejected() {
    let mut inputs = embedded_inputs(0.25);
    inputs.background_mortality.enabled = false;
    assert!(TherapyParameters::new(&inputs, Therapy::Mono).is_err());
}

#[test]
fn background_deaths_are_not_counted_alive_at_the_horizon() {
    let inputs = ModelInputs {
        horizon_steps: 20,
        ..embedded_inputs(0.5)
    };
    assert_eq!(inputs.survival_endpoint, SurvivalEndpoint::DiseaseDeath);
    let params = TherapyParameters::new(&inputs, Therapy::Mono).expect("parameters");
    let cohort = Cohort::new(5, params, inputs.population_size)
        .expect("cohort")
        .simulate();
    let background = cohort
        .patients()
        .iter()
        .filter(|p| p.current_state() == HealthState::BackgroundDeath)
        .count();
    let outcomes = CohortOutcomes::from_cohort(&cohort);

    assert!(background > 0);
    assert!(outcomes.alive_at_horizon() > 0);
    assert_eq!(
        outcomes.alive_at_horizon() + background + outcomes.survival_times().len(),
        inputs.population_size
    );
    // The survival curve follows the disease endpoint, so it still holds the
    // background deaths.
    let curve = outcomes.survival_curve();
    assert_eq!(curve.initial(), inputs.population_size);
    assert_eq!(
        curve.value_at(f64::INFINITY),
        outcomes.alive_at_horizon() + background
    );
}

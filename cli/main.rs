#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use markov_cohort::cohort::Cohort;
use markov_cohort::comparison::TherapyComparison;
use markov_cohort::multi::{MultiCohort, MultiCohortOutcomes};
use markov_cohort::outcomes::{CohortOutcomes, SamplePath, StatSummary};
use markov_cohort::params::{ModelInputs, TherapyParameters};
use markov_cohort::progress::CohortProgressObserver;
use markov_cohort::states::Therapy;
use markov_cohort::stats::SummaryStatistic;

#[derive(Clone, ValueEnum)]
pub enum TherapyCli {
    Mono,
    Combo,
}

impl From<TherapyCli> for Therapy {
    fn from(therapy: TherapyCli) -> Self {
        match therapy {
            TherapyCli::Mono => Therapy::Mono,
            TherapyCli::Combo => Therapy::Combo,
        }
    }
}

#[derive(Args)]
pub struct ConfigArgs {
    /// TOML file with model inputs; the reference inputs are used when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the number of patients per cohort
    #[arg(long, value_name = "N")]
    pub population: Option<usize>,
}

impl ConfigArgs {
    fn load(&self) -> Result<ModelInputs, Box<dyn Error>> {
        let mut inputs = match &self.config {
            Some(path) => {
                let inputs = ModelInputs::load(path)?;
                log::info!("Loaded model inputs from {}", path.display());
                inputs
            }
            None => ModelInputs::default(),
        };
        if let Some(population) = self.population {
            inputs.population_size = population;
            inputs.validate()?;
        }
        Ok(inputs)
    }
}

#[derive(Parser)]
#[command(
    name = "markov-cohort",
    about = "Patient-level Markov cohort simulation for cost-effectiveness analysis"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate one cohort under a single therapy
    #[command(about = "Simulate one cohort and report survival, cost and utility")]
    Simulate {
        #[command(flatten)]
        config: ConfigArgs,

        #[arg(long, value_enum, default_value_t = TherapyCli::Mono)]
        therapy: TherapyCli,

        /// Cohort identifier; selects the patients' random streams
        #[arg(long, default_value = "1")]
        cohort_id: u64,

        /// Write the survival sample path as CSV (time,alive)
        #[arg(long, value_name = "FILE")]
        survival_csv: Option<PathBuf>,
    },

    /// Compare mono and combination therapy on the same random streams
    #[command(about = "Compare both therapies and report incremental cost-effectiveness")]
    Compare {
        #[command(flatten)]
        config: ConfigArgs,

        #[arg(long, default_value = "1")]
        cohort_id: u64,
    },

    /// Probabilistic sensitivity analysis over many cohorts
    #[command(about = "Simulate many cohorts with sampled parameters")]
    Psa {
        #[command(flatten)]
        config: ConfigArgs,

        /// Number of cohorts, each with its own parameter draw
        #[arg(long, default_value = "100")]
        cohorts: usize,

        /// Keep the base-case parameters for every cohort
        #[arg(long)]
        fixed_parameters: bool,
    },

    /// Write the reference inputs as a TOML file to start from
    #[command(about = "Write the default configuration (TOML)")]
    WriteConfig {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();
    let result = match command {
        Some(Commands::Simulate {
            config,
            therapy,
            cohort_id,
            survival_csv,
        }) => run_simulate(&config, therapy.into(), cohort_id, survival_csv.as_deref()),
        Some(Commands::Compare { config, cohort_id }) => run_compare(&config, cohort_id),
        Some(Commands::Psa {
            config,
            cohorts,
            fixed_parameters,
        }) => run_psa(&config, cohorts, !fixed_parameters),
        Some(Commands::WriteConfig { path }) => run_write_config(&path),
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn simulate_cohort(
    inputs: &ModelInputs,
    therapy: Therapy,
    cohort_id: u64,
) -> Result<CohortOutcomes, Box<dyn Error>> {
    let params = TherapyParameters::new(inputs, therapy)?;
    if let Some(embedding) = params.transition.embedding() {
        println!(
            "Background mortality embedded at step {} years; P(2+ transitions per step) <= {:.4}",
            embedding.step_length, embedding.multiple_transition_bound
        );
    }
    let cohort = Cohort::new(cohort_id, params, inputs.population_size)?.simulate();
    Ok(CohortOutcomes::from_cohort(&cohort))
}

fn run_simulate(
    config: &ConfigArgs,
    therapy: Therapy,
    cohort_id: u64,
    survival_csv: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let inputs = config.load()?;
    let outcomes = simulate_cohort(&inputs, therapy, cohort_id)?;
    print_outcomes(&outcomes, inputs.alpha);

    if let Some(path) = survival_csv {
        write_sample_path_csv(path, outcomes.survival_curve())?;
        log::info!("Survival sample path written to {}", path.display());
    }
    Ok(())
}

fn run_compare(config: &ConfigArgs, cohort_id: u64) -> Result<(), Box<dyn Error>> {
    let inputs = config.load()?;
    let mono = simulate_cohort(&inputs, Therapy::Mono, cohort_id)?;
    let combo = simulate_cohort(&inputs, Therapy::Combo, cohort_id)?;
    print_outcomes(&mono, inputs.alpha);
    print_outcomes(&combo, inputs.alpha);

    let comparison = TherapyComparison::new(&mono, &combo)?;
    let confidence = confidence_label(inputs.alpha);
    println!("\nIncremental outcomes of {} over {}:", combo.therapy(), mono.therapy());
    for stat in [comparison.incremental_cost(), comparison.incremental_utility()] {
        print_summary(&StatSummary::of(stat, inputs.alpha), &confidence);
    }
    match comparison.icer() {
        Some(icer) => println!("  ICER: {icer:.2} per unit of utility"),
        None => println!("  ICER: undefined (no incremental utility)"),
    }
    let wtp = inputs.willingness_to_pay;
    print_summary(
        &StatSummary::of(&comparison.net_monetary_benefit(wtp), inputs.alpha),
        &confidence,
    );
    println!(
        "  Cost-effective at a willingness to pay of {wtp:.0}: {}",
        if comparison.is_cost_effective(wtp) {
            "yes"
        } else {
            "no"
        }
    );
    Ok(())
}

fn run_psa(config: &ConfigArgs, cohorts: usize, sample_parameters: bool) -> Result<(), Box<dyn Error>> {
    let inputs = config.load()?;
    let alpha = inputs.alpha;
    let wtp = inputs.willingness_to_pay;
    let multi = MultiCohort::new(inputs, cohorts)?.with_parameter_uncertainty(sample_parameters);

    let progress = BarProgress::new();
    let comparison = multi.compare(Therapy::Mono, Therapy::Combo, &progress)?;

    for outcomes in [&comparison.base, &comparison.alternative] {
        print_multi_outcomes(outcomes, alpha);
    }
    let confidence = confidence_label(alpha);
    println!("\nIncremental cohort means:");
    print_summary(&StatSummary::of(comparison.incremental_cost(), alpha), &confidence);
    print_summary(&StatSummary::of(comparison.incremental_utility(), alpha), &confidence);
    if let Some(icer) = comparison.icer() {
        println!("  ICER: {icer:.2} per unit of utility");
    }
    println!(
        "  Probability cost-effective at {wtp:.0}: {:.3}",
        comparison.probability_cost_effective(wtp)
    );
    Ok(())
}

fn run_write_config(path: &Path) -> Result<(), Box<dyn Error>> {
    ModelInputs::default().save(path)?;
    println!("Default configuration written to {}", path.display());
    Ok(())
}

fn confidence_label(alpha: f64) -> String {
    format!("{}%", 100.0 * (1.0 - alpha))
}

fn print_summary(summary: &StatSummary, confidence: &str) {
    match (summary.mean, summary.confidence_interval) {
        (Some(mean), Some(ci)) => println!(
            "  {} (n = {}): mean {mean:.4}, {confidence} CI {ci:.4}",
            summary.name, summary.count
        ),
        (Some(mean), None) => println!("  {} (n = {}): mean {mean:.4}", summary.name, summary.count),
        _ => println!("  {}: no observations", summary.name),
    }
}

fn print_outcomes(outcomes: &CohortOutcomes, alpha: f64) {
    println!(
        "\n{} (cohort {}, {} patients):",
        outcomes.therapy().describe(),
        outcomes.cohort_id(),
        outcomes.initial_population_size()
    );
    let confidence = confidence_label(alpha);
    for summary in outcomes.summary(alpha) {
        print_summary(&summary, &confidence);
    }
    println!(
        "  Alive at the end of the horizon: {} of {}",
        outcomes.alive_at_horizon(),
        outcomes.initial_population_size()
    );
}

fn print_multi_outcomes(outcomes: &MultiCohortOutcomes, alpha: f64) {
    println!(
        "\n{} over {} cohorts:",
        outcomes.therapy().describe(),
        outcomes.cohorts().len()
    );
    let stat = outcomes.mean_survival_time();
    match (stat.mean(), outcomes.survival_prediction_interval(alpha)) {
        (Some(mean), Some(pi)) => println!(
            "  Mean survival time: {mean:.4}, {} prediction interval {pi:.4}",
            confidence_label(alpha)
        ),
        (Some(mean), None) => println!("  Mean survival time: {mean:.4}"),
        _ => println!("  Mean survival time: no deaths within the horizon"),
    }
    let confidence = confidence_label(alpha);
    print_summary(&StatSummary::of(outcomes.mean_discounted_cost(), alpha), &confidence);
    print_summary(&StatSummary::of(outcomes.mean_discounted_utility(), alpha), &confidence);
}

fn write_sample_path_csv(path: &Path, sample_path: &SamplePath) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    wtr.write_record(["time", "alive"])?;
    for (time, alive) in sample_path.steps() {
        wtr.write_record([time.to_string(), alive.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reports finished cohorts on a terminal progress bar.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::with_template("> Cohorts [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
        }
        Self { bar }
    }
}

impl CohortProgressObserver for BarProgress {
    fn on_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
    }

    fn on_cohort_finished(&self, _: u64) {
        self.bar.inc(1);
    }

    fn on_finish(&self) {
        self.bar.finish_and_clear();
    }
}

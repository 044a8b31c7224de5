#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use brisk::config::PipelineConfig;
use brisk::learn::predict::{FeatureVector, Predictor};
use brisk::learn::synthetic::smoke_test;
use brisk::runner::{ProcessSummary, TrainSummary, process_raw_data, run, train_and_evaluate};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use std::error::Error;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(
    name = "brisk",
    about = "Breast-cancer survival prediction from clinical records",
    long_about = "Cleans and imputes clinical patient files, trains a cross-validated \
                 random forest on them, evaluates it on held-out patients, and scores \
                 new patients with the saved model."
)]
struct Cli {
    /// TOML configuration file; every setting has a default
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean and impute every raw file into the processed directory
    Process(PathArgs),
    /// Train, evaluate and save a model from the processed directory
    Train(PathArgs),
    /// Process the raw files, then train
    Run(PathArgs),
    /// Predict survival for one patient
    Predict(PredictArgs),
    /// Score synthetic high- and low-risk patients with a saved model
    Smoke(SmokeArgs),
    /// Show version information
    Version,
}

/// Overrides for the configured locations.
#[derive(Args)]
struct PathArgs {
    #[arg(long, value_name = "DIR")]
    raw_dir: Option<PathBuf>,
    #[arg(long, value_name = "DIR")]
    processed_dir: Option<PathBuf>,
    #[arg(long, value_name = "DIR")]
    train_dir: Option<PathBuf>,
    #[arg(long, value_name = "DIR")]
    test_dir: Option<PathBuf>,
    #[arg(long, value_name = "DIR")]
    results_dir: Option<PathBuf>,
    /// Where the trained model is written
    #[arg(long, value_name = "FILE")]
    model: Option<PathBuf>,
}

impl PathArgs {
    fn apply(self, config: &mut PipelineConfig) {
        let paths = &mut config.paths;
        let overrides = [
            (self.raw_dir, &mut paths.raw_dir),
            (self.processed_dir, &mut paths.processed_dir),
            (self.train_dir, &mut paths.train_dir),
            (self.test_dir, &mut paths.test_dir),
            (self.results_dir, &mut paths.results_dir),
            (self.model, &mut paths.model_path),
        ];
        for (value, slot) in overrides {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SurgeryCli {
    Mastectomy,
    BreastConserving,
}

#[derive(Args)]
struct PredictArgs {
    /// Saved model; defaults to the configured model path
    #[arg(long, value_name = "FILE")]
    model: Option<PathBuf>,

    /// Months without relapse
    #[arg(long, default_value_t = 30.0)]
    relapse_free_months: f64,

    #[arg(long, default_value_t = 50.0)]
    age_at_diagnosis: f64,

    /// Tumor size in mm
    #[arg(long, default_value_t = 30.0)]
    tumor_size: f64,

    #[arg(long, default_value_t = 10.0)]
    mutation_count: f64,

    /// Number of aggressive treatments received (0 to 4)
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=4))]
    aggressive_treatment_score: u8,

    #[arg(long, default_value_t = 3.5)]
    nottingham_prognostic_index: f64,

    /// Lymph nodes examined positive
    #[arg(long, default_value_t = 2.0)]
    lymph_nodes_positive: f64,

    #[arg(long, value_enum, default_value_t = SurgeryCli::Mastectomy)]
    surgery: SurgeryCli,

    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=4))]
    tumor_stage: u8,
}

impl PredictArgs {
    fn vector(&self) -> FeatureVector {
        FeatureVector {
            relapse_free_months: self.relapse_free_months,
            age_at_diagnosis: self.age_at_diagnosis,
            tumor_size: self.tumor_size,
            mutation_count: self.mutation_count,
            aggressive_treatment_score: f64::from(self.aggressive_treatment_score),
            nottingham_prognostic_index: self.nottingham_prognostic_index,
            lymph_nodes_positive: self.lymph_nodes_positive,
            surgery_type: match self.surgery {
                SurgeryCli::Mastectomy => 1.0,
                SurgeryCli::BreastConserving => 0.0,
            },
            tumor_stage: f64::from(self.tumor_stage),
        }
    }
}

#[derive(Args)]
struct SmokeArgs {
    #[arg(long, value_name = "FILE")]
    model: Option<PathBuf>,

    /// Patients generated per risk group
    #[arg(long, default_value_t = 5)]
    per_group: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { config, command } = cli;

    let result: Result<(), Box<dyn Error>> = match command {
        Some(Commands::Process(args)) => with_config(config, args).and_then(|c| {
            let summary = process_raw_data(&c.paths)?;
            print_process_summary(&summary);
            Ok(())
        }),
        Some(Commands::Train(args)) => with_config(config, args).and_then(|c| {
            let summary = train_and_evaluate(&c)?;
            print_train_summary(&summary);
            Ok(())
        }),
        Some(Commands::Run(args)) => with_config(config, args).and_then(|c| {
            let (processed, trained) = run(&c)?;
            print_process_summary(&processed);
            print_train_summary(&trained);
            Ok(())
        }),
        Some(Commands::Predict(args)) => predict(config, args),
        Some(Commands::Smoke(args)) => smoke(config, args),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => Cli::command().print_help().map_err(Into::into).map(|()| println!()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load_config(path: Option<PathBuf>) -> Result<PipelineConfig, Box<dyn Error>> {
    match path {
        Some(path) => Ok(PipelineConfig::load(&path)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn with_config(path: Option<PathBuf>, args: PathArgs) -> Result<PipelineConfig, Box<dyn Error>> {
    let mut config = load_config(path)?;
    args.apply(&mut config);
    Ok(config)
}

fn predict(config: Option<PathBuf>, args: PredictArgs) -> Result<(), Box<dyn Error>> {
    let model = match &args.model {
        Some(model) => model.clone(),
        None => load_config(config)?.paths.model_path,
    };
    let predictor = Predictor::load(&model)?;
    let vector = args.vector();
    let values = vector.to_array();
    let probabilities = predictor.predict(&values)?;

    println!("Survival probability: {:.2}%", probabilities.survival * 100.0);
    println!("Death probability:    {:.2}%", probabilities.death * 100.0);
    if probabilities.predicted_label() == 1 {
        println!("Predicted outcome: living");
    } else {
        println!("Predicted outcome: deceased");
    }
    Ok(())
}

fn smoke(config: Option<PathBuf>, args: SmokeArgs) -> Result<(), Box<dyn Error>> {
    let model = match args.model {
        Some(model) => model,
        None => load_config(config)?.paths.model_path,
    };
    let predictor = Predictor::load(&model)?;
    let rows = smoke_test(&predictor, args.per_group, args.seed)?;

    println!(
        "{:<6} {:>8} {:>6} {:>7} {:>9} {:>10} {:>6} {:>6} {:>8} {:>6} {:>6} {:>9}",
        "risk", "relapse", "age", "size", "mutations", "aggressive", "npi", "nodes", "surgery", "stage", "class", "survival"
    );
    for row in rows {
        let v = row.vector;
        println!(
            "{:<6} {:>8} {:>6} {:>7.2} {:>9} {:>10} {:>6.2} {:>6} {:>8} {:>6} {:>6} {:>8.1}%",
            row.group,
            v.relapse_free_months,
            v.age_at_diagnosis,
            v.tumor_size,
            v.mutation_count,
            v.aggressive_treatment_score,
            v.nottingham_prognostic_index,
            v.lymph_nodes_positive,
            v.surgery_type,
            v.tumor_stage,
            row.predicted_class(),
            row.probabilities.survival * 100.0
        );
    }
    Ok(())
}

fn print_process_summary(summary: &ProcessSummary) {
    for file in &summary.files {
        println!(
            "Processed {} -> {} ({} rows)",
            file.source.display(),
            file.output.display(),
            file.rows
        );
    }
    if summary.missing.is_empty() {
        println!("No missing values in the raw data.");
    } else {
        println!(
            "Imputed {} median, {} stage and {} mode cell(s); {} placeholder cell(s)",
            summary.imputation.median_fills.iter().map(|f| f.filled).sum::<usize>(),
            summary.imputation.stage_fills,
            summary.imputation.mode_fills.iter().map(|f| f.filled).sum::<usize>(),
            summary.imputation.unknown_fills
        );
    }
}

fn print_train_summary(summary: &TrainSummary) {
    println!(
        "Selected {} of {} rows; {} train / {} test",
        summary.selection.rows_kept, summary.selection.rows_in, summary.train_rows, summary.test_rows
    );
    println!(
        "Best configuration ({} candidates, {}-fold CV ROC-AUC {:.4}): {}",
        summary.search.candidates, summary.search.folds, summary.search.cv_roc_auc, summary.search.params
    );
    for (name, value) in summary.evaluation.summary() {
        println!("{name}: {value:.4}");
    }
    println!("Model saved to {}", summary.model_path.display());
}

/// Format seconds into a human-readable duration like "2.4 hours ago"
fn format_duration_ago(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if seconds < MINUTE {
        format!("{seconds} seconds ago")
    } else if seconds < HOUR {
        format!("{:.1} minutes ago", seconds as f64 / MINUTE as f64)
    } else if seconds < DAY {
        format!("{:.1} hours ago", seconds as f64 / HOUR as f64)
    } else {
        format!("{:.1} days ago", seconds as f64 / DAY as f64)
    }
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("BRISK_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("brisk {version}");

    if build_timestamp > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if now > build_timestamp {
            println!("Built: {}", format_duration_ago(now - build_timestamp));
        } else {
            println!("Built: just now");
        }
    }
}

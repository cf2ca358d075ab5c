//! Command-line driver for the galago model sampler.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use galago_engine::{Sampler, SamplerConfig, Strategy};

/// Sample diverse satisfying assignments of an SMT formula.
#[derive(Debug, Parser)]
#[command(name = "galago")]
#[command(version)]
#[command(about = "Sample diverse satisfying assignments of an SMT formula")]
struct Cli {
    /// Path to the SMT-LIB (or DIMACS) input formula
    input: PathBuf,

    /// Path to the array-size map (`<name> <length> <is_input>` rows)
    #[arg(short = 'a', long = "array-map")]
    array_map: Option<PathBuf>,

    /// Maximum number of valid samples
    #[arg(short = 'n', long = "max-samples", default_value_t = 1_000_000)]
    max_samples: u64,

    /// Maximum running time in seconds
    #[arg(short = 't', long = "max-time", default_value_t = 3600.0)]
    max_time: f64,

    /// Output path (defaults to `<input>.samples`)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Per-bit soft constraints (the default)
    #[arg(long, conflicts_with_all = ["smtbv", "sat"])]
    smtbit: bool,

    /// Whole-word soft constraints
    #[arg(long, conflicts_with = "sat")]
    smtbv: bool,

    /// Route through the bit-blast pipeline
    #[arg(long)]
    sat: bool,

    /// RNG seed; 0 is reserved ("unseeded") and seeds from the wall clock
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Also probe flips of internal Bool/BV sub-expressions
    #[arg(long)]
    flip_internal: bool,

    /// Per-cell selection ratio (0-100) for array soft constraints; 0
    /// constrains every mapped cell
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=100))]
    soft_array_ratio: u32,
}

impl Cli {
    fn config(self) -> SamplerConfig {
        let strategy = if self.sat {
            Strategy::Sat
        } else if self.smtbv {
            Strategy::SmtBv
        } else {
            Strategy::SmtBit
        };
        let output_path = self
            .output
            .unwrap_or_else(|| PathBuf::from(format!("{}.samples", self.input.display())));
        SamplerConfig {
            formula_path: self.input,
            array_map_path: self.array_map,
            output_path,
            max_samples: self.max_samples,
            max_time: Duration::from_secs_f64(self.max_time),
            strategy,
            seed: self.seed,
            flip_internal: self.flip_internal,
            soft_array_ratio: self.soft_array_ratio,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = cli.config();

    let mut sampler = match Sampler::new(cfg) {
        Ok(sampler) => sampler,
        Err(err) => {
            eprintln!("galago: {err}");
            return ExitCode::from(err.exit_code());
        }
    };
    let outcome = sampler.run();
    // the statistics block prints on every exit path
    print!("{}", sampler.stats().render(sampler.elapsed()));
    match outcome {
        Ok(reason) => {
            info!(?reason, "finished");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("galago: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

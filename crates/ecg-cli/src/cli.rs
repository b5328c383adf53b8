use clap::{Args, Parser, Subcommand, ValueEnum};
use ecg_simulation::SignalPattern;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ecg-pipeline",
    version,
    about = "Condition three-lead ECG recordings and score them with an anomaly model",
    long_about = "Runs CSV recordings (tiempo_s, II, V1, V5) through the quality gate, \
                  filters, normalization, resampling and tensor packaging, then posts the \
                  tensor to the model endpoint. Set $ECG_INFERENCE_ENDPOINT or use --endpoint."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv); RUST_LOG overrides it
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Process a CSV recording and print the report as JSON
    Process(ProcessArgs),
    /// Write a synthetic recording as CSV
    Simulate(SimulateArgs),
    /// Print the default pipeline configuration
    Config,
}

#[derive(Args)]
pub struct ProcessArgs {
    /// CSV recording to process
    #[arg(required_unless_present = "synthetic")]
    pub input: Option<PathBuf>,

    /// Process a generated 10 s sinus rhythm instead of a file
    #[arg(long, conflicts_with = "input")]
    pub synthetic: bool,

    /// Pipeline configuration (JSON); defaults apply when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Model id from the registry
    #[arg(long)]
    pub model: Option<String>,

    /// Endpoint of the default model
    #[arg(long, env = "ECG_INFERENCE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Inference timeout in seconds
    #[arg(long, env = "ECG_INFERENCE_TIMEOUT", default_value_t = 30)]
    pub timeout: u64,

    /// Stop after packaging; the report carries no prediction
    #[arg(long)]
    pub no_inference: bool,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pub pretty: bool,

    /// Also print a per-stage summary to stderr
    #[arg(long)]
    pub summary: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PatternKind {
    Pqrst,
    Sinusoidal,
    Flat,
    Saturated,
}

#[derive(Args)]
pub struct SimulateArgs {
    #[arg(long, value_enum, default_value_t = PatternKind::Pqrst)]
    pub pattern: PatternKind,

    /// Length in seconds
    #[arg(long, default_value_t = 10.0)]
    pub duration: f64,

    /// Sampling rate in Hz
    #[arg(long, default_value_t = 500.0)]
    pub rate: f64,

    /// Heart rate for the pqrst pattern
    #[arg(long, default_value_t = 72.0)]
    pub heart_rate: f64,

    /// Tone frequency for the sinusoidal and saturated patterns
    #[arg(long, default_value_t = 1.0)]
    pub frequency: f64,

    /// Peak amplitude in microvolts (level for flat)
    #[arg(long, default_value_t = 1000.0)]
    pub amplitude: f64,

    /// Fraction of samples replaced by NaN
    #[arg(long, default_value_t = 0.0)]
    pub dropout: f64,

    /// Generate without noise or mains interference
    #[arg(long)]
    pub clean: bool,

    /// Ground-truth label written to the CSV (0 normal, 1 anomalous)
    #[arg(long)]
    pub label: Option<u8>,

    /// Seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write the CSV here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl SimulateArgs {
    pub fn signal_pattern(&self) -> SignalPattern {
        match self.pattern {
            PatternKind::Pqrst => SignalPattern::Pqrst {
                heart_rate_bpm: self.heart_rate,
                amplitude: self.amplitude,
            },
            PatternKind::Sinusoidal => SignalPattern::Sinusoidal {
                frequency: self.frequency,
                amplitude: self.amplitude,
            },
            PatternKind::Flat => SignalPattern::Flat {
                level: self.amplitude,
            },
            PatternKind::Saturated => SignalPattern::Saturated {
                frequency: self.frequency,
                amplitude: self.amplitude,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_process_flags() {
        let cli = Cli::try_parse_from([
            "ecg-pipeline",
            "process",
            "record.csv",
            "--endpoint",
            "http://localhost:9000/invocations",
            "--timeout",
            "5",
            "--pretty",
        ])
        .unwrap();
        let Command::Process(args) = cli.command else {
            panic!("expected process command");
        };
        assert_eq!(args.input, Some(PathBuf::from("record.csv")));
        assert_eq!(args.endpoint.as_deref(), Some("http://localhost:9000/invocations"));
        assert_eq!(args.timeout, 5);
        assert!(args.pretty);
        assert!(!args.no_inference);
    }

    #[test]
    fn test_process_needs_input() {
        assert!(Cli::try_parse_from(["ecg-pipeline", "process"]).is_err());
        assert!(Cli::try_parse_from(["ecg-pipeline", "process", "a.csv", "--synthetic"]).is_err());

        let cli = Cli::try_parse_from(["ecg-pipeline", "process", "--synthetic"]).unwrap();
        let Command::Process(args) = cli.command else {
            panic!("expected process command");
        };
        assert!(args.synthetic);
        assert!(args.input.is_none());
    }

    #[test]
    fn test_simulate_pattern() {
        let cli = Cli::try_parse_from(["ecg-pipeline", "simulate", "--pattern", "flat", "--amplitude", "0"]).unwrap();
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate command");
        };
        assert_eq!(args.signal_pattern(), SignalPattern::Flat { level: 0.0 });
        assert_eq!(args.rate, 500.0);
    }
}

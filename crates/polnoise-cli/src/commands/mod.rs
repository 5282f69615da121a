pub mod check;
pub mod simulate;

use std::path::PathBuf;

use clap::{ArgGroup, Args};
use polnoise_core::{
    Combination, Result, RunWriter, SampleGraph, Simulation, SimulationConfig, SimulationReport,
    StokesSink, build_sample,
};

/// Options shared by `simulate` and `check`. Flags override `--config`.
#[derive(Args, Debug, Default)]
#[command(group(ArgGroup::new("combination").args(["superposed", "composite", "disjoint", "coherent"])))]
pub struct SimulateArgs {
    /// JSON configuration file (see `SimulationConfig`)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of Stokes samples. A bare number is a raw count (`-N 1000` draws
    /// 1000 samples); k (2^10) and M (2^20) suffixes scale it, e.g. `-N 1M`
    #[arg(short = 'N', long, value_parser = parse_count)]
    pub samples: Option<u64>,

    /// Instances averaged per sample
    #[arg(short = 'n', long)]
    pub sample_size: Option<usize>,

    /// Superpose mode A and mode B
    #[arg(long)]
    pub superposed: bool,

    /// Fraction of each sample drawn from mode A
    #[arg(long, value_name = "F")]
    pub composite: Option<f64>,

    /// Probability that a whole sample is drawn from mode A
    #[arg(long, value_name = "F")]
    pub disjoint: Option<f64>,

    /// Coherence of a partially coherent sum of mode A and mode B
    #[arg(long, value_name = "C")]
    pub coherent: Option<f64>,

    /// Mean Stokes parameters of mode A as I,Q,U,V
    #[arg(short = 's', long, value_parser = parse_stokes, allow_hyphen_values = true)]
    pub stokes: Option<[f64; 4]>,

    /// Mean Stokes parameters of mode B as I,Q,U,V
    #[arg(long, value_parser = parse_stokes, allow_hyphen_values = true)]
    pub stokes_b: Option<[f64; 4]>,

    /// Log-normal modulation index of mode A
    #[arg(short = 'l', long)]
    pub beta: Option<f64>,

    /// Log-normal modulation index of mode B
    #[arg(long)]
    pub beta_b: Option<f64>,

    /// Boxcar width applied to the modulation factor of mode A
    #[arg(short = 'b', long)]
    pub boxcar_modulation: Option<usize>,

    /// Boxcar width applied to the modulation factor of mode B
    #[arg(long)]
    pub boxcar_modulation_b: Option<usize>,

    /// Square-wave hold width of the modulation factor of mode A
    #[arg(short = 'r', long)]
    pub square_modulation: Option<usize>,

    /// Square-wave hold width of the modulation factor of mode B
    #[arg(long)]
    pub square_modulation_b: Option<usize>,

    /// Pre-detection boxcar width of mode A
    #[arg(short = 'm', long)]
    pub smooth_before: Option<usize>,

    /// Pre-detection boxcar width of mode B
    #[arg(long)]
    pub smooth_before_b: Option<usize>,

    /// Post-detection boxcar width (single mode only)
    #[arg(short = 'M', long)]
    pub smooth_after: Option<usize>,

    /// Correlation of the two modes' modulation factors
    #[arg(short = 'k', long, allow_hyphen_values = true)]
    pub covariant: Option<f64>,

    /// Number of lags of the cross-covariance to analyse
    #[arg(short = 'X', long)]
    pub lags: Option<usize>,

    /// Seed for the Gaussian source (default: OS entropy)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Record every sample to stokes.txt in the run directory
    #[arg(short = 'f', long)]
    pub stokes_file: bool,

    /// Run directory root (default: ./runs/ when anything is recorded)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Write the full report as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,
}

impl SimulateArgs {
    /// Start from `--config` (or the defaults) and apply every given flag.
    pub fn build_config(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::load(path)?,
            None => SimulationConfig::default(),
        };

        if let Some(v) = self.samples {
            config.samples = v;
        }
        if let Some(v) = self.sample_size {
            config.sample_size = v;
        }
        if let Some(v) = self.lags {
            config.lags = v;
        }
        if let Some(v) = self.smooth_after {
            config.smooth_after = v;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.covariant.is_some() {
            config.covariant = self.covariant;
        }

        if self.superposed {
            config.combination = Combination::Superposed;
        } else if let Some(fraction) = self.composite {
            config.combination = Combination::Composite { fraction };
        } else if let Some(fraction) = self.disjoint {
            config.combination = Combination::Disjoint { fraction };
        } else if let Some(coherence) = self.coherent {
            config.combination = Combination::Coherent { coherence };
        }

        let a = &mut config.mode_a;
        override_with(&mut a.mean, self.stokes);
        override_with(&mut a.beta, self.beta);
        override_with(&mut a.smooth_modulator, self.boxcar_modulation);
        override_with(&mut a.square_modulator, self.square_modulation);
        override_with(&mut a.smooth_before, self.smooth_before);

        let b = &mut config.mode_b;
        override_with(&mut b.mean, self.stokes_b);
        override_with(&mut b.beta, self.beta_b);
        override_with(&mut b.smooth_modulator, self.boxcar_modulation_b);
        override_with(&mut b.square_modulator, self.square_modulation_b);
        override_with(&mut b.smooth_before, self.smooth_before_b);

        config.validate()?;
        Ok(config)
    }

    /// Whether a run directory is needed.
    fn records(&self, config: &SimulationConfig) -> bool {
        self.stokes_file || self.output.is_some() || config.lags > 0
    }
}

fn override_with<T>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}

/// Parse a sample count such as `4096`, `16k` or `2M`.
pub fn parse_count(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    let (digits, shift) = match s.chars().last() {
        Some('k') | Some('K') => (&s[..s.len() - 1], 10),
        Some('M') => (&s[..s.len() - 1], 20),
        _ => (s, 0),
    };
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid count '{s}' (expected e.g. 4096, 16k, 2M)"))?;
    n.checked_mul(1 << shift)
        .ok_or_else(|| format!("count '{s}' is too large"))
}

/// Parse four comma-separated Stokes parameters.
pub fn parse_stokes(s: &str) -> std::result::Result<[f64; 4], String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid Stokes parameters '{s}': {e}"))?;
    <[f64; 4]>::try_from(values).map_err(|v| format!("expected 4 Stokes parameters I,Q,U,V, got {}", v.len()))
}

/// Build the sample graph and run the measurement loop, recording to a run
/// directory when requested.
pub fn execute(args: &SimulateArgs, config: &SimulationConfig, theory_only: bool) -> Result<(SampleGraph, SimulationReport)> {
    let mut graph = build_sample(config)?;
    let simulation = Simulation::new(config.samples, config.lags);

    let label = config.combination.to_string();
    let label = label.split_whitespace().next().unwrap_or("run");

    let report = if theory_only {
        simulation.predict(graph.sample.as_ref())
    } else if args.records(config) {
        let root = args.output.clone().unwrap_or_else(|| PathBuf::from("runs"));
        let mut writer = RunWriter::new(&root, label, args.stokes_file)?;
        let report = simulation.run(graph.sample.as_mut(), Some(&mut writer as &mut dyn StokesSink))?;
        let dir = writer.finish(config, &report)?;
        println!("Run recorded to {}", dir.display());
        report
    } else {
        simulation.run(graph.sample.as_mut(), None)?
    };

    if let Some(path) = &args.json {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!("Report written to {}", path.display());
    }

    Ok((graph, report))
}

/// Print an error and exit with status 1.
pub fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("Error: {e}");
    std::process::exit(1);
}

// ---------------------------------------------------------------------------
// Report printing
// ---------------------------------------------------------------------------

const PARAMS: [&str; 4] = ["I", "Q", "U", "V"];

fn print_matrix(title: &str, m: &[[f64; 4]; 4]) {
    println!("  {title}");
    for (name, row) in PARAMS.iter().zip(m) {
        let cells: Vec<String> = row.iter().map(|v| format!("{v:>12.5}")).collect();
        println!("    {name} {}", cells.join(" "));
    }
}

fn print_vector(title: &str, v: &[f64; 4]) {
    let cells: Vec<String> = v.iter().map(|x| format!("{x:>12.5}")).collect();
    println!("  {title:<10} {}", cells.join(" "));
}

pub fn print_report(report: &SimulationReport, moments: bool) {
    println!();
    println!(
        "{} sample, {} instance(s) per sample",
        report.sample, report.sample_size
    );
    println!("{}", "-".repeat(66));
    println!("  {:<10} {:>12} {:>12} {:>12} {:>12}", "", "I", "Q", "U", "V");

    print_vector("expected", &report.expected.mean);
    if let Some(simulated) = &report.simulated {
        print_vector("simulated", &simulated.mean);
    }
    println!();

    print_matrix("expected covariance", &report.expected.covariance);
    if let Some(simulated) = &report.simulated {
        print_matrix("simulated covariance", &simulated.covariance);
    }

    if moments {
        println!();
        println!("  {:<4} {:>14} {:>14} {:>14} {:>14}", "", "mean", "variance", "exp. mean", "exp. var");
        let expected = report.expected.means_and_variances();
        let simulated = report.simulated.as_ref().map(|m| m.means_and_variances());
        for (i, name) in PARAMS.iter().enumerate() {
            let (em, ev) = expected[i];
            match simulated {
                Some(s) => println!("  {name:<4} {:>14.6} {:>14.6} {em:>14.6} {ev:>14.6}", s[i].0, s[i].1),
                None => println!("  {name:<4} {:>14} {:>14} {em:>14.6} {ev:>14.6}", "-", "-"),
            }
        }
    }

    if let Some(summary) = &report.summary {
        println!();
        println!("  samples                 {}", summary.samples);
        println!("  mean degree of pol.     {:.5}", summary.mean_degree_of_polarization);
        println!("  modulation index        {:.5}", summary.modulation_index);
    }

    if report.lags.len() > 1 {
        println!();
        println!("  {:<5} {:>14} {:>14}", "lag", "expected C_II", "simulated C_II");
        for entry in &report.lags {
            match entry.simulated {
                Some(s) => println!("  {:<5} {:>14.6} {:>14.6}", entry.lag, entry.expected[0][0], s[0][0]),
                None => println!("  {:<5} {:>14.6} {:>14}", entry.lag, entry.expected[0][0], "-"),
            }
        }
    }
    println!();
}

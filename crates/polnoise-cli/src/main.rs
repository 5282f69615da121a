//! CLI for polnoise — simulate polarized noise and compare it with theory.

mod commands;

use clap::{Parser, Subcommand};

use commands::SimulateArgs;

#[derive(Parser)]
#[command(name = "polnoise")]
#[command(about = "polnoise — Monte-Carlo polarized noise against closed-form statistics")]
#[command(version = polnoise_core::VERSION)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate Stokes samples and print simulated versus expected moments
    Simulate {
        #[command(flatten)]
        args: SimulateArgs,

        /// Only print the analytic predictions
        #[arg(short = 't', long)]
        theory_only: bool,

        /// Print the mean and variance of each Stokes parameter
        #[arg(short = 'd', long)]
        moments: bool,
    },

    /// Simulate, then grade the agreement with theory (exit status 1 on failure)
    Check {
        #[command(flatten)]
        args: SimulateArgs,

        /// Minimum agreement score (0-100) to pass
        #[arg(long, default_value = "60")]
        threshold: f64,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Simulate {
            args,
            theory_only,
            moments,
        } => commands::simulate::run(&args, theory_only, moments),
        Commands::Check { args, threshold } => commands::check::run(&args, threshold),
    }
}

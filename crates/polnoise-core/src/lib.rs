//! # polnoise-core
//!
//! **Polarized noise, simulated and predicted.**
//!
//! `polnoise-core` builds statistical models of polarized electromagnetic
//! noise out of composable *modes*, draws Monte-Carlo Stokes samples from
//! them, and computes the closed-form mean, covariance and lag
//! cross-covariance those samples should have.
//!
//! ## Quick Start
//!
//! ```no_run
//! use polnoise_core::{Combination, Simulation, SimulationConfig, build_sample};
//!
//! let config = SimulationConfig {
//!     samples: 100_000,
//!     sample_size: 4,
//!     seed: Some(7),
//!     combination: Combination::Composite { fraction: 0.25 },
//!     ..Default::default()
//! };
//!
//! let mut graph = build_sample(&config).unwrap();
//! let report = Simulation::new(config.samples, 0)
//!     .run(graph.sample.as_mut(), None)
//!     .unwrap();
//! println!("{:?}", report.expected.mean);
//! ```
//!
//! ## Architecture
//!
//! GaussianSource → Mode (polarize, modulate, smooth) → Sample (combine,
//! average) → Simulation (accumulate, compare)
//!
//! Every stage answers for its own moments: a [`Mode`] knows its mean,
//! covariance and cross-covariance at each lag, and every [`Sample`] derives
//! its block moments from those of the modes it owns.

pub mod combination;
pub mod config;
pub mod covariant;
pub mod error;
pub mod field;
pub mod gaussian;
pub mod mode;
pub mod modulated;
pub mod recording;
pub mod sample;
pub mod setup;
pub mod simulation;
pub mod smoothed;

pub use combination::{Coherent, Composite, Disjoint, Superposed};
pub use config::{Combination, DEFAULT_SAMPLES, ModeConfig, SimulationConfig};
pub use covariant::{Coordinator, CovariantModulation, correlation_bounds};
pub use error::{Error, Result};
pub use field::{
    Covariance, Polarizer, Spinor, Stokes, compute_stokes, degree_of_polarization,
    minkowski_inner, minkowski_outer, outer,
};
pub use gaussian::{GaussianSource, SharedSource};
pub use mode::{FieldTransform, FieldTransformer, GaussianMode, Mode};
pub use modulated::{
    BoxcarModulation, LogNormal, ModulatedMode, Modulation, Modulator, SquareModulation, modulate,
    square_cross_correlation,
};
pub use recording::{MachineInfo, RunMeta, RunWriter, detect_machine_info};
pub use sample::{BoxcarSample, Sample, SingleSample, block_covariance, block_crosscovariance};
pub use setup::{ModeSetup, SampleGraph, build_sample};
pub use simulation::{
    BATCHES, BatchMoments, LagEntry, Moments, SampleSummary, Simulation, SimulationReport, StokesSink,
};
pub use smoothed::{BoxcarMode, BoxcarSmoothing, boxcar_smooth};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

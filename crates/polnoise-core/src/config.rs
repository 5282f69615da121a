//! Run configuration.
//!
//! A [`SimulationConfig`] fully describes one simulation: which combination
//! of modes to build, how each mode is modulated and smoothed, how many
//! samples to draw and how many lags to analyse. It round-trips through JSON
//! so runs can be recorded and replayed.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::covariant::correlation_bounds;
use crate::error::{Error, Result};
use crate::field::{Stokes, check_realizable};

/// Default number of Stokes samples (2²⁰).
pub const DEFAULT_SAMPLES: u64 = 1 << 20;

/// Per-mode settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
    /// Mean Stokes parameters `[I, Q, U, V]`.
    pub mean: [f64; 4],
    /// Modulation index; 0 disables log-normal modulation.
    pub beta: f64,
    /// Boxcar width applied to the modulation factor (0 or 1 = off).
    pub smooth_modulator: usize,
    /// Hold width of a square-wave modulation (0 or 1 = off).
    pub square_modulator: usize,
    /// Pre-detection boxcar width applied to the field (0 or 1 = off).
    pub smooth_before: usize,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            mean: [1.0, 0.0, 0.0, 0.0],
            beta: 0.0,
            smooth_modulator: 0,
            square_modulator: 0,
            smooth_before: 0,
        }
    }
}

impl ModeConfig {
    pub fn stokes(&self) -> Stokes {
        Stokes::from(self.mean)
    }

    fn validate(&self, label: &str) -> Result<()> {
        check_realizable(&self.stokes()).map_err(|e| Error::parameter(format!("{label}: {e}")))?;
        if !self.beta.is_finite() || self.beta < 0.0 {
            return Err(Error::parameter(format!("{label}: beta must be finite and >= 0, got {}", self.beta)));
        }
        if self.smooth_modulator > 1 && self.square_modulator > 1 {
            return Err(Error::parameter(format!(
                "{label}: smooth_modulator and square_modulator cannot be combined"
            )));
        }
        // the boxcar prediction assumes a Gaussian field
        if self.smooth_before > 1 && self.beta > 0.0 {
            return Err(Error::parameter(format!(
                "{label}: smooth_before applies to unmodulated modes only (beta = {})",
                self.beta
            )));
        }
        Ok(())
    }

    /// Whether the modulation factor is smoothed or held.
    fn has_memory(&self) -> bool {
        self.beta > 0.0 && (self.smooth_modulator > 1 || self.square_modulator > 1)
    }
}

/// How the modes combine into a sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Combination {
    /// One mode (`mode_a`).
    #[default]
    Single,
    /// `e = e_A + e_B`.
    Superposed,
    /// Fraction of each sample drawn from `A`.
    Composite { fraction: f64 },
    /// Probability that a whole sample is drawn from `A`.
    Disjoint { fraction: f64 },
    /// Partially coherent sum with the given coherence.
    Coherent { coherence: f64 },
}

impl Combination {
    /// Whether `mode_b` takes part.
    pub fn is_dual(&self) -> bool {
        !matches!(self, Combination::Single)
    }
}

impl std::fmt::Display for Combination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Combination::Single => write!(f, "single"),
            Combination::Superposed => write!(f, "superposed"),
            Combination::Composite { fraction } => write!(f, "composite (fraction={fraction})"),
            Combination::Disjoint { fraction } => write!(f, "disjoint (fraction={fraction})"),
            Combination::Coherent { coherence } => write!(f, "coherent (coherence={coherence})"),
        }
    }
}

/// Complete description of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of Stokes samples to simulate.
    pub samples: u64,
    /// Instances averaged per sample.
    pub sample_size: usize,
    /// Number of lags of the cross-covariance to analyse (0 = none).
    pub lags: usize,
    /// Post-detection boxcar width (single mode only; 0 or 1 = off).
    pub smooth_after: usize,
    /// Seed for the Gaussian source; `None` draws from the OS.
    pub seed: Option<u64>,
    pub combination: Combination,
    /// Correlation of the two modes' modulation factors.
    pub covariant: Option<f64>,
    pub mode_a: ModeConfig,
    pub mode_b: ModeConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            sample_size: 1,
            lags: 0,
            smooth_after: 0,
            seed: None,
            combination: Combination::Single,
            covariant: None,
            mode_a: ModeConfig::default(),
            mode_b: ModeConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Read and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Check every parameter before any mode is constructed.
    pub fn validate(&self) -> Result<()> {
        if self.sample_size == 0 {
            return Err(Error::parameter("sample_size must be at least 1"));
        }
        if self.samples == 0 {
            return Err(Error::parameter("samples must be at least 1"));
        }

        self.mode_a.validate("mode A")?;
        if self.combination.is_dual() {
            self.mode_b.validate("mode B")?;
        }
        for (label, mode) in self.active_modes() {
            self.validate_square(label, mode)?;
        }

        match self.combination {
            Combination::Composite { fraction } | Combination::Disjoint { fraction } => {
                if !(0.0..=1.0).contains(&fraction) {
                    return Err(Error::parameter(format!("fraction must lie in [0, 1], got {fraction}")));
                }
            }
            Combination::Coherent { coherence } => {
                if !(-1.0..=1.0).contains(&coherence) {
                    return Err(Error::parameter(format!("coherence must lie in [-1, 1], got {coherence}")));
                }
                // only the modes' means reach the coherent field
                if self.mode_a.beta > 0.0 || self.mode_b.beta > 0.0 {
                    return Err(Error::parameter("coherent combination does not support modulated modes"));
                }
            }
            Combination::Single | Combination::Superposed => {}
        }

        if let Some(rho) = self.covariant {
            if !matches!(self.combination, Combination::Superposed | Combination::Composite { .. }) {
                return Err(Error::parameter(format!(
                    "covariant modulation requires a superposed or composite combination, got {}",
                    self.combination
                )));
            }
            if self.mode_a.has_memory() || self.mode_b.has_memory() {
                return Err(Error::parameter(
                    "covariant modulation cannot be combined with smooth_modulator or square_modulator",
                ));
            }
            let (beta_a, beta_b) = (self.mode_a.beta, self.mode_b.beta);
            if beta_a <= 0.0 || beta_b <= 0.0 {
                return Err(Error::parameter("covariant modulation requires beta > 0 for both modes"));
            }
            let (min, max) = correlation_bounds(beta_a, beta_b);
            if !(min..=max).contains(&rho) {
                return Err(Error::parameter(format!(
                    "covariant correlation {rho} outside feasible range [{min}, {max}]"
                )));
            }
        }

        if self.smooth_after > 1 && self.combination.is_dual() {
            return Err(Error::parameter("post-detection smoothing applies to a single mode only"));
        }

        Ok(())
    }

    fn active_modes(&self) -> impl Iterator<Item = (&'static str, &ModeConfig)> {
        let b = self.combination.is_dual().then_some(("mode B", &self.mode_b));
        std::iter::once(("mode A", &self.mode_a)).chain(b)
    }

    /// A held factor visits only the phases `k·gcd(width, sample_size)` of
    /// its window. The lag and block predictions assume every phase is
    /// visited, so a shared factor limits the run to whole-sample moments.
    fn validate_square(&self, label: &str, mode: &ModeConfig) -> Result<()> {
        let width = mode.square_modulator;
        if width <= 1 || mode.beta <= 0.0 || gcd(width, self.sample_size) == 1 {
            return Ok(());
        }
        let partial_blocks = matches!(self.combination, Combination::Composite { .. });
        if self.lags > 1 || self.smooth_after > 1 || partial_blocks {
            return Err(Error::parameter(format!(
                "{label}: square_modulator {width} shares a factor with sample_size {}; \
                 lags, smooth_after and composite samples need them coprime",
                self.sample_size
            )));
        }
        Ok(())
    }
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

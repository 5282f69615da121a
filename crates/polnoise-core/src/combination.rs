//! Samples built from two modes, `A` and `B`, under alternative
//! statistical models of how their radiation combines.

use crate::error::{Error, Result};
use crate::field::{Covariance, Spinor, Stokes, compute_stokes, minkowski_outer, outer};
use crate::gaussian::SharedSource;
use crate::mode::{GaussianMode, Mode};
use crate::sample::{Sample, block_covariance, block_crosscovariance, check_sample_size, strided_block};

fn check_fraction(fraction: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(Error::parameter(format!("mixing fraction must lie in [0, 1], got {fraction}")));
    }
    Ok(())
}

/// Block cross-covariance of two independent modes: the sum of each mode's
/// own block cross-covariance.
fn independent_crosscovariance(a: &dyn Mode, b: &dyn Mode, lag: usize, n: usize) -> Covariance {
    block_crosscovariance(a, lag, n) + block_crosscovariance(b, lag, n)
}

// ---------------------------------------------------------------------------
// Superposed
// ---------------------------------------------------------------------------

/// Incoherent superposition: `e = e_A + e_B` at every instance.
pub struct Superposed {
    a: Box<dyn Mode>,
    b: Box<dyn Mode>,
    sample_size: usize,
    intensity_covariance: f64,
}

impl Superposed {
    pub fn new(a: Box<dyn Mode>, b: Box<dyn Mode>) -> Self {
        Self {
            a,
            b,
            sample_size: 1,
            intensity_covariance: 0.0,
        }
    }

    /// Covariance of the two modes' unit-mean modulation factors.
    pub fn set_intensity_covariance(&mut self, covariance: f64) {
        self.intensity_covariance = covariance;
    }

    pub fn intensity_covariance(&self) -> f64 {
        self.intensity_covariance
    }
}

impl Sample for Superposed {
    fn measure(&mut self) -> Result<Stokes> {
        let mut result = Stokes::zeros();
        for _ in 0..self.sample_size {
            let e_a = self.a.get_field()?;
            let e_b = self.b.get_field()?;
            result += compute_stokes(&(e_a + e_b));
        }
        Ok(result / self.sample_size as f64)
    }

    fn get_mean(&self) -> Stokes {
        self.a.get_mean() + self.b.get_mean()
    }

    fn get_covariance(&self) -> Covariance {
        let n = self.sample_size;
        let rho = self.intensity_covariance;
        let (mean_a, mean_b) = (self.a.get_mean(), self.b.get_mean());

        // modulation factors are assumed to have unit mean
        let x = minkowski_outer(&mean_a, &mean_b) * ((1.0 + rho) / n as f64)
            + outer(&mean_a, &mean_b) * (rho / n as f64);

        block_covariance(self.a.as_ref(), n) + block_covariance(self.b.as_ref(), n) + x + x.transpose()
    }

    fn get_crosscovariance(&self, lag: usize) -> Covariance {
        if lag == 0 {
            return self.get_covariance();
        }
        independent_crosscovariance(self.a.as_ref(), self.b.as_ref(), lag, self.sample_size)
    }

    fn sample_size(&self) -> usize {
        self.sample_size
    }

    fn set_sample_size(&mut self, sample_size: usize) -> Result<()> {
        check_sample_size(sample_size)?;
        self.sample_size = sample_size;
        Ok(())
    }

    fn set_normal(&mut self, normal: SharedSource) {
        self.a.set_normal(normal.clone());
        self.b.set_normal(normal);
    }

    fn name(&self) -> &'static str {
        "superposed"
    }
}

// ---------------------------------------------------------------------------
// Composite
// ---------------------------------------------------------------------------

/// Within each sample, the first `⌊f·n⌋` instances come from `A` and the
/// rest from `B`.
///
/// Both modes are drawn at every instance so that their internal buffers
/// advance in lock-step; the unused field is discarded.
pub struct Composite {
    a: Box<dyn Mode>,
    b: Box<dyn Mode>,
    sample_size: usize,
    fraction: f64,
}

impl Composite {
    pub fn new(a: Box<dyn Mode>, b: Box<dyn Mode>, fraction: f64) -> Result<Self> {
        check_fraction(fraction)?;
        Ok(Self {
            a,
            b,
            sample_size: 1,
            fraction,
        })
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// Instances per sample drawn from `A` and from `B`.
    pub fn split(&self) -> (usize, usize) {
        let n_a = ((self.fraction * self.sample_size as f64).floor() as usize).min(self.sample_size);
        (n_a, self.sample_size - n_a)
    }

    fn weights(&self) -> (f64, f64) {
        let (n_a, n_b) = self.split();
        let n = self.sample_size as f64;
        (n_a as f64 / n, n_b as f64 / n)
    }
}

impl Sample for Composite {
    fn measure(&mut self) -> Result<Stokes> {
        let (n_a, _) = self.split();
        let mut result = Stokes::zeros();
        for i in 0..self.sample_size {
            let e_a = self.a.get_field()?;
            let e_b = self.b.get_field()?;
            let e = if i < n_a { e_a } else { e_b };
            result += compute_stokes(&e);
        }
        Ok(result / self.sample_size as f64)
    }

    fn get_mean(&self) -> Stokes {
        let (f_a, f_b) = self.weights();
        self.a.get_mean() * f_a + self.b.get_mean() * f_b
    }

    fn get_covariance(&self) -> Covariance {
        let (n_a, n_b) = self.split();
        let (f_a, f_b) = self.weights();
        block_covariance(self.a.as_ref(), n_a) * (f_a * f_a) + block_covariance(self.b.as_ref(), n_b) * (f_b * f_b)
    }

    /// Blocks `lag` apart start `lag·n` instances apart for both modes, since
    /// both are drawn at every instance.
    fn get_crosscovariance(&self, lag: usize) -> Covariance {
        if lag == 0 {
            return self.get_covariance();
        }
        let (n_a, n_b) = self.split();
        let (f_a, f_b) = self.weights();
        let offset = lag * self.sample_size;
        let a = strided_block(|l| self.a.get_crosscovariance(l), offset, n_a);
        let b = strided_block(|l| self.b.get_crosscovariance(l), offset, n_b);
        a * (f_a * f_a) + b * (f_b * f_b)
    }

    fn sample_size(&self) -> usize {
        self.sample_size
    }

    fn set_sample_size(&mut self, sample_size: usize) -> Result<()> {
        check_sample_size(sample_size)?;
        self.sample_size = sample_size;
        Ok(())
    }

    fn set_normal(&mut self, normal: SharedSource) {
        self.a.set_normal(normal.clone());
        self.b.set_normal(normal);
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}

// ---------------------------------------------------------------------------
// Disjoint
// ---------------------------------------------------------------------------

/// Each whole sample is drawn from `A` with probability `f`, else from `B`.
///
/// As in [`Composite`], both modes are drawn at every instance so that
/// samples `ℓ` apart are `ℓ·n` instances apart in either mode.
pub struct Disjoint {
    a: Box<dyn Mode>,
    b: Box<dyn Mode>,
    sample_size: usize,
    fraction: f64,
    normal: Option<SharedSource>,
}

impl Disjoint {
    pub fn new(a: Box<dyn Mode>, b: Box<dyn Mode>, fraction: f64) -> Result<Self> {
        check_fraction(fraction)?;
        Ok(Self {
            a,
            b,
            sample_size: 1,
            fraction,
            normal: None,
        })
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }
}

impl Sample for Disjoint {
    fn measure(&mut self) -> Result<Stokes> {
        let u = self
            .normal
            .as_ref()
            .ok_or_else(|| Error::state("Disjoint::measure: Gaussian source not bound"))?
            .borrow_mut()
            .uniform();

        let from_a = u < self.fraction;
        let mut result = Stokes::zeros();
        for _ in 0..self.sample_size {
            let e_a = self.a.get_field()?;
            let e_b = self.b.get_field()?;
            result += compute_stokes(if from_a { &e_a } else { &e_b });
        }
        Ok(result / self.sample_size as f64)
    }

    fn get_mean(&self) -> Stokes {
        self.a.get_mean() * self.fraction + self.b.get_mean() * (1.0 - self.fraction)
    }

    fn get_covariance(&self) -> Covariance {
        let f = self.fraction;
        let n = self.sample_size;
        let diff = self.a.get_mean() - self.b.get_mean();
        block_covariance(self.a.as_ref(), n) * f
            + block_covariance(self.b.as_ref(), n) * (1.0 - f)
            + outer(&diff, &diff) * (f * (1.0 - f))
    }

    /// Selections are independent between samples, so only the within-mode
    /// block cross-covariances survive, each weighted by the probability that
    /// both samples chose that mode.
    fn get_crosscovariance(&self, lag: usize) -> Covariance {
        if lag == 0 {
            return self.get_covariance();
        }
        let f = self.fraction;
        let n = self.sample_size;
        block_crosscovariance(self.a.as_ref(), lag, n) * (f * f)
            + block_crosscovariance(self.b.as_ref(), lag, n) * ((1.0 - f) * (1.0 - f))
    }

    fn sample_size(&self) -> usize {
        self.sample_size
    }

    fn set_sample_size(&mut self, sample_size: usize) -> Result<()> {
        check_sample_size(sample_size)?;
        self.sample_size = sample_size;
        Ok(())
    }

    fn set_normal(&mut self, normal: SharedSource) {
        self.a.set_normal(normal.clone());
        self.b.set_normal(normal.clone());
        self.normal = Some(normal);
    }

    fn name(&self) -> &'static str {
        "disjoint"
    }
}

// ---------------------------------------------------------------------------
// Coherent
// ---------------------------------------------------------------------------

/// Partially coherent sum of two pure states.
///
/// A coupling mode with mean `(2, 0, 2c, 0)` supplies a pair of complex
/// amplitudes with unit power and correlation `c`; the field is
/// `amps.x·a + amps.y·b`, where `a` and `b` are the pure-state spinors of
/// the means of `A` and `B`. The field is complex Gaussian with coherency
/// `aa† + bb† + c(ab† + ba†)`, so instances are independent and each has
/// the Gaussian covariance of that mean. For fully polarized means and
/// `c = 0` this reduces to `mean_A + mean_B` plus the Minkowski cross term.
pub struct Coherent {
    a: Box<dyn Mode>,
    b: Box<dyn Mode>,
    sample_size: usize,
    coherence: f64,
    coupling: GaussianMode,
    states: Option<(Spinor, Spinor)>,
}

impl Coherent {
    pub fn new(a: Box<dyn Mode>, b: Box<dyn Mode>, coherence: f64) -> Result<Self> {
        if !(-1.0..=1.0).contains(&coherence) {
            return Err(Error::parameter(format!("coherence must lie in [-1, 1], got {coherence}")));
        }
        let coupling = GaussianMode::with_mean(Stokes::new(2.0, 0.0, 2.0 * coherence, 0.0))?;
        Ok(Self {
            a,
            b,
            sample_size: 1,
            coherence,
            coupling,
            states: None,
        })
    }

    pub fn coherence(&self) -> f64 {
        self.coherence
    }

    fn states(&mut self) -> (Spinor, Spinor) {
        let (a, b) = (&self.a, &self.b);
        *self
            .states
            .get_or_insert_with(|| (Spinor::from_stokes(&a.get_mean()), Spinor::from_stokes(&b.get_mean())))
    }

    /// Mean Stokes parameters of one coherent instance.
    fn instance_mean(&self) -> Stokes {
        let a = Spinor::from_stokes(&self.a.get_mean());
        let b = Spinor::from_stokes(&self.b.get_mean());
        let (s_a, s_b) = (compute_stokes(&a), compute_stokes(&b));
        let interference = compute_stokes(&(a + b)) - s_a - s_b;
        s_a + s_b + interference * self.coherence
    }
}

impl Sample for Coherent {
    fn measure(&mut self) -> Result<Stokes> {
        let (a, b) = self.states();
        let mut result = Stokes::zeros();
        for _ in 0..self.sample_size {
            let amps = self.coupling.get_field()?;
            let e = amps.x * a + amps.y * b;
            result += compute_stokes(&e);
        }
        Ok(result / self.sample_size as f64)
    }

    fn get_mean(&self) -> Stokes {
        self.instance_mean()
    }

    fn get_covariance(&self) -> Covariance {
        let mean = self.instance_mean();
        minkowski_outer(&mean, &mean) / self.sample_size as f64
    }

    fn get_crosscovariance(&self, lag: usize) -> Covariance {
        if lag == 0 {
            self.get_covariance()
        } else {
            Covariance::zeros()
        }
    }

    fn sample_size(&self) -> usize {
        self.sample_size
    }

    fn set_sample_size(&mut self, sample_size: usize) -> Result<()> {
        check_sample_size(sample_size)?;
        self.sample_size = sample_size;
        Ok(())
    }

    fn set_normal(&mut self, normal: SharedSource) {
        self.coupling.set_normal(normal.clone());
        self.a.set_normal(normal.clone());
        self.b.set_normal(normal);
    }

    fn name(&self) -> &'static str {
        "coherent"
    }
}

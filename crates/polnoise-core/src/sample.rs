//! Block means of many instantaneous measurements and their exact moments.
//!
//! A sample averages `sample_size` successive Stokes instances. When the
//! instances form a stationary process with lag cross-covariance `C_ℓ`, the
//! covariance of the block mean is the Toeplitz sum
//!
//! ```text
//! Σ = (1/n²) [ n C₀ + Σ_{ℓ=1}^{n−1} 2 (n − ℓ) C_ℓ ]
//! ```
//!
//! and the cross-covariance between blocks `k` apart sums `C_{|kn + i − j|}`
//! over the `n × n` off-diagonal square. Every sample and combination builds
//! its analytic moments from these two workers.

use crate::error::{Error, Result};
use crate::field::{Covariance, Stokes, compute_stokes};
use crate::gaussian::SharedSource;
use crate::mode::Mode;

/// A reported Stokes measurement built from one or more modes.
pub trait Sample {
    /// Draw one Monte-Carlo block mean.
    fn measure(&mut self) -> Result<Stokes>;

    /// Expected value of [`measure`](Self::measure).
    fn get_mean(&self) -> Stokes;

    /// Covariance of [`measure`](Self::measure).
    fn get_covariance(&self) -> Covariance;

    /// Cross-covariance between measurements `lag` samples apart.
    fn get_crosscovariance(&self, lag: usize) -> Covariance;

    /// Number of instances averaged per measurement.
    fn sample_size(&self) -> usize;

    fn set_sample_size(&mut self, sample_size: usize) -> Result<()>;

    /// Bind the Gaussian source to every leaf.
    fn set_normal(&mut self, normal: SharedSource);

    /// Short label for reports.
    fn name(&self) -> &'static str;
}

pub(crate) fn check_sample_size(sample_size: usize) -> Result<()> {
    if sample_size == 0 {
        return Err(Error::parameter("sample size must be at least 1"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Block workers
// ---------------------------------------------------------------------------

/// Covariance of the mean of `n` successive instances of a process whose
/// lag cross-covariance is `lag_cov`. Zero for `n == 0`.
pub fn toeplitz_block<F>(lag_cov: F, n: usize) -> Covariance
where
    F: Fn(usize) -> Covariance,
{
    if n == 0 {
        return Covariance::zeros();
    }

    let mut result = lag_cov(0) * n as f64;
    for lag in 1..n {
        result += lag_cov(lag) * (2.0 * (n - lag) as f64);
    }
    result / (n * n) as f64
}

/// `(1/len²) Σ_{i,j<len} C_{|offset + i − j|}`: the cross-covariance between
/// the means of two runs of `len` instances whose starts are `offset` apart.
pub fn strided_block<F>(lag_cov: F, offset: usize, len: usize) -> Covariance
where
    F: Fn(usize) -> Covariance,
{
    if len == 0 {
        return Covariance::zeros();
    }

    let len_i = len as i64;
    let offset = offset as i64;
    let mut result = Covariance::zeros();
    // group the len² terms by diagonal d = i − j
    for d in (1 - len_i)..len_i {
        let weight = (len_i - d.abs()) as f64;
        result += lag_cov((offset + d).unsigned_abs() as usize) * weight;
    }
    result / (len * len) as f64
}

/// Covariance of the mean of `n` successive instances of `mode`.
pub fn block_covariance(mode: &dyn Mode, n: usize) -> Covariance {
    toeplitz_block(|lag| mode.get_crosscovariance(lag), n)
}

/// Cross-covariance between means of `n`-instance blocks of `mode` that are
/// `at_lag` blocks apart.
pub fn block_crosscovariance(mode: &dyn Mode, at_lag: usize, n: usize) -> Covariance {
    strided_block(|lag| mode.get_crosscovariance(lag), at_lag * n, n)
}

// ---------------------------------------------------------------------------
// Single source
// ---------------------------------------------------------------------------

/// Block mean of a single mode.
pub struct SingleSample {
    mode: Box<dyn Mode>,
    sample_size: usize,
}

impl SingleSample {
    pub fn new(mode: Box<dyn Mode>) -> Self {
        Self { mode, sample_size: 1 }
    }

    pub fn mode(&self) -> &dyn Mode {
        self.mode.as_ref()
    }
}

impl Sample for SingleSample {
    fn measure(&mut self) -> Result<Stokes> {
        let mut result = Stokes::zeros();
        for _ in 0..self.sample_size {
            result += compute_stokes(&self.mode.get_field()?);
        }
        Ok(result / self.sample_size as f64)
    }

    fn get_mean(&self) -> Stokes {
        self.mode.get_mean()
    }

    fn get_covariance(&self) -> Covariance {
        block_covariance(self.mode.as_ref(), self.sample_size)
    }

    fn get_crosscovariance(&self, lag: usize) -> Covariance {
        block_crosscovariance(self.mode.as_ref(), lag, self.sample_size)
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
        self.mode.set_normal(normal);
    }

    fn name(&self) -> &'static str {
        "single"
    }
}

// ---------------------------------------------------------------------------
// Post-detection boxcar
// ---------------------------------------------------------------------------

/// Block mean of the running average of the last `smooth` Stokes instances
/// of a mode.
pub struct BoxcarSample {
    mode: Box<dyn Mode>,
    sample_size: usize,
    smooth: usize,
    instances: Vec<Stokes>,
    current: usize,
}

impl BoxcarSample {
    pub fn new(mode: Box<dyn Mode>, smooth: usize) -> Result<Self> {
        if smooth == 0 {
            return Err(Error::parameter("post-detection smoothing width must be at least 1"));
        }
        Ok(Self {
            mode,
            sample_size: 1,
            smooth,
            instances: Vec::with_capacity(smooth),
            current: 0,
        })
    }

    pub fn smooth(&self) -> usize {
        self.smooth
    }

    fn instance(&mut self) -> Result<Stokes> {
        if self.instances.len() < self.smooth {
            self.instances.clear();
            self.instances.push(Stokes::zeros());
            for _ in 1..self.smooth {
                let s = compute_stokes(&self.mode.get_field()?);
                self.instances.push(s);
            }
            self.current = 0;
        }

        self.instances[self.current] = compute_stokes(&self.mode.get_field()?);
        self.current = (self.current + 1) % self.smooth;

        let total: Stokes = self.instances.iter().sum();
        Ok(total / self.smooth as f64)
    }

    /// Cross-covariance between smoothed instances `lag` apart.
    fn instance_crosscovariance(&self, lag: usize) -> Covariance {
        strided_block(|l| self.mode.get_crosscovariance(l), lag, self.smooth)
    }
}

impl Sample for BoxcarSample {
    fn measure(&mut self) -> Result<Stokes> {
        let mut result = Stokes::zeros();
        for _ in 0..self.sample_size {
            result += self.instance()?;
        }
        Ok(result / self.sample_size as f64)
    }

    fn get_mean(&self) -> Stokes {
        self.mode.get_mean()
    }

    fn get_covariance(&self) -> Covariance {
        toeplitz_block(|lag| self.instance_crosscovariance(lag), self.sample_size)
    }

    fn get_crosscovariance(&self, lag: usize) -> Covariance {
        let n = self.sample_size;
        strided_block(|l| self.instance_crosscovariance(l), lag * n, n)
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
        self.mode.set_normal(normal);
    }

    fn name(&self) -> &'static str {
        "boxcar"
    }
}

//! Amplitude-modulated modes.
//!
//! A modulated mode scales each field drawn from its source by the square
//! root of a positive scalar factor. The factor's law is supplied by a
//! [`Modulation`]; the second-order moments of the modulated mode follow from
//! the product-of-independent-factors identity
//!
//! ```text
//! C_ℓ = C_src,ℓ · (γ(ℓ) + μ_m²) + γ(ℓ) · outer(μ_src, μ_src)
//! ```
//!
//! where `γ(ℓ)` is the autocovariance of the modulation factor at lag `ℓ`.

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::field::{Covariance, Spinor, Stokes, outer};
use crate::gaussian::SharedSource;
use crate::mode::{FieldTransform, FieldTransformer, Mode};

/// Law of a per-instance modulation factor.
pub trait Modulation {
    /// Draw the next factor. Stateful implementations advance their buffers.
    fn modulation(&mut self, normal: &SharedSource) -> Result<f64>;

    /// Exact mean of the factor.
    fn mod_mean(&self) -> f64;

    /// Exact variance of the factor.
    fn mod_variance(&self) -> f64;

    /// Autocovariance of the factor between draws separated by `lag`.
    fn autocovariance(&self, lag: usize) -> f64 {
        if lag == 0 { self.mod_variance() } else { 0.0 }
    }
}

impl<M: Modulation + ?Sized> Modulation for Box<M> {
    fn modulation(&mut self, normal: &SharedSource) -> Result<f64> {
        (**self).modulation(normal)
    }

    fn mod_mean(&self) -> f64 {
        (**self).mod_mean()
    }

    fn mod_variance(&self) -> f64 {
        (**self).mod_variance()
    }

    fn autocovariance(&self, lag: usize) -> f64 {
        (**self).autocovariance(lag)
    }
}

/// Field transform that applies a modulation law.
pub struct Modulator<M> {
    modulation: M,
}

impl<M: Modulation> Modulator<M> {
    pub fn new(modulation: M) -> Self {
        Self { modulation }
    }

    pub fn modulation(&self) -> &M {
        &self.modulation
    }

    pub fn modulation_mut(&mut self) -> &mut M {
        &mut self.modulation
    }

    pub fn into_inner(self) -> M {
        self.modulation
    }
}

impl<M: Modulation> FieldTransform for Modulator<M> {
    fn transform(&mut self, field: Spinor, source: &mut dyn Mode) -> Result<Spinor> {
        let normal = source
            .get_normal()
            .ok_or_else(|| Error::state("modulated mode: Gaussian source not bound"))?;
        let factor = self.modulation.modulation(&normal)?;
        Ok(factor.sqrt() * field)
    }

    fn mean(&self, source: &dyn Mode) -> Stokes {
        self.modulation.mod_mean() * source.get_mean()
    }

    fn covariance(&self, source: &dyn Mode) -> Covariance {
        self.crosscovariance(source, 0)
    }

    fn crosscovariance(&self, source: &dyn Mode, lag: usize) -> Covariance {
        let mu = self.modulation.mod_mean();
        let gamma = self.modulation.autocovariance(lag);
        let mean = source.get_mean();
        source.get_crosscovariance(lag) * (gamma + mu * mu) + outer(&mean, &mean) * gamma
    }
}

/// A mode whose amplitude is scaled by a dynamically chosen modulation law.
pub type ModulatedMode = FieldTransformer<Modulator<Box<dyn Modulation>>>;

/// Wrap `source` in the modulation law `modulation`.
pub fn modulate(source: Box<dyn Mode>, modulation: Box<dyn Modulation>) -> ModulatedMode {
    FieldTransformer::new(source, Modulator::new(modulation))
}

// ---------------------------------------------------------------------------
// Log-normal
// ---------------------------------------------------------------------------

/// Unit-mean log-normal modulation: `exp(σ(Z − σ/2))` for standard normal `Z`.
#[derive(Debug, Clone)]
pub struct LogNormal {
    log_sigma: f64,
}

impl LogNormal {
    /// Log-normal law with modulation index `beta` (the standard deviation
    /// of the factor).
    pub fn new(beta: f64) -> Result<Self> {
        let mut law = Self { log_sigma: 0.0 };
        law.set_beta(beta)?;
        Ok(law)
    }

    /// Log-normal law with the given standard deviation of the logarithm.
    pub fn from_log_sigma(log_sigma: f64) -> Result<Self> {
        if !log_sigma.is_finite() || log_sigma < 0.0 {
            return Err(Error::parameter(format!("log-normal sigma must be finite and >= 0, got {log_sigma}")));
        }
        Ok(Self { log_sigma })
    }

    pub fn set_beta(&mut self, beta: f64) -> Result<()> {
        if !beta.is_finite() || beta < 0.0 {
            return Err(Error::parameter(format!("modulation index must be finite and >= 0, got {beta}")));
        }
        self.log_sigma = (beta * beta + 1.0).ln().sqrt();
        Ok(())
    }

    pub fn beta(&self) -> f64 {
        self.mod_variance().sqrt()
    }

    pub fn log_sigma(&self) -> f64 {
        self.log_sigma
    }
}

impl Modulation for LogNormal {
    fn modulation(&mut self, normal: &SharedSource) -> Result<f64> {
        let z = normal.borrow_mut().normal();
        Ok((self.log_sigma * (z - 0.5 * self.log_sigma)).exp())
    }

    fn mod_mean(&self) -> f64 {
        1.0
    }

    fn mod_variance(&self) -> f64 {
        (self.log_sigma * self.log_sigma).exp_m1()
    }
}

// ---------------------------------------------------------------------------
// Boxcar-smoothed modulation
// ---------------------------------------------------------------------------

/// Moving average of the last `width` factors drawn from an inner law.
pub struct BoxcarModulation {
    inner: Box<dyn Modulation>,
    width: usize,
    instances: Vec<f64>,
    current: usize,
}

impl BoxcarModulation {
    pub fn new(inner: Box<dyn Modulation>, width: usize) -> Result<Self> {
        if width == 0 {
            return Err(Error::parameter("boxcar modulation width must be at least 1"));
        }
        Ok(Self {
            inner,
            width,
            instances: Vec::with_capacity(width),
            current: 0,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn inner(&self) -> &dyn Modulation {
        self.inner.as_ref()
    }
}

impl Modulation for BoxcarModulation {
    fn modulation(&mut self, normal: &SharedSource) -> Result<f64> {
        if self.instances.len() < self.width {
            // slot 0 is filled below
            self.instances.clear();
            self.instances.push(0.0);
            for _ in 1..self.width {
                let m = self.inner.modulation(normal)?;
                self.instances.push(m);
            }
            self.current = 0;
        }

        self.instances[self.current] = self.inner.modulation(normal)?;
        self.current = (self.current + 1) % self.width;

        Ok(self.instances.iter().sum::<f64>() / self.width as f64)
    }

    fn mod_mean(&self) -> f64 {
        self.inner.mod_mean()
    }

    fn mod_variance(&self) -> f64 {
        self.autocovariance(0)
    }

    /// `(1/n²) Σ_{|d|<n} (n − |d|) γ_inner(|ℓ + d|)`; for an uncorrelated
    /// inner law this is the triangular weight `(n − ℓ)/n² · var_inner`.
    fn autocovariance(&self, lag: usize) -> f64 {
        let n = self.width as i64;
        let lag = lag as i64;
        let mut sum = 0.0;
        for d in (1 - n)..n {
            let weight = (n - d.abs()) as f64;
            sum += weight * self.inner.autocovariance((lag + d).unsigned_abs() as usize);
        }
        sum / (n * n) as f64
    }
}

// ---------------------------------------------------------------------------
// Square-wave held modulation
// ---------------------------------------------------------------------------

/// Factor drawn from an inner law and held for `width` consecutive instances.
pub struct SquareModulation {
    inner: Box<dyn Modulation>,
    width: usize,
    current: usize,
    value: f64,
    cross_correlation: Vec<f64>,
}

impl SquareModulation {
    /// Hold each factor for `width` instances. The lag correlation is
    /// averaged over the hold phase relative to blocks of `sample_size`.
    pub fn new(inner: Box<dyn Modulation>, width: usize, sample_size: usize) -> Result<Self> {
        if width == 0 {
            return Err(Error::parameter("square-wave width must be at least 1"));
        }
        Ok(Self {
            inner,
            width,
            current: width,
            value: 0.0,
            cross_correlation: square_cross_correlation(width, sample_size),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Phase-averaged correlation coefficient for lags `0..width`.
    pub fn cross_correlation(&self) -> &[f64] {
        &self.cross_correlation
    }
}

impl Modulation for SquareModulation {
    fn modulation(&mut self, normal: &SharedSource) -> Result<f64> {
        if self.current == self.width {
            self.value = self.inner.modulation(normal)?;
            self.current = 0;
        }
        self.current += 1;
        Ok(self.value)
    }

    fn mod_mean(&self) -> f64 {
        self.inner.mod_mean()
    }

    fn mod_variance(&self) -> f64 {
        self.inner.mod_variance()
    }

    fn autocovariance(&self, lag: usize) -> f64 {
        match self.cross_correlation.get(lag) {
            Some(cc) => cc * self.inner.mod_variance(),
            None => 0.0,
        }
    }
}

/// Fraction of instance pairs at each lag `< width` that share one hold
/// window.
///
/// Successive blocks of `sample_size` instances shift the window phase by
/// `sample_size mod width`, so the phases visited are `0, n, 2n, ...
/// (mod width)` until the cycle closes. Lags shorter than a block average
/// the within-block pairs over those phases. Longer lags only occur between
/// blocks and take the all-phase weight `(width − ℓ)/width`, which is what
/// the phase average reduces to when `width` and `sample_size` are coprime.
pub fn square_cross_correlation(width: usize, sample_size: usize) -> Vec<f64> {
    let n = sample_size.max(1);
    if n <= width {
        warn!("square-wave width {width} >= sample size {n}; held factors span successive samples");
    }

    let within = width.min(n);
    let mut pairs = vec![0u64; within];
    let mut populations = 0u64;
    let mut phase = 0usize;

    loop {
        for (lag, count) in pairs.iter_mut().enumerate() {
            *count += (0..n - lag)
                .filter(|i| (phase + i) / width == (phase + i + lag) / width)
                .count() as u64;
        }
        populations += 1;

        phase = (phase + n) % width;
        if phase == 0 {
            break;
        }
    }

    debug!("square-wave width={width} sample_size={n}: {populations} phase populations");

    let mut cc: Vec<f64> = pairs
        .iter()
        .enumerate()
        .map(|(lag, &count)| count as f64 / ((n - lag) as u64 * populations) as f64)
        .collect();
    cc.extend((within..width).map(|lag| (width - lag) as f64 / width as f64));
    cc
}

//! Pre-detection (field-level) boxcar smoothing.

use crate::error::{Error, Result};
use crate::field::{Covariance, Spinor};
use crate::mode::{FieldTransform, FieldTransformer, Mode};

/// Running sum of the last `width` fields, normalized by `sqrt(width)` so the
/// mean power is preserved.
pub struct BoxcarSmoothing {
    width: usize,
    instances: Vec<Spinor>,
    current: usize,
}

impl BoxcarSmoothing {
    pub fn new(width: usize) -> Result<Self> {
        if width == 0 {
            return Err(Error::parameter("field smoothing width must be at least 1"));
        }
        Ok(Self {
            width,
            instances: Vec::with_capacity(width),
            current: 0,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

impl FieldTransform for BoxcarSmoothing {
    fn transform(&mut self, field: Spinor, source: &mut dyn Mode) -> Result<Spinor> {
        if self.instances.len() < self.width {
            self.instances.clear();
            self.instances.push(Spinor::zero());
            for _ in 1..self.width {
                let e = source.get_field()?;
                self.instances.push(e);
            }
            self.current = 0;
        }

        self.instances[self.current] = field;
        self.current = (self.current + 1) % self.width;

        let mut sum = Spinor::zero();
        for e in &self.instances {
            sum += *e;
        }
        Ok(sum * (1.0 / (self.width as f64).sqrt()))
    }

    /// Neighbouring outputs share `width − lag` fields, so the field
    /// correlation is `(n − ℓ)/n` and the Stokes cross-covariance scales by
    /// its square. Exact for a complex Gaussian source.
    fn crosscovariance(&self, source: &dyn Mode, lag: usize) -> Covariance {
        if lag >= self.width {
            return Covariance::zeros();
        }
        let rho = (self.width - lag) as f64 / self.width as f64;
        source.get_covariance() * (rho * rho)
    }
}

/// A field-smoothed mode.
pub type BoxcarMode = FieldTransformer<BoxcarSmoothing>;

/// Smooth the fields of `source` over `width` consecutive instances.
pub fn boxcar_smooth(source: Box<dyn Mode>, width: usize) -> Result<BoxcarMode> {
    Ok(FieldTransformer::new(source, BoxcarSmoothing::new(width)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Stokes, compute_stokes};
    use crate::gaussian::GaussianSource;
    use crate::mode::GaussianMode;

    #[test]
    fn primes_with_extra_draws() {
        let normal = GaussianSource::seed_from_u64(3).shared();
        let mut mode = boxcar_smooth(Box::new(GaussianMode::new()), 4).unwrap();
        mode.set_normal(normal.clone());

        mode.get_field().unwrap();
        // 4 fields of 4 deviates each
        assert_eq!(normal.borrow().draws(), 16);
        mode.get_field().unwrap();
        assert_eq!(normal.borrow().draws(), 20);
    }

    #[test]
    fn width_one_is_identity() {
        let a = GaussianSource::seed_from_u64(10).shared();
        let b = GaussianSource::seed_from_u64(10).shared();
        let mut plain = GaussianMode::new();
        plain.set_normal(a);
        let mut smoothed = boxcar_smooth(Box::new(GaussianMode::new()), 1).unwrap();
        smoothed.set_normal(b);
        for _ in 0..5 {
            assert_eq!(plain.get_field().unwrap(), smoothed.get_field().unwrap());
        }
    }

    #[test]
    fn zero_width_rejected() {
        assert!(matches!(BoxcarSmoothing::new(0), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn lag_weights_are_squared_overlap() {
        let mean = Stokes::new(1.0, 0.0, 0.4, 0.0);
        let mode = boxcar_smooth(Box::new(GaussianMode::with_mean(mean).unwrap()), 4).unwrap();
        let c0 = mode.get_covariance();
        assert_eq!(mode.get_crosscovariance(0), c0);
        assert!((mode.get_crosscovariance(2) - c0 * 0.25).amax() < 1e-12);
        assert_eq!(mode.get_crosscovariance(4), Covariance::zeros());
    }

    #[test]
    fn empirical_lag_one_intensity_covariance() {
        let mut mode = boxcar_smooth(Box::new(GaussianMode::new()), 2).unwrap();
        mode.set_normal(GaussianSource::seed_from_u64(77).shared());

        let n = 200_000;
        let mut prev = compute_stokes(&mode.get_field().unwrap())[0];
        let (mut sx, mut sy, mut sxy) = (0.0, 0.0, 0.0);
        for _ in 0..n {
            let cur = compute_stokes(&mode.get_field().unwrap())[0];
            sx += prev;
            sy += cur;
            sxy += prev * cur;
            prev = cur;
        }
        let nf = n as f64;
        let cov = sxy / nf - (sx / nf) * (sy / nf);
        let expected = mode.get_crosscovariance(1)[(0, 0)];
        assert!((cov - expected).abs() < 0.02, "cov={cov} expected={expected}");
    }
}

//! Stochastic field generators ("modes") and the decorator that rewrites
//! field generation while forwarding everything else.
//!
//! Every mode implements the [`Mode`] capability set. Wrappers own the mode
//! they wrap and delegate to it, so a pipeline such as
//! `GaussianMode → modulation → boxcar smoothing` is built by nesting owners.

use num_complex::Complex64;

use crate::error::{Error, Result};
use crate::field::{Covariance, Polarizer, Spinor, Stokes, check_realizable, minkowski_outer, polarizer};
use crate::gaussian::SharedSource;

/// RMS of each real component of the raw isotropic noise.
pub const FIELD_RMS: f64 = 0.5;

/// Capability set shared by every field generator.
pub trait Mode {
    /// Set the mean Stokes vector. Unrealizable vectors are rejected.
    fn set_mean(&mut self, mean: Stokes) -> Result<()>;

    /// Expected value of one instantaneous Stokes measurement.
    fn get_mean(&self) -> Stokes;

    /// Covariance of one instantaneous Stokes measurement.
    fn get_covariance(&self) -> Covariance;

    /// Cross-covariance between instances separated by `lag`.
    ///
    /// Independent instances by default: the covariance at lag zero and
    /// nothing beyond.
    fn get_crosscovariance(&self, lag: usize) -> Covariance {
        if lag == 0 {
            self.get_covariance()
        } else {
            Covariance::zeros()
        }
    }

    /// Draw one random realization of the electric field.
    fn get_field(&mut self) -> Result<Spinor>;

    /// Gaussian source used to generate fields, if bound.
    fn get_normal(&self) -> Option<SharedSource>;

    /// Bind the Gaussian source.
    fn set_normal(&mut self, normal: SharedSource);
}

// ---------------------------------------------------------------------------
// Complex Gaussian mode
// ---------------------------------------------------------------------------

/// Complex Gaussian noise with a prescribed mean polarization.
pub struct GaussianMode {
    mean: Stokes,
    polarizer: Polarizer,
    normal: Option<SharedSource>,
}

impl GaussianMode {
    /// Unpolarized mode with mean `(1, 0, 0, 0)` and no bound source.
    pub fn new() -> Self {
        let mean = Stokes::new(1.0, 0.0, 0.0, 0.0);
        Self {
            mean,
            polarizer: polarizer(&mean),
            normal: None,
        }
    }

    /// Mode with the given mean.
    pub fn with_mean(mean: Stokes) -> Result<Self> {
        let mut mode = Self::new();
        mode.set_mean(mean)?;
        Ok(mode)
    }

    /// Polarizer derived from the current mean.
    pub fn get_polarizer(&self) -> &Polarizer {
        &self.polarizer
    }
}

impl Default for GaussianMode {
    fn default() -> Self {
        Self::new()
    }
}

impl Mode for GaussianMode {
    fn set_mean(&mut self, mean: Stokes) -> Result<()> {
        check_realizable(&mean)?;
        self.mean = mean;
        self.polarizer = polarizer(&mean);
        Ok(())
    }

    fn get_mean(&self) -> Stokes {
        self.mean
    }

    fn get_covariance(&self) -> Covariance {
        minkowski_outer(&self.mean, &self.mean)
    }

    fn get_field(&mut self) -> Result<Spinor> {
        let normal = self
            .normal
            .as_ref()
            .ok_or_else(|| Error::state("GaussianMode::get_field: Gaussian source not bound"))?;
        let mut source = normal.borrow_mut();

        let x = Complex64::new(FIELD_RMS * source.normal(), FIELD_RMS * source.normal());
        let y = Complex64::new(FIELD_RMS * source.normal(), FIELD_RMS * source.normal());

        Ok(Spinor::new(x, y).polarize(&self.polarizer))
    }

    fn get_normal(&self) -> Option<SharedSource> {
        self.normal.clone()
    }

    fn set_normal(&mut self, normal: SharedSource) {
        self.normal = Some(normal);
    }
}

// ---------------------------------------------------------------------------
// Field transformer
// ---------------------------------------------------------------------------

/// Transformation applied to each field drawn from a wrapped mode.
///
/// The moment hooks default to forwarding the source's moments unchanged;
/// transforms that alter the statistics override them.
pub trait FieldTransform {
    /// Transform `field`, freshly drawn from `source`. The source may be
    /// drawn from again (e.g. to prime a smoothing buffer).
    fn transform(&mut self, field: Spinor, source: &mut dyn Mode) -> Result<Spinor>;

    fn mean(&self, source: &dyn Mode) -> Stokes {
        source.get_mean()
    }

    fn covariance(&self, source: &dyn Mode) -> Covariance {
        source.get_covariance()
    }

    fn crosscovariance(&self, source: &dyn Mode, lag: usize) -> Covariance {
        source.get_crosscovariance(lag)
    }
}

/// Decorator that owns a source mode and rewrites its fields.
pub struct FieldTransformer<T> {
    source: Box<dyn Mode>,
    transform: T,
}

impl<T: FieldTransform> FieldTransformer<T> {
    pub fn new(source: Box<dyn Mode>, transform: T) -> Self {
        Self { source, transform }
    }

    /// The wrapped mode.
    pub fn get_source(&self) -> &dyn Mode {
        self.source.as_ref()
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut T {
        &mut self.transform
    }

    /// Unwrap into the source mode and the transform.
    pub fn into_parts(self) -> (Box<dyn Mode>, T) {
        (self.source, self.transform)
    }
}

impl<T: FieldTransform> Mode for FieldTransformer<T> {
    fn set_mean(&mut self, mean: Stokes) -> Result<()> {
        self.source.set_mean(mean)
    }

    fn get_mean(&self) -> Stokes {
        self.transform.mean(self.source.as_ref())
    }

    fn get_covariance(&self) -> Covariance {
        self.transform.covariance(self.source.as_ref())
    }

    fn get_crosscovariance(&self, lag: usize) -> Covariance {
        self.transform.crosscovariance(self.source.as_ref(), lag)
    }

    fn get_field(&mut self) -> Result<Spinor> {
        let field = self.source.get_field()?;
        self.transform.transform(field, self.source.as_mut())
    }

    fn get_normal(&self) -> Option<SharedSource> {
        self.source.get_normal()
    }

    fn set_normal(&mut self, normal: SharedSource) {
        self.source.set_normal(normal);
    }
}

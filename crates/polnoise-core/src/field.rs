//! Field value types: Stokes vectors, spinors, polarizers, and the pure
//! functions that connect them.
//!
//! Conventions used throughout the crate:
//!
//! ```text
//! I = |x|² + |y|²      Q = |x|² − |y|²
//! U = 2 Re(x̄ y)        V = 2 Im(x̄ y)
//! ```
//!
//! and the natural Hermitian form of a Stokes vector is
//! `I·σ0 + Q·σ1 + U·σ2 + V·σ3` with `σ1 = diag(1,−1)`, `σ2 = [[0,1],[1,0]]`,
//! `σ3 = [[0,−i],[i,0]]`. With these choices a polarizer computed from a mean
//! Stokes vector maps isotropic noise of per-component RMS 0.5 onto a field
//! whose expected Stokes vector is exactly that mean.

use std::ops::{Add, AddAssign, Mul};

use nalgebra::{Matrix2, Matrix4, Vector4};
use num_complex::Complex64;

use crate::error::{Error, Result};

/// Four Stokes parameters `(I, Q, U, V)`.
pub type Stokes = Vector4<f64>;

/// Covariance (or cross-covariance) between Stokes parameters.
pub type Covariance = Matrix4<f64>;

/// 2×2 complex linear operator applied to a spinor.
pub type Polarizer = Matrix2<Complex64>;

/// Relative tolerance applied to the realizability check so that fully
/// polarized states built from rounded inputs are not rejected.
const REALIZABILITY_TOLERANCE: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Spinor
// ---------------------------------------------------------------------------

/// One instantaneous realization of the two-component electric field.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Spinor {
    pub x: Complex64,
    pub y: Complex64,
}

impl Spinor {
    pub const fn new(x: Complex64, y: Complex64) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Apply a polarizer (Jones matrix) to this field.
    pub fn polarize(&self, j: &Polarizer) -> Self {
        Self {
            x: j[(0, 0)] * self.x + j[(0, 1)] * self.y,
            y: j[(1, 0)] * self.x + j[(1, 1)] * self.y,
        }
    }

    /// Detected Stokes parameters of this field.
    pub fn stokes(&self) -> Stokes {
        compute_stokes(self)
    }

    /// Pure-state spinor whose detected Stokes vector has intensity `I` and
    /// the polarization direction of `stokes`.
    ///
    /// For a fully polarized input `compute_stokes(from_stokes(s)) == s`. An
    /// unpolarized input yields the state `(sqrt(I), 0)`.
    pub fn from_stokes(stokes: &Stokes) -> Self {
        let amplitude = stokes[0].max(0.0).sqrt();
        let p = polarized_intensity(stokes);
        if p == 0.0 {
            return Self::new(Complex64::new(amplitude, 0.0), Complex64::new(0.0, 0.0));
        }

        let (n1, n2, n3) = (stokes[1] / p, stokes[2] / p, stokes[3] / p);
        if 1.0 + n1 <= f64::EPSILON {
            // eigenvector of the +1 eigenvalue is (0, 1) when n = (−1, 0, 0)
            return Self::new(Complex64::new(0.0, 0.0), Complex64::new(amplitude, 0.0));
        }

        let norm = (2.0 * (1.0 + n1)).sqrt();
        Self::new(
            Complex64::new(amplitude * (1.0 + n1) / norm, 0.0),
            Complex64::new(amplitude * n2 / norm, amplitude * n3 / norm),
        )
    }
}

impl Add for Spinor {
    type Output = Spinor;

    fn add(self, rhs: Spinor) -> Spinor {
        Spinor::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Spinor {
    fn add_assign(&mut self, rhs: Spinor) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Mul<f64> for Spinor {
    type Output = Spinor;

    fn mul(self, scale: f64) -> Spinor {
        Spinor::new(self.x * scale, self.y * scale)
    }
}

impl Mul<Spinor> for f64 {
    type Output = Spinor;

    fn mul(self, e: Spinor) -> Spinor {
        e * self
    }
}

impl Mul<Spinor> for Complex64 {
    type Output = Spinor;

    fn mul(self, e: Spinor) -> Spinor {
        Spinor::new(self * e.x, self * e.y)
    }
}

// ---------------------------------------------------------------------------
// Stokes helpers
// ---------------------------------------------------------------------------

/// Quadratic map from a field realization to its Stokes parameters.
pub fn compute_stokes(e: &Spinor) -> Stokes {
    let var_x = e.x.norm_sqr();
    let var_y = e.y.norm_sqr();
    let c_xy = e.x.conj() * e.y;

    Stokes::new(var_x + var_y, var_x - var_y, 2.0 * c_xy.re, 2.0 * c_xy.im)
}

/// Length of the polarization vector `(Q, U, V)`.
pub fn polarized_intensity(stokes: &Stokes) -> f64 {
    (stokes[1] * stokes[1] + stokes[2] * stokes[2] + stokes[3] * stokes[3]).sqrt()
}

/// Degree of polarization `|(Q,U,V)| / I`. The caller guarantees `I != 0`.
pub fn degree_of_polarization(stokes: &Stokes) -> f64 {
    polarized_intensity(stokes) / stokes[0]
}

/// Physical realizability: finite components and `I ≥ |(Q,U,V)|`.
pub fn is_realizable(stokes: &Stokes) -> bool {
    stokes.iter().all(|v| v.is_finite())
        && stokes[0] >= 0.0
        && polarized_intensity(stokes) <= stokes[0] * (1.0 + REALIZABILITY_TOLERANCE)
}

/// Reject Stokes vectors that no field can produce.
pub fn check_realizable(stokes: &Stokes) -> Result<()> {
    if is_realizable(stokes) {
        Ok(())
    } else {
        Err(Error::parameter(format!(
            "unrealizable Stokes parameters ({}, {}, {}, {}): polarized intensity exceeds total intensity",
            stokes[0], stokes[1], stokes[2], stokes[3]
        )))
    }
}

/// Ordinary outer product `a ⊗ b`.
pub fn outer(a: &Stokes, b: &Stokes) -> Covariance {
    a * b.transpose()
}

/// Minkowski inner product `a0 b0 − a·b`.
pub fn minkowski_inner(a: &Stokes, b: &Stokes) -> f64 {
    a[0] * b[0] - a[1] * b[1] - a[2] * b[2] - a[3] * b[3]
}

/// Minkowski outer product `a ⊗ b − ½ η (a·b)` with `η = diag(1,−1,−1,−1)`.
///
/// `minkowski_outer(s, s)` is the covariance of one instantaneous Stokes
/// measurement of complex Gaussian noise with mean `s`.
pub fn minkowski_outer(a: &Stokes, b: &Stokes) -> Covariance {
    let mut result = outer(a, b);
    let half = 0.5 * minkowski_inner(a, b);
    result[(0, 0)] -= half;
    for i in 1..4 {
        result[(i, i)] += half;
    }
    result
}

// ---------------------------------------------------------------------------
// Square roots and polarizers
// ---------------------------------------------------------------------------

/// Closed-form square root of a positive semi-definite 2×2 matrix:
/// `sqrt(C) = (C + s·I) / t` with `s = sqrt(det C)`, `t = sqrt(trace C + 2s)`.
pub fn sqrt_psd_2x2(c: &Matrix2<f64>) -> Matrix2<f64> {
    let det = c[(0, 0)] * c[(1, 1)] - c[(0, 1)] * c[(1, 0)];
    let trace = c[(0, 0)] + c[(1, 1)];

    let s = det.max(0.0).sqrt();
    let t = (trace + 2.0 * s).sqrt();
    if t == 0.0 {
        return Matrix2::zeros();
    }

    (c + Matrix2::identity() * s) / t
}

/// Natural Hermitian form of a Stokes vector.
pub fn natural(stokes: &Stokes) -> Polarizer {
    let (i, q, u, v) = (stokes[0], stokes[1], stokes[2], stokes[3]);
    Polarizer::new(
        Complex64::new(i + q, 0.0),
        Complex64::new(u, -v),
        Complex64::new(u, v),
        Complex64::new(i - q, 0.0),
    )
}

/// Polarizer for a target mean: the square root of the natural Hermitian
/// form, computed with the same closed form as [`sqrt_psd_2x2`].
pub fn polarizer(stokes: &Stokes) -> Polarizer {
    let herm = natural(stokes);
    let det = stokes[0] * stokes[0] - polarized_intensity(stokes).powi(2);
    let trace = 2.0 * stokes[0];

    let s = det.max(0.0).sqrt();
    let t = (trace + 2.0 * s).sqrt();
    if t == 0.0 {
        return Polarizer::zeros();
    }

    (herm + Polarizer::identity() * Complex64::new(s, 0.0)) / Complex64::new(t, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn compute_stokes_of_x_field() {
        let e = Spinor::new(Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0));
        assert_eq!(compute_stokes(&e), Stokes::new(1.0, 1.0, 0.0, 0.0));
    }

    #[test]
    fn compute_stokes_circular() {
        // x̄y = i/2 → V = 1
        let r = 1.0 / 2f64.sqrt();
        let e = Spinor::new(Complex64::new(r, 0.0), Complex64::new(0.0, r));
        let s = compute_stokes(&e);
        assert!(close(s[0], 1.0));
        assert!(close(s[1], 0.0));
        assert!(close(s[2], 0.0));
        assert!(close(s[3], 1.0));
    }

    #[test]
    fn minkowski_outer_unpolarized_is_half_identity() {
        let s = Stokes::new(1.0, 0.0, 0.0, 0.0);
        let c = minkowski_outer(&s, &s);
        assert_eq!(c, Covariance::identity() * 0.5);
    }

    #[test]
    fn minkowski_outer_fully_polarized_is_outer() {
        let s = Stokes::new(1.0, 0.6, 0.0, 0.8);
        assert!((minkowski_outer(&s, &s) - outer(&s, &s)).norm() < 1e-12);
    }

    #[test]
    fn sqrt_psd_squares_back() {
        let c = Matrix2::new(2.0, 0.3, 0.3, 1.0);
        let r = sqrt_psd_2x2(&c);
        assert!((r * r - c).norm() < 1e-12);
    }

    #[test]
    fn polarizer_squares_to_natural_form() {
        let s = Stokes::new(1.0, -0.1, 0.2, 0.6);
        let j = polarizer(&s);
        assert!((j * j - natural(&s)).norm() < 1e-12);
    }

    #[test]
    fn polarizer_of_unpolarized_is_identity() {
        let j = polarizer(&Stokes::new(1.0, 0.0, 0.0, 0.0));
        assert!((j - Polarizer::identity()).norm() < 1e-12);
    }

    #[test]
    fn polarizer_of_zero_intensity_is_zero() {
        assert_eq!(polarizer(&Stokes::zeros()), Polarizer::zeros());
    }

    #[test]
    fn from_stokes_recovers_pure_states() {
        for s in [
            Stokes::new(2.0, 2.0, 0.0, 0.0),
            Stokes::new(1.0, -1.0, 0.0, 0.0),
            Stokes::new(1.0, 0.0, 1.0, 0.0),
            Stokes::new(3.0, 0.0, 0.0, -3.0),
            Stokes::new(1.0, 0.6, 0.0, 0.8),
        ] {
            let e = Spinor::from_stokes(&s);
            assert!((compute_stokes(&e) - s).norm() < 1e-12, "{s:?}");
        }
    }

    #[test]
    fn realizability() {
        assert!(is_realizable(&Stokes::new(1.0, 0.6, 0.0, 0.8)));
        assert!(is_realizable(&Stokes::new(1.0, 0.0, 0.0, 0.0)));
        assert!(!is_realizable(&Stokes::new(1.0, 1.0, 0.1, 0.0)));
        assert!(!is_realizable(&Stokes::new(f64::NAN, 0.0, 0.0, 0.0)));
        assert!(check_realizable(&Stokes::new(0.5, 0.0, 0.0, 0.6)).is_err());
    }

    #[test]
    fn degree_of_polarization_basic() {
        let s = Stokes::new(2.0, 0.6, 0.0, 0.8);
        assert!(close(degree_of_polarization(&s), 0.5));
    }
}

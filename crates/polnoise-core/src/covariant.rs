//! Correlated modulation of two modes.
//!
//! A [`Coordinator`] draws pairs of modulation factors from a bivariate
//! log-normal law with a prescribed Pearson correlation and queues one value
//! of each pair for each of two consumers. A consumer
//! ([`CovariantModulation`]) pops from its own queue and asks the coordinator
//! for a new pair only when the queue is empty, so both streams advance in
//! lock-step.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use log::debug;
use nalgebra::{Matrix2, Vector2};

use crate::error::{Error, Result};
use crate::field::sqrt_psd_2x2;
use crate::gaussian::SharedSource;
use crate::mode::Mode;
use crate::modulated::{ModulatedMode, Modulation, modulate};

/// Feasible range `(min, max)` of the correlation between two unit-mean
/// log-normal factors with modulation indices `beta0` and `beta1`.
pub fn correlation_bounds(beta0: f64, beta1: f64) -> (f64, f64) {
    let s0 = log_sigma(beta0);
    let s1 = log_sigma(beta1);
    let denom = beta0 * beta1;
    ((-s0 * s1).exp_m1() / denom, (s0 * s1).exp_m1() / denom)
}

fn log_sigma(beta: f64) -> f64 {
    (beta * beta + 1.0).ln().sqrt()
}

/// Shared handle to a bivariate log-normal pair generator.
#[derive(Clone)]
pub struct Coordinator {
    state: Rc<RefCell<BivariateLogNormal>>,
}

struct BivariateLogNormal {
    correlation: f64,
    beta: [f64; 2],
    log_sigma: [f64; 2],
    correlator: Matrix2<f64>,
    bound: [bool; 2],
    pending: [VecDeque<f64>; 2],

    count: u64,
    mean: Vector2<f64>,
    meansq: Matrix2<f64>,
}

impl BivariateLogNormal {
    /// Validate the correlation against the marginals and pre-factor the
    /// log-covariance matrix.
    fn build(&mut self) -> Result<()> {
        for (index, &beta) in self.beta.iter().enumerate() {
            if !beta.is_finite() || beta <= 0.0 {
                return Err(Error::parameter(format!(
                    "covariant modulation index {index} must be finite and > 0, got {beta}"
                )));
            }
        }

        let (min, max) = correlation_bounds(self.beta[0], self.beta[1]);
        if !(min..=max).contains(&self.correlation) {
            return Err(Error::parameter(format!(
                "correlation {} outside feasible range [{min}, {max}] for beta=({}, {})",
                self.correlation, self.beta[0], self.beta[1]
            )));
        }

        self.log_sigma = [log_sigma(self.beta[0]), log_sigma(self.beta[1])];
        let off = (self.correlation * self.beta[0] * self.beta[1]).ln_1p();
        let covar = Matrix2::new(
            self.log_sigma[0] * self.log_sigma[0],
            off,
            off,
            self.log_sigma[1] * self.log_sigma[1],
        );
        self.correlator = sqrt_psd_2x2(&covar);

        debug!(
            "bivariate log-normal: rho={} range=[{min:.6}, {max:.6}] log covariance={covar:?}",
            self.correlation
        );

        self.count = 0;
        self.mean = Vector2::zeros();
        self.meansq = Matrix2::zeros();
        Ok(())
    }

    fn draw(&mut self, normal: &SharedSource) -> [f64; 2] {
        let z = {
            let mut source = normal.borrow_mut();
            Vector2::new(source.normal(), source.normal())
        };
        let a = self.correlator * z;

        let pair = Vector2::new(
            (a[0] - 0.5 * self.log_sigma[0] * self.log_sigma[0]).exp(),
            (a[1] - 0.5 * self.log_sigma[1] * self.log_sigma[1]).exp(),
        );

        self.count += 1;
        self.mean += pair;
        self.meansq += pair * pair.transpose();

        [pair[0], pair[1]]
    }
}

impl Coordinator {
    /// Coordinator for the given factor correlation and per-stream
    /// modulation indices. Fails when no bivariate log-normal law exists.
    pub fn new(correlation: f64, beta: [f64; 2]) -> Result<Self> {
        let mut state = BivariateLogNormal {
            correlation,
            beta,
            log_sigma: [0.0; 2],
            correlator: Matrix2::zeros(),
            bound: [false; 2],
            pending: [VecDeque::new(), VecDeque::new()],
            count: 0,
            mean: Vector2::zeros(),
            meansq: Matrix2::zeros(),
        };
        state.build()?;
        Ok(Self {
            state: Rc::new(RefCell::new(state)),
        })
    }

    pub fn correlation(&self) -> f64 {
        self.state.borrow().correlation
    }

    pub fn beta(&self, index: usize) -> Result<f64> {
        check_index(index)?;
        Ok(self.state.borrow().beta[index])
    }

    /// Change the modulation index of one stream. The law is rebuilt and
    /// revalidated; on failure the previous law is kept.
    pub fn set_beta(&mut self, index: usize, beta: f64) -> Result<()> {
        check_index(index)?;
        let mut state = self.state.borrow_mut();
        let previous = state.beta[index];
        state.beta[index] = beta;
        if let Err(e) = state.build() {
            state.beta[index] = previous;
            state.build()?;
            return Err(e);
        }
        Ok(())
    }

    pub fn min_correlation(&self) -> f64 {
        let state = self.state.borrow();
        correlation_bounds(state.beta[0], state.beta[1]).0
    }

    pub fn max_correlation(&self) -> f64 {
        let state = self.state.borrow();
        correlation_bounds(state.beta[0], state.beta[1]).1
    }

    /// Covariance of the two factors, `ρ β₀ β₁`.
    pub fn intensity_covariance(&self) -> f64 {
        let state = self.state.borrow();
        state.correlation * state.beta[0] * state.beta[1]
    }

    /// Variance `exp(σᵢ²) − 1` of stream `index`.
    fn mod_variance(&self, index: usize) -> f64 {
        let s = self.state.borrow().log_sigma[index];
        (s * s).exp_m1()
    }

    /// Bind output slot `index` and return the modulation law that consumes it.
    pub fn modulation(&self, index: usize) -> Result<CovariantModulation> {
        check_index(index)?;
        let mut state = self.state.borrow_mut();
        if state.bound[index] {
            return Err(Error::state(format!("covariant output slot {index} already bound")));
        }
        state.bound[index] = true;
        Ok(CovariantModulation {
            index,
            coordinator: self.clone(),
        })
    }

    /// Bind output slot `index` to `source`, returning the modulated mode.
    pub fn get_modulated_mode(&self, index: usize, source: Box<dyn Mode>) -> Result<ModulatedMode> {
        let law = self.modulation(index)?;
        Ok(modulate(source, Box::new(law)))
    }

    /// Draw one correlated pair and queue one value for each output slot.
    /// Both slots must be bound.
    pub fn request_pair(&self, normal: &SharedSource) -> Result<[f64; 2]> {
        let mut state = self.state.borrow_mut();
        if let Some(index) = state.bound.iter().position(|bound| !bound) {
            return Err(Error::state(format!("covariant output slot {index} not bound")));
        }

        let pair = state.draw(normal);
        for (queue, value) in state.pending.iter_mut().zip(pair) {
            queue.push_back(value);
        }
        Ok(pair)
    }

    /// Values queued for slot `index` and not yet consumed.
    pub fn queued(&self, index: usize) -> Result<usize> {
        check_index(index)?;
        Ok(self.state.borrow().pending[index].len())
    }

    fn pop(&self, index: usize) -> Option<f64> {
        self.state.borrow_mut().pending[index].pop_front()
    }

    fn unbind(&self, index: usize) {
        let mut state = self.state.borrow_mut();
        state.bound[index] = false;
        state.pending[index].clear();
    }

    /// Number of pairs drawn since the law was last built.
    pub fn pairs_drawn(&self) -> u64 {
        self.state.borrow().count
    }

    /// Sample mean of the pairs drawn so far.
    pub fn measured_mean(&self) -> Option<[f64; 2]> {
        let state = self.state.borrow();
        if state.count == 0 {
            return None;
        }
        let mean = state.mean / state.count as f64;
        Some([mean[0], mean[1]])
    }

    /// Pearson correlation of the pairs drawn so far.
    pub fn measured_correlation(&self) -> Option<f64> {
        let state = self.state.borrow();
        if state.count < 2 {
            return None;
        }
        let n = state.count as f64;
        let mean = state.mean / n;
        let covar = state.meansq / n - mean * mean.transpose();
        Some(covar[(0, 1)] / (covar[(0, 0)] * covar[(1, 1)]).sqrt())
    }
}

fn check_index(index: usize) -> Result<()> {
    if index >= 2 {
        return Err(Error::parameter(format!("covariant output index {index} out of range (0 or 1)")));
    }
    Ok(())
}

/// One stream of a coordinated pair. Dropping it unbinds its slot.
pub struct CovariantModulation {
    index: usize,
    coordinator: Coordinator,
}

impl CovariantModulation {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }
}

impl Drop for CovariantModulation {
    fn drop(&mut self) {
        self.coordinator.unbind(self.index);
    }
}

impl Modulation for CovariantModulation {
    fn modulation(&mut self, normal: &SharedSource) -> Result<f64> {
        if let Some(value) = self.coordinator.pop(self.index) {
            return Ok(value);
        }
        self.coordinator.request_pair(normal)?;
        self.coordinator
            .pop(self.index)
            .ok_or_else(|| Error::state("covariant coordinator did not deliver a value"))
    }

    fn mod_mean(&self) -> f64 {
        1.0
    }

    fn mod_variance(&self) -> f64 {
        self.coordinator.mod_variance(self.index)
    }
}

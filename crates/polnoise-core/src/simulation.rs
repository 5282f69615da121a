//! The Monte-Carlo measurement loop and the comparison report.
//!
//! [`Simulation::run`] draws samples, accumulates their first and second
//! moments (plus the lag cross-covariances when requested) and pairs them
//! with the analytic predictions of the same sample. The same moments are
//! also estimated over [`BATCHES`] consecutive batches, whose spread gives
//! standard errors that hold for non-Gaussian and correlated samples.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::field::{Covariance, Stokes, degree_of_polarization, outer};
use crate::sample::Sample;

/// Number of equal batches a run is split into for error estimates.
pub const BATCHES: usize = 32;

/// Receives every simulated sample, e.g. to write it to disk.
pub trait StokesSink {
    fn write_stokes(&mut self, stokes: &Stokes) -> Result<()>;
}

impl StokesSink for Vec<Stokes> {
    fn write_stokes(&mut self, stokes: &Stokes) -> Result<()> {
        self.push(*stokes);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Mean and covariance of Stokes samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    pub mean: [f64; 4],
    pub covariance: [[f64; 4]; 4],
}

impl Moments {
    pub fn new(mean: &Stokes, covariance: &Covariance) -> Self {
        Self {
            mean: [mean[0], mean[1], mean[2], mean[3]],
            covariance: matrix_rows(covariance),
        }
    }

    pub fn mean_vector(&self) -> Stokes {
        Stokes::from(self.mean)
    }

    pub fn covariance_matrix(&self) -> Covariance {
        Covariance::from_fn(|i, j| self.covariance[i][j])
    }

    /// Per-parameter `(mean, variance)` pairs.
    pub fn means_and_variances(&self) -> [(f64, f64); 4] {
        std::array::from_fn(|i| (self.mean[i], self.covariance[i][i]))
    }
}

fn matrix_rows(m: &Covariance) -> [[f64; 4]; 4] {
    std::array::from_fn(|i| std::array::from_fn(|j| m[(i, j)]))
}

/// Statistics of the simulated samples beyond their moments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    pub samples: u64,
    /// Mean over samples of the degree of polarization.
    pub mean_degree_of_polarization: f64,
    /// `sqrt(C_II) / mean_I`.
    pub modulation_index: f64,
    /// Number of sample pairs contributing to each lag estimate.
    pub lag_samples: u64,
}

/// Cross-covariance at one lag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagEntry {
    pub lag: usize,
    pub expected: [[f64; 4]; 4],
    pub simulated: Option<[[f64; 4]; 4]>,
}

impl LagEntry {
    pub fn expected_matrix(&self) -> Covariance {
        Covariance::from_fn(|i, j| self.expected[i][j])
    }

    pub fn simulated_matrix(&self) -> Option<Covariance> {
        self.simulated.map(|s| Covariance::from_fn(|i, j| s[i][j]))
    }
}

/// Moments of one batch of consecutive samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMoments {
    pub samples: u64,
    pub moments: Moments,
    /// Lag cross-covariances, empty when the batch holds no lag pairs.
    pub lags: Vec<[[f64; 4]; 4]>,
}

/// Simulated versus predicted moments of one sample configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub sample: String,
    pub sample_size: usize,
    pub simulated: Option<Moments>,
    pub summary: Option<SampleSummary>,
    pub expected: Moments,
    pub lags: Vec<LagEntry>,
    /// Per-batch estimates; empty for predictions and very short runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub batches: Vec<BatchMoments>,
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// First, second and lagged moment sums.
struct Sums {
    count: u64,
    tot: Stokes,
    totsq: Covariance,
    acf: Vec<Covariance>,
    lag_count: u64,
}

impl Sums {
    fn new(lags: usize) -> Self {
        Self {
            count: 0,
            tot: Stokes::zeros(),
            totsq: Covariance::zeros(),
            acf: vec![Covariance::zeros(); lags],
            lag_count: 0,
        }
    }

    fn push(&mut self, s: &Stokes) {
        self.tot += s;
        self.totsq += outer(s, s);
        self.count += 1;
    }

    fn mean(&self) -> Stokes {
        self.tot / self.count.max(1) as f64
    }

    fn covariance(&self) -> Covariance {
        let mean = self.mean();
        self.totsq / self.count.max(1) as f64 - outer(&mean, &mean)
    }

    fn lagged(&self) -> Vec<Option<Covariance>> {
        let mean = self.mean();
        self.acf
            .iter()
            .map(|acf| (self.lag_count > 0).then(|| *acf / self.lag_count as f64 - outer(&mean, &mean)))
            .collect()
    }

    fn batch(&self) -> BatchMoments {
        let lags = if self.lag_count > 0 {
            self.lagged().iter().flatten().map(matrix_rows).collect()
        } else {
            Vec::new()
        };
        BatchMoments {
            samples: self.count,
            moments: Moments::new(&self.mean(), &self.covariance()),
            lags,
        }
    }
}

/// Running sums over simulated samples, overall and per batch.
struct Accumulator {
    total: Sums,
    totp: f64,

    recent: Vec<Stokes>,
    current: usize,

    batch_len: u64,
    batch: Sums,
    batches: Vec<BatchMoments>,
}

impl Accumulator {
    /// `batch_len == 0` disables batching.
    fn new(lags: usize, batch_len: u64) -> Self {
        Self {
            total: Sums::new(lags),
            totp: 0.0,
            recent: vec![Stokes::zeros(); lags],
            current: 0,
            batch_len,
            batch: Sums::new(lags),
            batches: Vec::new(),
        }
    }

    fn batching(&self) -> bool {
        self.batch_len > 0 && self.batches.len() < BATCHES
    }

    fn push(&mut self, s: &Stokes) {
        self.total.push(s);
        self.totp += degree_of_polarization(s);
        let batching = self.batching();
        if batching {
            self.batch.push(s);
        }

        let lags = self.recent.len();
        if lags > 0 {
            self.recent[self.current] = *s;
            self.current = (self.current + 1) % lags;

            if self.total.count >= lags as u64 {
                // oldest retained sample
                let sj = self.recent[self.current];
                for lag in 0..lags {
                    let si = self.recent[(self.current + lag) % lags];
                    let product = outer(&si, &sj);
                    self.total.acf[lag] += product;
                    if batching {
                        self.batch.acf[lag] += product;
                    }
                }
                self.total.lag_count += 1;
                if batching {
                    self.batch.lag_count += 1;
                }
            }
        }

        if batching && self.batch.count == self.batch_len {
            self.batches.push(self.batch.batch());
            self.batch = Sums::new(lags);
        }
    }

    fn finish(self) -> (Moments, SampleSummary, Vec<Option<Covariance>>, Vec<BatchMoments>) {
        let n = self.total.count.max(1) as f64;
        let mean = self.total.mean();
        let covariance = self.total.covariance();

        let summary = SampleSummary {
            samples: self.total.count,
            mean_degree_of_polarization: self.totp / n,
            modulation_index: covariance[(0, 0)].sqrt() / mean[0],
            lag_samples: self.total.lag_count,
        };

        let lagged = self.total.lagged();
        (Moments::new(&mean, &covariance), summary, lagged, self.batches)
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Measurement loop settings.
#[derive(Debug, Clone, Copy)]
pub struct Simulation {
    pub samples: u64,
    pub lags: usize,
}

impl Simulation {
    pub fn new(samples: u64, lags: usize) -> Self {
        Self { samples, lags }
    }

    /// Analytic moments only.
    pub fn predict(&self, sample: &dyn Sample) -> SimulationReport {
        let lags = (0..self.lags)
            .map(|lag| LagEntry {
                lag,
                expected: matrix_rows(&sample.get_crosscovariance(lag)),
                simulated: None,
            })
            .collect();

        SimulationReport {
            sample: sample.name().to_string(),
            sample_size: sample.sample_size(),
            simulated: None,
            summary: None,
            expected: Moments::new(&sample.get_mean(), &sample.get_covariance()),
            lags,
            batches: Vec::new(),
        }
    }

    /// Draw `samples` measurements, forwarding each to `sink`, and compare
    /// their moments with the prediction.
    pub fn run(&self, sample: &mut dyn Sample, mut sink: Option<&mut dyn StokesSink>) -> Result<SimulationReport> {
        info!("simulating {} {} samples of size {}", self.samples, sample.name(), sample.sample_size());

        // batches of fewer than two samples carry no spread
        let batch_len = self.samples / BATCHES as u64;
        let mut acc = Accumulator::new(self.lags, if batch_len >= 2 { batch_len } else { 0 });
        let tick = (self.samples / 10).max(1);

        for idat in 0..self.samples {
            let s = sample.measure()?;
            if let Some(sink) = sink.as_deref_mut() {
                sink.write_stokes(&s)?;
            }
            acc.push(&s);

            if (idat + 1) % tick == 0 {
                info!("{}/{} samples", idat + 1, self.samples);
            }
        }

        let (moments, summary, lagged, batches) = acc.finish();
        let mut report = self.predict(sample);
        for (entry, simulated) in report.lags.iter_mut().zip(lagged) {
            entry.simulated = simulated.as_ref().map(matrix_rows);
        }
        report.simulated = Some(moments);
        report.summary = Some(summary);
        report.batches = batches;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaussian::GaussianSource;
    use crate::mode::GaussianMode;
    use crate::sample::SingleSample;

    fn single(seed: u64) -> SingleSample {
        let mut s = SingleSample::new(Box::new(GaussianMode::new()));
        s.set_normal(GaussianSource::seed_from_u64(seed).shared());
        s
    }

    #[test]
    fn predict_has_no_simulated_moments() {
        let s = single(1);
        let report = Simulation::new(10, 3).predict(&s);
        assert!(report.simulated.is_none());
        assert_eq!(report.lags.len(), 3);
        assert_eq!(report.expected.mean, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(report.expected.covariance[1][1], 0.5);
        assert_eq!(report.lags[0].expected, report.expected.covariance);
    }

    #[test]
    fn run_forwards_every_sample() {
        let mut s = single(2);
        let mut sink: Vec<Stokes> = Vec::new();
        let report = Simulation::new(25, 0).run(&mut s, Some(&mut sink)).unwrap();
        assert_eq!(sink.len(), 25);
        assert_eq!(report.summary.unwrap().samples, 25);
    }

    #[test]
    fn run_matches_prediction() {
        let mut s = single(3);
        let report = Simulation::new(100_000, 2).run(&mut s, None).unwrap();

        let simulated = report.simulated.as_ref().unwrap();
        let diff = simulated.covariance_matrix() - report.expected.covariance_matrix();
        assert!(diff.amax() < 0.02, "{diff:?}");

        let summary = report.summary.unwrap();
        // unpolarized intensity of one complex Gaussian field has modulation index sqrt(0.5)
        assert!((summary.modulation_index - 0.5f64.sqrt()).abs() < 0.02);
        assert!(summary.mean_degree_of_polarization > 0.0);
        assert_eq!(summary.lag_samples, 100_000 - 1);

        let lag0 = report.lags[0].simulated_matrix().unwrap();
        assert!((lag0 - simulated.covariance_matrix()).amax() < 1e-3);
        let lag1 = report.lags[1].simulated_matrix().unwrap();
        assert!(lag1.amax() < 0.02, "{lag1:?}");
    }

    #[test]
    fn lag_estimator_sees_known_correlation() {
        // alternating values: lag-1 correlation is −1
        struct Alternating {
            sign: f64,
        }
        impl Sample for Alternating {
            fn measure(&mut self) -> Result<Stokes> {
                self.sign = -self.sign;
                Ok(Stokes::new(2.0 + self.sign, 0.0, 0.0, 0.0))
            }
            fn get_mean(&self) -> Stokes {
                Stokes::new(2.0, 0.0, 0.0, 0.0)
            }
            fn get_covariance(&self) -> Covariance {
                Covariance::zeros()
            }
            fn get_crosscovariance(&self, _lag: usize) -> Covariance {
                Covariance::zeros()
            }
            fn sample_size(&self) -> usize {
                1
            }
            fn set_sample_size(&mut self, _: usize) -> Result<()> {
                Ok(())
            }
            fn set_normal(&mut self, _: crate::gaussian::SharedSource) {}
            fn name(&self) -> &'static str {
                "alternating"
            }
        }

        let mut s = Alternating { sign: 1.0 };
        let report = Simulation::new(1000, 2).run(&mut s, None).unwrap();
        let lag0 = report.lags[0].simulated.unwrap();
        let lag1 = report.lags[1].simulated.unwrap();
        // the first sample is not paired, so lag 0 is slightly biased
        assert!((lag0[0][0] - 1.0).abs() < 0.01);
        assert!((lag1[0][0] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn batches_partition_the_run() {
        let mut s = single(5);
        let report = Simulation::new(32 * 50 + 7, 3).run(&mut s, None).unwrap();
        assert_eq!(report.batches.len(), BATCHES);
        assert!(report.batches.iter().all(|b| b.samples == 50));
        // the first batch loses the pairs that need earlier samples
        assert_eq!(report.batches[0].lags.len(), 3);
        assert!(report.batches[1..].iter().all(|b| b.lags.len() == 3));

        // batch means average to the run mean over the batched samples
        let batched: f64 = report.batches.iter().map(|b| b.moments.mean[0]).sum::<f64>() / BATCHES as f64;
        let overall = report.simulated.unwrap().mean[0];
        assert!((batched - overall).abs() < 0.05, "{batched} vs {overall}");
    }

    #[test]
    fn short_runs_have_no_batches() {
        let mut s = single(6);
        let report = Simulation::new(40, 0).run(&mut s, None).unwrap();
        assert!(report.batches.is_empty());
        assert!(Simulation::new(40, 0).predict(&s).batches.is_empty());
    }

    #[test]
    fn moments_view() {
        let m = Moments::new(&Stokes::new(1.0, 2.0, 3.0, 4.0), &(Covariance::identity() * 2.0));
        let mv = m.means_and_variances();
        assert_eq!(mv[2], (3.0, 2.0));
        assert_eq!(m.mean_vector(), Stokes::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn report_serializes() {
        let s = single(4);
        let report = Simulation::new(1, 1).predict(&s);
        let json = serde_json::to_string(&report).unwrap();
        let back: SimulationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report, back);
    }
}

//! Agreement battery for simulated polarization statistics.
//!
//! Each check compares the Monte-Carlo moments of a [`SimulationReport`]
//! with the analytic predictions stored alongside them and returns a
//! [`TestResult`] with a p-value, a pass/fail determination, and a letter
//! grade (A through F).
//!
//! Standard errors come from the spread of the report's per-batch estimates
//! (batch means), so they hold for heavy-tailed Stokes parameters and for
//! correlated samples as long as a batch is much longer than the
//! correlation length. Each difference is a Student-t statistic with
//! `batches − 1` degrees of freedom, Bonferroni-combined within a check.

use polnoise_core::{BatchMoments, LagEntry, Moments, SimulationReport};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Fewest batches a check accepts.
pub const MIN_BATCHES: usize = 4;

/// Differences at or below this count as rounding, even against a zero
/// standard error.
const TOLERANCE: f64 = 1e-9;

// ═══════════════════════════════════════════════════════════════════════════════
// Core types
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a single agreement check.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub p_value: Option<f64>,
    pub statistic: f64,
    pub details: String,
    pub grade: char,
}

impl TestResult {
    /// Assign a letter grade based on p-value.
    ///
    /// - A: p >= 0.1
    /// - B: p >= 0.01
    /// - C: p >= 0.001
    /// - D: p >= 0.0001
    /// - F: otherwise or None
    pub fn grade_from_p(p: Option<f64>) -> char {
        match p {
            Some(p) if p >= 0.1 => 'A',
            Some(p) if p >= 0.01 => 'B',
            Some(p) if p >= 0.001 => 'C',
            Some(p) if p >= 0.0001 => 'D',
            _ => 'F',
        }
    }

    /// Determine pass/fail from p-value against a threshold (default 0.01).
    pub fn pass_from_p(p: Option<f64>, threshold: f64) -> bool {
        match p {
            Some(p) => p >= threshold,
            None => false,
        }
    }

    fn from_p(name: &str, p: f64, statistic: f64, details: String) -> Self {
        TestResult {
            name: name.to_string(),
            passed: TestResult::pass_from_p(Some(p), 0.01),
            p_value: Some(p),
            statistic,
            details,
            grade: TestResult::grade_from_p(Some(p)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Return a failing `TestResult` when the report cannot support the check.
fn insufficient(name: &str, reason: &str) -> TestResult {
    TestResult {
        name: name.to_string(),
        passed: false,
        p_value: None,
        statistic: 0.0,
        details: format!("Insufficient data: {reason}"),
        grade: 'F',
    }
}

/// Standard error of the run estimate from its per-batch estimates.
fn batch_se(values: &[f64]) -> f64 {
    let b = values.len() as f64;
    let mean = values.iter().sum::<f64>() / b;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (b - 1.0);
    (var / b).sqrt()
}

/// Largest |t| over `(difference, standard error)` pairs and its
/// Bonferroni-corrected two-sided p-value. A zero standard error only
/// tolerates a zero difference.
fn max_t(pairs: &[(f64, f64)], batches: usize) -> Option<(f64, f64)> {
    let dist = StudentsT::new(0.0, 1.0, (batches - 1) as f64).ok()?;
    let t = pairs
        .iter()
        .map(|&(diff, se)| {
            if diff.abs() <= TOLERANCE {
                0.0
            } else if se > 0.0 {
                (diff / se).abs()
            } else {
                f64::INFINITY
            }
        })
        .fold(0.0, f64::max);
    let tail = if t.is_finite() { 2.0 * (1.0 - dist.cdf(t)) } else { 0.0 };
    Some((t, (tail * pairs.len() as f64).min(1.0)))
}

fn grade(name: &str, pairs: &[(f64, f64)], batches: usize) -> TestResult {
    match max_t(pairs, batches) {
        Some((t, p)) => TestResult::from_p(
            name,
            p,
            t,
            format!("max|t|={t:.3} over {}, batches={batches}", pairs.len()),
        ),
        None => insufficient(name, "invalid degrees of freedom"),
    }
}

/// `(simulated − expected, standard error)` for the covariance entries
/// listed in `entries`.
fn covariance_pairs(
    simulated: &Moments,
    expected: &Moments,
    batches: &[BatchMoments],
    entries: impl Iterator<Item = (usize, usize)>,
) -> Vec<(f64, f64)> {
    entries
        .map(|(i, j)| {
            let column: Vec<f64> = batches.iter().map(|b| b.moments.covariance[i][j]).collect();
            (simulated.covariance[i][j] - expected.covariance[i][j], batch_se(&column))
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// 1. MOMENT CHECKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Check 1: Mean -- per-parameter t-statistics of I, Q, U, V.
pub fn mean_agreement(simulated: &Moments, expected: &Moments, batches: &[BatchMoments]) -> TestResult {
    let name = "Mean Agreement";
    if batches.len() < MIN_BATCHES {
        return insufficient(name, &format!("need at least {MIN_BATCHES} batches"));
    }
    let pairs: Vec<(f64, f64)> = (0..4)
        .map(|i| {
            let column: Vec<f64> = batches.iter().map(|b| b.moments.mean[i]).collect();
            (simulated.mean[i] - expected.mean[i], batch_se(&column))
        })
        .collect();
    grade(name, &pairs, batches.len())
}

/// Check 2: Variance -- t-statistics of the four diagonal variances.
pub fn variance_agreement(simulated: &Moments, expected: &Moments, batches: &[BatchMoments]) -> TestResult {
    let name = "Variance Agreement";
    if batches.len() < MIN_BATCHES {
        return insufficient(name, &format!("need at least {MIN_BATCHES} batches"));
    }
    let pairs = covariance_pairs(simulated, expected, batches, (0..4).map(|i| (i, i)));
    grade(name, &pairs, batches.len())
}

/// Check 3: Covariance -- t-statistics of the six off-diagonal covariances.
pub fn covariance_agreement(simulated: &Moments, expected: &Moments, batches: &[BatchMoments]) -> TestResult {
    let name = "Covariance Agreement";
    if batches.len() < MIN_BATCHES {
        return insufficient(name, &format!("need at least {MIN_BATCHES} batches"));
    }
    let entries = (0..4).flat_map(|i| ((i + 1)..4).map(move |j| (i, j)));
    let pairs = covariance_pairs(simulated, expected, batches, entries);
    grade(name, &pairs, batches.len())
}

// ═══════════════════════════════════════════════════════════════════════════════
// 2. LAG CHECKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Check 4: Lag -- t-statistics of all sixteen entries of one lag's
/// cross-covariance, over the batches that hold lag pairs.
pub fn lag_agreement(entry: &LagEntry, batches: &[BatchMoments]) -> TestResult {
    let name = format!("Lag {} Agreement", entry.lag);
    let Some(simulated) = entry.simulated else {
        return insufficient(&name, "no simulated cross-covariance");
    };
    let lagged: Vec<&[[f64; 4]; 4]> = batches.iter().filter_map(|b| b.lags.get(entry.lag)).collect();
    if lagged.len() < MIN_BATCHES {
        return insufficient(&name, &format!("need at least {MIN_BATCHES} batches with lag pairs"));
    }

    let mut pairs = Vec::with_capacity(16);
    for i in 0..4 {
        for j in 0..4 {
            let column: Vec<f64> = lagged.iter().map(|m| m[i][j]).collect();
            pairs.push((simulated[i][j] - entry.expected[i][j], batch_se(&column)));
        }
    }
    grade(&name, &pairs, lagged.len())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Battery
// ═══════════════════════════════════════════════════════════════════════════════

/// Run every check on `report`.
///
/// Lag 0 is skipped; it repeats the covariance checks.
pub fn run_all_checks(report: &SimulationReport) -> Vec<TestResult> {
    let Some(simulated) = &report.simulated else {
        return vec![insufficient("Simulated Moments", "theory-only report")];
    };
    let batches = &report.batches;

    let mut results = vec![
        mean_agreement(simulated, &report.expected, batches),
        variance_agreement(simulated, &report.expected, batches),
        covariance_agreement(simulated, &report.expected, batches),
    ];
    results.extend(
        report
            .lags
            .iter()
            .filter(|entry| entry.lag > 0)
            .map(|entry| lag_agreement(entry, batches)),
    );
    results
}

/// Calculate overall agreement score (0-100) from check results.
///
/// Each grade maps to a score: A=100, B=75, C=50, D=25, F=0.
/// Returns the average across all checks.
pub fn calculate_agreement_score(results: &[TestResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let total: f64 = results
        .iter()
        .map(|r| match r.grade {
            'A' => 100.0,
            'B' => 75.0,
            'C' => 50.0,
            'D' => 25.0,
            _ => 0.0,
        })
        .sum();
    total / results.len() as f64
}

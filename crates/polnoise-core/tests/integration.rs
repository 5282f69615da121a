//! Integration tests for polnoise-core.
//!
//! These tests drive the full pipeline:
//! configuration → sample graph → Monte-Carlo loop → report (→ run files).

use polnoise_core::{
    Combination, Error, ModeConfig, RunWriter, Sample, Simulation, SimulationConfig, Stokes,
    build_sample,
};

fn seeded(seed: u64) -> SimulationConfig {
    SimulationConfig {
        seed: Some(seed),
        ..Default::default()
    }
}

fn draw(config: &SimulationConfig, n: usize) -> Vec<Stokes> {
    let mut graph = build_sample(config).unwrap();
    (0..n).map(|_| graph.sample.measure().unwrap()).collect()
}

#[test]
fn same_seed_same_samples() {
    let config = SimulationConfig {
        sample_size: 3,
        combination: Combination::Disjoint { fraction: 0.3 },
        mode_a: ModeConfig {
            beta: 0.5,
            ..Default::default()
        },
        mode_b: ModeConfig {
            mean: [1.0, 0.0, 0.0, 1.0],
            ..Default::default()
        },
        ..seeded(42)
    };
    assert_eq!(draw(&config, 20), draw(&config, 20));

    let other = SimulationConfig {
        seed: Some(43),
        ..config.clone()
    };
    assert_ne!(draw(&config, 20), draw(&other, 20));
}

#[test]
fn composite_extremes_reduce_to_one_mode() {
    let mode_a = ModeConfig {
        mean: [1.0, 1.0, 0.0, 0.0],
        ..Default::default()
    };
    let mode_b = ModeConfig {
        mean: [2.0, 0.0, 0.0, -1.0],
        ..Default::default()
    };

    for (fraction, expected) in [(1.0, Stokes::new(1.0, 1.0, 0.0, 0.0)), (0.0, Stokes::new(2.0, 0.0, 0.0, -1.0))] {
        let graph = build_sample(&SimulationConfig {
            sample_size: 8,
            combination: Combination::Composite { fraction },
            mode_a: mode_a.clone(),
            mode_b: mode_b.clone(),
            ..seeded(1)
        })
        .unwrap();
        assert_eq!(graph.sample.get_mean(), expected, "fraction={fraction}");
    }
}

#[test]
fn simulated_moments_track_prediction() {
    let config = SimulationConfig {
        samples: 100_000,
        sample_size: 4,
        combination: Combination::Composite { fraction: 0.5 },
        mode_b: ModeConfig {
            mean: [1.0, 0.0, 0.6, 0.0],
            ..Default::default()
        },
        ..seeded(7)
    };
    let mut graph = build_sample(&config).unwrap();
    let report = Simulation::new(config.samples, 0)
        .run(graph.sample.as_mut(), None)
        .unwrap();

    let simulated = report.simulated.unwrap();
    let mean_diff = simulated.mean_vector() - report.expected.mean_vector();
    assert!(mean_diff.amax() < 0.01, "{mean_diff:?}");
    let cov_diff = simulated.covariance_matrix() - report.expected.covariance_matrix();
    assert!(cov_diff.amax() < 0.01, "{cov_diff:?}");
}

#[test]
fn smoothed_modulation_lag_prediction() {
    let config = SimulationConfig {
        samples: 200_000,
        lags: 3,
        mode_a: ModeConfig {
            beta: 0.5,
            smooth_modulator: 4,
            ..Default::default()
        },
        ..seeded(11)
    };
    let mut graph = build_sample(&config).unwrap();
    let report = Simulation::new(config.samples, config.lags)
        .run(graph.sample.as_mut(), None)
        .unwrap();

    // factor variance 0.25 smoothed over 4: lag-1 autocovariance 0.25·3/16
    let expected = report.lags[1].expected_matrix();
    assert!((expected[(0, 0)] - 0.25 * 3.0 / 16.0).abs() < 1e-12);

    for entry in &report.lags[1..] {
        let simulated = entry.simulated_matrix().unwrap();
        let diff = simulated[(0, 0)] - entry.expected[0][0];
        assert!(diff.abs() < 0.02, "lag {}: {diff}", entry.lag);
    }
}

#[test]
fn covariant_pairs_reach_requested_correlation() {
    let config = SimulationConfig {
        samples: 50_000,
        combination: Combination::Superposed,
        covariant: Some(0.7),
        mode_a: ModeConfig {
            beta: 0.6,
            ..Default::default()
        },
        mode_b: ModeConfig {
            beta: 0.4,
            mean: [1.0, 0.0, 0.0, 1.0],
            ..Default::default()
        },
        ..seeded(3)
    };
    let mut graph = build_sample(&config).unwrap();
    Simulation::new(config.samples, 0)
        .run(graph.sample.as_mut(), None)
        .unwrap();

    let coordinator = graph.coordinator.as_ref().unwrap();
    assert_eq!(coordinator.pairs_drawn(), 50_000);
    let rho = coordinator.measured_correlation().unwrap();
    assert!((rho - 0.7).abs() < 0.05, "rho={rho}");
    let mean = coordinator.measured_mean().unwrap();
    assert!((mean[0] - 1.0).abs() < 0.02 && (mean[1] - 1.0).abs() < 0.02, "{mean:?}");
}

#[test]
fn infeasible_covariant_correlation_rejected() {
    let config = SimulationConfig {
        combination: Combination::Superposed,
        covariant: Some(-0.99),
        mode_a: ModeConfig {
            beta: 2.0,
            ..Default::default()
        },
        mode_b: ModeConfig {
            beta: 2.0,
            ..Default::default()
        },
        ..seeded(1)
    };
    assert!(matches!(build_sample(&config), Err(Error::InvalidParameter(_))));
}

#[test]
fn config_file_to_recorded_run() {
    let tmp = tempfile::tempdir().unwrap();
    let config_path = tmp.path().join("config.json");
    SimulationConfig {
        samples: 200,
        lags: 2,
        sample_size: 2,
        combination: Combination::Coherent { coherence: 0.0 },
        mode_a: ModeConfig {
            mean: [1.0, 1.0, 0.0, 0.0],
            ..Default::default()
        },
        mode_b: ModeConfig {
            mean: [1.0, -1.0, 0.0, 0.0],
            ..Default::default()
        },
        ..seeded(5)
    }
    .save(&config_path)
    .unwrap();

    let config = SimulationConfig::load(&config_path).unwrap();
    let mut graph = build_sample(&config).unwrap();
    let mut writer = RunWriter::new(tmp.path(), "coherent", true).unwrap();
    let report = Simulation::new(config.samples, config.lags)
        .run(graph.sample.as_mut(), Some(&mut writer))
        .unwrap();
    let dir = writer.finish(&config, &report).unwrap();

    for file in ["run.json", "stokes.txt", "acf.txt", "acf_plot.txt"] {
        assert!(dir.join(file).exists(), "missing {file}");
    }
    let stokes = std::fs::read_to_string(dir.join("stokes.txt")).unwrap();
    assert_eq!(stokes.lines().count(), 200);
}

#[test]
fn configurations_without_exact_predictions_rejected() {
    let held = ModeConfig {
        beta: 0.5,
        square_modulator: 4,
        ..Default::default()
    };
    let rejected = [
        // smoothed and held modulation at once
        SimulationConfig {
            mode_a: ModeConfig {
                smooth_modulator: 4,
                ..held.clone()
            },
            ..seeded(1)
        },
        // field smoothing of a modulated mode
        SimulationConfig {
            mode_a: ModeConfig {
                beta: 0.5,
                smooth_before: 4,
                ..Default::default()
            },
            ..seeded(1)
        },
        // covariant factors with whole-sample selection
        SimulationConfig {
            combination: Combination::Disjoint { fraction: 0.5 },
            covariant: Some(0.5),
            mode_a: ModeConfig {
                beta: 0.5,
                ..Default::default()
            },
            mode_b: ModeConfig {
                beta: 0.5,
                ..Default::default()
            },
            ..seeded(1)
        },
        // coherent combination of modulated modes
        SimulationConfig {
            combination: Combination::Coherent { coherence: 0.5 },
            mode_a: ModeConfig {
                beta: 0.5,
                ..Default::default()
            },
            ..seeded(1)
        },
        // covariant factors with a held mode
        SimulationConfig {
            combination: Combination::Superposed,
            covariant: Some(0.5),
            mode_a: held.clone(),
            mode_b: ModeConfig {
                beta: 0.5,
                ..Default::default()
            },
            ..seeded(1)
        },
        // hold width sharing a factor with the sample size, with lags
        SimulationConfig {
            sample_size: 2,
            lags: 3,
            mode_a: held,
            ..seeded(1)
        },
    ];
    for config in &rejected {
        assert!(
            matches!(build_sample(config), Err(Error::InvalidParameter(_))),
            "{config:?}"
        );
    }
}

//! Every accepted kind of configuration, simulated and graded against its
//! own prediction.

use polnoise_core::{BATCHES, Combination, ModeConfig, Simulation, SimulationConfig, build_sample};
use polnoise_tests::run_all_checks;

const SAMPLES: u64 = 128_000;

fn modulated(beta: f64) -> ModeConfig {
    ModeConfig {
        beta,
        ..Default::default()
    }
}

fn assert_agrees(config: SimulationConfig) {
    let mut graph = build_sample(&config).unwrap();
    let report = Simulation::new(config.samples, config.lags)
        .run(graph.sample.as_mut(), None)
        .unwrap();
    assert_eq!(report.batches.len(), BATCHES);

    let results = run_all_checks(&report);
    assert_eq!(results.len(), 3 + config.lags.saturating_sub(1));
    for r in &results {
        assert!(
            r.p_value.is_some_and(|p| p > 1e-5),
            "{} (n={}): {r:?}",
            report.sample,
            config.sample_size
        );
    }
}

#[test]
fn square_hold_spanning_samples() {
    assert_agrees(SimulationConfig {
        samples: SAMPLES,
        lags: 6,
        seed: Some(101),
        mode_a: ModeConfig {
            square_modulator: 4,
            ..modulated(0.5)
        },
        ..Default::default()
    });
}

#[test]
fn square_hold_aligned_with_samples() {
    // every sample starts a hold window, so only lag 0 is predicted
    assert_agrees(SimulationConfig {
        samples: SAMPLES,
        sample_size: 4,
        lags: 1,
        seed: Some(102),
        combination: Combination::Superposed,
        mode_a: ModeConfig {
            square_modulator: 2,
            ..modulated(0.5)
        },
        ..Default::default()
    });
}

#[test]
fn field_smoothing() {
    assert_agrees(SimulationConfig {
        samples: SAMPLES,
        sample_size: 2,
        lags: 4,
        seed: Some(103),
        mode_a: ModeConfig {
            mean: [1.0, 0.5, 0.0, 0.3],
            smooth_before: 4,
            ..Default::default()
        },
        ..Default::default()
    });
}

#[test]
fn detected_smoothing_of_smoothed_modulation() {
    assert_agrees(SimulationConfig {
        samples: SAMPLES,
        sample_size: 2,
        lags: 5,
        smooth_after: 3,
        seed: Some(104),
        mode_a: ModeConfig {
            smooth_modulator: 4,
            ..modulated(0.5)
        },
        ..Default::default()
    });
}

#[test]
fn composite_of_held_and_smoothed_modes() {
    assert_agrees(SimulationConfig {
        samples: SAMPLES,
        sample_size: 4,
        lags: 3,
        seed: Some(105),
        combination: Combination::Composite { fraction: 0.5 },
        mode_a: ModeConfig {
            square_modulator: 3,
            ..modulated(0.5)
        },
        mode_b: ModeConfig {
            mean: [1.0, 0.0, 0.0, 1.0],
            smooth_modulator: 4,
            ..modulated(0.3)
        },
        ..Default::default()
    });
}

#[test]
fn disjoint_with_smoothed_modulation() {
    assert_agrees(SimulationConfig {
        samples: SAMPLES,
        sample_size: 2,
        lags: 3,
        seed: Some(106),
        combination: Combination::Disjoint { fraction: 0.3 },
        mode_a: ModeConfig {
            smooth_modulator: 8,
            ..modulated(0.5)
        },
        mode_b: ModeConfig {
            mean: [1.0, 1.0, 0.0, 0.0],
            ..Default::default()
        },
        ..Default::default()
    });
}

#[test]
fn covariant_superposition() {
    assert_agrees(SimulationConfig {
        samples: SAMPLES,
        sample_size: 2,
        lags: 2,
        seed: Some(107),
        combination: Combination::Superposed,
        covariant: Some(0.5),
        mode_a: modulated(0.5),
        mode_b: ModeConfig {
            mean: [1.0, 0.0, 0.0, 1.0],
            ..modulated(0.5)
        },
        ..Default::default()
    });
}

#[test]
fn covariant_composite() {
    assert_agrees(SimulationConfig {
        samples: SAMPLES,
        sample_size: 4,
        lags: 2,
        seed: Some(108),
        combination: Combination::Composite { fraction: 0.5 },
        covariant: Some(0.5),
        mode_a: modulated(0.5),
        mode_b: ModeConfig {
            mean: [1.0, 0.0, 0.0, 1.0],
            ..modulated(0.5)
        },
        ..Default::default()
    });
}

#[test]
fn partially_coherent_modes() {
    assert_agrees(SimulationConfig {
        samples: SAMPLES,
        sample_size: 4,
        lags: 2,
        seed: Some(109),
        combination: Combination::Coherent { coherence: 0.6 },
        mode_a: ModeConfig {
            mean: [1.0, 1.0, 0.0, 0.0],
            ..Default::default()
        },
        mode_b: ModeConfig {
            mean: [1.0, 0.0, 1.0, 0.0],
            ..Default::default()
        },
        ..Default::default()
    });
}

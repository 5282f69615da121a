//! Construction of the mode graph described by a [`SimulationConfig`].

use log::{debug, warn};

use crate::combination::{Coherent, Composite, Disjoint, Superposed};
use crate::config::{Combination, ModeConfig, SimulationConfig};
use crate::covariant::Coordinator;
use crate::error::Result;
use crate::gaussian::{GaussianSource, SharedSource};
use crate::mode::{GaussianMode, Mode};
use crate::modulated::{BoxcarModulation, LogNormal, Modulation, SquareModulation, modulate};
use crate::sample::{BoxcarSample, Sample, SingleSample};
use crate::smoothed::boxcar_smooth;

/// Applies one mode's modulation and smoothing settings.
pub struct ModeSetup<'a> {
    config: &'a ModeConfig,
    sample_size: usize,
}

impl<'a> ModeSetup<'a> {
    /// `sample_size` is needed by the square-wave modulation.
    pub fn new(config: &'a ModeConfig, sample_size: usize) -> Self {
        Self { config, sample_size }
    }

    /// Wrap `source` in, from the inside out: the covariant or log-normal
    /// modulation, either boxcar smoothing or a square-wave hold of the
    /// modulation, and boxcar smoothing of the field.
    pub fn setup_mode(
        &self,
        mut source: Box<dyn Mode>,
        index: usize,
        coordinator: Option<&mut Coordinator>,
    ) -> Result<Box<dyn Mode>> {
        let c = self.config;
        source.set_mean(c.stokes())?;

        let law: Option<Box<dyn Modulation>> = match coordinator {
            Some(coordinator) => {
                if c.beta > 0.0 {
                    coordinator.set_beta(index, c.beta)?;
                }
                Some(Box::new(coordinator.modulation(index)?))
            }
            None if c.beta > 0.0 => Some(Box::new(LogNormal::new(c.beta)?)),
            None => None,
        };

        let mut mode = match law {
            Some(law) => Box::new(modulate(source, self.shape(law)?)) as Box<dyn Mode>,
            None => source,
        };

        if c.smooth_before > 1 {
            mode = Box::new(boxcar_smooth(mode, c.smooth_before)?);
        }

        debug!(
            "mode {index}: mean={:?} beta={} smooth_modulator={} square_modulator={} smooth_before={}",
            c.mean, c.beta, c.smooth_modulator, c.square_modulator, c.smooth_before
        );
        Ok(mode)
    }

    /// Hold or boxcar-smooth the modulation factor. A square-wave hold
    /// replaces the boxcar: the held-window prediction needs independent
    /// successive factors.
    fn shape(&self, law: Box<dyn Modulation>) -> Result<Box<dyn Modulation>> {
        let c = self.config;
        if c.square_modulator > 1 {
            if c.smooth_modulator > 1 {
                warn!("square_modulator {} replaces smooth_modulator {}", c.square_modulator, c.smooth_modulator);
            }
            return Ok(Box::new(SquareModulation::new(law, c.square_modulator, self.sample_size)?));
        }
        if c.smooth_modulator > 1 {
            return Ok(Box::new(BoxcarModulation::new(law, c.smooth_modulator)?));
        }
        Ok(law)
    }
}

fn setup_pair(
    config: &SimulationConfig,
    mut coordinator: Option<&mut Coordinator>,
) -> Result<(Box<dyn Mode>, Box<dyn Mode>)> {
    let a = ModeSetup::new(&config.mode_a, config.sample_size).setup_mode(
        Box::new(GaussianMode::new()),
        0,
        coordinator.as_deref_mut(),
    )?;
    let b = ModeSetup::new(&config.mode_b, config.sample_size).setup_mode(
        Box::new(GaussianMode::new()),
        1,
        coordinator,
    )?;
    Ok((a, b))
}

/// A ready-to-run sample and the collaborators bound to it.
pub struct SampleGraph {
    pub sample: Box<dyn Sample>,
    pub coordinator: Option<Coordinator>,
    pub normal: SharedSource,
}

/// Build the sample described by `config` and bind one shared Gaussian
/// source to every leaf.
pub fn build_sample(config: &SimulationConfig) -> Result<SampleGraph> {
    config.validate()?;

    let mut coordinator = match config.covariant {
        Some(rho) => Some(Coordinator::new(rho, [config.mode_a.beta, config.mode_b.beta])?),
        None => None,
    };

    let mut sample: Box<dyn Sample> = match config.combination {
        Combination::Single => {
            let mode = ModeSetup::new(&config.mode_a, config.sample_size).setup_mode(
                Box::new(GaussianMode::new()),
                0,
                None,
            )?;
            if config.smooth_after > 1 {
                Box::new(BoxcarSample::new(mode, config.smooth_after)?)
            } else {
                Box::new(SingleSample::new(mode))
            }
        }
        Combination::Superposed => {
            let (a, b) = setup_pair(config, coordinator.as_mut())?;
            let mut s = Superposed::new(a, b);
            if let Some(c) = &coordinator {
                s.set_intensity_covariance(c.intensity_covariance());
            }
            Box::new(s)
        }
        Combination::Composite { fraction } => {
            let (a, b) = setup_pair(config, coordinator.as_mut())?;
            Box::new(Composite::new(a, b, fraction)?)
        }
        Combination::Disjoint { fraction } => {
            let (a, b) = setup_pair(config, coordinator.as_mut())?;
            Box::new(Disjoint::new(a, b, fraction)?)
        }
        Combination::Coherent { coherence } => {
            let (a, b) = setup_pair(config, coordinator.as_mut())?;
            Box::new(Coherent::new(a, b, coherence)?)
        }
    };

    sample.set_sample_size(config.sample_size)?;

    let normal = match config.seed {
        Some(seed) => GaussianSource::seed_from_u64(seed),
        None => GaussianSource::new(None),
    }
    .shared();
    sample.set_normal(normal.clone());

    debug!("built {} sample, sample_size={}", sample.name(), config.sample_size);

    Ok(SampleGraph {
        sample,
        coordinator,
        normal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::field::{Covariance, Stokes, outer};

    fn seeded(config: SimulationConfig) -> SimulationConfig {
        SimulationConfig {
            seed: Some(1),
            ..config
        }
    }

    #[test]
    fn plain_mode_is_unwrapped() {
        let config = ModeConfig {
            mean: [1.0, 0.0, 0.5, 0.0],
            ..Default::default()
        };
        let mode = ModeSetup::new(&config, 1)
            .setup_mode(Box::new(GaussianMode::new()), 0, None)
            .unwrap();
        assert_eq!(mode.get_mean(), Stokes::new(1.0, 0.0, 0.5, 0.0));
        assert_eq!(mode.get_crosscovariance(1), Covariance::zeros());
    }

    #[test]
    fn lognormal_then_boxcar_modulation() {
        let config = ModeConfig {
            beta: 1.0,
            smooth_modulator: 4,
            ..Default::default()
        };
        let mode = ModeSetup::new(&config, 1)
            .setup_mode(Box::new(GaussianMode::new()), 0, None)
            .unwrap();
        let mean = Stokes::new(1.0, 0.0, 0.0, 0.0);
        // lag-1 autocovariance of the smoothed factor: (3/4)·(1/4)
        let expected = outer(&mean, &mean) * (0.75 * 0.25);
        assert!((mode.get_crosscovariance(1) - expected).amax() < 1e-12);
    }

    #[test]
    fn square_hold_replaces_boxcar() {
        let config = ModeConfig {
            beta: 1.0,
            smooth_modulator: 4,
            square_modulator: 2,
            ..Default::default()
        };
        let mode = ModeSetup::new(&config, 1)
            .setup_mode(Box::new(GaussianMode::new()), 0, None)
            .unwrap();
        let mean = Stokes::new(1.0, 0.0, 0.0, 0.0);
        // unsmoothed unit factor variance held over 2 instances
        let expected = outer(&mean, &mean) * 0.5;
        assert!((mode.get_crosscovariance(1) - expected).amax() < 1e-12);
        assert_eq!(mode.get_crosscovariance(2), Covariance::zeros());
    }

    #[test]
    fn smoothing_without_modulation_is_skipped() {
        let config = ModeConfig {
            smooth_modulator: 4,
            square_modulator: 3,
            ..Default::default()
        };
        let mode = ModeSetup::new(&config, 8)
            .setup_mode(Box::new(GaussianMode::new()), 0, None)
            .unwrap();
        assert_eq!(mode.get_crosscovariance(1), Covariance::zeros());
    }

    #[test]
    fn field_smoothing_outermost() {
        let config = ModeConfig {
            smooth_before: 2,
            ..Default::default()
        };
        let mode = ModeSetup::new(&config, 1)
            .setup_mode(Box::new(GaussianMode::new()), 0, None)
            .unwrap();
        assert!((mode.get_crosscovariance(1) - mode.get_covariance() * 0.25).amax() < 1e-12);
    }

    #[test]
    fn builds_every_combination() {
        for combination in [
            Combination::Single,
            Combination::Superposed,
            Combination::Composite { fraction: 0.5 },
            Combination::Disjoint { fraction: 0.5 },
            Combination::Coherent { coherence: 0.3 },
        ] {
            let mut graph = build_sample(&seeded(SimulationConfig {
                combination,
                sample_size: 4,
                ..Default::default()
            }))
            .unwrap();
            assert_eq!(graph.sample.sample_size(), 4);
            assert!(graph.sample.measure().is_ok(), "{combination}");
        }
    }

    #[test]
    fn covariant_superposed_sets_intensity_covariance() {
        let config = seeded(SimulationConfig {
            combination: Combination::Superposed,
            covariant: Some(0.5),
            mode_a: ModeConfig {
                beta: 1.0,
                ..Default::default()
            },
            mode_b: ModeConfig {
                beta: 0.5,
                ..Default::default()
            },
            ..Default::default()
        });
        let mut graph = build_sample(&config).unwrap();
        let coordinator = graph.coordinator.as_ref().unwrap();
        assert!((coordinator.intensity_covariance() - 0.25).abs() < 1e-12);

        for _ in 0..10 {
            graph.sample.measure().unwrap();
        }
        assert_eq!(graph.coordinator.as_ref().unwrap().pairs_drawn(), 10);
    }

    #[test]
    fn post_detection_smoothing_for_single_mode() {
        let graph = build_sample(&seeded(SimulationConfig {
            smooth_after: 3,
            ..Default::default()
        }))
        .unwrap();
        assert_eq!(graph.sample.name(), "boxcar");
    }

    #[test]
    fn invalid_config_rejected() {
        let err = build_sample(&SimulationConfig {
            combination: Combination::Disjoint { fraction: 2.0 },
            ..Default::default()
        });
        assert!(matches!(err, Err(Error::InvalidParameter(_))));
    }
}

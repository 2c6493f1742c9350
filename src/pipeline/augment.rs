// Training batch augmentation
// Turns a batch of raw background into labelled multi-band tensors with
// randomly injected, swapped and muted transients

use log::debug;
use ndarray::{s, Array2, Array3, ArrayView3, Axis};
use rand::Rng;

use crate::bands::BandBank;
use crate::injection::{
    AntennaResponse, ChannelMuter, ChannelSwapper, ExtrinsicParams, InjectionError,
    ResponseModel, SignalInverter, SignalReverser, WaveformPool, WaveformProjector,
};
use crate::pipeline::config::StagingConfig;
use crate::pipeline::StagingResult;
use crate::sampling::{sample_kernels, KernelPolicy};
use crate::signal::PsdEstimator;

/// One staged training batch
#[derive(Debug, Clone)]
pub struct TrainingBatch {
    /// `[primary, aux..., fft]`, all sharing the batch dimension
    pub bands: Vec<Array3<f32>>,

    /// (batch, 1), 1 where a surviving injection is present
    pub labels: Array2<f32>,

    /// Elements that received an injection
    pub injected: Vec<usize>,

    /// Injected elements that had a channel swapped with another injection
    pub swapped: Vec<usize>,

    /// Injected elements that had a channel zeroed
    pub muted: Vec<usize>,

    /// (element, channel) lanes with flipped polarity
    pub inverted: Vec<(usize, usize)>,

    /// (element, channel) lanes reversed in time
    pub reversed: Vec<(usize, usize)>,

    /// Template index per element
    pub alignments: Vec<usize>,

    /// Target SNR of each injection, in `injected` order
    pub snrs: Vec<f64>,
}

impl TrainingBatch {
    pub fn batch_size(&self) -> usize {
        self.labels.nrows()
    }

    pub fn num_positive(&self) -> usize {
        self.labels.iter().filter(|&&y| y > 0.0).count()
    }
}

/// Stateless per-call augmentation built once from configuration
#[derive(Debug)]
pub struct Augmentor {
    config: StagingConfig,
    estimator: PsdEstimator,
    bank: BandBank,
    projector: WaveformProjector,
    policy: KernelPolicy,
    inverter: SignalInverter,
    reverser: SignalReverser,
    swapper: ChannelSwapper,
    muter: ChannelMuter,
}

impl Augmentor {
    /// Build with the quadrupole antenna response of `config.channel_azimuths`
    pub fn new(config: StagingConfig) -> StagingResult<Self> {
        let model = AntennaResponse::new(config.channel_azimuths.clone());
        Augmentor::with_model(config, Box::new(model))
    }

    pub fn with_model(config: StagingConfig, model: Box<dyn ResponseModel>) -> StagingResult<Self> {
        config.validate()?;

        let estimator = config.psd_estimator()?;
        let bank = config.band_bank()?;
        let projector =
            WaveformProjector::new(model, config.sample_rate, config.highpass, config.lowpass());

        Ok(Augmentor {
            estimator,
            bank,
            projector,
            policy: config.kernel_policy(),
            inverter: SignalInverter::new(config.invert_prob),
            reverser: SignalReverser::new(config.reverse_prob),
            swapper: ChannelSwapper::new(config.swap_frac),
            muter: ChannelMuter::new(config.mute_frac),
            config,
        })
    }

    pub fn config(&self) -> &StagingConfig {
        &self.config
    }

    pub fn bank(&self) -> &BandBank {
        &self.bank
    }

    /// Stage a training batch from raw background
    ///
    /// `x` is (batch, channels, psd + window samples). Injections are drawn
    /// from `pool` without replacement.
    pub fn augment<R: Rng + ?Sized>(
        &self,
        x: ArrayView3<'_, f32>,
        pool: &WaveformPool,
        rng: &mut R,
    ) -> StagingResult<TrainingBatch> {
        let (batch, channels, _) = x.dim();
        if channels != self.projector.num_channels() {
            return Err(InjectionError::ChannelMismatch {
                expected: self.projector.num_channels(),
                actual: channels,
            }
            .into());
        }

        let (mut windows, psds) = self.estimator.estimate(x)?;
        let inverted = self.inverter.apply(&mut windows, rng);
        let reversed = self.reverser.apply(&mut windows, rng);

        let injected: Vec<usize> = (0..batch)
            .filter(|_| rng.gen::<f64>() < self.config.sample_prob)
            .collect();

        let mut labels = Array2::<f32>::zeros((batch, 1));
        let mut swapped = Vec::new();
        let mut muted = Vec::new();
        let mut snrs = Vec::new();

        if !injected.is_empty() {
            let count = injected.len();
            let waveforms = pool.sample(count, rng)?;
            let params = ExtrinsicParams::sample_n(count, rng);
            snrs = self.config.snr.sample_n(count, rng);

            let element_psds = psds.select(Axis(0), &injected);
            let responses = self.projector.project(
                &params,
                waveforms.cross.view(),
                waveforms.plus.view(),
                element_psds.view(),
                &snrs,
            )?;

            let mut sampled = sample_kernels(
                responses.view(),
                self.estimator.window_size(),
                pool.signal_time(),
                &self.policy,
                rng,
            )?;
            let swapped_local = self.swapper.apply(&mut sampled.kernels, rng);
            let muted_local = self.muter.apply(&mut sampled.kernels, rng);

            for (j, &element) in injected.iter().enumerate() {
                let mut window = windows.slice_mut(s![element, .., ..]);
                window += &sampled.kernels.slice(s![j, .., ..]);
            }

            swapped = swapped_local.iter().map(|&j| injected[j]).collect();
            muted = muted_local.iter().map(|&j| injected[j]).collect();
            for &element in &injected {
                if !swapped.contains(&element) && !muted.contains(&element) {
                    labels[[element, 0]] = 1.0;
                }
            }
        }

        let alignments = self.bank.templates().choose(rng, batch);
        let bands = self.bank.process(windows.view(), psds.view(), &alignments)?;

        let staged = TrainingBatch {
            bands,
            labels,
            injected,
            swapped,
            muted,
            inverted,
            reversed,
            alignments,
            snrs,
        };

        debug!(
            "Staged training batch of {}: {} injected, {} swapped, {} muted, {} positive",
            batch,
            staged.injected.len(),
            staged.swapped.len(),
            staged.muted.len(),
            staged.num_positive()
        );
        Ok(staged)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bands::{BandConfig, FftBandConfig, DEFAULT_ASD_SCALE};
    use crate::features::FeatureMode;
    use crate::injection::SnrDistribution;
    use crate::pipeline::config::SamplerConfig;
    use crate::pipeline::StagingError;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    pub(crate) fn small_config() -> StagingConfig {
        StagingConfig {
            sample_rate: 2048.0,
            kernel_length: 0.375,
            fduration: 0.125,
            psd_length: 0.5,
            fftlength: Some(0.25),
            valid_stride: 0.5,
            num_valid_views: 5,
            bands: vec![
                BandConfig::new(2048.0, 0.125, 32.0, 1024.0),
                BandConfig::new(1024.0, 0.125, 16.0, 512.0),
                BandConfig::new(512.0, 0.25, 16.0, 256.0),
            ],
            fft_band: FftBandConfig {
                kernel_length: 0.25,
                high_pass: 20.0,
                low_pass: 500.0,
                mode: FeatureMode::Complex,
                asd_scale: DEFAULT_ASD_SCALE,
            },
            inference_sampling_rates: vec![64.0, 32.0, 16.0],
            sampler: SamplerConfig {
                offset: 0.0,
                min_kernel_length: 0.125,
                filter_length: None,
                coincident: true,
            },
            highpass: 32.0,
            lowpass: None,
            sample_prob: 0.5,
            swap_frac: 0.0,
            mute_frac: 0.0,
            invert_prob: 0.5,
            reverse_prob: 0.5,
            snr: SnrDistribution::Uniform {
                low: 8.0,
                high: 20.0,
            },
            ..StagingConfig::default()
        }
    }

    pub(crate) fn noise(shape: (usize, usize, usize), seed: u64) -> Array3<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array3::from_shape_simple_fn(shape, || {
            let v: f64 = StandardNormal.sample(&mut rng);
            (v * 1e-21) as f32
        })
    }

    pub(crate) fn chirp_pool(size: usize, len: usize, signal_time: usize) -> WaveformPool {
        let burst = |i: usize, phase: f64| {
            let t = (i as f64 - signal_time as f64) / 2048.0;
            let envelope = (-(t / 0.01).powi(2)).exp();
            (envelope * (2.0 * std::f64::consts::PI * 150.0 * t + phase).sin() * 1e-21) as f32
        };
        let cross = Array2::from_shape_fn((size, len), |(_, i)| burst(i, 0.0));
        let plus = Array2::from_shape_fn((size, len), |(_, i)| burst(i, 1.0));
        WaveformPool::new(cross, plus, signal_time).unwrap()
    }

    #[test]
    fn test_augment_shapes() {
        let augmentor = Augmentor::new(small_config()).unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        let x = noise((8, 2, 2048), 1);
        let pool = chirp_pool(16, 2048, 1536);

        let staged = augmentor.augment(x.view(), &pool, &mut rng).unwrap();
        assert_eq!(staged.bands.len(), 4);
        assert_eq!(staged.bands[0].dim(), (8, 2, 256));
        assert_eq!(staged.bands[1].dim(), (8, 2, 128));
        assert_eq!(staged.bands[2].dim(), (8, 2, 128));
        assert_eq!(staged.bands[3].dim(), (8, 6, 119));
        assert_eq!(staged.labels.dim(), (8, 1));
        assert_eq!(staged.alignments.len(), 8);
        assert_eq!(staged.snrs.len(), staged.injected.len());

        // No swapping or muting: labels mirror the injection set
        assert_eq!(staged.num_positive(), staged.injected.len());
        for &element in &staged.injected {
            assert_eq!(staged.labels[[element, 0]], 1.0);
        }
    }

    #[test]
    fn test_full_muting_zeroes_labels() {
        let config = StagingConfig {
            sample_prob: 1.0,
            mute_frac: 1.0,
            ..small_config()
        };
        let augmentor = Augmentor::new(config).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let x = noise((6, 2, 2048), 2);
        let pool = chirp_pool(6, 2048, 1536);

        let staged = augmentor.augment(x.view(), &pool, &mut rng).unwrap();
        assert_eq!(staged.injected.len(), 6);
        assert_eq!(staged.muted.len(), 6);
        assert!(staged.labels.iter().all(|&y| y == 0.0));
    }

    #[test]
    fn test_swapped_injections_are_negative() {
        let config = StagingConfig {
            sample_prob: 1.0,
            swap_frac: 0.5,
            ..small_config()
        };
        let augmentor = Augmentor::new(config).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        let x = noise((8, 2, 2048), 3);
        let pool = chirp_pool(8, 2048, 1536);

        let staged = augmentor.augment(x.view(), &pool, &mut rng).unwrap();
        assert_eq!(staged.swapped.len(), 4);
        assert_eq!(staged.num_positive(), 4);
        for &element in &staged.swapped {
            assert_eq!(staged.labels[[element, 0]], 0.0);
        }
    }

    #[test]
    fn test_insufficient_waveforms() {
        let config = StagingConfig {
            sample_prob: 1.0,
            ..small_config()
        };
        let augmentor = Augmentor::new(config).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let x = noise((6, 2, 2048), 4);
        let pool = chirp_pool(3, 2048, 1536);

        let result = augmentor.augment(x.view(), &pool, &mut rng);
        assert!(matches!(
            result,
            Err(StagingError::Injection(InjectionError::InsufficientWaveforms { .. }))
        ));
    }

    #[test]
    fn test_augment_reproducible_from_seed() {
        let augmentor = Augmentor::new(small_config()).unwrap();
        let pool = chirp_pool(8, 2048, 1536);
        let x = noise((4, 2, 2048), 5);

        let first = augmentor
            .augment(x.view(), &pool, &mut StdRng::seed_from_u64(3))
            .unwrap();
        let second = augmentor
            .augment(x.view(), &pool, &mut StdRng::seed_from_u64(3))
            .unwrap();

        assert_eq!(first.injected, second.injected);
        assert_eq!(first.alignments, second.alignments);
        assert_eq!(first.labels, second.labels);
        assert_eq!(first.bands, second.bands);
    }
}

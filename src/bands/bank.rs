// Band bank
// Indexed collection of per-band whiten/resample transforms plus the
// frequency-domain band, applied to batches of raw windows

use log::info;
use ndarray::{s, Array3, ArrayView3, Axis};

use crate::bands::{BandConfig, BandError, FftBandConfig, TemplateTable};
use crate::features::FrequencyFeatureExtractor;
use crate::signal::{Resampler, Whitener};

/// Whitening followed by resampling for one time-domain band
#[derive(Debug, Clone)]
pub struct BandTransform {
    config: BandConfig,
    whitener: Whitener,
    resampler: Resampler,
    window_size: usize,
}

impl BandTransform {
    pub fn new(config: BandConfig, sample_rate: f64, fduration: f64) -> Result<Self, BandError> {
        let window_size = config.window_size(sample_rate, fduration);
        let whitener = Whitener::new(fduration, sample_rate, config.high_pass, config.low_pass)
            .with_window(window_size);
        let resampler = Resampler::new(sample_rate, config.resample_rate)?;

        Ok(BandTransform {
            config,
            whitener,
            resampler,
            window_size,
        })
    }

    pub fn config(&self) -> &BandConfig {
        &self.config
    }

    pub fn resampler(&self) -> &Resampler {
        &self.resampler
    }

    /// Raw samples consumed per element
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Samples produced per element
    pub fn output_len(&self) -> usize {
        self.resampler
            .output_len(self.whitener.output_len(self.window_size))
    }

    pub fn apply(
        &self,
        windows: ArrayView3<'_, f32>,
        psds: ArrayView3<'_, f64>,
    ) -> Result<Array3<f32>, BandError> {
        let whitened = self.whitener.whiten(windows, psds)?;
        Ok(self.resampler.resample_batch(whitened.view())?)
    }
}

/// Whitening followed by feature extraction for the frequency-domain band
#[derive(Debug, Clone)]
pub struct FftBand {
    config: FftBandConfig,
    whitener: Whitener,
    extractor: FrequencyFeatureExtractor,
    window_size: usize,
}

impl FftBand {
    pub fn new(config: FftBandConfig, sample_rate: f64, fduration: f64) -> Self {
        let window_size = config.window_size(sample_rate, fduration);
        let whitener = Whitener::new(fduration, sample_rate, config.high_pass, config.low_pass)
            .with_window(window_size);
        let extractor = FrequencyFeatureExtractor::new(
            sample_rate,
            config.high_pass,
            config.low_pass,
            config.mode,
            config.asd_scale,
        )
        .with_window(whitener.output_len(window_size));

        FftBand {
            config,
            whitener,
            extractor,
            window_size,
        }
    }

    pub fn config(&self) -> &FftBandConfig {
        &self.config
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn num_bins(&self) -> usize {
        self.extractor
            .num_bins(self.whitener.output_len(self.window_size))
    }

    pub fn apply(
        &self,
        windows: ArrayView3<'_, f32>,
        psds: ArrayView3<'_, f64>,
    ) -> Result<Array3<f32>, BandError> {
        let whitened = self.whitener.whiten(windows, psds)?;
        Ok(self.extractor.extract(whitened.view(), psds)?)
    }
}

/// All bands of a model input, in output order `[primary, aux..., fft]`
#[derive(Debug, Clone)]
pub struct BandBank {
    buffer_len: usize,
    bands: Vec<BandTransform>,
    fft: FftBand,
    templates: TemplateTable,
}

impl BandBank {
    /// Build the bank for raw windows of `buffer_len` samples
    pub fn new(
        bands: &[BandConfig],
        fft_band: &FftBandConfig,
        inference_sampling_rates: &[f64],
        sample_rate: f64,
        fduration: f64,
        buffer_len: usize,
    ) -> Result<Self, BandError> {
        if bands.is_empty() {
            return Err(BandError::InvalidBand {
                index: 0,
                reason: "a primary band is required".to_string(),
            });
        }
        for (index, band) in bands.iter().enumerate() {
            band.validate(index, sample_rate)?;
        }
        fft_band.validate(bands.len(), sample_rate)?;

        let transforms = bands
            .iter()
            .map(|band| BandTransform::new(band.clone(), sample_rate, fduration))
            .collect::<Result<Vec<_>, _>>()?;
        let fft = FftBand::new(fft_band.clone(), sample_rate, fduration);

        let primary = transforms[0].window_size();
        if primary > buffer_len {
            return Err(BandError::BufferTooShort {
                band: 0,
                required: primary,
                available: buffer_len,
            });
        }
        if fft.window_size() > buffer_len {
            return Err(BandError::BufferTooShort {
                band: bands.len(),
                required: fft.window_size(),
                available: buffer_len,
            });
        }

        let templates = TemplateTable::new(
            inference_sampling_rates,
            &bands[1..],
            fduration,
            sample_rate,
            buffer_len,
        )?;

        info!(
            "Built band bank with {} time-domain bands and {} FFT bins over {} samples",
            transforms.len(),
            fft.num_bins(),
            buffer_len
        );

        Ok(BandBank {
            buffer_len,
            bands: transforms,
            fft,
            templates,
        })
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    pub fn bands(&self) -> &[BandTransform] {
        &self.bands
    }

    pub fn fft(&self) -> &FftBand {
        &self.fft
    }

    pub fn templates(&self) -> &TemplateTable {
        &self.templates
    }

    /// Number of output tensors per batch
    pub fn num_outputs(&self) -> usize {
        self.bands.len() + 1
    }

    /// Transform a (batch, channels, buffer_len) block into band tensors
    ///
    /// `alignments[b]` selects the template used to place the auxiliary
    /// band windows of element `b`.
    pub fn process(
        &self,
        windows: ArrayView3<'_, f32>,
        psds: ArrayView3<'_, f64>,
        alignments: &[usize],
    ) -> Result<Vec<Array3<f32>>, BandError> {
        let (batch, channels, len) = windows.dim();
        if len != self.buffer_len {
            return Err(BandError::BufferTooShort {
                band: 0,
                required: self.buffer_len,
                available: len,
            });
        }
        if alignments.len() != batch {
            return Err(BandError::AlignmentCount {
                expected: batch,
                actual: alignments.len(),
            });
        }

        let mut outputs = Vec::with_capacity(self.num_outputs());

        let primary = &self.bands[0];
        let tail = windows.slice(s![.., .., len - primary.window_size()..]);
        outputs.push(primary.apply(tail, psds)?);

        for (k, band) in self.bands.iter().enumerate().skip(1) {
            let mut gathered = Array3::<f32>::zeros((batch, channels, band.window_size()));
            for (b, &template) in alignments.iter().enumerate() {
                let slices = self
                    .templates
                    .get(template)
                    .ok_or(BandError::UnknownTemplate(template))?;
                let range = slices[k - 1].clone();
                gathered
                    .index_axis_mut(Axis(0), b)
                    .assign(&windows.slice(s![b, .., range]));
            }
            outputs.push(band.apply(gathered.view(), psds)?);
        }

        let tail = windows.slice(s![.., .., len - self.fft.window_size()..]);
        outputs.push(self.fft.apply(tail, psds)?);

        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureMode;
    use crate::bands::DEFAULT_ASD_SCALE;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    fn bands() -> Vec<BandConfig> {
        vec![
            BandConfig::new(2048.0, 0.125, 32.0, 1024.0),
            BandConfig::new(1024.0, 0.125, 16.0, 512.0),
            BandConfig::new(512.0, 0.25, 16.0, 256.0),
        ]
    }

    fn fft_band() -> FftBandConfig {
        FftBandConfig {
            kernel_length: 0.25,
            high_pass: 20.0,
            low_pass: 500.0,
            mode: FeatureMode::Complex,
            asd_scale: DEFAULT_ASD_SCALE,
        }
    }

    fn bank() -> BandBank {
        BandBank::new(&bands(), &fft_band(), &[64.0, 32.0, 16.0], 2048.0, 0.125, 1024).unwrap()
    }

    #[test]
    fn test_band_transform_lengths() {
        let bank = bank();
        let lengths: Vec<usize> = bank.bands().iter().map(|b| b.output_len()).collect();
        assert_eq!(lengths, vec![256, 128, 128]);
        assert!(bank.bands()[0].resampler().is_identity());
        assert!(!bank.bands()[1].resampler().is_identity());
        assert_eq!(bank.fft().num_bins(), 119);
        assert_eq!(bank.templates().len(), 4);
    }

    #[test]
    fn test_process_output_shapes() {
        let bank = bank();
        let mut rng = StdRng::seed_from_u64(9);
        let data: Vec<f32> = (0..3 * 2 * 1024)
            .map(|_| {
                let v: f64 = StandardNormal.sample(&mut rng);
                v as f32
            })
            .collect();
        let windows = Array3::from_shape_vec((3, 2, 1024), data).unwrap();
        let psds = Array3::<f64>::from_elem((3, 2, 257), 2.0 / 2048.0);

        let outputs = bank.process(windows.view(), psds.view(), &[0, 3, 1]).unwrap();
        assert_eq!(outputs.len(), 4);
        assert_eq!(outputs[0].dim(), (3, 2, 256));
        assert_eq!(outputs[1].dim(), (3, 2, 128));
        assert_eq!(outputs[2].dim(), (3, 2, 128));
        assert_eq!(outputs[3].dim(), (3, 6, 119));
        assert!(outputs.iter().all(|o| o.iter().all(|v| v.is_finite())));
    }

    #[test]
    fn test_process_rejects_alignment_count() {
        let bank = bank();
        let windows = Array3::<f32>::zeros((2, 2, 1024));
        let psds = Array3::<f64>::from_elem((2, 2, 257), 1.0);

        let result = bank.process(windows.view(), psds.view(), &[0]);
        assert!(matches!(result, Err(BandError::AlignmentCount { .. })));

        let result = bank.process(windows.view(), psds.view(), &[0, 7]);
        assert!(matches!(result, Err(BandError::UnknownTemplate(7))));
    }

    #[test]
    fn test_bank_rejects_short_buffer() {
        let result = BandBank::new(&bands(), &fft_band(), &[64.0, 32.0, 16.0], 2048.0, 0.125, 600);
        assert!(matches!(result, Err(BandError::BufferTooShort { .. })));
    }
}

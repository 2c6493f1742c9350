// Frequency-domain features
// Band-limited FFT of a whitened window stacked with an inverse ASD
// conditioning channel on the same frequency grid

use ndarray::{s, Array1, Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::signal::spectral::{interpolate_linear, rfftfreq, FftPlan, SpectralError};

/// How FFT bins are laid out along the channel axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureMode {
    /// `[real, imag, inv_asd]`
    #[default]
    Complex,

    /// `[sqrt|real|, sqrt|imag|, inv_asd]`
    RootMagnitude,

    /// `[(2 / N)|X|, inv_asd]`
    Amplitude,
}

impl FeatureMode {
    /// Output channels produced per input channel
    pub fn channel_factor(&self) -> usize {
        match self {
            FeatureMode::Complex | FeatureMode::RootMagnitude => 3,
            FeatureMode::Amplitude => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyFeatureExtractor {
    sample_rate: f64,
    high_pass: f64,
    low_pass: f64,
    mode: FeatureMode,
    asd_scale: f64,
    plan: Option<FftPlan>,
}

impl FrequencyFeatureExtractor {
    pub fn new(
        sample_rate: f64,
        high_pass: f64,
        low_pass: f64,
        mode: FeatureMode,
        asd_scale: f64,
    ) -> Self {
        FrequencyFeatureExtractor {
            sample_rate,
            high_pass,
            low_pass,
            mode,
            asd_scale,
            plan: None,
        }
    }

    /// Plan the forward FFT for whitened windows of `len` samples
    pub fn with_window(mut self, len: usize) -> Self {
        self.plan = (len > 0).then(|| FftPlan::new(len));
        self
    }

    pub fn mode(&self) -> FeatureMode {
        self.mode
    }

    fn in_band(&self, freq: f64) -> bool {
        freq > self.high_pass && freq < self.low_pass
    }

    /// Indices of rfft bins of an `n`-sample window strictly inside the band
    fn band_bins(&self, n: usize) -> Vec<usize> {
        rfftfreq(n, self.sample_rate)
            .into_iter()
            .enumerate()
            .filter(|(_, f)| self.in_band(*f))
            .map(|(k, _)| k)
            .collect()
    }

    /// Frequency bins kept for a window of `window_len` samples
    pub fn num_bins(&self, window_len: usize) -> usize {
        self.band_bins(window_len).len()
    }

    pub fn output_channels(&self, channels: usize) -> usize {
        channels * self.mode.channel_factor()
    }

    /// Features for a batch of whitened windows
    ///
    /// `windows` is (batch, channels, samples) and `psds` holds the
    /// matching (batch, channels, freqs) densities. Returns
    /// (batch, factor * channels, bins).
    pub fn extract(
        &self,
        windows: ArrayView3<'_, f32>,
        psds: ArrayView3<'_, f64>,
    ) -> Result<Array3<f32>, SpectralError> {
        let (batch, channels, len) = windows.dim();
        let (psd_batch, psd_channels, _) = psds.dim();
        if psd_batch != batch || psd_channels != channels {
            return Err(SpectralError::ShapeMismatch {
                expected: format!("psds for ({}, {})", batch, channels),
                actual: format!("({}, {})", psd_batch, psd_channels),
            });
        }

        let bins = self.band_bins(len);
        if bins.is_empty() {
            return Err(SpectralError::EmptyFrequencyMask {
                high_pass: self.high_pass,
                low_pass: self.low_pass,
            });
        }
        let num_bins = bins.len();
        let plan = match &self.plan {
            Some(plan) if plan.len() == len => plan.clone(),
            _ => FftPlan::new(len),
        };

        let mut out = Array3::<f32>::zeros((batch, self.output_channels(channels), num_bins));
        for b in 0..batch {
            for c in 0..channels {
                let samples: Vec<f64> = windows
                    .slice(s![b, c, ..])
                    .iter()
                    .map(|&v| v as f64)
                    .collect();
                let spectrum = plan.forward(&samples)?;
                let psd: Vec<f64> = psds.slice(s![b, c, ..]).iter().copied().collect();
                let inv_asd = self.inverse_asd(&psd, num_bins)?;

                for (j, &k) in bins.iter().enumerate() {
                    let bin = spectrum[k];
                    match self.mode {
                        FeatureMode::Complex => {
                            out[[b, c, j]] = bin.re as f32;
                            out[[b, channels + c, j]] = bin.im as f32;
                            out[[b, 2 * channels + c, j]] = inv_asd[j] as f32;
                        }
                        FeatureMode::RootMagnitude => {
                            out[[b, c, j]] = bin.re.abs().sqrt() as f32;
                            out[[b, channels + c, j]] = bin.im.abs().sqrt() as f32;
                            out[[b, 2 * channels + c, j]] = inv_asd[j] as f32;
                        }
                        FeatureMode::Amplitude => {
                            out[[b, c, j]] = (2.0 * bin.norm() / len as f64) as f32;
                            out[[b, channels + c, j]] = inv_asd[j] as f32;
                        }
                    }
                }
            }
        }

        Ok(out)
    }

    /// Scaled inverse ASD on the PSD's own grid, resized to `num_bins`
    fn inverse_asd(&self, psd: &[f64], num_bins: usize) -> Result<Vec<f64>, SpectralError> {
        let grid = Array1::linspace(0.0, self.sample_rate / 2.0, psd.len());
        let asd: Vec<f64> = psd
            .iter()
            .zip(grid.iter())
            .filter(|(_, f)| self.in_band(**f))
            .map(|(&p, _)| p.max(0.0).sqrt() * self.asd_scale)
            .collect();
        if asd.is_empty() {
            return Err(SpectralError::EmptyFrequencyMask {
                high_pass: self.high_pass,
                low_pass: self.low_pass,
            });
        }

        let asd = if asd.len() == num_bins {
            asd
        } else {
            interpolate_linear(&asd, num_bins)
        };

        Ok(asd
            .into_iter()
            .map(|a| if a > 0.0 { 1.0 / a } else { 0.0 })
            .collect())
    }
}

// Noise statistics estimation
// Welch power spectral densities with mean or median averaging, and a
// batch estimator that splits PSD background off the front of each sample

use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::signal::spectral::{hann_window, FftPlan, SpectralError};

/// How overlapping periodograms are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PsdAverage {
    /// Arithmetic mean of all periodograms
    Mean,

    /// Bias-corrected median, robust to transients in the background
    #[default]
    Median,
}

/// One-sided Welch PSD estimate of a single channel
///
/// Segments of `nperseg` samples overlap by `noverlap`, are mean-removed
/// and Hann-windowed. Output has `nperseg / 2 + 1` bins spaced
/// `sample_rate / nperseg` apart, in units of power per Hz.
pub fn welch(
    samples: &[f64],
    sample_rate: f64,
    nperseg: usize,
    noverlap: usize,
    average: PsdAverage,
) -> Result<Vec<f64>, SpectralError> {
    if !(sample_rate > 0.0) {
        return Err(SpectralError::InvalidSampleRate(sample_rate));
    }
    if nperseg == 0 || samples.len() < nperseg {
        return Err(SpectralError::WindowTooShort {
            len: samples.len(),
            required: nperseg.max(1),
        });
    }
    if noverlap >= nperseg {
        return Err(SpectralError::ShapeMismatch {
            expected: format!("overlap below {} samples", nperseg),
            actual: format!("{} samples", noverlap),
        });
    }

    let hop = nperseg - noverlap;
    let window = hann_window(nperseg);
    let win_norm: f64 = window.iter().map(|w| w * w).sum();
    let num_freqs = nperseg / 2 + 1;
    let plan = FftPlan::new(nperseg);

    let mut periodograms: Vec<Vec<f64>> = Vec::new();
    let mut start = 0;
    while start + nperseg <= samples.len() {
        let segment = &samples[start..start + nperseg];
        let mean = segment.iter().sum::<f64>() / nperseg as f64;
        let windowed: Vec<f64> = segment
            .iter()
            .zip(window.iter())
            .map(|(x, w)| (x - mean) * w)
            .collect();

        let spectrum = plan.forward(&windowed)?;
        let periodogram: Vec<f64> = spectrum
            .iter()
            .enumerate()
            .map(|(k, c)| {
                let power = c.norm_sqr() / (sample_rate * win_norm);
                let is_nyquist = nperseg % 2 == 0 && k == nperseg / 2;
                if k == 0 || is_nyquist {
                    power
                } else {
                    2.0 * power
                }
            })
            .collect();
        periodograms.push(periodogram);
        start += hop;
    }

    let num_segments = periodograms.len();
    let psd = match average {
        PsdAverage::Mean => (0..num_freqs)
            .map(|k| periodograms.iter().map(|p| p[k]).sum::<f64>() / num_segments as f64)
            .collect(),
        PsdAverage::Median => {
            let bias = median_bias(num_segments);
            let mut column = vec![0.0; num_segments];
            (0..num_freqs)
                .map(|k| {
                    for (slot, p) in column.iter_mut().zip(periodograms.iter()) {
                        *slot = p[k];
                    }
                    median(&mut column) / bias
                })
                .collect()
        }
    };

    Ok(psd)
}

/// Ratio of the median to the mean of a chi-squared(2) sample of size `n`
fn median_bias(n: usize) -> f64 {
    let half = n.saturating_sub(1) / 2;
    1.0 + (1..=half)
        .map(|k| 1.0 / (2 * k + 1) as f64 - 1.0 / (2 * k) as f64)
        .sum::<f64>()
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

/// Welch estimator with fixed segment geometry
#[derive(Debug, Clone)]
pub struct SpectralDensity {
    sample_rate: f64,
    nperseg: usize,
    noverlap: usize,
    average: PsdAverage,
}

impl SpectralDensity {
    /// `fftlength` and `overlap` are in seconds; overlap defaults to half
    /// of `fftlength`
    pub fn new(
        sample_rate: f64,
        fftlength: f64,
        overlap: Option<f64>,
        average: PsdAverage,
    ) -> Result<Self, SpectralError> {
        if !(sample_rate > 0.0) {
            return Err(SpectralError::InvalidSampleRate(sample_rate));
        }

        let nperseg = (fftlength * sample_rate).round() as usize;
        let noverlap = match overlap {
            Some(seconds) => (seconds * sample_rate).round() as usize,
            None => nperseg / 2,
        };
        if nperseg == 0 || noverlap >= nperseg {
            return Err(SpectralError::ShapeMismatch {
                expected: "0 <= overlap < fftlength".to_string(),
                actual: format!("overlap {} of {} samples", noverlap, nperseg),
            });
        }

        Ok(SpectralDensity {
            sample_rate,
            nperseg,
            noverlap,
            average,
        })
    }

    pub fn nperseg(&self) -> usize {
        self.nperseg
    }

    pub fn num_freqs(&self) -> usize {
        self.nperseg / 2 + 1
    }

    /// PSD of every channel of a (channels, samples) block
    pub fn estimate(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f64>, SpectralError> {
        let (num_channels, _) = x.dim();
        let mut psds = Array2::<f64>::zeros((num_channels, self.num_freqs()));

        for c in 0..num_channels {
            let samples: Vec<f64> = x.row(c).iter().map(|&v| v as f64).collect();
            let psd = welch(
                &samples,
                self.sample_rate,
                self.nperseg,
                self.noverlap,
                self.average,
            )?;
            for (dst, src) in psds.row_mut(c).iter_mut().zip(psd) {
                *dst = src;
            }
        }

        Ok(psds)
    }

    /// PSD of every (element, channel) of a (batch, channels, samples) block
    pub fn estimate_batch(&self, x: ArrayView3<'_, f32>) -> Result<Array3<f64>, SpectralError> {
        let (batch, num_channels, _) = x.dim();
        let mut psds = Array3::<f64>::zeros((batch, num_channels, self.num_freqs()));

        for b in 0..batch {
            let element = self.estimate(x.slice(s![b, .., ..]))?;
            psds.slice_mut(s![b, .., ..]).assign(&element);
        }

        Ok(psds)
    }
}

/// Splits each sample into PSD background and the window to be whitened
///
/// The trailing `window_size` samples of every element are returned as
/// the window; everything before them is used to estimate the PSD.
#[derive(Debug, Clone)]
pub struct PsdEstimator {
    window_size: usize,
    density: SpectralDensity,
}

impl PsdEstimator {
    pub fn new(window_size: usize, density: SpectralDensity) -> Self {
        PsdEstimator {
            window_size,
            density,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn num_freqs(&self) -> usize {
        self.density.num_freqs()
    }

    /// Returns `(windows, psds)` shaped (batch, channels, window_size) and
    /// (batch, channels, freqs)
    pub fn estimate(
        &self,
        x: ArrayView3<'_, f32>,
    ) -> Result<(Array3<f32>, Array3<f64>), SpectralError> {
        let (_, _, len) = x.dim();
        let required = self.window_size + self.density.nperseg();
        if len < required {
            return Err(SpectralError::WindowTooShort { len, required });
        }

        let split = len - self.window_size;
        let background = x.slice(s![.., .., ..split]);
        let windows = x.slice(s![.., .., split..]).to_owned();
        let psds = self.density.estimate_batch(background)?;

        Ok((windows, psds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    fn white_noise(len: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| StandardNormal.sample(&mut rng)).collect()
    }

    #[test]
    fn test_welch_white_noise_level() {
        let sample_rate = 256.0;
        let noise = white_noise(4096, 7);

        for average in [PsdAverage::Mean, PsdAverage::Median] {
            let psd = welch(&noise, sample_rate, 256, 128, average).unwrap();
            assert_eq!(psd.len(), 129);

            // Unit-variance white noise has a one-sided density of 2 / fs
            let expected = 2.0 / sample_rate;
            let level = psd[1..128].iter().sum::<f64>() / 127.0;
            assert!((level / expected - 1.0).abs() < 0.15, "{:?}: {}", average, level);
            assert!(psd.iter().all(|&p| p >= 0.0));
        }
    }

    #[test]
    fn test_median_robust_to_transient() {
        let sample_rate = 256.0;
        let mut noise = white_noise(4096, 11);
        for sample in noise[2000..2040].iter_mut() {
            *sample += 200.0;
        }

        let mean = welch(&noise, sample_rate, 256, 128, PsdAverage::Mean).unwrap();
        let median = welch(&noise, sample_rate, 256, 128, PsdAverage::Median).unwrap();

        let expected = 2.0 / sample_rate;
        let median_level = median[1..128].iter().sum::<f64>() / 127.0;
        let mean_level = mean[1..128].iter().sum::<f64>() / 127.0;
        assert!((median_level / expected - 1.0).abs() < 0.3);
        assert!(mean_level > 5.0 * expected);
    }

    #[test]
    fn test_welch_window_too_short() {
        let result = welch(&[0.0; 100], 256.0, 256, 128, PsdAverage::Median);
        assert!(matches!(result, Err(SpectralError::WindowTooShort { .. })));
    }

    #[test]
    fn test_median_bias() {
        assert_eq!(median_bias(1), 1.0);
        assert_eq!(median_bias(2), 1.0);
        assert!((median_bias(3) - (1.0 + 1.0 / 3.0 - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_psd_estimator_split_shapes() {
        let density = SpectralDensity::new(256.0, 1.0, None, PsdAverage::Median).unwrap();
        let estimator = PsdEstimator::new(128, density);

        let noise = white_noise(3 * 2 * 1152, 3);
        let x = Array3::from_shape_vec(
            (3, 2, 1152),
            noise.into_iter().map(|v| v as f32).collect(),
        )
        .unwrap();

        let (windows, psds) = estimator.estimate(x.view()).unwrap();
        assert_eq!(windows.dim(), (3, 2, 128));
        assert_eq!(psds.dim(), (3, 2, 129));

        // The window is the trailing part of each sample
        assert_eq!(windows[[1, 1, 0]], x[[1, 1, 1024]]);
        assert_eq!(windows[[2, 0, 127]], x[[2, 0, 1151]]);
    }

    #[test]
    fn test_psd_estimator_rejects_short_background() {
        let density = SpectralDensity::new(256.0, 1.0, None, PsdAverage::Median).unwrap();
        let estimator = PsdEstimator::new(128, density);

        let x = Array3::<f32>::zeros((1, 1, 300));
        let result = estimator.estimate(x.view());
        assert!(matches!(result, Err(SpectralError::WindowTooShort { .. })));
    }
}

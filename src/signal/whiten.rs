// Spectral whitening
// Flattens a window's spectrum against a known PSD with a band-limited,
// time-truncated inverse amplitude spectral density filter

use ndarray::{s, Array3, ArrayView3};
use realfft::num_complex::Complex;

use crate::signal::spectral::{hann_window, interpolate_linear, rfftfreq, FftPlan, SpectralError};

/// Whitening transform for one band
///
/// `fduration` seconds of filter settle time are tapered and cropped,
/// half from each edge of the window. FFTs are planned once for the
/// window length given to `with_window`.
#[derive(Debug, Clone, PartialEq)]
pub struct Whitener {
    fduration: f64,
    sample_rate: f64,
    high_pass: f64,
    low_pass: f64,
    plan: Option<FftPlan>,
}

impl Whitener {
    pub fn new(fduration: f64, sample_rate: f64, high_pass: f64, low_pass: f64) -> Self {
        Whitener {
            fduration,
            sample_rate,
            high_pass,
            low_pass,
            plan: None,
        }
    }

    /// Plan the FFTs for windows of `len` samples up front
    pub fn with_window(mut self, len: usize) -> Self {
        self.plan = (len > 0).then(|| FftPlan::new(len));
        self
    }

    /// Filter length in samples
    pub fn filter_size(&self) -> usize {
        (self.fduration * self.sample_rate).round() as usize
    }

    /// Samples cropped from each edge
    pub fn pad(&self) -> usize {
        self.filter_size() / 2
    }

    /// Length of the whitened output for an input of `len` samples
    pub fn output_len(&self, len: usize) -> usize {
        len.saturating_sub(2 * self.pad())
    }

    /// Whiten every (element, channel) lane against the matching PSD
    pub fn whiten(
        &self,
        x: ArrayView3<'_, f32>,
        psds: ArrayView3<'_, f64>,
    ) -> Result<Array3<f32>, SpectralError> {
        let (batch, channels, len) = x.dim();
        let (psd_batch, psd_channels, _) = psds.dim();
        if psd_batch != batch || psd_channels != channels {
            return Err(SpectralError::ShapeMismatch {
                expected: format!("psds for ({}, {})", batch, channels),
                actual: format!("({}, {})", psd_batch, psd_channels),
            });
        }

        let mut out = Array3::<f32>::zeros((batch, channels, self.output_len(len)));
        if batch == 0 || channels == 0 {
            return Ok(out);
        }

        self.check_window(len)?;
        let plan = self.plan_for(len);
        for b in 0..batch {
            for c in 0..channels {
                let samples: Vec<f32> = x.slice(s![b, c, ..]).iter().copied().collect();
                let psd: Vec<f64> = psds.slice(s![b, c, ..]).iter().copied().collect();
                let whitened = self.whiten_lane(&plan, &samples, &psd)?;
                for (dst, src) in out.slice_mut(s![b, c, ..]).iter_mut().zip(whitened) {
                    *dst = src;
                }
            }
        }

        Ok(out)
    }

    /// Whiten a single lane
    pub fn whiten_channel(&self, samples: &[f32], psd: &[f64]) -> Result<Vec<f32>, SpectralError> {
        self.check_window(samples.len())?;
        self.whiten_lane(&self.plan_for(samples.len()), samples, psd)
    }

    fn check_window(&self, n: usize) -> Result<(), SpectralError> {
        let size = self.filter_size();
        if n <= size || n <= 2 * self.pad() {
            return Err(SpectralError::WindowTooShort {
                len: n,
                required: size + 1,
            });
        }
        Ok(())
    }

    fn plan_for(&self, n: usize) -> FftPlan {
        match &self.plan {
            Some(plan) if plan.len() == n => plan.clone(),
            _ => FftPlan::new(n),
        }
    }

    fn whiten_lane(
        &self,
        plan: &FftPlan,
        samples: &[f32],
        psd: &[f64],
    ) -> Result<Vec<f32>, SpectralError> {
        let n = samples.len();
        let size = self.filter_size();
        let pad = self.pad();
        if psd.is_empty() {
            return Err(SpectralError::ShapeMismatch {
                expected: "non-empty psd".to_string(),
                actual: "0 bins".to_string(),
            });
        }

        let mean = samples.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
        let mut centered: Vec<f64> = samples.iter().map(|&v| v as f64 - mean).collect();

        // Taper both edges so the filter does not ring off discontinuities
        let window = hann_window(size);
        for i in 0..pad {
            centered[i] *= window[i];
            centered[n - pad + i] *= window[size - pad + i];
        }

        let kernel = self.inverse_spectrum(plan, psd)?;
        let spectrum = plan.forward(&centered)?;
        let filtered: Vec<Complex<f64>> = spectrum
            .iter()
            .zip(kernel.iter())
            .map(|(x, k)| *x * (k / n as f64))
            .collect();
        let whitened = plan.inverse(&filtered)?;

        let scale = (2.0 / self.sample_rate).sqrt();
        Ok(whitened[pad..n - pad]
            .iter()
            .map(|&v| (v * scale) as f32)
            .collect())
    }

    /// Magnitude response of the truncated inverse ASD filter on the
    /// rfft grid of an `n`-sample window
    fn inverse_spectrum(&self, plan: &FftPlan, psd: &[f64]) -> Result<Vec<f64>, SpectralError> {
        let n = plan.len();
        let num_freqs = n / 2 + 1;
        let psd = interpolate_linear(psd, num_freqs);
        let freqs = rfftfreq(n, self.sample_rate);

        let mut inv_asd: Vec<Complex<f64>> = psd
            .iter()
            .zip(freqs.iter())
            .map(|(&p, &f)| {
                let in_band = f >= self.high_pass && f < self.low_pass;
                let value = if in_band && p > 0.0 { 1.0 / p.sqrt() } else { 0.0 };
                Complex::new(value, 0.0)
            })
            .collect();
        inv_asd[0] = Complex::new(0.0, 0.0);
        inv_asd[num_freqs - 1] = Complex::new(0.0, 0.0);

        // Truncate the impulse response to the filter length
        let size = self.filter_size();
        let pad = self.pad();
        let mut response = plan.inverse(&inv_asd)?;
        let window = hann_window(size);
        for i in 0..pad {
            response[i] *= window[size - pad + i];
            response[n - pad + i] *= window[i];
        }
        for value in response[pad..n - pad].iter_mut() {
            *value = 0.0;
        }

        let truncated = plan.forward(&response)?;
        Ok(truncated.iter().map(|c| c.norm() / n as f64).collect())
    }
}

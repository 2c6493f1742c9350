// Spectral helpers
// Real FFT wrappers, window functions and frequency grids shared by the
// PSD estimator, the whitener and the frequency-domain feature extractor

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by spectral estimation and filtering
#[derive(Debug, Error)]
pub enum SpectralError {
    #[error("Window of {len} samples is shorter than the required {required} samples")]
    WindowTooShort { len: usize, required: usize },

    #[error("FFT failed: {0}")]
    Fft(String),

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("No frequency bins in ({high_pass} Hz, {low_pass} Hz)")]
    EmptyFrequencyMask { high_pass: f64, low_pass: f64 },

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    #[error("Resampler setup failed: {0}")]
    ResamplerSetup(#[from] rubato::ResamplerConstructionError),

    #[error("Resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
}

impl From<realfft::FftError> for SpectralError {
    fn from(error: realfft::FftError) -> Self {
        SpectralError::Fft(error.to_string())
    }
}

/// Periodic Hann window of length `n`
pub fn hann_window(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }

    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos()))
        .collect()
}

/// Forward and inverse real FFTs planned once for a fixed length
#[derive(Clone)]
pub struct FftPlan {
    len: usize,
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
}

impl FftPlan {
    pub fn new(len: usize) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        FftPlan {
            len,
            forward: planner.plan_fft_forward(len),
            inverse: planner.plan_fft_inverse(len),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Forward transform without normalization
    /// Returns `len / 2 + 1` complex bins
    pub fn forward(&self, samples: &[f64]) -> Result<Vec<Complex<f64>>, SpectralError> {
        if samples.len() != self.len {
            return Err(SpectralError::ShapeMismatch {
                expected: format!("{} samples", self.len),
                actual: format!("{} samples", samples.len()),
            });
        }

        let mut input = samples.to_vec();
        let mut spectrum = self.forward.make_output_vec();
        self.forward.process(&mut input, &mut spectrum)?;

        Ok(spectrum)
    }

    /// Inverse transform without the `1 / len` factor
    pub fn inverse(&self, spectrum: &[Complex<f64>]) -> Result<Vec<f64>, SpectralError> {
        let n = self.len;
        if spectrum.len() != n / 2 + 1 {
            return Err(SpectralError::ShapeMismatch {
                expected: format!("{} bins", n / 2 + 1),
                actual: format!("{} bins", spectrum.len()),
            });
        }

        // DC and (even-length) Nyquist bins must be purely real
        let mut input = spectrum.to_vec();
        input[0].im = 0.0;
        if n % 2 == 0 {
            let last = input.len() - 1;
            input[last].im = 0.0;
        }

        let mut output = self.inverse.make_output_vec();
        self.inverse.process(&mut input, &mut output)?;

        Ok(output)
    }
}

impl fmt::Debug for FftPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftPlan").field("len", &self.len).finish()
    }
}

impl PartialEq for FftPlan {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
    }
}

/// Forward real FFT without normalization
/// Returns `n / 2 + 1` complex bins
pub fn rfft(samples: &[f64]) -> Result<Vec<Complex<f64>>, SpectralError> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }
    FftPlan::new(samples.len()).forward(samples)
}

/// Inverse real FFT without the `1 / n` factor
/// `rfft` followed by `irfft` scales the signal by `n`
pub fn irfft(spectrum: &[Complex<f64>], n: usize) -> Result<Vec<f64>, SpectralError> {
    if n == 0 {
        return Ok(Vec::new());
    }
    if spectrum.len() != n / 2 + 1 {
        return Err(SpectralError::ShapeMismatch {
            expected: format!("{} bins", n / 2 + 1),
            actual: format!("{} bins", spectrum.len()),
        });
    }
    FftPlan::new(n).inverse(spectrum)
}

/// Frequencies (Hz) of the one-sided FFT bins for a length-`n` signal
pub fn rfftfreq(n: usize, sample_rate: f64) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let bin_width = sample_rate / n as f64;
    (0..n / 2 + 1).map(|k| k as f64 * bin_width).collect()
}

/// Linear resize of a 1D array to `size` points
///
/// Source positions follow the half-pixel convention
/// (`align_corners = false`), clamped at both ends.
pub fn interpolate_linear(values: &[f64], size: usize) -> Vec<f64> {
    let len = values.len();
    if len == 0 || size == 0 {
        return Vec::new();
    }
    if len == size {
        return values.to_vec();
    }

    let scale = len as f64 / size as f64;
    (0..size)
        .map(|i| {
            let src = ((i as f64 + 0.5) * scale - 0.5).max(0.0);
            let lower = (src.floor() as usize).min(len - 1);
            let upper = (lower + 1).min(len - 1);
            let lambda = src - lower as f64;
            values[lower] * (1.0 - lambda) + values[upper] * lambda
        })
        .collect()
}

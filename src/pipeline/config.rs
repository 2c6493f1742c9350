// Staging configuration
// Serde-backed settings for the whole pipeline with validation and the
// sample counts derived from them

use std::f64::consts::FRAC_PI_4;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bands::{
    BandBank, BandConfig, BandError, FftBandConfig, TemplateTable, DEFAULT_ASD_SCALE,
};
use crate::features::FeatureMode;
use crate::injection::{InjectionError, SnrDistribution};
use crate::sampling::KernelPolicy;
use crate::signal::{PsdAverage, PsdEstimator, SpectralDensity, SpectralError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Band configuration error: {0}")]
    Band(#[from] BandError),

    #[error("Injection configuration error: {0}")]
    Injection(#[from] InjectionError),
}

/// Kernel placement margins, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub offset: f64,
    pub min_kernel_length: f64,

    /// Defaults to `fduration`
    pub filter_length: Option<f64>,

    pub coincident: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            offset: 0.0,
            min_kernel_length: 0.5,
            filter_length: None,
            coincident: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Rate of the raw data (Hz)
    pub sample_rate: f64,

    /// Longest look-back any band needs (seconds)
    pub kernel_length: f64,

    /// Whitening filter settle time (seconds)
    pub fduration: f64,

    /// Background ahead of each window used for the PSD (seconds)
    pub psd_length: f64,

    /// Welch segment length; defaults to `kernel_length + fduration`
    pub fftlength: Option<f64>,

    pub psd_average: PsdAverage,

    /// Stride between validation background windows (seconds)
    pub valid_stride: f64,
    pub num_valid_views: usize,

    /// Time-domain bands, primary first
    pub bands: Vec<BandConfig>,
    pub fft_band: FftBandConfig,

    /// Inference sampling rate of each time-domain band (Hz, decreasing)
    pub inference_sampling_rates: Vec<f64>,

    pub sampler: SamplerConfig,

    /// SNR integration band
    pub highpass: f64,
    pub lowpass: Option<f64>,

    pub sample_prob: f64,
    pub swap_frac: f64,
    pub mute_frac: f64,
    pub invert_prob: f64,
    pub reverse_prob: f64,
    pub snr: SnrDistribution,

    /// Detector orientation per channel (radians)
    pub channel_azimuths: Vec<f64>,
}

impl Default for StagingConfig {
    fn default() -> Self {
        StagingConfig {
            sample_rate: 2048.0,
            kernel_length: 3.0,
            fduration: 1.0,
            psd_length: 8.0,
            fftlength: None,
            psd_average: PsdAverage::Median,
            valid_stride: 0.5,
            num_valid_views: 5,
            bands: vec![
                BandConfig::new(2048.0, 0.5, 32.0, 1024.0),
                BandConfig::new(1024.0, 1.0, 24.0, 512.0),
                BandConfig::new(512.0, 2.0, 16.0, 256.0),
            ],
            fft_band: FftBandConfig {
                kernel_length: 1.0,
                high_pass: 20.0,
                low_pass: 500.0,
                mode: FeatureMode::Complex,
                asd_scale: DEFAULT_ASD_SCALE,
            },
            inference_sampling_rates: vec![16.0, 8.0, 4.0],
            sampler: SamplerConfig::default(),
            highpass: 32.0,
            lowpass: None,
            sample_prob: 0.5,
            swap_frac: 0.0,
            mute_frac: 0.0,
            invert_prob: 0.5,
            reverse_prob: 0.5,
            snr: SnrDistribution::default(),
            channel_azimuths: vec![0.0, FRAC_PI_4],
        }
    }
}

impl StagingConfig {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json_bytes(data: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Load and validate a JSON configuration file
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path)?;
        let config = StagingConfig::from_json_bytes(&data)?;
        config.validate()?;
        Ok(config)
    }

    fn samples(&self, seconds: f64) -> usize {
        (seconds * self.sample_rate).round() as usize
    }

    /// Samples handed to the whitening bank per element
    pub fn window_size(&self) -> usize {
        self.samples(self.kernel_length + self.fduration)
    }

    pub fn psd_size(&self) -> usize {
        self.samples(self.psd_length)
    }

    /// PSD background plus window
    pub fn sample_size(&self) -> usize {
        self.psd_size() + self.window_size()
    }

    pub fn stride_size(&self) -> usize {
        self.samples(self.valid_stride)
    }

    pub fn fftlength(&self) -> f64 {
        self.fftlength
            .unwrap_or(self.kernel_length + self.fduration)
    }

    pub fn lowpass(&self) -> f64 {
        self.lowpass.unwrap_or(self.sample_rate / 2.0)
    }

    pub fn kernel_policy(&self) -> KernelPolicy {
        KernelPolicy {
            offset: self.samples(self.sampler.offset),
            min_kernel_size: self.samples(self.sampler.min_kernel_length),
            filter_size: self.samples(self.sampler.filter_length.unwrap_or(self.fduration)),
            coincident: self.sampler.coincident,
        }
    }

    /// Splits `sample_size` inputs into PSD background and window
    pub fn psd_estimator(&self) -> Result<PsdEstimator, SpectralError> {
        let density =
            SpectralDensity::new(self.sample_rate, self.fftlength(), None, self.psd_average)?;
        Ok(PsdEstimator::new(self.window_size(), density))
    }

    pub fn band_bank(&self) -> Result<BandBank, BandError> {
        BandBank::new(
            &self.bands,
            &self.fft_band,
            &self.inference_sampling_rates,
            self.sample_rate,
            self.fduration,
            self.window_size(),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| Err(ConfigError::Invalid(reason));

        if !(self.sample_rate > 0.0) || self.sample_rate.fract() != 0.0 {
            return invalid(format!(
                "sample rate {} must be a positive whole number of Hz",
                self.sample_rate
            ));
        }
        for (name, value) in [
            ("kernel_length", self.kernel_length),
            ("fduration", self.fduration),
            ("psd_length", self.psd_length),
            ("valid_stride", self.valid_stride),
            ("fftlength", self.fftlength()),
        ] {
            if !(value > 0.0) {
                return invalid(format!("{} must be positive, got {}", name, value));
            }
        }
        if self.fftlength() > self.psd_length {
            return invalid(format!(
                "fftlength {} exceeds psd_length {}",
                self.fftlength(),
                self.psd_length
            ));
        }
        if self.num_valid_views == 0 {
            return invalid("num_valid_views must be at least 1".to_string());
        }
        for (name, value) in [
            ("sample_prob", self.sample_prob),
            ("swap_frac", self.swap_frac),
            ("mute_frac", self.mute_frac),
            ("invert_prob", self.invert_prob),
            ("reverse_prob", self.reverse_prob),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{} must lie in [0, 1], got {}", name, value));
            }
        }
        if !(self.highpass >= 0.0 && self.highpass < self.lowpass())
            || self.lowpass() > self.sample_rate / 2.0
        {
            return invalid(format!(
                "SNR band [{}, {}) must lie inside [0, {}]",
                self.highpass,
                self.lowpass(),
                self.sample_rate / 2.0
            ));
        }
        if self.channel_azimuths.is_empty() {
            return invalid("at least one channel azimuth is required".to_string());
        }
        self.snr.validate()?;

        self.validate_bands()?;
        self.validate_sampler()
    }

    fn validate_bands(&self) -> Result<(), ConfigError> {
        if self.bands.is_empty() {
            return Err(ConfigError::Invalid("a primary band is required".to_string()));
        }
        for (index, band) in self.bands.iter().enumerate() {
            band.validate(index, self.sample_rate)?;
            if band.kernel_length > self.kernel_length {
                return Err(BandError::InvalidBand {
                    index,
                    reason: format!(
                        "kernel length {} exceeds the window kernel length {}",
                        band.kernel_length, self.kernel_length
                    ),
                }
                .into());
            }
        }
        self.fft_band.validate(self.bands.len(), self.sample_rate)?;
        if self.fft_band.kernel_length > self.kernel_length {
            return Err(ConfigError::Invalid(format!(
                "fft band kernel length {} exceeds the window kernel length {}",
                self.fft_band.kernel_length, self.kernel_length
            )));
        }

        TemplateTable::new(
            &self.inference_sampling_rates,
            &self.bands[1..],
            self.fduration,
            self.sample_rate,
            self.window_size(),
        )?;
        Ok(())
    }

    fn validate_sampler(&self) -> Result<(), ConfigError> {
        let policy = self.kernel_policy();
        if self.sampler.offset < 0.0 || self.sampler.min_kernel_length < 0.0 {
            return Err(ConfigError::Invalid(
                "sampler margins must be non-negative".to_string(),
            ));
        }
        if 2 * policy.offset >= policy.min_kernel_size {
            return Err(ConfigError::Invalid(format!(
                "sampler offset of {} samples leaves no room in a {} sample minimum kernel",
                policy.offset, policy.min_kernel_size
            )));
        }
        if policy.min_kernel_size > self.window_size() {
            return Err(ConfigError::Invalid(format!(
                "minimum kernel of {} samples exceeds the {} sample window",
                policy.min_kernel_size,
                self.window_size()
            )));
        }
        Ok(())
    }
}

// Band configuration
// Per-band resample rate, look-back and frequency limits

use serde::{Deserialize, Serialize};

use crate::bands::BandError;
use crate::features::FeatureMode;

/// Default normalization applied to the ASD before inversion
pub const DEFAULT_ASD_SCALE: f64 = 1e23;

/// One time-domain band
///
/// The first band of a bank is the primary band; later ones are auxiliary
/// bands whose windows are placed by the template table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandConfig {
    /// Output sample rate (Hz)
    pub resample_rate: f64,

    /// Look-back seen by the band (seconds)
    pub kernel_length: f64,

    pub high_pass: f64,
    pub low_pass: f64,
}

impl BandConfig {
    pub fn new(resample_rate: f64, kernel_length: f64, high_pass: f64, low_pass: f64) -> Self {
        BandConfig {
            resample_rate,
            kernel_length,
            high_pass,
            low_pass,
        }
    }

    /// Samples sliced from the source buffer, filter padding included
    pub fn window_size(&self, sample_rate: f64, fduration: f64) -> usize {
        ((self.kernel_length + fduration) * sample_rate).round() as usize
    }

    pub fn validate(&self, index: usize, sample_rate: f64) -> Result<(), BandError> {
        let invalid = |reason: String| BandError::InvalidBand { index, reason };

        if !(self.resample_rate > 0.0) || self.resample_rate.fract() != 0.0 {
            return Err(invalid(format!(
                "resample rate {} must be a positive whole number of Hz",
                self.resample_rate
            )));
        }
        if self.resample_rate > sample_rate {
            return Err(invalid(format!(
                "resample rate {} exceeds sample rate {}",
                self.resample_rate, sample_rate
            )));
        }
        if !(self.kernel_length > 0.0) {
            return Err(invalid(format!(
                "kernel length {} must be positive",
                self.kernel_length
            )));
        }
        check_cutoffs(self.high_pass, self.low_pass, sample_rate).map_err(invalid)
    }
}

/// The frequency-domain band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FftBandConfig {
    pub kernel_length: f64,
    pub high_pass: f64,
    pub low_pass: f64,

    #[serde(default)]
    pub mode: FeatureMode,

    #[serde(default = "default_asd_scale")]
    pub asd_scale: f64,
}

fn default_asd_scale() -> f64 {
    DEFAULT_ASD_SCALE
}

impl FftBandConfig {
    pub fn window_size(&self, sample_rate: f64, fduration: f64) -> usize {
        ((self.kernel_length + fduration) * sample_rate).round() as usize
    }

    pub fn validate(&self, index: usize, sample_rate: f64) -> Result<(), BandError> {
        let invalid = |reason: String| BandError::InvalidBand { index, reason };

        if !(self.kernel_length > 0.0) {
            return Err(invalid(format!(
                "kernel length {} must be positive",
                self.kernel_length
            )));
        }
        if !(self.asd_scale > 0.0) {
            return Err(invalid(format!("asd scale {} must be positive", self.asd_scale)));
        }
        check_cutoffs(self.high_pass, self.low_pass, sample_rate).map_err(invalid)
    }
}

fn check_cutoffs(high_pass: f64, low_pass: f64, sample_rate: f64) -> Result<(), String> {
    let nyquist = sample_rate / 2.0;
    if !(high_pass >= 0.0 && high_pass <= nyquist) {
        return Err(format!("high pass {} outside [0, {}]", high_pass, nyquist));
    }
    if !(low_pass >= 0.0 && low_pass <= nyquist) {
        return Err(format!("low pass {} outside [0, {}]", low_pass, nyquist));
    }
    if high_pass >= low_pass {
        return Err(format!(
            "high pass {} must be below low pass {}",
            high_pass, low_pass
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_window_size() {
        let band = BandConfig::new(1024.0, 1.0, 16.0, 512.0);
        assert_eq!(band.window_size(2048.0, 1.0), 4096);
        assert!(band.validate(1, 2048.0).is_ok());
    }

    #[test]
    fn test_band_rejects_upsampling() {
        let band = BandConfig::new(4096.0, 1.0, 16.0, 512.0);
        assert!(matches!(
            band.validate(0, 2048.0),
            Err(BandError::InvalidBand { index: 0, .. })
        ));
    }

    #[test]
    fn test_band_rejects_inverted_cutoffs() {
        let band = BandConfig::new(1024.0, 1.0, 600.0, 512.0);
        assert!(band.validate(2, 2048.0).is_err());

        let beyond_nyquist = BandConfig::new(1024.0, 1.0, 16.0, 2000.0);
        assert!(beyond_nyquist.validate(2, 2048.0).is_err());
    }

    #[test]
    fn test_fft_band_defaults_from_json() {
        let json = r#"{"kernel_length": 1.0, "high_pass": 20.0, "low_pass": 500.0}"#;
        let band: FftBandConfig = serde_json::from_str(json).unwrap();

        assert_eq!(band.mode, FeatureMode::Complex);
        assert_eq!(band.asd_scale, DEFAULT_ASD_SCALE);
        assert!(band.validate(3, 2048.0).is_ok());
    }
}

// Band-limited resampling
// Sinc interpolation between integer sample rates on rubato, with an
// identity fast path when the rates already agree

use ndarray::{s, Array3, ArrayView3};
use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

use crate::signal::spectral::SpectralError;

const SINC_LEN: usize = 256;
const F_CUTOFF: f32 = 0.95;
const OVERSAMPLING_FACTOR: usize = 256;

/// Resampler selected for a (source, target) rate pair
#[derive(Debug, Clone, PartialEq)]
pub enum Resampler {
    /// Rates match, samples pass through untouched
    Identity,

    /// Windowed sinc interpolation
    Sinc(SincResampler),
}

impl Resampler {
    pub fn new(source_rate: f64, target_rate: f64) -> Result<Self, SpectralError> {
        let source = integral_rate(source_rate)?;
        let target = integral_rate(target_rate)?;
        if source == target {
            return Ok(Resampler::Identity);
        }
        Ok(Resampler::Sinc(SincResampler::new(source, target)))
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Resampler::Identity)
    }

    /// Output length for an input of `len` samples
    pub fn output_len(&self, len: usize) -> usize {
        match self {
            Resampler::Identity => len,
            Resampler::Sinc(sinc) => sinc.output_len(len),
        }
    }

    pub fn resample(&self, samples: &[f32]) -> Result<Vec<f32>, SpectralError> {
        match self {
            Resampler::Identity => Ok(samples.to_vec()),
            Resampler::Sinc(sinc) => {
                let lane = vec![samples.iter().map(|&v| v as f64).collect::<Vec<_>>()];
                let out = sinc.resample_lanes(&lane)?;
                Ok(out[0].iter().map(|&v| v as f32).collect())
            }
        }
    }

    /// Resample every lane of a (batch, channels, samples) block
    pub fn resample_batch(&self, x: ArrayView3<'_, f32>) -> Result<Array3<f32>, SpectralError> {
        let sinc = match self {
            Resampler::Identity => return Ok(x.to_owned()),
            Resampler::Sinc(sinc) => sinc,
        };

        let (batch, channels, len) = x.dim();
        let lanes: Vec<Vec<f64>> = x
            .outer_iter()
            .flat_map(|element| {
                element
                    .outer_iter()
                    .map(|lane| lane.iter().map(|&v| v as f64).collect())
                    .collect::<Vec<_>>()
            })
            .collect();
        let resampled = sinc.resample_lanes(&lanes)?;

        let mut out = Array3::<f32>::zeros((batch, channels, self.output_len(len)));
        for (i, lane) in resampled.into_iter().enumerate() {
            let (b, c) = (i / channels, i % channels);
            for (dst, src) in out.slice_mut(s![b, c, ..]).iter_mut().zip(lane) {
                *dst = src as f32;
            }
        }
        Ok(out)
    }
}

fn integral_rate(rate: f64) -> Result<u64, SpectralError> {
    if !(rate > 0.0) || rate.fract() != 0.0 {
        return Err(SpectralError::InvalidSampleRate(rate));
    }
    Ok(rate as u64)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

fn interpolation_parameters() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: F_CUTOFF,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: OVERSAMPLING_FACTOR,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Sinc resampler for a gcd-reduced `orig:new` rate ratio
///
/// Each call runs every lane through rubato as a single chunk, drops the
/// filter delay and pins the result to `ceil(len * new / orig)` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SincResampler {
    orig: usize,
    new: usize,
}

impl SincResampler {
    pub fn new(source_rate: u64, target_rate: u64) -> Self {
        let divisor = gcd(source_rate, target_rate);
        SincResampler {
            orig: (source_rate / divisor) as usize,
            new: (target_rate / divisor) as usize,
        }
    }

    /// Output over input rate
    pub fn ratio(&self) -> f64 {
        self.new as f64 / self.orig as f64
    }

    pub fn output_len(&self, len: usize) -> usize {
        (self.new * len).div_ceil(self.orig)
    }

    /// Resample equal-length lanes together
    pub fn resample_lanes(&self, lanes: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, SpectralError> {
        let len = lanes.first().map_or(0, Vec::len);
        if let Some(lane) = lanes.iter().find(|lane| lane.len() != len) {
            return Err(SpectralError::ShapeMismatch {
                expected: format!("{} samples per lane", len),
                actual: format!("{} samples", lane.len()),
            });
        }
        if len == 0 {
            return Ok(vec![Vec::new(); lanes.len()]);
        }

        let target = self.output_len(len);
        let mut resampler = SincFixedIn::<f64>::new(
            self.ratio(),
            1.0,
            interpolation_parameters(),
            len,
            lanes.len(),
        )?;
        let delay = resampler.output_delay();

        let mut out = resampler.process(lanes, None)?;
        // Flush the filter tail with silence until the delayed output covers the target
        while out[0].len() < delay + target {
            let tail = resampler.process_partial(None::<&[Vec<f64>]>, None)?;
            if tail[0].is_empty() {
                break;
            }
            for (lane, rest) in out.iter_mut().zip(tail) {
                lane.extend(rest);
            }
        }

        Ok(out
            .into_iter()
            .map(|mut lane| {
                lane.drain(..delay.min(lane.len()));
                lane.resize(target, 0.0);
                lane
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Whitener;
    use ndarray::Array3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn sine(rate: f64, freq: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / rate).sin() as f32)
            .collect()
    }

    fn rms(values: &[f32]) -> f64 {
        (values.iter().map(|&v| (v as f64).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
    }

    #[test]
    fn test_identity_for_equal_rates() {
        let resampler = Resampler::new(2048.0, 2048.0).unwrap();
        assert!(resampler.is_identity());

        let samples = sine(2048.0, 33.0, 512);
        let out = resampler.resample(&samples).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn test_identity_commutes_with_whitening() {
        let mut rng = StdRng::seed_from_u64(21);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let x = Array3::from_shape_fn((2, 2, 1024), |_| normal.sample(&mut rng) as f32);
        let psds = Array3::from_shape_fn((2, 2, 129), |(b, c, k)| {
            1e-3 * (1.0 + 0.1 * (b + c) as f64 + 0.01 * k as f64)
        });

        let whitener = Whitener::new(0.125, 2048.0, 20.0, 900.0);
        let resampler = Resampler::new(2048.0, 2048.0).unwrap();

        let resampled_first = whitener
            .whiten(resampler.resample_batch(x.view()).unwrap().view(), psds.view())
            .unwrap();
        let whitened_first = resampler
            .resample_batch(whitener.whiten(x.view(), psds.view()).unwrap().view())
            .unwrap();
        assert_eq!(resampled_first, whitened_first);
    }

    #[test]
    fn test_rejects_fractional_rate() {
        assert!(matches!(
            Resampler::new(2048.5, 1024.0),
            Err(SpectralError::InvalidSampleRate(_))
        ));
        assert!(Resampler::new(0.0, 1024.0).is_err());
    }

    #[test]
    fn test_output_lengths() {
        let down = Resampler::new(2048.0, 1024.0).unwrap();
        assert_eq!(down.output_len(2048), 1024);
        assert_eq!(down.output_len(2047), 1024);
        assert_eq!(down.resample(&vec![0.0; 2047]).unwrap().len(), 1024);

        let up = Resampler::new(1024.0, 2048.0).unwrap();
        assert_eq!(up.output_len(100), 200);
        assert_eq!(up.resample(&vec![0.0; 100]).unwrap().len(), 200);

        // 3:2 after reduction by the gcd
        let odd = Resampler::new(3072.0, 2048.0).unwrap();
        assert_eq!(odd.output_len(301), 201);
        assert_eq!(odd.resample(&vec![0.0; 301]).unwrap().len(), 201);
    }

    #[test]
    fn test_downsample_preserves_in_band_sine() {
        let resampler = Resampler::new(2048.0, 512.0).unwrap();
        let samples = sine(2048.0, 20.0, 4096);
        let out = resampler.resample(&samples).unwrap();
        let expected = sine(512.0, 20.0, 1024);
        assert_eq!(out.len(), 1024);

        // Ignore filter transients at both ends
        let interior = &out[64..960];
        let amplitude = rms(interior) * std::f64::consts::SQRT_2;
        assert!((amplitude - 1.0).abs() < 0.03, "amplitude {}", amplitude);

        // The filter delay is removed, so the tone stays in phase
        let correlation = interior
            .iter()
            .zip(&expected[64..960])
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum::<f64>()
            / (rms(interior) * rms(&expected[64..960]) * interior.len() as f64);
        assert!(correlation > 0.95, "correlation {}", correlation);
    }

    #[test]
    fn test_downsample_rejects_out_of_band_tone() {
        let resampler = Resampler::new(2048.0, 512.0).unwrap();
        let samples = sine(2048.0, 700.0, 4096);
        let out = resampler.resample(&samples).unwrap();

        let peak = out[64..960].iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!(peak < 0.05, "aliased peak {}", peak);
    }

    #[test]
    fn test_resample_batch_shapes() {
        let resampler = Resampler::new(2048.0, 1024.0).unwrap();
        let x = Array3::<f32>::ones((2, 3, 256));
        let out = resampler.resample_batch(x.view()).unwrap();
        assert_eq!(out.dim(), (2, 3, 128));

        let identity = Resampler::new(1024.0, 1024.0).unwrap();
        assert_eq!(identity.resample_batch(x.view()).unwrap(), x);
    }

    #[test]
    fn test_batch_lanes_resample_independently() {
        let resampler = Resampler::new(2048.0, 1024.0).unwrap();
        let tone = sine(2048.0, 50.0, 512);
        let x = Array3::from_shape_fn((2, 2, 512), |(b, c, i)| {
            if b == 1 && c == 0 {
                tone[i]
            } else {
                0.0
            }
        });

        let out = resampler.resample_batch(x.view()).unwrap();
        let single = resampler.resample(&tone).unwrap();
        for (a, b) in out.slice(s![1, 0, ..]).iter().zip(&single) {
            assert!((a - b).abs() < 1e-6);
        }
        assert!(out.slice(s![0, .., ..]).iter().all(|&v| v == 0.0));
        assert!(out.slice(s![1, 1, ..]).iter().all(|&v| v == 0.0));
    }
}

// Detector response projection
// Sky-location sampling, antenna patterns and SNR rescaling of injected
// transients against each element's noise PSD

use std::f64::consts::PI;
use std::fmt;

use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, ArrayView3};
use rand::Rng;

use crate::injection::InjectionError;
use crate::signal::spectral::{interpolate_linear, rfft, rfftfreq, SpectralError};

/// Source orientation relative to the detector network
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtrinsicParams {
    /// Declination (radians)
    pub dec: f64,

    /// Polarization angle (radians)
    pub psi: f64,

    /// Azimuthal sky angle (radians)
    pub phi: f64,
}

impl ExtrinsicParams {
    /// Isotropic sky position with uniform polarization
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let u: f64 = rng.gen_range(-1.0..1.0);
        ExtrinsicParams {
            dec: u.asin(),
            psi: rng.gen_range(0.0..PI),
            phi: rng.gen_range(0.0..2.0 * PI),
        }
    }

    pub fn sample_n<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<Self> {
        (0..count).map(|_| ExtrinsicParams::sample(rng)).collect()
    }
}

/// Maps source polarizations onto per-channel strain
pub trait ResponseModel: Send + Sync {
    fn num_channels(&self) -> usize;

    /// Returns (channels, samples)
    fn project(
        &self,
        params: &ExtrinsicParams,
        cross: ArrayView1<'_, f32>,
        plus: ArrayView1<'_, f32>,
    ) -> Array2<f32>;
}

/// Quadrupole antenna pattern of right-angle interferometers, one per
/// channel, rotated about the local vertical by `azimuths`
#[derive(Debug, Clone)]
pub struct AntennaResponse {
    azimuths: Vec<f64>,
}

impl AntennaResponse {
    pub fn new(azimuths: Vec<f64>) -> Self {
        AntennaResponse { azimuths }
    }

    /// `(F+, Fx)` for one channel
    pub fn pattern(&self, channel: usize, params: &ExtrinsicParams) -> (f64, f64) {
        let azimuth = self.azimuths[channel];
        let cos_dec = params.dec.cos();
        let a = 0.5 * (1.0 + cos_dec * cos_dec) * (2.0 * (params.phi + azimuth)).cos();
        let b = cos_dec * (2.0 * (params.phi + azimuth)).sin();
        let (sin_2psi, cos_2psi) = (2.0 * params.psi).sin_cos();

        let f_plus = a * cos_2psi - b * sin_2psi;
        let f_cross = a * sin_2psi + b * cos_2psi;
        (f_plus, f_cross)
    }
}

impl ResponseModel for AntennaResponse {
    fn num_channels(&self) -> usize {
        self.azimuths.len()
    }

    fn project(
        &self,
        params: &ExtrinsicParams,
        cross: ArrayView1<'_, f32>,
        plus: ArrayView1<'_, f32>,
    ) -> Array2<f32> {
        let mut responses = Array2::<f32>::zeros((self.num_channels(), cross.len()));
        for (c, mut row) in responses.outer_iter_mut().enumerate() {
            let (f_plus, f_cross) = self.pattern(c, params);
            for ((out, &h_cross), &h_plus) in row.iter_mut().zip(cross.iter()).zip(plus.iter()) {
                *out = (f_plus * h_plus as f64 + f_cross * h_cross as f64) as f32;
            }
        }
        responses
    }
}

/// Optimal SNR of one channel's response against its one-sided PSD
///
/// The PSD is linearly resized onto the response's rfft grid and only
/// bins with `high_pass <= f < low_pass` contribute.
pub fn compute_ifo_snr(
    response: &[f32],
    psd: &[f64],
    sample_rate: f64,
    high_pass: f64,
    low_pass: f64,
) -> Result<f64, SpectralError> {
    let n = response.len();
    if n == 0 {
        return Ok(0.0);
    }

    let samples: Vec<f64> = response.iter().map(|&v| v as f64).collect();
    let spectrum = rfft(&samples)?;
    let freqs = rfftfreq(n, sample_rate);
    let psd = interpolate_linear(psd, spectrum.len());
    let df = sample_rate / n as f64;

    let integrated: f64 = spectrum
        .iter()
        .zip(freqs.iter())
        .zip(psd.iter())
        .filter(|((_, &f), &p)| f >= high_pass && f < low_pass && p > 0.0)
        .map(|((x, _), &p)| (*x / sample_rate).norm_sqr() / p)
        .sum();

    Ok((4.0 * integrated * df).sqrt())
}

/// Quadrature sum of channel SNRs for (channels, samples) responses and
/// (channels, freqs) PSDs
pub fn compute_network_snr(
    responses: ArrayView2<'_, f32>,
    psds: ArrayView2<'_, f64>,
    sample_rate: f64,
    high_pass: f64,
    low_pass: f64,
) -> Result<f64, SpectralError> {
    let mut total = 0.0;
    for (response, psd) in responses.outer_iter().zip(psds.outer_iter()) {
        let response: Vec<f32> = response.iter().copied().collect();
        let psd: Vec<f64> = psd.iter().copied().collect();
        let snr = compute_ifo_snr(&response, &psd, sample_rate, high_pass, low_pass)?;
        total += snr * snr;
    }
    Ok(total.sqrt())
}

/// Projects polarizations with a response model and rescales each
/// element to a target network SNR
pub struct WaveformProjector {
    model: Box<dyn ResponseModel>,
    sample_rate: f64,
    high_pass: f64,
    low_pass: f64,
}

impl fmt::Debug for WaveformProjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaveformProjector")
            .field("channels", &self.model.num_channels())
            .field("sample_rate", &self.sample_rate)
            .field("high_pass", &self.high_pass)
            .field("low_pass", &self.low_pass)
            .finish()
    }
}

impl WaveformProjector {
    pub fn new(
        model: Box<dyn ResponseModel>,
        sample_rate: f64,
        high_pass: f64,
        low_pass: f64,
    ) -> Self {
        WaveformProjector {
            model,
            sample_rate,
            high_pass,
            low_pass,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.model.num_channels()
    }

    /// Project `cross`/`plus` (elements, samples) into
    /// (elements, channels, samples) responses at `target_snrs`
    ///
    /// `psds` is (elements, channels, freqs), one row per element.
    pub fn project(
        &self,
        params: &[ExtrinsicParams],
        cross: ArrayView2<'_, f32>,
        plus: ArrayView2<'_, f32>,
        psds: ArrayView3<'_, f64>,
        target_snrs: &[f64],
    ) -> Result<Array3<f32>, InjectionError> {
        let (elements, len) = cross.dim();
        let channels = self.num_channels();
        if params.len() != elements || target_snrs.len() != elements || psds.dim().0 != elements
        {
            return Err(InjectionError::PolarizationShape(format!(
                "{} waveforms, {} parameter sets, {} snrs, {} psds",
                elements,
                params.len(),
                target_snrs.len(),
                psds.dim().0
            )));
        }
        if psds.dim().1 != channels {
            return Err(InjectionError::ChannelMismatch {
                expected: channels,
                actual: psds.dim().1,
            });
        }

        let mut responses = Array3::<f32>::zeros((elements, channels, len));
        for i in 0..elements {
            let mut projected = self.model.project(&params[i], cross.row(i), plus.row(i));
            let snr = compute_network_snr(
                projected.view(),
                psds.slice(s![i, .., ..]),
                self.sample_rate,
                self.high_pass,
                self.low_pass,
            )?;
            if snr > 0.0 {
                let scale = (target_snrs[i] / snr) as f32;
                projected.mapv_inplace(|v| v * scale);
            }
            responses.slice_mut(s![i, .., ..]).assign(&projected);
        }

        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{welch, PsdAverage};
    use ndarray::Array1;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    fn chirp(len: usize, sample_rate: f64) -> (Array1<f32>, Array1<f32>) {
        let center = len as f64 * 0.75;
        let envelope = |i: usize| (-((i as f64 - center) / (0.05 * sample_rate)).powi(2)).exp();
        let phase = |i: usize| 2.0 * PI * 80.0 * (i as f64 - center) / sample_rate;
        let cross = Array1::from_shape_fn(len, |i| (envelope(i) * phase(i).sin() * 1e-21) as f32);
        let plus = Array1::from_shape_fn(len, |i| (envelope(i) * phase(i).cos() * 1e-21) as f32);
        (cross, plus)
    }

    #[test]
    fn test_sampled_params_ranges() {
        let mut rng = StdRng::seed_from_u64(10);
        for params in ExtrinsicParams::sample_n(500, &mut rng) {
            assert!(params.dec.abs() <= PI / 2.0);
            assert!((0.0..PI).contains(&params.psi));
            assert!((0.0..2.0 * PI).contains(&params.phi));
        }
    }

    #[test]
    fn test_antenna_pattern_overhead_source() {
        let response = AntennaResponse::new(vec![0.0, PI / 4.0]);
        let overhead = ExtrinsicParams {
            dec: 0.0,
            psi: 0.0,
            phi: 0.0,
        };

        // Rotating the detector by 45 degrees moves all sensitivity to cross
        let (plus_0, cross_0) = response.pattern(0, &overhead);
        let (plus_1, cross_1) = response.pattern(1, &overhead);
        assert!((plus_0 - 1.0).abs() < 1e-12);
        assert!(cross_0.abs() < 1e-12);
        assert!(plus_1.abs() < 1e-12);
        assert!((cross_1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_projector_hits_target_snr() {
        let sample_rate = 512.0;
        let len = 1024;
        let (cross, plus) = chirp(len, sample_rate);
        let cross = cross.insert_axis(ndarray::Axis(0));
        let plus = plus.insert_axis(ndarray::Axis(0));

        // Noise at a realistic strain scale, PSD from Welch
        let mut rng = StdRng::seed_from_u64(21);
        let sigma = 1e-22;
        let noise: Vec<Vec<f64>> = (0..2)
            .map(|_| {
                (0..8 * len)
                    .map(|_| {
                        let v: f64 = StandardNormal.sample(&mut rng);
                        v * sigma
                    })
                    .collect()
            })
            .collect();
        let mut psds = Array3::<f64>::zeros((1, 2, 257));
        for (c, channel) in noise.iter().enumerate() {
            let psd = welch(channel, sample_rate, 512, 256, PsdAverage::Median).unwrap();
            for (k, p) in psd.into_iter().enumerate() {
                psds[[0, c, k]] = p;
            }
        }

        let projector = WaveformProjector::new(
            Box::new(AntennaResponse::new(vec![0.0, PI / 3.0])),
            sample_rate,
            16.0,
            250.0,
        );
        let params = ExtrinsicParams::sample_n(1, &mut rng);
        let responses = projector
            .project(&params, cross.view(), plus.view(), psds.view(), &[12.0])
            .unwrap();
        assert_eq!(responses.dim(), (1, 2, len));

        // Inject on top of background and recover the SNR from the difference
        let mut injected = Array2::<f32>::zeros((2, len));
        let mut background = Array2::<f32>::zeros((2, len));
        for c in 0..2 {
            for t in 0..len {
                background[[c, t]] = noise[c][t] as f32;
                injected[[c, t]] = background[[c, t]] + responses[[0, c, t]];
            }
        }
        let difference = &injected - &background;
        let snr = compute_network_snr(
            difference.view(),
            psds.slice(s![0, .., ..]),
            sample_rate,
            16.0,
            250.0,
        )
        .unwrap();
        assert!((snr / 12.0 - 1.0).abs() < 0.05, "recovered snr {}", snr);
    }

    #[test]
    fn test_projector_channel_mismatch() {
        let projector = WaveformProjector::new(
            Box::new(AntennaResponse::new(vec![0.0, 1.0])),
            512.0,
            16.0,
            250.0,
        );
        let waveforms = Array2::<f32>::zeros((1, 64));
        let psds = Array3::<f64>::ones((1, 3, 33));
        let params = vec![ExtrinsicParams {
            dec: 0.0,
            psi: 0.0,
            phi: 0.0,
        }];

        let result = projector.project(&params, waveforms.view(), waveforms.view(), psds.view(), &[8.0]);
        assert!(matches!(result, Err(InjectionError::ChannelMismatch { .. })));
    }
}

// Waveform pools
// In-memory candidate transients for training (polarizations) and
// validation (already projected per channel)

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use rand::seq::index;
use rand::Rng;

use crate::injection::InjectionError;

/// Training candidates as cross/plus polarizations, (pool, samples) each
#[derive(Debug, Clone)]
pub struct WaveformPool {
    cross: Array2<f32>,
    plus: Array2<f32>,
    signal_time: usize,
}

/// Polarizations of a sampled subset of the pool
#[derive(Debug, Clone)]
pub struct SampledWaveforms {
    pub cross: Array2<f32>,
    pub plus: Array2<f32>,

    /// Pool index of every sampled row
    pub indices: Vec<usize>,
}

impl WaveformPool {
    /// `signal_time` is the event offset (samples) shared by every waveform
    pub fn new(
        cross: Array2<f32>,
        plus: Array2<f32>,
        signal_time: usize,
    ) -> Result<Self, InjectionError> {
        if cross.dim() != plus.dim() {
            return Err(InjectionError::PolarizationShape(format!(
                "cross {:?} vs plus {:?}",
                cross.dim(),
                plus.dim()
            )));
        }
        let len = cross.ncols();
        if signal_time >= len {
            return Err(InjectionError::SignalTimeOutOfRange { signal_time, len });
        }

        Ok(WaveformPool {
            cross,
            plus,
            signal_time,
        })
    }

    pub fn len(&self) -> usize {
        self.cross.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples per waveform
    pub fn waveform_len(&self) -> usize {
        self.cross.ncols()
    }

    pub fn signal_time(&self) -> usize {
        self.signal_time
    }

    pub fn cross(&self) -> ArrayView2<'_, f32> {
        self.cross.view()
    }

    pub fn plus(&self) -> ArrayView2<'_, f32> {
        self.plus.view()
    }

    /// Draw `count` distinct waveforms
    pub fn sample<R: Rng + ?Sized>(
        &self,
        count: usize,
        rng: &mut R,
    ) -> Result<SampledWaveforms, InjectionError> {
        if count > self.len() {
            return Err(InjectionError::InsufficientWaveforms {
                requested: count,
                available: self.len(),
            });
        }

        let indices = index::sample(rng, self.len(), count).into_vec();
        Ok(SampledWaveforms {
            cross: self.cross.select(Axis(0), &indices),
            plus: self.plus.select(Axis(0), &indices),
            indices,
        })
    }
}

/// Validation candidates projected onto each channel,
/// (pool, channels, samples)
#[derive(Debug, Clone)]
pub struct ValidationSignals {
    responses: Array3<f32>,
    signal_time: usize,
}

impl ValidationSignals {
    pub fn new(responses: Array3<f32>, signal_time: usize) -> Result<Self, InjectionError> {
        let len = responses.dim().2;
        if signal_time >= len {
            return Err(InjectionError::SignalTimeOutOfRange { signal_time, len });
        }
        Ok(ValidationSignals {
            responses,
            signal_time,
        })
    }

    pub fn len(&self) -> usize {
        self.responses.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_channels(&self) -> usize {
        self.responses.dim().1
    }

    pub fn signal_time(&self) -> usize {
        self.signal_time
    }

    pub fn responses(&self) -> ArrayView3<'_, f32> {
        self.responses.view()
    }

    /// Validation events must sit at the same offset as training events
    pub fn check_signal_time(&self, training_signal_time: usize) -> Result<(), InjectionError> {
        if self.signal_time != training_signal_time {
            return Err(InjectionError::SignalTimeMismatch {
                training: training_signal_time,
                validation: self.signal_time,
            });
        }
        Ok(())
    }
}

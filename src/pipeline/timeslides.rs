// Timeslides
// Channel-wise time shifts of validation background so that no real
// coincident event survives, and the schedule of shifts to cover a livetime

use log::info;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::sampling::{num_windows, SamplingError};
use crate::signal::Segment;

/// Shift of `shift` seconds per channel index
///
/// Channel `k` is advanced by `k * shift`; the zero-lag slide leaves the
/// segment untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timeslide {
    shift: f64,
}

impl Timeslide {
    pub fn new(shift: f64) -> Result<Self, SamplingError> {
        let slide = Timeslide { shift };
        slide.check()?;
        Ok(slide)
    }

    pub fn zero_lag() -> Self {
        Timeslide { shift: 0.0 }
    }

    /// Shift between neighbouring channels in seconds
    pub fn shift(&self) -> f64 {
        self.shift
    }

    fn check(&self) -> Result<(), SamplingError> {
        if !self.shift.is_finite() || self.shift < 0.0 {
            return Err(SamplingError::InvalidShift(self.shift));
        }
        Ok(())
    }

    pub fn shift_size(&self, sample_rate: f64) -> usize {
        (self.shift * sample_rate).round() as usize
    }

    /// Length of a segment of `len` samples once shifted
    pub fn shifted_len(&self, len: usize, num_channels: usize, sample_rate: f64) -> usize {
        let total = self.shift_size(sample_rate) * num_channels.saturating_sub(1);
        len.saturating_sub(total)
    }

    pub fn apply(&self, segment: &Segment) -> Result<Segment, SamplingError> {
        // Deserialized slides skip `new`
        self.check()?;
        let shift = self.shift_size(segment.sample_rate);
        let channels = segment.num_channels();
        let len = self.shifted_len(segment.len(), channels, segment.sample_rate);
        if len == 0 {
            return Err(SamplingError::BufferTooShort {
                len: segment.len(),
                required: shift * channels.saturating_sub(1) + 1,
            });
        }

        let data = Array2::from_shape_fn((channels, len), |(k, t)| segment.data[[k, k * shift + t]]);

        Ok(Segment {
            data,
            sample_rate: segment.sample_rate,
        })
    }

    /// Shifts `shift_step, 2 * shift_step, ...` until the unfolded windows
    /// cover `livetime` seconds or the segment cannot hold another window
    pub fn schedule(
        segment_len: usize,
        num_channels: usize,
        sample_rate: f64,
        sample_size: usize,
        stride_size: usize,
        shift_step: f64,
        livetime: f64,
    ) -> Vec<Timeslide> {
        let mut slides = Vec::new();
        let mut covered = 0.0;
        let mut step = 1;

        while covered < livetime && shift_step > 0.0 && shift_step.is_finite() {
            let slide = Timeslide {
                shift: step as f64 * shift_step,
            };
            let len = slide.shifted_len(segment_len, num_channels, sample_rate);
            let windows = num_windows(len, sample_size, stride_size);
            if windows == 0 {
                break;
            }

            covered += (windows * stride_size) as f64 / sample_rate;
            slides.push(slide);
            step += 1;
        }

        info!(
            "Scheduled {} timeslides covering {:.1} s of livetime",
            slides.len(),
            covered
        );
        slides
    }
}

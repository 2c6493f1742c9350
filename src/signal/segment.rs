// Multichannel segments
// A (channels, samples) block of sensor data at a fixed sample rate

use ndarray::{Array2, ArrayView1, Axis};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("Channels have mismatched lengths: {0:?}")]
    RaggedChannels(Vec<usize>),

    #[error("Segment has no channels")]
    NoChannels,

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),
}

#[derive(Debug, Clone)]
pub struct Segment {
    /// Samples shaped (channels, samples)
    pub data: Array2<f32>,

    /// Sample rate in Hz
    pub sample_rate: f64,
}

impl Segment {
    /// Wrap an existing (channels, samples) array
    pub fn new(data: Array2<f32>, sample_rate: f64) -> Result<Self, SegmentError> {
        if !(sample_rate > 0.0) {
            return Err(SegmentError::InvalidSampleRate(sample_rate));
        }
        if data.nrows() == 0 {
            return Err(SegmentError::NoChannels);
        }
        Ok(Segment { data, sample_rate })
    }

    /// Build a segment from one sample vector per channel
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: f64) -> Result<Self, SegmentError> {
        if channels.is_empty() {
            return Err(SegmentError::NoChannels);
        }

        let lengths: Vec<usize> = channels.iter().map(|c| c.len()).collect();
        let len = lengths[0];
        if lengths.iter().any(|&l| l != len) {
            return Err(SegmentError::RaggedChannels(lengths));
        }

        let num_channels = channels.len();
        let flat: Vec<f32> = channels.into_iter().flatten().collect();
        let data = Array2::from_shape_vec((num_channels, len), flat)
            .map_err(|_| SegmentError::RaggedChannels(lengths))?;

        Segment::new(data, sample_rate)
    }

    pub fn num_channels(&self) -> usize {
        self.data.nrows()
    }

    /// Number of samples per channel
    pub fn len(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / self.sample_rate
    }

    pub fn channel(&self, index: usize) -> ArrayView1<'_, f32> {
        self.data.index_axis(Axis(0), index)
    }
}

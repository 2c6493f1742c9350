// Kernel sampling
// Start-index bounds that keep the event inside every band's look-back,
// random kernel draws for training and deterministic sweeps for validation

use ndarray::{s, Array2, Array3, ArrayView3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::sampling::SamplingError;

/// Margins applied around the event when placing kernels, in samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelPolicy {
    /// Extra clearance kept at both ends of the range
    pub offset: usize,

    /// Shortest look-back that must still contain the event
    pub min_kernel_size: usize,

    /// Whitening filter length; half of it is cropped from each edge
    pub filter_size: usize,

    /// One start per element instead of one per (element, channel)
    pub coincident: bool,
}

/// Valid kernel start indices `[min_start, max_start]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingRange {
    pub min_start: usize,
    pub max_start: usize,
}

impl SamplingRange {
    /// Number of starts available to a half-open random draw
    pub fn width(&self) -> usize {
        self.max_start - self.min_start
    }
}

/// Kernels cut from a batch of responses with the start index of each
#[derive(Debug, Clone)]
pub struct SampledKernels {
    /// (batch, channels, kernel_size)
    pub kernels: Array3<f32>,

    /// (batch, channels) start indices
    pub starts: Array2<usize>,
}

/// Compute the start-index range for kernels of `kernel_size` samples
/// around an event at `signal_time` in a buffer of `buffer_len` samples
pub fn sampling_range(
    buffer_len: usize,
    signal_time: usize,
    kernel_size: usize,
    policy: &KernelPolicy,
) -> Result<SamplingRange, SamplingError> {
    let base = signal_time as i64 - kernel_size as i64 + (policy.filter_size / 2) as i64;
    let min_start = base + policy.offset as i64;
    let max_start = base + policy.min_kernel_size as i64 - policy.offset as i64;

    if min_start < 0 {
        return Err(SamplingError::NegativeStart { min_start });
    }
    if max_start > buffer_len as i64 {
        return Err(SamplingError::MaxOverrun {
            max_start,
            buffer_len,
        });
    }
    if min_start > max_start {
        return Err(SamplingError::EmptyRange {
            min_start,
            max_start,
        });
    }

    Ok(SamplingRange {
        min_start: min_start as usize,
        max_start: max_start as usize,
    })
}

/// Draw one kernel per element of `responses` (batch, channels, samples)
///
/// Starts are uniform in `[min_start, max_start)`.
pub fn sample_kernels<R: Rng + ?Sized>(
    responses: ArrayView3<'_, f32>,
    kernel_size: usize,
    signal_time: usize,
    policy: &KernelPolicy,
    rng: &mut R,
) -> Result<SampledKernels, SamplingError> {
    let (batch, channels, len) = responses.dim();
    if len < kernel_size {
        return Err(SamplingError::BufferTooShort {
            len,
            required: kernel_size,
        });
    }

    let range = sampling_range(len, signal_time, kernel_size, policy)?;
    if range.width() == 0 {
        return Err(SamplingError::EmptyRange {
            min_start: range.min_start as i64,
            max_start: range.max_start as i64,
        });
    }
    let last_end = range.max_start - 1 + kernel_size;
    if last_end > len {
        return Err(SamplingError::KernelOverrun {
            end: last_end,
            buffer_len: len,
        });
    }

    let mut starts = Array2::<usize>::zeros((batch, channels));
    for b in 0..batch {
        if policy.coincident {
            let start = rng.gen_range(range.min_start..range.max_start);
            starts.row_mut(b).fill(start);
        } else {
            for c in 0..channels {
                starts[[b, c]] = rng.gen_range(range.min_start..range.max_start);
            }
        }
    }

    let mut kernels = Array3::<f32>::zeros((batch, channels, kernel_size));
    for b in 0..batch {
        for c in 0..channels {
            let start = starts[[b, c]];
            kernels
                .slice_mut(s![b, c, ..])
                .assign(&responses.slice(s![b, c, start..start + kernel_size]));
        }
    }

    Ok(SampledKernels { kernels, starts })
}

/// Evenly spaced starts covering the range inclusively
///
/// A single view is placed at `max_start`.
pub fn sweep_offsets(range: &SamplingRange, num_views: usize) -> Vec<usize> {
    match num_views {
        0 => Vec::new(),
        1 => vec![range.max_start],
        _ => {
            let span = range.width() as f64;
            let steps = (num_views - 1) as f64;
            (0..num_views)
                .map(|i| range.min_start + (i as f64 * span / steps).round() as usize)
                .collect()
        }
    }
}

/// Cut `kernel_size` samples starting at `start` from every lane,
/// zero-filling whatever runs past the end of the buffer
pub fn slice_view(signals: ArrayView3<'_, f32>, start: usize, kernel_size: usize) -> Array3<f32> {
    let (batch, channels, len) = signals.dim();
    let mut view = Array3::<f32>::zeros((batch, channels, kernel_size));

    let stop = (start + kernel_size).min(len);
    if start < stop {
        view.slice_mut(s![.., .., ..stop - start])
            .assign(&signals.slice(s![.., .., start..stop]));
    }

    view
}

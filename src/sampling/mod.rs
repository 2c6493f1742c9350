// Sampling module
// Kernel placement around events and window unfolding of background

pub mod kernels;
pub mod unfold;

use thiserror::Error;

pub use kernels::{
    sample_kernels, sampling_range, slice_view, sweep_offsets, KernelPolicy, SampledKernels,
    SamplingRange,
};
pub use unfold::{num_windows, unfold_windows};

#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("Earliest kernel start {min_start} is negative")]
    NegativeStart { min_start: i64 },

    #[error("Latest kernel start {max_start} exceeds buffer length {buffer_len}")]
    MaxOverrun { max_start: i64, buffer_len: usize },

    #[error("Empty sampling range [{min_start}, {max_start}]")]
    EmptyRange { min_start: i64, max_start: i64 },

    #[error("Last kernel would end at {end}, past buffer length {buffer_len}")]
    KernelOverrun { end: usize, buffer_len: usize },

    #[error("Buffer of {len} samples is shorter than the required {required}")]
    BufferTooShort { len: usize, required: usize },

    #[error("Invalid window size {size} or stride {stride}")]
    InvalidStride { size: usize, stride: usize },

    #[error("Timeslide shift {0} s must be finite and non-negative")]
    InvalidShift(f64),
}

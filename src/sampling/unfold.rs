// Window unfolding
// Strided overlapping windows over a multichannel segment

use ndarray::{s, Array3, ArrayView2};

use crate::sampling::SamplingError;

/// Number of full windows of `size` samples at `stride` in `len` samples
pub fn num_windows(len: usize, size: usize, stride: usize) -> usize {
    if stride == 0 || len < size {
        return 0;
    }
    (len - size) / stride + 1
}

/// Unfold (channels, samples) into (windows, channels, size)
///
/// Samples past the last full window are dropped.
pub fn unfold_windows(
    x: ArrayView2<'_, f32>,
    size: usize,
    stride: usize,
) -> Result<Array3<f32>, SamplingError> {
    if stride == 0 || size == 0 {
        return Err(SamplingError::InvalidStride { size, stride });
    }

    let (channels, len) = x.dim();
    if len < size {
        return Err(SamplingError::BufferTooShort {
            len,
            required: size,
        });
    }

    let count = num_windows(len, size, stride);
    let mut windows = Array3::<f32>::zeros((count, channels, size));
    for i in 0..count {
        let start = i * stride;
        windows
            .slice_mut(s![i, .., ..])
            .assign(&x.slice(s![.., start..start + size]));
    }

    Ok(windows)
}

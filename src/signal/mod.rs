// Signal processing module
// PSD estimation, whitening and resampling of multichannel sensor data

pub mod psd;
pub mod resample;
pub mod segment;
pub mod spectral;
pub mod whiten;

pub use psd::{welch, PsdAverage, PsdEstimator, SpectralDensity};
pub use resample::{Resampler, SincResampler};
pub use segment::{Segment, SegmentError};
pub use spectral::SpectralError;
pub use whiten::Whitener;

// Feature extraction module
// Frequency-domain views of whitened windows

pub mod frequency;

pub use frequency::{FeatureMode, FrequencyFeatureExtractor};

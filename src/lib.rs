// Multiband Staging - Multi-band batch staging for transient detection
// Module declarations and public surface

pub mod bands;
pub mod features;
pub mod injection;
pub mod pipeline;
pub mod sampling;
pub mod signal;

pub use bands::{BandBank, BandConfig, BandError, FftBandConfig, TemplateTable};
pub use features::{FeatureMode, FrequencyFeatureExtractor};
pub use injection::{
    AntennaResponse, InjectionError, ResponseModel, SnrDistribution, ValidationSignals,
    WaveformPool,
};
pub use pipeline::{
    Augmentor, StagingConfig, StagingError, StagingResult, Timeslide, TrainingBatch,
    ValidationBatch, ValidationBuilder,
};
pub use sampling::{KernelPolicy, SamplingError};
pub use signal::{Segment, SpectralError};

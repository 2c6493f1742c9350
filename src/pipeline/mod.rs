// Pipeline module
// Configuration, training augmentation and validation staging

pub mod augment;
pub mod config;
pub mod timeslides;
pub mod validation;

use thiserror::Error;

use crate::bands::BandError;
use crate::injection::InjectionError;
use crate::sampling::SamplingError;
use crate::signal::{SegmentError, SpectralError};

pub use augment::{Augmentor, TrainingBatch};
pub use config::{ConfigError, SamplerConfig, StagingConfig};
pub use timeslides::Timeslide;
pub use validation::{ValidationBatch, ValidationBuilder};

/// Any failure while staging a batch
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Spectral error: {0}")]
    Spectral(#[from] SpectralError),

    #[error("Segment error: {0}")]
    Segment(#[from] SegmentError),

    #[error("Sampling error: {0}")]
    Sampling(#[from] SamplingError),

    #[error("Band error: {0}")]
    Band(#[from] BandError),

    #[error("Injection error: {0}")]
    Injection(#[from] InjectionError),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub type StagingResult<T> = Result<T, StagingError>;

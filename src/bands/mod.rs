// Band module
// Band configuration, alignment templates and the per-band transform bank

pub mod bank;
pub mod config;
pub mod templates;

use thiserror::Error;

use crate::signal::SpectralError;

pub use bank::{BandBank, BandTransform, FftBand};
pub use config::{BandConfig, FftBandConfig, DEFAULT_ASD_SCALE};
pub use templates::TemplateTable;

#[derive(Debug, Error)]
pub enum BandError {
    #[error("Invalid band {index}: {reason}")]
    InvalidBand { index: usize, reason: String },

    #[error("Invalid inference sampling rates: {0}")]
    InvalidRates(String),

    #[error("{aux_bands} auxiliary bands configured but {ratios} rate ratios given")]
    BandCountMismatch { aux_bands: usize, ratios: usize },

    #[error("Template places band {band} at sample {start}, before the start of the buffer")]
    InfeasibleTemplate { band: usize, start: i64 },

    #[error("Band {band} needs {required} samples but the buffer holds {available}")]
    BufferTooShort {
        band: usize,
        required: usize,
        available: usize,
    },

    #[error("Expected {expected} alignments, got {actual}")]
    AlignmentCount { expected: usize, actual: usize },

    #[error("Unknown template index {0}")]
    UnknownTemplate(usize),

    #[error("Spectral error: {0}")]
    Spectral(#[from] SpectralError),
}

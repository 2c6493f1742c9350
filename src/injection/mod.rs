// Injection module
// Candidate waveform pools, detector projection, SNR targets and the
// augmentations applied around injection

pub mod augmentations;
pub mod projector;
pub mod snr;
pub mod waveforms;

use thiserror::Error;

use crate::signal::SpectralError;

pub use augmentations::{ChannelMuter, ChannelSwapper, SignalInverter, SignalReverser};
pub use projector::{
    compute_ifo_snr, compute_network_snr, AntennaResponse, ExtrinsicParams, ResponseModel,
    WaveformProjector,
};
pub use snr::SnrDistribution;
pub use waveforms::{SampledWaveforms, ValidationSignals, WaveformPool};

#[derive(Debug, Error)]
pub enum InjectionError {
    #[error("Requested {requested} waveforms but the pool only holds {available}")]
    InsufficientWaveforms { requested: usize, available: usize },

    #[error("Training and validation waveforms have different signal times: {training} vs {validation}")]
    SignalTimeMismatch { training: usize, validation: usize },

    #[error("Expected {expected} channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("Polarization shapes disagree: {0}")]
    PolarizationShape(String),

    #[error("Signal time {signal_time} outside waveforms of {len} samples")]
    SignalTimeOutOfRange { signal_time: usize, len: usize },

    #[error("Invalid SNR distribution: {0}")]
    InvalidDistribution(String),

    #[error("Spectral error: {0}")]
    Spectral(#[from] SpectralError),
}

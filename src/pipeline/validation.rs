// Validation batch builder
// Unfolds timeslid background into windows and pairs them with
// pre-projected signals swept across the kernel at fixed offsets

use log::{debug, warn};
use ndarray::{concatenate, s, Array3, ArrayView3, Axis};
use rand::Rng;

use crate::bands::BandBank;
use crate::injection::{InjectionError, ValidationSignals};
use crate::pipeline::config::StagingConfig;
use crate::pipeline::timeslides::Timeslide;
use crate::pipeline::StagingResult;
use crate::sampling::{sampling_range, slice_view, sweep_offsets, unfold_windows, KernelPolicy};
use crate::signal::{PsdEstimator, Segment};

/// Background and injected views of one timeslide
#[derive(Debug, Clone)]
pub struct ValidationBatch {
    pub shift: Timeslide,

    /// Template index per window, shared by background and every view
    pub alignments: Vec<usize>,

    /// Per band, (windows, ...)
    pub background: Vec<Array3<f32>>,

    /// Per band, (num_views * windows, ...) with view `v` of window `w`
    /// at `v * windows + w`
    pub foreground: Vec<Array3<f32>>,

    pub num_views: usize,
    pub num_windows: usize,
}

impl ValidationBatch {
    /// Foreground rows of view `view` for band `band`
    pub fn view(&self, band: usize, view: usize) -> ArrayView3<'_, f32> {
        let start = view * self.num_windows;
        self.foreground[band].slice(s![start..start + self.num_windows, .., ..])
    }
}

#[derive(Debug)]
pub struct ValidationBuilder {
    config: StagingConfig,
    training_signal_time: usize,
    estimator: PsdEstimator,
    bank: BandBank,
    policy: KernelPolicy,
}

impl ValidationBuilder {
    /// `training_signal_time` is the event offset of the training pool;
    /// validation signals must share it
    pub fn new(config: StagingConfig, training_signal_time: usize) -> StagingResult<Self> {
        config.validate()?;

        Ok(ValidationBuilder {
            estimator: config.psd_estimator()?,
            bank: config.band_bank()?,
            policy: config.kernel_policy(),
            training_signal_time,
            config,
        })
    }

    pub fn config(&self) -> &StagingConfig {
        &self.config
    }

    pub fn bank(&self) -> &BandBank {
        &self.bank
    }

    /// Stage one timeslide of validation background with its injected views
    pub fn build<R: Rng + ?Sized>(
        &self,
        background: &Segment,
        signals: &ValidationSignals,
        timeslide: &Timeslide,
        rng: &mut R,
    ) -> StagingResult<ValidationBatch> {
        signals.check_signal_time(self.training_signal_time)?;
        if signals.num_channels() != background.num_channels() {
            return Err(InjectionError::ChannelMismatch {
                expected: background.num_channels(),
                actual: signals.num_channels(),
            }
            .into());
        }
        if signals.is_empty() {
            return Err(InjectionError::InsufficientWaveforms {
                requested: 1,
                available: 0,
            }
            .into());
        }

        let shifted = timeslide.apply(background)?;
        let unfolded = unfold_windows(
            shifted.data.view(),
            self.config.sample_size(),
            self.config.stride_size(),
        )?;

        let available = unfolded.dim().0;
        let (selected, num_signals) = if available < signals.len() {
            warn!(
                "Only {} background windows for {} validation signals, dropping {} signals",
                available,
                signals.len(),
                signals.len() - available
            );
            ((0..available).collect::<Vec<_>>(), available)
        } else {
            let step = available / signals.len();
            let selected = (0..signals.len()).map(|i| i * step).collect::<Vec<_>>();
            (selected, signals.len())
        };

        let (windows, psds) = self
            .estimator
            .estimate(unfolded.select(Axis(0), &selected).view())?;

        let responses = signals.responses();
        let paired = responses.slice(s![..num_signals, .., ..]);
        let kernel_size = self.estimator.window_size();
        let range = sampling_range(
            paired.dim().2,
            signals.signal_time(),
            kernel_size,
            &self.policy,
        )?;
        let offsets = sweep_offsets(&range, self.config.num_valid_views);

        let alignments = self.bank.templates().choose(rng, num_signals);
        let background_bands = self.bank.process(windows.view(), psds.view(), &alignments)?;

        let mut views: Vec<Vec<Array3<f32>>> = vec![Vec::new(); self.bank.num_outputs()];
        for &offset in &offsets {
            let injected = &windows + &slice_view(paired, offset, kernel_size);
            let bands = self.bank.process(injected.view(), psds.view(), &alignments)?;
            for (band, output) in bands.into_iter().enumerate() {
                views[band].push(output);
            }
        }

        let foreground = views
            .iter()
            .map(|band| {
                let parts: Vec<_> = band.iter().map(|v| v.view()).collect();
                concatenate(Axis(0), &parts)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let staged = ValidationBatch {
            shift: *timeslide,
            alignments,
            background: background_bands,
            foreground,
            num_views: offsets.len(),
            num_windows: num_signals,
        };

        debug!(
            "Staged validation batch at shift {:.3} s: {} windows x {} views",
            timeslide.shift(),
            staged.num_windows,
            staged.num_views
        );
        Ok(staged)
    }
}

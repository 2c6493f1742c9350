// Band alignment templates
// Enumerates every placement of the auxiliary band windows inside the
// primary buffer that is consistent with the inference sampling rates

use std::ops::Range;

use log::info;
use rand::Rng;

use crate::bands::{BandConfig, BandError};

/// Read-only table of auxiliary band slices, one row per alignment
#[derive(Debug, Clone)]
pub struct TemplateTable {
    ratios: Vec<usize>,
    alignments: Vec<Vec<usize>>,
    slices: Vec<Vec<Range<usize>>>,
}

impl TemplateTable {
    /// Build the table for a primary buffer of `buffer_len` samples
    ///
    /// `inference_sampling_rates` must hold one more rate than there are
    /// auxiliary bands. Consecutive rate ratios are floored; alignment
    /// `a_k` delays auxiliary band `k + 1` by a further
    /// `(a_k + 1) / rate_k` seconds on top of the bands before it.
    pub fn new(
        inference_sampling_rates: &[f64],
        aux_bands: &[BandConfig],
        fduration: f64,
        sample_rate: f64,
        buffer_len: usize,
    ) -> Result<Self, BandError> {
        if inference_sampling_rates.is_empty() {
            return Err(BandError::InvalidRates(
                "at least one inference sampling rate is required".to_string(),
            ));
        }
        if let Some(rate) = inference_sampling_rates.iter().find(|r| !(**r > 0.0)) {
            return Err(BandError::InvalidRates(format!(
                "inference sampling rate {} must be positive",
                rate
            )));
        }

        let ratios: Vec<usize> = inference_sampling_rates
            .windows(2)
            .map(|pair| (pair[0] / pair[1]).floor() as usize)
            .collect();
        if ratios.len() != aux_bands.len() {
            return Err(BandError::BandCountMismatch {
                aux_bands: aux_bands.len(),
                ratios: ratios.len(),
            });
        }
        if let Some(position) = ratios.iter().position(|&r| r == 0) {
            return Err(BandError::InvalidRates(format!(
                "rate {} is lower than the following rate {}",
                inference_sampling_rates[position],
                inference_sampling_rates[position + 1]
            )));
        }

        let alignments = enumerate_alignments(&ratios);
        let mut slices = Vec::with_capacity(alignments.len());
        for alignment in &alignments {
            let mut row = Vec::with_capacity(aux_bands.len());
            let mut cumulative = 0.0;
            for (k, (&a, band)) in alignment.iter().zip(aux_bands).enumerate() {
                cumulative += (a + 1) as f64 / inference_sampling_rates[k] * sample_rate;
                let stop = buffer_len as i64 - cumulative.round() as i64;
                let start = stop - band.window_size(sample_rate, fduration) as i64;
                if start < 0 {
                    return Err(BandError::InfeasibleTemplate { band: k + 1, start });
                }
                row.push(start as usize..stop as usize);
            }
            slices.push(row);
        }

        info!(
            "Built {} band alignment templates for ratios {:?}",
            slices.len(),
            ratios
        );

        Ok(TemplateTable {
            ratios,
            alignments,
            slices,
        })
    }

    pub fn ratios(&self) -> &[usize] {
        &self.ratios
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Per-band alignment indices of one template
    pub fn alignment(&self, index: usize) -> Option<&[usize]> {
        self.alignments.get(index).map(|a| a.as_slice())
    }

    /// Primary buffer slices of one template, one per auxiliary band
    pub fn get(&self, index: usize) -> Option<&[Range<usize>]> {
        self.slices.get(index).map(|s| s.as_slice())
    }

    /// Draw `n` template indices uniformly with replacement
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<usize> {
        (0..n).map(|_| rng.gen_range(0..self.len())).collect()
    }
}

/// Cartesian product of `[0, ratio)` ranges, last index fastest
fn enumerate_alignments(ratios: &[usize]) -> Vec<Vec<usize>> {
    let total: usize = ratios.iter().product();
    let mut alignments = Vec::with_capacity(total);
    let mut current = vec![0usize; ratios.len()];

    for _ in 0..total {
        alignments.push(current.clone());
        for k in (0..ratios.len()).rev() {
            current[k] += 1;
            if current[k] < ratios[k] {
                break;
            }
            current[k] = 0;
        }
    }

    alignments
}

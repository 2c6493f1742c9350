// Target SNR distributions
// Per-injection signal-to-noise ratios drawn before rescaling responses

use rand::Rng;
use rand_distr::{Distribution, LogNormal};
use serde::{Deserialize, Serialize};

use crate::injection::InjectionError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnrDistribution {
    Fixed {
        value: f64,
    },

    Uniform {
        low: f64,
        high: f64,
    },

    /// Density proportional to `snr^index` on `[minimum, maximum]`
    PowerLaw {
        minimum: f64,
        maximum: f64,
        index: f64,
    },

    /// Log-normal with the given mean and standard deviation of the SNR
    /// itself, floored at `minimum`
    LogNormal {
        mean: f64,
        std: f64,
        #[serde(default)]
        minimum: f64,
    },
}

impl Default for SnrDistribution {
    fn default() -> Self {
        SnrDistribution::PowerLaw {
            minimum: 4.0,
            maximum: 100.0,
            index: -3.0,
        }
    }
}

impl SnrDistribution {
    pub fn validate(&self) -> Result<(), InjectionError> {
        let invalid = |reason: String| Err(InjectionError::InvalidDistribution(reason));
        match *self {
            SnrDistribution::Fixed { value } if !(value > 0.0) => {
                invalid(format!("fixed snr {} must be positive", value))
            }
            SnrDistribution::Uniform { low, high } if !(low > 0.0 && low < high) => {
                invalid(format!("uniform bounds [{}, {}) are not increasing and positive", low, high))
            }
            SnrDistribution::PowerLaw { minimum, maximum, .. }
                if !(minimum > 0.0 && minimum < maximum) =>
            {
                invalid(format!(
                    "power law bounds [{}, {}] are not increasing and positive",
                    minimum, maximum
                ))
            }
            SnrDistribution::LogNormal { mean, std, .. } if !(mean > 0.0 && std > 0.0) => {
                invalid(format!("log normal mean {} and std {} must be positive", mean, std))
            }
            _ => Ok(()),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            SnrDistribution::Fixed { value } => value,
            SnrDistribution::Uniform { low, high } => rng.gen_range(low..high),
            SnrDistribution::PowerLaw {
                minimum,
                maximum,
                index,
            } => {
                // Inverse CDF
                let u: f64 = rng.gen();
                if (index + 1.0).abs() < 1e-12 {
                    minimum * (maximum / minimum).powf(u)
                } else {
                    let exponent = index + 1.0;
                    let low = minimum.powf(exponent);
                    let high = maximum.powf(exponent);
                    (low + u * (high - low)).powf(1.0 / exponent)
                }
            }
            SnrDistribution::LogNormal { mean, std, minimum } => {
                let sigma = (1.0 + (std / mean).powi(2)).ln().sqrt();
                let mu = mean.ln() - sigma * sigma / 2.0;
                match LogNormal::new(mu, sigma) {
                    Ok(distribution) => distribution.sample(rng).max(minimum),
                    Err(_) => mean.max(minimum),
                }
            }
        }
    }

    pub fn sample_n<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<f64> {
        (0..count).map(|_| self.sample(rng)).collect()
    }
}

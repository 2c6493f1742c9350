// Batch augmentations
// Polarity inversion and time reversal of background, plus channel
// swapping and muting of injected responses to build hard negatives

use ndarray::{s, Array1, Array3};
use rand::seq::index;
use rand::Rng;

/// Flips the sign of each (element, channel) lane with probability `prob`
#[derive(Debug, Clone, Copy)]
pub struct SignalInverter {
    prob: f64,
}

impl SignalInverter {
    pub fn new(prob: f64) -> Self {
        SignalInverter { prob }
    }

    /// Returns the (element, channel) lanes that were inverted
    pub fn apply<R: Rng + ?Sized>(&self, x: &mut Array3<f32>, rng: &mut R) -> Vec<(usize, usize)> {
        let (batch, channels, _) = x.dim();
        let mut flipped = Vec::new();
        for b in 0..batch {
            for c in 0..channels {
                if rng.gen::<f64>() < self.prob {
                    x.slice_mut(s![b, c, ..]).mapv_inplace(|v| -v);
                    flipped.push((b, c));
                }
            }
        }
        flipped
    }
}

/// Reverses each (element, channel) lane in time with probability `prob`
#[derive(Debug, Clone, Copy)]
pub struct SignalReverser {
    prob: f64,
}

impl SignalReverser {
    pub fn new(prob: f64) -> Self {
        SignalReverser { prob }
    }

    pub fn apply<R: Rng + ?Sized>(&self, x: &mut Array3<f32>, rng: &mut R) -> Vec<(usize, usize)> {
        let (batch, channels, _) = x.dim();
        let mut reversed = Vec::new();
        for b in 0..batch {
            for c in 0..channels {
                if rng.gen::<f64>() < self.prob {
                    let lane: Array1<f32> = x.slice(s![b, c, ..;-1]).to_owned();
                    x.slice_mut(s![b, c, ..]).assign(&lane);
                    reversed.push((b, c));
                }
            }
        }
        reversed
    }
}

/// Swaps one random channel between pairs of elements
///
/// `floor(batch * frac)` elements are chosen, rounded down to an even
/// count; element `i` of the choice is paired with element
/// `i + count / 2`.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSwapper {
    frac: f64,
}

impl ChannelSwapper {
    pub fn new(frac: f64) -> Self {
        ChannelSwapper { frac }
    }

    /// Returns the indices of every element that had a channel swapped
    pub fn apply<R: Rng + ?Sized>(&self, x: &mut Array3<f32>, rng: &mut R) -> Vec<usize> {
        let (batch, channels, _) = x.dim();
        let mut count = (batch as f64 * self.frac).floor() as usize;
        count -= count % 2;
        if count == 0 || channels == 0 {
            return Vec::new();
        }

        let chosen = index::sample(rng, batch, count).into_vec();
        let half = count / 2;
        for i in 0..half {
            let (first, second) = (chosen[i], chosen[i + half]);
            let channel = rng.gen_range(0..channels);

            let lane = x.slice(s![first, channel, ..]).to_owned();
            let other = x.slice(s![second, channel, ..]).to_owned();
            x.slice_mut(s![first, channel, ..]).assign(&other);
            x.slice_mut(s![second, channel, ..]).assign(&lane);
        }

        chosen
    }
}

/// Zeroes one random channel of `floor(batch * frac)` random elements
#[derive(Debug, Clone, Copy)]
pub struct ChannelMuter {
    frac: f64,
}

impl ChannelMuter {
    pub fn new(frac: f64) -> Self {
        ChannelMuter { frac }
    }

    /// Returns the indices of the muted elements
    pub fn apply<R: Rng + ?Sized>(&self, x: &mut Array3<f32>, rng: &mut R) -> Vec<usize> {
        let (batch, channels, _) = x.dim();
        let count = ((batch as f64 * self.frac).floor() as usize).min(batch);
        if count == 0 || channels == 0 {
            return Vec::new();
        }

        let chosen = index::sample(rng, batch, count).into_vec();
        for &element in &chosen {
            let channel = rng.gen_range(0..channels);
            x.slice_mut(s![element, channel, ..]).fill(0.0);
        }

        chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ramp(batch: usize, channels: usize, len: usize) -> Array3<f32> {
        Array3::from_shape_fn((batch, channels, len), |(b, c, t)| {
            (b * 1000 + c * 100 + t + 1) as f32
        })
    }

    #[test]
    fn test_inverter_flips_sign() {
        let mut rng = StdRng::seed_from_u64(1);
        let original = ramp(4, 2, 8);
        let mut x = original.clone();

        let flipped = SignalInverter::new(1.0).apply(&mut x, &mut rng);
        assert_eq!(flipped.len(), 8);
        assert_eq!(x, original.mapv(|v| -v));

        let untouched = SignalInverter::new(0.0).apply(&mut x, &mut rng);
        assert!(untouched.is_empty());
    }

    #[test]
    fn test_reverser_reverses_time() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut x = ramp(1, 1, 5);

        SignalReverser::new(1.0).apply(&mut x, &mut rng);
        let lane: Vec<f32> = x.iter().copied().collect();
        assert_eq!(lane, vec![5.0, 4.0, 3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_swapper_even_count_and_exchange() {
        let mut rng = StdRng::seed_from_u64(6);
        let original = ramp(10, 2, 4);
        let mut x = original.clone();

        // 10 * 0.5 = 5 rounds down to 4
        let swapped = ChannelSwapper::new(0.5).apply(&mut x, &mut rng);
        assert_eq!(swapped.len(), 4);

        // Every swapped element now carries one lane from its partner
        for i in 0..2 {
            let (first, second) = (swapped[i], swapped[i + 2]);
            let exchanged = (0..2).any(|c| {
                x.slice(s![first, c, ..]) == original.slice(s![second, c, ..])
                    && x.slice(s![second, c, ..]) == original.slice(s![first, c, ..])
            });
            assert!(exchanged);
        }

        // Elements outside the choice are untouched
        for b in (0..10).filter(|b| !swapped.contains(b)) {
            assert_eq!(x.slice(s![b, .., ..]), original.slice(s![b, .., ..]));
        }
    }

    #[test]
    fn test_muter_zeroes_one_channel() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut x = ramp(6, 2, 4);

        let muted = ChannelMuter::new(1.0).apply(&mut x, &mut rng);
        assert_eq!(muted.len(), 6);
        for b in 0..6 {
            let zero_lanes = (0..2)
                .filter(|&c| x.slice(s![b, c, ..]).iter().all(|&v| v == 0.0))
                .count();
            assert_eq!(zero_lanes, 1);
        }
    }

    #[test]
    fn test_zero_fraction_is_noop() {
        let mut rng = StdRng::seed_from_u64(2);
        let original = ramp(6, 2, 4);
        let mut x = original.clone();

        assert!(ChannelSwapper::new(0.0).apply(&mut x, &mut rng).is_empty());
        assert!(ChannelMuter::new(0.0).apply(&mut x, &mut rng).is_empty());
        assert_eq!(x, original);
    }
}

mod gi;

pub use self::gi::*;
use crate::WhiteNoise;

/// Weighted-reservoir-sampling state: one chosen sample plus the sum of
/// weights (`w`) and the number of candidates (`m`) streamed through it.
///
/// Invariant: `w >= 0.0`; a reservoir with `w == 0.0` is empty and doesn't
/// contribute anything when merged into another one.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Reservoir<T> {
    pub sample: T,
    pub m: f32,
    pub w: f32,
}

impl<T> Reservoir<T>
where
    T: Clone + Copy,
{
    /// Streams a single candidate in; returns whether it's become the chosen
    /// sample.
    pub fn update(
        &mut self,
        wnoise: &mut WhiteNoise,
        sample: T,
        weight: f32,
    ) -> bool {
        self.m += 1.0;
        self.add(wnoise, sample, weight)
    }

    /// Combines `rhs` into this reservoir, with `rhs` contributing
    /// proportionally to its stored weight; returns whether `rhs`'s sample
    /// has become the chosen one.
    pub fn merge(&mut self, wnoise: &mut WhiteNoise, rhs: &Self) -> bool {
        if rhs.is_empty() {
            return false;
        }

        self.m += rhs.m;
        self.add(wnoise, rhs.sample, rhs.w)
    }

    fn add(&mut self, wnoise: &mut WhiteNoise, sample: T, weight: f32) -> bool {
        // Also rejects NaNs
        if !(weight > 0.0) {
            return false;
        }

        let total = self.w + weight;

        if !total.is_finite() {
            let chosen = weight > self.w;

            if chosen {
                self.sample = sample;
            }

            self.w = self.w.max(weight);

            return chosen;
        }

        self.w = total;

        if wnoise.sample() * total <= weight {
            self.sample = sample;
            true
        } else {
            false
        }
    }

    /// Returns the unbiased contribution weight of the chosen sample, given
    /// its target pdf.
    pub fn contribution_weight(&self, pdf: f32) -> f32 {
        let t = self.m * pdf;

        if t > 0.0 {
            self.w / t
        } else {
            0.0
        }
    }

    /// Limits the number of candidates this reservoir represents, scaling the
    /// weight down accordingly; used to bound the temporal history.
    pub fn clamp_m(&mut self, max: f32) {
        if self.m > max {
            self.w *= max / self.m;
            self.m = max;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0.0 || self.m <= 0.0
    }
}

//! Probabilistic fill model
//!
//! Owns the venue's only random source: a ChaCha8 generator seeded at
//! construction. With the same seed the draw sequence, and therefore every
//! probabilistic fill decision, replays identically.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use model::errors::ValidationError;

/// Controls queue-position and slippage randomness.
#[derive(Debug, Clone)]
pub struct FillModel {
    /// Probability a resting limit fills when its price is touched (not
    /// crossed).
    prob_fill_on_limit: f64,
    /// Probability a stop fills when its trigger is touched exactly.
    prob_fill_on_stop: f64,
    /// Probability a market order slips one tick past the last level.
    prob_slippage: f64,
    rng: ChaCha8Rng,
}

impl FillModel {
    pub fn new(
        prob_fill_on_limit: f64,
        prob_fill_on_stop: f64,
        prob_slippage: f64,
        seed: u64,
    ) -> Result<Self, ValidationError> {
        for value in [prob_fill_on_limit, prob_fill_on_stop, prob_slippage] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::ProbabilityOutOfRange { value });
            }
        }
        Ok(Self {
            prob_fill_on_limit,
            prob_fill_on_stop,
            prob_slippage,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// Deterministic always-fill, never-slip model.
    pub fn ideal(seed: u64) -> Self {
        Self::new(1.0, 1.0, 0.0, seed).expect("probabilities are constants")
    }

    /// Whether a touched (not crossed) limit order fills this pass.
    pub fn is_limit_filled(&mut self) -> bool {
        self.draw(self.prob_fill_on_limit)
    }

    /// Whether a stop at an exactly-touched trigger fires.
    pub fn is_stop_filled(&mut self) -> bool {
        self.draw(self.prob_fill_on_stop)
    }

    /// Whether a market order's residual slips one tick.
    pub fn is_slipped(&mut self) -> bool {
        self.draw(self.prob_slippage)
    }

    fn draw(&mut self, probability: f64) -> bool {
        // Avoid consuming randomness for degenerate probabilities so that
        // configuring 0/1 does not perturb the replay stream.
        if probability >= 1.0 {
            return true;
        }
        if probability <= 0.0 {
            return false;
        }
        self.rng.gen_bool(probability)
    }
}

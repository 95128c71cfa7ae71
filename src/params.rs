//! Scheme parameters shared by every component.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StatsError};
use crate::modular::is_prime;

/// Leveled-scheme parameters.
///
/// Created once before any circuit runs and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeParams {
    /// Ring dimension N (power of two); one ciphertext holds N slots or N coefficients.
    pub ring_dim: usize,

    /// Plaintext modulus t (prime).
    pub plaintext_modulus: u64,

    /// Sequential ciphertext×ciphertext multiplications tolerated before
    /// decryption becomes unreliable.
    pub depth_budget: usize,
}

impl SchemeParams {
    /// Parameters of the reference deployment: N = 8192, t = 4295049217, depth 2.
    pub fn standard() -> Self {
        Self {
            ring_dim: 8192,
            plaintext_modulus: 4_295_049_217,
            depth_budget: 2,
        }
    }

    /// Small ring over the Fermat prime 65537, for tests and demos.
    pub fn toy() -> Self {
        Self {
            ring_dim: 16,
            plaintext_modulus: 65537,
            depth_budget: 2,
        }
    }

    /// Plaintext modulus widened for intermediate arithmetic.
    pub fn modulus(&self) -> u128 {
        u128::from(self.plaintext_modulus)
    }

    /// Check the parameter set is usable.
    pub fn validate(&self) -> Result<()> {
        if self.ring_dim < 2 || !self.ring_dim.is_power_of_two() {
            return Err(StatsError::InvalidParams(format!(
                "ring_dim {} must be a power of two >= 2",
                self.ring_dim
            )));
        }

        if self.plaintext_modulus < 3 || !is_prime(self.plaintext_modulus) {
            return Err(StatsError::InvalidParams(format!(
                "plaintext modulus {} must be an odd prime",
                self.plaintext_modulus
            )));
        }

        if self.depth_budget == 0 {
            return Err(StatsError::InvalidParams(
                "depth budget must allow at least one multiplication".into(),
            ));
        }

        Ok(())
    }
}

impl Default for SchemeParams {
    fn default() -> Self {
        Self::standard()
    }
}

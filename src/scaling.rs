//! Per-position alpha-scaling of coefficient encodings.
//!
//! Element `i` is multiplied by `alpha^i mod t` and centered before
//! encryption. Every product of two scaled encodings then carries exactly
//! `alpha^j` at coefficient `j`, which the decoder strips with
//! `inverse_alpha^j`.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StatsError};
use crate::modular::{center, mod_inverse, mod_pow, reduce_signed};

/// `(alpha, inverse_alpha, modulus)` with `alpha · inverse_alpha ≡ 1 (mod modulus)`.
///
/// Deserialization goes through [`ScalingContext::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScalingTriple")]
pub struct ScalingContext {
    alpha: u64,
    inverse_alpha: u64,
    modulus: u64,
}

#[derive(Deserialize)]
struct ScalingTriple {
    alpha: u64,
    inverse_alpha: u64,
    modulus: u64,
}

impl TryFrom<ScalingTriple> for ScalingContext {
    type Error = StatsError;

    fn try_from(t: ScalingTriple) -> Result<Self> {
        Self::new(t.alpha, t.inverse_alpha, t.modulus)
    }
}

impl ScalingContext {
    /// Validate an explicit triple.
    pub fn new(alpha: u64, inverse_alpha: u64, modulus: u64) -> Result<Self> {
        if modulus < 3 {
            return Err(StatsError::InvalidParams(format!(
                "scaling modulus {modulus} is too small"
            )));
        }
        let m = u128::from(modulus);
        if u128::from(alpha) % m * (u128::from(inverse_alpha) % m) % m != 1 {
            return Err(StatsError::InvalidParams(format!(
                "{alpha} * {inverse_alpha} is not 1 mod {modulus}"
            )));
        }
        Ok(Self {
            alpha: alpha % modulus,
            inverse_alpha: inverse_alpha % modulus,
            modulus,
        })
    }

    /// Derive the inverse of `alpha`.
    pub fn from_alpha(alpha: u64, modulus: u64) -> Result<Self> {
        let inverse = mod_inverse(u128::from(alpha), u128::from(modulus)).ok_or_else(|| {
            StatsError::InvalidParams(format!("{alpha} has no inverse mod {modulus}"))
        })?;
        // inverse < modulus <= u64::MAX
        Self::new(alpha, inverse as u64, modulus)
    }

    /// Constants used by the reference deployment (t = 4295049217).
    pub fn standard() -> Self {
        Self {
            alpha: 626_534_755,
            inverse_alpha: 2_398_041_854,
            modulus: 4_295_049_217,
        }
    }

    /// Scaling factor.
    pub fn alpha(&self) -> u64 {
        self.alpha
    }

    /// Its inverse mod `modulus`.
    pub fn inverse_alpha(&self) -> u64 {
        self.inverse_alpha
    }

    /// Plaintext modulus the triple is defined over.
    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    /// `alpha^i mod t`
    pub fn alpha_power(&self, i: usize) -> u128 {
        mod_pow(u128::from(self.alpha), i as u128, u128::from(self.modulus))
    }

    /// `inverse_alpha^i mod t`
    pub fn inverse_power(&self, i: usize) -> u128 {
        mod_pow(
            u128::from(self.inverse_alpha),
            i as u128,
            u128::from(self.modulus),
        )
    }

    /// `[alpha^0, alpha^1, ..., alpha^(len-1)]`
    pub fn powers(&self, len: usize) -> Vec<u128> {
        let m = u128::from(self.modulus);
        let a = u128::from(self.alpha);
        std::iter::successors(Some(1u128), |p| Some(p * a % m))
            .take(len)
            .collect()
    }

    /// `center(v_i · alpha^i mod t)` for every position.
    pub fn pre_process(&self, values: &[i64]) -> Vec<i64> {
        let m = u128::from(self.modulus);
        values
            .iter()
            .zip(self.powers(values.len()))
            .map(|(&v, a)| {
                let scaled = reduce_signed(i128::from(v), m) * a % m;
                // |centered| <= (t - 1) / 2 < 2^63
                center(scaled, m) as i64
            })
            .collect()
    }

    /// Undo [`pre_process`](Self::pre_process): position `i` is multiplied by
    /// `inverse_alpha^i`; results are residues in `[0, t)`.
    pub fn post_process(&self, values: &[i64]) -> Vec<u64> {
        let m = u128::from(self.modulus);
        let inv = u128::from(self.inverse_alpha);
        let mut inv_power = 1u128;
        values
            .iter()
            .map(|&v| {
                let plain = reduce_signed(i128::from(v), m) * inv_power % m;
                inv_power = inv_power * inv % m;
                plain as u64
            })
            .collect()
    }

    /// Remove `alpha^index` from a single residue.
    pub fn unscale(&self, value: u128, index: usize) -> u128 {
        let m = u128::from(self.modulus);
        value % m * self.inverse_power(index) % m
    }
}

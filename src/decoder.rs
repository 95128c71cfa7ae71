//! Turning a decrypted plaintext back into a number.

use serde::Serialize;

use crate::backend::Plaintext;
use crate::error::{Result, StatsError};
use crate::modular::center;
use crate::params::SchemeParams;
use crate::scaling::ScalingContext;
use crate::stats::StatisticPlan;

/// A decoded statistic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decoded {
    /// Centered integer read at the output index, scaling removed.
    pub numerator: i128,
    /// Divisor applied to reach `value`.
    pub divisor: u128,
    /// `numerator / divisor`
    pub value: f64,
}

/// Reads one index of a decrypted plaintext, strips alpha-scaling and
/// applies the statistic's divisor.
#[derive(Debug, Clone)]
pub struct ResultDecoder {
    modulus: u128,
    scaling: Option<ScalingContext>,
}

impl ResultDecoder {
    /// Decoder for unscaled results.
    pub fn new(params: &SchemeParams) -> Self {
        Self {
            modulus: params.modulus(),
            scaling: None,
        }
    }

    /// Remove `alpha^index` before centering.
    pub fn with_scaling(mut self, scaling: Option<ScalingContext>) -> Self {
        self.scaling = scaling;
        self
    }

    /// Raw residue at `index`.
    pub fn extract(&self, plaintext: &Plaintext, index: usize) -> Result<u128> {
        plaintext.values().get(index).copied().ok_or_else(|| {
            StatsError::InputShape(format!(
                "index {index} outside plaintext of {} values",
                plaintext.values().len()
            ))
        })
    }

    /// `raw · inverse_alpha^index mod t`, or `raw` when unscaled.
    pub fn unscale(&self, raw: u128, index: usize) -> u128 {
        match &self.scaling {
            Some(s) => s.unscale(raw, index),
            None => raw % self.modulus,
        }
    }

    /// Signed integer at `index`.
    pub fn decode_integer(&self, plaintext: &Plaintext, index: usize) -> Result<i128> {
        let raw = self.extract(plaintext, index)?;
        Ok(center(self.unscale(raw, index), self.modulus))
    }

    /// Signed integer at `index` divided by `divisor`.
    pub fn decode(&self, plaintext: &Plaintext, index: usize, divisor: u128) -> Result<Decoded> {
        if divisor == 0 {
            return Err(StatsError::InvalidParams("divisor must be non-zero".into()));
        }
        let numerator = self.decode_integer(plaintext, index)?;
        Ok(Decoded {
            numerator,
            divisor,
            value: numerator as f64 / divisor as f64,
        })
    }

    /// Decode at the plan's output index with its divisor.
    pub fn decode_plan(&self, plaintext: &Plaintext, plan: &StatisticPlan) -> Result<Decoded> {
        self.decode(plaintext, plan.output_index(), plan.divisor())
    }
}

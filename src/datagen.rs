//! Synthetic inputs for the CLI and the benches.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StatsError};
use crate::input::Batch;

/// How generated elements are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ValueDistribution {
    /// Uniform over `low..=high`.
    Uniform {
        /// Smallest value.
        low: i64,
        /// Largest value.
        high: i64,
    },
    /// Rounded samples of `N(mean, std_dev²)`.
    Normal {
        /// Mean.
        mean: f64,
        /// Standard deviation.
        std_dev: f64,
    },
    /// `1, 2, 0, 1, 2, 0, ...` restarting at every vector.
    Cyclic,
}

fn sampler<'a, R: Rng>(rng: &'a mut R, dist: ValueDistribution) -> Result<Box<dyn FnMut(usize) -> i64 + 'a>> {
    match dist {
        ValueDistribution::Uniform { low, high } => {
            if low > high {
                return Err(StatsError::InvalidParams(format!("empty range {low}..={high}")));
            }
            Ok(Box::new(move |_| rng.gen_range(low..=high)))
        }
        ValueDistribution::Normal { mean, std_dev } => {
            if !mean.is_finite() || !std_dev.is_finite() || std_dev < 0.0 {
                return Err(StatsError::InvalidParams(format!(
                    "normal distribution needs a finite mean and a finite non-negative standard deviation, got N({mean}, {std_dev}²)"
                )));
            }
            let normal = Normal::new(mean, std_dev)
                .map_err(|e| StatsError::InvalidParams(format!("normal distribution: {e}")))?;
            Ok(Box::new(move |_| normal.sample(&mut *rng).round() as i64))
        }
        ValueDistribution::Cyclic => Ok(Box::new(|i| ((i + 1) % 3) as i64)),
    }
}

/// One vector of `size` elements.
pub fn generate_vector<R: Rng>(rng: &mut R, dist: ValueDistribution, size: usize) -> Result<Vec<i64>> {
    let mut draw = sampler(rng, dist)?;
    Ok((0..size).map(&mut draw).collect())
}

/// `vector_count` vectors of `vector_size` elements in the batch layout.
pub fn generate_batch<R: Rng>(
    rng: &mut R,
    dist: ValueDistribution,
    vector_count: usize,
    vector_size: usize,
) -> Result<Batch> {
    let mut draw = sampler(rng, dist)?;
    let values = (0..vector_count)
        .flat_map(|_| 0..vector_size)
        .map(&mut draw)
        .collect();
    Batch::new(vector_count, vector_size, values)
}

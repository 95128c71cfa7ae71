//! Mean and variance on top of the aggregation circuits.
//!
//! Division never happens under encryption: every plan carries the divisor
//! the decoder applies after decryption.
//!
//! Variance uses `n·Σx² − (Σx)²`, so the two products sit on independent
//! branches and the circuit consumes depth 1 regardless of `n`.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::{Aggregate, AggregateOutput, AggregationCircuit, CircuitPlan};
use crate::backend::{ArithmeticBackend, PackingScheme, Plaintext};
use crate::circuit::{Circuit, NodeId, RotationPlan};
use crate::encoder::{shard_count, shard_padded_len, EncodedVector, EncryptedVector, VectorEncoder};
use crate::error::{Result, StatsError};
use crate::modular::symmetric_bound;
use crate::params::SchemeParams;
use crate::scaling::ScalingContext;

/// What the pipeline computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statistic {
    /// `Σ v_i`
    Sum,
    /// `Σ v_i w_i` of two equally long vectors.
    InnerProduct,
    /// `Σ v_i / n`
    Mean,
    /// Population variance `Σ (v_i − mean)² / n`.
    Variance,
}

/// How the variance numerator is formed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarianceMethod {
    /// `n·Σx² − (Σx)²`, divisor `n²`. Both packing schemes.
    #[default]
    SumOfSquares,
    /// `Σ (n·x_i − S)²`, divisor `n³`. Slot packing, every shard padded to
    /// the ring dimension so the total can be broadcast by rotation.
    Deviation,
}

/// A checked circuit plus what the decoder needs to finish the statistic.
#[derive(Debug, Clone)]
pub struct StatisticPlan {
    plan: CircuitPlan,
    statistic: Statistic,
    method: VarianceMethod,
    logical_len: usize,
    shard_capacity: usize,
    divisor: u128,
    scaling: Option<ScalingContext>,
    params: SchemeParams,
}

impl StatisticPlan {
    /// Statistic computed.
    pub fn statistic(&self) -> Statistic {
        self.statistic
    }

    /// Variance method (ignored by the other statistics).
    pub fn method(&self) -> VarianceMethod {
        self.method
    }

    /// Underlying circuit plan.
    pub fn circuit_plan(&self) -> &CircuitPlan {
        &self.plan
    }

    /// Packing scheme.
    pub fn scheme(&self) -> PackingScheme {
        self.plan.scheme()
    }

    /// Number of real elements per operand.
    pub fn logical_len(&self) -> usize {
        self.logical_len
    }

    /// Elements per shard before padding.
    pub fn shard_capacity(&self) -> usize {
        self.shard_capacity
    }

    /// Index holding the numerator after decryption.
    pub fn output_index(&self) -> usize {
        self.plan.output_index()
    }

    /// Value the decoder divides by.
    pub fn divisor(&self) -> u128 {
        self.divisor
    }

    /// Scaling the inputs must carry.
    pub fn scaling(&self) -> Option<&ScalingContext> {
        self.scaling.as_ref()
    }

    /// Multiplicative depth consumed.
    pub fn depth(&self) -> usize {
        self.plan.depth()
    }

    /// Rotation keys the backend needs.
    pub fn rotation_offsets(&self) -> Vec<usize> {
        self.plan.rotation_offsets().into_iter().collect()
    }

    /// Largest magnitude the numerator can reach, `None` if it does not fit
    /// in `u128`.
    pub fn magnitude_bound(&self, max_left: u128, max_right: u128) -> Option<u128> {
        let n = self.logical_len as u128;
        match (self.statistic, self.method) {
            (Statistic::Sum | Statistic::Mean, _) => n.checked_mul(max_left),
            (Statistic::InnerProduct, _) => n.checked_mul(max_left)?.checked_mul(max_right),
            (Statistic::Variance, VarianceMethod::SumOfSquares) => {
                let nm = n.checked_mul(max_left)?;
                nm.checked_mul(nm)
            }
            (Statistic::Variance, VarianceMethod::Deviation) => {
                let nm = n.checked_mul(max_left)?;
                nm.checked_mul(nm)?.checked_mul(n)?.checked_mul(4)
            }
        }
    }

    /// Reject inputs whose result could leave the symmetric range of `t`.
    pub fn check_range(&self, max_left: u128, max_right: u128) -> Result<()> {
        let limit = symmetric_bound(self.params.modulus());
        match self.magnitude_bound(max_left, max_right) {
            Some(bound) if bound <= limit => Ok(()),
            Some(bound) => Err(StatsError::EncodingOverflow(format!(
                "{:?} of {} elements can reach {bound}, beyond the representable {limit}",
                self.statistic, self.logical_len
            ))),
            None => Err(StatsError::EncodingOverflow(format!(
                "{:?} of {} elements overflows any plaintext modulus",
                self.statistic, self.logical_len
            ))),
        }
    }

    /// Range-check and encode operands in the order the circuit reads them.
    ///
    /// `right` is required for inner products and rejected otherwise.
    pub fn encode(&self, encoder: &VectorEncoder, left: &[i64], right: Option<&[i64]>) -> Result<Vec<EncodedVector>> {
        if encoder.scheme() != self.scheme() {
            return Err(StatsError::InvalidParams(format!(
                "encoder uses {:?} packing, plan uses {:?}",
                encoder.scheme(),
                self.scheme()
            )));
        }
        if encoder.scaling() != self.scaling.as_ref() {
            return Err(StatsError::InvalidParams(
                "encoder scaling differs from the planned scaling".into(),
            ));
        }
        if left.len() != self.logical_len {
            return Err(StatsError::InputShape(format!(
                "planned for {} elements, got {}",
                self.logical_len,
                left.len()
            )));
        }

        let second = match (self.statistic, right) {
            (Statistic::InnerProduct, Some(r)) if r.len() == left.len() => Some(r),
            (Statistic::InnerProduct, Some(r)) => {
                return Err(StatsError::InputShape(format!(
                    "operand lengths differ: {} vs {}",
                    left.len(),
                    r.len()
                )))
            }
            (Statistic::InnerProduct, None) => {
                return Err(StatsError::InputShape("inner product needs two operands".into()))
            }
            (_, Some(_)) => {
                return Err(StatsError::InputShape(format!(
                    "{:?} takes a single operand",
                    self.statistic
                )))
            }
            // coefficient variance pairs every shard with its own reversal
            (Statistic::Variance, None)
                if self.scheme() == PackingScheme::Coefficient
                    && self.method == VarianceMethod::SumOfSquares =>
            {
                Some(left)
            }
            _ => None,
        };

        let max_left = max_abs(left);
        self.check_range(max_left, second.map_or(max_left, max_abs))?;

        let cap = self.shard_capacity;
        match second {
            None if self.method == VarianceMethod::Deviation && self.statistic == Statistic::Variance => {
                encoder.shard_full(left)
            }
            None => encoder.shard(left, cap, false),
            Some(right) => {
                let reversed = self.scheme() == PackingScheme::Coefficient;
                let lefts = encoder.shard(left, cap, false)?;
                let rights = encoder.shard(right, cap, reversed)?;
                Ok(lefts.into_iter().interleave(rights).collect())
            }
        }
    }

    /// Evaluate on encrypted operands produced from [`encode`](Self::encode).
    pub fn execute<B: ArithmeticBackend>(
        &self,
        backend: &B,
        inputs: Vec<EncryptedVector<B::Ciphertext>>,
    ) -> Result<AggregateOutput<B::Ciphertext>> {
        self.plan.execute(backend, inputs)
    }
}

fn max_abs(values: &[i64]) -> u128 {
    values
        .iter()
        .map(|v| u128::from(v.unsigned_abs()))
        .max()
        .unwrap_or(0)
}

/// Plans every [`Statistic`] for one parameter set.
#[derive(Debug, Clone)]
pub struct StatisticsComposer {
    aggregation: AggregationCircuit,
}

impl StatisticsComposer {
    /// Composer for unscaled inputs.
    pub fn new(params: &SchemeParams) -> Self {
        Self {
            aggregation: AggregationCircuit::new(params),
        }
    }

    /// Inputs carry alpha-scaling (coefficient packing only).
    pub fn with_scaling(mut self, scaling: Option<ScalingContext>) -> Self {
        self.aggregation = self.aggregation.with_scaling(scaling);
        self
    }

    fn params(&self) -> &SchemeParams {
        self.aggregation.params()
    }

    /// Elements one ciphertext holds for this statistic.
    pub fn capacity(&self, statistic: Statistic, scheme: PackingScheme) -> usize {
        let n = self.params().ring_dim;
        match (statistic, scheme) {
            // the S² branch spans 2P-1 coefficients
            (Statistic::Variance, PackingScheme::Coefficient) => n / 2,
            _ => n,
        }
    }

    /// Plan `statistic` over `n` elements per operand.
    pub fn plan(
        &self,
        statistic: Statistic,
        scheme: PackingScheme,
        n: usize,
        method: VarianceMethod,
    ) -> Result<StatisticPlan> {
        match statistic {
            Statistic::Sum => self.plan_aggregate(Aggregate::Sum, scheme, n),
            Statistic::InnerProduct => self.plan_aggregate(Aggregate::InnerProduct, scheme, n),
            Statistic::Mean => self.plan_mean(scheme, n),
            Statistic::Variance => self.plan_variance(scheme, n, method),
        }
    }

    fn plan_aggregate(&self, op: Aggregate, scheme: PackingScheme, n: usize) -> Result<StatisticPlan> {
        let cap = self.capacity(Statistic::Sum, scheme);
        let padded = shard_padded_len(n, cap)?;
        let plan = self.aggregation.plan(op, scheme, shard_count(n, cap), padded)?;
        let statistic = match op {
            Aggregate::Sum => Statistic::Sum,
            Aggregate::InnerProduct => Statistic::InnerProduct,
        };
        Ok(self.wrap(plan, statistic, VarianceMethod::default(), n, cap, 1))
    }

    /// `Σ v_i` with the division by `n` left to the decoder.
    pub fn plan_mean(&self, scheme: PackingScheme, n: usize) -> Result<StatisticPlan> {
        let mut plan = self.plan_aggregate(Aggregate::Sum, scheme, n)?;
        plan.statistic = Statistic::Mean;
        plan.divisor = n as u128;
        Ok(plan)
    }

    /// Population variance of `n` elements.
    pub fn plan_variance(&self, scheme: PackingScheme, n: usize, method: VarianceMethod) -> Result<StatisticPlan> {
        let divisor = match method {
            VarianceMethod::SumOfSquares => (n as u128).checked_pow(2),
            VarianceMethod::Deviation => (n as u128).checked_pow(3),
        }
        .ok_or_else(|| StatsError::EncodingOverflow(format!("divisor for {n} elements overflows")))?;

        let (plan, cap) = match (method, scheme) {
            (VarianceMethod::SumOfSquares, PackingScheme::Slot) => self.slot_variance(n)?,
            (VarianceMethod::SumOfSquares, PackingScheme::Coefficient) => self.coefficient_variance(n)?,
            (VarianceMethod::Deviation, PackingScheme::Slot) => self.deviation_variance(n)?,
            (VarianceMethod::Deviation, PackingScheme::Coefficient) => {
                return Err(StatsError::InvalidParams(
                    "deviation variance needs slot packing".into(),
                ))
            }
        };
        Ok(self.wrap(plan, Statistic::Variance, method, n, cap, divisor))
    }

    fn wrap(
        &self,
        plan: CircuitPlan,
        statistic: Statistic,
        method: VarianceMethod,
        logical_len: usize,
        shard_capacity: usize,
        divisor: u128,
    ) -> StatisticPlan {
        debug!(
            ?statistic,
            logical_len,
            shards = shard_count(logical_len, shard_capacity),
            divisor,
            index = plan.output_index(),
            "composed statistic"
        );
        StatisticPlan {
            plan,
            statistic,
            method,
            logical_len,
            shard_capacity,
            divisor,
            scaling: self.aggregation.scaling().copied(),
            params: *self.params(),
        }
    }

    fn constant(&self, scheme: PackingScheme, value: u128) -> Result<Plaintext> {
        Plaintext::constant(scheme, value % self.params().modulus(), self.params())
    }

    /// Inputs `[V_0, V_1, ...]`; result at slot 0.
    fn slot_variance(&self, n: usize) -> Result<(CircuitPlan, usize)> {
        let scheme = PackingScheme::Slot;
        let cap = self.capacity(Statistic::Variance, scheme);
        let padded = shard_padded_len(n, cap)?;
        let shards = shard_count(n, cap);
        self.aggregation.check_layout(scheme, shards, padded)?;

        let mut c = Circuit::new();
        let inputs: Vec<NodeId> = (0..shards).map(|_| c.input()).collect();

        let combined = c.add_many(&inputs);
        let (s, _) = self.aggregation.reduce(&mut c, combined, scheme, padded)?;
        let s2 = c.mul(s, s);

        let squares = inputs.iter().map(|&v| c.mul(v, v)).collect_vec();
        let squares = c.add_many(&squares);
        let (q, _) = self.aggregation.reduce(&mut c, squares, scheme, padded)?;
        let nq = c.mul_plain(q, self.constant(scheme, n as u128)?);

        let out = c.sub(nq, s2);
        c.set_output(out);
        let plan = self.aggregation.finish(c, scheme, padded, 0, vec![false; shards])?;
        Ok((plan, cap))
    }

    /// Inputs `[V_0, rev(V_0), V_1, rev(V_1), ...]`; result at coefficient `2P-2`.
    fn coefficient_variance(&self, n: usize) -> Result<(CircuitPlan, usize)> {
        let scheme = PackingScheme::Coefficient;
        let cap = self.capacity(Statistic::Variance, scheme);
        let padded = shard_padded_len(n, cap)?;
        let shards = shard_count(n, cap);
        self.aggregation.check_layout(scheme, shards, padded)?;
        let params = self.params();
        let t = params.modulus();

        let mut c = Circuit::new();
        let mut forward = Vec::with_capacity(shards);
        let mut reversed = Vec::with_capacity(shards);
        for _ in 0..shards {
            forward.push(c.input());
            reversed.push(c.input());
        }

        // coefficients P-1..=2P-2 of Vsum·ones all equal S (times alpha^k)
        let ones = (0..2 * padded - 1).map(|k| self.aggregation.weight(k)).collect();
        let ones = Plaintext::new(scheme, ones, params)?;
        let vsum = c.add_many(&forward);
        let rsum = c.add_many(&reversed);
        let broadcast = c.mul_plain(vsum, ones);
        let s2 = c.mul(broadcast, rsum);

        let squares = forward
            .iter()
            .zip(&reversed)
            .map(|(&v, &r)| c.mul(v, r))
            .collect_vec();
        let q = c.add_many(&squares);
        let shift = (n as u128 % t) * self.aggregation.weight(padded - 1) % t;
        let shift = Plaintext::one_hot(scheme, padded - 1, shift, params)?;
        let nq = c.mul_plain(q, shift);

        let out = c.sub(nq, s2);
        c.set_output(out);
        let pattern = (0..shards).flat_map(|_| [false, true]).collect();
        let plan = self.aggregation.finish(c, scheme, padded, 2 * padded - 2, pattern)?;
        Ok((plan, cap))
    }

    /// Inputs `[V_0, V_1, ...]`, each padded to the ring dimension; result at slot 0.
    fn deviation_variance(&self, n: usize) -> Result<(CircuitPlan, usize)> {
        let scheme = PackingScheme::Slot;
        let params = self.params();
        let full = params.ring_dim;
        if n == 0 {
            return Err(StatsError::InputShape("cannot encode an empty vector".into()));
        }
        let shards = shard_count(n, full);
        self.aggregation.check_layout(scheme, shards, full)?;
        let rotations = RotationPlan::for_length(full)?;

        let mut c = Circuit::new();
        let inputs: Vec<NodeId> = (0..shards).map(|_| c.input()).collect();

        let combined = c.add_many(&inputs);
        let total = c.rotate_and_sum(combined, &rotations);
        let n_const = self.constant(scheme, n as u128)?;

        let mut squares = Vec::with_capacity(shards);
        for (s, &v) in inputs.iter().enumerate() {
            let real = (n - s * full).min(full);
            let mask = Plaintext::new(scheme, vec![1; real], params)?;
            let scaled = c.mul_plain(v, n_const.clone());
            let centered = c.sub(scaled, total);
            let d = c.mul_plain(centered, mask);
            squares.push(c.mul(d, d));
        }
        let sum = c.add_many(&squares);
        let out = c.rotate_and_sum(sum, &rotations);
        c.set_output(out);

        let plan = self.aggregation.finish(c, scheme, full, 0, vec![false; shards])?;
        Ok((plan, full))
    }
}

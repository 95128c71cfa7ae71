//! Sum and inner-product circuits for both packing schemes.
//!
//! | operation    | slot packing                       | coefficient packing                   |
//! |--------------|------------------------------------|---------------------------------------|
//! | Sum          | rotate-and-add, total at slot 0    | one-hot shift-and-add, total at P-1   |
//! | InnerProduct | mul, rotate-and-add, slot 0        | mul by reversed operand, coeff P-1    |
//!
//! `P` is the padded shard length. Shards are combined with a depth-free
//! `add_many` before the reduction. With alpha-scaling the value at
//! coefficient `j` carries `alpha^j`.

use std::collections::BTreeSet;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{ArithmeticBackend, PackingScheme, Plaintext};
use crate::circuit::{Circuit, NodeId, RotationPlan};
use crate::encoder::EncryptedVector;
use crate::error::{Result, StatsError};
use crate::params::SchemeParams;
use crate::scaling::ScalingContext;

/// Aggregate computed by an [`AggregationCircuit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregate {
    /// `Σ v_i`
    Sum,
    /// `Σ v_i w_i`
    InnerProduct,
}

/// A validated circuit and where its result lands.
#[derive(Debug, Clone)]
pub struct CircuitPlan {
    pub(crate) circuit: Circuit,
    pub(crate) scheme: PackingScheme,
    pub(crate) padded_len: usize,
    pub(crate) output_index: usize,
    pub(crate) expects_reversed: Vec<bool>,
}

impl CircuitPlan {
    /// Packing scheme every input must use.
    pub fn scheme(&self) -> PackingScheme {
        self.scheme
    }

    /// Padded shard length every input must have.
    pub fn padded_len(&self) -> usize {
        self.padded_len
    }

    /// Slot or coefficient index holding the result.
    pub fn output_index(&self) -> usize {
        self.output_index
    }

    /// Multiplicative depth consumed.
    pub fn depth(&self) -> usize {
        self.circuit.depth()
    }

    /// Rotation keys the backend must hold.
    pub fn rotation_offsets(&self) -> BTreeSet<usize> {
        self.circuit.rotation_offsets()
    }

    /// Underlying gate graph.
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// Input ciphertexts expected, in order.
    pub fn input_count(&self) -> usize {
        self.expects_reversed.len()
    }

    /// Check encrypted inputs against the plan's layout.
    pub(crate) fn check_inputs<C>(&self, inputs: &[EncryptedVector<C>]) -> Result<()> {
        if inputs.len() != self.expects_reversed.len() {
            return Err(StatsError::InputShape(format!(
                "plan expects {} ciphertexts, got {}",
                self.expects_reversed.len(),
                inputs.len()
            )));
        }
        for (i, (input, &reversed)) in inputs.iter().zip(&self.expects_reversed).enumerate() {
            if input.scheme != self.scheme {
                return Err(StatsError::InputShape(format!(
                    "input {i} uses {:?} packing, plan uses {:?}",
                    input.scheme, self.scheme
                )));
            }
            if input.padded_len != self.padded_len {
                return Err(StatsError::InputShape(format!(
                    "input {i} padded to {}, plan expects {}",
                    input.padded_len, self.padded_len
                )));
            }
            if input.reversed != reversed {
                return Err(StatsError::InputShape(format!(
                    "input {i} must {}be the reversed encoding",
                    if reversed { "" } else { "not " }
                )));
            }
        }
        Ok(())
    }

    /// Run against a backend; depth and rotation keys are checked before
    /// the first backend call.
    pub fn execute<B: ArithmeticBackend>(
        &self,
        backend: &B,
        inputs: Vec<EncryptedVector<B::Ciphertext>>,
    ) -> Result<AggregateOutput<B::Ciphertext>> {
        self.check_inputs(&inputs)?;
        let ciphertext = self
            .circuit
            .evaluate(backend, inputs.into_iter().map(|v| v.ciphertext).collect())?;
        Ok(AggregateOutput {
            ciphertext,
            index: self.output_index,
            depth: self.depth(),
        })
    }
}

/// Ciphertext holding an aggregate at a documented index.
#[derive(Debug, Clone)]
pub struct AggregateOutput<C> {
    /// Result ciphertext.
    pub ciphertext: C,
    /// Slot or coefficient holding the value.
    pub index: usize,
    /// Multiplicative depth consumed.
    pub depth: usize,
}

/// Builds sum and inner-product circuits.
#[derive(Debug, Clone)]
pub struct AggregationCircuit {
    params: SchemeParams,
    scaling: Option<ScalingContext>,
}

impl AggregationCircuit {
    /// Builder for unscaled encodings.
    pub fn new(params: &SchemeParams) -> Self {
        Self {
            params: *params,
            scaling: None,
        }
    }

    /// Inputs were alpha-scaled by the encoder.
    pub fn with_scaling(mut self, scaling: Option<ScalingContext>) -> Self {
        self.scaling = scaling;
        self
    }

    /// Parameters plans are built for.
    pub fn params(&self) -> &SchemeParams {
        &self.params
    }

    /// Scaling the inputs carry.
    pub fn scaling(&self) -> Option<&ScalingContext> {
        self.scaling.as_ref()
    }

    pub(crate) fn check_layout(&self, scheme: PackingScheme, shards: usize, padded_len: usize) -> Result<()> {
        if shards == 0 {
            return Err(StatsError::InputShape("no shards to aggregate".into()));
        }
        if !padded_len.is_power_of_two() {
            return Err(StatsError::InputShape(format!(
                "padded length {padded_len} is not a power of two"
            )));
        }
        if padded_len > self.params.ring_dim {
            return Err(StatsError::EncodingOverflow(format!(
                "padded length {padded_len} exceeds ring dimension {}",
                self.params.ring_dim
            )));
        }
        if self.scaling.is_some() && scheme != PackingScheme::Coefficient {
            return Err(StatsError::InvalidParams(
                "alpha-scaling applies to coefficient packing only".into(),
            ));
        }
        Ok(())
    }

    /// Coefficient weight of position `i` (`alpha^i` when scaled, else 1).
    pub(crate) fn weight(&self, i: usize) -> u128 {
        self.scaling.as_ref().map_or(1, |s| s.alpha_power(i))
    }

    /// Reduce `x` to its total; returns the node and the index the total lands at.
    pub(crate) fn reduce(
        &self,
        c: &mut Circuit,
        x: NodeId,
        scheme: PackingScheme,
        padded_len: usize,
    ) -> Result<(NodeId, usize)> {
        let plan = RotationPlan::for_length(padded_len)?;
        match scheme {
            PackingScheme::Slot => Ok((c.rotate_and_sum(x, &plan), 0)),
            PackingScheme::Coefficient => {
                // multiplying by alpha^s x^s is the coefficient-packing shift by s
                let mut acc = x;
                for &offset in plan.offsets() {
                    let shift = Plaintext::one_hot(scheme, offset, self.weight(offset), &self.params)?;
                    let shifted = c.mul_plain(acc, shift);
                    acc = c.add(acc, shifted);
                }
                Ok((acc, padded_len - 1))
            }
        }
    }

    /// Plan the total of a (possibly sharded) vector.
    ///
    /// Inputs: one ciphertext per shard.
    pub fn plan_sum(&self, scheme: PackingScheme, shards: usize, padded_len: usize) -> Result<CircuitPlan> {
        self.check_layout(scheme, shards, padded_len)?;
        let mut c = Circuit::new();
        let inputs: Vec<NodeId> = (0..shards).map(|_| c.input()).collect();
        let combined = c.add_many(&inputs);
        let (total, index) = self.reduce(&mut c, combined, scheme, padded_len)?;
        c.set_output(total);
        self.finish(c, scheme, padded_len, index, vec![false; shards])
    }

    /// Plan the inner product of two identically sharded vectors.
    ///
    /// Inputs: `[left_0, right_0, left_1, right_1, ...]`; under coefficient
    /// packing each `right_s` is the reversed encoding.
    pub fn plan_inner_product(&self, scheme: PackingScheme, shards: usize, padded_len: usize) -> Result<CircuitPlan> {
        self.check_layout(scheme, shards, padded_len)?;
        let mut c = Circuit::new();
        let products: Vec<NodeId> = (0..shards)
            .map(|_| {
                let left = c.input();
                let right = c.input();
                c.mul(left, right)
            })
            .collect();
        let combined = c.add_many(&products);

        let (out, index) = match scheme {
            PackingScheme::Slot => self.reduce(&mut c, combined, scheme, padded_len)?,
            // convolution with the reversed operand: no rotations
            PackingScheme::Coefficient => (combined, padded_len - 1),
        };
        c.set_output(out);

        let reversed_right = scheme == PackingScheme::Coefficient;
        let pattern = (0..shards).flat_map(|_| [false, reversed_right]).collect();
        self.finish(c, scheme, padded_len, index, pattern)
    }

    /// Plan either aggregate.
    pub fn plan(&self, op: Aggregate, scheme: PackingScheme, shards: usize, padded_len: usize) -> Result<CircuitPlan> {
        match op {
            Aggregate::Sum => self.plan_sum(scheme, shards, padded_len),
            Aggregate::InnerProduct => self.plan_inner_product(scheme, shards, padded_len),
        }
    }

    pub(crate) fn finish(
        &self,
        circuit: Circuit,
        scheme: PackingScheme,
        padded_len: usize,
        output_index: usize,
        expects_reversed: Vec<bool>,
    ) -> Result<CircuitPlan> {
        circuit.validate(self.params.depth_budget)?;
        debug!(
            ?scheme,
            padded_len,
            output_index,
            depth = circuit.depth(),
            "planned circuit"
        );
        Ok(CircuitPlan {
            circuit,
            scheme,
            padded_len,
            output_index,
            expects_reversed,
        })
    }

    /// Sum encrypted shards.
    pub fn sum<B: ArithmeticBackend>(
        &self,
        backend: &B,
        shards: Vec<EncryptedVector<B::Ciphertext>>,
    ) -> Result<AggregateOutput<B::Ciphertext>> {
        let (scheme, padded_len) = layout_of(&shards)?;
        self.plan_sum(scheme, shards.len(), padded_len)?
            .execute(backend, shards)
    }

    /// Inner product of two identically sharded encrypted vectors.
    pub fn inner_product<B: ArithmeticBackend>(
        &self,
        backend: &B,
        left: Vec<EncryptedVector<B::Ciphertext>>,
        right: Vec<EncryptedVector<B::Ciphertext>>,
    ) -> Result<AggregateOutput<B::Ciphertext>> {
        if left.len() != right.len() {
            return Err(StatsError::InputShape(format!(
                "operands have {} and {} shards",
                left.len(),
                right.len()
            )));
        }
        for (l, r) in left.iter().zip(&right) {
            if l.logical_len != r.logical_len {
                return Err(StatsError::InputShape(format!(
                    "operand lengths differ: {} vs {}",
                    l.logical_len, r.logical_len
                )));
            }
        }
        let (scheme, padded_len) = layout_of(&left)?;
        let plan = self.plan_inner_product(scheme, left.len(), padded_len)?;
        plan.execute(backend, left.into_iter().interleave(right).collect())
    }
}

fn layout_of<C>(shards: &[EncryptedVector<C>]) -> Result<(PackingScheme, usize)> {
    shards
        .first()
        .map(|s| (s.scheme, s.padded_len))
        .ok_or_else(|| StatsError::InputShape("no shards to aggregate".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    use crate::clear::ClearBackend;
    use crate::encoder::VectorEncoder;
    use crate::modular::center;

    const SCHEMES: [PackingScheme; 2] = [PackingScheme::Slot, PackingScheme::Coefficient];

    fn backend() -> ClearBackend {
        ClearBackend::keygen(SchemeParams::toy(), &[1, 2, 4, 8]).unwrap()
    }

    fn read(backend: &ClearBackend, out: &AggregateOutput<crate::cipher::Cipher>, scaling: Option<&ScalingContext>) -> i128 {
        let t = backend.params().modulus();
        let raw = backend.decrypt(&out.ciphertext).unwrap().values()[out.index];
        let raw = scaling.map_or(raw, |s| s.unscale(raw, out.index));
        center(raw, t)
    }

    fn sum_of(scheme: PackingScheme, values: &[i64], scaling: Option<ScalingContext>) -> i128 {
        let b = backend();
        let mut enc = VectorEncoder::new(b.params(), scheme);
        if let Some(s) = scaling {
            enc = enc.with_scaling(s).unwrap();
        }
        let shards = enc
            .shard(values, b.params().ring_dim, false)
            .unwrap()
            .iter()
            .map(|e| e.encrypt(&b).unwrap())
            .collect();
        let agg = AggregationCircuit::new(b.params()).with_scaling(scaling);
        let out = agg.sum(&b, shards).unwrap();
        assert_eq!(out.depth, 0);
        read(&b, &out, scaling.as_ref())
    }

    fn inner_of(scheme: PackingScheme, v: &[i64], w: &[i64], scaling: Option<ScalingContext>) -> i128 {
        let b = backend();
        let mut enc = VectorEncoder::new(b.params(), scheme);
        if let Some(s) = scaling {
            enc = enc.with_scaling(s).unwrap();
        }
        let cap = b.params().ring_dim;
        let reversed = scheme == PackingScheme::Coefficient;
        let left = enc.shard(v, cap, false).unwrap().iter().map(|e| e.encrypt(&b).unwrap()).collect();
        let right = enc.shard(w, cap, reversed).unwrap().iter().map(|e| e.encrypt(&b).unwrap()).collect();
        let agg = AggregationCircuit::new(b.params()).with_scaling(scaling);
        let out = agg.inner_product(&b, left, right).unwrap();
        assert_eq!(out.depth, 1);
        read(&b, &out, scaling.as_ref())
    }

    #[test]
    fn test_sum_scenario() {
        for scheme in SCHEMES {
            assert_eq!(sum_of(scheme, &[1, 2, 3, 4], None), 10);
        }
        let plan = AggregationCircuit::new(&SchemeParams::toy())
            .plan_sum(PackingScheme::Slot, 1, 4)
            .unwrap();
        assert_eq!(plan.rotation_offsets().into_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(plan.output_index(), 0);
    }

    #[test]
    fn test_sum_indices() {
        let agg = AggregationCircuit::new(&SchemeParams::toy());
        assert_eq!(agg.plan_sum(PackingScheme::Slot, 1, 8).unwrap().output_index(), 0);
        assert_eq!(agg.plan_sum(PackingScheme::Coefficient, 1, 8).unwrap().output_index(), 7);
        let coef = agg.plan_sum(PackingScheme::Coefficient, 1, 8).unwrap();
        assert!(coef.rotation_offsets().is_empty());
    }

    #[test]
    fn test_slot_sum_fills_every_slot_when_full() {
        let b = backend();
        let values: Vec<i64> = (1..=16).collect();
        let shard = VectorEncoder::new(b.params(), PackingScheme::Slot)
            .encode(&values)
            .unwrap()
            .encrypt(&b)
            .unwrap();
        let out = AggregationCircuit::new(b.params()).sum(&b, vec![shard]).unwrap();
        let plain = b.decrypt(&out.ciphertext).unwrap();
        assert!(plain.values().iter().all(|&v| v == 136));
    }

    #[test]
    fn test_sum_negative_and_sharded() {
        let values: Vec<i64> = (-20..20).collect();
        for scheme in SCHEMES {
            assert_eq!(sum_of(scheme, &values, None), -20);
        }
    }

    #[test]
    fn test_sum_with_scaling() {
        let s = ScalingContext::new(81, 8091, 65537).unwrap();
        assert_eq!(sum_of(PackingScheme::Coefficient, &[1, 2, 3, 4, 5], Some(s)), 15);
        assert_eq!(sum_of(PackingScheme::Coefficient, &[-7, 3, -9], Some(s)), -13);
    }

    #[test]
    fn test_inner_product_scenario() {
        for scheme in SCHEMES {
            assert_eq!(inner_of(scheme, &[1, 2], &[3, 4], None), 11);
        }
        let s = ScalingContext::new(81, 8091, 65537).unwrap();
        assert_eq!(inner_of(PackingScheme::Coefficient, &[1, 2], &[3, 4], Some(s)), 11);
    }

    #[test]
    fn test_inner_product_sharded() {
        let v: Vec<i64> = (0..40).map(|i| i % 7 - 3).collect();
        let w: Vec<i64> = (0..40).map(|i| i % 5 - 2).collect();
        let expected: i128 = v.iter().zip(&w).map(|(a, b)| i128::from(a * b)).sum();
        for scheme in SCHEMES {
            assert_eq!(inner_of(scheme, &v, &w, None), expected);
        }
    }

    #[test]
    fn test_inner_product_rejects_mismatch() {
        let b = backend();
        let enc = VectorEncoder::new(b.params(), PackingScheme::Slot);
        let left = vec![enc.encode(&[1, 2, 3]).unwrap().encrypt(&b).unwrap()];
        let right = vec![enc.encode(&[1, 2]).unwrap().encrypt(&b).unwrap()];
        let err = AggregationCircuit::new(b.params()).inner_product(&b, left, right);
        assert!(matches!(err, Err(StatsError::InputShape(_))));
    }

    #[test]
    fn test_coefficient_inner_product_requires_reversed_operand() {
        let b = backend();
        let enc = VectorEncoder::new(b.params(), PackingScheme::Coefficient);
        let left = vec![enc.encode(&[1, 2]).unwrap().encrypt(&b).unwrap()];
        let right = vec![enc.encode(&[3, 4]).unwrap().encrypt(&b).unwrap()];
        let err = AggregationCircuit::new(b.params()).inner_product(&b, left, right);
        assert!(matches!(err, Err(StatsError::InputShape(_))));
    }

    #[test]
    fn test_scaling_with_slots_rejected() {
        let agg = AggregationCircuit::new(&SchemeParams::toy())
            .with_scaling(Some(ScalingContext::new(81, 8091, 65537).unwrap()));
        assert!(agg.plan_sum(PackingScheme::Slot, 1, 4).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_sum_matches_cleartext(values in proptest::collection::vec(-500i64..500, 1..40)) {
            let expected: i128 = values.iter().map(|&v| i128::from(v)).sum();
            for scheme in SCHEMES {
                prop_assert_eq!(sum_of(scheme, &values, None), expected);
            }
        }

        #[test]
        fn prop_padding_invariance(values in proptest::collection::vec(-40i64..40, 1..9), extra in 1usize..8) {
            let mut padded = values.clone();
            padded.resize(values.len() + extra, 0);
            for scheme in SCHEMES {
                prop_assert_eq!(sum_of(scheme, &values, None), sum_of(scheme, &padded, None));
                prop_assert_eq!(
                    inner_of(scheme, &values, &values, None),
                    inner_of(scheme, &padded, &padded, None)
                );
            }
        }

        #[test]
        fn prop_convolution_identity(values in proptest::collection::vec(-45i64..45, 1..17)) {
            let expected: i128 = values.iter().map(|&v| i128::from(v * v)).sum();
            prop_assert_eq!(inner_of(PackingScheme::Coefficient, &values, &values, None), expected);
        }
    }
}

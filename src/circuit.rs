//! Homomorphic circuits as explicit gate graphs.
//!
//! A circuit is built without touching the backend, so its multiplicative
//! depth and rotation-key requirements are known before any ciphertext is
//! produced. [`Circuit::evaluate`] refuses to issue a single backend call
//! for a circuit that does not fit the budget.

use std::collections::BTreeSet;

use itertools::Itertools;
use tracing::debug;

use crate::backend::{ArithmeticBackend, Plaintext};
use crate::encoder::padded_length;
use crate::error::{Result, StatsError};

/// Power-of-two offsets `{1, 2, 4, ..., 2^(k-1)}` of a rotate-and-add
/// reduction over `k = log2(padded_len)` steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPlan {
    offsets: Vec<usize>,
}

impl RotationPlan {
    /// Plan for a vector of `n` elements (padded to the next power of two).
    pub fn for_length(n: usize) -> Result<Self> {
        let padded = padded_length(n)?;
        let steps = padded.trailing_zeros() as usize;
        Ok(Self {
            offsets: (0..steps).map(|i| 1usize << i).collect(),
        })
    }

    /// Offsets in application order.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Number of rotate-and-add steps.
    pub fn steps(&self) -> usize {
        self.offsets.len()
    }
}

/// Handle of a gate inside one [`Circuit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum Gate {
    Input(usize),
    Add(NodeId, NodeId),
    Sub(NodeId, NodeId),
    AddMany(Vec<NodeId>),
    Mul(NodeId, NodeId),
    MulPlain(NodeId, Plaintext),
    Rotate(NodeId, usize),
}

impl Gate {
    fn operands(&self) -> Vec<NodeId> {
        match self {
            Gate::Input(_) => Vec::new(),
            Gate::Add(a, b) | Gate::Sub(a, b) | Gate::Mul(a, b) => vec![*a, *b],
            Gate::AddMany(ids) => ids.clone(),
            Gate::MulPlain(a, _) | Gate::Rotate(a, _) => vec![*a],
        }
    }
}

/// Directed acyclic graph of homomorphic gates, built in topological order.
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    gates: Vec<Gate>,
    depth: Vec<usize>,
    inputs: usize,
    output: Option<NodeId>,
}

impl Circuit {
    /// Empty circuit.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, gate: Gate) -> NodeId {
        let operand_depth = gate
            .operands()
            .iter()
            .map(|id| self.depth[id.0])
            .max()
            .unwrap_or(0);
        let depth = match gate {
            Gate::Mul(..) => operand_depth + 1,
            _ => operand_depth,
        };
        self.gates.push(gate);
        self.depth.push(depth);
        NodeId(self.gates.len() - 1)
    }

    /// Next input ciphertext, bound positionally at evaluation.
    pub fn input(&mut self) -> NodeId {
        let slot = self.inputs;
        self.inputs += 1;
        self.push(Gate::Input(slot))
    }

    /// `a + b`
    pub fn add(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(Gate::Add(a, b))
    }

    /// `a − b`
    pub fn sub(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(Gate::Sub(a, b))
    }

    /// Sum of several nodes; a single node is passed through.
    pub fn add_many(&mut self, ids: &[NodeId]) -> NodeId {
        match ids {
            [only] => *only,
            _ => self.push(Gate::AddMany(ids.to_vec())),
        }
    }

    /// `a × b`, one level deeper than its deepest operand.
    pub fn mul(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(Gate::Mul(a, b))
    }

    /// `a × p`
    pub fn mul_plain(&mut self, a: NodeId, p: Plaintext) -> NodeId {
        self.push(Gate::MulPlain(a, p))
    }

    /// Left rotation of slots.
    pub fn rotate(&mut self, a: NodeId, offset: usize) -> NodeId {
        self.push(Gate::Rotate(a, offset))
    }

    /// Rotate-and-add over every offset of `plan`.
    pub fn rotate_and_sum(&mut self, a: NodeId, plan: &RotationPlan) -> NodeId {
        plan.offsets().iter().fold(a, |acc, &offset| {
            let rotated = self.rotate(acc, offset);
            self.add(acc, rotated)
        })
    }

    /// Mark the node whose value [`evaluate`](Self::evaluate) returns.
    pub fn set_output(&mut self, id: NodeId) {
        self.output = Some(id);
    }

    /// Output node, if set.
    pub fn output(&self) -> Option<NodeId> {
        self.output
    }

    /// Number of input ciphertexts expected.
    pub fn input_count(&self) -> usize {
        self.inputs
    }

    /// Multiplicative depth of one node.
    pub fn depth_of(&self, id: NodeId) -> usize {
        self.depth[id.0]
    }

    /// Longest chain of ciphertext×ciphertext products anywhere in the circuit.
    pub fn depth(&self) -> usize {
        self.depth.iter().copied().max().unwrap_or(0)
    }

    /// Total ciphertext×ciphertext products.
    pub fn multiplications(&self) -> usize {
        self.gates.iter().filter(|g| matches!(g, Gate::Mul(..))).count()
    }

    /// Distinct rotation offsets used.
    pub fn rotation_offsets(&self) -> BTreeSet<usize> {
        self.gates
            .iter()
            .filter_map(|g| match g {
                Gate::Rotate(_, offset) => Some(*offset),
                _ => None,
            })
            .collect()
    }

    /// Reject the circuit if it needs more depth than `budget`.
    pub fn validate(&self, budget: usize) -> Result<()> {
        let required = self.depth();
        if required > budget {
            return Err(StatsError::DepthExceeded { required, budget });
        }
        Ok(())
    }

    /// Run the circuit, taking ownership of `inputs` in declaration order.
    ///
    /// Depth, rotation keys and input arity are all checked before the
    /// first backend call. Intermediate ciphertexts are dropped after their
    /// last use.
    pub fn evaluate<B: ArithmeticBackend>(
        &self,
        backend: &B,
        inputs: Vec<B::Ciphertext>,
    ) -> Result<B::Ciphertext> {
        self.validate(backend.params().depth_budget)?;

        let output = self
            .output
            .ok_or_else(|| StatsError::InputShape("circuit has no output".into()))?;

        if inputs.len() != self.inputs {
            return Err(StatsError::InputShape(format!(
                "circuit expects {} input ciphertexts, got {}",
                self.inputs,
                inputs.len()
            )));
        }

        let offsets = self.rotation_offsets();
        if let Some(missing) = offsets.iter().find(|&&off| !backend.has_rotation_key(off)) {
            return Err(StatsError::Backend(format!(
                "missing rotation key for offset {missing}"
            )));
        }

        debug!(
            gates = self.gates.len(),
            depth = self.depth(),
            multiplications = self.multiplications(),
            "evaluating circuit; rotations [{}]",
            offsets.iter().join(", ")
        );

        let mut remaining = vec![0usize; self.gates.len()];
        for gate in &self.gates {
            for id in gate.operands() {
                remaining[id.0] += 1;
            }
        }
        remaining[output.0] += 1;

        let mut inputs: Vec<Option<B::Ciphertext>> = inputs.into_iter().map(Some).collect();
        let mut values: Vec<Option<B::Ciphertext>> = vec![None; self.gates.len()];

        for (idx, gate) in self.gates.iter().enumerate() {
            let value = match gate {
                Gate::Input(slot) => inputs[*slot]
                    .take()
                    .ok_or_else(|| StatsError::InputShape(format!("input {slot} bound twice")))?,
                Gate::Add(a, b) => backend.add(fetch(&values, *a)?, fetch(&values, *b)?)?,
                Gate::Sub(a, b) => backend.sub(fetch(&values, *a)?, fetch(&values, *b)?)?,
                Gate::AddMany(ids) => {
                    let cts = ids
                        .iter()
                        .map(|id| fetch(&values, *id))
                        .collect::<Result<Vec<_>>>()?;
                    backend.add_many(&cts)?
                }
                Gate::Mul(a, b) => backend.mul(fetch(&values, *a)?, fetch(&values, *b)?)?,
                Gate::MulPlain(a, p) => backend.mul_plain(fetch(&values, *a)?, p)?,
                Gate::Rotate(a, offset) => backend.rotate(fetch(&values, *a)?, *offset)?,
            };

            for id in gate.operands() {
                remaining[id.0] -= 1;
                if remaining[id.0] == 0 {
                    values[id.0] = None;
                }
            }
            values[idx] = Some(value);
        }

        values[output.0]
            .take()
            .ok_or_else(|| StatsError::Backend("circuit output was not produced".into()))
    }
}

fn fetch<C>(values: &[Option<C>], id: NodeId) -> Result<&C> {
    values[id.0]
        .as_ref()
        .ok_or_else(|| StatsError::Backend(format!("gate {} consumed before use", id.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::backend::PackingScheme;
    use crate::clear::ClearBackend;
    use crate::params::SchemeParams;

    /// Backend stub that counts every evaluation call.
    struct CountingBackend {
        params: SchemeParams,
        calls: Cell<usize>,
    }

    impl CountingBackend {
        fn tick(&self) -> Result<u64> {
            self.calls.set(self.calls.get() + 1);
            Ok(0)
        }
    }

    impl ArithmeticBackend for CountingBackend {
        type Ciphertext = u64;

        fn params(&self) -> &SchemeParams {
            &self.params
        }
        fn encrypt(&self, _: &Plaintext) -> Result<u64> {
            self.tick()
        }
        fn decrypt(&self, _: &u64) -> Result<Plaintext> {
            Plaintext::new(PackingScheme::Slot, Vec::new(), &self.params)
        }
        fn add(&self, _: &u64, _: &u64) -> Result<u64> {
            self.tick()
        }
        fn sub(&self, _: &u64, _: &u64) -> Result<u64> {
            self.tick()
        }
        fn mul(&self, _: &u64, _: &u64) -> Result<u64> {
            self.tick()
        }
        fn mul_plain(&self, _: &u64, _: &Plaintext) -> Result<u64> {
            self.tick()
        }
        fn rotate(&self, _: &u64, _: usize) -> Result<u64> {
            self.tick()
        }
        fn has_rotation_key(&self, _: usize) -> bool {
            true
        }
        fn level(&self, _: &u64) -> usize {
            0
        }
    }

    #[test]
    fn test_rotation_plan() {
        assert_eq!(RotationPlan::for_length(4).unwrap().offsets(), &[1, 2]);
        assert_eq!(RotationPlan::for_length(5).unwrap().offsets(), &[1, 2, 4]);
        assert_eq!(RotationPlan::for_length(1).unwrap().steps(), 0);
        assert!(RotationPlan::for_length(0).is_err());
    }

    #[test]
    fn test_depth_tracking() {
        let mut c = Circuit::new();
        let x = c.input();
        let y = c.input();
        let s = c.add(x, y);
        assert_eq!(c.depth_of(s), 0);
        let p = c.mul(x, y);
        let q = c.mul(s, s);
        // independent branches do not compound
        let r = c.sub(p, q);
        assert_eq!(c.depth_of(r), 1);
        let r2 = c.mul(r, x);
        assert_eq!(c.depth_of(r2), 2);
        assert_eq!(c.multiplications(), 3);
        assert_eq!(c.input_count(), 2);
    }

    #[test]
    fn test_three_sequential_mults_rejected_before_backend_calls() {
        let mut c = Circuit::new();
        let x = c.input();
        let x2 = c.mul(x, x);
        let x4 = c.mul(x2, x2);
        let x8 = c.mul(x4, x4);
        c.set_output(x8);

        let backend = CountingBackend {
            params: SchemeParams::toy(),
            calls: Cell::new(0),
        };
        let err = c.evaluate(&backend, vec![7]).unwrap_err();
        assert!(matches!(err, StatsError::DepthExceeded { required: 3, budget: 2 }));
        assert_eq!(backend.calls.get(), 0);
    }

    #[test]
    fn test_missing_rotation_key_detected_up_front() {
        let backend = ClearBackend::keygen(SchemeParams::toy(), &[1]).unwrap();
        let p = Plaintext::from_signed(PackingScheme::Slot, &[1, 2, 3, 4], backend.params()).unwrap();
        let ct = backend.encrypt(&p).unwrap();

        let mut c = Circuit::new();
        let x = c.input();
        let plan = RotationPlan::for_length(4).unwrap();
        let out = c.rotate_and_sum(x, &plan);
        c.set_output(out);
        assert_eq!(c.rotation_offsets().into_iter().collect::<Vec<_>>(), vec![1, 2]);

        let err = c.evaluate(&backend, vec![ct]).unwrap_err();
        assert!(matches!(err, StatsError::Backend(msg) if msg.contains("offset 2")));
    }

    #[test]
    fn test_rotate_and_sum_evaluates() {
        let backend = ClearBackend::keygen(SchemeParams::toy(), &[1, 2]).unwrap();
        let p = Plaintext::from_signed(PackingScheme::Slot, &[1, 2, 3, 4], backend.params()).unwrap();
        let ct = backend.encrypt(&p).unwrap();

        let mut c = Circuit::new();
        let x = c.input();
        let out = c.rotate_and_sum(x, &RotationPlan::for_length(4).unwrap());
        c.set_output(out);

        let result = backend.decrypt(&c.evaluate(&backend, vec![ct]).unwrap()).unwrap();
        assert_eq!(result.values()[0], 10);
    }

    #[test]
    fn test_input_arity_checked() {
        let mut c = Circuit::new();
        let x = c.input();
        c.set_output(x);
        let backend = CountingBackend {
            params: SchemeParams::toy(),
            calls: Cell::new(0),
        };
        assert!(matches!(
            c.evaluate(&backend, vec![]),
            Err(StatsError::InputShape(_))
        ));
    }
}

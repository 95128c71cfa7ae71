//! Arithmetic backend contract.
//!
//! The circuit layer never touches ring elements directly; it issues these
//! calls and treats ciphertexts as opaque handles.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StatsError};
use crate::modular::reduce_signed;
use crate::params::SchemeParams;

/// How a vector is laid out inside one plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackingScheme {
    /// Independent SIMD-like positions; supports rotation and elementwise products.
    Slot,
    /// Polynomial coefficients; products convolve.
    Coefficient,
}

/// Encoded plaintext: N residues mod t, interpreted per packing scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plaintext {
    scheme: PackingScheme,
    values: Vec<u128>,
}

impl Plaintext {
    /// Reduce `values` mod t and zero-fill to the ring dimension.
    pub fn new(scheme: PackingScheme, mut values: Vec<u128>, params: &SchemeParams) -> Result<Self> {
        if values.len() > params.ring_dim {
            return Err(StatsError::EncodingOverflow(format!(
                "{} values exceed ring dimension {}",
                values.len(),
                params.ring_dim
            )));
        }
        let t = params.modulus();
        for v in &mut values {
            *v %= t;
        }
        values.resize(params.ring_dim, 0);
        Ok(Self { scheme, values })
    }

    /// Lift signed integers into Z_t.
    pub fn from_signed(scheme: PackingScheme, values: &[i64], params: &SchemeParams) -> Result<Self> {
        let t = params.modulus();
        let lifted = values
            .iter()
            .map(|&v| reduce_signed(i128::from(v), t))
            .collect();
        Self::new(scheme, lifted, params)
    }

    /// Scalar constant: every slot under slot packing, the constant
    /// coefficient under coefficient packing.
    pub fn constant(scheme: PackingScheme, value: u128, params: &SchemeParams) -> Result<Self> {
        match scheme {
            PackingScheme::Slot => Self::new(scheme, vec![value; params.ring_dim], params),
            PackingScheme::Coefficient => Self::new(scheme, vec![value], params),
        }
    }

    /// `value` at `position`, zero elsewhere.
    pub fn one_hot(scheme: PackingScheme, position: usize, value: u128, params: &SchemeParams) -> Result<Self> {
        if position >= params.ring_dim {
            return Err(StatsError::EncodingOverflow(format!(
                "position {position} outside ring dimension {}",
                params.ring_dim
            )));
        }
        let mut values = vec![0u128; position + 1];
        values[position] = value;
        Self::new(scheme, values, params)
    }

    /// Packing discipline.
    pub fn scheme(&self) -> PackingScheme {
        self.scheme
    }

    /// Residues in `[0, t)`, always `ring_dim` long.
    pub fn values(&self) -> &[u128] {
        &self.values
    }
}

/// Homomorphic primitives consumed by the circuit layer.
///
/// Keys live inside the implementor and are fixed at construction. Only
/// [`mul`](Self::mul) consumes multiplicative depth.
pub trait ArithmeticBackend {
    /// Opaque ciphertext handle.
    type Ciphertext: Clone;

    /// Parameters the keys were generated for.
    fn params(&self) -> &SchemeParams;

    /// Encrypt under the public key.
    fn encrypt(&self, plaintext: &Plaintext) -> Result<Self::Ciphertext>;

    /// Decrypt under the secret key.
    fn decrypt(&self, ciphertext: &Self::Ciphertext) -> Result<Plaintext>;

    /// Ciphertext + ciphertext.
    fn add(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Ciphertext − ciphertext.
    fn sub(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Ciphertext × ciphertext; consumes one level.
    fn mul(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Ciphertext × plaintext; depth-free.
    fn mul_plain(&self, a: &Self::Ciphertext, p: &Plaintext) -> Result<Self::Ciphertext>;

    /// Left-rotate slots by `offset`; needs a rotation key for that offset.
    fn rotate(&self, a: &Self::Ciphertext, offset: usize) -> Result<Self::Ciphertext>;

    /// Whether a rotation key for `offset` was generated.
    fn has_rotation_key(&self, offset: usize) -> bool;

    /// Multiplicative level already consumed by `a`.
    fn level(&self, a: &Self::Ciphertext) -> usize;

    /// Balanced tree of additions; depth-free.
    fn add_many(&self, cts: &[&Self::Ciphertext]) -> Result<Self::Ciphertext> {
        match cts {
            [] => Err(StatsError::InputShape("add_many over no ciphertexts".into())),
            [only] => Ok((*only).clone()),
            _ => {
                let (left, right) = cts.split_at(cts.len() / 2);
                let left = self.add_many(left)?;
                let right = self.add_many(right)?;
                self.add(&left, &right)
            }
        }
    }
}

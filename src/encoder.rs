//! Vector encoding: padding, reversal, alpha-scaling and sharding.

use crate::backend::{ArithmeticBackend, PackingScheme, Plaintext};
use crate::error::{Result, StatsError};
use crate::modular::symmetric_bound;
use crate::params::SchemeParams;
use crate::scaling::ScalingContext;

/// Smallest power of two holding `n` elements.
pub fn padded_length(n: usize) -> Result<usize> {
    if n == 0 {
        return Err(StatsError::InputShape("cannot encode an empty vector".into()));
    }
    n.checked_next_power_of_two()
        .ok_or_else(|| StatsError::EncodingOverflow(format!("length {n} cannot be padded")))
}

/// Cleartext vector laid out for one plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedVector {
    scheme: PackingScheme,
    values: Vec<i64>,
    logical_len: usize,
    reversed: bool,
    scaling: Option<ScalingContext>,
    max_abs: u128,
}

impl EncodedVector {
    /// Packing discipline.
    pub fn scheme(&self) -> PackingScheme {
        self.scheme
    }

    /// Padded, possibly reversed and scaled values.
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// Number of real elements before padding.
    pub fn logical_len(&self) -> usize {
        self.logical_len
    }

    /// Power-of-two length after zero padding.
    pub fn padded_len(&self) -> usize {
        self.values.len()
    }

    /// Whether element order was inverted (over the padded length).
    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Alpha-scaling applied, if any.
    pub fn scaling(&self) -> Option<&ScalingContext> {
        self.scaling.as_ref()
    }

    /// Largest absolute cleartext value, before scaling.
    pub fn max_abs(&self) -> u128 {
        self.max_abs
    }

    /// Lift into Z_t, zero-filled to the ring dimension.
    pub fn to_plaintext(&self, params: &SchemeParams) -> Result<Plaintext> {
        Plaintext::from_signed(self.scheme, &self.values, params)
    }

    /// Encode to a plaintext and encrypt it.
    pub fn encrypt<B: ArithmeticBackend>(&self, backend: &B) -> Result<EncryptedVector<B::Ciphertext>> {
        let plaintext = self.to_plaintext(backend.params())?;
        Ok(EncryptedVector {
            ciphertext: backend.encrypt(&plaintext)?,
            scheme: self.scheme,
            padded_len: self.padded_len(),
            logical_len: self.logical_len,
            reversed: self.reversed,
        })
    }
}

/// Ciphertext handle plus the layout it was encoded with.
#[derive(Debug, Clone)]
pub struct EncryptedVector<C> {
    /// Backend handle; moved into the circuit that consumes it.
    pub ciphertext: C,
    /// Packing discipline.
    pub scheme: PackingScheme,
    /// Power-of-two length after padding.
    pub padded_len: usize,
    /// Real elements before padding.
    pub logical_len: usize,
    /// Whether the payload is the reversed encoding.
    pub reversed: bool,
}

/// Turns cleartext vectors into [`EncodedVector`]s under one packing scheme.
#[derive(Debug, Clone)]
pub struct VectorEncoder {
    params: SchemeParams,
    scheme: PackingScheme,
    scaling: Option<ScalingContext>,
}

impl VectorEncoder {
    /// Encoder without scaling.
    pub fn new(params: &SchemeParams, scheme: PackingScheme) -> Self {
        Self {
            params: *params,
            scheme,
            scaling: None,
        }
    }

    /// Apply alpha-scaling to every encoding. Coefficient packing only.
    pub fn with_scaling(mut self, scaling: ScalingContext) -> Result<Self> {
        if self.scheme != PackingScheme::Coefficient {
            return Err(StatsError::InvalidParams(
                "alpha-scaling applies to coefficient packing only".into(),
            ));
        }
        if scaling.modulus() != self.params.plaintext_modulus {
            return Err(StatsError::InvalidParams(format!(
                "scaling modulus {} differs from plaintext modulus {}",
                scaling.modulus(),
                self.params.plaintext_modulus
            )));
        }
        self.scaling = Some(scaling);
        Ok(self)
    }

    /// Packing discipline.
    pub fn scheme(&self) -> PackingScheme {
        self.scheme
    }

    /// Scaling applied by this encoder.
    pub fn scaling(&self) -> Option<&ScalingContext> {
        self.scaling.as_ref()
    }

    /// Elements one ciphertext can hold.
    pub fn capacity(&self) -> usize {
        self.params.ring_dim
    }

    /// Pad to the next power of two and encode.
    pub fn encode(&self, values: &[i64]) -> Result<EncodedVector> {
        self.encode_padded(values, padded_length(values.len())?, false)
    }

    /// Pad, invert element order over the padded length, and encode.
    ///
    /// Element `i` lands at `padded_len - 1 - i`, so multiplying by the
    /// forward encoding puts the inner product at coefficient `padded_len - 1`.
    pub fn encode_reversed(&self, values: &[i64]) -> Result<EncodedVector> {
        self.encode_padded(values, padded_length(values.len())?, true)
    }

    /// Encode with an explicit padded length.
    pub fn encode_padded(&self, values: &[i64], padded_len: usize, reversed: bool) -> Result<EncodedVector> {
        if values.is_empty() {
            return Err(StatsError::InputShape("cannot encode an empty vector".into()));
        }
        if !padded_len.is_power_of_two() || padded_len < values.len() {
            return Err(StatsError::InputShape(format!(
                "padded length {padded_len} cannot hold {} elements",
                values.len()
            )));
        }
        if padded_len > self.capacity() {
            return Err(StatsError::EncodingOverflow(format!(
                "{} elements (padded to {padded_len}) exceed ciphertext capacity {}; shard the vector",
                values.len(),
                self.capacity()
            )));
        }

        let bound = symmetric_bound(self.params.modulus());
        let max_abs = values
            .iter()
            .map(|v| u128::from(v.unsigned_abs()))
            .max()
            .unwrap_or(0);
        if max_abs > bound {
            return Err(StatsError::EncodingOverflow(format!(
                "value magnitude {max_abs} exceeds symmetric range {bound} of the plaintext modulus"
            )));
        }

        let mut padded = values.to_vec();
        padded.resize(padded_len, 0);
        if reversed {
            padded.reverse();
        }
        if let Some(scaling) = &self.scaling {
            padded = scaling.pre_process(&padded);
        }

        Ok(EncodedVector {
            scheme: self.scheme,
            values: padded,
            logical_len: values.len(),
            reversed,
            scaling: self.scaling,
            max_abs,
        })
    }

    /// Split into shards of at most `capacity` elements, all padded to the
    /// same power-of-two length.
    pub fn shard(&self, values: &[i64], capacity: usize, reversed: bool) -> Result<Vec<EncodedVector>> {
        let padded_len = shard_padded_len(values.len(), capacity)?;
        if capacity > self.capacity() {
            return Err(StatsError::InvalidParams(format!(
                "shard capacity {capacity} exceeds ciphertext capacity {}",
                self.capacity()
            )));
        }
        values
            .chunks(capacity)
            .map(|chunk| self.encode_padded(chunk, padded_len, reversed))
            .collect()
    }

    /// Split into shards that each fill a whole ciphertext.
    pub fn shard_full(&self, values: &[i64]) -> Result<Vec<EncodedVector>> {
        if values.is_empty() {
            return Err(StatsError::InputShape("cannot encode an empty vector".into()));
        }
        let n = self.capacity();
        values
            .chunks(n)
            .map(|chunk| self.encode_padded(chunk, n, false))
            .collect()
    }
}

/// Padded length shared by every shard of a `len`-element vector.
pub fn shard_padded_len(len: usize, capacity: usize) -> Result<usize> {
    if capacity == 0 || !capacity.is_power_of_two() {
        return Err(StatsError::InvalidParams(format!(
            "shard capacity {capacity} must be a power of two"
        )));
    }
    Ok(padded_length(len)?.min(capacity))
}

/// Number of shards a `len`-element vector splits into.
pub fn shard_count(len: usize, capacity: usize) -> usize {
    len.div_ceil(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder(scheme: PackingScheme) -> VectorEncoder {
        VectorEncoder::new(&SchemeParams::toy(), scheme)
    }

    #[test]
    fn test_padding() {
        assert_eq!(padded_length(1).unwrap(), 1);
        assert_eq!(padded_length(4).unwrap(), 4);
        assert_eq!(padded_length(5).unwrap(), 8);
        assert!(matches!(padded_length(0), Err(StatsError::InputShape(_))));

        let e = encoder(PackingScheme::Slot).encode(&[1, 2, 3]).unwrap();
        assert_eq!(e.values(), &[1, 2, 3, 0]);
        assert_eq!(e.logical_len(), 3);
        assert_eq!(e.padded_len(), 4);
    }

    #[test]
    fn test_power_of_two_not_padded() {
        let e = encoder(PackingScheme::Coefficient).encode(&[1, 2, 3, 4]).unwrap();
        assert_eq!(e.values(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_reversed_over_padded_length() {
        let e = encoder(PackingScheme::Coefficient)
            .encode_reversed(&[1, 2, 3])
            .unwrap();
        assert_eq!(e.values(), &[0, 3, 2, 1]);
        assert!(e.is_reversed());
    }

    #[test]
    fn test_empty_rejected() {
        let err = encoder(PackingScheme::Slot).encode(&[]);
        assert!(matches!(err, Err(StatsError::InputShape(_))));
    }

    #[test]
    fn test_capacity_overflow() {
        let values = vec![1i64; 17];
        let err = encoder(PackingScheme::Slot).encode(&values);
        assert!(matches!(err, Err(StatsError::EncodingOverflow(_))));
    }

    #[test]
    fn test_value_out_of_range() {
        let err = encoder(PackingScheme::Slot).encode(&[40000]);
        assert!(matches!(err, Err(StatsError::EncodingOverflow(_))));
        assert!(encoder(PackingScheme::Slot).encode(&[-32768]).is_ok());
    }

    #[test]
    fn test_scaling_applied() {
        let scaling = ScalingContext::new(81, 8091, 65537).unwrap();
        let e = encoder(PackingScheme::Coefficient)
            .with_scaling(scaling)
            .unwrap()
            .encode(&[1, 1, 1])
            .unwrap();
        assert_eq!(e.values(), &[1, 81, 6561, 0]);
        assert_eq!(e.max_abs(), 1);
    }

    #[test]
    fn test_scaling_rejected_for_slots() {
        let scaling = ScalingContext::new(81, 8091, 65537).unwrap();
        assert!(encoder(PackingScheme::Slot).with_scaling(scaling).is_err());
        let other = ScalingContext::standard();
        assert!(encoder(PackingScheme::Coefficient).with_scaling(other).is_err());
    }

    #[test]
    fn test_shard() {
        let values: Vec<i64> = (1..=20).collect();
        let shards = encoder(PackingScheme::Slot).shard(&values, 8, false).unwrap();
        assert_eq!(shards.len(), 3);
        assert!(shards.iter().all(|s| s.padded_len() == 8));
        assert_eq!(shards[2].logical_len(), 4);
        assert_eq!(shards[2].values(), &[17, 18, 19, 20, 0, 0, 0, 0]);
        assert_eq!(shard_count(20, 8), 3);

        let small = encoder(PackingScheme::Slot).shard(&values[..3], 8, false).unwrap();
        assert_eq!(small.len(), 1);
        assert_eq!(small[0].padded_len(), 4);
    }

    #[test]
    fn test_shard_full() {
        let shards = encoder(PackingScheme::Slot).shard_full(&[1, 2, 3]).unwrap();
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].padded_len(), 16);
        assert_eq!(shards[0].logical_len(), 3);
    }

    #[test]
    fn test_encrypt_records_layout() {
        use crate::clear::ClearBackend;
        let backend = ClearBackend::keygen(SchemeParams::toy(), &[]).unwrap();
        let e = encoder(PackingScheme::Coefficient)
            .encode_reversed(&[5, 6, 7])
            .unwrap();
        let c = e.encrypt(&backend).unwrap();
        assert_eq!(c.padded_len, 4);
        assert_eq!(c.logical_len, 3);
        assert!(c.reversed);
        let back = backend.decrypt(&c.ciphertext).unwrap();
        assert_eq!(back, e.to_plaintext(backend.params()).unwrap());
    }
}

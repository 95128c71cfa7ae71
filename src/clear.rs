//! Transparent evaluation backend.
//!
//! Evaluates every primitive exactly over the plaintext ring: `Z_t^N` with
//! cyclic rotation for slot packing, `Z_t[x]/(x^N+1)` for coefficient
//! packing. It enforces what a leveled scheme enforces (depth budget,
//! rotation keys, key ownership) but offers no confidentiality; it exists
//! so circuits can be executed and checked end to end.

use std::collections::BTreeSet;

use itertools::Itertools;
use rand::Rng;
use tracing::debug;

use crate::backend::{ArithmeticBackend, PackingScheme, Plaintext};
use crate::cipher::Cipher;
use crate::error::{Result, StatsError};
use crate::params::SchemeParams;
use crate::polynomial::Polynomial;

/// Encryption key handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(u64);

/// Decryption key handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretKey(u64);

/// Keys produced once by [`ClearBackend::keygen`].
#[derive(Debug, Clone)]
pub struct KeySet {
    /// Used by `encrypt`.
    pub public: PublicKey,
    /// Used by `decrypt`.
    pub secret: SecretKey,
    rotation: BTreeSet<usize>,
}

/// Immutable backend context: parameters plus keys.
#[derive(Debug, Clone)]
pub struct ClearBackend {
    params: SchemeParams,
    keys: KeySet,
}

/// The context every component borrows: created once by `keygen`, never mutated.
pub type BackendContext = ClearBackend;

impl ClearBackend {
    /// Generate keys, including one rotation key per requested offset.
    pub fn keygen(params: SchemeParams, rotation_offsets: &[usize]) -> Result<Self> {
        Self::keygen_with_rng(params, rotation_offsets, &mut rand::thread_rng())
    }

    /// [`keygen`](Self::keygen) with an explicit randomness source.
    pub fn keygen_with_rng<R: Rng>(
        params: SchemeParams,
        rotation_offsets: &[usize],
        rng: &mut R,
    ) -> Result<Self> {
        params.validate()?;
        let id: u64 = rng.gen();
        let rotation: BTreeSet<usize> = rotation_offsets
            .iter()
            .map(|&off| off % params.ring_dim)
            .filter(|&off| off != 0)
            .collect();

        debug!(
            ring_dim = params.ring_dim,
            modulus = params.plaintext_modulus,
            depth_budget = params.depth_budget,
            "generated keys; rotation offsets [{}]",
            rotation.iter().join(", ")
        );

        Ok(Self {
            params,
            keys: KeySet {
                public: PublicKey(id),
                secret: SecretKey(id),
                rotation,
            },
        })
    }

    /// Key material.
    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    fn check_key(&self, a: &Cipher) -> Result<()> {
        if a.key_id == self.keys.public.0 {
            Ok(())
        } else {
            Err(StatsError::Backend(
                "ciphertext was encrypted under a different key set".into(),
            ))
        }
    }

    fn check_pair(&self, a: &Cipher, b: &Cipher) -> Result<()> {
        self.check_key(a)?;
        self.check_key(b)?;
        if a.scheme != b.scheme {
            return Err(StatsError::Backend(format!(
                "cannot combine {:?} and {:?} ciphertexts",
                a.scheme, b.scheme
            )));
        }
        Ok(())
    }

    fn check_plain(&self, a: &Cipher, p: &Plaintext) -> Result<()> {
        self.check_key(a)?;
        if a.scheme != p.scheme() {
            return Err(StatsError::Backend(format!(
                "cannot combine {:?} ciphertext with {:?} plaintext",
                a.scheme,
                p.scheme()
            )));
        }
        Ok(())
    }

    fn zip_with(&self, a: &[u128], b: &[u128], f: impl Fn(u128, u128, u128) -> u128) -> Vec<u128> {
        let t = self.params.modulus();
        a.iter().zip(b).map(|(&x, &y)| f(x, y, t)).collect()
    }

    /// Payload as a ring element; slot and coefficient payloads add alike.
    fn lift(&self, payload: &[u128]) -> Polynomial {
        Polynomial::new(payload.to_vec(), self.params.modulus())
    }

    fn product(&self, scheme: PackingScheme, a: &[u128], b: &[u128]) -> Vec<u128> {
        match scheme {
            PackingScheme::Slot => self.zip_with(a, b, |x, y, t| x * y % t),
            PackingScheme::Coefficient => (&self.lift(a) * &self.lift(b)).coeffs,
        }
    }

    fn derive(&self, a: &Cipher, payload: Vec<u128>, level: usize) -> Cipher {
        Cipher {
            scheme: a.scheme,
            payload,
            level,
            key_id: a.key_id,
        }
    }
}

impl ArithmeticBackend for ClearBackend {
    type Ciphertext = Cipher;

    fn params(&self) -> &SchemeParams {
        &self.params
    }

    fn encrypt(&self, plaintext: &Plaintext) -> Result<Cipher> {
        if plaintext.values().len() != self.params.ring_dim {
            return Err(StatsError::Backend(format!(
                "plaintext of length {} does not match ring dimension {}",
                plaintext.values().len(),
                self.params.ring_dim
            )));
        }
        Ok(Cipher {
            scheme: plaintext.scheme(),
            payload: plaintext.values().to_vec(),
            level: 0,
            key_id: self.keys.public.0,
        })
    }

    fn decrypt(&self, ciphertext: &Cipher) -> Result<Plaintext> {
        if ciphertext.key_id != self.keys.secret.0 {
            return Err(StatsError::Backend(
                "secret key does not match ciphertext".into(),
            ));
        }
        Plaintext::new(ciphertext.scheme, ciphertext.payload.clone(), &self.params)
    }

    fn add(&self, a: &Cipher, b: &Cipher) -> Result<Cipher> {
        self.check_pair(a, b)?;
        let payload = (&self.lift(&a.payload) + &self.lift(&b.payload)).coeffs;
        Ok(self.derive(a, payload, a.level.max(b.level)))
    }

    fn sub(&self, a: &Cipher, b: &Cipher) -> Result<Cipher> {
        self.check_pair(a, b)?;
        let payload = (&self.lift(&a.payload) - &self.lift(&b.payload)).coeffs;
        Ok(self.derive(a, payload, a.level.max(b.level)))
    }

    fn mul(&self, a: &Cipher, b: &Cipher) -> Result<Cipher> {
        self.check_pair(a, b)?;
        let level = a.level.max(b.level) + 1;
        if level > self.params.depth_budget {
            return Err(StatsError::Backend(format!(
                "noise budget exhausted: level {level} exceeds depth budget {}",
                self.params.depth_budget
            )));
        }
        let payload = self.product(a.scheme, &a.payload, &b.payload);
        Ok(self.derive(a, payload, level))
    }

    fn mul_plain(&self, a: &Cipher, p: &Plaintext) -> Result<Cipher> {
        self.check_plain(a, p)?;
        let payload = self.product(a.scheme, &a.payload, p.values());
        Ok(self.derive(a, payload, a.level))
    }

    fn rotate(&self, a: &Cipher, offset: usize) -> Result<Cipher> {
        self.check_key(a)?;
        if a.scheme != PackingScheme::Slot {
            return Err(StatsError::Backend(
                "rotation is only defined for slot packing".into(),
            ));
        }
        let n = self.params.ring_dim;
        let offset = offset % n;
        if offset == 0 {
            return Ok(a.clone());
        }
        if !self.has_rotation_key(offset) {
            return Err(StatsError::Backend(format!(
                "missing rotation key for offset {offset}"
            )));
        }
        let mut payload = a.payload.clone();
        payload.rotate_left(offset);
        Ok(self.derive(a, payload, a.level))
    }

    fn has_rotation_key(&self, offset: usize) -> bool {
        let offset = offset % self.params.ring_dim;
        offset == 0 || self.keys.rotation.contains(&offset)
    }

    fn level(&self, a: &Cipher) -> usize {
        a.level
    }
}

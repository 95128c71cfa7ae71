//! Negacyclic ring element of Z_t[x]/(x^N + 1) with u128 coefficients.
//!
//! Coefficient packing lives here: multiplying two encodings convolves
//! their coefficients, with terms of degree >= N folding back negated.

use std::ops::{Add, Mul, Sub};

use crate::ntt;

/// Products with both operands at most this long use the schoolbook path.
const SCHOOLBOOK_THRESHOLD: usize = 32;

/// f(x) = coeffs[0] + coeffs[1]·x + ... + coeffs[N-1]·x^(N-1)  (mod `modulus`, mod x^N+1)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Polynomial {
    /// Residues in `[0, modulus)`, length N.
    pub coeffs: Vec<u128>,
    /// Coefficient modulus t.
    pub modulus: u128,
}

impl Polynomial {
    /// Reduce `coeffs` into the ring of dimension `coeffs.len()`.
    pub fn new(coeffs: Vec<u128>, modulus: u128) -> Self {
        assert!(modulus > 1, "modulus must exceed 1");
        assert!(!coeffs.is_empty(), "ring dimension must be positive");
        let coeffs = coeffs.into_iter().map(|x| x % modulus).collect();
        Self { coeffs, modulus }
    }

    /// Ring dimension N.
    pub fn dim(&self) -> usize {
        self.coeffs.len()
    }

    fn linear_product(&self, rhs: &Self) -> Vec<u128> {
        let modu = self.modulus;
        let longest = self.coeffs.len().max(rhs.coeffs.len());
        if longest > SCHOOLBOOK_THRESHOLD {
            if let Some(prod) = ntt::convolve(&self.coeffs, &rhs.coeffs, modu) {
                return prod;
            }
        }
        let mut prod = vec![0u128; self.coeffs.len() + rhs.coeffs.len() - 1];
        for (i, &a) in self.coeffs.iter().enumerate() {
            if a == 0 {
                continue;
            }
            for (j, &b) in rhs.coeffs.iter().enumerate() {
                prod[i + j] = (prod[i + j] + a * b) % modu;
            }
        }
        prod
    }
}

impl Add for &Polynomial {
    type Output = Polynomial;
    fn add(self, rhs: Self) -> Self::Output {
        assert_eq!(self.modulus, rhs.modulus, "moduli must match");
        assert_eq!(self.dim(), rhs.dim(), "ring dimensions must match");
        Polynomial {
            coeffs: self
                .coeffs
                .iter()
                .zip(&rhs.coeffs)
                .map(|(a, b)| (a + b) % self.modulus)
                .collect(),
            modulus: self.modulus,
        }
    }
}

impl Add for Polynomial {
    type Output = Polynomial;
    fn add(self, rhs: Self) -> Self::Output {
        &self + &rhs
    }
}

impl Sub for &Polynomial {
    type Output = Polynomial;
    fn sub(self, rhs: Self) -> Self::Output {
        assert_eq!(self.modulus, rhs.modulus, "moduli must match");
        assert_eq!(self.dim(), rhs.dim(), "ring dimensions must match");
        Polynomial {
            coeffs: self
                .coeffs
                .iter()
                .zip(&rhs.coeffs)
                .map(|(a, b)| (self.modulus + a - b) % self.modulus)
                .collect(),
            modulus: self.modulus,
        }
    }
}

impl Sub for Polynomial {
    type Output = Polynomial;
    fn sub(self, rhs: Self) -> Self::Output {
        &self - &rhs
    }
}

impl<'b> Mul<&'b Polynomial> for &Polynomial {
    type Output = Polynomial;

    /// Negacyclic product: x^N = -1.
    fn mul(self, rhs: &'b Polynomial) -> Polynomial {
        assert_eq!(self.modulus, rhs.modulus, "moduli must match");
        assert_eq!(self.dim(), rhs.dim(), "ring dimensions must match");
        let modu = self.modulus;
        let n = self.dim();

        let mut coeffs = vec![0u128; n];
        for (k, c) in self.linear_product(rhs).into_iter().enumerate() {
            if k < n {
                coeffs[k] = (coeffs[k] + c) % modu;
            } else {
                coeffs[k - n] = (coeffs[k - n] + modu - c) % modu;
            }
        }
        Polynomial {
            coeffs,
            modulus: modu,
        }
    }
}

impl Mul<Polynomial> for Polynomial {
    type Output = Polynomial;
    fn mul(self, rhs: Polynomial) -> Polynomial {
        &self * &rhs
    }
}

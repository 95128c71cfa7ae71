//! Number-theoretic transform for linear convolution over Z/tZ.
//!
//! Only usable when the transform length divides `t - 1`; callers check
//! [`supports`] and fall back to the schoolbook product otherwise.

use crate::modular::{mod_inverse, mod_pow, prime_factors};

fn is_primitive_root(g: u128, modu: u128, factors: &[u128]) -> bool {
    factors.iter().all(|&p| mod_pow(g, (modu - 1) / p, modu) != 1)
}

/// Smallest generator of the multiplicative group of a prime field.
fn find_primitive_root(modu: u128) -> Option<u128> {
    let factors = prime_factors(modu - 1);
    (2..modu).find(|&g| is_primitive_root(g, modu, &factors))
}

fn bit_reverse(vec: &mut [u128]) {
    let n = vec.len();
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            vec.swap(i, j);
        }
    }
}

/// in-place NTT / iNTT
fn ntt(a: &mut [u128], invert: bool, modu: u128, g: u128) -> Option<()> {
    let n = a.len();
    bit_reverse(a);

    let mut len = 2;
    while len <= n {
        let w_len = mod_pow(g, (modu - 1) / len as u128, modu);
        let root = if invert {
            mod_inverse(w_len, modu)?
        } else {
            w_len
        };

        for i in (0..n).step_by(len) {
            let mut w = 1u128;
            for j in 0..len / 2 {
                let u = a[i + j];
                let v = a[i + j + len / 2] * w % modu;
                a[i + j] = (u + v) % modu;
                a[i + j + len / 2] = (u + modu - v) % modu;
                w = w * root % modu;
            }
        }
        len <<= 1;
    }

    if invert {
        let inv_n = mod_inverse(n as u128, modu)?;
        for x in a.iter_mut() {
            *x = *x * inv_n % modu;
        }
    }
    Some(())
}

/// Transform length needed for a linear convolution of the given lengths.
pub fn transform_len(a_len: usize, b_len: usize) -> usize {
    (a_len + b_len - 1).next_power_of_two()
}

/// True when a prime `modu` has a root of unity of the required order.
pub fn supports(a_len: usize, b_len: usize, modu: u128) -> bool {
    modu >= 3 && modu & 1 == 1 && (modu - 1) % transform_len(a_len, b_len) as u128 == 0
}

/// Linear convolution `a * b`, exactly `a.len() + b.len() - 1` coefficients.
///
/// `modu` must be prime. `None` when it fails [`supports`] or an inverse
/// needed by the inverse transform does not exist.
pub fn convolve(a: &[u128], b: &[u128], modu: u128) -> Option<Vec<u128>> {
    if !supports(a.len(), b.len(), modu) {
        return None;
    }

    let need = a.len() + b.len() - 1;
    let ntt_len = transform_len(a.len(), b.len());
    let g = find_primitive_root(modu)?;

    let mut fa = vec![0u128; ntt_len];
    let mut fb = vec![0u128; ntt_len];
    fa[..a.len()].copy_from_slice(a);
    fb[..b.len()].copy_from_slice(b);

    ntt(&mut fa, false, modu, g)?;
    ntt(&mut fb, false, modu, g)?;
    for (x, y) in fa.iter_mut().zip(&fb) {
        *x = *x * y % modu;
    }
    ntt(&mut fa, true, modu, g)?;

    fa.truncate(need);
    Some(fa)
}

//! Integer helpers over Z/tZ with u128 intermediates.

use num_integer::Integer;

/// Modular exponentiation.
pub fn mod_pow(base: u128, exponent: u128, modulus: u128) -> u128 {
    if modulus == 1 {
        return 0;
    }
    let mut base = base % modulus;
    let mut exponent = exponent;
    let mut result = 1u128;

    while exponent > 0 {
        if exponent & 1 == 1 {
            result = result * base % modulus;
        }
        base = base * base % modulus;
        exponent >>= 1;
    }

    result
}

/// Modular multiplicative inverse, `None` when `a` and `modulus` share a factor.
pub fn mod_inverse(a: u128, modulus: u128) -> Option<u128> {
    let m = i128::try_from(modulus).ok()?;
    let a = i128::try_from(a % modulus).ok()?;
    let egcd = a.extended_gcd(&m);
    if egcd.gcd != 1 {
        return None;
    }
    u128::try_from(egcd.x.rem_euclid(m)).ok()
}

/// Lift a signed value into `[0, modulus)`.
pub fn reduce_signed(value: i128, modulus: u128) -> u128 {
    // modulus < 2^64 everywhere in this crate, so the cast is lossless
    let m = modulus as i128;
    value.rem_euclid(m) as u128
}

/// Map `[0, modulus)` onto the symmetric range `(-modulus/2, modulus/2]`.
///
/// Residues above `(modulus - 1) / 2` are read as negative.
pub fn center(value: u128, modulus: u128) -> i128 {
    let value = value % modulus;
    if value > (modulus - 1) / 2 {
        value as i128 - modulus as i128
    } else {
        value as i128
    }
}

/// Largest magnitude representable after centering.
pub fn symmetric_bound(modulus: u128) -> u128 {
    (modulus - 1) / 2
}

/// Distinct prime factors by trial division.
pub fn prime_factors(mut n: u128) -> Vec<u128> {
    let mut factors = Vec::new();
    let mut p = 2u128;
    while p * p <= n {
        if n % p == 0 {
            factors.push(p);
            while n % p == 0 {
                n /= p;
            }
        }
        p += if p == 2 { 1 } else { 2 };
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}

/// Deterministic Miller-Rabin; the first twelve primes as witnesses decide
/// every `n < 2^64`.
pub fn is_prime(n: u64) -> bool {
    const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    if n < 2 {
        return false;
    }
    if let Some(&p) = WITNESSES.iter().find(|&&p| n % p == 0) {
        return n == p;
    }

    let n = u128::from(n);
    let s = (n - 1).trailing_zeros();
    let d = (n - 1) >> s;
    WITNESSES.iter().all(|&a| {
        let mut x = mod_pow(u128::from(a), d, n);
        if x == 1 || x == n - 1 {
            return true;
        }
        for _ in 1..s {
            x = x * x % n;
            if x == n - 1 {
                return true;
            }
        }
        false
    })
}

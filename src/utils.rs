// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::errors::{InternalError, Result};
use k256::{
    elliptic_curve::{bigint::Encoding, sec1::ToEncodedPoint, Curve, Field, PrimeField},
    FieldBytes, ProjectivePoint, Scalar, Secp256k1,
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, Rng, RngCore};
use std::ops::Add;
use tracing::error;

pub(crate) const CRYPTOGRAPHIC_RETRY_MAX: usize = 500usize;

/// Wrapper around a secp256k1 [`ProjectivePoint`] so that we can define our
/// own serialization and transcript encoding for it.
///
/// On the wire a point is the object `{xHex, yHex}` of its affine
/// coordinates; see [`crate::serialization`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CurvePoint(pub(crate) ProjectivePoint);

impl CurvePoint {
    /// The generator of the group.
    pub const GENERATOR: Self = CurvePoint(ProjectivePoint::GENERATOR);
    /// The identity point, used to initialize aggregations.
    pub const IDENTITY: Self = CurvePoint(ProjectivePoint::IDENTITY);

    pub(crate) fn multiply_by_scalar(&self, scalar: &Scalar) -> Self {
        Self(self.0 * scalar)
    }

    /// Multiply by a `BigNumber`, which is first reduced modulo the group order.
    pub(crate) fn multiply_by_bignum(&self, point: &BigNumber) -> Result<Self> {
        let s = bn_to_scalar(point)?;
        Ok(self.multiply_by_scalar(&s))
    }

    /// `G^s` for the group generator `G`.
    pub(crate) fn base_mul(scalar: &Scalar) -> Self {
        Self::GENERATOR.multiply_by_scalar(scalar)
    }

    pub(crate) fn is_identity(&self) -> bool {
        self.0 == ProjectivePoint::IDENTITY
    }

    /// The x-coordinate of the point, reduced modulo the group order. This is
    /// the `r` component of an ECDSA signature whose nonce point is `self`.
    pub(crate) fn x_projection(&self) -> Result<Scalar> {
        let encoded = self.0.to_affine().to_encoded_point(false);
        let x = encoded.x().ok_or_else(|| {
            error!("Cannot project the identity point");
            InternalError::InternalInvariantFailed
        })?;
        bn_to_scalar(&BigNumber::from_slice(x))
    }
}

impl Add for CurvePoint {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        CurvePoint(self.0 + rhs.0)
    }
}

impl std::iter::Sum for CurvePoint {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(CurvePoint::IDENTITY, |acc, p| acc + p)
    }
}

impl From<ProjectivePoint> for CurvePoint {
    fn from(p: ProjectivePoint) -> Self {
        Self(p)
    }
}

/// The order of the secp256k1 group as a `BigNumber`.
pub(crate) fn k256_order() -> BigNumber {
    let order_bytes: [u8; 32] = Secp256k1::ORDER.to_be_bytes();
    BigNumber::from_slice(order_bytes)
}

/// Converts a `BigNumber` into a scalar, reducing it modulo the group order.
/// Negative inputs map to the negation of their absolute value.
pub(crate) fn bn_to_scalar(x: &BigNumber) -> Result<Scalar> {
    let is_negative = x < &BigNumber::zero();
    let magnitude = if is_negative { -x.clone() } else { x.clone() };
    let reduced = magnitude.nmod(&k256_order());
    let bytes = reduced.to_bytes();
    if bytes.len() > 32 {
        error!("Reduced value does not fit into a scalar");
        return Err(InternalError::CouldNotConvertToScalar);
    }
    let mut padded = [0u8; 32];
    padded[32 - bytes.len()..].copy_from_slice(&bytes);
    let scalar: Scalar = Option::from(Scalar::from_repr(FieldBytes::from(padded)))
        .ok_or(InternalError::CouldNotConvertToScalar)?;
    Ok(if is_negative { -scalar } else { scalar })
}

pub(crate) fn scalar_to_bn(x: &Scalar) -> BigNumber {
    BigNumber::from_slice(x.to_bytes())
}

pub(crate) fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    <Scalar as Field>::random(rng)
}

/// Samples a non-zero scalar.
pub(crate) fn random_nonzero_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Scalar> {
    std::iter::repeat_with(|| random_scalar(rng))
        .take(CRYPTOGRAPHIC_RETRY_MAX)
        .find(|s| !bool::from(s.is_zero()))
        .ok_or(InternalError::RetryFailed)
}

/// Returns `true` if `value ∊ [-2^n, 2^n]`.
pub(crate) fn within_bound_by_size(value: &BigNumber, n: usize) -> bool {
    let bound = BigNumber::one() << n;
    value <= &bound && value >= &-bound
}

/// Compute a^e (mod n).
#[cfg_attr(feature = "flame_it", flame("utils"))]
pub(crate) fn modpow(a: &BigNumber, e: &BigNumber, n: &BigNumber) -> BigNumber {
    a.modpow(e, n)
}

/// `a mod m` in `[0, m)`, also for negative `a`.
pub(crate) fn positive_mod(a: &BigNumber, m: &BigNumber) -> BigNumber {
    let r = a % m;
    if r < BigNumber::zero() {
        r + m.clone()
    } else {
        r
    }
}

/// Sample a number uniformly at random from the range [0, n).
pub(crate) fn random_positive_bn<R: RngCore + CryptoRng>(rng: &mut R, n: &BigNumber) -> BigNumber {
    BigNumber::from_rng(n, rng)
}

/// Sample a number uniformly at random from the range [-n, n].
pub(crate) fn random_plusminus<R: RngCore + CryptoRng>(rng: &mut R, n: &BigNumber) -> BigNumber {
    // `from_rng()` samples the open interval
    let open_interval_max: BigNumber = n + 1;
    let val = BigNumber::from_rng(&open_interval_max, rng);
    let is_positive: bool = rng.gen();
    match is_positive {
        true => val,
        false => -val,
    }
}

/// Sample a number uniformly at random from the range `[-2^n, 2^n]`.
pub(crate) fn random_plusminus_by_size<R: RngCore + CryptoRng>(rng: &mut R, n: usize) -> BigNumber {
    let range = BigNumber::one() << n;
    random_plusminus(rng, &range)
}

/// Sample a number uniformly at random from the range
/// `[-scale * 2^n, scale * 2^n]`.
pub(crate) fn random_plusminus_scaled<R: RngCore + CryptoRng>(
    rng: &mut R,
    n: usize,
    scale: &BigNumber,
) -> BigNumber {
    let range = (BigNumber::one() << n) * scale;
    random_plusminus(rng, &range)
}

/// Derive a deterministic pseudorandom value in `[-q, q]` from the
/// [`Transcript`], where `q` is the group order.
pub(crate) fn plusminus_challenge_from_transcript(transcript: &mut Transcript) -> Result<BigNumber> {
    let mut is_neg_byte = [0u8; 1];
    transcript.challenge_bytes(b"sampling negation bit", &mut is_neg_byte);
    let is_neg: bool = is_neg_byte[0] & 1 == 1;

    let open_interval_max = k256_order() + 1;
    let b = positive_challenge_from_transcript(transcript, &open_interval_max)?;
    Ok(match is_neg {
        true => -b,
        false => b,
    })
}

/// Derive a deterministic pseudorandom value in `[0, n)` from the
/// [`Transcript`].
pub(crate) fn positive_challenge_from_transcript(
    transcript: &mut Transcript,
    n: &BigNumber,
) -> Result<BigNumber> {
    // Rejection sampling; each retry draws under a fresh transcript state.
    let len = n.to_bytes().len();
    let mut t = vec![0u8; len];
    for _ in 0..CRYPTOGRAPHIC_RETRY_MAX {
        transcript.challenge_bytes(b"sampling randomness", t.as_mut_slice());
        let b = BigNumber::from_slice(t.as_slice());
        if &b < n {
            return Ok(b);
        }
    }
    Err(InternalError::RetryFailed)
}

/// Generate a random `BigNumber` that is in the multiplicative group of
/// integers modulo `n`.
pub(crate) fn random_bn_in_z_star<R: RngCore + CryptoRng>(
    rng: &mut R,
    n: &BigNumber,
) -> Result<BigNumber> {
    std::iter::repeat_with(|| BigNumber::from_rng(n, rng))
        .take(CRYPTOGRAPHIC_RETRY_MAX)
        .find(|result| result != &BigNumber::zero() && result.gcd(n) == BigNumber::one())
        .ok_or(InternalError::RetryFailed)
}

/// Draws 32 uniformly random bytes.
pub(crate) fn random_bytes32<R: RngCore + CryptoRng>(rng: &mut R) -> [u8; 32] {
    let mut out = [0u8; 32];
    rng.fill_bytes(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn test_random_bn_in_range() {
        let mut rng = init_testing();
        // Statistical tests -- should generate random numbers that are long enough
        let mut max_len = 0;
        let num_bytes = 100;

        for _ in 0..1000 {
            let bn = random_plusminus_by_size(&mut rng, num_bytes * 8);
            let len = bn.to_bytes().len();
            if max_len < len {
                max_len = len;
            }
        }

        assert!(max_len > num_bytes - 2);
    }

    #[test]
    fn bn_to_scalar_handles_negatives_and_overflow() -> Result<()> {
        let q = k256_order();
        assert_eq!(bn_to_scalar(&-BigNumber::one())?, -Scalar::ONE);
        assert_eq!(bn_to_scalar(&(q.clone() + BigNumber::from(5u64)))?, Scalar::from(5u64));
        assert_eq!(bn_to_scalar(&q)?, Scalar::ZERO);
        Ok(())
    }

    #[test]
    fn scalar_bignumber_conversion_agrees() -> Result<()> {
        let mut rng = init_testing();
        let s = random_scalar(&mut rng);
        assert_eq!(bn_to_scalar(&scalar_to_bn(&s))?, s);
        Ok(())
    }

    #[test]
    fn positive_mod_is_nonnegative() {
        let m = BigNumber::from(7u64);
        assert_eq!(positive_mod(&-BigNumber::from(3u64), &m), BigNumber::from(4u64));
        assert_eq!(positive_mod(&BigNumber::from(10u64), &m), BigNumber::from(3u64));
    }
}

////////////////////////////
// Test Utility Functions //
////////////////////////////

/// Returns an rng to be used for testing. This will print the rng seed
/// to stderr so that if a test fails, the failing seed can be recovered
/// and used for debugging.
#[cfg(test)]
pub(crate) mod testing {
    use rand::{
        rngs::{OsRng, StdRng},
        Rng, SeedableRng,
    };
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    /// Initialize any fields necessary for our tests. This should be called at
    /// the top of all our tests.
    pub(crate) fn init_testing() -> StdRng {
        let mut seeder = OsRng;
        let seed = seeder.gen();
        eprintln!(
            "To re-run test with the same randomness, use init_testing_with_seed() with the following seed:"
        );
        eprintln!("\t{seed:?}");
        StdRng::from_seed(seed)
    }

    /// A seeded version of [`init_testing`] that also turns on logging,
    /// filtered by `RUST_LOG`. Only meant for debugging a failing run.
    #[allow(unused)]
    pub(crate) fn init_testing_with_seed(seed: [u8; 32]) -> StdRng {
        let stdout_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_filter(EnvFilter::from_default_env());

        // Fails if logging was already set up for this thread, which is fine.
        let _ = tracing_subscriber::registry().with(stdout_layer).try_init();

        StdRng::from_seed(seed)
    }
}

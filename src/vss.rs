// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Shamir secret sharing with Feldman commitments.

use crate::{
    errors::{InternalError, Result},
    protocol::PartyId,
    transcript::TranscriptEncode,
    utils::{random_scalar, CurvePoint},
};
use k256::Scalar;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::ops::Add;
use tracing::error;
use zeroize::ZeroizeOnDrop;

/// A polynomial over the scalar field whose constant term is a secret.
#[derive(Clone, ZeroizeOnDrop)]
pub(crate) struct SecretPolynomial {
    /// Coefficients in increasing order of degree.
    coefficients: Vec<Scalar>,
}

impl std::fmt::Debug for SecretPolynomial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretPolynomial")
            .field("degree", &self.degree())
            .field("coefficients", &"[redacted]")
            .finish()
    }
}

impl SecretPolynomial {
    /// Samples `degree` uniform higher coefficients under a fixed constant.
    pub(crate) fn new<R: RngCore + CryptoRng>(degree: usize, constant: Scalar, rng: &mut R) -> Self {
        let mut coefficients = Vec::with_capacity(degree + 1);
        coefficients.push(constant);
        coefficients.extend(std::iter::repeat_with(|| random_scalar(rng)).take(degree));
        Self { coefficients }
    }

    pub(crate) fn constant(&self) -> Scalar {
        self.coefficients[0]
    }

    pub(crate) fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// Horner's method.
    pub(crate) fn evaluate(&self, x: &Scalar) -> Scalar {
        self.coefficients
            .iter()
            .rev()
            .fold(Scalar::ZERO, |acc, c| acc * x + c)
    }
}

/// Group-element commitments `G^{c_i}` to the coefficients of a
/// [`SecretPolynomial`].
///
/// When `is_constant` is set the committed polynomial has a zero constant
/// term, which is not stored; fresh key generation never produces such an
/// exponent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FeldmanExponent {
    is_constant: bool,
    coefficients: Vec<CurvePoint>,
}

impl FeldmanExponent {
    pub(crate) fn from_poly(poly: &SecretPolynomial) -> Self {
        Self {
            is_constant: false,
            coefficients: poly.coefficients.iter().map(CurvePoint::base_mul).collect(),
        }
    }

    pub(crate) fn is_constant(&self) -> bool {
        self.is_constant
    }

    pub(crate) fn degree(&self) -> usize {
        // An exponent without coefficients is malformed; report degree 0 for
        // it and let the consumer's degree check reject it.
        match self.is_constant {
            true => self.coefficients.len(),
            false => self.coefficients.len().saturating_sub(1),
        }
    }

    /// `G^{poly(0)}`.
    pub(crate) fn constant(&self) -> CurvePoint {
        match self.is_constant {
            true => CurvePoint::IDENTITY,
            false => self
                .coefficients
                .first()
                .copied()
                .unwrap_or(CurvePoint::IDENTITY),
        }
    }

    /// `Σ_i G^{c_i} · x^i`, which equals `G^{poly(x)}`.
    pub(crate) fn evaluate(&self, x: &Scalar) -> CurvePoint {
        let mut result = CurvePoint::IDENTITY;
        // Without the constant term the first stored coefficient has degree 1.
        let mut power = match self.is_constant {
            true => *x,
            false => Scalar::ONE,
        };
        for coefficient in &self.coefficients {
            result = result + coefficient.multiply_by_scalar(&power);
            power *= x;
        }
        result
    }

    /// Checks that this exponent is a well-formed fresh keygen contribution.
    pub(crate) fn check_contribution(&self, threshold: usize) -> Result<()> {
        if self.is_constant {
            error!("Keygen contribution must commit to a non-zero constant");
            return verify_err!("unexpected constant Feldman exponent");
        }
        if self.coefficients.is_empty() || self.degree() != threshold {
            error!(
                "Feldman exponent has degree {}, but the threshold is {}",
                self.degree(),
                threshold
            );
            return verify_err!("Feldman exponent degree does not match the threshold");
        }
        Ok(())
    }
}

impl Add for &FeldmanExponent {
    type Output = Result<FeldmanExponent>;

    /// Coefficient-wise sum; commits to the sum of the two polynomials.
    fn add(self, rhs: &FeldmanExponent) -> Self::Output {
        if self.is_constant != rhs.is_constant || self.coefficients.len() != rhs.coefficients.len()
        {
            error!("Cannot add Feldman exponents of different shapes");
            return Err(InternalError::InternalInvariantFailed);
        }
        Ok(FeldmanExponent {
            is_constant: self.is_constant,
            coefficients: self
                .coefficients
                .iter()
                .zip(&rhs.coefficients)
                .map(|(a, b)| *a + *b)
                .collect(),
        })
    }
}

impl TranscriptEncode for FeldmanExponent {
    fn encode(&self, transcript: &mut Transcript) {
        transcript.append_u64(b"feldman is constant", self.is_constant as u64);
        self.coefficients.encode(transcript);
    }
}

/// The Lagrange coefficient at zero of `party` over the evaluation points of
/// `parties`.
pub(crate) fn lagrange_coefficient_at_zero(party: &PartyId, parties: &[PartyId]) -> Result<Scalar> {
    let x_i = party.eval_point()?;
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;
    for other in parties.iter().filter(|p| *p != party) {
        let x_j = other.eval_point()?;
        numerator *= x_j;
        denominator *= x_j - x_i;
    }
    let inverse: Option<Scalar> = denominator.invert().into();
    Ok(numerator * inverse.ok_or(InternalError::CouldNotInvertScalar)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn feldman_evaluation_matches_polynomial() {
        let mut rng = init_testing();
        let poly = SecretPolynomial::new(3, random_scalar(&mut rng), &mut rng);
        let exponent = FeldmanExponent::from_poly(&poly);
        assert_eq!(exponent.degree(), 3);
        assert!(!exponent.is_constant());

        for _ in 0..10 {
            let x = random_scalar(&mut rng);
            assert_eq!(exponent.evaluate(&x), CurvePoint::base_mul(&poly.evaluate(&x)));
        }
        assert_eq!(poly.evaluate(&Scalar::ZERO), poly.constant());
        assert_eq!(exponent.constant(), CurvePoint::base_mul(&poly.constant()));
    }

    #[test]
    fn summed_exponents_commit_to_summed_shares() -> Result<()> {
        let mut rng = init_testing();
        let p1 = SecretPolynomial::new(2, random_scalar(&mut rng), &mut rng);
        let p2 = SecretPolynomial::new(2, random_scalar(&mut rng), &mut rng);
        let sum = (&FeldmanExponent::from_poly(&p1) + &FeldmanExponent::from_poly(&p2))?;
        let x = random_scalar(&mut rng);
        assert_eq!(sum.evaluate(&x), CurvePoint::base_mul(&(p1.evaluate(&x) + p2.evaluate(&x))));

        let p3 = SecretPolynomial::new(1, random_scalar(&mut rng), &mut rng);
        assert!((&FeldmanExponent::from_poly(&p1) + &FeldmanExponent::from_poly(&p3)).is_err());
        Ok(())
    }

    #[test]
    fn contribution_checks_degree() {
        let mut rng = init_testing();
        let poly = SecretPolynomial::new(2, random_scalar(&mut rng), &mut rng);
        let exponent = FeldmanExponent::from_poly(&poly);
        assert!(exponent.check_contribution(2).is_ok());
        assert!(exponent.check_contribution(1).is_err());

        let mut constant = exponent.clone();
        constant.is_constant = true;
        assert!(constant.check_contribution(2).is_err());
    }

    #[test]
    fn any_quorum_reconstructs_the_secret() -> Result<()> {
        let mut rng = init_testing();
        let secret = random_scalar(&mut rng);
        let poly = SecretPolynomial::new(2, secret, &mut rng);
        let parties: Vec<PartyId> = ["a", "b", "c", "d", "e"].iter().map(|p| PartyId::from(*p)).collect();

        for quorum in [&parties[..3], &parties[1..4], &parties[2..]] {
            let mut reconstructed = Scalar::ZERO;
            for party in quorum {
                let share = poly.evaluate(&party.eval_point()?);
                reconstructed += lagrange_coefficient_at_zero(party, quorum)? * share;
            }
            assert_eq!(reconstructed, secret);
        }

        // Too few shares interpolate to something else.
        let quorum = &parties[..2];
        let mut wrong = Scalar::ZERO;
        for party in quorum {
            wrong += lagrange_coefficient_at_zero(party, quorum)? * poly.evaluate(&party.eval_point()?);
        }
        assert_ne!(wrong, secret);
        Ok(())
    }
}

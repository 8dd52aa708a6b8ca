// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Implements a zero-knowledge proof of knowledge of discrete logarithm.
//!
//! The proof is defined in Figure 22 of CGGMP[^cite]. Key generation commits
//! to the prover's first message `A` in its first round and only reveals the
//! proof in its last one, so the first message is produced separately by
//! [`PiSchPrecommit::new`].
//!
//! [^cite]: Ran Canetti, Rosario Gennaro, Steven Goldfeder, Nikolaos Makriyannis, and Udi Peled.
//! UC Non-Interactive, Proactive, Threshold ECDSA with Identifiable Aborts.
//! [EPrint archive, 2021](https://eprint.iacr.org/2021/060.pdf).

use super::Proof;
use crate::{
    errors::*,
    serialization::scalar_hex,
    transcript::TranscriptEncode,
    utils::{bn_to_scalar, k256_order, positive_challenge_from_transcript, random_scalar, CurvePoint},
};
use k256::Scalar;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;
use zeroize::Zeroize;

/// Proof of knowledge of discrete logarithm of a group element which is the
/// commitment to the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PiSchProof {
    /// Commitment to the secret (`A` in the paper).
    A: CurvePoint,
    /// Fiat-Shamir challenge (`e` in the paper).
    #[serde(with = "scalar_hex")]
    e: Scalar,
    /// Response binding the commitment randomness and the secret (`z` in the
    /// paper).
    #[serde(with = "scalar_hex")]
    z: Scalar,
}

/// The prover's first message together with its randomness.
#[derive(Clone)]
pub(crate) struct PiSchPrecommit {
    A: CurvePoint,
    alpha: Scalar,
}

impl Drop for PiSchPrecommit {
    fn drop(&mut self) {
        self.alpha.zeroize();
    }
}

impl std::fmt::Debug for PiSchPrecommit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiSchPrecommit")
            .field("A", &self.A)
            .field("alpha", &"[redacted]")
            .finish()
    }
}

impl PiSchPrecommit {
    pub(crate) fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let alpha = random_scalar(rng);
        Self {
            A: CurvePoint::base_mul(&alpha),
            alpha,
        }
    }

    /// The first message `A = g^α`.
    pub(crate) fn commitment(&self) -> &CurvePoint {
        &self.A
    }
}

/// Common input: the group element `X` whose discrete logarithm is known to
/// the prover.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CommonInput {
    X: CurvePoint,
}

impl CommonInput {
    pub(crate) fn new(X: &CurvePoint) -> Self {
        Self { X: *X }
    }
}

/// The discrete logarithm `x` of `X`.
pub(crate) struct ProverSecret<'a> {
    x: &'a Scalar,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(x: &'a Scalar) -> Self {
        Self { x }
    }
}

impl PiSchProof {
    /// The first message this proof was produced from.
    pub(crate) fn commitment(&self) -> &CurvePoint {
        &self.A
    }

    /// Completes a proof from a first message produced earlier.
    pub(crate) fn prove_from_precommit(
        precommit: &PiSchPrecommit,
        input: &CommonInput,
        secret: &ProverSecret,
        transcript: &mut Transcript,
    ) -> Result<Self> {
        let e = Self::challenge(input, &precommit.A, transcript)?;
        let z = precommit.alpha + e * secret.x;
        Ok(Self {
            A: precommit.A,
            e,
            z,
        })
    }

    fn challenge(input: &CommonInput, A: &CurvePoint, transcript: &mut Transcript) -> Result<Scalar> {
        transcript.append_message(b"proof", b"PiSchProof");
        input.X.encode(transcript);
        A.encode(transcript);
        let e = positive_challenge_from_transcript(transcript, &k256_order())?;
        bn_to_scalar(&e)
    }
}

impl Proof for PiSchProof {
    type CommonInput = CommonInput;
    type ProverSecret = Scalar;

    fn prove<R: RngCore + CryptoRng>(
        input: &Self::CommonInput,
        secret: &Self::ProverSecret,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let precommit = PiSchPrecommit::new(rng);
        Self::prove_from_precommit(&precommit, input, &ProverSecret::new(secret), transcript)
    }

    fn verify(&self, input: &Self::CommonInput, transcript: &mut Transcript) -> Result<()> {
        let e = Self::challenge(input, &self.A, transcript)?;
        if e != self.e {
            error!("Fiat-Shamir consistency check failed");
            return verify_err!("Fiat-Shamir consistency check failed");
        }

        // g^z == A · X^e
        let lhs = CurvePoint::base_mul(&self.z);
        let rhs = self.A + input.X.multiply_by_scalar(&self.e);
        if lhs != rhs {
            error!("Schnorr verification equation does not hold");
            return verify_err!("Schnorr verification equation does not hold");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    fn transcript() -> Transcript {
        Transcript::new(b"PiSchProof Test")
    }

    #[test]
    fn honest_proof_verifies() -> Result<()> {
        let mut rng = init_testing();
        let x = random_scalar(&mut rng);
        let input = CommonInput::new(&CurvePoint::base_mul(&x));

        let proof = PiSchProof::prove(&input, &x, &mut transcript(), &mut rng)?;
        proof.verify(&input, &mut transcript())?;

        // The proof is bound to its transcript.
        let mut other = Transcript::new(b"another session");
        assert!(proof.verify(&input, &mut other).is_err());
        Ok(())
    }

    #[test]
    fn precommitted_proof_keeps_its_first_message() -> Result<()> {
        let mut rng = init_testing();
        let x = random_scalar(&mut rng);
        let input = CommonInput::new(&CurvePoint::base_mul(&x));
        let precommit = PiSchPrecommit::new(&mut rng);

        let proof = PiSchProof::prove_from_precommit(
            &precommit,
            &input,
            &ProverSecret::new(&x),
            &mut transcript(),
        )?;
        assert_eq!(proof.commitment(), precommit.commitment());
        proof.verify(&input, &mut transcript())?;
        Ok(())
    }

    #[test]
    fn wrong_secret_or_statement_fails() -> Result<()> {
        let mut rng = init_testing();
        let x = random_scalar(&mut rng);
        let input = CommonInput::new(&CurvePoint::base_mul(&x));

        let bad_secret = x + Scalar::ONE;
        let proof = PiSchProof::prove(&input, &bad_secret, &mut transcript(), &mut rng)?;
        assert!(proof.verify(&input, &mut transcript()).is_err());

        let proof = PiSchProof::prove(&input, &x, &mut transcript(), &mut rng)?;
        let other = CommonInput::new(&CurvePoint::base_mul(&random_scalar(&mut rng)));
        assert!(proof.verify(&other, &mut transcript()).is_err());
        Ok(())
    }
}

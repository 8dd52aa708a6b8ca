// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Implements a zero-knowledge proof that [`RingPedersen`] parameters were correctly
//! constructed.
//!
//! In more detail, a valid [`RingPedersen`] object is compromised of a tuple `(N, s, t)`
//! such that `s = t^λ mod N` for some secret `λ`. This module implements a zero-knowledge
//! proof of this fact. The proof is defined in Figure 17 of CGGMP[^cite].
//!
//! This proof utilizes the soundness parameter as specified [here](crate::parameters::SOUNDNESS_PARAMETER).
//!
//! [^cite]: Ran Canetti, Rosario Gennaro, Steven Goldfeder, Nikolaos Makriyannis, and Udi Peled.
//! UC Non-Interactive, Proactive, Threshold ECDSA with Identifiable Aborts.
//! [EPrint archive, 2021](https://eprint.iacr.org/2021/060.pdf).

use super::Proof;
use crate::{
    errors::*, parameters::SOUNDNESS_PARAMETER, ring_pedersen::RingPedersen,
    transcript::TranscriptEncode, utils::*,
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

// Soundness parameter.
const SOUNDNESS: usize = SOUNDNESS_PARAMETER;

/// Proof that externally provided [`RingPedersen`] parameters are constructed correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiPrmProof {
    /// The commitments computed by the prover (`A_i` in the paper).
    commitments: Vec<BigNumber>,
    /// The randomized challenge bytes (`e_i` in the paper).
    challenge_bytes: Vec<u8>,
    /// The prover responses (`z_i` in the paper).
    responses: Vec<BigNumber>,
}

/// The prover's secret knowledge.
///
/// This is comprised of two components:
/// 1. The secret exponent used when generating the [`RingPedersen`] parameters.
/// 2. Euler's totient of [`RingPedersen::modulus`].
pub(crate) struct PiPrmSecret {
    /// The secret exponent that correlates [`RingPedersen`] parameters
    /// [`s`](RingPedersen::s) and [`t`](RingPedersen::t).
    exponent: BigNumber,
    /// Euler's totient of [`RingPedersen::modulus`].
    totient: BigNumber,
}

impl PiPrmSecret {
    /// Collect the secret knowledge for proving [`PiPrmProof`].
    pub(crate) fn new(exponent: BigNumber, totient: BigNumber) -> Self {
        Self { exponent, totient }
    }
}

/// Generates challenge bytes from the proof transcript using the Fiat-Shamir transform.
/// Used by the prover and the verifier.
fn generate_challenge_bytes(
    transcript: &mut Transcript,
    input: &RingPedersen,
    commitments: &[BigNumber],
) -> Vec<u8> {
    transcript.append_message(b"proof", b"PiPrmProof");
    input.encode(transcript);
    commitments.encode(transcript);
    // Extract challenge bytes from the transcript.
    let mut challenges = [0u8; SOUNDNESS];
    transcript.challenge_bytes(b"Challenges", challenges.as_mut_slice());
    challenges.into()
}

impl Proof for PiPrmProof {
    type CommonInput = RingPedersen;
    type ProverSecret = PiPrmSecret;

    #[cfg_attr(feature = "flame_it", flame("PiPrmProof"))]
    fn prove<R: RngCore + CryptoRng>(
        input: &Self::CommonInput,
        secret: &Self::ProverSecret,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        // Sample secret exponents `a_i ← Z[ɸ(N)]`.
        let secret_exponents: Vec<_> =
            std::iter::repeat_with(|| random_positive_bn(rng, &secret.totient))
                .take(SOUNDNESS)
                .collect();
        // Compute commitments values `A_i = t^{a_i} mod N`.
        let commitments = secret_exponents
            .iter()
            .map(|a| modpow(input.t(), a, input.modulus()))
            .collect::<Vec<_>>();
        let challenge_bytes = generate_challenge_bytes(transcript, input, &commitments);
        // Compute challenge responses `z_i = a_i + e_i λ mod ɸ(N)`.
        let responses = challenge_bytes
            .iter()
            .zip(secret_exponents)
            .map(|(e, a)| {
                if e % 2 == 1 {
                    a.modadd(&secret.exponent, &secret.totient)
                } else {
                    a
                }
            })
            .collect();

        Ok(Self {
            commitments,
            challenge_bytes,
            responses,
        })
    }

    #[cfg_attr(feature = "flame_it", flame("PiPrmProof"))]
    fn verify(&self, input: &Self::CommonInput, transcript: &mut Transcript) -> Result<()> {
        input.validate()?;
        // Check that all the lengths equal the soundness parameter.
        if self.commitments.len() != SOUNDNESS
            || self.challenge_bytes.len() != SOUNDNESS
            || self.responses.len() != SOUNDNESS
        {
            error!("length of values provided does not match soundness parameter");
            return verify_err!("length of values provided does not match soundness parameter");
        }
        let challenges = generate_challenge_bytes(transcript, input, &self.commitments);
        // Check Fiat-Shamir consistency.
        if challenges != self.challenge_bytes.as_slice() {
            error!("Fiat-Shamir does not verify");
            return verify_err!("Fiat-Shamir does not verify");
        }

        let is_sound = challenges
            .into_iter()
            .zip(&self.responses)
            .zip(&self.commitments)
            .map(|((e, z), a)| {
                // Verify that `t^{z_i} = {A_i} * s^{e_i} mod N`.
                let lhs = modpow(input.t(), z, input.modulus());
                let rhs = if e % 2 == 1 {
                    a.modmul(input.s(), input.modulus())
                } else {
                    a.clone()
                };
                lhs == rhs
            })
            .all(|check| check);

        if !is_sound {
            error!("response validation check failed");
            return verify_err!("response validation check failed");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ring_pedersen::testing::ring_pedersen, utils::testing::init_testing};

    fn transcript() -> Transcript {
        Transcript::new(b"PiPrmProof Test")
    }

    #[test]
    fn ring_pedersen_proof_verifies() -> Result<()> {
        let mut rng = init_testing();
        let (input, lambda, totient) = ring_pedersen(&mut rng);
        let proof = PiPrmProof::prove(
            &input,
            &PiPrmSecret::new(lambda, totient),
            &mut transcript(),
            &mut rng,
        )?;
        proof.verify(&input, &mut transcript())?;

        let restored: PiPrmProof = deserialize!(&serialize!(&proof)?)?;
        restored.verify(&input, &mut transcript())
    }

    #[test]
    fn wrong_exponent_fails() -> Result<()> {
        let mut rng = init_testing();
        let (input, lambda, totient) = ring_pedersen(&mut rng);
        let proof = PiPrmProof::prove(
            &input,
            &PiPrmSecret::new(lambda + BigNumber::one(), totient),
            &mut transcript(),
            &mut rng,
        )?;
        assert!(proof.verify(&input, &mut transcript()).is_err());
        Ok(())
    }

    #[test]
    fn truncated_proof_fails() -> Result<()> {
        let mut rng = init_testing();
        let (input, lambda, totient) = ring_pedersen(&mut rng);
        let mut proof = PiPrmProof::prove(
            &input,
            &PiPrmSecret::new(lambda, totient),
            &mut transcript(),
            &mut rng,
        )?;
        proof.responses.pop();
        assert!(proof.verify(&input, &mut transcript()).is_err());
        Ok(())
    }
}

// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Implements a zero-knowledge proof of knowledge that the plaintext of a Pailler ciphertext is
//! in a given range.
//!
//! More precisely, this module includes methods to create and verify a non-interactive
//! zero-knowledge proof of knowledge of the plaintext value of a Paillier ciphertext and that
//! the value is in a desired range.
//! The proof is defined in Figure 14 of CGGMP[^cite].
//!
//! In this application, the acceptable range for the plaintext is fixed according to our
//! [parameters](crate::parameters). The plaintext value must be in the range `[-2^ℓ, 2^ℓ]`,
//! where `ℓ` is [`parameters::ELL`](crate::parameters::ELL).
//!
//! [^cite]: Ran Canetti, Rosario Gennaro, Steven Goldfeder, Nikolaos Makriyannis, and Udi Peled.
//! UC Non-Interactive, Proactive, Threshold ECDSA with Identifiable Aborts.
//! [EPrint archive, 2021](https://eprint.iacr.org/2021/060.pdf).

use super::Proof;
use crate::{
    errors::*,
    paillier::{Ciphertext, EncryptionKey, MaskedNonce, Nonce},
    parameters::{ELL, EPSILON},
    ring_pedersen::RingPedersen,
    serialization::bn_hex,
    transcript::TranscriptEncode,
    utils::{plusminus_challenge_from_transcript, random_plusminus_by_size, within_bound_by_size},
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Proof of knowledge of the plaintext value of a ciphertext, where the value is within a desired
/// range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiEncProof {
    /// Commitment to the plaintext value of the ciphertext (`S` in the paper).
    #[serde(with = "bn_hex")]
    plaintext_commit: BigNumber,
    /// Masking ciphertext (`A` in the paper).
    ciphertext_mask: Ciphertext,
    /// Commitment to the plaintext mask (`C` in the paper).
    #[serde(with = "bn_hex")]
    plaintext_mask_commit: BigNumber,
    /// Fiat-Shamir challenge (`e` in the paper).
    #[serde(with = "bn_hex")]
    challenge: BigNumber,
    /// Response binding the plaintext value of the ciphertext and its mask (`z1` in the paper).
    #[serde(with = "bn_hex")]
    plaintext_response: BigNumber,
    /// Response binding the nonce from the original ciphertext and its mask (`z2` in the paper).
    nonce_response: MaskedNonce,
    /// Response binding the commitment randomness used in the two commitments (`z3` in the paper).
    #[serde(with = "bn_hex")]
    randomness_response: BigNumber,
}

/// Common input and setup parameters known to both the prover and verifier.
#[derive(Clone)]
pub(crate) struct PiEncInput {
    /// The verifier's commitment parameters (`(N^hat, s, t)` in the paper).
    setup_params: RingPedersen,
    /// The prover's encryption key (`N_0` in the paper).
    encryption_key: EncryptionKey,
    /// Ciphertext about which we are proving properties (`K` in the paper).
    ciphertext: Ciphertext,
}

impl PiEncInput {
    /// Generate public input for proving or verifying a [`PiEncProof`] about `ciphertext`.
    pub(crate) fn new(
        verifier_setup_params: &RingPedersen,
        prover_encryption_key: &EncryptionKey,
        ciphertext: &Ciphertext,
    ) -> Self {
        Self {
            setup_params: verifier_setup_params.clone(),
            encryption_key: prover_encryption_key.clone(),
            ciphertext: ciphertext.clone(),
        }
    }
}

/// The prover's secret knowledge: the in-range plaintext value of the ciphertext and its
/// corresponding nonce.
pub(crate) struct PiEncSecret {
    plaintext: BigNumber,
    nonce: Nonce,
}

impl PiEncSecret {
    /// Collect secret knowledge for proving a `PiEncProof`.
    ///
    /// The `(plaintext, nonce)` tuple here corresponds to the values `(k, rho)` in the paper.
    pub(crate) fn new(plaintext: &BigNumber, nonce: &Nonce) -> Self {
        Self {
            plaintext: plaintext.clone(),
            nonce: nonce.clone(),
        }
    }
}

impl PiEncProof {
    /// Appends the common input and the prover's first message to the transcript and draws
    /// the challenge.
    fn generate_challenge(
        transcript: &mut Transcript,
        input: &PiEncInput,
        plaintext_commit: &BigNumber,
        ciphertext_mask: &Ciphertext,
        plaintext_mask_commit: &BigNumber,
    ) -> Result<BigNumber> {
        transcript.append_message(b"proof", b"PiEncProof");
        input.setup_params.encode(transcript);
        input.encryption_key.encode(transcript);
        input.ciphertext.encode(transcript);
        plaintext_commit.encode(transcript);
        ciphertext_mask.encode(transcript);
        plaintext_mask_commit.encode(transcript);
        plusminus_challenge_from_transcript(transcript)
    }
}

impl Proof for PiEncProof {
    type CommonInput = PiEncInput;
    type ProverSecret = PiEncSecret;

    #[cfg_attr(feature = "flame_it", flame("PiEncProof"))]
    fn prove<R: RngCore + CryptoRng>(
        input: &Self::CommonInput,
        secret: &Self::ProverSecret,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let PiEncInput {
            setup_params,
            encryption_key,
            ..
        } = input;

        // Sample a mask for the plaintext (aka `alpha`)
        let plaintext_mask = random_plusminus_by_size(rng, ELL + EPSILON);

        // Sample commitment randomness for plaintext and its mask, respectively
        let mu = setup_params.commitment_randomness(ELL, &BigNumber::one(), rng);
        let gamma = setup_params.commitment_randomness(ELL + EPSILON, &BigNumber::one(), rng);

        // Commit to the plaintext (aka `S`)
        let plaintext_commit = setup_params.commit(&secret.plaintext, &mu);
        // Encrypt the mask for the plaintext (aka `A, r`)
        let (ciphertext_mask, nonce_mask) = encryption_key.encrypt(rng, &plaintext_mask)?;
        // Commit to the plaintext mask (aka `C`)
        let plaintext_mask_commit = setup_params.commit(&plaintext_mask, &gamma);

        let challenge = Self::generate_challenge(
            transcript,
            input,
            &plaintext_commit,
            &ciphertext_mask,
            &plaintext_mask_commit,
        )?;

        // Responses: `z1 = α + e k`, `z2 = r · ρ^e`, `z3 = γ + e μ`
        let plaintext_response = &plaintext_mask + &challenge * &secret.plaintext;
        let nonce_response = encryption_key.mask(&secret.nonce, &nonce_mask, &challenge);
        let randomness_response = gamma + &challenge * &mu;

        Ok(Self {
            plaintext_commit,
            ciphertext_mask,
            plaintext_mask_commit,
            challenge,
            plaintext_response,
            nonce_response,
            randomness_response,
        })
    }

    #[cfg_attr(feature = "flame_it", flame("PiEncProof"))]
    fn verify(&self, input: &Self::CommonInput, transcript: &mut Transcript) -> Result<()> {
        input.encryption_key.validate_ciphertext(&self.ciphertext_mask)?;

        // Check Fiat-Shamir challenge consistency
        let challenge = Self::generate_challenge(
            transcript,
            input,
            &self.plaintext_commit,
            &self.ciphertext_mask,
            &self.plaintext_mask_commit,
        )?;
        if challenge != self.challenge {
            error!("Fiat-Shamir consistency check failed");
            return verify_err!("Fiat-Shamir consistency check failed");
        }

        // Check that the plaintext and nonce responses are well-formed (e.g. that the prover did
        // not try to falsify the ciphertext mask)
        let ciphertext_mask_is_well_formed = {
            let lhs = input
                .encryption_key
                .encrypt_with_nonce(&self.plaintext_response, &self.nonce_response)?;
            let rhs = input.encryption_key.multiply_and_add(
                &self.challenge,
                &input.ciphertext,
                &self.ciphertext_mask,
            )?;
            lhs == rhs
        };
        if !ciphertext_mask_is_well_formed {
            error!("ciphertext mask check (first equality check) failed");
            return verify_err!("ciphertext mask check (first equality check) failed");
        }

        // Check that the plaintext and commitment randomness responses are well formed (e.g. that
        // the prover did not try to falsify its commitments to the plaintext or plaintext mask)
        let responses_match_commitments = {
            let lhs = input
                .setup_params
                .commit(&self.plaintext_response, &self.randomness_response);
            let rhs = input.setup_params.combine(
                &self.plaintext_mask_commit,
                &self.plaintext_commit,
                &self.challenge,
            );
            lhs == rhs
        };
        if !responses_match_commitments {
            error!("response validation check (second equality check) failed");
            return verify_err!("response validation check (second equality check) failed");
        }

        // Make sure the ciphertext response is in range
        if !within_bound_by_size(&self.plaintext_response, ELL + EPSILON) {
            error!("bounds check on plaintext response failed");
            return verify_err!("bounds check on plaintext response failed");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        paillier::testing::decryption_key,
        ring_pedersen::testing::ring_pedersen,
        utils::{random_plusminus, testing::init_testing},
    };

    fn transcript() -> Transcript {
        Transcript::new(b"PiEnc Test")
    }

    fn build_proof<R: RngCore + CryptoRng>(
        rng: &mut R,
        plaintext: BigNumber,
    ) -> Result<(PiEncProof, PiEncInput)> {
        let dk = decryption_key(rng);
        let (setup_params, _, _) = ring_pedersen(rng);
        let encryption_key = dk.encryption_key();
        let (ciphertext, nonce) = encryption_key.encrypt(rng, &plaintext)?;

        let input = PiEncInput::new(&setup_params, &encryption_key, &ciphertext);
        let proof = PiEncProof::prove(
            &input,
            &PiEncSecret::new(&plaintext, &nonce),
            &mut transcript(),
            rng,
        )?;
        Ok((proof, input))
    }

    #[test]
    fn proof_with_valid_plaintext_verifies() -> Result<()> {
        let mut rng = init_testing();
        let plaintext = random_plusminus_by_size(&mut rng, ELL);
        let (proof, input) = build_proof(&mut rng, plaintext)?;
        proof.verify(&input, &mut transcript())?;

        // Proofs survive the wire encoding.
        let restored: PiEncProof = deserialize!(&serialize!(&proof)?)?;
        restored.verify(&input, &mut transcript())
    }

    #[test]
    fn proof_with_out_of_range_plaintext_fails() -> Result<()> {
        let mut rng = init_testing();
        // A plaintext far above 2^{ELL + EPSILON} cannot pass the range check.
        let too_large = BigNumber::one() << (ELL + EPSILON + 64);
        let plaintext = random_plusminus(&mut rng, &too_large) + &too_large;
        let (proof, input) = build_proof(&mut rng, plaintext)?;
        assert!(proof.verify(&input, &mut transcript()).is_err());
        Ok(())
    }

    #[test]
    fn proof_does_not_verify_for_other_ciphertext_or_transcript() -> Result<()> {
        let mut rng = init_testing();
        let plaintext = random_plusminus_by_size(&mut rng, ELL);
        let (proof, input) = build_proof(&mut rng, plaintext.clone())?;

        let mut other_transcript = Transcript::new(b"another session");
        assert!(proof.verify(&input, &mut other_transcript).is_err());

        let (other_ciphertext, _) = input.encryption_key.encrypt(&mut rng, &plaintext)?;
        let other_input = PiEncInput::new(&input.setup_params, &input.encryption_key, &other_ciphertext);
        assert!(proof.verify(&other_input, &mut transcript()).is_err());
        Ok(())
    }
}

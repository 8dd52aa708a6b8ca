// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Implements a zero-knowledge proof that the discrete log of a value in a
//! group is the plaintext of a Paillier ciphertext, and that the plaintext is
//! in range.
//!
//! The proof is defined in Figure 25 of CGGMP[^cite]. Signing uses it twice:
//! once with the group generator as base, to bind the Lagrange-weighted key
//! share to its encryption, and once with `Γ` as base, to bind `Δ_i = Γ^{k_i}`
//! to the encryption of `k_i`.
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
    utils::{
        plusminus_challenge_from_transcript, random_plusminus_by_size, within_bound_by_size,
        CurvePoint,
    },
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Proof of knowledge that the discrete log of a group element is the
/// plaintext of a Paillier ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiLogProof {
    /// Commitment to the secret (`S` in the paper).
    #[serde(with = "bn_hex")]
    S: BigNumber,
    /// Encryption of the mask (`A` in the paper).
    A: Ciphertext,
    /// The mask in the group (`Y` in the paper).
    Y: CurvePoint,
    /// Commitment to the mask (`D` in the paper).
    #[serde(with = "bn_hex")]
    D: BigNumber,
    #[serde(with = "bn_hex")]
    e: BigNumber,
    #[serde(with = "bn_hex")]
    z1: BigNumber,
    z2: MaskedNonce,
    #[serde(with = "bn_hex")]
    z3: BigNumber,
}

#[derive(Clone)]
pub(crate) struct CommonInput {
    /// The verifier's ring-Pedersen parameters.
    setup_params: RingPedersen,
    /// The prover's encryption key (`N_0` in the paper).
    encryption_key: EncryptionKey,
    /// `C = enc(x; ρ)`.
    C: Ciphertext,
    /// `X = g^x`.
    X: CurvePoint,
    /// The base `g`.
    g: CurvePoint,
}

impl CommonInput {
    pub(crate) fn new(
        verifier_setup_params: &RingPedersen,
        prover_encryption_key: &EncryptionKey,
        C: &Ciphertext,
        X: &CurvePoint,
        g: &CurvePoint,
    ) -> Self {
        Self {
            setup_params: verifier_setup_params.clone(),
            encryption_key: prover_encryption_key.clone(),
            C: C.clone(),
            X: *X,
            g: *g,
        }
    }
}

pub(crate) struct ProverSecret {
    x: BigNumber,
    rho: Nonce,
}

impl ProverSecret {
    pub(crate) fn new(x: &BigNumber, rho: &Nonce) -> Self {
        Self {
            x: x.clone(),
            rho: rho.clone(),
        }
    }
}

fn generate_challenge(
    transcript: &mut Transcript,
    input: &CommonInput,
    S: &BigNumber,
    A: &Ciphertext,
    Y: &CurvePoint,
    D: &BigNumber,
) -> Result<BigNumber> {
    transcript.append_message(b"proof", b"PiLogProof");
    input.setup_params.encode(transcript);
    input.encryption_key.encode(transcript);
    input.C.encode(transcript);
    input.X.encode(transcript);
    input.g.encode(transcript);
    S.encode(transcript);
    A.encode(transcript);
    Y.encode(transcript);
    D.encode(transcript);
    plusminus_challenge_from_transcript(transcript)
}

impl Proof for PiLogProof {
    type CommonInput = CommonInput;
    type ProverSecret = ProverSecret;

    #[cfg_attr(feature = "flame_it", flame("PiLogProof"))]
    fn prove<R: RngCore + CryptoRng>(
        input: &Self::CommonInput,
        secret: &Self::ProverSecret,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let alpha = random_plusminus_by_size(rng, ELL + EPSILON);
        let mu = input
            .setup_params
            .commitment_randomness(ELL, &BigNumber::one(), rng);
        let gamma = input
            .setup_params
            .commitment_randomness(ELL + EPSILON, &BigNumber::one(), rng);

        let S = input.setup_params.commit(&secret.x, &mu);
        let (A, r) = input.encryption_key.encrypt(rng, &alpha)?;
        let Y = input.g.multiply_by_bignum(&alpha)?;
        let D = input.setup_params.commit(&alpha, &gamma);

        let e = generate_challenge(transcript, input, &S, &A, &Y, &D)?;

        let z1 = &alpha + &e * &secret.x;
        let z2 = input.encryption_key.mask(&secret.rho, &r, &e);
        let z3 = gamma + &e * &mu;

        Ok(Self {
            S,
            A,
            Y,
            D,
            e,
            z1,
            z2,
            z3,
        })
    }

    #[cfg_attr(feature = "flame_it", flame("PiLogProof"))]
    fn verify(&self, input: &Self::CommonInput, transcript: &mut Transcript) -> Result<()> {
        input.encryption_key.validate_ciphertext(&self.A)?;

        let e = generate_challenge(transcript, input, &self.S, &self.A, &self.Y, &self.D)?;
        if e != self.e {
            error!("Fiat-Shamir consistency check failed");
            return verify_err!("Fiat-Shamir consistency check failed");
        }

        // enc(z1; z2) == A · C^e
        let eq_check_1 = {
            let lhs = input.encryption_key.encrypt_with_nonce(&self.z1, &self.z2)?;
            let rhs = input
                .encryption_key
                .multiply_and_add(&self.e, &input.C, &self.A)?;
            lhs == rhs
        };
        if !eq_check_1 {
            error!("eq_check_1 failed");
            return verify_err!("eq_check_1 failed");
        }

        // g^z1 == Y · X^e
        let eq_check_2 = {
            let lhs = input.g.multiply_by_bignum(&self.z1)?;
            let rhs = self.Y + input.X.multiply_by_bignum(&self.e)?;
            lhs == rhs
        };
        if !eq_check_2 {
            error!("eq_check_2 failed");
            return verify_err!("eq_check_2 failed");
        }

        // s^z1 t^z3 == D · S^e
        let eq_check_3 = {
            let lhs = input.setup_params.commit(&self.z1, &self.z3);
            let rhs = input.setup_params.combine(&self.D, &self.S, &self.e);
            lhs == rhs
        };
        if !eq_check_3 {
            error!("eq_check_3 failed");
            return verify_err!("eq_check_3 failed");
        }

        if !within_bound_by_size(&self.z1, ELL + EPSILON) {
            error!("bounds check on z1 failed");
            return verify_err!("bounds check on z1 failed");
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
        utils::{random_scalar, scalar_to_bn, testing::init_testing},
    };

    fn transcript() -> Transcript {
        Transcript::new(b"PiLogProof Test")
    }

    fn setup<R: RngCore + CryptoRng>(
        rng: &mut R,
        x: &BigNumber,
        g: &CurvePoint,
    ) -> Result<(CommonInput, ProverSecret)> {
        let dk = decryption_key(rng);
        let (setup_params, _, _) = ring_pedersen(rng);
        let ek = dk.encryption_key();
        let (C, rho) = ek.encrypt(rng, x)?;
        let X = g.multiply_by_bignum(x)?;
        Ok((
            CommonInput::new(&setup_params, &ek, &C, &X, g),
            ProverSecret::new(x, &rho),
        ))
    }

    #[test]
    fn proof_over_arbitrary_base_verifies() -> Result<()> {
        let mut rng = init_testing();
        let g = CurvePoint::base_mul(&random_scalar(&mut rng));
        let x = scalar_to_bn(&random_scalar(&mut rng));
        let (input, secret) = setup(&mut rng, &x, &g)?;

        let proof = PiLogProof::prove(&input, &secret, &mut transcript(), &mut rng)?;
        proof.verify(&input, &mut transcript())?;

        // A different base breaks the group equation.
        let mut other = input.clone();
        other.g = CurvePoint::GENERATOR;
        assert!(proof.verify(&other, &mut transcript()).is_err());
        Ok(())
    }

    #[test]
    fn negative_plaintexts_are_supported() -> Result<()> {
        let mut rng = init_testing();
        let x = -scalar_to_bn(&random_scalar(&mut rng));
        let (input, secret) = setup(&mut rng, &x, &CurvePoint::GENERATOR)?;
        let proof = PiLogProof::prove(&input, &secret, &mut transcript(), &mut rng)?;
        proof.verify(&input, &mut transcript())
    }

    #[test]
    fn mismatched_group_element_fails() -> Result<()> {
        let mut rng = init_testing();
        let x = scalar_to_bn(&random_scalar(&mut rng));
        let (mut input, secret) = setup(&mut rng, &x, &CurvePoint::GENERATOR)?;
        input.X = CurvePoint::base_mul(&random_scalar(&mut rng));
        let proof = PiLogProof::prove(&input, &secret, &mut transcript(), &mut rng)?;
        assert!(proof.verify(&input, &mut transcript()).is_err());
        Ok(())
    }
}

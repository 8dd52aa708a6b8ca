// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Implements a zero-knowledge proof that a Paillier ciphertext is an affine
//! transformation of another ciphertext, with the multiplier committed to in
//! the group and the additive term encrypted under the prover's own key.
//!
//! In more detail: given `C` and `D = C^x · enc_0(y; ρ)` under the verifier's
//! key `N_0`, `Y = enc_1(y; ρ_y)` under the prover's key `N_1`, and `X = g^x`,
//! the prover shows knowledge of `x ∊ ±2^ℓ` and `y ∊ ±2^ℓ'` that satisfy these
//! relations. The proof is defined in Figure 15 of CGGMP[^cite].
//!
//! [^cite]: Ran Canetti, Rosario Gennaro, Steven Goldfeder, Nikolaos Makriyannis, and Udi Peled.
//! UC Non-Interactive, Proactive, Threshold ECDSA with Identifiable Aborts.
//! [EPrint archive, 2021](https://eprint.iacr.org/2021/060.pdf).

use super::Proof;
use crate::{
    errors::*,
    paillier::{Ciphertext, EncryptionKey, MaskedNonce, Nonce},
    parameters::{ELL, ELL_PRIME, EPSILON},
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiAffgProof {
    #[serde(with = "bn_hex")]
    S: BigNumber,
    #[serde(with = "bn_hex")]
    T: BigNumber,
    /// `C^α · enc_0(β; r)`.
    A: Ciphertext,
    /// `g^α`.
    B_x: CurvePoint,
    /// `enc_1(β; r_y)`.
    B_y: Ciphertext,
    #[serde(with = "bn_hex")]
    E: BigNumber,
    #[serde(with = "bn_hex")]
    F: BigNumber,
    #[serde(with = "bn_hex")]
    e: BigNumber,
    #[serde(with = "bn_hex")]
    z1: BigNumber,
    #[serde(with = "bn_hex")]
    z2: BigNumber,
    #[serde(with = "bn_hex")]
    z3: BigNumber,
    #[serde(with = "bn_hex")]
    z4: BigNumber,
    w: MaskedNonce,
    w_y: MaskedNonce,
}

#[derive(Clone)]
pub(crate) struct PiAffgInput {
    /// The verifier's ring-Pedersen parameters.
    setup_params: RingPedersen,
    /// The verifier's encryption key (`N_0` in the paper).
    verifier_encryption_key: EncryptionKey,
    /// The prover's encryption key (`N_1` in the paper).
    prover_encryption_key: EncryptionKey,
    C: Ciphertext,
    D: Ciphertext,
    Y: Ciphertext,
    X: CurvePoint,
}

impl PiAffgInput {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        setup_params: &RingPedersen,
        verifier_encryption_key: &EncryptionKey,
        prover_encryption_key: &EncryptionKey,
        C: &Ciphertext,
        D: &Ciphertext,
        Y: &Ciphertext,
        X: &CurvePoint,
    ) -> Self {
        Self {
            setup_params: setup_params.clone(),
            verifier_encryption_key: verifier_encryption_key.clone(),
            prover_encryption_key: prover_encryption_key.clone(),
            C: C.clone(),
            D: D.clone(),
            Y: Y.clone(),
            X: *X,
        }
    }
}

pub(crate) struct PiAffgSecret {
    x: BigNumber,
    y: BigNumber,
    /// Nonce of `enc_0(y)` inside `D`.
    rho: Nonce,
    /// Nonce of `Y`.
    rho_y: Nonce,
}

impl PiAffgSecret {
    pub(crate) fn new(x: &BigNumber, y: &BigNumber, rho: &Nonce, rho_y: &Nonce) -> Self {
        Self {
            x: x.clone(),
            y: y.clone(),
            rho: rho.clone(),
            rho_y: rho_y.clone(),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn generate_challenge(
    transcript: &mut Transcript,
    input: &PiAffgInput,
    S: &BigNumber,
    T: &BigNumber,
    A: &Ciphertext,
    B_x: &CurvePoint,
    B_y: &Ciphertext,
    E: &BigNumber,
    F: &BigNumber,
) -> Result<BigNumber> {
    transcript.append_message(b"proof", b"PiAffgProof");
    input.setup_params.encode(transcript);
    input.verifier_encryption_key.encode(transcript);
    input.prover_encryption_key.encode(transcript);
    input.C.encode(transcript);
    input.D.encode(transcript);
    input.Y.encode(transcript);
    input.X.encode(transcript);
    S.encode(transcript);
    T.encode(transcript);
    A.encode(transcript);
    B_x.encode(transcript);
    B_y.encode(transcript);
    E.encode(transcript);
    F.encode(transcript);
    plusminus_challenge_from_transcript(transcript)
}

impl Proof for PiAffgProof {
    type CommonInput = PiAffgInput;
    type ProverSecret = PiAffgSecret;

    #[cfg_attr(feature = "flame_it", flame("PiAffgProof"))]
    fn prove<R: RngCore + CryptoRng>(
        input: &Self::CommonInput,
        secret: &Self::ProverSecret,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let one = BigNumber::one();
        let alpha = random_plusminus_by_size(rng, ELL + EPSILON);
        let beta = random_plusminus_by_size(rng, ELL_PRIME + EPSILON);
        let gamma = input.setup_params.commitment_randomness(ELL + EPSILON, &one, rng);
        let m = input.setup_params.commitment_randomness(ELL, &one, rng);
        let delta = input.setup_params.commitment_randomness(ELL + EPSILON, &one, rng);
        let mu = input.setup_params.commitment_randomness(ELL, &one, rng);

        let (beta_ciphertext, r) = input.verifier_encryption_key.encrypt(rng, &beta)?;
        let A = input
            .verifier_encryption_key
            .multiply_and_add(&alpha, &input.C, &beta_ciphertext)?;
        let B_x = CurvePoint::GENERATOR.multiply_by_bignum(&alpha)?;
        let (B_y, r_y) = input.prover_encryption_key.encrypt(rng, &beta)?;
        let E = input.setup_params.commit(&alpha, &gamma);
        let S = input.setup_params.commit(&secret.x, &m);
        let F = input.setup_params.commit(&beta, &delta);
        let T = input.setup_params.commit(&secret.y, &mu);

        let e = generate_challenge(transcript, input, &S, &T, &A, &B_x, &B_y, &E, &F)?;

        let z1 = &alpha + &e * &secret.x;
        let z2 = &beta + &e * &secret.y;
        let z3 = gamma + &e * &m;
        let z4 = delta + &e * &mu;
        let w = input.verifier_encryption_key.mask(&secret.rho, &r, &e);
        let w_y = input.prover_encryption_key.mask(&secret.rho_y, &r_y, &e);

        Ok(Self {
            S,
            T,
            A,
            B_x,
            B_y,
            E,
            F,
            e,
            z1,
            z2,
            z3,
            z4,
            w,
            w_y,
        })
    }

    #[cfg_attr(feature = "flame_it", flame("PiAffgProof"))]
    fn verify(&self, input: &Self::CommonInput, transcript: &mut Transcript) -> Result<()> {
        input.verifier_encryption_key.validate_ciphertext(&self.A)?;
        input.prover_encryption_key.validate_ciphertext(&self.B_y)?;

        let e = generate_challenge(
            transcript, input, &self.S, &self.T, &self.A, &self.B_x, &self.B_y, &self.E, &self.F,
        )?;
        if e != self.e {
            error!("Fiat-Shamir consistency check failed");
            return verify_err!("Fiat-Shamir consistency check failed");
        }

        // C^z1 · enc_0(z2; w) == A · D^e
        let eq_check_1 = {
            let ek = &input.verifier_encryption_key;
            let tmp = ek.encrypt_with_nonce(&self.z2, &self.w)?;
            let lhs = ek.multiply_and_add(&self.z1, &input.C, &tmp)?;
            let rhs = ek.multiply_and_add(&self.e, &input.D, &self.A)?;
            lhs == rhs
        };
        if !eq_check_1 {
            error!("eq_check_1 failed");
            return verify_err!("eq_check_1 failed");
        }

        // g^z1 == B_x · X^e
        let eq_check_2 = {
            let lhs = CurvePoint::GENERATOR.multiply_by_bignum(&self.z1)?;
            let rhs = self.B_x + input.X.multiply_by_bignum(&self.e)?;
            lhs == rhs
        };
        if !eq_check_2 {
            error!("eq_check_2 failed");
            return verify_err!("eq_check_2 failed");
        }

        // enc_1(z2; w_y) == B_y · Y^e
        let eq_check_3 = {
            let ek = &input.prover_encryption_key;
            let lhs = ek.encrypt_with_nonce(&self.z2, &self.w_y)?;
            let rhs = ek.multiply_and_add(&self.e, &input.Y, &self.B_y)?;
            lhs == rhs
        };
        if !eq_check_3 {
            error!("eq_check_3 failed");
            return verify_err!("eq_check_3 failed");
        }

        // s^z1 t^z3 == E · S^e
        let eq_check_4 = {
            let lhs = input.setup_params.commit(&self.z1, &self.z3);
            let rhs = input.setup_params.combine(&self.E, &self.S, &self.e);
            lhs == rhs
        };
        if !eq_check_4 {
            error!("eq_check_4 failed");
            return verify_err!("eq_check_4 failed");
        }

        // s^z2 t^z4 == F · T^e
        let eq_check_5 = {
            let lhs = input.setup_params.commit(&self.z2, &self.z4);
            let rhs = input.setup_params.combine(&self.F, &self.T, &self.e);
            lhs == rhs
        };
        if !eq_check_5 {
            error!("eq_check_5 failed");
            return verify_err!("eq_check_5 failed");
        }

        if !within_bound_by_size(&self.z1, ELL + EPSILON) {
            error!("bounds check on z1 failed");
            return verify_err!("bounds check on z1 failed");
        }
        if !within_bound_by_size(&self.z2, ELL_PRIME + EPSILON) {
            error!("bounds check on z2 failed");
            return verify_err!("bounds check on z2 failed");
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
        Transcript::new(b"PiAffgProof Test")
    }

    /// Builds `D = C^x · enc_0(y)` the way signing does.
    fn setup<R: RngCore + CryptoRng>(
        rng: &mut R,
        x: &BigNumber,
        y: &BigNumber,
    ) -> Result<(PiAffgInput, PiAffgSecret)> {
        let verifier_ek = decryption_key(rng).encryption_key();
        let prover_ek = decryption_key(rng).encryption_key();
        let (setup_params, _, _) = ring_pedersen(rng);

        let k = scalar_to_bn(&random_scalar(rng));
        let (C, _) = verifier_ek.encrypt(rng, &k)?;
        let (y_enc, rho) = verifier_ek.encrypt(rng, y)?;
        let D = verifier_ek.multiply_and_add(x, &C, &y_enc)?;
        let (Y, rho_y) = prover_ek.encrypt(rng, y)?;
        let X = CurvePoint::GENERATOR.multiply_by_bignum(x)?;

        let input = PiAffgInput::new(&setup_params, &verifier_ek, &prover_ek, &C, &D, &Y, &X);
        Ok((input, PiAffgSecret::new(x, y, &rho, &rho_y)))
    }

    #[test]
    fn affine_relation_proof_verifies() -> Result<()> {
        let mut rng = init_testing();
        let x = scalar_to_bn(&random_scalar(&mut rng));
        let y = random_plusminus_by_size(&mut rng, ELL_PRIME);
        let (input, secret) = setup(&mut rng, &x, &y)?;

        let proof = PiAffgProof::prove(&input, &secret, &mut transcript(), &mut rng)?;
        proof.verify(&input, &mut transcript())?;

        let restored: PiAffgProof = deserialize!(&serialize!(&proof)?)?;
        restored.verify(&input, &mut transcript())
    }

    #[test]
    fn wrong_group_element_fails() -> Result<()> {
        let mut rng = init_testing();
        let x = scalar_to_bn(&random_scalar(&mut rng));
        let y = random_plusminus_by_size(&mut rng, ELL_PRIME);
        let (mut input, secret) = setup(&mut rng, &x, &y)?;
        input.X = CurvePoint::base_mul(&random_scalar(&mut rng));

        let proof = PiAffgProof::prove(&input, &secret, &mut transcript(), &mut rng)?;
        assert!(proof.verify(&input, &mut transcript()).is_err());
        Ok(())
    }

    #[test]
    fn additive_term_out_of_range_fails() -> Result<()> {
        let mut rng = init_testing();
        let x = scalar_to_bn(&random_scalar(&mut rng));
        let y = (BigNumber::one() << (ELL_PRIME + EPSILON + 8)) + BigNumber::one();
        let (input, secret) = setup(&mut rng, &x, &y)?;

        let proof = PiAffgProof::prove(&input, &secret, &mut transcript(), &mut rng)?;
        assert!(proof.verify(&input, &mut transcript()).is_err());
        Ok(())
    }
}

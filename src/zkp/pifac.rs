// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Implements a zero-knowledge proof that a modulus `N_0` has no small
//! factors, i.e. that both of its factors exceed `2^ℓ`.
//!
//! The proof is defined in Figure 28 of CGGMP[^cite] and is produced against
//! the verifier's ring-Pedersen parameters.
//!
//! [^cite]: Ran Canetti, Rosario Gennaro, Steven Goldfeder, Nikolaos Makriyannis, and Udi Peled.
//! UC Non-Interactive, Proactive, Threshold ECDSA with Identifiable Aborts.
//! [EPrint archive, 2021](https://eprint.iacr.org/2021/060.pdf).

use super::Proof;
use crate::{
    errors::*,
    parameters::{ELL, EPSILON},
    ring_pedersen::RingPedersen,
    serialization::bn_hex,
    transcript::TranscriptEncode,
    utils::{plusminus_challenge_from_transcript, random_plusminus},
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use num_bigint::{BigInt, Sign};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub(crate) struct PiFacProof {
    #[serde(with = "bn_hex")]
    P: BigNumber,
    #[serde(with = "bn_hex")]
    Q: BigNumber,
    #[serde(with = "bn_hex")]
    A: BigNumber,
    #[serde(with = "bn_hex")]
    B: BigNumber,
    #[serde(with = "bn_hex")]
    T: BigNumber,
    #[serde(with = "bn_hex")]
    sigma: BigNumber,
    #[serde(with = "bn_hex")]
    e: BigNumber,
    #[serde(with = "bn_hex")]
    z1: BigNumber,
    #[serde(with = "bn_hex")]
    z2: BigNumber,
    #[serde(with = "bn_hex")]
    w1: BigNumber,
    #[serde(with = "bn_hex")]
    w2: BigNumber,
    #[serde(with = "bn_hex")]
    v: BigNumber,
}

#[derive(Clone)]
pub(crate) struct PiFacInput {
    setup_params: RingPedersen,
    N0: BigNumber,
}

impl PiFacInput {
    pub(crate) fn new(verifier_setup_params: &RingPedersen, N0: &BigNumber) -> Self {
        Self {
            setup_params: verifier_setup_params.clone(),
            N0: N0.clone(),
        }
    }
}

pub(crate) struct PiFacSecret {
    p: BigNumber,
    q: BigNumber,
}

impl PiFacSecret {
    pub(crate) fn new(p: &BigNumber, q: &BigNumber) -> Self {
        Self {
            p: p.clone(),
            q: q.clone(),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn generate_challenge(
    transcript: &mut Transcript,
    input: &PiFacInput,
    P: &BigNumber,
    Q: &BigNumber,
    A: &BigNumber,
    B: &BigNumber,
    T: &BigNumber,
    sigma: &BigNumber,
) -> Result<BigNumber> {
    transcript.append_message(b"proof", b"PiFacProof");
    input.setup_params.encode(transcript);
    input.N0.encode(transcript);
    for value in [P, Q, A, B, T, sigma] {
        value.encode(transcript);
    }
    plusminus_challenge_from_transcript(transcript)
}

/// `2^{ℓ+ε} · sqrt(N_0)`, the range of the masks of `p` and `q`.
fn factor_mask_range(N0: &BigNumber) -> BigNumber {
    (BigNumber::one() << (ELL + EPSILON)) * sqrt(N0)
}

impl Proof for PiFacProof {
    type CommonInput = PiFacInput;
    type ProverSecret = PiFacSecret;

    #[cfg_attr(feature = "flame_it", flame("PiFacProof"))]
    fn prove<R: RngCore + CryptoRng>(
        input: &Self::CommonInput,
        secret: &Self::ProverSecret,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let setup = &input.setup_params;
        let one = BigNumber::one();
        let ab_range = factor_mask_range(&input.N0);

        let alpha = random_plusminus(rng, &ab_range);
        let beta = random_plusminus(rng, &ab_range);
        // 2^ℓ · N_hat
        let mu = setup.commitment_randomness(ELL, &one, rng);
        let nu = setup.commitment_randomness(ELL, &one, rng);
        // 2^ℓ · N_0 · N_hat
        let sigma = setup.commitment_randomness(ELL, &input.N0, rng);
        // 2^{ℓ+ε} · N_0 · N_hat
        let r = setup.commitment_randomness(ELL + EPSILON, &input.N0, rng);
        // 2^{ℓ+ε} · N_hat
        let x = setup.commitment_randomness(ELL + EPSILON, &one, rng);
        let y = setup.commitment_randomness(ELL + EPSILON, &one, rng);

        let P = setup.commit(&secret.p, &mu);
        let Q = setup.commit(&secret.q, &nu);
        let A = setup.commit(&alpha, &x);
        let B = setup.commit(&beta, &y);
        let T = setup.commit_with_commitment(&Q, &alpha, &r);

        let e = generate_challenge(transcript, input, &P, &Q, &A, &B, &T, &sigma)?;

        let sigma_hat = &sigma - &nu * &secret.p;
        let z1 = &alpha + &e * &secret.p;
        let z2 = &beta + &e * &secret.q;
        let w1 = &x + &e * &mu;
        let w2 = &y + &e * &nu;
        let v = &r + &e * &sigma_hat;

        Ok(Self {
            P,
            Q,
            A,
            B,
            T,
            sigma,
            e,
            z1,
            z2,
            w1,
            w2,
            v,
        })
    }

    #[cfg_attr(feature = "flame_it", flame("PiFacProof"))]
    fn verify(&self, input: &Self::CommonInput, transcript: &mut Transcript) -> Result<()> {
        let setup = &input.setup_params;
        let e = generate_challenge(
            transcript, input, &self.P, &self.Q, &self.A, &self.B, &self.T, &self.sigma,
        )?;
        if e != self.e {
            error!("Fiat-Shamir consistency check failed");
            return verify_err!("Fiat-Shamir consistency check failed");
        }

        // s^z1 t^w1 == A · P^e
        let eq_check_1 =
            setup.commit(&self.z1, &self.w1) == setup.combine(&self.A, &self.P, &self.e);
        if !eq_check_1 {
            error!("eq_check_1 failed");
            return verify_err!("eq_check_1 failed");
        }

        // s^z2 t^w2 == B · Q^e
        let eq_check_2 =
            setup.commit(&self.z2, &self.w2) == setup.combine(&self.B, &self.Q, &self.e);
        if !eq_check_2 {
            error!("eq_check_2 failed");
            return verify_err!("eq_check_2 failed");
        }

        // Q^z1 t^v == T · R^e, where R = s^{N_0} t^sigma
        let eq_check_3 = {
            let R = setup.commit(&input.N0, &self.sigma);
            let lhs = setup.commit_with_commitment(&self.Q, &self.z1, &self.v);
            let rhs = setup.combine(&self.T, &R, &self.e);
            lhs == rhs
        };
        if !eq_check_3 {
            error!("eq_check_3 failed");
            return verify_err!("eq_check_3 failed");
        }

        let z_bound = factor_mask_range(&input.N0);
        let in_range = |z: &BigNumber| z >= &-z_bound.clone() && z <= &z_bound;
        if !in_range(&self.z1) {
            error!("z1 bound check failed");
            return verify_err!("z1 bound check failed");
        }
        if !in_range(&self.z2) {
            error!("z2 bound check failed");
            return verify_err!("z2 bound check failed");
        }

        Ok(())
    }
}

/// Find the square root of a positive BigNumber, rounding down
fn sqrt(num: &BigNumber) -> BigNumber {
    // convert to a struct with a square root function first
    let num_bigint: BigInt = BigInt::from_bytes_be(Sign::Plus, &num.to_bytes());
    let sqrt = num_bigint.sqrt();
    BigNumber::from_slice(sqrt.to_bytes_be().1)
}

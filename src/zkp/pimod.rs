// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Implements a zero-knowledge proof that a modulus `N` is a Paillier-Blum
//! modulus, i.e. a product of two primes congruent to 3 mod 4 with
//! `gcd(N, φ(N)) = 1`.
//!
//! The proof is defined in Figure 16 of CGGMP[^cite]. The prover answers
//! [`SOUNDNESS_PARAMETER`](crate::parameters::SOUNDNESS_PARAMETER) challenges
//! `y_i` with an `N`-th root of `y_i` and a fourth root of
//! `(-1)^{a_i} w^{b_i} y_i`.
//!
//! [^cite]: Ran Canetti, Rosario Gennaro, Steven Goldfeder, Nikolaos Makriyannis, and Udi Peled.
//! UC Non-Interactive, Proactive, Threshold ECDSA with Identifiable Aborts.
//! [EPrint archive, 2021](https://eprint.iacr.org/2021/060.pdf).

use super::Proof;
use crate::{
    errors::*,
    parameters::SOUNDNESS_PARAMETER,
    serialization::bn_hex,
    transcript::TranscriptEncode,
    utils::{
        modpow, positive_challenge_from_transcript, positive_mod, random_bn_in_z_star,
        CRYPTOGRAPHIC_RETRY_MAX,
    },
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiModProof {
    /// A non-residue of Jacobi symbol `-1` (`w` in the paper).
    #[serde(with = "bn_hex")]
    w: BigNumber,
    elements: Vec<PiModProofElements>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PiModProofElements {
    /// Fourth root of `y'` (`x_i` in the paper).
    #[serde(with = "bn_hex")]
    x: BigNumber,
    a: bool,
    b: bool,
    /// `N`-th root of the challenge (`z_i` in the paper).
    #[serde(with = "bn_hex")]
    z: BigNumber,
}

#[derive(Debug, Clone)]
pub(crate) struct CommonInput {
    N: BigNumber,
}

impl CommonInput {
    pub(crate) fn new(N: &BigNumber) -> Self {
        Self { N: N.clone() }
    }
}

/// The factorization of `N`.
pub(crate) struct ProverSecret {
    p: BigNumber,
    q: BigNumber,
}

impl ProverSecret {
    pub(crate) fn new(p: &BigNumber, q: &BigNumber) -> Self {
        Self {
            p: p.clone(),
            q: q.clone(),
        }
    }
}

/// Euler's criterion; `p` must be an odd prime.
fn is_quadratic_residue(a: &BigNumber, p: &BigNumber) -> bool {
    let exp = (p - &BigNumber::one()) / BigNumber::from(2u64);
    modpow(a, &exp, p) == BigNumber::one()
}

/// Finds `x` with `x = a1 (mod p)` and `x = a2 (mod q)`.
fn chinese_remainder_theorem(
    a1: &BigNumber,
    a2: &BigNumber,
    p: &BigNumber,
    q: &BigNumber,
) -> Result<BigNumber> {
    let p_inv = p.invert(q).ok_or(InternalError::NotCoprime)?;
    // x = a1 + p · ((a2 - a1) · p^{-1} mod q)
    let diff = positive_mod(&(a2 - a1), q);
    let h = diff.modmul(&p_inv, q);
    Ok(positive_mod(&(a1 + &(p * &h)), &(p * q)))
}

/// `(-1)^a · w^b · y mod N`.
fn y_prime_from_y(y: &BigNumber, w: &BigNumber, a: bool, b: bool, N: &BigNumber) -> BigNumber {
    let mut y_prime = y.clone();
    if b {
        y_prime = y_prime.modmul(w, N);
    }
    if a {
        y_prime = y_prime.modneg(N);
    }
    y_prime
}

/// A fourth root of the quadratic residue `y` modulo the Blum prime `p`.
///
/// `y^{(p+1)/4}` is the square root of `y` that is itself a residue, so
/// applying the map twice yields `y^{((p+1)/4)^2}`.
fn fourth_root_mod_prime(y: &BigNumber, p: &BigNumber) -> BigNumber {
    let e = (p + &BigNumber::one()) / BigNumber::from(4u64);
    modpow(y, &(&e * &e), p)
}

/// Finds the unique `(a, b)` for which `y' = (-1)^a w^b y` is a quadratic
/// residue mod both primes, and returns a fourth root of `y'`.
fn fourth_root_combination(
    y: &BigNumber,
    w: &BigNumber,
    p: &BigNumber,
    q: &BigNumber,
) -> Result<(bool, bool, BigNumber)> {
    let N = p * q;
    let mut found = None;
    for a in [false, true] {
        for b in [false, true] {
            let y_prime = y_prime_from_y(y, w, a, b, &N);
            if is_quadratic_residue(&y_prime, p) && is_quadratic_residue(&y_prime, q) {
                if found.is_some() {
                    return Err(InternalError::NonUniqueFourthRootsCombination);
                }
                let x = chinese_remainder_theorem(
                    &fourth_root_mod_prime(&y_prime, p),
                    &fourth_root_mod_prime(&y_prime, q),
                    p,
                    q,
                )?;
                found = Some((a, b, x));
            }
        }
    }
    found.ok_or(InternalError::NonUniqueFourthRootsCombination)
}

/// Draws the challenges `y_i` after binding `N` and `w`.
fn generate_challenges(
    transcript: &mut Transcript,
    input: &CommonInput,
    w: &BigNumber,
) -> Result<Vec<BigNumber>> {
    transcript.append_message(b"proof", b"PiModProof");
    input.N.encode(transcript);
    w.encode(transcript);
    (0..SOUNDNESS_PARAMETER)
        .map(|_| positive_challenge_from_transcript(transcript, &input.N))
        .collect()
}

impl Proof for PiModProof {
    type CommonInput = CommonInput;
    type ProverSecret = ProverSecret;

    #[cfg_attr(feature = "flame_it", flame("PiModProof"))]
    fn prove<R: RngCore + CryptoRng>(
        input: &Self::CommonInput,
        secret: &Self::ProverSecret,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let (p, q) = (&secret.p, &secret.q);
        // `w` has Jacobi symbol -1 exactly when it is a residue mod one prime
        // but not the other.
        let mut w = None;
        for _ in 0..CRYPTOGRAPHIC_RETRY_MAX {
            let candidate = random_bn_in_z_star(rng, &input.N)?;
            if is_quadratic_residue(&candidate, p) != is_quadratic_residue(&candidate, q) {
                w = Some(candidate);
                break;
            }
        }
        let w = w.ok_or(InternalError::RetryFailed)?;

        let one = BigNumber::one();
        let phi_n = (p - &one) * (q - &one);
        let n_inverse = input
            .N
            .invert(&phi_n)
            .ok_or(InternalError::CouldNotInvertBigNumber)?;

        let elements = generate_challenges(transcript, input, &w)?
            .into_iter()
            .map(|y| {
                let (a, b, x) = fourth_root_combination(&y, &w, p, q)?;
                let z = modpow(&y, &n_inverse, &input.N);
                Ok(PiModProofElements { x, a, b, z })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { w, elements })
    }

    #[cfg_attr(feature = "flame_it", flame("PiModProof"))]
    fn verify(&self, input: &Self::CommonInput, transcript: &mut Transcript) -> Result<()> {
        let N = &input.N;
        let two = BigNumber::from(2u64);
        if N % &two == BigNumber::zero() {
            error!("N is even");
            return verify_err!("N is even");
        }
        if N.is_prime() {
            error!("N is not composite");
            return verify_err!("N is not composite");
        }
        if self.elements.len() != SOUNDNESS_PARAMETER {
            error!("Number of proof elements does not match the soundness parameter");
            return verify_err!("wrong number of proof elements");
        }

        let challenges = generate_challenges(transcript, input, &self.w)?;
        let four = BigNumber::from(4u64);
        for (y, element) in challenges.iter().zip(&self.elements) {
            // z^N == y (mod N)
            if &modpow(&element.z, N, N) != y {
                error!("z^N != y (mod N)");
                return verify_err!("z^N != y (mod N)");
            }
            // x^4 == y' (mod N)
            let y_prime = y_prime_from_y(y, &self.w, element.a, element.b, N);
            if modpow(&element.x, &four, N) != y_prime {
                error!("x^4 != y' (mod N)");
                return verify_err!("x^4 != y' (mod N)");
            }
        }
        Ok(())
    }
}

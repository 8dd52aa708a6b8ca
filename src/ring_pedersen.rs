// Copyright (c) 2023 Bolt Labs, Inc.
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The ring-Pedersen commitment scheme.
//!
//! This implements the ring-Pedersen commitment scheme as specified in
//! Definition 1.3 of <https://eprint.iacr.org/2021/060.pdf>. Each party
//! derives its parameters `(N, s, t)` from its own Paillier key during key
//! generation and proves them well formed with [Π-prm](crate::zkp::piprm);
//! peers use them as the setup parameters of every range proof addressed to
//! that party.

use crate::{
    errors::Result,
    paillier::DecryptionKey,
    serialization::bn_hex,
    transcript::TranscriptEncode,
    utils::{modpow, random_plusminus_scaled, random_positive_bn},
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// A commitment scheme based on a ring-variant of the Pedersen commitment
/// scheme.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct RingPedersen {
    /// The RSA modulus, corresponding to `N` in the paper.
    #[serde(rename = "nHex", with = "bn_hex")]
    modulus: BigNumber,
    /// Ring-Pedersen parameter `s`.
    #[serde(rename = "sHex", with = "bn_hex")]
    s: BigNumber,
    /// Ring-Pedersen parameter `t`.
    #[serde(rename = "tHex", with = "bn_hex")]
    t: BigNumber,
}

impl RingPedersen {
    /// Extracts a [`RingPedersen`] object and its secret parameters from a
    /// [`DecryptionKey`].
    ///
    /// Alongside the scheme this returns:
    /// 1. the value `λ` such that `s = t^λ mod N`;
    /// 2. Euler's totient of `N`.
    pub(crate) fn extract(
        sk: &DecryptionKey,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<(Self, BigNumber, BigNumber)> {
        let modulus = sk.modulus();
        let totient = sk.totient();
        let tau = random_positive_bn(rng, modulus);
        let lambda = random_positive_bn(rng, totient);
        let t = tau.modpow(&BigNumber::from(2u64), modulus);
        let s = t.modpow(&lambda, modulus);
        let scheme = RingPedersen {
            modulus: modulus.clone(),
            s,
            t,
        };
        Ok((scheme, lambda, totient.clone()))
    }

    /// Checks the public invariants of the parameters: `s` and `t` are
    /// distinct units in `(0, N)`.
    pub(crate) fn validate(&self) -> Result<()> {
        let zero = BigNumber::zero();
        let one = BigNumber::one();
        let in_range = |x: &BigNumber| x > &zero && x < &self.modulus;
        if !in_range(&self.s)
            || !in_range(&self.t)
            || self.s == self.t
            || self.s.gcd(&self.modulus) != one
            || self.t.gcd(&self.modulus) != one
        {
            error!("Ring-Pedersen parameters are malformed");
            return verify_err!("malformed ring-Pedersen parameters");
        }
        Ok(())
    }

    /// Returns the underlying modulus.
    pub(crate) fn modulus(&self) -> &BigNumber {
        &self.modulus
    }

    /// Returns the underlying `s` parameter.
    pub(crate) fn s(&self) -> &BigNumber {
        &self.s
    }

    /// Returns the underlying `t` parameter.
    pub(crate) fn t(&self) -> &BigNumber {
        &self.t
    }

    /// Samples commitment randomness from `± 2^range * scale * N`.
    pub(crate) fn commitment_randomness(
        &self,
        range: usize,
        scale: &BigNumber,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> BigNumber {
        random_plusminus_scaled(rng, range, &(scale * &self.modulus))
    }

    /// `s^value · t^randomness mod N`.
    pub(crate) fn commit(&self, value: &BigNumber, randomness: &BigNumber) -> BigNumber {
        let a = modpow(&self.s, value, &self.modulus);
        let b = modpow(&self.t, randomness, &self.modulus);
        a.modmul(&b, &self.modulus)
    }

    /// `com0 · com1^e mod N`.
    pub(crate) fn combine(&self, com0: &BigNumber, com1: &BigNumber, e: &BigNumber) -> BigNumber {
        com0.modmul(&modpow(com1, e, &self.modulus), &self.modulus)
    }

    /// `com^value · t^randomness mod N`.
    pub(crate) fn commit_with_commitment(
        &self,
        com: &BigNumber,
        value: &BigNumber,
        randomness: &BigNumber,
    ) -> BigNumber {
        modpow(com, value, &self.modulus).modmul(
            &modpow(&self.t, randomness, &self.modulus),
            &self.modulus,
        )
    }
}

impl TranscriptEncode for RingPedersen {
    fn encode(&self, transcript: &mut Transcript) {
        self.modulus.encode(transcript);
        self.s.encode(transcript);
        self.t.encode(transcript);
    }
}

// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Paillier encryption over a Blum modulus.
//!
//! Plaintexts are signed integers in `[-N/2, N/2]`; decryption maps the
//! residue back into that range. The modulus is a product of two primes
//! congruent to 3 mod 4, so it admits the [Π-mod](crate::zkp::pimod) proof.

use crate::{
    errors::{InternalError, Result},
    serialization::bn_hex,
    transcript::TranscriptEncode,
    utils::{modpow, random_bn_in_z_star, CRYPTOGRAPHIC_RETRY_MAX},
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::error;

/// A Paillier ciphertext, an element of `Z*_{N^2}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Ciphertext(BigNumber);

impl Ciphertext {
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }
}

impl Serialize for Ciphertext {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        bn_hex::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Ciphertext {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        bn_hex::deserialize(deserializer).map(Ciphertext)
    }
}

impl TranscriptEncode for Ciphertext {
    fn encode(&self, transcript: &mut Transcript) {
        transcript.append_message(b"ciphertext", &self.0.to_bytes());
    }
}

/// The randomness used to form a ciphertext.
#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Nonce(BigNumber);

impl std::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Nonce([redacted])")
    }
}

/// A nonce combined with a mask, as sent in proof responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct MaskedNonce(BigNumber);

impl MaskedNonce {
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }
}

#[derive(Clone)]
pub(crate) struct EncryptionKey(libpaillier::EncryptionKey);

impl EncryptionKey {
    pub(crate) fn from_modulus(n: BigNumber) -> Result<Self> {
        libpaillier::EncryptionKey::from_bytes(n.to_bytes())
            .map(EncryptionKey)
            .map_err(|_| InternalError::Serialization)
    }

    pub(crate) fn modulus(&self) -> &BigNumber {
        self.0.n()
    }

    fn nn(&self) -> &BigNumber {
        self.0.nn()
    }

    /// Encrypts `x` under a fresh nonce.
    pub(crate) fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        x: &BigNumber,
    ) -> Result<(Ciphertext, Nonce)> {
        let nonce = random_bn_in_z_star(rng, self.modulus())?;
        let c = self.encrypt_with_raw_nonce(x, &nonce)?;
        Ok((c, Nonce(nonce)))
    }

    /// Encrypts `x` under a masked nonce; used by verifiers to recompute a
    /// prover's ciphertext.
    pub(crate) fn encrypt_with_nonce(&self, x: &BigNumber, nonce: &MaskedNonce) -> Result<Ciphertext> {
        self.encrypt_with_raw_nonce(x, &nonce.0)
    }

    /// `(1 + N)^x · nonce^N mod N^2`.
    fn encrypt_with_raw_nonce(&self, x: &BigNumber, nonce: &BigNumber) -> Result<Ciphertext> {
        let n = self.modulus();
        let half_n = n.clone() / BigNumber::from(2u64);
        if x > &half_n || x < &-half_n {
            error!("Paillier plaintext does not fit into the signed range of the modulus");
            return arg_err!("plaintext is too large for the Paillier modulus");
        }
        let nn = self.nn();
        let base = BigNumber::one() + n;
        let a = modpow(&base, x, nn);
        let b = modpow(nonce, n, nn);
        Ok(Ciphertext(a.modmul(&b, nn)))
    }

    /// Homomorphically computes an encryption of `t · Dec(c1) + Dec(c2)`.
    pub(crate) fn multiply_and_add(
        &self,
        t: &BigNumber,
        c1: &Ciphertext,
        c2: &Ciphertext,
    ) -> Result<Ciphertext> {
        let nn = self.nn();
        let c = modpow(&c1.0, t, nn).modmul(&c2.0, nn);
        Ok(Ciphertext(c))
    }

    /// `mask · nonce^e mod N`.
    pub(crate) fn mask(&self, nonce: &Nonce, mask: &Nonce, e: &BigNumber) -> MaskedNonce {
        let n = self.modulus();
        MaskedNonce(mask.0.modmul(&modpow(&nonce.0, e, n), n))
    }

    /// Checks that `c` is an element of `Z*_{N^2}`.
    pub(crate) fn validate_ciphertext(&self, c: &Ciphertext) -> Result<()> {
        if c.0 <= BigNumber::zero() || &c.0 >= self.nn() || c.0.gcd(self.modulus()) != BigNumber::one() {
            error!("Ciphertext is not an element of Z*_(N^2)");
            return verify_err!("malformed Paillier ciphertext");
        }
        Ok(())
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EncryptionKey")
            .field(self.modulus())
            .finish()
    }
}

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.modulus() == other.modulus()
    }
}

impl Eq for EncryptionKey {}

/// The JSON layout of an [`EncryptionKey`].
#[derive(Serialize, Deserialize)]
struct EncryptionKeyRepr {
    #[serde(rename = "nHex", with = "bn_hex")]
    n: BigNumber,
}

impl Serialize for EncryptionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        EncryptionKeyRepr {
            n: self.modulus().clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EncryptionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let repr = EncryptionKeyRepr::deserialize(deserializer)?;
        EncryptionKey::from_modulus(repr.n).map_err(serde::de::Error::custom)
    }
}

impl TranscriptEncode for EncryptionKey {
    fn encode(&self, transcript: &mut Transcript) {
        transcript.append_message(b"paillier modulus", &self.modulus().to_bytes());
    }
}

/// A Paillier secret key; the factorization of the modulus.
#[derive(Clone)]
pub(crate) struct DecryptionKey {
    sk: libpaillier::DecryptionKey,
    p: BigNumber,
    q: BigNumber,
    ek: EncryptionKey,
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("encryption_key", &self.ek)
            .field("primes", &"[redacted]")
            .finish()
    }
}

impl DecryptionKey {
    /// Samples two distinct Blum primes of `prime_bits` bits each.
    pub(crate) fn new<R: RngCore + CryptoRng>(rng: &mut R, prime_bits: usize) -> Result<Self> {
        let p = blum_prime(rng, prime_bits)?;
        let q = std::iter::repeat_with(|| blum_prime(rng, prime_bits))
            .take(CRYPTOGRAPHIC_RETRY_MAX)
            .find(|q| q.as_ref().map_or(true, |q| q != &p))
            .ok_or(InternalError::RetryFailed)??;
        Self::from_primes(p, q)
    }

    /// Rebuilds a key from its primes, checking that they form a Blum
    /// modulus of two equally sized primes.
    pub(crate) fn from_primes(p: BigNumber, q: BigNumber) -> Result<Self> {
        let three = BigNumber::from(3u64);
        let four = BigNumber::from(4u64);
        if &p % &four != three || &q % &four != three || bit_length(&p) != bit_length(&q) {
            error!("Paillier primes must be equally sized and congruent to 3 mod 4");
            return arg_err!("invalid Paillier primes");
        }
        // Checks primality and distinctness.
        let Some(sk) = libpaillier::DecryptionKey::with_primes(&p, &q) else {
            error!("Paillier primes must be distinct primes");
            return arg_err!("invalid Paillier primes");
        };
        let ek = EncryptionKey(libpaillier::EncryptionKey::from(&sk));
        Ok(Self { sk, p, q, ek })
    }

    pub(crate) fn encryption_key(&self) -> EncryptionKey {
        self.ek.clone()
    }

    pub(crate) fn modulus(&self) -> &BigNumber {
        self.ek.modulus()
    }

    pub(crate) fn totient(&self) -> &BigNumber {
        self.sk.totient()
    }

    pub(crate) fn primes(&self) -> (&BigNumber, &BigNumber) {
        (&self.p, &self.q)
    }

    /// Decrypts `c` into the signed range `[-N/2, N/2]`.
    pub(crate) fn decrypt(&self, c: &Ciphertext) -> Result<BigNumber> {
        self.ek.validate_ciphertext(c)?;
        let bytes = self
            .sk
            .decrypt(&c.0)
            .ok_or(InternalError::PaillierDecryptionFailed)?;
        let m = BigNumber::from_slice(bytes);
        let n = self.modulus();
        let half_n = n.clone() / BigNumber::from(2u64);
        Ok(if m > half_n { m - n.clone() } else { m })
    }
}

/// The number of significant bits of a non-negative integer.
pub(crate) fn bit_length(x: &BigNumber) -> usize {
    let bytes = x.to_bytes();
    match bytes.iter().position(|b| *b != 0) {
        Some(i) => (bytes.len() - i) * 8 - bytes[i].leading_zeros() as usize,
        None => 0,
    }
}

/// Samples a prime `p ≡ 3 (mod 4)` of exactly `bits` bits.
fn blum_prime<R: RngCore + CryptoRng>(rng: &mut R, bits: usize) -> Result<BigNumber> {
    let three = BigNumber::from(3u64);
    let four = BigNumber::from(4u64);
    std::iter::repeat_with(|| BigNumber::prime_from_rng(bits, rng))
        .take(CRYPTOGRAPHIC_RETRY_MAX)
        .find(|p| p % &four == three && bit_length(p) == bits)
        .ok_or(InternalError::RetryFailed)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::parameters::PRIME_BITS;

    /// A fresh key at the default size.
    pub(crate) fn decryption_key<R: RngCore + CryptoRng>(rng: &mut R) -> DecryptionKey {
        DecryptionKey::new(rng, PRIME_BITS).unwrap()
    }

    /// An encryption of `Dec(c) + 1` under `ek`.
    pub(crate) fn increment(ek: &EncryptionKey, c: &Ciphertext) -> Ciphertext {
        let generator = BigNumber::one() + ek.modulus();
        Ciphertext(c.0.modmul(&generator, ek.nn()))
    }
}

// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The output of key generation.

use crate::{
    errors::{InternalError, Result},
    paillier::{DecryptionKey, EncryptionKey},
    protocol::PartyId,
    ring_pedersen::RingPedersen,
    serialization::{bn_hex, bytes_hex, scalar_hex},
    utils::CurvePoint,
    vss::lagrange_coefficient_at_zero,
};
use k256::Scalar;
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::error;
use zeroize::Zeroize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Curve {
    #[serde(rename = "secp256k1")]
    Secp256k1,
}

/// The public key material of one party.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyPublicKeyConfig {
    pub(crate) ecdsa_point: CurvePoint,
    pub(crate) elgamal_point: CurvePoint,
    pub(crate) paillier: EncryptionKey,
    pub(crate) pedersen: RingPedersen,
}

impl PartyPublicKeyConfig {
    /// The party's public ECDSA share `X_i = G^{x_i}`.
    pub fn ecdsa_point(&self) -> &CurvePoint {
        &self.ecdsa_point
    }

    pub fn elgamal_point(&self) -> &CurvePoint {
        &self.elgamal_point
    }
}

/// A party's share of a threshold ECDSA key, together with the public
/// material of every party.
///
/// This is created once at the end of a successful key generation session
/// and never changes afterwards.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartySecretKeyConfig {
    curve: Curve,
    pub(crate) party_id: PartyId,
    pub(crate) threshold: usize,
    #[serde(rename = "ecdsaHex", with = "scalar_hex")]
    pub(crate) ecdsa_share: Scalar,
    #[serde(rename = "elgamalHex", with = "scalar_hex")]
    pub(crate) elgamal_secret: Scalar,
    #[serde(with = "decryption_key_hex")]
    pub(crate) paillier: DecryptionKey,
    #[serde(rename = "ridHex", with = "bytes_hex")]
    pub(crate) rid: [u8; 32],
    #[serde(rename = "chainKeyHex", with = "bytes_hex")]
    pub(crate) chain_key: [u8; 32],
    pub(crate) public_party_data: BTreeMap<PartyId, PartyPublicKeyConfig>,
}

impl std::fmt::Debug for PartySecretKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartySecretKeyConfig")
            .field("party_id", &self.party_id)
            .field("threshold", &self.threshold)
            .field("ecdsa_share", &"[redacted]")
            .field("elgamal_secret", &"[redacted]")
            .field("paillier", &self.paillier)
            .field("rid", &hex::encode(self.rid))
            .field("chain_key", &hex::encode(self.chain_key))
            .field("public_party_data", &self.public_party_data)
            .finish()
    }
}

impl Drop for PartySecretKeyConfig {
    fn drop(&mut self) {
        self.ecdsa_share.zeroize();
        self.elgamal_secret.zeroize();
    }
}

impl PartySecretKeyConfig {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        party_id: PartyId,
        threshold: usize,
        ecdsa_share: Scalar,
        elgamal_secret: Scalar,
        paillier: DecryptionKey,
        rid: [u8; 32],
        chain_key: [u8; 32],
        public_party_data: BTreeMap<PartyId, PartyPublicKeyConfig>,
    ) -> Self {
        Self {
            curve: Curve::Secp256k1,
            party_id,
            threshold,
            ecdsa_share,
            elgamal_secret,
            paillier,
            rid,
            chain_key,
            public_party_data,
        }
    }

    pub fn party_id(&self) -> &PartyId {
        &self.party_id
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Every party that took part in key generation, in order.
    pub fn parties(&self) -> Vec<PartyId> {
        self.public_party_data.keys().cloned().collect()
    }

    /// The public key material of `party`.
    pub fn public_data(&self, party: &PartyId) -> Option<&PartyPublicKeyConfig> {
        self.public_party_data.get(party)
    }

    pub fn rid(&self) -> [u8; 32] {
        self.rid
    }

    pub fn chain_key(&self) -> [u8; 32] {
        self.chain_key
    }

    /// The group public key, interpolated from the first `threshold + 1`
    /// public shares.
    pub fn public_key(&self) -> Result<CurvePoint> {
        let quorum: Vec<PartyId> = self
            .public_party_data
            .keys()
            .take(self.threshold + 1)
            .cloned()
            .collect();
        self.public_key_from(&quorum)
    }

    /// The group public key, interpolated from the public shares of `quorum`.
    ///
    /// Any `threshold + 1` distinct parties give the same point.
    pub fn public_key_from(&self, quorum: &[PartyId]) -> Result<CurvePoint> {
        if quorum.len() <= self.threshold {
            error!(
                "Interpolating a degree-{} polynomial needs {} points, got {}",
                self.threshold,
                self.threshold + 1,
                quorum.len()
            );
            return arg_err!("quorum is smaller than threshold + 1");
        }
        quorum
            .iter()
            .map(|id| {
                let data = self
                    .public_party_data
                    .get(id)
                    .ok_or_else(|| InternalError::InvalidArgument(format!("unknown party {id}")))?;
                let lambda = lagrange_coefficient_at_zero(id, quorum)?;
                Ok(data.ecdsa_point.multiply_by_scalar(&lambda))
            })
            .sum()
    }

    /// SHA-256 over the material every party must agree on.
    pub fn public_digest(&self) -> Result<[u8; 32]> {
        let bytes = serialize!(&(
            self.threshold,
            &self.rid,
            &self.chain_key,
            &self.public_party_data
        ))?;
        Ok(Sha256::digest(bytes).into())
    }

    /// The JSON artifact.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            error!("Failed to encode key share: {e}");
            InternalError::Serialization
        })
    }

    /// Parses a JSON artifact and checks that the secret material matches
    /// the party's public entry.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(bytes).map_err(|e| {
            error!("Failed to decode key share: {e}");
            InternalError::Serialization
        })?;
        let own = config.public_party_data.get(&config.party_id).ok_or_else(|| {
            error!("Key share has no public entry for its own party");
            InternalError::Serialization
        })?;
        if CurvePoint::base_mul(&config.ecdsa_share) != own.ecdsa_point
            || CurvePoint::base_mul(&config.elgamal_secret) != own.elgamal_point
            || config.paillier.modulus() != own.paillier.modulus()
        {
            error!("Key share secrets do not match the public entry of their party");
            return Err(InternalError::Serialization);
        }
        Ok(config)
    }

    pub(crate) fn ecdsa_share(&self) -> &Scalar {
        &self.ecdsa_share
    }

    pub(crate) fn paillier(&self) -> &DecryptionKey {
        &self.paillier
    }
}

/// Encodes a [`DecryptionKey`] as its primes, `{pHex, qHex}`.
mod decryption_key_hex {
    use super::*;
    use serde::de::Error;

    #[derive(Serialize, Deserialize)]
    struct Primes {
        #[serde(rename = "pHex", with = "bn_hex")]
        p: BigNumber,
        #[serde(rename = "qHex", with = "bn_hex")]
        q: BigNumber,
    }

    pub(super) fn serialize<S: Serializer>(
        value: &DecryptionKey,
        s: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let (p, q) = value.primes();
        Primes {
            p: p.clone(),
            q: q.clone(),
        }
        .serialize(s)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<DecryptionKey, D::Error> {
        let Primes { p, q } = Primes::deserialize(d)?;
        DecryptionKey::from_primes(p, q).map_err(D::Error::custom)
    }
}

// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Identifiers and configuration shared by every protocol session.

use crate::{
    errors::{InternalError, Result},
    parameters::PRIME_BITS,
    utils::bn_to_scalar,
};
use k256::{elliptic_curve::Field, Scalar};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    collections::BTreeSet,
    fmt::{Debug, Display, Formatter},
    str::FromStr,
    time::Duration,
};
use tracing::error;

/// An opaque, unique party identifier.
///
/// Identifiers are totally ordered; that order fixes the order in which
/// per-party values are aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(String);

impl PartyId {
    /// Creates a party identifier from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A random 32-byte hex identifier.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let random_bytes = rng.gen::<[u8; 32]>();
        Self(hex::encode(random_bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The point at which secret-sharing polynomials are evaluated for this
    /// party: `SHA-256(id) mod q`. Zero is reserved for the shared secret.
    pub(crate) fn eval_point(&self) -> Result<Scalar> {
        let digest = Sha256::digest(self.0.as_bytes());
        let x = bn_to_scalar(&BigNumber::from_slice(digest))?;
        if bool::from(x.is_zero()) {
            error!("Party {} hashes to the zero evaluation point", self);
            return Err(InternalError::InternalInvariantFailed);
        }
        Ok(x)
    }
}

impl Display for PartyId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PartyId {
    type Err = InternalError;
    fn from_str(s: &str) -> Result<Self> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for PartyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A session identifier, agreed on by all parties before a session starts.
///
/// On the wire it is a 32-character hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(u128);

impl Serialize for Identifier {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        let bytes: [u8; 16] = hex::decode(s)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| serde::de::Error::custom("session id must be 16 hex-encoded bytes"))?;
        Ok(Self(u128::from_be_bytes(bytes)))
    }
}

impl Identifier {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(rng.gen())
    }

    pub(crate) fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }
}

impl From<u128> for Identifier {
    fn from(id: u128) -> Self {
        Self(id)
    }
}

impl Debug for Identifier {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Id({})", hex::encode(&self.0.to_be_bytes()[..4]))
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0.to_be_bytes()))
    }
}

/// The protocols this crate runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolId {
    #[serde(rename = "cmp/keygen")]
    Keygen,
    #[serde(rename = "cmp/sign")]
    Sign,
}

impl ProtocolId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolId::Keygen => "cmp/keygen",
            ProtocolId::Sign => "cmp/sign",
        }
    }
}

/// The immutable membership of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    self_id: PartyId,
    /// Sorted and unique.
    party_ids: Vec<PartyId>,
    threshold: usize,
}

impl SessionConfig {
    /// Configuration for a keygen session: at least three parties and
    /// `threshold <= N - 1`.
    pub fn new(self_id: PartyId, party_ids: Vec<PartyId>, threshold: usize) -> Result<Self> {
        let config = Self::new_unchecked(self_id, party_ids, threshold)?;
        if config.party_ids.len() < 3 {
            error!("Keygen needs at least 3 parties, got {}", config.party_ids.len());
            return arg_err!("keygen needs at least 3 parties");
        }
        Ok(config)
    }

    /// Configuration for a signing quorum: at least `threshold + 1` parties.
    pub(crate) fn new_quorum(
        self_id: PartyId,
        party_ids: Vec<PartyId>,
        threshold: usize,
    ) -> Result<Self> {
        let config = Self::new_unchecked(self_id, party_ids, threshold)?;
        if config.party_ids.len() < threshold + 1 || config.party_ids.len() < 2 {
            error!(
                "A quorum for threshold {} needs more than {} parties",
                threshold,
                config.party_ids.len()
            );
            return arg_err!("signing quorum is smaller than threshold + 1");
        }
        Ok(config)
    }

    fn new_unchecked(self_id: PartyId, party_ids: Vec<PartyId>, threshold: usize) -> Result<Self> {
        let unique: BTreeSet<PartyId> = party_ids.iter().cloned().collect();
        if unique.len() != party_ids.len() {
            return arg_err!("party identifiers must be unique");
        }
        if !unique.contains(&self_id) {
            return arg_err!("self must be one of the parties");
        }
        if threshold >= unique.len() {
            return arg_err!("threshold must be at most N - 1");
        }
        // Evaluation points must be distinct and non-zero for the sharing to work.
        let points = unique
            .iter()
            .map(|id| id.eval_point().map(|p| p.to_bytes().to_vec()))
            .collect::<Result<BTreeSet<_>>>()?;
        if points.len() != unique.len() {
            return arg_err!("two party identifiers collide on their evaluation point");
        }
        Ok(Self {
            self_id,
            party_ids: unique.into_iter().collect(),
            threshold,
        })
    }

    pub fn self_id(&self) -> &PartyId {
        &self.self_id
    }

    /// All parties, including self, in their canonical order.
    pub fn party_ids(&self) -> &[PartyId] {
        &self.party_ids
    }

    /// All parties except self.
    pub fn other_ids(&self) -> impl Iterator<Item = &PartyId> {
        self.party_ids.iter().filter(move |id| *id != &self.self_id)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn count(&self) -> usize {
        self.party_ids.len()
    }

    pub fn contains(&self, id: &PartyId) -> bool {
        self.party_ids.binary_search(id).is_ok()
    }
}

/// Tunables of the session driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriverConfig {
    /// How long a round may wait for missing messages before the silent
    /// parties are blamed.
    pub round_timeout: Duration,
    /// Bit size of each Paillier prime generated during keygen.
    pub prime_bits: usize,
}

impl DriverConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.prime_bits < PRIME_BITS {
            error!(
                "Paillier primes of {} bits are too small, need at least {}",
                self.prime_bits, PRIME_BITS
            );
            return arg_err!("prime_bits is too small");
        }
        Ok(())
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            round_timeout: Duration::from_secs(60),
            prime_bits: PRIME_BITS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<PartyId> {
        names.iter().map(|n| PartyId::from(*n)).collect()
    }

    #[test]
    fn session_config_sorts_and_validates() -> Result<()> {
        let config = SessionConfig::new("b".into(), ids(&["c", "a", "b"]), 1)?;
        assert_eq!(config.party_ids(), ids(&["a", "b", "c"]).as_slice());
        assert_eq!(config.other_ids().cloned().collect::<Vec<_>>(), ids(&["a", "c"]));
        assert!(config.contains(&"c".into()));
        Ok(())
    }

    #[test]
    fn session_config_rejects_bad_parameters() {
        // too few parties
        assert!(SessionConfig::new("a".into(), ids(&["a", "b"]), 1).is_err());
        // threshold too large
        assert!(SessionConfig::new("a".into(), ids(&["a", "b", "c"]), 3).is_err());
        // duplicates
        assert!(SessionConfig::new("a".into(), ids(&["a", "a", "b", "c"]), 1).is_err());
        // self missing
        assert!(SessionConfig::new("z".into(), ids(&["a", "b", "c"]), 1).is_err());
        // a quorum may be smaller than three, but not smaller than threshold + 1
        assert!(SessionConfig::new_quorum("a".into(), ids(&["a", "b"]), 1).is_ok());
        assert!(SessionConfig::new_quorum("a".into(), ids(&["a", "b"]), 2).is_err());
    }

    #[test]
    fn driver_config_rejects_small_primes() {
        let config = DriverConfig {
            prime_bits: 512,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(DriverConfig::default().validate().is_ok());
    }
}

// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The wire format of protocol messages.
//!
//! Every message travels in an [`Envelope`] that names its sender, its
//! recipient (for direct messages), the protocol and session it belongs to,
//! and the round that consumes it. The round-specific content is a
//! [`Payload`]. JSON is the wire encoding; the bincode encoding of a payload
//! is what gets hashed for the broadcast echo.

use crate::{
    errors::{InternalError, Result},
    keygen::KeygenPublicValues,
    paillier::Ciphertext,
    protocol::{Identifier, PartyId, ProtocolId},
    serialization::{proof_hex, scalar_hex},
    transcript::{Commitment, Decommitment},
    utils::CurvePoint,
    zkp::{
        piaffg::PiAffgProof, pienc::PiEncProof, pifac::PiFacProof, pilog::PiLogProof,
        pimod::PiModProof, piprm::PiPrmProof, pisch::PiSchProof,
    },
};
use k256::Scalar;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::error;

/// The envelope version this crate produces and accepts.
pub(crate) const WIRE_VERSION: u32 = 1;

/// The digests of one round's broadcasts, as accepted by the sender of the
/// message carrying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BroadcastEcho {
    pub(crate) round: u16,
    pub(crate) digests: BTreeMap<PartyId, String>,
}

/// A protocol message as it travels over the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub(crate) from: PartyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) to: Option<PartyId>,
    pub(crate) protocol_id: ProtocolId,
    pub(crate) round_number: u16,
    pub(crate) broadcast: bool,
    pub(crate) session_id: Identifier,
    pub(crate) version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) echo: Option<BroadcastEcho>,
    pub(crate) payload: Payload,
}

impl Envelope {
    pub(crate) fn new(
        from: &PartyId,
        to: Option<&PartyId>,
        protocol_id: ProtocolId,
        round_number: u16,
        session_id: Identifier,
        echo: Option<BroadcastEcho>,
        payload: Payload,
    ) -> Self {
        Self {
            from: from.clone(),
            to: to.cloned(),
            protocol_id,
            round_number,
            broadcast: to.is_none(),
            session_id,
            version: WIRE_VERSION,
            echo,
            payload,
        }
    }

    /// The sender.
    pub fn from(&self) -> &PartyId {
        &self.from
    }

    /// The recipient of a direct message; `None` for broadcasts.
    pub fn to(&self) -> Option<&PartyId> {
        self.to.as_ref()
    }

    pub fn protocol_id(&self) -> ProtocolId {
        self.protocol_id
    }

    /// The round that consumes this message.
    pub fn round_number(&self) -> u16 {
        self.round_number
    }

    pub fn is_broadcast(&self) -> bool {
        self.broadcast
    }

    pub fn session_id(&self) -> Identifier {
        self.session_id
    }

    /// Encodes the envelope as JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            error!("Failed to encode envelope: {e}");
            InternalError::Serialization
        })
    }

    /// Decodes an envelope from JSON, rejecting unknown versions.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let envelope: Self = serde_json::from_slice(bytes).map_err(|e| {
            error!("Failed to decode envelope: {e}");
            InternalError::Serialization
        })?;
        if envelope.version != WIRE_VERSION {
            error!(
                "Unsupported envelope version {} (expected {WIRE_VERSION})",
                envelope.version
            );
            return Err(InternalError::Serialization);
        }
        Ok(envelope)
    }
}

/// The round-specific content of a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::large_enum_variant)]
pub(crate) enum Payload {
    KeygenCommit {
        commitment: Commitment,
    },
    KeygenDecommit {
        values: KeygenPublicValues,
        decommitment: Decommitment,
    },
    KeygenProofs {
        #[serde(with = "proof_hex")]
        mod_proof: PiModProof,
        #[serde(with = "proof_hex")]
        prm_proof: PiPrmProof,
    },
    KeygenShare {
        ciphertext: Ciphertext,
        #[serde(with = "proof_hex")]
        fac_proof: PiFacProof,
    },
    KeygenSchnorr {
        #[serde(with = "proof_hex")]
        proof: PiSchProof,
    },
    SignCiphertexts {
        K: Ciphertext,
        G: Ciphertext,
    },
    SignEncProof {
        #[serde(with = "proof_hex")]
        proof: PiEncProof,
    },
    SignGamma {
        Gamma: CurvePoint,
    },
    SignMta {
        D: Ciphertext,
        D_hat: Ciphertext,
        F: Ciphertext,
        F_hat: Ciphertext,
        #[serde(with = "proof_hex")]
        psi: PiAffgProof,
        #[serde(with = "proof_hex")]
        psi_hat: PiAffgProof,
        #[serde(with = "proof_hex")]
        psi_prime: PiLogProof,
    },
    SignDelta {
        #[serde(with = "scalar_hex")]
        delta: Scalar,
        Delta: CurvePoint,
    },
    SignDeltaProof {
        #[serde(with = "proof_hex")]
        proof: PiLogProof,
    },
    SignSigma {
        #[serde(with = "scalar_hex")]
        sigma: Scalar,
    },
}

impl Payload {
    /// Hex SHA-256 of the canonical (bincode) encoding.
    pub(crate) fn digest(&self) -> Result<String> {
        let bytes: Vec<u8> = serialize!(self)?;
        Ok(hex::encode(Sha256::digest(bytes)))
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Payload::KeygenCommit { .. } => "KeygenCommit",
            Payload::KeygenDecommit { .. } => "KeygenDecommit",
            Payload::KeygenProofs { .. } => "KeygenProofs",
            Payload::KeygenShare { .. } => "KeygenShare",
            Payload::KeygenSchnorr { .. } => "KeygenSchnorr",
            Payload::SignCiphertexts { .. } => "SignCiphertexts",
            Payload::SignEncProof { .. } => "SignEncProof",
            Payload::SignGamma { .. } => "SignGamma",
            Payload::SignMta { .. } => "SignMta",
            Payload::SignDelta { .. } => "SignDelta",
            Payload::SignDeltaProof { .. } => "SignDeltaProof",
            Payload::SignSigma { .. } => "SignSigma",
        }
    }
}

/// The error a round raises for a payload it does not consume.
pub(crate) fn unexpected_payload(from: &PartyId, round: u16, payload: &Payload) -> InternalError {
    error!(
        "Party {from} sent a {} payload, which round {round} does not consume",
        payload.kind()
    );
    InternalError::ProtocolError(Some(from.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{random_scalar, testing::init_testing};

    fn envelope(payload: Payload) -> Envelope {
        Envelope::new(
            &PartyId::from("alice"),
            None,
            ProtocolId::Sign,
            5,
            Identifier::from(42),
            None,
            payload,
        )
    }

    #[test]
    fn envelope_json_uses_wire_names() -> Result<()> {
        let mut rng = init_testing();
        let sigma = random_scalar(&mut rng);
        let bytes = envelope(Payload::SignSigma { sigma }).to_json()?;
        let json: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|_| InternalError::Serialization)?;
        assert_eq!(json["from"], "alice");
        assert_eq!(json["protocolId"], "cmp/sign");
        assert_eq!(json["roundNumber"], 5);
        assert_eq!(json["broadcast"], true);
        assert_eq!(json["version"], WIRE_VERSION);
        assert!(json.get("to").is_none());
        assert!(json["payload"]["signSigma"]["sigma"].is_string());

        let decoded = Envelope::from_json(&bytes)?;
        assert_eq!(decoded.from(), &PartyId::from("alice"));
        assert_eq!(decoded.session_id(), Identifier::from(42));
        assert_eq!(decoded.payload.digest()?, Payload::SignSigma { sigma }.digest()?);
        Ok(())
    }

    #[test]
    fn unknown_versions_are_rejected() -> Result<()> {
        let mut rng = init_testing();
        let mut message = envelope(Payload::SignSigma {
            sigma: random_scalar(&mut rng),
        });
        message.version = WIRE_VERSION + 1;
        let bytes = message.to_json()?;
        assert_eq!(
            Envelope::from_json(&bytes).unwrap_err(),
            InternalError::Serialization
        );
        Ok(())
    }

    #[test]
    fn digests_distinguish_payloads() -> Result<()> {
        let mut rng = init_testing();
        let a = Payload::SignGamma {
            Gamma: CurvePoint::base_mul(&random_scalar(&mut rng)),
        };
        let b = Payload::SignGamma {
            Gamma: CurvePoint::base_mul(&random_scalar(&mut rng)),
        };
        assert_eq!(a.digest()?, a.clone().digest()?);
        assert_ne!(a.digest()?, b.digest()?);
        Ok(())
    }
}

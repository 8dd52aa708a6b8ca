// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    paillier::EncryptionKey,
    ring_pedersen::RingPedersen,
    serialization::bytes_hex,
    transcript::TranscriptEncode,
    utils::CurvePoint,
    vss::FeldmanExponent,
};
use merlin::Transcript;
use serde::{Deserialize, Serialize};

/// The values a party commits to in round one and opens in round three.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct KeygenPublicValues {
    #[serde(rename = "ridHex", with = "bytes_hex")]
    pub(crate) rid: [u8; 32],
    #[serde(rename = "chainKeyHex", with = "bytes_hex")]
    pub(crate) chain_key: [u8; 32],
    pub(crate) feldman: FeldmanExponent,
    /// The first message `A` of the party's round-four Schnorr proof.
    pub(crate) schnorr_commitment: CurvePoint,
    pub(crate) elgamal_point: CurvePoint,
    pub(crate) pedersen: RingPedersen,
    pub(crate) paillier: EncryptionKey,
}

impl TranscriptEncode for KeygenPublicValues {
    fn encode(&self, transcript: &mut Transcript) {
        self.rid.encode(transcript);
        self.chain_key.encode(transcript);
        self.feldman.encode(transcript);
        self.schnorr_commitment.encode(transcript);
        self.elgamal_point.encode(transcript);
        self.pedersen.encode(transcript);
        self.paillier.encode(transcript);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::{InternalError, Result},
        paillier::testing::decryption_key,
        protocol::{Identifier, PartyId, ProtocolId},
        ring_pedersen::testing::ring_pedersen,
        transcript::SessionTranscript,
        utils::{random_bytes32, random_scalar, testing::init_testing},
        vss::SecretPolynomial,
    };
    use rand::{CryptoRng, RngCore};

    fn sample_values<R: RngCore + CryptoRng>(rng: &mut R) -> KeygenPublicValues {
        let poly = SecretPolynomial::new(1, random_scalar(rng), rng);
        KeygenPublicValues {
            rid: random_bytes32(rng),
            chain_key: random_bytes32(rng),
            feldman: FeldmanExponent::from_poly(&poly),
            schnorr_commitment: CurvePoint::base_mul(&random_scalar(rng)),
            elgamal_point: CurvePoint::base_mul(&random_scalar(rng)),
            pedersen: ring_pedersen(rng).0,
            paillier: decryption_key(rng).encryption_key(),
        }
    }

    #[test]
    fn opening_is_bound_to_every_field_and_the_sender() -> Result<()> {
        let mut rng = init_testing();
        let ids: Vec<PartyId> = vec!["a".into(), "b".into(), "c".into()];
        let transcript = SessionTranscript::new(ProtocolId::Keygen, Identifier::from(1), 1, &ids);
        let values = sample_values(&mut rng);
        let (com, decom) = transcript.commit(&(&ids[0], &values), &mut rng);
        assert!(transcript.decommit(&com, &decom, &(&ids[0], &values)));
        assert!(!transcript.decommit(&com, &decom, &(&ids[1], &values)));

        let other = sample_values(&mut rng);
        let mutations: Vec<Box<dyn Fn(&mut KeygenPublicValues) + '_>> = vec![
            Box::new(|v| v.rid[0] ^= 1),
            Box::new(|v| v.chain_key[31] ^= 1),
            Box::new(|v| v.feldman = other.feldman.clone()),
            Box::new(|v| v.schnorr_commitment = other.schnorr_commitment),
            Box::new(|v| v.elgamal_point = other.elgamal_point),
            Box::new(|v| v.pedersen = other.pedersen.clone()),
            Box::new(|v| v.paillier = other.paillier.clone()),
        ];
        for mutate in mutations {
            let mut changed = values.clone();
            mutate(&mut changed);
            assert!(!transcript.decommit(&com, &decom, &(&ids[0], &changed)));
        }
        Ok(())
    }

    #[test]
    fn values_survive_json() -> Result<()> {
        let mut rng = init_testing();
        let values = sample_values(&mut rng);
        let json = serde_json::to_string(&values).map_err(|_| InternalError::Serialization)?;
        assert!(json.contains("ridHex"));
        let decoded: KeygenPublicValues =
            serde_json::from_str(&json).map_err(|_| InternalError::Serialization)?;
        assert_eq!(decoded.feldman, values.feldman);
        assert_eq!(decoded.pedersen, values.pedersen);
        assert_eq!(decoded.rid, values.rid);
        Ok(())
    }
}

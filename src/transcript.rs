// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The session-wide transcript.
//!
//! A [`SessionTranscript`] is seeded with everything that identifies a
//! session (protocol, curve, threshold, session id and the ordered party
//! set). It serves two purposes:
//! - it is the root from which every Fiat-Shamir transcript of the session
//!   is branched, so proofs cannot be replayed across sessions or provers;
//! - it is a hiding and binding commitment scheme, via [`SessionTranscript::commit`].
//!
//! Values enter the transcript through [`TranscriptEncode`], which fixes a
//! single canonical byte encoding per type.

use crate::{
    protocol::{Identifier, PartyId, ProtocolId},
    utils::{random_bytes32, CurvePoint},
};
use k256::{elliptic_curve::sec1::ToEncodedPoint, Scalar};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Canonical encoding of a value into a transcript.
pub(crate) trait TranscriptEncode {
    fn encode(&self, transcript: &mut Transcript);
}

impl TranscriptEncode for Scalar {
    fn encode(&self, transcript: &mut Transcript) {
        transcript.append_message(b"scalar", &self.to_bytes());
    }
}

impl TranscriptEncode for CurvePoint {
    fn encode(&self, transcript: &mut Transcript) {
        let encoded = self.0.to_affine().to_encoded_point(false);
        match (encoded.x(), encoded.y()) {
            (Some(x), Some(y)) => {
                transcript.append_message(b"point x", x);
                transcript.append_message(b"point y", y);
            }
            _ => transcript.append_message(b"point", b"identity"),
        }
    }
}

impl TranscriptEncode for BigNumber {
    fn encode(&self, transcript: &mut Transcript) {
        let negative = self < &BigNumber::zero();
        let magnitude = if negative { -self.clone() } else { self.clone() };
        transcript.append_message(b"integer sign", &[negative as u8]);
        transcript.append_message(b"integer", &magnitude.to_bytes());
    }
}

impl TranscriptEncode for [u8; 32] {
    fn encode(&self, transcript: &mut Transcript) {
        transcript.append_message(b"bytes", self);
    }
}

impl TranscriptEncode for PartyId {
    fn encode(&self, transcript: &mut Transcript) {
        transcript.append_message(b"party", self.as_str().as_bytes());
    }
}

impl<T: TranscriptEncode> TranscriptEncode for [T] {
    fn encode(&self, transcript: &mut Transcript) {
        transcript.append_u64(b"length", self.len() as u64);
        for item in self {
            item.encode(transcript);
        }
    }
}

impl<T: TranscriptEncode> TranscriptEncode for Vec<T> {
    fn encode(&self, transcript: &mut Transcript) {
        self.as_slice().encode(transcript)
    }
}

impl<T: TranscriptEncode + ?Sized> TranscriptEncode for &T {
    fn encode(&self, transcript: &mut Transcript) {
        (**self).encode(transcript)
    }
}

impl<A: TranscriptEncode, B: TranscriptEncode> TranscriptEncode for (A, B) {
    fn encode(&self, transcript: &mut Transcript) {
        self.0.encode(transcript);
        self.1.encode(transcript);
    }
}

/// The output of [`SessionTranscript::commit`] that is published first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Commitment(#[serde(with = "crate::serialization::bytes_hex")] [u8; 32]);

/// The opening of a [`Commitment`]: the nonce it was hashed with.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Decommitment(#[serde(with = "crate::serialization::bytes_hex")] [u8; 32]);

impl std::fmt::Debug for Decommitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Decommitment([redacted])")
    }
}

#[derive(Clone)]
pub(crate) struct SessionTranscript(Transcript);

impl SessionTranscript {
    pub(crate) fn new(
        protocol: ProtocolId,
        sid: Identifier,
        threshold: usize,
        party_ids: &[PartyId],
    ) -> Self {
        let mut transcript = Transcript::new(b"tss-cggmp session");
        transcript.append_message(b"protocol", protocol.as_str().as_bytes());
        transcript.append_message(b"curve", b"secp256k1");
        transcript.append_u64(b"threshold", threshold as u64);
        transcript.append_message(b"session id", &sid.to_bytes());
        party_ids.encode(&mut transcript);
        Self(transcript)
    }

    pub(crate) fn update<T: TranscriptEncode + ?Sized>(&mut self, label: &'static [u8], value: &T) {
        self.0.append_message(b"label", label);
        value.encode(&mut self.0);
    }

    /// Branches a Fiat-Shamir transcript for proofs produced by `prover`.
    pub(crate) fn for_prover(&self, prover: &PartyId) -> Transcript {
        let mut transcript = self.0.clone();
        transcript.append_message(b"prover", prover.as_str().as_bytes());
        transcript
    }

    /// Branches a Fiat-Shamir transcript for proofs that `prover` addresses
    /// to `verifier` alone.
    pub(crate) fn for_pair(&self, prover: &PartyId, verifier: &PartyId) -> Transcript {
        let mut transcript = self.for_prover(prover);
        transcript.append_message(b"verifier", verifier.as_str().as_bytes());
        transcript
    }

    /// Commits to `values` under a fresh 256-bit nonce.
    pub(crate) fn commit<T: TranscriptEncode + ?Sized, R: RngCore + CryptoRng>(
        &self,
        values: &T,
        rng: &mut R,
    ) -> (Commitment, Decommitment) {
        let nonce = Decommitment(random_bytes32(rng));
        (self.commitment_for(values, &nonce), nonce)
    }

    /// Checks that `decommitment` opens `commitment` to `values`.
    pub(crate) fn decommit<T: TranscriptEncode + ?Sized>(
        &self,
        commitment: &Commitment,
        decommitment: &Decommitment,
        values: &T,
    ) -> bool {
        let expected = self.commitment_for(values, decommitment);
        expected.0.ct_eq(&commitment.0).into()
    }

    fn commitment_for<T: TranscriptEncode + ?Sized>(
        &self,
        values: &T,
        nonce: &Decommitment,
    ) -> Commitment {
        let mut transcript = self.0.clone();
        transcript.append_message(b"commitment nonce", &nonce.0);
        values.encode(&mut transcript);
        let mut out = [0u8; 32];
        transcript.challenge_bytes(b"commitment", &mut out);
        Commitment(out)
    }
}

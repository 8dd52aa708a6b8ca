// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Distributed key generation.
//!
//! Five rounds produce a [`PartySecretKeyConfig`] for every party:
//!
//! 1. Sample Paillier, ring-Pedersen and ElGamal keys, a Feldman-committed
//!    sharing polynomial and `rid`/`chainKey` contributions; broadcast a
//!    commitment to all public values.
//! 2. Broadcast the opening.
//! 3. Check every opening; fix `rid` and `chainKey`; broadcast Paillier-Blum
//!    and ring-Pedersen proofs; send every peer its encrypted share with a
//!    no-small-factors proof.
//! 4. Check the proofs and shares; derive the secret share and everyone's
//!    public shares; broadcast a Schnorr proof for the secret share.
//! 5. Check the Schnorr proofs and output.

mod keygen_commit;
mod keyshare;
mod round_five;
mod round_four;
mod round_one;
mod round_three;
mod round_two;

pub(crate) use keygen_commit::KeygenPublicValues;
pub use keyshare::{PartyPublicKeyConfig, PartySecretKeyConfig};

use crate::{
    errors::Result,
    messages::{unexpected_payload, Payload},
    paillier::DecryptionKey,
    protocol::{Identifier, PartyId, ProtocolId, SessionConfig},
    round::{Round, Transition},
    transcript::SessionTranscript,
    vss::SecretPolynomial,
    zkp::pisch::PiSchPrecommit,
};
use k256::Scalar;
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use round_five::RoundFive;
use round_four::RoundFour;
use round_one::RoundOne;
use round_three::RoundThree;
use round_two::RoundTwo;
use zeroize::Zeroize;

/// Session-wide state shared by every round.
#[derive(Clone)]
pub(crate) struct KeygenContext {
    config: SessionConfig,
    transcript: SessionTranscript,
    prime_bits: usize,
}

impl KeygenContext {
    fn self_id(&self) -> &PartyId {
        self.config.self_id()
    }
}

/// Secret values sampled in round one and carried to the end.
pub(crate) struct KeygenSecrets {
    paillier: DecryptionKey,
    pedersen_lambda: BigNumber,
    pedersen_totient: BigNumber,
    elgamal_secret: Scalar,
    poly: SecretPolynomial,
    precommit: PiSchPrecommit,
}

impl Drop for KeygenSecrets {
    fn drop(&mut self) {
        self.elgamal_secret.zeroize();
    }
}

/// The rounds of key generation.
pub(crate) enum KeygenRound {
    One(RoundOne),
    Two(RoundTwo),
    Three(RoundThree),
    Four(RoundFour),
    Five(RoundFive),
}

impl KeygenRound {
    pub(crate) fn new(config: SessionConfig, sid: Identifier, prime_bits: usize) -> Self {
        let transcript = SessionTranscript::new(
            ProtocolId::Keygen,
            sid,
            config.threshold(),
            config.party_ids(),
        );
        KeygenRound::One(RoundOne::new(KeygenContext {
            config,
            transcript,
            prime_bits,
        }))
    }
}

impl Round for KeygenRound {
    type Output = PartySecretKeyConfig;

    fn protocol() -> ProtocolId {
        ProtocolId::Keygen
    }

    fn number(&self) -> u16 {
        match self {
            KeygenRound::One(_) => 1,
            KeygenRound::Two(_) => 2,
            KeygenRound::Three(_) => 3,
            KeygenRound::Four(_) => 4,
            KeygenRound::Five(_) => 5,
        }
    }

    fn expects_broadcast(&self) -> bool {
        !matches!(self, KeygenRound::One(_))
    }

    fn expects_direct(&self) -> bool {
        matches!(self, KeygenRound::Four(_))
    }

    fn handle_broadcast(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
        match self {
            KeygenRound::Two(round) => round.handle_broadcast(from, payload),
            KeygenRound::Three(round) => round.handle_broadcast(from, payload),
            KeygenRound::Four(round) => round.handle_broadcast(from, payload),
            KeygenRound::Five(round) => round.handle_broadcast(from, payload),
            KeygenRound::One(_) => Err(unexpected_payload(from, 1, payload)),
        }
    }

    fn handle_direct(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
        match self {
            KeygenRound::Four(round) => round.handle_direct(from, payload),
            other => Err(unexpected_payload(from, other.number(), payload)),
        }
    }

    fn process<R: RngCore + CryptoRng>(self, rng: &mut R) -> Result<Transition<Self>> {
        match self {
            KeygenRound::One(round) => round.process(rng),
            KeygenRound::Two(round) => round.process(),
            KeygenRound::Three(round) => round.process(rng),
            KeygenRound::Four(round) => round.process(),
            KeygenRound::Five(round) => round.process(),
        }
    }
}

// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Threshold signing.
//!
//! A quorum of at least `threshold + 1` key holders signs a 32-byte digest in
//! five rounds. Each signer works with its Lagrange-weighted share
//! `λ_i · x_i`, so the weighted shares of the quorum add up to the secret
//! key.
//!
//! 1. Sample `k_i` and `γ_i`; broadcast their encryptions `K_i` and `G_i`
//!    and prove `K_i` well-formed to every peer.
//! 2. Check the ciphertexts; broadcast `Γ_i = G^{γ_i}`; run the two
//!    multiplicative-to-additive conversions (of `γ_i k_j` and
//!    `λ_i x_i k_j`) with every peer.
//! 3. Check the conversions; broadcast `δ_i` and `Δ_i = Γ^{k_i}`.
//! 4. Check `G^δ = Δ`; compute `R` and broadcast the partial signature.
//! 5. Add the partial signatures and verify the result.

mod output;
mod round_five;
mod round_four;
mod round_one;
mod round_three;
mod round_two;

pub use output::SignatureOutput;

use crate::{
    errors::{InternalError, Result},
    keygen::{PartyPublicKeyConfig, PartySecretKeyConfig},
    messages::{unexpected_payload, Payload},
    paillier::Nonce,
    protocol::{Identifier, PartyId, ProtocolId, SessionConfig},
    ring_pedersen::RingPedersen,
    round::{Round, Transition},
    transcript::SessionTranscript,
    utils::CurvePoint,
    vss::lagrange_coefficient_at_zero,
};
use k256::Scalar;
use rand::{CryptoRng, RngCore};
use round_five::RoundFive;
use round_four::RoundFour;
use round_one::RoundOne;
use round_three::RoundThree;
use round_two::RoundTwo;
use std::collections::BTreeMap;
use tracing::error;
use zeroize::Zeroize;

/// Everything a party needs to join a signing session.
#[derive(Debug, Clone)]
pub(crate) struct SignInput {
    key: PartySecretKeyConfig,
    config: SessionConfig,
    digest: [u8; 32],
}

impl SignInput {
    /// Prepares to sign `digest` with the quorum `signers`.
    ///
    /// The quorum must contain the key owner and at least `threshold + 1`
    /// parties of the key generation session.
    pub(crate) fn new(
        key: PartySecretKeyConfig,
        signers: Vec<PartyId>,
        digest: [u8; 32],
    ) -> Result<Self> {
        if let Some(unknown) = signers.iter().find(|id| key.public_data(id).is_none()) {
            error!("Signer {unknown} did not take part in key generation");
            return arg_err!("signer without a key share");
        }
        let config = SessionConfig::new_quorum(key.party_id().clone(), signers, key.threshold())?;
        Ok(Self {
            key,
            config,
            digest,
        })
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }
}

/// Session-wide state shared by every round.
#[derive(Clone)]
pub(crate) struct SignContext {
    config: SessionConfig,
    transcript: SessionTranscript,
    key: PartySecretKeyConfig,
    digest: [u8; 32],
    /// `λ_i · x_i` over the quorum.
    weighted_share: Scalar,
    /// `λ_j · X_j` for every signer.
    weighted_public: BTreeMap<PartyId, CurvePoint>,
    public_key: CurvePoint,
}

impl Drop for SignContext {
    fn drop(&mut self) {
        self.weighted_share.zeroize();
    }
}

impl SignContext {
    fn new(input: SignInput, sid: Identifier) -> Result<Self> {
        let SignInput {
            key,
            config,
            digest,
        } = input;
        let quorum = config.party_ids();
        let weighted_public = quorum
            .iter()
            .map(|id| {
                let lambda = lagrange_coefficient_at_zero(id, quorum)?;
                let X = key
                    .public_data(id)
                    .ok_or(InternalError::InternalInvariantFailed)?
                    .ecdsa_point;
                Ok((id.clone(), X.multiply_by_scalar(&lambda)))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        let weighted_share =
            lagrange_coefficient_at_zero(config.self_id(), quorum)? * key.ecdsa_share();
        let public_key = weighted_public.values().copied().sum();

        let mut transcript =
            SessionTranscript::new(ProtocolId::Sign, sid, config.threshold(), quorum);
        transcript.update(b"public key", &public_key);
        transcript.update(b"digest", &digest);
        Ok(Self {
            config,
            transcript,
            key,
            digest,
            weighted_share,
            weighted_public,
            public_key,
        })
    }

    fn self_id(&self) -> &PartyId {
        self.config.self_id()
    }

    fn public(&self, party: &PartyId) -> Result<&PartyPublicKeyConfig> {
        self.key
            .public_data(party)
            .ok_or(InternalError::InternalInvariantFailed)
    }

    fn own_pedersen(&self) -> Result<&RingPedersen> {
        Ok(&self.public(self.self_id())?.pedersen)
    }

    fn weighted_public(&self, party: &PartyId) -> Result<&CurvePoint> {
        self.weighted_public
            .get(party)
            .ok_or(InternalError::InternalInvariantFailed)
    }
}

/// The nonce shares `k_i`, `γ_i` and the Paillier nonces of their
/// encryptions.
pub(crate) struct SignNonces {
    k: Scalar,
    gamma: Scalar,
    rho: Nonce,
    nu: Nonce,
}

impl Drop for SignNonces {
    fn drop(&mut self) {
        self.k.zeroize();
        self.gamma.zeroize();
    }
}

/// The rounds of signing.
pub(crate) enum SignRound {
    One(RoundOne),
    Two(RoundTwo),
    Three(RoundThree),
    Four(RoundFour),
    Five(RoundFive),
}

impl SignRound {
    pub(crate) fn new(input: SignInput, sid: Identifier) -> Result<Self> {
        Ok(SignRound::One(RoundOne::new(SignContext::new(input, sid)?)))
    }
}

impl Round for SignRound {
    type Output = SignatureOutput;

    fn protocol() -> ProtocolId {
        ProtocolId::Sign
    }

    fn number(&self) -> u16 {
        match self {
            SignRound::One(_) => 1,
            SignRound::Two(_) => 2,
            SignRound::Three(_) => 3,
            SignRound::Four(_) => 4,
            SignRound::Five(_) => 5,
        }
    }

    fn expects_broadcast(&self) -> bool {
        !matches!(self, SignRound::One(_))
    }

    fn expects_direct(&self) -> bool {
        matches!(
            self,
            SignRound::Two(_) | SignRound::Three(_) | SignRound::Four(_)
        )
    }

    fn handle_broadcast(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
        match self {
            SignRound::Two(round) => round.handle_broadcast(from, payload),
            SignRound::Three(round) => round.handle_broadcast(from, payload),
            SignRound::Four(round) => round.handle_broadcast(from, payload),
            SignRound::Five(round) => round.handle_broadcast(from, payload),
            SignRound::One(_) => Err(unexpected_payload(from, 1, payload)),
        }
    }

    fn handle_direct(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
        match self {
            SignRound::Two(round) => round.handle_direct(from, payload),
            SignRound::Three(round) => round.handle_direct(from, payload),
            SignRound::Four(round) => round.handle_direct(from, payload),
            other => Err(unexpected_payload(from, other.number(), payload)),
        }
    }

    fn process<R: RngCore + CryptoRng>(self, rng: &mut R) -> Result<Transition<Self>> {
        match self {
            SignRound::One(round) => round.process(rng),
            SignRound::Two(round) => round.process(rng),
            SignRound::Three(round) => round.process(rng),
            SignRound::Four(round) => round.process(),
            SignRound::Five(round) => round.process(),
        }
    }
}

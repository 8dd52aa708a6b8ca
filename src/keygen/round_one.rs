// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use super::{round_two::RoundTwo, KeygenContext, KeygenPublicValues, KeygenRound, KeygenSecrets};
use crate::{
    errors::Result,
    messages::Payload,
    paillier::DecryptionKey,
    ring_pedersen::RingPedersen,
    round::{Outgoing, Transition},
    utils::{random_bytes32, random_nonzero_scalar, random_scalar, CurvePoint},
    vss::{FeldmanExponent, SecretPolynomial},
    zkp::pisch::PiSchPrecommit,
};
use rand::{CryptoRng, RngCore};
use tracing::{info, instrument, trace};

pub(crate) struct RoundOne {
    ctx: KeygenContext,
}

impl RoundOne {
    pub(super) fn new(ctx: KeygenContext) -> Self {
        Self { ctx }
    }

    /// Samples all key material and broadcasts a commitment to its public
    /// part.
    #[cfg_attr(feature = "flame_it", flame("keygen"))]
    #[instrument(skip_all, err(Debug))]
    pub(super) fn process<R: RngCore + CryptoRng>(
        self,
        rng: &mut R,
    ) -> Result<Transition<KeygenRound>> {
        info!("Generating round one keygen messages.");
        let ctx = self.ctx;

        let paillier = DecryptionKey::new(rng, ctx.prime_bits)?;
        let (pedersen, pedersen_lambda, pedersen_totient) = RingPedersen::extract(&paillier, rng)?;
        let elgamal_secret = random_nonzero_scalar(rng)?;
        let poly = SecretPolynomial::new(ctx.config.threshold(), random_scalar(rng), rng);
        let precommit = PiSchPrecommit::new(rng);

        let values = KeygenPublicValues {
            rid: random_bytes32(rng),
            chain_key: random_bytes32(rng),
            feldman: FeldmanExponent::from_poly(&poly),
            schnorr_commitment: *precommit.commitment(),
            elgamal_point: CurvePoint::base_mul(&elgamal_secret),
            pedersen,
            paillier: paillier.encryption_key(),
        };
        let (commitment, decommitment) = ctx
            .transcript
            .commit(&(ctx.self_id(), &values), rng);
        trace!("Committed to round one values of {}", ctx.self_id());

        let secrets = KeygenSecrets {
            paillier,
            pedersen_lambda,
            pedersen_totient,
            elgamal_secret,
            poly,
            precommit,
        };
        Ok(Transition::Next {
            round: KeygenRound::Two(RoundTwo::new(ctx, secrets, values, decommitment)),
            messages: vec![Outgoing::Broadcast(Payload::KeygenCommit { commitment })],
        })
    }
}

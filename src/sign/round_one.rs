// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use super::{round_two::RoundTwo, SignContext, SignNonces, SignRound};
use crate::{
    errors::Result,
    messages::Payload,
    round::{Outgoing, Transition},
    utils::{random_nonzero_scalar, scalar_to_bn},
    zkp::{
        pienc::{PiEncInput, PiEncProof, PiEncSecret},
        Proof,
    },
};
use rand::{CryptoRng, RngCore};
use tracing::{info, instrument, trace};

pub(crate) struct RoundOne {
    ctx: SignContext,
}

impl RoundOne {
    pub(super) fn new(ctx: SignContext) -> Self {
        Self { ctx }
    }

    /// Samples the nonce shares and publishes their encryptions.
    #[cfg_attr(feature = "flame_it", flame("sign"))]
    #[instrument(skip_all, err(Debug))]
    pub(super) fn process<R: RngCore + CryptoRng>(
        self,
        rng: &mut R,
    ) -> Result<Transition<SignRound>> {
        info!("Generating round one sign messages.");
        let ctx = self.ctx;
        let encryption_key = ctx.key.paillier().encryption_key();

        let k = random_nonzero_scalar(rng)?;
        let gamma = random_nonzero_scalar(rng)?;
        let k_bn = scalar_to_bn(&k);
        let (K, rho) = encryption_key.encrypt(rng, &k_bn)?;
        let (G, nu) = encryption_key.encrypt(rng, &scalar_to_bn(&gamma))?;

        let mut messages = vec![Outgoing::Broadcast(Payload::SignCiphertexts {
            K: K.clone(),
            G,
        })];
        let secret = PiEncSecret::new(&k_bn, &rho);
        for peer in ctx.config.other_ids() {
            let proof = PiEncProof::prove(
                &PiEncInput::new(&ctx.public(peer)?.pedersen, &encryption_key, &K),
                &secret,
                &mut ctx.transcript.for_pair(ctx.self_id(), peer),
                rng,
            )?;
            trace!("Proved K well-formed for {peer}");
            messages.push(Outgoing::Direct(
                peer.clone(),
                Payload::SignEncProof { proof },
            ));
        }

        let nonces = SignNonces { k, gamma, rho, nu };
        Ok(Transition::Next {
            round: SignRound::Two(RoundTwo::new(ctx, nonces)),
            messages,
        })
    }
}

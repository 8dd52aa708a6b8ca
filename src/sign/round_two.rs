// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use super::{round_three::RoundThree, SignContext, SignNonces, SignRound};
use crate::{
    errors::{blame, InternalError, Result},
    messages::{unexpected_payload, Payload},
    paillier::{Ciphertext, EncryptionKey},
    parameters::ELL_PRIME,
    protocol::PartyId,
    ring_pedersen::RingPedersen,
    round::{Outgoing, Transition},
    utils::{bn_to_scalar, random_plusminus_by_size, scalar_to_bn, CurvePoint},
    zkp::{
        piaffg::{PiAffgInput, PiAffgProof, PiAffgSecret},
        pienc::{PiEncInput, PiEncProof},
        pilog::{self, PiLogProof},
        Proof,
    },
};
use k256::Scalar;
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// The encrypted nonce shares `K_j` and `G_j` of one signer.
#[derive(Clone)]
pub(super) struct NonceCiphertexts {
    pub(super) K: Ciphertext,
    pub(super) G: Ciphertext,
}

/// Checks the encrypted nonces and starts the multiplicative-to-additive
/// conversions.
pub(crate) struct RoundTwo {
    ctx: SignContext,
    nonces: SignNonces,
    ciphertexts: BTreeMap<PartyId, NonceCiphertexts>,
}

impl RoundTwo {
    pub(super) fn new(ctx: SignContext, nonces: SignNonces) -> Self {
        Self {
            ctx,
            nonces,
            ciphertexts: BTreeMap::new(),
        }
    }

    pub(super) fn handle_broadcast(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
        let Payload::SignCiphertexts { K, G } = payload else {
            return Err(unexpected_payload(from, 2, payload));
        };
        let encryption_key = &self.ctx.public(from)?.paillier;
        encryption_key
            .validate_ciphertext(K)
            .and_then(|_| encryption_key.validate_ciphertext(G))
            .map_err(blame(from))?;
        let _ = self.ciphertexts.insert(
            from.clone(),
            NonceCiphertexts {
                K: K.clone(),
                G: G.clone(),
            },
        );
        Ok(())
    }

    pub(super) fn handle_direct(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
        let Payload::SignEncProof { proof } = payload else {
            return Err(unexpected_payload(from, 2, payload));
        };
        self.verify_enc(from, proof).map_err(blame(from))
    }

    fn verify_enc(&self, from: &PartyId, proof: &PiEncProof) -> Result<()> {
        let K = &self
            .ciphertexts
            .get(from)
            .ok_or(InternalError::InternalInvariantFailed)?
            .K;
        proof.verify(
            &PiEncInput::new(
                self.ctx.own_pedersen()?,
                &self.ctx.public(from)?.paillier,
                K,
            ),
            &mut self.ctx.transcript.for_pair(from, self.ctx.self_id()),
        )
    }

    /// Broadcasts `Γ_i` and sends every peer the two conversion messages.
    #[cfg_attr(feature = "flame_it", flame("sign"))]
    #[instrument(skip_all, err(Debug))]
    pub(super) fn process<R: RngCore + CryptoRng>(
        self,
        rng: &mut R,
    ) -> Result<Transition<SignRound>> {
        info!("Generating round two sign messages.");
        let ctx = &self.ctx;
        let nonces = &self.nonces;
        let own_key = ctx.key.paillier().encryption_key();
        let own_G = &self
            .ciphertexts
            .get(ctx.self_id())
            .ok_or(InternalError::InternalInvariantFailed)?
            .G;
        let Gamma = CurvePoint::base_mul(&nonces.gamma);
        let gamma_bn = scalar_to_bn(&nonces.gamma);
        let weighted_share_bn = scalar_to_bn(&ctx.weighted_share);
        let weighted_public = *ctx.weighted_public(ctx.self_id())?;

        let mut messages = vec![Outgoing::Broadcast(Payload::SignGamma { Gamma })];
        let mut betas = BTreeMap::new();
        for peer in ctx.config.other_ids() {
            let peer_public = ctx.public(peer)?;
            let peer_K = &self
                .ciphertexts
                .get(peer)
                .ok_or(InternalError::InternalInvariantFailed)?
                .K;
            let mut transcript = ctx.transcript.for_pair(ctx.self_id(), peer);
            let mut mta = MtaSender {
                setup_params: &peer_public.pedersen,
                peer_key: &peer_public.paillier,
                own_key: &own_key,
                peer_K,
                transcript: &mut transcript,
            };
            let (D, F, psi, beta) = mta.convert(&gamma_bn, &Gamma, rng)?;
            let (D_hat, F_hat, psi_hat, beta_hat) =
                mta.convert(&weighted_share_bn, &weighted_public, rng)?;
            let psi_prime = PiLogProof::prove(
                &pilog::CommonInput::new(
                    &peer_public.pedersen,
                    &own_key,
                    own_G,
                    &Gamma,
                    &CurvePoint::GENERATOR,
                ),
                &pilog::ProverSecret::new(&gamma_bn, &nonces.nu),
                &mut transcript,
                rng,
            )?;
            let _ = betas.insert(peer.clone(), (beta, beta_hat));
            messages.push(Outgoing::Direct(
                peer.clone(),
                Payload::SignMta {
                    D,
                    D_hat,
                    F,
                    F_hat,
                    psi,
                    psi_hat,
                    psi_prime,
                },
            ));
        }

        Ok(Transition::Next {
            round: SignRound::Three(RoundThree::new(
                self.ctx,
                self.nonces,
                self.ciphertexts,
                betas,
            )),
            messages,
        })
    }
}

/// The sending side of a multiplicative-to-additive conversion with one peer.
struct MtaSender<'a> {
    setup_params: &'a RingPedersen,
    peer_key: &'a EncryptionKey,
    own_key: &'a EncryptionKey,
    peer_K: &'a Ciphertext,
    transcript: &'a mut Transcript,
}

impl MtaSender<'_> {
    /// Turns `x · k_j` into `α + β`, where the peer learns
    /// `α = x · k_j + β'` from `D = K_j^x · enc_j(β')` and this party keeps
    /// `β = -β'`. `X = G^x` is the public image of `x`.
    fn convert<R: RngCore + CryptoRng>(
        &mut self,
        x: &BigNumber,
        X: &CurvePoint,
        rng: &mut R,
    ) -> Result<(Ciphertext, Ciphertext, PiAffgProof, Scalar)> {
        let beta = random_plusminus_by_size(rng, ELL_PRIME);
        let (masked, s) = self.peer_key.encrypt(rng, &beta)?;
        let D = self.peer_key.multiply_and_add(x, self.peer_K, &masked)?;
        let (F, r) = self.own_key.encrypt(rng, &beta)?;
        let psi = PiAffgProof::prove(
            &PiAffgInput::new(
                self.setup_params,
                self.peer_key,
                self.own_key,
                self.peer_K,
                &D,
                &F,
                X,
            ),
            &PiAffgSecret::new(x, &beta, &s, &r),
            self.transcript,
            rng,
        )?;
        Ok((D, F, psi, -bn_to_scalar(&beta)?))
    }
}

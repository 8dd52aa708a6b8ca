// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use super::{
    round_four::RoundFour, round_two::NonceCiphertexts, SignContext, SignNonces, SignRound,
};
use crate::{
    errors::{blame, InternalError, Result},
    messages::{unexpected_payload, Payload},
    paillier::Ciphertext,
    protocol::PartyId,
    round::{Outgoing, Transition},
    utils::{bn_to_scalar, scalar_to_bn, CurvePoint},
    zkp::{
        piaffg::{PiAffgInput, PiAffgProof},
        pilog::{self, PiLogProof},
        Proof,
    },
};
use k256::Scalar;
use rand::{CryptoRng, RngCore};
use std::collections::BTreeMap;
use tracing::{error, info, instrument};

/// Finishes the conversions and publishes `δ_i` and `Δ_i`.
pub(crate) struct RoundThree {
    ctx: SignContext,
    nonces: SignNonces,
    ciphertexts: BTreeMap<PartyId, NonceCiphertexts>,
    /// This party's halves `(β, β̂)` of the conversions it started.
    betas: BTreeMap<PartyId, (Scalar, Scalar)>,
    gammas: BTreeMap<PartyId, CurvePoint>,
    /// The halves `(α, α̂)` of the conversions peers started.
    alphas: BTreeMap<PartyId, (Scalar, Scalar)>,
}

impl RoundThree {
    pub(super) fn new(
        ctx: SignContext,
        nonces: SignNonces,
        ciphertexts: BTreeMap<PartyId, NonceCiphertexts>,
        betas: BTreeMap<PartyId, (Scalar, Scalar)>,
    ) -> Self {
        Self {
            ctx,
            nonces,
            ciphertexts,
            betas,
            gammas: BTreeMap::new(),
            alphas: BTreeMap::new(),
        }
    }

    pub(super) fn handle_broadcast(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
        let Payload::SignGamma { Gamma } = payload else {
            return Err(unexpected_payload(from, 3, payload));
        };
        let _ = self.gammas.insert(from.clone(), *Gamma);
        Ok(())
    }

    pub(super) fn handle_direct(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
        let Payload::SignMta {
            D,
            D_hat,
            F,
            F_hat,
            psi,
            psi_hat,
            psi_prime,
        } = payload
        else {
            return Err(unexpected_payload(from, 3, payload));
        };
        let alphas = self
            .receive_mta(from, [D, D_hat], [F, F_hat], [psi, psi_hat], psi_prime)
            .map_err(blame(from))?;
        let _ = self.alphas.insert(from.clone(), alphas);
        Ok(())
    }

    /// Checks the conversion messages from `from` and decrypts this party's
    /// halves.
    fn receive_mta(
        &self,
        from: &PartyId,
        [D, D_hat]: [&Ciphertext; 2],
        [F, F_hat]: [&Ciphertext; 2],
        [psi, psi_hat]: [&PiAffgProof; 2],
        psi_prime: &PiLogProof,
    ) -> Result<(Scalar, Scalar)> {
        let ctx = &self.ctx;
        let setup_params = ctx.own_pedersen()?;
        let own_key = ctx.key.paillier().encryption_key();
        let peer_key = &ctx.public(from)?.paillier;
        let own = self.ciphertexts(ctx.self_id())?;
        let peer = self.ciphertexts(from)?;
        let peer_Gamma = self
            .gammas
            .get(from)
            .ok_or(InternalError::InternalInvariantFailed)?;

        let mut transcript = ctx.transcript.for_pair(from, ctx.self_id());
        psi.verify(
            &PiAffgInput::new(setup_params, &own_key, peer_key, &own.K, D, F, peer_Gamma),
            &mut transcript,
        )?;
        psi_hat.verify(
            &PiAffgInput::new(
                setup_params,
                &own_key,
                peer_key,
                &own.K,
                D_hat,
                F_hat,
                ctx.weighted_public(from)?,
            ),
            &mut transcript,
        )?;
        psi_prime.verify(
            &pilog::CommonInput::new(
                setup_params,
                peer_key,
                &peer.G,
                peer_Gamma,
                &CurvePoint::GENERATOR,
            ),
            &mut transcript,
        )?;

        let paillier = ctx.key.paillier();
        let alpha = bn_to_scalar(&paillier.decrypt(D)?)?;
        let alpha_hat = bn_to_scalar(&paillier.decrypt(D_hat)?)?;
        Ok((alpha, alpha_hat))
    }

    fn ciphertexts(&self, party: &PartyId) -> Result<&NonceCiphertexts> {
        self.ciphertexts
            .get(party)
            .ok_or(InternalError::InternalInvariantFailed)
    }

    /// Computes `Γ`, `δ_i`, `χ_i` and `Δ_i`, and proves `Δ_i` consistent
    /// with `K_i` to every peer.
    #[cfg_attr(feature = "flame_it", flame("sign"))]
    #[instrument(skip_all, err(Debug))]
    pub(super) fn process<R: RngCore + CryptoRng>(
        self,
        rng: &mut R,
    ) -> Result<Transition<SignRound>> {
        info!("Generating round three sign messages.");
        let ctx = &self.ctx;
        let k = &self.nonces.k;

        let Gamma: CurvePoint = self.gammas.values().copied().sum();
        if Gamma.is_identity() {
            error!("The combined nonce point is the identity");
            return Err(InternalError::ProtocolError(None));
        }
        let Delta = Gamma.multiply_by_scalar(k);

        let mut delta = self.nonces.gamma * k;
        let mut chi = ctx.weighted_share * k;
        for peer in ctx.config.other_ids() {
            let (alpha, alpha_hat) = self
                .alphas
                .get(peer)
                .ok_or(InternalError::InternalInvariantFailed)?;
            let (beta, beta_hat) = self
                .betas
                .get(peer)
                .ok_or(InternalError::InternalInvariantFailed)?;
            delta += alpha + beta;
            chi += alpha_hat + beta_hat;
        }

        let own_key = ctx.key.paillier().encryption_key();
        let own_K = &self.ciphertexts(ctx.self_id())?.K;
        let secret = pilog::ProverSecret::new(&scalar_to_bn(k), &self.nonces.rho);
        let mut messages = vec![Outgoing::Broadcast(Payload::SignDelta { delta, Delta })];
        for peer in ctx.config.other_ids() {
            let proof = PiLogProof::prove(
                &pilog::CommonInput::new(&ctx.public(peer)?.pedersen, &own_key, own_K, &Delta, &Gamma),
                &secret,
                &mut ctx.transcript.for_pair(ctx.self_id(), peer),
                rng,
            )?;
            messages.push(Outgoing::Direct(
                peer.clone(),
                Payload::SignDeltaProof { proof },
            ));
        }

        let ciphertexts = self
            .ciphertexts
            .into_iter()
            .map(|(id, c)| (id, c.K))
            .collect();
        Ok(Transition::Next {
            round: SignRound::Four(RoundFour::new(
                self.ctx,
                self.nonces,
                ciphertexts,
                Gamma,
                chi,
            )),
            messages,
        })
    }
}

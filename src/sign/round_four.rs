// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use super::{round_five::RoundFive, SignContext, SignNonces, SignRound};
use crate::{
    errors::{blame, InternalError, Result},
    messages::{unexpected_payload, Payload},
    paillier::Ciphertext,
    protocol::PartyId,
    round::{Outgoing, Transition},
    utils::{bn_to_scalar, CurvePoint},
    zkp::{
        pilog::{self, PiLogProof},
        Proof,
    },
};
use k256::Scalar;
use libpaillier::unknown_order::BigNumber;
use std::collections::BTreeMap;
use tracing::{error, info, instrument};
use zeroize::Zeroize;

pub(crate) struct RoundFour {
    ctx: SignContext,
    nonces: SignNonces,
    Ks: BTreeMap<PartyId, Ciphertext>,
    Gamma: CurvePoint,
    chi: Scalar,
    deltas: BTreeMap<PartyId, (Scalar, CurvePoint)>,
}

impl Drop for RoundFour {
    fn drop(&mut self) {
        self.chi.zeroize();
    }
}

impl RoundFour {
    pub(super) fn new(
        ctx: SignContext,
        nonces: SignNonces,
        Ks: BTreeMap<PartyId, Ciphertext>,
        Gamma: CurvePoint,
        chi: Scalar,
    ) -> Self {
        Self {
            ctx,
            nonces,
            Ks,
            Gamma,
            chi,
            deltas: BTreeMap::new(),
        }
    }

    pub(super) fn handle_broadcast(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
        let Payload::SignDelta { delta, Delta } = payload else {
            return Err(unexpected_payload(from, 4, payload));
        };
        if bool::from(delta.is_zero()) || Delta.is_identity() {
            error!("Party {from} sent a degenerate delta share");
            return Err(InternalError::ProtocolError(Some(from.clone())));
        }
        let _ = self.deltas.insert(from.clone(), (*delta, *Delta));
        Ok(())
    }

    pub(super) fn handle_direct(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
        let Payload::SignDeltaProof { proof } = payload else {
            return Err(unexpected_payload(from, 4, payload));
        };
        self.verify_delta(from, proof).map_err(blame(from))
    }

    /// Checks that `Δ_j = Γ^{k_j}` for the `k_j` encrypted in `K_j`.
    fn verify_delta(&self, from: &PartyId, proof: &PiLogProof) -> Result<()> {
        let ctx = &self.ctx;
        let K = self
            .Ks
            .get(from)
            .ok_or(InternalError::InternalInvariantFailed)?;
        let (_, Delta) = self
            .deltas
            .get(from)
            .ok_or(InternalError::InternalInvariantFailed)?;
        proof.verify(
            &pilog::CommonInput::new(
                ctx.own_pedersen()?,
                &ctx.public(from)?.paillier,
                K,
                Delta,
                &self.Gamma,
            ),
            &mut ctx.transcript.for_pair(from, ctx.self_id()),
        )
    }

    /// Checks `G^δ = Δ`, fixes `R` and broadcasts the partial signature.
    #[instrument(skip_all, err(Debug))]
    pub(super) fn process(self) -> Result<Transition<SignRound>> {
        info!("Generating round four sign messages.");
        let delta: Scalar = self.deltas.values().map(|(d, _)| d).sum();
        let Delta: CurvePoint = self.deltas.values().map(|(_, D)| *D).sum();
        if CurvePoint::base_mul(&delta) != Delta {
            error!("Delta shares are inconsistent with the encrypted nonces");
            return Err(InternalError::ProtocolError(None));
        }
        let delta_inv = Option::<Scalar>::from(delta.invert())
            .ok_or(InternalError::CouldNotInvertScalar)?;

        let R = self.Gamma.multiply_by_scalar(&delta_inv);
        let r = R.x_projection()?;
        let m = bn_to_scalar(&BigNumber::from_slice(self.ctx.digest))?;
        let sigma = self.nonces.k * m + r * self.chi;

        Ok(Transition::Next {
            round: SignRound::Five(RoundFive::new(self.ctx.clone(), R)),
            messages: vec![Outgoing::Broadcast(Payload::SignSigma { sigma })],
        })
    }
}

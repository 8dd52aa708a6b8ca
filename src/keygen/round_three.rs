// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use super::{round_four::RoundFour, KeygenContext, KeygenPublicValues, KeygenRound, KeygenSecrets};
use crate::{
    errors::{blame, InternalError, Result},
    messages::{unexpected_payload, Payload},
    paillier::bit_length,
    protocol::PartyId,
    round::{Outgoing, Transition},
    transcript::{Commitment, Decommitment},
    utils::scalar_to_bn,
    zkp::{
        pifac::{PiFacInput, PiFacProof, PiFacSecret},
        pimod::{self, PiModProof},
        piprm::{PiPrmProof, PiPrmSecret},
        Proof,
    },
};
use rand::{CryptoRng, RngCore};
use std::collections::BTreeMap;
use tracing::{error, info, instrument, trace};

/// Opens the commitments and fixes the session-wide randomness.
pub(crate) struct RoundThree {
    ctx: KeygenContext,
    secrets: KeygenSecrets,
    commitments: BTreeMap<PartyId, Commitment>,
    opened: BTreeMap<PartyId, KeygenPublicValues>,
}

impl RoundThree {
    pub(super) fn new(
        ctx: KeygenContext,
        secrets: KeygenSecrets,
        commitments: BTreeMap<PartyId, Commitment>,
    ) -> Self {
        Self {
            ctx,
            secrets,
            commitments,
            opened: BTreeMap::new(),
        }
    }

    pub(super) fn handle_broadcast(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
        let Payload::KeygenDecommit {
            values,
            decommitment,
        } = payload
        else {
            return Err(unexpected_payload(from, 3, payload));
        };
        self.verify_opening(from, values, decommitment)
            .map_err(blame(from))?;
        let _ = self.opened.insert(from.clone(), values.clone());
        Ok(())
    }

    fn verify_opening(
        &self,
        from: &PartyId,
        values: &KeygenPublicValues,
        decommitment: &Decommitment,
    ) -> Result<()> {
        let commitment = self
            .commitments
            .get(from)
            .ok_or(InternalError::InternalInvariantFailed)?;
        if !self
            .ctx
            .transcript
            .decommit(commitment, decommitment, &(from, values))
        {
            error!("Decommitment of {from} does not open its round one commitment");
            return verify_err!("decommitment does not match commitment");
        }
        values.feldman.check_contribution(self.ctx.config.threshold())?;
        values.pedersen.validate()?;
        if values.pedersen.modulus() != values.paillier.modulus() {
            error!("Ring-Pedersen modulus of {from} differs from its Paillier modulus");
            return verify_err!("ring-Pedersen and Paillier moduli differ");
        }
        if bit_length(values.paillier.modulus()) < 2 * self.ctx.prime_bits - 1 {
            error!("Paillier modulus of {from} is too small");
            return verify_err!("Paillier modulus is too small");
        }
        Ok(())
    }

    /// Fixes `rid`, proves the Paillier and ring-Pedersen parameters
    /// well-formed, and deals the shares.
    #[cfg_attr(feature = "flame_it", flame("keygen"))]
    #[instrument(skip_all, err(Debug))]
    pub(super) fn process<R: RngCore + CryptoRng>(
        self,
        rng: &mut R,
    ) -> Result<Transition<KeygenRound>> {
        info!("Generating round three keygen messages.");
        let mut ctx = self.ctx;
        let secrets = self.secrets;
        let opened = self.opened;

        let xor = |pick: fn(&KeygenPublicValues) -> [u8; 32]| {
            opened.values().map(pick).fold([0u8; 32], |mut acc, x| {
                acc.iter_mut().zip(x).for_each(|(a, b)| *a ^= b);
                acc
            })
        };
        let rid = xor(|v| v.rid);
        let chain_key = xor(|v| v.chain_key);
        ctx.transcript.update(b"rid", &rid);

        let (p, q) = secrets.paillier.primes();
        let mut transcript = ctx.transcript.for_prover(ctx.self_id());
        let mod_proof = PiModProof::prove(
            &pimod::CommonInput::new(secrets.paillier.modulus()),
            &pimod::ProverSecret::new(p, q),
            &mut transcript,
            rng,
        )?;
        let own = opened
            .get(ctx.self_id())
            .ok_or(InternalError::InternalInvariantFailed)?;
        let prm_proof = PiPrmProof::prove(
            &own.pedersen,
            &PiPrmSecret::new(
                secrets.pedersen_lambda.clone(),
                secrets.pedersen_totient.clone(),
            ),
            &mut transcript,
            rng,
        )?;

        let mut messages = vec![Outgoing::Broadcast(Payload::KeygenProofs {
            mod_proof,
            prm_proof,
        })];
        for peer in ctx.config.other_ids() {
            let peer_values = opened
                .get(peer)
                .ok_or(InternalError::InternalInvariantFailed)?;
            let share = secrets.poly.evaluate(&peer.eval_point()?);
            let (ciphertext, _) = peer_values.paillier.encrypt(rng, &scalar_to_bn(&share))?;
            let fac_proof = PiFacProof::prove(
                &PiFacInput::new(&peer_values.pedersen, secrets.paillier.modulus()),
                &PiFacSecret::new(p, q),
                &mut ctx.transcript.for_pair(ctx.self_id(), peer),
                rng,
            )?;
            trace!("Dealt share for {peer}");
            messages.push(Outgoing::Direct(
                peer.clone(),
                Payload::KeygenShare {
                    ciphertext,
                    fac_proof,
                },
            ));
        }

        Ok(Transition::Next {
            round: KeygenRound::Four(RoundFour::new(ctx, secrets, opened, rid, chain_key)),
            messages,
        })
    }
}

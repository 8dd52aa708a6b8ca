// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use super::{round_five::RoundFive, KeygenContext, KeygenPublicValues, KeygenRound, KeygenSecrets};
use crate::{
    errors::{blame, InternalError, Result},
    messages::{unexpected_payload, Payload},
    paillier::Ciphertext,
    protocol::PartyId,
    round::{Outgoing, Transition},
    utils::{bn_to_scalar, k256_order, CurvePoint},
    zkp::{
        pifac::{PiFacInput, PiFacProof},
        pimod::{self, PiModProof},
        piprm::PiPrmProof,
        pisch::{self, PiSchProof},
        Proof,
    },
};
use k256::Scalar;
use libpaillier::unknown_order::BigNumber;
use std::collections::BTreeMap;
use tracing::{error, info, instrument};

/// Checks the parameter proofs and the dealt shares, and derives the key.
pub(crate) struct RoundFour {
    ctx: KeygenContext,
    secrets: KeygenSecrets,
    opened: BTreeMap<PartyId, KeygenPublicValues>,
    rid: [u8; 32],
    chain_key: [u8; 32],
    shares: BTreeMap<PartyId, Scalar>,
}

impl RoundFour {
    pub(super) fn new(
        ctx: KeygenContext,
        secrets: KeygenSecrets,
        opened: BTreeMap<PartyId, KeygenPublicValues>,
        rid: [u8; 32],
        chain_key: [u8; 32],
    ) -> Self {
        Self {
            ctx,
            secrets,
            opened,
            rid,
            chain_key,
            shares: BTreeMap::new(),
        }
    }

    fn opened(&self, party: &PartyId) -> Result<&KeygenPublicValues> {
        self.opened
            .get(party)
            .ok_or(InternalError::InternalInvariantFailed)
    }

    pub(super) fn handle_broadcast(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
        let Payload::KeygenProofs {
            mod_proof,
            prm_proof,
        } = payload
        else {
            return Err(unexpected_payload(from, 4, payload));
        };
        if from == self.ctx.self_id() {
            return Ok(());
        }
        self.verify_parameter_proofs(from, mod_proof, prm_proof)
            .map_err(blame(from))
    }

    fn verify_parameter_proofs(
        &self,
        from: &PartyId,
        mod_proof: &PiModProof,
        prm_proof: &PiPrmProof,
    ) -> Result<()> {
        let values = self.opened(from)?;
        let mut transcript = self.ctx.transcript.for_prover(from);
        mod_proof.verify(
            &pimod::CommonInput::new(values.paillier.modulus()),
            &mut transcript,
        )?;
        prm_proof.verify(&values.pedersen, &mut transcript)
    }

    pub(super) fn handle_direct(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
        let Payload::KeygenShare {
            ciphertext,
            fac_proof,
        } = payload
        else {
            return Err(unexpected_payload(from, 4, payload));
        };
        let share = self
            .receive_share(from, ciphertext, fac_proof)
            .map_err(blame(from))?;
        let _ = self.shares.insert(from.clone(), share);
        Ok(())
    }

    /// Decrypts the share dealt by `from` and checks it against the dealer's
    /// Feldman commitment.
    fn receive_share(
        &self,
        from: &PartyId,
        ciphertext: &Ciphertext,
        fac_proof: &PiFacProof,
    ) -> Result<Scalar> {
        let self_id = self.ctx.self_id();
        let own = self.opened(self_id)?;
        let dealer = self.opened(from)?;
        let paillier = &self.secrets.paillier;

        paillier.encryption_key().validate_ciphertext(ciphertext)?;
        fac_proof.verify(
            &PiFacInput::new(&own.pedersen, dealer.paillier.modulus()),
            &mut self.ctx.transcript.for_pair(from, self_id),
        )?;

        let plaintext = paillier.decrypt(ciphertext)?;
        if plaintext < BigNumber::zero() || plaintext >= k256_order() {
            error!("Share dealt by {from} is not a canonical scalar");
            return verify_err!("share out of range");
        }
        let share = bn_to_scalar(&plaintext)?;
        if CurvePoint::base_mul(&share) != dealer.feldman.evaluate(&self_id.eval_point()?) {
            error!("Share dealt by {from} does not match its Feldman commitment");
            return verify_err!("share does not match Feldman commitment");
        }
        Ok(share)
    }

    /// Sums the shares, computes every party's public share and proves
    /// knowledge of the secret share.
    #[instrument(skip_all, err(Debug))]
    pub(super) fn process(self) -> Result<Transition<KeygenRound>> {
        info!("Generating round four keygen messages.");
        let mut ctx = self.ctx;
        let self_eval = ctx.self_id().eval_point()?;

        let ecdsa_share = self
            .shares
            .values()
            .fold(self.secrets.poly.evaluate(&self_eval), |acc, s| acc + s);

        let mut contributions = self.opened.values().map(|v| &v.feldman);
        let first = contributions
            .next()
            .ok_or(InternalError::InternalInvariantFailed)?
            .clone();
        let aggregate = contributions.try_fold(first, |acc, f| &acc + f)?;
        let public_shares = ctx
            .config
            .party_ids()
            .iter()
            .map(|id| Ok((id.clone(), aggregate.evaluate(&id.eval_point()?))))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let X = *public_shares
            .get(ctx.self_id())
            .ok_or(InternalError::InternalInvariantFailed)?;
        if CurvePoint::base_mul(&ecdsa_share) != X {
            error!("Own secret share does not match the aggregate Feldman commitment");
            return Err(InternalError::InternalInvariantFailed);
        }
        ctx.transcript
            .update(b"public shares", &public_shares.iter().collect::<Vec<_>>());

        let proof = PiSchProof::prove_from_precommit(
            &self.secrets.precommit,
            &pisch::CommonInput::new(&X),
            &pisch::ProverSecret::new(&ecdsa_share),
            &mut ctx.transcript.for_prover(ctx.self_id()),
        )?;

        Ok(Transition::Next {
            round: KeygenRound::Five(RoundFive::new(
                ctx,
                self.secrets,
                self.opened,
                self.rid,
                self.chain_key,
                ecdsa_share,
                public_shares,
            )),
            messages: vec![Outgoing::Broadcast(Payload::KeygenSchnorr { proof })],
        })
    }
}

// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use super::{
    KeygenContext, KeygenPublicValues, KeygenRound, KeygenSecrets, PartyPublicKeyConfig,
    PartySecretKeyConfig,
};
use crate::{
    errors::{blame, InternalError, Result},
    messages::{unexpected_payload, Payload},
    protocol::PartyId,
    round::Transition,
    utils::CurvePoint,
    zkp::{
        pisch::{self, PiSchProof},
        Proof,
    },
};
use k256::Scalar;
use std::collections::BTreeMap;
use tracing::{error, info, instrument};
use zeroize::Zeroize;

/// Checks the Schnorr proofs and assembles the output.
pub(crate) struct RoundFive {
    ctx: KeygenContext,
    secrets: KeygenSecrets,
    opened: BTreeMap<PartyId, KeygenPublicValues>,
    rid: [u8; 32],
    chain_key: [u8; 32],
    ecdsa_share: Scalar,
    public_shares: BTreeMap<PartyId, CurvePoint>,
}

impl Drop for RoundFive {
    fn drop(&mut self) {
        self.ecdsa_share.zeroize();
    }
}

impl RoundFive {
    pub(super) fn new(
        ctx: KeygenContext,
        secrets: KeygenSecrets,
        opened: BTreeMap<PartyId, KeygenPublicValues>,
        rid: [u8; 32],
        chain_key: [u8; 32],
        ecdsa_share: Scalar,
        public_shares: BTreeMap<PartyId, CurvePoint>,
    ) -> Self {
        Self {
            ctx,
            secrets,
            opened,
            rid,
            chain_key,
            ecdsa_share,
            public_shares,
        }
    }

    pub(super) fn handle_broadcast(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
        let Payload::KeygenSchnorr { proof } = payload else {
            return Err(unexpected_payload(from, 5, payload));
        };
        self.verify_schnorr(from, proof).map_err(blame(from))
    }

    fn verify_schnorr(&self, from: &PartyId, proof: &PiSchProof) -> Result<()> {
        let committed = self
            .opened
            .get(from)
            .map(|v| v.schnorr_commitment)
            .ok_or(InternalError::InternalInvariantFailed)?;
        if proof.commitment() != &committed {
            error!("Schnorr proof of {from} does not use its committed first message");
            return verify_err!("Schnorr commitment mismatch");
        }
        let X = self
            .public_shares
            .get(from)
            .ok_or(InternalError::InternalInvariantFailed)?;
        proof.verify(
            &pisch::CommonInput::new(X),
            &mut self.ctx.transcript.for_prover(from),
        )
    }

    #[instrument(skip_all, err(Debug))]
    pub(super) fn process(self) -> Result<Transition<KeygenRound>> {
        info!("Keygen complete. Creating key share.");
        let public_party_data = self
            .opened
            .iter()
            .map(|(id, values)| {
                let ecdsa_point = *self
                    .public_shares
                    .get(id)
                    .ok_or(InternalError::InternalInvariantFailed)?;
                Ok((
                    id.clone(),
                    PartyPublicKeyConfig {
                        ecdsa_point,
                        elgamal_point: values.elgamal_point,
                        paillier: values.paillier.clone(),
                        pedersen: values.pedersen.clone(),
                    },
                ))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        let output = PartySecretKeyConfig::new(
            self.ctx.self_id().clone(),
            self.ctx.config.threshold(),
            self.ecdsa_share,
            self.secrets.elgamal_secret,
            self.secrets.paillier.clone(),
            self.rid,
            self.chain_key,
            public_party_data,
        );
        Ok(Transition::Done {
            output,
            messages: Vec::new(),
        })
    }
}

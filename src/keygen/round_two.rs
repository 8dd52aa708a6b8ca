// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use super::{
    round_three::RoundThree, KeygenContext, KeygenPublicValues, KeygenRound, KeygenSecrets,
};
use crate::{
    errors::Result,
    messages::{unexpected_payload, Payload},
    protocol::PartyId,
    round::{Outgoing, Transition},
    transcript::{Commitment, Decommitment},
};
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// Collects the commitments. Nothing can be checked until they are opened.
pub(crate) struct RoundTwo {
    ctx: KeygenContext,
    secrets: KeygenSecrets,
    values: KeygenPublicValues,
    decommitment: Decommitment,
    commitments: BTreeMap<PartyId, Commitment>,
}

impl RoundTwo {
    pub(super) fn new(
        ctx: KeygenContext,
        secrets: KeygenSecrets,
        values: KeygenPublicValues,
        decommitment: Decommitment,
    ) -> Self {
        Self {
            ctx,
            secrets,
            values,
            decommitment,
            commitments: BTreeMap::new(),
        }
    }

    pub(super) fn handle_broadcast(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
        match payload {
            Payload::KeygenCommit { commitment } => {
                let _ = self.commitments.insert(from.clone(), *commitment);
                Ok(())
            }
            other => Err(unexpected_payload(from, 2, other)),
        }
    }

    #[instrument(skip_all, err(Debug))]
    pub(super) fn process(self) -> Result<Transition<KeygenRound>> {
        info!("Generating round two keygen messages.");
        let payload = Payload::KeygenDecommit {
            values: self.values,
            decommitment: self.decommitment,
        };
        Ok(Transition::Next {
            round: KeygenRound::Three(RoundThree::new(self.ctx, self.secrets, self.commitments)),
            messages: vec![Outgoing::Broadcast(payload)],
        })
    }
}

// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use super::{SignContext, SignRound, SignatureOutput};
use crate::{
    errors::{InternalError, Result},
    messages::{unexpected_payload, Payload},
    protocol::PartyId,
    round::Transition,
    utils::CurvePoint,
};
use k256::{elliptic_curve::scalar::IsHigh, Scalar};
use std::collections::BTreeMap;
use tracing::{error, info, instrument};

pub(crate) struct RoundFive {
    ctx: SignContext,
    R: CurvePoint,
    sigmas: BTreeMap<PartyId, Scalar>,
}

impl RoundFive {
    pub(super) fn new(ctx: SignContext, R: CurvePoint) -> Self {
        Self {
            ctx,
            R,
            sigmas: BTreeMap::new(),
        }
    }

    pub(super) fn handle_broadcast(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
        let Payload::SignSigma { sigma } = payload else {
            return Err(unexpected_payload(from, 5, payload));
        };
        let _ = self.sigmas.insert(from.clone(), *sigma);
        Ok(())
    }

    /// Adds up the partial signatures, normalizes `s` to the low half and
    /// checks the result against the public key.
    #[instrument(skip_all, err(Debug))]
    pub(super) fn process(self) -> Result<Transition<SignRound>> {
        info!("Assembling the signature.");
        let mut s: Scalar = self.sigmas.values().sum();
        if bool::from(s.is_high()) {
            s = -s;
        }
        let signature = SignatureOutput::new(self.R, s);
        if signature
            .verify(&self.ctx.public_key, &self.ctx.digest)
            .is_err()
        {
            error!("The combined signature does not verify");
            return Err(InternalError::ProtocolError(None));
        }
        Ok(Transition::Done {
            output: signature,
            messages: vec![],
        })
    }
}

// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The interface between a protocol's rounds and the session driver.

use crate::{
    errors::Result,
    messages::Payload,
    protocol::{PartyId, ProtocolId},
};
use rand::{CryptoRng, RngCore};

/// A message produced by [`Round::process`].
#[derive(Debug)]
pub(crate) enum Outgoing {
    Broadcast(Payload),
    Direct(PartyId, Payload),
}

/// The result of processing a round.
pub(crate) enum Transition<R: Round> {
    /// Move on to `round`, sending `messages` to the peers.
    Next { round: R, messages: Vec<Outgoing> },
    /// The protocol finished.
    Done {
        output: R::Output,
        messages: Vec<Outgoing>,
    },
}

/// One round of a protocol, as seen by [`Session`](crate::session::Session).
///
/// Round `r` consumes the messages tagged `r`, which peers emitted when they
/// processed round `r - 1`. The driver feeds every buffered message of the
/// round through the handlers (broadcasts first) and then calls
/// [`Round::process`] exactly once.
pub(crate) trait Round: Sized {
    type Output;

    fn protocol() -> ProtocolId;

    /// The round number, starting at 1.
    fn number(&self) -> u16;

    /// Whether every party (self included) broadcasts to this round.
    fn expects_broadcast(&self) -> bool;

    /// Whether every other party sends this party a direct message for this
    /// round.
    fn expects_direct(&self) -> bool;

    fn handle_broadcast(&mut self, from: &PartyId, payload: &Payload) -> Result<()>;

    fn handle_direct(&mut self, from: &PartyId, payload: &Payload) -> Result<()>;

    /// Consumes the round once all of its messages were handled.
    fn process<Rng: RngCore + CryptoRng>(self, rng: &mut Rng) -> Result<Transition<Self>>;
}

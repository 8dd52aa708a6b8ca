// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The per-node entry point.
//!
//! A [`SessionManager`] runs at most one session at a time, either key
//! generation or signing. The caller feeds it every [`Envelope`] the network
//! delivers and sends whatever it returns; once the session completes, the
//! output is available as a typed value or as the JSON artifact.
//!
//! Nodes do not start a session at the same instant, so messages for a
//! session this node has not started yet are stashed and replayed into the
//! session once it starts.

use crate::{
    errors::{InternalError, Result},
    keygen::{KeygenRound, PartySecretKeyConfig},
    messages::Envelope,
    protocol::{DriverConfig, Identifier, PartyId, SessionConfig},
    roster::Roster,
    session::{Session, SessionStatus},
    sign::{SignInput, SignRound, SignatureOutput},
};
use rand::{CryptoRng, RngCore};
use std::time::Instant;
use tracing::{error, info, instrument, trace, warn};

/// The most messages kept for sessions that have not started yet.
const MAX_STASHED_MESSAGES: usize = 1024;

enum ActiveSession {
    Keygen(Session<KeygenRound>),
    Sign(Session<SignRound>),
}

impl ActiveSession {
    fn status(&self) -> &SessionStatus {
        match self {
            ActiveSession::Keygen(session) => session.status(),
            ActiveSession::Sign(session) => session.status(),
        }
    }
}

/// Runs this node's protocol sessions.
pub struct SessionManager<Ro: Roster> {
    roster: Ro,
    self_id: PartyId,
    driver: DriverConfig,
    active: Option<ActiveSession>,
    /// Messages for sessions other than the active one.
    stash: Vec<Envelope>,
}

impl<Ro: Roster> SessionManager<Ro> {
    /// Creates a manager for the node `self_id`.
    pub fn new(roster: Ro, self_id: PartyId, driver: DriverConfig) -> Result<Self> {
        driver.validate()?;
        if roster.resolve_public_key(&self_id).is_none() {
            error!("Node {self_id} is not in its own roster");
            return arg_err!("self is not in the roster");
        }
        Ok(Self {
            roster,
            self_id,
            driver,
            active: None,
            stash: Vec::new(),
        })
    }

    pub fn self_id(&self) -> &PartyId {
        &self.self_id
    }

    /// Starts key generation among `party_ids`, or among every node of the
    /// roster if `party_ids` is empty. Returns the first messages to send.
    #[instrument(skip_all, err(Debug))]
    pub fn init_keygen<R: RngCore + CryptoRng>(
        &mut self,
        sid: Identifier,
        threshold: usize,
        party_ids: Vec<PartyId>,
        rng: &mut R,
    ) -> Result<Vec<Envelope>> {
        self.check_idle()?;
        let party_ids = if party_ids.is_empty() {
            self.roster.all_parties()
        } else {
            party_ids
        };
        self.check_known(&party_ids)?;
        let config = SessionConfig::new(self.self_id.clone(), party_ids, threshold)?;
        let round = KeygenRound::new(config.clone(), sid, self.driver.prime_bits);
        let mut session = Session::new(config, sid, self.driver.clone(), round);
        let result = session.start(rng);
        self.active = Some(ActiveSession::Keygen(session));
        self.replay_stashed(result?, rng)
    }

    /// Starts signing `digest` with `key` among `signers`. Returns the first
    /// messages to send.
    #[instrument(skip_all, err(Debug))]
    pub fn init_signing<R: RngCore + CryptoRng>(
        &mut self,
        sid: Identifier,
        key: PartySecretKeyConfig,
        signers: Vec<PartyId>,
        digest: [u8; 32],
        rng: &mut R,
    ) -> Result<Vec<Envelope>> {
        self.check_idle()?;
        if key.party_id() != &self.self_id {
            error!(
                "Key share of {} cannot be used by node {}",
                key.party_id(),
                self.self_id
            );
            return arg_err!("key share belongs to another node");
        }
        self.check_known(&signers)?;
        let input = SignInput::new(key, signers, digest)?;
        let config = input.config().clone();
        let round = SignRound::new(input, sid)?;
        let mut session = Session::new(config, sid, self.driver.clone(), round);
        let result = session.start(rng);
        self.active = Some(ActiveSession::Sign(session));
        self.replay_stashed(result?, rng)
    }

    /// Delivers one message to the active session and returns the messages
    /// to send in response. A message for any other session is stashed
    /// until that session starts.
    pub fn handle<R: RngCore + CryptoRng>(
        &mut self,
        envelope: Envelope,
        rng: &mut R,
    ) -> Result<Vec<Envelope>> {
        if self.roster.resolve_public_key(envelope.from()).is_none() {
            warn!("Rejecting a message from unknown node {}", envelope.from());
            return Err(InternalError::MisroutedMessage);
        }
        match self.active.as_mut() {
            Some(ActiveSession::Keygen(session)) if session.sid() == envelope.session_id() => {
                session.handle(envelope, rng)
            }
            Some(ActiveSession::Sign(session)) if session.sid() == envelope.session_id() => {
                session.handle(envelope, rng)
            }
            _ => self.stash_message(envelope),
        }
    }

    fn stash_message(&mut self, envelope: Envelope) -> Result<Vec<Envelope>> {
        if self.stash.len() >= MAX_STASHED_MESSAGES {
            warn!(
                "Dropping the round {} message from {} for session {}: the stash is full",
                envelope.round_number(),
                envelope.from(),
                envelope.session_id()
            );
            return Err(InternalError::SessionNotActive);
        }
        trace!(
            "Stashing the round {} message from {} for session {}",
            envelope.round_number(),
            envelope.from(),
            envelope.session_id()
        );
        self.stash.push(envelope);
        Ok(Vec::new())
    }

    /// Feeds the stashed messages of the session that just started into
    /// it. `outgoing` holds the messages its first round produced.
    fn replay_stashed<R: RngCore + CryptoRng>(
        &mut self,
        mut outgoing: Vec<Envelope>,
        rng: &mut R,
    ) -> Result<Vec<Envelope>> {
        let Some(sid) = self.session_id() else {
            return Ok(outgoing);
        };
        let (ready, rest): (Vec<Envelope>, Vec<Envelope>) = std::mem::take(&mut self.stash)
            .into_iter()
            .partition(|envelope| envelope.session_id() == sid);
        self.stash = rest;
        if !ready.is_empty() {
            info!("Replaying {} stashed messages into session {sid}", ready.len());
        }
        for envelope in ready {
            match self.handle(envelope, rng) {
                Ok(messages) => outgoing.extend(messages),
                // The abort shows in the status; what was produced so far
                // still has to go out.
                Err(_) if !outgoing.is_empty() => break,
                Err(e) => return Err(e),
            }
        }
        Ok(outgoing)
    }

    /// Aborts the active session if its current round has timed out.
    pub fn poll_timeouts(&mut self, now: Instant) -> Result<()> {
        match self.active.as_mut() {
            Some(ActiveSession::Keygen(session)) => session.check_deadline(now),
            Some(ActiveSession::Sign(session)) => session.check_deadline(now),
            None => Ok(()),
        }
    }

    /// The status of the current session, if there is one.
    pub fn status(&self) -> Option<&SessionStatus> {
        self.active.as_ref().map(ActiveSession::status)
    }

    /// The identifier of the current session, if there is one.
    pub fn session_id(&self) -> Option<Identifier> {
        match self.active.as_ref()? {
            ActiveSession::Keygen(session) => Some(session.sid()),
            ActiveSession::Sign(session) => Some(session.sid()),
        }
    }

    pub fn keygen_output(&self) -> Option<&PartySecretKeyConfig> {
        match self.active.as_ref()? {
            ActiveSession::Keygen(session) => session.output(),
            ActiveSession::Sign(_) => None,
        }
    }

    pub fn signature_output(&self) -> Option<&SignatureOutput> {
        match self.active.as_ref()? {
            ActiveSession::Sign(session) => session.output(),
            ActiveSession::Keygen(_) => None,
        }
    }

    /// The JSON artifact of the completed session, for the caller to
    /// persist.
    pub fn output_blob(&self) -> Result<Option<Vec<u8>>> {
        if let Some(key) = self.keygen_output() {
            return key.to_json().map(Some);
        }
        if let Some(signature) = self.signature_output() {
            return signature.to_json().map(Some);
        }
        Ok(None)
    }

    /// Discards the current session, whatever its state. Stashed messages
    /// for other sessions are kept.
    pub fn reset(&mut self) {
        if let Some(sid) = self.session_id() {
            info!("Discarding session {sid}");
        }
        self.active = None;
    }

    fn check_idle(&self) -> Result<()> {
        if let Some(SessionStatus::Active { round }) = self.status() {
            error!("Session is still active in round {round}");
            return arg_err!("another session is still active");
        }
        Ok(())
    }

    fn check_known(&self, parties: &[PartyId]) -> Result<()> {
        if let Some(unknown) = parties
            .iter()
            .find(|id| self.roster.resolve_public_key(id).is_none())
        {
            error!("Node {unknown} is not in the roster");
            return arg_err!("party is not in the roster");
        }
        Ok(())
    }
}

// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The generic round driver.
//!
//! A [`Session`] owns the current [`Round`] of one protocol run and a buffer
//! of received messages per round. Messages are ingested through
//! [`Session::handle`]; whenever the current round has received everything it
//! waits for, the buffered messages are replayed into the round and the round
//! is processed. Processing one round may complete the next one (for example
//! when its messages were buffered early), so the driver keeps advancing
//! until it has to wait again.
//!
//! Consistency of broadcasts is checked by echo: every message tagged `r + 1`
//! carries the digests of the round-`r` broadcasts its sender accepted, and a
//! round is only replayed once all echoes agree with this party's own view.

use crate::{
    errors::{InternalError, Result},
    messages::{BroadcastEcho, Envelope},
    protocol::{DriverConfig, Identifier, PartyId, SessionConfig},
    round::{Outgoing, Round, Transition},
};
use rand::{CryptoRng, RngCore};
use std::{
    collections::{BTreeMap, BTreeSet},
    time::Instant,
};
use tracing::{error, info, instrument, trace, warn};

/// How far ahead of the current round a message may be tagged and still be
/// buffered.
const MAX_ROUNDS_AHEAD: u16 = 5;

/// The externally visible state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Waiting for the messages of `round`.
    Active { round: u16 },
    /// The protocol produced its output.
    Complete,
    /// The protocol stopped at `round`. A session never leaves this state.
    Aborted { round: u16, reason: InternalError },
}

/// The messages buffered for one round, keyed by sender, with the digest of
/// each payload.
#[derive(Default)]
struct RoundBuffer {
    broadcasts: BTreeMap<PartyId, (Envelope, String)>,
    direct: BTreeMap<PartyId, (Envelope, String)>,
}

/// One party's run of a protocol.
pub(crate) struct Session<R: Round> {
    config: SessionConfig,
    sid: Identifier,
    driver: DriverConfig,
    round: Option<R>,
    round_number: u16,
    round_started: Instant,
    buffers: BTreeMap<u16, RoundBuffer>,
    /// This party's view of each finished broadcast round.
    accepted_digests: BTreeMap<u16, BTreeMap<PartyId, String>>,
    status: SessionStatus,
    output: Option<R::Output>,
}

impl<R: Round> Session<R> {
    pub(crate) fn new(
        config: SessionConfig,
        sid: Identifier,
        driver: DriverConfig,
        first_round: R,
    ) -> Self {
        let round_number = first_round.number();
        Self {
            config,
            sid,
            driver,
            round: Some(first_round),
            round_number,
            round_started: Instant::now(),
            buffers: BTreeMap::new(),
            accepted_digests: BTreeMap::new(),
            status: SessionStatus::Active {
                round: round_number,
            },
            output: None,
        }
    }

    /// Runs the first round, which does not wait for anything.
    pub(crate) fn start<Rng: RngCore + CryptoRng>(&mut self, rng: &mut Rng) -> Result<Vec<Envelope>> {
        info!(
            "Starting {} session {} as {}",
            R::protocol().as_str(),
            self.sid,
            self.config.self_id()
        );
        let (outgoing, result) = self.advance(rng);
        self.release(outgoing, result)
    }

    pub(crate) fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub(crate) fn output(&self) -> Option<&R::Output> {
        self.output.as_ref()
    }

    pub(crate) fn sid(&self) -> Identifier {
        self.sid
    }

    /// Ingests one message and returns whatever the session sends in
    /// response. Messages that fail the routing checks are dropped.
    ///
    /// If a round aborts after earlier rounds of the same call already
    /// produced messages, those messages are returned and the abort only
    /// shows in [`Session::status`].
    #[instrument(skip_all, err(Debug))]
    pub(crate) fn handle<Rng: RngCore + CryptoRng>(
        &mut self,
        envelope: Envelope,
        rng: &mut Rng,
    ) -> Result<Vec<Envelope>> {
        if !self.accepts(&envelope) {
            return Ok(Vec::new());
        }
        if let Err(e) = self.buffer(envelope) {
            return self.settle(Err(e));
        }
        let (outgoing, result) = self.advance(rng);
        self.release(outgoing, result)
    }

    /// Aborts the session if the current round has been waiting longer than
    /// the round timeout.
    pub(crate) fn check_deadline(&mut self, now: Instant) -> Result<()> {
        let Some(round) = self.round.as_ref() else {
            return Ok(());
        };
        if now.saturating_duration_since(self.round_started) < self.driver.round_timeout {
            return Ok(());
        }
        let missing = self.missing(round);
        if missing.is_empty() {
            return Ok(());
        }
        error!(
            "Round {} of session {} timed out waiting for {:?}",
            self.round_number, self.sid, missing
        );
        let result = Err(InternalError::Timeout {
            round: self.round_number,
            culprits: missing,
        });
        self.settle(result)
    }

    /// Routing checks; a rejected message is logged and dropped.
    fn accepts(&self, envelope: &Envelope) -> bool {
        let from = envelope.from();
        let reason = if !matches!(self.status, SessionStatus::Active { .. }) {
            Some("the session is no longer active")
        } else if envelope.protocol_id() != R::protocol() {
            Some("it belongs to another protocol")
        } else if envelope.session_id() != self.sid {
            Some("it belongs to another session")
        } else if envelope.is_broadcast() == envelope.to().is_some() {
            Some("its broadcast flag disagrees with its recipient")
        } else if envelope.to().map_or(false, |to| to != self.config.self_id()) {
            Some("it is addressed to another party")
        } else if !self.config.contains(from) {
            Some("its sender is not a member of the session")
        } else if from == self.config.self_id() {
            Some("it claims to come from this party")
        } else if envelope.round_number() <= self.last_processed() {
            Some("its round was already processed")
        } else if envelope.round_number() > self.round_number.saturating_add(MAX_ROUNDS_AHEAD) {
            Some("its round is too far ahead")
        } else {
            None
        };
        match reason {
            Some(reason) => {
                warn!(
                    "Dropping round {} message from {from}: {reason}",
                    envelope.round_number()
                );
                false
            }
            None => true,
        }
    }

    /// The last round whose messages were consumed.
    fn last_processed(&self) -> u16 {
        self.round_number.saturating_sub(1)
    }

    /// Stores a message in its round's buffer. Identical redeliveries are
    /// ignored; a sender that delivers two different messages for one slot
    /// is blamed.
    fn buffer(&mut self, envelope: Envelope) -> Result<()> {
        let digest = envelope.payload.digest()?;
        let from = envelope.from().clone();
        let tag = envelope.round_number();
        let is_broadcast = envelope.is_broadcast();
        let buffer = self.buffers.entry(tag).or_default();
        let slot = if is_broadcast {
            &mut buffer.broadcasts
        } else {
            &mut buffer.direct
        };
        match slot.get(&from) {
            Some((_, existing)) if *existing == digest => {
                trace!("Ignoring a duplicate round {tag} message from {from}");
                Ok(())
            }
            Some(_) if is_broadcast => {
                error!("Party {from} sent two different round {tag} broadcasts");
                Err(InternalError::Equivocation {
                    round: tag,
                    culprits: vec![from],
                })
            }
            Some(_) => {
                error!("Party {from} sent two different round {tag} direct messages");
                Err(InternalError::ProtocolError(Some(from)))
            }
            None => {
                let _ = slot.insert(from, (envelope, digest));
                Ok(())
            }
        }
    }

    /// The parties whose messages `round` is still waiting for.
    fn missing(&self, round: &R) -> Vec<PartyId> {
        let buffer = self.buffers.get(&round.number());
        let has_broadcast =
            |id: &PartyId| buffer.map_or(false, |b| b.broadcasts.contains_key(id));
        let has_direct = |id: &PartyId| buffer.map_or(false, |b| b.direct.contains_key(id));
        self.config
            .party_ids()
            .iter()
            .filter(|id| {
                let needs_broadcast = round.expects_broadcast() && !has_broadcast(*id);
                let needs_direct =
                    round.expects_direct() && *id != self.config.self_id() && !has_direct(*id);
                needs_broadcast || needs_direct
            })
            .cloned()
            .collect()
    }

    fn received_all(&self, round: &R) -> bool {
        self.missing(round).is_empty()
    }

    /// Processes rounds for as long as their messages are complete. The
    /// messages of every round that finished are returned alongside the
    /// outcome of the last one.
    fn advance<Rng: RngCore + CryptoRng>(
        &mut self,
        rng: &mut Rng,
    ) -> (Vec<Envelope>, Result<()>) {
        let mut outgoing = Vec::new();
        while let Some(round) = self.round.take() {
            if !self.received_all(&round) {
                self.round = Some(round);
                break;
            }
            match self.run(round, rng) {
                Ok(envelopes) => outgoing.extend(envelopes),
                Err(e) => return (outgoing, Err(e)),
            }
        }
        (outgoing, Ok(()))
    }

    /// Replays the buffered messages into `round`, processes it and
    /// installs the next round.
    fn run<Rng: RngCore + CryptoRng>(&mut self, mut round: R, rng: &mut Rng) -> Result<Vec<Envelope>> {
        let number = round.number();
        let buffer = self.buffers.remove(&number).unwrap_or_default();
        self.check_echoes(number, &buffer)?;

        for (from, (envelope, _)) in &buffer.broadcasts {
            round.handle_broadcast(from, &envelope.payload)?;
        }
        for (from, (envelope, _)) in &buffer.direct {
            round.handle_direct(from, &envelope.payload)?;
        }
        if round.expects_broadcast() {
            let digests = buffer
                .broadcasts
                .iter()
                .map(|(id, (_, digest))| (id.clone(), digest.clone()))
                .collect();
            let _ = self.accepted_digests.insert(number, digests);
        }

        let (messages, next) = match round.process(rng)? {
            Transition::Next { round, messages } => (messages, Some(round)),
            Transition::Done { output, messages } => {
                info!(
                    "{} session {} complete",
                    R::protocol().as_str(),
                    self.sid
                );
                self.output = Some(output);
                self.status = SessionStatus::Complete;
                (messages, None)
            }
        };
        let envelopes = self.wrap(number + 1, messages)?;

        self.round_number = number + 1;
        self.round_started = Instant::now();
        if let Some(next) = next {
            info!("Session {} moved to round {}", self.sid, self.round_number);
            self.status = SessionStatus::Active {
                round: self.round_number,
            };
            self.round = Some(next);
        }
        Ok(envelopes)
    }

    /// Checks every echo carried by the messages of round `number` against
    /// this party's view of round `number - 1`.
    fn check_echoes(&self, number: u16, buffer: &RoundBuffer) -> Result<()> {
        let previous = number - 1;
        let Some(expected) = self.accepted_digests.get(&previous) else {
            return Ok(());
        };
        let envelopes = buffer
            .broadcasts
            .values()
            .chain(buffer.direct.values())
            .map(|(envelope, _)| envelope);
        for envelope in envelopes {
            let from = envelope.from();
            let Some(echo) = envelope.echo.as_ref() else {
                error!("Party {from} did not echo the round {previous} broadcasts");
                return Err(InternalError::ProtocolError(Some(from.clone())));
            };
            if echo.round == previous && echo.digests == *expected {
                continue;
            }
            let mut culprits: Vec<PartyId> = expected
                .keys()
                .chain(echo.digests.keys())
                .filter(|id| expected.get(*id) != echo.digests.get(*id))
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if echo.round != previous || culprits.is_empty() {
                culprits = vec![from.clone()];
            }
            error!(
                "Party {from} saw different round {previous} broadcasts; culprits {:?}",
                culprits
            );
            return Err(InternalError::Equivocation {
                round: previous,
                culprits,
            });
        }
        Ok(())
    }

    /// Turns a round's outgoing messages into envelopes tagged `tag`. Own
    /// broadcasts are also buffered locally, so every broadcast round sees
    /// one message per party.
    fn wrap(&mut self, tag: u16, messages: Vec<Outgoing>) -> Result<Vec<Envelope>> {
        let echo = self
            .accepted_digests
            .get(&(tag - 1))
            .map(|digests| BroadcastEcho {
                round: tag - 1,
                digests: digests.clone(),
            });
        let self_id = self.config.self_id().clone();
        let mut envelopes = Vec::with_capacity(messages.len());
        for message in messages {
            let (to, payload) = match message {
                Outgoing::Broadcast(payload) => (None, payload),
                Outgoing::Direct(to, payload) => (Some(to), payload),
            };
            let envelope = Envelope::new(
                &self_id,
                to.as_ref(),
                R::protocol(),
                tag,
                self.sid,
                echo.clone(),
                payload,
            );
            trace!(
                "Sending round {tag} {} to {}",
                envelope.payload.kind(),
                to.as_ref().map_or("everyone", PartyId::as_str)
            );
            if envelope.is_broadcast() {
                let digest = envelope.payload.digest()?;
                let _ = self
                    .buffers
                    .entry(tag)
                    .or_default()
                    .broadcasts
                    .insert(self_id.clone(), (envelope.clone(), digest));
            }
            envelopes.push(envelope);
        }
        Ok(envelopes)
    }

    /// Settles the outcome of [`Session::advance`]. Messages that finished
    /// rounds produced are handed out even when a later round aborted.
    fn release(&mut self, outgoing: Vec<Envelope>, result: Result<()>) -> Result<Vec<Envelope>> {
        match self.settle(result) {
            Err(e) if outgoing.is_empty() => Err(e),
            Err(_) => {
                warn!(
                    "Releasing {} messages produced before session {} aborted",
                    outgoing.len(),
                    self.sid
                );
                Ok(outgoing)
            }
            Ok(()) => Ok(outgoing),
        }
    }

    /// Moves the session to `Aborted` if `result` is an error.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!(
                "{} session {} aborted in round {}: {e}",
                R::protocol().as_str(),
                self.sid,
                self.round_number
            );
            self.round = None;
            self.status = SessionStatus::Aborted {
                round: self.round_number,
                reason: e.clone(),
            };
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        messages::Payload,
        protocol::ProtocolId,
        utils::{random_scalar, testing::init_testing, CurvePoint},
    };
    use rand::rngs::StdRng;
    use std::time::Duration;

    /// A three-round toy protocol: round 1 broadcasts a point, round 2
    /// collects everyone's point and broadcasts another, round 3 collects
    /// those and outputs their sum.
    enum Toy {
        Opening,
        Collecting { round: u16, points: Vec<CurvePoint> },
    }

    impl Round for Toy {
        type Output = CurvePoint;

        fn protocol() -> ProtocolId {
            ProtocolId::Sign
        }

        fn number(&self) -> u16 {
            match self {
                Toy::Opening => 1,
                Toy::Collecting { round, .. } => *round,
            }
        }

        fn expects_broadcast(&self) -> bool {
            !matches!(self, Toy::Opening)
        }

        fn expects_direct(&self) -> bool {
            false
        }

        fn handle_broadcast(&mut self, from: &PartyId, payload: &Payload) -> Result<()> {
            match (self, payload) {
                (Toy::Collecting { points, .. }, Payload::SignGamma { Gamma })
                    if !Gamma.is_identity() =>
                {
                    points.push(*Gamma);
                    Ok(())
                }
                _ => Err(InternalError::ProtocolError(Some(from.clone()))),
            }
        }

        fn handle_direct(&mut self, from: &PartyId, _: &Payload) -> Result<()> {
            Err(InternalError::ProtocolError(Some(from.clone())))
        }

        fn process<Rng: RngCore + CryptoRng>(self, rng: &mut Rng) -> Result<Transition<Self>> {
            let broadcast = Outgoing::Broadcast(Payload::SignGamma {
                Gamma: CurvePoint::base_mul(&random_scalar(rng)),
            });
            match self {
                Toy::Opening => Ok(Transition::Next {
                    round: Toy::Collecting {
                        round: 2,
                        points: vec![],
                    },
                    messages: vec![broadcast],
                }),
                Toy::Collecting { round: 2, .. } => Ok(Transition::Next {
                    round: Toy::Collecting {
                        round: 3,
                        points: vec![],
                    },
                    messages: vec![broadcast],
                }),
                Toy::Collecting { points, .. } => Ok(Transition::Done {
                    output: points.into_iter().sum(),
                    messages: vec![],
                }),
            }
        }
    }

    fn sessions(driver: &DriverConfig) -> Result<Vec<Session<Toy>>> {
        let ids: Vec<PartyId> = ["a", "b", "c"].iter().map(|s| PartyId::from(*s)).collect();
        ids.iter()
            .map(|id| {
                let config = SessionConfig::new(id.clone(), ids.clone(), 1)?;
                Ok(Session::new(config, Identifier::from(7), driver.clone(), Toy::Opening))
            })
            .collect()
    }

    /// Delivers `messages` and everything they trigger until the network is
    /// quiet.
    fn deliver(
        sessions: &mut [Session<Toy>],
        mut messages: Vec<Envelope>,
        rng: &mut StdRng,
    ) -> Result<()> {
        while let Some(message) = messages.pop() {
            for session in sessions.iter_mut() {
                let addressed = match message.to() {
                    Some(to) => to == session.config.self_id(),
                    None => message.from() != session.config.self_id(),
                };
                if addressed {
                    messages.extend(session.handle(message.clone(), rng)?);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn sessions_agree_on_output() -> Result<()> {
        let mut rng = init_testing();
        let mut sessions = sessions(&DriverConfig::default())?;
        let mut messages = Vec::new();
        for session in sessions.iter_mut() {
            messages.extend(session.start(&mut rng)?);
        }
        // Redeliver everything once to exercise deduplication.
        let duplicates = messages.clone();
        messages.extend(duplicates);
        deliver(&mut sessions, messages, &mut rng)?;

        let outputs: Vec<_> = sessions.iter().map(|s| s.output().copied()).collect();
        assert!(outputs[0].is_some());
        assert!(outputs.iter().all(|o| *o == outputs[0]));
        assert!(sessions.iter().all(|s| *s.status() == SessionStatus::Complete));
        Ok(())
    }

    #[test]
    fn foreign_and_stale_messages_are_dropped() -> Result<()> {
        let mut rng = init_testing();
        let mut sessions = sessions(&DriverConfig::default())?;
        let from_a = sessions[0].start(&mut rng)?;
        let _ = sessions[1].start(&mut rng)?;
        let mut message = from_a[0].clone();

        message.session_id = Identifier::from(8);
        assert!(sessions[1].handle(message.clone(), &mut rng)?.is_empty());
        message.session_id = Identifier::from(7);
        message.from = PartyId::from("mallory");
        assert!(sessions[1].handle(message.clone(), &mut rng)?.is_empty());
        message.from = PartyId::from("b");
        assert!(sessions[1].handle(message.clone(), &mut rng)?.is_empty());
        message.from = PartyId::from("a");
        message.round_number = 1;
        assert!(sessions[1].handle(message, &mut rng)?.is_empty());

        assert!(sessions[1].buffers.get(&2).map_or(true, |b| !b
            .broadcasts
            .contains_key(&PartyId::from("a"))));
        assert_eq!(*sessions[1].status(), SessionStatus::Active { round: 2 });
        Ok(())
    }

    #[test]
    fn conflicting_broadcasts_are_equivocation() -> Result<()> {
        let mut rng = init_testing();
        let mut sessions = sessions(&DriverConfig::default())?;
        let from_a = sessions[0].start(&mut rng)?;
        let _ = sessions[1].start(&mut rng)?;
        let original = from_a[0].clone();
        let mut conflicting = original.clone();
        conflicting.payload = Payload::SignGamma {
            Gamma: CurvePoint::base_mul(&random_scalar(&mut rng)),
        };

        assert!(sessions[1].handle(original, &mut rng)?.is_empty());
        let err = sessions[1].handle(conflicting, &mut rng).unwrap_err();
        assert_eq!(
            err,
            InternalError::Equivocation {
                round: 2,
                culprits: vec![PartyId::from("a")]
            }
        );
        assert!(matches!(
            sessions[1].status(),
            SessionStatus::Aborted { round: 2, .. }
        ));
        Ok(())
    }

    #[test]
    fn mismatched_echo_blames_the_equivocator() -> Result<()> {
        let mut rng = init_testing();
        let mut sessions = sessions(&DriverConfig::default())?;
        let mut round_two = Vec::new();
        for session in sessions.iter_mut() {
            round_two.extend(session.start(&mut rng)?);
        }
        // c tells b something different from what it tells a.
        let to_b = Payload::SignGamma {
            Gamma: CurvePoint::base_mul(&random_scalar(&mut rng)),
        };
        let mut round_three = Vec::new();
        for message in round_two {
            for (index, session) in sessions.iter_mut().enumerate() {
                if message.from() == session.config.self_id() {
                    continue;
                }
                let mut message = message.clone();
                if message.from().as_str() == "c" && index == 1 {
                    message.payload = to_b.clone();
                }
                round_three.extend(session.handle(message, &mut rng)?);
            }
        }

        // b's round-three broadcast echoes its view, which disagrees with a's
        // on c only.
        for message in round_three.into_iter().filter(|m| m.from().as_str() != "a") {
            let _ = sessions[0].handle(message, &mut rng);
        }
        assert_eq!(
            *sessions[0].status(),
            SessionStatus::Aborted {
                round: 3,
                reason: InternalError::Equivocation {
                    round: 2,
                    culprits: vec![PartyId::from("c")],
                },
            }
        );
        Ok(())
    }

    #[test]
    fn messages_of_finished_rounds_survive_a_later_abort() -> Result<()> {
        let mut rng = init_testing();
        let mut sessions = sessions(&DriverConfig::default())?;
        let mut round_two = Vec::new();
        for session in sessions.iter_mut() {
            round_two.extend(session.start(&mut rng)?);
        }
        // b and c finish round two; a has not seen c's round-two broadcast.
        let mut held_back = None;
        let mut round_three = Vec::new();
        for message in round_two {
            for (index, session) in sessions.iter_mut().enumerate() {
                if message.from() == session.config.self_id() {
                    continue;
                }
                if index == 0 && message.from().as_str() == "c" {
                    held_back = Some(message.clone());
                    continue;
                }
                round_three.extend(session.handle(message.clone(), &mut rng)?);
            }
        }
        let held_back = held_back.ok_or(InternalError::InternalInvariantFailed)?;

        // c's round-three broadcast is invalid; a buffers it along with b's.
        for mut message in round_three.into_iter().filter(|m| m.round_number() == 3) {
            if message.from().as_str() == "c" {
                message.payload = Payload::SignGamma {
                    Gamma: CurvePoint::IDENTITY,
                };
            }
            if message.from().as_str() != "a" {
                assert!(sessions[0].handle(message, &mut rng)?.is_empty());
            }
        }

        // The held-back message completes round two and then round three,
        // which aborts. a's round-three broadcast is still handed out.
        let released = sessions[0].handle(held_back, &mut rng)?;
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].round_number(), 3);
        assert!(released[0].is_broadcast());
        assert_eq!(
            *sessions[0].status(),
            SessionStatus::Aborted {
                round: 3,
                reason: InternalError::ProtocolError(Some(PartyId::from("c"))),
            }
        );
        Ok(())
    }

    #[test]
    fn deadline_blames_silent_parties() -> Result<()> {
        let mut rng = init_testing();
        let driver = DriverConfig {
            round_timeout: Duration::from_secs(60),
            ..Default::default()
        };
        let mut sessions = sessions(&driver)?;
        let _ = sessions[0].start(&mut rng)?;

        sessions[0].check_deadline(Instant::now())?;
        assert_eq!(*sessions[0].status(), SessionStatus::Active { round: 2 });

        let later = Instant::now() + Duration::from_secs(61);
        let err = sessions[0].check_deadline(later).unwrap_err();
        assert_eq!(
            err,
            InternalError::Timeout {
                round: 2,
                culprits: vec![PartyId::from("b"), PartyId::from("c")],
            }
        );
        assert!(err.culprits().contains(&PartyId::from("b")));
        Ok(())
    }
}

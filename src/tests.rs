// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! End-to-end runs of key generation and signing over an in-memory network
//! that delivers messages in random order, sometimes twice.

use crate::{
    errors::{InternalError, Result},
    keygen::PartySecretKeyConfig,
    messages::{Envelope, Payload},
    paillier::{testing::increment, EncryptionKey},
    protocol::{DriverConfig, Identifier, PartyId},
    roster::StaticRoster,
    session::SessionStatus,
    sign::SignatureOutput,
    utils::{testing::init_testing, CurvePoint},
    SessionManager,
};
use k256::{elliptic_curve::scalar::IsHigh, Scalar};
use lazy_static::lazy_static;
use rand::{rngs::StdRng, Rng};
use sha2::{Digest, Sha256};
use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

type Tamper = Box<dyn FnMut(&PartyId, &mut Envelope)>;

struct Network {
    managers: BTreeMap<PartyId, SessionManager<StaticRoster>>,
    inboxes: BTreeMap<PartyId, Vec<Envelope>>,
    /// Applied to every message on its way to a recipient.
    tamper: Option<Tamper>,
}

fn ids(names: &[&str]) -> Vec<PartyId> {
    names.iter().map(|name| PartyId::from(*name)).collect()
}

fn roster(parties: &[PartyId]) -> StaticRoster {
    StaticRoster::new(
        parties
            .iter()
            .map(|id| (id.clone(), Sha256::digest(id.as_str().as_bytes()).to_vec())),
    )
}

impl Network {
    /// A network of `members`, each of which knows every node in `known`.
    fn new(members: &[PartyId], known: &[PartyId]) -> Result<Self> {
        let mut managers = BTreeMap::new();
        let mut inboxes = BTreeMap::new();
        for id in members {
            let manager = SessionManager::new(roster(known), id.clone(), DriverConfig::default())?;
            let _ = managers.insert(id.clone(), manager);
            let _ = inboxes.insert(id.clone(), Vec::new());
        }
        Ok(Self {
            managers,
            inboxes,
            tamper: None,
        })
    }

    fn manager(&mut self, id: &PartyId) -> Result<&mut SessionManager<StaticRoster>> {
        self.managers
            .get_mut(id)
            .ok_or(InternalError::InternalInvariantFailed)
    }

    fn status(&self, id: &PartyId) -> Option<SessionStatus> {
        self.managers.get(id)?.status().cloned()
    }

    /// Puts one message into `to`'s inbox.
    fn push(&mut self, to: &PartyId, mut message: Envelope) {
        if let Some(tamper) = self.tamper.as_mut() {
            tamper(to, &mut message);
        }
        if let Some(inbox) = self.inboxes.get_mut(to) {
            inbox.push(message);
        }
    }

    /// Delivers every message to its recipients, duplicating some of them.
    fn route(&mut self, messages: Vec<Envelope>, rng: &mut StdRng) {
        for message in messages {
            let recipients: Vec<PartyId> = match message.to() {
                Some(to) => vec![to.clone()],
                None => self
                    .managers
                    .keys()
                    .filter(|id| *id != message.from())
                    .cloned()
                    .collect(),
            };
            for to in recipients {
                if rng.gen_bool(0.1) {
                    self.push(&to, message.clone());
                }
                self.push(&to, message.clone());
            }
        }
    }

    /// Hands one random pending message to its recipient. Returns `false`
    /// once every inbox is empty.
    fn step(&mut self, rng: &mut StdRng) -> Result<bool> {
        let pending: Vec<PartyId> = self
            .inboxes
            .iter()
            .filter(|(_, inbox)| !inbox.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        if pending.is_empty() {
            return Ok(false);
        }
        let id = &pending[rng.gen_range(0..pending.len())];
        let inbox = self
            .inboxes
            .get_mut(id)
            .ok_or(InternalError::InternalInvariantFailed)?;
        let message = inbox.remove(rng.gen_range(0..inbox.len()));
        let result = self.manager(id)?.handle(message, rng);
        // Aborts show up in the session status.
        if let Ok(outgoing) = result {
            self.route(outgoing, rng);
        }
        Ok(true)
    }

    fn run(&mut self, rng: &mut StdRng) -> Result<()> {
        while self.step(rng)? {}
        Ok(())
    }
}

/// Runs key generation among `names` and returns every party's output.
fn run_keygen(names: &[&str], threshold: usize, rng: &mut StdRng) -> Result<Vec<PartySecretKeyConfig>> {
    let parties = ids(names);
    let mut network = Network::new(&parties, &parties)?;
    let sid = Identifier::random(rng);
    for id in &parties {
        let messages = network.manager(id)?.init_keygen(sid, threshold, vec![], rng)?;
        network.route(messages, rng);
    }
    network.run(rng)?;

    parties
        .iter()
        .map(|id| {
            assert_eq!(network.status(id), Some(SessionStatus::Complete));
            network
                .manager(id)?
                .keygen_output()
                .cloned()
                .ok_or(InternalError::InternalInvariantFailed)
        })
        .collect()
}

/// Starts signing session `sid` over `signers` at the nodes `starting`.
fn start_signing(
    network: &mut Network,
    sid: Identifier,
    starting: &[PartyId],
    signers: &[PartyId],
    digest: [u8; 32],
    rng: &mut StdRng,
) -> Result<()> {
    for id in starting {
        let key = KEYS
            .iter()
            .find(|key| key.party_id() == id)
            .ok_or(InternalError::InternalInvariantFailed)?
            .clone();
        let messages = network
            .manager(id)?
            .init_signing(sid, key, signers.to_vec(), digest, rng)?;
        network.route(messages, rng);
    }
    Ok(())
}

/// Signs `digest` with the keys of `signers` and returns every signer's
/// output.
fn run_signing(
    keys: &[PartySecretKeyConfig],
    signers: &[PartyId],
    digest: [u8; 32],
    rng: &mut StdRng,
) -> Result<Vec<SignatureOutput>> {
    let known = keys[0].parties();
    let mut network = Network::new(signers, &known)?;
    let sid = Identifier::random(rng);
    start_signing(&mut network, sid, signers, signers, digest, rng)?;
    network.run(rng)?;

    signers
        .iter()
        .map(|id| {
            assert_eq!(network.status(id), Some(SessionStatus::Complete));
            let manager = network.manager(id)?;
            let signature = *manager
                .signature_output()
                .ok_or(InternalError::InternalInvariantFailed)?;
            assert_eq!(manager.output_blob()?, Some(signature.to_json()?));
            Ok(signature)
        })
        .collect()
}

lazy_static! {
    /// Key generation is slow, so the honest runs share one result.
    static ref KEYS: Vec<PartySecretKeyConfig> = {
        let mut rng = init_testing();
        run_keygen(&["alice", "bob", "carol"], 1, &mut rng).expect("keygen failed")
    };
}

fn hello_digest() -> [u8; 32] {
    Sha256::digest(b"hello").into()
}

#[test]
fn keygen_outputs_agree() -> Result<()> {
    let keys = &*KEYS;
    let digest = keys[0].public_digest()?;
    assert!(keys.iter().all(|key| key.public_digest().ok() == Some(digest)));
    assert!(keys.iter().all(|key| key.rid() == keys[0].rid()));
    assert!(keys.iter().all(|key| key.chain_key() == keys[0].chain_key()));

    // Every quorum of two reconstructs the same key.
    let public_key = keys[0].public_key()?;
    let parties = keys[0].parties();
    for i in 0..parties.len() {
        for j in i + 1..parties.len() {
            let quorum = [parties[i].clone(), parties[j].clone()];
            for key in keys {
                assert_eq!(key.public_key_from(&quorum)?, public_key);
            }
        }
    }

    // Every party holds the secret behind its own public share.
    for key in keys {
        let own = key
            .public_data(key.party_id())
            .ok_or(InternalError::InternalInvariantFailed)?;
        assert_eq!(*own.ecdsa_point(), CurvePoint::base_mul(key.ecdsa_share()));
        let restored = PartySecretKeyConfig::from_json(&key.to_json()?)?;
        assert_eq!(restored.public_digest()?, digest);
    }
    Ok(())
}

#[test]
fn all_parties_sign_hello() -> Result<()> {
    let mut rng = init_testing();
    let keys = &*KEYS;
    let digest = hello_digest();
    let signatures = run_signing(keys, &keys[0].parties(), digest, &mut rng)?;

    let public_key = keys[0].public_key()?;
    for signature in &signatures {
        assert_eq!(signature.to_json()?, signatures[0].to_json()?);
        signature.verify(&public_key, &digest)?;
        assert!(!bool::from(signature.s().is_high()));
    }
    Ok(())
}

#[test]
fn threshold_quorum_signs() -> Result<()> {
    let mut rng = init_testing();
    let keys = &*KEYS;
    let digest: [u8; 32] = Sha256::digest(b"a quorum of two").into();
    let signers = ids(&["alice", "carol"]);
    let signatures = run_signing(keys, &signers, digest, &mut rng)?;

    let public_key = keys[0].public_key()?;
    assert_eq!(signatures[0], signatures[1]);
    signatures[0].verify(&public_key, &digest)?;
    assert!(signatures[0].verify(&public_key, &hello_digest()).is_err());
    Ok(())
}

#[test]
fn signing_rejects_quorums_below_threshold() -> Result<()> {
    let mut rng = init_testing();
    let keys = &*KEYS;
    let known = keys[0].parties();
    let mut network = Network::new(&ids(&["alice"]), &known)?;
    let result = network.manager(&PartyId::from("alice"))?.init_signing(
        Identifier::random(&mut rng),
        keys[0].clone(),
        ids(&["alice"]),
        hello_digest(),
        &mut rng,
    );
    assert!(matches!(result, Err(InternalError::InvalidArgument(_))));
    Ok(())
}

#[test]
fn corrupted_decommitment_is_blamed() -> Result<()> {
    let mut rng = init_testing();
    let parties = ids(&["alice", "bob", "eve"]);
    let eve = PartyId::from("eve");
    let mut network = Network::new(&parties, &parties)?;
    let culprit = eve.clone();
    network.tamper = Some(Box::new(move |_: &PartyId, message: &mut Envelope| {
        if message.from() == &culprit {
            if let Payload::KeygenDecommit { values, .. } = &mut message.payload {
                values.rid[0] ^= 1;
            }
        }
    }));

    let sid = Identifier::random(&mut rng);
    for id in &parties {
        let messages = network.manager(id)?.init_keygen(sid, 1, vec![], &mut rng)?;
        network.route(messages, &mut rng);
    }
    network.run(&mut rng)?;

    for id in ids(&["alice", "bob"]) {
        assert_eq!(
            network.status(&id),
            Some(SessionStatus::Aborted {
                round: 3,
                reason: InternalError::ProtocolError(Some(eve.clone())),
            })
        );
        assert!(network.manager(&id)?.output_blob()?.is_none());
    }
    Ok(())
}

#[test]
fn equivocated_commitment_is_detected() -> Result<()> {
    let mut rng = init_testing();
    let parties = ids(&["alice", "bob", "eve"]);
    let (alice, bob, eve) = (parties[0].clone(), parties[1].clone(), parties[2].clone());
    let mut network = Network::new(&parties, &parties)?;
    let sid = Identifier::random(&mut rng);

    let mut initial = BTreeMap::new();
    for id in &parties {
        let messages = network.manager(id)?.init_keygen(sid, 1, vec![], &mut rng)?;
        let _ = initial.insert(id.clone(), messages);
    }
    let alice_commit = initial[&alice][0].payload.clone();
    let eve_commit = initial
        .remove(&eve)
        .and_then(|messages| messages.into_iter().next())
        .ok_or(InternalError::InternalInvariantFailed)?;

    // Eve shows bob a different commitment than the one alice sees.
    let mut to_bob = eve_commit.clone();
    to_bob.payload = alice_commit;
    network.push(&alice, eve_commit);
    network.push(&bob, to_bob);
    for (_, messages) in initial {
        network.route(messages, &mut rng);
    }
    network.run(&mut rng)?;

    for id in [&alice, &bob] {
        let Some(SessionStatus::Aborted { round, reason }) = network.status(id) else {
            panic!("{id} did not abort");
        };
        assert_eq!(round, 3);
        assert_eq!(
            reason,
            InternalError::Equivocation {
                round: 2,
                culprits: vec![eve.clone()],
            }
        );
    }
    Ok(())
}

#[test]
fn silent_parties_time_out() -> Result<()> {
    let mut rng = init_testing();
    let parties = ids(&["alice", "bob", "eve"]);
    let alice = parties[0].clone();
    let mut network = Network::new(&parties, &parties)?;
    let _ = network
        .manager(&alice)?
        .init_keygen(Identifier::random(&mut rng), 1, vec![], &mut rng)?;

    let manager = network.manager(&alice)?;
    manager.poll_timeouts(Instant::now())?;
    assert_eq!(manager.status(), Some(&SessionStatus::Active { round: 2 }));

    let err = manager
        .poll_timeouts(Instant::now() + Duration::from_secs(61))
        .unwrap_err();
    let expected = InternalError::Timeout {
        round: 2,
        culprits: ids(&["bob", "eve"]),
    };
    assert_eq!(err, expected);
    assert_eq!(
        manager.status(),
        Some(&SessionStatus::Aborted {
            round: 2,
            reason: expected,
        })
    );
    Ok(())
}

/// Corrupts every payload `culprit` sends, on its way to each recipient.
fn corrupt_from(culprit: &str, mut corrupt: impl FnMut(&mut Payload) + 'static) -> Tamper {
    let culprit = PartyId::from(culprit);
    Box::new(move |_: &PartyId, message: &mut Envelope| {
        if message.from() == &culprit {
            corrupt(&mut message.payload);
        }
    })
}

/// Signs "hello" among alice, bob and carol while `tamper` rewrites
/// messages in transit.
fn run_tampered_signing(tamper: Tamper, rng: &mut StdRng) -> Result<Network> {
    let signers = KEYS[0].parties();
    let mut network = Network::new(&signers, &signers)?;
    network.tamper = Some(tamper);
    let sid = Identifier::random(rng);
    start_signing(&mut network, sid, &signers, &signers, hello_digest(), rng)?;
    network.run(rng)?;
    Ok(network)
}

fn assert_aborted(network: &Network, parties: &[&str], round: u16, reason: InternalError) {
    for id in ids(parties) {
        assert_eq!(
            network.status(&id),
            Some(SessionStatus::Aborted {
                round,
                reason: reason.clone(),
            }),
            "unexpected status of {id}"
        );
    }
}

#[test]
fn corrupted_share_is_blamed_by_every_recipient() -> Result<()> {
    let mut rng = init_testing();
    let parties = ids(&["alice", "bob", "eve"]);
    let eve = PartyId::from("eve");
    let mut network = Network::new(&parties, &parties)?;

    // Eve's shares decrypt to one more than her Feldman commitment allows.
    let mut keys: BTreeMap<PartyId, EncryptionKey> = BTreeMap::new();
    let culprit = eve.clone();
    network.tamper = Some(Box::new(move |to: &PartyId, message: &mut Envelope| {
        let from = message.from().clone();
        match &mut message.payload {
            Payload::KeygenDecommit { values, .. } => {
                let _ = keys.insert(from, values.paillier.clone());
            }
            Payload::KeygenShare { ciphertext, .. } if from == culprit => {
                if let Some(key) = keys.get(to) {
                    *ciphertext = increment(key, ciphertext);
                }
            }
            _ => {}
        }
    }));

    let sid = Identifier::random(&mut rng);
    for id in &parties {
        let messages = network.manager(id)?.init_keygen(sid, 1, vec![], &mut rng)?;
        network.route(messages, &mut rng);
    }
    network.run(&mut rng)?;

    let expected = InternalError::ProtocolError(Some(eve));
    assert_aborted(&network, &["alice", "bob"], 4, expected.clone());

    // Nobody is left waiting on an honest party.
    let later = Instant::now() + Duration::from_secs(61);
    for id in ids(&["alice", "bob"]) {
        network.manager(&id)?.poll_timeouts(later)?;
    }
    assert_aborted(&network, &["alice", "bob"], 4, expected);
    Ok(())
}

#[test]
fn small_peer_moduli_are_rejected() -> Result<()> {
    let mut rng = init_testing();
    let parties = ids(&["alice", "bob", "eve"]);
    let alice = parties[0].clone();
    let mut network = Network::new(&parties, &parties)?;
    let driver = DriverConfig {
        prime_bits: 1040,
        ..Default::default()
    };
    let _ = network.managers.insert(
        alice.clone(),
        SessionManager::new(roster(&parties), alice.clone(), driver)?,
    );

    let sid = Identifier::random(&mut rng);
    for id in &parties {
        let messages = network.manager(id)?.init_keygen(sid, 1, vec![], &mut rng)?;
        network.route(messages, &mut rng);
    }
    network.run(&mut rng)?;

    assert_aborted(
        &network,
        &["alice"],
        3,
        InternalError::ProtocolError(Some(PartyId::from("bob"))),
    );
    Ok(())
}

#[test]
fn late_starter_receives_early_messages() -> Result<()> {
    let mut rng = init_testing();
    let signers = KEYS[0].parties();
    let alice = PartyId::from("alice");
    let mut network = Network::new(&signers, &signers)?;
    let sid = Identifier::random(&mut rng);

    // Bob and carol start first; their round-two messages reach alice
    // before she has a session.
    let early: Vec<PartyId> = signers.iter().filter(|id| **id != alice).cloned().collect();
    start_signing(&mut network, sid, &early, &signers, hello_digest(), &mut rng)?;
    network.run(&mut rng)?;
    assert_eq!(network.status(&alice), None);
    for id in &early {
        assert_eq!(network.status(id), Some(SessionStatus::Active { round: 2 }));
    }

    start_signing(&mut network, sid, &[alice], &signers, hello_digest(), &mut rng)?;
    network.run(&mut rng)?;
    let public_key = KEYS[0].public_key()?;
    for id in &signers {
        assert_eq!(network.status(id), Some(SessionStatus::Complete));
        let signature = network
            .manager(id)?
            .signature_output()
            .copied()
            .ok_or(InternalError::InternalInvariantFailed)?;
        signature.verify(&public_key, &hello_digest())?;
    }
    Ok(())
}

#[test]
fn forged_mta_proof_is_blamed() -> Result<()> {
    let mut rng = init_testing();
    let network = run_tampered_signing(
        corrupt_from("carol", |payload| {
            if let Payload::SignMta { psi, psi_hat, .. } = payload {
                std::mem::swap(psi, psi_hat);
            }
        }),
        &mut rng,
    )?;
    assert_aborted(
        &network,
        &["alice", "bob"],
        3,
        InternalError::ProtocolError(Some(PartyId::from("carol"))),
    );
    Ok(())
}

#[test]
fn degenerate_delta_shares_are_blamed() -> Result<()> {
    let mut rng = init_testing();
    let carol = InternalError::ProtocolError(Some(PartyId::from("carol")));

    let network = run_tampered_signing(
        corrupt_from("carol", |payload| {
            if let Payload::SignDelta { delta, .. } = payload {
                *delta = Scalar::ZERO;
            }
        }),
        &mut rng,
    )?;
    assert_aborted(&network, &["alice", "bob"], 4, carol.clone());

    let network = run_tampered_signing(
        corrupt_from("carol", |payload| {
            if let Payload::SignDelta { Delta, .. } = payload {
                *Delta = CurvePoint::IDENTITY;
            }
        }),
        &mut rng,
    )?;
    assert_aborted(&network, &["alice", "bob"], 4, carol);
    Ok(())
}

#[test]
fn inconsistent_delta_shares_abort_signing() -> Result<()> {
    let mut rng = init_testing();
    let network = run_tampered_signing(
        corrupt_from("carol", |payload| {
            if let Payload::SignDelta { delta, .. } = payload {
                *delta += Scalar::ONE;
            }
        }),
        &mut rng,
    )?;
    assert_aborted(&network, &["alice", "bob"], 4, InternalError::ProtocolError(None));
    Ok(())
}

#[test]
fn corrupted_partial_signature_fails_verification() -> Result<()> {
    let mut rng = init_testing();
    let network = run_tampered_signing(
        corrupt_from("carol", |payload| {
            if let Payload::SignSigma { sigma } = payload {
                *sigma += Scalar::ONE;
            }
        }),
        &mut rng,
    )?;
    assert_aborted(&network, &["alice", "bob"], 5, InternalError::ProtocolError(None));
    // Carol saw the untouched partial signatures.
    assert_eq!(
        network.status(&PartyId::from("carol")),
        Some(SessionStatus::Complete)
    );
    Ok(())
}

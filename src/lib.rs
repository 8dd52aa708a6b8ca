// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Threshold ECDSA key generation and signing, after CMP
//!
//! In a threshold signature scheme, any `t + 1` of `n` key holders can
//! jointly produce a signature, while no coalition of `t` or fewer holders
//! learns anything about the signing key. Here the signatures are ordinary
//! ECDSA signatures over [secp256k1](https://en.bitcoin.it/wiki/Secp256k1),
//! indistinguishable from those of a single signer.
//!
//! The protocols follow [CGGMP'21](https://eprint.iacr.org/2021/060):
//! key generation runs in five rounds and produces, for every party, a
//! [`PartySecretKeyConfig`] holding a Shamir share of the key together with
//! a Paillier key and ring-Pedersen parameters; signing runs in five rounds
//! over any quorum of `t + 1` key holders and produces a
//! [`SignatureOutput`].
//!
//! This crate does not move messages between parties. A node owns a
//! [`SessionManager`], feeds it every [`Envelope`] the network delivers
//! and sends out the envelopes it returns. The manager checks routing,
//! buffers messages per round, cross-checks broadcasts between parties and
//! advances the protocol whenever a round is complete.

#![allow(non_snake_case)]
#![warn(missing_docs)]
#![cfg_attr(feature = "flame_it", feature(proc_macro_hygiene))]
#[cfg(feature = "flame_it")]
extern crate flame;
#[cfg(feature = "flame_it")]
#[macro_use]
extern crate flamer;

#[macro_use]
pub mod errors;

mod keygen;
mod manager;
mod messages;
mod paillier;
mod parameters;
mod protocol;
mod ring_pedersen;
mod round;
mod roster;
mod serialization;
mod session;
mod sign;
mod transcript;
mod utils;
mod vss;
mod zkp;

pub use keygen::{PartyPublicKeyConfig, PartySecretKeyConfig};
pub use manager::SessionManager;
pub use messages::Envelope;
pub use protocol::{DriverConfig, Identifier, PartyId, ProtocolId, SessionConfig};
pub use roster::{Roster, StaticRoster};
pub use session::SessionStatus;
pub use sign::SignatureOutput;
pub use utils::CurvePoint;

#[cfg(test)]
mod tests;

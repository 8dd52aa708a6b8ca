// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! A list of error types which are produced during an execution of the protocol
use core::fmt::Debug;
use thiserror::Error;

use crate::protocol::PartyId;

/// The default Result type used in this crate
pub type Result<T> = std::result::Result<T, InternalError>;

/// Represents an error in the manipulation of internal cryptographic data
#[derive(Clone, Eq, PartialEq, Error, Debug)]
#[allow(missing_docs)]
pub enum InternalError {
    #[error("Serialization Error")]
    Serialization,
    #[error("Could not successfully generate proof")]
    CouldNotGenerateProof,
    #[error("Failed to verify proof: `{0}`")]
    FailedToVerifyProof(String),
    #[error("Could not find square roots modulo n")]
    NoSquareRoots,
    #[error("Elements are not coprime")]
    NotCoprime,
    #[error(
        "Could not find uniqueness for fourth roots combination in Paillier-Blum modulus proof"
    )]
    NonUniqueFourthRootsCombination,
    #[error("Could not decrypt a Paillier ciphertext")]
    PaillierDecryptionFailed,
    #[error("Could not invert a BigNumber")]
    CouldNotInvertBigNumber,
    #[error("Represents some code assumption that was checked at runtime but failed to be true")]
    InternalInvariantFailed,
    #[error("Failed to convert BigNumber to k256::Scalar")]
    CouldNotConvertToScalar,
    #[error("Could not invert a Scalar")]
    CouldNotInvertScalar,
    #[error("Reached the maximum allowed number of retries")]
    RetryFailed,
    #[error("Encountered a message payload which was not expected in this context")]
    MisroutedMessage,
    #[error("Could not construct signature from provided scalars")]
    SignatureInstantiationError,
    #[error("Function call contained invalid arguments: `{0}`")]
    InvalidArgument(String),
    /// A peer sent something that failed validation. `None` means the
    /// failure was detected on aggregated values and cannot be attributed.
    #[error("Protocol validation failed; culprit: {0:?}")]
    ProtocolError(Option<PartyId>),
    #[error("Parties disagree on the broadcasts of round {round}; culprits: {culprits:?}")]
    Equivocation { round: u16, culprits: Vec<PartyId> },
    #[error("Round {round} timed out waiting for {culprits:?}")]
    Timeout { round: u16, culprits: Vec<PartyId> },
    #[error("There is no active session to deliver this message to")]
    SessionNotActive,
}

impl InternalError {
    /// The parties blamed by this error, if any.
    pub fn culprits(&self) -> Vec<PartyId> {
        match self {
            InternalError::ProtocolError(Some(culprit)) => vec![culprit.clone()],
            InternalError::Equivocation { culprits, .. } | InternalError::Timeout { culprits, .. } => {
                culprits.clone()
            }
            _ => Vec::new(),
        }
    }
}

macro_rules! serialize {
    ($x:expr) => {{
        bincode::serialize($x).or(Err(crate::errors::InternalError::Serialization))
    }};
}

macro_rules! deserialize {
    ($x:expr) => {{
        bincode::deserialize($x).or(Err(crate::errors::InternalError::Serialization))
    }};
}

macro_rules! verify_err {
    ($x:expr) => {{
        Err(crate::errors::InternalError::FailedToVerifyProof(
            String::from($x),
        ))
    }};
}

macro_rules! arg_err {
    ($x:expr) => {{
        Err(crate::errors::InternalError::InvalidArgument(String::from(
            $x,
        )))
    }};
}

/// Logs a validation failure and blames `sender` for it.
pub(crate) fn blame(sender: &PartyId) -> impl FnOnce(InternalError) -> InternalError + '_ {
    move |e| {
        tracing::error!("Message from {} failed validation: {}", sender, e);
        InternalError::ProtocolError(Some(sender.clone()))
    }
}

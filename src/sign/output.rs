// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    errors::{InternalError, Result},
    serialization::scalar_hex,
    utils::CurvePoint,
};
use k256::{
    ecdsa::{signature::hazmat::PrehashVerifier, Signature, VerifyingKey},
    Scalar,
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// A signature produced by a signing session.
///
/// `R` is the nonce point; the ECDSA `r` is its x-coordinate reduced modulo
/// the group order. `s` is always low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureOutput {
    R: CurvePoint,
    #[serde(rename = "Shex", with = "scalar_hex")]
    s: Scalar,
}

impl SignatureOutput {
    pub(crate) fn new(R: CurvePoint, s: Scalar) -> Self {
        Self { R, s }
    }

    /// The nonce point `R`.
    pub fn nonce_point(&self) -> &CurvePoint {
        &self.R
    }

    /// The ECDSA `r` component.
    pub fn r(&self) -> Result<Scalar> {
        self.R.x_projection()
    }

    /// The ECDSA `s` component.
    pub fn s(&self) -> Scalar {
        self.s
    }

    /// The signature as a `k256` ECDSA signature.
    pub fn to_ecdsa(&self) -> Result<Signature> {
        Signature::from_scalars(self.r()?.to_bytes(), self.s.to_bytes()).map_err(|e| {
            error!("Signature scalars are invalid: {e}");
            InternalError::SignatureInstantiationError
        })
    }

    /// Standard ECDSA verification of the signature on a pre-hashed
    /// `digest` under `public_key`.
    pub fn verify(&self, public_key: &CurvePoint, digest: &[u8; 32]) -> Result<()> {
        let verifying_key = VerifyingKey::from_affine(public_key.0.to_affine()).map_err(|e| {
            error!("Public key is not a valid verifying key: {e}");
            InternalError::SignatureInstantiationError
        })?;
        verifying_key
            .verify_prehash(digest, &self.to_ecdsa()?)
            .map_err(|e| {
                error!("ECDSA verification failed: {e}");
                InternalError::FailedToVerifyProof(String::from("ECDSA verification failed"))
            })
    }

    /// The JSON artifact, `{R: {xHex, yHex}, Shex}`.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            error!("Failed to encode signature: {e}");
            InternalError::Serialization
        })
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            error!("Failed to decode signature: {e}");
            InternalError::Serialization
        })
    }
}

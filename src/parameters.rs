// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Security parameter definitions.
//!
//! The values target 80-bit statistical security and 112-bit computational
//! security; a 2048-bit Paillier modulus does not provide more than the
//! latter. They are taken from Figure 1 and Table 2 of
//! [CGGMP'21](https://eprint.iacr.org/2021/060.pdf).

/// Security parameter κ; the bit size of a secp256k1 scalar.
const SECURITY_PARAM: usize = 256;

/// Range of the plaintexts proven in [Π-enc](crate::zkp::pienc),
/// [Π-log*](crate::zkp::pilog) and of the group exponent in
/// [Π-aff-g](crate::zkp::piaffg): `+/- 2^ELL`.
pub(crate) const ELL: usize = SECURITY_PARAM;

/// Range of the additive MtA blinding value in [Π-aff-g](crate::zkp::piaffg):
/// `+/- 2^ELL_PRIME`.
pub(crate) const ELL_PRIME: usize = 5 * SECURITY_PARAM;

/// The slack of a range check.
///
/// A secret in `+/- 2^l` yields a masked response that the verifier accepts
/// in `+/- 2^(l + EPSILON)`.
pub(crate) const EPSILON: usize = 2 * SECURITY_PARAM;

/// Default bit size of each Paillier prime factor. Two such primes produce a
/// 2048-bit modulus, which is the smallest that keeps MtA decryption
/// correct for blinding values of `ELL_PRIME` bits.
pub(crate) const PRIME_BITS: usize = 1024;

/// Number of repetitions for proofs whose challenge space is a single bit.
pub(crate) const SOUNDNESS_PARAMETER: usize = 80;

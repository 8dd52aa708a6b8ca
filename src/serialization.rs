// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Hex encodings used by the JSON wire format and the output artifacts.
//!
//! Big integers are hex strings (with a leading `-` when negative), scalars
//! and fixed-size byte strings are hex strings, and curve points are the
//! object `{xHex, yHex}` of their affine coordinates. Zero-knowledge proofs
//! are carried as the hex encoding of their canonical bincode form.

use crate::utils::CurvePoint;
use k256::{
    elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint},
    AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint,
};
use libpaillier::unknown_order::BigNumber;
use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

pub(crate) fn bn_to_hex(value: &BigNumber) -> String {
    if value < &BigNumber::zero() {
        format!("-{}", hex::encode((-value.clone()).to_bytes()))
    } else {
        hex::encode(value.to_bytes())
    }
}

pub(crate) fn bn_from_hex(s: &str) -> Option<BigNumber> {
    match s.strip_prefix('-') {
        Some(magnitude) => hex::decode(magnitude)
            .ok()
            .map(|bytes| -BigNumber::from_slice(bytes)),
        None => hex::decode(s).ok().map(BigNumber::from_slice),
    }
}

fn field_bytes_from_hex(s: &str) -> Option<FieldBytes> {
    let bytes = hex::decode(s).ok()?;
    let array: [u8; 32] = bytes.try_into().ok()?;
    Some(FieldBytes::from(array))
}

pub(crate) mod bn_hex {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(value: &BigNumber, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&bn_to_hex(value))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BigNumber, D::Error> {
        let s = String::deserialize(d)?;
        bn_from_hex(&s).ok_or_else(|| D::Error::custom("invalid hex integer"))
    }
}

pub(crate) mod scalar_hex {
    use super::*;
    use k256::{elliptic_curve::PrimeField, Scalar};

    pub(crate) fn serialize<S: Serializer>(value: &Scalar, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(value.to_bytes()))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Scalar, D::Error> {
        let s = String::deserialize(d)?;
        let bytes = field_bytes_from_hex(&s).ok_or_else(|| D::Error::custom("invalid scalar"))?;
        Option::from(Scalar::from_repr(bytes)).ok_or_else(|| D::Error::custom("scalar not reduced"))
    }
}

pub(crate) mod bytes_hex {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(value: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(value))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| D::Error::custom("expected 32 hex-encoded bytes"))
    }
}

/// Carries any value as the hex encoding of its bincode serialization.
pub(crate) mod proof_hex {
    use super::*;
    use serde::de::DeserializeOwned;

    pub(crate) fn serialize<T: Serialize, S: Serializer>(value: &T, s: S) -> Result<S::Ok, S::Error> {
        let bytes = bincode::serialize(value).map_err(serde::ser::Error::custom)?;
        s.serialize_str(&hex::encode(bytes))
    }

    pub(crate) fn deserialize<'de, T: DeserializeOwned, D: Deserializer<'de>>(
        d: D,
    ) -> Result<T, D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(s).map_err(D::Error::custom)?;
        bincode::deserialize(&bytes).map_err(D::Error::custom)
    }
}

#[derive(Serialize, Deserialize)]
struct PointHex {
    #[serde(rename = "xHex")]
    x: String,
    #[serde(rename = "yHex")]
    y: String,
}

impl Serialize for CurvePoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = self.0.to_affine().to_encoded_point(false);
        // The identity has no affine coordinates.
        let point = match (encoded.x(), encoded.y()) {
            (Some(x), Some(y)) => PointHex {
                x: hex::encode(x),
                y: hex::encode(y),
            },
            _ => PointHex {
                x: String::new(),
                y: String::new(),
            },
        };
        point.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CurvePoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let point = PointHex::deserialize(deserializer)?;
        if point.x.is_empty() && point.y.is_empty() {
            return Ok(CurvePoint::IDENTITY);
        }
        let x = field_bytes_from_hex(&point.x).ok_or_else(|| D::Error::custom("invalid xHex"))?;
        let y = field_bytes_from_hex(&point.y).ok_or_else(|| D::Error::custom("invalid yHex"))?;
        let encoded = EncodedPoint::from_affine_coordinates(&x, &y, false);
        let affine: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
        affine
            .map(|p| CurvePoint(ProjectivePoint::from(p)))
            .ok_or_else(|| D::Error::custom("point is not on the curve"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{random_scalar, testing::init_testing};
    use k256::Scalar;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        #[serde(with = "bn_hex")]
        value: BigNumber,
        #[serde(with = "scalar_hex")]
        scalar: Scalar,
        point: CurvePoint,
    }

    #[test]
    fn hex_json_encoding_is_readable_and_restorable() -> anyhow::Result<()> {
        let mut rng = init_testing();
        let sample = Sample {
            value: -BigNumber::from(0xabcdu64),
            scalar: random_scalar(&mut rng),
            point: CurvePoint::base_mul(&random_scalar(&mut rng)),
        };
        let json = serde_json::to_value(&sample)?;
        assert_eq!(json["value"], "-abcd");
        assert!(json["point"]["xHex"].is_string());
        assert!(json["point"]["yHex"].is_string());

        let restored: Sample = serde_json::from_value(json)?;
        assert_eq!(restored, sample);
        Ok(())
    }

    #[test]
    fn off_curve_points_are_rejected() {
        let json = serde_json::json!({ "xHex": hex::encode([1u8; 32]), "yHex": hex::encode([1u8; 32]) });
        assert!(serde_json::from_value::<CurvePoint>(json).is_err());
    }

    #[test]
    fn identity_point_is_encoded_as_empty_coordinates() -> anyhow::Result<()> {
        let json = serde_json::to_value(CurvePoint::IDENTITY)?;
        assert_eq!(json["xHex"], "");
        assert_eq!(serde_json::from_value::<CurvePoint>(json)?, CurvePoint::IDENTITY);
        Ok(())
    }
}

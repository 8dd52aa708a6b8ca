// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The set of nodes a [`SessionManager`](crate::SessionManager) talks to.

use crate::protocol::PartyId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resolves node identities.
pub trait Roster {
    /// The network public key of `party`, or `None` if the node is unknown.
    fn resolve_public_key(&self, party: &PartyId) -> Option<Vec<u8>>;

    /// Every node that takes part in protocols by default.
    fn all_parties(&self) -> Vec<PartyId>;
}

/// A fixed roster, typically loaded from configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticRoster {
    #[serde(with = "keys_hex")]
    nodes: BTreeMap<PartyId, Vec<u8>>,
}

impl StaticRoster {
    pub fn new(nodes: impl IntoIterator<Item = (PartyId, Vec<u8>)>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
        }
    }
}

impl Roster for StaticRoster {
    fn resolve_public_key(&self, party: &PartyId) -> Option<Vec<u8>> {
        self.nodes.get(party).cloned()
    }

    fn all_parties(&self) -> Vec<PartyId> {
        self.nodes.keys().cloned().collect()
    }
}

mod keys_hex {
    use crate::protocol::PartyId;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub(super) fn serialize<S: Serializer>(
        nodes: &BTreeMap<PartyId, Vec<u8>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        nodes
            .iter()
            .map(|(id, key)| (id, hex::encode(key)))
            .collect::<BTreeMap<_, _>>()
            .serialize(s)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<PartyId, Vec<u8>>, D::Error> {
        BTreeMap::<PartyId, String>::deserialize(d)?
            .into_iter()
            .map(|(id, key)| {
                hex::decode(key)
                    .map(|key| (id, key))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

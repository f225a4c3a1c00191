use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Longest upgrade chain followed before giving up on a (cyclic) table.
const MAX_UPGRADE_HOPS: usize = 16;

/// Legacy-id upgrade table for instruments reissued under a new code.
///
/// Applied to every inbound identifier before any cache lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierRemap {
    upgrades: BTreeMap<String, String>,
}

impl IdentifierRemap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            upgrades: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.upgrades.insert(from.into(), to.into());
    }

    /// Follow the table until the id no longer maps anywhere.
    pub fn upgrade(&self, id: &str) -> String {
        let mut current = id;
        for _ in 0..MAX_UPGRADE_HOPS {
            match self.upgrades.get(current) {
                Some(next) if next != current => current = next,
                _ => break,
            }
        }
        current.to_string()
    }

    pub fn len(&self) -> usize {
        self.upgrades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upgrades.is_empty()
    }
}

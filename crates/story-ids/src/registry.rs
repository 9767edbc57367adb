//! Stable identifier registry
//!
//! Provides [`IdentifierRegistry`], the single writer that mints identifiers
//! during discovery, and [`RegistrySnapshot`], the immutable view every later
//! stage reads.
//!
//! Minting is serialized behind one lock so collision suffixes are handed out
//! in exactly one order, whatever the caller interleaving. Nothing is ever
//! reassigned or removed outside the explicit [`IdentifierRegistry::reset`]
//! hook.

use crate::kind::{base_id, EntityKind};
use indexmap::IndexMap;
use parking_lot::Mutex;
use radix_trie::{Trie, TrieCommon};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// A minted identifier, e.g. `COMP-LOGIN-BUTTON` or `COMP-LOGIN-BUTTON_2`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(String);

impl StableId {
    /// Identifier text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the identifier text
    #[inline]
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for StableId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StableId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for StableId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Everything recorded about one minted identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: StableId,
    pub kind: EntityKind,
    /// Name exactly as first seen (trimmed)
    pub canonical_name: String,
    /// Mint order, starting at 0
    pub sequence: u64,
}

type NameKey = (EntityKind, String);

#[derive(Debug, Default)]
struct RegistryState {
    /// (kind, name) → id, in first-seen order
    by_name: IndexMap<NameKey, StableId>,
    /// id → registration; prefix queries answer "all ids of a kind"
    issued: Trie<String, Registration>,
    /// Highest collision suffix handed out per base id
    last_suffix: HashMap<String, u32>,
}

impl RegistryState {
    fn mint(&mut self, kind: EntityKind, name: &str) -> StableId {
        let key = (kind, name.trim().to_string());
        if let Some(id) = self.by_name.get(&key) {
            return id.clone();
        }

        let base = base_id(kind, &key.1);
        let id = if self.issued.get(&base).is_none() {
            base
        } else {
            let mut n = self.last_suffix.get(&base).copied().unwrap_or(1) + 1;
            while self.issued.get(&format!("{base}_{n}")).is_some() {
                n += 1;
            }
            self.last_suffix.insert(base.clone(), n);
            format!("{base}_{n}")
        };

        let id = StableId(id);
        let registration = Registration {
            id: id.clone(),
            kind,
            canonical_name: key.1.clone(),
            sequence: self.by_name.len() as u64,
        };
        self.issued.insert(id.0.clone(), registration);
        self.by_name.insert(key, id.clone());
        id
    }

    fn registrations(&self) -> Vec<Registration> {
        self.by_name
            .values()
            .filter_map(|id| self.issued.get(&id.0).cloned())
            .collect()
    }
}

/// Append-only (kind, name) → identifier registry
///
/// Explicitly constructed and passed by reference; there is no process-wide
/// instance.
#[derive(Debug, Default)]
pub struct IdentifierRegistry {
    state: Mutex<RegistryState>,
}

impl IdentifierRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint (or return) the identifier for a (kind, name) pair
    ///
    /// The same trimmed name always yields the same id. A different
    /// spelling that normalizes onto an id already issued gets the next
    /// numeric suffix (`_2`, `_3`, …) in first-seen order. Total: never fails.
    pub fn mint(&self, kind: EntityKind, canonical_name: &str) -> StableId {
        self.state.lock().mint(kind, canonical_name)
    }

    /// Mint a batch under one lock acquisition, preserving input order
    pub fn mint_all<'a, I>(&self, mentions: I) -> Vec<StableId>
    where
        I: IntoIterator<Item = (EntityKind, &'a str)>,
    {
        let mut state = self.state.lock();
        mentions
            .into_iter()
            .map(|(kind, name)| state.mint(kind, name))
            .collect()
    }

    /// Identifier already minted for a (kind, name) pair
    #[must_use]
    pub fn lookup(&self, kind: EntityKind, canonical_name: &str) -> Option<StableId> {
        let key = (kind, canonical_name.trim().to_string());
        self.state.lock().by_name.get(&key).cloned()
    }

    /// Registration for an identifier
    #[must_use]
    pub fn resolve(&self, id: &str) -> Option<Registration> {
        self.state.lock().issued.get(&id.to_string()).cloned()
    }

    /// Number of identifiers minted
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().by_name.len()
    }

    /// True when nothing has been minted
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Immutable copy of the current contents
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot::from_registrations(self.state.lock().registrations())
    }

    /// End the mutable phase and hand out the read-only view
    #[must_use]
    pub fn freeze(self) -> RegistrySnapshot {
        RegistrySnapshot::from_registrations(self.state.into_inner().registrations())
    }

    /// Forget everything. Test hook; production runs build a fresh registry.
    pub fn reset(&self) {
        *self.state.lock() = RegistryState::default();
    }
}

#[derive(Debug, Default)]
struct SnapshotInner {
    by_name: IndexMap<NameKey, StableId>,
    by_id: HashMap<String, Registration>,
}

/// Frozen, shareable registry view
///
/// Cheap to clone; safe to read from any number of tasks.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    inner: Arc<SnapshotInner>,
}

impl RegistrySnapshot {
    fn from_registrations(registrations: Vec<Registration>) -> Self {
        let mut inner = SnapshotInner::default();
        for r in registrations {
            inner
                .by_name
                .insert((r.kind, r.canonical_name.clone()), r.id.clone());
            inner.by_id.insert(r.id.as_str().to_string(), r);
        }
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Identifier for a (kind, name) pair
    #[must_use]
    pub fn get(&self, kind: EntityKind, canonical_name: &str) -> Option<&StableId> {
        self.inner
            .by_name
            .get(&(kind, canonical_name.trim().to_string()))
    }

    /// Registration for an identifier
    #[must_use]
    pub fn resolve(&self, id: &str) -> Option<&Registration> {
        self.inner.by_id.get(id)
    }

    /// Whether an identifier was minted
    #[inline]
    #[must_use]
    pub fn contains_id(&self, id: &str) -> bool {
        self.inner.by_id.contains_key(id)
    }

    /// Identifiers of one kind, in mint order
    #[must_use]
    pub fn ids_of_kind(&self, kind: EntityKind) -> Vec<&StableId> {
        self.inner
            .by_name
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, id)| id)
            .collect()
    }

    /// Every registration in mint order
    pub fn iter(&self) -> impl Iterator<Item = &Registration> {
        self.inner
            .by_name
            .values()
            .filter_map(|id| self.inner.by_id.get(id.as_str()))
    }

    /// Number of identifiers
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.by_name.len()
    }

    /// True when empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.by_name.is_empty()
    }
}

impl Serialize for RegistrySnapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_seq(self.iter())
    }
}

/// Ids issued for one kind, straight from the radix index
///
/// Used by callers that need a kind listing without freezing.
#[must_use]
pub fn issued_with_prefix(registry: &IdentifierRegistry, kind: EntityKind) -> Vec<StableId> {
    let state = registry.state.lock();
    let prefix = kind.id_prefix();
    let mut found: Vec<Registration> = state
        .issued
        .get_raw_descendant(&prefix)
        .map(|sub| {
            sub.values()
                .filter(|r| r.kind == kind)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    found.sort_by_key(|r| r.sequence);
    found.into_iter().map(|r| r.id).collect()
}

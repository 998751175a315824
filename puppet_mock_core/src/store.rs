//! In-memory payload storage.

use crate::error::{MockerError, PayloadKind, Result};
use crate::payload::{ContactPayload, MessagePayload, RoomPayload};
use puppet_mock_env::{ContactId, MessageId, RoomId};
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;

/// Id → payload map that remembers insertion order.
///
/// Iteration order matters for seeded runs: random picks index into
/// `ids()`, so the order must not depend on hasher state.
#[derive(Debug, Clone)]
pub struct PayloadMap<K, V> {
    kind: PayloadKind,
    entries: HashMap<K, V>,
    order: Vec<K>,
}

impl<K, V> PayloadMap<K, V>
where
    K: Clone + Eq + Hash + std::fmt::Display,
    V: Clone,
{
    pub fn new(kind: PayloadKind) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Returns a copy of the payload stored under `id`.
    pub fn get(&self, id: &K) -> Result<V> {
        self.entries
            .get(id)
            .cloned()
            .ok_or_else(|| MockerError::not_found(self.kind, id))
    }

    /// Stores `payload` under `id`, replacing any previous value.
    pub fn set(&mut self, id: K, payload: V) {
        if self.entries.insert(id.clone(), payload).is_none() {
            self.order.push(id);
        }
    }

    pub fn contains(&self, id: &K) -> bool {
        self.entries.contains_key(id)
    }

    /// Known ids in insertion order.
    pub fn ids(&self) -> Vec<K> {
        self.order.clone()
    }

    /// Id at `index` in insertion order.
    pub fn id_at(&self, index: usize) -> Option<&K> {
        self.order.get(index)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Per-kind payload counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub contacts: usize,
    pub rooms: usize,
    pub messages: usize,
}

/// The three payload maps of a mocker.
#[derive(Debug, Clone)]
pub struct PayloadStore {
    pub contacts: PayloadMap<ContactId, ContactPayload>,
    pub rooms: PayloadMap<RoomId, RoomPayload>,
    pub messages: PayloadMap<MessageId, MessagePayload>,
}

impl PayloadStore {
    pub fn new() -> Self {
        Self {
            contacts: PayloadMap::new(PayloadKind::Contact),
            rooms: PayloadMap::new(PayloadKind::Room),
            messages: PayloadMap::new(PayloadKind::Message),
        }
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            contacts: self.contacts.len(),
            rooms: self.rooms.len(),
            messages: self.messages.len(),
        }
    }
}

impl Default for PayloadStore {
    fn default() -> Self {
        Self::new()
    }
}

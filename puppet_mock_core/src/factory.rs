//! Randomized payload generation.
//!
//! All entropy comes from the mocker's [`MockerContext`], so a seeded
//! context yields the same contacts and rooms on every run.

use crate::payload::{ContactPayload, ContactType, Gender, MessagePayload, RoomPayload};
use crate::store::PayloadMap;
use puppet_mock_env::{ContactId, MessageId, MockerContext, RoomId};
use std::hash::Hash;
use std::sync::Arc;
use tracing::warn;

const FIRST_NAMES: &[&str] = &[
    "Alice", "Bob", "Carol", "Dave", "Erin", "Frank", "Grace", "Heidi",
    "Ivan", "Judy", "Mallory", "Niaj", "Olivia", "Peggy", "Rupert", "Sybil",
    "Trent", "Uma", "Victor", "Wendy",
];

const LAST_NAMES: &[&str] = &[
    "Anderson", "Brown", "Chen", "Dubois", "Evans", "Fischer", "Garcia",
    "Hansen", "Ito", "Jensen", "Kowalski", "Li", "Moreau", "Novak",
    "Okafor", "Petrov", "Rossi", "Silva", "Tanaka", "Weber",
];

const TOPIC_ADJECTIVES: &[&str] = &[
    "Weekend", "Secret", "Morning", "Family", "Project", "Lunch", "Night",
    "Travel", "Book", "Music", "Coffee", "Hiking",
];

const TOPIC_NOUNS: &[&str] = &[
    "Club", "Crew", "Squad", "Circle", "Gang", "Team", "Lounge", "Corner",
    "Guild", "Society",
];

/// Retry budget for id collisions. With 122 random bits a second attempt
/// is already unheard of.
const MAX_ID_ATTEMPTS: usize = 8;

/// Produces randomized-but-valid payloads for new entities.
pub struct EntityFactory {
    context: Arc<dyn MockerContext>,
}

impl EntityFactory {
    pub fn new(context: Arc<dyn MockerContext>) -> Self {
        Self { context }
    }

    /// Generates a contact whose id is not yet present in `existing`.
    pub fn generate_contact_payload(
        &self,
        existing: &PayloadMap<ContactId, ContactPayload>,
    ) -> ContactPayload {
        let id = self.fresh_id(|| ContactId::generate(&*self.context), |id| existing.contains(id));

        ContactPayload {
            id,
            name: format!("{} {}", self.pick(FIRST_NAMES), self.pick(LAST_NAMES)),
            avatar: format!("mock://avatar/{:016x}.jpg", self.context.next_u64()),
            gender: Gender::Unknown,
            contact_type: ContactType::Individual,
            alias: None,
            signature: None,
        }
    }

    /// Generates a room whose members are a random non-empty subset of
    /// `member_pool`.
    ///
    /// An empty pool yields a room with no members. The first member, if
    /// any, becomes the owner.
    pub fn generate_room_payload(
        &self,
        member_pool: &[ContactId],
        existing: &PayloadMap<RoomId, RoomPayload>,
    ) -> RoomPayload {
        let id = self.fresh_id(|| RoomId::generate(&*self.context), |id| existing.contains(id));
        let topic = format!("{} {}", self.pick(TOPIC_ADJECTIVES), self.pick(TOPIC_NOUNS));
        let member_ids = self.pick_subset(member_pool);
        let owner_id = member_ids.first().cloned();

        RoomPayload {
            id,
            topic,
            member_ids,
            owner_id,
            admin_ids: Vec::new(),
            avatar: None,
        }
    }

    /// Message id not yet present in `existing`.
    pub fn generate_message_id(
        &self,
        existing: &PayloadMap<MessageId, MessagePayload>,
    ) -> MessageId {
        self.fresh_id(|| MessageId::generate(&*self.context), |id| existing.contains(id))
    }

    /// Random non-empty subset of `pool`, keeping pool order.
    ///
    /// Returns an empty vector only when `pool` is empty.
    pub fn pick_subset<T: Clone>(&self, pool: &[T]) -> Vec<T> {
        let n = pool.len();
        if n == 0 {
            return Vec::new();
        }

        let k = 1 + self.context.random_index(n);

        // Partial Fisher-Yates over indices
        let mut indices: Vec<usize> = (0..n).collect();
        for i in 0..k {
            let j = i + self.context.random_index(n - i);
            indices.swap(i, j);
        }

        let mut chosen = indices[..k].to_vec();
        chosen.sort_unstable();
        chosen.into_iter().map(|i| pool[i].clone()).collect()
    }

    /// Uniform pick from a non-empty slice.
    pub fn pick<'a>(&self, items: &[&'a str]) -> &'a str {
        items[self.context.random_index(items.len())]
    }

    fn fresh_id<K, G, T>(&self, generate: G, taken: T) -> K
    where
        K: Eq + Hash + std::fmt::Display,
        G: Fn() -> K,
        T: Fn(&K) -> bool,
    {
        let mut id = generate();
        for _ in 1..MAX_ID_ATTEMPTS {
            if !taken(&id) {
                return id;
            }
            id = generate();
        }
        warn!("id collision budget exhausted, reusing {}", id);
        id
    }
}

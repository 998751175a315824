//! Payload records for contacts, rooms and messages.
//!
//! Payloads are plain data. Partial updates go through the `*Overrides`
//! builders: a full default payload is generated first, then every
//! override that was set replaces the matching field.

use puppet_mock_env::{ContactId, ConversationId, MessageId, RoomId};
use serde::{Deserialize, Serialize};

/// Gender of a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Gender {
    #[default]
    Unknown,
    Male,
    Female,
}

/// Kind of account behind a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ContactType {
    Unknown,
    #[default]
    Individual,
    Official,
}

/// Contact record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPayload {
    pub id: ContactId,
    pub name: String,
    pub avatar: String,
    pub gender: Gender,
    pub contact_type: ContactType,
    pub alias: Option<String>,
    pub signature: Option<String>,
}

/// Room (group conversation) record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPayload {
    pub id: RoomId,
    /// Never empty
    pub topic: String,
    /// Ordered, duplicate-free
    pub member_ids: Vec<ContactId>,
    pub owner_id: Option<ContactId>,
    pub admin_ids: Vec<ContactId>,
    pub avatar: Option<String>,
}

impl RoomPayload {
    /// Returns true if the contact is listed as a member.
    pub fn has_member(&self, id: &ContactId) -> bool {
        self.member_ids.contains(id)
    }
}

/// Message type, derived from the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Text,
    Attachment,
}

/// Message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum MessageBody {
    Text(String),
    /// Reference to a file, not its bytes
    Attachment(String),
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::Text(_) => MessageType::Text,
            MessageBody::Attachment(_) => MessageType::Attachment,
        }
    }

    /// Text content, if this is a text body.
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageBody::Text(text) => Some(text),
            MessageBody::Attachment(_) => None,
        }
    }
}

impl From<&str> for MessageBody {
    fn from(text: &str) -> Self {
        MessageBody::Text(text.to_string())
    }
}

impl From<String> for MessageBody {
    fn from(text: String) -> Self {
        MessageBody::Text(text)
    }
}

/// Message record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: MessageId,
    pub from_id: ContactId,
    /// Contact or room id
    pub to_id: ConversationId,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub body: MessageBody,
    pub mention_ids: Vec<ContactId>,
}

impl MessagePayload {
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    pub fn text(&self) -> Option<&str> {
        self.body.text()
    }
}

/// Explicit overrides applied over a generated contact payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactOverrides {
    pub id: Option<ContactId>,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub gender: Option<Gender>,
    pub contact_type: Option<ContactType>,
    pub alias: Option<String>,
    pub signature: Option<String>,
}

impl ContactOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<ContactId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    pub fn gender(mut self, gender: Gender) -> Self {
        self.gender = Some(gender);
        self
    }

    pub fn contact_type(mut self, contact_type: ContactType) -> Self {
        self.contact_type = Some(contact_type);
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Returns true if no field is overridden.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merges the set fields over `base`.
    pub fn apply(self, base: ContactPayload) -> ContactPayload {
        ContactPayload {
            id: self.id.unwrap_or(base.id),
            name: self.name.unwrap_or(base.name),
            avatar: self.avatar.unwrap_or(base.avatar),
            gender: self.gender.unwrap_or(base.gender),
            contact_type: self.contact_type.unwrap_or(base.contact_type),
            alias: self.alias.or(base.alias),
            signature: self.signature.or(base.signature),
        }
    }
}

/// Explicit overrides applied over a generated room payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomOverrides {
    pub id: Option<RoomId>,
    pub topic: Option<String>,
    pub member_ids: Option<Vec<ContactId>>,
    pub owner_id: Option<ContactId>,
    pub admin_ids: Option<Vec<ContactId>>,
    pub avatar: Option<String>,
}

impl RoomOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<RoomId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn member_ids(mut self, member_ids: impl IntoIterator<Item = ContactId>) -> Self {
        self.member_ids = Some(member_ids.into_iter().collect());
        self
    }

    pub fn owner_id(mut self, owner_id: impl Into<ContactId>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn admin_ids(mut self, admin_ids: impl IntoIterator<Item = ContactId>) -> Self {
        self.admin_ids = Some(admin_ids.into_iter().collect());
        self
    }

    pub fn avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merges the set fields over `base`.
    ///
    /// A blank topic override is ignored so the room keeps a non-empty
    /// topic. Duplicate member ids collapse to their first occurrence.
    pub fn apply(self, base: RoomPayload) -> RoomPayload {
        let topic = match self.topic {
            Some(topic) if !topic.trim().is_empty() => topic,
            _ => base.topic,
        };

        let member_ids = match self.member_ids {
            Some(ids) => dedup(ids),
            None => base.member_ids,
        };

        // A generated owner must stay inside an overridden member list
        let owner_id = match self.owner_id {
            Some(owner) => Some(owner),
            None => base
                .owner_id
                .filter(|owner| member_ids.contains(owner))
                .or_else(|| member_ids.first().cloned()),
        };

        RoomPayload {
            id: self.id.unwrap_or(base.id),
            topic,
            member_ids,
            owner_id,
            admin_ids: self.admin_ids.map(dedup).unwrap_or(base.admin_ids),
            avatar: self.avatar.or(base.avatar),
        }
    }
}

fn dedup(ids: Vec<ContactId>) -> Vec<ContactId> {
    let mut out: Vec<ContactId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

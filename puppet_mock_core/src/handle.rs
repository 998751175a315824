//! Contact and room handles.
//!
//! A handle is an id plus a borrow of the owning [`Mocker`]; every
//! accessor reads through to the payload store, so handles can be
//! re-created freely and never hold stale data. The borrow also makes it
//! impossible for a handle to outlive its mocker.

use crate::error::Result;
use crate::mocker::Mocker;
use crate::payload::{ContactOverrides, ContactPayload, Gender, MessageBody, RoomPayload};
use puppet_mock_env::{ContactId, ConversationId, MessageId, RoomId};

/// View of a simulated contact.
#[derive(Clone)]
pub struct Contact<'m> {
    mocker: &'m Mocker,
    id: ContactId,
}

impl<'m> Contact<'m> {
    /// Creates a handle for `id` without checking the store.
    pub fn new(mocker: &'m Mocker, id: ContactId) -> Self {
        Self { mocker, id }
    }

    /// Creates a handle for a payload that may not be stored yet.
    pub fn from_payload(mocker: &'m Mocker, payload: &ContactPayload) -> Self {
        Self::new(mocker, payload.id.clone())
    }

    pub fn id(&self) -> &ContactId {
        &self.id
    }

    pub fn mocker(&self) -> &'m Mocker {
        self.mocker
    }

    pub fn payload(&self) -> Result<ContactPayload> {
        self.mocker.contact_payload(&self.id)
    }

    pub fn name(&self) -> Result<String> {
        Ok(self.payload()?.name)
    }

    pub fn avatar(&self) -> Result<String> {
        Ok(self.payload()?.avatar)
    }

    pub fn gender(&self) -> Result<Gender> {
        Ok(self.payload()?.gender)
    }

    /// Re-sets the payload with `overrides` merged over the stored one.
    ///
    /// The id field is never changed through a handle.
    pub fn update(&self, mut overrides: ContactOverrides) -> Result<()> {
        overrides.id = None;
        let payload = overrides.apply(self.payload()?);
        self.mocker.set_contact_payload(self.id.clone(), payload);
        Ok(())
    }

    /// Sends `body` from this contact to `target` and returns the new
    /// message id. Emits a `message` event.
    pub fn say(
        &self,
        target: impl Into<ConversationId>,
        body: impl Into<MessageBody>,
    ) -> MessageId {
        self.mocker
            .post_message(self.id.clone(), target.into(), body.into(), Vec::new())
    }

    /// Like [`say`](Self::say), tagging `mentions` on the message.
    pub fn say_mentioning(
        &self,
        target: impl Into<ConversationId>,
        body: impl Into<MessageBody>,
        mentions: &[&Contact<'_>],
    ) -> MessageId {
        let mention_ids = mentions.iter().map(|c| c.id.clone()).collect();
        self.mocker
            .post_message(self.id.clone(), target.into(), body.into(), mention_ids)
    }
}

impl std::fmt::Display for Contact<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Contact<{}>", self.id)
    }
}

impl std::fmt::Debug for Contact<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Contact<{}>", self.id)
    }
}

impl PartialEq for Contact<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.mocker.ptr_eq(other.mocker)
    }
}

/// View of a simulated room.
#[derive(Clone)]
pub struct Room<'m> {
    mocker: &'m Mocker,
    id: RoomId,
}

impl<'m> Room<'m> {
    /// Creates a handle for `id` without checking the store.
    pub fn new(mocker: &'m Mocker, id: RoomId) -> Self {
        Self { mocker, id }
    }

    pub fn from_payload(mocker: &'m Mocker, payload: &RoomPayload) -> Self {
        Self::new(mocker, payload.id.clone())
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn payload(&self) -> Result<RoomPayload> {
        self.mocker.room_payload(&self.id)
    }

    pub fn topic(&self) -> Result<String> {
        Ok(self.payload()?.topic)
    }

    /// Changes the topic. Blank topics are ignored.
    pub fn set_topic(&self, topic: impl Into<String>) -> Result<()> {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Ok(());
        }
        let mut payload = self.payload()?;
        payload.topic = topic;
        self.mocker.set_room_payload(self.id.clone(), payload);
        Ok(())
    }

    pub fn member_ids(&self) -> Result<Vec<ContactId>> {
        Ok(self.payload()?.member_ids)
    }

    /// Member handles, in membership order.
    pub fn members(&self) -> Result<Vec<Contact<'m>>> {
        Ok(self
            .member_ids()?
            .into_iter()
            .map(|id| Contact::new(self.mocker, id))
            .collect())
    }

    pub fn owner(&self) -> Result<Option<Contact<'m>>> {
        Ok(self
            .payload()?
            .owner_id
            .map(|id| Contact::new(self.mocker, id)))
    }

    pub fn has(&self, contact: &Contact<'_>) -> Result<bool> {
        Ok(self.payload()?.has_member(contact.id()))
    }

    /// Appends `contact` to the member list. No-op if already a member.
    ///
    /// Membership is not validated against the contact store here.
    pub fn add(&self, contact: &Contact<'_>) -> Result<()> {
        let mut payload = self.payload()?;
        if !payload.has_member(contact.id()) {
            payload.member_ids.push(contact.id().clone());
            self.mocker.set_room_payload(self.id.clone(), payload);
        }
        Ok(())
    }

    /// Removes `contact` from the member list (and from owner/admins).
    pub fn remove(&self, contact: &Contact<'_>) -> Result<()> {
        let mut payload = self.payload()?;
        payload.member_ids.retain(|id| id != contact.id());
        payload.admin_ids.retain(|id| id != contact.id());
        if payload.owner_id.as_ref() == Some(contact.id()) {
            payload.owner_id = None;
        }
        self.mocker.set_room_payload(self.id.clone(), payload);
        Ok(())
    }
}

impl std::fmt::Display for Room<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Room<{}>", self.id)
    }
}

impl std::fmt::Debug for Room<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Room<{}>", self.id)
    }
}

impl PartialEq for Room<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.mocker.ptr_eq(other.mocker)
    }
}

/// Either side of a chat: a direct contact or a room.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversation<'m> {
    Contact(Contact<'m>),
    Room(Room<'m>),
}

impl<'m> Conversation<'m> {
    pub fn id(&self) -> ConversationId {
        match self {
            Conversation::Contact(contact) => contact.id().into(),
            Conversation::Room(room) => room.id().into(),
        }
    }

    pub fn as_contact(&self) -> Option<&Contact<'m>> {
        match self {
            Conversation::Contact(contact) => Some(contact),
            Conversation::Room(_) => None,
        }
    }

    pub fn as_room(&self) -> Option<&Room<'m>> {
        match self {
            Conversation::Room(room) => Some(room),
            Conversation::Contact(_) => None,
        }
    }
}

impl std::fmt::Display for Conversation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Conversation::Contact(contact) => std::fmt::Display::fmt(contact, f),
            Conversation::Room(room) => std::fmt::Display::fmt(room, f),
        }
    }
}

impl<'m> From<Contact<'m>> for Conversation<'m> {
    fn from(contact: Contact<'m>) -> Self {
        Conversation::Contact(contact)
    }
}

impl<'m> From<Room<'m>> for Conversation<'m> {
    fn from(room: Room<'m>) -> Self {
        Conversation::Room(room)
    }
}

impl From<&Contact<'_>> for ConversationId {
    fn from(contact: &Contact<'_>) -> Self {
        contact.id().into()
    }
}

impl From<&Room<'_>> for ConversationId {
    fn from(room: &Room<'_>) -> Self {
        room.id().into()
    }
}

impl From<&Conversation<'_>> for ConversationId {
    fn from(conversation: &Conversation<'_>) -> Self {
        conversation.id()
    }
}

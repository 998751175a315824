//! PuppetMock - the adapter a chat framework drives.

use crate::error::{PuppetError, Result};

use puppet_mock_core::{
    ContactOverrides, ContactPayload, EventBus, MessagePayload, Mocker, PuppetEvent, PuppetSink,
    RoomPayload, ScanStatus,
};
use puppet_mock_env::{ContactId, ConversationId, MessageId, RoomId};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// QR code announced in the `scan` event emitted by `start()`.
pub const MOCK_QR_CODE: &str = "https://not-exist.com";

/// Options for a [`PuppetMock`].
#[derive(Debug, Clone)]
pub struct PuppetMockOptions {
    /// Events buffered per subscriber before the slowest one lags
    pub event_capacity: usize,
}

impl Default for PuppetMockOptions {
    fn default() -> Self {
        Self {
            event_capacity: EventBus::DEFAULT_CAPACITY,
        }
    }
}

/// ON/OFF lifecycle of the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PuppetState {
    #[default]
    Off,
    On,
}

/// Sink bound into the mocker.
///
/// Tracks the logged-in user before fanning events out, so `self_id()` is
/// already up to date when a listener sees the `login` event.
struct PuppetShared {
    bus: EventBus,
    self_id: RwLock<Option<ContactId>>,
}

impl PuppetShared {
    fn self_id(&self) -> Option<ContactId> {
        self.self_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_self_id(&self, id: Option<ContactId>) {
        *self.self_id.write().unwrap_or_else(PoisonError::into_inner) = id;
    }
}

impl PuppetSink for PuppetShared {
    fn emit(&self, event: PuppetEvent) {
        match &event {
            PuppetEvent::Login { contact_id } => self.set_self_id(Some(contact_id.clone())),
            PuppetEvent::Logout { .. } => self.set_self_id(None),
            _ => {}
        }
        self.bus.publish(event);
    }
}

/// Puppet backed by an in-memory [`Mocker`].
///
/// Framework-facing calls read and write the mocker's payload store;
/// events the mocker emits reach every [`subscribe`](Self::subscribe)r.
pub struct PuppetMock {
    mocker: Mocker,
    shared: Arc<PuppetShared>,
    state: Mutex<PuppetState>,
}

impl PuppetMock {
    /// Creates the adapter and binds it into `mocker`.
    pub fn new(mocker: Mocker) -> Result<Self> {
        Self::with_options(mocker, PuppetMockOptions::default())
    }

    pub fn with_options(mocker: Mocker, options: PuppetMockOptions) -> Result<Self> {
        let shared = Arc::new(PuppetShared {
            bus: EventBus::new(options.event_capacity),
            self_id: RwLock::new(None),
        });
        mocker.bind_puppet(Arc::clone(&shared) as Arc<dyn PuppetSink>)?;
        debug!("PuppetMock constructor() bound to {}", mocker);

        Ok(Self {
            mocker,
            shared,
            state: Mutex::new(PuppetState::Off),
        })
    }

    pub fn mocker(&self) -> &Mocker {
        &self.mocker
    }

    pub fn state(&self) -> PuppetState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_on(&self) -> bool {
        self.state() == PuppetState::On
    }

    /// Receiver for every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PuppetEvent> {
        self.shared.bus.subscribe()
    }

    /// Turns the puppet on, announces a `scan` and starts the mocker's
    /// behaviors.
    ///
    /// Starting an ON puppet only logs a warning.
    pub async fn start(&self) -> Result<()> {
        debug!("PuppetMock start()");
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == PuppetState::On {
                warn!("PuppetMock start() is called on a ON puppet, ignored");
                return Ok(());
            }
            *state = PuppetState::On;
        }

        if let Err(e) = self.mocker.scan(MOCK_QR_CODE, ScanStatus::default()) {
            *self.state.lock().unwrap_or_else(PoisonError::into_inner) = PuppetState::Off;
            return Err(e.into());
        }

        if let Err(e) = self.mocker.start() {
            // Roll back the behaviors that did install
            warn!("PuppetMock start() failed: {}", e);
            self.mocker.stop();
            *self.state.lock().unwrap_or_else(PoisonError::into_inner) = PuppetState::Off;
            return Err(e.into());
        }
        info!("PuppetMock started on {}", self.mocker);
        Ok(())
    }

    /// Stops the mocker's behaviors and turns the puppet off.
    ///
    /// Stopping an OFF puppet only logs a warning.
    pub async fn stop(&self) {
        debug!("PuppetMock stop()");
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == PuppetState::Off {
                warn!("PuppetMock stop() is called on a OFF puppet, ignored");
                return;
            }
            *state = PuppetState::Off;
        }
        self.mocker.stop();
        info!("PuppetMock stopped");
    }

    // ─────────────────────────────────────────────────────────────
    // Login state
    // ─────────────────────────────────────────────────────────────

    /// Id of the logged-in user, if any.
    pub fn self_id(&self) -> Option<ContactId> {
        self.shared.self_id()
    }

    pub fn is_logged_in(&self) -> bool {
        self.self_id().is_some()
    }

    /// True if `message` was sent by the logged-in user.
    pub fn is_self(&self, message: &MessagePayload) -> bool {
        self.self_id().as_ref() == Some(&message.from_id)
    }

    /// Logs `contact_id` in; the contact must exist.
    pub fn login(&self, contact_id: &ContactId) -> Result<()> {
        let user = self.mocker.find_contact(contact_id.as_str())?;
        self.mocker.login(&user)?;
        Ok(())
    }

    /// Logs the current user out.
    pub async fn logout(&self) -> Result<()> {
        debug!("PuppetMock logout()");
        let id = self.self_id().ok_or(PuppetError::NotLoggedIn)?;
        self.mocker.logout(&self.mocker.contact(id))?;
        Ok(())
    }

    /// Answers with a `dong` event carrying `data`.
    pub fn ding(&self, data: Option<&str>) -> Result<()> {
        trace!("PuppetMock ding({})", data.unwrap_or_default());
        self.mocker.ding(data.unwrap_or_default())?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Contacts
    // ─────────────────────────────────────────────────────────────

    pub fn contact_list(&self) -> Vec<ContactId> {
        debug!("PuppetMock contactList()");
        self.mocker.contact_ids()
    }

    pub fn contact_payload(&self, id: &ContactId) -> Result<ContactPayload> {
        Ok(self.mocker.contact_payload(id)?)
    }

    /// Current alias of a contact.
    pub fn contact_alias(&self, id: &ContactId) -> Result<Option<String>> {
        Ok(self.mocker.contact_payload(id)?.alias)
    }

    pub fn set_contact_alias(&self, id: &ContactId, alias: impl Into<String>) -> Result<()> {
        let alias = alias.into();
        debug!("PuppetMock contactAlias({}, {})", id, alias);
        self.mocker
            .find_contact(id.as_str())?
            .update(ContactOverrides::new().alias(alias))?;
        Ok(())
    }

    /// Renames the logged-in user.
    pub fn contact_self_name(&self, name: impl Into<String>) -> Result<()> {
        let id = self.self_id().ok_or(PuppetError::NotLoggedIn)?;
        self.mocker
            .contact(id)
            .update(ContactOverrides::new().name(name))?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Rooms
    // ─────────────────────────────────────────────────────────────

    pub fn room_list(&self) -> Vec<RoomId> {
        debug!("PuppetMock roomList()");
        self.mocker.room_ids()
    }

    pub fn room_payload(&self, id: &RoomId) -> Result<RoomPayload> {
        Ok(self.mocker.room_payload(id)?)
    }

    pub fn room_member_list(&self, id: &RoomId) -> Result<Vec<ContactId>> {
        debug!("PuppetMock roomMemberList({})", id);
        Ok(self.mocker.room_payload(id)?.member_ids)
    }

    pub fn room_topic(&self, id: &RoomId) -> Result<String> {
        Ok(self.mocker.room_payload(id)?.topic)
    }

    pub fn set_room_topic(&self, id: &RoomId, topic: impl Into<String>) -> Result<()> {
        self.mocker.find_room(id.as_str())?.set_topic(topic)?;
        Ok(())
    }

    /// Adds an existing contact to an existing room.
    pub fn room_add(&self, room_id: &RoomId, contact_id: &ContactId) -> Result<()> {
        debug!("PuppetMock roomAdd({}, {})", room_id, contact_id);
        let room = self.mocker.find_room(room_id.as_str())?;
        let contact = self.mocker.find_contact(contact_id.as_str())?;
        room.add(&contact)?;
        Ok(())
    }

    pub fn room_del(&self, room_id: &RoomId, contact_id: &ContactId) -> Result<()> {
        debug!("PuppetMock roomDel({}, {})", room_id, contact_id);
        let room = self.mocker.find_room(room_id.as_str())?;
        room.remove(&self.mocker.contact(contact_id.clone()))?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────

    pub fn message_payload(&self, id: &MessageId) -> Result<MessagePayload> {
        Ok(self.mocker.message_payload(id)?)
    }

    /// Sends `text` as the logged-in user into `conversation_id`.
    ///
    /// The message is stored and announced like any other, so listeners
    /// see it with `is_self() == true`.
    pub fn message_send_text(
        &self,
        conversation_id: &ConversationId,
        text: impl Into<String>,
    ) -> Result<MessageId> {
        let text = text.into();
        debug!("PuppetMock messageSend({}, {})", conversation_id, text);

        let id = self.self_id().ok_or(PuppetError::NotLoggedIn)?;
        let conversation = self.mocker.conversation(conversation_id)?;
        Ok(self.mocker.contact(id).say(&conversation, text))
    }
}

impl std::fmt::Debug for PuppetMock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PuppetMock")
            .field("mocker", &self.mocker)
            .field("state", &self.state())
            .field("self_id", &self.self_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use puppet_mock_core::{CancelHandle, MockerError, Populate, RoomOverrides};

    fn puppet(seed: u64) -> PuppetMock {
        PuppetMock::new(Mocker::seeded(seed)).unwrap()
    }

    fn drain(rx: &mut broadcast::Receiver<PuppetEvent>) -> Vec<PuppetEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn test_second_adapter_cannot_bind() {
        let mocker = Mocker::seeded(1);
        let _first = PuppetMock::new(mocker.clone()).unwrap();
        let err = PuppetMock::new(mocker).unwrap_err();
        assert_eq!(err, PuppetError::Mocker(MockerError::AlreadyBound));
    }

    #[tokio::test]
    async fn test_start_stop_are_idempotent() {
        let puppet = puppet(1);
        puppet.mocker().use_behavior(Populate::new(2, 1));

        puppet.start().await.unwrap();
        puppet.start().await.unwrap();
        assert!(puppet.is_on());
        // Populate ran only once
        assert_eq!(puppet.contact_list().len(), 2);

        puppet.stop().await;
        puppet.stop().await;
        assert_eq!(puppet.state(), PuppetState::Off);
    }

    #[tokio::test]
    async fn test_start_announces_scan() {
        let puppet = puppet(1);
        let mut rx = puppet.subscribe();

        puppet.start().await.unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![PuppetEvent::Scan {
                qrcode: MOCK_QR_CODE.to_string(),
                status: ScanStatus::Waiting,
            }]
        );

        // A second start is ignored and announces nothing
        puppet.start().await.unwrap();
        assert!(drain(&mut rx).is_empty());
        puppet.stop().await;
    }

    #[tokio::test]
    async fn test_failed_start_leaves_puppet_off() {
        let puppet = puppet(1);
        puppet
            .mocker()
            .use_behavior(|_: &Mocker| -> puppet_mock_core::Result<CancelHandle> {
                Err(MockerError::behavior("broken", "nope"))
            });

        assert!(puppet.start().await.is_err());
        assert_eq!(puppet.state(), PuppetState::Off);
    }

    #[tokio::test]
    async fn test_login_tracks_self_before_listeners() {
        let puppet = puppet(2);
        let mut rx = puppet.subscribe();
        let user = puppet.mocker().create_contact().id().clone();

        assert!(!puppet.is_logged_in());
        puppet.login(&user).unwrap();
        assert_eq!(puppet.self_id(), Some(user.clone()));
        assert_eq!(drain(&mut rx), vec![PuppetEvent::Login { contact_id: user.clone() }]);

        puppet.logout().await.unwrap();
        assert_eq!(puppet.self_id(), None);
        assert_eq!(puppet.logout().await.unwrap_err(), PuppetError::NotLoggedIn);
    }

    #[test]
    fn test_login_unknown_contact_fails() {
        let puppet = puppet(2);
        let err = puppet.login(&ContactId::new("ghost")).unwrap_err();
        assert!(matches!(err, PuppetError::Mocker(MockerError::NotFound { .. })));
    }

    #[test]
    fn test_ding_answers_dong() {
        let puppet = puppet(3);
        let mut rx = puppet.subscribe();

        puppet.ding(Some("42")).unwrap();
        puppet.ding(None).unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![
                PuppetEvent::Dong { data: "42".into() },
                PuppetEvent::Dong { data: String::new() },
            ]
        );
    }

    #[test]
    fn test_message_send_text_is_self() {
        let puppet = puppet(4);
        let mocker = puppet.mocker();
        let user = mocker.create_contact();
        let friend = mocker.create_contact();

        let target = ConversationId::from(friend.id());
        assert_eq!(
            puppet.message_send_text(&target, "hi").unwrap_err(),
            PuppetError::NotLoggedIn
        );

        puppet.login(user.id()).unwrap();
        let id = puppet.message_send_text(&target, "hi").unwrap();
        let message = puppet.message_payload(&id).unwrap();
        assert!(puppet.is_self(&message));
        assert_eq!(message.text(), Some("hi"));

        // Incoming message from the friend
        let reply = friend.say(user.id(), "hello back");
        assert!(!puppet.is_self(&puppet.message_payload(&reply).unwrap()));
    }

    #[test]
    fn test_message_send_text_unknown_conversation() {
        let puppet = puppet(4);
        let user = puppet.mocker().create_contact();
        puppet.login(user.id()).unwrap();

        let err = puppet
            .message_send_text(&ConversationId::new("nowhere"), "hi")
            .unwrap_err();
        assert!(matches!(err, PuppetError::Mocker(MockerError::NotFound { .. })));
    }

    #[test]
    fn test_room_queries_and_mutations() {
        let puppet = puppet(5);
        let mocker = puppet.mocker();
        let [a, b, c] = [mocker.create_contact(), mocker.create_contact(), mocker.create_contact()];
        let room = mocker
            .create_room_with(RoomOverrides::new().member_ids(vec![a.id().clone(), b.id().clone()]))
            .unwrap();

        assert_eq!(puppet.room_list(), vec![room.id().clone()]);
        assert_eq!(
            puppet.room_member_list(room.id()).unwrap(),
            vec![a.id().clone(), b.id().clone()]
        );

        puppet.room_add(room.id(), c.id()).unwrap();
        puppet.room_del(room.id(), a.id()).unwrap();
        assert_eq!(
            puppet.room_member_list(room.id()).unwrap(),
            vec![b.id().clone(), c.id().clone()]
        );

        puppet.set_room_topic(room.id(), "Renamed").unwrap();
        assert_eq!(puppet.room_topic(room.id()).unwrap(), "Renamed");
        assert!(puppet.room_add(&RoomId::new("nope"), c.id()).is_err());
    }

    #[test]
    fn test_contact_alias_and_self_name() {
        let puppet = puppet(6);
        let user = puppet.mocker().create_contact();

        assert_eq!(puppet.contact_alias(user.id()).unwrap(), None);
        puppet.set_contact_alias(user.id(), "buddy").unwrap();
        assert_eq!(puppet.contact_alias(user.id()).unwrap().as_deref(), Some("buddy"));

        assert_eq!(puppet.contact_self_name("Me").unwrap_err(), PuppetError::NotLoggedIn);
        puppet.login(user.id()).unwrap();
        puppet.contact_self_name("Me").unwrap();
        assert_eq!(puppet.contact_payload(user.id()).unwrap().name, "Me");
    }
}

//! Ready-made scenario for framework tests.
//!
//! Three contacts (`user`, `mike`, `mary`), `user` logged in, one room
//! holding all three and one message from `mike` into that room.

use crate::error::{PuppetError, Result};
use crate::puppet::PuppetMock;

use puppet_mock_core::{Contact, MessagePayload, Mocker, PuppetEvent, Room, RoomOverrides};
use puppet_mock_env::{ContactId, MessageId, RoomId};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

/// How long the fixture waits for the seed message to come back.
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// A started puppet with a logged-in user and some traffic.
pub struct Fixture {
    pub puppet: PuppetMock,
    /// The message `mike` sent into `room` during setup
    pub message: MessagePayload,

    user: ContactId,
    mike: ContactId,
    mary: ContactId,
    room: RoomId,

    events: broadcast::Receiver<PuppetEvent>,
    mo_list: Vec<MessageId>,
    mt_list: Vec<MessageId>,
}

impl Fixture {
    /// Builds the scenario on a fresh production-context mocker.
    pub async fn new() -> Result<Self> {
        Self::with_mocker(Mocker::default()).await
    }

    /// Builds the scenario on `mocker`, which must not be bound yet.
    pub async fn with_mocker(mocker: Mocker) -> Result<Self> {
        let puppet = PuppetMock::new(mocker)?;
        puppet.start().await?;

        let (user, mike, mary, room) = {
            let mocker = puppet.mocker();
            let user = mocker.create_contact().id().clone();
            let mike = mocker.create_contact().id().clone();
            let mary = mocker.create_contact().id().clone();

            puppet.login(&user)?;
            let room = mocker
                .create_room_with(RoomOverrides::new().member_ids(vec![
                    user.clone(),
                    mike.clone(),
                    mary.clone(),
                ]))?
                .id()
                .clone();
            (user, mike, mary, room)
        };

        let mut events = puppet.subscribe();
        puppet.mocker().contact(mike.clone()).say(&room, "mock text");
        let message_id = next_message(&mut events).await?;
        let message = puppet.message_payload(&message_id)?;
        debug!("Fixture ready, seed message {}", message.id);

        Ok(Self {
            puppet,
            message,
            user,
            mike,
            mary,
            room,
            events,
            mo_list: Vec::new(),
            mt_list: Vec::new(),
        })
    }

    pub fn mocker(&self) -> &Mocker {
        self.puppet.mocker()
    }

    pub fn user(&self) -> Contact<'_> {
        self.mocker().contact(self.user.clone())
    }

    pub fn mike(&self) -> Contact<'_> {
        self.mocker().contact(self.mike.clone())
    }

    pub fn mary(&self) -> Contact<'_> {
        self.mocker().contact(self.mary.clone())
    }

    pub fn room(&self) -> Room<'_> {
        self.mocker().room(self.room.clone())
    }

    /// Messages sent by the logged-in user since setup finished.
    pub fn mo_list(&mut self) -> &[MessageId] {
        self.record();
        &self.mo_list
    }

    /// Messages received from others since setup finished.
    pub fn mt_list(&mut self) -> &[MessageId] {
        self.record();
        &self.mt_list
    }

    /// Sorts every pending `message` event into the MO or MT list.
    pub fn record(&mut self) {
        loop {
            let message_id = match self.events.try_recv() {
                Ok(PuppetEvent::Message { message_id }) => message_id,
                Ok(_) => continue,
                Err(TryRecvError::Lagged(n)) => {
                    warn!("Fixture lagged, {} events lost", n);
                    continue;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            };

            match self.puppet.message_payload(&message_id) {
                Ok(payload) if self.puppet.is_self(&payload) => self.mo_list.push(message_id),
                Ok(_) => self.mt_list.push(message_id),
                Err(e) => warn!("Fixture skipping {}: {}", message_id, e),
            }
        }
    }

    /// Stops the puppet.
    pub async fn shutdown(self) {
        self.puppet.stop().await;
    }
}

/// Waits for the next `message` event, skipping other events.
pub async fn next_message(events: &mut broadcast::Receiver<PuppetEvent>) -> Result<MessageId> {
    loop {
        let received = tokio::time::timeout(MESSAGE_TIMEOUT, events.recv())
            .await
            .map_err(|_| PuppetError::Timeout("message"))?;

        match received {
            Ok(PuppetEvent::Message { message_id }) => return Ok(message_id),
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => warn!("event receiver lagged by {}", n),
            Err(RecvError::Closed) => {
                return Err(PuppetError::EventChannel("event bus closed".into()))
            }
        }
    }
}

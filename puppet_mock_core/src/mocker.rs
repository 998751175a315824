//! The Mocker - root of the simulation.

use crate::behavior::{Behavior, BehaviorRegistry};
use crate::binding::Binding;
use crate::error::{MockerError, PayloadKind, Result};
use crate::events::{PuppetEvent, PuppetSink, ScanStatus};
use crate::factory::EntityFactory;
use crate::handle::{Contact, Conversation, Room};
use crate::payload::{
    ContactOverrides, ContactPayload, MessageBody, MessagePayload, RoomOverrides, RoomPayload,
};
use crate::store::{PayloadStore, StoreStats};

use puppet_mock_env::{
    ContactId, ConversationId, MessageId, MockerContext, MockerId, RoomId, SimContext,
    TokioContext,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use tracing::{debug, error, info, trace, warn};

struct MockerInner {
    id: MockerId,
    context: Arc<dyn MockerContext>,
    factory: EntityFactory,
    store: Mutex<PayloadStore>,
    behaviors: Mutex<BehaviorRegistry>,
    puppet: RwLock<Binding<Arc<dyn PuppetSink>>>,
    /// Highest timestamp handed out, keeps message time non-decreasing
    last_timestamp: AtomicU64,
}

/// In-memory contact/room/message universe plus the behaviors that
/// animate it.
///
/// Cloning is cheap and yields another handle to the same universe.
/// All operations are synchronous; each runs as one atomic step against
/// the payload store.
///
/// # Example
///
/// ```ignore
/// let mocker = Mocker::seeded(42);
/// let [alice, bob] = [mocker.create_contact(), mocker.create_contact()];
/// let room = mocker.create_room();
/// bob.say(&room, "hi all");
/// ```
#[derive(Clone)]
pub struct Mocker {
    inner: Arc<MockerInner>,
}

/// Non-owning reference to a [`Mocker`], held by behavior timers.
#[derive(Clone)]
pub struct WeakMocker {
    inner: Weak<MockerInner>,
}

impl WeakMocker {
    pub fn upgrade(&self) -> Option<Mocker> {
        self.inner.upgrade().map(|inner| Mocker { inner })
    }
}

impl Mocker {
    /// Creates a mocker drawing time and randomness from `context`.
    pub fn new(context: Arc<dyn MockerContext>) -> Self {
        let id = MockerId::new();
        debug!("Mocker<{}> constructor() seed={}", id, context.seed());

        Self {
            inner: Arc::new(MockerInner {
                id,
                factory: EntityFactory::new(Arc::clone(&context)),
                context,
                store: Mutex::new(PayloadStore::new()),
                behaviors: Mutex::new(BehaviorRegistry::new()),
                puppet: RwLock::new(Binding::Unbound),
                last_timestamp: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a mocker on a deterministic simulation context.
    pub fn seeded(seed: u64) -> Self {
        Self::new(SimContext::shared(seed))
    }

    pub fn id(&self) -> MockerId {
        self.inner.id
    }

    pub fn context(&self) -> Arc<dyn MockerContext> {
        Arc::clone(&self.inner.context)
    }

    pub fn downgrade(&self) -> WeakMocker {
        WeakMocker {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// True if both handles refer to the same universe.
    pub fn ptr_eq(&self, other: &Mocker) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn store(&self) -> MutexGuard<'_, PayloadStore> {
        self.inner.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry(&self) -> MutexGuard<'_, BehaviorRegistry> {
        self.inner
            .behaviors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ─────────────────────────────────────────────────────────────
    // Puppet binding
    // ─────────────────────────────────────────────────────────────

    /// Binds the adapter's event sink. Allowed exactly once.
    pub fn bind_puppet(&self, sink: Arc<dyn PuppetSink>) -> Result<()> {
        let mut binding = self
            .inner
            .puppet
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        binding.bind(sink)?;
        debug!("{} bind_puppet()", self);
        Ok(())
    }

    /// The bound sink. Fails with `NotBound` before `bind_puppet()`.
    pub fn puppet(&self) -> Result<Arc<dyn PuppetSink>> {
        let binding = self
            .inner
            .puppet
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        binding.get().map(Arc::clone)
    }

    pub fn is_bound(&self) -> bool {
        self.puppet().is_ok()
    }

    /// Delivers to the bound sink; dropped when nothing is bound.
    fn emit(&self, event: PuppetEvent) {
        match self.puppet() {
            Ok(sink) => sink.emit(event),
            Err(_) => trace!("{} dropping {} event: no puppet bound", self, event.name()),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Behaviors & lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Registers a behavior. Takes effect on the next `start()`.
    pub fn use_behavior(&self, behavior: impl Behavior + 'static) {
        self.use_behaviors([Arc::new(behavior) as Arc<dyn Behavior>]);
    }

    /// Registers several behaviors, keeping their order.
    pub fn use_behaviors(&self, behaviors: impl IntoIterator<Item = Arc<dyn Behavior>>) {
        let mut registry = self.registry();
        let before = registry.registered_count();
        for behavior in behaviors {
            registry.register(behavior);
        }
        debug!("{} use({})", self, registry.registered_count() - before);
    }

    /// Installs every registered behavior in registration order.
    ///
    /// An install failure aborts the remaining installs; behaviors already
    /// started keep running until `stop()`. Calling `start()` again
    /// without `stop()` installs every behavior a second time.
    pub fn start(&self) -> Result<()> {
        let (behaviors, already_active) = {
            let registry = self.registry();
            (registry.registered(), registry.active_count())
        };
        info!("{} start() with {} behaviors", self, behaviors.len());
        if already_active > 0 {
            warn!(
                "{} start() while {} behaviors are still active, installing again",
                self, already_active
            );
        }

        for behavior in behaviors {
            debug!("{} start() enabling behavior {}", self, behavior.name());
            let handle = behavior.install(self).map_err(|e| {
                error!("{} start() behavior {} failed: {}", self, behavior.name(), e);
                e
            })?;
            self.registry().activate(behavior, handle);
        }
        Ok(())
    }

    /// Cancels every active behavior, in install order. A second call is a
    /// no-op.
    pub fn stop(&self) {
        let active = self.registry().drain_active();
        info!("{} stop() cleaning {} behaviors", self, active.len());

        for (n, (behavior, handle)) in active.into_iter().enumerate() {
            debug!("{} stop() cleaning behavior #{} {}", self, n, behavior.name());
            handle.cancel();
        }
    }

    /// Names of the currently active behaviors.
    pub fn active_behaviors(&self) -> Vec<String> {
        self.registry().active_names()
    }

    // ─────────────────────────────────────────────────────────────
    // Random selection
    // ─────────────────────────────────────────────────────────────

    /// Uniform pick over known contacts; `None` when there are none.
    pub fn random_contact(&self) -> Option<Contact<'_>> {
        let id = {
            let store = self.store();
            let index = self.inner.context.random_index(store.contacts.len());
            store.contacts.id_at(index).cloned()
        }?;
        trace!("{} randomContact() -> {}", self, id);
        Some(Contact::new(self, id))
    }

    /// Uniform pick over known rooms; `None` when there are none.
    pub fn random_room(&self) -> Option<Room<'_>> {
        let id = {
            let store = self.store();
            let index = self.inner.context.random_index(store.rooms.len());
            store.rooms.id_at(index).cloned()
        }?;
        trace!("{} randomRoom() -> {}", self, id);
        Some(Room::new(self, id))
    }

    /// Picks a contact with probability C/(C+R), otherwise a room, then a
    /// uniform member of that category.
    pub fn random_conversation(&self) -> Result<Conversation<'_>> {
        let store = self.store();
        let contacts = store.contacts.len();
        let total = contacts + store.rooms.len();
        if total == 0 {
            return Err(MockerError::NoEntities);
        }

        let ctx = &self.inner.context;
        let conversation = if ctx.chance(contacts as f64 / total as f64) {
            let index = ctx.random_index(contacts);
            store
                .contacts
                .id_at(index)
                .cloned()
                .map(|id| Conversation::Contact(Contact::new(self, id)))
        } else {
            let index = ctx.random_index(store.rooms.len());
            store
                .rooms
                .id_at(index)
                .cloned()
                .map(|id| Conversation::Room(Room::new(self, id)))
        };
        conversation.ok_or(MockerError::NoEntities)
    }

    // ─────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────

    pub fn scan(&self, qrcode: impl Into<String>, status: ScanStatus) -> Result<()> {
        let qrcode = qrcode.into();
        debug!("{} scan({}, {:?})", self, qrcode, status);
        self.puppet()?.emit(PuppetEvent::Scan { qrcode, status });
        Ok(())
    }

    pub fn login(&self, user: &Contact<'_>) -> Result<()> {
        debug!("{} login({})", self, user);
        self.puppet()?.emit(PuppetEvent::Login {
            contact_id: user.id().clone(),
        });
        Ok(())
    }

    pub fn logout(&self, user: &Contact<'_>) -> Result<()> {
        debug!("{} logout({})", self, user);
        self.puppet()?.emit(PuppetEvent::Logout {
            contact_id: user.id().clone(),
        });
        Ok(())
    }

    pub fn ding(&self, data: impl Into<String>) -> Result<()> {
        let data = data.into();
        trace!("{} ding({})", self, data);
        self.puppet()?.emit(PuppetEvent::Dong { data });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Creators
    // ─────────────────────────────────────────────────────────────

    pub fn create_contact(&self) -> Contact<'_> {
        self.create_contact_with(ContactOverrides::default())
    }

    /// Generates a contact, merges `overrides` over it and stores it.
    pub fn create_contact_with(&self, overrides: ContactOverrides) -> Contact<'_> {
        debug!("{} createContact({:?})", self, overrides);

        let id = {
            let mut store = self.store();
            let payload = overrides.apply(self.inner.factory.generate_contact_payload(&store.contacts));
            let id = payload.id.clone();
            store.contacts.set(id.clone(), payload);
            id
        };
        Contact::new(self, id)
    }

    pub fn create_contacts(&self, num: usize) -> Vec<Contact<'_>> {
        debug!("{} createContacts({})", self, num);
        (0..num).map(|_| self.create_contact()).collect()
    }

    /// Creates a room whose members are drawn from the contacts known
    /// right now.
    pub fn create_room(&self) -> Room<'_> {
        let id = {
            let mut store = self.store();
            let pool = store.contacts.ids();
            let payload = self.inner.factory.generate_room_payload(&pool, &store.rooms);
            let id = payload.id.clone();
            store.rooms.set(id.clone(), payload);
            id
        };
        debug!("{} createRoom() -> {}", self, id);
        Room::new(self, id)
    }

    /// Like [`create_room`](Self::create_room) with explicit overrides.
    ///
    /// Every member id and the owner id must name a stored contact.
    pub fn create_room_with(&self, overrides: RoomOverrides) -> Result<Room<'_>> {
        debug!("{} createRoom({:?})", self, overrides);

        let id = {
            let mut store = self.store();
            let pool = store.contacts.ids();
            let default = self.inner.factory.generate_room_payload(&pool, &store.rooms);
            let payload = overrides.apply(default);

            if let Some(unknown) = payload
                .member_ids
                .iter()
                .chain(payload.owner_id.iter())
                .find(|id| !store.contacts.contains(id))
            {
                return Err(MockerError::not_found(PayloadKind::Contact, unknown));
            }

            let id = payload.id.clone();
            store.rooms.set(id.clone(), payload);
            id
        };
        Ok(Room::new(self, id))
    }

    pub fn create_rooms(&self, num: usize) -> Vec<Room<'_>> {
        debug!("{} createRooms({})", self, num);
        (0..num).map(|_| self.create_room()).collect()
    }

    /// Stores a message and emits a `message` event for it.
    pub(crate) fn post_message(
        &self,
        from_id: ContactId,
        to_id: ConversationId,
        body: MessageBody,
        mention_ids: Vec<ContactId>,
    ) -> MessageId {
        let timestamp = self.next_timestamp();
        let id = {
            let mut store = self.store();
            let id = self.inner.factory.generate_message_id(&store.messages);
            let payload = MessagePayload {
                id: id.clone(),
                from_id,
                to_id,
                timestamp,
                body,
                mention_ids,
            };
            trace!("{} message {:?}", self, payload);
            store.messages.set(id.clone(), payload);
            id
        };

        self.emit(PuppetEvent::Message {
            message_id: id.clone(),
        });
        id
    }

    fn next_timestamp(&self) -> u64 {
        let now = self.inner.context.timestamp_ms();
        let prev = self.inner.last_timestamp.fetch_max(now, Ordering::SeqCst);
        now.max(prev)
    }

    // ─────────────────────────────────────────────────────────────
    // Handles & lookups
    // ─────────────────────────────────────────────────────────────

    /// Handle for `id`, unchecked.
    pub fn contact(&self, id: ContactId) -> Contact<'_> {
        Contact::new(self, id)
    }

    /// Handle for `id`, unchecked.
    pub fn room(&self, id: RoomId) -> Room<'_> {
        Room::new(self, id)
    }

    /// Parses `id` and returns a handle if the contact is stored.
    pub fn find_contact(&self, id: &str) -> Result<Contact<'_>> {
        let id: ContactId = id.parse()?;
        if !self.store().contacts.contains(&id) {
            return Err(MockerError::not_found(PayloadKind::Contact, id));
        }
        Ok(Contact::new(self, id))
    }

    /// Parses `id` and returns a handle if the room is stored.
    pub fn find_room(&self, id: &str) -> Result<Room<'_>> {
        let id: RoomId = id.parse()?;
        if !self.store().rooms.contains(&id) {
            return Err(MockerError::not_found(PayloadKind::Room, id));
        }
        Ok(Room::new(self, id))
    }

    /// Resolves a conversation id against contacts first, then rooms.
    pub fn conversation(&self, id: &ConversationId) -> Result<Conversation<'_>> {
        let store = self.store();
        let contact_id = ContactId::new(id.as_str());
        if store.contacts.contains(&contact_id) {
            return Ok(Conversation::Contact(Contact::new(self, contact_id)));
        }
        let room_id = RoomId::new(id.as_str());
        if store.rooms.contains(&room_id) {
            return Ok(Conversation::Room(Room::new(self, room_id)));
        }
        Err(MockerError::not_found(PayloadKind::Conversation, id))
    }

    pub fn contact_ids(&self) -> Vec<ContactId> {
        self.store().contacts.ids()
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.store().rooms.ids()
    }

    pub fn message_ids(&self) -> Vec<MessageId> {
        self.store().messages.ids()
    }

    pub fn stats(&self) -> StoreStats {
        self.store().stats()
    }

    // ─────────────────────────────────────────────────────────────
    // Payload accessors
    // ─────────────────────────────────────────────────────────────

    pub fn contact_payload(&self, id: &ContactId) -> Result<ContactPayload> {
        trace!("{} contactPayload({})", self, id);
        self.store().contacts.get(id)
    }

    pub fn set_contact_payload(&self, id: ContactId, payload: ContactPayload) {
        trace!("{} contactPayload({}, {:?})", self, id, payload);
        self.store().contacts.set(id, payload);
    }

    pub fn room_payload(&self, id: &RoomId) -> Result<RoomPayload> {
        trace!("{} roomPayload({})", self, id);
        self.store().rooms.get(id)
    }

    pub fn set_room_payload(&self, id: RoomId, payload: RoomPayload) {
        trace!("{} roomPayload({}, {:?})", self, id, payload);
        self.store().rooms.set(id, payload);
    }

    pub fn message_payload(&self, id: &MessageId) -> Result<MessagePayload> {
        trace!("{} messagePayload({})", self, id);
        self.store().messages.get(id)
    }

    pub fn set_message_payload(&self, id: MessageId, payload: MessagePayload) {
        trace!("{} messagePayload({}, {:?})", self, id, payload);
        self.store().messages.set(id, payload);
    }
}

impl Default for Mocker {
    fn default() -> Self {
        Self::new(TokioContext::shared())
    }
}

impl std::fmt::Display for Mocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Mocker<{}>", self.inner.id)
    }
}

impl std::fmt::Debug for Mocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mocker")
            .field("id", &self.inner.id)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{recurring, CancelHandle, Populate, RandomTalk};
    use crate::events::EventBus;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn bound(mocker: &Mocker) -> EventBus {
        let bus = EventBus::default();
        mocker.bind_puppet(Arc::new(bus.clone())).unwrap();
        bus
    }

    /// Behavior that counts installs and cancels.
    fn counting(installs: &Arc<AtomicUsize>, cancels: &Arc<AtomicUsize>) -> impl Behavior {
        let installs = Arc::clone(installs);
        let cancels = Arc::clone(cancels);
        move |_: &Mocker| -> Result<CancelHandle> {
            installs.fetch_add(1, Ordering::SeqCst);
            let cancels = Arc::clone(&cancels);
            Ok(CancelHandle::from_fn(move || {
                cancels.fetch_add(1, Ordering::SeqCst);
            }))
        }
    }

    #[test]
    fn test_created_contact_is_stored_under_its_id() {
        let mocker = Mocker::seeded(42);
        for _ in 0..20 {
            let before = mocker.contact_ids();
            let contact = mocker.create_contact();

            assert!(!before.contains(contact.id()));
            let payload = mocker.contact_payload(contact.id()).unwrap();
            assert_eq!(&payload.id, contact.id());
        }
        assert_eq!(mocker.stats().contacts, 20);
    }

    #[test]
    fn test_contact_overrides_are_merged() {
        let mocker = Mocker::seeded(1);
        let contact = mocker.create_contact_with(
            ContactOverrides::new().id("logined_user_id").name("Mock User"),
        );

        assert_eq!(contact.id().as_str(), "logined_user_id");
        assert_eq!(contact.name().unwrap(), "Mock User");
        assert!(contact.avatar().unwrap().starts_with("mock://avatar/"));
        assert_eq!(contact.to_string(), "Contact<logined_user_id>");
    }

    #[test]
    fn test_room_members_drawn_from_current_contacts() {
        let mocker = Mocker::seeded(7);
        let contacts: Vec<ContactId> = mocker
            .create_contacts(5)
            .iter()
            .map(|c| c.id().clone())
            .collect();

        for room in mocker.create_rooms(10) {
            let members = room.member_ids().unwrap();
            assert!(!members.is_empty());
            assert!(members.iter().all(|id| contacts.contains(id)));
            assert!(!room.topic().unwrap().is_empty());
        }
    }

    #[test]
    fn test_room_without_contacts_is_empty() {
        let mocker = Mocker::seeded(7);
        let room = mocker.create_room();

        assert!(room.member_ids().unwrap().is_empty());
        assert!(room.owner().unwrap().is_none());
    }

    #[test]
    fn test_room_override_with_unknown_member_fails() {
        let mocker = Mocker::seeded(7);
        let alice = mocker.create_contact();

        let err = mocker
            .create_room_with(RoomOverrides::new().member_ids(vec![
                alice.id().clone(),
                ContactId::new("ghost"),
            ]))
            .unwrap_err();
        assert_eq!(err, MockerError::not_found(PayloadKind::Contact, "ghost"));
        assert_eq!(mocker.stats().rooms, 0);
    }

    #[test]
    fn test_random_picks_on_empty_universe() {
        let mocker = Mocker::seeded(3);
        assert!(mocker.random_contact().is_none());
        assert!(mocker.random_room().is_none());
        assert_eq!(mocker.random_conversation().unwrap_err(), MockerError::NoEntities);
    }

    #[test]
    fn test_random_conversation_with_only_rooms() {
        let mocker = Mocker::seeded(3);
        mocker.create_rooms(2);
        for _ in 0..50 {
            assert!(mocker.random_conversation().unwrap().as_room().is_some());
        }
    }

    #[test]
    fn test_random_conversation_frequency_tracks_population() {
        let mocker = Mocker::seeded(11);
        mocker.create_contacts(30);
        mocker.create_rooms(10);

        let trials = 4000;
        let contact_picks = (0..trials)
            .filter(|_| mocker.random_conversation().unwrap().as_contact().is_some())
            .count();
        let freq = contact_picks as f64 / trials as f64;
        assert!((freq - 0.75).abs() < 0.05, "contact frequency {}", freq);
    }

    #[test]
    fn test_seeded_mockers_generate_same_universe() {
        let a = Mocker::seeded(42);
        let b = Mocker::seeded(42);

        let pa: Vec<ContactPayload> = a
            .create_contacts(3)
            .iter()
            .map(|c| c.payload().unwrap())
            .collect();
        let pb: Vec<ContactPayload> = b
            .create_contacts(3)
            .iter()
            .map(|c| c.payload().unwrap())
            .collect();
        assert_eq!(pa, pb);
        assert_eq!(a.create_room().payload().unwrap(), b.create_room().payload().unwrap());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_behavior_lifecycle_runs_cleanup_once() {
        let mocker = Mocker::seeded(1);
        let installs = Arc::new(AtomicUsize::new(0));
        let cancels = Arc::new(AtomicUsize::new(0));
        mocker.use_behavior(counting(&installs, &cancels));

        // Registration alone does nothing
        assert_eq!(installs.load(Ordering::SeqCst), 0);

        mocker.start().unwrap();
        assert_eq!(installs.load(Ordering::SeqCst), 1);
        assert_eq!(mocker.active_behaviors().len(), 1);

        mocker.stop();
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        assert!(mocker.active_behaviors().is_empty());

        // Second stop is a no-op
        mocker.stop();
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mocker = Mocker::seeded(1);
        mocker.stop();
        mocker.stop();
        assert!(mocker.active_behaviors().is_empty());
    }

    #[test]
    fn test_double_start_installs_twice() {
        let mocker = Mocker::seeded(1);
        let installs = Arc::new(AtomicUsize::new(0));
        let cancels = Arc::new(AtomicUsize::new(0));
        mocker.use_behavior(counting(&installs, &cancels));

        mocker.start().unwrap();
        mocker.start().unwrap();
        assert_eq!(installs.load(Ordering::SeqCst), 2);
        assert_eq!(mocker.active_behaviors().len(), 2);

        mocker.stop();
        assert_eq!(cancels.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failing_behavior_aborts_start_without_rollback() {
        let mocker = Mocker::seeded(1);
        let installs = Arc::new(AtomicUsize::new(0));
        let cancels = Arc::new(AtomicUsize::new(0));
        let later = Arc::new(AtomicUsize::new(0));

        mocker.use_behavior(counting(&installs, &cancels));
        mocker.use_behavior(|_: &Mocker| -> Result<CancelHandle> {
            Err(MockerError::behavior("broken", "boom"))
        });
        mocker.use_behavior(counting(&later, &cancels));

        let err = mocker.start().unwrap_err();
        assert_eq!(err, MockerError::behavior("broken", "boom"));
        assert_eq!(installs.load(Ordering::SeqCst), 1);
        assert_eq!(later.load(Ordering::SeqCst), 0);
        assert_eq!(mocker.active_behaviors().len(), 1);

        mocker.stop();
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_populate_behavior_creates_entities() {
        let mocker = Mocker::seeded(9);
        mocker.use_behavior(Populate::new(4, 2));
        mocker.start().unwrap();

        assert_eq!(mocker.stats(), StoreStats { contacts: 4, rooms: 2, messages: 0 });
        assert_eq!(mocker.active_behaviors(), vec!["populate".to_string()]);
    }

    #[test]
    fn test_binding_is_write_once() {
        let mocker = Mocker::seeded(1);
        assert!(matches!(mocker.puppet(), Err(MockerError::NotBound)));

        bound(&mocker);
        assert!(mocker.is_bound());
        let again = mocker.bind_puppet(Arc::new(EventBus::default()));
        assert_eq!(again.unwrap_err(), MockerError::AlreadyBound);
    }

    #[test]
    fn test_lifecycle_events_need_binding() {
        let mocker = Mocker::seeded(1);
        let user = mocker.create_contact();

        assert_eq!(mocker.login(&user).unwrap_err(), MockerError::NotBound);
        assert_eq!(mocker.scan("qr", ScanStatus::Waiting).unwrap_err(), MockerError::NotBound);
    }

    #[test]
    fn test_say_without_binding_still_stores() {
        let mocker = Mocker::seeded(1);
        let alice = mocker.create_contact();
        let bob = mocker.create_contact();

        let id = alice.say(&bob, "hi");
        let message = mocker.message_payload(&id).unwrap();
        assert_eq!(&message.from_id, alice.id());
        assert_eq!(message.to_id, *bob.id());
    }

    #[test]
    fn test_events_reach_bound_bus() {
        let mocker = Mocker::seeded(1);
        let bus = bound(&mocker);
        let mut rx = bus.subscribe();

        let user = mocker.create_contact();
        let room = mocker.create_room();

        mocker.scan("https://not-exist.com", ScanStatus::Waiting).unwrap();
        mocker.login(&user).unwrap();
        let message_id = user.say(&room, "hello room");
        mocker.ding("ping").unwrap();
        mocker.logout(&user).unwrap();

        let events: Vec<PuppetEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![
                PuppetEvent::Scan {
                    qrcode: "https://not-exist.com".into(),
                    status: ScanStatus::Waiting
                },
                PuppetEvent::Login { contact_id: user.id().clone() },
                PuppetEvent::Message { message_id },
                PuppetEvent::Dong { data: "ping".into() },
                PuppetEvent::Logout { contact_id: user.id().clone() },
            ]
        );
    }

    #[test]
    fn test_message_timestamps_non_decreasing() {
        let ctx = SimContext::shared(5);
        let mocker = Mocker::new(ctx.clone());
        let alice = mocker.create_contact();

        let first = alice.say(alice.id(), "one");
        ctx.advance_time(Duration::from_millis(10));
        let second = alice.say(alice.id(), "two");

        let t1 = mocker.message_payload(&first).unwrap().timestamp;
        let t2 = mocker.message_payload(&second).unwrap().timestamp;
        assert_eq!(t2 - t1, 10);
    }

    #[test]
    fn test_find_contact_errors() {
        let mocker = Mocker::seeded(1);
        let alice = mocker.create_contact();

        assert_eq!(mocker.find_contact(alice.id().as_str()).unwrap(), alice);
        assert!(matches!(mocker.find_contact("  "), Err(MockerError::Env(_))));
        assert!(matches!(
            mocker.find_room("nope"),
            Err(MockerError::NotFound { kind: PayloadKind::Room, .. })
        ));
    }

    #[test]
    fn test_conversation_resolves_both_kinds() {
        let mocker = Mocker::seeded(1);
        let alice = mocker.create_contact();
        let room = mocker.create_room();

        assert!(mocker.conversation(&alice.id().into()).unwrap().as_contact().is_some());
        assert!(mocker.conversation(&room.id().into()).unwrap().as_room().is_some());
        let err = mocker.conversation(&ConversationId::new("nope")).unwrap_err();
        assert_eq!(
            err,
            MockerError::NotFound {
                kind: PayloadKind::Conversation,
                id: "nope".to_string()
            }
        );
        assert_eq!(err.to_string(), "no conversation payload found for id nope");
    }

    #[test]
    fn test_handle_reads_fail_for_unstored_payload() {
        let mocker = Mocker::seeded(1);
        let orphan = mocker.contact(ContactId::new("never-stored"));
        assert!(matches!(
            orphan.name(),
            Err(MockerError::NotFound { kind: PayloadKind::Contact, .. })
        ));
    }

    #[test]
    fn test_room_mutations_write_through() {
        let mocker = Mocker::seeded(2);
        let alice = mocker.create_contact();
        let room = mocker.create_room();
        let bob = mocker.create_contact();

        room.add(&bob).unwrap();
        room.add(&bob).unwrap();
        assert!(room.has(&bob).unwrap());
        assert_eq!(room.member_ids().unwrap().iter().filter(|id| *id == bob.id()).count(), 1);

        room.remove(&alice).unwrap();
        assert!(!room.has(&alice).unwrap());
        assert!(room.owner().unwrap().is_none());

        room.set_topic("Renamed").unwrap();
        room.set_topic("").unwrap();
        assert_eq!(room.topic().unwrap(), "Renamed");
        assert_eq!(room.to_string(), format!("Room<{}>", room.id()));
    }

    #[test]
    fn test_contact_update_keeps_id() {
        let mocker = Mocker::seeded(2);
        let alice = mocker.create_contact();

        alice
            .update(ContactOverrides::new().id("other").alias("ally"))
            .unwrap();
        let payload = alice.payload().unwrap();
        assert_eq!(&payload.id, alice.id());
        assert_eq!(payload.alias.as_deref(), Some("ally"));
    }

    #[tokio::test]
    async fn test_random_talk_stops_producing_after_stop() {
        let mocker = Mocker::new(TokioContext::shared());
        let bus = bound(&mocker);
        let mut rx = bus.subscribe();

        mocker.create_contacts(3);
        mocker.create_rooms(1);
        mocker.use_behavior(RandomTalk::new(Duration::from_millis(5)));
        mocker.start().unwrap();

        // Wait for real traffic
        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no message within timeout")
            .unwrap();
        assert_eq!(first.name(), "message");

        mocker.stop();
        let after_stop = mocker.stats().messages;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mocker.stats().messages, after_stop);
        assert!(mocker.active_behaviors().is_empty());
    }

    #[tokio::test]
    async fn test_timer_exits_when_mocker_dropped() {
        let mocker = Mocker::new(TokioContext::shared());
        mocker.use_behavior(RandomTalk::new(Duration::from_millis(5)));
        mocker.start().unwrap();

        let weak = mocker.downgrade();
        drop(mocker);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_seeded_random_talk_quiet_until_clock_advances() {
        let ctx = SimContext::shared(1);
        let mocker = Mocker::new(ctx.clone());
        mocker.create_contacts(3);
        mocker.use_behavior(RandomTalk::new(Duration::from_secs(5)));
        mocker.start().unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(mocker.stats().messages, 0);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(mocker.stats().messages, 1);
        assert_eq!(ctx.now(), Duration::from_secs(5));

        mocker.stop();
        ctx.advance_time(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(mocker.stats().messages, 1);
    }

    #[tokio::test]
    async fn test_tick_may_stop_its_own_mocker() {
        let mocker = Mocker::new(TokioContext::shared());
        let ticks = Arc::new(AtomicUsize::new(0));
        let t = Arc::clone(&ticks);
        mocker.use_behavior(move |m: &Mocker| -> Result<CancelHandle> {
            let t = Arc::clone(&t);
            recurring(m, "self_stop", Duration::from_millis(5), move |m| {
                t.fetch_add(1, Ordering::SeqCst);
                m.stop();
            })
        });
        mocker.start().unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while !mocker.active_behaviors().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("tick calling stop() should not deadlock");

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        // The timer's lock is free again
        mocker.stop();
    }
}

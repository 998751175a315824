//! End-to-end checks of the ready-made fixture.

use puppet_mock::{next_message, Fixture, PuppetError, PuppetState};
use puppet_mock_core::{Mocker, PuppetEvent};
use puppet_mock_env::ConversationId;

#[tokio::test]
async fn test_fixture_seed_message() {
    let fixture = Fixture::new().await.unwrap();

    let message = &fixture.message;
    assert_eq!(&message.from_id, fixture.mike().id());
    assert_eq!(message.to_id, *fixture.room().id());
    assert_eq!(message.text(), Some("mock text"));
    assert!(!fixture.puppet.is_self(message));

    assert_eq!(fixture.puppet.self_id().as_ref(), Some(fixture.user().id()));
    assert!(fixture.room().has(&fixture.user()).unwrap());
    assert!(fixture.room().has(&fixture.mike()).unwrap());
    assert!(fixture.room().has(&fixture.mary()).unwrap());

    fixture.shutdown().await;
}

#[tokio::test]
async fn test_fixture_sorts_mo_and_mt() {
    let mut fixture = Fixture::new().await.unwrap();
    assert!(fixture.mo_list().is_empty());
    assert!(fixture.mt_list().is_empty());

    let from_mary = fixture.mary().say(fixture.user().id(), "are you there?");
    let room_id = ConversationId::from(fixture.room().id());
    let from_user = fixture.puppet.message_send_text(&room_id, "yes").unwrap();

    assert_eq!(fixture.mt_list(), &[from_mary]);
    assert_eq!(fixture.mo_list(), &[from_user]);

    fixture.shutdown().await;
}

#[tokio::test]
async fn test_fixture_room_traffic_reaches_new_listener() {
    let fixture = Fixture::new().await.unwrap();
    let mut events = fixture.puppet.subscribe();

    let sent = fixture.mary().say(&fixture.room(), "lunch?");
    assert_eq!(next_message(&mut events).await.unwrap(), sent);

    let payload = fixture.puppet.message_payload(&sent).unwrap();
    assert_eq!(&payload.from_id, fixture.mary().id());
    fixture.shutdown().await;
}

#[tokio::test]
async fn test_fixture_logout_then_shutdown() {
    let fixture = Fixture::new().await.unwrap();
    let mut events = fixture.puppet.subscribe();

    fixture.puppet.logout().await.unwrap();
    assert_eq!(
        events.try_recv().unwrap(),
        PuppetEvent::Logout {
            contact_id: fixture.user().id().clone()
        }
    );
    assert_eq!(fixture.puppet.logout().await.unwrap_err(), PuppetError::NotLoggedIn);

    assert_eq!(fixture.puppet.state(), PuppetState::On);
    fixture.shutdown().await;
}

#[tokio::test]
async fn test_fixture_rejects_bound_mocker() {
    let mocker = Mocker::seeded(3);
    let _puppet = puppet_mock::PuppetMock::new(mocker.clone()).unwrap();

    assert!(Fixture::with_mocker(mocker).await.is_err());
}

#[tokio::test]
async fn test_seeded_fixtures_match() {
    let a = Fixture::with_mocker(Mocker::seeded(99)).await.unwrap();
    let b = Fixture::with_mocker(Mocker::seeded(99)).await.unwrap();

    assert_eq!(a.user().payload().unwrap(), b.user().payload().unwrap());
    assert_eq!(a.room().payload().unwrap(), b.room().payload().unwrap());
    assert_eq!(a.message, b.message);
}

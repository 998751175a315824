//! Simulation runner - drives a populated mocker and tallies its traffic.

use crate::error::Result;
use crate::puppet::{PuppetMock, PuppetMockOptions};

use puppet_mock_core::{Mocker, MockerContext, MockerError, Populate, PuppetEvent, RandomTalk};
use puppet_mock_env::{ConversationId, SimContext, TokioContext};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

/// How the clock advances during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Virtual clock stepped by the runner, fully reproducible per seed
    Virtual,
    /// Wall clock with behavior timers running as tokio tasks
    Realtime,
}

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism (virtual mode only)
    pub seed: u64,

    /// Contacts created on start
    pub contacts: usize,

    /// Rooms created on start
    pub rooms: usize,

    /// Total simulated time
    pub duration: Duration,

    /// Period of the random chatter
    pub interval: Duration,

    /// The logged-in user replies to every n-th incoming message (0 = never)
    pub reply_every: usize,

    pub mode: RunMode,

    pub event_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            contacts: 10,
            rooms: 3,
            duration: Duration::from_secs(60),
            interval: Duration::from_secs(1),
            reply_every: 5,
            mode: RunMode::Virtual,
            event_capacity: PuppetMockOptions::default().event_capacity,
        }
    }
}

/// Summary of a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub mode: RunMode,
    pub ticks: u64,
    pub contacts: usize,
    pub rooms: usize,
    pub messages_stored: usize,
    pub message_events: u64,
    /// Messages sent by the logged-in user
    pub mobile_originated: u64,
    /// Messages received by the logged-in user's client
    pub mobile_terminated: u64,
    /// Events lost because the receiver fell behind
    pub lagged: u64,
}

#[derive(Default)]
struct Tally {
    message_events: u64,
    mobile_originated: u64,
    mobile_terminated: u64,
    incoming_since_reply: usize,
    lagged: u64,
}

impl Tally {
    /// Drains pending events. Returns the conversation to answer into,
    /// if a reply is due.
    fn drain(
        &mut self,
        puppet: &PuppetMock,
        events: &mut broadcast::Receiver<PuppetEvent>,
        reply_every: usize,
    ) -> Option<ConversationId> {
        let mut reply_to = None;
        loop {
            let message_id = match events.try_recv() {
                Ok(PuppetEvent::Message { message_id }) => message_id,
                Ok(_) => continue,
                Err(TryRecvError::Lagged(n)) => {
                    warn!("Runner lagged, {} events lost", n);
                    self.lagged += n;
                    continue;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            };
            self.message_events += 1;

            let Ok(message) = puppet.message_payload(&message_id) else {
                continue;
            };
            if puppet.is_self(&message) {
                self.mobile_originated += 1;
                continue;
            }

            self.mobile_terminated += 1;
            self.incoming_since_reply += 1;
            if reply_every > 0 && self.incoming_since_reply >= reply_every {
                self.incoming_since_reply = 0;
                // Answer the room, or the sender of a direct message
                reply_to = Some(match puppet.room_payload(&message.to_id.as_str().into()) {
                    Ok(_) => message.to_id,
                    Err(_) => message.from_id.into(),
                });
            }
        }
        reply_to
    }
}

/// Runs one simulation with `config`.
pub async fn run(config: &SimConfig) -> Result<SimulationReport> {
    info!(
        "Starting {:?} simulation (seed={}, contacts={}, rooms={})",
        config.mode, config.seed, config.contacts, config.rooms
    );
    match config.mode {
        RunMode::Virtual => run_virtual(config).await,
        RunMode::Realtime => run_realtime(config).await,
    }
}

fn setup(mocker: Mocker, config: &SimConfig) -> Result<PuppetMock> {
    let puppet = PuppetMock::with_options(
        mocker,
        PuppetMockOptions {
            event_capacity: config.event_capacity,
        },
    )?;
    puppet
        .mocker()
        .use_behavior(Populate::new(config.contacts, config.rooms));
    Ok(puppet)
}

/// Logs in the first contact, if there is one.
fn login_first(puppet: &PuppetMock) -> Result<()> {
    match puppet.contact_list().first() {
        Some(user) => puppet.login(user),
        None => {
            warn!("No contacts, running without a logged-in user");
            Ok(())
        }
    }
}

fn reply(puppet: &PuppetMock, conversation: &ConversationId) {
    if let Err(e) = puppet.message_send_text(conversation, "got it") {
        debug!("Reply into {} skipped: {}", conversation, e);
    }
}

/// Steps a virtual clock one chatter period at a time.
async fn run_virtual(config: &SimConfig) -> Result<SimulationReport> {
    if config.interval.is_zero() {
        return Err(MockerError::behavior("random_talk", "interval must be non-zero").into());
    }

    let context = SimContext::shared(config.seed);
    let puppet = setup(Mocker::new(context.clone()), config)?;
    let mut events = puppet.subscribe();
    puppet.start().await?;
    login_first(&puppet)?;

    let lines = RandomTalk::default().lines;
    let target_ticks = (config.duration.as_nanos() / config.interval.as_nanos()) as u64;
    let mut tally = Tally::default();

    for tick in 0..target_ticks {
        context.advance_time(config.interval);
        RandomTalk::talk(puppet.mocker(), &lines);

        if let Some(conversation) = tally.drain(&puppet, &mut events, config.reply_every) {
            reply(&puppet, &conversation);
        }

        if tick % 100 == 0 {
            debug!(
                "  t={:.1}s | messages={}",
                context.now().as_secs_f64(),
                puppet.mocker().stats().messages
            );
        }
    }
    tally.drain(&puppet, &mut events, 0);

    puppet.stop().await;
    Ok(report(config, &puppet, target_ticks, tally))
}

/// Lets the `RandomTalk` timer run on the wall clock for the duration.
async fn run_realtime(config: &SimConfig) -> Result<SimulationReport> {
    let context = TokioContext::shared();
    let puppet = setup(Mocker::new(context.clone()), config)?;
    puppet
        .mocker()
        .use_behavior(RandomTalk::new(config.interval));
    let mut events = puppet.subscribe();
    puppet.start().await?;
    login_first(&puppet)?;

    let mut tally = Tally::default();
    let mut ticks = 0;
    let deadline = context.now() + config.duration;

    while context.now() < deadline {
        let remaining = deadline.saturating_sub(context.now());
        context.sleep(remaining.min(config.interval)).await;
        ticks += 1;

        if let Some(conversation) = tally.drain(&puppet, &mut events, config.reply_every) {
            reply(&puppet, &conversation);
        }
    }

    puppet.stop().await;
    tally.drain(&puppet, &mut events, 0);
    Ok(report(config, &puppet, ticks, tally))
}

fn report(config: &SimConfig, puppet: &PuppetMock, ticks: u64, tally: Tally) -> SimulationReport {
    let stats = puppet.mocker().stats();
    let report = SimulationReport {
        seed: config.seed,
        mode: config.mode,
        ticks,
        contacts: stats.contacts,
        rooms: stats.rooms,
        messages_stored: stats.messages,
        message_events: tally.message_events,
        mobile_originated: tally.mobile_originated,
        mobile_terminated: tally.mobile_terminated,
        lagged: tally.lagged,
    };
    info!(
        "Simulation finished: {} messages over {} ticks",
        report.messages_stored, report.ticks
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn small(seed: u64) -> SimConfig {
        SimConfig {
            seed,
            contacts: 5,
            rooms: 2,
            duration: Duration::from_secs(30),
            interval: Duration::from_secs(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_virtual_run_counts_every_message() {
        let report = run(&small(42)).await.unwrap();

        assert_eq!(report.ticks, 30);
        assert_eq!(report.contacts, 5);
        assert_eq!(report.rooms, 2);
        assert_eq!(report.lagged, 0);
        assert_eq!(report.message_events as usize, report.messages_stored);
        assert_eq!(
            report.message_events,
            report.mobile_originated + report.mobile_terminated
        );
        // One chatter line per tick plus the user's replies
        assert!(report.messages_stored >= 30);
    }

    #[tokio::test]
    async fn test_empty_universe_is_quiet() {
        let config = SimConfig {
            contacts: 0,
            rooms: 0,
            ..small(7)
        };
        let report = run(&config).await.unwrap();
        assert_eq!(report.messages_stored, 0);
        assert_eq!(report.message_events, 0);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let config = SimConfig {
            interval: Duration::ZERO,
            ..small(1)
        };
        assert!(run(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_realtime_run_produces_traffic() {
        let config = SimConfig {
            duration: Duration::from_millis(100),
            interval: Duration::from_millis(5),
            mode: RunMode::Realtime,
            ..small(0)
        };
        let report = run(&config).await.unwrap();

        assert!(report.ticks > 0);
        assert!(report.messages_stored > 0);
        assert_eq!(report.message_events as usize, report.messages_stored);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_virtual_runs_are_reproducible(seed in any::<u64>()) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let config = SimConfig {
                duration: Duration::from_secs(10),
                ..small(seed)
            };

            let a = rt.block_on(run(&config)).unwrap();
            let b = rt.block_on(run(&config)).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}

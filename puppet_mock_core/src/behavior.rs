//! Pluggable simulated activity.
//!
//! A [`Behavior`] is installed by `Mocker::start()` and hands back a
//! [`CancelHandle`]; `Mocker::stop()` consumes every handle in install
//! order. Behaviors only use the mocker's public surface (create, say,
//! random picks), so all event emission stays inside the mocker.
//!
//! # Timer cancellation
//!
//! ```text
//!   timer task                         stop()
//!   ──────────                         ──────
//!   sleep(period)
//!   lock(ticking) ──┐                  active = false
//!   active? tick    │ held             lock(ticking)  (waits)
//!   unlock ─────────┘                  abort task
//!   active? -> false -> exit
//! ```
//!
//! A tick runs while holding its timer's tick lock, so once `cancel()`
//! returns no tick can start or be mid-flight. A tick may cancel its own
//! timer (for example by calling `Mocker::stop()`): the cancel then skips
//! the tick lock and the loop exits as soon as that tick returns.

use crate::error::{MockerError, Result};
use crate::mocker::Mocker;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A unit of autonomous simulated activity.
pub trait Behavior: Send + Sync {
    /// Name used in logs and install errors.
    fn name(&self) -> &str;

    /// Starts the activity and returns the handle that stops it.
    fn install(&self, mocker: &Mocker) -> Result<CancelHandle>;
}

impl<F> Behavior for F
where
    F: Fn(&Mocker) -> Result<CancelHandle> + Send + Sync,
{
    fn name(&self) -> &str {
        std::any::type_name::<F>()
    }

    fn install(&self, mocker: &Mocker) -> Result<CancelHandle> {
        self(mocker)
    }
}

enum CancelKind {
    Noop,
    Custom(Box<dyn FnOnce() + Send>),
    Timer {
        active: Arc<AtomicBool>,
        ticking: Arc<Mutex<()>>,
        task: JoinHandle<()>,
    },
}

thread_local! {
    /// Activity flag of the timer whose tick is running on this thread.
    static CURRENT_TICK: Cell<*const AtomicBool> = const { Cell::new(std::ptr::null()) };
}

/// Marks a timer's tick as running on the current thread.
struct TickScope {
    previous: *const AtomicBool,
}

impl TickScope {
    fn enter(active: &Arc<AtomicBool>) -> Self {
        let previous = CURRENT_TICK.with(|current| current.replace(Arc::as_ptr(active)));
        Self { previous }
    }

    fn is_current(active: &Arc<AtomicBool>) -> bool {
        CURRENT_TICK.with(|current| std::ptr::eq(current.get(), Arc::as_ptr(active)))
    }
}

impl Drop for TickScope {
    fn drop(&mut self) {
        CURRENT_TICK.with(|current| current.set(self.previous));
    }
}

/// Stops one installed behavior. Consumed on cancel, so it runs once.
pub struct CancelHandle {
    kind: CancelKind,
}

impl CancelHandle {
    /// Handle for behaviors with nothing to undo.
    pub fn noop() -> Self {
        Self { kind: CancelKind::Noop }
    }

    /// Handle that runs `f` on cancel.
    pub fn from_fn(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            kind: CancelKind::Custom(Box::new(f)),
        }
    }

    pub fn cancel(self) {
        match self.kind {
            CancelKind::Noop => {}
            CancelKind::Custom(f) => f(),
            CancelKind::Timer {
                active,
                ticking,
                task,
            } => {
                active.store(false, Ordering::SeqCst);
                // Called from inside our own tick: the lock is already ours
                if !TickScope::is_current(&active) {
                    drop(ticking.lock().unwrap_or_else(PoisonError::into_inner));
                }
                task.abort();
            }
        }
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            CancelKind::Noop => "noop",
            CancelKind::Custom(_) => "custom",
            CancelKind::Timer { .. } => "timer",
        };
        write!(f, "CancelHandle({})", kind)
    }
}

/// Spawns a task that runs `tick` every `period` until cancelled.
///
/// The task sleeps through the mocker's context, holds only a weak
/// reference to the mocker and exits once the mocker is dropped. Must be
/// called from within a tokio runtime.
///
/// On a `SimContext` the task only wakes when the virtual clock is
/// advanced by `period`, so nothing fires until the caller steps time.
pub fn recurring<F>(mocker: &Mocker, name: &str, period: Duration, mut tick: F) -> Result<CancelHandle>
where
    F: FnMut(&Mocker) + Send + 'static,
{
    if tokio::runtime::Handle::try_current().is_err() {
        return Err(MockerError::behavior(name, "recurring timer needs a tokio runtime"));
    }

    let active = Arc::new(AtomicBool::new(true));
    let ticking = Arc::new(Mutex::new(()));
    let (flag, tick_lock) = (Arc::clone(&active), Arc::clone(&ticking));
    let weak = mocker.downgrade();
    let context = mocker.context();
    let name = name.to_string();

    let task = tokio::spawn(async move {
        loop {
            context.sleep(period).await;

            let Some(mocker) = weak.upgrade() else {
                trace!("{}: mocker dropped, timer exits", name);
                break;
            };

            // The guard must not live across the next await
            let still_active = {
                let _ticking = tick_lock.lock().unwrap_or_else(PoisonError::into_inner);
                if flag.load(Ordering::SeqCst) {
                    let _scope = TickScope::enter(&flag);
                    tick(&mocker);
                }
                flag.load(Ordering::SeqCst)
            };
            if !still_active {
                break;
            }
        }
    });

    Ok(CancelHandle {
        kind: CancelKind::Timer {
            active,
            ticking,
            task,
        },
    })
}

/// Registered behaviors and the handles of the started ones.
#[derive(Default)]
pub struct BehaviorRegistry {
    registered: Vec<Arc<dyn Behavior>>,
    active: Vec<(Arc<dyn Behavior>, CancelHandle)>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, behavior: Arc<dyn Behavior>) {
        self.registered.push(behavior);
    }

    /// Registered behaviors in registration order.
    pub fn registered(&self) -> Vec<Arc<dyn Behavior>> {
        self.registered.clone()
    }

    pub fn activate(&mut self, behavior: Arc<dyn Behavior>, handle: CancelHandle) {
        self.active.push((behavior, handle));
    }

    /// Takes every active pair, leaving the active set empty.
    pub fn drain_active(&mut self) -> Vec<(Arc<dyn Behavior>, CancelHandle)> {
        std::mem::take(&mut self.active)
    }

    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Names of the active behaviors, in install order.
    pub fn active_names(&self) -> Vec<String> {
        self.active
            .iter()
            .map(|(behavior, _)| behavior.name().to_string())
            .collect()
    }
}

/// Default lines for [`RandomTalk`].
const DEFAULT_LINES: &[&str] = &[
    "hello",
    "how are you?",
    "see you tomorrow",
    "did you get my file?",
    "lol",
    "on my way",
    "sounds good",
    "who is in for lunch?",
];

/// Periodically has a random contact say a random line into a random
/// conversation.
#[derive(Debug, Clone)]
pub struct RandomTalk {
    pub interval: Duration,
    pub lines: Vec<String>,
}

impl RandomTalk {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    pub fn with_lines(mut self, lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.lines = lines.into_iter().map(Into::into).collect();
        self
    }

    /// One round of chatter. Does nothing while the universe is empty.
    pub fn talk(mocker: &Mocker, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        let Some(speaker) = mocker.random_contact() else {
            return;
        };
        let Ok(conversation) = mocker.random_conversation() else {
            return;
        };

        let line = &lines[mocker.context().random_index(lines.len())];
        let message_id = speaker.say(&conversation, line.as_str());
        debug!("RandomTalk: {} -> {} ({})", speaker, conversation, message_id);
    }
}

impl Default for RandomTalk {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            lines: DEFAULT_LINES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Behavior for RandomTalk {
    fn name(&self) -> &str {
        "random_talk"
    }

    fn install(&self, mocker: &Mocker) -> Result<CancelHandle> {
        if self.interval.is_zero() {
            return Err(MockerError::behavior(self.name(), "interval must be non-zero"));
        }
        let lines = self.lines.clone();
        recurring(mocker, self.name(), self.interval, move |m| {
            RandomTalk::talk(m, &lines)
        })
    }
}

/// Creates a batch of contacts and rooms when started.
#[derive(Debug, Clone, Copy, Default)]
pub struct Populate {
    pub contacts: usize,
    pub rooms: usize,
}

impl Populate {
    pub fn new(contacts: usize, rooms: usize) -> Self {
        Self { contacts, rooms }
    }
}

impl Behavior for Populate {
    fn name(&self) -> &str {
        "populate"
    }

    fn install(&self, mocker: &Mocker) -> Result<CancelHandle> {
        mocker.create_contacts(self.contacts);
        mocker.create_rooms(self.rooms);
        Ok(CancelHandle::noop())
    }
}

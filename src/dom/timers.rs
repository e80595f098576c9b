use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;
use std::task::Waker;
use std::time::{Duration, Instant};

use futures_util::task::AtomicWaker;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Nominal length of one animation frame.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u32);

impl TimerId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Timeout,
    AnimationFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockMode {
    /// Time only moves when the owner calls `advance`.
    #[default]
    Virtual,
    /// Timers are tokio sleeps on the current runtime.
    Realtime,
}

type TimerCallback = Box<dyn FnOnce()>;

struct TimerEntry {
    kind: TimerKind,
    deadline: Duration,
    callback: TimerCallback,
    task: Option<JoinHandle<()>>,
}

enum Clock {
    Virtual {
        now: Cell<Duration>,
    },
    Realtime {
        handle: Handle,
        start: Instant,
        fired_rx: RefCell<UnboundedReceiver<u32>>,
        fired_tx: UnboundedSender<u32>,
    },
}

/// One-shot timers and animation frames for a document.
///
/// Callbacks never run while the timer table is borrowed, so a callback may
/// freely schedule or clear other timers.
pub struct TimerManager {
    clock: Clock,
    next_id: Cell<u32>,
    timers: RefCell<HashMap<u32, TimerEntry>>,
    waker: Arc<AtomicWaker>,
}

impl TimerManager {
    pub fn new(mode: ClockMode) -> Self {
        let clock = match mode {
            ClockMode::Virtual => Clock::Virtual {
                now: Cell::new(Duration::ZERO),
            },
            ClockMode::Realtime => {
                let (fired_tx, fired_rx) = unbounded_channel();
                Clock::Realtime {
                    handle: Handle::current(),
                    start: Instant::now(),
                    fired_rx: RefCell::new(fired_rx),
                    fired_tx,
                }
            }
        };
        Self {
            clock,
            next_id: Cell::new(1),
            timers: RefCell::new(HashMap::new()),
            waker: Arc::new(AtomicWaker::new()),
        }
    }

    fn next_id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1).max(1));
        id
    }

    pub fn now(&self) -> Duration {
        match &self.clock {
            Clock::Virtual { now } => now.get(),
            Clock::Realtime { start, .. } => start.elapsed(),
        }
    }

    pub fn register_waker(&self, waker: &Waker) {
        self.waker.register(waker);
    }

    pub fn has_active_timers(&self) -> bool {
        !self.timers.borrow().is_empty()
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.borrow().contains_key(&id.0)
    }

    pub fn register_timer(
        &self,
        delay: Duration,
        kind: TimerKind,
        callback: TimerCallback,
    ) -> TimerId {
        let id = self.next_id();
        let duration = if kind == TimerKind::AnimationFrame && delay.is_zero() {
            FRAME_INTERVAL
        } else {
            delay
        };
        let deadline = self.now() + duration;

        let task = match &self.clock {
            Clock::Virtual { .. } => None,
            Clock::Realtime {
                handle, fired_tx, ..
            } => {
                let tx = fired_tx.clone();
                let waker = Arc::clone(&self.waker);
                Some(handle.spawn(async move {
                    sleep(duration).await;
                    if tx.send(id).is_ok() {
                        waker.wake();
                    }
                }))
            }
        };

        self.timers.borrow_mut().insert(
            id,
            TimerEntry {
                kind,
                deadline,
                callback,
                task,
            },
        );
        tracing::trace!(target: "timers", id, ?kind, ?duration, "timer registered");
        self.waker.wake();
        TimerId(id)
    }

    pub fn clear_timer(&self, id: TimerId) {
        if let Some(entry) = self.timers.borrow_mut().remove(&id.0) {
            if let Some(task) = entry.task {
                task.abort();
            }
            tracing::trace!(target: "timers", id = id.0, kind = ?entry.kind, "timer cleared");
        }
        self.waker.wake();
    }

    /// Earliest pending deadline on the virtual clock.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers
            .borrow()
            .values()
            .map(|entry| entry.deadline)
            .min()
    }

    /// Moves the virtual clock forward. Realtime clocks ignore this.
    pub fn set_now(&self, instant: Duration) {
        if let Clock::Virtual { now } = &self.clock {
            if instant > now.get() {
                now.set(instant);
            }
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.clock, Clock::Virtual { .. })
    }

    /// Runs the single earliest timer that is due. Returns whether one ran.
    pub fn run_next_due(&self) -> bool {
        let Some(id) = self.next_due_id() else {
            return false;
        };

        let entry = self.timers.borrow_mut().remove(&id);
        let Some(entry) = entry else {
            return false;
        };
        if let Some(task) = entry.task {
            task.abort();
        }
        tracing::trace!(target: "timers", id, kind = ?entry.kind, "timer fired");
        (entry.callback)();
        true
    }

    fn next_due_id(&self) -> Option<u32> {
        match &self.clock {
            Clock::Virtual { now } => {
                let now = now.get();
                self.timers
                    .borrow()
                    .iter()
                    .filter(|(_, entry)| entry.deadline <= now)
                    .min_by_key(|(id, entry)| (entry.deadline, **id))
                    .map(|(id, _)| *id)
            }
            Clock::Realtime { fired_rx, .. } => {
                let mut rx = fired_rx.borrow_mut();
                // Cleared timers may still report in; skip them.
                while let Ok(id) = rx.try_recv() {
                    if self.timers.borrow().contains_key(&id) {
                        return Some(id);
                    }
                }
                None
            }
        }
    }

    pub fn clear_all(&self) {
        let mut timers = self.timers.borrow_mut();
        for (_, entry) in timers.drain() {
            if let Some(task) = entry.task {
                task.abort();
            }
        }
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> TimerCallback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let make = move |label: &'static str| -> TimerCallback {
            let sink = Rc::clone(&sink);
            Box::new(move || sink.borrow_mut().push(label))
        };
        (log, make)
    }

    #[test]
    fn virtual_timers_fire_in_deadline_order() {
        let timers = TimerManager::new(ClockMode::Virtual);
        let (log, make) = recorder();
        timers.register_timer(Duration::from_millis(20), TimerKind::Timeout, make("late"));
        timers.register_timer(Duration::from_millis(5), TimerKind::Timeout, make("early"));

        assert!(!timers.run_next_due());
        timers.set_now(Duration::from_millis(30));
        while timers.run_next_due() {}

        assert_eq!(*log.borrow(), vec!["early", "late"]);
        assert!(!timers.has_active_timers());
    }

    #[test]
    fn cleared_timer_never_fires() {
        let timers = TimerManager::new(ClockMode::Virtual);
        let (log, make) = recorder();
        let id = timers.register_timer(Duration::from_millis(5), TimerKind::Timeout, make("x"));
        timers.clear_timer(id);
        timers.clear_timer(id);
        timers.set_now(Duration::from_millis(10));
        assert!(!timers.run_next_due());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn animation_frame_defaults_to_frame_interval() {
        let timers = TimerManager::new(ClockMode::Virtual);
        let (_, make) = recorder();
        timers.register_timer(Duration::ZERO, TimerKind::AnimationFrame, make("frame"));
        assert_eq!(timers.next_deadline(), Some(FRAME_INTERVAL));
    }
}

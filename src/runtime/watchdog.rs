use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, trace};

use super::host::Host;
use crate::dom::TimerId;

/// How long a batch with no connected components waits before declaring
/// the app loaded anyway.
pub const APP_LOAD_GRACE: Duration = Duration::from_millis(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppLoadReason {
    /// The first root component finished loading.
    Natural,
    /// The grace period elapsed with nothing connected.
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchdogState {
    Idle,
    Armed(TimerId),
    Fired(AppLoadReason),
}

pub type AppLoadSubscriber = Rc<dyn Fn(AppLoadReason)>;

/// One-shot app-load signal with a cancellable fallback timer.
pub struct AppLoadWatchdog {
    state: Cell<WatchdogState>,
    subscribers: RefCell<Vec<AppLoadSubscriber>>,
}

impl Default for AppLoadWatchdog {
    fn default() -> Self {
        Self {
            state: Cell::new(WatchdogState::Idle),
            subscribers: RefCell::new(Vec::new()),
        }
    }
}

impl AppLoadWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the fallback timer. Does nothing once armed or fired.
    pub fn arm(&self, host: &dyn Host, on_timeout: Box<dyn FnOnce()>) -> bool {
        if self.state.get() != WatchdogState::Idle {
            return false;
        }
        let id = host.set_timeout(APP_LOAD_GRACE, on_timeout);
        trace!(target: "bootstrap", timer = id.as_u32(), "app-load fallback armed");
        self.state.set(WatchdogState::Armed(id));
        true
    }

    /// Clears a pending fallback timer. Safe to call in any state.
    pub fn cancel(&self, host: &dyn Host) -> bool {
        match self.state.get() {
            WatchdogState::Armed(id) => {
                host.clear_timeout(id);
                self.state.set(WatchdogState::Idle);
                trace!(target: "bootstrap", timer = id.as_u32(), "app-load fallback cancelled");
                true
            }
            _ => false,
        }
    }

    /// Delivers the signal. Only the first call returns true and notifies
    /// subscribers.
    pub fn fire(&self, host: &dyn Host, reason: AppLoadReason) -> bool {
        match self.state.get() {
            WatchdogState::Fired(_) => return false,
            WatchdogState::Armed(id) => host.clear_timeout(id),
            WatchdogState::Idle => {}
        }
        self.state.set(WatchdogState::Fired(reason));
        debug!(target: "bootstrap", ?reason, "app loaded");
        let subscribers = self.subscribers.borrow().clone();
        for subscriber in subscribers {
            subscriber(reason);
        }
        true
    }

    pub fn fired(&self) -> Option<AppLoadReason> {
        match self.state.get() {
            WatchdogState::Fired(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state.get(), WatchdogState::Armed(_))
    }

    /// Registers `subscriber`; it runs immediately if the signal already fired.
    pub fn subscribe(&self, subscriber: AppLoadSubscriber) {
        if let Some(reason) = self.fired() {
            subscriber(reason);
            return;
        }
        self.subscribers.borrow_mut().push(subscriber);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, DocumentConfig};

    #[test]
    fn timeout_fires_once() {
        let document = Document::new(DocumentConfig::default());
        let watchdog = Rc::new(AppLoadWatchdog::new());
        let count = Rc::new(Cell::new(0));
        let seen = Rc::clone(&count);
        watchdog.subscribe(Rc::new(move |_| seen.set(seen.get() + 1)));

        let target = Rc::clone(&watchdog);
        let host = Rc::clone(&document);
        assert!(watchdog.arm(
            &*document,
            Box::new(move || {
                target.fire(&*host, AppLoadReason::Timeout);
            })
        ));
        document.advance(APP_LOAD_GRACE);
        assert_eq!(watchdog.fired(), Some(AppLoadReason::Timeout));
        assert!(!watchdog.fire(&*document, AppLoadReason::Natural));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn cancel_is_idempotent() {
        let document = Document::new(DocumentConfig::default());
        let watchdog = AppLoadWatchdog::new();
        assert!(!watchdog.cancel(&*document));
        watchdog.arm(&*document, Box::new(|| panic!("cancelled timer ran")));
        assert!(watchdog.cancel(&*document));
        assert!(!watchdog.cancel(&*document));
        document.advance(APP_LOAD_GRACE * 2);
        assert_eq!(watchdog.fired(), None);
    }

    #[test]
    fn natural_fire_clears_pending_timer() {
        let document = Document::new(DocumentConfig::default());
        let watchdog = AppLoadWatchdog::new();
        watchdog.arm(&*document, Box::new(|| panic!("timer should be cleared")));
        assert!(watchdog.fire(&*document, AppLoadReason::Natural));
        assert!(!document.has_pending_timers());
        document.advance(APP_LOAD_GRACE * 2);
        assert_eq!(watchdog.fired(), Some(AppLoadReason::Natural));
    }

    #[test]
    fn late_subscriber_sees_fired_reason() {
        let document = Document::new(DocumentConfig::default());
        let watchdog = AppLoadWatchdog::new();
        watchdog.fire(&*document, AppLoadReason::Natural);
        let seen = Rc::new(Cell::new(None));
        let sink = Rc::clone(&seen);
        watchdog.subscribe(Rc::new(move |reason| sink.set(Some(reason))));
        assert_eq!(seen.get(), Some(AppLoadReason::Natural));
    }
}

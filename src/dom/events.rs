use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::Value as JsonValue;

use super::element::ElementId;
use crate::meta::ListenerOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    Element(ElementId),
    Document,
    Window,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub detail: JsonValue,
    pub bubbles: bool,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: JsonValue::Null,
            bubbles: false,
        }
    }

    pub fn with_detail(mut self, detail: JsonValue) -> Self {
        self.detail = detail;
        self
    }

    pub fn bubbling(mut self) -> Self {
        self.bubbles = true;
        self
    }
}

pub type EventHandler = Rc<dyn Fn(&Event)>;

/// Where along the propagation path a handler is being looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListenerPhase {
    Capture,
    Target,
    Bubble,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: usize,
}

struct ListenerEntry {
    id: ListenerId,
    target: EventTarget,
    event_name: String,
    capture: bool,
    handler: EventHandler,
}

impl ListenerEntry {
    fn fires_in(&self, phase: ListenerPhase) -> bool {
        match phase {
            ListenerPhase::Capture => self.capture,
            ListenerPhase::Target => true,
            ListenerPhase::Bubble => !self.capture,
        }
    }
}

#[derive(Default)]
pub(crate) struct EventListeners {
    next_id: Cell<u64>,
    entries: RefCell<Vec<ListenerEntry>>,
}

impl EventListeners {
    pub(crate) fn add(
        &self,
        target: EventTarget,
        event_name: &str,
        options: ListenerOptions,
        handler: EventHandler,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.entries.borrow_mut().push(ListenerEntry {
            id,
            target,
            event_name: event_name.to_string(),
            capture: options.capture,
            handler,
        });
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    pub(crate) fn count(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Handlers on `target` for `event_name` that fire in `phase`, in
    /// registration order.
    pub(crate) fn handlers_for(
        &self,
        target: EventTarget,
        event_name: &str,
        phase: ListenerPhase,
    ) -> Vec<EventHandler> {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.target == target && entry.event_name == event_name)
            .filter(|entry| entry.fires_in(phase))
            .map(|entry| Rc::clone(&entry.handler))
            .collect()
    }
}

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use futures_util::future::{FutureExt, LocalBoxFuture, Shared};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::oneshot;

use super::component::Component;
use super::registrar::BootstrapBatch;
use crate::dom::{Element, ElementId, ElementInternals, Event};
use crate::meta::ComponentRuntimeMeta;

bitflags! {
    /// Lifecycle state of one component host.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HostFlags: u16 {
        const HAS_CONNECTED = 1 << 0;
        const HAS_RENDERED = 1 << 1;
        const IS_WAITING_FOR_CHILDREN = 1 << 2;
        const IS_CONSTRUCTING = 1 << 3;
        const IS_QUEUED_FOR_UPDATE = 1 << 4;
        const HAS_INITIALIZED = 1 << 5;
        const HAS_LOADED = 1 << 6;
        const IS_WATCH_READY = 1 << 7;
        const IS_LISTEN_READY = 1 << 8;
        const NEEDS_RERENDER = 1 << 9;
        const IS_ACTIVE_RENDER = 1 << 10;
        const IS_REFLECTING = 1 << 11;
        /// The implementation could not be loaded or constructed.
        const HAS_FAILED = 1 << 12;
    }
}

#[derive(Debug, Error)]
pub enum HostRefError {
    #[error("element {0} already has a host record")]
    DuplicateRegistration(ElementId),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadyError {
    #[error("component host was released before it finished loading")]
    Released,
}

/// Resolves once, the first time the component finishes loading.
pub type ReadyFuture = Shared<LocalBoxFuture<'static, Result<(), ReadyError>>>;

struct ReadySignal {
    resolver: Option<oneshot::Sender<()>>,
    future: ReadyFuture,
}

impl ReadySignal {
    fn new() -> Self {
        let (resolver, receiver) = oneshot::channel();
        let future = receiver
            .map(|result| result.map_err(|_| ReadyError::Released))
            .boxed_local()
            .shared();
        Self {
            resolver: Some(resolver),
            future,
        }
    }

    fn resolve(&mut self) -> bool {
        match self.resolver.take() {
            Some(resolver) => resolver.send(()).is_ok(),
            None => false,
        }
    }
}

pub(crate) type DetachListener = Box<dyn FnOnce()>;
pub(crate) type RenderCallback = Box<dyn FnOnce()>;

/// Private lifecycle record for one live component host.
pub struct HostRef {
    pub(crate) flags: HostFlags,
    pub(crate) meta: Rc<ComponentRuntimeMeta>,
    pub(crate) element: Weak<Element>,
    pub(crate) batch: Weak<BootstrapBatch>,
    pub(crate) instance: Option<Rc<dyn Component>>,
    pub(crate) internals: Option<Rc<ElementInternals>>,
    pub(crate) values: HashMap<String, JsonValue>,
    pub(crate) remove_listeners: Vec<DetachListener>,
    pub(crate) queued_events: Vec<(String, Event)>,
    pub(crate) ancestor_component: Option<Weak<Element>>,
    pub(crate) awaited_by_ancestor: bool,
    pub(crate) pending_children: usize,
    /// Children whose first update waits for this host's first render.
    pub(crate) render_callbacks: Vec<RenderCallback>,
    pub(crate) hmr_version: Option<String>,
    ready: ReadySignal,
}

impl HostRef {
    fn new(
        element: &Rc<Element>,
        meta: Rc<ComponentRuntimeMeta>,
        batch: Weak<BootstrapBatch>,
    ) -> Self {
        Self {
            flags: HostFlags::empty(),
            meta,
            element: Rc::downgrade(element),
            batch,
            instance: None,
            internals: None,
            values: HashMap::new(),
            remove_listeners: Vec::new(),
            queued_events: Vec::new(),
            ancestor_component: None,
            awaited_by_ancestor: false,
            pending_children: 0,
            render_callbacks: Vec::new(),
            hmr_version: None,
            ready: ReadySignal::new(),
        }
    }

    pub fn flags(&self) -> HostFlags {
        self.flags
    }

    pub fn meta(&self) -> &Rc<ComponentRuntimeMeta> {
        &self.meta
    }

    pub fn element(&self) -> Option<Rc<Element>> {
        self.element.upgrade()
    }

    pub fn instance(&self) -> Option<Rc<dyn Component>> {
        self.instance.clone()
    }

    pub fn value(&self, member: &str) -> Option<JsonValue> {
        self.values.get(member).cloned()
    }

    pub fn ancestor_component(&self) -> Option<Rc<Element>> {
        self.ancestor_component.as_ref().and_then(Weak::upgrade)
    }

    pub fn listener_count(&self) -> usize {
        self.remove_listeners.len()
    }

    pub fn hmr_version(&self) -> Option<&str> {
        self.hmr_version.as_deref()
    }

    pub fn on_ready(&self) -> ReadyFuture {
        self.ready.future.clone()
    }

    pub(crate) fn resolve_ready(&mut self) -> bool {
        self.ready.resolve()
    }
}

pub type SharedHostRef = Rc<RefCell<HostRef>>;

struct StoreEntry {
    element: Weak<Element>,
    host_ref: SharedHostRef,
}

/// Associates live elements with their host records without keeping the
/// elements alive.
#[derive(Default)]
pub struct HostRefStore {
    entries: RefCell<HashMap<ElementId, StoreEntry>>,
}

impl HostRefStore {
    pub fn register(
        &self,
        element: &Rc<Element>,
        meta: Rc<ComponentRuntimeMeta>,
        batch: Weak<BootstrapBatch>,
    ) -> Result<SharedHostRef, HostRefError> {
        self.prune();
        let mut entries = self.entries.borrow_mut();
        if entries.contains_key(&element.id()) {
            return Err(HostRefError::DuplicateRegistration(element.id()));
        }
        let host_ref = Rc::new(RefCell::new(HostRef::new(element, meta, batch)));
        entries.insert(
            element.id(),
            StoreEntry {
                element: Rc::downgrade(element),
                host_ref: Rc::clone(&host_ref),
            },
        );
        Ok(host_ref)
    }

    pub fn get(&self, element: &Element) -> Option<SharedHostRef> {
        self.entries
            .borrow()
            .get(&element.id())
            .filter(|entry| entry.element.strong_count() > 0)
            .map(|entry| Rc::clone(&entry.host_ref))
    }

    pub fn remove(&self, element: &Element) -> bool {
        self.entries.borrow_mut().remove(&element.id()).is_some()
    }

    /// Drops records whose element no longer exists.
    pub fn prune(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|_, entry| entry.element.strong_count() > 0);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|entry| entry.element.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, DocumentConfig};
    use crate::meta::{ComponentRuntimeMeta, Encapsulation};
    use futures_util::FutureExt as _;
    use std::collections::BTreeMap;

    fn meta() -> Rc<ComponentRuntimeMeta> {
        Rc::new(ComponentRuntimeMeta {
            tag_name: "x-store".to_string(),
            encapsulation: Encapsulation::None,
            form_associated: false,
            needs_shadow_shim: false,
            has_mode: false,
            members: BTreeMap::new(),
            listeners: Vec::new(),
            watchers: BTreeMap::new(),
            lazy_bundle_id: "store".to_string(),
        })
    }

    #[test]
    fn register_then_get_returns_same_record() {
        let document = Document::new(DocumentConfig::default());
        let store = HostRefStore::default();
        let element = document.create_element("x-store");
        let registered = store.register(&element, meta(), Weak::new()).expect("register");
        let fetched = store.get(&element).expect("lookup");
        assert!(Rc::ptr_eq(&registered, &fetched));
    }

    #[test]
    fn duplicate_registration_is_reported() {
        let document = Document::new(DocumentConfig::default());
        let store = HostRefStore::default();
        let element = document.create_element("x-store");
        store.register(&element, meta(), Weak::new()).expect("register");
        let err = store
            .register(&element, meta(), Weak::new())
            .err()
            .expect("duplicate");
        assert!(matches!(err, HostRefError::DuplicateRegistration(id) if id == element.id()));
    }

    #[test]
    fn remove_drops_association() {
        let document = Document::new(DocumentConfig::default());
        let store = HostRefStore::default();
        let element = document.create_element("x-store");
        store.register(&element, meta(), Weak::new()).expect("register");
        assert!(store.remove(&element));
        assert!(store.get(&element).is_none());
        assert!(!store.remove(&element));
    }

    #[test]
    fn store_does_not_keep_elements_alive() {
        let document = Document::new(DocumentConfig::default());
        let store = HostRefStore::default();
        let element = document.create_element("x-store");
        let weak = Rc::downgrade(&element);
        store.register(&element, meta(), Weak::new()).expect("register");
        drop(element);
        assert!(weak.upgrade().is_none());
        assert_eq!(store.len(), 0);
        assert_eq!(store.prune(), 1);
    }

    #[test]
    fn ready_signal_resolves_once() {
        let mut signal = ReadySignal::new();
        let early = signal.future.clone();
        assert!(early.clone().now_or_never().is_none());
        assert!(signal.resolve());
        assert!(!signal.resolve());
        assert_eq!(early.now_or_never(), Some(Ok(())));
        assert_eq!(signal.future.clone().now_or_never(), Some(Ok(())));
    }
}

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bitflags::bitflags;
use serde_json::Value as JsonValue;
use tracing::debug;
use url::Url;

use super::component::{BundleLoader, StaticBundleLoader};
use super::diagnostics::Diagnostics;
use super::host::Host;
use super::host_ref::{HostRefStore, ReadyFuture, SharedHostRef};
use super::lifecycle;
use super::registrar::{bootstrap_lazy, BootstrapBatch, BootstrapOptions};
use super::scheduler::{QueueMode, TaskQueue};
use super::RuntimeError;
use crate::dom::Element;
use crate::meta::Manifest;

bitflags! {
    /// Process-wide runtime state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PlatformFlags: u8 {
        const IS_TMP_DISCONNECTED = 1 << 0;
        const APP_LOADED = 1 << 1;
        const QUEUE_SYNC = 1 << 2;
    }
}

/// Values exposed to components through [`RuntimeContext::lookup`].
#[derive(Clone)]
pub enum ContextValue {
    ResourcesUrl(Url),
    Namespace(String),
    Flag(bool),
    Queue(Rc<TaskQueue>),
}

impl ContextValue {
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_url(&self) -> Option<&Url> {
        match self {
            Self::ResourcesUrl(url) => Some(url),
            _ => None,
        }
    }
}

pub struct RuntimeContextBuilder {
    host: Rc<dyn Host>,
    loader: Option<Rc<dyn BundleLoader>>,
    namespace: String,
    diagnostics: Option<Rc<Diagnostics>>,
}

impl RuntimeContextBuilder {
    pub fn loader(mut self, loader: Rc<dyn BundleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn diagnostics(mut self, diagnostics: Rc<Diagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn build(self) -> Rc<RuntimeContext> {
        let diagnostics = self.diagnostics.unwrap_or_default();
        let loader = self
            .loader
            .unwrap_or_else(|| Rc::new(StaticBundleLoader::new()));
        let queue = TaskQueue::new(Rc::clone(&self.host), Rc::clone(&diagnostics));
        let resources_url = self.host.base_uri().clone();
        Rc::new(RuntimeContext {
            host: self.host,
            loader,
            store: HostRefStore::default(),
            queue,
            diagnostics,
            namespace: self.namespace,
            flags: Cell::new(PlatformFlags::empty()),
            resources_url: RefCell::new(resources_url),
            hydrated_class: RefCell::new("hydrated".to_string()),
        })
    }
}

/// Explicitly constructed runtime state shared by every component host.
pub struct RuntimeContext {
    host: Rc<dyn Host>,
    loader: Rc<dyn BundleLoader>,
    store: HostRefStore,
    queue: Rc<TaskQueue>,
    diagnostics: Rc<Diagnostics>,
    namespace: String,
    flags: Cell<PlatformFlags>,
    resources_url: RefCell<Url>,
    hydrated_class: RefCell<String>,
}

impl RuntimeContext {
    pub fn builder(host: Rc<dyn Host>) -> RuntimeContextBuilder {
        RuntimeContextBuilder {
            host,
            loader: None,
            namespace: "app".to_string(),
            diagnostics: None,
        }
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.host
    }

    pub fn loader(&self) -> &Rc<dyn BundleLoader> {
        &self.loader
    }

    pub fn store(&self) -> &HostRefStore {
        &self.store
    }

    pub fn queue(&self) -> &Rc<TaskQueue> {
        &self.queue
    }

    pub fn diagnostics(&self) -> &Rc<Diagnostics> {
        &self.diagnostics
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn platform_flags(&self) -> PlatformFlags {
        self.flags.get()
    }

    pub(crate) fn insert_platform_flags(&self, flags: PlatformFlags) {
        self.flags.set(self.flags.get() | flags);
    }

    fn remove_platform_flags(&self, flags: PlatformFlags) {
        self.flags.set(self.flags.get() - flags);
    }

    pub fn resources_url(&self) -> Url {
        self.resources_url.borrow().clone()
    }

    pub fn hydrated_class(&self) -> String {
        self.hydrated_class.borrow().clone()
    }

    pub(crate) fn apply_options(&self, options: &BootstrapOptions) {
        let base = self.host.base_uri();
        let resources_url = match options.resources_url.as_deref() {
            Some(raw) => base.join(raw).unwrap_or_else(|_| base.clone()),
            None => base.clone(),
        };
        debug!(target: "bootstrap", %resources_url, "resolved resources url");
        *self.resources_url.borrow_mut() = resources_url;
        *self.hydrated_class.borrow_mut() = options.hydrated_class.clone();
        if options.sync_queue {
            self.queue.set_mode(QueueMode::Sync);
            self.insert_platform_flags(PlatformFlags::QUEUE_SYNC);
        }
    }

    /// Defines every component in `manifest` and starts the app-load
    /// watchdog. See [`bootstrap_lazy`].
    pub fn bootstrap(
        self: &Rc<Self>,
        manifest: &Manifest,
        options: BootstrapOptions,
    ) -> Rc<BootstrapBatch> {
        bootstrap_lazy(self, manifest, options)
    }

    pub fn host_ref(&self, element: &Element) -> Option<SharedHostRef> {
        self.store.get(element)
    }

    /// Future that resolves once `element` has finished its first load.
    pub fn component_on_ready(&self, element: &Element) -> Option<ReadyFuture> {
        self.store.get(element).map(|host_ref| host_ref.borrow().on_ready())
    }

    pub fn get_value(&self, element: &Element, member: &str) -> Option<JsonValue> {
        self.store.get(element)?.borrow().value(member)
    }

    pub fn set_value(
        self: &Rc<Self>,
        element: &Rc<Element>,
        member: &str,
        value: JsonValue,
    ) -> Result<(), RuntimeError> {
        lifecycle::set_value(self, element, member, value)
    }

    /// Schedules a re-render of an already rendered component.
    pub fn force_update(self: &Rc<Self>, element: &Rc<Element>) -> bool {
        lifecycle::force_update(self, element)
    }

    /// Runs `f` with connect and disconnect routines suppressed, so DOM
    /// moves inside it do not tear components down.
    pub fn with_tmp_disconnect<R>(&self, f: impl FnOnce() -> R) -> R {
        let already = self.flags.get().contains(PlatformFlags::IS_TMP_DISCONNECTED);
        self.insert_platform_flags(PlatformFlags::IS_TMP_DISCONNECTED);
        let result = f();
        if !already {
            self.remove_platform_flags(PlatformFlags::IS_TMP_DISCONNECTED);
        }
        result
    }

    /// Forgets the host record for `element`, detaching its listeners.
    pub fn release(self: &Rc<Self>, element: &Element) -> bool {
        lifecycle::release_host(self, element)
    }

    pub fn lookup(&self, name: &str) -> Option<ContextValue> {
        match name {
            "resourcesUrl" | "publicPath" => Some(ContextValue::ResourcesUrl(self.resources_url())),
            "namespace" => Some(ContextValue::Namespace(self.namespace.clone())),
            "isServer" | "isPrerender" => Some(ContextValue::Flag(false)),
            "isClient" => Some(ContextValue::Flag(true)),
            "queue" => Some(ContextValue::Queue(Rc::clone(&self.queue))),
            _ => None,
        }
    }
}

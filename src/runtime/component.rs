use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use futures_util::future::{self, FutureExt, LocalBoxFuture};
use serde_json::Value as JsonValue;
use thiserror::Error;
use url::Url;

use super::context::RuntimeContext;
use super::lifecycle;
use super::scheduler::TaskQueue;
use super::RuntimeError;
use crate::dom::{DispatchOutcome, Element, ElementInternals, Event, EventTarget};
use crate::meta::ComponentRuntimeMeta;

/// User-level component implementation behind a lazily loaded element.
///
/// Every hook is optional except `render`. Errors and panics from hooks are
/// reported to the runtime's diagnostics and never reach sibling components.
pub trait Component {
    fn connected_callback(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn disconnected_callback(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn component_will_load(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn component_did_load(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn component_will_update(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn component_did_update(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn render(&self) -> anyhow::Result<()>;

    fn watch(
        &self,
        _callback: &str,
        _new_value: &JsonValue,
        _old_value: Option<&JsonValue>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn handle_event(&self, _method: &str, _event: &Event) -> anyhow::Result<()> {
        Ok(())
    }
}

/// What a component receives when it is constructed.
pub struct ComponentInit {
    pub host: HostHandle,
    pub internals: Option<Rc<ElementInternals>>,
}

pub trait ComponentFactory {
    fn create(&self, init: ComponentInit) -> anyhow::Result<Rc<dyn Component>>;
}

impl<F> ComponentFactory for F
where
    F: Fn(ComponentInit) -> anyhow::Result<Rc<dyn Component>>,
{
    fn create(&self, init: ComponentInit) -> anyhow::Result<Rc<dyn Component>> {
        self(init)
    }
}

/// A component's view of its own host element and runtime.
#[derive(Clone)]
pub struct HostHandle {
    ctx: Weak<RuntimeContext>,
    element: Weak<Element>,
}

impl HostHandle {
    pub(crate) fn new(ctx: &Rc<RuntimeContext>, element: &Rc<Element>) -> Self {
        Self {
            ctx: Rc::downgrade(ctx),
            element: Rc::downgrade(element),
        }
    }

    pub fn element(&self) -> Option<Rc<Element>> {
        self.element.upgrade()
    }

    fn resolve(&self) -> Result<(Rc<RuntimeContext>, Rc<Element>), RuntimeError> {
        let ctx = self.ctx.upgrade().ok_or(RuntimeError::ContextDropped)?;
        let element = self.element.upgrade().ok_or(RuntimeError::ElementDropped)?;
        Ok((ctx, element))
    }

    pub fn get_value(&self, member: &str) -> Option<JsonValue> {
        let (ctx, element) = self.resolve().ok()?;
        ctx.get_value(&element, member)
    }

    pub fn set_value(&self, member: &str, value: JsonValue) -> Result<(), RuntimeError> {
        let (ctx, element) = self.resolve()?;
        lifecycle::set_value(&ctx, &element, member, value)
    }

    pub fn force_update(&self) -> bool {
        match self.resolve() {
            Ok((ctx, element)) => lifecycle::force_update(&ctx, &element),
            Err(_) => false,
        }
    }

    /// Dispatches a bubbling event from the host element.
    pub fn emit(&self, name: &str, detail: JsonValue) -> DispatchOutcome {
        match self.resolve() {
            Ok((ctx, element)) => ctx.host().dispatch_event(
                EventTarget::Element(element.id()),
                &Event::new(name).with_detail(detail).bubbling(),
            ),
            Err(_) => DispatchOutcome::default(),
        }
    }

    pub fn queue(&self) -> Option<Rc<TaskQueue>> {
        self.ctx.upgrade().map(|ctx| Rc::clone(ctx.queue()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub bundle_id: String,
    pub tag_name: String,
    pub url: Url,
    pub hmr_version: Option<String>,
}

impl LoadRequest {
    pub(crate) fn new(
        meta: &ComponentRuntimeMeta,
        resources_url: &Url,
        hmr_version: Option<String>,
    ) -> Self {
        let mut url = resources_url
            .join(&format!("{}.entry.js", meta.lazy_bundle_id))
            .unwrap_or_else(|_| resources_url.clone());
        if let Some(version) = &hmr_version {
            url.query_pairs_mut().append_pair("s-hmr", version);
        }
        Self {
            bundle_id: meta.lazy_bundle_id.clone(),
            tag_name: meta.tag_name.clone(),
            url,
            hmr_version,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("bundle '{0}' is not available")]
    MissingBundle(String),
    #[error("bundle '{bundle_id}' does not export <{tag_name}>")]
    MissingExport { bundle_id: String, tag_name: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type LoadFuture = LocalBoxFuture<'static, Result<Rc<dyn ComponentFactory>, LoadError>>;

/// Resolves a component's implementation from its lazy bundle.
pub trait BundleLoader {
    fn load(&self, request: LoadRequest) -> LoadFuture;
}

/// Loader over factories registered up front. Every request is recorded.
#[derive(Default)]
pub struct StaticBundleLoader {
    bundles: RefCell<HashMap<String, HashMap<String, Rc<dyn ComponentFactory>>>>,
    requests: RefCell<Vec<LoadRequest>>,
}

impl StaticBundleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        bundle_id: &str,
        tag_name: &str,
        factory: Rc<dyn ComponentFactory>,
    ) {
        self.bundles
            .borrow_mut()
            .entry(bundle_id.to_string())
            .or_default()
            .insert(tag_name.to_string(), factory);
    }

    pub fn requests(&self) -> Vec<LoadRequest> {
        self.requests.borrow().clone()
    }
}

impl BundleLoader for StaticBundleLoader {
    fn load(&self, request: LoadRequest) -> LoadFuture {
        let result = {
            let bundles = self.bundles.borrow();
            match bundles.get(&request.bundle_id) {
                None => Err(LoadError::MissingBundle(request.bundle_id.clone())),
                Some(exports) => exports
                    .get(&request.tag_name)
                    .cloned()
                    .ok_or_else(|| LoadError::MissingExport {
                        bundle_id: request.bundle_id.clone(),
                        tag_name: request.tag_name.clone(),
                    }),
            }
        };
        self.requests.borrow_mut().push(request);
        future::ready(result).boxed_local()
    }
}

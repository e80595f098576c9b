//! Bootstrap: turns a compact manifest into defined element classes and
//! coordinates the first wave of connections with the app-load signal.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Instant;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::context::{PlatformFlags, RuntimeContext};
use super::deferred::DeferredConnections;
use super::diagnostics::DiagnosticSource;
use super::lifecycle;
use super::watchdog::{AppLoadReason, AppLoadWatchdog};
use crate::dom::{
    is_valid_custom_element_name, DomError, Element, ElementClass, ElementReactions, Event,
    EventTarget,
};
use crate::meta::{decode_component, CompactEntry, ComponentRuntimeMeta, Manifest};

pub type TagTransform = Rc<dyn Fn(&str) -> String>;

/// Options accepted by [`bootstrap_lazy`]. Deserializes from the camelCase
/// object a page passes to its loader script.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BootstrapOptions {
    pub exclude: Vec<String>,
    pub resources_url: Option<String>,
    pub sync_queue: bool,
    pub hydrated_class: String,
    pub invisible_prehydration: bool,
    pub nonce: Option<String>,
    #[serde(skip)]
    pub transform_tag_name: Option<TagTransform>,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            resources_url: None,
            sync_queue: false,
            hydrated_class: "hydrated".to_string(),
            invisible_prehydration: true,
            nonce: None,
            transform_tag_name: None,
        }
    }
}

impl fmt::Debug for BootstrapOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapOptions")
            .field("exclude", &self.exclude)
            .field("resources_url", &self.resources_url)
            .field("sync_queue", &self.sync_queue)
            .field("hydrated_class", &self.hydrated_class)
            .field("invisible_prehydration", &self.invisible_prehydration)
            .field("nonce", &self.nonce)
            .field("transform_tag_name", &self.transform_tag_name.is_some())
            .finish()
    }
}

impl BootstrapOptions {
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }

    pub fn with_transform_tag_name(mut self, transform: impl Fn(&str) -> String + 'static) -> Self {
        self.transform_tag_name = Some(Rc::new(transform));
        self
    }

    fn tag_name_for(&self, tag_name: &str) -> String {
        match &self.transform_tag_name {
            Some(transform) => transform(tag_name),
            None => tag_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Excluded,
    AlreadyDefined,
    InvalidTagName,
    Malformed,
    DefineFailed(DomError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedComponent {
    pub tag_name: Option<String>,
    pub reason: SkipReason,
}

/// State of one bootstrap call, shared by every element class it defined.
pub struct BootstrapBatch {
    ctx: Weak<RuntimeContext>,
    deferred: DeferredConnections,
    watchdog: AppLoadWatchdog,
    defined: RefCell<Vec<String>>,
    skipped: RefCell<Vec<SkippedComponent>>,
}

impl BootstrapBatch {
    fn new(ctx: &Rc<RuntimeContext>) -> Self {
        Self {
            ctx: Rc::downgrade(ctx),
            deferred: DeferredConnections::new(),
            watchdog: AppLoadWatchdog::new(),
            defined: RefCell::new(Vec::new()),
            skipped: RefCell::new(Vec::new()),
        }
    }

    pub fn defined_tags(&self) -> Vec<String> {
        self.defined.borrow().clone()
    }

    pub fn skipped(&self) -> Vec<SkippedComponent> {
        self.skipped.borrow().clone()
    }

    pub fn is_bootstrapping(&self) -> bool {
        self.deferred.is_bootstrapping()
    }

    pub fn app_load(&self) -> Option<AppLoadReason> {
        self.watchdog.fired()
    }

    pub fn is_app_load_armed(&self) -> bool {
        self.watchdog.is_armed()
    }

    pub fn on_app_load(&self, subscriber: impl Fn(AppLoadReason) + 'static) {
        self.watchdog.subscribe(Rc::new(subscriber));
    }

    fn skip(&self, tag_name: Option<String>, reason: SkipReason) {
        self.skipped
            .borrow_mut()
            .push(SkippedComponent { tag_name, reason });
    }

    pub(crate) fn deferred(&self) -> &DeferredConnections {
        &self.deferred
    }

    pub(crate) fn cancel_app_load_fallback(&self) {
        if let Some(ctx) = self.ctx.upgrade() {
            self.watchdog.cancel(ctx.host().as_ref());
        }
    }

    /// Signals that the app finished loading. Only the first call has any
    /// effect: it marks the platform loaded, adds the hydrated class to the
    /// document element and dispatches `appload` on the window.
    pub(crate) fn app_did_load(&self, reason: AppLoadReason) -> bool {
        let Some(ctx) = self.ctx.upgrade() else {
            return false;
        };
        let host = ctx.host();
        if !self.watchdog.fire(host.as_ref(), reason) {
            return false;
        }
        ctx.insert_platform_flags(PlatformFlags::APP_LOADED);
        host.document_element().add_class(&ctx.hydrated_class());
        info!(target: "bootstrap", namespace = ctx.namespace(), ?reason, "app load");
        let event = Event::new("appload").with_detail(json!({
            "namespace": ctx.namespace(),
            "reason": reason,
        }));
        host.dispatch_event(EventTarget::Window, &event);
        true
    }
}

/// Builds the element class for one component tag.
pub fn element_class(
    meta: &ComponentRuntimeMeta,
    tag_name: &str,
    reactions: Rc<dyn ElementReactions>,
) -> ElementClass {
    ElementClass::new(tag_name, reactions)
        .with_observed_attributes(
            meta.observed_attributes()
                .into_iter()
                .map(|(attribute, _)| attribute)
                .collect(),
        )
        .with_form_associated(meta.form_associated)
}

/// Element reactions shared by every lazily loaded host of one tag.
struct LazyHostElement {
    ctx: Weak<RuntimeContext>,
    meta: Rc<ComponentRuntimeMeta>,
    batch: Rc<BootstrapBatch>,
}

impl ElementReactions for LazyHostElement {
    fn constructed(&self, element: &Rc<Element>) {
        if let Some(ctx) = self.ctx.upgrade() {
            lifecycle::register_host(&ctx, &self.batch, element, Rc::clone(&self.meta));
        }
    }

    fn connected(&self, element: &Rc<Element>) {
        self.batch.cancel_app_load_fallback();
        let Some(ctx) = self.ctx.upgrade() else {
            return;
        };
        let batch = Rc::clone(&self.batch);
        self.batch
            .deferred()
            .enqueue(element, |element| lifecycle::connected_callback(&ctx, &batch, element));
    }

    fn disconnected(&self, element: &Rc<Element>) {
        if let Some(ctx) = self.ctx.upgrade() {
            lifecycle::disconnected_callback(&ctx, element);
        }
    }

    fn attribute_changed(
        &self,
        element: &Rc<Element>,
        name: &str,
        _old_value: Option<&str>,
        new_value: Option<&str>,
    ) {
        if let Some(ctx) = self.ctx.upgrade() {
            lifecycle::attribute_changed(&ctx, element, name, new_value);
        }
    }

    fn hot_replace(&self, element: &Rc<Element>, version_id: &str) {
        if let Some(ctx) = self.ctx.upgrade() {
            lifecycle::hot_replace(&ctx, &self.batch, element, version_id);
        }
    }
}

/// Defines an element class for every component in `manifest`.
///
/// Connections observed while the batch is being defined are held back and
/// replayed once every class exists. When nothing connected, a fallback
/// timer declares the app loaded after a short grace period.
pub fn bootstrap_lazy(
    ctx: &Rc<RuntimeContext>,
    manifest: &Manifest,
    options: BootstrapOptions,
) -> Rc<BootstrapBatch> {
    let started = Instant::now();
    let batch = Rc::new(BootstrapBatch::new(ctx));
    batch.deferred.begin();
    ctx.apply_options(&options);

    let host = Rc::clone(ctx.host());
    let supports_shadow = host.supports_shadow();
    let mut style_tags = Vec::new();

    for bundle in manifest.bundles() {
        for entry in &bundle.entries {
            let compact = match entry {
                CompactEntry::Component(compact) => compact,
                CompactEntry::Malformed(raw) => {
                    warn!(
                        target: "bootstrap",
                        bundle = %bundle.id,
                        %raw,
                        "skipping malformed component entry"
                    );
                    batch.skip(None, SkipReason::Malformed);
                    continue;
                }
            };
            let mut meta = decode_component(&bundle.id, compact);
            if !supports_shadow {
                meta = meta.with_shadow_shim();
            }
            let tag_name = options.tag_name_for(&meta.tag_name);

            if !is_valid_custom_element_name(&tag_name) {
                warn!(target: "bootstrap", tag = %tag_name, "skipping invalid custom element name");
                batch.skip(Some(tag_name), SkipReason::InvalidTagName);
                continue;
            }
            if options.exclude.iter().any(|excluded| *excluded == tag_name) {
                debug!(target: "bootstrap", tag = %tag_name, "excluded");
                batch.skip(Some(tag_name), SkipReason::Excluded);
                continue;
            }
            if host.element_class(&tag_name).is_some() {
                debug!(target: "bootstrap", tag = %tag_name, "already defined");
                batch.skip(Some(tag_name), SkipReason::AlreadyDefined);
                continue;
            }

            let meta = Rc::new(meta);
            let reactions = Rc::new(LazyHostElement {
                ctx: Rc::downgrade(ctx),
                meta: Rc::clone(&meta),
                batch: Rc::clone(&batch),
            });
            match host.define_element(element_class(&meta, &tag_name, reactions)) {
                Ok(()) => {
                    debug!(target: "bootstrap", tag = %tag_name, bundle = %bundle.id, "defined");
                    batch.defined.borrow_mut().push(tag_name.clone());
                    style_tags.push(tag_name);
                }
                Err(err) => {
                    ctx.diagnostics().report(
                        DiagnosticSource::Bootstrap {
                            tag_name: Some(tag_name.clone()),
                        },
                        err.to_string(),
                    );
                    batch.skip(Some(tag_name), SkipReason::DefineFailed(err));
                }
            }
        }
    }

    if options.invisible_prehydration && !style_tags.is_empty() {
        let css = format!(
            "{}{{visibility:hidden}}.{}{{visibility:inherit}}",
            style_tags.join(","),
            options.hydrated_class
        );
        let nonce = options.nonce.clone().or_else(|| host.csp_nonce());
        if let Err(err) = host.insert_head_style(&css, nonce.as_deref()) {
            ctx.diagnostics()
                .report(DiagnosticSource::Bootstrap { tag_name: None }, err.to_string());
        }
    }

    let replayed = batch
        .deferred
        .complete(|element| lifecycle::connected_callback(ctx, &batch, element));
    if replayed == 0 {
        let weak = Rc::downgrade(&batch);
        batch.watchdog.arm(
            host.as_ref(),
            Box::new(move || {
                if let Some(batch) = weak.upgrade() {
                    batch.app_did_load(AppLoadReason::Timeout);
                }
            }),
        );
    }

    info!(
        target: "bootstrap",
        defined = batch.defined.borrow().len(),
        skipped = batch.skipped.borrow().len(),
        replayed,
        elapsed_us = started.elapsed().as_micros() as u64,
        "bootstrap complete"
    );
    batch
}

//! Per-element lifecycle: registration, connection, lazy initialization,
//! the update cycle and teardown.
//!
//! Nothing here holds a `HostRef` borrow while user code runs; component
//! hooks are free to call back into the runtime.

use std::mem;
use std::rc::{Rc, Weak};

use futures_util::FutureExt;
use serde_json::{Number, Value as JsonValue};
use tracing::{debug, trace, warn};

use super::component::{Component, ComponentFactory, ComponentInit, HostHandle, LoadRequest};
use super::context::{PlatformFlags, RuntimeContext};
use super::diagnostics::{isolate, DiagnosticSource};
use super::host_ref::{HostFlags, HostRefError, SharedHostRef};
use super::registrar::BootstrapBatch;
use super::watchdog::AppLoadReason;
use super::RuntimeError;
use crate::dom::{Element, Event, EventTarget, ShadowRootInit, ShadowRootMode};
use crate::meta::{ComponentRuntimeMeta, Encapsulation, ListenerTarget, MemberKind, PropType};

pub(crate) fn scope_class(tag_name: &str) -> String {
    format!("sc-{tag_name}")
}

fn run_hook(
    ctx: &RuntimeContext,
    tag_name: &str,
    hook: &'static str,
    f: impl FnOnce() -> anyhow::Result<()>,
) -> bool {
    isolate(
        ctx.diagnostics(),
        || DiagnosticSource::Lifecycle {
            tag_name: tag_name.to_string(),
            hook,
        },
        f,
    )
}

/// Creates the host record for a freshly constructed element and prepares
/// its encapsulation.
pub(crate) fn register_host(
    ctx: &Rc<RuntimeContext>,
    batch: &Rc<BootstrapBatch>,
    element: &Rc<Element>,
    meta: Rc<ComponentRuntimeMeta>,
) {
    match ctx.store().register(element, Rc::clone(&meta), Rc::downgrade(batch)) {
        Ok(_) => trace!(
            target: "lifecycle",
            element = %element.id(),
            tag = %meta.tag_name,
            "registered host"
        ),
        Err(HostRefError::DuplicateRegistration(id)) => {
            debug!(target: "lifecycle", element = %id, "host already registered");
            return;
        }
    }

    match meta.encapsulation {
        Encapsulation::Shadow { delegates_focus } if ctx.host().supports_shadow() => {
            let init = ShadowRootInit {
                mode: ShadowRootMode::Open,
                delegates_focus,
            };
            if let Err(err) = element.attach_shadow(init) {
                ctx.diagnostics().report(
                    DiagnosticSource::Lifecycle {
                        tag_name: meta.tag_name.clone(),
                        hook: "attachShadow",
                    },
                    err.to_string(),
                );
            }
        }
        Encapsulation::Scoped => element.add_class(&scope_class(&meta.tag_name)),
        _ if meta.needs_shadow_shim => element.add_class(&scope_class(&meta.tag_name)),
        _ => {}
    }
}

/// Connection routine, run once the owning batch has finished defining.
pub(crate) fn connected_callback(
    ctx: &Rc<RuntimeContext>,
    batch: &Rc<BootstrapBatch>,
    element: &Rc<Element>,
) {
    if ctx.platform_flags().contains(PlatformFlags::IS_TMP_DISCONNECTED) {
        return;
    }
    let Some(host_ref) = ctx.store().get(element) else {
        warn!(target: "lifecycle", element = %element.id(), "connected without a host record");
        return;
    };

    let (first_connect, instance, meta) = {
        let mut record = host_ref.borrow_mut();
        let first = !record.flags.contains(HostFlags::HAS_CONNECTED);
        record.flags.insert(HostFlags::HAS_CONNECTED);
        (first, record.instance.clone(), Rc::clone(&record.meta))
    };
    trace!(
        target: "lifecycle",
        element = %element.id(),
        tag = %meta.tag_name,
        first_connect,
        "connected"
    );

    add_host_listeners(ctx, element, &host_ref, &meta);

    if first_connect {
        if let Some(ancestor) = find_ancestor_component(ctx, element) {
            attach_to_ancestor(ctx, &host_ref, &ancestor);
        }
        initialize_component(ctx, batch, element, &host_ref, None);
    } else if let Some(instance) = instance {
        run_hook(ctx, &meta.tag_name, "connectedCallback", || {
            instance.connected_callback()
        });
    }
}

/// Nearest ancestor host whose component can still load. Failed hosts are
/// passed over.
fn find_ancestor_component(ctx: &RuntimeContext, element: &Element) -> Option<Rc<Element>> {
    let mut cursor = element.parent();
    while let Some(candidate) = cursor {
        if let Some(record) = ctx.store().get(&candidate) {
            if !record.borrow().flags.contains(HostFlags::HAS_FAILED) {
                return Some(candidate);
            }
        }
        cursor = candidate.parent();
    }
    None
}

fn attach_to_ancestor(ctx: &RuntimeContext, host_ref: &SharedHostRef, ancestor: &Rc<Element>) {
    let Some(ancestor_ref) = ctx.store().get(ancestor) else {
        return;
    };
    let awaited = {
        let mut ancestor_record = ancestor_ref.borrow_mut();
        if ancestor_record
            .flags
            .intersects(HostFlags::HAS_LOADED | HostFlags::HAS_FAILED)
        {
            false
        } else {
            ancestor_record.pending_children += 1;
            true
        }
    };
    let mut record = host_ref.borrow_mut();
    record.ancestor_component = Some(Rc::downgrade(ancestor));
    record.awaited_by_ancestor = awaited;
}

fn add_host_listeners(
    ctx: &Rc<RuntimeContext>,
    element: &Rc<Element>,
    host_ref: &SharedHostRef,
    meta: &ComponentRuntimeMeta,
) {
    if meta.listeners.is_empty() || !host_ref.borrow().remove_listeners.is_empty() {
        return;
    }
    let host = ctx.host();
    let mut detach = Vec::with_capacity(meta.listeners.len());
    for listener in &meta.listeners {
        let target = match listener.target {
            ListenerTarget::Host => EventTarget::Element(element.id()),
            ListenerTarget::Document => EventTarget::Document,
            ListenerTarget::Window => EventTarget::Window,
            ListenerTarget::Body => EventTarget::Element(host.body().id()),
            ListenerTarget::Parent => match element.parent() {
                Some(parent) => EventTarget::Element(parent.id()),
                None => continue,
            },
        };
        let weak_ctx = Rc::downgrade(ctx);
        let weak_element = Rc::downgrade(element);
        let method = listener.method_name.clone();
        let id = host.add_event_listener(
            target,
            &listener.event_name,
            listener.options,
            Rc::new(move |event| {
                let (Some(ctx), Some(element)) = (weak_ctx.upgrade(), weak_element.upgrade()) else {
                    return;
                };
                deliver_host_event(&ctx, &element, &method, event);
            }),
        );
        let weak_host = Rc::downgrade(host);
        detach.push(Box::new(move || {
            if let Some(host) = weak_host.upgrade() {
                host.remove_event_listener(id);
            }
        }) as Box<dyn FnOnce()>);
    }
    host_ref.borrow_mut().remove_listeners = detach;
}

fn deliver_host_event(
    ctx: &RuntimeContext,
    element: &Element,
    method: &str,
    event: &Event,
) {
    let Some(host_ref) = ctx.store().get(element) else {
        return;
    };
    let (instance, tag_name) = {
        let mut record = host_ref.borrow_mut();
        if !record.flags.contains(HostFlags::IS_LISTEN_READY) {
            record.queued_events.push((method.to_string(), event.clone()));
            return;
        }
        (record.instance.clone(), record.meta.tag_name.clone())
    };
    if let Some(instance) = instance {
        dispatch_to_instance(ctx, &tag_name, instance.as_ref(), method, event);
    }
}

fn dispatch_to_instance(
    ctx: &RuntimeContext,
    tag_name: &str,
    instance: &dyn Component,
    method: &str,
    event: &Event,
) {
    isolate(
        ctx.diagnostics(),
        || DiagnosticSource::Listener {
            tag_name: tag_name.to_string(),
            method: method.to_string(),
        },
        || instance.handle_event(method, event),
    );
}

/// Starts loading the component implementation. The module request is
/// issued synchronously; construction and scheduling follow once it
/// resolves.
fn initialize_component(
    ctx: &Rc<RuntimeContext>,
    batch: &Rc<BootstrapBatch>,
    element: &Rc<Element>,
    host_ref: &SharedHostRef,
    hmr_version: Option<String>,
) {
    let meta = {
        let mut record = host_ref.borrow_mut();
        if record.flags.contains(HostFlags::HAS_INITIALIZED) {
            return;
        }
        record.flags.insert(HostFlags::HAS_INITIALIZED);
        record.hmr_version = hmr_version.clone();
        Rc::clone(&record.meta)
    };
    let request = LoadRequest::new(&meta, &ctx.resources_url(), hmr_version);
    debug!(target: "lifecycle", tag = %meta.tag_name, url = %request.url, "loading component");
    let load = ctx.loader().load(request);

    let host = Rc::clone(ctx.host());
    let ctx = Rc::clone(ctx);
    let batch = Rc::clone(batch);
    let element = Rc::clone(element);
    let host_ref = Rc::clone(host_ref);
    let job = async move {
        match load.await {
            Ok(factory) => {
                if construct_instance(&ctx, &element, &host_ref, factory.as_ref()) {
                    schedule_after_ancestor(&ctx, &element, &host_ref);
                } else {
                    abandon_load(&ctx, &batch, &host_ref);
                }
            }
            Err(err) => {
                ctx.diagnostics().report(
                    DiagnosticSource::Loader {
                        tag_name: meta.tag_name.clone(),
                    },
                    err.to_string(),
                );
                abandon_load(&ctx, &batch, &host_ref);
            }
        }
    };
    host.spawn_local(job.boxed_local());
}

fn construct_instance(
    ctx: &Rc<RuntimeContext>,
    element: &Rc<Element>,
    host_ref: &SharedHostRef,
    factory: &dyn ComponentFactory,
) -> bool {
    let (meta, internals) = {
        let mut record = host_ref.borrow_mut();
        record.flags.insert(HostFlags::IS_CONSTRUCTING);
        (Rc::clone(&record.meta), record.internals.clone())
    };
    let internals = match internals {
        Some(internals) => Some(internals),
        None if meta.form_associated => match element.attach_internals() {
            Ok(internals) => {
                host_ref.borrow_mut().internals = Some(Rc::clone(&internals));
                Some(internals)
            }
            Err(err) => {
                ctx.diagnostics().report(
                    DiagnosticSource::Lifecycle {
                        tag_name: meta.tag_name.clone(),
                        hook: "attachInternals",
                    },
                    err.to_string(),
                );
                None
            }
        },
        None => None,
    };

    let init = ComponentInit {
        host: HostHandle::new(ctx, element),
        internals,
    };
    let mut created = None;
    run_hook(ctx, &meta.tag_name, "constructor", || {
        created = Some(factory.create(init)?);
        Ok(())
    });

    let queued = {
        let mut record = host_ref.borrow_mut();
        record.flags.remove(HostFlags::IS_CONSTRUCTING);
        let Some(instance) = created.clone() else {
            return false;
        };
        record.instance = Some(instance);
        record.flags.insert(HostFlags::IS_WATCH_READY | HostFlags::IS_LISTEN_READY);
        mem::take(&mut record.queued_events)
    };
    let Some(instance) = created else {
        return false;
    };
    trace!(target: "lifecycle", tag = %meta.tag_name, "constructed");

    run_hook(ctx, &meta.tag_name, "connectedCallback", || {
        instance.connected_callback()
    });
    for (method, event) in queued {
        dispatch_to_instance(ctx, &meta.tag_name, instance.as_ref(), &method, &event);
    }
    true
}

/// Children wait for their ancestor's first render before their own first
/// update is scheduled.
fn schedule_after_ancestor(
    ctx: &Rc<RuntimeContext>,
    element: &Rc<Element>,
    host_ref: &SharedHostRef,
) {
    let ancestor_ref = host_ref
        .borrow()
        .ancestor_component()
        .and_then(|ancestor| ctx.store().get(&ancestor));
    if let Some(ancestor_ref) = ancestor_ref {
        let mut ancestor = ancestor_ref.borrow_mut();
        if !ancestor
            .flags
            .intersects(HostFlags::HAS_RENDERED | HostFlags::HAS_FAILED)
        {
            let ctx = Rc::downgrade(ctx);
            let element = Rc::downgrade(element);
            let child = Rc::clone(host_ref);
            ancestor.render_callbacks.push(Box::new(move || {
                let Some(ctx) = ctx.upgrade() else {
                    return;
                };
                match element.upgrade() {
                    Some(element) => schedule_update(&ctx, &element),
                    None => release_ancestor_wait(&ctx, &child),
                }
            }));
            return;
        }
    }
    schedule_update(ctx, element);
}

/// Stops the ancestor from waiting on a child that will never load.
fn release_ancestor_wait(ctx: &Rc<RuntimeContext>, host_ref: &SharedHostRef) {
    let (ancestor, awaited) = {
        let mut record = host_ref.borrow_mut();
        let awaited = mem::replace(&mut record.awaited_by_ancestor, false);
        (record.ancestor_component(), awaited)
    };
    if let (Some(ancestor), true) = (ancestor, awaited) {
        child_did_load(ctx, &ancestor);
    }
}

/// Releases everything waiting on a component whose implementation could
/// not be loaded or constructed.
fn abandon_load(
    ctx: &Rc<RuntimeContext>,
    batch: &Rc<BootstrapBatch>,
    host_ref: &SharedHostRef,
) {
    let (ancestor, awaited, waiting_children) = {
        let mut record = host_ref.borrow_mut();
        record.flags.insert(HostFlags::HAS_FAILED);
        let awaited = mem::replace(&mut record.awaited_by_ancestor, false);
        (
            record.ancestor_component(),
            awaited,
            mem::take(&mut record.render_callbacks),
        )
    };
    for callback in waiting_children {
        callback();
    }
    match ancestor {
        Some(ancestor) if awaited => child_did_load(ctx, &ancestor),
        Some(_) => {}
        None => {
            batch.app_did_load(AppLoadReason::Natural);
        }
    }
}

pub(crate) fn schedule_update(ctx: &Rc<RuntimeContext>, element: &Rc<Element>) {
    let Some(host_ref) = ctx.store().get(element) else {
        return;
    };
    host_ref.borrow_mut().flags.insert(HostFlags::IS_QUEUED_FOR_UPDATE);
    let weak_ctx = Rc::downgrade(ctx);
    let weak_element: Weak<Element> = Rc::downgrade(element);
    ctx.queue().queue_write(Box::new(move || {
        let Some(ctx) = weak_ctx.upgrade() else {
            return Ok(());
        };
        match weak_element.upgrade() {
            Some(element) => update_component(&ctx, &element),
            None => release_ancestor_wait(&ctx, &host_ref),
        }
        Ok(())
    }));
}

fn update_component(ctx: &Rc<RuntimeContext>, element: &Rc<Element>) {
    let Some(host_ref) = ctx.store().get(element) else {
        return;
    };
    let (instance, meta, is_initial_load) = {
        let mut record = host_ref.borrow_mut();
        record.flags.remove(HostFlags::IS_QUEUED_FOR_UPDATE);
        (
            record.instance.clone(),
            Rc::clone(&record.meta),
            !record.flags.contains(HostFlags::HAS_RENDERED),
        )
    };
    let Some(instance) = instance else {
        return;
    };
    let tag_name = meta.tag_name.as_str();

    if is_initial_load {
        run_hook(ctx, tag_name, "componentWillLoad", || instance.component_will_load());
    } else {
        run_hook(ctx, tag_name, "componentWillUpdate", || instance.component_will_update());
    }

    host_ref.borrow_mut().flags.insert(HostFlags::IS_ACTIVE_RENDER);
    run_hook(ctx, tag_name, "render", || instance.render());
    let waiting_children = {
        let mut record = host_ref.borrow_mut();
        record.flags.remove(HostFlags::IS_ACTIVE_RENDER);
        record.flags.insert(HostFlags::HAS_RENDERED);
        mem::take(&mut record.render_callbacks)
    };
    trace!(target: "lifecycle", tag = tag_name, is_initial_load, "rendered");

    reflect_attributes(ctx, element, &host_ref, &meta);

    for callback in waiting_children {
        callback();
    }

    // Callbacks for children that are already gone settle synchronously.
    let has_pending_children = host_ref.borrow().pending_children > 0;
    if has_pending_children {
        host_ref.borrow_mut().flags.insert(HostFlags::IS_WAITING_FOR_CHILDREN);
    } else {
        post_update(ctx, element, &host_ref);
    }
}

fn post_update(ctx: &Rc<RuntimeContext>, element: &Rc<Element>, host_ref: &SharedHostRef) {
    let (instance, tag_name, first_load, ancestor, awaited, batch) = {
        let mut record = host_ref.borrow_mut();
        record.flags.remove(HostFlags::IS_WAITING_FOR_CHILDREN);
        let first_load = !record.flags.contains(HostFlags::HAS_LOADED);
        record.flags.insert(HostFlags::HAS_LOADED);
        let awaited = first_load && mem::replace(&mut record.awaited_by_ancestor, false);
        (
            record.instance.clone(),
            record.meta.tag_name.clone(),
            first_load,
            record.ancestor_component(),
            awaited,
            record.batch.upgrade(),
        )
    };

    if first_load {
        element.add_class(&ctx.hydrated_class());
        if let Some(instance) = &instance {
            run_hook(ctx, &tag_name, "componentDidLoad", || instance.component_did_load());
        }
        host_ref.borrow_mut().resolve_ready();
        debug!(target: "lifecycle", tag = %tag_name, element = %element.id(), "loaded");
        match ancestor {
            Some(ancestor) if awaited => child_did_load(ctx, &ancestor),
            Some(_) => {}
            None => {
                if let Some(batch) = batch {
                    batch.app_did_load(AppLoadReason::Natural);
                }
            }
        }
    } else if let Some(instance) = &instance {
        run_hook(ctx, &tag_name, "componentDidUpdate", || instance.component_did_update());
    }

    let rerender = {
        let mut record = host_ref.borrow_mut();
        let rerender = record.flags.contains(HostFlags::NEEDS_RERENDER);
        record.flags.remove(HostFlags::NEEDS_RERENDER);
        rerender
    };
    if rerender {
        schedule_update(ctx, element);
    }
}

fn child_did_load(ctx: &Rc<RuntimeContext>, ancestor: &Rc<Element>) {
    let Some(ancestor_ref) = ctx.store().get(ancestor) else {
        return;
    };
    let ready = {
        let mut record = ancestor_ref.borrow_mut();
        record.pending_children = record.pending_children.saturating_sub(1);
        record.pending_children == 0 && record.flags.contains(HostFlags::IS_WAITING_FOR_CHILDREN)
    };
    if ready {
        post_update(ctx, ancestor, &ancestor_ref);
    }
}

/// Teardown routine. Suppressed during temporary disconnects.
pub(crate) fn disconnected_callback(ctx: &Rc<RuntimeContext>, element: &Rc<Element>) {
    if ctx.platform_flags().contains(PlatformFlags::IS_TMP_DISCONNECTED) {
        return;
    }
    let Some(host_ref) = ctx.store().get(element) else {
        return;
    };
    let (detach, instance, tag_name) = {
        let mut record = host_ref.borrow_mut();
        (
            mem::take(&mut record.remove_listeners),
            record.instance.clone(),
            record.meta.tag_name.clone(),
        )
    };
    trace!(target: "lifecycle", tag = %tag_name, listeners = detach.len(), "disconnected");
    for remove in detach {
        remove();
    }
    if let Some(instance) = instance {
        run_hook(ctx, &tag_name, "disconnectedCallback", || {
            instance.disconnected_callback()
        });
    }
}

/// Drops the host record for `element` for good. Its listeners are
/// detached and an ancestor waiting on it stops waiting.
pub(crate) fn release_host(ctx: &Rc<RuntimeContext>, element: &Element) -> bool {
    let Some(host_ref) = ctx.store().get(element) else {
        return false;
    };
    let detach = mem::take(&mut host_ref.borrow_mut().remove_listeners);
    trace!(target: "lifecycle", element = %element.id(), listeners = detach.len(), "released");
    for remove in detach {
        remove();
    }
    release_ancestor_wait(ctx, &host_ref);
    ctx.store().remove(element)
}

pub(crate) fn attribute_changed(
    ctx: &Rc<RuntimeContext>,
    element: &Rc<Element>,
    name: &str,
    new_value: Option<&str>,
) {
    let Some(host_ref) = ctx.store().get(element) else {
        return;
    };
    let (meta, reflecting) = {
        let record = host_ref.borrow();
        (
            Rc::clone(&record.meta),
            record.flags.contains(HostFlags::IS_REFLECTING),
        )
    };
    if reflecting {
        return;
    }
    let Some((member, member_meta)) = meta.member_for_attribute(name) else {
        return;
    };
    let value = parse_prop_value(new_value, member_meta.kind);
    apply_value(ctx, element, &host_ref, &meta, member, value);
}

/// Converts an attribute string to a member value of the declared type.
pub fn parse_prop_value(raw: Option<&str>, kind: MemberKind) -> JsonValue {
    let Some(raw) = raw else {
        return JsonValue::Null;
    };
    match kind {
        MemberKind::Prop(PropType::Boolean) => JsonValue::Bool(raw != "false"),
        MemberKind::Prop(PropType::Number) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        _ => JsonValue::String(raw.to_string()),
    }
}

fn values_equal(left: Option<&JsonValue>, right: &JsonValue) -> bool {
    match (left, right) {
        (None, JsonValue::Null) => true,
        (Some(JsonValue::Number(a)), JsonValue::Number(b)) => a.as_f64() == b.as_f64(),
        (Some(left), right) => left == right,
        (None, _) => false,
    }
}

pub(crate) fn set_value(
    ctx: &Rc<RuntimeContext>,
    element: &Rc<Element>,
    member: &str,
    value: JsonValue,
) -> Result<(), RuntimeError> {
    let host_ref = ctx
        .store()
        .get(element)
        .ok_or_else(|| RuntimeError::NotRegistered(element.tag_name().to_string()))?;
    let meta = Rc::clone(&host_ref.borrow().meta);
    match meta.members.get(member) {
        Some(member_meta) if member_meta.holds_value() => {}
        _ => {
            return Err(RuntimeError::UnknownMember {
                tag_name: meta.tag_name.clone(),
                member: member.to_string(),
            })
        }
    }
    apply_value(ctx, element, &host_ref, &meta, member, value);
    Ok(())
}

fn apply_value(
    ctx: &Rc<RuntimeContext>,
    element: &Rc<Element>,
    host_ref: &SharedHostRef,
    meta: &ComponentRuntimeMeta,
    member: &str,
    value: JsonValue,
) {
    let (old_value, instance, flags) = {
        let mut record = host_ref.borrow_mut();
        let old_value = record.values.get(member).cloned();
        if values_equal(old_value.as_ref(), &value) {
            return;
        }
        record.values.insert(member.to_string(), value.clone());
        (old_value, record.instance.clone(), record.flags)
    };
    trace!(target: "lifecycle", tag = %meta.tag_name, member, "value changed");

    if let Some(instance) = &instance {
        if flags.contains(HostFlags::IS_WATCH_READY) {
            for callback in meta.watchers_for(member) {
                isolate(
                    ctx.diagnostics(),
                    || DiagnosticSource::Watcher {
                        tag_name: meta.tag_name.clone(),
                        callback: callback.clone(),
                    },
                    || instance.watch(callback, &value, old_value.as_ref()),
                );
            }
        }
    }

    let flags = host_ref.borrow().flags;
    if flags.contains(HostFlags::IS_ACTIVE_RENDER) {
        host_ref.borrow_mut().flags.insert(HostFlags::NEEDS_RERENDER);
    } else if flags.contains(HostFlags::HAS_RENDERED)
        && !flags.contains(HostFlags::IS_QUEUED_FOR_UPDATE)
    {
        schedule_update(ctx, element);
    }
}

pub(crate) fn force_update(ctx: &Rc<RuntimeContext>, element: &Rc<Element>) -> bool {
    let Some(host_ref) = ctx.store().get(element) else {
        return false;
    };
    let flags = host_ref.borrow().flags;
    if !flags.contains(HostFlags::HAS_RENDERED) {
        return false;
    }
    if !flags.contains(HostFlags::IS_QUEUED_FOR_UPDATE) {
        schedule_update(ctx, element);
    }
    true
}

fn reflect_attributes(
    ctx: &RuntimeContext,
    element: &Rc<Element>,
    host_ref: &SharedHostRef,
    meta: &ComponentRuntimeMeta,
) {
    let updates: Vec<(String, Option<String>)> = {
        let record = host_ref.borrow();
        meta.members
            .iter()
            .filter(|(_, member)| member.reflect)
            .filter_map(|(name, member)| {
                let attribute = member.attribute.clone()?;
                let value = match record.values.get(name) {
                    None | Some(JsonValue::Null) | Some(JsonValue::Bool(false)) => None,
                    Some(JsonValue::Bool(true)) => Some(String::new()),
                    Some(JsonValue::String(value)) => Some(value.clone()),
                    Some(JsonValue::Number(value)) => Some(value.to_string()),
                    Some(_) => return None,
                };
                Some((attribute, value))
            })
            .collect()
    };
    if updates.is_empty() {
        return;
    }
    host_ref.borrow_mut().flags.insert(HostFlags::IS_REFLECTING);
    let host = ctx.host();
    for (attribute, value) in updates {
        match value {
            Some(value) if element.get_attribute(&attribute).as_deref() != Some(value.as_str()) => {
                host.set_attribute(element, &attribute, &value)
            }
            None if element.has_attribute(&attribute) => host.remove_attribute(element, &attribute),
            _ => {}
        }
    }
    host_ref.borrow_mut().flags.remove(HostFlags::IS_REFLECTING);
}

/// Re-runs initialization against a new module version, keeping the
/// host's connection state.
pub(crate) fn hot_replace(
    ctx: &Rc<RuntimeContext>,
    batch: &Rc<BootstrapBatch>,
    element: &Rc<Element>,
    version_id: &str,
) {
    let Some(host_ref) = ctx.store().get(element) else {
        return;
    };
    {
        let mut record = host_ref.borrow_mut();
        record.flags = HostFlags::HAS_CONNECTED;
        record.awaited_by_ancestor = false;
    }
    debug!(target: "lifecycle", tag = element.tag_name(), version_id, "hot replacing component");
    initialize_component(ctx, batch, element, &host_ref, Some(version_id.to_string()));
}

/// Resolves when `element`'s component has finished its first load.
pub async fn when_ready(ctx: &RuntimeContext, element: &Element) -> Result<(), RuntimeError> {
    let ready = ctx
        .component_on_ready(element)
        .ok_or_else(|| RuntimeError::NotRegistered(element.tag_name().to_string()))?;
    ready.map(|result| result.map_err(RuntimeError::from)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_attribute_strings_by_declared_type() {
        let boolean = MemberKind::Prop(PropType::Boolean);
        assert_eq!(parse_prop_value(Some(""), boolean), json!(true));
        assert_eq!(parse_prop_value(Some("false"), boolean), json!(false));
        assert_eq!(parse_prop_value(Some("yes"), boolean), json!(true));

        let number = MemberKind::Prop(PropType::Number);
        assert_eq!(parse_prop_value(Some(" 4.5 "), number), json!(4.5));
        assert_eq!(parse_prop_value(Some("abc"), number), JsonValue::Null);

        let string = MemberKind::Prop(PropType::String);
        assert_eq!(parse_prop_value(Some("42"), string), json!("42"));
        assert_eq!(parse_prop_value(None, string), JsonValue::Null);
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(values_equal(Some(&json!(3)), &json!(3.0)));
        assert!(values_equal(None, &JsonValue::Null));
        assert!(!values_equal(None, &json!(false)));
        assert!(!values_equal(Some(&json!("3")), &json!(3)));
    }
}

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::task::Waker;
use std::time::Duration;

use futures_util::future::LocalBoxFuture;
use tracing::{debug, trace};
use url::Url;

use super::element::{CustomElementState, Element, ElementId};
use super::events::{
    DispatchOutcome, Event, EventHandler, EventListeners, EventTarget, ListenerId, ListenerPhase,
};
use super::jobs::{JobQueue, Microtask};
use super::registry::{CustomElementRegistry, ElementClass};
use super::timers::{ClockMode, TimerId, TimerKind, TimerManager};
use super::DomError;
use crate::meta::ListenerOptions;

#[derive(Debug, Clone)]
pub struct DocumentConfig {
    pub base_uri: Url,
    pub supports_shadow: bool,
    pub clock: ClockMode,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            base_uri: Url::parse("http://localhost/").expect("static base uri"),
            supports_shadow: true,
            clock: ClockMode::Virtual,
        }
    }
}

enum Reaction {
    Upgrade(Rc<ElementClass>, Rc<Element>),
    Connected(Rc<Element>),
    Disconnected(Rc<Element>),
    AttributeChanged {
        element: Rc<Element>,
        name: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },
}

/// Headless document: element tree, custom element registry, listeners and
/// an event loop made of microtasks, local jobs and timers.
pub struct Document {
    base_uri: Url,
    supports_shadow: bool,
    next_id: Cell<u64>,
    root: Rc<Element>,
    head: Rc<Element>,
    body: Rc<Element>,
    elements: RefCell<HashMap<ElementId, Weak<Element>>>,
    registry: CustomElementRegistry,
    listeners: EventListeners,
    timers: TimerManager,
    jobs: JobQueue,
}

impl Document {
    pub fn new(config: DocumentConfig) -> Rc<Self> {
        let root = Element::new(ElementId::new(1), "html".to_string());
        let head = Element::new(ElementId::new(2), "head".to_string());
        let body = Element::new(ElementId::new(3), "body".to_string());
        root.set_connected(true);
        for child in [&head, &body] {
            child.set_parent(Some(&root));
            child.set_connected(true);
            root.insert_child(Rc::clone(child), None);
        }

        let mut elements = HashMap::new();
        for element in [&root, &head, &body] {
            elements.insert(element.id(), Rc::downgrade(element));
        }

        Rc::new(Self {
            base_uri: config.base_uri,
            supports_shadow: config.supports_shadow,
            next_id: Cell::new(4),
            root,
            head,
            body,
            elements: RefCell::new(elements),
            registry: CustomElementRegistry::default(),
            listeners: EventListeners::default(),
            timers: TimerManager::new(config.clock),
            jobs: JobQueue::default(),
        })
    }

    pub fn base_uri(&self) -> &Url {
        &self.base_uri
    }

    pub fn supports_shadow(&self) -> bool {
        self.supports_shadow
    }

    pub fn document_element(&self) -> Rc<Element> {
        Rc::clone(&self.root)
    }

    pub fn head(&self) -> Rc<Element> {
        Rc::clone(&self.head)
    }

    pub fn body(&self) -> Rc<Element> {
        Rc::clone(&self.body)
    }

    pub fn registry(&self) -> &CustomElementRegistry {
        &self.registry
    }

    pub fn get_element(&self, id: ElementId) -> Option<Rc<Element>> {
        self.elements.borrow().get(&id).and_then(Weak::upgrade)
    }

    /// Connected elements with the given tag, in tree order.
    pub fn query_all(&self, tag_name: &str) -> Vec<Rc<Element>> {
        self.root
            .subtree()
            .into_iter()
            .filter(|element| element.tag_name() == tag_name)
            .collect()
    }

    pub fn create_element(&self, tag_name: &str) -> Rc<Element> {
        let id = ElementId::new(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        let element = Element::new(id, tag_name.to_ascii_lowercase());
        self.elements
            .borrow_mut()
            .insert(id, Rc::downgrade(&element));

        if let Some(class) = self.registry.get(element.tag_name()) {
            self.run_reactions(vec![Reaction::Upgrade(class, Rc::clone(&element))]);
        }
        element
    }

    pub fn append_child(&self, parent: &Rc<Element>, child: &Rc<Element>) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    pub fn insert_before(
        &self,
        parent: &Rc<Element>,
        child: &Rc<Element>,
        reference: Option<&Rc<Element>>,
    ) -> Result<(), DomError> {
        if child.is_inclusive_ancestor_of(parent) {
            return Err(DomError::HierarchyRequest {
                parent: parent.tag_name().to_string(),
                child: child.tag_name().to_string(),
            });
        }
        if let Some(reference) = reference {
            if reference.parent().map(|p| p.id()) != Some(parent.id()) {
                return Err(DomError::NotAChild(reference.tag_name().to_string()));
            }
        }

        let mut reactions = Vec::new();
        if let Some(old_parent) = child.parent() {
            self.detach(&old_parent, child, &mut reactions);
        }

        child.set_parent(Some(parent));
        parent.insert_child(Rc::clone(child), reference.map(|r| r.id()));

        if parent.is_connected() {
            for node in child.subtree() {
                node.set_connected(true);
                match node.custom_element_state() {
                    CustomElementState::Custom => reactions.push(Reaction::Connected(node)),
                    CustomElementState::Undefined => {
                        if let Some(class) = self.registry.get(node.tag_name()) {
                            reactions.push(Reaction::Upgrade(class, node));
                        }
                    }
                }
            }
        }

        self.run_reactions(reactions);
        Ok(())
    }

    pub fn remove_child(&self, parent: &Rc<Element>, child: &Rc<Element>) -> Result<(), DomError> {
        if child.parent().map(|p| p.id()) != Some(parent.id()) {
            return Err(DomError::NotAChild(child.tag_name().to_string()));
        }
        let mut reactions = Vec::new();
        self.detach(parent, child, &mut reactions);
        self.run_reactions(reactions);
        Ok(())
    }

    fn detach(&self, parent: &Rc<Element>, child: &Rc<Element>, reactions: &mut Vec<Reaction>) {
        parent.take_child(child.id());
        child.set_parent(None);
        if !child.is_connected() {
            return;
        }
        for node in child.subtree() {
            node.set_connected(false);
            if node.is_defined() {
                reactions.push(Reaction::Disconnected(node));
            }
        }
    }

    pub fn set_attribute(&self, element: &Rc<Element>, name: &str, value: &str) {
        let old_value = element.set_attribute_raw(name, value);
        if old_value.as_deref() == Some(value) {
            return;
        }
        self.queue_attribute_reaction(element, name, old_value, Some(value.to_string()));
    }

    pub fn remove_attribute(&self, element: &Rc<Element>, name: &str) {
        if let Some(old_value) = element.remove_attribute_raw(name) {
            self.queue_attribute_reaction(element, name, Some(old_value), None);
        }
    }

    fn queue_attribute_reaction(
        &self,
        element: &Rc<Element>,
        name: &str,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        let observed = element
            .element_class()
            .map(|class| class.observes(name))
            .unwrap_or(false);
        if observed {
            self.run_reactions(vec![Reaction::AttributeChanged {
                element: Rc::clone(element),
                name: name.to_string(),
                old_value,
                new_value,
            }]);
        }
    }

    /// Registers a class and upgrades every connected element carrying its tag.
    pub fn define(&self, class: ElementClass) -> Result<(), DomError> {
        let class = self.registry.insert(class)?;
        debug!(target: "dom", tag = class.tag_name(), "custom element defined");
        let reactions = self
            .query_all(class.tag_name())
            .into_iter()
            .filter(|element| !element.is_defined())
            .map(|element| Reaction::Upgrade(Rc::clone(&class), element))
            .collect();
        self.run_reactions(reactions);
        Ok(())
    }

    fn run_reactions(&self, reactions: Vec<Reaction>) {
        for reaction in reactions {
            match reaction {
                Reaction::Upgrade(class, element) => {
                    if element.is_defined() {
                        continue;
                    }
                    trace!(target: "dom", tag = element.tag_name(), id = %element.id(), "upgrade");
                    element.mark_custom(Rc::clone(&class));
                    let reactions = Rc::clone(class.reactions());
                    reactions.constructed(&element);
                    for (name, value) in element.attributes() {
                        if class.observes(&name) {
                            reactions.attribute_changed(&element, &name, None, Some(&value));
                        }
                    }
                    if element.is_connected() {
                        reactions.connected(&element);
                    }
                }
                Reaction::Connected(element) => {
                    if let Some(class) = element.element_class() {
                        class.reactions().connected(&element);
                    }
                }
                Reaction::Disconnected(element) => {
                    if let Some(class) = element.element_class() {
                        class.reactions().disconnected(&element);
                    }
                }
                Reaction::AttributeChanged {
                    element,
                    name,
                    old_value,
                    new_value,
                } => {
                    if let Some(class) = element.element_class() {
                        class.reactions().attribute_changed(
                            &element,
                            &name,
                            old_value.as_deref(),
                            new_value.as_deref(),
                        );
                    }
                }
            }
        }
    }

    pub fn add_event_listener(
        &self,
        target: EventTarget,
        event_name: &str,
        options: ListenerOptions,
        handler: EventHandler,
    ) -> ListenerId {
        self.listeners.add(target, event_name, options, handler)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.count()
    }

    /// Delivers `event` along its propagation path: capture listeners from
    /// the window down, then `target`, then back up through ancestors, the
    /// document and the window when the event bubbles.
    pub fn dispatch_event(&self, target: EventTarget, event: &Event) -> DispatchOutcome {
        let mut ancestors = Vec::new();
        if let EventTarget::Element(id) = target {
            let mut current = self.get_element(id).and_then(|element| element.parent());
            while let Some(element) = current {
                ancestors.push(EventTarget::Element(element.id()));
                current = element.parent();
            }
            ancestors.push(EventTarget::Document);
        }
        if target != EventTarget::Window {
            ancestors.push(EventTarget::Window);
        }

        let mut outcome = DispatchOutcome::default();
        let mut deliver = |step: EventTarget, phase: ListenerPhase| {
            for handler in self.listeners.handlers_for(step, &event.name, phase) {
                handler(event);
                outcome.delivered += 1;
            }
        };
        for &step in ancestors.iter().rev() {
            deliver(step, ListenerPhase::Capture);
        }
        deliver(target, ListenerPhase::Target);
        if event.bubbles {
            for &step in &ancestors {
                deliver(step, ListenerPhase::Bubble);
            }
        }
        outcome
    }

    /// Inserts a `<style data-styles>` into the head, ahead of other styles.
    pub fn insert_head_style(
        &self,
        css: &str,
        nonce: Option<&str>,
    ) -> Result<Rc<Element>, DomError> {
        let style = self.create_element("style");
        style.set_text_content(css);
        style.set_attribute_raw("data-styles", "");
        if let Some(nonce) = nonce {
            style.set_attribute_raw("nonce", nonce);
        }
        let first = self.head.children().into_iter().next();
        self.insert_before(&self.head, &style, first.as_ref())?;
        Ok(style)
    }

    /// Content of the first `<meta name="csp-nonce">` in the head.
    pub fn csp_nonce(&self) -> Option<String> {
        self.head
            .children()
            .into_iter()
            .filter(|child| child.tag_name() == "meta")
            .find(|meta| meta.get_attribute("name").as_deref() == Some("csp-nonce"))
            .and_then(|meta| meta.get_attribute("content"))
    }

    pub fn queue_microtask(&self, task: Microtask) {
        self.jobs.queue_microtask(task);
    }

    pub fn spawn_local(&self, job: LocalBoxFuture<'static, ()>) {
        self.jobs.spawn(job);
    }

    pub fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        self.timers
            .register_timer(delay, TimerKind::Timeout, callback)
    }

    pub fn clear_timeout(&self, id: TimerId) {
        self.timers.clear_timer(id);
    }

    pub fn request_animation_frame(&self, callback: Box<dyn FnOnce()>) -> TimerId {
        self.timers
            .register_timer(Duration::ZERO, TimerKind::AnimationFrame, callback)
    }

    pub fn is_timer_active(&self, id: TimerId) -> bool {
        self.timers.is_active(id)
    }

    pub fn has_pending_timers(&self) -> bool {
        self.timers.has_active_timers()
    }

    pub fn now(&self) -> Duration {
        self.timers.now()
    }

    pub fn register_waker(&self, waker: &Waker) {
        self.timers.register_waker(waker);
    }

    /// Runs microtasks, jobs and due timers until nothing is left to do at
    /// the current time. Returns whether any work ran.
    pub fn pump(&self) -> bool {
        let mut did_work = false;
        loop {
            let microtasks = self.jobs.drain_microtasks();
            let jobs = self.jobs.drain_jobs();
            let microtasks_after_jobs = self.jobs.drain_microtasks();
            if microtasks + jobs + microtasks_after_jobs > 0 {
                did_work = true;
                continue;
            }
            if self.timers.run_next_due() {
                did_work = true;
                continue;
            }
            break;
        }
        did_work
    }

    /// Moves the virtual clock forward by `duration`, firing timers in
    /// deadline order and draining microtasks between them.
    pub fn advance(&self, duration: Duration) {
        let target = self.timers.now() + duration;
        self.pump();
        if !self.timers.is_virtual() {
            return;
        }
        while let Some(deadline) = self.timers.next_deadline() {
            if deadline > target {
                break;
            }
            self.timers.set_now(deadline);
            self.pump();
        }
        self.timers.set_now(target);
        self.pump();
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.jobs.is_idle()
    }
}

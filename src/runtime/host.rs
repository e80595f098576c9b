use std::rc::Rc;
use std::time::Duration;

use futures_util::future::LocalBoxFuture;
use url::Url;

use crate::dom::{
    DispatchOutcome, Document, DomError, Element, ElementClass, Event, EventHandler, EventTarget,
    ListenerId, Microtask, TimerId,
};
use crate::meta::ListenerOptions;

/// Everything the runtime needs from its hosting environment.
pub trait Host {
    fn base_uri(&self) -> &Url;
    fn supports_shadow(&self) -> bool;

    fn define_element(&self, class: ElementClass) -> Result<(), DomError>;
    fn element_class(&self, tag_name: &str) -> Option<Rc<ElementClass>>;

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId;
    fn clear_timeout(&self, id: TimerId);
    fn request_animation_frame(&self, callback: Box<dyn FnOnce()>) -> TimerId;
    fn queue_microtask(&self, task: Microtask);
    fn spawn_local(&self, job: LocalBoxFuture<'static, ()>);

    fn add_event_listener(
        &self,
        target: EventTarget,
        event_name: &str,
        options: ListenerOptions,
        handler: EventHandler,
    ) -> ListenerId;
    fn remove_event_listener(&self, id: ListenerId);
    fn dispatch_event(&self, target: EventTarget, event: &Event) -> DispatchOutcome;

    fn set_attribute(&self, element: &Rc<Element>, name: &str, value: &str);
    fn remove_attribute(&self, element: &Rc<Element>, name: &str);
    fn document_element(&self) -> Rc<Element>;
    fn body(&self) -> Rc<Element>;
    fn insert_head_style(&self, css: &str, nonce: Option<&str>) -> Result<(), DomError>;
    /// Nonce advertised by the page through `<meta name="csp-nonce">`.
    fn csp_nonce(&self) -> Option<String>;
}

impl Host for Document {
    fn base_uri(&self) -> &Url {
        Document::base_uri(self)
    }

    fn supports_shadow(&self) -> bool {
        Document::supports_shadow(self)
    }

    fn define_element(&self, class: ElementClass) -> Result<(), DomError> {
        self.define(class)
    }

    fn element_class(&self, tag_name: &str) -> Option<Rc<ElementClass>> {
        self.registry().get(tag_name)
    }

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        Document::set_timeout(self, delay, callback)
    }

    fn clear_timeout(&self, id: TimerId) {
        Document::clear_timeout(self, id);
    }

    fn request_animation_frame(&self, callback: Box<dyn FnOnce()>) -> TimerId {
        Document::request_animation_frame(self, callback)
    }

    fn queue_microtask(&self, task: Microtask) {
        Document::queue_microtask(self, task);
    }

    fn spawn_local(&self, job: LocalBoxFuture<'static, ()>) {
        Document::spawn_local(self, job);
    }

    fn add_event_listener(
        &self,
        target: EventTarget,
        event_name: &str,
        options: ListenerOptions,
        handler: EventHandler,
    ) -> ListenerId {
        Document::add_event_listener(self, target, event_name, options, handler)
    }

    fn remove_event_listener(&self, id: ListenerId) {
        Document::remove_event_listener(self, id);
    }

    fn dispatch_event(&self, target: EventTarget, event: &Event) -> DispatchOutcome {
        Document::dispatch_event(self, target, event)
    }

    fn set_attribute(&self, element: &Rc<Element>, name: &str, value: &str) {
        Document::set_attribute(self, element, name, value);
    }

    fn remove_attribute(&self, element: &Rc<Element>, name: &str) {
        Document::remove_attribute(self, element, name);
    }

    fn document_element(&self) -> Rc<Element> {
        Document::document_element(self)
    }

    fn body(&self) -> Rc<Element> {
        Document::body(self)
    }

    fn insert_head_style(&self, css: &str, nonce: Option<&str>) -> Result<(), DomError> {
        Document::insert_head_style(self, css, nonce).map(|_| ())
    }

    fn csp_nonce(&self) -> Option<String> {
        Document::csp_nonce(self)
    }
}

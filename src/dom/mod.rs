//! Headless DOM provider: the element tree, custom element registry and
//! event loop the runtime is exercised against.

pub mod document;
pub mod element;
pub mod events;
mod jobs;
pub mod registry;
pub mod timers;

use thiserror::Error;

pub use document::{Document, DocumentConfig};
pub use element::{
    CustomElementState, Element, ElementId, ElementInternals, ShadowRootInit, ShadowRootMode,
};
pub use events::{DispatchOutcome, Event, EventHandler, EventTarget, ListenerId};
pub use jobs::Microtask;
pub use registry::{is_valid_custom_element_name, ElementClass, ElementReactions};
pub use timers::{ClockMode, TimerId, FRAME_INTERVAL};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("'{0}' is not a valid custom element name")]
    InvalidName(String),
    #[error("'{0}' has already been defined as a custom element")]
    AlreadyDefined(String),
    #[error("<{0}> already hosts a shadow root")]
    ShadowRootExists(String),
    #[error("<{0}> is not form-associated")]
    NotFormAssociated(String),
    #[error("<{0}> already attached its internals")]
    InternalsAttached(String),
    #[error("<{child}> cannot be inserted into <{parent}>")]
    HierarchyRequest { parent: String, child: String },
    #[error("<{0}> is not a child of the given parent")]
    NotAChild(String),
}

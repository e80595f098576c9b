use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use super::registry::ElementClass;
use super::DomError;

/// Stable identity of an element for the lifetime of its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowRootMode {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowRootInit {
    pub mode: ShadowRootMode,
    pub delegates_focus: bool,
}

/// Custom element state per the HTML standard, minus `failed` which the
/// reactions here cannot produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomElementState {
    Undefined,
    Custom,
}

/// Form participation handle returned by [`Element::attach_internals`].
#[derive(Debug)]
pub struct ElementInternals {
    element: Weak<Element>,
    form_value: RefCell<Option<String>>,
}

impl ElementInternals {
    pub fn element(&self) -> Option<Rc<Element>> {
        self.element.upgrade()
    }

    pub fn set_form_value(&self, value: Option<String>) {
        *self.form_value.borrow_mut() = value;
    }

    pub fn form_value(&self) -> Option<String> {
        self.form_value.borrow().clone()
    }
}

pub struct Element {
    id: ElementId,
    tag_name: String,
    attributes: RefCell<BTreeMap<String, String>>,
    text: RefCell<String>,
    parent: RefCell<Weak<Element>>,
    children: RefCell<Vec<Rc<Element>>>,
    shadow_root: Cell<Option<ShadowRootInit>>,
    connected: Cell<bool>,
    state: Cell<CustomElementState>,
    class: RefCell<Option<Rc<ElementClass>>>,
    internals: RefCell<Option<Rc<ElementInternals>>>,
    this: Weak<Element>,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.id)
            .field("tag_name", &self.tag_name)
            .field("connected", &self.connected.get())
            .field("state", &self.state.get())
            .finish()
    }
}

impl Element {
    pub(crate) fn new(id: ElementId, tag_name: String) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            id,
            tag_name,
            attributes: RefCell::new(BTreeMap::new()),
            text: RefCell::new(String::new()),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            shadow_root: Cell::new(None),
            connected: Cell::new(false),
            state: Cell::new(CustomElementState::Undefined),
            class: RefCell::new(None),
            internals: RefCell::new(None),
            this: this.clone(),
        })
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn get_attribute(&self, name: &str) -> Option<String> {
        self.attributes.borrow().get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.borrow().contains_key(name)
    }

    pub fn attributes(&self) -> Vec<(String, String)> {
        self.attributes
            .borrow()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn class_list(&self) -> Vec<String> {
        self.get_attribute("class")
            .map(|classes| classes.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class_name: &str) -> bool {
        self.class_list().iter().any(|existing| existing == class_name)
    }

    /// Adds a class token without running attribute reactions.
    pub fn add_class(&self, class_name: &str) {
        if self.has_class(class_name) {
            return;
        }
        let mut attributes = self.attributes.borrow_mut();
        let classes = attributes.entry("class".to_string()).or_default();
        if !classes.is_empty() {
            classes.push(' ');
        }
        classes.push_str(class_name);
    }

    pub fn text_content(&self) -> String {
        self.text.borrow().clone()
    }

    pub fn set_text_content(&self, text: &str) {
        *self.text.borrow_mut() = text.to_string();
    }

    pub fn parent(&self) -> Option<Rc<Element>> {
        self.parent.borrow().upgrade()
    }

    pub fn children(&self) -> Vec<Rc<Element>> {
        self.children.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }

    pub fn is_defined(&self) -> bool {
        self.state.get() == CustomElementState::Custom
    }

    pub fn custom_element_state(&self) -> CustomElementState {
        self.state.get()
    }

    pub fn element_class(&self) -> Option<Rc<ElementClass>> {
        self.class.borrow().clone()
    }

    pub fn shadow_root(&self) -> Option<ShadowRootInit> {
        self.shadow_root.get()
    }

    pub fn attach_shadow(&self, init: ShadowRootInit) -> Result<(), DomError> {
        if self.shadow_root.get().is_some() {
            return Err(DomError::ShadowRootExists(self.tag_name.clone()));
        }
        self.shadow_root.set(Some(init));
        Ok(())
    }

    pub fn attach_internals(&self) -> Result<Rc<ElementInternals>, DomError> {
        let form_associated = self
            .class
            .borrow()
            .as_ref()
            .map(|class| class.is_form_associated())
            .unwrap_or(false);
        if !form_associated {
            return Err(DomError::NotFormAssociated(self.tag_name.clone()));
        }
        let mut internals = self.internals.borrow_mut();
        if internals.is_some() {
            return Err(DomError::InternalsAttached(self.tag_name.clone()));
        }
        let attached = Rc::new(ElementInternals {
            element: self.this.clone(),
            form_value: RefCell::new(None),
        });
        *internals = Some(Rc::clone(&attached));
        Ok(attached)
    }

    /// Closest ancestor, including `self`, for which `predicate` holds.
    pub fn closest(&self, predicate: impl Fn(&Element) -> bool) -> Option<Rc<Element>> {
        let mut current = self.this.upgrade();
        while let Some(element) = current {
            if predicate(&element) {
                return Some(element);
            }
            current = element.parent();
        }
        None
    }

    pub(crate) fn set_attribute_raw(&self, name: &str, value: &str) -> Option<String> {
        self.attributes
            .borrow_mut()
            .insert(name.to_string(), value.to_string())
    }

    pub(crate) fn remove_attribute_raw(&self, name: &str) -> Option<String> {
        self.attributes.borrow_mut().remove(name)
    }

    pub(crate) fn set_parent(&self, parent: Option<&Rc<Element>>) {
        *self.parent.borrow_mut() = parent.map(Rc::downgrade).unwrap_or_default();
    }

    pub(crate) fn insert_child(&self, child: Rc<Element>, before: Option<ElementId>) {
        let mut children = self.children.borrow_mut();
        let index = before
            .and_then(|id| children.iter().position(|existing| existing.id == id))
            .unwrap_or(children.len());
        children.insert(index, child);
    }

    pub(crate) fn take_child(&self, id: ElementId) -> Option<Rc<Element>> {
        let mut children = self.children.borrow_mut();
        let index = children.iter().position(|existing| existing.id == id)?;
        Some(children.remove(index))
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.set(connected);
    }

    pub(crate) fn mark_custom(&self, class: Rc<ElementClass>) {
        *self.class.borrow_mut() = Some(class);
        self.state.set(CustomElementState::Custom);
    }

    /// Pre-order walk of the subtree rooted at `self`.
    pub(crate) fn subtree(self: &Rc<Self>) -> Vec<Rc<Element>> {
        let mut ordered = Vec::new();
        let mut stack = vec![Rc::clone(self)];
        while let Some(element) = stack.pop() {
            let children = element.children();
            stack.extend(children.into_iter().rev());
            ordered.push(element);
        }
        ordered
    }

    pub(crate) fn is_inclusive_ancestor_of(&self, other: &Element) -> bool {
        other.closest(|candidate| candidate.id == self.id).is_some()
    }
}

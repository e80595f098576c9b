use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::element::Element;
use super::DomError;

/// Callbacks the document invokes on instances of a defined class.
pub trait ElementReactions {
    fn constructed(&self, element: &Rc<Element>);
    fn connected(&self, element: &Rc<Element>);
    fn disconnected(&self, element: &Rc<Element>);

    fn attribute_changed(
        &self,
        _element: &Rc<Element>,
        _name: &str,
        _old_value: Option<&str>,
        _new_value: Option<&str>,
    ) {
    }

    fn hot_replace(&self, _element: &Rc<Element>, _version_id: &str) {}
}

/// Host-agnostic description of a custom element class.
pub struct ElementClass {
    tag_name: String,
    observed_attributes: Vec<String>,
    form_associated: bool,
    reactions: Rc<dyn ElementReactions>,
}

impl fmt::Debug for ElementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementClass")
            .field("tag_name", &self.tag_name)
            .field("observed_attributes", &self.observed_attributes)
            .field("form_associated", &self.form_associated)
            .finish()
    }
}

impl ElementClass {
    pub fn new(tag_name: impl Into<String>, reactions: Rc<dyn ElementReactions>) -> Self {
        Self {
            tag_name: tag_name.into(),
            observed_attributes: Vec::new(),
            form_associated: false,
            reactions,
        }
    }

    pub fn with_observed_attributes(mut self, attributes: Vec<String>) -> Self {
        self.observed_attributes = attributes;
        self
    }

    pub fn with_form_associated(mut self, form_associated: bool) -> Self {
        self.form_associated = form_associated;
        self
    }

    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn observed_attributes(&self) -> &[String] {
        &self.observed_attributes
    }

    pub fn observes(&self, attribute: &str) -> bool {
        self.observed_attributes.iter().any(|name| name == attribute)
    }

    pub fn is_form_associated(&self) -> bool {
        self.form_associated
    }

    pub fn reactions(&self) -> &Rc<dyn ElementReactions> {
        &self.reactions
    }

    /// Development entry point used by a dev server to hot-swap the
    /// implementation behind an already-upgraded element.
    pub fn hot_replace(&self, element: &Rc<Element>, version_id: &str) {
        self.reactions.hot_replace(element, version_id);
    }
}

const RESERVED_NAMES: &[&str] = &[
    "annotation-xml",
    "color-profile",
    "font-face",
    "font-face-src",
    "font-face-uri",
    "font-face-format",
    "font-face-name",
    "missing-glyph",
];

pub fn is_valid_custom_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_lowercase = matches!(chars.next(), Some('a'..='z'));
    starts_lowercase
        && name.contains('-')
        && !name.chars().any(|c| c.is_ascii_uppercase() || c.is_whitespace())
        && !RESERVED_NAMES.contains(&name)
}

#[derive(Default)]
pub struct CustomElementRegistry {
    definitions: RefCell<HashMap<String, Rc<ElementClass>>>,
    order: RefCell<Vec<String>>,
}

impl CustomElementRegistry {
    pub fn get(&self, tag_name: &str) -> Option<Rc<ElementClass>> {
        self.definitions.borrow().get(tag_name).cloned()
    }

    pub fn is_defined(&self, tag_name: &str) -> bool {
        self.definitions.borrow().contains_key(tag_name)
    }

    /// Tags in definition order.
    pub fn defined_tags(&self) -> Vec<String> {
        self.order.borrow().clone()
    }

    pub(crate) fn insert(&self, class: ElementClass) -> Result<Rc<ElementClass>, DomError> {
        let tag_name = class.tag_name().to_string();
        if !is_valid_custom_element_name(&tag_name) {
            return Err(DomError::InvalidName(tag_name));
        }
        if self.is_defined(&tag_name) {
            return Err(DomError::AlreadyDefined(tag_name));
        }
        let class = Rc::new(class);
        self.definitions
            .borrow_mut()
            .insert(tag_name.clone(), Rc::clone(&class));
        self.order.borrow_mut().push(tag_name);
        Ok(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_custom_element_names() {
        assert!(is_valid_custom_element_name("x-foo"));
        assert!(is_valid_custom_element_name("my-app-root"));
        assert!(!is_valid_custom_element_name("xfoo"));
        assert!(!is_valid_custom_element_name("X-foo"));
        assert!(!is_valid_custom_element_name("-foo"));
        assert!(!is_valid_custom_element_name("x-Foo"));
        assert!(!is_valid_custom_element_name("font-face"));
        assert!(!is_valid_custom_element_name(""));
    }
}

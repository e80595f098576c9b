use std::collections::BTreeMap;

use bitflags::bitflags;

use super::compact::{CompactComponent, CompactListener, CompactMember};

bitflags! {
    /// Component-level bits of the compact encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CmpFlags: u32 {
        const SHADOW_DOM_ENCAPSULATION = 1 << 0;
        const SCOPED_CSS_ENCAPSULATION = 1 << 1;
        const NEEDS_SHADOW_DOM_SHIM = 1 << 3;
        const SHADOW_DELEGATES_FOCUS = 1 << 4;
        const HAS_MODE = 1 << 5;
        const FORM_ASSOCIATED = 1 << 6;
    }
}

bitflags! {
    /// Member-level bits of the compact encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemberFlags: u32 {
        const STRING = 1 << 0;
        const NUMBER = 1 << 1;
        const BOOLEAN = 1 << 2;
        const ANY = 1 << 3;
        const UNKNOWN = 1 << 4;
        const STATE = 1 << 5;
        const METHOD = 1 << 6;
        const EVENT = 1 << 7;
        const ELEMENT = 1 << 8;
        const REFLECT_ATTR = 1 << 9;
        const MUTABLE = 1 << 10;

        const PROP = Self::STRING.bits()
            | Self::NUMBER.bits()
            | Self::BOOLEAN.bits()
            | Self::ANY.bits()
            | Self::UNKNOWN.bits();
    }
}

bitflags! {
    /// Listener-level bits of the compact encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ListenerFlags: u32 {
        const PASSIVE = 1 << 0;
        const CAPTURE = 1 << 1;
        const TARGET_DOCUMENT = 1 << 2;
        const TARGET_WINDOW = 1 << 3;
        const TARGET_BODY = 1 << 4;
        const TARGET_PARENT = 1 << 5;
    }
}

/// How a component's rendered subtree is isolated from the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encapsulation {
    Shadow { delegates_focus: bool },
    Scoped,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropType {
    String,
    Number,
    Boolean,
    Any,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Prop(PropType),
    State,
    Method,
    Event,
    Element,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberMeta {
    pub kind: MemberKind,
    pub attribute: Option<String>,
    pub reflect: bool,
    pub mutable: bool,
}

impl MemberMeta {
    /// Props and states hold values; methods, events and element refs do not.
    pub fn holds_value(&self) -> bool {
        matches!(self.kind, MemberKind::Prop(_) | MemberKind::State)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerTarget {
    Host,
    Document,
    Window,
    Body,
    Parent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    pub passive: bool,
    pub capture: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerMeta {
    pub event_name: String,
    pub method_name: String,
    pub target: ListenerTarget,
    pub options: ListenerOptions,
}

/// Typed runtime descriptor for one component tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRuntimeMeta {
    pub tag_name: String,
    pub encapsulation: Encapsulation,
    pub form_associated: bool,
    pub needs_shadow_shim: bool,
    pub has_mode: bool,
    pub members: BTreeMap<String, MemberMeta>,
    pub listeners: Vec<ListenerMeta>,
    pub watchers: BTreeMap<String, Vec<String>>,
    pub lazy_bundle_id: String,
}

impl ComponentRuntimeMeta {
    pub fn uses_shadow_dom(&self) -> bool {
        matches!(self.encapsulation, Encapsulation::Shadow { .. })
    }

    /// Pairs of `(attribute, member)` the element class should observe.
    pub fn observed_attributes(&self) -> Vec<(String, String)> {
        self.members
            .iter()
            .filter(|(_, member)| matches!(member.kind, MemberKind::Prop(_)))
            .filter_map(|(name, member)| {
                member
                    .attribute
                    .as_ref()
                    .map(|attribute| (attribute.clone(), name.clone()))
            })
            .collect()
    }

    pub fn member_for_attribute(&self, attribute: &str) -> Option<(&str, &MemberMeta)> {
        self.members
            .iter()
            .find(|(_, member)| member.attribute.as_deref() == Some(attribute))
            .map(|(name, member)| (name.as_str(), member))
    }

    pub fn watchers_for(&self, member: &str) -> &[String] {
        self.watchers.get(member).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Marks a shadow component as rendering through the scoped shim because
    /// the host cannot attach real shadow roots.
    pub(crate) fn with_shadow_shim(mut self) -> Self {
        if self.uses_shadow_dom() {
            self.needs_shadow_shim = true;
        }
        self
    }
}

/// Expand one compact tuple into its typed descriptor.
pub fn decode_component(bundle_id: &str, compact: &CompactComponent) -> ComponentRuntimeMeta {
    let flags = CmpFlags::from_bits_truncate(compact.flags);

    let encapsulation = if flags.contains(CmpFlags::SHADOW_DOM_ENCAPSULATION) {
        Encapsulation::Shadow {
            delegates_focus: flags.contains(CmpFlags::SHADOW_DELEGATES_FOCUS),
        }
    } else if flags.contains(CmpFlags::SCOPED_CSS_ENCAPSULATION) {
        Encapsulation::Scoped
    } else {
        Encapsulation::None
    };

    let members = compact
        .members
        .iter()
        .map(|(name, member)| (name.clone(), decode_member(member)))
        .collect();

    let listeners = compact.listeners.iter().map(decode_listener).collect();

    let watchers = compact
        .watchers
        .iter()
        .map(|(member, callbacks)| {
            let mut unique: Vec<String> = Vec::with_capacity(callbacks.len());
            for callback in callbacks {
                if !unique.contains(callback) {
                    unique.push(callback.clone());
                }
            }
            (member.clone(), unique)
        })
        .collect();

    ComponentRuntimeMeta {
        tag_name: compact.tag_name.clone(),
        encapsulation,
        form_associated: flags.contains(CmpFlags::FORM_ASSOCIATED),
        needs_shadow_shim: flags.contains(CmpFlags::NEEDS_SHADOW_DOM_SHIM),
        has_mode: flags.contains(CmpFlags::HAS_MODE),
        members,
        listeners,
        watchers,
        lazy_bundle_id: bundle_id.to_string(),
    }
}

fn decode_member(member: &CompactMember) -> MemberMeta {
    let flags = MemberFlags::from_bits_truncate(member.flags());

    let kind = if flags.intersects(MemberFlags::PROP) {
        let prop_type = if flags.contains(MemberFlags::STRING) {
            PropType::String
        } else if flags.contains(MemberFlags::NUMBER) {
            PropType::Number
        } else if flags.contains(MemberFlags::BOOLEAN) {
            PropType::Boolean
        } else if flags.contains(MemberFlags::ANY) {
            PropType::Any
        } else {
            PropType::Unknown
        };
        MemberKind::Prop(prop_type)
    } else if flags.contains(MemberFlags::STATE) {
        MemberKind::State
    } else if flags.contains(MemberFlags::METHOD) {
        MemberKind::Method
    } else if flags.contains(MemberFlags::EVENT) {
        MemberKind::Event
    } else if flags.contains(MemberFlags::ELEMENT) {
        MemberKind::Element
    } else {
        MemberKind::Prop(PropType::Unknown)
    };

    MemberMeta {
        kind,
        attribute: member.attribute().map(str::to_string),
        reflect: flags.contains(MemberFlags::REFLECT_ATTR),
        mutable: flags.contains(MemberFlags::MUTABLE),
    }
}

fn decode_listener(listener: &CompactListener) -> ListenerMeta {
    let CompactListener(bits, event_name, method_name) = listener;
    let flags = ListenerFlags::from_bits_truncate(*bits);

    let target = if flags.contains(ListenerFlags::TARGET_DOCUMENT) {
        ListenerTarget::Document
    } else if flags.contains(ListenerFlags::TARGET_WINDOW) {
        ListenerTarget::Window
    } else if flags.contains(ListenerFlags::TARGET_BODY) {
        ListenerTarget::Body
    } else if flags.contains(ListenerFlags::TARGET_PARENT) {
        ListenerTarget::Parent
    } else {
        ListenerTarget::Host
    };

    ListenerMeta {
        event_name: event_name.clone(),
        method_name: method_name.clone(),
        target,
        options: ListenerOptions {
            passive: flags.contains(ListenerFlags::PASSIVE),
            capture: flags.contains(ListenerFlags::CAPTURE),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::compact::{CompactEntry, Manifest};
    use serde_json::json;

    fn single(value: serde_json::Value) -> ComponentRuntimeMeta {
        let manifest = Manifest::from_value(json!([["bundle", [value]]])).expect("manifest");
        match &manifest.bundles()[0].entries[0] {
            CompactEntry::Component(cmp) => decode_component("bundle", cmp),
            CompactEntry::Malformed(value) => panic!("malformed entry {value}"),
        }
    }

    #[test]
    fn decodes_encapsulation_modes() {
        assert_eq!(single(json!([0, "x-a", {}, []])).encapsulation, Encapsulation::None);
        assert_eq!(single(json!([2, "x-b", {}, []])).encapsulation, Encapsulation::Scoped);
        assert_eq!(
            single(json!([1 | 16, "x-c", {}, []])).encapsulation,
            Encapsulation::Shadow {
                delegates_focus: true
            }
        );
    }

    #[test]
    fn decodes_form_associated_and_bundle_id() {
        let meta = single(json!([64, "x-input", {}, []]));
        assert!(meta.form_associated);
        assert_eq!(meta.lazy_bundle_id, "bundle");
    }

    #[test]
    fn decodes_members_with_reflection() {
        let meta = single(json!([0, "x-m", {
            "label": [1 | 512, "label"],
            "count": [32],
            "open": [4, "is-open"],
            "focusInput": [64]
        }, []]));
        assert_eq!(meta.members["label"].kind, MemberKind::Prop(PropType::String));
        assert!(meta.members["label"].reflect);
        assert_eq!(meta.members["count"].kind, MemberKind::State);
        assert_eq!(meta.members["focusInput"].kind, MemberKind::Method);
        assert_eq!(
            meta.member_for_attribute("is-open").map(|(name, _)| name),
            Some("open")
        );
        let observed = meta.observed_attributes();
        assert!(observed.contains(&("label".to_string(), "label".to_string())));
        assert!(observed.contains(&("is-open".to_string(), "open".to_string())));
        assert_eq!(observed.len(), 2);
    }

    #[test]
    fn decodes_listener_targets_in_order() {
        let meta = single(json!([0, "x-l", {}, [
            [0, "click", "onClick"],
            [4 | 1, "scroll", "onScroll"],
            [8, "resize", "onResize"]
        ]]));
        let targets: Vec<_> = meta.listeners.iter().map(|l| l.target).collect();
        assert_eq!(
            targets,
            vec![ListenerTarget::Host, ListenerTarget::Document, ListenerTarget::Window]
        );
        assert!(meta.listeners[1].options.passive);
    }

    #[test]
    fn deduplicates_watch_callbacks() {
        let meta = single(json!([0, "x-w", {"value": [1, "value"]}, [], {
            "value": ["valueChanged", "valueChanged", "log"]
        }]));
        assert_eq!(meta.watchers_for("value"), ["valueChanged", "log"]);
        assert!(meta.watchers_for("other").is_empty());
    }
}

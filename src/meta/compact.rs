use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, IgnoredAny, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Errors raised while reading the manifest container itself.
///
/// Individual component entries never fail the whole manifest; they land in
/// [`CompactEntry::Malformed`] and are skipped at bootstrap.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid manifest json: {0}")]
    Json(#[from] serde_json::Error),
}

/// The full set of lazy bundles emitted by the build, in load order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    bundles: Vec<LazyBundle>,
}

impl Manifest {
    pub fn new(bundles: Vec<LazyBundle>) -> Self {
        Self { bundles }
    }

    pub fn from_json(source: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn from_value(value: JsonValue) -> Result<Self, ManifestError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn bundles(&self) -> &[LazyBundle] {
        &self.bundles
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.iter().all(|bundle| bundle.entries.is_empty())
    }
}

/// `[lazyBundleId, [compactComponent, ...]]`
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "(String, Vec<CompactEntry>)")]
pub struct LazyBundle {
    pub id: String,
    pub entries: Vec<CompactEntry>,
}

impl From<(String, Vec<CompactEntry>)> for LazyBundle {
    fn from((id, entries): (String, Vec<CompactEntry>)) -> Self {
        Self { id, entries }
    }
}

/// One position in a bundle's component list.
///
/// Anything that does not parse as a compact component tuple is kept verbatim
/// so the registrar can report and skip it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CompactEntry {
    Component(CompactComponent),
    Malformed(JsonValue),
}

/// `[flags, tagName, members, listeners, watchers?]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactComponent {
    pub flags: u32,
    pub tag_name: String,
    pub members: BTreeMap<String, CompactMember>,
    pub listeners: Vec<CompactListener>,
    pub watchers: BTreeMap<String, Vec<String>>,
}

/// `[memberFlags, attributeName?]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CompactMember {
    WithAttribute(u32, Option<String>),
    Flags([u32; 1]),
}

impl CompactMember {
    pub fn flags(&self) -> u32 {
        match self {
            Self::WithAttribute(flags, _) => *flags,
            Self::Flags([flags]) => *flags,
        }
    }

    pub fn attribute(&self) -> Option<&str> {
        match self {
            Self::WithAttribute(_, attribute) => attribute.as_deref(),
            Self::Flags(_) => None,
        }
    }
}

/// `[listenerFlags, eventName, methodName]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompactListener(pub u32, pub String, pub String);

impl<'de> Deserialize<'de> for CompactComponent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(CompactComponentVisitor)
    }
}

struct CompactComponentVisitor;

impl<'de> Visitor<'de> for CompactComponentVisitor {
    type Value = CompactComponent;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(
            "a compact component tuple [flags, tagName, members, listeners, watchers?]",
        )
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let flags: u32 = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let tag_name: String = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;

        // Trailing positions are optional and may also be explicit nulls.
        let members = seq
            .next_element::<Option<BTreeMap<String, CompactMember>>>()?
            .flatten()
            .unwrap_or_default();
        let listeners = seq
            .next_element::<Option<Vec<CompactListener>>>()?
            .flatten()
            .unwrap_or_default();
        let watchers = seq
            .next_element::<Option<BTreeMap<String, Vec<String>>>>()?
            .flatten()
            .unwrap_or_default();

        while seq.next_element::<IgnoredAny>()?.is_some() {}

        Ok(CompactComponent {
            flags,
            tag_name,
            members,
            listeners,
            watchers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_tuple() {
        let manifest = Manifest::from_value(json!([["bundleA", [[0, "x-foo", {}, []]]]]))
            .expect("manifest");
        let bundle = &manifest.bundles()[0];
        assert_eq!(bundle.id, "bundleA");
        match &bundle.entries[0] {
            CompactEntry::Component(cmp) => {
                assert_eq!(cmp.tag_name, "x-foo");
                assert!(cmp.members.is_empty());
                assert!(cmp.listeners.is_empty());
                assert!(cmp.watchers.is_empty());
            }
            CompactEntry::Malformed(value) => panic!("unexpected malformed entry {value}"),
        }
    }

    #[test]
    fn tolerates_missing_listeners_and_watchers() {
        let manifest =
            Manifest::from_value(json!([["b", [[1, "x-short", {"first": [1, "first"]}]]]]))
                .expect("manifest");
        let CompactEntry::Component(cmp) = &manifest.bundles()[0].entries[0] else {
            panic!("expected component");
        };
        assert_eq!(cmp.members["first"].attribute(), Some("first"));
        assert!(cmp.listeners.is_empty());
    }

    #[test]
    fn accepts_members_without_attribute() {
        let manifest = Manifest::from_value(json!([
            ["b", [[0, "x-state", {"count": [32]}, null, null]]]
        ]))
        .expect("manifest");
        let CompactEntry::Component(cmp) = &manifest.bundles()[0].entries[0] else {
            panic!("expected component");
        };
        assert_eq!(cmp.members["count"].flags(), 32);
        assert_eq!(cmp.members["count"].attribute(), None);
    }

    #[test]
    fn keeps_malformed_entries_without_failing() {
        let manifest = Manifest::from_value(json!([["b", ["not-a-tuple", [0, "x-ok", {}, []]]]]))
            .expect("manifest");
        let entries = &manifest.bundles()[0].entries;
        assert!(matches!(entries[0], CompactEntry::Malformed(_)));
        assert!(matches!(entries[1], CompactEntry::Component(_)));
    }

    #[test]
    fn rejects_non_array_container() {
        assert!(Manifest::from_json("{\"bundle\": 1}").is_err());
    }
}

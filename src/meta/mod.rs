//! Component manifest: the compact build-time encoding and its typed runtime form.

pub mod compact;
pub mod decode;

pub use compact::{CompactComponent, CompactEntry, LazyBundle, Manifest, ManifestError};
pub use decode::{
    decode_component, ComponentRuntimeMeta, Encapsulation, ListenerMeta, ListenerOptions,
    ListenerTarget, MemberKind, MemberMeta, PropType,
};

// Library exports

pub mod dom;
pub mod meta;
pub mod runtime;

// Re-export commonly used types for tests
pub use dom::{Document, DocumentConfig, Element};
pub use meta::Manifest;
pub use runtime::{
    AppLoadReason, BootstrapBatch, BootstrapOptions, Component, ComponentInit, Host,
    RuntimeContext, StaticBundleLoader,
};

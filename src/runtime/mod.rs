//! The lazy-loading runtime: bootstrap, scheduling and per-element
//! lifecycle, written against the [`Host`] seam.

pub mod component;
pub mod context;
pub mod deferred;
pub mod diagnostics;
pub mod host;
pub mod host_ref;
pub mod lifecycle;
pub mod registrar;
pub mod scheduler;
pub mod watchdog;

use thiserror::Error;

pub use component::{
    BundleLoader, Component, ComponentFactory, ComponentInit, HostHandle, LoadError, LoadFuture,
    LoadRequest, StaticBundleLoader,
};
pub use context::{ContextValue, PlatformFlags, RuntimeContext, RuntimeContextBuilder};
pub use deferred::{BootstrapPhase, DeferredConnections};
pub use diagnostics::{Diagnostic, DiagnosticSource, Diagnostics};
pub use host::Host;
pub use host_ref::{
    HostFlags, HostRef, HostRefError, HostRefStore, ReadyError, ReadyFuture, SharedHostRef,
};
pub use lifecycle::{parse_prop_value, when_ready};
pub use registrar::{
    bootstrap_lazy, element_class, BootstrapBatch, BootstrapOptions, SkipReason, SkippedComponent,
    TagTransform,
};
pub use scheduler::{QueueMode, Task, TaskPhase, TaskQueue};
pub use watchdog::{AppLoadReason, AppLoadWatchdog, APP_LOAD_GRACE};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("<{0}> has no component host record")]
    NotRegistered(String),
    #[error("<{tag_name}> has no value member '{member}'")]
    UnknownMember { tag_name: String, member: String },
    #[error("runtime context has been dropped")]
    ContextDropped,
    #[error("host element has been dropped")]
    ElementDropped,
    #[error(transparent)]
    NotReady(#[from] ReadyError),
}

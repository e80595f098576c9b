use std::any::Any;
use std::cell::RefCell;
use std::fmt;

use tracing::error;

/// Where an isolated fault came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticSource {
    Task { phase: &'static str },
    Lifecycle { tag_name: String, hook: &'static str },
    Loader { tag_name: String },
    Bootstrap { tag_name: Option<String> },
    Watcher { tag_name: String, callback: String },
    Listener { tag_name: String, method: String },
}

impl fmt::Display for DiagnosticSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task { phase } => write!(f, "{phase} task"),
            Self::Lifecycle { tag_name, hook } => write!(f, "<{tag_name}> {hook}"),
            Self::Loader { tag_name } => write!(f, "<{tag_name}> module load"),
            Self::Bootstrap { tag_name: Some(tag) } => write!(f, "bootstrap of <{tag}>"),
            Self::Bootstrap { tag_name: None } => f.write_str("bootstrap"),
            Self::Watcher { tag_name, callback } => write!(f, "<{tag_name}> watcher {callback}"),
            Self::Listener { tag_name, method } => write!(f, "<{tag_name}> listener {method}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub source: DiagnosticSource,
    pub message: String,
}

/// Collects faults caught at isolation boundaries. Every entry is also
/// emitted through `tracing`.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: RefCell<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn report(&self, source: DiagnosticSource, message: impl Into<String>) {
        let message = message.into();
        error!(target: "diagnostics", %source, "{message}");
        self.entries.borrow_mut().push(Diagnostic { source, message });
    }

    pub fn report_error(&self, source: DiagnosticSource, err: &anyhow::Error) {
        self.report(source, format!("{err:#}"));
    }

    pub fn report_panic(&self, source: DiagnosticSource, payload: Box<dyn Any + Send>) {
        self.report(source, format!("panicked: {}", panic_message(payload.as_ref())));
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// Runs `f`, routing both returned errors and panics to `diagnostics`.
/// Returns whether `f` completed successfully.
pub(crate) fn isolate<F>(
    diagnostics: &Diagnostics,
    source: impl FnOnce() -> DiagnosticSource,
    f: F,
) -> bool
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            diagnostics.report_error(source(), &err);
            false
        }
        Err(payload) => {
            diagnostics.report_panic(source(), payload);
            false
        }
    }
}

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use lazy_elements::dom::{Document, DocumentConfig, Element, Event, FRAME_INTERVAL};
use lazy_elements::meta::Manifest;
use lazy_elements::runtime::{
    BootstrapBatch, BootstrapOptions, Component, ComponentFactory, ComponentInit, Host,
    HostHandle, RuntimeContext, StaticBundleLoader,
};
use serde_json::Value as JsonValue;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub type Journal = Rc<RefCell<Vec<String>>>;

/// Component that writes every hook it sees into a shared journal.
pub struct Recorder {
    pub tag: String,
    pub journal: Journal,
    pub host: HostHandle,
}

impl Recorder {
    fn log(&self, entry: impl std::fmt::Display) {
        self.journal
            .borrow_mut()
            .push(format!("{}:{}", self.tag, entry));
    }
}

impl Component for Recorder {
    fn connected_callback(&self) -> anyhow::Result<()> {
        self.log("connected");
        Ok(())
    }

    fn disconnected_callback(&self) -> anyhow::Result<()> {
        self.log("disconnected");
        Ok(())
    }

    fn component_will_load(&self) -> anyhow::Result<()> {
        self.log("willLoad");
        Ok(())
    }

    fn component_did_load(&self) -> anyhow::Result<()> {
        self.log("didLoad");
        Ok(())
    }

    fn component_will_update(&self) -> anyhow::Result<()> {
        self.log("willUpdate");
        Ok(())
    }

    fn component_did_update(&self) -> anyhow::Result<()> {
        self.log("didUpdate");
        Ok(())
    }

    fn render(&self) -> anyhow::Result<()> {
        self.log("render");
        Ok(())
    }

    fn watch(
        &self,
        callback: &str,
        new_value: &JsonValue,
        _old_value: Option<&JsonValue>,
    ) -> anyhow::Result<()> {
        self.log(format!("watch:{callback}:{new_value}"));
        Ok(())
    }

    fn handle_event(&self, method: &str, event: &Event) -> anyhow::Result<()> {
        self.log(format!("event:{method}:{}", event.name));
        Ok(())
    }
}

pub fn recorder_factory(tag: &str, journal: &Journal) -> Rc<dyn ComponentFactory> {
    let tag = tag.to_string();
    let journal = Rc::clone(journal);
    Rc::new(move |init: ComponentInit| -> anyhow::Result<Rc<dyn Component>> {
        journal.borrow_mut().push(format!("{tag}:constructor"));
        Ok(Rc::new(Recorder {
            tag: tag.clone(),
            journal: Rc::clone(&journal),
            host: init.host,
        }))
    })
}

pub struct Harness {
    pub document: Rc<Document>,
    pub loader: Rc<StaticBundleLoader>,
    pub ctx: Rc<RuntimeContext>,
    pub journal: Journal,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(DocumentConfig::default())
    }

    pub fn with_config(config: DocumentConfig) -> Self {
        init_tracing();
        let document = Document::new(config);
        let loader = Rc::new(StaticBundleLoader::new());
        let host: Rc<dyn Host> = document.clone();
        let ctx = RuntimeContext::builder(host)
            .namespace("test-app")
            .loader(loader.clone())
            .build();
        Self {
            document,
            loader,
            ctx,
            journal: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Makes `tag` loadable from `bundle` as a [`Recorder`].
    pub fn register(&self, bundle: &str, tag: &str) {
        self.loader
            .register(bundle, tag, recorder_factory(tag, &self.journal));
    }

    pub fn bootstrap(&self, manifest: JsonValue, options: BootstrapOptions) -> Rc<BootstrapBatch> {
        let manifest = Manifest::from_value(manifest).expect("manifest");
        self.ctx.bootstrap(&manifest, options)
    }

    pub fn mount(&self, parent: &Rc<Element>, tag: &str) -> Rc<Element> {
        let element = self.document.create_element(tag);
        self.document
            .append_child(parent, &element)
            .expect("append child");
        element
    }

    /// Runs frames until the runtime has nothing left to do, or one second
    /// of virtual time has passed.
    pub fn settle(&self) {
        for _ in 0..(1000 / FRAME_INTERVAL.as_millis() as u64) {
            self.document.advance(FRAME_INTERVAL);
            if !self.document.has_pending_timers() && !self.document.has_pending_jobs() {
                break;
            }
        }
    }

    pub fn advance(&self, millis: u64) {
        self.document.advance(Duration::from_millis(millis));
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.borrow().clone()
    }

    pub fn journal_for(&self, tag: &str) -> Vec<String> {
        let prefix = format!("{tag}:");
        self.journal
            .borrow()
            .iter()
            .filter_map(|entry| entry.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    pub fn clear_journal(&self) {
        self.journal.borrow_mut().clear();
    }
}

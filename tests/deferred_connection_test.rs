mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{init_tracing, recorder_factory, Journal};
use futures_util::future::{self, FutureExt};
use lazy_elements::dom::{Document, DocumentConfig, FRAME_INTERVAL};
use lazy_elements::meta::Manifest;
use lazy_elements::runtime::{
    BootstrapOptions, BundleLoader, Host, LoadFuture, LoadRequest, RuntimeContext,
};
use serde_json::json;

/// Records how many tags were defined when each module was requested.
struct ObservingLoader {
    document: Rc<Document>,
    journal: Journal,
    seen: RefCell<Vec<(String, usize)>>,
}

impl BundleLoader for ObservingLoader {
    fn load(&self, request: LoadRequest) -> LoadFuture {
        let defined = self.document.registry().defined_tags().len();
        self.seen.borrow_mut().push((request.tag_name.clone(), defined));
        let factory = recorder_factory(&request.tag_name, &self.journal);
        future::ready(Ok(factory)).boxed_local()
    }
}

fn setup() -> (Rc<Document>, Rc<ObservingLoader>, Rc<RuntimeContext>) {
    init_tracing();
    let document = Document::new(DocumentConfig::default());
    let loader = Rc::new(ObservingLoader {
        document: Rc::clone(&document),
        journal: Rc::new(RefCell::new(Vec::new())),
        seen: RefCell::new(Vec::new()),
    });
    let host: Rc<dyn Host> = document.clone();
    let ctx = RuntimeContext::builder(host).loader(loader.clone()).build();
    (document, loader, ctx)
}

#[tokio::test]
async fn connections_wait_for_every_definition() {
    let (document, loader, ctx) = setup();
    for tag in ["x-c", "x-b", "x-a"] {
        let element = document.create_element(tag);
        document.append_child(&document.body(), &element).expect("append");
    }

    let manifest = Manifest::from_value(json!([
        ["bundle-1", [[0, "x-a", {}, []], [0, "x-b", {}, []]]],
        ["bundle-2", [[0, "x-c", {}, []]]]
    ]))
    .expect("manifest");
    let batch = ctx.bootstrap(&manifest, BootstrapOptions::default());
    assert!(!batch.is_bootstrapping());

    let seen = loader.seen.borrow().clone();
    assert_eq!(
        seen,
        vec![
            ("x-a".to_string(), 3),
            ("x-b".to_string(), 3),
            ("x-c".to_string(), 3)
        ]
    );
}

#[tokio::test]
async fn later_connections_run_immediately() {
    let (document, loader, ctx) = setup();
    let manifest =
        Manifest::from_value(json!([["bundle-1", [[0, "x-a", {}, []]]]])).expect("manifest");
    ctx.bootstrap(&manifest, BootstrapOptions::default());
    assert!(loader.seen.borrow().is_empty());

    let element = document.create_element("x-a");
    document.append_child(&document.body(), &element).expect("append");
    assert_eq!(loader.seen.borrow().len(), 1);

    document.advance(FRAME_INTERVAL);
    assert!(element.has_class("hydrated"));
}

#[tokio::test]
async fn element_removed_during_bootstrap_is_not_connected() {
    let (document, loader, ctx) = setup();
    let kept = document.create_element("x-kept");
    document.append_child(&document.body(), &kept).expect("append");
    let removed = document.create_element("x-gone");
    document.append_child(&document.body(), &removed).expect("append");

    let manifest = Manifest::from_value(json!([
        ["bundle-1", [[0, "x-gone", {}, []], [0, "x-kept", {}, []]]]
    ]))
    .expect("manifest");

    // Remove the first element while the second definition is still pending.
    let body = document.body();
    let doc = Rc::clone(&document);
    let target = Rc::clone(&removed);
    let options = BootstrapOptions::default().with_transform_tag_name(move |tag| {
        if tag == "x-kept" && target.is_connected() {
            doc.remove_child(&body, &target).expect("remove");
        }
        tag.to_string()
    });
    ctx.bootstrap(&manifest, options);

    let seen: Vec<String> = loader.seen.borrow().iter().map(|(tag, _)| tag.clone()).collect();
    assert_eq!(seen, vec!["x-kept"]);
    let host_ref = ctx.host_ref(&removed).expect("host ref");
    assert!(host_ref.borrow().flags().is_empty());
}

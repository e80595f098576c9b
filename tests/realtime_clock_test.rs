mod common;

use std::rc::Rc;

use common::{init_tracing, recorder_factory};
use lazy_elements::dom::{ClockMode, Document, DocumentConfig};
use lazy_elements::meta::Manifest;
use lazy_elements::runtime::{
    AppLoadReason, BootstrapOptions, Host, RuntimeContext, StaticBundleLoader,
};
use serde_json::json;
use tokio::time::{sleep, Duration};

fn realtime_document() -> Rc<Document> {
    Document::new(DocumentConfig {
        clock: ClockMode::Realtime,
        ..DocumentConfig::default()
    })
}

#[tokio::test]
async fn fallback_timer_fires_on_tokio_clock() {
    init_tracing();
    let document = realtime_document();
    let host: Rc<dyn Host> = document.clone();
    let ctx = RuntimeContext::builder(host).build();
    let manifest =
        Manifest::from_value(json!([["bundle-a", [[0, "x-idle", {}, []]]]])).expect("manifest");
    let batch = ctx.bootstrap(&manifest, BootstrapOptions::default());

    document.pump();
    assert_eq!(batch.app_load(), None);

    // Wait past the grace period, then run whatever fired
    sleep(Duration::from_millis(80)).await;
    document.pump();
    assert_eq!(batch.app_load(), Some(AppLoadReason::Timeout));
    assert!(document.document_element().has_class("hydrated"));
}

#[tokio::test]
async fn components_load_across_real_frames() {
    init_tracing();
    let document = realtime_document();
    let loader = Rc::new(StaticBundleLoader::new());
    let journal = Rc::new(std::cell::RefCell::new(Vec::new()));
    loader.register("bundle-a", "x-live", recorder_factory("x-live", &journal));
    let host: Rc<dyn Host> = document.clone();
    let ctx = RuntimeContext::builder(host).loader(loader).build();
    let manifest =
        Manifest::from_value(json!([["bundle-a", [[0, "x-live", {}, []]]]])).expect("manifest");
    let batch = ctx.bootstrap(&manifest, BootstrapOptions::default());

    let element = document.create_element("x-live");
    document.append_child(&document.body(), &element).expect("append");

    for _ in 0..20 {
        document.pump();
        if batch.app_load().is_some() {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(batch.app_load(), Some(AppLoadReason::Natural));
    assert!(element.has_class("hydrated"));
    assert!(journal.borrow().contains(&"x-live:didLoad".to_string()));
}

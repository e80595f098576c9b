mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::Harness;
use lazy_elements::dom::{Event, EventTarget};
use lazy_elements::meta::ListenerOptions;
use lazy_elements::runtime::{AppLoadReason, BootstrapOptions, DiagnosticSource, PlatformFlags};
use serde_json::json;

fn capture_appload(harness: &Harness) -> Rc<RefCell<Vec<Event>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    harness.document.add_event_listener(
        EventTarget::Window,
        "appload",
        ListenerOptions::default(),
        Rc::new(move |event: &Event| sink.borrow_mut().push(event.clone())),
    );
    events
}

#[tokio::test]
async fn fallback_fires_once_when_nothing_connects() {
    let harness = Harness::new();
    let events = capture_appload(&harness);
    let batch = harness.bootstrap(
        json!([["bundle-a", [[0, "x-foo", {}, []]]]]),
        BootstrapOptions::default(),
    );
    assert!(batch.is_app_load_armed());

    harness.advance(29);
    assert_eq!(batch.app_load(), None);
    harness.advance(1);
    assert_eq!(batch.app_load(), Some(AppLoadReason::Timeout));

    harness.advance(500);
    let events = events.borrow();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].detail, json!({"namespace": "test-app", "reason": "timeout"}));
    assert!(harness.document.document_element().has_class("hydrated"));
    assert!(harness.ctx.platform_flags().contains(PlatformFlags::APP_LOADED));
}

#[tokio::test]
async fn connection_cancels_fallback_and_loads_naturally() {
    let harness = Harness::new();
    harness.register("bundle-a", "x-foo");
    let events = capture_appload(&harness);
    let batch = harness.bootstrap(
        json!([["bundle-a", [[0, "x-foo", {}, []]]]]),
        BootstrapOptions::default(),
    );

    harness.advance(10);
    harness.mount(&harness.document.body(), "x-foo");
    assert!(!batch.is_app_load_armed());

    harness.settle();
    assert_eq!(batch.app_load(), Some(AppLoadReason::Natural));
    harness.advance(500);
    assert_eq!(events.borrow().len(), 1);
    assert_eq!(events.borrow()[0].detail["reason"], json!("natural"));
}

#[tokio::test]
async fn connection_just_before_deadline_wins() {
    let harness = Harness::new();
    harness.register("bundle-a", "x-foo");
    let events = capture_appload(&harness);
    let batch = harness.bootstrap(
        json!([["bundle-a", [[0, "x-foo", {}, []]]]]),
        BootstrapOptions::default(),
    );

    harness.advance(29);
    harness.mount(&harness.document.body(), "x-foo");
    harness.settle();

    assert_eq!(batch.app_load(), Some(AppLoadReason::Natural));
    assert_eq!(events.borrow().len(), 1);
}

#[tokio::test]
async fn deferred_connections_skip_the_fallback() {
    let harness = Harness::new();
    harness.register("bundle-a", "x-foo");
    harness.mount(&harness.document.body(), "x-foo");
    let batch = harness.bootstrap(
        json!([["bundle-a", [[0, "x-foo", {}, []]]]]),
        BootstrapOptions::default(),
    );

    assert!(!batch.is_app_load_armed());
    harness.settle();
    assert_eq!(batch.app_load(), Some(AppLoadReason::Natural));
}

#[tokio::test]
async fn subscribers_see_the_signal_once() {
    let harness = Harness::new();
    let batch = harness.bootstrap(
        json!([["bundle-a", [[0, "x-foo", {}, []]]]]),
        BootstrapOptions::default(),
    );
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    batch.on_app_load(move |reason| sink.borrow_mut().push(reason));

    harness.advance(100);
    assert_eq!(*seen.borrow(), vec![AppLoadReason::Timeout]);
}

#[tokio::test]
async fn app_load_waits_for_the_root_component() {
    let harness = Harness::new();
    harness.register("bundle-a", "x-parent");
    harness.register("bundle-a", "x-child");
    let batch = harness.bootstrap(
        json!([["bundle-a", [[0, "x-parent", {}, []], [0, "x-child", {}, []]]]]),
        BootstrapOptions::default(),
    );
    let journal = Rc::clone(&harness.journal);
    batch.on_app_load(move |_| journal.borrow_mut().push("app:loaded".to_string()));

    let parent = harness.document.create_element("x-parent");
    let child = harness.document.create_element("x-child");
    harness.document.append_child(&parent, &child).expect("append");
    harness.document.append_child(&harness.document.body(), &parent).expect("append");
    harness.settle();

    let journal = harness.journal();
    let position = |entry: &str| {
        journal
            .iter()
            .position(|candidate| candidate == entry)
            .unwrap_or_else(|| panic!("missing {entry} in {journal:?}"))
    };
    assert!(position("x-child:didLoad") < position("x-parent:didLoad"));
    assert!(position("x-parent:didLoad") < position("app:loaded"));
    assert_eq!(batch.app_load(), Some(AppLoadReason::Natural));
}

#[tokio::test]
async fn failed_root_load_still_signals() {
    let harness = Harness::new();
    let batch = harness.bootstrap(
        json!([["bundle-missing", [[0, "x-lost", {}, []]]]]),
        BootstrapOptions::default(),
    );
    harness.mount(&harness.document.body(), "x-lost");
    harness.settle();

    assert_eq!(batch.app_load(), Some(AppLoadReason::Natural));
    let diagnostics = harness.ctx.diagnostics().entries();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
        diagnostics[0].source,
        DiagnosticSource::Loader {
            tag_name: "x-lost".to_string()
        }
    );
}

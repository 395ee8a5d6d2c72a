use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use assetshim::bootstrap::bootstrap;
use assetshim::classifier;
use assetshim::dom::{DomError, Page, RequestDispatch, DONE};
use assetshim::models::ElementKind;
use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Request, Response};

const IMAGE: &str = "https://framerusercontent.com/images/foo.png?v=2";
const LOCAL_IMAGE: &str = "/framerusercontent.com/images/foo.png";

#[derive(Default)]
struct RecordingTransport {
    calls: AtomicUsize,
}

impl RequestDispatch for RecordingTransport {
    fn fetch(
        &self,
        _request: Request<Bytes>,
    ) -> BoxFuture<'static, Result<Response<Bytes>, DomError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(Response::new(Bytes::from_static(b"real"))) })
    }
}

fn loaded_page() -> (Page, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let page = Page::with_transport(transport.clone());
    (page, transport)
}

#[test]
fn parsed_image_is_rewritten_by_purge_pass() {
    let (mut page, _) = loaded_page();
    let img = page.create_element("img");
    page.document_mut().set_attribute(img, "src", IMAGE).unwrap();
    let body = page.document().body();
    page.parser_append(body, img).unwrap();

    let report = bootstrap(&mut page);
    assert!(report.failed_steps.is_empty(), "{:?}", report.failed_steps);
    assert_eq!(page.document().attribute(img, "src"), Some(LOCAL_IMAGE));
}

#[test]
fn late_tracking_script_is_gone_before_next_task() {
    let (mut page, _) = loaded_page();
    bootstrap(&mut page);

    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    page.event_loop()
        .set_timeout(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let script = page.create_element("script");
    page.document_mut()
        .set_attribute(script, "src", "https://events.framer.com/track.js")
        .unwrap();
    let body = page.document().body();
    page.parser_append(body, script).unwrap();

    page.run_microtasks();
    assert!(!page.document().is_connected(script));
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    page.run_until_idle();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn blocked_urls_never_survive_any_insertion_path() {
    let (mut page, _) = loaded_page();
    bootstrap(&mut page);
    let body = page.document().body();
    let blocked = "https://framer.com/m/Component.js";

    let by_property = page.create_element("script");
    page.set_property(by_property, "src", blocked).unwrap();
    page.append_child(body, by_property).unwrap();

    let by_attribute = page.create_element("script");
    page.set_attribute(by_attribute, "src", blocked).unwrap();
    page.append_child(body, by_attribute).unwrap();

    let raw = page.create_element("script");
    page.document_mut().set_attribute(raw, "src", blocked).unwrap();
    page.append_child(body, raw).unwrap();

    let parsed = page.create_element("script");
    page.document_mut().set_attribute(parsed, "src", blocked).unwrap();
    page.parser_append(body, parsed).unwrap();

    page.run_until_idle();
    let doc = page.document();
    for script in doc.elements_by_tag(doc.root(), &["script"]) {
        assert_ne!(doc.attribute(script, "src"), Some(blocked));
    }
}

#[tokio::test]
async fn cms_request_resolves_locally() {
    let (mut page, transport) = loaded_page();
    bootstrap(&mut page);

    let response = page
        .fetch_url("https://framerusercontent.com/cms/list")
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let json: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(json, serde_json::json!({ "items": [] }));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

    let passthrough = page.fetch_url("https://example.com/data.json").await.unwrap();
    assert_eq!(passthrough.body().as_ref(), b"real");
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn legacy_cms_request_completes_asynchronously() {
    let (mut page, transport) = loaded_page();
    bootstrap(&mut page);

    let request = page.new_request();
    let events = Arc::new(Mutex::new(Vec::new()));
    let on_change = events.clone();
    request.set_on_ready_state_change(move |req| {
        on_change.lock().unwrap().push(format!("change:{}", req.ready_state()));
    });
    let on_load = events.clone();
    request.set_on_load(move |req| {
        on_load.lock().unwrap().push(format!("load:{}", req.status()));
    });

    page.open(&request, "GET", "https://framerusercontent.com/cms/items.json")
        .unwrap();
    page.send(&request, None).unwrap();
    assert!(events.lock().unwrap().is_empty());

    page.run_until_idle();
    assert_eq!(request.ready_state(), DONE);
    assert_eq!(request.response_text(), r#"{"items":[]}"#);
    assert_eq!(
        *events.lock().unwrap(),
        vec!["change:4".to_string(), "load:200".to_string()]
    );
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn external_font_face_is_dropped_from_inline_style() {
    let (mut page, _) = loaded_page();
    let style = page.create_element("style");
    let css = page.create_text(
        "@font-face{src:url(https://fonts.gstatic.com/x.woff2)}\nbody{margin:0}",
    );
    page.document_mut().append_child(style, css).unwrap();
    let head = page.document().head();
    page.parser_append(head, style).unwrap();

    bootstrap(&mut page);
    let rules = page
        .document()
        .style_sheet_for(style)
        .unwrap()
        .css_rules()
        .unwrap();
    assert!(rules.iter().all(|rule| !rule.css_text.contains("fonts.gstatic.com")));
    assert_eq!(rules.len(), 1);
}

#[test]
fn image_rewrite_is_idempotent() {
    for url in [
        IMAGE,
        "https://framerusercontent.com/images/a/b.webp#frag",
        "https://framerusercontent.com/images/c.jpg",
    ] {
        let once = classifier::substitute(url, ElementKind::Image, "src").unwrap();
        let twice = classifier::substitute(&once, ElementKind::Image, "src").unwrap();
        assert_eq!(once, twice);
        assert!(once.starts_with("/framerusercontent.com/images/"));
    }
}

#[test]
fn srcset_keeps_tokens_and_descriptors() {
    let srcset = "https://framerusercontent.com/images/a.png?scale-down-to=512 512w, \
                  /local/b.png 1024w, https://framerusercontent.com/images/c.png 2x";
    let rewritten = classifier::rewrite_srcset(srcset, ElementKind::Image);

    let descriptors = |s: &str| -> Vec<String> {
        s.split(',')
            .map(|candidate| {
                candidate
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    };
    assert_eq!(descriptors(srcset), descriptors(&rewritten));
    assert!(rewritten.contains("/framerusercontent.com/images/a.png 512w"));
    assert!(rewritten.contains("/local/b.png 1024w"));
    assert!(rewritten.contains("/framerusercontent.com/images/c.png 2x"));
}

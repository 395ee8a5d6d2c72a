//! Capability table the page calls through.
//!
//! Each entry is a trait object. Natives are installed at page
//! construction; interception layers replace an entry with a wrapper that
//! holds the previous entry and delegates to it.

use crate::dom::{Document, DomError, EventLoop, LegacyRequest, NodeId};
use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Request, Response};
use std::collections::HashMap;
use std::sync::Arc;

/// `get`/`set` pair behind a reflected element property such as `img.src`.
pub trait PropertyAccessor: Send + Sync {
    fn get(&self, doc: &Document, node: NodeId) -> Result<String, DomError>;
    fn set(&self, doc: &mut Document, node: NodeId, value: &str) -> Result<(), DomError>;
}

/// The generic `setAttribute(name, value)` entry point of an element kind.
pub trait AttributeSetter: Send + Sync {
    fn set_attribute(
        &self,
        doc: &mut Document,
        node: NodeId,
        name: &str,
        value: &str,
    ) -> Result<(), DomError>;
}

/// Script-visible insertion primitives.
pub trait InsertionPrimitive: Send + Sync {
    fn append_child(
        &self,
        doc: &mut Document,
        parent: NodeId,
        child: NodeId,
    ) -> Result<NodeId, DomError>;

    fn insert_before(
        &self,
        doc: &mut Document,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<NodeId, DomError>;
}

/// Promise-returning request dispatch (`fetch`).
pub trait RequestDispatch: Send + Sync {
    fn fetch(
        &self,
        request: Request<Bytes>,
    ) -> BoxFuture<'static, Result<Response<Bytes>, DomError>>;
}

/// Lifecycle entry points of the legacy callback-based request object.
pub trait LegacyRequestSurface: Send + Sync {
    fn open(&self, request: &LegacyRequest, method: &str, url: &str) -> Result<(), DomError>;

    /// Start the request. Completion is always delivered on a later task.
    fn send(
        &self,
        request: &LegacyRequest,
        body: Option<Bytes>,
        tasks: &EventLoop,
    ) -> Result<(), DomError>;
}

/// Property reflected straight onto an attribute of the same element.
pub struct ReflectedAttribute {
    attribute: &'static str,
}

impl ReflectedAttribute {
    pub fn new(attribute: &'static str) -> Self {
        Self { attribute }
    }
}

impl PropertyAccessor for ReflectedAttribute {
    fn get(&self, doc: &Document, node: NodeId) -> Result<String, DomError> {
        if !doc.is_element(node) {
            return Err(DomError::NotAnElement(node));
        }
        Ok(doc.attribute(node, self.attribute).unwrap_or_default().to_string())
    }

    fn set(&self, doc: &mut Document, node: NodeId, value: &str) -> Result<(), DomError> {
        doc.set_attribute(node, self.attribute, value)
    }
}

pub struct NativeAttributeSetter;

impl AttributeSetter for NativeAttributeSetter {
    fn set_attribute(
        &self,
        doc: &mut Document,
        node: NodeId,
        name: &str,
        value: &str,
    ) -> Result<(), DomError> {
        doc.set_attribute(node, name, value)
    }
}

pub struct NativeInsertion;

impl InsertionPrimitive for NativeInsertion {
    fn append_child(
        &self,
        doc: &mut Document,
        parent: NodeId,
        child: NodeId,
    ) -> Result<NodeId, DomError> {
        doc.append_child(parent, child)
    }

    fn insert_before(
        &self,
        doc: &mut Document,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<NodeId, DomError> {
        doc.insert_before(parent, child, reference)
    }
}

/// Dispatch for a page with no network access. Every call fails.
pub struct OfflineDispatch;

impl RequestDispatch for OfflineDispatch {
    fn fetch(
        &self,
        request: Request<Bytes>,
    ) -> BoxFuture<'static, Result<Response<Bytes>, DomError>> {
        let uri = request.uri().to_string();
        Box::pin(async move { Err(DomError::Network(format!("offline: {uri}"))) })
    }
}

/// Native legacy request object backed by a request dispatch. The transfer
/// runs on the ambient tokio runtime and its completion is queued back onto
/// the page's event loop.
pub struct NativeLegacyRequest {
    dispatch: Arc<dyn RequestDispatch>,
}

impl NativeLegacyRequest {
    pub fn new(dispatch: Arc<dyn RequestDispatch>) -> Self {
        Self { dispatch }
    }
}

impl LegacyRequestSurface for NativeLegacyRequest {
    fn open(&self, request: &LegacyRequest, method: &str, url: &str) -> Result<(), DomError> {
        request.open_native(method, url);
        Ok(())
    }

    fn send(
        &self,
        request: &LegacyRequest,
        body: Option<Bytes>,
        tasks: &EventLoop,
    ) -> Result<(), DomError> {
        let http_request = Request::builder()
            .method(request.method().as_str())
            .uri(request.url())
            .body(body.unwrap_or_default())
            .map_err(|err| DomError::MalformedUrl(err.to_string()))?;
        request.mark_sent();

        let handle = request.clone();
        let queue = tasks.clone();
        let future = self.dispatch.fetch(http_request);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let outcome = future.await;
                    let scheduled = queue.set_timeout(move || match outcome {
                        Ok(response) => {
                            let content_type = response
                                .headers()
                                .get(http::header::CONTENT_TYPE)
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string);
                            let body = String::from_utf8_lossy(response.body()).into_owned();
                            handle.complete(
                                response.status().as_u16(),
                                &body,
                                content_type.as_deref(),
                            );
                        }
                        Err(_) => handle.fail(),
                    });
                    if scheduled.is_err() {
                        tracing::trace!("legacy request completion could not be queued");
                    }
                });
            }
            Err(_) => tasks.set_timeout(move || handle.fail())?,
        }
        Ok(())
    }
}

/// The page's capability table.
pub struct Bindings {
    properties: HashMap<(String, String), Arc<dyn PropertyAccessor>>,
    attribute_setters: HashMap<String, Arc<dyn AttributeSetter>>,
    default_attribute_setter: Arc<dyn AttributeSetter>,
    insertion: Arc<dyn InsertionPrimitive>,
    dispatch: Option<Arc<dyn RequestDispatch>>,
    legacy: Option<Arc<dyn LegacyRequestSurface>>,
}

/// Reflected URL properties exposed by the native table.
const URL_PROPERTIES: &[(&str, &str)] = &[
    ("img", "src"),
    ("img", "srcset"),
    ("script", "src"),
    ("source", "src"),
    ("source", "srcset"),
    ("link", "href"),
];

impl Bindings {
    /// Native table with the given transport behind both request surfaces.
    pub fn native(dispatch: Arc<dyn RequestDispatch>) -> Self {
        let mut properties: HashMap<(String, String), Arc<dyn PropertyAccessor>> = HashMap::new();
        for &(tag, name) in URL_PROPERTIES {
            properties.insert(
                (tag.to_string(), name.to_string()),
                Arc::new(ReflectedAttribute::new(name)),
            );
        }
        let native_setter: Arc<dyn AttributeSetter> = Arc::new(NativeAttributeSetter);
        let attribute_setters = ["img", "source", "script", "link"]
            .iter()
            .map(|tag| (tag.to_string(), native_setter.clone()))
            .collect();

        Self {
            properties,
            attribute_setters,
            default_attribute_setter: native_setter,
            insertion: Arc::new(NativeInsertion),
            legacy: Some(Arc::new(NativeLegacyRequest::new(dispatch.clone()))),
            dispatch: Some(dispatch),
        }
    }

    /// Table without any request surface, like a page that never exposed one.
    pub fn without_network() -> Self {
        let mut bindings = Self::native(Arc::new(OfflineDispatch));
        bindings.dispatch = None;
        bindings.legacy = None;
        bindings
    }

    pub fn property(&self, tag: &str, name: &str) -> Option<Arc<dyn PropertyAccessor>> {
        self.properties
            .get(&(tag.to_string(), name.to_ascii_lowercase()))
            .cloned()
    }

    /// Replace an existing accessor with `wrap(previous)`.
    pub fn replace_property<F>(&mut self, tag: &str, name: &str, wrap: F) -> Result<(), DomError>
    where
        F: FnOnce(Arc<dyn PropertyAccessor>) -> Arc<dyn PropertyAccessor>,
    {
        let key = (tag.to_string(), name.to_string());
        let previous = self
            .properties
            .get(&key)
            .cloned()
            .ok_or_else(|| DomError::MissingBinding(format!("{tag}.{name}")))?;
        self.properties.insert(key, wrap(previous));
        Ok(())
    }

    pub fn remove_property(&mut self, tag: &str, name: &str) {
        self.properties.remove(&(tag.to_string(), name.to_string()));
    }

    pub fn attribute_setter(&self, tag: &str) -> Arc<dyn AttributeSetter> {
        self.attribute_setters
            .get(tag)
            .cloned()
            .unwrap_or_else(|| self.default_attribute_setter.clone())
    }

    pub fn replace_attribute_setter<F>(&mut self, tag: &str, wrap: F) -> Result<(), DomError>
    where
        F: FnOnce(Arc<dyn AttributeSetter>) -> Arc<dyn AttributeSetter>,
    {
        let previous = self
            .attribute_setters
            .get(tag)
            .cloned()
            .ok_or_else(|| DomError::MissingBinding(format!("{tag}.setAttribute")))?;
        self.attribute_setters.insert(tag.to_string(), wrap(previous));
        Ok(())
    }

    pub fn insertion(&self) -> Arc<dyn InsertionPrimitive> {
        self.insertion.clone()
    }

    pub fn replace_insertion<F>(&mut self, wrap: F)
    where
        F: FnOnce(Arc<dyn InsertionPrimitive>) -> Arc<dyn InsertionPrimitive>,
    {
        self.insertion = wrap(self.insertion.clone());
    }

    pub fn dispatch(&self) -> Option<Arc<dyn RequestDispatch>> {
        self.dispatch.clone()
    }

    pub fn replace_dispatch<F>(&mut self, wrap: F) -> Result<(), DomError>
    where
        F: FnOnce(Arc<dyn RequestDispatch>) -> Arc<dyn RequestDispatch>,
    {
        let previous = self
            .dispatch
            .clone()
            .ok_or_else(|| DomError::MissingBinding("fetch".to_string()))?;
        self.dispatch = Some(wrap(previous));
        Ok(())
    }

    pub fn legacy(&self) -> Option<Arc<dyn LegacyRequestSurface>> {
        self.legacy.clone()
    }

    pub fn replace_legacy<F>(&mut self, wrap: F) -> Result<(), DomError>
    where
        F: FnOnce(Arc<dyn LegacyRequestSurface>) -> Arc<dyn LegacyRequestSurface>,
    {
        let previous = self
            .legacy
            .clone()
            .ok_or_else(|| DomError::MissingBinding("XMLHttpRequest".to_string()))?;
        self.legacy = Some(wrap(previous));
        Ok(())
    }
}

impl Default for Bindings {
    fn default() -> Self {
        Self::native(Arc::new(OfflineDispatch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_entries_report_missing_binding() {
        let mut bindings = Bindings::without_network();
        assert!(matches!(
            bindings.replace_dispatch(|prev| prev),
            Err(DomError::MissingBinding(_))
        ));
        assert!(matches!(
            bindings.replace_property("video", "src", |prev| prev),
            Err(DomError::MissingBinding(_))
        ));
    }

    #[test]
    fn reflected_property_reads_and_writes_attribute() {
        let bindings = Bindings::default();
        let mut doc = Document::new();
        let img = doc.create_element("img");
        let accessor = bindings.property("img", "src").expect("native img.src");
        accessor.set(&mut doc, img, "/a.png").unwrap();
        assert_eq!(accessor.get(&doc, img).unwrap(), "/a.png");
        assert_eq!(doc.attribute(img, "src"), Some("/a.png"));
    }

    #[tokio::test]
    async fn offline_dispatch_fails() {
        let request = Request::get("https://example.com/").body(Bytes::new()).unwrap();
        let result = OfflineDispatch.fetch(request).await;
        assert!(matches!(result, Err(DomError::Network(_))));
    }
}

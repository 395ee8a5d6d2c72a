//! The page: document, bindings, event loop and observers.
//!
//! Host script reaches the platform only through the methods here, and
//! those go through the bindings table, so whatever is installed there
//! sees every call.

use crate::dom::{
    Bindings, Document, DomError, EventLoop, LegacyRequest, MutationRecord, NodeId,
    RequestDispatch,
};
use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Request, Response};
use std::sync::Arc;

/// Receiver of insertion batches at microtask checkpoints.
pub trait MutationObserver: Send + Sync {
    fn on_mutations(&self, doc: &mut Document, records: &[MutationRecord]);
}

pub struct Page {
    document: Document,
    bindings: Bindings,
    tasks: EventLoop,
    observers: Vec<Arc<dyn MutationObserver>>,
    bootstrapped: bool,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    /// Empty page with native bindings and no network.
    pub fn new() -> Self {
        Self::with_bindings(Bindings::default())
    }

    pub fn with_transport(dispatch: Arc<dyn RequestDispatch>) -> Self {
        Self::with_bindings(Bindings::native(dispatch))
    }

    pub fn with_bindings(bindings: Bindings) -> Self {
        Self {
            document: Document::new(),
            bindings,
            tasks: EventLoop::new(),
            observers: Vec::new(),
            bootstrapped: false,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut Bindings {
        &mut self.bindings
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.tasks
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    pub(crate) fn mark_bootstrapped(&mut self) {
        self.bootstrapped = true;
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.document.create_element(tag)
    }

    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.document.create_text(content)
    }

    fn tag_of(&self, node: NodeId) -> Result<String, DomError> {
        self.document
            .tag(node)
            .map(str::to_string)
            .ok_or(DomError::NotAnElement(node))
    }

    /// `element.<name> = value`
    pub fn set_property(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let tag = self.tag_of(node)?;
        match self.bindings.property(&tag, name) {
            Some(accessor) => accessor.set(&mut self.document, node, value),
            None => self.document.set_attribute(node, name, value),
        }
    }

    pub fn get_property(&self, node: NodeId, name: &str) -> Result<String, DomError> {
        let tag = self.tag_of(node)?;
        match self.bindings.property(&tag, name) {
            Some(accessor) => accessor.get(&self.document, node),
            None => Ok(self
                .document
                .attribute(node, name)
                .unwrap_or_default()
                .to_string()),
        }
    }

    /// `element.setAttribute(name, value)`
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let tag = self.tag_of(node)?;
        self.bindings
            .attribute_setter(&tag)
            .set_attribute(&mut self.document, node, name, value)
    }

    /// `parent.appendChild(child)`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<NodeId, DomError> {
        self.bindings
            .insertion()
            .append_child(&mut self.document, parent, child)
    }

    /// `parent.insertBefore(child, reference)`
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<NodeId, DomError> {
        self.bindings
            .insertion()
            .insert_before(&mut self.document, parent, child, reference)
    }

    /// Parser-driven insertion. Bypasses every script-visible hook but is
    /// still seen by mutation observers.
    pub fn parser_append(&mut self, parent: NodeId, child: NodeId) -> Result<NodeId, DomError> {
        self.document.append_child(parent, child)
    }

    pub fn remove(&mut self, node: NodeId) -> Result<(), DomError> {
        self.document.remove(node)
    }

    /// `fetch(request)`
    pub fn fetch(
        &self,
        request: Request<Bytes>,
    ) -> BoxFuture<'static, Result<Response<Bytes>, DomError>> {
        match self.bindings.dispatch() {
            Some(dispatch) => dispatch.fetch(request),
            None => Box::pin(async { Err(DomError::MissingBinding("fetch".to_string())) }),
        }
    }

    /// `fetch(url)` with a bodiless GET.
    pub fn fetch_url(&self, url: &str) -> BoxFuture<'static, Result<Response<Bytes>, DomError>> {
        match Request::get(url).body(Bytes::new()) {
            Ok(request) => self.fetch(request),
            Err(err) => {
                let message = err.to_string();
                Box::pin(async move { Err(DomError::MalformedUrl(message)) })
            }
        }
    }

    /// `new XMLHttpRequest()`
    pub fn new_request(&self) -> LegacyRequest {
        LegacyRequest::new()
    }

    pub fn open(&self, request: &LegacyRequest, method: &str, url: &str) -> Result<(), DomError> {
        let surface = self
            .bindings
            .legacy()
            .ok_or_else(|| DomError::MissingBinding("XMLHttpRequest".to_string()))?;
        surface.open(request, method, url)
    }

    pub fn send(&self, request: &LegacyRequest, body: Option<Bytes>) -> Result<(), DomError> {
        let surface = self
            .bindings
            .legacy()
            .ok_or_else(|| DomError::MissingBinding("XMLHttpRequest".to_string()))?;
        surface.send(request, body, &self.tasks)
    }

    /// Register an observer. Insertions are recorded from now on.
    pub fn observe(&mut self, observer: Arc<dyn MutationObserver>) {
        self.observers.push(observer);
        self.document.set_observed(true);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Microtask checkpoint: deliver queued records until none remain.
    /// Returns how many records were delivered.
    pub fn run_microtasks(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            let records = self.document.take_records();
            if records.is_empty() {
                return delivered;
            }
            delivered += records.len();
            let observers = self.observers.clone();
            for observer in observers {
                observer.on_mutations(&mut self.document, &records);
            }
        }
    }

    /// Run one macrotask, followed by a microtask checkpoint.
    pub fn run_next_task(&mut self) -> bool {
        match self.tasks.pop() {
            Some(task) => {
                task();
                self.run_microtasks();
                true
            }
            None => false,
        }
    }

    /// Drain microtasks and macrotasks until both queues are empty.
    pub fn run_until_idle(&mut self) {
        self.run_microtasks();
        while self.run_next_task() {}
    }
}

//! Network stub layer
//!
//! Wraps both request surfaces. Calls whose URL classifies as
//! `stub-network-call` get the fixed empty-items response and never reach
//! the transport underneath; everything else is delegated unchanged.

use crate::classifier;
use crate::dom::{
    Bindings, DomError, EventLoop, LegacyRequest, LegacyRequestSurface, RequestDispatch,
};
use crate::guard::{fail_open, swallow};
use crate::interceptor::InstallReport;
use crate::models::{Classification, ElementKind, SyntheticResponse};
use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Request, Response};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

fn is_stub_target(url: &str, kind: ElementKind) -> bool {
    fail_open(
        "network.classify",
        || Ok::<_, DomError>(classifier::classify(url, kind, "url") == Classification::StubNetworkCall),
        || false,
    )
}

/// Request dispatch wrapper.
pub struct StubbingDispatch {
    original: Arc<dyn RequestDispatch>,
}

impl StubbingDispatch {
    pub fn new(original: Arc<dyn RequestDispatch>) -> Self {
        Self { original }
    }
}

impl RequestDispatch for StubbingDispatch {
    fn fetch(
        &self,
        request: Request<Bytes>,
    ) -> BoxFuture<'static, Result<Response<Bytes>, DomError>> {
        let url = request.uri().to_string();
        if is_stub_target(&url, ElementKind::FetchCall) {
            tracing::trace!(%url, "stubbing request");
            return Box::pin(async { Ok(SyntheticResponse::empty_items().into_http()) });
        }
        self.original.fetch(request)
    }
}

/// Legacy request wrapper: tags the request on `open`, completes tagged
/// requests from a queued task on `send`.
pub struct StubbingLegacyRequest {
    original: Arc<dyn LegacyRequestSurface>,
}

impl StubbingLegacyRequest {
    pub fn new(original: Arc<dyn LegacyRequestSurface>) -> Self {
        Self { original }
    }
}

impl LegacyRequestSurface for StubbingLegacyRequest {
    fn open(&self, request: &LegacyRequest, method: &str, url: &str) -> Result<(), DomError> {
        request.set_stubbed(is_stub_target(url, ElementKind::XhrCall));
        self.original.open(request, method, url)
    }

    fn send(
        &self,
        request: &LegacyRequest,
        body: Option<Bytes>,
        tasks: &EventLoop,
    ) -> Result<(), DomError> {
        if !request.is_stubbed() {
            return self.original.send(request, body, tasks);
        }
        let handle = request.clone();
        let response = SyntheticResponse::empty_items();
        let scheduled = tasks.set_timeout(move || {
            handle.complete(
                response.status,
                &response.body_text(),
                Some(response.content_type.as_str()),
            );
        });
        match scheduled {
            Ok(()) => {
                request.mark_sent();
                Ok(())
            }
            Err(err) => {
                tracing::trace!("stub scheduling failed, sending for real: {}", err);
                self.original.send(request, body, tasks)
            }
        }
    }
}

/// Install both wrappers. A surface the page lacks is skipped.
pub fn install(bindings: &mut Bindings) -> InstallReport {
    let mut report = InstallReport::default();
    let ok = swallow("network.install.fetch", || {
        bindings.replace_dispatch(|original| -> Arc<dyn RequestDispatch> {
            Arc::new(StubbingDispatch::new(original))
        })
    });
    report.record("fetch".to_string(), ok);

    let ok = swallow("network.install.legacy", || {
        bindings.replace_legacy(|original| -> Arc<dyn LegacyRequestSurface> {
            Arc::new(StubbingLegacyRequest::new(original))
        })
    });
    report.record("XMLHttpRequest".to_string(), ok);
    report
}

/// Real transport for the request-dispatch surface, backed by `reqwest`.
/// Relative URLs resolve against `base` when one is set.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base: Option<Url>,
}

impl ReqwestTransport {
    pub fn new(base: Option<Url>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { client, base })
    }

    fn resolve(&self, target: &str) -> Result<Url, DomError> {
        let resolved = match &self.base {
            Some(base) => base.join(target),
            None => Url::parse(target),
        };
        resolved.map_err(|e| DomError::MalformedUrl(format!("{target}: {e}")))
    }
}

impl RequestDispatch for ReqwestTransport {
    fn fetch(
        &self,
        request: Request<Bytes>,
    ) -> BoxFuture<'static, Result<Response<Bytes>, DomError>> {
        let client = self.client.clone();
        let (parts, body) = request.into_parts();
        let target = self.resolve(&parts.uri.to_string());

        Box::pin(async move {
            let target = target?;
            let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
                .map_err(|e| DomError::Network(e.to_string()))?;

            let mut builder = client.request(method, target);
            for (name, value) in parts.headers.iter() {
                builder = builder.header(name.as_str(), value.as_bytes());
            }
            if !body.is_empty() {
                builder = builder.body(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| DomError::Network(e.to_string()))?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| DomError::Network(e.to_string()))?;

            let mut out = Response::builder().status(status);
            for (name, value) in headers.iter() {
                out = out.header(name.as_str(), value.as_bytes());
            }
            out.body(bytes)
                .map_err(|e| DomError::Network(e.to_string()))
        })
    }
}

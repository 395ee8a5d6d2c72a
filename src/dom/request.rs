//! Legacy request object (open/send with ready-state callbacks).

use std::sync::{Arc, Mutex, MutexGuard};

pub const UNSENT: u8 = 0;
pub const OPENED: u8 = 1;
pub const DONE: u8 = 4;

pub type RequestCallback = Box<dyn FnMut(&LegacyRequest) + Send + 'static>;

#[derive(Default)]
struct LegacyRequestState {
    method: String,
    url: String,
    ready_state: u8,
    status: u16,
    response_text: String,
    content_type: Option<String>,
    stubbed: bool,
    sent: bool,
    on_ready_state_change: Option<RequestCallback>,
    on_load: Option<RequestCallback>,
}

/// Shared handle to one legacy request. Clones refer to the same request.
#[derive(Clone, Default)]
pub struct LegacyRequest {
    inner: Arc<Mutex<LegacyRequestState>>,
}

impl LegacyRequest {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LegacyRequestState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn method(&self) -> String {
        self.state().method.clone()
    }

    pub fn url(&self) -> String {
        self.state().url.clone()
    }

    pub fn ready_state(&self) -> u8 {
        self.state().ready_state
    }

    pub fn status(&self) -> u16 {
        self.state().status
    }

    pub fn response_text(&self) -> String {
        self.state().response_text.clone()
    }

    pub fn response_header(&self, name: &str) -> Option<String> {
        if name.eq_ignore_ascii_case("content-type") {
            self.state().content_type.clone()
        } else {
            None
        }
    }

    pub fn set_on_ready_state_change<F>(&self, callback: F)
    where
        F: FnMut(&LegacyRequest) + Send + 'static,
    {
        self.state().on_ready_state_change = Some(Box::new(callback));
    }

    pub fn set_on_load<F>(&self, callback: F)
    where
        F: FnMut(&LegacyRequest) + Send + 'static,
    {
        self.state().on_load = Some(Box::new(callback));
    }

    /// Whether this request was recorded as a CMS call at open time.
    pub fn is_stubbed(&self) -> bool {
        self.state().stubbed
    }

    pub fn set_stubbed(&self, stubbed: bool) {
        self.state().stubbed = stubbed;
    }

    pub fn was_sent(&self) -> bool {
        self.state().sent
    }

    /// Native `open`: record method and URL and move to OPENED.
    pub fn open_native(&self, method: &str, url: &str) {
        let mut state = self.state();
        state.method = method.to_ascii_uppercase();
        state.url = url.to_string();
        state.ready_state = OPENED;
        state.status = 0;
        state.response_text.clear();
        state.content_type = None;
        state.sent = false;
    }

    pub(crate) fn mark_sent(&self) {
        self.state().sent = true;
    }

    /// Finish the request and fire `readystatechange` then `load`.
    ///
    /// Callbacks run outside the lock so they may read the request.
    pub fn complete(&self, status: u16, body: &str, content_type: Option<&str>) {
        let (mut on_change, mut on_load) = {
            let mut state = self.state();
            state.ready_state = DONE;
            state.status = status;
            state.response_text = body.to_string();
            state.content_type = content_type.map(str::to_string);
            (state.on_ready_state_change.take(), state.on_load.take())
        };
        if let Some(callback) = on_change.as_mut() {
            callback(self);
        }
        if let Some(callback) = on_load.as_mut() {
            callback(self);
        }
        let mut state = self.state();
        if state.on_ready_state_change.is_none() {
            state.on_ready_state_change = on_change;
        }
        if state.on_load.is_none() {
            state.on_load = on_load;
        }
    }

    /// Finish with a network error: DONE, status 0, no `load`.
    pub fn fail(&self) {
        let mut on_change = {
            let mut state = self.state();
            state.ready_state = DONE;
            state.status = 0;
            state.on_ready_state_change.take()
        };
        if let Some(callback) = on_change.as_mut() {
            callback(self);
        }
        let mut state = self.state();
        if state.on_ready_state_change.is_none() {
            state.on_ready_state_change = on_change;
        }
    }
}

impl std::fmt::Debug for LegacyRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("LegacyRequest")
            .field("method", &state.method)
            .field("url", &state.url)
            .field("ready_state", &state.ready_state)
            .field("status", &state.status)
            .field("stubbed", &state.stubbed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_fires_callbacks_in_order() {
        let request = LegacyRequest::new();
        request.open_native("get", "https://example.com/data");
        assert_eq!(request.ready_state(), OPENED);
        assert_eq!(request.method(), "GET");

        let log = Arc::new(Mutex::new(Vec::new()));
        let change_log = log.clone();
        request.set_on_ready_state_change(move |req| {
            change_log
                .lock()
                .unwrap()
                .push(format!("change:{}", req.ready_state()));
        });
        let load_log = log.clone();
        request.set_on_load(move |req| {
            load_log
                .lock()
                .unwrap()
                .push(format!("load:{}", req.response_text()));
        });

        request.complete(200, "{}", Some("application/json"));
        assert_eq!(*log.lock().unwrap(), vec!["change:4", "load:{}"]);
        assert_eq!(request.status(), 200);
        assert_eq!(
            request.response_header("Content-Type").as_deref(),
            Some("application/json")
        );
    }

    #[test]
    fn fail_skips_load() {
        let request = LegacyRequest::new();
        let loaded = Arc::new(Mutex::new(false));
        let flag = loaded.clone();
        request.set_on_load(move |_| *flag.lock().unwrap() = true);
        request.fail();
        assert_eq!(request.ready_state(), DONE);
        assert_eq!(request.status(), 0);
        assert!(!*loaded.lock().unwrap());
    }
}

//! In-memory transport for tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;

use crate::{
    error::{GatewayError, Result},
    transport::{HttpRequest, HttpResponse, Transport},
};

#[derive(Debug, Default)]
struct MockState {
    replies: VecDeque<Result<HttpResponse>>,
    requests: Vec<HttpRequest>,
}

/// Transport that answers from a queue of canned replies and records every
/// request it receives.
///
/// Clones share the same queue and log, so a test can keep one handle while
/// the adapter owns another.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use merchant_gateways::transport::{HttpRequest, MockTransport, Transport};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mock = MockTransport::new();
/// mock.push_reply(200, r#"{"id":"ch_1"}"#);
///
/// let transport: Arc<dyn Transport> = Arc::new(mock.clone());
/// let reply = transport.send(HttpRequest::get("https://example.com")).await.unwrap();
/// assert_eq!(reply.status, 200);
/// assert_eq!(mock.requests().len(), 1);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Creates an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Queues a reply with the given status and body.
    pub fn push_reply(&self, status: u16, body: impl Into<Vec<u8>>) {
        self.push_response(HttpResponse::new(status, body));
    }

    /// Queues a full reply.
    pub fn push_response(&self, response: HttpResponse) {
        self.with_state(|s| s.replies.push_back(Ok(response)));
    }

    /// Queues a transport failure.
    pub fn push_error(&self, error: GatewayError) {
        self.with_state(|s| s.replies.push_back(Err(error)));
    }

    /// Every request sent so far.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.with_state(|s| s.requests.clone())
    }

    /// The most recent request.
    #[must_use]
    pub fn last_request(&self) -> Option<HttpRequest> {
        self.with_state(|s| s.requests.last().cloned())
    }

    /// Replies still queued.
    #[must_use]
    pub fn pending_replies(&self) -> usize {
        self.with_state(|s| s.replies.len())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.with_state(|s| {
            s.requests.push(request);
            s.replies.pop_front().unwrap_or_else(|| {
                Err(GatewayError::Transport("no canned reply queued".to_owned()))
            })
        })
    }

    fn protocol_name(&self) -> &'static str {
        "mock"
    }
}

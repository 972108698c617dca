//! Scripted transport for offline runs
//!
//! Returns predetermined responses in order and records every request it
//! sees, so tests can assert on attempt counts and request shapes without a
//! network.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::request::HttpRequest;
use super::transport::{HttpResponse, HttpTransport, TransportError};

/// One scripted exchange
#[derive(Debug, Clone)]
pub enum StubExchange {
    /// Respond with this response
    Respond(HttpResponse),
    /// Fail at the transport level
    Fail(TransportError),
    /// Never answer; the executor's attempt timeout must fire
    Hang,
}

impl StubExchange {
    /// JSON response with a status
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        StubExchange::Respond(HttpResponse::new(status, body.to_string()))
    }

    /// Plain-text response with a status
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        StubExchange::Respond(HttpResponse::new(status, body))
    }
}

/// Transport replaying a script of exchanges
///
/// When the script runs out the last exchange repeats; an empty script
/// answers `200 {}`.
#[derive(Debug, Default)]
pub struct StubTransport {
    script: Mutex<VecDeque<StubExchange>>,
    last: Mutex<Option<StubExchange>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl StubTransport {
    /// Transport answering with `exchanges` in order
    pub fn new(exchanges: impl IntoIterator<Item = StubExchange>) -> Self {
        Self {
            script: Mutex::new(exchanges.into_iter().collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Transport that always answers with the same exchange
    pub fn always(exchange: StubExchange) -> Self {
        Self::new([exchange])
    }

    /// Number of requests received
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Requests received, oldest first
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_exchange(&self) -> StubExchange {
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match next {
            Some(exchange) => {
                *last = Some(exchange.clone());
                exchange
            }
            None => last
                .clone()
                .unwrap_or_else(|| StubExchange::json(200, serde_json::json!({}))),
        }
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        match self.next_exchange() {
            StubExchange::Respond(response) => Ok(response),
            StubExchange::Fail(error) => Err(error),
            StubExchange::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Err(TransportError::Timeout(request.timeout))
            }
        }
    }
}

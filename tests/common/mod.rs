#![allow(dead_code)]

use async_trait::async_trait;
use futures::FutureExt;
use paylike_client::{
    Clock, Endpoint, Event, LogEntry, ManualClock, RequestError, RequestOptions, Transport,
};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Clock origin used by scheduling tests.
pub const ORIGIN: u64 = 1_000_000;

/// Poll `fut` to completion, jumping the clock to the next deadline whenever it stalls.
pub fn drive<F: Future>(clock: &ManualClock, fut: F) -> F::Output {
    let mut fut = std::pin::pin!(fut);
    loop {
        if let Some(out) = fut.as_mut().now_or_never() {
            return out;
        }
        assert!(clock.advance_to_next(), "future stalled with no pending timers");
    }
}

/// One attempt observed by a [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct Call {
    pub at: u64,
    pub endpoint: String,
    pub data: serde_json::Value,
    pub client_id: String,
    pub timeout: Duration,
    pub log_id: u64,
}

type Script = dyn Fn(usize) -> Result<Event, RequestError> + Send + Sync;

/// Transport answering attempt `n` (0-based) with `script(n)` and recording the virtual time of
/// each attempt. Logs a `request` entry per attempt, like a real transport would.
#[derive(Clone)]
pub struct ScriptedTransport {
    clock: ManualClock,
    calls: Arc<Mutex<Vec<Call>>>,
    script: Arc<Script>,
}

impl ScriptedTransport {
    pub fn new<F>(clock: &ManualClock, script: F) -> Self
    where
        F: Fn(usize) -> Result<Event, RequestError> + Send + Sync + 'static,
    {
        Self { clock: clock.clone(), calls: Arc::default(), script: Arc::new(script) }
    }

    pub fn always(clock: &ManualClock, err: RequestError) -> Self {
        Self::new(clock, move |_| Err(err.clone()))
    }

    /// Fail `failures` times with `err`, then answer `event`.
    pub fn failing_then(
        clock: &ManualClock,
        failures: usize,
        err: RequestError,
        event: Event,
    ) -> Self {
        Self::new(clock, move |n| if n < failures { Err(err.clone()) } else { Ok(event.clone()) })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_times(&self) -> Vec<u64> {
        self.calls().iter().map(|c| c.at).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn first(
        &self,
        endpoint: &Endpoint,
        options: RequestOptions,
    ) -> Result<Event, RequestError> {
        options.log.log(LogEntry::Request {
            method: "POST".into(),
            url: format!("https://{}", endpoint),
            timeout: options.timeout.as_millis() as u64,
        });
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                at: self.clock.now_millis(),
                endpoint: endpoint.to_string(),
                data: options.data.clone(),
                client_id: options.client_id.clone(),
                timeout: options.timeout,
                log_id: options.log.id(),
            });
            calls.len() - 1
        };
        (self.script)(n)
    }
}

pub fn server_error() -> RequestError {
    RequestError::Server { status: 500, status_text: "Internal Server Error".into() }
}

pub fn rejection() -> RequestError {
    RequestError::Response(paylike_client::ResponseError::from_body(
        400,
        &serde_json::json!({"code": "AMOUNT_INVALID", "message": "Invalid amount"}),
    ))
}

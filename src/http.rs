//! HTTP transport built on `reqwest`.
//!
//! One attempt is one `POST {scheme}://{endpoint}` carrying the JSON payload, the
//! `Accept-Version` and `X-Client` headers. The whole exchange (connect, headers, body) races a
//! [`Delay`] on the request's clock; whichever finishes first wins.
//!
//! Response classification:
//!
//! | status                     | result                                   |
//! |----------------------------|------------------------------------------|
//! | 2xx                        | first JSON value of the body (`null` if empty) |
//! | 429                        | [`RequestError::RateLimit`], `Retry-After` seconds as hint |
//! | other, JSON body           | [`RequestError::Response`] (final)        |
//! | other                      | [`RequestError::Server`]                  |

use crate::error::{ErrorSummary, RequestError, ResponseError};
use crate::sleeper::Delay;
use crate::telemetry::{LogEntry, Logger};
use crate::transport::{Endpoint, Event, RequestOptions, Transport};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

const REQUEST_ID: &str = "request-id";

/// [`Transport`] speaking HTTP(S) through a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    scheme: String,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Reuse an existing client (connection pool, proxies, TLS roots).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client, scheme: "https".to_owned() }
    }

    /// Override the URL scheme. Defaults to `https`.
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn url(&self, endpoint: &Endpoint) -> String {
        format!("{}://{}", self.scheme, endpoint)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

struct Exchange {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

fn aborted(log: &Logger, err: RequestError) -> RequestError {
    log.log(LogEntry::Aborted { abort: ErrorSummary::from(&err) });
    err
}

#[async_trait]
impl Transport for HttpTransport {
    async fn first(
        &self,
        endpoint: &Endpoint,
        options: RequestOptions,
    ) -> Result<Event, RequestError> {
        let RequestOptions { version, data, timeout, client_id, log, clock } = options;
        let url = self.url(endpoint);
        log.log(LogEntry::Request {
            method: "POST".to_owned(),
            url: url.clone(),
            timeout: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        });

        let request = self
            .client
            .post(&url)
            .header("Accept-Version", version.to_string())
            .header("X-Client", client_id)
            .json(&data);

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            log.log(LogEntry::Response {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_owned(),
                request_id: header_str(&headers, REQUEST_ID).map(str::to_owned),
            });
            let body = response.bytes().await?.to_vec();
            Ok::<_, reqwest::Error>(Exchange { status, headers, body })
        };

        let exchange = tokio::select! {
            result = exchange => result.map_err(|err| aborted(&log, classify_reqwest(err, timeout)))?,
            _ = Delay::new(Arc::clone(&clock), timeout) => {
                return Err(aborted(&log, RequestError::Timeout { timeout }));
            }
        };

        let event = classify(exchange)?;
        log.log(LogEntry::ClosingStream);
        Ok(event)
    }
}

fn classify_reqwest(err: reqwest::Error, timeout: Duration) -> RequestError {
    if err.is_timeout() {
        RequestError::Timeout { timeout }
    } else {
        RequestError::Network(err.to_string())
    }
}

fn classify(exchange: Exchange) -> Result<Event, RequestError> {
    let Exchange { status, headers, body } = exchange;
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(RequestError::RateLimit { retry_after: retry_after(&headers) });
    }
    let status_text = status.canonical_reason().unwrap_or_default().to_owned();
    if status.is_success() {
        return first_event(&body).map_err(|err| RequestError::Server {
            status: status.as_u16(),
            status_text: format!("invalid response body: {}", err),
        });
    }
    if is_json(&headers) {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&body) {
            return Err(RequestError::Response(ResponseError::from_body(status.as_u16(), &value)));
        }
    }
    Err(RequestError::Server { status: status.as_u16(), status_text })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// `Retry-After` in whole seconds.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_str(headers, RETRY_AFTER.as_str())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn is_json(headers: &HeaderMap) -> bool {
    header_str(headers, CONTENT_TYPE.as_str())
        .map(|value| value.starts_with("application/json"))
        .unwrap_or(false)
}

/// First value of a newline-delimited JSON body.
fn first_event(body: &[u8]) -> Result<Event, serde_json::Error> {
    let mut values = serde_json::Deserializer::from_slice(body).into_iter::<Event>();
    match values.next() {
        Some(value) => value,
        None => Ok(Event::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn exchange(status: u16, pairs: &[(&'static str, &str)], body: &str) -> Exchange {
        Exchange {
            status: StatusCode::from_u16(status).unwrap(),
            headers: headers(pairs),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn first_event_of_stream() {
        assert_eq!(first_event(b"{\"a\":1}\n{\"a\":2}\n").unwrap(), json!({"a": 1}));
        assert_eq!(first_event(b"").unwrap(), Event::Null);
        assert_eq!(first_event(b"  \n").unwrap(), Event::Null);
        assert!(first_event(b"{oops").is_err());
    }

    #[test]
    fn rate_limit_carries_retry_after_seconds() {
        let err = classify(exchange(429, &[("retry-after", "3")], "")).unwrap_err();
        assert_eq!(err, RequestError::RateLimit { retry_after: Some(Duration::from_secs(3)) });

        let err = classify(exchange(429, &[("retry-after", "soon")], "")).unwrap_err();
        assert_eq!(err, RequestError::RateLimit { retry_after: None });
    }

    #[test]
    fn json_rejection_is_final() {
        let err = classify(exchange(
            400,
            &[("content-type", "application/json; charset=utf-8")],
            r#"{"code":"TOKEN_INVALID","message":"Invalid token","errors":[]}"#,
        ))
        .unwrap_err();
        assert!(err.is_final());
        let response = err.as_response().unwrap();
        assert_eq!(response.code.as_deref(), Some("TOKEN_INVALID"));
        assert_eq!(response.errors, Some(json!([])));
    }

    #[test]
    fn plain_failure_is_server_error() {
        let err = classify(exchange(502, &[("content-type", "text/html")], "<h1>")).unwrap_err();
        assert_eq!(err, RequestError::Server { status: 502, status_text: "Bad Gateway".into() });
        assert!(!err.is_final());
    }

    #[test]
    fn url_uses_scheme() {
        let transport = HttpTransport::new().scheme("http");
        assert_eq!(transport.url(&Endpoint::new("localhost:8080/payments")), "http://localhost:8080/payments");
        assert_eq!(HttpTransport::new().url(&Endpoint::new("vault.paylike.io")), "https://vault.paylike.io");
    }
}

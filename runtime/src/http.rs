//! HTTP transport backed by `reqwest`.
//!
//! Request options are read from the opaque JSON options value:
//!
//! | Field     | Type                         | Default |
//! |-----------|------------------------------|---------|
//! | `method`  | string                       | `GET`   |
//! | `headers` | object of string values      | none    |
//! | `body`    | string, or any JSON to encode | none    |
//!
//! Responses are returned unparsed. Non-2xx statuses are responses, not
//! transport failures.

use composable_fetch_core::{RequestOptions, Transport, TransportError, TransportFuture};
use reqwest::{Client, Method};
use serde_json::Value;

/// Unparsed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Final URL after redirects
    pub url: String,
    /// Status code
    pub status: u16,
    /// Canonical reason phrase for the status
    pub status_text: String,
    /// Whether the status is in the 2xx range
    pub ok: bool,
    /// Response headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Body decoded as UTF-8 (lossy)
    pub body: String,
}

/// [`Transport`] issuing real HTTP requests.
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Transport with a default `reqwest` client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport using a preconfigured client (timeouts, proxies, TLS).
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn method_of(options: Option<&RequestOptions>) -> Result<Method, TransportError> {
    match options.and_then(|options| options.get("method")) {
        None | Some(Value::Null) => Ok(Method::GET),
        Some(Value::String(method)) => Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|e| TransportError::Other(format!("invalid method {method:?}: {e}"))),
        Some(other) => Err(TransportError::Other(format!("method must be a string, got {other}"))),
    }
}

fn body_of(options: Option<&RequestOptions>) -> Option<(String, bool)> {
    match options.and_then(|options| options.get("body"))? {
        Value::Null => None,
        Value::String(text) => Some((text.clone(), false)),
        other => Some((other.to_string(), true)),
    }
}

fn map_error(error: &reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::RequestFailed(error.to_string())
    }
}

impl Transport for HttpTransport {
    type Response = HttpResponse;

    fn perform(&self, resource: &str, options: Option<&RequestOptions>) -> TransportFuture<HttpResponse> {
        let method = match method_of(options) {
            Ok(method) => method,
            Err(error) => return Box::pin(async move { Err::<HttpResponse, _>(error) }),
        };

        let mut request = self.client.request(method, resource);
        if let Some(Value::Object(headers)) = options.and_then(|options| options.get("headers")) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name.as_str(), value);
                }
            }
        }
        if let Some((body, encoded)) = body_of(options) {
            if encoded {
                request = request.header("content-type", "application/json");
            }
            request = request.body(body);
        }

        Box::pin(async move {
            let response = request.send().await.map_err(|e| map_error(&e))?;
            let status = response.status();
            let url = response.url().to_string();
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let bytes = response.bytes().await.map_err(|e| map_error(&e))?;

            Ok::<_, TransportError>(HttpResponse {
                url,
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                ok: status.is_success(),
                headers,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            })
        })
    }
}

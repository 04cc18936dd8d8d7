//! HTTP transport: one POST per flushed batch against
//! `{base_url}/{prefix}/{binding}/{instance}/call`, matching
//! `chainrpc_transport::try_handle_http`'s route shape exactly.

use async_trait::async_trait;
use chainrpc_codec::{BatchRequest, BatchResponse};
use chainrpc_error::{RpcError, SerializationError, TransportError};
use reqwest::Client as HttpClient;
use url::Url;

use super::ClientTransport;
use crate::config::ClientConfig;

/// A stateless HTTP transport — every [`HttpTransport::send_batch`] call is
/// an independent request, so there is no connecting-state queue and
/// [`ClientTransport::dispose`] has nothing to tear down beyond letting the
/// underlying connection pool drain.
pub struct HttpTransport {
    client: HttpClient,
    url: Url,
    timeout: std::time::Duration,
    headers: reqwest::header::HeaderMap,
}

impl HttpTransport {
    /// Build a transport targeting `config`'s call route.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`] if `config.base_url` cannot be
    /// joined with the call path, or if a configured header is not a valid
    /// HTTP header value.
    pub fn connect(config: &ClientConfig) -> Result<Self, RpcError> {
        let url = config
            .base_url
            .join(&config.call_path())
            .map_err(|_| RpcError::Transport(TransportError::Disconnected))?;

        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in &config.headers {
            let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| RpcError::Transport(TransportError::Disconnected))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|_| RpcError::Transport(TransportError::Disconnected))?;
            headers.insert(name, value);
        }

        Ok(Self {
            client: HttpClient::new(),
            url,
            timeout: config.timeout,
            headers,
        })
    }
}

#[async_trait]
impl ClientTransport for HttpTransport {
    async fn send_batch(&self, request: &BatchRequest) -> Result<BatchResponse, RpcError> {
        let response = self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    RpcError::Transport(TransportError::Timeout {
                        millis: self.timeout.as_millis() as u64,
                    })
                } else {
                    RpcError::Transport(TransportError::Disconnected)
                }
            })?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|_| RpcError::Transport(TransportError::Disconnected))?;

        serde_json::from_value(body).map_err(|err| {
            RpcError::Serialization(SerializationError::UnsupportedValue {
                kind: format!("malformed batch response: {err}"),
            })
        })
    }

    async fn dispose(&self) {}
}

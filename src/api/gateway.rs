//! HTTP gateway to the storefront REST API.
//!
//! Every remote call in the crate routes through [`HttpGateway`]. It
//! attaches the bearer token (skipping the re-authentication endpoints),
//! negotiates JSON, unwraps the `{success, data, message}` response
//! envelope, normalizes failures into [`ApiError`], clears the session
//! on 401, and drives the process-wide loading signal.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::auth::SessionShared;

use super::ApiError;

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Endpoints that must never carry a bearer token, so a stale token
/// cannot leak into re-authentication.
const ANONYMOUS_PATHS: [&str; 2] = ["/auth/login", "/auth/register"];

/// Response envelope used by every endpoint.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
struct ApiEnvelope<T> {
    success: bool,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

/// Gateway for all outbound API traffic.
/// Clone is cheap - the underlying client and shared state are Arcs.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    session: Arc<SessionShared>,
    in_flight: Arc<AtomicUsize>,
    loading_tx: Arc<watch::Sender<bool>>,
}

/// Keeps the in-flight count honest across every exit path.
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
    loading_tx: Arc<watch::Sender<bool>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let count = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        self.loading_tx.send_replace(count > 0);
    }
}

impl HttpGateway {
    pub fn new(base_url: &str, session: Arc<SessionShared>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let (loading_tx, _) = watch::channel(false);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
            in_flight: Arc::new(AtomicUsize::new(0)),
            loading_tx: Arc::new(loading_tx),
        })
    }

    /// Process-wide "requests in flight" signal, re-evaluated at the
    /// start and completion of every request.
    pub fn loading(&self) -> watch::Receiver<bool> {
        self.loading_tx.subscribe()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::GET, path, None::<&()>, &[]).await
    }

    pub async fn get_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.request(Method::GET, path, None::<&()>, query).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::POST, path, Some(body), &[]).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::PUT, path, Some(body), &[]).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::DELETE, path, None::<&()>, &[]).await
    }

    /// DELETE for endpoints whose envelope carries no payload.
    pub async fn delete_unit(&self, path: &str) -> Result<(), ApiError> {
        let _guard = self.begin();
        let response = self
            .send(Method::DELETE, path, None::<&()>, &[])
            .await
            .map_err(ApiError::Network)?;
        let response = self.check(response).await?;
        let envelope: ApiEnvelope<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))?;
        if envelope.success {
            Ok(())
        } else {
            Err(ApiError::Validation(
                envelope
                    .message
                    .unwrap_or_else(|| "request rejected".to_string()),
            ))
        }
    }

    async fn request<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let _guard = self.begin();
        let is_get = method == Method::GET;

        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            match self.send(method.clone(), path, body, query).await {
                Ok(response) => break response,
                // One transparent retry for idempotent reads; mutating
                // verbs are never retried.
                Err(e) if is_get && attempt == 1 => {
                    debug!(path, error = %e, "GET failed in transit, retrying once");
                }
                Err(e) => return Err(ApiError::Network(e)),
            }
        };

        let response = self.check(response).await?;
        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))?;
        match envelope {
            ApiEnvelope {
                success: true,
                data: Some(data),
                ..
            } => Ok(data),
            ApiEnvelope {
                success: true,
                data: None,
                message,
            } => Err(ApiError::InvalidResponse(
                message.unwrap_or_else(|| format!("{} returned no data", path)),
            )),
            ApiEnvelope { message, .. } => Err(ApiError::Validation(
                message.unwrap_or_else(|| "request rejected".to_string()),
            )),
        }
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, reqwest::Error> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method, &url)
            .header(header::ACCEPT, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        if !Self::is_anonymous_path(path) {
            if let Some(token) = self.session.token().await {
                request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
        }
        request.send().await
    }

    /// Map non-success statuses into the error taxonomy. A 401 anywhere
    /// invalidates the session before the error reaches the caller.
    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.session.clear().await;
            return Err(ApiError::Unauthenticated);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
        Ok(response)
    }

    fn is_anonymous_path(path: &str) -> bool {
        ANONYMOUS_PATHS.iter().any(|anonymous| path == *anonymous)
    }

    fn begin(&self) -> InFlightGuard {
        let count = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.loading_tx.send_replace(count > 0);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            loading_tx: Arc::clone(&self.loading_tx),
        }
    }
}

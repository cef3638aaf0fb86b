//! Request Gateway - Authenticated JSON Request/Response Client
//!
//! Wraps reqwest with the bearer session, a per-call deadline and a
//! single normalized error type. Never retries: retry policy belongs to
//! the caller.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::types::{error_message, CallOptions};
use crate::adapters::metrics::SyncMetrics;
use crate::domain::{SessionStore, SyncError};
use crate::ports::LoginNavigator;

/// Configuration for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL every path is appended to.
    pub base_url: String,
    /// Default deadline.
    pub timeout: Duration,
    /// Deadline for known-slow endpoints.
    pub slow_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            timeout: Duration::from_secs(15),
            slow_timeout: Duration::from_secs(60),
        }
    }
}

/// Authenticated request/response gateway.
pub struct ApiGateway {
    /// Underlying HTTP client.
    http: Client,
    /// Gateway configuration.
    config: GatewayConfig,
    /// Process-wide session, read on every call.
    session: SessionStore,
    /// Login surface of the surrounding application.
    navigator: Arc<dyn LoginNavigator>,
    /// Optional metrics sink.
    metrics: Option<Arc<SyncMetrics>>,
    /// Session epoch the last login redirect was issued for.
    redirected_epoch: Mutex<Option<u64>>,
}

impl ApiGateway {
    /// Create a new gateway.
    pub fn new(
        config: GatewayConfig,
        session: SessionStore,
        navigator: Arc<dyn LoginNavigator>,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .pool_max_idle_per_host(5)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            config,
            session,
            navigator,
            metrics: None,
            redirected_epoch: Mutex::new(None),
        })
    }

    /// Record call outcomes in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Session this gateway reads.
    pub const fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Issue one call and return the parsed JSON body.
    ///
    /// Empty success bodies yield `Value::Null`. On 401 the session is
    /// cleared and the login redirect requested before the error is
    /// returned.
    #[instrument(skip(self, method, body, options), fields(method = %method))]
    pub async fn call(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
        options: CallOptions,
    ) -> Result<Value, SyncError> {
        let deadline = self.deadline(&options);
        let request = self.build_request(path, method, body, &options);
        let started = Instant::now();

        // Dropping the exchange future on expiry aborts the transport,
        // so a late response is never read.
        let result = match tokio::time::timeout(deadline, Self::exchange(request)).await {
            Ok(Ok((status, bytes))) => self.interpret(status, &bytes),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SyncError::Timeout {
                path: path.to_string(),
                after: deadline,
            }),
        };

        if let Some(metrics) = &self.metrics {
            let outcome = result.as_ref().map_or_else(SyncError::label, |_| "ok");
            metrics.observe_call(outcome, started.elapsed());
        }

        match &result {
            Ok(_) => debug!(path, elapsed_ms = started.elapsed().as_millis(), "Gateway call ok"),
            Err(e) => warn!(path, error = %e, kind = e.label(), "Gateway call failed"),
        }

        result
    }

    /// Issue a call and deserialize the body into `T`.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
        options: CallOptions,
    ) -> Result<T, SyncError> {
        let value = self.call(path, method, body, options).await?;
        serde_json::from_value(value).map_err(|e| SyncError::Protocol(e.to_string()))
    }

    /// GET with default options.
    pub async fn get(&self, path: &str) -> Result<Value, SyncError> {
        self.call(path, Method::GET, None, CallOptions::default()).await
    }

    /// POST a JSON body with default options.
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, SyncError> {
        self.call(path, Method::POST, Some(body), CallOptions::default())
            .await
    }

    /// DELETE with default options.
    pub async fn delete(&self, path: &str) -> Result<Value, SyncError> {
        self.call(path, Method::DELETE, None, CallOptions::default())
            .await
    }

    fn deadline(&self, options: &CallOptions) -> Duration {
        options.timeout.unwrap_or(if options.slow {
            self.config.slow_timeout
        } else {
            self.config.timeout
        })
    }

    fn build_request(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
        options: &CallOptions,
    ) -> RequestBuilder {
        let base = options.base.as_deref().unwrap_or(&self.config.base_url);
        let url = format!("{}{}", base.trim_end_matches('/'), path);

        let mut request = self.http.request(method, &url);
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }

    async fn exchange(request: RequestBuilder) -> Result<(StatusCode, Vec<u8>), SyncError> {
        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Ok((status, bytes.to_vec()))
    }

    fn interpret(&self, status: StatusCode, body: &[u8]) -> Result<Value, SyncError> {
        if status == StatusCode::UNAUTHORIZED {
            self.expire_session();
            return Err(SyncError::AuthExpired);
        }

        if !status.is_success() {
            return Err(SyncError::Http {
                status: status.as_u16(),
                message: error_message(status.as_u16(), body),
            });
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(body).map_err(|e| SyncError::Protocol(e.to_string()))
    }

    /// Clear the session and redirect to login once.
    ///
    /// Redirects at most once per session epoch, so concurrent 401s
    /// produce a single navigation, and a 401 with no session at all
    /// still reaches the login surface. A new login re-arms it.
    fn expire_session(&self) {
        if self.session.clear() {
            info!("Session expired");
        }

        let epoch = self.session.epoch();
        {
            let mut last = self
                .redirected_epoch
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *last == Some(epoch) {
                return;
            }
            *last = Some(epoch);
        }

        if self.navigator.is_on_login_surface() {
            debug!("Rejected while already on login surface");
            return;
        }
        info!("Redirecting to login");
        self.navigator.navigate_to_login();
    }
}

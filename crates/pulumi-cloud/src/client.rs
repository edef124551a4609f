use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use stackpolicy_core::config::ApiConfig;
use stackpolicy_core::{AccessToken, DeploymentSettings, StackIdentity};
use tracing::{debug, warn};

use crate::api::ManagementApi;
use crate::error::ApiError;
use crate::retry::RetryPolicy;
use crate::types::{DriftSchedule, StackTag, TeamStackPermission, TtlSchedule};
use crate::Result;

// ─── ClientOptions ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request timeout; no call waits longer than this.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientOptions {
    pub fn from_config(api: &ApiConfig) -> Self {
        Self {
            timeout: Duration::from_secs(api.timeout_secs.max(1)),
            retry: RetryPolicy::new(api.max_attempts, Duration::from_millis(api.backoff_ms)),
        }
    }
}

// ─── ManagementClient ─────────────────────────────────────────────────────

/// HTTPS JSON client for the stack management API.
///
/// The access token is injected at construction. With [`AccessToken::Absent`]
/// requests go out unauthenticated and the server's 401/403 surfaces as
/// [`ApiError::Auth`].
pub struct ManagementClient {
    http: reqwest::Client,
    base_url: Url,
    token: AccessToken,
    retry: RetryPolicy,
}

impl ManagementClient {
    pub fn new(base_url: &str, token: AccessToken, opts: ClientOptions) -> Result<Self> {
        let parsed =
            Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(opts.timeout)
            .user_agent(concat!("stackpolicy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self {
            http,
            base_url: parsed,
            token,
            retry: opts.retry,
        })
    }

    pub fn from_config(api: &ApiConfig, token: AccessToken) -> Result<Self> {
        Self::new(&api.base_url, token, ClientOptions::from_config(api))
    }

    // ─── URL building ─────────────────────────────────────────────────────

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `/api/stacks/{org}/{project}/{stack}/<tail…>`
    fn stack_url(&self, id: &StackIdentity, tail: &[&str]) -> Result<Url> {
        let mut segments = vec!["api", "stacks", id.organization(), id.project(), id.stack()];
        segments.extend_from_slice(tail);
        self.url(&segments)
    }

    // ─── Transport ────────────────────────────────────────────────────────

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self
            .http
            .request(method, url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        match self.token.as_deref() {
            Some(t) => req.header(AUTHORIZATION, format!("token {t}")),
            None => req,
        }
    }

    /// Send with bounded retries. Only retryable failures are repeated; the
    /// final error (or the first non-retryable one) is returned as-is.
    async fn execute(
        &self,
        id: &StackIdentity,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<Response> {
        let mut attempt = 1;
        loop {
            let mut req = self.request(method.clone(), url.clone());
            if let Some(b) = &body {
                req = req.body(b.clone());
            }
            debug!(stack = %id, %method, %url, attempt, "management API request");

            let outcome = match req.send().await {
                Ok(resp) => check_status(id, resp).await,
                Err(source) => Err(ApiError::Transport {
                    identity: id.to_string(),
                    source,
                }),
            };

            match outcome {
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        stack = %id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying management API request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn put_json<T: Serialize + Sync>(
        &self,
        id: &StackIdentity,
        url: Url,
        value: &T,
    ) -> Result<()> {
        let body = serde_json::to_vec(value).map_err(|e| ApiError::Decode {
            identity: id.to_string(),
            message: e.to_string(),
        })?;
        self.execute(id, Method::PUT, url, Some(body)).await?;
        Ok(())
    }
}

async fn check_status(id: &StackIdentity, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let identity = id.to_string();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Auth {
            identity,
            status: status.as_u16(),
        }),
        StatusCode::NOT_FOUND => Err(ApiError::NotFound { identity }),
        _ => {
            let body = resp.text().await.unwrap_or_default();
            Err(ApiError::UpstreamUnavailable {
                identity,
                status: status.as_u16(),
                body,
            })
        }
    }
}

// ─── ManagementApi ────────────────────────────────────────────────────────

impl ManagementApi for ManagementClient {
    async fn get_deployment_settings(
        &self,
        id: &StackIdentity,
    ) -> Result<Option<DeploymentSettings>> {
        let url = self.stack_url(id, &["deployments", "settings"])?;
        match self.execute(id, Method::GET, url, None).await {
            Ok(resp) => resp
                .json::<DeploymentSettings>()
                .await
                .map(Some)
                .map_err(|e| ApiError::Decode {
                    identity: id.to_string(),
                    message: e.to_string(),
                }),
            Err(ApiError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put_deployment_settings(
        &self,
        id: &StackIdentity,
        settings: &DeploymentSettings,
    ) -> Result<()> {
        let url = self.stack_url(id, &["deployments", "settings"])?;
        self.put_json(id, url, settings).await
    }

    async fn set_stack_tag(&self, id: &StackIdentity, tag: &StackTag) -> Result<()> {
        let url = self.stack_url(id, &["tags", &tag.name])?;
        self.put_json(id, url, tag).await
    }

    async fn put_ttl_schedule(&self, id: &StackIdentity, schedule: &TtlSchedule) -> Result<()> {
        let url = self.stack_url(id, &["deployments", "schedules", "ttl"])?;
        self.put_json(id, url, schedule).await
    }

    async fn put_drift_schedule(
        &self,
        id: &StackIdentity,
        schedule: &DriftSchedule,
    ) -> Result<()> {
        let url = self.stack_url(id, &["deployments", "schedules", "drift"])?;
        self.put_json(id, url, schedule).await
    }

    async fn grant_team_permission(
        &self,
        id: &StackIdentity,
        grant: &TeamStackPermission,
    ) -> Result<()> {
        let url = self.url(&[
            "api",
            "orgs",
            id.organization(),
            "teams",
            &grant.team,
            "stacks",
            id.project(),
            id.stack(),
        ])?;
        self.put_json(id, url, grant).await
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

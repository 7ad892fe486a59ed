//! Jellyfin management API client
//!
//! Implements [`PluginHost`] over HTTP with `reqwest`. Every request carries
//! an `X-Emby-Authorization` header made of fixed client-identity fields and,
//! once logged in, the session token. Each request has its own short timeout
//! so a hung connection cannot eat a whole polling budget.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use sdk::types::{InstalledPlugin, RepositoryRegistration, Version};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{HostError, PluginHost, Result, TriggerAck};
use crate::poller::Poller;

/// Header the host reads client identity and token from
pub const AUTH_HEADER: &str = "X-Emby-Authorization";

/// Fixed identity fields sent with every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub client: String,
    pub device: String,
    pub device_id: String,
    pub version: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            client: "Jellyship".to_string(),
            device: "Build Script".to_string(),
            device_id: "jellyship-build".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Connection settings for [`HostClient`]
#[derive(Debug, Clone)]
pub struct HostSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub identity: ClientIdentity,
    /// Timeout applied to every request
    pub request_timeout: Duration,
    /// Shorter timeout for the restart trigger, which may never be answered
    pub restart_timeout: Duration,
    pub poll_interval: Duration,
}

/// Authenticated state against one host. Owned by a single client and
/// rewritten in place on every (re-)authentication.
#[derive(Debug, Clone)]
pub struct Session {
    base_url: String,
    username: String,
    password: String,
    token: Option<String>,
    user_id: Option<String>,
}

impl Session {
    fn new(base_url: &str, username: &str, password: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            token: None,
            user_id: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// Build the composite authorization header value
pub fn authorization_header(identity: &ClientIdentity, token: Option<&str>) -> String {
    let mut parts = vec![
        format!("MediaBrowser Client=\"{}\"", identity.client),
        format!("Device=\"{}\"", identity.device),
        format!("DeviceId=\"{}\"", identity.device_id),
        format!("Version=\"{}\"", identity.version),
    ];
    if let Some(token) = token {
        parts.push(format!("Token=\"{}\"", token));
    }
    parts.join(", ")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    access_token: Option<String>,
    user: Option<AuthenticatedUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticatedUser {
    id: Option<String>,
}

/// HTTP client for the host's management API
#[derive(Debug)]
pub struct HostClient {
    session: Session,
    identity: ClientIdentity,
    client: Client,
    restart_timeout: Duration,
    poller: Poller,
}

impl HostClient {
    /// Create an unauthenticated client
    pub fn new(settings: HostSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("jellyship/{}", env!("CARGO_PKG_VERSION")))
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| HostError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            session: Session::new(&settings.base_url, &settings.username, &settings.password),
            identity: settings.identity,
            client,
            restart_timeout: settings.restart_timeout,
            poller: Poller::new(settings.poll_interval),
        })
    }

    /// Create a client and log in
    pub async fn connect(settings: HostSettings) -> Result<Self> {
        let mut client = Self::new(settings)?;
        client.authenticate().await?;
        Ok(client)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.session.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path)).header(
            AUTH_HEADER,
            authorization_header(&self.identity, self.session.token.as_deref()),
        )
    }

    async fn send(&self, builder: RequestBuilder, endpoint: &str) -> Result<reqwest::Response> {
        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HostError::Transport(format!("{} timed out", endpoint))
            } else if e.is_connect() {
                HostError::Transport(format!(
                    "Cannot connect to {}. Is the host running?",
                    self.session.base_url
                ))
            } else {
                HostError::Transport(e.to_string())
            }
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.request(Method::GET, path), path).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HostError::UnexpectedStatus {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| HostError::Decode(format!("{}: {}", path, e)))
    }

    fn acknowledge(endpoint: &str, status: StatusCode) -> TriggerAck {
        if status.is_success() {
            debug!(endpoint, status = status.as_u16(), "Request accepted");
            TriggerAck::Accepted(status.as_u16())
        } else {
            warn!(endpoint, status = status.as_u16(), "Request rejected");
            TriggerAck::Rejected(status.as_u16())
        }
    }
}

#[async_trait]
impl PluginHost for HostClient {
    async fn authenticate(&mut self) -> Result<()> {
        info!(host = %self.session.base_url, "Authenticating");

        let path = "/Users/AuthenticateByName";
        let builder = self.request(Method::POST, path).json(&json!({
            "Username": self.session.username,
            "Pw": self.session.password,
        }));
        let response = self
            .send(builder, path)
            .await
            .map_err(|e| HostError::Authentication(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HostError::Authentication(format!(
                "host returned HTTP {}",
                status.as_u16()
            )));
        }

        let result: AuthenticationResult = response
            .json()
            .await
            .map_err(|e| HostError::Authentication(format!("unreadable response: {}", e)))?;

        let token = result
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| HostError::Authentication("response carried no access token".into()))?;

        self.session.token = Some(token);
        self.session.user_id = result.user.and_then(|u| u.id);
        info!(user_id = ?self.session.user_id, "Authenticated");
        Ok(())
    }

    async fn repositories(&self) -> Result<Vec<RepositoryRegistration>> {
        self.get_json("/Repositories").await
    }

    async fn set_repositories(&self, repositories: &[RepositoryRegistration]) -> Result<()> {
        let path = "/Repositories";
        let response = self
            .send(self.request(Method::POST, path).json(repositories), path)
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HostError::UnexpectedStatus {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn installed_plugins(&self) -> Result<Vec<InstalledPlugin>> {
        self.get_json("/Plugins").await
    }

    async fn uninstall(&self, plugin_id: &str) -> Result<TriggerAck> {
        info!(plugin_id = %plugin_id, "Uninstalling plugin");
        let path = format!("/Plugins/{}", plugin_id);
        let response = self.send(self.request(Method::DELETE, &path), &path).await?;
        Ok(Self::acknowledge(&path, response.status()))
    }

    async fn install(
        &self,
        package: &str,
        repository_url: &str,
        version: &Version,
    ) -> Result<TriggerAck> {
        info!(package = %package, version = %version, "Installing plugin");
        let path = format!("/Packages/Installed/{}", package);
        let version = version.to_string();
        let builder = self
            .request(Method::POST, &path)
            .query(&[("repositoryUrl", repository_url), ("version", version.as_str())]);
        let response = self.send(builder, &path).await?;
        Ok(Self::acknowledge(&path, response.status()))
    }

    async fn restart(&self) -> Result<TriggerAck> {
        info!("Restarting host");
        let path = "/System/Restart";
        let builder = self
            .request(Method::POST, path)
            .timeout(self.restart_timeout);

        // The host may close the connection as it goes down
        match builder.send().await {
            Ok(response) => Ok(Self::acknowledge(path, response.status())),
            Err(e) => {
                debug!(error = %e, "Restart connection dropped");
                Ok(TriggerAck::ConnectionDropped)
            }
        }
    }

    async fn health_check(&self) -> Result<()> {
        let path = "/System/Info/Public";
        let response = self.send(self.request(Method::GET, path), path).await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            other => Err(HostError::UnexpectedStatus {
                endpoint: path.to_string(),
                status: other.as_u16(),
            }),
        }
    }

    fn poller(&self) -> Poller {
        self.poller
    }
}

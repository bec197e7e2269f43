use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::models::Id;

/// Best-effort display-name lookup against the external auth service.
/// Implementations must never fail a request: any problem is a `None`.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn display_name(&self, user_id: Id) -> Option<String>;
}

/// Placeholder used whenever a lookup comes back empty.
pub fn fallback_name(id: &Id) -> String {
    format!("User {}", &id.to_string()[..8])
}

#[derive(Deserialize)]
struct UserInfo {
    #[serde(default, alias = "nombre")]
    name: Option<String>,
    #[serde(default, alias = "apellido")]
    last_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl UserInfo {
    fn display(self) -> Option<String> {
        let full = format!(
            "{} {}",
            self.name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let full = full.trim();
        if !full.is_empty() {
            return Some(full.to_string());
        }
        self.email
    }
}

pub struct HttpNameResolver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNameResolver {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl NameResolver for HttpNameResolver {
    async fn display_name(&self, user_id: Id) -> Option<String> {
        let url = format!("{}/users/{}", self.base_url.trim_end_matches('/'), user_id);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| log::debug!("name lookup failed for {user_id}: {e}"))
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let info: UserInfo = resp
            .json()
            .await
            .map_err(|e| log::debug!("name lookup for {user_id} returned bad body: {e}"))
            .ok()?;
        info.display()
    }
}

/// Resolver used when no auth service is configured; everything falls back
/// to the placeholder.
pub struct NoNameResolver;

#[async_trait]
impl NameResolver for NoNameResolver {
    async fn display_name(&self, _user_id: Id) -> Option<String> {
        None
    }
}

pub fn build_name_resolver(cfg: &AppConfig) -> Arc<dyn NameResolver> {
    match cfg.auth_service_url.as_deref() {
        Some(url) => match HttpNameResolver::new(url) {
            Ok(resolver) => Arc::new(resolver),
            Err(e) => {
                log::warn!("failed to build HTTP name resolver: {e}; using placeholders");
                Arc::new(NoNameResolver)
            }
        },
        None => Arc::new(NoNameResolver),
    }
}

use anyhow::{bail, Context};
use jsonwebtoken::Algorithm;
use std::path::PathBuf;
use std::str::FromStr;

/// Process-wide configuration, read once at startup. Everything here comes
/// from the environment; there is no config file layer.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Shared HMAC secret for verifying bearer tokens. Must match the
    /// issuing auth service.
    pub jwt_secret: String,
    pub jwt_algorithm: Algorithm,
    /// Base URL of the auth service used for display-name lookups. Absent
    /// means comment authors render with placeholder names.
    pub auth_service_url: Option<String>,
    /// Directory where uploaded images live.
    pub media_root: PathBuf,
    /// Externally reachable base URL, used to absolutise stored image paths.
    pub public_base_url: String,
    /// Extra CORS origin for the deployed frontend.
    pub frontend_url: Option<String>,
    pub bind_addr: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < 32 {
            bail!("JWT_SECRET must be at least 32 bytes");
        }
        let jwt_algorithm = match std::env::var("JWT_ALG") {
            Ok(raw) => Algorithm::from_str(&raw)
                .map_err(|_| anyhow::anyhow!("unsupported JWT_ALG '{raw}'"))?,
            Err(_) => Algorithm::HS256,
        };
        Ok(Self {
            jwt_secret,
            jwt_algorithm,
            auth_service_url: std::env::var("AUTH_SERVICE_URL").ok(),
            media_root: std::env::var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("media")),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            frontend_url: std::env::var("FRONTEND_URL").ok(),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }

    /// Absolute URL for a stored relative media path.
    pub fn media_url(&self, relative: &str) -> String {
        format!(
            "{}/media/{}",
            self.public_base_url.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }
}

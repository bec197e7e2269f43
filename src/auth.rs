use actix_web::{dev::Payload, web, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::config::AppConfig;

/// Closed role set. Anything the token issuer sends that we do not
/// recognise collapses to `Other`, which holds no privileges.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Institution,
    Advisor,
    Student,
    Other,
}

impl Role {
    /// Case-insensitive parse, tolerant of the Spanish role names the
    /// upstream auth service issues.
    pub fn parse(raw: Option<&str>) -> Role {
        match raw.map(|r| r.trim().to_ascii_lowercase()).as_deref() {
            Some("admin") => Role::Admin,
            Some("institution") | Some("institucion") => Role::Institution,
            Some("advisor") | Some("orientador") => Role::Advisor,
            Some("student") | Some("estudiante") => Role::Student,
            _ => Role::Other,
        }
    }
}

/// Identity derived from a verified token. Ephemeral: rebuilt per request,
/// never persisted by this service.
#[derive(Debug, Clone, Serialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    pub institution_id: Option<Uuid>,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,
    #[error("token carries no usable subject")]
    MissingSubject,
}

fn claim_str(claims: &serde_json::Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| claims.get(*k).and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// Validate a bearer token and normalise its claims into an `Actor`.
///
/// Claims are read through alias lists (`id`/`user_id`/`sub`, `rol`/`role`,
/// `institucion_id`/`institution_id`, `nombre`/`name`) because issuers in
/// the ecosystem disagree on names. Expiry is checked when the claim is
/// present; tokens without `exp` are accepted.
pub fn resolve_actor(token: &str, cfg: &AppConfig) -> Result<Actor, AuthError> {
    let mut validation = Validation::new(cfg.jwt_algorithm);
    validation.validate_exp = true;
    validation.set_required_spec_claims::<&str>(&[]);
    let data = decode::<serde_json::Value>(
        token,
        &DecodingKey::from_secret(cfg.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AuthError::InvalidToken)?;
    let claims = data.claims;

    let id = claim_str(&claims, &["id", "user_id", "sub"])
        .and_then(|raw| Uuid::parse_str(&raw).ok())
        .ok_or(AuthError::MissingSubject)?;
    Ok(Actor {
        id,
        role: Role::parse(claim_str(&claims, &["rol", "role"]).as_deref()),
        institution_id: claim_str(&claims, &["institucion_id", "institution_id"])
            .and_then(|raw| Uuid::parse_str(&raw).ok()),
        email: claim_str(&claims, &["email"]),
        name: claim_str(&claims, &["nombre", "name"]),
    })
}

/// Extractor yielding a validated `Actor`. Missing or invalid credentials
/// are a 401.
pub struct Auth(pub Actor);

/// Extractor for endpoints that serve anonymous callers too. No
/// `Authorization` header yields `None`; a header with a bad token is still
/// rejected with 401 rather than silently downgraded to anonymous.
pub struct MaybeAuth(pub Option<Actor>);

fn config_of(req: &HttpRequest) -> Result<web::Data<AppConfig>, Error> {
    req.app_data::<web::Data<AppConfig>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("AppConfig not registered"))
}

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let cfg = match config_of(req) {
            Ok(c) => c,
            Err(e) => return ready(Err(e)),
        };
        if let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() {
            return ready(match resolve_actor(bearer.token(), &cfg) {
                Ok(actor) => Ok(Auth(actor)),
                Err(e) => Err(actix_web::error::ErrorUnauthorized(e.to_string())),
            });
        }
        ready(Err(actix_web::error::ErrorUnauthorized(
            "authorization required",
        )))
    }
}

impl FromRequest for MaybeAuth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        if req
            .headers()
            .get(actix_web::http::header::AUTHORIZATION)
            .is_none()
        {
            return ready(Ok(MaybeAuth(None)));
        }
        let cfg = match config_of(req) {
            Ok(c) => c,
            Err(e) => return ready(Err(e)),
        };
        if let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() {
            return ready(match resolve_actor(bearer.token(), &cfg) {
                Ok(actor) => Ok(MaybeAuth(Some(actor))),
                Err(e) => Err(actix_web::error::ErrorUnauthorized(e.to_string())),
            });
        }
        ready(Err(actix_web::error::ErrorUnauthorized(
            "malformed authorization header",
        )))
    }
}

/// Sign an arbitrary claim set with the configured secret. The service never
/// issues tokens in production flows; this exists for tests and local smoke
/// runs against a stub auth service.
pub fn issue_token(
    cfg: &AppConfig,
    claims: &serde_json::Value,
) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::new(cfg.jwt_algorithm),
        claims,
        &EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
    )
}

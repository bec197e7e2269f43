use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{Actor, Role};

pub type Id = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "post_status", rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "author_type", rename_all = "lowercase")]
pub enum AuthorType {
    Individual,
    Institution,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Category {
    pub id: Id,
    pub name: String,
    pub description: Option<String>,
    pub color: String, // hex, e.g. "#1a6b3f"
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    "#000000".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateCategory {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub title: String,
    pub body: String,
    /// Opaque reference into the external auth service.
    pub author_id: Id,
    /// Non-null exactly when `author_type == Institution`.
    pub author_institution_id: Option<Id>,
    pub category_id: Option<Id>,
    pub published_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: PostStatus,
    /// Relative path under the media root; rewritten to an absolute URL at
    /// serialization time.
    pub image: Option<String>,
    pub view_count: i32,
    pub author_type: AuthorType,
}

/// Client-controlled slice of a post. Author attribution is deliberately
/// absent: it is derived from the verified token, never accepted as input.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPost {
    pub title: String,
    pub body: String,
    pub category_id: Option<Id>,
    pub status: Option<PostStatus>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub body: Option<String>,
    pub category_id: Option<Id>,
    pub status: Option<PostStatus>,
    pub image: Option<String>,
}

/// Server-derived author attribution, built from the request actor.
#[derive(Debug, Clone)]
pub struct PostAuthor {
    pub id: Id,
    pub author_type: AuthorType,
    pub institution_id: Option<Id>,
}

impl PostAuthor {
    pub fn from_actor(actor: &Actor) -> Self {
        if actor.role == Role::Institution {
            Self {
                id: actor.id,
                author_type: AuthorType::Institution,
                institution_id: actor.institution_id,
            }
        } else {
            Self {
                id: actor.id,
                author_type: AuthorType::Individual,
                institution_id: None,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub post_id: Id,
    pub author_id: Id,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Join row linking a reply comment to its single parent. `child_id` is
/// unique: a comment is "the reply" in at most one link, while a parent may
/// accumulate many.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ReplyLink {
    pub id: Id,
    pub parent_id: Id,
    pub child_id: Id,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Like {
    pub id: Id,
    pub post_id: Id,
    pub actor_id: Id,
    pub liked_at: DateTime<Utc>,
}

/// Query constraints for post listings. Every provided field narrows the
/// result (AND semantics); visibility is applied on top by the store.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PostFilter {
    pub category: Option<Id>,
    pub institution_id: Option<Id>,
    /// Case-insensitive substring over title OR body.
    pub q: Option<String>,
    pub status: Option<PostStatus>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
pub struct PostStats {
    pub comments: i64,
    pub likes: i64,
}

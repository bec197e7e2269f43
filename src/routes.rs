use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt as _;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{Auth, MaybeAuth};
use crate::comments::{self, CommentNode, ThreadOrder};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::media::MediaStore;
use crate::models::*;
use crate::names::NameResolver;
use crate::policy;
use crate::repo::Repo;
use crate::visibility;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/categories")
                    .route(web::get().to(list_categories))
                    .route(web::post().to(create_category)),
            )
            .service(
                web::resource("/categories/{id}")
                    .route(web::get().to(get_category))
                    .route(web::patch().to(update_category))
                    .route(web::delete().to(delete_category)),
            )
            .service(
                web::resource("/posts")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            .service(
                web::resource("/posts/{id}")
                    .route(web::get().to(get_post))
                    .route(web::patch().to(update_post))
                    .route(web::delete().to(delete_post)),
            )
            // named action kept for API parity with the original service;
            // same explicit authorization check as the plain delete
            .service(web::resource("/posts/{id}/remove").route(web::delete().to(remove_post)))
            .service(web::resource("/posts/{id}/like").route(web::post().to(like_toggle)))
            .service(web::resource("/posts/{id}/comments").route(web::get().to(post_comments)))
            .service(
                web::resource("/comments/by-post/{post_id}")
                    .route(web::get().to(comments_by_post)),
            )
            .service(web::resource("/comments").route(web::post().to(create_comment)))
            .service(
                web::resource("/comments/{id}")
                    .route(web::get().to(get_comment))
                    .route(web::delete().to(delete_comment)),
            )
            .service(web::resource("/comments/{id}/reply").route(web::post().to(reply_comment)))
            .service(web::resource("/media").route(web::post().to(upload_media)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me))),
    );
    // unprefixed so stored image URLs work directly in <img src>
    cfg.route("/media/{path:.*}", web::get().to(serve_media));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub media: Arc<dyn MediaStore>,
    pub names: Arc<dyn NameResolver>,
}

/// Read-side representation of a post: raw fields plus counts, with the
/// stored relative image path rewritten to an absolute URL.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PostView {
    pub id: Id,
    pub title: String,
    pub body: String,
    pub author_id: Id,
    pub author_institution_id: Option<Id>,
    pub author_type: AuthorType,
    pub category_id: Option<Id>,
    pub published_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub status: PostStatus,
    pub image: Option<String>,
    pub view_count: i32,
    pub comments_count: i64,
    pub likes_count: i64,
}

impl PostView {
    fn new(post: Post, stats: PostStats, cfg: &AppConfig) -> Self {
        Self {
            id: post.id,
            title: post.title,
            body: post.body,
            author_id: post.author_id,
            author_institution_id: post.author_institution_id,
            author_type: post.author_type,
            category_id: post.category_id,
            published_at: post.published_at,
            updated_at: post.updated_at,
            status: post.status,
            image: post.image.map(|rel| cfg.media_url(&rel)),
            view_count: post.view_count,
            comments_count: stats.comments,
            likes_count: stats.likes,
        }
    }
}

async fn view_of(
    data: &AppState,
    cfg: &AppConfig,
    post: Post,
) -> Result<PostView, ApiError> {
    let stats = data.repo.post_stats(post.id).await?;
    Ok(PostView::new(post, stats, cfg))
}

// ---------------- categories (admin only) -----------------------

#[utoipa::path(
    get,
    path = "/api/v1/categories",
    responses(
        (status = 200, description = "List categories", body = [Category]),
        (status = 403, description = "Forbidden - admins only")
    )
)]
pub async fn list_categories(
    auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    if !policy::is_admin(&auth.0) {
        return Err(ApiError::Forbidden);
    }
    let categories = data.repo.list_categories().await?;
    Ok(HttpResponse::Ok().json(categories))
}

#[utoipa::path(
    post,
    path = "/api/v1/categories",
    request_body = NewCategory,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 403, description = "Forbidden - admins only")
    )
)]
pub async fn create_category(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewCategory>,
) -> Result<HttpResponse, ApiError> {
    if !policy::is_admin(&auth.0) {
        return Err(ApiError::Forbidden);
    }
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("name must not be empty".into()));
    }
    let category = data.repo.create_category(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(category))
}

pub async fn get_category(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    if !policy::is_admin(&auth.0) {
        return Err(ApiError::Forbidden);
    }
    let category = data.repo.get_category(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(category))
}

pub async fn update_category(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateCategory>,
) -> Result<HttpResponse, ApiError> {
    if !policy::is_admin(&auth.0) {
        return Err(ApiError::Forbidden);
    }
    let category = data
        .repo
        .update_category(path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(category))
}

pub async fn delete_category(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    if !policy::is_admin(&auth.0) {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_category(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- posts -----------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/posts",
    params(
        ("category" = Option<Uuid>, Query, description = "Filter by category id"),
        ("institution_id" = Option<Uuid>, Query, description = "Filter by author institution"),
        ("q" = Option<String>, Query, description = "Case-insensitive substring over title or body"),
        ("status" = Option<PostStatus>, Query, description = "Filter by status")
    ),
    responses((status = 200, description = "Visible posts, newest first", body = [PostView]))
)]
pub async fn list_posts(
    maybe: MaybeAuth,
    data: web::Data<AppState>,
    cfg: web::Data<AppConfig>,
    filter: web::Query<PostFilter>,
) -> Result<HttpResponse, ApiError> {
    let posts = data.repo.list_posts(&filter, maybe.0.as_ref()).await?;
    let mut views = Vec::with_capacity(posts.len());
    for post in posts {
        views.push(view_of(&data, &cfg, post).await?);
    }
    Ok(HttpResponse::Ok().json(views))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts",
    request_body = NewPost,
    responses(
        (status = 201, description = "Post created", body = PostView),
        (status = 400, description = "Missing required field"),
        (status = 403, description = "Forbidden - admins and institutions only"),
        (status = 404, description = "Unknown category")
    )
)]
pub async fn create_post(
    auth: Auth,
    data: web::Data<AppState>,
    cfg: web::Data<AppConfig>,
    payload: web::Json<NewPost>,
) -> Result<HttpResponse, ApiError> {
    if !policy::can_create_post(&auth.0) {
        return Err(ApiError::Forbidden);
    }
    let new = payload.into_inner();
    if new.title.trim().is_empty() {
        return Err(ApiError::Validation("title must not be empty".into()));
    }
    if new.body.trim().is_empty() {
        return Err(ApiError::Validation("body must not be empty".into()));
    }
    // attribution comes from the verified token, whatever the client sent
    let author = PostAuthor::from_actor(&auth.0);
    let post = data.repo.create_post(new, author).await?;
    let view = view_of(&data, &cfg, post).await?;
    Ok(HttpResponse::Created().json(view))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    params(("id" = Uuid, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post", body = PostView),
        (status = 404, description = "Absent, or not visible to the caller")
    )
)]
pub async fn get_post(
    maybe: MaybeAuth,
    data: web::Data<AppState>,
    cfg: web::Data<AppConfig>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    if !visibility::visible_to(&post, maybe.0.as_ref()) {
        return Err(ApiError::NotFound);
    }
    match data.repo.record_view(post.id).await {
        Ok(()) => metrics::increment_counter!("post_views_total"),
        Err(e) => log::debug!("view count bump failed for {}: {e}", post.id),
    }
    let view = view_of(&data, &cfg, post).await?;
    Ok(HttpResponse::Ok().json(view))
}

#[utoipa::path(
    patch,
    path = "/api/v1/posts/{id}",
    request_body = UpdatePost,
    params(("id" = Uuid, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post updated", body = PostView),
        (status = 403, description = "Forbidden - author or admin only"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn update_post(
    auth: Auth,
    data: web::Data<AppState>,
    cfg: web::Data<AppConfig>,
    path: web::Path<Id>,
    payload: web::Json<UpdatePost>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(*path).await?;
    if !policy::can_mutate_post(&auth.0, &post) {
        return Err(ApiError::Forbidden);
    }
    let updated = data
        .repo
        .update_post(path.into_inner(), payload.into_inner())
        .await?;
    let view = view_of(&data, &cfg, updated).await?;
    Ok(HttpResponse::Ok().json(view))
}

async fn authorize_and_delete_post(
    auth: &Auth,
    data: &AppState,
    id: Id,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(id).await?;
    if !policy::can_mutate_post(&auth.0, &post) {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_post(id).await?;
    if let Some(image) = post.image.as_deref() {
        if let Err(e) = data.media.delete(image).await {
            log::warn!("orphaned media file '{image}': {e}");
        }
    }
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    delete,
    path = "/api/v1/posts/{id}",
    params(("id" = Uuid, Path, description = "Post id")),
    responses(
        (status = 204, description = "Post deleted, comments/replies/likes cascaded"),
        (status = 403, description = "Forbidden - author or admin only"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    authorize_and_delete_post(&auth, &data, path.into_inner()).await
}

pub async fn remove_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    authorize_and_delete_post(&auth, &data, path.into_inner()).await
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LikeToggleResponse {
    pub liked: bool,
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/{id}/like",
    params(("id" = Uuid, Path, description = "Post id")),
    responses(
        (status = 200, description = "Resulting like state", body = LikeToggleResponse),
        (status = 401, description = "Authentication required"),
        (status = 404, description = "Absent, or not visible to the caller")
    )
)]
pub async fn like_toggle(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    if !visibility::visible_to(&post, Some(&auth.0)) {
        return Err(ApiError::NotFound);
    }
    let liked = data.repo.toggle_like(post.id, auth.0.id).await?;
    metrics::increment_counter!("like_toggles_total");
    Ok(HttpResponse::Ok().json(LikeToggleResponse { liked }))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}/comments",
    params(("id" = Uuid, Path, description = "Post id")),
    responses(
        (status = 200, description = "Nested comment thread, newest first", body = [CommentNode]),
        (status = 404, description = "Absent, or not visible to the caller")
    )
)]
pub async fn post_comments(
    maybe: MaybeAuth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    if !visibility::visible_to(&post, maybe.0.as_ref()) {
        return Err(ApiError::NotFound);
    }
    let thread = comments::thread_for_post(
        data.repo.as_ref(),
        data.names.as_ref(),
        post.id,
        ThreadOrder::NewestFirst,
    )
    .await?;
    Ok(HttpResponse::Ok().json(thread))
}

// ---------------- comments --------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct NewCommentRequest {
    pub post_id: Option<Id>,
    pub body: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ReplyRequest {
    pub body: Option<String>,
}

fn required_body(raw: Option<&str>) -> Result<String, ApiError> {
    match raw {
        Some(body) if !body.trim().is_empty() => Ok(body.to_string()),
        _ => Err(ApiError::Validation("body must not be empty".into())),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/comments",
    request_body = NewCommentRequest,
    responses(
        (status = 201, description = "Comment created", body = CommentNode),
        (status = 400, description = "Missing post_id or empty body"),
        (status = 403, description = "Forbidden - role may not comment"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn create_comment(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    if !policy::can_comment(&auth.0) {
        return Err(ApiError::Forbidden);
    }
    let post_id = payload
        .post_id
        .ok_or_else(|| ApiError::Validation("post_id is required".into()))?;
    let body = required_body(payload.body.as_deref())?;
    let comment = data.repo.create_comment(post_id, auth.0.id, body).await?;
    let node = comments::node_for_comment(data.repo.as_ref(), data.names.as_ref(), comment.id)
        .await?;
    Ok(HttpResponse::Created().json(node))
}

#[utoipa::path(
    get,
    path = "/api/v1/comments/{id}",
    params(("id" = Uuid, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Comment with nested replies", body = CommentNode),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn get_comment(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let node =
        comments::node_for_comment(data.repo.as_ref(), data.names.as_ref(), path.into_inner())
            .await?;
    Ok(HttpResponse::Ok().json(node))
}

#[utoipa::path(
    delete,
    path = "/api/v1/comments/{id}",
    params(("id" = Uuid, Path, description = "Comment id")),
    responses(
        (status = 204, description = "Comment and its reply subtree deleted"),
        (status = 403, description = "Forbidden - author or admin only"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn delete_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let comment = data.repo.get_comment(*path).await?;
    if !policy::can_mutate_comment(&auth.0, &comment) {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_comment(comment.id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/v1/comments/{id}/reply",
    request_body = ReplyRequest,
    params(("id" = Uuid, Path, description = "Parent comment id")),
    responses(
        (status = 201, description = "Reply created under the parent's post", body = CommentNode),
        (status = 400, description = "Empty body"),
        (status = 403, description = "Forbidden - role may not comment"),
        (status = 404, description = "Parent comment not found")
    )
)]
pub async fn reply_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ReplyRequest>,
) -> Result<HttpResponse, ApiError> {
    if !policy::can_comment(&auth.0) {
        return Err(ApiError::Forbidden);
    }
    let body = required_body(payload.body.as_deref())?;
    let reply = data
        .repo
        .create_reply(path.into_inner(), auth.0.id, body)
        .await?;
    let node =
        comments::node_for_comment(data.repo.as_ref(), data.names.as_ref(), reply.id).await?;
    Ok(HttpResponse::Created().json(node))
}

#[utoipa::path(
    get,
    path = "/api/v1/comments/by-post/{post_id}",
    params(("post_id" = Uuid, Path, description = "Post id")),
    responses(
        (status = 200, description = "Nested comment thread, oldest first", body = [CommentNode]),
        (status = 404, description = "Post not found")
    )
)]
pub async fn comments_by_post(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    data.repo.get_post(post_id).await?;
    let thread = comments::thread_for_post(
        data.repo.as_ref(),
        data.names.as_ref(),
        post_id,
        ThreadOrder::OldestFirst,
    )
    .await?;
    Ok(HttpResponse::Ok().json(thread))
}

// ---------------- media -----------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MediaUploadResponse {
    /// Relative path to store on a post's `image` field.
    pub path: String,
    pub mime: String,
    pub size: usize,
}

const MEDIA_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

const ALLOWED_MIME: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

#[utoipa::path(
    post,
    path = "/api/v1/media",
    responses(
        (status = 201, description = "Image stored", body = MediaUploadResponse),
        (status = 403, description = "Forbidden - publishers only"),
        (status = 413, description = "Payload too large"),
        (status = 415, description = "Unsupported media type")
    )
)]
pub async fn upload_media(
    auth: Auth,
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    use actix_web::http::StatusCode;
    if !policy::can_create_post(&auth.0) {
        return Err(ApiError::Forbidden);
    }
    while let Some(field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::Internal
    })? {
        match field.content_disposition().get_name() {
            Some("file") => {}
            _ => continue,
        }
        let mut field_stream = field;
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field_stream.try_next().await.map_err(|e| {
            log::error!("stream read error: {e}");
            ApiError::Internal
        })? {
            if bytes.len() + chunk.len() > MEDIA_SIZE_LIMIT {
                return Ok(HttpResponse::build(StatusCode::PAYLOAD_TOO_LARGE).finish());
            }
            bytes.extend_from_slice(&chunk);
        }
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        if !ALLOWED_MIME.contains(&mime.as_str()) {
            return Ok(HttpResponse::UnsupportedMediaType().finish());
        }
        let path = data.media.save(&mime, &bytes).await?;
        return Ok(HttpResponse::Created().json(MediaUploadResponse {
            path,
            mime,
            size: bytes.len(),
        }));
    }
    Err(ApiError::Validation("multipart field 'file' is required".into()))
}

pub async fn serve_media(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let (bytes, mime) = data.media.load(&path.into_inner()).await?;
    Ok(HttpResponse::Ok()
        .insert_header(("Content-Type", mime))
        .body(bytes))
}

// ---------------- auth ------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "The validated actor behind the token"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn auth_me(auth: Auth) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(auth.0))
}

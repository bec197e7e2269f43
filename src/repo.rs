use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::Actor;
use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("store error: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait CategoryRepo: Send + Sync {
    /// Ordered by name, matching the admin listing.
    async fn list_categories(&self) -> RepoResult<Vec<Category>>;
    async fn create_category(&self, new: NewCategory) -> RepoResult<Category>;
    async fn get_category(&self, id: Id) -> RepoResult<Category>;
    async fn update_category(&self, id: Id, upd: UpdateCategory) -> RepoResult<Category>;
    /// Deleting a category nulls the back reference on its posts, never
    /// cascades into them.
    async fn delete_category(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Filtered, visibility-restricted listing, newest first. This is the
    /// sole gate on draft/archived exposure.
    async fn list_posts(&self, filter: &PostFilter, viewer: Option<&Actor>)
        -> RepoResult<Vec<Post>>;
    /// Author attribution comes in server-derived; the write model carries
    /// no client-controlled author fields.
    async fn create_post(&self, new: NewPost, author: PostAuthor) -> RepoResult<Post>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    /// Hard delete, cascading comments, reply links and likes.
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
    async fn record_view(&self, id: Id) -> RepoResult<()>;
    async fn post_stats(&self, id: Id) -> RepoResult<PostStats>;
    /// Idempotent-per-actor like toggle; returns the resulting liked state.
    /// Uniqueness of `(post, actor)` is the store's responsibility, not a
    /// check-then-act in the caller.
    async fn toggle_like(&self, post_id: Id, actor_id: Id) -> RepoResult<bool>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn create_comment(&self, post_id: Id, author_id: Id, body: String)
        -> RepoResult<Comment>;
    /// The reply is always scoped to the parent's post; callers cannot point
    /// it elsewhere.
    async fn create_reply(&self, parent_id: Id, author_id: Id, body: String)
        -> RepoResult<Comment>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    /// All comments of a post (top-level and reply rows), creation order.
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>>;
    async fn reply_links_for_post(&self, post_id: Id) -> RepoResult<Vec<ReplyLink>>;
    /// Deletes the comment, its links on both sides, and recursively any
    /// replies hanging beneath it.
    async fn delete_comment(&self, id: Id) -> RepoResult<()>;
}

pub trait Repo: CategoryRepo + PostRepo + CommentRepo {}

impl<T> Repo for T where T: CategoryRepo + PostRepo + CommentRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use crate::visibility;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::{HashMap, HashSet};
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        categories: HashMap<Id, Category>,
        posts: HashMap<Id, Post>,
        comments: HashMap<Id, Comment>,
        reply_links: HashMap<Id, ReplyLink>,
        likes: HashMap<Id, Like>,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("NEWSDESK_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("state.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!(
                            "failed to parse snapshot '{}': {e}; starting empty",
                            path.display()
                        );
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    log::warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl CategoryRepo for InMemRepo {
        async fn list_categories(&self) -> RepoResult<Vec<Category>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.categories.values().cloned().collect();
            v.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(v)
        }

        async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
            let mut s = self.state.write().unwrap();
            let category = Category {
                id: Uuid::new_v4(),
                name: new.name,
                description: new.description,
                color: new.color,
            };
            s.categories.insert(category.id, category.clone());
            drop(s);
            self.persist();
            Ok(category)
        }

        async fn get_category(&self, id: Id) -> RepoResult<Category> {
            let s = self.state.read().unwrap();
            s.categories.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn update_category(&self, id: Id, upd: UpdateCategory) -> RepoResult<Category> {
            let mut s = self.state.write().unwrap();
            let category = s.categories.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(name) = upd.name {
                category.name = name;
            }
            if let Some(description) = upd.description {
                category.description = Some(description);
            }
            if let Some(color) = upd.color {
                category.color = color;
            }
            let updated = category.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_category(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.categories.remove(&id).ok_or(RepoError::NotFound)?;
            // weak back reference: null it, never cascade
            for post in s.posts.values_mut() {
                if post.category_id == Some(id) {
                    post.category_id = None;
                }
            }
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn list_posts(
            &self,
            filter: &PostFilter,
            viewer: Option<&Actor>,
        ) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .posts
                .values()
                .filter(|p| visibility::matches_filter(p, filter))
                .filter(|p| visibility::visible_to(p, viewer))
                .cloned()
                .collect();
            visibility::sort_newest_first(&mut v);
            Ok(v)
        }

        async fn create_post(&self, new: NewPost, author: PostAuthor) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            if let Some(category) = new.category_id {
                if !s.categories.contains_key(&category) {
                    return Err(RepoError::NotFound);
                }
            }
            let now = Utc::now();
            let post = Post {
                id: Uuid::new_v4(),
                title: new.title,
                body: new.body,
                author_id: author.id,
                author_institution_id: author.institution_id,
                category_id: new.category_id,
                published_at: now,
                updated_at: now,
                status: new.status.unwrap_or(PostStatus::Draft),
                image: new.image,
                view_count: 0,
                author_type: author.author_type,
            };
            s.posts.insert(post.id, post.clone());
            drop(s);
            self.persist();
            Ok(post)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let s = self.state.read().unwrap();
            s.posts.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            if let Some(category) = upd.category_id {
                if !s.categories.contains_key(&category) {
                    return Err(RepoError::NotFound);
                }
            }
            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(title) = upd.title {
                post.title = title;
            }
            if let Some(body) = upd.body {
                post.body = body;
            }
            if let Some(category) = upd.category_id {
                post.category_id = Some(category);
            }
            if let Some(status) = upd.status {
                post.status = status;
            }
            if let Some(image) = upd.image {
                post.image = Some(image);
            }
            post.updated_at = Utc::now();
            let updated = post.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.posts.remove(&id).ok_or(RepoError::NotFound)?;
            let dead: HashSet<Id> = s
                .comments
                .values()
                .filter(|c| c.post_id == id)
                .map(|c| c.id)
                .collect();
            s.comments.retain(|cid, _| !dead.contains(cid));
            s.reply_links
                .retain(|_, l| !dead.contains(&l.parent_id) && !dead.contains(&l.child_id));
            s.likes.retain(|_, l| l.post_id != id);
            drop(s);
            self.persist();
            Ok(())
        }

        async fn record_view(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            post.view_count += 1;
            drop(s);
            self.persist();
            Ok(())
        }

        async fn post_stats(&self, id: Id) -> RepoResult<PostStats> {
            let s = self.state.read().unwrap();
            if !s.posts.contains_key(&id) {
                return Err(RepoError::NotFound);
            }
            Ok(PostStats {
                comments: s.comments.values().filter(|c| c.post_id == id).count() as i64,
                likes: s.likes.values().filter(|l| l.post_id == id).count() as i64,
            })
        }

        async fn toggle_like(&self, post_id: Id, actor_id: Id) -> RepoResult<bool> {
            // whole toggle under one write lock, so a concurrent duplicate
            // cannot slip between check and insert
            let mut s = self.state.write().unwrap();
            if !s.posts.contains_key(&post_id) {
                return Err(RepoError::NotFound);
            }
            let existing = s
                .likes
                .values()
                .find(|l| l.post_id == post_id && l.actor_id == actor_id)
                .map(|l| l.id);
            let liked = match existing {
                Some(like_id) => {
                    s.likes.remove(&like_id);
                    false
                }
                None => {
                    let like = Like {
                        id: Uuid::new_v4(),
                        post_id,
                        actor_id,
                        liked_at: Utc::now(),
                    };
                    s.likes.insert(like.id, like);
                    true
                }
            };
            drop(s);
            self.persist();
            Ok(liked)
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn create_comment(
            &self,
            post_id: Id,
            author_id: Id,
            body: String,
        ) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            if !s.posts.contains_key(&post_id) {
                return Err(RepoError::NotFound);
            }
            let comment = Comment {
                id: Uuid::new_v4(),
                post_id,
                author_id,
                body,
                created_at: Utc::now(),
            };
            s.comments.insert(comment.id, comment.clone());
            drop(s);
            self.persist();
            Ok(comment)
        }

        async fn create_reply(
            &self,
            parent_id: Id,
            author_id: Id,
            body: String,
        ) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            let parent_post = s
                .comments
                .get(&parent_id)
                .map(|c| c.post_id)
                .ok_or(RepoError::NotFound)?;
            let reply = Comment {
                id: Uuid::new_v4(),
                post_id: parent_post,
                author_id,
                body,
                created_at: Utc::now(),
            };
            let link = ReplyLink {
                id: Uuid::new_v4(),
                parent_id,
                child_id: reply.id,
            };
            s.comments.insert(reply.id, reply.clone());
            s.reply_links.insert(link.id, link);
            drop(s);
            self.persist();
            Ok(reply)
        }

        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            let s = self.state.read().unwrap();
            s.comments.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .comments
                .values()
                .filter(|c| c.post_id == post_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(v)
        }

        async fn reply_links_for_post(&self, post_id: Id) -> RepoResult<Vec<ReplyLink>> {
            let s = self.state.read().unwrap();
            Ok(s.reply_links
                .values()
                .filter(|l| {
                    s.comments
                        .get(&l.parent_id)
                        .map(|c| c.post_id == post_id)
                        .unwrap_or(false)
                })
                .cloned()
                .collect())
        }

        async fn delete_comment(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if !s.comments.contains_key(&id) {
                return Err(RepoError::NotFound);
            }
            // collect the reply subtree; links form a forest so this converges
            let mut dead: HashSet<Id> = HashSet::from([id]);
            loop {
                let next: Vec<Id> = s
                    .reply_links
                    .values()
                    .filter(|l| dead.contains(&l.parent_id) && !dead.contains(&l.child_id))
                    .map(|l| l.child_id)
                    .collect();
                if next.is_empty() {
                    break;
                }
                dead.extend(next);
            }
            s.comments.retain(|cid, _| !dead.contains(cid));
            s.reply_links
                .retain(|_, l| !dead.contains(&l.parent_id) && !dead.contains(&l.child_id));
            drop(s);
            self.persist();
            Ok(())
        }
    }
}

#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use crate::auth::Role;
    use sqlx::{Pool, Postgres, QueryBuilder};

    const POST_COLUMNS: &str = "id, title, body, author_id, author_institution_id, category_id, \
                                published_at, updated_at, status, image, view_count, author_type";

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }

        async fn post_exists(&self, id: Id) -> RepoResult<()> {
            sqlx::query_scalar::<_, i32>("SELECT 1 FROM posts WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .map(|_| ())
                .ok_or(RepoError::NotFound)
        }
    }

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    #[async_trait]
    impl CategoryRepo for PgRepo {
        async fn list_categories(&self) -> RepoResult<Vec<Category>> {
            sqlx::query_as::<_, Category>(
                "SELECT id, name, description, color FROM categories ORDER BY name",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
            sqlx::query_as::<_, Category>(
                "INSERT INTO categories (id, name, description, color) VALUES ($1,$2,$3,$4) \
                 RETURNING id, name, description, color",
            )
            .bind(Uuid::new_v4())
            .bind(&new.name)
            .bind(&new.description)
            .bind(&new.color)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn get_category(&self, id: Id) -> RepoResult<Category> {
            sqlx::query_as::<_, Category>(
                "SELECT id, name, description, color FROM categories WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)
        }

        async fn update_category(&self, id: Id, upd: UpdateCategory) -> RepoResult<Category> {
            sqlx::query_as::<_, Category>(
                "UPDATE categories SET name = COALESCE($2, name), \
                 description = COALESCE($3, description), color = COALESCE($4, color) \
                 WHERE id = $1 RETURNING id, name, description, color",
            )
            .bind(id)
            .bind(upd.name)
            .bind(upd.description)
            .bind(upd.color)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)
        }

        async fn delete_category(&self, id: Id) -> RepoResult<()> {
            // posts.category_id is ON DELETE SET NULL in the schema
            let done = sqlx::query("DELETE FROM categories WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
            if done.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn list_posts(
            &self,
            filter: &PostFilter,
            viewer: Option<&Actor>,
        ) -> RepoResult<Vec<Post>> {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("SELECT {POST_COLUMNS} FROM posts WHERE TRUE"));
            if let Some(category) = filter.category {
                qb.push(" AND category_id = ");
                qb.push_bind(category);
            }
            if let Some(institution) = filter.institution_id {
                qb.push(" AND author_institution_id = ");
                qb.push_bind(institution);
            }
            if let Some(q) = filter.q.as_deref() {
                let pattern = format!("%{q}%");
                qb.push(" AND (title ILIKE ");
                qb.push_bind(pattern.clone());
                qb.push(" OR body ILIKE ");
                qb.push_bind(pattern);
                qb.push(")");
            }
            if let Some(status) = filter.status {
                qb.push(" AND status = ");
                qb.push_bind(status);
            }
            // same clause visibility::visible_to applies in memory
            match viewer {
                Some(actor) if actor.role == Role::Admin => {}
                Some(actor) if actor.role == Role::Institution => {
                    qb.push(" AND (author_id = ");
                    qb.push_bind(actor.id);
                    qb.push(" OR status = 'published')");
                }
                _ => {
                    qb.push(" AND status = 'published'");
                }
            }
            qb.push(" ORDER BY published_at DESC");
            qb.build_query_as::<Post>()
                .fetch_all(&self.pool)
                .await
                .map_err(internal)
        }

        async fn create_post(&self, new: NewPost, author: PostAuthor) -> RepoResult<Post> {
            if let Some(category) = new.category_id {
                sqlx::query_scalar::<_, i32>("SELECT 1 FROM categories WHERE id = $1")
                    .bind(category)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(internal)?
                    .ok_or(RepoError::NotFound)?;
            }
            sqlx::query_as::<_, Post>(&format!(
                "INSERT INTO posts (id, title, body, author_id, author_institution_id, \
                 category_id, status, image, author_type) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9) RETURNING {POST_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(&new.title)
            .bind(&new.body)
            .bind(author.id)
            .bind(author.institution_id)
            .bind(new.category_id)
            .bind(new.status.unwrap_or(PostStatus::Draft))
            .bind(&new.image)
            .bind(author.author_type)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            if let Some(category) = upd.category_id {
                sqlx::query_scalar::<_, i32>("SELECT 1 FROM categories WHERE id = $1")
                    .bind(category)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(internal)?
                    .ok_or(RepoError::NotFound)?;
            }
            sqlx::query_as::<_, Post>(&format!(
                "UPDATE posts SET title = COALESCE($2, title), body = COALESCE($3, body), \
                 category_id = COALESCE($4, category_id), status = COALESCE($5, status), \
                 image = COALESCE($6, image), updated_at = now() \
                 WHERE id = $1 RETURNING {POST_COLUMNS}"
            ))
            .bind(id)
            .bind(upd.title)
            .bind(upd.body)
            .bind(upd.category_id)
            .bind(upd.status)
            .bind(upd.image)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            // comments, reply links and likes cascade via foreign keys
            let done = sqlx::query("DELETE FROM posts WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
            if done.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn record_view(&self, id: Id) -> RepoResult<()> {
            let done = sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
            if done.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn post_stats(&self, id: Id) -> RepoResult<PostStats> {
            self.post_exists(id).await?;
            let comments =
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments WHERE post_id = $1")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(internal)?;
            let likes =
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM likes WHERE post_id = $1")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(internal)?;
            Ok(PostStats { comments, likes })
        }

        async fn toggle_like(&self, post_id: Id, actor_id: Id) -> RepoResult<bool> {
            self.post_exists(post_id).await?;
            let deleted = sqlx::query("DELETE FROM likes WHERE post_id = $1 AND actor_id = $2")
                .bind(post_id)
                .bind(actor_id)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
            if deleted.rows_affected() > 0 {
                return Ok(false);
            }
            // a concurrent duplicate lands on the unique constraint and is
            // absorbed by DO NOTHING; either way the pair ends up liked
            sqlx::query(
                "INSERT INTO likes (id, post_id, actor_id) VALUES ($1,$2,$3) \
                 ON CONFLICT (post_id, actor_id) DO NOTHING",
            )
            .bind(Uuid::new_v4())
            .bind(post_id)
            .bind(actor_id)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
            Ok(true)
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn create_comment(
            &self,
            post_id: Id,
            author_id: Id,
            body: String,
        ) -> RepoResult<Comment> {
            self.post_exists(post_id).await?;
            sqlx::query_as::<_, Comment>(
                "INSERT INTO comments (id, post_id, author_id, body) VALUES ($1,$2,$3,$4) \
                 RETURNING id, post_id, author_id, body, created_at",
            )
            .bind(Uuid::new_v4())
            .bind(post_id)
            .bind(author_id)
            .bind(body)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn create_reply(
            &self,
            parent_id: Id,
            author_id: Id,
            body: String,
        ) -> RepoResult<Comment> {
            let mut tx = self.pool.begin().await.map_err(internal)?;
            let parent_post = sqlx::query_scalar::<_, Id>(
                "SELECT post_id FROM comments WHERE id = $1",
            )
            .bind(parent_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)?;
            let reply = sqlx::query_as::<_, Comment>(
                "INSERT INTO comments (id, post_id, author_id, body) VALUES ($1,$2,$3,$4) \
                 RETURNING id, post_id, author_id, body, created_at",
            )
            .bind(Uuid::new_v4())
            .bind(parent_post)
            .bind(author_id)
            .bind(body)
            .fetch_one(&mut *tx)
            .await
            .map_err(internal)?;
            sqlx::query("INSERT INTO reply_links (id, parent_id, child_id) VALUES ($1,$2,$3)")
                .bind(Uuid::new_v4())
                .bind(parent_id)
                .bind(reply.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| match &e {
                    sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict,
                    _ => internal(e),
                })?;
            tx.commit().await.map_err(internal)?;
            Ok(reply)
        }

        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            sqlx::query_as::<_, Comment>(
                "SELECT id, post_id, author_id, body, created_at FROM comments WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)
        }

        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            sqlx::query_as::<_, Comment>(
                "SELECT id, post_id, author_id, body, created_at FROM comments \
                 WHERE post_id = $1 ORDER BY created_at ASC",
            )
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn reply_links_for_post(&self, post_id: Id) -> RepoResult<Vec<ReplyLink>> {
            sqlx::query_as::<_, ReplyLink>(
                "SELECT rl.id, rl.parent_id, rl.child_id FROM reply_links rl \
                 JOIN comments c ON c.id = rl.parent_id WHERE c.post_id = $1",
            )
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn delete_comment(&self, id: Id) -> RepoResult<()> {
            // the reply subtree goes with it; links cascade via foreign keys
            let done = sqlx::query(
                "WITH RECURSIVE subtree AS ( \
                     SELECT $1::uuid AS id \
                     UNION \
                     SELECT rl.child_id FROM reply_links rl \
                     JOIN subtree s ON rl.parent_id = s.id \
                 ) DELETE FROM comments WHERE id IN (SELECT id FROM subtree)",
            )
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
            if done.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }
}

//! Role-conditioned query restriction on posts.
//!
//! These predicates are the single gate on draft/archived visibility: the
//! in-memory store applies them directly, the Postgres store mirrors them in
//! SQL, and the single-post handler consults `visible_to` before serializing
//! anything.

use crate::auth::{Actor, Role};
use crate::models::{Post, PostFilter, PostStatus};

/// AND of every provided filter constraint. Free text is a case-insensitive
/// substring match over title OR body.
pub fn matches_filter(post: &Post, filter: &PostFilter) -> bool {
    if let Some(category) = filter.category {
        if post.category_id != Some(category) {
            return false;
        }
    }
    if let Some(institution) = filter.institution_id {
        if post.author_institution_id != Some(institution) {
            return false;
        }
    }
    if let Some(q) = filter.q.as_deref() {
        let needle = q.to_lowercase();
        if !post.title.to_lowercase().contains(&needle)
            && !post.body.to_lowercase().contains(&needle)
        {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if post.status != status {
            return false;
        }
    }
    true
}

/// Admins see everything; institutions see their own posts in any status
/// plus everyone's published posts; anonymous callers and every other role
/// see published posts only.
pub fn visible_to(post: &Post, viewer: Option<&Actor>) -> bool {
    match viewer {
        Some(actor) if actor.role == Role::Admin => true,
        Some(actor) if actor.role == Role::Institution => {
            actor.id == post.author_id || post.status == PostStatus::Published
        }
        _ => post.status == PostStatus::Published,
    }
}

/// Default listing order: newest `published_at` first.
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}

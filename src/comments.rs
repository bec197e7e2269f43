//! Comment thread assembly and serialization.
//!
//! Retrieval returns every comment of a post (top-level and reply rows
//! alike), each annotated with its direct replies, recursively. The link
//! table is keyed one-to-one on the child side and replies are always
//! created fresh, so the parent relation is a forest and recursion always
//! terminates.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::models::{Comment, Id};
use crate::names::{fallback_name, NameResolver};
use crate::repo::{Repo, RepoError, RepoResult};

/// A comment plus its resolved author name and nested replies, ordered by
/// reply creation time ascending.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommentNode {
    pub id: Id,
    pub post_id: Id,
    pub author_id: Id,
    pub author_name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub replies: Vec<CommentNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadOrder {
    NewestFirst,
    OldestFirst,
}

/// Serialize the full thread of a post. Read-only and idempotent: two calls
/// without intervening writes produce identical structures.
pub async fn thread_for_post(
    repo: &dyn Repo,
    names: &dyn NameResolver,
    post_id: Id,
    order: ThreadOrder,
) -> RepoResult<Vec<CommentNode>> {
    let comments = repo.list_comments(post_id).await?;
    let links = repo.reply_links_for_post(post_id).await?;
    let name_map = resolve_names(names, &comments).await;

    let by_id: HashMap<Id, &Comment> = comments.iter().map(|c| (c.id, c)).collect();
    let mut children: HashMap<Id, Vec<Id>> = HashMap::new();
    for link in &links {
        children.entry(link.parent_id).or_default().push(link.child_id);
    }
    for kids in children.values_mut() {
        kids.sort_by_key(|id| by_id.get(id).map(|c| c.created_at));
    }

    let mut nodes: Vec<CommentNode> = comments
        .iter()
        .map(|c| build_node(c, &by_id, &children, &name_map))
        .collect();
    if order == ThreadOrder::NewestFirst {
        nodes.reverse(); // list_comments is ascending
    }
    Ok(nodes)
}

/// Serialize one comment with its reply subtree.
pub async fn node_for_comment(
    repo: &dyn Repo,
    names: &dyn NameResolver,
    id: Id,
) -> RepoResult<CommentNode> {
    let comment = repo.get_comment(id).await?;
    let nodes = thread_for_post(repo, names, comment.post_id, ThreadOrder::OldestFirst).await?;
    nodes
        .into_iter()
        .find(|n| n.id == id)
        .ok_or(RepoError::NotFound)
}

fn build_node(
    comment: &Comment,
    by_id: &HashMap<Id, &Comment>,
    children: &HashMap<Id, Vec<Id>>,
    names: &HashMap<Id, String>,
) -> CommentNode {
    let replies = children
        .get(&comment.id)
        .map(|kids| {
            kids.iter()
                .filter_map(|id| by_id.get(id))
                .map(|child| build_node(child, by_id, children, names))
                .collect()
        })
        .unwrap_or_default();
    CommentNode {
        id: comment.id,
        post_id: comment.post_id,
        author_id: comment.author_id,
        author_name: names
            .get(&comment.author_id)
            .cloned()
            .unwrap_or_else(|| fallback_name(&comment.author_id)),
        body: comment.body.clone(),
        created_at: comment.created_at,
        replies,
    }
}

/// Best-effort display-name resolution, one lookup per distinct author.
/// Failures degrade to the partial-id placeholder and never propagate.
async fn resolve_names(names: &dyn NameResolver, comments: &[Comment]) -> HashMap<Id, String> {
    let mut out: HashMap<Id, String> = HashMap::new();
    for comment in comments {
        if out.contains_key(&comment.author_id) {
            continue;
        }
        let display = names
            .display_name(comment.author_id)
            .await
            .unwrap_or_else(|| fallback_name(&comment.author_id));
        out.insert(comment.author_id, display);
    }
    out
}

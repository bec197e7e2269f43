//! Stateless authorization predicates over (actor, action, target).
//!
//! Role normalisation happens once at the token boundary (`Role::parse`);
//! these functions only look at the closed enum, so an absent or unknown
//! role has already collapsed to `Role::Other` and denies everything
//! privileged.

use crate::auth::{Actor, Role};
use crate::models::{Comment, Post};

/// Anyone may list posts; what they actually see is the visibility
/// filter's concern, not a permission.
pub fn can_view_posts() -> bool {
    true
}

/// Only admins and institutions publish.
pub fn can_create_post(actor: &Actor) -> bool {
    matches!(actor.role, Role::Admin | Role::Institution)
}

/// Edit/delete a post: admin, or its author.
pub fn can_mutate_post(actor: &Actor, post: &Post) -> bool {
    actor.role == Role::Admin || actor.id == post.author_id
}

/// Write-side commenting check; reads are public.
pub fn can_comment(actor: &Actor) -> bool {
    matches!(
        actor.role,
        Role::Admin | Role::Institution | Role::Advisor | Role::Student
    )
}

/// Edit/delete a comment: admin, or its author.
pub fn can_mutate_comment(actor: &Actor, comment: &Comment) -> bool {
    actor.role == Role::Admin || actor.id == comment.author_id
}

pub fn is_admin(actor: &Actor) -> bool {
    actor.role == Role::Admin
}

use utoipa::OpenApi;

use crate::comments::CommentNode;
use crate::models::{
    AuthorType, Category, NewCategory, NewPost, PostStatus, UpdateCategory, UpdatePost,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_categories,
        crate::routes::create_category,
        crate::routes::list_posts,
        crate::routes::create_post,
        crate::routes::get_post,
        crate::routes::update_post,
        crate::routes::delete_post,
        crate::routes::like_toggle,
        crate::routes::post_comments,
        crate::routes::create_comment,
        crate::routes::get_comment,
        crate::routes::delete_comment,
        crate::routes::reply_comment,
        crate::routes::comments_by_post,
        crate::routes::upload_media,
        crate::routes::auth_me,
    ),
    components(schemas(
        Category, NewCategory, UpdateCategory,
        NewPost, UpdatePost, PostStatus, AuthorType,
        CommentNode,
        crate::routes::PostView,
        crate::routes::LikeToggleResponse,
        crate::routes::NewCommentRequest,
        crate::routes::ReplyRequest,
        crate::routes::MediaUploadResponse,
    )),
    tags(
        (name = "categories", description = "Category administration"),
        (name = "posts", description = "Post operations"),
        (name = "comments", description = "Comment and reply operations"),
    )
)]
pub struct ApiDoc;

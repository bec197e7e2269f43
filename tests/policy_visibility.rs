use chrono::{Duration, Utc};
use uuid::Uuid;

use newsdesk::auth::{Actor, Role};
use newsdesk::models::{AuthorType, Comment, Post, PostFilter, PostStatus};
use newsdesk::{policy, visibility};

fn actor(role: Role) -> Actor {
    Actor {
        id: Uuid::new_v4(),
        role,
        institution_id: None,
        email: None,
        name: None,
    }
}

fn post(author_id: Uuid, status: PostStatus) -> Post {
    Post {
        id: Uuid::new_v4(),
        title: "Campus update".into(),
        body: "Enrollment opens Monday".into(),
        author_id,
        author_institution_id: None,
        category_id: None,
        published_at: Utc::now(),
        updated_at: Utc::now(),
        status,
        image: None,
        view_count: 0,
        author_type: AuthorType::Institution,
    }
}

#[test]
fn only_admins_and_institutions_publish() {
    assert!(policy::can_create_post(&actor(Role::Admin)));
    assert!(policy::can_create_post(&actor(Role::Institution)));
    assert!(!policy::can_create_post(&actor(Role::Advisor)));
    assert!(!policy::can_create_post(&actor(Role::Student)));
    assert!(!policy::can_create_post(&actor(Role::Other)));
}

#[test]
fn commenting_roles() {
    for role in [Role::Admin, Role::Institution, Role::Advisor, Role::Student] {
        assert!(policy::can_comment(&actor(role)), "{role:?} should comment");
    }
    assert!(!policy::can_comment(&actor(Role::Other)));
}

#[test]
fn post_mutation_is_author_or_admin() {
    let author = actor(Role::Institution);
    let target = post(author.id, PostStatus::Draft);

    assert!(policy::can_mutate_post(&author, &target));
    assert!(policy::can_mutate_post(&actor(Role::Admin), &target));
    assert!(!policy::can_mutate_post(&actor(Role::Institution), &target));
    assert!(!policy::can_mutate_post(&actor(Role::Student), &target));
}

#[test]
fn comment_mutation_is_author_or_admin() {
    let author = actor(Role::Student);
    let comment = Comment {
        id: Uuid::new_v4(),
        post_id: Uuid::new_v4(),
        author_id: author.id,
        body: "hello".into(),
        created_at: Utc::now(),
    };

    assert!(policy::can_mutate_comment(&author, &comment));
    assert!(policy::can_mutate_comment(&actor(Role::Admin), &comment));
    assert!(!policy::can_mutate_comment(&actor(Role::Student), &comment));
}

#[test]
fn visibility_matrix() {
    let institution = actor(Role::Institution);
    let own_draft = post(institution.id, PostStatus::Draft);
    let foreign_draft = post(Uuid::new_v4(), PostStatus::Draft);
    let foreign_archived = post(Uuid::new_v4(), PostStatus::Archived);
    let published = post(Uuid::new_v4(), PostStatus::Published);

    // anonymous: published only
    assert!(visibility::visible_to(&published, None));
    assert!(!visibility::visible_to(&own_draft, None));
    assert!(!visibility::visible_to(&foreign_archived, None));

    // students behave like anonymous
    let student = actor(Role::Student);
    assert!(visibility::visible_to(&published, Some(&student)));
    assert!(!visibility::visible_to(&foreign_draft, Some(&student)));

    // institutions see their own drafts but not other people's
    assert!(visibility::visible_to(&own_draft, Some(&institution)));
    assert!(!visibility::visible_to(&foreign_draft, Some(&institution)));
    assert!(visibility::visible_to(&published, Some(&institution)));

    // admins see everything
    let admin = actor(Role::Admin);
    assert!(visibility::visible_to(&own_draft, Some(&admin)));
    assert!(visibility::visible_to(&foreign_draft, Some(&admin)));
    assert!(visibility::visible_to(&foreign_archived, Some(&admin)));
}

#[test]
fn filter_text_search_is_case_insensitive_over_title_and_body() {
    let p = post(Uuid::new_v4(), PostStatus::Published);

    let title_hit = PostFilter {
        q: Some("CAMPUS".into()),
        ..Default::default()
    };
    assert!(visibility::matches_filter(&p, &title_hit));

    let body_hit = PostFilter {
        q: Some("enrollment".into()),
        ..Default::default()
    };
    assert!(visibility::matches_filter(&p, &body_hit));

    let miss = PostFilter {
        q: Some("cafeteria".into()),
        ..Default::default()
    };
    assert!(!visibility::matches_filter(&p, &miss));
}

#[test]
fn filter_constraints_are_anded() {
    let mut p = post(Uuid::new_v4(), PostStatus::Published);
    let category = Uuid::new_v4();
    let institution = Uuid::new_v4();
    p.category_id = Some(category);
    p.author_institution_id = Some(institution);

    let all_match = PostFilter {
        category: Some(category),
        institution_id: Some(institution),
        q: Some("campus".into()),
        status: Some(PostStatus::Published),
    };
    assert!(visibility::matches_filter(&p, &all_match));

    // one failing constraint sinks the whole match
    let wrong_status = PostFilter {
        status: Some(PostStatus::Draft),
        ..all_match.clone()
    };
    assert!(!visibility::matches_filter(&p, &wrong_status));

    let wrong_category = PostFilter {
        category: Some(Uuid::new_v4()),
        ..all_match
    };
    assert!(!visibility::matches_filter(&p, &wrong_category));
}

#[test]
fn listing_sorts_newest_first() {
    let mut old = post(Uuid::new_v4(), PostStatus::Published);
    old.published_at = Utc::now() - Duration::hours(2);
    let mut mid = post(Uuid::new_v4(), PostStatus::Published);
    mid.published_at = Utc::now() - Duration::hours(1);
    let new = post(Uuid::new_v4(), PostStatus::Published);

    let mut posts = vec![old.clone(), new.clone(), mid.clone()];
    visibility::sort_newest_first(&mut posts);

    assert_eq!(posts[0].id, new.id);
    assert_eq!(posts[1].id, mid.id);
    assert_eq!(posts[2].id, old.id);
}

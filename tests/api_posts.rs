#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use newsdesk::auth::issue_token;
use newsdesk::media::FsMediaStore;
use newsdesk::names::NoNameResolver;
use newsdesk::repo::inmem::InMemRepo;
use newsdesk::{route_config, AppConfig, AppState};

fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: "api-test-secret-0123456789abcdef0123".into(),
        jwt_algorithm: jsonwebtoken::Algorithm::HS256,
        auth_service_url: None,
        media_root: std::env::temp_dir(),
        public_base_url: "http://localhost:8080".into(),
        frontend_url: None,
        bind_addr: "127.0.0.1:0".into(),
    }
}

fn bearer(cfg: &AppConfig, claims: serde_json::Value) -> (String, String) {
    let token = issue_token(cfg, &claims).unwrap();
    ("Authorization".to_string(), format!("Bearer {token}"))
}

fn token_for(cfg: &AppConfig, id: Uuid, role: &str) -> (String, String) {
    bearer(
        cfg,
        json!({
            "id": id.to_string(),
            "rol": role,
            "exp": Utc::now().timestamp() + 3600,
        }),
    )
}

macro_rules! spawn_app {
    ($cfg:expr) => {{
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var("NEWSDESK_DATA_DIR", tmp.path());
        let media_root = tmp.path().join("media");
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new($cfg.clone()))
                .app_data(web::Data::new(AppState {
                    repo: Arc::new(InMemRepo::new()),
                    media: Arc::new(FsMediaStore::new(media_root)),
                    names: Arc::new(NoNameResolver),
                }))
                .configure(route_config),
        )
        .await;
        (app, tmp)
    }};
}

#[actix_web::test]
#[serial_test::serial]
async fn author_attribution_is_server_derived() {
    let cfg = test_config();
    let (app, _tmp) = spawn_app!(cfg);

    let actor = Uuid::new_v4();
    let institution = Uuid::new_v4();
    let auth = bearer(
        &cfg,
        json!({
            "id": actor.to_string(),
            "rol": "institucion",
            "institucion_id": institution.to_string(),
            "exp": Utc::now().timestamp() + 3600,
        }),
    );

    // client-sent attribution fields are ignored, not honoured
    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(auth)
        .set_json(json!({
            "title": "Open day",
            "body": "Doors open at nine",
            "author_id": Uuid::new_v4().to_string(),
            "author_type": "individual",
        }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["author_id"], json!(actor.to_string()));
    assert_eq!(body["author_institution_id"], json!(institution.to_string()));
    assert_eq!(body["author_type"], json!("institution"));
    assert_eq!(body["status"], json!("draft"));
    assert_eq!(body["view_count"], json!(0));
    assert_eq!(body["comments_count"], json!(0));
    assert_eq!(body["likes_count"], json!(0));
}

#[actix_web::test]
#[serial_test::serial]
async fn students_cannot_publish_posts() {
    let cfg = test_config();
    let (app, _tmp) = spawn_app!(cfg);

    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(token_for(&cfg, Uuid::new_v4(), "estudiante"))
        .set_json(json!({ "title": "t", "body": "b" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
#[serial_test::serial]
async fn empty_title_is_rejected() {
    let cfg = test_config();
    let (app, _tmp) = spawn_app!(cfg);

    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(token_for(&cfg, Uuid::new_v4(), "admin"))
        .set_json(json!({ "title": "   ", "body": "b" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], json!("title must not be empty"));
}

#[actix_web::test]
#[serial_test::serial]
async fn anonymous_listing_hides_drafts() {
    let cfg = test_config();
    let (app, _tmp) = spawn_app!(cfg);
    let author = Uuid::new_v4();
    let auth = token_for(&cfg, author, "institucion");

    for (title, status) in [("visible", "published"), ("secret", "draft")] {
        let req = test::TestRequest::post()
            .uri("/api/v1/posts")
            .insert_header(auth.clone())
            .set_json(json!({ "title": title, "body": "b", "status": status }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);
    }

    let req = test::TestRequest::get().uri("/api/v1/posts").to_request();
    let listing: Vec<serde_json::Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0]["title"], json!("visible"));

    // the author sees both of their posts
    let req = test::TestRequest::get()
        .uri("/api/v1/posts")
        .insert_header(auth)
        .to_request();
    let listing: Vec<serde_json::Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listing.len(), 2);

    // free-text filter narrows the anonymous listing too
    let req = test::TestRequest::get()
        .uri("/api/v1/posts?q=VISIBLE")
        .to_request();
    let listing: Vec<serde_json::Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listing.len(), 1);
    let req = test::TestRequest::get()
        .uri("/api/v1/posts?q=secret")
        .to_request();
    let listing: Vec<serde_json::Value> = test::call_and_read_body_json(&app, req).await;
    assert!(listing.is_empty());
}

#[actix_web::test]
#[serial_test::serial]
async fn hidden_posts_read_as_not_found() {
    let cfg = test_config();
    let (app, _tmp) = spawn_app!(cfg);
    let auth = token_for(&cfg, Uuid::new_v4(), "institucion");

    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(auth.clone())
        .set_json(json!({ "title": "draft", "body": "b" }))
        .to_request();
    let created: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_str().unwrap().to_string();

    // anonymous caller gets a 404 rather than a 403 hint
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/posts/{id}"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    // the author reads it fine, and repeated reads bump the view count
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/posts/{id}"))
        .insert_header(auth.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/posts/{id}"))
        .insert_header(auth)
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["view_count"], json!(1));
}

#[actix_web::test]
#[serial_test::serial]
async fn like_toggle_roundtrip() {
    let cfg = test_config();
    let (app, _tmp) = spawn_app!(cfg);
    let publisher = token_for(&cfg, Uuid::new_v4(), "institucion");

    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(publisher)
        .set_json(json!({ "title": "likeable", "body": "b", "status": "published" }))
        .to_request();
    let created: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_str().unwrap().to_string();

    let student = token_for(&cfg, Uuid::new_v4(), "estudiante");
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/posts/{id}/like"))
        .insert_header(student.clone())
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["liked"], json!(true));

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/posts/{id}/like"))
        .insert_header(student.clone())
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["liked"], json!(false));

    // anonymous likes are a 401
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/posts/{id}/like"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
#[serial_test::serial]
async fn post_mutation_is_author_or_admin_only() {
    let cfg = test_config();
    let (app, _tmp) = spawn_app!(cfg);
    let author = token_for(&cfg, Uuid::new_v4(), "institucion");
    let stranger = token_for(&cfg, Uuid::new_v4(), "institucion");
    let admin = token_for(&cfg, Uuid::new_v4(), "admin");

    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(author.clone())
        .set_json(json!({ "title": "mine", "body": "b" }))
        .to_request();
    let created: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/posts/{id}"))
        .insert_header(stranger.clone())
        .set_json(json!({ "status": "published" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/posts/{id}"))
        .insert_header(author)
        .set_json(json!({ "status": "published" }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], json!("published"));

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/posts/{id}"))
        .insert_header(stranger)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    // admins may always delete; the named action route behaves the same
    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/posts/{id}/remove"))
        .insert_header(admin)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/posts/{id}"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
#[serial_test::serial]
async fn categories_are_admin_only() {
    let cfg = test_config();
    let (app, _tmp) = spawn_app!(cfg);
    let admin = token_for(&cfg, Uuid::new_v4(), "admin");
    let student = token_for(&cfg, Uuid::new_v4(), "estudiante");

    let req = test::TestRequest::get()
        .uri("/api/v1/categories")
        .insert_header(student)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::post()
        .uri("/api/v1/categories")
        .insert_header(admin.clone())
        .set_json(json!({ "name": "Sports" }))
        .to_request();
    let created: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(created["color"], json!("#000000"));
    let id = created["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/categories/{id}"))
        .insert_header(admin.clone())
        .set_json(json!({ "color": "#1a6b3f" }))
        .to_request();
    let updated: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["color"], json!("#1a6b3f"));
    assert_eq!(updated["name"], json!("Sports"));

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/categories/{id}"))
        .insert_header(admin.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::get()
        .uri("/api/v1/categories")
        .insert_header(admin)
        .to_request();
    let listing: Vec<serde_json::Value> = test::call_and_read_body_json(&app, req).await;
    assert!(listing.is_empty());
}

fn counter_value(rendered: &str, name: &str) -> u64 {
    rendered
        .lines()
        .find(|l| l.starts_with(name))
        .and_then(|l| l.split_whitespace().last())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

#[actix_web::test]
#[serial_test::serial]
async fn view_counter_tracks_persisted_views_only() {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let cfg = test_config();
    let (app, _tmp) = spawn_app!(cfg);
    let handle = PrometheusBuilder::new().install_recorder().unwrap();
    let before = counter_value(&handle.render(), "post_views_total");

    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(token_for(&cfg, Uuid::new_v4(), "institucion"))
        .set_json(json!({ "title": "watched", "body": "b", "status": "published" }))
        .to_request();
    let created: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/posts/{id}"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }
    // a miss never reaches the view recorder
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/posts/{}", Uuid::new_v4()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let after = counter_value(&handle.render(), "post_views_total");
    assert_eq!(after - before, 2);
}

#[actix_web::test]
#[serial_test::serial]
async fn auth_me_reflects_the_token() {
    let cfg = test_config();
    let (app, _tmp) = spawn_app!(cfg);
    let id = Uuid::new_v4();

    let req = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(token_for(&cfg, id, "orientador"))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["id"], json!(id.to_string()));
    assert_eq!(body["role"], json!("advisor"));

    let req = test::TestRequest::get().uri("/api/v1/auth/me").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

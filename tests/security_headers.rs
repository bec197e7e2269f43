use actix_web::{test, web, App, HttpResponse};

use newsdesk::SecurityHeaders;

async fn ping() -> HttpResponse {
    HttpResponse::Ok().body("pong")
}

#[actix_web::test]
async fn baseline_headers_are_always_present() {
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::default())
            .route("/ping", web::get().to(ping)),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
    let headers = resp.headers();

    assert_eq!(
        headers.get("X-Content-Type-Options").unwrap(),
        "nosniff"
    );
    assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
    assert_eq!(headers.get("Referrer-Policy").unwrap(), "no-referrer");
    assert!(headers.contains_key("Content-Security-Policy"));
    // HSTS only behind TLS termination, never by default
    assert!(!headers.contains_key("Strict-Transport-Security"));
}

#[actix_web::test]
async fn hsts_is_opt_in() {
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::default().with_hsts(true))
            .route("/ping", web::get().to(ping)),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
    let hsts = resp.headers().get("Strict-Transport-Security").unwrap();
    assert!(hsts.to_str().unwrap().contains("max-age="));
}

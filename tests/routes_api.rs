#![cfg(feature = "inmem-store")]

mod common;

use std::sync::Arc;

use actix_web::{test, web, App};
use common::{MockBlobStore, RecordingMailer};
use quorum::auth::{create_jwt, Role};
use quorum::notify::{Delivery, Dispatcher, Notifier, Site};
use quorum::repo::inmem::InMemRepo;
use quorum::repo::UserRepo;
use quorum::routes::{config, AppState};
use serde_json::{json, Value};
use serial_test::serial;

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
}

fn bearer(id: i64, name: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", create_jwt(id, name).unwrap()))
}

fn state(repo: &InMemRepo, mailer: Arc<RecordingMailer>) -> AppState {
    let site = Site { name: "Quorum".into(), url: "https://forum.example".into() };
    let dispatcher = Arc::new(Dispatcher::new(mailer, site));
    AppState {
        repo: Arc::new(repo.clone()),
        blob_store: Arc::new(MockBlobStore::default()),
        notifier: Arc::new(Notifier::new(dispatcher, Delivery::Immediate)),
    }
}

// Helper to build a multipart body with text fields and one file part
fn build_multipart(fields: &[(&str, &str)], file_name: &str, bytes: &[u8], boundary: &str) -> Vec<u8> {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[actix_web::test]
#[serial]
async fn like_report_and_moderation_flow() {
    setup_env();
    let repo = InMemRepo::ephemeral();
    let mailer = Arc::new(RecordingMailer::default());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(&repo, mailer.clone())))
            .configure(config),
    )
    .await;

    // profiles: author, liker, moderator-to-be, admin
    for (id, name) in [(1, "author"), (2, "liker"), (3, "mod"), (9, "root")] {
        let req = test::TestRequest::put()
            .uri("/api/v1/me")
            .insert_header(bearer(id, name))
            .set_json(json!({"username": name, "email": format!("{name}@example.com"), "full_name": null}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }
    assert_eq!(mailer.subjects().iter().filter(|s| *s == "Welcome to Quorum!").count(), 4);
    repo.grant_role(9, Role::Admin).await.unwrap();

    // create thread with tags
    let req = test::TestRequest::post()
        .uri("/api/v1/threads")
        .insert_header(bearer(1, "author"))
        .set_json(json!({"title": "Borrowck woes", "content": "Help **please**", "category_id": null, "tags": "rust, help, rust"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let thread: Value = test::read_body_json(resp).await;
    let tid = thread["id"].as_i64().unwrap();

    // anonymous like is rejected
    let req = test::TestRequest::post().uri(&format!("/api/v1/threads/{tid}/like")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    // like, then unlike
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/threads/{tid}/like"))
        .insert_header(bearer(2, "liker"))
        .to_request();
    let like: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(like, json!({"liked": true, "like_count": 1}));
    assert!(mailer.subjects().contains(&"Your thread was liked: Borrowck woes".to_string()));

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/threads/{tid}/like"))
        .insert_header(bearer(2, "liker"))
        .to_request();
    let like: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(like, json!({"liked": false, "like_count": 0}));

    // report twice
    let report_req = || {
        test::TestRequest::post()
            .uri(&format!("/api/v1/threads/{tid}/reports"))
            .insert_header(bearer(2, "liker"))
            .set_json(json!({"reason": "spam", "description": "ads"}))
            .to_request()
    };
    let resp = test::call_service(&app, report_req()).await;
    assert_eq!(resp.status(), 201);
    let report: Value = test::read_body_json(resp).await;
    assert_eq!(report["status"], "pending");
    let rid = report["id"].as_i64().unwrap();
    assert!(mailer.subjects().contains(&"Your thread has been reported: Borrowck woes".to_string()));

    let resp = test::call_service(&app, report_req()).await;
    assert_eq!(resp.status(), 409);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "you have already reported this thread");

    // plain users cannot triage
    let req = test::TestRequest::get().uri("/api/v1/reports").insert_header(bearer(2, "liker")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/reports/{rid}/review"))
        .insert_header(bearer(3, "mod"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    // admin promotes user 3
    let req = test::TestRequest::post()
        .uri("/api/v1/admin/roles")
        .insert_header(bearer(9, "root"))
        .set_json(json!({"user_id": 3, "role": "moderator"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/reports/{rid}/review"))
        .insert_header(bearer(3, "mod"))
        .to_request();
    let reviewed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(reviewed["status"], "reviewed");
    assert_eq!(reviewed["handled_by"], 3);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/reports/{rid}/resolve"))
        .insert_header(bearer(3, "mod"))
        .to_request();
    let resolved: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resolved["status"], "resolved");

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/reports/{rid}/review"))
        .insert_header(bearer(3, "mod"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::get()
        .uri("/api/v1/reports?status=resolved")
        .insert_header(bearer(3, "mod"))
        .to_request();
    let list: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    // lock blocks replies
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/threads/{tid}/lock"))
        .insert_header(bearer(3, "mod"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/threads/{tid}/replies"))
        .insert_header(bearer(2, "liker"))
        .set_json(json!({"content": "too late"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 423);
}

#[actix_web::test]
#[serial]
async fn replies_detail_and_deletion() {
    setup_env();
    let repo = InMemRepo::ephemeral();
    common::user(&repo, 1, "author").await;
    common::user(&repo, 2, "bob").await;
    common::user(&repo, 3, "eve").await;
    let mailer = Arc::new(RecordingMailer::default());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(&repo, mailer.clone())))
            .configure(config),
    )
    .await;
    let tid = common::thread(&repo, 1, "Hello").await.id;

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/threads/{tid}/replies"))
        .insert_header(bearer(2, "bob"))
        .set_json(json!({"content": "hi!"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let reply: Value = test::read_body_json(resp).await;
    let reply_id = reply["id"].as_i64().unwrap();
    assert_eq!(mailer.subjects(), vec!["New reply to your thread: Hello".to_string()]);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/replies/{reply_id}"))
        .insert_header(bearer(3, "eve"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::get().uri(&format!("/api/v1/threads/{tid}")).to_request();
    let detail: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(detail["replies"].as_array().unwrap().len(), 1);
    assert_eq!(detail["liked"], false);
    assert_eq!(detail["is_author"], false);
    assert!(detail["content_html"].as_str().unwrap().contains("<em>Hello</em>"));

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/replies/{reply_id}"))
        .insert_header(bearer(2, "bob"))
        .to_request();
    let deleted: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(deleted["is_deleted"], true);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/threads/{tid}"))
        .insert_header(bearer(1, "author"))
        .to_request();
    let detail: Value = test::call_and_read_body_json(&app, req).await;
    assert!(detail["replies"].as_array().unwrap().is_empty());
    assert_eq!(detail["is_author"], true);

    let req = test::TestRequest::get().uri("/api/v1/threads?mine=true").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
    let req = test::TestRequest::get()
        .uri("/api/v1/threads?mine=true")
        .insert_header(bearer(2, "bob"))
        .to_request();
    let mine: Value = test::call_and_read_body_json(&app, req).await;
    assert!(mine.as_array().unwrap().is_empty());
}

#[actix_web::test]
#[serial]
async fn resource_upload_download_and_delete() {
    setup_env();
    let repo = InMemRepo::ephemeral();
    common::user(&repo, 1, "author").await;
    common::user(&repo, 2, "bob").await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(&repo, Arc::new(RecordingMailer::default()))))
            .configure(config),
    )
    .await;
    let tid = common::thread(&repo, 1, "Files").await.id;

    let boundary = "XBOUNDARYX";
    let pdf = b"%PDF-1.4\n%test\n".to_vec();
    let multipart = |token: (&'static str, String)| {
        test::TestRequest::post()
            .uri(&format!("/api/v1/threads/{tid}/resources"))
            .insert_header(token)
            .insert_header(("Content-Type", format!("multipart/form-data; boundary={boundary}")))
            .set_payload(build_multipart(&[("title", "Data sheet")], "sheet.pdf", &pdf, boundary))
            .to_request()
    };

    assert_eq!(test::call_service(&app, multipart(bearer(2, "bob"))).await.status(), 403);

    let resp = test::call_service(&app, multipart(bearer(1, "author"))).await;
    assert_eq!(resp.status(), 201);
    let res: Value = test::read_body_json(resp).await;
    assert_eq!(res["file_type"], "pdf");
    assert_eq!(res["mime"], "application/pdf");
    let res_id = res["id"].as_i64().unwrap();

    let req = test::TestRequest::get().uri(&format!("/api/v1/resources/{res_id}/file")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(test::read_body(resp).await.as_ref(), pdf.as_slice());

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/resources/{res_id}"))
        .insert_header(bearer(1, "author"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::get().uri(&format!("/api/v1/resources/{res_id}/file")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
#[serial]
async fn categories_are_admin_managed() {
    setup_env();
    let repo = InMemRepo::ephemeral();
    common::user(&repo, 1, "root").await;
    repo.grant_role(1, Role::Admin).await.unwrap();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(&repo, Arc::new(RecordingMailer::default()))))
            .configure(config),
    )
    .await;

    let create = |id: i64| {
        test::TestRequest::post()
            .uri("/api/v1/categories")
            .insert_header(bearer(id, "x"))
            .set_json(json!({"name": "General"}))
            .to_request()
    };
    assert_eq!(test::call_service(&app, create(2)).await.status(), 403);
    assert_eq!(test::call_service(&app, create(1)).await.status(), 201);
    assert_eq!(test::call_service(&app, create(1)).await.status(), 409);

    let req = test::TestRequest::get().uri("/api/v1/categories").to_request();
    let cats: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(cats[0]["name"], "General");
}

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use wedding_gallery::config::{Config, StoreBackend};
use wedding_gallery::docstore::{CollectionPath, DocumentStore};
use wedding_gallery::routes::build_router;
use wedding_gallery::state::AppState;

const BOUNDARY: &str = "gallery-test-boundary";

struct TestApp {
    state: AppState,
    _tmp: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.backend = StoreBackend::Memory;
        config.storage.path = Some(tmp.path().join("uploads"));
        config.migration.backup_dir = Some(tmp.path().join("backups"));
        config.auth.bcrypt_cost = 4;

        let state = wedding_gallery::build_state(config).unwrap();
        state
            .auth
            .bootstrap_admin("admin", "admin-pass")
            .await
            .unwrap();
        Self { state, _tmp: tmp }
    }

    fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn register(&self, username: &str) -> String {
        let (status, body) = self
            .send(json_request(
                Method::POST,
                "/api/auth/register",
                None,
                json!({ "username": username, "password": "secret-pw", "displayName": username }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["token"].as_str().unwrap().to_string()
    }

    async fn login(&self, username: &str, password: &str) -> (StatusCode, Value) {
        self.send(json_request(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "username": username, "password": password }),
        ))
        .await
    }
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn upload(uri: &str, token: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: {ct}\r\n\r\n",
            b = BOUNDARY,
            f = file_name,
            ct = content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn register_login_and_me() {
    let app = TestApp::new().await;
    let token = app.register("alice").await;

    let (status, me) = app.send(get("/api/auth/me", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "alice");
    assert_eq!(me["isAdmin"], false);
    assert_eq!(me["profile"]["displayName"], "alice");

    let (status, body) = app.login("alice", "secret-pw").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].as_str().is_some());
    assert!(body["user"].get("passwordHash").is_none());

    let (status, body) = app.login("alice", "wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let app = TestApp::new().await;
    app.register("bob").await;

    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/api/auth/register",
            None,
            json!({ "username": "BOB", "password": "secret-pw", "displayName": "Bob" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn requests_without_a_session_are_rejected() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .uri("/api/media")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn users_only_see_their_own_media() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    let (status, item) = app
        .send(upload("/api/media", &alice, "cake.jpg", "image/jpeg", b"jpeg-bytes"))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", item);
    assert_eq!(item["type"], "image");
    let media_id = item["id"].as_str().unwrap().to_string();

    let (_, alice_media) = app.send(get("/api/media", &alice)).await;
    let (_, bob_media) = app.send(get("/api/media", &bob)).await;
    assert_eq!(alice_media.as_array().unwrap().len(), 1);
    assert!(bob_media.as_array().unwrap().is_empty());

    // Bob can't see or delete Alice's item through his own collection
    let delete = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/api/media/{}", media_id))
        .header(header::AUTHORIZATION, format!("Bearer {}", bob))
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(delete).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Nor fetch the file behind it
    let url = item["url"].as_str().unwrap();
    let (status, _) = app.send(get(url, &bob)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let response = app.router().oneshot(get(url, &alice)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
}

#[tokio::test]
async fn comments_and_likes_on_own_media() {
    let app = TestApp::new().await;
    let token = app.register("carol").await;
    let (_, note) = app
        .send(json_request(
            Method::POST,
            "/api/media/notes",
            Some(&token),
            json!({ "text": "Congratulations!" }),
        ))
        .await;
    let media_id = note["id"].as_str().unwrap();

    let (status, _) = app
        .send(json_request(
            Method::POST,
            &format!("/api/media/{}/comments", media_id),
            Some(&token),
            json!({ "text": "so sweet" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, liked) = app
        .send(json_request(
            Method::POST,
            &format!("/api/media/{}/likes", media_id),
            Some(&token),
            json!({}),
        ))
        .await;
    assert_eq!(liked["liked"], true);
    assert_eq!(liked["count"], 1);

    let (_, comments) = app
        .send(get(&format!("/api/media/{}/comments", media_id), &token))
        .await;
    assert_eq!(comments[0]["text"], "so sweet");

    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/api/media/missing/comments",
            Some(&token),
            json!({ "text": "hello" }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stories_reject_other_file_types() {
    let app = TestApp::new().await;
    let token = app.register("dave").await;

    let (status, _) = app
        .send(upload("/api/stories", &token, "notes.txt", "text/plain", b"hi"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(upload("/api/stories", &token, "clip.mp4", "video/mp4", b"mp4"))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, grouped) = app.send(get("/api/stories/grouped", &token)).await;
    assert_eq!(grouped.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn admin_routes_require_the_admin_flag() {
    let app = TestApp::new().await;
    let guest = app.register("erin").await;

    let (status, body) = app.send(get("/api/admin/users", &guest)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Admin access required");

    let (_, body) = app.login("admin", "admin-pass").await;
    let admin = body["token"].as_str().unwrap().to_string();
    let (status, users) = app.send(get("/api/admin/users", &admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn admin_runs_the_migration_pipeline() {
    let app = TestApp::new().await;
    let media = CollectionPath::global("media");
    for (id, data) in [
        ("a", json!({ "userId": "u1" })),
        ("b", json!({ "deviceId": "dev2" })),
        ("c", json!({ "uploadedBy": "Jane Doe" })),
    ] {
        app.state
            .store
            .set(&media, id, data.as_object().cloned().unwrap())
            .await
            .unwrap();
    }

    let (_, body) = app.login("admin", "admin-pass").await;
    let admin = body["token"].as_str().unwrap().to_string();

    let (_, analysis) = app.send(get("/api/admin/migration/analysis", &admin)).await;
    assert_eq!(analysis["unsecuredData"], 3);

    let (status, report) = app
        .send(json_request(
            Method::POST,
            "/api/admin/migration/run",
            Some(&admin),
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["success"], true, "{}", report);
    assert_eq!(report["steps"].as_array().unwrap().len(), 5);

    let (_, validation) = app.send(get("/api/admin/migration/validate", &admin)).await;
    assert_eq!(validation["success"], true);
    assert_eq!(validation["perOwner"]["jane-doe"], 1);

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/admin/migration/collections/photos",
            Some(&admin),
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Unknown collection: photos");
}

#[tokio::test]
async fn only_admins_read_files_left_in_the_legacy_tree() {
    let app = TestApp::new().await;
    app.state
        .blobs
        .write("galleries/dev2/toast.jpg", b"legacy-jpeg")
        .await
        .unwrap();
    let guest = app.register("gina").await;
    let (_, body) = app.login("admin", "admin-pass").await;
    let admin = body["token"].as_str().unwrap().to_string();

    let response = app
        .router()
        .oneshot(get("/files/galleries/dev2/toast.jpg", &admin))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"legacy-jpeg");

    let (status, _) = app.send(get("/files/galleries/dev2/toast.jpg", &guest)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send(get("/files/galleries/dev2/missing.jpg", &admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = TestApp::new().await;
    let token = app.register("frank").await;

    let response = app
        .router()
        .oneshot(json_request(Method::POST, "/api/auth/logout", Some(&token), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.contains("Max-Age=0"));

    let (status, _) = app.send(get("/api/auth/me", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

use std::time::Duration;

use axum::http::StatusCode;
use http_body_util::BodyExt;
use stackpolicy_core::config::Config;
use stackpolicy_core::AccessToken;
use stackpolicy_daemon::webhook::{sign, SIGNATURE_HEADER};
use stackpolicy_daemon::{build_router, serve_until, AppState};
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// State backed by a redb store in `dir` and a management API at `api_url`.
fn state(dir: &TempDir, api_url: &str, webhook_secret: Option<&str>) -> AppState {
    let mut config = Config::default();
    config.api.base_url = api_url.to_string();
    config.api.max_attempts = 1;
    config.webhook.secret = webhook_secret.map(String::from);
    AppState::from_config(
        &config,
        &dir.path().join("stackpolicy.yaml"),
        AccessToken::Present("pul-test".into()),
    )
    .unwrap()
}

fn app(dir: &TempDir, api_url: &str, webhook_secret: Option<&str>) -> axum::Router {
    build_router(state(dir, api_url, webhook_secret))
}

async fn send(app: axum::Router, req: axum::http::Request<axum::body::Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    send(app, req).await
}

async fn post(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    send(app, req).await
}

async fn post_webhook(
    app: axum::Router,
    body: &serde_json::Value,
    signature: Option<String>,
) -> (StatusCode, serde_json::Value) {
    let bytes = serde_json::to_vec(body).unwrap();
    let mut req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/webhooks/pulumi")
        .header("content-type", "application/json");
    if let Some(sig) = signature {
        req = req.header(SIGNATURE_HEADER, sig);
    }
    send(app, req.body(axum::body::Body::from(bytes)).unwrap()).await
}

fn created_event(stack: &str) -> serde_json::Value {
    serde_json::json!({
        "organization": {"githubLogin": "acme"},
        "projectName": "widgets",
        "stackName": stack,
        "kind": "stack",
        "action": "created"
    })
}

// ---------------------------------------------------------------------------
// Health and lookups
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_ok() {
    let dir = TempDir::new().unwrap();
    let (status, body) = get(app(&dir, "http://127.0.0.1:9", None), "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unknown_stack_is_404_and_bad_identity_is_400() {
    let dir = TempDir::new().unwrap();
    let router = app(&dir, "http://127.0.0.1:9", None);

    let (status, body) = get(router.clone(), "/api/stacks/acme/widgets/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("acme/widgets/nope"));

    let (status, _) = get(router.clone(), "/api/stacks/acme/widgets/-bad").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get(router, "/api/stacks").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconcile_endpoint_runs_full_pass_and_persists() {
    let mut server = mockito::Server::new_async().await;
    let template = server
        .mock("GET", "/api/stacks/acme/widgets/dev/deployments/settings")
        .match_header("authorization", "token pul-test")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"sourceContext":{"git":{"repoUrl":"https://github.com/acme/widgets.git","branch":"refs/heads/main"}}}"#)
        .create_async()
        .await;
    let current = server
        .mock("GET", "/api/stacks/acme/widgets/feature-x/deployments/settings")
        .with_status(404)
        .create_async()
        .await;
    let put_settings = server
        .mock("PUT", "/api/stacks/acme/widgets/feature-x/deployments/settings")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "sourceContext": {"git": {"branch": "refs/heads/feature-x"}},
            "operationContext": {"environmentVariables": {"PULUMI_ACCESS_TOKEN": {"secret": "pul-test"}}},
            "cacheOptions": {"enable": true}
        })))
        .with_status(200)
        .create_async()
        .await;
    let tag = server
        .mock("PUT", "/api/stacks/acme/widgets/feature-x/tags/delete_stack")
        .with_status(204)
        .create_async()
        .await;
    let ttl = server
        .mock("PUT", "/api/stacks/acme/widgets/feature-x/deployments/schedules/ttl")
        .with_status(200)
        .create_async()
        .await;
    let drift = server
        .mock("PUT", "/api/stacks/acme/widgets/feature-x/deployments/schedules/drift")
        .match_body(mockito::Matcher::Json(serde_json::json!({
            "scheduleCron": "0 * * * *",
            "autoRemediate": true
        })))
        .with_status(200)
        .create_async()
        .await;
    let team = server
        .mock("PUT", "/api/orgs/acme/teams/DevTeam/stacks/widgets/feature-x")
        .with_status(200)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let router = app(&dir, &server.url(), None);

    let (status, report) = post(router.clone(), "/api/stacks/acme/widgets/feature-x/reconcile").await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["trigger"], "created");
    let steps = report["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 5);
    for step in steps {
        assert_eq!(step["outcome"], "applied", "{step}");
    }
    let ttl_timestamp = report["ttl_timestamp"].as_str().unwrap();
    assert!(ttl_timestamp.ends_with(":00Z"));

    for m in [&template, &current, &put_settings, &tag, &ttl, &drift, &team] {
        m.assert_async().await;
    }

    let (status, view) = get(router.clone(), "/api/stacks/acme/widgets/feature-x").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["policy"]["team"], "DevTeam");
    assert_eq!(view["ledger"]["delete_tag"], "True");
    assert_eq!(view["ledger"]["last_trigger"], "created");

    let (_, list) = get(router, "/api/stacks").await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["identity"], "acme/widgets/feature-x");
}

#[tokio::test]
async fn upstream_outage_fails_steps_but_not_the_request() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("PUT", mockito::Matcher::Any)
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;
    server
        .mock("GET", mockito::Matcher::Any)
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let (status, report) = post(
        app(&dir, &server.url(), None),
        "/api/stacks/acme/widgets/feature-x/reconcile",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    for step in report["steps"].as_array().unwrap() {
        assert_eq!(step["outcome"], "failed", "{step}");
        assert!(step["error"].as_str().unwrap().contains("maintenance"));
    }
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn webhook_requires_valid_signature_when_secret_set() {
    let dir = TempDir::new().unwrap();
    let router = app(&dir, "http://127.0.0.1:9", Some("hook-secret"));
    let event = created_event("feature-x");

    let (status, _) = post_webhook(router.clone(), &event, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post_webhook(router.clone(), &event, Some("deadbeef".into())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let other = serde_json::json!({"kind": "stack", "action": "deleted"});
    let sig = sign("hook-secret", &serde_json::to_vec(&other).unwrap());
    let (status, body) = post_webhook(router, &other, Some(sig)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ignored");
}

#[tokio::test]
async fn created_webhook_is_accepted_and_registers_stack() {
    let server = mockito::Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let router = app(&dir, &server.url(), Some("hook-secret"));
    let event = created_event("feature-y");
    let sig = sign("hook-secret", &serde_json::to_vec(&event).unwrap());

    let (status, body) = post_webhook(router.clone(), &event, Some(sig)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["stack"], "acme/widgets/feature-y");

    // The pass runs in the background; its policy lands in the store even
    // though every remote call fails against the bare mock server.
    let mut found = false;
    for _ in 0..100 {
        let (status, _) = get(router.clone(), "/api/stacks/acme/widgets/feature-y").await;
        if status == StatusCode::OK {
            found = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(found, "background pass never persisted a policy");
}

#[tokio::test]
async fn malformed_webhook_payload_is_400() {
    let dir = TempDir::new().unwrap();
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/webhooks/pulumi")
        .body(axum::body::Body::from("not json"))
        .unwrap();
    let (status, body) = send(app(&dir, "http://127.0.0.1:9", None), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid webhook payload"));
}

// ---------------------------------------------------------------------------
// Serve
// ---------------------------------------------------------------------------

#[tokio::test]
async fn serve_until_stops_the_scheduler_and_returns() {
    let dir = TempDir::new().unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve_until(
        state(&dir, "http://127.0.0.1:9", None),
        listener,
        async move {
            let _ = stop_rx.await;
        },
    ));

    let stream = tokio::net::TcpStream::connect(addr).await;
    assert!(stream.is_ok(), "server was not listening");
    drop(stream);

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server and scheduler did not stop")
        .unwrap()
        .unwrap();
}

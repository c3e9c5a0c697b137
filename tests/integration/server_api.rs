#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlquiz::server::{build_router, SESSION_HEADER};
use sqlquiz::service::{QueryService, ServiceSettings};
use sqlquiz::store::{seed_demo, Store, StoreOptions};
use tempfile::TempDir;
use tower::ServiceExt;

fn setup_router() -> (TempDir, Router) {
    let dir = TempDir::new().expect("tempdir");
    let path: PathBuf = dir.path().join("quiz.db");
    seed_demo(&path).expect("seed demo data");
    let store = Arc::new(Store::open(&path, StoreOptions::default()).expect("open store"));
    let service = QueryService::new(store, ServiceSettings::default());
    (dir, build_router(service, &[]))
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = serde_json::from_slice(&bytes).expect("json body");
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn post_query(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/query")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn health_reports_database() {
    let (_dir, router) = setup_router();
    let (status, body) = send(&router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "sqlquiz");
    assert_eq!(body["checks"]["database"], "ok");
}

#[tokio::test]
async fn query_returns_page_and_insights() {
    let (_dir, router) = setup_router();
    let (status, body) = send(
        &router,
        post_query(json!({
            "query": "SELECT id, first_name FROM patients ORDER BY id",
            "page": 2,
            "page_size": 100
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["row_count"], 100);
    assert_eq!(body["page"], 2);
    assert_eq!(body["page_size"], 100);
    assert_eq!(body["has_more"], true);
    assert_eq!(body["total_rows"], Value::Null);
    assert_eq!(body["columns"][0]["name"], "id");
    assert_eq!(body["rows"][0][0], json!({ "t": "int", "v": 101 }));
    assert!(body["insights"]["complexity"].as_u64().is_some());
    assert_eq!(body["insights"]["performance_level"], "good");
}

#[tokio::test]
async fn rejected_and_failed_queries_map_to_statuses() {
    let (_dir, router) = setup_router();

    let (status, body) = send(&router, post_query(json!({ "query": "DROP TABLE patients" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "MustBeSelect");
    assert!(body["message"].as_str().is_some());

    let (status, body) = send(&router, post_query(json!({ "query": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "EmptyQuery");

    let (status, body) =
        send(&router, post_query(json!({ "query": "SELECT * FORM patients" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "SyntaxError");

    let (status, body) = send(
        &router,
        post_query(json!({ "query": "SELECT nope FROM patients" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "RuntimeError");

    let (status, body) = send(
        &router,
        post_query(json!({ "query": "SELECT * FROM patients LIMIT 9000" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "LimitTooLarge");
}

#[tokio::test]
async fn schema_and_tables_list_user_tables() {
    let (_dir, router) = setup_router();
    let (status, tables) = send(&router, get("/api/tables")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tables, json!(["encounters", "patients"]));

    let (status, schema) = send(&router, get("/api/schema")).await;
    assert_eq!(status, StatusCode::OK);
    let id = &schema["patients"][0];
    assert_eq!(id["name"], "id");
    assert_eq!(id["type"], "INTEGER");
    assert_eq!(id["pk"], true);
    assert!(schema["encounters"].as_array().is_some_and(|cols| cols.len() == 5));
}

#[tokio::test]
async fn sample_data_is_limited_and_validated() {
    let (_dir, router) = setup_router();
    let (status, body) = send(&router, get("/api/sample-data/patients")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["row_count"], 5);
    assert_eq!(body["user_limit_honored"], true);

    let (status, body) = send(&router, get("/api/sample-data/nothing_here")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidTable");
}

#[tokio::test]
async fn stats_count_every_attempt() {
    let (_dir, router) = setup_router();
    let request = Request::builder()
        .method("POST")
        .uri("/api/query")
        .header(CONTENT_TYPE, "application/json")
        .header(SESSION_HEADER, "candidate-7")
        .body(Body::from(
            json!({ "query": "SELECT COUNT(*) FROM encounters" }).to_string(),
        ))
        .expect("request");
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    send(&router, post_query(json!({ "query": "UPDATE patients SET city = NULL" }))).await;
    send(&router, post_query(json!({ "query": "SELECT x FROM patients" }))).await;

    let (status, stats) = send(&router, get("/api/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["attempts"], 3);
    assert_eq!(stats["succeeded"], 1);
    assert_eq!(stats["rejected"], 1);
    assert_eq!(stats["failed"], 1);
    assert_eq!(stats["rows_returned"], 1);
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn sample_queries_follow_the_schema() {
    let (_dir, router) = setup_router();
    let (status, samples) = send(&router, get("/api/sample-queries")).await;
    assert_eq!(status, StatusCode::OK);
    for kind in ["basic", "join", "aggregate"] {
        let sql = samples[kind].as_str().expect("sql text");
        let (status, body) = send(&router, post_query(json!({ "query": sql }))).await;
        assert_eq!(status, StatusCode::OK, "{kind}: {body}");
        assert!(body["row_count"].as_u64().is_some_and(|n| n > 0), "{kind}");
    }
}

#[tokio::test]
async fn challenges_are_listed_without_answers() {
    let (_dir, router) = setup_router();
    let (status, levels) = send(&router, get("/api/challenges")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(levels[0]["name"], "Basic");
    assert_eq!(levels[0]["challenges"][0]["id"], 1);
    assert!(levels[0]["challenges"][0].get("expected_query").is_none());

    let (status, challenge) = send(&router, get("/api/challenges/3")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(challenge["difficulty"], "intermediate");
    assert!(challenge["hints"].as_array().is_some_and(|h| !h.is_empty()));

    let (status, body) = send(&router, get("/api/challenges/404")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "ChallengeNotFound");
}

#[tokio::test]
async fn challenge_attempts_are_graded() {
    let (_dir, router) = setup_router();
    let (status, body) = send(
        &router,
        post_json(
            "/api/challenges/1/attempt",
            json!({ "query": "SELECT COUNT(*) FROM patients", "hints_used": 2 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["correct"], true);
    assert_eq!(body["score"], 80);
    assert_eq!(body["challenge_id"], 1);

    let (status, body) = send(
        &router,
        post_json(
            "/api/challenges/2/attempt",
            json!({ "query": "SELECT DISTINCT city FROM patients ORDER BY city" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["correct"], false);
    assert_eq!(body["score"], 0);
    assert!(body["message"].as_str().is_some_and(|m| m.starts_with("Incorrect.")));

    let (status, body) = send(
        &router,
        post_json("/api/challenges/1/attempt", json!({ "query": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "EmptyQuery");

    let (status, _) = send(
        &router,
        post_json("/api/challenges/99/attempt", json!({ "query": "SELECT 1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

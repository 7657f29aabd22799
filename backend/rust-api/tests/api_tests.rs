mod common;

use axum::body::to_bytes;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{TestHarness, CODE, OPERATOR, QUESTION, SESSION_ID};

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(&body).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn timer_uri(action: &str) -> String {
    format!("/api/v1/sessions/{}/questions/{}/timer/{}", CODE, QUESTION, action)
}

async fn join(app: &Router, user_id: &str) -> String {
    let (status, json) = send(
        app,
        "POST",
        &format!("/api/v1/sessions/{}/join", CODE),
        Some(json!({ "userId": user_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    json["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_join_session() {
    let h = TestHarness::new();
    let app = h.router();

    let (status, json) = send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/join", CODE),
        Some(json!({ "userId": "user-alice" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["username"], "alice");
    assert_eq!(json["sessionId"], SESSION_ID);
    assert_eq!(json["kind"], "live");
    assert_eq!(json["score"], 0);
}

#[tokio::test]
async fn test_join_unknown_code_is_not_found() {
    let h = TestHarness::new();
    let (status, json) = send(
        &h.router(),
        "POST",
        "/api/v1/sessions/NOPE42/join",
        Some(json!({ "userId": "user-alice" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn test_join_rejects_blank_user() {
    let h = TestHarness::new();
    let (status, json) = send(
        &h.router(),
        "POST",
        &format!("/api/v1/sessions/{}/join", CODE),
        Some(json!({ "userId": "" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_timer_start_and_pause() {
    let h = TestHarness::new();
    let app = h.router();

    let (status, json) = send(
        &app,
        "POST",
        &timer_uri("start"),
        Some(json!({ "requestedBy": OPERATOR })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "play");
    assert_eq!(json["durationMs"], 30_000);
    assert_eq!(json["version"], 1);

    h.clock.advance_ms(4_000);
    let (status, json) = send(
        &app,
        "POST",
        &timer_uri("pause"),
        Some(json!({ "requestedBy": OPERATOR })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "pause");
    assert_eq!(json["totalPlayTimeMs"], 4_000);
    assert_eq!(json["timeLeftMs"], 26_000);

    let (status, json) = send(
        &app,
        "GET",
        &format!("/api/v1/sessions/{}/questions/{}/timer", CODE, QUESTION),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["elapsedMs"], 4_000);
}

#[tokio::test]
async fn test_edit_while_playing_is_unprocessable() {
    let h = TestHarness::new();
    let app = h.router();

    send(&app, "POST", &timer_uri("start"), Some(json!({ "requestedBy": OPERATOR }))).await;
    let (status, json) = send(
        &app,
        "POST",
        &timer_uri("edit"),
        Some(json!({ "requestedBy": OPERATOR, "durationMs": 10_000 })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "INVALID_TIMER_TRANSITION");
    assert_eq!(json["reason"], "edit_while_playing");
}

#[tokio::test]
async fn test_stale_expected_version_is_conflict() {
    let h = TestHarness::new();
    let app = h.router();

    send(&app, "POST", &timer_uri("start"), Some(json!({ "requestedBy": OPERATOR }))).await;
    send(&app, "POST", &timer_uri("pause"), Some(json!({ "requestedBy": OPERATOR }))).await;

    let (status, json) = send(
        &app,
        "POST",
        &timer_uri("start"),
        Some(json!({ "requestedBy": OPERATOR, "expectedVersion": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONCURRENT_UPDATE_CONFLICT");
}

#[tokio::test]
async fn test_submit_answer_and_duplicate() {
    let h = TestHarness::new();
    let app = h.router();
    let participant_id = join(&app, "user-alice").await;
    let uri = format!(
        "/api/v1/sessions/{}/participants/{}/answers",
        SESSION_ID, participant_id
    );
    let body = json!({
        "questionId": QUESTION,
        "value": { "kind": "choice", "value": 1 }
    });

    let (status, json) = send(
        &app,
        "POST",
        &format!(
            "/api/v1/sessions/{}/participants/{}/questions/{}/open",
            SESSION_ID, participant_id, QUESTION
        ),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["questionId"], QUESTION);
    assert_eq!(json["durationMs"], 30_000);
    assert!(json["startedAt"].is_string());

    let (status, json) = send(&app, "POST", &uri, Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["isCorrect"], true);
    assert_eq!(json["awardedScore"], 1_500);
    assert_eq!(json["totalScore"], 1_500);

    let (status, json) = send(&app, "POST", &uri, Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "DUPLICATE_ANSWER");

    let (status, json) = send(
        &app,
        "GET",
        &format!("/api/v1/sessions/{}/participants/{}", SESSION_ID, participant_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["score"], 1_500);
    assert_eq!(json["answers"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_answer_to_stopped_timer_is_unprocessable() {
    let h = TestHarness::new();
    let app = h.router();
    let participant_id = join(&app, "user-alice").await;

    send(&app, "POST", &timer_uri("start"), Some(json!({ "requestedBy": OPERATOR }))).await;
    h.clock.advance_ms(3_000);
    send(&app, "POST", &timer_uri("stop"), Some(json!({ "requestedBy": OPERATOR }))).await;

    let (status, json) = send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/participants/{}/answers", SESSION_ID, participant_id),
        Some(json!({ "questionId": QUESTION, "value": { "kind": "choice", "value": 1 } })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "INVALID_TIMER_TRANSITION");
    assert_eq!(json["reason"], "answer_window_closed");
}

#[tokio::test]
async fn test_answer_for_unknown_participant() {
    let h = TestHarness::new();
    let (status, json) = send(
        &h.router(),
        "POST",
        &format!("/api/v1/sessions/{}/participants/ghost/answers", SESSION_ID),
        Some(json!({ "questionId": QUESTION, "value": { "kind": "choice", "value": 1 } })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "PARTICIPANT_NOT_FOUND");
}

#[tokio::test]
async fn test_leaderboard_orders_by_score() {
    let h = TestHarness::new();
    let app = h.router();
    let alice = join(&app, "user-alice").await;
    let bob = join(&app, "user-bob").await;

    send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/participants/{}/answers", SESSION_ID, bob),
        Some(json!({ "questionId": QUESTION, "value": { "kind": "choice", "value": 1 } })),
    )
    .await;

    let (status, json) = send(
        &app,
        "GET",
        &format!("/api/v1/sessions/{}/leaderboard", SESSION_ID),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ranking = json.as_array().unwrap();
    assert_eq!(ranking.len(), 2);
    assert_eq!(ranking[0]["id"], bob.as_str());
    assert_eq!(ranking[0]["rank"], 1);
    assert_eq!(ranking[1]["id"], alice.as_str());
    assert_eq!(ranking[1]["rank"], 2);
}

#[tokio::test]
async fn test_generate_access_code() {
    let h = TestHarness::new();
    let app = h.router();

    let (status, json) = send(&app, "POST", "/api/v1/access-codes", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["accessCode"].as_str().unwrap().len(), 6);

    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/access-codes",
        Some(json!({ "length": 8 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["accessCode"].as_str().unwrap().len(), 8);

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/access-codes",
        Some(json!({ "length": 40 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_complete_and_purge_session() {
    let h = TestHarness::new();
    let app = h.router();
    join(&app, "user-alice").await;

    let (status, json) = send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/complete", SESSION_ID),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["completedParticipants"], 1);

    let (status, json) = send(
        &app,
        "DELETE",
        &format!("/api/v1/sessions/{}", SESSION_ID),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["participantKeys"], 2);
    assert_eq!(json["timers"], 0);
}

#[tokio::test]
async fn test_health_check() {
    let h = TestHarness::new();
    let (status, json) = send(&h.router(), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "livequiz-api");
}

#[tokio::test]
async fn test_metrics_requires_auth() {
    let h = TestHarness::new();
    let response = h
        .router()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_trace_id_is_echoed() {
    let h = TestHarness::new();
    let response = h
        .router()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-trace-id", "trace-1234")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("x-trace-id").unwrap().to_str().unwrap(),
        "trace-1234"
    );

    let response = h
        .router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-trace-id"));
}

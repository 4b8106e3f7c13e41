use super::test_util;
use crate::api::test_util::deserialize_body;
use crate::routing_utils::Envelope;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header::CONTENT_TYPE};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Envelope<Value>) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    (status, deserialize_body(response.into_body()).await)
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, Envelope<Value>) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    (status, deserialize_body(response.into_body()).await)
}

/// Walks the full assignment lifecycle: create a user, create a task assigned to them,
/// observe the pending link, delete the task, observe the link disappear.
#[tokio::test]
#[cfg_attr(not(feature = "integration_test"), ignore)]
async fn task_assignment_lifecycle_keeps_both_sides_consistent() {
    let router = test_util::test_router().await;

    let (status, created_user) = post_json(
        &router,
        "/api/users",
        json!({"name": "Ann", "email": test_util::unique_email("ann")}),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status);
    assert_eq!(json!([]), created_user.data["pendingTasks"]);
    let ann_id = created_user.data["_id"].as_str().unwrap().to_owned();

    let (status, created_task) = post_json(
        &router,
        "/api/tasks",
        json!({"name": "T1", "deadline": "2024-01-01", "assignedUser": ann_id}),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status);
    assert_eq!("Ann", created_task.data["assignedUserName"]);
    let task_id = created_task.data["_id"].as_str().unwrap().to_owned();

    let (status, fetched_user) = get_json(&router, &format!("/api/users/{ann_id}")).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(json!([task_id]), fetched_user.data["pendingTasks"]);

    let delete_response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/tasks/{task_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(StatusCode::OK, delete_response.status());

    let (status, refetched_user) = get_json(&router, &format!("/api/users/{ann_id}")).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(json!([]), refetched_user.data["pendingTasks"]);
}

#[tokio::test]
#[cfg_attr(not(feature = "integration_test"), ignore)]
async fn duplicate_emails_are_rejected_without_a_write() {
    let router = test_util::test_router().await;
    let email = test_util::unique_email("dupe");

    let (status, _) = post_json(
        &router,
        "/api/users",
        json!({"name": "First", "email": email}),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status);

    let (status, rejection) = post_json(
        &router,
        "/api/users",
        json!({"name": "Second", "email": email}),
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!("Email already exists", rejection.message);
    assert_eq!(json!([]), rejection.data);

    let encoded_filter =
        serde_json::to_string(&json!({"email": email})).expect("filter should serialize");
    let (status, count) = get_json(
        &router,
        &format!(
            "/api/users?count=true&where={}",
            urlencode(&encoded_filter)
        ),
    )
    .await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(json!(1), count.data);
}

/// Just enough percent-encoding for the JSON filters these tests send.
fn urlencode(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len() * 3);
    for byte in raw.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'@' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

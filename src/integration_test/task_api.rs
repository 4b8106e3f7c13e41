use super::test_util;
use crate::api::test_util::deserialize_body;
use crate::routing_utils::Envelope;
use axum::body::Body;
use axum::http::{Request, StatusCode, header::CONTENT_TYPE};
use serde_json::{Value, json};
use tower::ServiceExt;

#[tokio::test]
#[cfg_attr(not(feature = "integration_test"), ignore)]
async fn created_tasks_round_trip_with_defaults() {
    let router = test_util::test_router().await;

    let create_response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tasks")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "name": "integration round trip",
                        "deadline": "2030-06-01T12:00:00Z",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(StatusCode::CREATED, create_response.status());

    let created: Envelope<Value> = deserialize_body(create_response.into_body()).await;
    assert_eq!("Task created", created.message);
    let task_id = created.data["_id"]
        .as_str()
        .expect("created task should carry an id")
        .to_owned();

    let fetch_response = router
        .oneshot(
            Request::builder()
                .uri(format!("/api/tasks/{task_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(StatusCode::OK, fetch_response.status());

    let fetched: Envelope<Value> = deserialize_body(fetch_response.into_body()).await;
    assert_eq!("OK", fetched.message);
    assert_eq!("integration round trip", fetched.data["name"]);
    assert_eq!("", fetched.data["description"]);
    assert_eq!(false, fetched.data["completed"]);
    assert_eq!("", fetched.data["assignedUser"]);
    assert_eq!("unassigned", fetched.data["assignedUserName"]);
    assert!(fetched.data["dateCreated"].is_string());
}

#[tokio::test]
#[cfg_attr(not(feature = "integration_test"), ignore)]
async fn count_mode_returns_an_integer() {
    let router = test_util::test_router().await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/tasks?where=%7B%22completed%22%3A%20true%7D&count=true&limit=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(StatusCode::OK, response.status());

    let envelope: Envelope<Value> = deserialize_body(response.into_body()).await;
    assert!(
        envelope.data.is_i64() || envelope.data.is_u64(),
        "count mode should return a bare integer, got {:?}",
        envelope.data
    );
}

#[tokio::test]
#[cfg_attr(not(feature = "integration_test"), ignore)]
async fn unknown_task_ids_yield_404() {
    let router = test_util::test_router().await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/tasks/00000000-0000-0000-0000-000000000000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(StatusCode::NOT_FOUND, response.status());
}

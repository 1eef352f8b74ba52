//! Integration tests for the weights endpoint

use arbiter_lib::session::SharedWeights;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, Method, Request, StatusCode},
    response::IntoResponse,
    Router,
};
use tower::ServiceExt;
use tracing::debug;

async fn current_weights(State(weights): State<SharedWeights>, body: Bytes) -> impl IntoResponse {
    if !body.is_empty() {
        debug!(body = %String::from_utf8_lossy(&body), "Weights poll carried a body");
    }
    let current = weights.current().await;
    (StatusCode::OK, [(header::CONNECTION, "close")], current)
}

fn create_test_router(weights: SharedWeights) -> Router {
    Router::new().fallback(current_weights).with_state(weights)
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn any_path_returns_current_weights() {
    let weights = SharedWeights::new();
    weights.replace("app1:100.000000 ".to_string()).await;
    let app = create_test_router(weights);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/some/arbitrary/path")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONNECTION).unwrap(),
        "close"
    );
    assert_eq!(body_string(response).await, "app1:100.000000 ");
}

#[tokio::test]
async fn post_with_body_is_still_a_getter() {
    let weights = SharedWeights::new();
    weights.replace("app2:100.000000 ".to_string()).await;
    let app = create_test_router(weights);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/")
                .body(Body::from("give me the weights"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "app2:100.000000 ");
}

#[tokio::test]
async fn fresh_agent_serves_empty_weights() {
    let app = create_test_router(SharedWeights::new());

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "");
}

#[tokio::test]
async fn reads_observe_the_latest_replacement() {
    let weights = SharedWeights::new();
    let app = create_test_router(weights.clone());

    weights.replace("app1:100.000000 ".to_string()).await;
    let first = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_string(first).await, "app1:100.000000 ");

    weights
        .replace("app1:25.000000|75.000000 ".to_string())
        .await;
    let second = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_string(second).await, "app1:25.000000|75.000000 ");
}

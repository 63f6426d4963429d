#![allow(dead_code)]

use std::sync::Arc;

use axum::{body::Body, http::Request as HttpRequest, Router};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

use apiary_server::{
    app_state::AppState,
    persistence::Db,
    routes::build_router,
    sidelog::MemoryRawLogSink,
    test_support::{test_state, MockRuntime, TestState},
};

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub db: Db,
    pub runtime: Arc<MockRuntime>,
    pub raw_log: MemoryRawLogSink,
}

pub async fn setup_app() -> TestApp {
    let TestState {
        state,
        runtime,
        raw_log,
    } = test_state().await;
    let app = build_router().with_state(state.clone());
    TestApp {
        app,
        db: state.db.clone(),
        state,
        runtime,
        raw_log,
    }
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> HttpRequest<Body> {
    HttpRequest::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

pub fn empty_request(method: &str, uri: &str) -> HttpRequest<Body> {
    HttpRequest::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

pub async fn read_json<T: DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|err| {
        panic!(
            "body did not deserialize: {err}: {}",
            String::from_utf8_lossy(&bytes)
        )
    })
}

//! Router assembly: HTTP endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
  routing::{get, post},
  Router,
};
use tower_http::{
  cors::{Any, CorsLayer},
  trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - the test resource under `/api/v1/problems/:location/tests`; `:location` is
///   one path segment, so locations holding `/` are sent percent-encoded
///   (`i4x%3A%2F%2Forg%2Fp1`) and arrive decoded
/// - CORS (allow any origin/method/headers); adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
  Router::new()
    .route("/api/v1/health", get(http::http_health))
    .route(
      "/api/v1/problems/:location/tests",
      get(http::http_get_tests).post(http::http_post_test).delete(http::http_delete_test),
    )
    .route("/api/v1/problems/:location/tests/run", post(http::http_run_tests))
    .with_state(state)
    .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
    .layer(
      TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{HarnessConfig, ProblemCfg};
  use axum::body::{to_bytes, Body};
  use axum::http::{Request, StatusCode};
  use tower::ServiceExt;

  fn app(cfg: HarnessConfig) -> Router {
    build_router(Arc::new(AppState::from_config(&cfg).unwrap()))
  }

  async fn body_string(resp: axum::response::Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
  }

  fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
      .method(method)
      .uri(uri)
      .header("content-type", "application/json")
      .body(Body::from(body.to_string()))
      .unwrap()
  }

  #[tokio::test]
  async fn health_is_ok() {
    let resp = app(HarnessConfig::default())
      .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, r#"{"ok":true}"#);
  }

  #[tokio::test]
  async fn create_list_run_and_delete_over_http() {
    let app = app(HarnessConfig::default());
    let uri = "/api/v1/problems/demo/tests";

    let resp = app
      .clone()
      .oneshot(json_request("POST", uri, serde_json::json!({
        "should_be": "correct",
        "response_dict": {"input_demo_product_1": "42"}
      })))
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let form = Request::builder()
      .method("POST")
      .uri(uri)
      .header("content-type", "application/x-www-form-urlencoded")
      .body(Body::from("input_demo_red_1=verde&should_be=incorrect&csrfmiddlewaretoken=t"))
      .unwrap();
    let resp = app.clone().oneshot(form).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app.clone().oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_string(resp).await;
    assert!(html.contains("<li>42</li>") && html.contains("<li>verde</li>"));
    assert!(html.contains(r#"id="demo_product_test_summary_error""#));

    let resp = app
      .clone()
      .oneshot(Request::builder().method("POST").uri("/api/v1/problems/demo/tests/run").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let report: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(report["total"], 2);
    assert_eq!(report["passed"], 2);

    let resp = app.clone().oneshot(json_request("DELETE", uri, serde_json::json!({"id": 1}))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = app.oneshot(json_request("DELETE", uri, serde_json::json!({"id": 1}))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let err: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(err["code"], "not_found");
  }

  #[tokio::test]
  async fn errors_map_to_status_codes() {
    let app = app(HarnessConfig { staff: Some(vec!["alice".into()]), ..Default::default() });

    let resp = app
      .clone()
      .oneshot(Request::builder().uri("/api/v1/problems/demo/tests").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let mut req = json_request("POST", "/api/v1/problems/demo/tests", serde_json::json!({
      "should_be": "correct",
      "response_dict": {"input_demo_product_1": ""}
    }));
    req.headers_mut().insert("x-user", "alice".parse().unwrap());
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let mut req = Request::builder().uri("/api/v1/problems/missing/tests").body(Body::empty()).unwrap();
    req.headers_mut().insert("x-user", "alice".parse().unwrap());
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn malformed_bodies_get_the_json_error_shape() {
    let app = app(HarnessConfig::default());
    let uri = "/api/v1/problems/demo/tests";

    // `should_be` missing.
    let resp = app
      .clone()
      .oneshot(json_request("POST", uri, serde_json::json!({"response_dict": {"input_demo_product_1": "42"}})))
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(err["code"], "invalid");

    let req = Request::builder()
      .method("DELETE")
      .uri(uri)
      .header("content-type", "application/json")
      .body(Body::from("{\"id\": \"one\"}"))
      .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(err["code"], "invalid");
  }

  #[tokio::test]
  async fn locations_with_slashes_are_addressed_percent_encoded() {
    let cfg = HarnessConfig {
      problems: vec![ProblemCfg {
        id: "i4x://demo/p1".into(),
        data: r#"<problem><p>Q</p><customresponse id="q1" expect="7"><textline/></customresponse></problem>"#.into(),
      }],
      ..Default::default()
    };
    let app = app(cfg);
    let uri = "/api/v1/problems/i4x%3A%2F%2Fdemo%2Fp1/tests";

    let resp = app
      .clone()
      .oneshot(json_request("POST", uri, serde_json::json!({
        "should_be": "correct",
        "response_dict": {"input_q1_1": "7"}
      })))
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_string(resp).await.contains(r#"id="q1_test_summary_correct""#));
  }
}

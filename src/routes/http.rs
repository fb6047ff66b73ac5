//! HTTP endpoint handlers. These are thin wrappers that forward to the harness.
//! Each handler is instrumented and logs the location and basic result info.
//!
//! Harness operations are synchronous (descriptor I/O, grading), so they run on
//! the blocking pool.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
  async_trait,
  extract::{
    rejection::{FormRejection, JsonRejection},
    FromRequest, Path, Request, State,
  },
  http::{header, HeaderMap, StatusCode},
  response::{Html, IntoResponse, Response},
  Form, Json,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::api::{RequestContext, RunReport};
use crate::domain::TestFields;
use crate::error::{HarnessError, HarnessResult};
use crate::protocol::*;
use crate::state::AppState;

pub const USER_HEADER: &str = "x-user";
const ANONYMOUS: &str = "anonymous";

impl IntoResponse for HarnessError {
  fn into_response(self) -> Response {
    let status = match &self {
      HarnessError::NotFound(_) => StatusCode::NOT_FOUND,
      HarnessError::Invalid(_) => StatusCode::BAD_REQUEST,
      HarnessError::AccessDenied { .. } => StatusCode::FORBIDDEN,
      HarnessError::Template(_) | HarnessError::Problem(_) | HarnessError::Store(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    };
    if status.is_server_error() {
      error!(target: "content_testing::http", error = %self, "Request failed");
    } else {
      warn!(target: "content_testing::http", status = status.as_u16(), error = %self, "Request rejected");
    }
    (status, Json(ErrorOut { code: error_code(&self), error: self.to_string() })).into_response()
  }
}

impl From<JsonRejection> for HarnessError {
  fn from(rejection: JsonRejection) -> Self {
    HarnessError::Invalid(rejection.body_text())
  }
}

impl From<FormRejection> for HarnessError {
  fn from(rejection: FormRejection) -> Self {
    HarnessError::Invalid(rejection.body_text())
  }
}

/// `Json` whose rejections use the harness error body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(HarnessError))]
pub struct JsonBody<T>(pub T);

/// Caller identity from `x-user` plus a fresh csrf token for rendered forms.
pub fn request_context(headers: &HeaderMap) -> RequestContext {
  let user = headers
    .get(USER_HEADER)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|u| !u.is_empty())
    .unwrap_or(ANONYMOUS);
  RequestContext::new(user, Uuid::new_v4().to_string())
}

async fn blocking<T, F>(f: F) -> HarnessResult<T>
where
  F: FnOnce() -> HarnessResult<T> + Send + 'static,
  T: Send + 'static,
{
  tokio::task::spawn_blocking(f)
    .await
    .map_err(|e| HarnessError::Store(format!("harness task failed: {}", e)))?
}

/// Upsert body: JSON `TestFields`, or the urlencoded creation form.
pub struct TestFieldsBody(pub TestFields);

#[async_trait]
impl<S> FromRequest<S> for TestFieldsBody
where
  S: Send + Sync,
{
  type Rejection = HarnessError;

  async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
    let is_form = req
      .headers()
      .get(header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map_or(false, |ct| ct.starts_with("application/x-www-form-urlencoded"));
    if is_form {
      let Form(form) = Form::<HashMap<String, String>>::from_request(req, state).await?;
      return fields_from_form(form).map(Self);
    }
    let Json(fields) = Json::<TestFields>::from_request(req, state).await?;
    Ok(Self(fields))
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_get_tests(
  State(state): State<Arc<AppState>>,
  Path(location): Path<String>,
  headers: HeaderMap,
) -> Result<Html<String>, HarnessError> {
  let ctx = request_context(&headers);
  let harness = state.harness.clone();
  let loc = location.clone();
  let html = blocking(move || harness.summarize(&ctx, &loc)).await?;
  info!(target: "content_testing::http", %location, html_len = html.len(), "HTTP summary served");
  Ok(Html(html))
}

#[instrument(level = "info", skip(state, headers, body))]
pub async fn http_post_test(
  State(state): State<Arc<AppState>>,
  Path(location): Path<String>,
  headers: HeaderMap,
  TestFieldsBody(body): TestFieldsBody,
) -> Result<StatusCode, HarnessError> {
  let ctx = request_context(&headers);
  let harness = state.harness.clone();
  let loc = location.clone();
  let record = blocking(move || harness.upsert(&ctx, &loc, body)).await?;
  info!(target: "content_testing::http", %location, id = record.id, should_be = %record.should_be, "HTTP test saved");
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state, headers, body))]
pub async fn http_delete_test(
  State(state): State<Arc<AppState>>,
  Path(location): Path<String>,
  headers: HeaderMap,
  JsonBody(body): JsonBody<DeleteIn>,
) -> Result<StatusCode, HarnessError> {
  let ctx = request_context(&headers);
  let harness = state.harness.clone();
  let loc = location.clone();
  let id = body.id;
  blocking(move || harness.delete(&ctx, &loc, id)).await?;
  info!(target: "content_testing::http", %location, id, "HTTP test deleted");
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_run_tests(
  State(state): State<Arc<AppState>>,
  Path(location): Path<String>,
  headers: HeaderMap,
) -> Result<Json<RunReport>, HarnessError> {
  let ctx = request_context(&headers);
  let harness = state.harness.clone();
  let loc = location.clone();
  let report = blocking(move || harness.run_all(&ctx, &loc)).await?;
  info!(target: "content_testing::http", %location, passed = report.passed, failed = report.failed, "HTTP run finished");
  Ok(Json(report))
}

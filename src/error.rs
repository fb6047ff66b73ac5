//! Error types surfaced by the harness core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
  /// Descriptor or test id absent.
  #[error("Not found: {0}")]
  NotFound(String),

  /// Rejected input: empty answers, unknown verdict, malformed key, unknown response id.
  #[error("Invalid: {0}")]
  Invalid(String),

  #[error("Access denied: user '{user}' may not access '{location}'")]
  AccessDenied { user: String, location: String },

  #[error("Template error: {0}")]
  Template(String),

  /// The problem definition could not be turned into a runnable problem.
  #[error("Problem error: {0}")]
  Problem(String),

  #[error("Storage error: {0}")]
  Store(String),
}

impl From<std::io::Error> for HarnessError {
  fn from(e: std::io::Error) -> Self {
    HarnessError::Store(e.to_string())
  }
}

impl From<serde_json::Error> for HarnessError {
  fn from(e: serde_json::Error) -> Self {
    HarnessError::Store(e.to_string())
  }
}

impl From<handlebars::RenderError> for HarnessError {
  fn from(e: handlebars::RenderError) -> Self {
    HarnessError::Template(e.to_string())
  }
}

/// Failure raised by a problem runtime while grading one submission.
/// Always recovered by the content test that triggered it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct GradingFailure(pub String);

pub type HarnessResult<T> = Result<T, HarnessError>;

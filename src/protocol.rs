//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::{TestFields, INPUT_PREFIX};
use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Serialize)]
pub struct HealthOut {
  pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct DeleteIn {
  pub id: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
  pub error: String,
  pub code: &'static str,
}

/// Stable machine-readable code per error kind.
pub fn error_code(e: &HarnessError) -> &'static str {
  match e {
    HarnessError::NotFound(_) => "not_found",
    HarnessError::Invalid(_) => "invalid",
    HarnessError::AccessDenied { .. } => "access_denied",
    HarnessError::Template(_) => "template",
    HarnessError::Problem(_) => "problem",
    HarnessError::Store(_) => "store",
  }
}

/// Convert a submitted creation form: `input_*` fields become the
/// response dict, `should_be` and the optional `id` are read as-is.
/// Any other field (csrf token, submit button) is ignored.
pub fn fields_from_form(form: HashMap<String, String>) -> HarnessResult<TestFields> {
  let mut should_be = None;
  let mut id = None;
  let mut response_dict = BTreeMap::new();
  for (name, value) in form {
    match name.as_str() {
      "should_be" => should_be = Some(value),
      "id" if value.trim().is_empty() => {}
      "id" => {
        let parsed = value
          .trim()
          .parse::<u64>()
          .map_err(|_| HarnessError::Invalid(format!("test id '{}' is not a non-negative integer", value)))?;
        id = Some(parsed);
      }
      _ if name.starts_with(INPUT_PREFIX) => {
        response_dict.insert(name, value);
      }
      _ => {}
    }
  }
  let should_be = should_be.ok_or_else(|| HarnessError::Invalid("missing should_be".into()))?;
  Ok(TestFields { id, should_be, response_dict })
}

//! Domain models shared by the harness: verdicts, persisted test records,
//! problem descriptors, and the `input_<response_id>_<index>` key grammar.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// Marker prefixed to every answer field submitted by the problem widgets.
pub const INPUT_PREFIX: &str = "input_";

/// Expected (or observed) outcome of a content test.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
  Correct,
  Incorrect,
  Error,
}

impl Verdict {
  /// Fixed rendering order of the verdict set.
  pub const ALL: [Verdict; 3] = [Verdict::Correct, Verdict::Incorrect, Verdict::Error];

  pub fn as_str(&self) -> &'static str {
    match self {
      Verdict::Correct => "correct",
      Verdict::Incorrect => "incorrect",
      Verdict::Error => "error",
    }
  }
}

impl fmt::Display for Verdict {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Verdict {
  type Err = HarnessError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim() {
      "correct" => Ok(Verdict::Correct),
      "incorrect" => Ok(Verdict::Incorrect),
      "error" => Ok(Verdict::Error),
      other => Err(HarnessError::Invalid(format!("unknown verdict '{}'", other))),
    }
  }
}

/// Persisted test case, stored newest-first in `ProblemDescriptor::tests`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestRecord {
  pub id: u64,
  pub location: String,
  /// Bound input key (`<response_id>_<index>`, marker stripped) -> answer.
  pub response_dict: BTreeMap<String, String>,
  pub should_be: Verdict,

  // Last run results; absent until the test has been run.
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub verdict: Option<Verdict>,
}

/// A problem plus the tests authored against it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDescriptor {
  pub id: String,
  /// Raw problem XML an LCP is built from.
  pub data: String,
  #[serde(default)]
  pub tests: Vec<TestRecord>,
}

impl ProblemDescriptor {
  pub fn new(id: impl Into<String>, data: impl Into<String>) -> Self {
    Self { id: id.into(), data: data.into(), tests: Vec::new() }
  }
}

/// Fields accepted when creating or replacing a test.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TestFields {
  #[serde(default)]
  pub id: Option<u64>,
  pub should_be: String,
  /// Keys may carry the `input_` marker; it is stripped on normalization.
  #[serde(default)]
  pub response_dict: BTreeMap<String, String>,
}

/// `(response_id, input_index)` addressed by one answer key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputKey {
  pub response_id: String,
  pub index: u32,
}

impl InputKey {
  /// Parse `input_<response_id>_<index>` or `<response_id>_<index>`.
  /// Response ids may themselves contain underscores; the index is the
  /// segment after the last one.
  pub fn parse(key: &str) -> Result<Self, HarnessError> {
    let bare = strip_input_prefix(key);
    let (response_id, index) = bare
      .rsplit_once('_')
      .ok_or_else(|| HarnessError::Invalid(format!("malformed input key '{}'", key)))?;
    if response_id.is_empty() {
      return Err(HarnessError::Invalid(format!("malformed input key '{}'", key)));
    }
    let index = index
      .parse::<u32>()
      .map_err(|_| HarnessError::Invalid(format!("malformed input index in key '{}'", key)))?;
    Ok(Self { response_id: response_id.to_string(), index })
  }

  /// Bound key as stored in `response_dict`.
  pub fn bound(&self) -> String {
    format!("{}_{}", self.response_id, self.index)
  }

  /// Field name the problem widgets submit.
  pub fn field_name(&self) -> String {
    format!("{}{}", INPUT_PREFIX, self.bound())
  }
}

pub fn strip_input_prefix(key: &str) -> &str {
  key.strip_prefix(INPUT_PREFIX).unwrap_or(key)
}

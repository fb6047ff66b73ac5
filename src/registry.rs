//! Closed registry of recognized response-component tags.
//!
//! Each entry says which descendant tags are answer slots and how answer keys
//! addressed at that response are parsed. Extending the set is a registry
//! insert; the configuration may only enable kinds listed in `builtin_kind`.

use std::collections::BTreeMap;

use crate::domain::InputKey;
use crate::error::{HarnessError, HarnessResult};

pub const CUSTOM_RESPONSE: &str = "customresponse";
pub const STRING_RESPONSE: &str = "stringresponse";
pub const NUMERICAL_RESPONSE: &str = "numericalresponse";

const TEXT_INPUTS: &[&str] = &["textline", "textbox"];

#[derive(Clone, Debug)]
pub struct ResponseKind {
  pub tag: &'static str,
  /// Descendant tags that are answer slots, numbered from 1 in document order.
  pub input_tags: &'static [&'static str],
  pub parse_key: fn(&str) -> HarnessResult<InputKey>,
}

/// Kinds known to this build.
pub fn builtin_kind(tag: &str) -> Option<ResponseKind> {
  let tag = match tag {
    CUSTOM_RESPONSE => CUSTOM_RESPONSE,
    STRING_RESPONSE => STRING_RESPONSE,
    NUMERICAL_RESPONSE => NUMERICAL_RESPONSE,
    _ => return None,
  };
  Some(ResponseKind { tag, input_tags: TEXT_INPUTS, parse_key: InputKey::parse })
}

#[derive(Clone, Debug)]
pub struct ResponseRegistry {
  kinds: BTreeMap<&'static str, ResponseKind>,
}

impl Default for ResponseRegistry {
  fn default() -> Self {
    let mut reg = Self { kinds: BTreeMap::new() };
    if let Some(kind) = builtin_kind(CUSTOM_RESPONSE) {
      reg.register(kind);
    }
    reg
  }
}

impl ResponseRegistry {
  /// Registry enabling exactly `tags`; unknown tags are rejected.
  pub fn from_tags<S: AsRef<str>>(tags: &[S]) -> HarnessResult<Self> {
    let mut reg = Self { kinds: BTreeMap::new() };
    for tag in tags {
      let tag = tag.as_ref();
      let kind = builtin_kind(tag)
        .ok_or_else(|| HarnessError::Invalid(format!("unrecognized response tag '{}'", tag)))?;
      reg.register(kind);
    }
    if reg.kinds.is_empty() {
      return Err(HarnessError::Invalid("response tag set is empty".into()));
    }
    Ok(reg)
  }

  pub fn register(&mut self, kind: ResponseKind) {
    self.kinds.insert(kind.tag, kind);
  }

  pub fn get(&self, tag: &str) -> Option<&ResponseKind> {
    self.kinds.get(tag)
  }

  pub fn is_response_tag(&self, tag: &str) -> bool {
    self.kinds.contains_key(tag)
  }

  pub fn is_input_tag(&self, tag: &str) -> bool {
    self.kinds.values().any(|k| k.input_tags.contains(&tag))
  }

  pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
    self.kinds.keys().copied()
  }

  /// Parse an answer key with the parser of the response kind `tag`.
  pub fn parse_key(&self, tag: &str, key: &str) -> HarnessResult<InputKey> {
    let kind = self
      .get(tag)
      .ok_or_else(|| HarnessError::Invalid(format!("unrecognized response tag '{}'", tag)))?;
    (kind.parse_key)(key)
  }
}

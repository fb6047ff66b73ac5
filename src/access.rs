//! Access policy consulted once per operation at the harness boundary.

use std::collections::HashSet;

use tracing::warn;

use crate::error::{HarnessError, HarnessResult};

pub trait AccessPolicy: Send + Sync {
  fn may_access(&self, user: &str, location: &str) -> bool;
}

/// Everyone may author tests everywhere.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
  fn may_access(&self, _user: &str, _location: &str) -> bool {
    true
  }
}

/// Only listed staff users may access any location.
#[derive(Clone, Debug, Default)]
pub struct StaffPolicy {
  staff: HashSet<String>,
}

impl StaffPolicy {
  pub fn new<I, S>(users: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self { staff: users.into_iter().map(Into::into).collect() }
  }
}

impl AccessPolicy for StaffPolicy {
  fn may_access(&self, user: &str, _location: &str) -> bool {
    self.staff.contains(user)
  }
}

pub fn ensure_access(policy: &dyn AccessPolicy, user: &str, location: &str) -> HarnessResult<()> {
  if policy.may_access(user, location) {
    return Ok(());
  }
  warn!(target: "content_testing", %user, %location, "Access denied");
  Err(HarnessError::AccessDenied { user: user.to_string(), location: location.to_string() })
}

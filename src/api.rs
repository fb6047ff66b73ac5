//! Transport-agnostic harness operations: summarize, upsert, delete, run_all.
//!
//! Every operation checks access first, reads the descriptor, and builds at
//! most one preview module for the call.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::access::{ensure_access, AccessPolicy};
use crate::content_test::{validate_bindings, ContentTest};
use crate::domain::{strip_input_prefix, ProblemDescriptor, TestFields, TestRecord, Verdict};
use crate::error::HarnessResult;
use crate::preview::{PreviewModule, PreviewModuleFactory};
use crate::registry::ResponseRegistry;
use crate::runtime::ProblemRuntime;
use crate::store::{DescriptorStore, RecordFields, TestStore};
use crate::summary::{group_by_verdict, SummaryRenderer};
use crate::templates::TemplateRenderer;

/// Who is calling, plus the csrf token threaded into rendered forms.
#[derive(Clone, Debug)]
pub struct RequestContext {
  pub user: String,
  pub csrf: String,
}

impl RequestContext {
  pub fn new(user: impl Into<String>, csrf: impl Into<String>) -> Self {
    Self { user: user.into(), csrf: csrf.into() }
  }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct RunResult {
  pub id: u64,
  pub should_be: Verdict,
  pub verdict: Verdict,
  pub message: String,
  pub passed: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct RunReport {
  pub location: String,
  pub total: usize,
  pub passed: usize,
  pub failed: usize,
  pub results: Vec<RunResult>,
}

#[derive(Clone)]
pub struct TestHarness {
  store: Arc<dyn DescriptorStore>,
  runtime: Arc<dyn ProblemRuntime>,
  templates: Arc<dyn TemplateRenderer>,
  access: Arc<dyn AccessPolicy>,
  registry: Arc<ResponseRegistry>,
}

impl TestHarness {
  pub fn new(
    store: Arc<dyn DescriptorStore>,
    runtime: Arc<dyn ProblemRuntime>,
    templates: Arc<dyn TemplateRenderer>,
    access: Arc<dyn AccessPolicy>,
    registry: Arc<ResponseRegistry>,
  ) -> Self {
    Self { store, runtime, templates, access, registry }
  }

  pub fn store(&self) -> &dyn DescriptorStore {
    self.store.as_ref()
  }

  fn open(&self, ctx: &RequestContext, location: &str) -> HarnessResult<ProblemDescriptor> {
    ensure_access(self.access.as_ref(), &ctx.user, location)?;
    self.store.get(location)
  }

  fn factory(&self) -> PreviewModuleFactory {
    PreviewModuleFactory::new(self.runtime.clone(), self.registry.clone())
  }

  fn hydrate_all(&self, module: &Arc<PreviewModule>, tests: &[TestRecord]) -> HarnessResult<Vec<ContentTest>> {
    tests.iter().map(|r| ContentTest::hydrate(r.clone(), module.clone())).collect()
  }

  /// Per-verdict HTML summary of every test on `location`.
  #[instrument(level = "info", skip(self, ctx), fields(user = %ctx.user))]
  pub fn summarize(&self, ctx: &RequestContext, location: &str) -> HarnessResult<String> {
    let descriptor = self.open(ctx, location)?;
    let module = match self.factory().build(&descriptor) {
      Ok(m) => m,
      Err(e) if descriptor.tests.is_empty() => {
        warn!(target: "content_testing", %location, error = %e, "Problem failed to build; no tests to summarize");
        return Ok(String::new());
      }
      Err(e) => return Err(e),
    };
    let tests = self.hydrate_all(&module, &descriptor.tests)?;
    let html = SummaryRenderer::new(self.templates.as_ref()).render(&module, &group_by_verdict(&tests), &ctx.csrf)?;
    info!(target: "content_testing", %location, tests = tests.len(), html_len = html.len(), "Summary rendered");
    Ok(html)
  }

  /// Create a test, or replace the one named by `submitted.id`.
  #[instrument(level = "info", skip(self, ctx, submitted), fields(user = %ctx.user, id = ?submitted.id))]
  pub fn upsert(&self, ctx: &RequestContext, location: &str, submitted: TestFields) -> HarnessResult<TestRecord> {
    let mut descriptor = self.open(ctx, location)?;
    let should_be: Verdict = submitted.should_be.parse()?;
    let response_dict: BTreeMap<String, String> = submitted
      .response_dict
      .into_iter()
      .map(|(k, v)| (strip_input_prefix(&k).to_string(), v))
      .collect();

    let module = self.factory().build(&descriptor)?;
    validate_bindings(&module, &response_dict)?;

    let input = RecordFields { response_dict, should_be };
    let store = TestStore::new(self.store.as_ref());
    match submitted.id {
      Some(id) => store.replace_at(&mut descriptor, id, input),
      None => store.add(&mut descriptor, input),
    }
  }

  #[instrument(level = "info", skip(self, ctx), fields(user = %ctx.user))]
  pub fn delete(&self, ctx: &RequestContext, location: &str, id: u64) -> HarnessResult<()> {
    let mut descriptor = self.open(ctx, location)?;
    TestStore::new(self.store.as_ref()).delete(&mut descriptor, id)
  }

  /// Run every test, persist the results in one write, and report them.
  #[instrument(level = "info", skip(self, ctx), fields(user = %ctx.user))]
  pub fn run_all(&self, ctx: &RequestContext, location: &str) -> HarnessResult<RunReport> {
    let mut descriptor = self.open(ctx, location)?;
    let module = self.factory().build(&descriptor)?;
    let mut tests = self.hydrate_all(&module, &descriptor.tests)?;

    let mut results = Vec::with_capacity(tests.len());
    for test in &mut tests {
      let verdict = test.run();
      results.push(RunResult {
        id: test.id(),
        should_be: test.should_be(),
        verdict,
        message: test.message().to_string(),
        passed: verdict == test.should_be(),
      });
    }
    let records = tests.iter().map(ContentTest::todict).collect();
    TestStore::new(self.store.as_ref()).replace_all(&mut descriptor, records)?;

    let passed = results.iter().filter(|r| r.passed).count();
    let report = RunReport {
      location: location.to_string(),
      total: results.len(),
      passed,
      failed: results.len() - passed,
      results,
    };
    info!(target: "content_testing", %location, total = report.total, passed = report.passed, failed = report.failed, "Tests run");
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::access::{AllowAll, StaffPolicy};
  use crate::error::HarnessError;
  use crate::runtime::capa::CapaRuntime;
  use crate::store::MemoryDescriptorStore;
  use crate::templates::HandlebarsTemplates;

  const PROBLEM: &str = r#"<problem><p>Six times seven?</p><customresponse id="r1" expect="42" cfn="numeric"><textline/></customresponse></problem>"#;

  fn harness(access: Arc<dyn AccessPolicy>) -> TestHarness {
    let registry = Arc::new(ResponseRegistry::default());
    let store = MemoryDescriptorStore::new();
    store.insert(ProblemDescriptor::new("demo", PROBLEM)).unwrap();
    store.insert(ProblemDescriptor::new("broken", "<problem>")).unwrap();
    TestHarness::new(
      Arc::new(store),
      Arc::new(CapaRuntime::new(registry.clone())),
      Arc::new(HandlebarsTemplates::new().unwrap()),
      access,
      registry,
    )
  }

  fn fields(id: Option<u64>, key: &str, answer: &str, should_be: &str) -> TestFields {
    TestFields {
      id,
      should_be: should_be.into(),
      response_dict: [(key.to_string(), answer.to_string())].into_iter().collect(),
    }
  }

  fn ctx() -> RequestContext {
    RequestContext::new("alice", "tok")
  }

  #[test]
  fn upsert_strips_marker_and_validates() {
    let h = harness(Arc::new(AllowAll));
    let r = h.upsert(&ctx(), "demo", fields(None, "input_r1_1", "42", "correct")).unwrap();
    assert_eq!(r.response_dict.keys().collect::<Vec<_>>(), ["r1_1"]);

    let bad_verdict = h.upsert(&ctx(), "demo", fields(None, "input_r1_1", "42", "maybe"));
    assert!(matches!(bad_verdict, Err(HarnessError::Invalid(_))));
    let unknown = h.upsert(&ctx(), "demo", fields(None, "input_r7_1", "42", "correct"));
    assert!(matches!(unknown, Err(HarnessError::Invalid(_))));
    let missing = h.upsert(&ctx(), "nope", fields(None, "input_r1_1", "42", "correct"));
    assert!(matches!(missing, Err(HarnessError::NotFound(_))));
    assert_eq!(h.store().get("demo").unwrap().tests.len(), 1);
  }

  #[test]
  fn upsert_rejects_orphan_and_aliased_keys() {
    let h = harness(Arc::new(AllowAll));
    for key in ["input_r1_9", "input_r1_01", "input_r1_+1"] {
      let res = h.upsert(&ctx(), "demo", fields(None, key, "42", "correct"));
      assert!(matches!(res, Err(HarnessError::Invalid(_))), "{} was stored", key);
    }
    let mut aliased = fields(None, "input_r1_1", "42", "correct");
    aliased.response_dict.insert("input_r1_01".into(), "41".into());
    assert!(matches!(h.upsert(&ctx(), "demo", aliased), Err(HarnessError::Invalid(_))));
    assert!(h.store().get("demo").unwrap().tests.is_empty());
  }

  #[test]
  fn access_is_checked_before_anything_else() {
    let h = harness(Arc::new(StaffPolicy::new(["bob"])));
    assert!(matches!(h.summarize(&ctx(), "nope"), Err(HarnessError::AccessDenied { .. })));
    assert!(matches!(h.delete(&ctx(), "demo", 0), Err(HarnessError::AccessDenied { .. })));
    assert!(matches!(h.run_all(&ctx(), "demo"), Err(HarnessError::AccessDenied { .. })));
  }

  #[test]
  fn broken_problem_without_tests_summarizes_to_nothing() {
    let h = harness(Arc::new(AllowAll));
    assert_eq!(h.summarize(&ctx(), "broken").unwrap(), "");
    assert!(matches!(h.run_all(&ctx(), "broken"), Err(HarnessError::Problem(_))));
  }

  #[test]
  fn run_all_reports_and_persists() {
    let h = harness(Arc::new(AllowAll));
    h.upsert(&ctx(), "demo", fields(None, "input_r1_1", "42", "correct")).unwrap();
    h.upsert(&ctx(), "demo", fields(None, "input_r1_1", "x", "correct")).unwrap();

    let report = h.run_all(&ctx(), "demo").unwrap();
    assert_eq!((report.total, report.passed, report.failed), (2, 1, 1));
    assert_eq!(report.results[0].id, 1);
    assert_eq!(report.results[0].verdict, Verdict::Error);

    let stored = h.store().get("demo").unwrap().tests;
    assert_eq!(stored[0].verdict, Some(Verdict::Error));
    assert!(!stored[0].message.is_empty());
    assert_eq!(stored[1].verdict, Some(Verdict::Correct));
    assert_eq!(h.run_all(&ctx(), "demo").unwrap(), report);
  }
}

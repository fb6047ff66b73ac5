//! Problem runtime seam: the harness builds problems through `ProblemRuntime`
//! and only talks to them through `Lcp`.

use std::collections::BTreeMap;

use crate::domain::{ProblemDescriptor, Verdict};
use crate::error::{GradingFailure, HarnessResult};
use crate::xml::XmlTree;

pub mod capa;
pub mod checks;

/// One response component of a built problem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Responder {
  pub id: String,
  pub tag: String,
  /// Bound input ids (`<id>_<k>`) in slot order.
  pub input_ids: Vec<String>,
}

/// Result of grading one submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GradeOutcome {
  pub verdict: Verdict,
  pub message: String,
  /// Bound input id -> per-input result.
  pub results: BTreeMap<String, Verdict>,
}

/// A built, gradeable, renderable problem instance.
pub trait Lcp: Send + Sync {
  /// Responders keyed by response id.
  fn responders(&self) -> &BTreeMap<String, Responder>;

  /// The preprocessed problem tree (response and input ids assigned).
  fn tree(&self) -> &XmlTree;

  /// Grade bound answers (`<response_id>_<k>` -> answer). Must not mutate the problem.
  fn grade(&self, answers: &BTreeMap<String, String>) -> Result<GradeOutcome, GradingFailure>;

  /// Render `tree` (the problem tree or a rewritten copy of it) to HTML.
  fn render_html_for(&self, tree: &XmlTree) -> HarnessResult<String>;

  fn render_html(&self) -> HarnessResult<String> {
    self.render_html_for(self.tree())
  }
}

pub trait ProblemRuntime: Send + Sync {
  fn new_lcp(&self, descriptor: &ProblemDescriptor) -> HarnessResult<Box<dyn Lcp>>;
}

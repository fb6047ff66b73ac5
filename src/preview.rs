//! Preview modules: one built problem per descriptor per request, shared by
//! every content test hydrated during that request.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::ProblemDescriptor;
use crate::error::{GradingFailure, HarnessResult};
use crate::registry::ResponseRegistry;
use crate::runtime::{GradeOutcome, Lcp, ProblemRuntime, Responder};
use crate::xml::XmlTree;

pub struct PreviewModule {
  location: String,
  lcp: Box<dyn Lcp>,
  registry: Arc<ResponseRegistry>,
}

impl PreviewModule {
  pub fn new(location: impl Into<String>, lcp: Box<dyn Lcp>, registry: Arc<ResponseRegistry>) -> Self {
    Self { location: location.into(), lcp, registry }
  }

  pub fn location(&self) -> &str {
    &self.location
  }

  /// Response kinds the problem was built with.
  pub fn registry(&self) -> &ResponseRegistry {
    &self.registry
  }

  pub fn responders(&self) -> &BTreeMap<String, Responder> {
    self.lcp.responders()
  }

  pub fn responder(&self, response_id: &str) -> Option<&Responder> {
    self.lcp.responders().get(response_id)
  }

  /// The shared problem tree. Callers that rewrite it must work on `clone_tree`.
  pub fn tree(&self) -> &XmlTree {
    self.lcp.tree()
  }

  pub fn clone_tree(&self) -> XmlTree {
    self.lcp.tree().clone()
  }

  pub fn grade(&self, answers: &BTreeMap<String, String>) -> Result<GradeOutcome, GradingFailure> {
    self.lcp.grade(answers)
  }

  pub fn render_html_for(&self, tree: &XmlTree) -> HarnessResult<String> {
    self.lcp.render_html_for(tree)
  }
}

/// Request-scoped builder; building the same descriptor twice returns the same module.
pub struct PreviewModuleFactory {
  runtime: Arc<dyn ProblemRuntime>,
  registry: Arc<ResponseRegistry>,
  built: RefCell<HashMap<String, Arc<PreviewModule>>>,
}

impl PreviewModuleFactory {
  pub fn new(runtime: Arc<dyn ProblemRuntime>, registry: Arc<ResponseRegistry>) -> Self {
    Self { runtime, registry, built: RefCell::new(HashMap::new()) }
  }

  #[instrument(level = "debug", skip(self, descriptor), fields(location = %descriptor.id))]
  pub fn build(&self, descriptor: &ProblemDescriptor) -> HarnessResult<Arc<PreviewModule>> {
    if let Some(module) = self.built.borrow().get(&descriptor.id) {
      return Ok(module.clone());
    }
    let lcp = self.runtime.new_lcp(descriptor)?;
    let module = Arc::new(PreviewModule::new(descriptor.id.clone(), lcp, self.registry.clone()));
    debug!(target: "content_testing", location = %descriptor.id, responders = module.responders().len(), "Preview module built");
    self.built.borrow_mut().insert(descriptor.id.clone(), module.clone());
    Ok(module)
  }
}

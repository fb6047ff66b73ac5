//! Application state: the configured harness and its collaborators.
//!
//! Built once at startup from `HarnessConfig`:
//!   - descriptor store (JSON directory or in-memory)
//!   - response registry from `response_tags`
//!   - handlebars templates with overrides
//!   - access policy (staff list or allow-all)
//! Configured problems and the built-in seeds are inserted without
//! overwriting stored descriptors.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::access::{AccessPolicy, AllowAll, StaffPolicy};
use crate::api::TestHarness;
use crate::config::HarnessConfig;
use crate::domain::ProblemDescriptor;
use crate::error::HarnessResult;
use crate::registry::ResponseRegistry;
use crate::runtime::capa::CapaRuntime;
use crate::seeds::seed_problems;
use crate::store::{DescriptorStore, JsonDirDescriptorStore, MemoryDescriptorStore};
use crate::templates::HandlebarsTemplates;

#[derive(Clone)]
pub struct AppState {
  pub harness: TestHarness,
}

impl AppState {
  #[instrument(level = "info", skip_all)]
  pub fn from_config(cfg: &HarnessConfig) -> HarnessResult<Self> {
    let registry = Arc::new(ResponseRegistry::from_tags(&cfg.response_tags)?);
    info!(target: "content_testing_backend", tags = ?registry.tags().collect::<Vec<_>>(), "Response registry ready");

    let store: Arc<dyn DescriptorStore> = match &cfg.store_dir {
      Some(dir) => Arc::new(JsonDirDescriptorStore::open(dir.clone())?),
      None => {
        warn!(target: "content_testing_backend", "No store_dir configured; tests live in memory only");
        Arc::new(MemoryDescriptorStore::new())
      }
    };

    let access: Arc<dyn AccessPolicy> = match &cfg.staff {
      Some(users) => {
        info!(target: "content_testing_backend", staff = users.len(), "Staff-only access");
        Arc::new(StaffPolicy::new(users.iter().cloned()))
      }
      None => Arc::new(AllowAll),
    };

    let templates = Arc::new(HandlebarsTemplates::with_overrides(&cfg.templates)?);
    let runtime = Arc::new(CapaRuntime::new(registry.clone()));

    let configured = cfg.problems.iter().map(|p| ProblemDescriptor::new(p.id.clone(), p.data.clone()));
    let mut seeded = 0usize;
    for d in configured.chain(seed_problems()) {
      let id = d.id.clone();
      if store.insert_if_absent(d)? {
        seeded += 1;
      } else {
        info!(target: "content_testing_backend", %id, "Problem already stored; keeping it");
      }
    }
    info!(target: "content_testing_backend", seeded, "Startup problem inventory");

    Ok(Self { harness: TestHarness::new(store, runtime, templates, access, registry) })
  }
}

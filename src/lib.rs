//! Content testing harness for interactive problems.
//!
//! Authors attach test cases (answers plus the expected verdict) to a problem.
//! The harness persists them on the problem descriptor, replays them through
//! the problem's own grader, and renders per-verdict summaries through the
//! problem's own HTML so the answer widgets double as the test-creation form.
//!
//! The core (`api::TestHarness` and below) is synchronous and transport
//! agnostic; `routes` exposes it over axum.

pub mod access;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod preview;
pub mod protocol;
pub mod registry;
pub mod routes;
pub mod runtime;
pub mod seeds;
pub mod state;
pub mod store;
pub mod summary;
pub mod telemetry;
pub mod templates;
pub mod util;
pub mod xml;

pub use api::{RequestContext, RunReport, TestHarness};
pub use domain::{ProblemDescriptor, TestFields, TestRecord, Verdict};
pub use error::{HarnessError, HarnessResult};

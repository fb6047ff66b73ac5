//! Templates used by the summary renderer.
//!
//! Three names are fixed: `test_summaries`, `response_summary`, `test_form`.
//! Defaults ship here; each can be overridden from configuration.
//! `response_summary` and `test_form` must render to a single XML element,
//! since their output is grafted into the problem tree.

use handlebars::Handlebars;
use serde_json::Value;
use tracing::info;

use crate::config::TemplateOverrides;
use crate::error::{HarnessError, HarnessResult};

pub const TEST_SUMMARIES: &str = "test_summaries";
pub const RESPONSE_SUMMARY: &str = "response_summary";
pub const TEST_FORM: &str = "test_form";

const DEFAULT_TEST_SUMMARIES: &str = r#"<div class="content-tests" data-location="{{location}}" data-csrf="{{csrf}}"><section class="test-summary-group" data-verdict="correct"><h3>Should be correct</h3>{{{summaries.correct}}}</section><section class="test-summary-group" data-verdict="incorrect"><h3>Should be incorrect</h3>{{{summaries.incorrect}}}</section><section class="test-summary-group" data-verdict="error"><h3>Should raise an error</h3>{{{summaries.error}}}</section></div>"#;

const DEFAULT_RESPONSE_SUMMARY: &str = r#"<div class="response-summary" data-test-id="{{id}}"><ol class="answers">{{#each answers}}<li>{{this}}</li>{{/each}}</ol><p class="message">{{msg}}</p><button type="button" class="delete-test" data-test-id="{{id}}">Delete</button></div>"#;

const DEFAULT_TEST_FORM: &str = r#"<form class="create-test-form" method="post" data-location="{{location}}"><input type="hidden" name="should_be" value="{{should_be}}"/><input type="hidden" name="csrfmiddlewaretoken" value="{{csrf}}"/><input type="submit" value="Add {{should_be}} test"/></form>"#;

pub trait TemplateRenderer: Send + Sync {
  fn render(&self, name: &str, context: &Value) -> HarnessResult<String>;
}

pub struct HandlebarsTemplates {
  registry: Handlebars<'static>,
}

impl HandlebarsTemplates {
  pub fn new() -> HarnessResult<Self> {
    Self::with_overrides(&TemplateOverrides::default())
  }

  pub fn with_overrides(overrides: &TemplateOverrides) -> HarnessResult<Self> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);

    let entries = [
      (TEST_SUMMARIES, overrides.test_summaries.as_deref(), DEFAULT_TEST_SUMMARIES),
      (RESPONSE_SUMMARY, overrides.response_summary.as_deref(), DEFAULT_RESPONSE_SUMMARY),
      (TEST_FORM, overrides.test_form.as_deref(), DEFAULT_TEST_FORM),
    ];
    for (name, custom, default) in entries {
      if custom.is_some() {
        info!(target: "content_testing", template = name, "Using configured template override");
      }
      registry
        .register_template_string(name, custom.unwrap_or(default))
        .map_err(|e| HarnessError::Template(format!("{}: {}", name, e)))?;
    }
    Ok(Self { registry })
  }
}

impl TemplateRenderer for HandlebarsTemplates {
  fn render(&self, name: &str, context: &Value) -> HarnessResult<String> {
    Ok(self.registry.render(name, context)?)
  }
}

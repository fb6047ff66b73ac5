//! Loading harness configuration (store location, response tags, staff list,
//! template overrides, seeded problems) from TOML.
//!
//! See `HarnessConfig` for the expected schema.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{error, info};

use crate::registry::CUSTOM_RESPONSE;

#[derive(Clone, Debug, Deserialize)]
pub struct HarnessConfig {
  /// JSON-file descriptor store directory; in-memory store when absent.
  #[serde(default)]
  pub store_dir: Option<PathBuf>,
  #[serde(default = "default_response_tags")]
  pub response_tags: Vec<String>,
  /// Users allowed to author tests; everyone when absent.
  #[serde(default)]
  pub staff: Option<Vec<String>>,
  #[serde(default)]
  pub templates: TemplateOverrides,
  #[serde(default)]
  pub problems: Vec<ProblemCfg>,
}

impl Default for HarnessConfig {
  fn default() -> Self {
    Self {
      store_dir: None,
      response_tags: default_response_tags(),
      staff: None,
      templates: TemplateOverrides::default(),
      problems: Vec::new(),
    }
  }
}

fn default_response_tags() -> Vec<String> {
  vec![CUSTOM_RESPONSE.to_string()]
}

/// Handlebars sources replacing the built-in templates.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TemplateOverrides {
  #[serde(default)] pub test_summaries: Option<String>,
  #[serde(default)] pub response_summary: Option<String>,
  #[serde(default)] pub test_form: Option<String>,
}

/// Problem seeded into the store at startup. Stored problems with the same id win.
#[derive(Clone, Debug, Deserialize)]
pub struct ProblemCfg {
  pub id: String,
  pub data: String,
}

pub fn load_config(path: &Path) -> Option<HarnessConfig> {
  let shown = path.display();
  match std::fs::read_to_string(path) {
    Ok(s) => match toml::from_str::<HarnessConfig>(&s) {
      Ok(cfg) => {
        info!(target: "content_testing_backend", path = %shown, problems = cfg.problems.len(), "Loaded harness config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "content_testing_backend", path = %shown, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "content_testing_backend", path = %shown, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

/// Attempt to load `HarnessConfig` from HARNESS_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<HarnessConfig> {
  let path = std::env::var("HARNESS_CONFIG_PATH").ok()?;
  load_config(Path::new(&path))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn empty_file_yields_defaults() {
    let cfg: HarnessConfig = toml::from_str("").unwrap();
    assert_eq!(cfg.response_tags, ["customresponse"]);
    assert!(cfg.store_dir.is_none() && cfg.staff.is_none() && cfg.problems.is_empty());
    assert!(cfg.templates.test_form.is_none());
  }

  #[test]
  fn loads_full_config_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harness.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(
      f,
      r#"
store_dir = "/tmp/problems"
response_tags = ["customresponse", "stringresponse"]
staff = ["alice"]

[templates]
test_form = "<form>{{{{should_be}}}}</form>"

[[problems]]
id = "demo"
data = "<problem/>"
"#
    )
    .unwrap();

    let cfg = load_config(&path).unwrap();
    assert_eq!(cfg.store_dir.as_deref(), Some(Path::new("/tmp/problems")));
    assert_eq!(cfg.response_tags.len(), 2);
    assert_eq!(cfg.staff.as_deref(), Some(&["alice".to_string()][..]));
    assert_eq!(cfg.templates.test_form.as_deref(), Some("<form>{{should_be}}</form>"));
    assert_eq!(cfg.problems[0].id, "demo");
  }

  #[test]
  fn unreadable_or_invalid_config_is_none() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_config(&dir.path().join("missing.toml")).is_none());
    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, "response_tags = 7").unwrap();
    assert!(load_config(&bad).is_none());
  }
}

//! Per-verdict test summaries rendered through the problem itself.
//!
//! For each verdict the problem tree is cloned and every response node is
//! rewritten into a summary container holding the prompt that precedes the
//! response, one fragment per test expecting that verdict, and a creation form
//! wrapping the response's own input widgets. The rewritten tree is rendered
//! by the problem, and the per-verdict fragments are assembled by the
//! `test_summaries` template.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use crate::content_test::ContentTest;
use crate::domain::Verdict;
use crate::error::{HarnessError, HarnessResult};
use crate::preview::PreviewModule;
use crate::templates::{TemplateRenderer, RESPONSE_SUMMARY, TEST_FORM, TEST_SUMMARIES};
use crate::xml::{NodeId, XmlTree};

/// Group tests by expected verdict, keeping their relative order.
pub fn group_by_verdict(tests: &[ContentTest]) -> BTreeMap<Verdict, Vec<&ContentTest>> {
  let mut grouped: BTreeMap<Verdict, Vec<&ContentTest>> = BTreeMap::new();
  for t in tests {
    grouped.entry(t.should_be()).or_default().push(t);
  }
  grouped
}

/// The prompt of a response: its closest preceding element sibling, or the
/// closest preceding sibling of the nearest ancestor that has one. Siblings
/// that are or hold a response are skipped, so one response never becomes
/// another's prompt. Walks at most `depth(node)` parents.
pub fn extract_prompt(tree: &XmlTree, node: NodeId, is_response: impl Fn(&str) -> bool) -> Option<NodeId> {
  let holds_response = |n: NodeId| {
    std::iter::once(n)
      .chain(tree.descendant_elements(n))
      .any(|d| tree.tag(d).map_or(false, &is_response))
  };
  let mut cur = node;
  for _ in 0..=tree.depth(node) {
    let mut prev = tree.previous_element_sibling(cur);
    while let Some(p) = prev {
      if !holds_response(p) {
        return Some(p);
      }
      prev = tree.previous_element_sibling(p);
    }
    cur = tree.parent(cur)?;
  }
  None
}

pub fn summary_container_id(response_id: &str, verdict: Verdict) -> String {
  format!("{}_test_summary_{}", response_id, verdict)
}

pub struct ResponseAggregator<'a> {
  templates: &'a dyn TemplateRenderer,
}

impl<'a> ResponseAggregator<'a> {
  pub fn new(templates: &'a dyn TemplateRenderer) -> Self {
    Self { templates }
  }

  /// One `response_summary` fragment per test whose response `response_id`
  /// carries a non-empty answer, in test order.
  pub fn aggregate(&self, response_id: &str, tests: &[&ContentTest]) -> HarnessResult<Vec<String>> {
    let mut fragments = Vec::new();
    for test in tests {
      for response in test.responses().iter().filter(|r| r.string_id == response_id) {
        if !response.has_answers() {
          continue;
        }
        let ctx = json!({
          "answers": response.answers(),
          "msg": test.message(),
          "id": test.id(),
        });
        fragments.push(self.templates.render(RESPONSE_SUMMARY, &ctx)?);
      }
    }
    Ok(fragments)
  }
}

pub struct SummaryRenderer<'a> {
  templates: &'a dyn TemplateRenderer,
}

impl<'a> SummaryRenderer<'a> {
  pub fn new(templates: &'a dyn TemplateRenderer) -> Self {
    Self { templates }
  }

  #[instrument(level = "debug", skip_all, fields(location = %module.location()))]
  pub fn render(
    &self,
    module: &PreviewModule,
    tests_by_verdict: &BTreeMap<Verdict, Vec<&ContentTest>>,
    csrf: &str,
  ) -> HarnessResult<String> {
    let mut summaries = Map::new();
    for verdict in Verdict::ALL {
      let tests = tests_by_verdict.get(&verdict).map(Vec::as_slice).unwrap_or(&[]);
      let html = self.render_verdict(module, verdict, tests, csrf)?;
      summaries.insert(verdict.as_str().to_string(), Value::String(html));
    }
    let ctx = json!({
      "summaries": summaries,
      "location": module.location(),
      "csrf": csrf,
    });
    self.templates.render(TEST_SUMMARIES, &ctx)
  }

  fn render_verdict(
    &self,
    module: &PreviewModule,
    verdict: Verdict,
    tests: &[&ContentTest],
    csrf: &str,
  ) -> HarnessResult<String> {
    let aggregator = ResponseAggregator::new(self.templates);
    let mut tree = module.clone_tree();
    let root = tree.root();

    // Prompts are resolved against the untouched clone before any response moves.
    let is_response = |t: &str| module.registry().is_response_tag(t);
    let targets: Vec<(NodeId, Option<NodeId>)> = tree
      .descendant_elements(root)
      .into_iter()
      .filter(|n| tree.tag(*n).map_or(false, is_response))
      .map(|n| (n, extract_prompt(&tree, n, is_response)))
      .collect();
    let targets: Vec<(NodeId, Option<NodeId>)> = targets
      .into_iter()
      .map(|(n, prompt)| (n, prompt.map(|p| tree.duplicate(p))))
      .collect();

    let mut containers = Vec::with_capacity(targets.len());
    for (node, prompt) in targets {
      let response_id = tree.attr(node, "id").unwrap_or_default().to_string();
      let container_id = summary_container_id(&response_id, verdict);
      let container = tree.create_element("div", &[("id", container_id.as_str()), ("class", "test-summary")]);
      if let Some(p) = prompt {
        tree.append_child(container, p);
      }

      for fragment in aggregator.aggregate(&response_id, tests)? {
        let frag = parse_fragment(RESPONSE_SUMMARY, &fragment)?;
        let n = tree.import(&frag, frag.root());
        tree.append_child(container, n);
      }

      let form_html = self.templates.render(
        TEST_FORM,
        &json!({"location": module.location(), "should_be": verdict.as_str(), "csrf": csrf}),
      )?;
      let form_tree = parse_fragment(TEST_FORM, &form_html)?;
      let form = tree.import(&form_tree, form_tree.root());
      // The live response goes first so its widgets keep their ids and scripts.
      tree.insert_child(form, 0, node);
      tree.append_child(container, form);
      containers.push(container);
    }

    tree.clear_children(root);
    for c in containers {
      tree.append_child(root, c);
    }
    debug!(target: "content_testing", %verdict, tests = tests.len(), "Rendering verdict summary");
    module.render_html_for(&tree)
  }
}

fn parse_fragment(template: &str, html: &str) -> HarnessResult<XmlTree> {
  XmlTree::parse(html).map_err(|e| HarnessError::Template(format!("{} did not render a single element: {}", template, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{ProblemDescriptor, TestRecord};
  use crate::preview::PreviewModuleFactory;
  use crate::registry::ResponseRegistry;
  use crate::runtime::capa::CapaRuntime;
  use crate::templates::HandlebarsTemplates;
  use std::sync::Arc;

  const PROBLEM: &str = r#"<problem><p>Six times seven?</p><customresponse id="r1" expect="42"><textline/></customresponse></problem>"#;

  fn module(xml: &str) -> Arc<PreviewModule> {
    let registry = Arc::new(ResponseRegistry::default());
    let factory = PreviewModuleFactory::new(Arc::new(CapaRuntime::new(registry.clone())), registry);
    factory.build(&ProblemDescriptor::new("demo", xml)).unwrap()
  }

  fn content_test(module: &Arc<PreviewModule>, id: u64, answer: &str, should_be: Verdict) -> ContentTest {
    let record = TestRecord {
      id,
      location: "demo".into(),
      response_dict: [("r1_1".to_string(), answer.to_string())].into_iter().collect(),
      should_be,
      message: String::new(),
      verdict: None,
    };
    ContentTest::hydrate(record, module.clone()).unwrap()
  }

  #[test]
  fn prompt_walks_up_to_an_ancestor_sibling() {
    let tree = XmlTree::parse("<problem><p>Q</p><div><span><customresponse/></span></div></problem>").unwrap();
    let resp = tree.descendant_elements(tree.root())[3];
    assert_eq!(tree.tag(resp), Some("customresponse"));
    let prompt = extract_prompt(&tree, resp, is_custom).unwrap();
    assert_eq!(tree.serialize(prompt, crate::xml::Style::Xml), "<p>Q</p>");

    let bare = XmlTree::parse("<problem><customresponse/></problem>").unwrap();
    let resp = bare.descendant_elements(bare.root())[0];
    assert_eq!(extract_prompt(&bare, resp, is_custom), None);
  }

  fn is_custom(tag: &str) -> bool {
    tag == "customresponse"
  }

  const BACK_TO_BACK: &str = r#"<problem><p>Q</p><customresponse id="a" expect="1"><textline/></customresponse><customresponse id="b" expect="2"><textline/></customresponse></problem>"#;

  #[test]
  fn prompt_skips_sibling_responses() {
    let tree = XmlTree::parse(BACK_TO_BACK).unwrap();
    let b = tree.descendant_elements(tree.root())[3];
    assert_eq!(tree.attr(b, "id"), Some("b"));
    let prompt = extract_prompt(&tree, b, is_custom).unwrap();
    assert_eq!(tree.tag(prompt), Some("p"));

    // A wrapper holding a response is not a prompt either.
    let tree = XmlTree::parse("<problem><div><customresponse/></div><customresponse/></problem>").unwrap();
    let last = tree.descendant_elements(tree.root())[2];
    assert_eq!(extract_prompt(&tree, last, is_custom), None);
  }

  #[test]
  fn back_to_back_responses_render_without_duplicate_ids() {
    let m = module(BACK_TO_BACK);
    let templates = HandlebarsTemplates::new().unwrap();
    let html = SummaryRenderer::new(&templates).render(&m, &BTreeMap::new(), "tok").unwrap();
    assert_eq!(html.matches(r#"id="a""#).count(), 3);
    assert_eq!(html.matches(r#"id="input_a_1""#).count(), 3);
    assert_eq!(html.matches(r#"id="b""#).count(), 3);
    assert_eq!(html.matches("<p>Q</p>").count(), 6);
  }

  #[test]
  fn aggregator_skips_empty_responses_and_keeps_order() {
    let m = module(PROBLEM);
    let templates = HandlebarsTemplates::new().unwrap();
    let a = content_test(&m, 2, "42", Verdict::Correct);
    let blank = content_test(&m, 1, "  ", Verdict::Correct);
    let b = content_test(&m, 0, "41", Verdict::Correct);
    let frags = ResponseAggregator::new(&templates).aggregate("r1", &[&a, &blank, &b]).unwrap();
    assert_eq!(frags.len(), 2);
    assert!(frags[0].contains("<li>42</li>") && frags[0].contains(r#"data-test-id="2""#));
    assert!(frags[1].contains("<li>41</li>"));
    assert!(ResponseAggregator::new(&templates).aggregate("r2", &[&a]).unwrap().is_empty());
  }

  #[test]
  fn renders_one_section_per_verdict_with_forms() {
    let m = module(PROBLEM);
    let templates = HandlebarsTemplates::new().unwrap();
    let tests = vec![content_test(&m, 0, "42", Verdict::Correct)];
    let html = SummaryRenderer::new(&templates).render(&m, &group_by_verdict(&tests), "tok").unwrap();

    for v in Verdict::ALL {
      assert!(html.contains(&format!(r#"id="r1_test_summary_{}""#, v)), "{v}");
      assert!(html.contains(&format!(r#"name="should_be" value="{}""#, v)));
    }
    assert_eq!(html.matches(r#"class="response-summary""#).count(), 1);
    assert_eq!(html.matches("<p>Six times seven?</p>").count(), 3);
    // The response widget sits at the top of each form.
    assert!(html.contains(r#"<form class="create-test-form" method="post" data-location="demo"><div class="customresponse" id="r1"><input type="text" name="input_r1_1""#));
    let correct = html.find("r1_test_summary_correct").unwrap();
    let incorrect = html.find("r1_test_summary_incorrect").unwrap();
    let error = html.find("r1_test_summary_error").unwrap();
    assert!(correct < incorrect && incorrect < error);
  }

  #[test]
  fn rendering_is_repeatable_and_leaves_module_untouched() {
    let m = module(PROBLEM);
    let before = m.tree().to_xml();
    let templates = HandlebarsTemplates::new().unwrap();
    let tests = vec![content_test(&m, 0, "1", Verdict::Incorrect)];
    let r = SummaryRenderer::new(&templates);
    let first = r.render(&m, &group_by_verdict(&tests), "tok").unwrap();
    let second = r.render(&m, &group_by_verdict(&tests), "tok").unwrap();
    assert_eq!(first, second);
    assert_eq!(m.tree().to_xml(), before);
  }
}

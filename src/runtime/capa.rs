//! Built-in problem runtime for capa-style problem XML.
//!
//! Building a problem assigns ids the way the courseware does: responders keep
//! their `id` attribute or get `<problem_id>_<n>`, and each text input inside a
//! responder becomes `<response_id>_<k>`. Grading is per input slot against
//! the responder's expected value.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::{InputKey, ProblemDescriptor, Verdict, INPUT_PREFIX};
use crate::error::{GradingFailure, HarnessError, HarnessResult};
use crate::registry::{ResponseRegistry, CUSTOM_RESPONSE, NUMERICAL_RESPONSE, STRING_RESPONSE};
use crate::runtime::checks::Check;
use crate::runtime::{GradeOutcome, Lcp, ProblemRuntime, Responder};
use crate::xml::{NodeId, Style, XmlTree};

/// Problem semantics that never reach the learner.
const HIDDEN_TAGS: &[&str] = &["answer", "solution", "responseparam", "additional_answer"];

pub struct CapaRuntime {
  registry: Arc<ResponseRegistry>,
}

impl CapaRuntime {
  pub fn new(registry: Arc<ResponseRegistry>) -> Self {
    Self { registry }
  }
}

impl ProblemRuntime for CapaRuntime {
  fn new_lcp(&self, descriptor: &ProblemDescriptor) -> HarnessResult<Box<dyn Lcp>> {
    let problem = CapaProblem::build(&descriptor.id, &descriptor.data, self.registry.clone())?;
    Ok(Box::new(problem))
  }
}

#[derive(Clone, Debug)]
struct Scorer {
  check: Check,
  expected: String,
  /// Compare lowercased answers (expected is stored lowercased).
  fold_case: bool,
}

pub struct CapaProblem {
  tree: XmlTree,
  responders: BTreeMap<String, Responder>,
  scorers: BTreeMap<String, Scorer>,
  registry: Arc<ResponseRegistry>,
}

impl CapaProblem {
  #[instrument(level = "debug", skip(data, registry), fields(data_len = data.len()))]
  pub fn build(problem_id: &str, data: &str, registry: Arc<ResponseRegistry>) -> HarnessResult<Self> {
    let mut tree = XmlTree::parse(data).map_err(|e| HarnessError::Problem(format!("{}: {}", problem_id, e)))?;

    let response_nodes: Vec<NodeId> = tree
      .descendant_elements(tree.root())
      .into_iter()
      .filter(|n| tree.tag(*n).map_or(false, |t| registry.is_response_tag(t)))
      .collect();

    let mut responders = BTreeMap::new();
    let mut scorers = BTreeMap::new();
    for (n, node) in response_nodes.into_iter().enumerate() {
      let tag = tree.tag(node).unwrap_or_default().to_string();
      let id = match tree.attr(node, "id") {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => format!("{}_{}", problem_id, n + 1),
      };
      if responders.contains_key(&id) {
        return Err(HarnessError::Problem(format!("duplicate response id '{}'", id)));
      }
      tree.set_attr(node, "id", &id);

      let slots: Vec<NodeId> = tree
        .descendant_elements(node)
        .into_iter()
        .filter(|c| tree.tag(*c).map_or(false, |t| registry.is_input_tag(t)))
        .collect();
      let mut input_ids = Vec::with_capacity(slots.len());
      for (k, slot) in slots.into_iter().enumerate() {
        let input_id = format!("{}_{}", id, k + 1);
        tree.set_attr(slot, "id", &input_id);
        input_ids.push(input_id);
      }

      let scorer = scorer_for(&tree, node, &tag).map_err(|e| HarnessError::Problem(format!("response '{}': {}", id, e)))?;
      scorers.insert(id.clone(), scorer);
      responders.insert(id.clone(), Responder { id, tag, input_ids });
    }

    debug!(target: "content_testing", %problem_id, responders = responders.len(), "Built problem");
    Ok(Self { tree, responders, scorers, registry })
  }

  fn render_node(&self, src: &XmlTree, id: NodeId, out: &mut XmlTree) -> Option<NodeId> {
    let Some(tag) = src.tag(id) else {
      return Some(out.import(src, id));
    };

    if HIDDEN_TAGS.contains(&tag) {
      return None;
    }
    if tag == "script" && !src.attr(id, "type").map_or(false, |t| t.contains("javascript")) {
      return None;
    }

    let node = if self.registry.is_input_tag(tag) {
      let input_id = src.attr(id, "id").unwrap_or_default();
      let name = format!("{}{}", INPUT_PREFIX, input_id);
      if tag == "textbox" {
        return Some(out.create_element("textarea", &[("name", name.as_str()), ("id", name.as_str())]));
      }
      let size = src.attr(id, "size").unwrap_or("20");
      return Some(out.create_element(
        "input",
        &[("type", "text"), ("name", name.as_str()), ("id", name.as_str()), ("size", size), ("value", "")],
      ));
    } else if tag == "problem" {
      out.create_element("div", &[("class", "problem")])
    } else if self.registry.is_response_tag(tag) {
      let rid = src.attr(id, "id").unwrap_or_default();
      out.create_element("div", &[("class", tag), ("id", rid)])
    } else {
      let attrs: Vec<(&str, &str)> = src.attrs(id).iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
      out.create_element(tag, &attrs)
    };

    for child in src.children(id) {
      if let Some(c) = self.render_node(src, *child, out) {
        out.append_child(node, c);
      }
    }
    Some(node)
  }
}

fn scorer_for(tree: &XmlTree, node: NodeId, tag: &str) -> Result<Scorer, String> {
  match tag {
    CUSTOM_RESPONSE => {
      let expected = tree
        .attr(node, "expect")
        .or_else(|| tree.attr(node, "answer"))
        .ok_or_else(|| "missing 'expect' attribute".to_string())?;
      let check = Check::from_cfn(tree.attr(node, "cfn"), tree.attr(node, "tolerance"))?;
      Ok(Scorer { check, expected: expected.to_string(), fold_case: false })
    }
    STRING_RESPONSE => {
      let expected = tree.attr(node, "answer").ok_or_else(|| "missing 'answer' attribute".to_string())?;
      let mut alternatives = vec![expected.to_string()];
      for c in tree.element_children(node) {
        if tree.tag(c) == Some("additional_answer") {
          if let Some(a) = tree.attr(c, "answer") {
            alternatives.push(a.to_string());
          }
        }
      }
      let fold_case = tree.attr(node, "type").map_or(false, |t| t.split_whitespace().any(|w| w == "ci"));
      if fold_case {
        alternatives.iter_mut().for_each(|a| *a = a.to_lowercase());
      }
      let check = if alternatives.len() == 1 { Check::Exact } else { Check::OneOf };
      Ok(Scorer { check, expected: alternatives.join("|"), fold_case })
    }
    NUMERICAL_RESPONSE => {
      let expected = tree.attr(node, "answer").ok_or_else(|| "missing 'answer' attribute".to_string())?;
      let tolerance = tree
        .element_children(node)
        .find(|c| tree.tag(*c) == Some("responseparam") && tree.attr(*c, "type") == Some("tolerance"))
        .and_then(|c| tree.attr(c, "default"));
      let check = Check::from_cfn(Some("numeric"), tolerance)?;
      Ok(Scorer { check, expected: expected.to_string(), fold_case: false })
    }
    other => Err(format!("no grader for <{}>", other)),
  }
}

impl Lcp for CapaProblem {
  fn responders(&self) -> &BTreeMap<String, Responder> {
    &self.responders
  }

  fn tree(&self) -> &XmlTree {
    &self.tree
  }

  fn grade(&self, answers: &BTreeMap<String, String>) -> Result<GradeOutcome, GradingFailure> {
    let mut touched = BTreeSet::new();
    for key in answers.keys() {
      let parsed = InputKey::parse(key).map_err(|e| GradingFailure(e.to_string()))?;
      let responder = self
        .responders
        .get(&parsed.response_id)
        .ok_or_else(|| GradingFailure(format!("no response '{}' in problem", parsed.response_id)))?;
      if !responder.input_ids.contains(key) {
        return Err(GradingFailure(format!("no input slot '{}' in response '{}'", key, responder.id)));
      }
      touched.insert(responder.id.as_str());
    }

    let mut results = BTreeMap::new();
    for rid in touched {
      let (Some(responder), Some(scorer)) = (self.responders.get(rid), self.scorers.get(rid)) else {
        continue;
      };
      for input_id in &responder.input_ids {
        let answer = answers
          .get(input_id)
          .ok_or_else(|| GradingFailure(format!("error getting student answer for '{}'", input_id)))?;
        let ok = if scorer.fold_case {
          scorer.check.evaluate(&scorer.expected, &answer.to_lowercase())?
        } else {
          scorer.check.evaluate(&scorer.expected, answer)?
        };
        results.insert(input_id.clone(), if ok { Verdict::Correct } else { Verdict::Incorrect });
      }
    }

    let verdict = if !results.is_empty() && results.values().all(|v| *v == Verdict::Correct) {
      Verdict::Correct
    } else {
      Verdict::Incorrect
    };
    Ok(GradeOutcome { verdict, message: String::new(), results })
  }

  fn render_html_for(&self, tree: &XmlTree) -> HarnessResult<String> {
    let mut out = XmlTree::new("div");
    let root = out.root();
    out.set_attr(root, "class", "problems-wrapper");
    if let Some(body) = self.render_node(tree, tree.root(), &mut out) {
      out.append_child(root, body);
    }
    Ok(out.serialize(root, Style::Html))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn registry() -> Arc<ResponseRegistry> {
    Arc::new(ResponseRegistry::from_tags(&["customresponse", "stringresponse", "numericalresponse"]).unwrap())
  }

  fn answers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  const TWO_PARTS: &str = r#"<problem>
  <p>Six times seven?</p>
  <customresponse id="r1" expect="42"><textline/></customresponse>
  <p>Name two primary colours.</p>
  <customresponse cfn="one_of" expect="red|blue|yellow"><textline/><textline/></customresponse>
</problem>"#;

  #[test]
  fn assigns_response_and_input_ids() {
    let p = CapaProblem::build("demo", TWO_PARTS, registry()).unwrap();
    let ids: Vec<_> = p.responders().keys().cloned().collect();
    assert_eq!(ids, vec!["demo_2".to_string(), "r1".to_string()]);
    assert_eq!(p.responders()["r1"].input_ids, vec!["r1_1"]);
    assert_eq!(p.responders()["demo_2"].input_ids, vec!["demo_2_1", "demo_2_2"]);
    assert!(p.tree().to_xml().contains(r#"<textline id="demo_2_2"/>"#));
  }

  #[test]
  fn grades_only_touched_responders() {
    let p = CapaProblem::build("demo", TWO_PARTS, registry()).unwrap();
    let out = p.grade(&answers(&[("r1_1", "42")])).unwrap();
    assert_eq!(out.verdict, Verdict::Correct);
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.message, "");

    let out = p.grade(&answers(&[("r1_1", "42"), ("demo_2_1", "red"), ("demo_2_2", "green")])).unwrap();
    assert_eq!(out.verdict, Verdict::Incorrect);
    assert_eq!(out.results["demo_2_2"], Verdict::Incorrect);
    assert_eq!(out.results["r1_1"], Verdict::Correct);
  }

  #[test]
  fn missing_slot_and_unknown_input_fail_grading() {
    let p = CapaProblem::build("demo", TWO_PARTS, registry()).unwrap();
    assert!(p.grade(&answers(&[("demo_2_1", "red")])).is_err());
    assert!(p.grade(&answers(&[("r1_9", "1")])).is_err());
    assert!(p.grade(&answers(&[("zz_1", "1")])).is_err());
  }

  #[test]
  fn string_and_numerical_responses() {
    let xml = r#"<problem>
      <stringresponse id="s" answer="Paris" type="ci"><additional_answer answer="Lutetia"/><textline/></stringresponse>
      <numericalresponse id="n" answer="9.81"><responseparam type="tolerance" default="0.1"/><textline/></numericalresponse>
    </problem>"#;
    let p = CapaProblem::build("geo", xml, registry()).unwrap();
    assert_eq!(p.grade(&answers(&[("s_1", "LUTETIA")])).unwrap().verdict, Verdict::Correct);
    assert_eq!(p.grade(&answers(&[("s_1", "London")])).unwrap().verdict, Verdict::Incorrect);
    assert_eq!(p.grade(&answers(&[("n_1", "9.9")])).unwrap().verdict, Verdict::Correct);
    let failure = p.grade(&answers(&[("n_1", "g")])).unwrap_err();
    assert!(failure.0.contains("'g'"));
  }

  #[test]
  fn build_rejects_bad_definitions() {
    let reg = registry();
    assert!(matches!(CapaProblem::build("x", "<problem>", reg.clone()), Err(HarnessError::Problem(_))));
    let no_expect = "<problem><customresponse><textline/></customresponse></problem>";
    assert!(CapaProblem::build("x", no_expect, reg.clone()).is_err());
    let bad_cfn = r#"<problem><customresponse expect="1" cfn="eval"><textline/></customresponse></problem>"#;
    assert!(CapaProblem::build("x", bad_cfn, reg.clone()).is_err());
    let dup = r#"<problem><customresponse id="a" expect="1"/><customresponse id="a" expect="2"/></problem>"#;
    assert!(CapaProblem::build("x", dup, reg).is_err());
  }

  #[test]
  fn renders_inputs_and_hides_answers() {
    let xml = r#"<problem><p>Q</p><customresponse id="r1" expect="42"><textline size="5"/><solution>42</solution></customresponse></problem>"#;
    let p = CapaProblem::build("demo", xml, registry()).unwrap();
    let html = p.render_html().unwrap();
    assert_eq!(
      html,
      r#"<div class="problems-wrapper"><div class="problem"><p>Q</p><div class="customresponse" id="r1"><input type="text" name="input_r1_1" id="input_r1_1" size="5" value=""/></div></div></div>"#
    );
  }
}

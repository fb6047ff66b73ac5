//! Built-in problems so a fresh service has something to author tests against.

use crate::domain::ProblemDescriptor;

pub const DEMO_PROBLEM_ID: &str = "demo";

const DEMO_PROBLEM: &str = r#"<problem>
  <p>What is six times seven?</p>
  <customresponse id="demo_product" expect="42" cfn="numeric">
    <textline size="10"/>
  </customresponse>
  <p>Name the colour red in French or Spanish.</p>
  <customresponse id="demo_red" expect="rouge|rojo" cfn="one_of">
    <textline/>
  </customresponse>
  <solution><p>42; rouge or rojo.</p></solution>
</problem>"#;

pub fn seed_problems() -> Vec<ProblemDescriptor> {
  vec![ProblemDescriptor::new(DEMO_PROBLEM_ID, DEMO_PROBLEM)]
}

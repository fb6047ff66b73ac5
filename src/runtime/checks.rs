//! Check functions selectable by `cfn` on a response.

use crate::error::GradingFailure;

/// Relative tolerance used when a numeric check names none.
const DEFAULT_RELATIVE_TOLERANCE: f64 = 0.001 / 100.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tolerance {
  Absolute(f64),
  /// Fraction of the expected value.
  Relative(f64),
}

impl Tolerance {
  /// `"0.5"` is absolute, `"5%"` relative.
  pub fn parse(s: &str) -> Result<Self, String> {
    let s = s.trim();
    if let Some(pct) = s.strip_suffix('%') {
      let v: f64 = pct.trim().parse().map_err(|_| format!("invalid tolerance '{}'", s))?;
      if v < 0.0 {
        return Err(format!("negative tolerance '{}'", s));
      }
      return Ok(Tolerance::Relative(v / 100.0));
    }
    let v: f64 = s.parse().map_err(|_| format!("invalid tolerance '{}'", s))?;
    if v < 0.0 {
      return Err(format!("negative tolerance '{}'", s));
    }
    Ok(Tolerance::Absolute(v))
  }

  fn allows(&self, expected: f64, actual: f64) -> bool {
    let slack = match self {
      Tolerance::Absolute(t) => *t,
      Tolerance::Relative(f) => (expected * f).abs(),
    };
    (expected - actual).abs() <= slack
  }
}

impl Default for Tolerance {
  fn default() -> Self {
    Tolerance::Relative(DEFAULT_RELATIVE_TOLERANCE)
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Check {
  Exact,
  CaseInsensitive,
  Numeric(Tolerance),
  Contains,
  /// Expected value lists alternatives separated by `|`.
  OneOf,
}

impl Check {
  /// Resolve a `cfn` name (default `exact`) and optional tolerance attribute.
  pub fn from_cfn(cfn: Option<&str>, tolerance: Option<&str>) -> Result<Self, String> {
    let check = match cfn.map(str::trim).unwrap_or("exact") {
      "" | "exact" => Check::Exact,
      "case_insensitive" => Check::CaseInsensitive,
      "numeric" => Check::Numeric(match tolerance {
        Some(t) => Tolerance::parse(t)?,
        None => Tolerance::default(),
      }),
      "contains" => Check::Contains,
      "one_of" => Check::OneOf,
      other => return Err(format!("unknown check function '{}'", other)),
    };
    Ok(check)
  }

  pub fn evaluate(&self, expected: &str, answer: &str) -> Result<bool, GradingFailure> {
    let answer = answer.trim();
    let expected = expected.trim();
    match self {
      Check::Exact => Ok(answer == expected),
      Check::CaseInsensitive => Ok(answer.to_lowercase() == expected.to_lowercase()),
      Check::Contains => Ok(!expected.is_empty() && answer.contains(expected)),
      Check::OneOf => Ok(expected.split('|').any(|alt| alt.trim() == answer)),
      Check::Numeric(tol) => {
        let want: f64 = expected
          .parse()
          .map_err(|_| GradingFailure(format!("expected value '{}' is not a number", expected)))?;
        let got: f64 = answer
          .parse()
          .map_err(|_| GradingFailure(format!("could not interpret '{}' as a number", answer)))?;
        if !got.is_finite() {
          return Err(GradingFailure(format!("could not interpret '{}' as a number", answer)));
        }
        Ok(tol.allows(want, got))
      }
    }
  }
}

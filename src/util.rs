//! Small utility helpers used across modules.

/// Log-safe truncation for large strings (answers, grading messages).
/// Cuts on a char boundary.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

/// Map a descriptor id onto a safe file stem: anything outside
/// `[A-Za-z0-9._-]` becomes `_`.
pub fn file_stem_for(id: &str) -> String {
  let stem: String = id
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
    .collect();
  if stem.is_empty() || stem.chars().all(|c| c == '.') {
    format!("_{}", stem)
  } else {
    stem
  }
}

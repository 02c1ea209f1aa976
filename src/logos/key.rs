use std::fmt;

/// Normalized company name used as the resolution key.
///
/// Case-folded with all whitespace removed, so "Google ", "google" and
/// "Goo gle" share one entry and one remote lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompanyKey(String);

impl CompanyKey {
  pub fn normalize(company_name: &str) -> Self {
    Self(
      company_name
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect(),
    )
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl fmt::Display for CompanyKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

//! Deterministic placeholder logos.

use sha2::{Digest, Sha256};

use super::key::CompanyKey;
use super::types::{FallbackLogo, LogoRef};

/// Label used when the company name has nothing printable in it.
pub const GENERIC_LABEL: &str = "Company";

const GENERIC_INITIALS: &str = "?";

/// Labels longer than this are cut (on a char boundary).
const MAX_LABEL_CHARS: usize = 80;

/// Background colors, picked by hash of the normalized name.
const PALETTE: [&str; 12] = [
  "#1abc9c", "#2ecc71", "#3498db", "#9b59b6", "#34495e", "#16a085", "#27ae60", "#2980b9",
  "#8e44ad", "#e67e22", "#e74c3c", "#7f8c8d",
];

/// Generates initials-based placeholder logos.
///
/// Pure and total: the same name always yields the same reference, and every
/// input (empty, whitespace, emoji, megabytes of text) yields one.
pub struct FallbackGenerator;

impl FallbackGenerator {
  pub fn generate(company_name: &str) -> LogoRef {
    let initials = initials(company_name);
    let (initials, label) = if initials.is_empty() {
      (GENERIC_INITIALS.to_string(), GENERIC_LABEL.to_string())
    } else {
      (initials, label(company_name))
    };

    LogoRef::Fallback(FallbackLogo {
      initials,
      color: color_for(&CompanyKey::normalize(company_name)).to_string(),
      label,
    })
  }
}

/// First alphanumeric character of up to the first two words that have one.
fn initials(name: &str) -> String {
  name
    .split_whitespace()
    .filter_map(|word| word.chars().find(|c| c.is_alphanumeric()))
    .take(2)
    .flat_map(char::to_uppercase)
    .collect()
}

fn label(name: &str) -> String {
  let trimmed = name.trim();
  match trimmed.char_indices().nth(MAX_LABEL_CHARS) {
    Some((cut, _)) => trimmed[..cut].to_string(),
    None => trimmed.to_string(),
  }
}

fn color_for(key: &CompanyKey) -> &'static str {
  let digest = Sha256::digest(key.as_str().as_bytes());
  PALETTE[usize::from(digest[0]) % PALETTE.len()]
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fallback(name: &str) -> FallbackLogo {
    match FallbackGenerator::generate(name) {
      LogoRef::Fallback(logo) => logo,
      other => panic!("expected fallback, got {:?}", other),
    }
  }

  #[test]
  fn test_initials_from_first_two_words() {
    assert_eq!(fallback("Acme Corp International").initials, "AC");
    assert_eq!(fallback("globex").initials, "G");
    assert_eq!(fallback("(Initech) llc").initials, "IL");
  }

  #[test]
  fn test_deterministic() {
    assert_eq!(
      FallbackGenerator::generate("Acme"),
      FallbackGenerator::generate("Acme")
    );
    // Same key, same color, even with different spelling.
    assert_eq!(fallback("Acme ").color, fallback("acme").color);
  }

  #[test]
  fn test_empty_and_symbol_only_names() {
    for name in ["", "   ", "!!!", "---"] {
      let logo = fallback(name);
      assert_eq!(logo.initials, "?");
      assert_eq!(logo.label, GENERIC_LABEL);
      assert!(!FallbackGenerator::generate(name).as_src().is_empty());
    }
  }

  #[test]
  fn test_unicode_names() {
    assert_eq!(fallback("ßeta straße").initials, "SSS");
    assert_eq!(fallback("東京 電力").initials, "東電");
    assert_eq!(fallback("🚀 Rocket").initials, "R");
  }

  #[test]
  fn test_very_long_name() {
    let name = "x".repeat(100_000);
    let logo = fallback(&name);
    assert_eq!(logo.initials, "X");
    assert_eq!(logo.label.chars().count(), MAX_LABEL_CHARS);
  }

  #[test]
  fn test_color_from_palette() {
    assert!(PALETTE.contains(&fallback("Acme").color.as_str()));
  }
}

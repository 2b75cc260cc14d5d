//! Phone number normalization and formatting-tolerant matching.
//!
//! The UI renders numbers in whatever format it likes (`+20 10 1234 5678`,
//! `01012345678`, ...), so matching always goes through digit-stripping and
//! falls back to a trailing-suffix comparison.

use serde::Serialize;

/// Shortest trailing-digit run that still identifies a number across
/// formatting and country-code differences.
const SUFFIX_MATCH_LEN: usize = 8;

/// A normalized, digits-only destination phone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Destination(String);

impl Destination {
    /// Normalize `raw` into a destination.
    ///
    /// Strips every non-digit character, rejects inputs with fewer than
    /// `min_digits` digits, and prepends `country_code` when the number
    /// looks local (no country prefix yet).
    pub fn normalize(raw: &str, min_digits: usize, country_code: &str) -> Option<Self> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.len() < min_digits {
            return None;
        }
        if !country_code.is_empty() && !digits.starts_with(country_code) {
            return Some(Self(format!("{country_code}{digits}")));
        }
        Some(Self(digits))
    }

    /// The digits-only form.
    pub fn digits(&self) -> &str {
        &self.0
    }

    /// Whether `rendered` (a UI label in any display format) refers to this
    /// destination: equal after digit-stripping, or sharing a trailing run
    /// of at least [`SUFFIX_MATCH_LEN`] digits.
    pub fn matches_rendered(&self, rendered: &str) -> bool {
        let other: String = rendered.chars().filter(char::is_ascii_digit).collect();
        if other.is_empty() {
            return false;
        }
        if other == self.0 {
            return true;
        }
        if other.len() < SUFFIX_MATCH_LEN || self.0.len() < SUFFIX_MATCH_LEN {
            return false;
        }
        let tail = |s: &str| -> String {
            s.chars()
                .rev()
                .take(SUFFIX_MATCH_LEN)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect()
        };
        tail(&other) == tail(&self.0)
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

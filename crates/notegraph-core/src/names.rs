//! # Name Normalization
//!
//! One rule is used everywhere a name is compared:
//!
//! - **display form**: control characters treated as whitespace, trimmed,
//!   internal whitespace runs collapsed to a single space, casing preserved
//! - **match key**: the display form lower-cased (`str::to_lowercase`)
//!
//! Entity names, aliases and relation labels all go through this module, so
//! "Li  Ming", " li ming" and "LI MING" resolve to the same entity while the
//! first spelling recorded is what users see.

use crate::NotegraphError;
use std::fmt;

/// Comparison key for a name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameKey(String);

impl NameKey {
    /// Build the key for `raw`, or `None` if nothing is left after trimming.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        let display = display_form(raw);
        if display.is_empty() {
            None
        } else {
            Some(Self(display.to_lowercase()))
        }
    }

    /// Wrap a key read back from storage, where it was already normalized.
    pub(crate) fn from_normalized(stored: &str) -> Self {
        Self(stored.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim and collapse whitespace, keeping the original casing.
#[must_use]
pub fn display_form(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Validate a name and return its display form and key.
pub fn checked(raw: &str, what: &str, max_len: usize) -> Result<(String, NameKey), NotegraphError> {
    let display = display_form(raw);
    if display.len() > max_len {
        return Err(NotegraphError::InvalidInput(format!(
            "{} length {} exceeds maximum {} bytes",
            what,
            display.len(),
            max_len
        )));
    }
    let key = NameKey::new(&display)
        .ok_or_else(|| NotegraphError::InvalidInput(format!("{} must not be empty", what)))?;
    Ok((display, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_and_case_fold_to_one_key() {
        let a = NameKey::new("Li  Ming").expect("key");
        let b = NameKey::new("  li ming ").expect("key");
        let c = NameKey::new("LI\tMING").expect("key");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.as_str(), "li ming");
    }

    #[test]
    fn display_keeps_casing() {
        assert_eq!(display_form("  My   older Brother "), "My older Brother");
    }

    #[test]
    fn blank_names_have_no_key() {
        assert!(NameKey::new("   ").is_none());
        assert!(matches!(
            checked(" \n", "entity name", 16),
            Err(NotegraphError::InvalidInput(_))
        ));
    }

    #[test]
    fn control_characters_become_spaces() {
        assert_eq!(display_form("Li\u{1f}Ming\u{0}"), "Li Ming");
    }

    #[test]
    fn unicode_is_lowercased() {
        let key = NameKey::new("ÉCOLE Polytechnique").expect("key");
        assert_eq!(key.as_str(), "école polytechnique");
    }

    #[test]
    fn overlong_names_are_rejected() {
        let long = "x".repeat(20);
        assert!(checked(&long, "alias", 10).is_err());
    }
}

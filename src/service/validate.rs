//! Field validation run before any task is built.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,4}$").expect("email pattern compiles")
});

/// Reject every `(name, value)` pair whose value is empty, all at once:
/// `"username cannot be empty;email cannot be empty"`.
pub fn require_non_empty(fields: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = fields
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| format!("{name} cannot be empty"))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(missing.join(";")))
    }
}

/// Lowercase-only address with a 2-4 letter top-level domain.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

pub fn require_email(email: &str) -> Result<()> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(Error::Validation("invalid email address".to_string()))
    }
}

//! Gmail address validation used by the backend before touching disk.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Email cannot be empty")]
    Empty,

    #[error("Invalid GMAIL email format: {0}")]
    NotGmail(String),
}

fn gmail_regex() -> &'static Regex {
    static GMAIL: OnceLock<Regex> = OnceLock::new();
    GMAIL.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@gmail\.com$").expect("static regex is valid")
    })
}

/// Check that `address` is a plain `@gmail.com` address.
pub fn validate_gmail_address(address: &str) -> Result<(), AddressError> {
    if address.trim().is_empty() {
        return Err(AddressError::Empty);
    }
    if !gmail_regex().is_match(address) {
        return Err(AddressError::NotGmail(address.to_string()));
    }
    Ok(())
}

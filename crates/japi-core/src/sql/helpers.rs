use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{JapiError, Result};

static SEG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Single identifier segment: letters, digits, underscore only.
pub fn validate_segment(ident: &str) -> Result<()> {
    if SEG.is_match(ident) {
        Ok(())
    } else {
        Err(JapiError::InvalidIdentifier(format!("`{ident}`")))
    }
}

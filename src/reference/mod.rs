//! Reference normalization — turns raw user input into a lookup key.
//!
//! A reference code is a short identifier a user types to reach a listing
//! (e.g. `"086983"`, `"AB-1234"`). Normalization strips surrounding
//! whitespace and every non-alphanumeric character, preserving case for
//! display while lookups use a case-insensitive key. Anything that strips to
//! empty or to more than [`MAX_REFERENCE_LEN`] characters is rejected before
//! the rest of the pipeline is touched.

use crate::error::ResolveError;

/// Maximum length of a normalized reference code.
pub const MAX_REFERENCE_LEN: usize = 20;

/// A validated reference code, produced per call and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceQuery {
    raw: String,
    normalized: String,
}

impl ReferenceQuery {
    /// The user's input, verbatim.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The display form: alphanumerics only, original case preserved.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// The cache/dedup key: the normalized form, ASCII-lowercased.
    pub fn key(&self) -> String {
        self.normalized.to_ascii_lowercase()
    }
}

/// Validates and canonicalizes a raw reference code.
///
/// Pure function: no state is read or written. Separators such as spaces,
/// dashes, and slashes are stripped rather than rejected, so `" AB-1234 "`
/// normalizes to `"AB1234"`.
///
/// # Errors
///
/// Returns [`ResolveError::InvalidReference`] when the input is empty or
/// whitespace-only, strips to empty, or strips to more than
/// [`MAX_REFERENCE_LEN`] alphanumeric characters.
pub fn normalize(raw: &str) -> Result<ReferenceQuery, ResolveError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid(raw, "empty or whitespace-only input"));
    }

    let normalized: String = trimmed.chars().filter(char::is_ascii_alphanumeric).collect();
    if normalized.is_empty() {
        return Err(invalid(raw, "no alphanumeric characters"));
    }
    if normalized.len() > MAX_REFERENCE_LEN {
        return Err(invalid(raw, "longer than 20 characters"));
    }

    Ok(ReferenceQuery {
        raw: raw.to_owned(),
        normalized,
    })
}

fn invalid(raw: &str, reason: &str) -> ResolveError {
    ResolveError::InvalidReference {
        raw: raw.to_owned(),
        reason: reason.to_owned(),
    }
}

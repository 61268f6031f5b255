// Pre-flight name checks. Anything rejected here never reaches the network.

use crate::error::{HarvestError, Result};

const RESOURCE_MIN_LEN: usize = 3;
const RESOURCE_MAX_LEN: usize = 21;

pub const IDENTITY_MIN_LEN: usize = 3;
pub const IDENTITY_MAX_LEN: usize = 20;

/// Normalize a community name: trims, strips an optional `r/` or `/r/` prefix,
/// lowercases, and enforces 3–21 chars of `[A-Za-z0-9_]` starting alphanumeric.
pub fn normalize_resource(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let name = trimmed
        .strip_prefix("/r/")
        .or_else(|| trimmed.strip_prefix("r/"))
        .unwrap_or(trimmed);

    let len = name.chars().count();
    if !(RESOURCE_MIN_LEN..=RESOURCE_MAX_LEN).contains(&len) {
        return Err(HarvestError::Validation(format!(
            "resource name must be {RESOURCE_MIN_LEN}-{RESOURCE_MAX_LEN} characters, got {len}"
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(HarvestError::Validation(format!(
            "resource name '{name}' may only contain letters, digits and underscores"
        )));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(HarvestError::Validation(format!(
            "resource name '{name}' must start with a letter or digit"
        )));
    }
    Ok(name.to_ascii_lowercase())
}

/// Shape check for a platform username: 3–20 chars of `[A-Za-z0-9_-]`.
pub fn is_valid_identity(name: &str) -> bool {
    let len = name.len();
    (IDENTITY_MIN_LEN..=IDENTITY_MAX_LEN).contains(&len)
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub fn validate_identity(name: &str) -> Result<()> {
    if is_valid_identity(name) {
        Ok(())
    } else {
        Err(HarvestError::Validation(format!("invalid identity name '{name}'")))
    }
}

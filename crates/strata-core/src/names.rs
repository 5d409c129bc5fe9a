//! Entity-name rules.
//!
//! An entity name is a short key, unique within its realm. It is not a
//! description: at most 30 characters drawn from lowercase ASCII letters,
//! digits, `_`, `-` and `.`.

use crate::errors::CoreError;

/// Maximum length of an entity name, in characters.
pub const MAX_ENTITY_NAME_LEN: usize = 30;

/// Check an entity name against the naming rules.
///
/// # Errors
///
/// Returns `CoreError::InvalidEntityName` describing the first broken rule.
pub fn validate_entity_name(name: &str) -> Result<(), CoreError> {
    let reject = |reason: &str| CoreError::InvalidEntityName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(reject("name is empty"));
    }
    if name.chars().count() > MAX_ENTITY_NAME_LEN {
        return Err(reject("longer than 30 characters"));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.')))
    {
        return Err(reject(&format!("character {bad:?} is not allowed")));
    }
    Ok(())
}

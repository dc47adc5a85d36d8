//! Type and attribute name validation.
//!
//! Valid names:
//! - Must be non-empty
//! - Must not contain whitespace or control characters
//! - Must not contain `.` (reserved for fetch plan paths such as `manager.name`)
//! - Must not contain `/` (reserved for document paths)
//! - Must not start with a digit

use crate::error::{SchemaError, SchemaResult};

/// Characters that are forbidden anywhere in a name.
const FORBIDDEN_CHARS: &[char] = &['.', '/', ' ', '\t', '\n', '\r'];

fn name_problem(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("name must not be empty".into());
    }

    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Some(format!("contains forbidden character: {ch:?}"));
        }
    }

    if name.chars().any(char::is_control) {
        return Some("contains a control character".into());
    }

    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Some("must not start with a digit".into());
    }

    None
}

/// Validate an entity type name.
///
/// ```
/// use dynent_schema::names::validate_type_name;
///
/// assert!(validate_type_name("Person").is_ok());
/// assert!(validate_type_name("").is_err());
/// ```
pub fn validate_type_name(name: &str) -> SchemaResult<()> {
    match name_problem(name) {
        Some(reason) => Err(SchemaError::InvalidTypeName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Validate an attribute name declared on `type_name`.
///
/// ```
/// use dynent_schema::names::validate_attribute_name;
///
/// assert!(validate_attribute_name("Person", "manager").is_ok());
/// assert!(validate_attribute_name("Person", "manager.name").is_err());
/// ```
pub fn validate_attribute_name(type_name: &str, name: &str) -> SchemaResult<()> {
    match name_problem(name) {
        Some(reason) => Err(SchemaError::InvalidAttributeName {
            type_name: type_name.to_string(),
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

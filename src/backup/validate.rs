//! Validation functions for configuration values and names used as path components.

use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

/// A database name ends up as a directory and file name, so it must be a single safe
/// path component.
pub fn validate_path_component<S: AsRef<str>>(name: S) -> Result<(), ValidationError> {
    let name = name.as_ref();
    if name.is_empty() || name == "." || name == ".." || !is_sanitized(name) {
        return Err(ValidationError::new("InvalidPathComponent").with_message(
            format!(
                "{:?} cannot be used as a file name, try sanitizing like {:?}",
                name,
                sanitize(name)
            )
            .into(),
        ));
    }

    Ok(())
}

/// Octal permission bits as accepted by `chmod`, e.g. `777` or `0660`.
pub fn validate_file_mode<S: AsRef<str>>(mode: S) -> Result<(), ValidationError> {
    let mode = mode.as_ref();
    let valid = (3..=4).contains(&mode.len()) && mode.chars().all(|c| ('0'..='7').contains(&c));
    if !valid {
        return Err(ValidationError::new("InvalidFileMode")
            .with_message(format!("Invalid octal file mode: {mode:?}").into()));
    }

    Ok(())
}

pub fn validate_no_empty_item<S: AsRef<str>>(items: &[S]) -> Result<(), ValidationError> {
    if items.iter().any(|i| i.as_ref().is_empty()) {
        return Err(ValidationError::new("EmptyItem")
            .with_message("Empty string is not allowed in this list".into()));
    }

    Ok(())
}

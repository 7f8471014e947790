//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest display name accepted in the lobby.
pub const MAX_USERNAME_CHARS: usize = 24;

/// Validates that a display name is non-blank and reasonably short.
///
/// # Examples
///
/// ```ignore
/// validate_username("ada")     // Ok
/// validate_username("   ")     // Err - blank
/// ```
pub fn validate_username(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("username_blank");
        err.message = Some("Username cannot be empty.".into());
        return Err(err);
    }

    let length = name.chars().count();
    if length > MAX_USERNAME_CHARS {
        let mut err = ValidationError::new("username_length");
        err.message = Some(
            format!("Username must be at most {MAX_USERNAME_CHARS} characters (got {length}).")
                .into(),
        );
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username_valid() {
        assert!(validate_username("ada").is_ok());
        assert!(validate_username("Zoë the Quizzer").is_ok());
    }

    #[test]
    fn test_validate_username_blank() {
        assert!(validate_username("").is_err());
        assert!(validate_username("   ").is_err());
    }

    #[test]
    fn test_validate_username_too_long() {
        let long = "x".repeat(MAX_USERNAME_CHARS + 1);
        let err = validate_username(&long).unwrap_err();
        assert_eq!(err.code, "username_length");
    }
}

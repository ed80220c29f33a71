//! Input limits checked before any store access.
//!
//! Each check returns the trimmed value, which is what reaches the store.

use super::error::ValidationError;

pub const MAX_TEAM_NAME_LENGTH: usize = 100;
pub const MAX_USER_ID_LENGTH: usize = 100;
pub const MAX_USERNAME_LENGTH: usize = 255;
pub const MAX_PULL_REQUEST_ID_LENGTH: usize = 200;
pub const MAX_PULL_REQUEST_NAME_LENGTH: usize = 500;

fn check<'a>(field: &'static str, value: &'a str, max: usize) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed)
}

pub fn team_name(value: &str) -> Result<&str, ValidationError> {
    check("team_name", value, MAX_TEAM_NAME_LENGTH)
}

pub fn user_id(value: &str) -> Result<&str, ValidationError> {
    check("user_id", value, MAX_USER_ID_LENGTH)
}

pub fn username(value: &str) -> Result<&str, ValidationError> {
    check("username", value, MAX_USERNAME_LENGTH)
}

pub fn pull_request_id(value: &str) -> Result<&str, ValidationError> {
    check("pull_request_id", value, MAX_PULL_REQUEST_ID_LENGTH)
}

pub fn pull_request_name(value: &str) -> Result<&str, ValidationError> {
    check("pull_request_name", value, MAX_PULL_REQUEST_NAME_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_values_rejected() {
        assert_eq!(
            team_name("   "),
            Err(ValidationError::Empty { field: "team_name" })
        );
        assert!(user_id("").is_err());
    }

    #[test]
    fn test_limits_are_inclusive() {
        assert!(pull_request_id(&"p".repeat(200)).is_ok());
        assert_eq!(
            pull_request_id(&"p".repeat(201)),
            Err(ValidationError::TooLong {
                field: "pull_request_id",
                max: 200
            })
        );
        assert!(pull_request_name(&"n".repeat(500)).is_ok());
        assert!(pull_request_name(&"n".repeat(501)).is_err());
        assert!(user_id(&"u".repeat(101)).is_err());
        assert!(team_name(&"t".repeat(100)).is_ok());
    }

    #[test]
    fn test_values_are_trimmed() {
        assert_eq!(pull_request_id(" pr-1 "), Ok("pr-1"));
        let padded = format!("  {}  ", "t".repeat(100));
        assert_eq!(team_name(&padded), Ok("t".repeat(100).as_str()));
    }

    #[test]
    fn test_padded_over_length_id_rejected() {
        let padded = format!("  {}  ", "p".repeat(201));
        assert_eq!(
            pull_request_id(&padded),
            Err(ValidationError::TooLong {
                field: "pull_request_id",
                max: 200
            })
        );
    }
}

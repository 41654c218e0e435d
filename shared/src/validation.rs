//! Input validation functions
//!
//! Registration input is checked here before any hashing or store access
//! happens.

use validator::ValidateEmail;

/// Validate email format
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email cannot be empty".to_string());
    }
    if email.len() > 255 {
        return Err("Email too long".to_string());
    }
    if !email.validate_email() {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password cannot be empty".to_string());
    }
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if password.len() > 128 {
        return Err("Password too long".to_string());
    }
    Ok(())
}

/// Validate username (3-50 characters, letters, digits, `_`, `.` or `-`)
pub fn validate_username(username: &str) -> Result<(), String> {
    let len = username.chars().count();
    if len < 3 {
        return Err("Username must be at least 3 characters".to_string());
    }
    if len > 50 {
        return Err("Username too long".to_string());
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err("Username contains invalid characters".to_string());
    }
    Ok(())
}

/// Normalize an email for lookup and storage
///
/// Lowercases and trims; the local part is not otherwise rewritten.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

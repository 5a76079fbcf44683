/// Field validators shared by both sides of the broker.
///
/// The gateway validates at the HTTP boundary; the identity service validates
/// again at dispatch, because the queue is reachable by more than one
/// producer.
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;
use validator::ValidationError;

// Compile regex patterns once at startup
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    // This regex is hardcoded and validated - it is a compile-time constant in practice
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("hardcoded email regex is invalid - fix source code")
});

const NAME_MAX: usize = 64;
const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 128;

/// Email format (RFC 5322 simplified).
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if !email.is_empty() && email.len() <= 254 && EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_email"))
    }
}

/// Bounded alphabetic-only name (firstname/lastname).
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.chars().count() > NAME_MAX {
        return Err(ValidationError::new("name_length"));
    }
    if !name.chars().all(char::is_alphabetic) {
        return Err(ValidationError::new("name_not_alphabetic"));
    }
    Ok(())
}

/// Password policy: 8..=128 chars with at least one uppercase letter, one
/// lowercase letter, one digit and one symbol.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if len < PASSWORD_MIN || len > PASSWORD_MAX {
        return Err(ValidationError::new("password_length"));
    }

    let has_uppercase = password.chars().any(|c| c.is_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_alphanumeric());

    if has_uppercase && has_lowercase && has_digit && has_symbol {
        Ok(())
    } else {
        Err(ValidationError::new("password_composition"))
    }
}

/// Verification keys are 128-bit random identifiers in their v4 textual form.
pub fn validate_verification_key(key: &str) -> Result<(), ValidationError> {
    Uuid::parse_str(key)
        .map(|_| ())
        .map_err(|_| ValidationError::new("invalid_verification_key"))
}

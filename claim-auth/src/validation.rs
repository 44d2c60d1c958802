// Local input checks, run before any provider or store call.

use validator::ValidateEmail;

use crate::messages::Messages;

/// Standard address pattern check.
pub fn is_valid_email(email: &str) -> bool {
    !email.trim().is_empty() && email.validate_email()
}

/// Sign-in credentials after local validation. Both fields are trimmed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Trim, require both fields, then check the address pattern.
/// The error is the user-facing message.
pub fn validate_credentials(
    email: &str,
    password: &str,
    messages: &Messages,
) -> Result<Credentials, String> {
    let email = email.trim();
    let password = password.trim();
    if email.is_empty() || password.is_empty() {
        return Err(messages.required_fields.clone());
    }
    if !is_valid_email(email) {
        return Err(messages.invalid_email.clone());
    }
    Ok(Credentials {
        email: email.to_string(),
        password: password.to_string(),
    })
}

/// Email-only check used by password reset.
pub fn validate_reset_email(email: &str, messages: &Messages) -> Result<String, String> {
    let email = email.trim();
    if email.is_empty() {
        return Err(messages.reset_needs_email.clone());
    }
    if !is_valid_email(email) {
        return Err(messages.invalid_email.clone());
    }
    Ok(email.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_pattern() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("Jane@X.com"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("two words@x.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn credentials_are_trimmed_and_required() {
        let m = Messages::spanish();
        let ok = validate_credentials("  a@b.com ", " secret1 ", &m).unwrap();
        assert_eq!(ok.email, "a@b.com");
        assert_eq!(ok.password, "secret1");

        assert_eq!(validate_credentials("a@b.com", "   ", &m).unwrap_err(), m.required_fields);
        assert_eq!(validate_credentials("", "x", &m).unwrap_err(), m.required_fields);
        assert_eq!(validate_credentials("not-an-email", "x", &m).unwrap_err(), m.invalid_email);
    }

    #[test]
    fn reset_requires_an_email() {
        let m = Messages::english();
        assert_eq!(validate_reset_email(" ", &m).unwrap_err(), m.reset_needs_email);
        assert_eq!(validate_reset_email("nope", &m).unwrap_err(), m.invalid_email);
        assert_eq!(validate_reset_email(" a@b.com", &m).unwrap(), "a@b.com");
    }
}

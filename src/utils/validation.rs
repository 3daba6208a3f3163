use rand::{distr::Alphanumeric, Rng};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const PASSWORD_POLICY_MESSAGE: &str =
    "Password must be at least 8 characters long and contain letters and numbers";

/// At least eight characters including one ASCII letter and one digit.
pub fn is_valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LENGTH
        && password.chars().any(|c| c.is_ascii_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit())
}

/// Minimal shape check; delivery is the real verification.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// Trims whitespace and a leading `@`. `None` when nothing is left.
pub fn normalize_username(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('@').trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Six decimal digits.
pub fn generate_verification_code() -> String {
    let mut rng = rand::rng();
    (0..6)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

pub fn generate_reset_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

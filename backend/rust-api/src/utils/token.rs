use base64::{engine::general_purpose, Engine as _};
use rand::Rng;

/// Length of a form access token: 32 random bytes, URL-safe base64 without
/// padding.
pub const FORM_TOKEN_LEN: usize = 43;

/// Generates the opaque access token embedded in a form link. The token is
/// the only credential a respondent holds, so it has to be unguessable and
/// survive being pasted into a URL path segment.
pub fn generate_form_token() -> String {
    let random_bytes: [u8; 32] = rand::rng().random();
    general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Shape check used by metrics path normalization; not a validity check.
pub fn looks_like_form_token(s: &str) -> bool {
    s.len() == FORM_TOKEN_LEN
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

//! Masking of secrets before they reach the event log
//!
//! The event log stores payloads verbatim, so anything that writes a token
//! into an entry runs it through [`mask_secret`] first.

/// Keep the first four characters of a secret and hide the rest
///
/// Secrets of four characters or fewer are hidden entirely.
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() <= 4 {
        return "***".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{}...", prefix)
}

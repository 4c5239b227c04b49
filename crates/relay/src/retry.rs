//! Transient-error classification for relay submissions.

/// Message fragments that mark a submission error as transient. Matching
/// is case-insensitive substring search over the rendered error.
pub const RETRYABLE_TOKENS: [&str; 7] = [
    "not_found",
    "timeout",
    "econnreset",
    "enotfound",
    "etimedout",
    "fetch failed",
    "network error",
];

pub fn is_retryable_message(message: &str) -> bool {
    let message = message.to_lowercase();
    RETRYABLE_TOKENS.iter().any(|token| message.contains(token))
}

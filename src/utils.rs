// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Utility functions for crocdeck.

use chrono::Utc;

/// Mask a sensitive string (code-phrases, relay passwords) for logging.
///
/// Shows only the first `visible_prefix` characters and replaces the rest with "...".
///
/// # Examples
///
/// ```
/// use crocdeck::utils::mask_sensitive;
///
/// assert_eq!(mask_sensitive("7123-alpha-bravo-delta", 4), "7123...");
/// ```
pub fn mask_sensitive(input: &str, visible_prefix: usize) -> String {
    if input.chars().count() <= visible_prefix {
        // Still append the ellipsis so the length is not leaked
        return format!("{}...", input);
    }

    let prefix: String = input.chars().take(visible_prefix).collect();
    format!("{}...", prefix)
}

/// Milliseconds since the Unix epoch, the timestamp unit used on every event
/// and history record.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_sensitive() {
        assert_eq!(mask_sensitive("7123-alpha-bravo", 4), "7123...");
        assert_eq!(mask_sensitive("abc", 4), "abc...");
        assert_eq!(mask_sensitive("", 4), "...");
    }

    #[test]
    fn test_mask_sensitive_multibyte() {
        assert_eq!(mask_sensitive("ñandú-secreto", 2), "ña...");
    }

    #[test]
    fn test_now_millis_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(now_millis() > 1_577_836_800_000);
    }
}

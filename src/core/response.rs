//! Outbound message text utilities
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.1.0

/// WhatsApp text message body limit in characters.
pub const MESSAGE_LIMIT: usize = 4096;

/// Truncate text to fit a single WhatsApp message, appending an ellipsis
/// marker when content was cut.
pub fn truncate_for_message(text: &str) -> String {
    if text.chars().count() <= MESSAGE_LIMIT {
        return text.to_string();
    }

    let marker = "\n… (truncated)";
    let keep = MESSAGE_LIMIT - marker.chars().count();
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(marker);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_unchanged() {
        assert_eq!(truncate_for_message("hello"), "hello");
    }

    #[test]
    fn test_long_text_truncated_with_marker() {
        let long = "x".repeat(MESSAGE_LIMIT + 100);
        let result = truncate_for_message(&long);
        assert_eq!(result.chars().count(), MESSAGE_LIMIT);
        assert!(result.ends_with("(truncated)"));
    }

    #[test]
    fn test_exact_limit_unchanged() {
        let exact = "y".repeat(MESSAGE_LIMIT);
        assert_eq!(truncate_for_message(&exact), exact);
    }
}

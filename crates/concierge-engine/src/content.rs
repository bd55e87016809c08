// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound content rules and thread preview text.

use std::sync::LazyLock;

use concierge_core::ConciergeError;
use regex::Regex;

/// HTML `<img>` tags, markdown images and inline `data:image/` URIs.
static INLINE_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img\b[^>]*>|!\[[^\]]*\]\([^)\s]+\)|data:image/[a-z0-9.+-]+;base64,"#)
        .expect("inline image pattern compiles")
});

const ELLIPSIS: &str = "...";

/// Whether `content` carries an inline image reference.
pub fn has_inline_image(content: &str) -> bool {
    INLINE_IMAGE.is_match(content)
}

/// Rejects empty content and content over the applicable length limit.
///
/// Lengths are counted in characters, not bytes.
pub fn validate_content(
    content: &str,
    max_chars: usize,
    max_chars_with_image: usize,
) -> Result<(), ConciergeError> {
    if content.trim().is_empty() {
        return Err(ConciergeError::Validation(
            "message content must not be empty".into(),
        ));
    }

    let limit = if has_inline_image(content) {
        max_chars_with_image
    } else {
        max_chars
    };
    let len = content.chars().count();
    if len > limit {
        return Err(ConciergeError::Validation(format!(
            "message content is {len} characters, the limit is {limit}"
        )));
    }
    Ok(())
}

/// Thread preview: at most `max_chars` characters, ending in `...` when cut.
pub fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = content.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_inline_images() {
        assert!(has_inline_image(r#"see <img src="https://x/y.png">"#));
        assert!(has_inline_image("![pool](https://x/pool.jpg)"));
        assert!(has_inline_image("data:image/png;base64,iVBORw0"));
        assert!(!has_inline_image("the image is attached separately"));
        assert!(!has_inline_image("[link](https://x)"));
    }

    #[test]
    fn empty_content_is_rejected() {
        assert!(matches!(
            validate_content("   ", 1000, 10_000),
            Err(ConciergeError::Validation(_))
        ));
    }

    #[test]
    fn text_limit_applies_without_image() {
        let text = "a".repeat(1001);
        assert!(validate_content(&text, 1000, 10_000).is_err());
        assert!(validate_content(&"a".repeat(1000), 1000, 10_000).is_ok());
    }

    #[test]
    fn image_raises_limit() {
        let body = format!("{}<img src=\"a.png\">", "a".repeat(5000));
        assert!(validate_content(&body, 1000, 10_000).is_ok());
        let too_long = format!("{}<img src=\"a.png\">", "a".repeat(10_000));
        assert!(validate_content(&too_long, 1000, 10_000).is_err());
    }

    #[test]
    fn limit_counts_characters() {
        let text = "é".repeat(1000);
        assert!(validate_content(&text, 1000, 10_000).is_ok());
    }

    #[test]
    fn preview_truncates_with_ellipsis() {
        let long = "x".repeat(200);
        let p = preview(&long, 160);
        assert_eq!(p.chars().count(), 160);
        assert!(p.ends_with("..."));
        assert_eq!(&p[..157], &long[..157]);
    }

    #[test]
    fn short_preview_is_unchanged() {
        assert_eq!(preview("Welcome!", 160), "Welcome!");
        assert_eq!(preview(&"y".repeat(160), 160), "y".repeat(160));
    }
}

//! OSC8 hyperlink encoding with a plain-text fallback.
//!
//! The width returned by [`encode`] is the number of terminal columns the
//! link occupies once printed, which is what click regions are sized from.

use unicode_width::UnicodeWidthStr;

const OSC8_OPEN: &str = "\x1b]8;;";
const BEL: char = '\x07';

/// A link ready to print, with its on-screen width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedLink {
    pub display: String,
    pub width: usize,
}

/// Encodes `(text, url)` for a terminal with or without OSC8 support.
///
/// - OSC8: `ESC]8;;{url}BEL{text}ESC]8;;BEL`, width of `text` only
/// - fallback: `{text} [{url}]`, width of text + url + 3
pub fn encode(text: &str, url: &str, supports_osc8: bool) -> EncodedLink {
    let url = strip_controls(url);
    if supports_osc8 {
        EncodedLink {
            display: wrap_osc8(text, &url),
            width: text.width(),
        }
    } else {
        EncodedLink {
            display: format!("{text} [{url}]"),
            width: text.width() + url.width() + 3,
        }
    }
}

/// Wraps `text` in an OSC8 envelope pointing at `url`.
///
/// The surface re-prints linked runs through this after each draw.
pub fn wrap_osc8(text: &str, url: &str) -> String {
    format!("{OSC8_OPEN}{url}{BEL}{text}{OSC8_OPEN}{BEL}")
}

/// URLs end up inside an escape sequence; a stray BEL or ESC would close it
/// early.
fn strip_controls(url: &str) -> String {
    url.chars().filter(|c| !c.is_control()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_form_and_width() {
        let encoded = encode("Docs", "https://x", false);
        assert_eq!(encoded.display, "Docs [https://x]");
        assert_eq!(encoded.width, 4 + 9 + 3);
        assert_eq!(encoded.width, encoded.display.width());
    }

    #[test]
    fn test_osc8_form_and_width() {
        let encoded = encode("Docs", "https://x", true);
        assert_eq!(encoded.display, "\x1b]8;;https://x\x07Docs\x1b]8;;\x07");
        assert_eq!(encoded.width, 4);
    }

    #[test]
    fn test_wide_text_width() {
        assert_eq!(encode("日本", "https://x", true).width, 4);
        assert_eq!(encode("日本", "https://x", false).width, 4 + 9 + 3);
    }

    #[test]
    fn test_controls_removed_from_url() {
        let encoded = encode("a", "https://x\x07\x1b]8;;evil", true);
        assert_eq!(encoded.display.matches('\x07').count(), 2);
        assert_eq!(encode("a", "u\x1bv", false).display, "a [uv]");
    }
}

//! Text utilities shared by parsing and layout.

use std::borrow::Cow;

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Sanitizes text for display by removing control characters and expanding tabs.
///
/// Message text comes from a remote model and must never be able to smuggle
/// escape sequences into the terminal. Tabs expand to a fixed 4 spaces since
/// `unicode_width` reports them as zero-width.
///
/// Newlines are kept; callers split on them.
pub fn sanitize_for_display(s: &str) -> Cow<'_, str> {
    let needs_work = s
        .chars()
        .any(|c| c == '\t' || (c.is_control() && c != '\n'));
    if !needs_work {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\t' => out.push_str("    "),
            '\n' => out.push('\n'),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Truncates `text` to at most `max_width` columns on grapheme boundaries.
pub fn truncate_to_width(text: &str, max_width: usize) -> &str {
    if text.width() <= max_width {
        return text;
    }
    let mut used = 0;
    let mut end = 0;
    for (idx, grapheme) in text.grapheme_indices(true) {
        let w = grapheme.width();
        if used + w > max_width {
            break;
        }
        used += w;
        end = idx + grapheme.len();
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_borrows_clean_text() {
        assert!(matches!(sanitize_for_display("hello\nworld"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_sanitize_strips_escape_and_expands_tabs() {
        let out = sanitize_for_display("a\x1b]8;;evil\x07b\tc");
        assert_eq!(out, "a]8;;evilb    c");
    }

    #[test]
    fn test_truncate_respects_wide_chars() {
        assert_eq!(truncate_to_width("日本語", 4), "日本");
        assert_eq!(truncate_to_width("日本語", 5), "日本");
        assert_eq!(truncate_to_width("abc", 10), "abc");
        assert_eq!(truncate_to_width("abc", 0), "");
    }
}

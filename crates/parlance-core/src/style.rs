//! Styled text primitives (UI-agnostic).
//!
//! The engine never talks about terminal colors directly. Prose carries
//! semantic [`Style`] tags that the surface resolves against the active
//! theme's prose palette; highlighted code carries concrete [`Rgb`] colors
//! taken from the code theme.

/// A 24-bit color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Relative luminance in `0.0..=1.0` (sRGB weights, no gamma).
    pub fn luminance(self) -> f32 {
        (0.2126 * f32::from(self.0) + 0.7152 * f32::from(self.1) + 0.0722 * f32::from(self.2))
            / 255.0
    }

    /// Nearest index in the xterm 256-color palette (6x6x6 cube or gray ramp).
    pub fn to_ansi256(self) -> u8 {
        let Rgb(r, g, b) = self;
        if r == g && g == b {
            if r < 8 {
                return 16;
            }
            if r > 248 {
                return 231;
            }
            return (((u16::from(r) - 8) * 24 / 247) as u8) + 232;
        }
        let cube = |c: u8| -> u8 {
            if c < 48 {
                0
            } else if c < 115 {
                1
            } else {
                ((c - 35) / 40).min(5)
            }
        };
        16 + 36 * cube(r) + 6 * cube(g) + cube(b)
    }
}

/// Concrete style for a highlighted code token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyntaxStyle {
    pub fg: Rgb,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

/// Semantic style identifiers.
///
/// These are translated to actual terminal styles by the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Style {
    /// No styling.
    Plain,
    /// Role header ("You", "Assistant").
    RoleUser,
    RoleAssistant,
    RoleSystem,
    /// Default prose. Parsing is role-agnostic; layout swaps `Body` for the
    /// role-specific variant below.
    Body,
    UserBody,
    SystemBody,

    // Markdown styles
    /// Inline code (`code`).
    CodeInline,
    /// Code block frame (header, footer, language tag).
    CodeFrame,
    /// Copy icon in the code block header.
    CodeCopyIcon,
    /// Unstyled code text (unknown language or highlight failure).
    CodePlain,
    /// Highlighted code token.
    Syntax(SyntaxStyle),
    /// Emphasized text (*italic*).
    Emphasis,
    /// Strong text (**bold**).
    Strong,
    /// ~~struck~~ text.
    Strikethrough,
    /// Heading level 1 (# Heading).
    H1,
    /// Heading level 2 (## Heading).
    H2,
    /// Heading level 3+ (`### Heading`).
    H3,
    /// Link text.
    Link,
    /// The ` [url]` suffix of a degraded link.
    LinkUrl,
    /// Blockquote content.
    BlockQuote,
    /// List bullet marker.
    ListBullet,
    /// List number marker.
    ListNumber,
    /// Horizontal rule and table borders.
    Rule,
    /// Image placeholder / alt-text fallback.
    ImageAlt,
    /// Transient feedback line.
    FeedbackInfo,
    FeedbackError,
}

/// A styled span of text.
///
/// `link` indexes into the owning message's link list when the span is
/// (part of) a hyperlink's visible text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    pub text: String,
    pub style: Style,
    pub link: Option<usize>,
}

impl StyledSpan {
    pub fn new(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            style,
            link: None,
        }
    }

    pub fn linked(text: impl Into<String>, style: Style, link: usize) -> Self {
        Self {
            text: text.into(),
            style,
            link: Some(link),
        }
    }
}

/// A line of styled spans.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StyledLine {
    pub spans: Vec<StyledSpan>,
}

impl StyledLine {
    /// Creates an empty line.
    pub fn empty() -> Self {
        StyledLine { spans: vec![] }
    }

    pub fn plain(text: impl Into<String>, style: Style) -> Self {
        StyledLine {
            spans: vec![StyledSpan::new(text, style)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spans.iter().all(|s| s.text.is_empty())
    }

    /// Concatenated text of all spans.
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ansi256_primaries() {
        assert_eq!(Rgb(255, 0, 0).to_ansi256(), 196);
        assert_eq!(Rgb(0, 0, 255).to_ansi256(), 21);
        assert_eq!(Rgb(0, 0, 0).to_ansi256(), 16);
        assert_eq!(Rgb(255, 255, 255).to_ansi256(), 231);
    }

    #[test]
    fn test_ansi256_gray_ramp() {
        let idx = Rgb(128, 128, 128).to_ansi256();
        assert!((232..=255).contains(&idx));
    }

    #[test]
    fn test_luminance_orders_dark_and_light() {
        assert!(Rgb(20, 20, 20).luminance() < Rgb(240, 240, 240).luminance());
    }

    #[test]
    fn test_line_text_joins_spans() {
        let line = StyledLine {
            spans: vec![
                StyledSpan::new("a ", Style::Plain),
                StyledSpan::linked("b", Style::Link, 0),
            ],
        };
        assert_eq!(line.text(), "a b");
        assert!(!line.is_empty());
        assert!(StyledLine::empty().is_empty());
    }
}

//! Markdown parsing into theme-bound [`StyledMessage`]s.
//!
//! This module provides:
//! - `MarkdownRenderer::parse()`: raw markdown → `StyledMessage`
//! - `StyledMessageCache`: per `(message id, theme version)` memo of parses
//! - `wrap_spans()`: width-dependent wrapping used at layout time
//!
//! Fenced code blocks, links and images are pulled out as first-class
//! objects instead of being flattened into styled runs: code needs the
//! inverted theme and a copy payload, links need capability-dependent
//! encoding, images need protocol negotiation.

mod cache;
mod parse;
mod table;
mod wrap;

use std::ops::RangeInclusive;
use std::sync::Arc;

pub use cache::StyledMessageCache;
pub use table::TableData;
pub use wrap::{WrapOptions, wrap_spans};

use crate::highlight::SyntaxHighlighter;
use crate::style::{StyledLine, StyledSpan};
use crate::theme::{ThemeManager, ThemeVersion};

/// Inclusive range of 0-based line numbers in the raw markdown.
pub type SourceLineSpan = RangeInclusive<usize>;

/// A fenced (or indented) code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Info string exactly as written after the fence, trimmed.
    pub language: String,
    /// Block content without the fences; this is the copy payload.
    pub raw_content: Arc<str>,
    pub source_line_span: SourceLineSpan,
    /// False when the fence was never closed.
    pub terminated: bool,
}

impl CodeBlock {
    /// First token of the info string, used to pick a grammar.
    pub fn language_hint(&self) -> &str {
        self.language
            .split(|c: char| c.is_whitespace() || c == ',')
            .next()
            .unwrap_or_default()
    }
}

/// Visible text and target of a markdown link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpan {
    pub text: String,
    pub url: String,
    pub source_line_span: SourceLineSpan,
}

/// An `![alt](src)` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub alt: String,
    pub src: String,
    pub source_line_span: SourceLineSpan,
}

/// A logical prose line, wrapped at layout time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProseLine {
    pub first_prefix: Vec<StyledSpan>,
    pub rest_prefix: Vec<StyledSpan>,
    pub spans: Vec<StyledSpan>,
}

/// One entry in a message's line sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageLine {
    Prose(ProseLine),
    /// Pre-formatted line, truncated rather than wrapped.
    Verbatim(StyledLine),
    /// Horizontal rule, drawn to the layout width.
    Rule,
    Blank,
    Table(TableData),
    /// Anchor for `code_blocks[i]`.
    Code(usize),
    /// Anchor for `images[i]`.
    Image(usize),
}

/// Cached, theme-bound render of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledMessage {
    pub styled_lines: Vec<MessageLine>,
    pub code_blocks: Vec<CodeBlock>,
    pub link_regions: Vec<LinkSpan>,
    pub images: Vec<ImageRef>,
    /// Highlighted lines for each code block, parallel to `code_blocks`.
    pub code_highlights: Vec<Arc<Vec<StyledLine>>>,
    /// Name of the syntax theme the code was highlighted with.
    pub code_theme: String,
    pub theme_version: ThemeVersion,
}

/// Parses markdown and highlights its code blocks.
#[derive(Debug)]
pub struct MarkdownRenderer {
    highlighter: SyntaxHighlighter,
}

impl MarkdownRenderer {
    pub fn new(highlighter: SyntaxHighlighter) -> Self {
        Self { highlighter }
    }

    pub fn highlighter(&self) -> &SyntaxHighlighter {
        &self.highlighter
    }

    /// Parses `raw` against the active themes.
    ///
    /// Never fails: unterminated fences swallow the rest of the message as an
    /// unhighlighted block, malformed links stay literal text. Identical
    /// inputs produce identical output.
    pub fn parse(&self, raw: &str, themes: &ThemeManager) -> StyledMessage {
        let parsed = parse::parse_markdown(raw);
        let code_theme = themes.code_block_theme();

        let code_highlights = parsed
            .code_blocks
            .iter()
            .map(|block| {
                let hint = if block.terminated {
                    block.language_hint()
                } else {
                    ""
                };
                self.highlighter.highlight_cached(
                    &block.raw_content,
                    hint,
                    code_theme,
                    themes.version(),
                )
            })
            .collect();

        StyledMessage {
            styled_lines: parsed.lines,
            code_blocks: parsed.code_blocks,
            link_regions: parsed.links,
            images: parsed.images,
            code_highlights,
            code_theme: code_theme.name.clone(),
            theme_version: themes.version(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::Style;
    use crate::theme::ColorMode;

    fn renderer() -> (MarkdownRenderer, ThemeManager) {
        (
            MarkdownRenderer::new(SyntaxHighlighter::with_default_syntaxes()),
            ThemeManager::builtin(ColorMode::Dark),
        )
    }

    #[test]
    fn test_fenced_block_extracted_with_language() {
        let (md, themes) = renderer();
        let msg = md.parse("```rust\nfn main(){}\n```", &themes);
        assert_eq!(msg.code_blocks.len(), 1);
        assert_eq!(msg.code_blocks[0].language, "rust");
        assert_eq!(&*msg.code_blocks[0].raw_content, "fn main(){}");
        assert!(msg.code_blocks[0].terminated);
        assert_eq!(msg.code_blocks[0].source_line_span, 0..=2);
        assert_eq!(msg.styled_lines, vec![MessageLine::Code(0)]);
        assert_eq!(msg.code_highlights.len(), 1);
    }

    #[test]
    fn test_info_string_kept_and_first_token_highlights() {
        let (md, themes) = renderer();
        let msg = md.parse("```rust ignore\nlet x = 1;\n```", &themes);
        assert_eq!(msg.code_blocks[0].language, "rust ignore");
        assert!(
            msg.code_highlights[0]
                .iter()
                .flat_map(|l| l.spans.iter())
                .any(|s| matches!(s.style, Style::Syntax(_)))
        );
    }

    #[test]
    fn test_unterminated_fence_consumes_rest_unhighlighted() {
        let (md, themes) = renderer();
        let msg = md.parse("intro\n\n```rust\nfn a() {}\nmore text", &themes);
        assert_eq!(msg.code_blocks.len(), 1);
        let block = &msg.code_blocks[0];
        assert!(!block.terminated);
        assert_eq!(block.language, "rust");
        assert_eq!(&*block.raw_content, "fn a() {}\nmore text");
        assert!(
            msg.code_highlights[0]
                .iter()
                .flat_map(|l| l.spans.iter())
                .all(|s| s.style == Style::CodePlain)
        );
    }

    #[test]
    fn test_code_highlight_uses_inverted_theme() {
        let (md, mut themes) = renderer();
        let dark = md.parse("```rust\nlet a = 1;\n```", &themes);
        assert_eq!(dark.code_theme, themes.pair().light.name);

        themes.toggle_mode();
        let light = md.parse("```rust\nlet a = 1;\n```", &themes);
        assert_eq!(light.code_theme, themes.pair().dark.name);
        assert_ne!(dark.code_highlights, light.code_highlights);
        assert!(light.theme_version > dark.theme_version);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let (md, themes) = renderer();
        let raw = "# Title\n\nSee [docs](https://x) and `code`.\n\n```py\nprint(1)\n```\n";
        assert_eq!(md.parse(raw, &themes), md.parse(raw, &themes));
    }
}

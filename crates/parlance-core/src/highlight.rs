//! Syntax highlighting for fenced code blocks.
//!
//! `highlight` never fails: an unknown language or a grammar error yields
//! the code as one unstyled run per line.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use syntect::easy::HighlightLines;
use syntect::highlighting::FontStyle;
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

use crate::hash::ContentHash;
use crate::style::{Rgb, Style, StyledLine, StyledSpan, SyntaxStyle};
use crate::text::sanitize_for_display;
use crate::theme::{Theme, ThemeVersion};

/// Content hash, language hint, theme name, theme version.
type MemoKey = (ContentHash, String, String, ThemeVersion);

/// Highlights code against a read-only grammar set.
pub struct SyntaxHighlighter {
    syntaxes: Arc<SyntaxSet>,
    /// Memo of highlighted blocks. Only entries for the newest theme version
    /// are kept.
    memo: RefCell<HashMap<MemoKey, Arc<Vec<StyledLine>>>>,
}

impl std::fmt::Debug for SyntaxHighlighter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntaxHighlighter")
            .field("syntaxes", &self.syntaxes.syntaxes().len())
            .field("memo", &self.memo.borrow().len())
            .finish()
    }
}

impl SyntaxHighlighter {
    pub fn new(syntaxes: Arc<SyntaxSet>) -> Self {
        Self {
            syntaxes,
            memo: RefCell::new(HashMap::new()),
        }
    }

    /// Highlighter over syntect's bundled grammars.
    pub fn with_default_syntaxes() -> Self {
        Self::new(Arc::new(SyntaxSet::load_defaults_newlines()))
    }

    /// Resolves a fence language hint to a grammar.
    ///
    /// Tries, in order: token (`rust`, `py`), extension, case-insensitive
    /// grammar name, then a small alias table.
    pub fn resolve(&self, hint: &str) -> Option<&SyntaxReference> {
        let hint = hint.trim();
        if hint.is_empty() {
            return None;
        }
        let set = &*self.syntaxes;

        if let Some(syntax) = set
            .find_syntax_by_token(hint)
            .or_else(|| set.find_syntax_by_extension(hint))
        {
            return Some(syntax);
        }

        let lower = hint.to_lowercase();
        if let Some(syntax) = set.syntaxes().iter().find(|s| s.name.to_lowercase() == lower) {
            return Some(syntax);
        }

        let alias = match lower.as_str() {
            "shell" | "zsh" | "console" => "bash",
            "c++" => "cpp",
            "javascript" | "jsx" => "js",
            "typescript" | "tsx" => "ts",
            "python3" => "py",
            "make" | "makefile" => "Makefile",
            "dockerfile" => "Dockerfile",
            _ => return None,
        };
        set.find_syntax_by_extension(alias)
            .or_else(|| set.find_syntax_by_name(alias))
    }

    /// Highlights `code` with `theme`'s syntax colors.
    pub fn highlight(&self, code: &str, language_hint: &str, theme: &Theme) -> Vec<StyledLine> {
        let Some(syntax) = self.resolve(language_hint) else {
            if !language_hint.trim().is_empty() {
                tracing::debug!(language = language_hint, "no grammar, rendering unstyled");
            }
            return unstyled(code);
        };

        let mut highlighter = HighlightLines::new(syntax, &theme.code_theme);
        let mut lines = Vec::new();
        for line in LinesWithEndings::from(code) {
            let ranges = match highlighter.highlight_line(line, &self.syntaxes) {
                Ok(ranges) => ranges,
                Err(err) => {
                    tracing::warn!(
                        language = language_hint,
                        error = %err,
                        "highlighting failed, rendering unstyled"
                    );
                    return unstyled(code);
                }
            };

            let spans = ranges
                .into_iter()
                .filter_map(|(style, text)| {
                    let text = text.trim_end_matches(['\n', '\r']);
                    if text.is_empty() {
                        return None;
                    }
                    let syntax_style = SyntaxStyle {
                        fg: Rgb(style.foreground.r, style.foreground.g, style.foreground.b),
                        bold: style.font_style.contains(FontStyle::BOLD),
                        italic: style.font_style.contains(FontStyle::ITALIC),
                        underline: style.font_style.contains(FontStyle::UNDERLINE),
                    };
                    Some(StyledSpan::new(
                        sanitize_for_display(text).into_owned(),
                        Style::Syntax(syntax_style),
                    ))
                })
                .collect();
            lines.push(StyledLine { spans });
        }

        if lines.is_empty() {
            lines.push(StyledLine::empty());
        }
        lines
    }

    /// Memoized [`highlight`](Self::highlight), keyed by content hash,
    /// language hint, theme name and theme version.
    pub fn highlight_cached(
        &self,
        code: &str,
        language_hint: &str,
        theme: &Theme,
        version: ThemeVersion,
    ) -> Arc<Vec<StyledLine>> {
        let key = (
            ContentHash::of(code.as_bytes()),
            language_hint.to_string(),
            theme.name.clone(),
            version,
        );
        if let Some(hit) = self.memo.borrow().get(&key) {
            return Arc::clone(hit);
        }

        let lines = Arc::new(self.highlight(code, language_hint, theme));
        let mut memo = self.memo.borrow_mut();
        memo.retain(|(_, _, _, v), _| *v == version);
        memo.insert(key, Arc::clone(&lines));
        lines
    }

    #[cfg(test)]
    fn memo_len(&self) -> usize {
        self.memo.borrow().len()
    }
}

/// One unstyled run per source line.
fn unstyled(code: &str) -> Vec<StyledLine> {
    let code = sanitize_for_display(code);
    let mut lines: Vec<StyledLine> = code
        .lines()
        .map(|line| StyledLine::plain(line, Style::CodePlain))
        .collect();
    if lines.is_empty() {
        lines.push(StyledLine::empty());
    }
    lines
}

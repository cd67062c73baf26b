//! Width-dependent wrapping of prose spans.
//!
//! Parsing never looks at the terminal width; this runs at layout time so a
//! resize only re-wraps. Link indices ride along on every fragment, which is
//! what lets the layout map wrapped cells back to the link they belong to.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::style::{Style, StyledLine, StyledSpan};

/// Options for wrapping styled spans with hanging indents.
#[derive(Debug, Clone, Default)]
pub struct WrapOptions {
    /// Maximum display width for lines, prefixes included.
    pub width: usize,
    /// Prefix spans for the first line (e.g., "• " for a list bullet).
    pub first_prefix: Vec<StyledSpan>,
    /// Prefix spans for continuation lines.
    pub rest_prefix: Vec<StyledSpan>,
}

impl WrapOptions {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            first_prefix: vec![],
            rest_prefix: vec![],
        }
    }
}

fn spans_width(spans: &[StyledSpan]) -> usize {
    spans.iter().map(|s| s.text.width()).sum()
}

/// Accumulates output lines.
struct Wrapper<'a> {
    opts: &'a WrapOptions,
    lines: Vec<StyledLine>,
    current: Vec<StyledSpan>,
    used: usize,
    first_avail: usize,
    rest_avail: usize,
}

impl<'a> Wrapper<'a> {
    fn new(opts: &'a WrapOptions) -> Self {
        Self {
            opts,
            lines: Vec::new(),
            current: Vec::new(),
            used: 0,
            first_avail: opts.width.saturating_sub(spans_width(&opts.first_prefix)).max(1),
            rest_avail: opts.width.saturating_sub(spans_width(&opts.rest_prefix)).max(1),
        }
    }

    fn avail(&self) -> usize {
        if self.lines.is_empty() {
            self.first_avail
        } else {
            self.rest_avail
        }
    }

    fn remaining(&self) -> usize {
        self.avail().saturating_sub(self.used)
    }

    fn flush(&mut self) {
        let prefix = if self.lines.is_empty() {
            &self.opts.first_prefix
        } else {
            &self.opts.rest_prefix
        };
        let mut spans = prefix.clone();
        spans.append(&mut self.current);
        self.lines.push(StyledLine { spans });
        self.used = 0;
    }

    /// Appends `text` carrying `like`'s style and link, merging with the
    /// previous fragment when both match.
    fn push(&mut self, text: &str, like: &StyledSpan) {
        if text.is_empty() {
            return;
        }
        self.used += text.width();
        if let Some(last) = self.current.last_mut()
            && last.style == like.style
            && last.link == like.link
        {
            last.text.push_str(text);
            return;
        }
        self.current.push(StyledSpan {
            text: text.to_string(),
            style: like.style,
            link: like.link,
        });
    }

    fn push_space(&mut self, like: &StyledSpan) {
        if !self.current.is_empty() && self.remaining() > 0 {
            self.push(" ", like);
        }
    }

    /// Places an unbreakable run, moving to a fresh line if that helps and
    /// hard-breaking by character otherwise.
    fn place(&mut self, text: &str, like: &StyledSpan) {
        let width = text.width();
        if width <= self.remaining() {
            self.push(text, like);
            return;
        }
        if self.used > 0 && width <= self.rest_avail {
            self.flush();
            self.push(text, like);
            return;
        }
        for ch in text.chars() {
            let ch_width = ch.width().unwrap_or(0);
            if ch_width > 0 && ch_width > self.remaining() && self.used > 0 {
                self.flush();
            }
            let mut buf = [0u8; 4];
            self.push(ch.encode_utf8(&mut buf), like);
        }
    }

    fn text_span(&mut self, span: &StyledSpan) {
        let words: Vec<&str> = span.text.split_whitespace().collect();
        if words.is_empty() {
            self.push_space(span);
            return;
        }

        if span.text.starts_with(char::is_whitespace) {
            self.push_space(span);
        }
        for (i, word) in words.iter().enumerate() {
            if i > 0 {
                if 1 + word.width() <= self.remaining() {
                    self.push(" ", span);
                } else {
                    self.flush();
                }
            }
            self.place(word, span);
        }
        if span.text.ends_with(char::is_whitespace) {
            self.push_space(span);
        }
    }

    /// Inline code keeps its inner whitespace.
    fn code_span(&mut self, span: &StyledSpan) {
        self.place(&span.text, span);
    }

    fn finish(mut self) -> Vec<StyledLine> {
        if !self.current.is_empty() || self.lines.is_empty() {
            self.flush();
        }
        self.lines
    }
}

/// Wraps styled spans at word boundaries, preserving style and link index
/// across breaks.
///
/// Newlines inside a span force a line break. Words wider than the line are
/// broken by character.
pub fn wrap_spans(spans: &[StyledSpan], opts: &WrapOptions) -> Vec<StyledLine> {
    if opts.width == 0 {
        let mut all = opts.first_prefix.clone();
        all.extend(spans.iter().cloned());
        return vec![StyledLine { spans: all }];
    }

    let mut wrapper = Wrapper::new(opts);
    for span in spans {
        for (i, part) in span.text.split('\n').enumerate() {
            if i > 0 {
                wrapper.flush();
            }
            let piece = StyledSpan {
                text: part.to_string(),
                style: span.style,
                link: span.link,
            };
            if span.style == Style::CodeInline {
                wrapper.code_span(&piece);
            } else {
                wrapper.text_span(&piece);
            }
        }
    }
    wrapper.finish()
}

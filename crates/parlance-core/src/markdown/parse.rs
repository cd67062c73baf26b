use std::ops::Range;
use std::sync::Arc;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use unicode_width::UnicodeWidthStr;

use super::table::TableBuffer;
use super::{CodeBlock, ImageRef, LinkSpan, MessageLine, ProseLine, SourceLineSpan};
use crate::style::{Style, StyledSpan};
use crate::text::sanitize_for_display;

/// Width-independent result of walking the markdown event stream.
#[derive(Debug, Default)]
pub(super) struct ParsedMarkdown {
    pub lines: Vec<MessageLine>,
    pub code_blocks: Vec<CodeBlock>,
    pub links: Vec<LinkSpan>,
    pub images: Vec<ImageRef>,
}

pub(super) fn parse_markdown(raw: &str) -> ParsedMarkdown {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut builder = Builder::new(raw);
    for (event, range) in Parser::new_ext(raw, options).into_offset_iter() {
        builder.process_event(event, range);
    }
    builder.finish()
}

/// Maps byte offsets to 0-based line numbers.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(raw: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(raw.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&start| start <= offset).saturating_sub(1)
    }

    fn span(&self, range: &Range<usize>) -> SourceLineSpan {
        let first = self.line_of(range.start);
        let last = self.line_of(range.end.saturating_sub(1).max(range.start));
        first..=last
    }
}

#[derive(Debug)]
struct ListState {
    /// `Some(n)` for ordered lists: the number of the next item.
    next_number: Option<u64>,
    marker_width: usize,
}

#[derive(Debug)]
struct PendingCode {
    language: String,
    text: String,
    range: Range<usize>,
    fenced: bool,
}

#[derive(Debug)]
struct PendingImage {
    alt: String,
    src: String,
    range: Range<usize>,
}

struct Builder<'a> {
    raw: &'a str,
    index: LineIndex,
    out: ParsedMarkdown,
    spans: Vec<StyledSpan>,
    style_stack: Vec<Style>,
    lists: Vec<ListState>,
    /// Marker for the list item whose first line hasn't been emitted yet.
    pending_marker: Option<StyledSpan>,
    quote_depth: usize,
    /// Open links; `None` for links rendered as plain text.
    open_links: Vec<Option<usize>>,
    code: Option<PendingCode>,
    image: Option<PendingImage>,
    table: Option<TableBuffer>,
}

impl<'a> Builder<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            raw,
            index: LineIndex::new(raw),
            out: ParsedMarkdown::default(),
            spans: Vec::new(),
            style_stack: vec![Style::Body],
            lists: Vec::new(),
            pending_marker: None,
            quote_depth: 0,
            open_links: Vec::new(),
            code: None,
            image: None,
            table: None,
        }
    }

    fn current_style(&self) -> Style {
        self.style_stack.last().copied().unwrap_or(Style::Body)
    }

    fn push_style(&mut self, style: Style) {
        self.style_stack.push(style);
    }

    fn pop_style(&mut self) {
        if self.style_stack.len() > 1 {
            self.style_stack.pop();
        }
    }

    fn current_link(&self) -> Option<usize> {
        self.open_links.last().copied().flatten()
    }

    fn process_event(&mut self, event: Event<'_>, range: Range<usize>) {
        match event {
            Event::Start(tag) => self.start_tag(tag, range),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.add_text(&text, self.current_style()),
            Event::Code(code) => self.add_inline_code(&code),
            Event::SoftBreak => self.add_text(" ", self.current_style()),
            Event::HardBreak => {
                if self.table.is_some() || self.image.is_some() {
                    self.add_text(" ", self.current_style());
                } else {
                    self.flush_prose();
                }
            }
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                self.spans.push(StyledSpan::new(marker, Style::ListBullet));
            }
            Event::Rule => {
                self.flush_prose();
                self.out.lines.push(MessageLine::Rule);
            }
            // Raw HTML could smuggle terminal escapes; it is never shown.
            Event::Html(_) | Event::InlineHtml(_) => {}
            Event::InlineMath(math) | Event::DisplayMath(math) => {
                self.add_inline_code(&math);
            }
            Event::FootnoteReference(label) => {
                self.add_text(&format!("[^{label}]"), Style::Body);
            }
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>, range: Range<usize>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush_prose();
                self.push_style(match level {
                    HeadingLevel::H1 => Style::H1,
                    HeadingLevel::H2 => Style::H2,
                    _ => Style::H3,
                });
            }
            Tag::CodeBlock(kind) => {
                self.flush_prose();
                let (language, fenced) = match kind {
                    CodeBlockKind::Fenced(info) => (info.trim().to_string(), true),
                    CodeBlockKind::Indented => (String::new(), false),
                };
                self.code = Some(PendingCode {
                    language,
                    text: String::new(),
                    range,
                    fenced,
                });
            }
            Tag::List(start) => {
                self.flush_prose();
                self.lists.push(ListState {
                    next_number: start,
                    marker_width: 2,
                });
            }
            Tag::Item => {
                self.flush_prose();
                let marker = match self.lists.last_mut() {
                    Some(list) => {
                        let marker = match list.next_number {
                            Some(n) => StyledSpan::new(format!("{n}. "), Style::ListNumber),
                            None => StyledSpan::new("• ", Style::ListBullet),
                        };
                        list.marker_width = marker.text.width();
                        marker
                    }
                    None => StyledSpan::new("• ", Style::ListBullet),
                };
                self.pending_marker = Some(marker);
            }
            Tag::BlockQuote(_) => {
                self.flush_prose();
                self.quote_depth += 1;
                self.push_style(Style::BlockQuote);
            }
            Tag::Emphasis => self.push_style(Style::Emphasis),
            Tag::Strong => self.push_style(Style::Strong),
            Tag::Strikethrough => self.push_style(Style::Strikethrough),
            Tag::Link { dest_url, .. } => {
                if self.table.is_some() || self.image.is_some() || !is_usable_url(&dest_url) {
                    if self.table.is_none() && self.image.is_none() {
                        tracing::debug!(url = %dest_url.escape_debug(), "unusable link target, rendering as text");
                    }
                    self.open_links.push(None);
                    return;
                }
                let index = self.out.links.len();
                self.out.links.push(LinkSpan {
                    text: String::new(),
                    url: dest_url.trim().to_string(),
                    source_line_span: self.index.span(&range),
                });
                self.open_links.push(Some(index));
                self.push_style(Style::Link);
            }
            Tag::Image { dest_url, .. } => {
                self.image = Some(PendingImage {
                    alt: String::new(),
                    src: dest_url.trim().to_string(),
                    range,
                });
            }
            Tag::Table(_) => {
                self.flush_prose();
                self.table = Some(TableBuffer::default());
            }
            Tag::TableHead => {
                if let Some(table) = &mut self.table {
                    table.start_head();
                }
            }
            Tag::Superscript | Tag::Subscript => self.push_style(self.current_style()),
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush_prose();
                if self.lists.is_empty() {
                    self.push_blank();
                }
            }
            TagEnd::Heading(_) => {
                self.flush_prose();
                self.pop_style();
                self.push_blank();
            }
            TagEnd::CodeBlock => {
                self.finish_code();
                if self.lists.is_empty() {
                    self.push_blank();
                }
            }
            TagEnd::List(_) => {
                self.flush_prose();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.push_blank();
                }
            }
            TagEnd::Item => {
                self.flush_prose();
                if let Some(marker) = self.pending_marker.take() {
                    // Empty item: still show its marker.
                    let (mut first_prefix, rest_prefix) = self.prefixes();
                    first_prefix.push(marker);
                    self.out.lines.push(MessageLine::Prose(ProseLine {
                        first_prefix,
                        rest_prefix,
                        spans: Vec::new(),
                    }));
                }
                if let Some(list) = self.lists.last_mut()
                    && let Some(n) = list.next_number.as_mut()
                {
                    *n += 1;
                }
            }
            TagEnd::BlockQuote(_) => {
                self.flush_prose();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.pop_style();
                if self.lists.is_empty() {
                    self.push_blank();
                }
            }
            TagEnd::Emphasis
            | TagEnd::Strong
            | TagEnd::Strikethrough
            | TagEnd::Superscript
            | TagEnd::Subscript => self.pop_style(),
            TagEnd::Link => self.finish_link(),
            TagEnd::Image => self.finish_image(),
            TagEnd::Table => {
                if let Some(mut table) = self.table.take() {
                    self.out.lines.push(MessageLine::Table(table.take()));
                    self.push_blank();
                }
            }
            TagEnd::TableHead | TagEnd::TableRow => {
                if let Some(table) = &mut self.table {
                    table.finish_row();
                }
            }
            TagEnd::TableCell => {
                if let Some(table) = &mut self.table {
                    table.finish_cell();
                }
            }
            _ => {}
        }
    }

    fn add_text(&mut self, text: &str, style: Style) {
        if text.is_empty() {
            return;
        }
        if let Some(code) = &mut self.code {
            code.text.push_str(text);
            return;
        }
        if let Some(image) = &mut self.image {
            image.alt.push_str(text);
            return;
        }
        if let Some(table) = &mut self.table {
            table.push_text(&sanitize_for_display(text));
            return;
        }

        let text = sanitize_for_display(text);
        let link = self.current_link();
        if let Some(index) = link {
            self.out.links[index].text.push_str(&text);
        }
        self.spans.push(StyledSpan {
            text: text.into_owned(),
            style,
            link,
        });
    }

    fn add_inline_code(&mut self, code: &str) {
        if let Some(table) = &mut self.table {
            table.push_text(&format!("`{}`", sanitize_for_display(code)));
            return;
        }
        self.add_text(code, Style::CodeInline);
    }

    /// Quote bars plus list indentation for the next prose line. The first
    /// prefix leaves room for a marker the caller appends.
    fn prefixes(&self) -> (Vec<StyledSpan>, Vec<StyledSpan>) {
        let mut base: Vec<StyledSpan> = (0..self.quote_depth)
            .map(|_| StyledSpan::new("│ ", Style::BlockQuote))
            .collect();
        let Some(list) = self.lists.last() else {
            return (base.clone(), base);
        };

        let indent = "  ".repeat(self.lists.len() - 1);
        if !indent.is_empty() {
            base.push(StyledSpan::new(indent, Style::Plain));
        }
        let mut rest = base.clone();
        rest.push(StyledSpan::new(" ".repeat(list.marker_width), Style::Plain));
        (base, rest)
    }

    fn flush_prose(&mut self) {
        if self.spans.is_empty() {
            return;
        }
        let spans = std::mem::take(&mut self.spans);
        let (mut first_prefix, rest_prefix) = self.prefixes();
        match self.pending_marker.take() {
            Some(marker) => first_prefix.push(marker),
            None if !self.lists.is_empty() => first_prefix = rest_prefix.clone(),
            None => {}
        }
        self.out.lines.push(MessageLine::Prose(ProseLine {
            first_prefix,
            rest_prefix,
            spans,
        }));
    }

    fn push_blank(&mut self) {
        if self
            .out
            .lines
            .last()
            .is_some_and(|l| !matches!(l, MessageLine::Blank))
        {
            self.out.lines.push(MessageLine::Blank);
        }
    }

    fn finish_code(&mut self) {
        let Some(code) = self.code.take() else {
            return;
        };
        let mut content = code.text;
        if content.ends_with('\n') {
            content.pop();
        }
        let terminated = !code.fenced || has_closing_fence(&self.raw[code.range.clone()]);
        if !terminated {
            tracing::debug!(language = %code.language, "unterminated code fence");
        }

        let index = self.out.code_blocks.len();
        self.out.code_blocks.push(CodeBlock {
            language: code.language,
            raw_content: Arc::from(content),
            source_line_span: self.index.span(&code.range),
            terminated,
        });
        self.out.lines.push(MessageLine::Code(index));
    }

    fn finish_link(&mut self) {
        let Some(Some(index)) = self.open_links.pop() else {
            return;
        };
        self.pop_style();
        let link = &mut self.out.links[index];
        if link.text.is_empty() {
            // `[](url)`: show the target itself.
            link.text = sanitize_for_display(&link.url).into_owned();
            let text = link.text.clone();
            self.spans.push(StyledSpan::linked(text, Style::Link, index));
        }
    }

    fn finish_image(&mut self) {
        let Some(image) = self.image.take() else {
            return;
        };
        let alt = sanitize_for_display(image.alt.trim()).into_owned();
        if let Some(table) = &mut self.table {
            table.push_text(&format!("[{alt}]"));
            return;
        }

        self.flush_prose();
        let index = self.out.images.len();
        self.out.images.push(ImageRef {
            alt,
            src: image.src,
            source_line_span: self.index.span(&image.range),
        });
        self.out.lines.push(MessageLine::Image(index));
    }

    fn finish(mut self) -> ParsedMarkdown {
        self.finish_code();
        self.flush_prose();
        while matches!(self.out.lines.last(), Some(MessageLine::Blank)) {
            self.out.lines.pop();
        }
        self.out
    }
}

fn is_usable_url(url: &str) -> bool {
    !url.trim().is_empty() && !url.chars().any(char::is_control)
}

/// True when the fenced block's source ends with a closing fence at least as
/// long as the opening one.
fn has_closing_fence(source: &str) -> bool {
    let strip = |line: &'_ str| -> String {
        line.trim_start_matches([' ', '\t', '>'])
            .trim_end()
            .to_string()
    };
    let mut lines = source.lines();
    let Some(opening) = lines.next().map(strip) else {
        return false;
    };
    let Some(fence) = opening.chars().next().filter(|c| matches!(c, '`' | '~')) else {
        return false;
    };
    let fence_len = opening.chars().take_while(|&c| c == fence).count();
    let Some(closing) = lines.last().map(strip) else {
        return false;
    };
    closing.len() >= fence_len && closing.chars().all(|c| c == fence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prose(parsed: &ParsedMarkdown) -> Vec<&ProseLine> {
        parsed
            .lines
            .iter()
            .filter_map(|l| match l {
                MessageLine::Prose(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn has_style(parsed: &ParsedMarkdown, style: Style) -> bool {
        prose(parsed)
            .iter()
            .any(|p| p.spans.iter().any(|s| s.style == style))
    }

    fn text_of(line: &ProseLine) -> String {
        line.spans.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn test_inline_styles() {
        let parsed = parse_markdown("**bold**, *italic*, ~~gone~~ and `code`");
        assert!(has_style(&parsed, Style::Strong));
        assert!(has_style(&parsed, Style::Emphasis));
        assert!(has_style(&parsed, Style::Strikethrough));
        assert!(has_style(&parsed, Style::CodeInline));
        assert!(has_style(&parsed, Style::Body));
    }

    #[test]
    fn test_inline_code_keeps_surrounding_spaces() {
        let parsed = parse_markdown("word `code` word");
        assert_eq!(text_of(prose(&parsed)[0]), "word code word");
    }

    #[test]
    fn test_heading_styles() {
        let parsed = parse_markdown("# H1\n\n## H2\n\n### H3");
        assert!(has_style(&parsed, Style::H1));
        assert!(has_style(&parsed, Style::H2));
        assert!(has_style(&parsed, Style::H3));
    }

    #[test]
    fn test_link_extracted_with_line_span() {
        let parsed = parse_markdown("intro\n\nSee [the docs](https://example.com/a) now");
        assert_eq!(parsed.links.len(), 1);
        let link = &parsed.links[0];
        assert_eq!(link.text, "the docs");
        assert_eq!(link.url, "https://example.com/a");
        assert_eq!(link.source_line_span, 2..=2);

        let linked: Vec<_> = prose(&parsed)
            .iter()
            .flat_map(|p| p.spans.iter())
            .filter(|s| s.link == Some(0))
            .collect();
        assert!(!linked.is_empty());
        assert!(linked.iter().all(|s| s.style == Style::Link));
    }

    #[test]
    fn test_malformed_links_stay_text() {
        let parsed = parse_markdown("[broken](  ) and [dangling](https://x");
        assert!(parsed.links.is_empty());
        let all: String = prose(&parsed).iter().map(|p| text_of(p)).collect();
        assert!(all.contains("broken"));
        assert!(all.contains("dangling"));
    }

    #[test]
    fn test_empty_link_text_shows_url() {
        let parsed = parse_markdown("[](https://x.dev)");
        assert_eq!(parsed.links[0].text, "https://x.dev");
    }

    #[test]
    fn test_image_becomes_anchor() {
        let parsed = parse_markdown("Look:\n\n![a diagram](diagram.svg)\n\nafter");
        assert_eq!(parsed.images.len(), 1);
        assert_eq!(parsed.images[0].alt, "a diagram");
        assert_eq!(parsed.images[0].src, "diagram.svg");
        assert_eq!(parsed.images[0].source_line_span, 2..=2);
        assert!(parsed.lines.contains(&MessageLine::Image(0)));
    }

    #[test]
    fn test_raw_html_dropped() {
        let parsed = parse_markdown("before <b>bold</b>\n\n<div>\nblock\n</div>\n\nafter");
        let all: String = prose(&parsed).iter().map(|p| text_of(p)).collect();
        assert!(!all.contains('<'));
        assert!(all.contains("before"));
        assert!(all.contains("after"));
    }

    #[test]
    fn test_control_characters_stripped() {
        let parsed = parse_markdown("evil \u{1b}[31mred");
        let all: String = prose(&parsed).iter().map(|p| text_of(p)).collect();
        assert!(!all.contains('\u{1b}'));
    }

    #[test]
    fn test_list_markers_and_nesting() {
        let parsed = parse_markdown("- one\n  - inner\n- two\n\n3. three\n4. four");
        let lines = prose(&parsed);
        assert_eq!(lines[0].first_prefix.last().map(|s| s.text.as_str()), Some("• "));
        assert_eq!(text_of(lines[0]), "one");
        // nested item is indented one level
        assert_eq!(lines[1].first_prefix[0].text, "  ");
        assert_eq!(text_of(lines[1]), "inner");
        assert_eq!(text_of(lines[2]), "two");
        let numbers: Vec<_> = lines
            .iter()
            .filter_map(|p| p.first_prefix.last())
            .filter(|s| s.style == Style::ListNumber)
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(numbers, vec!["3. ", "4. "]);
    }

    #[test]
    fn test_task_list_marker() {
        let parsed = parse_markdown("- [x] done\n- [ ] todo");
        let lines = prose(&parsed);
        assert_eq!(text_of(lines[0]), "[x] done");
        assert_eq!(text_of(lines[1]), "[ ] todo");
    }

    #[test]
    fn test_blockquote_prefix() {
        let parsed = parse_markdown("> quoted text");
        let line = prose(&parsed)[0];
        assert_eq!(line.first_prefix[0].text, "│ ");
        assert_eq!(line.rest_prefix[0].text, "│ ");
        assert!(line.spans.iter().all(|s| s.style == Style::BlockQuote));
    }

    #[test]
    fn test_hard_break_splits_prose() {
        let parsed = parse_markdown("one  \ntwo");
        assert_eq!(prose(&parsed).len(), 2);
    }

    #[test]
    fn test_table_collected() {
        let parsed = parse_markdown("| A | B |\n|---|---|\n| 1 | [x](https://x) |");
        let table = parsed
            .lines
            .iter()
            .find_map(|l| match l {
                MessageLine::Table(t) => Some(t),
                _ => None,
            })
            .expect("table");
        assert_eq!(table.header, vec!["A", "B"]);
        assert_eq!(table.rows, vec![vec!["1", "x"]]);
        assert!(parsed.links.is_empty());
    }

    #[test]
    fn test_rule_and_trailing_blanks() {
        let parsed = parse_markdown("a\n\n---\n\nb\n\n");
        assert!(parsed.lines.contains(&MessageLine::Rule));
        assert!(!matches!(parsed.lines.last(), Some(MessageLine::Blank)));
    }

    #[test]
    fn test_fence_detection() {
        assert!(has_closing_fence("```rust\nfn a(){}\n```"));
        assert!(has_closing_fence("~~~~\nx\n~~~~~\n"));
        assert!(!has_closing_fence("````\nx\n```"));
        assert!(!has_closing_fence("```rust\nfn a(){}\nmore"));
        assert!(!has_closing_fence("```"));
    }

    #[test]
    fn test_code_block_keeps_full_info_string() {
        let parsed = parse_markdown("```rust ignore\nx\n```\n\n```python,linenos\ny\n```");
        assert_eq!(parsed.code_blocks[0].language, "rust ignore");
        assert_eq!(parsed.code_blocks[0].language_hint(), "rust");
        assert_eq!(parsed.code_blocks[1].language, "python,linenos");
        assert_eq!(parsed.code_blocks[1].language_hint(), "python");
        assert_eq!(parsed.code_blocks[1].source_line_span, 4..=6);
    }

    #[test]
    fn test_indented_code_block() {
        let parsed = parse_markdown("text\n\n    let x = 1;\n    let y = 2;\n");
        assert_eq!(parsed.code_blocks.len(), 1);
        assert_eq!(parsed.code_blocks[0].language, "");
        assert!(parsed.code_blocks[0].terminated);
        assert_eq!(&*parsed.code_blocks[0].raw_content, "let x = 1;\nlet y = 2;");
    }

    #[test]
    fn test_empty_input() {
        let parsed = parse_markdown("");
        assert!(parsed.lines.is_empty());
        assert!(parsed.code_blocks.is_empty());
    }
}

//! Per-message layout at a fixed width.
//!
//! Output rows and click regions are relative to the message's first row;
//! [`ChatView`](super::ChatView) offsets them into screen coordinates.

use std::path::Path;
use std::sync::Arc;

use unicode_width::UnicodeWidthStr;

use super::{FrameLine, FrameSpan};
use crate::capability::ImageProtocol;
use crate::click::{ClickAction, CodeBlockRef};
use crate::hyperlink::{EncodedLink, encode};
use crate::image::{ImageLookup, ImageRenderer, RasterImage, RasterRequest, fallback_text};
use crate::markdown::{
    CodeBlock, ImageRef, MessageLine, ProseLine, StyledMessage, WrapOptions, wrap_spans,
};
use crate::message::{ChatMessage, Role};
use crate::style::{Style, StyledLine, StyledSpan};
use crate::text::truncate_to_width;

/// Width of the `[copy]` icon at the right end of a code block header.
pub const COPY_ICON: &str = "[copy]";
pub const COPY_ICON_WIDTH: u16 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct RelRegion {
    pub row: usize,
    pub col: u16,
    pub width: u16,
    pub action: ClickAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct RelImage {
    pub row: usize,
    pub col: u16,
    pub cols: u16,
    pub rows: u16,
    pub image: Arc<RasterImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct MessageLayout {
    pub lines: Vec<FrameLine>,
    pub regions: Vec<RelRegion>,
    pub images: Vec<RelImage>,
    pub pending: Vec<RasterRequest>,
    /// Raster cache lookups made while laying out.
    pub image_refs: usize,
}

impl MessageLayout {
    pub fn height(&self) -> usize {
        self.lines.len()
    }
}

pub(super) struct LayoutInput<'a> {
    pub message: &'a ChatMessage,
    pub styled: &'a StyledMessage,
    pub width: u16,
    pub supports_osc8: bool,
    pub images: &'a mut ImageRenderer,
    pub base_dir: Option<&'a Path>,
}

pub(super) fn layout_message(input: LayoutInput<'_>) -> MessageLayout {
    let LayoutInput {
        message,
        styled,
        width,
        supports_osc8,
        images,
        base_dir,
    } = input;

    let links: Vec<EncodedLink> = styled
        .link_regions
        .iter()
        // An autolink already shows its URL, so it prints bare either way.
        .map(|l| encode(&l.text, &l.url, supports_osc8 || l.text == l.url))
        .collect();
    let mut builder = Builder {
        out: MessageLayout::default(),
        width: usize::from(width.max(1)),
        supports_osc8,
        link_budget: links.iter().map(|l| l.width).collect(),
        links,
        link_urls: styled
            .link_regions
            .iter()
            .map(|l| Arc::<str>::from(l.url.as_str()))
            .collect(),
        styled,
    };

    let (label_style, body_style) = match message.role {
        Role::User => (Style::RoleUser, Style::UserBody),
        Role::Assistant => (Style::RoleAssistant, Style::Body),
        Role::System => (Style::RoleSystem, Style::SystemBody),
    };
    builder.push_plain(message.role.label(), label_style);

    for line in &styled.styled_lines {
        match line {
            MessageLine::Prose(prose) => builder.prose(prose, body_style),
            MessageLine::Verbatim(line) => builder.push_truncated(line.clone(), false),
            MessageLine::Rule => builder.push_plain(&"─".repeat(builder.width), Style::Rule),
            MessageLine::Blank => builder.out.lines.push(FrameLine::default()),
            MessageLine::Table(table) => {
                for row in table.render(builder.width) {
                    builder.push_plain(&row, body_style);
                }
            }
            MessageLine::Code(index) => builder.code_block(message, *index),
            MessageLine::Image(index) => {
                if let Some(image) = styled.images.get(*index) {
                    builder.image(message, image, images, base_dir);
                }
            }
        }
    }

    builder.out.lines.push(FrameLine::default());
    builder.out
}

struct Builder<'a> {
    out: MessageLayout,
    width: usize,
    supports_osc8: bool,
    /// Encoded form of each link; `width` is what its click regions may cover.
    links: Vec<EncodedLink>,
    /// Columns each link may still claim across wrapped rows.
    link_budget: Vec<usize>,
    link_urls: Vec<Arc<str>>,
    styled: &'a StyledMessage,
}

impl Builder<'_> {
    fn row(&self) -> usize {
        self.out.lines.len()
    }

    fn push_plain(&mut self, text: &str, style: Style) {
        self.push_truncated(StyledLine::plain(text, style), false);
    }

    fn push_truncated(&mut self, line: StyledLine, panel: bool) {
        let spans = truncate_spans(line.spans, self.width)
            .into_iter()
            .map(|s| FrameSpan::new(s.text, s.style))
            .collect();
        self.out.lines.push(FrameLine { spans, panel });
    }

    fn prose(&mut self, line: &ProseLine, body: Style) {
        let spans = self.expand_links(&line.spans, body);
        let opts = WrapOptions {
            width: self.width,
            first_prefix: line.first_prefix.clone(),
            rest_prefix: line.rest_prefix.clone(),
        };
        for wrapped in wrap_spans(&spans, &opts) {
            self.push_linked(wrapped);
        }
    }

    /// Applies the role's body style and, without OSC8, appends the ` [url]`
    /// suffix after each link's visible text.
    fn expand_links(&self, spans: &[StyledSpan], body: Style) -> Vec<StyledSpan> {
        let mut out = Vec::with_capacity(spans.len());
        for (i, span) in spans.iter().enumerate() {
            let mut span = span.clone();
            if span.style == Style::Body {
                span.style = body;
            }
            let link = span.link;
            out.push(span);

            let Some(link) = link else { continue };
            let link_ends = spans.get(i + 1).is_none_or(|next| next.link != Some(link));
            if self.supports_osc8 || !link_ends {
                continue;
            }
            let suffix = self.styled.link_regions.get(link).and_then(|target| {
                self.links
                    .get(link)?
                    .display
                    .strip_prefix(target.text.as_str())
                    .filter(|s| !s.is_empty())
            });
            if let Some(suffix) = suffix {
                out.push(StyledSpan::linked(suffix, Style::LinkUrl, link));
            }
        }
        out
    }

    /// Emits a wrapped line, registering one region per contiguous link run.
    fn push_linked(&mut self, line: StyledLine) {
        let row = self.row();
        let mut col: usize = 0;
        let mut spans = Vec::with_capacity(line.spans.len());

        for span in truncate_spans(line.spans, self.width) {
            let width = span.text.width();
            let mut frame_span = FrameSpan::new(span.text, span.style);

            let link = span
                .link
                .and_then(|l| Some((l, Arc::clone(self.link_urls.get(l)?))));
            if let Some((index, url)) = link {
                if self.supports_osc8 {
                    frame_span.url = Some(Arc::clone(&url));
                }
                let claimed = self.claim_link_width(index, width);
                self.register_link(row, col, claimed, &url);
            }
            col += width;
            spans.push(frame_span);
        }
        self.out.lines.push(FrameLine {
            spans,
            panel: false,
        });
    }

    fn claim_link_width(&mut self, link: usize, width: usize) -> usize {
        let Some(left) = self.link_budget.get_mut(link) else {
            return 0;
        };
        let claimed = width.min(*left);
        *left -= claimed;
        claimed
    }

    fn register_link(&mut self, row: usize, col: usize, width: usize, url: &Arc<str>) {
        if width == 0 {
            return;
        }
        let col = clamp_u16(col);
        let width = clamp_u16(width);
        if let Some(last) = self.out.regions.last_mut()
            && last.row == row
            && last.col + last.width == col
            && matches!(&last.action, ClickAction::OpenLink(u) if u.as_str() == &**url)
        {
            last.width += width;
            return;
        }
        self.out.regions.push(RelRegion {
            row,
            col,
            width,
            action: ClickAction::OpenLink(url.to_string()),
        });
    }

    fn code_block(&mut self, message: &ChatMessage, index: usize) {
        let styled = self.styled;
        let (Some(block), Some(lines)) = (
            styled.code_blocks.get(index),
            styled.code_highlights.get(index),
        ) else {
            return;
        };
        self.code_header(message, index, block);

        for line in lines.iter() {
            let mut spans = vec![StyledSpan::new("│ ", Style::CodeFrame)];
            spans.extend(truncate_spans(line.spans.clone(), self.width.saturating_sub(2)));
            self.push_truncated(StyledLine { spans }, true);
        }

        let footer = format!("╰{}", "─".repeat(self.width.saturating_sub(1)));
        self.push_truncated(StyledLine::plain(footer, Style::CodeFrame), true);
    }

    /// `╭─ {language}` padded to the width, with the copy icon at the right.
    fn code_header(&mut self, message: &ChatMessage, index: usize, block: &CodeBlock) {
        let icon_width = usize::from(COPY_ICON_WIDTH).min(self.width);
        let icon_col = self.width - icon_width;

        let label = if block.language.is_empty() {
            "╭─".to_string()
        } else {
            format!("╭─ {}", block.language)
        };
        let label = truncate_to_width(&label, icon_col.saturating_sub(1)).to_string();
        let pad = icon_col.saturating_sub(label.width());

        let spans = vec![
            StyledSpan::new(label, Style::CodeFrame),
            StyledSpan::new(" ".repeat(pad), Style::CodeFrame),
            StyledSpan::new(truncate_to_width(COPY_ICON, icon_width), Style::CodeCopyIcon),
        ];
        let row = self.row();
        self.push_truncated(StyledLine { spans }, true);
        self.out.regions.push(RelRegion {
            row,
            col: clamp_u16(icon_col),
            width: clamp_u16(icon_width),
            action: ClickAction::CopyCode(CodeBlockRef {
                message_id: message.id,
                block_index: index,
                content: Arc::clone(&block.raw_content),
            }),
        });
    }

    fn image(
        &mut self,
        message: &ChatMessage,
        image: &ImageRef,
        renderer: &mut ImageRenderer,
        base_dir: Option<&Path>,
    ) {
        if renderer.protocol() == ImageProtocol::None {
            self.push_plain(&fallback_text(&image.alt), Style::ImageAlt);
            return;
        }
        let target_width_px = renderer.options().target_width_px(clamp_u16(self.width));
        self.out.image_refs += 1;
        match renderer.lookup(&image.src, target_width_px) {
            ImageLookup::Ready(raster) => {
                let (cols, rows) = renderer
                    .options()
                    .cells_for(raster.width_px, raster.height_px);
                self.out.images.push(RelImage {
                    row: self.row(),
                    col: 0,
                    cols: cols.min(clamp_u16(self.width)),
                    rows,
                    image: raster,
                });
                for _ in 0..rows {
                    self.out.lines.push(FrameLine::default());
                }
            }
            ImageLookup::Failed => {
                self.push_plain(&fallback_text(&image.alt), Style::ImageAlt);
            }
            ImageLookup::Missing => {
                self.push_plain(&format!("⋯ {}", image.alt), Style::ImageAlt);
                self.out.pending.push(RasterRequest {
                    message_id: message.id,
                    message_hash: message.content_hash(),
                    src: image.src.clone(),
                    alt: image.alt.clone(),
                    base_dir: base_dir.map(Path::to_path_buf),
                    target_width_px,
                });
            }
        }
    }
}

fn clamp_u16(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

/// Cuts spans so their total width is at most `max_width`.
fn truncate_spans(spans: Vec<StyledSpan>, max_width: usize) -> Vec<StyledSpan> {
    let mut used = 0;
    let mut out = Vec::with_capacity(spans.len());
    for mut span in spans {
        let remaining = max_width.saturating_sub(used);
        if remaining == 0 {
            break;
        }
        let width = span.text.width();
        if width > remaining {
            span.text = truncate_to_width(&span.text, remaining).to_string();
            used = max_width;
        } else {
            used += width;
        }
        if !span.text.is_empty() {
            out.push(span);
        }
    }
    out
}

//! Frame assembly.
//!
//! A [`Frame`] is the complete description of one render tick: the visible
//! lines, click regions in screen coordinates, image placements and the
//! scrollbar's inputs. Nothing in it outlives the tick; the next call to
//! [`ChatView::frame`] builds everything again from the caches.

mod layout;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use unicode_width::UnicodeWidthStr;

pub use layout::{COPY_ICON, COPY_ICON_WIDTH};
use layout::{LayoutInput, MessageLayout, layout_message};

use crate::capability::{ImageProtocol, TerminalCapabilities};
use crate::click::{CellRect, ClickRegistry};
use crate::highlight::SyntaxHighlighter;
use crate::image::{ImageOptions, ImageRenderer, RasterImage, RasterRequest};
use crate::markdown::{MarkdownRenderer, StyledMessageCache};
use crate::message::{ChatLog, ChatMessage, MessageId};
use crate::scroll::ScrollController;
use crate::style::Style;
use crate::theme::{ThemeManager, ThemeVersion};

/// Columns reserved for the scrollbar, whether or not it is drawn.
pub const GUTTER_WIDTH: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSpan {
    pub text: String,
    pub style: Style,
    /// OSC8 target. Only set when the terminal supports hyperlinks.
    pub url: Option<Arc<str>>,
}

impl FrameSpan {
    pub fn new(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            style,
            url: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameLine {
    pub spans: Vec<FrameSpan>,
    /// Part of a code panel, painted on the code theme's background.
    pub panel: bool,
}

impl FrameLine {
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn width(&self) -> usize {
        self.spans.iter().map(|s| s.text.width()).sum()
    }
}

/// Splits `area` into the content column and the fixed gutter at its right.
///
/// The content width depends only on `area`, never on whether the content
/// overflows.
pub fn split_area(area: CellRect) -> (CellRect, CellRect) {
    let gutter = GUTTER_WIDTH.min(area.width);
    let content = CellRect::new(area.x, area.y, area.width - gutter, area.height);
    let gutter = CellRect::new(
        area.x.saturating_add(content.width),
        area.y,
        gutter,
        area.height,
    );
    (content, gutter)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollbarMetrics {
    pub total_messages: usize,
    pub selected: Option<usize>,
    pub viewport_height: usize,
    pub content_height: usize,
    /// First content row shown at the top of the viewport.
    pub offset: usize,
}

impl ScrollbarMetrics {
    pub fn overflows(&self) -> bool {
        self.content_height > self.viewport_height
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePlacement {
    pub rect: CellRect,
    pub image: Arc<RasterImage>,
}

#[derive(Debug, Default)]
pub struct Frame {
    pub content_area: CellRect,
    pub gutter_area: CellRect,
    /// Visible rows, top to bottom. May be shorter than the viewport.
    pub lines: Vec<FrameLine>,
    pub clicks: ClickRegistry,
    /// Images whose cells are entirely inside the viewport.
    pub images: Vec<ImagePlacement>,
    /// Rasterizations visible messages are waiting on.
    pub pending: Vec<RasterRequest>,
    pub scrollbar: ScrollbarMetrics,
}

/// Per-frame collaborators owned by the caller.
pub struct RenderContext<'a> {
    pub themes: &'a ThemeManager,
    pub images: &'a mut ImageRenderer,
    pub capabilities: TerminalCapabilities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LayoutKey {
    theme_version: ThemeVersion,
    width: u16,
    osc8: bool,
    protocol: ImageProtocol,
}

#[derive(Debug)]
struct CachedLayout {
    key: LayoutKey,
    /// Image generation at layout time; only relevant when the message has
    /// images.
    image_generation: Option<u64>,
    layout: Arc<MessageLayout>,
}

/// Renders a [`ChatLog`] into frames, caching parses and layouts.
#[derive(Debug)]
pub struct ChatView {
    renderer: MarkdownRenderer,
    styled: StyledMessageCache,
    layouts: HashMap<MessageId, CachedLayout>,
    base_dir: Option<PathBuf>,
}

impl Default for ChatView {
    fn default() -> Self {
        Self::new(MarkdownRenderer::new(SyntaxHighlighter::with_default_syntaxes()))
    }
}

impl ChatView {
    pub fn new(renderer: MarkdownRenderer) -> Self {
        Self {
            renderer,
            styled: StyledMessageCache::new(),
            layouts: HashMap::new(),
            base_dir: None,
        }
    }

    /// Directory relative image paths resolve against.
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Drops cached work for a removed or superseded message.
    pub fn forget(&mut self, id: MessageId) {
        self.styled.forget(id);
        self.layouts.remove(&id);
    }

    /// Lays out the visible part of `log` inside `area`.
    pub fn frame(
        &mut self,
        log: &ChatLog,
        scroll: &ScrollController,
        ctx: &mut RenderContext<'_>,
        area: CellRect,
    ) -> Frame {
        let (content_area, gutter_area) = split_area(area);
        self.prune(log);

        let viewport = usize::from(content_area.height);
        let mut frame = Frame {
            content_area,
            gutter_area,
            ..Frame::default()
        };
        frame.scrollbar = ScrollbarMetrics {
            total_messages: log.len(),
            selected: scroll.effective_index(),
            viewport_height: viewport,
            ..ScrollbarMetrics::default()
        };
        if content_area.width == 0 || log.is_empty() {
            return frame;
        }

        let layouts: Vec<Arc<MessageLayout>> = log
            .iter()
            .map(|message| self.layout(message, ctx, content_area.width))
            .collect();
        let mut starts = Vec::with_capacity(layouts.len());
        let mut content_height = 0;
        for layout in &layouts {
            starts.push(content_height);
            content_height += layout.height();
        }

        let max_offset = content_height.saturating_sub(viewport);
        let offset = if scroll.auto_scroll() {
            max_offset
        } else {
            scroll
                .effective_index()
                .and_then(|index| starts.get(index).copied())
                .unwrap_or(max_offset)
                .min(max_offset)
        };
        let end = offset + viewport;

        let mut visible_images = 0;
        for (layout, &start) in layouts.iter().zip(&starts) {
            if start + layout.height() <= offset || start >= end {
                continue;
            }
            visible_images += layout.image_refs;
            let first = offset.saturating_sub(start);
            let last = (end - start).min(layout.height());
            frame.lines.extend(layout.lines[first..last].iter().cloned());

            for region in &layout.regions {
                let row = start + region.row;
                if row < offset || row >= end {
                    continue;
                }
                let rect = CellRect::new(
                    content_area.x.saturating_add(region.col),
                    content_area.y.saturating_add(to_u16(row - offset)),
                    region
                        .width
                        .min(content_area.width.saturating_sub(region.col)),
                    1,
                );
                frame.clicks.register(rect, region.action.clone());
            }

            for image in &layout.images {
                let top = start + image.row;
                if top < offset || top + usize::from(image.rows) > end {
                    continue;
                }
                frame.images.push(ImagePlacement {
                    rect: CellRect::new(
                        content_area.x.saturating_add(image.col),
                        content_area.y.saturating_add(to_u16(top - offset)),
                        image.cols,
                        image.rows,
                    ),
                    image: Arc::clone(&image.image),
                });
            }
            frame.pending.extend(layout.pending.iter().cloned());
        }

        ctx.images.reserve(visible_images);

        frame.scrollbar.content_height = content_height;
        frame.scrollbar.offset = offset;
        frame
    }

    /// Renders every message as plain text lines `width` columns wide.
    ///
    /// Links use the bracketed fallback and images their alt text.
    pub fn render_plain(&mut self, log: &ChatLog, themes: &ThemeManager, width: u16) -> Vec<String> {
        let mut images = ImageRenderer::new(ImageProtocol::None, ImageOptions::default());
        let mut ctx = RenderContext {
            themes,
            images: &mut images,
            capabilities: TerminalCapabilities::conservative(),
        };
        let mut out = Vec::new();
        for message in log.iter() {
            let layout = self.layout(message, &mut ctx, width.max(1));
            out.extend(
                layout
                    .lines
                    .iter()
                    .map(|line| line.text().trim_end().to_string()),
            );
        }
        out
    }

    fn layout(
        &mut self,
        message: &ChatMessage,
        ctx: &mut RenderContext<'_>,
        width: u16,
    ) -> Arc<MessageLayout> {
        let key = LayoutKey {
            theme_version: ctx.themes.version(),
            width,
            osc8: ctx.capabilities.supports_osc8,
            protocol: ctx.images.protocol(),
        };
        let generation = ctx.images.generation();
        if let Some(cached) = self.layouts.get(&message.id)
            && cached.key == key
            && cached.image_generation.is_none_or(|g| g == generation)
        {
            return Arc::clone(&cached.layout);
        }

        let styled = self
            .styled
            .get_or_parse(message, &self.renderer, ctx.themes);
        let layout = Arc::new(layout_message(LayoutInput {
            message,
            styled: &styled,
            width,
            supports_osc8: ctx.capabilities.supports_osc8,
            images: &mut *ctx.images,
            base_dir: self.base_dir.as_deref(),
        }));
        tracing::trace!(
            message_id = %message.id,
            width,
            height = layout.height(),
            "laid out message"
        );
        self.layouts.insert(
            message.id,
            CachedLayout {
                key,
                image_generation: (!styled.images.is_empty()).then_some(generation),
                layout: Arc::clone(&layout),
            },
        );
        layout
    }

    /// Drops cached work for messages no longer in `log`.
    fn prune(&mut self, log: &ChatLog) {
        if self.layouts.len() <= log.len() {
            return;
        }
        let live: HashSet<MessageId> = log.iter().map(|m| m.id).collect();
        let gone: Vec<MessageId> = self
            .layouts
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();
        for id in gone {
            self.forget(id);
        }
    }
}

fn to_u16(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::click::ClickAction;
    use crate::hash::ContentHash;
    use crate::hyperlink::encode;
    use crate::image::{ImageOutput, RasterResult};
    use crate::message::Role;
    use crate::theme::ColorMode;

    struct Harness {
        view: ChatView,
        themes: ThemeManager,
        images: ImageRenderer,
        capabilities: TerminalCapabilities,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                view: ChatView::default(),
                themes: ThemeManager::builtin(ColorMode::Dark),
                images: ImageRenderer::new(ImageProtocol::None, ImageOptions::default()),
                capabilities: TerminalCapabilities::conservative(),
            }
        }

        fn frame(&mut self, log: &ChatLog, scroll: &ScrollController, area: CellRect) -> Frame {
            let mut ctx = RenderContext {
                themes: &self.themes,
                images: &mut self.images,
                capabilities: self.capabilities,
            };
            self.view.frame(log, scroll, &mut ctx, area)
        }
    }

    fn log_of(count: usize) -> ChatLog {
        let mut log = ChatLog::new();
        for i in 0..count {
            log.push(Role::Assistant, &format!("message {i}"));
        }
        log
    }

    #[test]
    fn test_gutter_width_independent_of_overflow() {
        let area = CellRect::new(0, 0, 80, 12);
        let mut harness = Harness::new();

        let short = log_of(1);
        let fits = harness.frame(&short, &ScrollController::with_len(1, 2), area);
        let long = log_of(40);
        let overflows = harness.frame(&long, &ScrollController::with_len(40, 2), area);

        assert!(!fits.scrollbar.overflows());
        assert!(overflows.scrollbar.overflows());
        assert_eq!(fits.content_area, overflows.content_area);
        assert_eq!(fits.content_area.width, 79);
        assert_eq!(fits.gutter_area, CellRect::new(79, 0, 1, 12));
    }

    #[test]
    fn test_code_block_registers_one_copy_region() {
        let mut log = ChatLog::new();
        log.push(Role::Assistant, "```rust\nfn main(){}\n```");
        let mut harness = Harness::new();
        let frame = harness.frame(&log, &ScrollController::with_len(1, 2), CellRect::new(0, 0, 40, 10));

        let copies: Vec<_> = frame
            .clicks
            .regions()
            .iter()
            .filter(|r| matches!(r.action, ClickAction::CopyCode(_)))
            .collect();
        assert_eq!(copies.len(), 1);
        let rect = copies[0].rect;
        assert_eq!(rect.width, COPY_ICON_WIDTH);
        assert_eq!(rect.x, 39 - COPY_ICON_WIDTH);

        match frame.clicks.dispatch(rect.x, rect.y) {
            Some(ClickAction::CopyCode(block)) => assert_eq!(&*block.content, "fn main(){}"),
            other => panic!("expected copy action, got {other:?}"),
        }
        assert!(frame.clicks.dispatch(0, rect.y).is_none());
        assert!(frame.lines[rect.y as usize].text().ends_with(COPY_ICON));
    }

    #[test]
    fn test_link_region_uses_rendered_width() {
        let mut log = ChatLog::new();
        log.push(Role::Assistant, "[Docs](https://x)");
        let scroll = ScrollController::with_len(1, 2);
        let area = CellRect::new(0, 0, 40, 10);

        let mut harness = Harness::new();
        let plain = harness.frame(&log, &scroll, area);
        let region = &plain.clicks.regions()[0];
        assert_eq!(region.action, ClickAction::OpenLink("https://x".to_string()));
        assert_eq!(
            usize::from(region.rect.width),
            encode("Docs", "https://x", false).width
        );
        assert_eq!(plain.lines[1].text(), "Docs [https://x]");

        harness.capabilities.supports_osc8 = true;
        let linked = harness.frame(&log, &scroll, area);
        let region = &linked.clicks.regions()[0];
        assert_eq!(
            usize::from(region.rect.width),
            encode("Docs", "https://x", true).width
        );
        assert_eq!(linked.lines[1].spans[0].url.as_deref(), Some("https://x"));
    }

    #[test]
    fn test_wrapped_link_regions_stay_within_encoded_width() {
        let mut log = ChatLog::new();
        log.push(Role::Assistant, "[alpha beta gamma](https://example.com/long)");
        let scroll = ScrollController::with_len(1, 2);
        let mut harness = Harness::new();
        let frame = harness.frame(&log, &scroll, CellRect::new(0, 0, 13, 20));

        let regions = frame.clicks.regions();
        let rows: HashSet<u16> = regions.iter().map(|r| r.rect.y).collect();
        assert!(rows.len() > 1);
        assert!(regions.iter().all(|r| {
            r.action == ClickAction::OpenLink("https://example.com/long".to_string())
        }));
        let covered: usize = regions.iter().map(|r| usize::from(r.rect.width)).sum();
        let encoded = encode("alpha beta gamma", "https://example.com/long", false);
        assert!(covered <= encoded.width);
        assert!(covered >= "alphabetagamma".len());
    }

    #[test]
    fn test_pinned_shows_bottom_and_scrolled_shows_selection() {
        // Each message is a label, one prose line and a separator.
        let log = log_of(10);
        let area = CellRect::new(0, 0, 40, 6);
        let mut harness = Harness::new();

        let pinned = harness.frame(&log, &ScrollController::with_len(10, 2), area);
        assert_eq!(pinned.scrollbar.content_height, 30);
        assert_eq!(pinned.scrollbar.offset, 24);
        assert_eq!(pinned.lines[1].text(), "message 8");

        let mut scroll = ScrollController::with_len(10, 2);
        scroll.scroll_to_top();
        scroll.scroll_by(3);
        let scrolled = harness.frame(&log, &scroll, area);
        assert_eq!(scrolled.scrollbar.offset, 9);
        assert_eq!(scrolled.lines.len(), 6);
        assert_eq!(scrolled.lines[1].text(), "message 3");
    }

    #[test]
    fn test_regions_outside_viewport_are_not_registered() {
        let mut log = ChatLog::new();
        log.push(Role::Assistant, "[top](https://top)");
        for i in 0..20 {
            log.push(Role::User, &format!("filler {i}"));
        }
        let mut harness = Harness::new();
        let frame = harness.frame(&log, &ScrollController::with_len(21, 2), CellRect::new(0, 0, 40, 8));
        assert!(frame.clicks.is_empty());
        assert!(
            frame
                .clicks
                .regions()
                .iter()
                .all(|r| r.rect.y < frame.content_area.height)
        );
    }

    #[test]
    fn test_removed_messages_are_pruned() {
        let mut log = log_of(3);
        let mut harness = Harness::new();
        let area = CellRect::new(0, 0, 40, 20);
        harness.frame(&log, &ScrollController::with_len(3, 2), area);
        assert_eq!(harness.view.layouts.len(), 3);

        let first = log.at(0).map(|m| m.id).unwrap();
        log.remove(first);
        harness.frame(&log, &ScrollController::with_len(2, 2), area);
        assert_eq!(harness.view.layouts.len(), 2);
        assert!(!harness.view.layouts.contains_key(&first));
    }

    #[test]
    fn test_render_plain_uses_fallbacks() {
        let mut log = ChatLog::new();
        log.push(Role::User, "see [Docs](https://x) and ![a cat](cat.png)");
        let themes = ThemeManager::builtin(ColorMode::Light);
        let lines = ChatView::default().render_plain(&log, &themes, 80);
        assert_eq!(lines[0], "You");
        assert!(lines.iter().any(|l| l.contains("Docs [https://x]")));
        assert!(lines.iter().any(|l| l.contains("IMAGE: a cat")));
    }

    #[test]
    fn test_visible_images_outnumbering_cache_stay_cached() {
        let mut log = ChatLog::new();
        log.push(Role::Assistant, "![a](a.png)\n\n![b](b.png)\n\n![c](c.png)");
        let scroll = ScrollController::with_len(1, 2);
        let area = CellRect::new(0, 0, 40, 30);
        let mut harness = Harness::new();
        harness.images = ImageRenderer::new(
            ImageProtocol::Kitty,
            ImageOptions {
                cache_capacity: 1,
                ..ImageOptions::default()
            },
        );

        let first = harness.frame(&log, &scroll, area);
        assert_eq!(first.pending.len(), 3);
        for request in &first.pending {
            let result = RasterResult {
                request: request.clone(),
                content_hash: Some(ContentHash::of(request.src.as_bytes())),
                output: ImageOutput::Rendered(Arc::new(RasterImage {
                    width_px: 8,
                    height_px: 16,
                    png_base64: Arc::from("AAAA"),
                })),
            };
            assert!(harness.images.accept(result, &log));
        }

        let second = harness.frame(&log, &scroll, area);
        assert_eq!(second.images.len(), 3);
        assert!(second.pending.is_empty());
    }
}

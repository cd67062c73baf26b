//! Scrollbar drawn in the reserved gutter column.
//!
//! The gutter is always allocated by the layout; this widget only decides
//! whether to draw into it. The thumb length is fixed for a given content
//! height so it doesn't flicker while scrolling, and its position follows the
//! selected message.

use parlance_core::frame::ScrollbarMetrics;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::widgets::Widget;

const THUMB_SYMBOL: &str = "█";
const TRACK_SYMBOL: &str = "│";

#[derive(Debug, Clone)]
pub struct Scrollbar {
    metrics: ScrollbarMetrics,
    thumb_style: Style,
    track_style: Style,
}

impl Scrollbar {
    pub fn new(metrics: ScrollbarMetrics) -> Self {
        Self {
            metrics,
            thumb_style: Style::default(),
            track_style: Style::default(),
        }
    }

    #[must_use]
    pub fn styles(mut self, thumb: Style, track: Style) -> Self {
        self.thumb_style = thumb;
        self.track_style = track;
        self
    }

    /// `(start, len)` of the thumb on a track `track_len` cells tall, or
    /// `None` when the content fits and nothing is drawn.
    fn thumb(&self, track_len: usize) -> Option<(usize, usize)> {
        let m = &self.metrics;
        if !m.overflows() || track_len == 0 || m.total_messages == 0 {
            return None;
        }

        // round(track * viewport / content), at least one cell.
        let viewport = m.viewport_height.min(track_len) as u64;
        let content = m.content_height as u64;
        let thumb_len = ((track_len as u64 * viewport + content / 2) / content) as usize;
        let thumb_len = thumb_len.clamp(1, track_len);

        let available = track_len - thumb_len;
        let last = m.total_messages - 1;
        let selected = m.selected.unwrap_or(last).min(last);
        let start = if last == 0 {
            0
        } else {
            (selected as u64 * available as u64 / last as u64) as usize
        };
        Some((start, thumb_len))
    }
}

impl Widget for Scrollbar {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 {
            return;
        }
        let Some((start, len)) = self.thumb(usize::from(area.height)) else {
            return;
        };
        let x = area.x + area.width - 1;
        for (idx, y) in (area.y..area.y + area.height).enumerate() {
            let (symbol, style) = if idx >= start && idx < start + len {
                (THUMB_SYMBOL, self.thumb_style)
            } else {
                (TRACK_SYMBOL, self.track_style)
            };
            buf.set_string(x, y, symbol, style);
        }
    }
}

//! Resolves semantic styles against the active themes and paints frames.

use std::io::{self, Write};

use crossterm::QueueableCommand as _;
use crossterm::cursor;
use crossterm::style::{
    Attribute, Color as TermColor, Print, ResetColor, SetAttribute, SetBackgroundColor,
    SetForegroundColor,
};
use parlance_core::actions::{Feedback, FeedbackKind};
use parlance_core::click::CellRect;
use parlance_core::frame::{Frame, FrameLine};
use parlance_core::hyperlink::wrap_osc8;
use parlance_core::style::{Rgb, Style};
use parlance_core::theme::{ProseColors, ThemeManager};
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier};
use ratatui::widgets::Widget as _;
use unicode_width::UnicodeWidthStr;

use crate::scrollbar::Scrollbar;

/// A resolved cell style, convertible to both ratatui and crossterm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellStyle {
    pub fg: Option<Rgb>,
    pub bg: Option<Rgb>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub crossed: bool,
}

impl CellStyle {
    fn fg(fg: Rgb) -> Self {
        Self {
            fg: Some(fg),
            ..Self::default()
        }
    }

    fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    fn underline(mut self) -> Self {
        self.underline = true;
        self
    }
}

/// Style resolution for one frame.
#[derive(Debug, Clone, Copy)]
pub struct Painter {
    prose: ProseColors,
    /// Palette of the code theme (the opposite mode).
    code: ProseColors,
    true_color: bool,
}

impl Painter {
    pub fn new(themes: &ThemeManager, true_color: bool) -> Self {
        Self {
            prose: themes.current_theme().prose_colors,
            code: themes.code_block_theme().prose_colors,
            true_color,
        }
    }

    pub fn resolve(&self, style: Style, panel: bool) -> CellStyle {
        let p = &self.prose;
        let mut cell = match style {
            Style::Plain | Style::Body | Style::UserBody => CellStyle::fg(p.text),
            Style::RoleUser => CellStyle::fg(p.user).bold(),
            Style::RoleAssistant => CellStyle::fg(p.heading).bold(),
            Style::RoleSystem => CellStyle::fg(p.muted).bold(),
            Style::SystemBody => CellStyle::fg(p.muted).italic(),
            Style::CodeInline => CellStyle::fg(p.code_inline),
            Style::CodeFrame => CellStyle::fg(self.code.muted),
            Style::CodeCopyIcon => CellStyle::fg(self.code.link).bold(),
            Style::CodePlain => CellStyle::fg(self.code.text),
            Style::Syntax(s) => CellStyle {
                fg: Some(s.fg),
                bold: s.bold,
                italic: s.italic,
                underline: s.underline,
                ..CellStyle::default()
            },
            Style::Emphasis => CellStyle::fg(p.emphasis).italic(),
            Style::Strong => CellStyle::fg(p.text).bold(),
            Style::Strikethrough => CellStyle {
                crossed: true,
                ..CellStyle::fg(p.muted)
            },
            Style::H1 => CellStyle::fg(p.heading).bold().underline(),
            Style::H2 => CellStyle::fg(p.heading).bold(),
            Style::H3 => CellStyle::fg(p.heading),
            Style::Link => CellStyle::fg(p.link).underline(),
            Style::LinkUrl | Style::Rule => CellStyle::fg(p.muted),
            Style::BlockQuote => CellStyle::fg(p.quote).italic(),
            Style::ListBullet | Style::ListNumber => CellStyle::fg(p.bullet),
            Style::ImageAlt => CellStyle::fg(p.muted).italic(),
            Style::FeedbackInfo => CellStyle {
                bg: Some(p.link),
                ..CellStyle::fg(p.background).bold()
            },
            Style::FeedbackError => CellStyle {
                bg: Some(p.error),
                ..CellStyle::fg(p.background).bold()
            },
        };
        if cell.bg.is_none() {
            cell.bg = Some(self.background(panel));
        }
        cell
    }

    fn background(&self, panel: bool) -> Rgb {
        if panel {
            self.code.background
        } else {
            self.prose.background
        }
    }

    fn color(&self, rgb: Rgb) -> Color {
        if self.true_color {
            Color::Rgb(rgb.0, rgb.1, rgb.2)
        } else {
            Color::Indexed(rgb.to_ansi256())
        }
    }

    fn term_color(&self, rgb: Rgb) -> TermColor {
        if self.true_color {
            TermColor::Rgb {
                r: rgb.0,
                g: rgb.1,
                b: rgb.2,
            }
        } else {
            TermColor::AnsiValue(rgb.to_ansi256())
        }
    }

    pub fn to_ratatui(&self, cell: CellStyle) -> ratatui::style::Style {
        let mut style = ratatui::style::Style::default();
        if let Some(fg) = cell.fg {
            style = style.fg(self.color(fg));
        }
        if let Some(bg) = cell.bg {
            style = style.bg(self.color(bg));
        }
        let mut modifiers = Modifier::empty();
        modifiers.set(Modifier::BOLD, cell.bold);
        modifiers.set(Modifier::ITALIC, cell.italic);
        modifiers.set(Modifier::UNDERLINED, cell.underline);
        modifiers.set(Modifier::CROSSED_OUT, cell.crossed);
        style.add_modifier(modifiers)
    }

    /// Queues crossterm commands that reproduce `cell`.
    fn queue_style(&self, w: &mut impl Write, cell: CellStyle) -> io::Result<()> {
        w.queue(SetAttribute(Attribute::Reset))?;
        if let Some(fg) = cell.fg {
            w.queue(SetForegroundColor(self.term_color(fg)))?;
        }
        if let Some(bg) = cell.bg {
            w.queue(SetBackgroundColor(self.term_color(bg)))?;
        }
        for (on, attr) in [
            (cell.bold, Attribute::Bold),
            (cell.italic, Attribute::Italic),
            (cell.underline, Attribute::Underlined),
            (cell.crossed, Attribute::CrossedOut),
        ] {
            if on {
                w.queue(SetAttribute(attr))?;
            }
        }
        Ok(())
    }

    fn scrollbar_styles(&self) -> (ratatui::style::Style, ratatui::style::Style) {
        let bg = self.color(self.prose.background);
        (
            ratatui::style::Style::default().fg(self.color(self.prose.muted)).bg(bg),
            ratatui::style::Style::default()
                .fg(self.color(self.prose.background))
                .bg(bg),
        )
    }
}

/// A run of linked text to re-print with OSC8 after the draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRun {
    pub x: u16,
    pub y: u16,
    pub text: String,
    pub url: String,
    pub style: CellStyle,
}

pub fn rect(area: CellRect) -> Rect {
    Rect::new(area.x, area.y, area.width, area.height)
}

/// Row of the content area the feedback line occupies.
pub fn feedback_row(frame: &Frame) -> Option<u16> {
    let area = frame.content_area;
    (area.height > 0).then(|| area.y + area.height - 1)
}

/// Paints `frame` into `buf`, with `feedback` over the bottom content row.
pub fn paint(buf: &mut Buffer, frame: &Frame, painter: &Painter, feedback: Option<&Feedback>) {
    let content = rect(frame.content_area);
    let base = painter.to_ratatui(painter.resolve(Style::Plain, false));
    buf.set_style(content.union(rect(frame.gutter_area)), base);

    for (line, y) in frame.lines.iter().zip(content.y..content.bottom()) {
        paint_line(buf, line, content.x, y, content.width, painter);
    }

    let (thumb, track) = painter.scrollbar_styles();
    Scrollbar::new(frame.scrollbar)
        .styles(thumb, track)
        .render(rect(frame.gutter_area), buf);

    if let (Some(feedback), Some(y)) = (feedback, feedback_row(frame)) {
        let style = match feedback.kind {
            FeedbackKind::Info => Style::FeedbackInfo,
            FeedbackKind::Error => Style::FeedbackError,
        };
        let style = painter.to_ratatui(painter.resolve(style, false));
        let row = Rect::new(content.x, y, content.width, 1);
        buf.set_style(row, style);
        for x in row.left()..row.right() {
            buf[(x, y)].set_symbol(" ");
        }
        buf.set_stringn(
            content.x,
            y,
            format!(" {}", feedback.message),
            usize::from(content.width),
            style,
        );
    }
}

fn paint_line(buf: &mut Buffer, line: &FrameLine, x0: u16, y: u16, width: u16, painter: &Painter) {
    if line.panel {
        let panel = painter.to_ratatui(painter.resolve(Style::CodePlain, true));
        buf.set_style(Rect::new(x0, y, width, 1), panel);
    }
    let right = x0.saturating_add(width);
    let mut x = x0;
    for span in &line.spans {
        if x >= right {
            break;
        }
        let style = painter.to_ratatui(painter.resolve(span.style, line.panel));
        let (next, _) = buf.set_stringn(x, y, &span.text, usize::from(right - x), style);
        x = next;
    }
}

/// Linked spans of `frame`, skipping `skip_row` (covered by feedback).
pub fn link_runs(frame: &Frame, painter: &Painter, skip_row: Option<u16>) -> Vec<LinkRun> {
    let content = frame.content_area;
    let mut runs = Vec::new();
    for (line, y) in frame.lines.iter().zip(content.y..) {
        if Some(y) == skip_row {
            continue;
        }
        let mut x = content.x;
        for span in &line.spans {
            let width = u16::try_from(span.text.width()).unwrap_or(u16::MAX);
            if let Some(url) = &span.url {
                runs.push(LinkRun {
                    x,
                    y,
                    text: span.text.clone(),
                    url: url.to_string(),
                    style: painter.resolve(span.style, line.panel),
                });
            }
            x = x.saturating_add(width);
        }
    }
    runs
}

/// Re-prints linked runs inside OSC8 envelopes at their painted positions.
pub fn write_links(w: &mut impl Write, runs: &[LinkRun], painter: &Painter) -> io::Result<()> {
    if runs.is_empty() {
        return Ok(());
    }
    w.queue(cursor::SavePosition)?;
    for run in runs {
        w.queue(cursor::MoveTo(run.x, run.y))?;
        painter.queue_style(w, run.style)?;
        w.queue(Print(wrap_osc8(&run.text, &run.url)))?;
    }
    w.queue(SetAttribute(Attribute::Reset))?;
    w.queue(ResetColor)?;
    w.queue(cursor::RestorePosition)?;
    w.flush()
}

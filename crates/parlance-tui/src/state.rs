//! View state and input handling.
//!
//! Everything here is pure with respect to the terminal: the runtime feeds it
//! events and asks it for frames, so key and mouse behavior is testable
//! without a TTY.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use parlance_core::actions::{ActionSinks, DEFAULT_FEEDBACK_DURATION, Feedback, perform};
use parlance_core::click::CellRect;
use parlance_core::frame::{Frame, RenderContext};
use parlance_core::image::{ImageOptions, ImageRenderer, RasterResult};
use parlance_core::scroll::DEFAULT_LOOKBACK;
use parlance_core::theme::ColorMode;
use parlance_core::{
    ChatLog, ChatMessage, ChatView, ClickRegistry, MessageId, Role, ScrollController,
    TerminalCapabilities, ThemeManager,
};

use crate::feed::LogUpdate;
use crate::paint::{Painter, feedback_row};

/// Messages moved per PgUp/PgDn.
const PAGE_STEP: isize = 5;

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub capabilities: TerminalCapabilities,
    pub image_options: ImageOptions,
    pub lookback: usize,
    pub feedback_duration: Duration,
    /// Directory relative image paths resolve against.
    pub base_dir: Option<PathBuf>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            capabilities: TerminalCapabilities::conservative(),
            image_options: ImageOptions::default(),
            lookback: DEFAULT_LOOKBACK,
            feedback_duration: DEFAULT_FEEDBACK_DURATION,
            base_dir: None,
        }
    }
}

#[derive(Debug)]
pub struct ViewState {
    log: ChatLog,
    scroll: ScrollController,
    themes: ThemeManager,
    view: ChatView,
    images: ImageRenderer,
    capabilities: TerminalCapabilities,
    /// Regions of the last frame drawn. Clicks resolve only against these.
    clicks: ClickRegistry,
    feedback: Option<Feedback>,
    feedback_duration: Duration,
    feedback_row: Option<u16>,
    should_quit: bool,
}

impl ViewState {
    pub fn new(log: ChatLog, themes: ThemeManager, options: &RuntimeOptions) -> Self {
        let mut view = ChatView::default();
        if let Some(dir) = &options.base_dir {
            view = view.with_base_dir(dir.clone());
        }
        Self {
            scroll: ScrollController::with_len(log.len(), options.lookback),
            log,
            themes,
            view,
            images: ImageRenderer::new(
                options.capabilities.image_protocol,
                options.image_options.clone(),
            ),
            capabilities: options.capabilities,
            clicks: ClickRegistry::new(),
            feedback: None,
            feedback_duration: options.feedback_duration,
            feedback_row: None,
            should_quit: false,
        }
    }

    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    pub fn scroll(&self) -> &ScrollController {
        &self.scroll
    }

    pub fn themes(&self) -> &ThemeManager {
        &self.themes
    }

    pub fn capabilities(&self) -> TerminalCapabilities {
        self.capabilities
    }

    pub fn feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn painter(&self) -> Painter {
        Painter::new(&self.themes, self.capabilities.true_color)
    }

    /// Appends a message, following it if the view is pinned.
    pub fn append(&mut self, role: Role, markdown: &str) -> MessageId {
        let id = self.log.push(role, markdown);
        self.scroll.on_message_appended();
        id
    }

    /// Replaces a message's markdown. Work done for the old id is dropped and
    /// raster results still in flight for it are discarded on arrival.
    pub fn supersede(&mut self, old: MessageId, markdown: &str) -> Option<MessageId> {
        let id = self.log.supersede(old, markdown)?;
        self.view.forget(old);
        Some(id)
    }

    pub fn remove(&mut self, id: MessageId) -> Option<ChatMessage> {
        let index = self.log.index_of(id)?;
        let removed = self.log.remove(id)?;
        self.view.forget(id);
        self.scroll.on_message_removed(index);
        Some(removed)
    }

    /// Applies one feed update. Returns true if the log changed.
    pub fn apply(&mut self, update: LogUpdate) -> bool {
        let last = self.log.messages().last().map(|m| m.id);
        match (update, last) {
            (LogUpdate::Append { role, markdown }, _) => {
                self.append(role, &markdown);
                true
            }
            (LogUpdate::ReplaceLast { markdown }, Some(last)) => {
                self.supersede(last, &markdown).is_some()
            }
            (LogUpdate::ReplaceLast { markdown }, None) => {
                self.append(Role::Assistant, &markdown);
                true
            }
            (LogUpdate::RemoveLast, Some(last)) => self.remove(last).is_some(),
            (LogUpdate::RemoveLast, None) => false,
        }
    }

    /// Lays out the next frame and keeps its click regions for dispatch.
    pub fn frame(&mut self, area: CellRect) -> Frame {
        let mut ctx = RenderContext {
            themes: &self.themes,
            images: &mut self.images,
            capabilities: self.capabilities,
        };
        let frame = self.view.frame(&self.log, &self.scroll, &mut ctx, area);
        self.clicks = frame.clicks.clone();
        self.feedback_row = self.feedback.as_ref().and_then(|_| feedback_row(&frame));
        frame
    }

    /// Publishes finished rasterizations. Returns true if any landed.
    pub fn accept_rasters(&mut self, results: Vec<RasterResult>) -> bool {
        let mut changed = false;
        for result in results {
            changed |= self.images.accept(result, &self.log);
        }
        changed
    }

    /// Expires feedback. Returns true if the screen needs a redraw.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.feedback.as_ref().is_some_and(|f| f.is_expired(now)) {
            self.feedback = None;
            return true;
        }
        false
    }

    /// Applies a key press. Returns true if the screen needs a redraw.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') => self.scroll.scroll_up(),
            KeyCode::Down | KeyCode::Char('j') => self.scroll.scroll_down(),
            KeyCode::PageUp => self.scroll.scroll_by(-PAGE_STEP),
            KeyCode::PageDown => self.scroll.scroll_by(PAGE_STEP),
            KeyCode::End | KeyCode::Char('G') => self.scroll.scroll_to_bottom(),
            KeyCode::Home | KeyCode::Char('g') => self.scroll.scroll_to_top(),
            KeyCode::Char('t') => self.themes.toggle_mode(),
            KeyCode::Char('T') => self.themes.next_theme(),
            KeyCode::Char('d') => return self.set_mode(ColorMode::Dark),
            KeyCode::Char('l') => return self.set_mode(ColorMode::Light),
            KeyCode::Esc => return self.feedback.take().is_some(),
            _ => return false,
        }
        true
    }

    /// Returns true if the mode actually changed.
    fn set_mode(&mut self, mode: ColorMode) -> bool {
        let before = self.themes.version();
        self.themes.set_mode(mode);
        self.themes.version() != before
    }

    /// Applies a mouse event against the last frame's regions.
    pub fn handle_mouse(
        &mut self,
        mouse: MouseEvent,
        sinks: &mut ActionSinks<'_>,
        now: Instant,
    ) -> bool {
        match mouse.kind {
            MouseEventKind::ScrollUp => self.scroll.scroll_up(),
            MouseEventKind::ScrollDown => self.scroll.scroll_down(),
            MouseEventKind::Down(MouseButton::Left) => {
                if self.feedback.is_some() && self.feedback_row == Some(mouse.row) {
                    self.feedback = None;
                    return true;
                }
                let Some(action) = self.clicks.dispatch(mouse.column, mouse.row).cloned() else {
                    return false;
                };
                self.feedback = Some(perform(&action, sinks, now));
            }
            _ => return false,
        }
        true
    }

    pub fn feedback_duration(&self) -> Duration {
        self.feedback_duration
    }
}

//! TUI runtime.
//!
//! Owns the terminal session and the event loop. Input goes through
//! [`ViewState`]; this module only deals with the terminal, the raster
//! worker, and the escape sequences ratatui cannot express.

use std::io::{self, Write as _};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event};
use parlance_core::actions::ActionSinks;
use parlance_core::click::CellRect;
use parlance_core::image::RasterWorker;
use parlance_core::{ChatLog, ImageProtocol, ThemeManager};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::clipboard::{BrowserOpener, Clipboard};
use crate::feed::LogUpdate;
use crate::graphics::KittyPlacer;
use crate::paint;
use crate::state::{RuntimeOptions, ViewState};
use crate::terminal::{self, TerminalSession};

/// Poll interval while something is animating or in flight (~60fps).
const FRAME_DURATION: Duration = Duration::from_millis(16);
/// Poll interval when idle.
const IDLE_POLL_DURATION: Duration = Duration::from_millis(100);

pub struct TuiRuntime {
    session: TerminalSession,
    state: ViewState,
    worker: RasterWorker,
    placer: KittyPlacer,
    clipboard: Clipboard,
    opener: BrowserOpener,
    kitty: bool,
    feed: Option<mpsc::UnboundedReceiver<LogUpdate>>,
}

impl TuiRuntime {
    /// Enters the terminal and prepares the first frame.
    ///
    /// Rasterization runs on `handle`; the event loop itself blocks the
    /// calling thread.
    ///
    /// # Errors
    /// Returns an error if the terminal cannot be configured.
    pub fn new(
        log: ChatLog,
        themes: ThemeManager,
        mut options: RuntimeOptions,
        handle: Handle,
    ) -> Result<Self> {
        let kitty = options.capabilities.image_protocol == ImageProtocol::Kitty;
        if let Some((width, height)) = terminal::cell_size_px() {
            options.image_options.cell_width_px = width;
            options.image_options.cell_height_px = height;
        }

        terminal::install_panic_hook();
        let session = TerminalSession::start(kitty)?;
        let worker = RasterWorker::new(handle, options.image_options.clone());
        tracing::info!(
            messages = log.len(),
            true_color = options.capabilities.true_color,
            osc8 = options.capabilities.supports_osc8,
            images = ?options.capabilities.image_protocol,
            "starting interactive session"
        );

        Ok(Self {
            session,
            state: ViewState::new(log, themes, &options),
            worker,
            placer: KittyPlacer::from_env(),
            clipboard: Clipboard,
            opener: BrowserOpener,
            kitty,
            feed: None,
        })
    }

    /// Streams live log updates into the view.
    #[must_use]
    pub fn with_feed(mut self, feed: mpsc::UnboundedReceiver<LogUpdate>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Runs until the user quits.
    ///
    /// # Errors
    /// Returns an error if drawing or reading terminal events fails.
    pub fn run(&mut self) -> Result<()> {
        let mut dirty = true;
        while !self.state.should_quit() {
            let results = self.worker.poll();
            if !results.is_empty() {
                dirty |= self.state.accept_rasters(results);
            }
            dirty |= self.drain_feed();
            dirty |= self.state.tick(Instant::now());

            if dirty {
                self.draw()?;
                dirty = false;
            }

            let timeout = if self.worker.pending() > 0 || self.state.feedback().is_some() {
                FRAME_DURATION
            } else {
                IDLE_POLL_DURATION
            };
            if event::poll(timeout).context("Failed to poll terminal events")? {
                // Drain everything queued so a burst of wheel events costs one draw.
                loop {
                    let ev = event::read().context("Failed to read terminal event")?;
                    dirty |= self.handle_event(ev);
                    if self.state.should_quit() || !event::poll(Duration::ZERO)? {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn drain_feed(&mut self) -> bool {
        let Some(feed) = &mut self.feed else {
            return false;
        };
        let mut changed = false;
        let closed = loop {
            match feed.try_recv() {
                Ok(update) => changed |= self.state.apply(update),
                Err(TryRecvError::Empty) => break false,
                Err(TryRecvError::Disconnected) => break true,
            }
        };
        if closed {
            tracing::debug!("feed finished");
            self.feed = None;
        }
        changed
    }

    fn handle_event(&mut self, ev: Event) -> bool {
        match ev {
            Event::Key(key) => self.state.handle_key(key),
            Event::Mouse(mouse) => {
                let mut sinks = ActionSinks {
                    clipboard: &mut self.clipboard,
                    opener: &mut self.opener,
                    feedback_duration: self.state.feedback_duration(),
                };
                self.state.handle_mouse(mouse, &mut sinks, Instant::now())
            }
            Event::Resize(..) => true,
            _ => false,
        }
    }

    fn draw(&mut self) -> Result<()> {
        let size = self
            .session
            .terminal_mut()
            .size()
            .context("Failed to read terminal size")?;
        let frame = self.state.frame(CellRect::new(0, 0, size.width, size.height));
        for request in &frame.pending {
            self.worker.submit(request.clone());
        }

        let painter = self.state.painter();
        let feedback = self.state.feedback().cloned();
        self.session
            .terminal_mut()
            .draw(|f| paint::paint(f.buffer_mut(), &frame, &painter, feedback.as_ref()))
            .context("Failed to draw frame")?;

        let mut stdout = io::stdout();
        if self.state.capabilities().supports_osc8 {
            let skip = feedback.as_ref().and_then(|_| paint::feedback_row(&frame));
            paint::write_links(&mut stdout, &paint::link_runs(&frame, &painter, skip), &painter)?;
        }
        if self.kitty {
            self.placer.sync(&mut stdout, &frame.images)?;
        }
        stdout.flush()?;
        Ok(())
    }
}

/// Runs the interactive viewer over `log` until the user quits, applying
/// `feed` updates as they arrive.
///
/// # Errors
/// Returns an error if stdout is not a terminal or the session fails.
pub fn run_interactive(
    log: ChatLog,
    themes: ThemeManager,
    options: RuntimeOptions,
    handle: Handle,
    feed: Option<mpsc::UnboundedReceiver<LogUpdate>>,
) -> Result<()> {
    use std::io::IsTerminal as _;

    if !io::stdout().is_terminal() {
        anyhow::bail!("Interactive mode requires a terminal. Use --print for piped output.");
    }
    let mut runtime = TuiRuntime::new(log, themes, options, handle)?;
    if let Some(feed) = feed {
        runtime = runtime.with_feed(feed);
    }
    runtime.run()
}

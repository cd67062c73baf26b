//! Terminal lifecycle.
//!
//! The terminal is restored on normal exit (via `Drop` on [`TerminalSession`])
//! and on panic (via [`install_panic_hook`]). Kitty images are cleared on the
//! way out so they don't linger over the shell.

use std::io::{self, Stdout, Write as _};
use std::panic;

use anyhow::{Context, Result};
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use parlance_core::image::kitty;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

pub type Backend = CrosstermBackend<Stdout>;

/// Owns the ratatui terminal for the duration of the interactive session.
pub struct TerminalSession {
    terminal: Terminal<Backend>,
    images_enabled: bool,
}

impl TerminalSession {
    /// Enables raw mode, enters the alternate screen and captures the mouse.
    ///
    /// Call [`install_panic_hook`] first so a panic still restores the
    /// terminal.
    ///
    /// # Errors
    /// Returns an error if the terminal cannot be configured.
    pub fn start(images_enabled: bool) -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
            .context("Failed to enter alternate screen")?;
        let terminal =
            Terminal::new(CrosstermBackend::new(stdout)).context("Failed to create terminal")?;
        Ok(Self {
            terminal,
            images_enabled,
        })
    }

    pub fn terminal_mut(&mut self) -> &mut Terminal<Backend> {
        &mut self.terminal
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        if self.images_enabled {
            let mut stdout = io::stdout();
            let _ = stdout.write_all(&kitty::delete_all());
            let _ = stdout.flush();
        }
        let _ = restore_terminal();
    }
}

/// Restores terminal state. Idempotent.
///
/// # Errors
/// Returns an error if leaving the alternate screen or raw mode fails.
pub fn restore_terminal() -> Result<()> {
    // Mouse capture must go before raw mode.
    let _ = execute!(io::stdout(), DisableMouseCapture);
    execute!(io::stdout(), LeaveAlternateScreen).context("Failed to leave alternate screen")?;
    disable_raw_mode().context("Failed to disable raw mode")?;
    Ok(())
}

/// Restores the terminal before the default panic output is printed.
pub fn install_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = restore_terminal();
        original_hook(panic_info);
    }));
}

/// Cell size in pixels as reported by the terminal, if it reports one.
pub fn cell_size_px() -> Option<(u16, u16)> {
    let size = crossterm::terminal::window_size().ok()?;
    if size.width == 0 || size.height == 0 || size.columns == 0 || size.rows == 0 {
        return None;
    }
    Some((
        (size.width / size.columns).max(1),
        (size.height / size.rows).max(1),
    ))
}

//! Terminal surface for parlance.
//!
//! Paints frames produced by `parlance-core` with ratatui, forwards terminal
//! input to the view state, and performs copy and open actions on behalf of
//! click regions.

mod clipboard;
mod feed;
mod graphics;
mod paint;
mod runtime;
mod scrollbar;
mod state;
pub mod terminal;

pub use clipboard::{BrowserOpener, Clipboard};
pub use feed::{FeedParser, LogUpdate, spawn_reader};
pub use runtime::{TuiRuntime, run_interactive};
pub use state::{RuntimeOptions, ViewState};

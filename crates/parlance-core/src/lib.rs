//! Rendering engine for parlance, a terminal rich-text chat viewer.
//!
//! Everything here is UI-agnostic: messages are parsed into semantic styled
//! lines, laid out into frame-scoped cell grids, and handed to a surface
//! crate (`parlance-tui`) for painting.

pub mod actions;
pub mod capability;
pub mod click;
pub mod config;
pub mod frame;
pub mod hash;
pub mod highlight;
pub mod hyperlink;
pub mod image;
pub mod markdown;
pub mod message;
pub mod scroll;
pub mod style;
pub mod text;
pub mod theme;

pub use capability::{ImageProtocol, TerminalCapabilities};
pub use click::{ClickAction, ClickRegion, ClickRegistry};
pub use config::Config;
pub use frame::{ChatView, Frame};
pub use markdown::{CodeBlock, LinkSpan, MarkdownRenderer, StyledMessage};
pub use message::{ChatLog, ChatMessage, MessageId, Role};
pub use scroll::ScrollController;
pub use theme::{ColorMode, ThemeManager, ThemePair};

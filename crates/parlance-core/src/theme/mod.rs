//! Paired dark/light themes and the active-theme state.
//!
//! Prose and code never share a mode: code blocks are always highlighted
//! with the theme of the *opposite* mode from the same pair, so dark prose
//! frames light code panels and vice versa.
//!
//! Every change of pair or mode bumps [`ThemeVersion`]. Caches key on the
//! version, so stale entries are simply never looked up again.

mod catalog;

use std::sync::Arc;

pub use catalog::{builtin_theme_pairs, normalize_theme_name};
use syntect::highlighting::Theme as SyntectTheme;

use crate::style::Rgb;

/// Light or dark color mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorMode {
    Dark,
    Light,
}

impl ColorMode {
    pub fn opposite(self) -> Self {
        match self {
            ColorMode::Dark => ColorMode::Light,
            ColorMode::Light => ColorMode::Dark,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColorMode::Dark => "dark",
            ColorMode::Light => "light",
        }
    }

    /// Detects the terminal background from `COLORFGBG` (`"fg;bg"`).
    ///
    /// Background indices 0-6 and 8 are dark, 7 and 9-15 are light.
    /// Returns `None` when the variable is absent or unparseable.
    pub fn detect() -> Option<Self> {
        let value = std::env::var("COLORFGBG").ok()?;
        Self::from_colorfgbg(&value)
    }

    fn from_colorfgbg(value: &str) -> Option<Self> {
        let bg: u8 = value.rsplit(';').next()?.trim().parse().ok()?;
        let mode = match bg {
            0..=6 | 8 => ColorMode::Dark,
            _ => ColorMode::Light,
        };
        tracing::debug!(colorfgbg = value, mode = mode.name(), "detected color mode");
        Some(mode)
    }
}

/// Monotonic counter bumped on every theme or mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ThemeVersion(pub u64);

/// Palette used for prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProseColors {
    pub text: Rgb,
    pub background: Rgb,
    pub muted: Rgb,
    pub heading: Rgb,
    pub emphasis: Rgb,
    pub link: Rgb,
    pub code_inline: Rgb,
    pub quote: Rgb,
    pub bullet: Rgb,
    pub user: Rgb,
    pub error: Rgb,
}

/// One side (dark or light) of a theme pair.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Name of the underlying syntax theme (e.g. `"base16-ocean.dark"`).
    pub name: String,
    pub prose_colors: ProseColors,
    pub code_theme: Arc<SyntectTheme>,
}

impl Theme {
    /// Background of code panels drawn with this theme.
    pub fn code_background(&self) -> Rgb {
        self.prose_colors.background
    }
}

/// A named pair of dark and light themes.
#[derive(Debug, Clone)]
pub struct ThemePair {
    pub name: String,
    pub dark: Theme,
    pub light: Theme,
}

impl ThemePair {
    pub fn resolve(&self, mode: ColorMode) -> &Theme {
        match mode {
            ColorMode::Dark => &self.dark,
            ColorMode::Light => &self.light,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ThemeError {
    #[error("no theme pairs were supplied")]
    Empty,
}

/// Owns the theme pairs and the active pair/mode.
#[derive(Debug)]
pub struct ThemeManager {
    themes: Vec<ThemePair>,
    current_index: usize,
    mode: ColorMode,
    version: ThemeVersion,
}

impl ThemeManager {
    /// Creates a manager over already-loaded pairs, starting at the first pair.
    ///
    /// # Errors
    /// Returns [`ThemeError::Empty`] if `themes` is empty.
    pub fn new(themes: Vec<ThemePair>, mode: ColorMode) -> Result<Self, ThemeError> {
        if themes.is_empty() {
            return Err(ThemeError::Empty);
        }
        Ok(Self {
            themes,
            current_index: 0,
            mode,
            version: ThemeVersion::default(),
        })
    }

    /// Manager over the built-in catalog.
    pub fn builtin(mode: ColorMode) -> Self {
        Self {
            themes: builtin_theme_pairs(),
            current_index: 0,
            mode,
            version: ThemeVersion::default(),
        }
    }

    pub fn mode(&self) -> ColorMode {
        self.mode
    }

    pub fn version(&self) -> ThemeVersion {
        self.version
    }

    pub fn pair(&self) -> &ThemePair {
        &self.themes[self.current_index]
    }

    pub fn pair_names(&self) -> impl Iterator<Item = &str> {
        self.themes.iter().map(|p| p.name.as_str())
    }

    /// Theme for prose: the active pair resolved in the active mode.
    pub fn current_theme(&self) -> &Theme {
        self.pair().resolve(self.mode)
    }

    /// Theme for code blocks: the active pair resolved in the opposite mode.
    pub fn code_block_theme(&self) -> &Theme {
        self.pair().resolve(self.mode.opposite())
    }

    /// Flips dark/light and bumps the version.
    pub fn toggle_mode(&mut self) {
        self.mode = self.mode.opposite();
        self.bump();
    }

    pub fn set_mode(&mut self, mode: ColorMode) {
        if self.mode != mode {
            self.mode = mode;
            self.bump();
        }
    }

    /// Switches to the next pair (wrapping) and bumps the version.
    pub fn next_theme(&mut self) {
        self.current_index = (self.current_index + 1) % self.themes.len();
        self.bump();
    }

    /// Selects a pair by name (case-insensitive, `_` and `-` equivalent).
    ///
    /// Returns false and leaves state untouched when no pair matches.
    pub fn select(&mut self, name: &str) -> bool {
        let wanted = normalize_theme_name(name);
        let Some(index) = self
            .themes
            .iter()
            .position(|p| normalize_theme_name(&p.name) == wanted)
        else {
            tracing::warn!(theme = name, "unknown theme, keeping current");
            return false;
        };
        if index != self.current_index {
            self.current_index = index;
            self.bump();
        }
        true
    }

    fn bump(&mut self) {
        self.version = ThemeVersion(self.version.0 + 1);
        tracing::debug!(
            theme = %self.pair().name,
            mode = self.mode.name(),
            version = self.version.0,
            "theme changed"
        );
    }
}

//! Built-in theme pairs assembled from syntect's bundled themes.

use std::sync::Arc;

use syntect::highlighting::{Color, Highlighter, Theme as SyntectTheme, ThemeSet};
use syntect::parsing::Scope;

use super::{ProseColors, Theme, ThemePair};
use crate::style::Rgb;

/// (pair name, dark theme, light theme) from syntect's default set.
const BUILTIN_PAIRS: &[(&str, &str, &str)] = &[
    ("ocean", "base16-ocean.dark", "base16-ocean.light"),
    ("solarized", "Solarized (dark)", "Solarized (light)"),
    ("eighties", "base16-eighties.dark", "InspiredGitHub"),
    ("mocha", "base16-mocha.dark", "InspiredGitHub"),
];

/// Normalizes a theme name for lookup: lowercase, `_` → `-`.
pub fn normalize_theme_name(name: &str) -> String {
    name.trim().to_lowercase().replace('_', "-")
}

/// Loads the built-in pairs. Never empty: if the bundled set is somehow
/// missing a theme, syntect's default theme stands in for it.
pub fn builtin_theme_pairs() -> Vec<ThemePair> {
    let set = ThemeSet::load_defaults();
    BUILTIN_PAIRS
        .iter()
        .map(|(name, dark, light)| ThemePair {
            name: (*name).to_string(),
            dark: load(&set, dark, Rgb(0x2b, 0x30, 0x3b)),
            light: load(&set, light, Rgb(0xff, 0xff, 0xff)),
        })
        .collect()
}

fn load(set: &ThemeSet, name: &str, fallback_bg: Rgb) -> Theme {
    let code_theme = if let Some(theme) = set.themes.get(name) {
        theme.clone()
    } else {
        tracing::warn!(theme = name, "bundled theme missing, using default");
        SyntectTheme::default()
    };
    Theme {
        name: name.to_string(),
        prose_colors: derive_prose_colors(&code_theme, fallback_bg),
        code_theme: Arc::new(code_theme),
    }
}

fn rgb(color: Color) -> Rgb {
    Rgb(color.r, color.g, color.b)
}

fn blend(a: Rgb, b: Rgb, t: f32) -> Rgb {
    let mix = |x: u8, y: u8| (f32::from(x) * (1.0 - t) + f32::from(y) * t).round() as u8;
    Rgb(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

/// Derives a prose palette from a syntax theme's global settings and the
/// colors it assigns to a few markup scopes.
fn derive_prose_colors(theme: &SyntectTheme, fallback_bg: Rgb) -> ProseColors {
    let background = theme.settings.background.map_or(fallback_bg, rgb);
    let default_fg = if background.luminance() > 0.5 {
        Rgb(0x24, 0x29, 0x2e)
    } else {
        Rgb(0xd8, 0xde, 0xe9)
    };
    let text = theme.settings.foreground.map_or(default_fg, rgb);

    let highlighter = Highlighter::new(theme);
    let scope_fg = |scope: &str| -> Rgb {
        let Ok(scope) = Scope::new(scope) else {
            return text;
        };
        rgb(highlighter.style_for_stack(&[scope]).foreground)
    };

    ProseColors {
        text,
        background,
        muted: blend(text, background, 0.45),
        heading: scope_fg("keyword"),
        emphasis: text,
        link: scope_fg("entity.name.function"),
        code_inline: scope_fg("string"),
        quote: scope_fg("comment"),
        bullet: scope_fg("constant.numeric"),
        user: scope_fg("entity.name.tag"),
        error: scope_fg("invalid"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_pairs_load() {
        let pairs = builtin_theme_pairs();
        assert_eq!(pairs.len(), BUILTIN_PAIRS.len());
        for pair in &pairs {
            assert_ne!(pair.dark.name, pair.light.name, "pair {}", pair.name);
        }
    }

    #[test]
    fn test_dark_and_light_backgrounds_differ_in_luminance() {
        let pairs = builtin_theme_pairs();
        let ocean = &pairs[0];
        assert!(
            ocean.dark.prose_colors.background.luminance()
                < ocean.light.prose_colors.background.luminance()
        );
    }

    #[test]
    fn test_normalize_theme_name() {
        assert_eq!(normalize_theme_name(" Base16_Ocean "), "base16-ocean");
    }
}

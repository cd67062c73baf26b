use parlance_core::highlight::SyntaxHighlighter;
use parlance_core::theme::ColorMode;
use parlance_core::{MarkdownRenderer, ThemeManager};
use proptest::prelude::*;

fn renderer() -> MarkdownRenderer {
    MarkdownRenderer::new(SyntaxHighlighter::with_default_syntaxes())
}

/// Fragments that exercise fences, links, tables and escapes.
fn markdown_fragment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("```".to_string()),
        Just("```rust\n".to_string()),
        Just("~~~".to_string()),
        Just("[".to_string()),
        Just("](".to_string()),
        Just(")".to_string()),
        Just("![alt](".to_string()),
        Just("| a | b |\n|---|---|\n".to_string()),
        Just("> ".to_string()),
        Just("- ".to_string()),
        Just("1. ".to_string()),
        Just("\x1b[31m".to_string()),
        Just("\t".to_string()),
        Just("\n".to_string()),
        "[a-z ]{0,12}",
        any::<String>(),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn parse_never_panics(parts in prop::collection::vec(markdown_fragment(), 0..24)) {
        let raw = parts.concat();
        let themes = ThemeManager::builtin(ColorMode::Dark);
        let _ = renderer().parse(&raw, &themes);
    }

    #[test]
    fn parse_is_idempotent(raw in "(```[a-z]{0,4}\n)?[a-z\\[\\]() \n`*_]{0,80}") {
        let themes = ThemeManager::builtin(ColorMode::Light);
        let renderer = renderer();
        prop_assert_eq!(renderer.parse(&raw, &themes), renderer.parse(&raw, &themes));
    }
}

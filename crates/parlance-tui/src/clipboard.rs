//! Clipboard and URL sinks.
//!
//! Copy tries OSC 52 first (works over SSH), then the system clipboard via
//! `arboard`. Links open with the platform handler without waiting on it.

use std::io::{self, Write};

use base64::Engine as _;
use parlance_core::actions::{ActionError, ClipboardSink, UrlOpener};

#[derive(Debug, Default)]
pub struct Clipboard;

impl Clipboard {
    /// `ESC ] 52 ; c ; <base64> ESC \`
    pub fn osc52_sequence(text: &str) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(text);
        format!("\x1b]52;c;{encoded}\x1b\\")
    }

    fn copy_osc52(text: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        stdout.write_all(Self::osc52_sequence(text).as_bytes())?;
        stdout.flush()
    }

    fn copy_system(text: &str) -> Result<(), ActionError> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| ActionError::Clipboard(e.to_string()))?;
        clipboard
            .set_text(text)
            .map_err(|e| ActionError::Clipboard(e.to_string()))
    }
}

impl ClipboardSink for Clipboard {
    fn copy(&mut self, text: &str) -> Result<(), ActionError> {
        match Self::copy_osc52(text) {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::debug!(error = %err, "OSC 52 copy failed, trying system clipboard");
                Self::copy_system(text)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct BrowserOpener;

impl UrlOpener for BrowserOpener {
    fn open_url(&mut self, url: &str) -> Result<(), ActionError> {
        open::that_detached(url).map_err(|source| ActionError::Open {
            url: url.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_osc52_sequence() {
        assert_eq!(Clipboard::osc52_sequence("hi"), "\x1b]52;c;aGk=\x1b\\");
    }
}

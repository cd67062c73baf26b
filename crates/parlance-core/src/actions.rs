//! Click action dispatch.
//!
//! The core decides *what* a click means; the surface supplies the sinks that
//! touch the outside world. Failures never propagate: they come back as
//! transient [`Feedback`] for the status row.

use std::time::{Duration, Instant};

use crate::click::ClickAction;

/// Default time a feedback message stays on screen.
pub const DEFAULT_FEEDBACK_DURATION: Duration = Duration::from_millis(2500);

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("clipboard unavailable: {0}")]
    Clipboard(String),
    #[error("failed to open {url}")]
    Open {
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("refusing to open {0}")]
    UnsupportedUrl(String),
}

/// Writes text to a clipboard.
pub trait ClipboardSink {
    fn copy(&mut self, text: &str) -> Result<(), ActionError>;
}

/// Opens a URL outside the terminal.
pub trait UrlOpener {
    fn open_url(&mut self, url: &str) -> Result<(), ActionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub message: String,
    pub kind: FeedbackKind,
    pub expires_at: Instant,
}

impl Feedback {
    pub fn info(message: impl Into<String>, now: Instant, duration: Duration) -> Self {
        Self {
            message: message.into(),
            kind: FeedbackKind::Info,
            expires_at: now + duration,
        }
    }

    pub fn error(message: impl Into<String>, now: Instant, duration: Duration) -> Self {
        Self {
            message: message.into(),
            kind: FeedbackKind::Error,
            expires_at: now + duration,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Sinks an action may be delegated to.
pub struct ActionSinks<'a> {
    pub clipboard: &'a mut dyn ClipboardSink,
    pub opener: &'a mut dyn UrlOpener,
    pub feedback_duration: Duration,
}

/// Runs `action` and reports the outcome.
pub fn perform(action: &ClickAction, sinks: &mut ActionSinks<'_>, now: Instant) -> Feedback {
    let duration = sinks.feedback_duration;
    match action {
        ClickAction::CopyCode(block) => match sinks.clipboard.copy(&block.content) {
            Ok(()) => {
                let lines = block.content.lines().count().max(1);
                let noun = if lines == 1 { "line" } else { "lines" };
                Feedback::info(format!("Copied {lines} {noun} to clipboard"), now, duration)
            }
            Err(err) => {
                tracing::warn!(message_id = %block.message_id, error = %err, "copy failed");
                Feedback::error(err.to_string(), now, duration)
            }
        },
        ClickAction::OpenLink(url) => {
            let result = check_url(url).and_then(|()| sinks.opener.open_url(url));
            match result {
                Ok(()) => Feedback::info(format!("Opened {url}"), now, duration),
                Err(err) => {
                    tracing::warn!(url = %url, error = %err, "open link failed");
                    Feedback::error(err.to_string(), now, duration)
                }
            }
        }
    }
}

/// Only absolute web, mail and file URLs are handed to the opener.
fn check_url(raw: &str) -> Result<(), ActionError> {
    match url::Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https" | "mailto" | "file") => Ok(()),
        _ => Err(ActionError::UnsupportedUrl(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::click::CodeBlockRef;
    use crate::message::MessageId;

    #[derive(Default)]
    struct Recorder {
        copied: Vec<String>,
        opened: Vec<String>,
        fail: bool,
    }

    impl ClipboardSink for Recorder {
        fn copy(&mut self, text: &str) -> Result<(), ActionError> {
            if self.fail {
                return Err(ActionError::Clipboard("no display".to_string()));
            }
            self.copied.push(text.to_string());
            Ok(())
        }
    }

    struct Opener(Vec<String>);

    impl UrlOpener for Opener {
        fn open_url(&mut self, url: &str) -> Result<(), ActionError> {
            self.0.push(url.to_string());
            Ok(())
        }
    }

    fn copy_action(content: &str) -> ClickAction {
        ClickAction::CopyCode(CodeBlockRef {
            message_id: MessageId(1),
            block_index: 0,
            content: Arc::from(content),
        })
    }

    #[test]
    fn test_copy_delegates_raw_content() {
        let mut clipboard = Recorder::default();
        let mut opener = Opener(Vec::new());
        let mut sinks = ActionSinks {
            clipboard: &mut clipboard,
            opener: &mut opener,
            feedback_duration: DEFAULT_FEEDBACK_DURATION,
        };
        let now = Instant::now();
        let feedback = perform(&copy_action("a\nb"), &mut sinks, now);
        assert_eq!(feedback.kind, FeedbackKind::Info);
        assert_eq!(feedback.message, "Copied 2 lines to clipboard");
        assert!(!feedback.is_expired(now));
        assert!(feedback.is_expired(now + DEFAULT_FEEDBACK_DURATION));
        assert_eq!(clipboard.copied, vec!["a\nb".to_string()]);
    }

    #[test]
    fn test_clipboard_failure_becomes_error_feedback() {
        let mut clipboard = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let mut opener = Opener(Vec::new());
        let mut sinks = ActionSinks {
            clipboard: &mut clipboard,
            opener: &mut opener,
            feedback_duration: DEFAULT_FEEDBACK_DURATION,
        };
        let feedback = perform(&copy_action("x"), &mut sinks, Instant::now());
        assert_eq!(feedback.kind, FeedbackKind::Error);
        assert!(feedback.message.contains("no display"));
    }

    #[test]
    fn test_open_link_rejects_non_web_schemes() {
        let mut clipboard = Recorder::default();
        let mut opener = Opener(Vec::new());
        let mut sinks = ActionSinks {
            clipboard: &mut clipboard,
            opener: &mut opener,
            feedback_duration: DEFAULT_FEEDBACK_DURATION,
        };
        let now = Instant::now();
        let ok = perform(&ClickAction::OpenLink("https://x".to_string()), &mut sinks, now);
        let bad = perform(
            &ClickAction::OpenLink("javascript:alert(1)".to_string()),
            &mut sinks,
            now,
        );
        assert_eq!(ok.kind, FeedbackKind::Info);
        assert_eq!(bad.kind, FeedbackKind::Error);
        assert_eq!(opener.0, vec!["https://x".to_string()]);
    }
}

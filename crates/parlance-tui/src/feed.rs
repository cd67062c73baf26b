//! Live message feed.
//!
//! `--follow` streams markdown on stdin into the open viewer. A line of the
//! form `@@ user`, `@@ assistant` or `@@ system` starts a new message; other
//! lines grow the newest one. `@@ retract` removes the newest message. Text
//! before any marker belongs to an assistant message.
//!
//! Updates cross into the render loop over an unbounded channel that the
//! runtime drains with `try_recv` once per tick, like raster results.

use std::io::BufRead;

use parlance_core::Role;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

const MARKER: &str = "@@ ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogUpdate {
    Append { role: Role, markdown: String },
    /// Replace the newest message's markdown.
    ReplaceLast { markdown: String },
    RemoveLast,
}

/// Turns feed lines into log updates.
#[derive(Debug, Default)]
pub struct FeedParser {
    /// Markdown of the message being streamed, if any.
    current: Option<String>,
}

impl FeedParser {
    pub fn push_line(&mut self, line: &str) -> LogUpdate {
        if let Some(directive) = line.strip_prefix(MARKER) {
            let role = match directive.trim() {
                "user" => Some(Role::User),
                "assistant" => Some(Role::Assistant),
                "system" => Some(Role::System),
                "retract" => {
                    self.current = None;
                    return LogUpdate::RemoveLast;
                }
                _ => None,
            };
            if let Some(role) = role {
                self.current = Some(String::new());
                return LogUpdate::Append {
                    role,
                    markdown: String::new(),
                };
            }
        }

        match &mut self.current {
            Some(text) => {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(line);
                LogUpdate::ReplaceLast {
                    markdown: text.clone(),
                }
            }
            None => {
                self.current = Some(line.to_string());
                LogUpdate::Append {
                    role: Role::Assistant,
                    markdown: line.to_string(),
                }
            }
        }
    }
}

/// Reads `reader` line by line on the blocking pool.
///
/// The channel closes when the reader hits EOF or an error.
pub fn spawn_reader<R>(handle: &Handle, reader: R) -> mpsc::UnboundedReceiver<LogUpdate>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    handle.spawn_blocking(move || {
        let mut parser = FeedParser::default();
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!(error = %err, "feed read failed");
                    break;
                }
            };
            if tx.send(parser.push_line(&line)).is_err() {
                return;
            }
        }
        tracing::debug!("feed closed");
    });
    rx
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_markers_start_and_grow_messages() {
        let mut parser = FeedParser::default();
        assert_eq!(
            parser.push_line("@@ user"),
            LogUpdate::Append {
                role: Role::User,
                markdown: String::new()
            }
        );
        assert_eq!(
            parser.push_line("hello"),
            LogUpdate::ReplaceLast {
                markdown: "hello".to_string()
            }
        );
        assert_eq!(
            parser.push_line("*there*"),
            LogUpdate::ReplaceLast {
                markdown: "hello\n*there*".to_string()
            }
        );
        assert_eq!(parser.push_line("@@ retract"), LogUpdate::RemoveLast);
    }

    #[test]
    fn test_text_without_marker_is_assistant() {
        let mut parser = FeedParser::default();
        assert_eq!(
            parser.push_line("# Title"),
            LogUpdate::Append {
                role: Role::Assistant,
                markdown: "# Title".to_string()
            }
        );
        // Unknown directives are ordinary text.
        assert_eq!(
            parser.push_line("@@ -1,3 +1,4 @@"),
            LogUpdate::ReplaceLast {
                markdown: "# Title\n@@ -1,3 +1,4 @@".to_string()
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reader_streams_until_eof() {
        let input = Cursor::new("@@ user\nhi\n@@ assistant\nhey\n");
        let mut rx = spawn_reader(&Handle::current(), input);
        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }
        assert_eq!(updates.len(), 4);
        assert_eq!(
            updates[3],
            LogUpdate::ReplaceLast {
                markdown: "hey".to_string()
            }
        );
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use super::{MarkdownRenderer, StyledMessage};
use crate::message::{ChatMessage, MessageId};
use crate::theme::{ThemeManager, ThemeVersion};

/// Parsed messages keyed by `(message id, theme version)`.
///
/// Message content is immutable per id, so the id alone identifies the
/// markdown. Entries for older theme versions are dropped the first time a
/// newer version is requested.
#[derive(Debug, Default)]
pub struct StyledMessageCache {
    entries: HashMap<(MessageId, ThemeVersion), Arc<StyledMessage>>,
    newest: ThemeVersion,
}

impl StyledMessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached parse of `message` for the active theme version,
    /// parsing on a miss.
    pub fn get_or_parse(
        &mut self,
        message: &ChatMessage,
        renderer: &MarkdownRenderer,
        themes: &ThemeManager,
    ) -> Arc<StyledMessage> {
        let version = themes.version();
        if version > self.newest {
            let before = self.entries.len();
            self.entries.retain(|(_, v), _| *v >= version);
            self.newest = version;
            tracing::trace!(
                dropped = before - self.entries.len(),
                version = version.0,
                "pruned styled messages for old theme"
            );
        }

        let key = (message.id, version);
        if let Some(hit) = self.entries.get(&key) {
            return Arc::clone(hit);
        }
        let styled = Arc::new(renderer.parse(&message.raw_markdown, themes));
        self.entries.insert(key, Arc::clone(&styled));
        styled
    }

    /// Drops every entry for `id` (message removed or superseded).
    pub fn forget(&mut self, id: MessageId) {
        self.entries.retain(|(entry_id, _), _| *entry_id != id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

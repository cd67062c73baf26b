//! Message-granular scroll state.
//!
//! The controller tracks which message is "current". Whether the view follows
//! new messages is derived from that index, never stored:
//!
//! - **Pinned**: nothing selected yet, or the selection is within the last
//!   `lookback + 1` messages. Appends move the selection to the new message.
//! - **Scrolled**: the selection is further back. Appends leave it alone, so
//!   a reader in the history is never yanked to the bottom.

/// Default auto-scroll lookback (messages from the end that still count as
/// "at the bottom").
pub const DEFAULT_LOOKBACK: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollController {
    selected_index: Option<usize>,
    len: usize,
    lookback: usize,
}

impl Default for ScrollController {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKBACK)
    }
}

impl ScrollController {
    pub fn new(lookback: usize) -> Self {
        Self {
            selected_index: None,
            len: 0,
            lookback,
        }
    }

    /// Controller over an existing log of `len` messages, pinned to the bottom.
    pub fn with_len(len: usize, lookback: usize) -> Self {
        let mut controller = Self::new(lookback);
        controller.len = len;
        controller.scroll_to_bottom();
        controller
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected_index
    }

    /// The selection, or the last message when nothing is selected.
    pub fn effective_index(&self) -> Option<usize> {
        self.selected_index
            .or_else(|| self.len.checked_sub(1))
            .map(|i| i.min(self.len.saturating_sub(1)))
            .filter(|_| self.len > 0)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// `selected_index.is_none() || selected_index >= len - 1 - lookback`.
    pub fn auto_scroll(&self) -> bool {
        match self.selected_index {
            None => true,
            Some(index) => index.saturating_add(1).saturating_add(self.lookback) >= self.len,
        }
    }

    pub fn scroll_up(&mut self) {
        self.scroll_by(-1);
    }

    pub fn scroll_down(&mut self) {
        self.scroll_by(1);
    }

    /// Moves the selection by `delta` messages, clamped to `[0, len-1]`.
    pub fn scroll_by(&mut self, delta: isize) {
        let Some(current) = self.effective_index() else {
            return;
        };
        let last = self.len - 1;
        let next = current.saturating_add_signed(delta).min(last);
        if Some(next) != self.selected_index {
            let was_pinned = self.auto_scroll();
            self.selected_index = Some(next);
            if was_pinned != self.auto_scroll() {
                tracing::trace!(index = next, pinned = !was_pinned, "scroll state changed");
            }
        }
    }

    pub fn scroll_to_top(&mut self) {
        if self.len > 0 {
            self.selected_index = Some(0);
        }
    }

    /// Jumps to the last message. Always leaves the controller pinned.
    pub fn scroll_to_bottom(&mut self) {
        self.selected_index = self.len.checked_sub(1);
    }

    /// Records an append. The pinned state is read *before* the length grows.
    pub fn on_message_appended(&mut self) {
        let was_pinned = self.auto_scroll();
        self.len += 1;
        if was_pinned {
            self.selected_index = Some(self.len - 1);
        }
    }

    /// Records removal of the message at `index`, keeping the selection on
    /// the same message where possible.
    pub fn on_message_removed(&mut self, index: usize) {
        if index >= self.len {
            return;
        }
        self.len -= 1;
        self.selected_index = match self.selected_index {
            _ if self.len == 0 => None,
            Some(selected) if selected > index => Some(selected - 1),
            Some(selected) => Some(selected.min(self.len - 1)),
            None => None,
        };
    }
}

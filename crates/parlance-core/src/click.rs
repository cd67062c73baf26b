//! Frame-scoped click regions.
//!
//! A [`ClickRegistry`] is built by the layout pass for exactly one frame and
//! replaced by the next one; it owns copies of everything its actions need,
//! so nothing in it can outlive or dangle past the layout it came from.

use std::sync::Arc;

use crate::message::MessageId;

/// A rectangle in terminal cells, in absolute screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellRect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl CellRect {
    pub const fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, x: u16, y: u16) -> bool {
        x >= self.x
            && y >= self.y
            && u32::from(x) < u32::from(self.x) + u32::from(self.width)
            && u32::from(y) < u32::from(self.y) + u32::from(self.height)
    }
}

/// Identifies a code block and carries its copy payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlockRef {
    pub message_id: MessageId,
    pub block_index: usize,
    pub content: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
    CopyCode(CodeBlockRef),
    OpenLink(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickRegion {
    pub rect: CellRect,
    pub action: ClickAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClickRegistry {
    regions: Vec<ClickRegion>,
}

impl ClickRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a region in render order. Zero-area rectangles are ignored.
    pub fn register(&mut self, rect: CellRect, action: ClickAction) {
        if rect.width == 0 || rect.height == 0 {
            return;
        }
        self.regions.push(ClickRegion { rect, action });
    }

    /// Returns the action under `(x, y)`. Later registrations win, so
    /// elements drawn on top take precedence.
    pub fn dispatch(&self, x: u16, y: u16) -> Option<&ClickAction> {
        self.regions
            .iter()
            .rev()
            .find(|region| region.rect.contains(x, y))
            .map(|region| &region.action)
    }

    pub fn regions(&self) -> &[ClickRegion] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

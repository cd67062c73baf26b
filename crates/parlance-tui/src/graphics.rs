//! Kitty image placement after each draw.
//!
//! ratatui knows nothing about images; the layout leaves blank rows where an
//! image goes and this module places the bitmap over them once the frame is
//! on screen. Placements are only re-sent when they change.

use std::io::{self, Write};
use std::sync::Arc;

use crossterm::QueueableCommand as _;
use crossterm::cursor;
use parlance_core::click::CellRect;
use parlance_core::frame::ImagePlacement;
use parlance_core::image::kitty;

#[derive(Debug, Clone)]
struct Placed {
    rect: CellRect,
    payload: Arc<str>,
}

impl PartialEq for Placed {
    fn eq(&self, other: &Self) -> bool {
        self.rect == other.rect && Arc::ptr_eq(&self.payload, &other.payload)
    }
}

#[derive(Debug, Default)]
pub struct KittyPlacer {
    tmux: bool,
    placed: Vec<Placed>,
}

impl KittyPlacer {
    pub fn new(tmux: bool) -> Self {
        Self {
            tmux,
            placed: Vec::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var_os("TMUX").is_some())
    }

    /// Brings the screen's placements in line with `images`.
    ///
    /// Returns true if anything was written.
    pub fn sync(&mut self, w: &mut impl Write, images: &[ImagePlacement]) -> io::Result<bool> {
        let next: Vec<Placed> = images
            .iter()
            .map(|p| Placed {
                rect: p.rect,
                payload: Arc::clone(&p.image.png_base64),
            })
            .collect();
        if next == self.placed {
            return Ok(false);
        }

        if !self.placed.is_empty() {
            w.write_all(&kitty::passthrough(&kitty::delete_all(), self.tmux))?;
        }
        w.queue(cursor::SavePosition)?;
        for (index, placement) in next.iter().enumerate() {
            let id = u32::try_from(index + 1).unwrap_or(u32::MAX);
            w.queue(cursor::MoveTo(placement.rect.x, placement.rect.y))?;
            for chunk in kitty::transmit_and_place(
                &placement.payload,
                id,
                placement.rect.width,
                placement.rect.height,
            ) {
                w.write_all(&kitty::passthrough(&chunk, self.tmux))?;
            }
        }
        w.queue(cursor::RestorePosition)?;
        w.flush()?;

        tracing::trace!(count = next.len(), "placed images");
        self.placed = next;
        Ok(true)
    }
}

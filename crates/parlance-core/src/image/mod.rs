//! Inline image rendering.
//!
//! The protocol is negotiated once; with [`ImageProtocol::None`] every image
//! renders as its alt-text fallback. Rasterized bitmaps are cached by
//! `(content hash, quantized target width)` in an LRU so repeated frames and
//! small resizes reuse earlier work.

pub mod kitty;
mod raster;
mod worker;

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use lru::LruCache;
pub use raster::{load_source, rasterize};
pub use worker::{RasterRequest, RasterResult, RasterWorker};

use crate::capability::ImageProtocol;
use crate::hash::ContentHash;
use crate::message::ChatLog;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("unrecognized image format")]
    UnknownFormat,
    #[error("invalid SVG: {0}")]
    Svg(String),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to resize image: {0}")]
    Resize(String),
    #[error("image has no drawable area")]
    Empty,
    #[error("remote images are not fetched: {0}")]
    Remote(String),
    #[error("unusable image source: {0}")]
    BadSource(String),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
    WebP,
    Gif,
    Svg,
}

impl ImageFormat {
    /// Detects the format from content: SVG by its leading markup, raster
    /// formats by magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        let head = &bytes[..bytes.len().min(512)];
        let text = String::from_utf8_lossy(head);
        let text = text.trim_start_matches('\u{feff}').trim_start();
        if text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg")) {
            return Some(Self::Svg);
        }
        match image::guess_format(bytes).ok()? {
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::WebP => Some(Self::WebP),
            image::ImageFormat::Gif => Some(Self::Gif),
            _ => None,
        }
    }

    fn raster_format(self) -> Option<image::ImageFormat> {
        match self {
            Self::Png => Some(image::ImageFormat::Png),
            Self::Jpeg => Some(image::ImageFormat::Jpeg),
            Self::WebP => Some(image::ImageFormat::WebP),
            Self::Gif => Some(image::ImageFormat::Gif),
            Self::Svg => None,
        }
    }
}

/// Scaling and caching knobs for the image pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOptions {
    pub max_height_px: u32,
    /// Enlarge images narrower than the target width.
    pub upscale: bool,
    /// Target widths are rounded down to a multiple of this.
    pub resize_step_px: u32,
    pub cache_capacity: usize,
    /// Cell metrics used to convert pixels to terminal cells.
    pub cell_width_px: u16,
    pub cell_height_px: u16,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            max_height_px: 480,
            upscale: false,
            resize_step_px: 32,
            cache_capacity: 64,
            cell_width_px: 8,
            cell_height_px: 16,
        }
    }
}

impl ImageOptions {
    /// Pixel width for an area `cols` cells wide, quantized to the resize step.
    pub fn target_width_px(&self, cols: u16) -> u32 {
        let raw = u32::from(cols) * u32::from(self.cell_width_px.max(1));
        let step = self.resize_step_px;
        if step == 0 || raw < step {
            return raw.max(1);
        }
        raw / step * step
    }

    /// Cells covered by a `width`×`height` pixel bitmap.
    pub fn cells_for(&self, width_px: u32, height_px: u32) -> (u16, u16) {
        let cw = u32::from(self.cell_width_px.max(1));
        let ch = u32::from(self.cell_height_px.max(1));
        let cols = width_px.div_ceil(cw).clamp(1, u32::from(u16::MAX));
        let rows = height_px.div_ceil(ch).clamp(1, u32::from(u16::MAX));
        (cols as u16, rows as u16)
    }
}

/// A PNG bitmap ready for protocol encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width_px: u32,
    pub height_px: u32,
    pub png_base64: Arc<str>,
}

/// Outcome of rendering one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutput {
    Rendered(Arc<RasterImage>),
    TextFallback(String),
}

/// State of an image source at a given width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLookup {
    Ready(Arc<RasterImage>),
    Failed,
    /// Not rasterized yet; a background request is needed.
    Missing,
}

/// `"IMAGE: {alt}"`, shown when an image cannot be drawn.
pub fn fallback_text(alt: &str) -> String {
    format!("IMAGE: {alt}")
}

/// Decodes and rasterizes `bytes` without any caching.
///
/// Failures are logged and become the alt-text fallback. Both
/// [`ImageRenderer::render`] and the background worker go through here.
pub fn render_bytes(
    bytes: &[u8],
    format: Option<ImageFormat>,
    alt: &str,
    target_width_px: u32,
    options: &ImageOptions,
) -> ImageOutput {
    let result = format
        .or_else(|| ImageFormat::sniff(bytes))
        .ok_or(ImageError::UnknownFormat)
        .and_then(|format| rasterize(bytes, format, target_width_px, options));
    match result {
        Ok(image) => ImageOutput::Rendered(Arc::new(image)),
        Err(err) => {
            tracing::warn!(
                content_hash = %ContentHash::of(bytes),
                target_width = target_width_px,
                error = %err,
                "image render failed, using alt text"
            );
            ImageOutput::TextFallback(fallback_text(alt))
        }
    }
}

type RasterKey = (ContentHash, u32);

#[derive(Debug, Clone)]
enum CachedRaster {
    Ready(Arc<RasterImage>),
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    Resolved(ContentHash),
    Unloadable,
}

#[derive(Debug)]
pub struct ImageRenderer {
    protocol: ImageProtocol,
    options: ImageOptions,
    cache: LruCache<RasterKey, CachedRaster>,
    sources: HashMap<String, SourceState>,
    /// Bumped whenever a background result lands, so layouts that showed a
    /// placeholder are recomputed.
    generation: u64,
}

impl ImageRenderer {
    pub fn new(protocol: ImageProtocol, options: ImageOptions) -> Self {
        let capacity = NonZeroUsize::new(options.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            protocol,
            options,
            cache: LruCache::new(capacity),
            sources: HashMap::new(),
            generation: 0,
        }
    }

    pub fn protocol(&self) -> ImageProtocol {
        self.protocol
    }

    pub fn options(&self) -> &ImageOptions {
        &self.options
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Renders `bytes` synchronously, consulting and filling the cache.
    ///
    /// Never fails: unknown formats, malformed SVG and decode errors all
    /// produce the `"IMAGE: {alt}"` fallback, as does a terminal without an
    /// image protocol.
    pub fn render(
        &mut self,
        bytes: &[u8],
        format: Option<ImageFormat>,
        alt: &str,
        target_width_px: u32,
    ) -> ImageOutput {
        if self.protocol == ImageProtocol::None {
            return ImageOutput::TextFallback(fallback_text(alt));
        }
        let hash = ContentHash::of(bytes);
        let key = (hash, target_width_px);
        if let Some(cached) = self.cache.get(&key) {
            return match cached {
                CachedRaster::Ready(image) => ImageOutput::Rendered(Arc::clone(image)),
                CachedRaster::Failed => ImageOutput::TextFallback(fallback_text(alt)),
            };
        }

        let output = render_bytes(bytes, format, alt, target_width_px, &self.options);
        let entry = match &output {
            ImageOutput::Rendered(image) => CachedRaster::Ready(Arc::clone(image)),
            ImageOutput::TextFallback(_) => CachedRaster::Failed,
        };
        self.cache.put(key, entry);
        output
    }

    /// Grows the cache so `needed` rasters fit at once.
    ///
    /// Called with the number of images the visible messages reference;
    /// a smaller cache would evict entries the next frame asks for again.
    pub fn reserve(&mut self, needed: usize) {
        let Some(needed) = NonZeroUsize::new(needed) else {
            return;
        };
        if needed > self.cache.cap() {
            tracing::debug!(
                from = self.cache.cap().get(),
                to = needed.get(),
                "growing raster cache"
            );
            self.cache.resize(needed);
        }
    }

    /// Looks up a previously published rasterization of `src`.
    pub fn lookup(&mut self, src: &str, target_width_px: u32) -> ImageLookup {
        match self.sources.get(src) {
            None => ImageLookup::Missing,
            Some(SourceState::Unloadable) => ImageLookup::Failed,
            Some(SourceState::Resolved(hash)) => match self.cache.get(&(*hash, target_width_px)) {
                Some(CachedRaster::Ready(image)) => ImageLookup::Ready(Arc::clone(image)),
                Some(CachedRaster::Failed) => ImageLookup::Failed,
                None => ImageLookup::Missing,
            },
        }
    }

    /// Publishes a background result if its message is still current.
    ///
    /// Returns false when the result is stale (message superseded or
    /// removed) and was discarded.
    pub fn accept(&mut self, result: RasterResult, log: &ChatLog) -> bool {
        let request = &result.request;
        if !log.is_current(request.message_id, request.message_hash) {
            tracing::debug!(
                message_id = %request.message_id,
                src = %request.src,
                "discarding raster result for stale message"
            );
            return false;
        }

        match result.content_hash {
            Some(hash) => {
                self.sources
                    .insert(request.src.clone(), SourceState::Resolved(hash));
                let entry = match result.output {
                    ImageOutput::Rendered(image) => CachedRaster::Ready(image),
                    ImageOutput::TextFallback(_) => CachedRaster::Failed,
                };
                self.cache.put((hash, request.target_width_px), entry);
            }
            None => {
                self.sources
                    .insert(request.src.clone(), SourceState::Unloadable);
            }
        }
        self.generation += 1;
        true
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        self.cache.len()
    }

    #[cfg(test)]
    fn cache_cap(&self) -> usize {
        self.cache.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    const SVG: &[u8] = br#"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20"><circle cx="10" cy="10" r="8"/></svg>"#;

    fn kitty() -> ImageRenderer {
        ImageRenderer::new(ImageProtocol::Kitty, ImageOptions::default())
    }

    #[test]
    fn test_sniff() {
        assert_eq!(ImageFormat::sniff(SVG), Some(ImageFormat::Svg));
        assert_eq!(
            ImageFormat::sniff(b"<?xml version=\"1.0\"?>\n<svg></svg>"),
            Some(ImageFormat::Svg)
        );
        assert_eq!(
            ImageFormat::sniff(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]),
            Some(ImageFormat::Png)
        );
        assert_eq!(ImageFormat::sniff(b"hello"), None);
    }

    #[test]
    fn test_bad_svg_falls_back_to_alt_text() {
        let mut renderer = kitty();
        let out = renderer.render(b"<svg><nope", Some(ImageFormat::Svg), "chart", 320);
        assert_eq!(out, ImageOutput::TextFallback("IMAGE: chart".to_string()));
    }

    #[test]
    fn test_no_protocol_always_falls_back() {
        let mut renderer = ImageRenderer::new(ImageProtocol::None, ImageOptions::default());
        let out = renderer.render(SVG, None, "logo", 320);
        assert_eq!(out, ImageOutput::TextFallback("IMAGE: logo".to_string()));
    }

    #[test]
    fn test_render_is_cached_per_width() {
        let mut renderer = kitty();
        let ImageOutput::Rendered(first) = renderer.render(SVG, None, "a", 32) else {
            panic!("expected a rendered image");
        };
        let ImageOutput::Rendered(again) = renderer.render(SVG, None, "a", 32) else {
            panic!("expected a rendered image");
        };
        assert!(Arc::ptr_eq(&first, &again));
        renderer.render(SVG, None, "a", 64);
        assert_eq!(renderer.cache_len(), 2);
    }

    #[test]
    fn test_target_width_quantized() {
        let options = ImageOptions::default();
        assert_eq!(options.target_width_px(10), 64);
        assert_eq!(options.target_width_px(11), 64);
        assert_eq!(options.target_width_px(12), 96);
        assert_eq!(options.target_width_px(2), 16);
        assert_eq!(options.cells_for(17, 16), (3, 1));
    }

    #[test]
    fn test_accept_discards_stale_results() {
        let mut log = ChatLog::new();
        let id = log.push(Role::Assistant, "![x](x.svg)");
        let message_hash = log.get(id).unwrap().content_hash();
        log.supersede(id, "edited");

        let mut renderer = kitty();
        let result = RasterResult {
            request: RasterRequest {
                message_id: id,
                message_hash,
                src: "x.svg".into(),
                alt: "x".into(),
                base_dir: None,
                target_width_px: 64,
            },
            content_hash: Some(ContentHash::of(SVG)),
            output: ImageOutput::Rendered(Arc::new(RasterImage {
                width_px: 1,
                height_px: 1,
                png_base64: Arc::from(""),
            })),
        };
        assert!(!renderer.accept(result, &log));
        assert_eq!(renderer.lookup("x.svg", 64), ImageLookup::Missing);
        assert_eq!(renderer.generation(), 0);
    }

    #[test]
    fn test_accept_publishes_current_results() {
        let mut log = ChatLog::new();
        let id = log.push(Role::Assistant, "![x](x.svg)");
        let message_hash = log.get(id).unwrap().content_hash();
        let mut renderer = kitty();

        let request = RasterRequest {
            message_id: id,
            message_hash,
            src: "x.svg".into(),
            alt: "x".into(),
            base_dir: None,
            target_width_px: 64,
        };
        let image = Arc::new(RasterImage {
            width_px: 40,
            height_px: 20,
            png_base64: Arc::from("AAAA"),
        });
        let accepted = renderer.accept(
            RasterResult {
                request: request.clone(),
                content_hash: Some(ContentHash::of(SVG)),
                output: ImageOutput::Rendered(Arc::clone(&image)),
            },
            &log,
        );
        assert!(accepted);
        assert_eq!(renderer.lookup("x.svg", 64), ImageLookup::Ready(image));
        assert_eq!(renderer.lookup("x.svg", 96), ImageLookup::Missing);
        assert_eq!(renderer.generation(), 1);

        renderer.accept(
            RasterResult {
                request: RasterRequest {
                    src: "gone.png".into(),
                    ..request
                },
                content_hash: None,
                output: ImageOutput::TextFallback(fallback_text("x")),
            },
            &log,
        );
        assert_eq!(renderer.lookup("gone.png", 64), ImageLookup::Failed);
    }

    #[test]
    fn test_render_bytes_matches_render() {
        let options = ImageOptions::default();
        let mut renderer = kitty();
        let ImageOutput::Rendered(cached) = renderer.render(SVG, None, "a", 32) else {
            panic!("expected a rendered image");
        };
        let ImageOutput::Rendered(direct) = render_bytes(SVG, None, "a", 32, &options) else {
            panic!("expected a rendered image");
        };
        assert_eq!(*cached, *direct);
        assert_eq!(
            render_bytes(b"plain text", None, "notes", 32, &options),
            ImageOutput::TextFallback("IMAGE: notes".to_string())
        );
    }

    #[test]
    fn test_reserve_keeps_every_visible_raster() {
        let options = ImageOptions {
            cache_capacity: 2,
            ..ImageOptions::default()
        };
        let mut log = ChatLog::new();
        let id = log.push(Role::Assistant, "images");
        let message_hash = log.get(id).unwrap().content_hash();
        let mut renderer = ImageRenderer::new(ImageProtocol::Kitty, options);

        renderer.reserve(1);
        assert_eq!(renderer.cache_cap(), 2);
        renderer.reserve(5);
        assert_eq!(renderer.cache_cap(), 5);

        let srcs: Vec<String> = (0..5).map(|i| format!("{i}.png")).collect();
        for src in &srcs {
            renderer.accept(
                RasterResult {
                    request: RasterRequest {
                        message_id: id,
                        message_hash,
                        src: src.clone(),
                        alt: String::new(),
                        base_dir: None,
                        target_width_px: 64,
                    },
                    content_hash: Some(ContentHash::of(src.as_bytes())),
                    output: ImageOutput::Rendered(Arc::new(RasterImage {
                        width_px: 8,
                        height_px: 8,
                        png_base64: Arc::from("AAAA"),
                    })),
                },
                &log,
            );
        }
        for src in &srcs {
            assert!(matches!(renderer.lookup(src, 64), ImageLookup::Ready(_)));
        }
    }
}

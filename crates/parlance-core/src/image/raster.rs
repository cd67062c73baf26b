//! Decode, rasterize, resize and PNG-encode image payloads.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use fast_image_resize as fir;
use resvg::{tiny_skia, usvg};

use super::{ImageError, ImageFormat, ImageOptions, RasterImage};

/// Rasterizes `bytes` to a PNG at most `target_width` pixels wide.
///
/// The aspect ratio is kept. Height is clamped to `options.max_height_px`
/// (width shrinks with it), and images narrower than the target are only
/// enlarged when `options.upscale` is set.
pub fn rasterize(
    bytes: &[u8],
    format: ImageFormat,
    target_width: u32,
    options: &ImageOptions,
) -> Result<RasterImage, ImageError> {
    let rgba = match format {
        ImageFormat::Svg => rasterize_svg(bytes, target_width, options)?,
        _ => decode_and_fit(bytes, format, target_width, options)?,
    };
    let (width, height) = rgba.dimensions();
    let png = encode_png(&rgba)?;
    Ok(RasterImage {
        width_px: width,
        height_px: height,
        png_base64: base64::engine::general_purpose::STANDARD.encode(png).into(),
    })
}

/// Output dimensions for a `src_w`×`src_h` source.
pub(super) fn fit_dimensions(
    src_w: f32,
    src_h: f32,
    target_width: u32,
    options: &ImageOptions,
) -> Option<(u32, u32, f32)> {
    if !(src_w.is_finite() && src_h.is_finite()) || src_w <= 0.0 || src_h <= 0.0 {
        return None;
    }
    let mut scale = target_width.max(1) as f32 / src_w;
    if !options.upscale {
        scale = scale.min(1.0);
    }
    let max_h = options.max_height_px.max(1) as f32;
    if src_h * scale > max_h {
        scale = max_h / src_h;
    }
    let width = (src_w * scale).round().max(1.0) as u32;
    let height = (src_h * scale).round().max(1.0) as u32;
    Some((width, height, scale))
}

fn rasterize_svg(
    bytes: &[u8],
    target_width: u32,
    options: &ImageOptions,
) -> Result<image::RgbaImage, ImageError> {
    let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())
        .map_err(|e| ImageError::Svg(e.to_string()))?;
    let size = tree.size();
    let (width, height, scale) = fit_dimensions(size.width(), size.height(), target_width, options)
        .ok_or(ImageError::Empty)?;

    let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or(ImageError::Empty)?;
    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );

    // tiny-skia stores premultiplied alpha.
    let pixels: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    image::RgbaImage::from_raw(width, height, pixels).ok_or(ImageError::Empty)
}

fn decode_and_fit(
    bytes: &[u8],
    format: ImageFormat,
    target_width: u32,
    options: &ImageOptions,
) -> Result<image::RgbaImage, ImageError> {
    let raster = format.raster_format().ok_or(ImageError::UnknownFormat)?;
    let rgba = image::load_from_memory_with_format(bytes, raster)?.to_rgba8();
    let (src_w, src_h) = rgba.dimensions();
    let (width, height, _) = fit_dimensions(src_w as f32, src_h as f32, target_width, options)
        .ok_or(ImageError::Empty)?;
    resize_rgba(rgba, width, height)
}

fn resize_rgba(
    src: image::RgbaImage,
    dst_w: u32,
    dst_h: u32,
) -> Result<image::RgbaImage, ImageError> {
    if src.dimensions() == (dst_w, dst_h) {
        return Ok(src);
    }
    let (src_w, src_h) = src.dimensions();
    let src_image = fir::images::Image::from_vec_u8(src_w, src_h, src.into_raw(), fir::PixelType::U8x4)
        .map_err(|e| ImageError::Resize(e.to_string()))?;

    let mut dst_image = fir::images::Image::new(dst_w, dst_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| ImageError::Resize(e.to_string()))?;

    image::RgbaImage::from_raw(dst_w, dst_h, dst_image.into_vec())
        .ok_or_else(|| ImageError::Resize("invalid output buffer".to_string()))
}

fn encode_png(img: &image::RgbaImage) -> Result<Vec<u8>, ImageError> {
    use image::ImageEncoder as _;
    use image::codecs::png::{CompressionType, FilterType, PngEncoder};

    let mut buf = Vec::new();
    let (w, h) = img.dimensions();
    PngEncoder::new_with_quality(&mut buf, CompressionType::Fast, FilterType::Adaptive)
        .write_image(img.as_raw(), w, h, image::ExtendedColorType::Rgba8)?;
    Ok(buf)
}

/// Reads an image reference from disk.
///
/// Relative paths resolve against `base_dir`; `file://` URLs are accepted.
/// Remote URLs are never fetched.
pub fn load_source(src: &str, base_dir: Option<&Path>) -> Result<Vec<u8>, ImageError> {
    if src.starts_with("http://") || src.starts_with("https://") {
        return Err(ImageError::Remote(src.to_string()));
    }
    let path = if src.starts_with("file://") {
        url::Url::parse(src)
            .ok()
            .and_then(|u| u.to_file_path().ok())
            .ok_or_else(|| ImageError::BadSource(src.to_string()))?
    } else {
        let path = PathBuf::from(src);
        match base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    };
    std::fs::read(&path).map_err(|source| ImageError::Io { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE_SVG: &[u8] = br#"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="100"><rect width="200" height="100" fill="red"/></svg>"#;

    fn png_fixture(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([0, 128, 255, 255]));
        encode_png(&img).unwrap()
    }

    #[test]
    fn test_svg_scaled_to_target_width() {
        let out = rasterize(SQUARE_SVG, ImageFormat::Svg, 100, &ImageOptions::default()).unwrap();
        assert_eq!((out.width_px, out.height_px), (100, 50));
        assert!(!out.png_base64.is_empty());
    }

    #[test]
    fn test_svg_not_upscaled_by_default() {
        let out = rasterize(SQUARE_SVG, ImageFormat::Svg, 800, &ImageOptions::default()).unwrap();
        assert_eq!((out.width_px, out.height_px), (200, 100));

        let upscale = ImageOptions {
            upscale: true,
            ..ImageOptions::default()
        };
        let out = rasterize(SQUARE_SVG, ImageFormat::Svg, 400, &upscale).unwrap();
        assert_eq!((out.width_px, out.height_px), (400, 200));
    }

    #[test]
    fn test_height_clamp_shrinks_width() {
        let options = ImageOptions {
            max_height_px: 25,
            ..ImageOptions::default()
        };
        let out = rasterize(SQUARE_SVG, ImageFormat::Svg, 200, &options).unwrap();
        assert_eq!((out.width_px, out.height_px), (50, 25));
    }

    #[test]
    fn test_malformed_svg_is_error() {
        let err = rasterize(b"<svg><g>", ImageFormat::Svg, 100, &ImageOptions::default());
        assert!(matches!(err, Err(ImageError::Svg(_))));
    }

    #[test]
    fn test_png_downscaled() {
        let png = png_fixture(64, 32);
        let out = rasterize(&png, ImageFormat::Png, 32, &ImageOptions::default()).unwrap();
        assert_eq!((out.width_px, out.height_px), (32, 16));
    }

    #[test]
    fn test_truncated_png_is_error() {
        let png = png_fixture(8, 8);
        assert!(rasterize(&png[..20], ImageFormat::Png, 32, &ImageOptions::default()).is_err());
    }

    #[test]
    fn test_fit_rejects_degenerate_sizes() {
        let options = ImageOptions::default();
        assert!(fit_dimensions(0.0, 10.0, 100, &options).is_none());
        assert!(fit_dimensions(f32::NAN, 10.0, 100, &options).is_none());
    }

    #[test]
    fn test_load_source_relative_and_remote() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pic.svg"), SQUARE_SVG).unwrap();
        let bytes = load_source("pic.svg", Some(dir.path())).unwrap();
        assert_eq!(bytes, SQUARE_SVG);

        assert!(matches!(
            load_source("https://example.com/a.png", None),
            Err(ImageError::Remote(_))
        ));
        assert!(matches!(
            load_source("missing.png", Some(dir.path())),
            Err(ImageError::Io { .. })
        ));
    }
}

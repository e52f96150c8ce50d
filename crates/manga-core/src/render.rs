use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use crate::media::PixelBuffer;
use crate::Result;

const COVER_MIME_PREFIX: &str = "data:image/jpeg;base64,";

/// Cover thumbnail plus the aspect ratio of the image it was cut from.
#[derive(Debug, Clone, PartialEq)]
pub struct Cover {
    /// `data:` URL with a base64 JPEG payload
    pub data_url: String,
    /// Source width / height
    pub aspect_ratio: f64,
}

/// Decode `bytes` and produce a cover `height` pixels high.
pub fn render_cover(bytes: &[u8], height: u32, quality: u8) -> Result<Cover> {
    let img = image::load_from_memory(bytes)?;
    let aspect_ratio = img.width() as f64 / img.height().max(1) as f64;

    let width = scaled(img.width(), img.height(), height);
    let thumb = img.resize_exact(width, height, FilterType::Triangle);

    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
    DynamicImage::ImageRgb8(thumb.to_rgb8()).write_with_encoder(encoder)?;

    Ok(Cover {
        data_url: format!("{}{}", COVER_MIME_PREFIX, STANDARD.encode(&jpeg)),
        aspect_ratio,
    })
}

/// Decode `bytes` and scale to `width` pixels wide, keeping the aspect ratio.
pub fn render_page(bytes: &[u8], width: u32) -> Result<PixelBuffer> {
    let img = image::load_from_memory(bytes)?;
    let height = scaled(img.height(), img.width(), width);
    let page = img.resize_exact(width, height, FilterType::Triangle).to_rgba8();
    Ok(PixelBuffer {
        width: page.width(),
        height: page.height(),
        rgba: page.into_raw(),
    })
}

/// Length of the free side when the fixed side is scaled to `target`.
fn scaled(free: u32, fixed: u32, target: u32) -> u32 {
    let ratio = target as f64 / fixed.max(1) as f64;
    ((free as f64 * ratio).round() as u32).max(1)
}

/// Strip the `data:` prefix and decode the JPEG bytes of a stored cover.
pub fn cover_bytes(data_url: &str) -> Option<Vec<u8>> {
    let payload = data_url.strip_prefix(COVER_MIME_PREFIX)?;
    STANDARD.decode(payload).ok()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_cover_has_fixed_height() {
        let cover = render_cover(&png_bytes(300, 600), 170, 100).unwrap();
        assert!((cover.aspect_ratio - 0.5).abs() < 1e-9);
        assert!(cover.data_url.starts_with(COVER_MIME_PREFIX));

        let jpeg = cover_bytes(&cover.data_url).unwrap();
        let thumb = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(thumb.height(), 170);
        assert_eq!(thumb.width(), 85);
    }

    #[test]
    fn test_page_has_fixed_width() {
        let page = render_page(&png_bytes(1200, 1800), 600).unwrap();
        assert_eq!(page.width, 600);
        assert_eq!(page.height, 900);
        assert_eq!(page.rgba.len(), 600 * 900 * 4);
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        assert!(render_page(b"not an image", 600).is_err());
        assert!(render_cover(b"", 170, 100).is_err());
    }
}

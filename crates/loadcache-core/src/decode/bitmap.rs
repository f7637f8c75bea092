//! Incremental image decoding
//!
//! Bytes are fed as they arrive. The geometry is reported as soon as the
//! header is complete; the full decode happens once the body is final.

use image::{DynamicImage, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;

use crate::error::DecodeError;

/// How animated images should be played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationPolicy {
    #[default]
    Enabled,
    /// Play through once, then stop on the last frame
    Once,
    Disabled,
}

/// A rectangle in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ImageRect {
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Whether the decoder can read images served with this mimetype
pub fn is_supported_mimetype(mimetype: &str) -> bool {
    ImageFormat::from_mime_type(mimetype).is_some_and(|format| format.reading_enabled())
}

fn probe_dimensions(bytes: &[u8]) -> Option<(ImageFormat, (u32, u32))> {
    let format = image::guess_format(bytes).ok()?;
    let dimensions = ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .ok()?;
    Some((format, dimensions))
}

#[derive(Debug, Default)]
pub struct ImageDecoder {
    buffer: Vec<u8>,
    format: Option<ImageFormat>,
    geometry: Option<(u32, u32)>,
    image: Option<Arc<DynamicImage>>,
    animation: AnimationPolicy,
}

impl ImageDecoder {
    pub fn new(animation: AnimationPolicy) -> Self {
        Self {
            animation,
            ..Default::default()
        }
    }

    /// Feed more bytes. Returns the geometry the first time it becomes known.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<(u32, u32)> {
        self.buffer.extend_from_slice(chunk);
        if self.geometry.is_some() {
            return None;
        }
        let (format, geometry) = probe_dimensions(&self.buffer)?;
        self.format = Some(format);
        self.geometry = Some(geometry);
        Some(geometry)
    }

    /// Decode everything fed so far
    pub fn finish(&mut self) -> Result<(u32, u32), DecodeError> {
        if self.buffer.is_empty() {
            return Err(DecodeError::Image("no image data".to_string()));
        }
        let format = image::guess_format(&self.buffer)
            .map_err(|e| DecodeError::Image(e.to_string()))?;
        let image = image::load_from_memory_with_format(&self.buffer, format)
            .map_err(|e| DecodeError::Image(e.to_string()))?;

        let geometry = (image.width(), image.height());
        self.format = Some(format);
        self.geometry = Some(geometry);
        self.image = Some(Arc::new(image));
        self.buffer = Vec::new();
        Ok(geometry)
    }

    /// Drop all decoded state
    pub fn clear(&mut self) {
        let animation = self.animation;
        *self = Self::new(animation);
    }

    pub fn geometry(&self) -> Option<(u32, u32)> {
        self.geometry
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    pub fn image(&self) -> Option<Arc<DynamicImage>> {
        self.image.clone()
    }

    pub fn animation(&self) -> AnimationPolicy {
        self.animation
    }

    pub fn set_animation(&mut self, animation: AnimationPolicy) {
        self.animation = animation;
    }
}

#[cfg(test)]
pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::new_rgba8(width, height);
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png fixture");
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_mimetypes() {
        assert!(is_supported_mimetype("image/png"));
        assert!(is_supported_mimetype("image/gif"));
        assert!(!is_supported_mimetype("text/html"));
        assert!(!is_supported_mimetype(""));
    }

    #[test]
    fn test_geometry_known_before_finish() {
        let png = png_fixture(7, 3);
        let mut decoder = ImageDecoder::new(AnimationPolicy::Enabled);

        assert_eq!(decoder.feed(&png[..8]), None);
        assert_eq!(decoder.feed(&png[8..]), Some((7, 3)));
        assert_eq!(decoder.feed(&[]), None);
        assert_eq!(decoder.format(), Some(ImageFormat::Png));

        assert_eq!(decoder.finish().unwrap(), (7, 3));
        assert!(decoder.image().is_some());
    }

    #[test]
    fn test_garbage_fails() {
        let mut decoder = ImageDecoder::default();
        decoder.feed(b"<html>not found</html>");
        assert!(decoder.finish().is_err());

        let mut empty = ImageDecoder::default();
        assert!(empty.finish().is_err());
    }

    #[test]
    fn test_clear_keeps_animation_policy() {
        let mut decoder = ImageDecoder::new(AnimationPolicy::Disabled);
        decoder.feed(&png_fixture(2, 2));
        decoder.clear();
        assert_eq!(decoder.geometry(), None);
        assert_eq!(decoder.animation(), AnimationPolicy::Disabled);
    }
}

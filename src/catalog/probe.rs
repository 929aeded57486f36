//! Header-only image metadata probe.

use anyhow::{Context, Result};
use image::{ColorType, ImageDecoder, ImageReader};
use std::path::Path;

/// Mode recorded when an image cannot be probed.
pub const UNKNOWN_MODE: &str = "unknown";

/// Pixel dimensions and color mode of a layer image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub mode: String,
}

impl ImageInfo {
    /// Zero-size stand-in for an unreadable file.
    pub fn placeholder() -> Self {
        Self {
            width: 0,
            height: 0,
            mode: UNKNOWN_MODE.to_string(),
        }
    }
}

/// Read dimensions and color type without decoding pixel data.
pub fn probe(path: &Path) -> Result<ImageInfo> {
    let decoder = ImageReader::open(path)
        .with_context(|| format!("cannot open `{}`", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("cannot read `{}`", path.display()))?
        .into_decoder()
        .with_context(|| format!("unsupported image `{}`", path.display()))?;

    let (width, height) = decoder.dimensions();
    Ok(ImageInfo {
        width,
        height,
        mode: color_mode(decoder.color_type()).to_string(),
    })
}

/// Short channel-layout name, e.g. `RGBA` or `L16`.
pub fn color_mode(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 => "L",
        ColorType::La8 => "LA",
        ColorType::Rgb8 => "RGB",
        ColorType::Rgba8 => "RGBA",
        ColorType::L16 => "L16",
        ColorType::La16 => "LA16",
        ColorType::Rgb16 => "RGB16",
        ColorType::Rgba16 => "RGBA16",
        ColorType::Rgb32F => "RGB32F",
        ColorType::Rgba32F => "RGBA32F",
        _ => UNKNOWN_MODE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbaImage};
    use tempfile::TempDir;

    #[test]
    fn test_probe_rgba_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("layer.png");
        RgbaImage::new(40, 25).save(&path).unwrap();

        let info = probe(&path).unwrap();
        assert_eq!(
            info,
            ImageInfo {
                width: 40,
                height: 25,
                mode: "RGBA".to_string()
            }
        );
    }

    #[test]
    fn test_probe_grayscale_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mask.png");
        GrayImage::new(3, 7).save(&path).unwrap();

        let info = probe(&path).unwrap();
        assert_eq!((info.width, info.height), (3, 7));
        assert_eq!(info.mode, "L");
    }

    #[test]
    fn test_probe_garbage_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.png");
        std::fs::write(&path, "definitely not a png").unwrap();
        assert!(probe(&path).is_err());
    }
}

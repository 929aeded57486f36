//! Minimal in-process PSD writer.
//!
//! Produces a single flattened 8-bit RGB image with no layer records, which
//! every PSD reader accepts. Transparency is flattened onto white.

use anyhow::{Result, bail};
use image::{Rgb, RgbImage, RgbaImage};

/// Largest width or height a version-1 PSD may declare.
pub const MAX_DIMENSION: u32 = 30_000;

const SIGNATURE: &[u8; 4] = b"8BPS";
const VERSION: u16 = 1;
const DEPTH: u16 = 8;
const COLOR_MODE_RGB: u16 = 3;
const COMPRESSION_RAW: u16 = 0;

/// Composite `canvas` over an opaque white background.
pub fn flatten_on_white(canvas: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(canvas.width(), canvas.height(), |x, y| {
        let [r, g, b, a] = canvas.get_pixel(x, y).0;
        let alpha = u32::from(a);
        let over_white = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([over_white(r), over_white(g), over_white(b)])
    })
}

/// Encode `canvas` as a flattened PSD file.
pub fn encode_flattened(canvas: &RgbaImage) -> Result<Vec<u8>> {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        bail!("PSD cannot hold a {width}x{height} canvas (limit {MAX_DIMENSION}x{MAX_DIMENSION})");
    }

    let rgb = flatten_on_white(canvas);
    let plane = (width as usize) * (height as usize);
    let mut out = Vec::with_capacity(26 + 12 + 2 + plane * 3);

    // File header
    out.extend_from_slice(SIGNATURE);
    out.extend_from_slice(&VERSION.to_be_bytes());
    out.extend_from_slice(&[0; 6]);
    out.extend_from_slice(&3u16.to_be_bytes());
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&DEPTH.to_be_bytes());
    out.extend_from_slice(&COLOR_MODE_RGB.to_be_bytes());

    // Color mode data, image resources, layer and mask info: all empty
    for _ in 0..3 {
        out.extend_from_slice(&0u32.to_be_bytes());
    }

    // Image data, planar: every R sample, then G, then B
    out.extend_from_slice(&COMPRESSION_RAW.to_be_bytes());
    for channel in 0..3 {
        out.extend(rgb.pixels().map(|p| p.0[channel]));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn be_u16(bytes: &[u8], at: usize) -> u16 {
        u16::from_be_bytes([bytes[at], bytes[at + 1]])
    }

    fn be_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn test_header_layout() {
        let canvas = RgbaImage::new(5, 3);
        let psd = encode_flattened(&canvas).unwrap();

        assert_eq!(&psd[..4], b"8BPS");
        assert_eq!(be_u16(&psd, 4), 1);
        assert_eq!(&psd[6..12], &[0; 6]);
        assert_eq!(be_u16(&psd, 12), 3);
        assert_eq!(be_u32(&psd, 14), 3); // height
        assert_eq!(be_u32(&psd, 18), 5); // width
        assert_eq!(be_u16(&psd, 22), 8);
        assert_eq!(be_u16(&psd, 24), 3);
        assert_eq!(psd.len(), 26 + 12 + 2 + 5 * 3 * 3);
    }

    #[test]
    fn test_planar_channel_order() {
        let mut canvas = RgbaImage::new(2, 1);
        canvas.put_pixel(0, 0, Rgba([10, 20, 30, 255]));
        canvas.put_pixel(1, 0, Rgba([40, 50, 60, 255]));

        let psd = encode_flattened(&canvas).unwrap();
        let data = &psd[26 + 12..];
        assert_eq!(be_u16(data, 0), 0);
        assert_eq!(&data[2..], &[10, 40, 20, 50, 30, 60]);
    }

    #[test]
    fn test_transparency_flattens_to_white() {
        let mut canvas = RgbaImage::new(2, 1);
        canvas.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        canvas.put_pixel(1, 0, Rgba([0, 0, 0, 128]));

        let flat = flatten_on_white(&canvas);
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(flat.get_pixel(1, 0).0, [127, 127, 127]);
    }

    #[test]
    fn test_rejects_oversized_canvas() {
        let canvas = RgbaImage::new(MAX_DIMENSION + 1, 1);
        assert!(encode_flattened(&canvas).is_err());
    }
}

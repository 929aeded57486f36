//! Last-resort PNG output.

use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};
use std::path::{Path, PathBuf};

/// Same stem as `output`, `.png` extension.
pub fn raster_path(output: &Path) -> PathBuf {
    output.with_extension("png")
}

/// Whether `output` already asks for a PNG.
pub fn is_png(output: &Path) -> bool {
    output
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

/// Write `canvas` as PNG next to `output`, returning the written path.
pub fn write_png(canvas: &RgbaImage, output: &Path) -> Result<PathBuf> {
    let path = if is_png(output) {
        output.to_path_buf()
    } else {
        raster_path(output)
    };
    canvas
        .save_with_format(&path, ImageFormat::Png)
        .with_context(|| format!("Failed to write `{}`", path.display()))?;
    Ok(path)
}

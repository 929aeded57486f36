//! Composite assembler: paint a layer document onto a canvas and export it.
//!
//! Layers load in parallel but are painted strictly in document order
//! (first = bottom), so the result is the same on every run. One bad layer
//! never sinks the composite: unresolved or undecodable layers are skipped
//! and reported.

mod resolve;

pub use resolve::resolve_layer_file;

use anyhow::Result;
use image::{DynamicImage, Rgba, RgbaImage, imageops};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::document::{LayerDescriptor, LayerDocument};
use crate::export::{ExportChain, Exported, layered_command};
use crate::logger::ProgressLine;
use crate::{debug, log};

/// Fully transparent white, the canvas starting color.
const CLEAR: Rgba<u8> = Rgba([255, 255, 255, 0]);

// ============================================================================
// Opacity
// ============================================================================

/// Scale one alpha sample, truncating toward zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn scale_alpha(alpha: u8, opacity: f32) -> u8 {
    let opacity = if opacity.is_nan() { 1.0 } else { opacity.clamp(0.0, 1.0) };
    (f32::from(alpha) * opacity).clamp(0.0, 255.0) as u8
}

/// Multiply every alpha sample of `image` by `opacity`.
pub fn apply_opacity(image: &mut RgbaImage, opacity: f32) {
    for pixel in image.pixels_mut() {
        pixel.0[3] = scale_alpha(pixel.0[3], opacity);
    }
}

// ============================================================================
// Layer pixels
// ============================================================================

/// A decoded layer ready to paint.
#[derive(Debug, Clone)]
pub struct LayerPixels {
    pub pixels: RgbaImage,
    /// Source-over blend (true) or plain overwrite (false)
    pub blend: bool,
}

impl LayerPixels {
    /// Convert to RGBA, applying `opacity` when it is below 1.
    ///
    /// Sources without an alpha channel overwrite the canvas unless an
    /// opacity adjustment gave them one.
    pub fn prepare(image: DynamicImage, opacity: f32) -> Self {
        let has_alpha = image.color().has_alpha();
        let mut pixels = image.into_rgba8();
        if opacity < 1.0 {
            apply_opacity(&mut pixels, opacity);
            return Self {
                pixels,
                blend: true,
            };
        }
        Self {
            pixels,
            blend: has_alpha,
        }
    }
}

/// Paint `layer` at `(x, y)`; whatever falls outside the canvas is clipped.
pub fn paint(canvas: &mut RgbaImage, layer: &LayerPixels, x: i64, y: i64) {
    if layer.blend {
        imageops::overlay(canvas, &layer.pixels, x, y);
    } else {
        imageops::replace(canvas, &layer.pixels, x, y);
    }
}

// ============================================================================
// Render
// ============================================================================

/// Why a layer did not make it onto the canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No image file matches the layer name
    Unresolved,
    /// The file exists but could not be decoded
    Decode { path: PathBuf, message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved => write!(f, "layer file not found"),
            Self::Decode { path, message } => {
                write!(f, "cannot decode `{}`: {message}", path.display())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SkippedLayer {
    pub name: String,
    pub reason: SkipReason,
}

/// The painted canvas and per-layer bookkeeping.
#[derive(Debug)]
pub struct Composite {
    pub canvas: RgbaImage,
    pub painted: Vec<String>,
    pub skipped: Vec<SkippedLayer>,
}

fn load_layer(layers_dir: &Path, layer: &LayerDescriptor) -> Result<LayerPixels, SkipReason> {
    let path = resolve_layer_file(layers_dir, &layer.name).ok_or(SkipReason::Unresolved)?;
    let image = image::open(&path).map_err(|err| SkipReason::Decode {
        path: path.clone(),
        message: err.to_string(),
    })?;
    debug!("assemble"; "loaded {} from {}", layer.name, path.display());
    Ok(LayerPixels::prepare(image, layer.effective_opacity()))
}

/// Paint every resolvable layer of `document` onto a fresh canvas.
pub fn render(layers_dir: &Path, document: &LayerDocument) -> Composite {
    let frame = document.frame;
    let mut canvas = RgbaImage::from_pixel(frame.width, frame.height, CLEAR);

    let progress = ProgressLine::new("assemble", &[("layers", document.layers.len())]);
    let loaded: Vec<_> = document
        .layers
        .par_iter()
        .map(|layer| {
            let result = load_layer(layers_dir, layer);
            progress.inc("layers");
            result
        })
        .collect();
    progress.finish();

    let mut painted = Vec::new();
    let mut skipped = Vec::new();
    for (layer, result) in document.layers.iter().zip(loaded) {
        match result {
            Ok(pixels) => {
                paint(&mut canvas, &pixels, layer.x, layer.y);
                debug!(
                    "assemble";
                    "painted {} at ({}, {}) with opacity {}",
                    layer.name, layer.x, layer.y, layer.effective_opacity()
                );
                painted.push(layer.name.clone());
            }
            Err(reason) => {
                log!("warning"; "skipping layer `{}`: {}", layer.name, reason);
                skipped.push(SkippedLayer {
                    name: layer.name.clone(),
                    reason,
                });
            }
        }
    }

    Composite {
        canvas,
        painted,
        skipped,
    }
}

// ============================================================================
// Assemble
// ============================================================================

/// How the output file is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Let the external tool composite each layer (falls back to flattened)
    #[default]
    Layered,
    /// Composite in process, then run the export chain
    Flattened,
}

/// What an assemble run produced.
#[derive(Debug)]
pub struct AssembleReport {
    pub exported: Exported,
    /// Method that actually produced the file
    pub method: Method,
    /// Why the layered method was abandoned, if it was
    pub layered_fallback: Option<String>,
    pub painted: Vec<String>,
    pub skipped: Vec<SkippedLayer>,
}

/// Assemble `document` from `layers_dir` into `output`.
pub fn assemble(
    layers_dir: &Path,
    document: &LayerDocument,
    method: Method,
    chain: &ExportChain,
    output: &Path,
) -> Result<AssembleReport> {
    let mut layered_fallback = None;

    if method == Method::Layered {
        match try_layered(layers_dir, document, chain, output) {
            Ok(report) => return Ok(report),
            Err(reason) => {
                log!("assemble"; "layered export unavailable ({}), falling back to flattened composite", reason);
                layered_fallback = Some(reason);
            }
        }
    }

    log!(
        "assemble";
        "compositing {} layers onto {}x{} canvas",
        document.layers.len(), document.frame.width, document.frame.height
    );
    let composite = render(layers_dir, document);
    let exported = chain.export(&composite.canvas, output)?;

    Ok(AssembleReport {
        exported,
        method: Method::Flattened,
        layered_fallback,
        painted: composite.painted,
        skipped: composite.skipped,
    })
}

/// Run the external tool over the layer files directly.
///
/// Returns the reason as `Err` when the tool is missing or the command fails.
fn try_layered(
    layers_dir: &Path,
    document: &LayerDocument,
    chain: &ExportChain,
    output: &Path,
) -> Result<AssembleReport, String> {
    let probe = chain
        .tool_probe()
        .ok_or_else(|| "external tool disabled".to_string())?;
    let tool = probe.resolve().map_err(str::to_string)?;

    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|err| format!("cannot create `{}`: {err}", parent.display()))?;
    }

    let command = layered_command(layers_dir, document, output);
    for name in &command.skipped {
        log!("warning"; "skipping layer `{}`: {}", name, SkipReason::Unresolved);
    }
    log!(
        "assemble";
        "creating layered output with {} ({})",
        tool.program().display(), tool.version()
    );
    tool.run_layered(&command)
        .map_err(|err| format!("{err:#}"))?;

    let mut painted = command.included;
    painted.reverse();
    Ok(AssembleReport {
        exported: Exported {
            path: output.to_path_buf(),
            strategy: "imagemagick",
            degradation: None,
        },
        method: Method::Layered,
        layered_fallback: None,
        painted,
        skipped: command
            .skipped
            .into_iter()
            .map(|name| SkippedLayer {
                name,
                reason: SkipReason::Unresolved,
            })
            .collect(),
    })
}

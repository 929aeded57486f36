//! Layer catalog: build or update a layer document from a directory of images.
//!
//! # Flow
//!
//! ```text
//! discover (sorted) ─▶ probe (parallel) ─▶ infer frame ─▶ reconcile ─▶ LayerDocument
//!                                              ▲               ▲
//!                                   overrides / existing    existing layers
//! ```
//!
//! Probe failures degrade to zero-size placeholders; the scan never aborts
//! on a single bad file. Persisting the result is left to the caller.

mod probe;
mod reconcile;
mod scan;

pub use probe::{ImageInfo, probe};
pub use reconcile::{MissingLayerPolicy, ProbedLayer, reconcile};
pub use scan::{discover, layer_images, layer_stem, preferred};

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::document::{
    DEFAULT_HEIGHT, DEFAULT_WIDTH, DocumentError, Frame, LayerDocument, MAX_FRAME_DIMENSION,
};
use crate::log;

/// Fatal catalog failures.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("layers directory `{0}` does not exist or is not a directory")]
    MissingDirectory(PathBuf),

    #[error("cannot list layers directory `{0}`")]
    Scan(PathBuf, #[source] std::io::Error),

    #[error("cannot update from existing layers info")]
    Existing(#[from] DocumentError),
}

/// Knobs for one catalog run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogOptions {
    pub canvas_width: Option<u32>,
    pub canvas_height: Option<u32>,
    pub missing: MissingLayerPolicy,
}

/// A probe that failed and was replaced by a placeholder.
#[derive(Debug)]
pub struct ProbeFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of a catalog run: the document plus what happened to each layer.
#[derive(Debug)]
pub struct Catalog {
    pub document: LayerDocument,
    /// Whether an existing document was loaded and merged
    pub updated: bool,
    pub created: Vec<String>,
    pub merged: Vec<String>,
    pub pruned: Vec<String>,
    pub retained: Vec<String>,
    pub duplicates: Vec<String>,
    pub shadowed: Vec<PathBuf>,
    pub probe_failures: Vec<ProbeFailure>,
}

impl Catalog {
    /// No image files were found.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.merged.is_empty()
    }
}

/// Build a layer document for `layers_dir`, merging `existing` when it exists.
///
/// A missing `existing` file means "create fresh"; an unreadable or invalid
/// one is an error so operator edits are never silently overwritten.
pub fn build_or_update(
    layers_dir: &Path,
    existing: Option<&Path>,
    options: &CatalogOptions,
) -> Result<Catalog, CatalogError> {
    if !layers_dir.is_dir() {
        return Err(CatalogError::MissingDirectory(layers_dir.to_path_buf()));
    }

    let previous = match existing {
        Some(path) if path.exists() => Some(LayerDocument::load(path)?),
        _ => None,
    };

    let discovery =
        discover(layers_dir).map_err(|err| CatalogError::Scan(layers_dir.to_path_buf(), err))?;

    let results: Vec<_> = discovery
        .files
        .par_iter()
        .map(|file| (file, probe(&file.path)))
        .collect();

    let mut probe_failures = Vec::new();
    let probed: Vec<ProbedLayer> = results
        .into_iter()
        .map(|(file, result)| {
            let info = result.unwrap_or_else(|err| {
                log!("warning"; "could not read image info from {}: {:#}", file.path.display(), err);
                probe_failures.push(ProbeFailure {
                    path: file.path.clone(),
                    reason: format!("{err:#}"),
                });
                ImageInfo::placeholder()
            });
            ProbedLayer {
                name: file.name.clone(),
                info,
            }
        })
        .collect();

    let frame = resolve_frame(
        infer_frame(probed.iter().map(|p| &p.info)),
        previous.as_ref().map(|doc| doc.frame),
        options,
    );

    let updated = previous.is_some();
    let (existing_layers, mut document) = match previous {
        Some(mut doc) => (std::mem::take(&mut doc.layers), doc),
        None => (Vec::new(), LayerDocument::default()),
    };

    let outcome = reconcile(&existing_layers, &probed, options.missing);
    document.frame = frame;
    document.layers = outcome.layers;
    document.ensure_instructions();

    Ok(Catalog {
        document,
        updated,
        created: outcome.created,
        merged: outcome.merged,
        pruned: outcome.pruned,
        retained: outcome.retained,
        duplicates: outcome.duplicates,
        shadowed: discovery.shadowed,
        probe_failures,
    })
}

/// Component-wise maximum of probed sizes, floored at the default frame and
/// capped at [`MAX_FRAME_DIMENSION`].
pub fn infer_frame<'a>(infos: impl IntoIterator<Item = &'a ImageInfo>) -> Frame {
    let frame = infos.into_iter().fold(Frame::default(), |frame, info| {
        Frame::new(frame.width.max(info.width), frame.height.max(info.height))
    });
    Frame::new(
        frame.width.min(MAX_FRAME_DIMENSION),
        frame.height.min(MAX_FRAME_DIMENSION),
    )
}

/// Per dimension: explicit override, then existing frame, then inference.
pub fn resolve_frame(inferred: Frame, existing: Option<Frame>, options: &CatalogOptions) -> Frame {
    let base = existing.unwrap_or(inferred);
    Frame::new(
        options.canvas_width.filter(|w| *w > 0).unwrap_or(base.width),
        options.canvas_height.filter(|h| *h > 0).unwrap_or(base.height),
    )
}

/// Whether `frame` is still the built-in default.
pub fn is_default_frame(frame: Frame) -> bool {
    frame.width == DEFAULT_WIDTH && frame.height == DEFAULT_HEIGHT
}

//! Merge freshly probed layer files into an existing descriptor list.
//!
//! Matching is by exact name. A matched descriptor is copied forward with
//! every operator-editable field intact; only its `_image_*` metadata is
//! refreshed. Unmatched files get a new descriptor placed by the stacking
//! heuristic.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use super::probe::ImageInfo;
use crate::document::LayerDescriptor;

/// Minimum vertical gap between auto-placed layers.
const MIN_STACK_STEP: i64 = 50;

/// What to do with descriptors whose image file is gone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MissingLayerPolicy {
    /// Remove them from the document
    #[default]
    Drop,
    /// Keep them, after the layers that still have files
    Keep,
}

/// A discovered file together with its probe result.
#[derive(Debug, Clone)]
pub struct ProbedLayer {
    pub name: String,
    pub info: ImageInfo,
}

/// Outcome of reconciling one catalog run.
#[derive(Debug, Default)]
pub struct Reconciled {
    pub layers: Vec<LayerDescriptor>,
    /// Newly synthesized descriptors
    pub created: Vec<String>,
    /// Existing descriptors carried forward
    pub merged: Vec<String>,
    /// Descriptors dropped because their file is gone
    pub pruned: Vec<String>,
    /// Descriptors kept although their file is gone
    pub retained: Vec<String>,
    /// Repeated names in the existing document (only the first is used)
    pub duplicates: Vec<String>,
}

/// Vertical advance after placing a new layer of the given height.
pub fn stack_step(height: u32) -> i64 {
    MIN_STACK_STEP.max(i64::from(height / 4))
}

/// Reconcile `existing` descriptors with `discovered` files.
///
/// Output order: existing descriptors that still have a file, in document
/// order; then new files in their (sorted) discovery order; then, under
/// `Keep`, descriptors whose file is gone, in document order.
pub fn reconcile(
    existing: &[LayerDescriptor],
    discovered: &[ProbedLayer],
    policy: MissingLayerPolicy,
) -> Reconciled {
    let mut out = Reconciled::default();

    let by_name: FxHashMap<&str, usize> = discovered
        .iter()
        .enumerate()
        .map(|(i, probed)| (probed.name.as_str(), i))
        .collect();
    let mut claimed = vec![false; discovered.len()];
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    let mut orphans = Vec::new();

    for layer in existing {
        if !seen.insert(layer.name.as_str()) {
            out.duplicates.push(layer.name.clone());
            continue;
        }
        match by_name.get(layer.name.as_str()) {
            Some(&i) => {
                claimed[i] = true;
                let mut layer = layer.clone();
                refresh_derived(&mut layer, &discovered[i].info);
                out.merged.push(layer.name.clone());
                out.layers.push(layer);
            }
            None => orphans.push(layer),
        }
    }

    let mut offset = 0i64;
    for (probed, _) in discovered.iter().zip(&claimed).filter(|(_, claimed)| !**claimed) {
        let mut layer = LayerDescriptor::new(&probed.name, 0, offset, 1.0);
        offset += stack_step(probed.info.height);
        refresh_derived(&mut layer, &probed.info);
        out.created.push(probed.name.clone());
        out.layers.push(layer);
    }

    for layer in orphans {
        match policy {
            MissingLayerPolicy::Drop => out.pruned.push(layer.name.clone()),
            MissingLayerPolicy::Keep => {
                out.retained.push(layer.name.clone());
                out.layers.push(layer.clone());
            }
        }
    }

    out
}

fn refresh_derived(layer: &mut LayerDescriptor, info: &ImageInfo) {
    layer.image_width = Some(info.width);
    layer.image_height = Some(info.height);
    layer.image_mode = Some(info.mode.clone());
}

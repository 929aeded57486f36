//! Layer file discovery.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Raster extensions recognised as layer images, in lookup priority order.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// An image file found in the layers directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerFile {
    /// File stem, used as the layer name
    pub name: String,
    pub path: PathBuf,
}

/// Result of scanning a layers directory.
#[derive(Debug, Default)]
pub struct Discovery {
    /// One file per distinct stem, sorted by stem
    pub files: Vec<LayerFile>,
    /// Files skipped because a preferred file already claimed their stem
    pub shadowed: Vec<PathBuf>,
}

/// Position of `path`'s extension in [`IMAGE_EXTENSIONS`] (case-insensitive).
pub fn extension_rank(path: &Path) -> Option<usize> {
    let ext = path.extension()?.to_str()?;
    IMAGE_EXTENSIONS
        .iter()
        .position(|known| ext.eq_ignore_ascii_case(known))
}

/// Whether `path` has one of the supported image extensions (case-insensitive).
pub fn is_layer_image(path: &Path) -> bool {
    extension_rank(path).is_some()
}

/// UTF-8 file stem, the name a layer file is known by.
pub fn layer_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

/// Supported image files directly inside `dir`, in no particular order.
///
/// Non-UTF-8 names are left out: they cannot be referenced from the JSON
/// document.
pub fn layer_images(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_layer_image(&path) && layer_stem(&path).is_some() {
            images.push(path);
        }
    }
    Ok(images)
}

/// The file a layer name maps to when several share it: lowest extension
/// rank first, then file name. Shared by the catalog and the assembler.
pub fn preferred<'a>(candidates: impl IntoIterator<Item = &'a PathBuf>) -> Option<&'a PathBuf> {
    candidates
        .into_iter()
        .min_by_key(|&path| (extension_rank(path).unwrap_or(usize::MAX), path.file_name()))
}

/// List image files directly inside `dir`, one per stem, sorted by stem.
pub fn discover(dir: &Path) -> io::Result<Discovery> {
    let mut by_stem: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for path in layer_images(dir)? {
        if let Some(stem) = layer_stem(&path) {
            by_stem.entry(stem.to_string()).or_default().push(path);
        }
    }

    let mut discovery = Discovery::default();
    for (name, mut paths) in by_stem {
        let Some(winner) = preferred(&paths).cloned() else {
            continue;
        };
        paths.retain(|path| *path != winner);
        paths.sort();
        discovery.shadowed.extend(paths);
        discovery.files.push(LayerFile { name, path: winner });
    }
    Ok(discovery)
}

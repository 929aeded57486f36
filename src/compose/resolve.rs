//! Map a layer name to its image file.

use std::path::{Path, PathBuf};

use crate::catalog::{layer_images, layer_stem, preferred};

/// Find the image file for `name` inside `dir`.
///
/// Lookup order: exact stem, lowercased stem, then any stem that matches
/// case-insensitively. When several files match at one step the catalog's
/// preference applies (extension priority, then file name), so a layer
/// resolves to the same file it was cataloged from.
pub fn resolve_layer_file(dir: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.contains(['/', '\\']) {
        return None;
    }

    let images = layer_images(dir).ok()?;
    let pick = |matches: &dyn Fn(&str) -> bool| {
        preferred(images.iter().filter(|path| layer_stem(path).is_some_and(matches))).cloned()
    };

    let lower = name.to_lowercase();
    pick(&|stem: &str| stem == name)
        .or_else(|| pick(&|stem: &str| stem == lower))
        .or_else(|| pick(&|stem: &str| stem.to_lowercase() == lower))
}

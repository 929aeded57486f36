//! `catalog` command: write the layer document for a layer directory.

use anyhow::{Context, Result};

use crate::catalog::{Catalog, build_or_update, is_default_frame};
use crate::config::CatalogSettings;
use crate::log;
use crate::logger;
use crate::utils::plural_count;

/// Layers shown in the preview before it is cut short.
const PREVIEW_LIMIT: usize = 10;

/// Scan, reconcile and save. Writes nothing when no images were found.
pub fn run_catalog(settings: &CatalogSettings) -> Result<()> {
    let existing = settings.update.then_some(settings.document.as_path());
    if settings.update && !settings.document.exists() {
        log!("catalog"; "{} does not exist yet, creating it", settings.document.display());
    }

    let catalog = build_or_update(&settings.layers_dir, existing, &settings.options)
        .with_context(|| format!("cannot catalog `{}`", settings.layers_dir.display()))?;

    report_warnings(&catalog);

    if catalog.is_empty() {
        log!(
            "warning";
            "no images found in {} (looked for png, jpg, jpeg, webp), nothing written",
            settings.layers_dir.display()
        );
        return Ok(());
    }

    catalog.document.save(&settings.document)?;

    let verb = if catalog.updated { "updated" } else { "created" };
    logger::success(&format!(
        "{} {} with {}",
        verb,
        settings.document.display(),
        plural_count(catalog.document.layers.len(), "layer")
    ));
    if catalog.updated {
        log!(
            "catalog";
            "{} new, {} kept, {} removed",
            catalog.created.len(),
            catalog.merged.len(),
            catalog.pruned.len()
        );
    }

    print_preview(&catalog);
    print_next_steps(settings);
    Ok(())
}

fn report_warnings(catalog: &Catalog) {
    for path in &catalog.shadowed {
        log!("warning"; "ignoring {}: another file has the same layer name", path.display());
    }
    for name in &catalog.duplicates {
        log!("warning"; "layer `{}` appears more than once in the document, keeping the first", name);
    }
    for name in &catalog.pruned {
        log!("catalog"; "removed `{}`: its image is gone", name);
    }
    for name in &catalog.retained {
        log!("warning"; "kept `{}` although its image is gone (--missing keep)", name);
    }
}

fn print_preview(catalog: &Catalog) {
    let frame = catalog.document.frame;
    if is_default_frame(frame) {
        log!("catalog"; "canvas {}x{} (default, set --canvas-width/--canvas-height to change)", frame.width, frame.height);
    } else {
        log!("catalog"; "canvas {}x{}", frame.width, frame.height);
    }
    for layer in catalog.document.layers.iter().take(PREVIEW_LIMIT) {
        println!(
            "  {}: position({}, {}), opacity({})",
            layer.name, layer.x, layer.y, layer.opacity
        );
    }
    let rest = catalog.document.layers.len().saturating_sub(PREVIEW_LIMIT);
    if rest > 0 {
        println!("  ... and {}", plural_count(rest, "more layer"));
    }
}

fn print_next_steps(settings: &CatalogSettings) {
    log!("catalog"; "next steps:");
    println!("  1. edit x, y and opacity in {}", settings.document.display());
    println!(
        "  2. run `figmapsd assemble --layers-dir {} --layers-info {}`",
        settings.layers_dir.display(),
        settings.document.display()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogOptions;
    use crate::document::LayerDocument;
    use image::{Rgba, RgbaImage};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn settings(root: &Path, update: bool) -> CatalogSettings {
        CatalogSettings {
            layers_dir: root.join("layers"),
            document: root.join("layers_info.json"),
            update,
            options: CatalogOptions::default(),
        }
    }

    #[test]
    fn test_empty_directory_writes_nothing() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("layers")).unwrap();
        let settings = settings(dir.path(), false);

        run_catalog(&settings).unwrap();
        assert!(!settings.document.exists());
    }

    #[test]
    fn test_missing_directory_is_error() {
        let dir = TempDir::new().unwrap();
        let err = run_catalog(&settings(dir.path(), false)).unwrap_err();
        assert!(format!("{err:#}").contains("layers"));
    }

    #[test]
    fn test_fresh_run_ignores_existing_document() {
        let dir = TempDir::new().unwrap();
        let layers = dir.path().join("layers");
        fs::create_dir(&layers).unwrap();
        RgbaImage::from_pixel(10, 10, Rgba([1, 2, 3, 255]))
            .save(layers.join("hero.png"))
            .unwrap();
        let settings = settings(dir.path(), false);
        fs::write(&settings.document, "not json").unwrap();

        run_catalog(&settings).unwrap();
        let doc = LayerDocument::load(&settings.document).unwrap();
        assert_eq!(doc.layers.len(), 1);
        assert_eq!(doc.layers[0].name, "hero");
    }

    #[test]
    fn test_update_keeps_edits() {
        let dir = TempDir::new().unwrap();
        let layers = dir.path().join("layers");
        fs::create_dir(&layers).unwrap();
        RgbaImage::new(10, 10).save(layers.join("hero.png")).unwrap();

        run_catalog(&settings(dir.path(), false)).unwrap();
        let path = dir.path().join("layers_info.json");
        let mut doc = LayerDocument::load(&path).unwrap();
        doc.layers[0].x = 42;
        doc.save(&path).unwrap();

        run_catalog(&settings(dir.path(), true)).unwrap();
        assert_eq!(LayerDocument::load(&path).unwrap().layers[0].x, 42);
    }
}

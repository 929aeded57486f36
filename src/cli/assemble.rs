//! `assemble` command: composite the layer document into the output file.

use anyhow::{Context, Result, bail};

use crate::compose::{AssembleReport, Method, SkipReason, assemble};
use crate::config::AssembleSettings;
use crate::document::LayerDocument;
use crate::export::{Degradation, ExportChain};
use crate::log;
use crate::logger;
use crate::utils::plural_count;

/// Check preconditions, assemble, and narrate the outcome.
///
/// Degraded exports and skipped layers are reported, not failures.
pub fn run_assemble(settings: &AssembleSettings) -> Result<AssembleReport> {
    if !settings.layers_dir.is_dir() {
        bail!(
            "layer directory `{}` not found (run `figmapsd catalog` against your Figma export first)",
            settings.layers_dir.display()
        );
    }
    let document = LayerDocument::load(&settings.document)
        .context("cannot read the layer document (create one with `figmapsd catalog`)")?;
    if document.layers.is_empty() {
        log!("warning"; "{} lists no layers, output will be a blank canvas", settings.document.display());
    }

    let chain = ExportChain::from_settings(&settings.chain);
    log!("export"; "strategies: {}", chain.strategy_names().join(" -> "));

    let report = assemble(
        &settings.layers_dir,
        &document,
        settings.method,
        &chain,
        &settings.output,
    )?;

    let summary = format!(
        "{} ({}, {} via {})",
        report.exported.path.display(),
        plural_count(report.painted.len(), "layer"),
        match report.method {
            Method::Layered => "layered",
            Method::Flattened => "flattened",
        },
        report.exported.strategy,
    );
    let hints = hints(settings, &report);
    if hints.is_empty() {
        logger::success(&format!("created {summary}"));
    } else {
        logger::degraded(&format!("created {summary} with caveats"), &hints);
    }

    Ok(report)
}

/// Remediation lines for everything that fell short of the request.
fn hints(settings: &AssembleSettings, report: &AssembleReport) -> Vec<String> {
    let mut hints = Vec::new();

    if let Some(reason) = &report.layered_fallback {
        hints.push(format!("layers were merged into one image: {reason}"));
    }
    match &report.exported.degradation {
        Some(Degradation::SingleLayer) => {
            hints.push("the PSD holds one flattened layer".to_string());
        }
        Some(note @ Degradation::RasterFallback { .. }) => hints.push(note.to_string()),
        None => {}
    }
    let wanted_tool = report.layered_fallback.is_some() || report.exported.degradation.is_some();
    if wanted_tool && settings.chain.external_tool {
        hints.extend(install_imagemagick_hints());
    }

    let unresolved: Vec<&str> = report
        .skipped
        .iter()
        .filter(|s| s.reason == SkipReason::Unresolved)
        .map(|s| s.name.as_str())
        .collect();
    if !unresolved.is_empty() {
        hints.push(format!(
            "no image found for {}: {}",
            plural_count(unresolved.len(), "layer"),
            unresolved.join(", ")
        ));
        hints.push(format!(
            "rename the files in {} to match the layer names, or run `figmapsd catalog --update`",
            settings.layers_dir.display()
        ));
    }
    for skipped in &report.skipped {
        if let SkipReason::Decode { .. } = skipped.reason {
            hints.push(format!("`{}` skipped: {}", skipped.name, skipped.reason));
        }
    }

    hints
}

fn install_imagemagick_hints() -> [String; 3] {
    [
        "install ImageMagick for layered PSD output:".to_string(),
        "  macOS: brew install imagemagick | Ubuntu: sudo apt install imagemagick".to_string(),
        "  Windows: https://imagemagick.org/script/download.php".to_string(),
    ]
}

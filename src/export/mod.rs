//! Export strategy chain.
//!
//! Strategies run in order until one produces a file:
//!
//! | Strategy       | Produces                         | Unavailable when                 |
//! |----------------|----------------------------------|----------------------------------|
//! | `ExternalTool` | requested container via ImageMagick | no ImageMagick on `PATH`      |
//! | `BuiltinPsd`   | single flattened-layer PSD       | built without `builtin-psd`      |
//! | `Raster`       | PNG next to the requested output | never                            |
//!
//! A strategy that is unavailable or fails is logged before the next one is
//! tried. Only a failure of the final strategy is an error.

pub mod magick;
#[cfg(feature = "builtin-psd")]
pub mod psd;
pub mod raster;

pub use magick::{ToolProbe, layered_command};

use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::log;

// ============================================================================
// Results
// ============================================================================

/// Why a successful export is not exactly what was asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    /// The container was produced, but with one flattened layer
    SingleLayer,
    /// The requested container could not be produced; a PNG was written instead
    RasterFallback { requested: PathBuf },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleLayer => write!(f, "written as a single flattened layer"),
            Self::RasterFallback { requested } => {
                write!(f, "could not create `{}`, saved as PNG instead", requested.display())
            }
        }
    }
}

/// A file the chain produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exported {
    pub path: PathBuf,
    pub strategy: &'static str,
    pub degradation: Option<Degradation>,
}

/// Tri-state result of one strategy.
#[derive(Debug)]
pub enum Attempt {
    Done(Exported),
    Unavailable(String),
    Failed(anyhow::Error),
}

// ============================================================================
// Strategies
// ============================================================================

/// One capability-checked way of persisting the canvas.
#[derive(Debug)]
pub enum ExportStrategy {
    ExternalTool(ToolProbe),
    BuiltinPsd,
    Raster,
}

impl ExportStrategy {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ExternalTool(_) => "imagemagick",
            Self::BuiltinPsd => "builtin-psd",
            Self::Raster => "raster",
        }
    }

    /// Try to write `canvas` to `output`.
    pub fn attempt(&self, canvas: &RgbaImage, output: &Path) -> Attempt {
        match self {
            Self::ExternalTool(probe) => {
                let tool = match probe.resolve() {
                    Ok(tool) => tool,
                    Err(reason) => return Attempt::Unavailable(reason.to_string()),
                };
                match tool.convert_canvas(canvas, output) {
                    Ok(()) => Attempt::Done(Exported {
                        path: output.to_path_buf(),
                        strategy: self.name(),
                        degradation: None,
                    }),
                    Err(err) => Attempt::Failed(err),
                }
            }
            Self::BuiltinPsd => self.attempt_builtin_psd(canvas, output),
            Self::Raster => match raster::write_png(canvas, output) {
                Ok(path) => {
                    let degradation = (path != output).then(|| Degradation::RasterFallback {
                        requested: output.to_path_buf(),
                    });
                    Attempt::Done(Exported {
                        path,
                        strategy: self.name(),
                        degradation,
                    })
                }
                Err(err) => Attempt::Failed(err),
            },
        }
    }

    #[cfg(feature = "builtin-psd")]
    fn attempt_builtin_psd(&self, canvas: &RgbaImage, output: &Path) -> Attempt {
        if !has_extension(output, "psd") {
            return Attempt::Unavailable(format!(
                "only writes .psd files, not `{}`",
                output.display()
            ));
        }
        let written = psd::encode_flattened(canvas).and_then(|bytes| {
            fs::write(output, bytes)
                .with_context(|| format!("Failed to write `{}`", output.display()))
        });
        match written {
            Ok(()) => Attempt::Done(Exported {
                path: output.to_path_buf(),
                strategy: self.name(),
                degradation: Some(Degradation::SingleLayer),
            }),
            Err(err) => Attempt::Failed(err),
        }
    }

    #[cfg(not(feature = "builtin-psd"))]
    fn attempt_builtin_psd(&self, _canvas: &RgbaImage, _output: &Path) -> Attempt {
        Attempt::Unavailable("built without the `builtin-psd` feature".to_string())
    }
}

#[cfg(feature = "builtin-psd")]
fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

// ============================================================================
// Chain
// ============================================================================

/// Which strategies a chain should contain.
#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub external_tool: bool,
    pub builtin_psd: bool,
    /// Candidate ImageMagick program names, tried in order
    pub tools: Vec<String>,
    pub timeout: Duration,
}

/// Ordered fallback sequence of export strategies.
#[derive(Debug)]
pub struct ExportChain {
    strategies: Vec<ExportStrategy>,
}

impl ExportChain {
    pub fn new(strategies: Vec<ExportStrategy>) -> Self {
        Self { strategies }
    }

    /// External tool (if enabled), builtin PSD (if enabled), then raster.
    pub fn from_settings(settings: &ChainSettings) -> Self {
        let mut strategies = Vec::with_capacity(3);
        if settings.external_tool {
            strategies.push(ExportStrategy::ExternalTool(ToolProbe::new(
                settings.tools.clone(),
                settings.timeout,
            )));
        }
        if settings.builtin_psd {
            strategies.push(ExportStrategy::BuiltinPsd);
        }
        strategies.push(ExportStrategy::Raster);
        Self::new(strategies)
    }

    /// The external tool probe, when the chain has one.
    pub fn tool_probe(&self) -> Option<&ToolProbe> {
        self.strategies.iter().find_map(|s| match s {
            ExportStrategy::ExternalTool(probe) => Some(probe),
            _ => None,
        })
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(ExportStrategy::name).collect()
    }

    /// Run the strategies in order until one writes a file.
    pub fn export(&self, canvas: &RgbaImage, output: &Path) -> Result<Exported> {
        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create `{}`", parent.display()))?;
        }

        let mut last_failure = None;
        for strategy in &self.strategies {
            match strategy.attempt(canvas, output) {
                Attempt::Done(exported) => return Ok(exported),
                Attempt::Unavailable(reason) => {
                    log!("export"; "{} unavailable: {}", strategy.name(), reason);
                }
                Attempt::Failed(err) => {
                    log!("warning"; "{} failed: {:#}", strategy.name(), err);
                    last_failure = Some(err);
                }
            }
        }

        Err(match last_failure {
            Some(err) => err.context("every export strategy failed"),
            None => anyhow!("no export strategy available"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::TempDir;

    fn canvas() -> RgbaImage {
        RgbaImage::from_pixel(4, 3, Rgba([200, 10, 10, 255]))
    }

    fn missing_tool() -> ExportStrategy {
        ExportStrategy::ExternalTool(ToolProbe::new(
            vec!["figmapsd-missing-magick".to_string()],
            Duration::from_secs(1),
        ))
    }

    #[test]
    fn test_tool_and_library_absent_falls_back_to_png() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("design.psd");
        let chain = ExportChain::new(vec![missing_tool(), ExportStrategy::Raster]);

        let exported = chain.export(&canvas(), &output).unwrap();
        assert_eq!(exported.strategy, "raster");
        assert_eq!(exported.path, dir.path().join("design.png"));
        assert_eq!(
            exported.degradation,
            Some(Degradation::RasterFallback { requested: output.clone() })
        );
        assert!(!output.exists());

        let written = image::open(&exported.path).unwrap().to_rgba8();
        assert_eq!(written, canvas());
    }

    #[cfg(feature = "builtin-psd")]
    #[test]
    fn test_builtin_psd_used_when_tool_absent() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("design.psd");
        let chain = ExportChain::new(vec![
            missing_tool(),
            ExportStrategy::BuiltinPsd,
            ExportStrategy::Raster,
        ]);

        let exported = chain.export(&canvas(), &output).unwrap();
        assert_eq!(exported.strategy, "builtin-psd");
        assert_eq!(exported.degradation, Some(Degradation::SingleLayer));
        let bytes = fs::read(&output).unwrap();
        assert_eq!(&bytes[..4], b"8BPS");
    }

    #[cfg(feature = "builtin-psd")]
    #[test]
    fn test_builtin_psd_skips_other_containers() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("design.tiff");
        let attempt = ExportStrategy::BuiltinPsd.attempt(&canvas(), &output);
        assert!(matches!(attempt, Attempt::Unavailable(_)));
    }

    #[test]
    fn test_png_request_is_not_degraded() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("nested/out.png");
        let chain = ExportChain::new(vec![ExportStrategy::Raster]);

        let exported = chain.export(&canvas(), &output).unwrap();
        assert_eq!(exported.path, output);
        assert!(exported.degradation.is_none());
    }

    #[test]
    fn test_empty_chain_is_an_error() {
        let dir = TempDir::new().unwrap();
        let chain = ExportChain::new(Vec::new());
        let err = chain.export(&canvas(), &dir.path().join("x.psd")).unwrap_err();
        assert!(err.to_string().contains("no export strategy"));
    }

    #[test]
    fn test_from_settings_order() {
        let settings = ChainSettings {
            external_tool: true,
            builtin_psd: true,
            tools: vec!["magick".into()],
            timeout: Duration::from_secs(5),
        };
        let chain = ExportChain::from_settings(&settings);
        assert_eq!(chain.strategy_names(), ["imagemagick", "builtin-psd", "raster"]);
        assert!(chain.tool_probe().is_some());

        let bare = ExportChain::from_settings(&ChainSettings {
            external_tool: false,
            builtin_psd: false,
            ..settings
        });
        assert_eq!(bare.strategy_names(), ["raster"]);
        assert!(bare.tool_probe().is_none());
    }

    #[test]
    fn test_degradation_display() {
        let note = Degradation::RasterFallback {
            requested: PathBuf::from("out.psd"),
        };
        assert!(note.to_string().contains("out.psd"));
        assert!(Degradation::SingleLayer.to_string().contains("single"));
    }
}

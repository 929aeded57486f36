//! ImageMagick backend: availability probe, canvas conversion and the
//! layered composite command.

use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};
use std::ffi::OsString;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use crate::compose::resolve_layer_file;
use crate::document::LayerDocument;
use crate::utils::exec::{Cmd, FilterRule, SILENT_FILTER};

/// Upper bound for the `-version` probe regardless of the conversion timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Known-harmless ImageMagick chatter.
const MAGICK_FILTER: FilterRule = FilterRule::new(&["WARNING: The convert command is deprecated"]);

/// A located, working ImageMagick binary.
#[derive(Debug, Clone)]
pub struct MagickTool {
    program: PathBuf,
    version: String,
    timeout: Duration,
}

impl MagickTool {
    /// First `-version` line, e.g. `Version: ImageMagick 7.1.1-29 Q16-HDRI ...`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Encode `canvas` as PNG, pipe it to the tool, and let it write `output`
    /// in whatever container the extension names.
    pub fn convert_canvas(&self, canvas: &RgbaImage, output: &Path) -> Result<()> {
        let mut png = Vec::new();
        canvas
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("Failed to encode canvas as PNG")?;

        Cmd::new(&self.program)
            .arg("png:-")
            .arg(output)
            .stdin(png)
            .timeout(self.timeout)
            .filter(&MAGICK_FILTER)
            .run()
            .context("ImageMagick conversion failed")?;
        Ok(())
    }

    /// Run a layered composite built by [`layered_command`].
    pub fn run_layered(&self, command: &LayeredCommand) -> Result<()> {
        Cmd::new(&self.program)
            .args(&command.args)
            .timeout(self.timeout)
            .filter(&MAGICK_FILTER)
            .run()
            .context("ImageMagick layered composite failed")?;
        Ok(())
    }
}

// ============================================================================
// Detection
// ============================================================================

/// Lazily locates ImageMagick among candidate program names.
///
/// The probe runs at most once per process; absence is remembered so a
/// later strategy never pays for a guaranteed-failure spawn.
#[derive(Debug)]
pub struct ToolProbe {
    candidates: Vec<String>,
    timeout: Duration,
    resolved: OnceLock<Result<MagickTool, String>>,
}

impl ToolProbe {
    pub fn new(candidates: Vec<String>, timeout: Duration) -> Self {
        Self {
            candidates,
            timeout,
            resolved: OnceLock::new(),
        }
    }

    /// The working tool, or a reason it is unavailable.
    pub fn resolve(&self) -> Result<&MagickTool, &str> {
        self.resolved
            .get_or_init(|| detect(&self.candidates, self.timeout))
            .as_ref()
            .map_err(String::as_str)
    }
}

/// Try each candidate: it must be on `PATH` and identify as ImageMagick.
fn detect(candidates: &[String], timeout: Duration) -> Result<MagickTool, String> {
    let mut notes = Vec::new();

    for name in candidates {
        let Ok(program) = which::which(name) else {
            notes.push(format!("`{name}` not found on PATH"));
            continue;
        };

        let probe = Cmd::new(&program)
            .arg("-version")
            .timeout(PROBE_TIMEOUT.min(timeout))
            .filter(&SILENT_FILTER)
            .run();
        match probe {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if !stdout.contains("ImageMagick") {
                    notes.push(format!("`{name}` is not ImageMagick"));
                    continue;
                }
                let version = stdout.lines().next().unwrap_or_default().trim().to_string();
                return Ok(MagickTool {
                    program,
                    version,
                    timeout,
                });
            }
            Err(err) => notes.push(format!("`{name} -version` failed: {err:#}")),
        }
    }

    if notes.is_empty() {
        Err("no candidate programs configured".to_string())
    } else {
        Err(notes.join("; "))
    }
}

// ============================================================================
// Layered command
// ============================================================================

/// Arguments for a layered composite plus the layers it had to leave out.
#[derive(Debug, Default)]
pub struct LayeredCommand {
    pub args: Vec<OsString>,
    /// Layer names in the order they are passed to the tool
    pub included: Vec<String>,
    pub skipped: Vec<String>,
}

/// Build the composite arguments for `document`.
///
/// The tool composites its arguments onto the first image, so layers are
/// passed in reverse document order onto a white `frame`-sized base.
pub fn layered_command(layers_dir: &Path, document: &LayerDocument, output: &Path) -> LayeredCommand {
    let mut command = LayeredCommand::default();
    let frame = document.frame;

    command.args.push("-size".into());
    command
        .args
        .push(format!("{}x{}", frame.width, frame.height).into());
    command.args.push("xc:white".into());

    for layer in document.layers.iter().rev() {
        let Some(file) = resolve_layer_file(layers_dir, &layer.name) else {
            command.skipped.push(layer.name.clone());
            continue;
        };

        command.args.push("(".into());
        command.args.push(file.into_os_string());
        let opacity = layer.effective_opacity();
        if opacity < 1.0 {
            for arg in ["-alpha", "set", "-channel", "A", "-evaluate", "multiply"] {
                command.args.push(arg.into());
            }
            command.args.push(opacity.to_string().into());
            command.args.push("+channel".into());
        }
        command.args.push(")".into());
        command.args.push("-geometry".into());
        command.args.push(format!("{:+}{:+}", layer.x, layer.y).into());
        command.args.push("-composite".into());
        command.included.push(layer.name.clone());
    }

    command.args.push(output.as_os_str().to_owned());
    command
}

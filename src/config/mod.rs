//! Tool configuration management.
//!
//! Handles loading `figmapsd.toml` and merging it with command-line flags.
//!
//! | Section     | Purpose                                         |
//! |-------------|-------------------------------------------------|
//! | `[paths]`   | Layer directory, layer document, export target  |
//! | `[catalog]` | Frame overrides and missing-layer policy        |
//! | `[export]`  | Method, ImageMagick candidates, strategy toggles |
//!
//! Precedence is CLI flag, then config file, then built-in default.
//! Relative paths in the config file are resolved against its directory;
//! relative paths on the command line stay relative to the working directory.

mod error;

pub use error::ConfigError;

use crate::catalog::{CatalogOptions, MissingLayerPolicy};
use crate::cli::{AssembleArgs, CatalogArgs, Cli};
use crate::compose::Method;
use crate::document::MAX_FRAME_DIMENSION;
use crate::export::ChainSettings;
use crate::log;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Config file looked up in the working directory when `-C` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "figmapsd.toml";

// ============================================================================
// Sections
// ============================================================================

/// `[paths]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub layers_dir: PathBuf,
    pub document: PathBuf,
    pub output: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            layers_dir: PathBuf::from("exported-layers"),
            document: PathBuf::from("layers_info.json"),
            output: PathBuf::from("output.psd"),
        }
    }
}

/// `[catalog]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub canvas_width: Option<u32>,
    pub canvas_height: Option<u32>,
    pub missing: MissingLayerPolicy,
}

/// `[export]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub method: Method,
    /// ImageMagick program names, tried in order
    pub tools: Vec<String>,
    pub timeout_secs: u64,
    pub external_tool: bool,
    pub builtin_psd: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            method: Method::default(),
            tools: vec!["magick".to_string(), "convert".to_string()],
            timeout_secs: 120,
            external_tool: true,
            builtin_psd: true,
        }
    }
}

// ============================================================================
// Root config
// ============================================================================

/// Parsed `figmapsd.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Directory relative config paths are resolved against
    #[serde(skip)]
    pub root: PathBuf,

    /// Config file this was loaded from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,

    pub paths: PathsConfig,
    pub catalog: CatalogConfig,
    pub export: ExportConfig,
}

/// Everything the `catalog` command needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSettings {
    pub layers_dir: PathBuf,
    pub document: PathBuf,
    pub update: bool,
    pub options: CatalogOptions,
}

/// Everything the `assemble` command needs.
#[derive(Debug, Clone)]
pub struct AssembleSettings {
    pub layers_dir: PathBuf,
    pub document: PathBuf,
    pub output: PathBuf,
    pub method: Method,
    pub chain: ChainSettings,
}

impl ToolConfig {
    /// Load the config named on the command line, or the default file if present.
    ///
    /// An explicitly named file must exist; the default one is optional.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let (path, explicit) = match &cli.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let mut config = if path.is_file() {
            let mut config = Self::from_path(&path)?;
            config.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
            config.source = Some(path);
            config
        } else if explicit {
            return Err(ConfigError::NotFound(path));
        } else {
            Self::default()
        };

        config.normalize_paths();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)
            .map_err(|err| ConfigError::Toml(path.to_path_buf(), err))?;

        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), toml::de::Error> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        log!("warning"; "unknown fields in {}, ignoring:", path.display());
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    /// Resolve relative `[paths]` entries against the config root.
    fn normalize_paths(&mut self) {
        if self.root.as_os_str().is_empty() {
            return;
        }
        let root = self.root.clone();
        for path in [
            &mut self.paths.layers_dir,
            &mut self.paths.document,
            &mut self.paths.output,
        ] {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.export.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "[export] timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.export.external_tool && self.export.tools.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "[export] tools must name at least one program when external_tool is enabled"
                    .to_string(),
            ));
        }
        for (key, value) in [
            ("canvas_width", self.catalog.canvas_width),
            ("canvas_height", self.catalog.canvas_height),
        ] {
            if value.is_some_and(|v| !canvas_in_range(v)) {
                return Err(ConfigError::Validation(format!(
                    "[catalog] {key} must be between 1 and {MAX_FRAME_DIMENSION}"
                )));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Command settings
    // ------------------------------------------------------------------------

    /// Merge `catalog` flags over this config.
    pub fn catalog_settings(&self, args: &CatalogArgs) -> Result<CatalogSettings, ConfigError> {
        let canvas_width = args.canvas_width.or(self.catalog.canvas_width);
        let canvas_height = args.canvas_height.or(self.catalog.canvas_height);
        if [canvas_width, canvas_height]
            .into_iter()
            .flatten()
            .any(|v| !canvas_in_range(v))
        {
            return Err(ConfigError::Validation(format!(
                "canvas dimensions must be between 1 and {MAX_FRAME_DIMENSION}"
            )));
        }

        Ok(CatalogSettings {
            layers_dir: pick(&args.layers_dir, &self.paths.layers_dir),
            document: pick(&args.output, &self.paths.document),
            update: args.update,
            options: CatalogOptions {
                canvas_width,
                canvas_height,
                missing: args.missing.unwrap_or(self.catalog.missing),
            },
        })
    }

    /// Merge `assemble` flags over this config.
    pub fn assemble_settings(&self, args: &AssembleArgs) -> Result<AssembleSettings, ConfigError> {
        let timeout_secs = args.timeout.unwrap_or(self.export.timeout_secs);
        if timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "--timeout must be greater than zero".to_string(),
            ));
        }

        Ok(AssembleSettings {
            layers_dir: pick(&args.layers_dir, &self.paths.layers_dir),
            document: pick(&args.layers_info, &self.paths.document),
            output: pick(&args.output, &self.paths.output),
            method: args.method.unwrap_or(self.export.method),
            chain: ChainSettings {
                external_tool: self.export.external_tool && !args.no_external_tool,
                builtin_psd: self.export.builtin_psd && !args.no_builtin_psd,
                tools: self.export.tools.clone(),
                timeout: Duration::from_secs(timeout_secs),
            },
        })
    }
}

fn pick(flag: &Option<PathBuf>, configured: &Path) -> PathBuf {
    flag.clone().unwrap_or_else(|| configured.to_path_buf())
}

fn canvas_in_range(value: u32) -> bool {
    (1..=MAX_FRAME_DIMENSION).contains(&value)
}

impl FromStr for ToolConfig {
    type Err = toml::de::Error;

    /// Parse configuration from a TOML string, without unknown-field warnings.
    fn from_str(content: &str) -> Result<Self, Self::Err> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Commands;
    use clap::Parser;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("figmapsd").chain(args.iter().copied())).unwrap()
    }

    fn catalog_args(cli: &Cli) -> &CatalogArgs {
        match &cli.command {
            Commands::Catalog { args } => args,
            other => panic!("expected catalog, got {other:?}"),
        }
    }

    fn assemble_args(cli: &Cli) -> &AssembleArgs {
        match &cli.command {
            Commands::Assemble { args } => args,
            other => panic!("expected assemble, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = ToolConfig::default();
        assert_eq!(config.paths.layers_dir, Path::new("exported-layers"));
        assert_eq!(config.paths.document, Path::new("layers_info.json"));
        assert_eq!(config.paths.output, Path::new("output.psd"));
        assert_eq!(config.catalog.missing, MissingLayerPolicy::Drop);
        assert_eq!(config.export.method, Method::Layered);
        assert_eq!(config.export.tools, ["magick", "convert"]);
        assert_eq!(config.export.timeout_secs, 120);
        assert!(config.export.external_tool && config.export.builtin_psd);
    }

    #[test]
    fn test_parse_sections() {
        let config: ToolConfig = r#"
            [paths]
            layers_dir = "frames/home"

            [catalog]
            canvas_width = 1440
            missing = "keep"

            [export]
            method = "flattened"
            tools = ["magick"]
            timeout_secs = 30
            builtin_psd = false
            "#
        .parse()
        .unwrap();

        assert_eq!(config.paths.layers_dir, Path::new("frames/home"));
        assert_eq!(config.paths.output, Path::new("output.psd"));
        assert_eq!(config.catalog.canvas_width, Some(1440));
        assert_eq!(config.catalog.canvas_height, None);
        assert_eq!(config.catalog.missing, MissingLayerPolicy::Keep);
        assert_eq!(config.export.method, Method::Flattened);
        assert_eq!(config.export.tools, ["magick"]);
        assert_eq!(config.export.timeout_secs, 30);
        assert!(config.export.external_tool);
        assert!(!config.export.builtin_psd);
    }

    #[test]
    fn test_unknown_fields_collected() {
        let (config, ignored) = ToolConfig::parse_with_ignored(
            r#"
            [paths]
            layers_dir = "x"
            layer_dir = "typo"

            [colour]
            mode = "rgb"
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.layers_dir, Path::new("x"));
        assert!(ignored.contains(&"paths.layer_dir".to_string()));
        assert!(ignored.iter().any(|f| f.starts_with("colour")));
    }

    #[test]
    fn test_invalid_value_is_error() {
        assert!("[export]\nmethod = \"stacked\"\n".parse::<ToolConfig>().is_err());
    }

    #[test]
    fn test_load_resolves_relative_to_config_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("figmapsd.toml");
        fs::write(&path, "[paths]\nlayers_dir = \"layers\"\noutput = \"/abs/out.psd\"\n").unwrap();

        let cli = cli(&["-C", path.to_str().unwrap(), "assemble"]);
        let config = ToolConfig::load(&cli).unwrap();

        assert_eq!(config.source.as_deref(), Some(path.as_path()));
        assert_eq!(config.paths.layers_dir, dir.path().join("layers"));
        assert_eq!(config.paths.document, dir.path().join("layers_info.json"));
        assert_eq!(config.paths.output, Path::new("/abs/out.psd"));
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let cli = cli(&["-C", missing.to_str().unwrap(), "catalog"]);
        assert!(matches!(ToolConfig::load(&cli), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("figmapsd.toml");
        fs::write(&path, "[export]\ntimeout_secs = 0\n").unwrap();
        let cli = cli(&["-C", path.to_str().unwrap(), "assemble"]);
        assert!(matches!(ToolConfig::load(&cli), Err(ConfigError::Validation(_))));

        fs::write(&path, "[export\n").unwrap();
        assert!(matches!(ToolConfig::load(&cli), Err(ConfigError::Toml(..))));
    }

    #[test]
    fn test_catalog_flags_override_config() {
        let mut config = ToolConfig::default();
        config.catalog.canvas_width = Some(1000);
        config.catalog.canvas_height = Some(700);
        config.catalog.missing = MissingLayerPolicy::Keep;

        let parsed = cli(&[
            "catalog",
            "--layers-dir",
            "shots",
            "--canvas-width",
            "1440",
            "--missing",
            "drop",
            "--update",
        ]);
        let settings = config.catalog_settings(catalog_args(&parsed)).unwrap();

        assert_eq!(settings.layers_dir, Path::new("shots"));
        assert_eq!(settings.document, Path::new("layers_info.json"));
        assert!(settings.update);
        assert_eq!(settings.options.canvas_width, Some(1440));
        assert_eq!(settings.options.canvas_height, Some(700));
        assert_eq!(settings.options.missing, MissingLayerPolicy::Drop);
    }

    #[test]
    fn test_catalog_zero_canvas_rejected() {
        let parsed = cli(&["catalog", "--canvas-height", "0"]);
        let err = ToolConfig::default()
            .catalog_settings(catalog_args(&parsed))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_catalog_oversized_canvas_rejected() {
        let parsed = cli(&["catalog", "--canvas-width", "30001"]);
        let err = ToolConfig::default()
            .catalog_settings(catalog_args(&parsed))
            .unwrap_err();
        assert!(err.to_string().contains("30000"));

        let parsed = cli(&["catalog", "--canvas-width", "30000"]);
        assert!(ToolConfig::default().catalog_settings(catalog_args(&parsed)).is_ok());
    }

    #[test]
    fn test_assemble_flags_override_config() {
        let mut config = ToolConfig::default();
        config.export.builtin_psd = false;

        let parsed = cli(&[
            "assemble",
            "--layers-info",
            "doc.json",
            "--method",
            "flattened",
            "--timeout",
            "5",
            "--no-external-tool",
        ]);
        let settings = config.assemble_settings(assemble_args(&parsed)).unwrap();

        assert_eq!(settings.document, Path::new("doc.json"));
        assert_eq!(settings.output, Path::new("output.psd"));
        assert_eq!(settings.method, Method::Flattened);
        assert_eq!(settings.chain.timeout, Duration::from_secs(5));
        assert!(!settings.chain.external_tool);
        // Disabled in config stays disabled without a flag
        assert!(!settings.chain.builtin_psd);
    }

    #[test]
    fn test_assemble_zero_timeout_rejected() {
        let parsed = cli(&["assemble", "--timeout", "0"]);
        assert!(
            ToolConfig::default()
                .assemble_settings(assemble_args(&parsed))
                .is_err()
        );
    }
}

//! The layer document: canvas frame plus ordered layer descriptors.
//!
//! Persisted as pretty-printed JSON (`layers_info.json` by default). Keys
//! keep their insertion order so operator edits, notes and unknown fields
//! survive a catalog update untouched.
//!
//! ```text
//! {
//!   "frame": { "width": 1440, "height": 1024 },
//!   "layers": [
//!     { "name": "background", "x": 0, "y": 0, "opacity": 1.0,
//!       "_image_width": 1440, "_image_height": 1024, "_image_mode": "RGBA" }
//!   ],
//!   "_instructions": { ... }
//! }
//! ```

mod error;

pub use error::DocumentError;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::fs;
use std::path::Path;

/// Canvas width used when nothing else is known.
pub const DEFAULT_WIDTH: u32 = 800;
/// Canvas height used when nothing else is known.
pub const DEFAULT_HEIGHT: u32 = 600;
/// Largest accepted frame width or height (the PSD version 1 limit).
pub const MAX_FRAME_DIMENSION: u32 = 30_000;

/// Top-level key holding the editing guide written next to the layers.
const INSTRUCTIONS_KEY: &str = "_instructions";

// ============================================================================
// Frame
// ============================================================================

/// Output canvas dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

const fn default_width() -> u32 {
    DEFAULT_WIDTH
}

const fn default_height() -> u32 {
    DEFAULT_HEIGHT
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl Frame {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both dimensions lie in `1..=MAX_FRAME_DIMENSION`.
    pub const fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.width <= MAX_FRAME_DIMENSION
            && self.height <= MAX_FRAME_DIMENSION
    }
}

// ============================================================================
// LayerDescriptor
// ============================================================================

/// One layer: which image, where it goes, how opaque it is.
///
/// The `_image_*` fields are refreshed by every catalog run and are
/// informational only; the assembler never reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    /// Image file stem in the layers directory
    #[serde(default)]
    pub name: String,

    /// Horizontal offset in pixels (0 = left edge)
    #[serde(default, deserialize_with = "pixel_offset")]
    pub x: i64,

    /// Vertical offset in pixels (0 = top edge)
    #[serde(default, deserialize_with = "pixel_offset")]
    pub y: i64,

    /// Layer opacity (1.0 = 100%)
    #[serde(default = "default_opacity")]
    pub opacity: f64,

    #[serde(rename = "_image_width", default, skip_serializing_if = "Option::is_none")]
    pub image_width: Option<u32>,

    #[serde(rename = "_image_height", default, skip_serializing_if = "Option::is_none")]
    pub image_height: Option<u32>,

    #[serde(rename = "_image_mode", default, skip_serializing_if = "Option::is_none")]
    pub image_mode: Option<String>,

    /// Fields this tool does not interpret, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const fn default_opacity() -> f64 {
    1.0
}

/// Accept integral or fractional offsets; fractions are truncated toward zero.
fn pixel_offset<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    struct OffsetVisitor;

    impl Visitor<'_> for OffsetVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a pixel offset")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            Ok(i64::try_from(v).unwrap_or(i64::MAX))
        }

        #[allow(clippy::cast_possible_truncation)]
        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            if v.is_finite() {
                Ok(v.trunc() as i64)
            } else {
                Err(E::invalid_value(de::Unexpected::Float(v), &self))
            }
        }
    }

    deserializer.deserialize_any(OffsetVisitor)
}

impl LayerDescriptor {
    /// A descriptor with default placement and no derived metadata.
    pub fn new(name: impl Into<String>, x: i64, y: i64, opacity: f64) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            opacity,
            image_width: None,
            image_height: None,
            image_mode: None,
            extra: Map::new(),
        }
    }

    /// Opacity clamped into `[0, 1]`; non-finite values count as opaque.
    #[allow(clippy::cast_possible_truncation)]
    pub fn effective_opacity(&self) -> f32 {
        if self.opacity.is_finite() {
            self.opacity.clamp(0.0, 1.0) as f32
        } else {
            1.0
        }
    }
}

// ============================================================================
// LayerDocument
// ============================================================================

/// Frame plus layers in paint order (first = bottom).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayerDocument {
    #[serde(default)]
    pub frame: Frame,

    #[serde(default)]
    pub layers: Vec<LayerDescriptor>,

    /// Top-level fields other than `frame`/`layers` (e.g. `_instructions`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LayerDocument {
    pub fn new(frame: Frame, layers: Vec<LayerDescriptor>) -> Self {
        Self {
            frame,
            layers,
            extra: Map::new(),
        }
    }

    /// Load and validate a document from disk.
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let content = fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                DocumentError::NotFound(path.to_path_buf())
            } else {
                DocumentError::Io(path.to_path_buf(), err)
            }
        })?;
        let doc = Self::from_json(&content)
            .map_err(|err| DocumentError::Parse(path.to_path_buf(), err))?;
        doc.validate(path)?;
        Ok(doc)
    }

    /// Parse a document from JSON text without touching the filesystem.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Serialize with two-space indentation and a trailing newline.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Write the document, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        let json = self.to_json().map_err(DocumentError::Serialize)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|err| DocumentError::Write(path.to_path_buf(), err))?;
        }
        fs::write(path, json).map_err(|err| DocumentError::Write(path.to_path_buf(), err))
    }

    fn validate(&self, path: &Path) -> Result<(), DocumentError> {
        if !self.frame.is_valid() {
            return Err(DocumentError::InvalidFrame {
                path: path.to_path_buf(),
                width: self.frame.width,
                height: self.frame.height,
            });
        }
        Ok(())
    }

    /// Add the editing guide unless the document already carries one.
    pub fn ensure_instructions(&mut self) {
        if !self.extra.contains_key(INSTRUCTIONS_KEY) {
            self.extra
                .insert(INSTRUCTIONS_KEY.to_string(), instructions());
        }
    }
}

/// Human-readable guide to the editable fields.
fn instructions() -> Value {
    json!({
        "frame": "Set the canvas size of the output file",
        "layers": {
            "name": "Must match the image file name (without extension)",
            "x": "Horizontal position in pixels (0 = left edge)",
            "y": "Vertical position in pixels (0 = top edge)",
            "opacity": "Layer opacity (1.0 = 100%, 0.5 = 50%, etc.)"
        },
        "_image_*": "Auto-generated info fields, refreshed on every catalog run - you can ignore them"
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_fields_use_defaults() {
        let doc = LayerDocument::from_json(r#"{"layers":[{"name":"a"}]}"#).unwrap();
        assert_eq!(doc.frame, Frame::new(800, 600));
        let layer = &doc.layers[0];
        assert_eq!((layer.x, layer.y), (0, 0));
        assert_eq!(layer.opacity, 1.0);
        assert!(layer.image_width.is_none());
    }

    #[test]
    fn test_partial_frame_defaults_missing_dimension() {
        let doc = LayerDocument::from_json(r#"{"frame":{"width":1200}}"#).unwrap();
        assert_eq!(doc.frame, Frame::new(1200, 600));
    }

    #[test]
    fn test_unknown_fields_round_trip_in_order() {
        let src = r#"{
  "frame": {
    "width": 10,
    "height": 20
  },
  "layers": [
    {
      "name": "logo",
      "x": 5,
      "y": -3,
      "opacity": 0.5,
      "_image_width": 4,
      "_image_height": 4,
      "_image_mode": "RGBA",
      "note": "keep me",
      "locked": true
    }
  ],
  "_instructions": {
    "custom": "operator text"
  },
  "author": "design team"
}
"#;
        let doc = LayerDocument::from_json(src).unwrap();
        assert_eq!(doc.layers[0].extra["note"], "keep me");
        assert_eq!(doc.to_json().unwrap(), src);
    }

    #[test]
    fn test_fractional_offsets_truncate() {
        let doc = LayerDocument::from_json(
            r#"{"layers":[{"name":"a","x":12.5,"y":-3.9,"opacity":1},{"name":"b","x":7,"y":0.0}]}"#,
        )
        .unwrap();
        let (a, b) = (&doc.layers[0], &doc.layers[1]);
        assert_eq!((a.x, a.y, a.opacity), (12, -3, 1.0));
        assert_eq!((b.x, b.y), (7, 0));

        assert!(LayerDocument::from_json(r#"{"layers":[{"name":"a","x":"12"}]}"#).is_err());
    }

    #[test]
    fn test_effective_opacity_clamps() {
        let mut layer = LayerDescriptor::new("a", 0, 0, 1.7);
        assert_eq!(layer.effective_opacity(), 1.0);
        layer.opacity = -0.2;
        assert_eq!(layer.effective_opacity(), 0.0);
        layer.opacity = f64::NAN;
        assert_eq!(layer.effective_opacity(), 1.0);
        layer.opacity = 0.25;
        assert_eq!(layer.effective_opacity(), 0.25);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = LayerDocument::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, DocumentError::NotFound(_)));
        assert!(err.to_string().contains("nope.json"));
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = LayerDocument::load(&path).unwrap_err();
        assert!(matches!(err, DocumentError::Parse(..)));
    }

    #[test]
    fn test_load_rejects_zero_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("zero.json");
        fs::write(&path, r#"{"frame":{"width":0,"height":10},"layers":[]}"#).unwrap();
        let err = LayerDocument::load(&path).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidFrame { width: 0, .. }));
    }

    #[test]
    fn test_load_rejects_oversized_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("huge.json");
        fs::write(&path, r#"{"frame":{"width":2000000,"height":10},"layers":[]}"#).unwrap();
        let err = LayerDocument::load(&path).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidFrame { width: 2_000_000, .. }));

        let limit = format!(r#"{{"frame":{{"width":{MAX_FRAME_DIMENSION},"height":10}}}}"#);
        fs::write(&path, limit).unwrap();
        assert!(LayerDocument::load(&path).is_ok());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/layers_info.json");
        let mut doc = LayerDocument::new(
            Frame::new(400, 300),
            vec![LayerDescriptor::new("banner", 20, 5, 0.75)],
        );
        doc.ensure_instructions();
        doc.save(&path).unwrap();

        let loaded = LayerDocument::load(&path).unwrap();
        assert_eq!(loaded, doc);
        assert!(loaded.extra.contains_key("_instructions"));
    }

    #[test]
    fn test_ensure_instructions_keeps_existing() {
        let mut doc = LayerDocument::from_json(r#"{"_instructions":"mine"}"#).unwrap();
        doc.ensure_instructions();
        assert_eq!(doc.extra["_instructions"], "mine");
    }
}

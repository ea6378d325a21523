#![forbid(unsafe_code)]

//! `skritch` converts precise SVG documents into "hand-sketched" renditions.
//!
//! The core is an SVG semantic interpreter: a tree walk that resolves the
//! cascaded paint attributes, the cumulative coordinate transform, the
//! applicable clip geometry and marker placement for every visual node, then
//! hands fully-resolved draw requests to a sketch engine (`roughr`, a
//! rough.js port). Output is a new SVG document; the `raster` feature adds
//! PNG/JPG encoding via pure-Rust SVG rasterization.
//!
//! ```no_run
//! let converter = skritch::Converter::new(skritch::Options::default())?;
//! let sketched = converter.convert_str("<svg xmlns='http://www.w3.org/2000/svg'/>")?;
//! # Ok::<(), skritch::Error>(())
//! ```
//!
//! # Features
//!
//! - `raster`: enable PNG/JPG output (`skritch::raster`)

pub mod css;
pub mod error;
pub mod geom;
pub mod outdom;
pub mod path;
pub mod sketch;
pub mod style;
pub mod text;
pub mod units;
pub mod walk;

mod clip;
mod marker;
mod shapes;

#[cfg(feature = "raster")]
pub mod raster;

pub use error::{Error, Result};
pub use sketch::{LayerKind, RoughSketcher, Sketch, SketchEngine, SketchLayer};
pub use style::{FillKind, Pen, Rgba, StyleConfig};
pub use text::{DeterministicTextMeasurer, TextMeasurer, TextMetrics, TextStyle};
pub use walk::{ElementKind, RenderPass};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Flat conversion options, named as the upstream configuration keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Stroke perturbation amount handed to the sketch engine.
    pub roughness: f64,
    /// Line bowing amount handed to the sketch engine.
    pub bowing: f64,
    pub fill_style: FillKind,
    /// Base seed. With `randomize` every shape draws a fresh seed from a
    /// generator seeded here, so identical inputs still convert
    /// reproducibly.
    pub seed: u64,
    pub randomize: bool,
    /// Adds a paper-grain post filter to the output.
    pub pencil_filter: bool,
    /// Re-sketch referenced `<pattern>` content instead of copying it
    /// verbatim.
    pub sketch_patterns: bool,
    pub disable_multi_stroke: bool,
    /// Font family forced onto re-hosted text; `None` keeps the original.
    pub font_family: Option<String>,
    pub background_color: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            roughness: 1.0,
            bowing: 1.0,
            fill_style: FillKind::Hachure,
            seed: 0,
            randomize: true,
            pencil_filter: false,
            sketch_patterns: true,
            disable_multi_stroke: false,
            font_family: Some("Comic Sans MS, cursive".to_string()),
            background_color: None,
        }
    }
}

impl Options {
    pub fn validate(&self) -> Result<()> {
        if !self.roughness.is_finite() || self.roughness < 0.0 {
            return Err(Error::Config {
                message: format!("roughness must be finite and non-negative, got {}", self.roughness),
            });
        }
        if !self.bowing.is_finite() || self.bowing < 0.0 {
            return Err(Error::Config {
                message: format!("bowing must be finite and non-negative, got {}", self.bowing),
            });
        }
        Ok(())
    }
}

/// The conversion entry point. Cheap to construct; holds configuration plus
/// the pluggable sketcher/measurer handles. All per-conversion state lives
/// in a [`RenderPass`] rebuilt for every call.
pub struct Converter {
    options: Options,
    sketcher: Arc<dyn SketchEngine + Send + Sync>,
    measurer: Arc<dyn TextMeasurer + Send + Sync>,
}

impl Converter {
    /// Validates the options and builds a converter with the default
    /// roughr-backed sketcher and deterministic text measurer.
    pub fn new(options: Options) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            sketcher: Arc::new(RoughSketcher),
            measurer: Arc::new(DeterministicTextMeasurer::default()),
        })
    }

    pub fn with_sketcher(mut self, sketcher: Arc<dyn SketchEngine + Send + Sync>) -> Self {
        self.sketcher = sketcher;
        self
    }

    pub fn with_measurer(mut self, measurer: Arc<dyn TextMeasurer + Send + Sync>) -> Self {
        self.measurer = measurer;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Converts an SVG document string into sketched SVG markup.
    pub fn convert_str(&self, svg: &str) -> Result<String> {
        self.convert_str_sized(svg, None, None)
    }

    /// Same as [`Converter::convert_str`] with explicit output dimensions
    /// overriding the document's own width/height.
    pub fn convert_str_sized(
        &self,
        svg: &str,
        width: Option<f64>,
        height: Option<f64>,
    ) -> Result<String> {
        let doc = roxmltree::Document::parse(svg)?;
        let mut pass = RenderPass::new(&doc, &self.options, &*self.sketcher, &*self.measurer)?;
        let out = pass.run(width, height)?;
        Ok(out.to_svg_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_deserialize_with_upstream_key_names() {
        let options: Options = serde_json::from_str(
            r#"{"fillStyle": "cross-hatch", "pencilFilter": true, "backgroundColor": "white"}"#,
        )
        .expect("deserialize ok");
        assert_eq!(options.fill_style, FillKind::CrossHatch);
        assert!(options.pencil_filter);
        assert_eq!(options.background_color.as_deref(), Some("white"));
        assert!(options.randomize, "unset keys keep their defaults");
    }

    #[test]
    fn invalid_options_fail_construction() {
        let options = Options {
            roughness: f64::NAN,
            ..Default::default()
        };
        assert!(Converter::new(options).is_err());
    }

    #[test]
    fn non_svg_input_fails_conversion() {
        let converter = Converter::new(Options::default()).expect("construct ok");
        assert!(converter.convert_str("<html/>").is_err());
        assert!(converter.convert_str("not xml").is_err());
    }
}

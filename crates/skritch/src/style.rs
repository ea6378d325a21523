//! Style resolution: CSS-like attribute inheritance (including the virtual
//! `<use>` chain), paint and opacity resolution, gradient flattening, and
//! randomized pen parameters.

use crate::error::Result;
use crate::geom::{self, Rect, Transform};
use crate::outdom::fmt;
use crate::units::{self, ReferenceAxis, UnitContext};
use crate::walk::{RenderPass, MAX_REFERENCE_DEPTH};
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Shapes smaller than this (by `sqrt(w*h)`) get a finer pen so hachure
/// detail survives at small scale.
const SMALL_SHAPE_SIZE: f64 = 45.0;

/// Sketch fill styles, named as the upstream rough.js option values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FillKind {
    #[default]
    #[serde(rename = "hachure")]
    Hachure,
    #[serde(rename = "solid")]
    Solid,
    #[serde(rename = "zigzag")]
    ZigZag,
    #[serde(rename = "cross-hatch")]
    CrossHatch,
    #[serde(rename = "dots")]
    Dots,
    #[serde(rename = "dashed")]
    Dashed,
    #[serde(rename = "zigzag-line")]
    ZigZagLine,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    pub fn black() -> Self {
        Self { r: 0, g: 0, b: 0, a: 1.0 }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let c = s.trim().parse::<svgtypes::Color>().ok()?;
        Some(Self {
            r: c.red,
            g: c.green,
            b: c.blue,
            a: f64::from(c.alpha) / 255.0,
        })
    }

    pub fn with_alpha(&self, a: f64) -> Self {
        Self { a: a.clamp(0.0, 1.0), ..*self }
    }

    pub fn scaled_alpha(&self, factor: f64) -> Self {
        self.with_alpha(self.a * factor)
    }

    pub fn to_css(&self) -> String {
        if self.a >= 1.0 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("rgba({},{},{},{})", self.r, self.g, self.b, fmt(self.a))
        }
    }
}

/// Randomized hachure pen for one element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pen {
    pub hachure_angle: f64,
    pub hachure_gap: f64,
    pub fill_weight: f64,
}

/// One link of the virtual `<use>` inheritance chain: attribute lookup that
/// would normally walk real DOM parents jumps to `root` (the `<use>`
/// element) once it reaches `referenced`, continuing under `parent`.
#[derive(Debug)]
pub struct UseFrame<'a, 'i> {
    pub root: roxmltree::Node<'a, 'i>,
    pub referenced: roxmltree::Node<'a, 'i>,
    pub parent: UseContext<'a, 'i>,
}

pub type UseContext<'a, 'i> = Option<Rc<UseFrame<'a, 'i>>>;

/// Fully resolved paint and sketch parameters for one element, computed
/// fresh per element per pass.
#[derive(Debug, Clone)]
pub struct StyleConfig {
    pub fill: Option<Rgba>,
    pub stroke: Option<Rgba>,
    pub stroke_width: f64,
    pub dash: Option<Vec<f64>>,
    pub dash_offset: f64,
    pub fill_style: FillKind,
    pub roughness: f64,
    pub bowing: f64,
    pub pen: Option<Pen>,
    pub seed: u64,
    pub disable_multi_stroke: bool,
    /// Rounded-rect reconstruction forces square line caps so joins do not
    /// leak past the nominal bounds.
    pub square_cap: bool,
    /// Pattern paint ids for the secondary pattern-proxy pass.
    pub pattern_fill: Option<String>,
    pub pattern_stroke: Option<String>,
}

impl StyleConfig {
    pub fn has_fill(&self) -> bool {
        self.fill.is_some()
    }

    pub fn has_stroke(&self) -> bool {
        self.stroke.is_some()
    }

    pub fn fill_only(&self) -> Self {
        Self {
            stroke: None,
            pattern_stroke: None,
            ..self.clone()
        }
    }

    pub fn stroke_only(&self) -> Self {
        Self {
            fill: None,
            pattern_fill: None,
            ..self.clone()
        }
    }
}

pub(crate) enum Paint {
    Color(Rgba),
    Pattern(String),
    None,
}

/// One step up the (possibly virtual) parent chain.
pub(crate) fn parent_step<'a, 'i>(
    current: roxmltree::Node<'a, 'i>,
    ctx: &UseContext<'a, 'i>,
) -> Option<(roxmltree::Node<'a, 'i>, UseContext<'a, 'i>)> {
    if let Some(frame) = ctx {
        if frame.referenced == current {
            return Some((frame.root, frame.parent.clone()));
        }
    }
    let parent = current.parent()?;
    if parent.is_element() {
        Some((parent, ctx.clone()))
    } else {
        None
    }
}

fn parse_opacity_value(v: &str) -> Option<f64> {
    let v = v.trim();
    if let Some(pct) = v.strip_suffix('%') {
        return pct.trim().parse::<f64>().ok().map(|n| n / 100.0);
    }
    v.parse::<f64>().ok()
}

impl<'a, 'i> RenderPass<'a, 'i> {
    /// The inheritance-resolved value of a presentation attribute.
    ///
    /// Outside a use-context the computed-style subset (CSS rules + inline
    /// style) is consulted before the raw attribute; inside one, only the
    /// raw attribute is read, since computed style is unreliable across a virtual
    /// copy boundary. Terminates at the document root with no value; callers
    /// apply the hard defaults (`fill` black, `stroke` none).
    pub fn effective_attribute(
        &self,
        node: roxmltree::Node<'a, 'i>,
        name: &str,
        ctx: &UseContext<'a, 'i>,
    ) -> Option<String> {
        let mut current = node;
        let mut ctx = ctx.clone();
        loop {
            let own = if ctx.is_none() {
                self.stylesheet
                    .declared_value(current, name)
                    .or_else(|| current.attribute(name).map(str::to_string))
            } else {
                current.attribute(name).map(str::to_string)
            };
            if let Some(v) = own {
                let v = v.trim();
                if !v.is_empty() && v != "inherit" {
                    return Some(v.to_string());
                }
            }
            match parent_step(current, &ctx) {
                Some((next, next_ctx)) => {
                    current = next;
                    ctx = next_ctx;
                }
                None => return None,
            }
        }
    }

    /// Multiplies (never overwrites) each ancestor's value of an opacity
    /// attribute, clamped to `[0, 1]` per step.
    pub fn effective_opacity(
        &self,
        node: roxmltree::Node<'a, 'i>,
        name: &str,
        ctx: &UseContext<'a, 'i>,
    ) -> f64 {
        let mut product = 1.0;
        let mut current = node;
        let mut ctx = ctx.clone();
        loop {
            let own = if ctx.is_none() {
                self.stylesheet
                    .declared_value(current, name)
                    .or_else(|| current.attribute(name).map(str::to_string))
            } else {
                current.attribute(name).map(str::to_string)
            };
            if let Some(v) = own {
                if let Some(o) = parse_opacity_value(&v) {
                    product *= o.clamp(0.0, 1.0);
                }
            }
            match parent_step(current, &ctx) {
                Some((next, next_ctx)) => {
                    current = next;
                    ctx = next_ctx;
                }
                None => return product,
            }
        }
    }

    /// Effective font size in pixels; `em`/`%` resolve against the parent's
    /// effective size.
    pub fn font_size_px(&self, node: roxmltree::Node<'a, 'i>, ctx: &UseContext<'a, 'i>) -> f64 {
        let parent_size = match parent_step(node, ctx) {
            Some((parent, parent_ctx)) => self.font_size_px(parent, &parent_ctx),
            None => 16.0,
        };
        let own = if ctx.is_none() {
            self.stylesheet
                .declared_value(node, "font-size")
                .or_else(|| node.attribute("font-size").map(str::to_string))
        } else {
            node.attribute("font-size").map(str::to_string)
        };
        let Some(value) = own else {
            return parent_size;
        };
        match units::parse_dimension("font-size", &value) {
            Ok((n, unit)) => match unit {
                units::LengthUnit::Em => n * parent_size,
                units::LengthUnit::Percent => n / 100.0 * parent_size,
                units::LengthUnit::Rem => n * self.root_font_size,
                units::LengthUnit::Ex | units::LengthUnit::Ch => n * parent_size * 0.5,
                _ => units::to_pixels(
                    "font-size",
                    &value,
                    ReferenceAxis::Diagonal,
                    &UnitContext {
                        viewport: geom::rect(0.0, 0.0, 0.0, 0.0),
                        canvas: self.canvas,
                        font_size: parent_size,
                        root_font_size: self.root_font_size,
                        zero_glyph_advance: parent_size * 0.5,
                        x_height: parent_size * 0.5,
                    },
                )
                .unwrap_or(parent_size),
            },
            Err(_) => parent_size,
        }
    }

    pub(crate) fn unit_ctx(
        &self,
        node: roxmltree::Node<'a, 'i>,
        viewport: Rect,
        ctx: &UseContext<'a, 'i>,
    ) -> UnitContext {
        let font_size = self.font_size_px(node, ctx);
        UnitContext {
            viewport,
            canvas: self.canvas,
            font_size,
            root_font_size: self.root_font_size,
            zero_glyph_advance: self.measurer.zero_glyph_advance(font_size),
            x_height: self.measurer.x_height(font_size),
        }
    }

    /// Raw geometry attribute in pixels (geometry is never inherited).
    pub(crate) fn length_attr(
        &self,
        node: roxmltree::Node<'a, 'i>,
        name: &str,
        default: f64,
        uctx: &UnitContext,
    ) -> Result<f64> {
        match node.attribute(name) {
            None => Ok(default),
            Some(v) => units::to_pixels(name, v, units::axis_for_attribute(name), uctx),
        }
    }

    /// Computes the full paint/sketch configuration for one element.
    pub fn resolve_style(
        &mut self,
        node: roxmltree::Node<'a, 'i>,
        transform: &Transform,
        ctx: &UseContext<'a, 'i>,
        viewport: Rect,
        bbox: Option<(f64, f64)>,
    ) -> Result<StyleConfig> {
        let scale = geom::stroke_scale(transform);
        let opacity = self.effective_opacity(node, "opacity", ctx);

        let fill_raw = self
            .effective_attribute(node, "fill", ctx)
            .unwrap_or_else(|| "black".to_string());
        let fill_alpha = opacity * self.effective_opacity(node, "fill-opacity", ctx);
        let (fill, pattern_fill) = match self.resolve_paint(&fill_raw, fill_alpha, node, ctx) {
            Paint::Color(c) => (Some(c), None),
            Paint::Pattern(id) => (None, Some(id)),
            Paint::None => (None, None),
        };

        let stroke_raw = self
            .effective_attribute(node, "stroke", ctx)
            .unwrap_or_else(|| "none".to_string());
        let stroke_alpha = opacity * self.effective_opacity(node, "stroke-opacity", ctx);
        let (mut stroke, pattern_stroke) = match self.resolve_paint(&stroke_raw, stroke_alpha, node, ctx) {
            Paint::Color(c) => (Some(c), None),
            Paint::Pattern(id) => (None, Some(id)),
            Paint::None => (None, None),
        };

        let uctx = self.unit_ctx(node, viewport, ctx);
        let mut stroke_width = match self.effective_attribute(node, "stroke-width", ctx) {
            Some(v) => units::to_pixels("stroke-width", &v, ReferenceAxis::Diagonal, &uctx)? * scale,
            None => scale,
        };

        // A filled but unstroked shape gets a synthetic 1px outline in the
        // fill color; hand-drawn fills look incomplete without one.
        if stroke.is_none() && pattern_stroke.is_none() {
            if let Some(fill_color) = &fill {
                stroke = Some(fill_color.clone());
                stroke_width = scale;
            }
        }

        let dash = match self.effective_attribute(node, "stroke-dasharray", ctx) {
            Some(v) if v != "none" => {
                let mut segments = Vec::new();
                for token in v.split([',', ' ']).map(str::trim).filter(|t| !t.is_empty()) {
                    let px = units::to_pixels("stroke-dasharray", token, ReferenceAxis::Diagonal, &uctx)?;
                    // Segments below half a pixel are invisible after sketching.
                    segments.push((px * scale).max(0.5));
                }
                if segments.is_empty() { None } else { Some(segments) }
            }
            _ => None,
        };
        let dash_offset = match self.effective_attribute(node, "stroke-dashoffset", ctx) {
            Some(v) => units::to_pixels("stroke-dashoffset", &v, ReferenceAxis::Diagonal, &uctx)? * scale,
            None => 0.0,
        };

        let fill_style = self.options.fill_style;
        let pen = self.draw_pen(fill_style, bbox);
        let seed = self.next_seed();

        Ok(StyleConfig {
            fill,
            stroke,
            stroke_width,
            dash,
            dash_offset,
            fill_style,
            roughness: self.options.roughness,
            bowing: self.options.bowing,
            pen,
            seed,
            disable_multi_stroke: self.options.disable_multi_stroke,
            square_cap: false,
            pattern_fill,
            pattern_stroke,
        })
    }

    pub(crate) fn resolve_paint(
        &mut self,
        raw: &str,
        alpha: f64,
        node: roxmltree::Node<'a, 'i>,
        ctx: &UseContext<'a, 'i>,
    ) -> Paint {
        let raw = raw.trim();
        if raw.is_empty() || raw == "none" {
            return Paint::None;
        }
        if raw == "currentColor" {
            let color = self
                .effective_attribute(node, "color", ctx)
                .and_then(|v| Rgba::parse(&v))
                .unwrap_or_else(Rgba::black);
            return Paint::Color(color.scaled_alpha(alpha));
        }
        if let Some(id) = parse_url_reference(raw) {
            let Some(target) = self.id_index.get(&id).copied() else {
                tracing::debug!(reference = %id, "paint reference not found, degrading to none");
                return Paint::None;
            };
            return match target.tag_name().name() {
                "linearGradient" | "radialGradient" => {
                    match self.flatten_gradient(&id, target, alpha) {
                        Some(color) => Paint::Color(color),
                        None => Paint::None,
                    }
                }
                "pattern" => Paint::Pattern(id),
                other => {
                    tracing::debug!(reference = %id, kind = other, "unsupported paint server");
                    Paint::None
                }
            };
        }
        match Rgba::parse(raw) {
            Some(color) => Paint::Color(color.scaled_alpha(alpha)),
            None => {
                tracing::debug!(value = raw, "unparseable paint value");
                Paint::None
            }
        }
    }

    /// Reduces a gradient to one solid color. Memoized under the source id:
    /// the gradient element is read once, repeated lookups are idempotent.
    pub fn flatten_gradient(
        &mut self,
        id: &str,
        node: roxmltree::Node<'a, 'i>,
        opacity: f64,
    ) -> Option<Rgba> {
        if let Some(base) = self.gradient_memo.get(id) {
            return Some(base.scaled_alpha(opacity));
        }
        let stops = self.gradient_stops(node, 0);
        if stops.is_empty() {
            return None;
        }
        let base = reduce_stops(&stops);
        self.gradient_memo.insert(id.to_string(), base.clone());
        Some(base.scaled_alpha(opacity))
    }

    /// The gradient's stop list; a stop-less gradient follows its
    /// `href` template chain, bounded by the reference depth guard.
    fn gradient_stops(&self, node: roxmltree::Node<'a, 'i>, depth: u32) -> Vec<(f64, Rgba)> {
        let mut stops = Vec::new();
        for child in node.children() {
            if !child.is_element() || child.tag_name().name() != "stop" {
                continue;
            }
            let offset = child
                .attribute("offset")
                .and_then(parse_stop_offset)
                .unwrap_or(0.0);
            let color = self
                .stylesheet
                .declared_value(child, "stop-color")
                .or_else(|| child.attribute("stop-color").map(str::to_string))
                .and_then(|v| Rgba::parse(&v))
                .unwrap_or_else(Rgba::black);
            let stop_opacity = self
                .stylesheet
                .declared_value(child, "stop-opacity")
                .or_else(|| child.attribute("stop-opacity").map(str::to_string))
                .and_then(|v| parse_opacity_value(&v))
                .unwrap_or(1.0);
            stops.push((offset, color.scaled_alpha(stop_opacity)));
        }
        if stops.is_empty() && depth < MAX_REFERENCE_DEPTH {
            if let Some(template) = crate::walk::href_attribute(node)
                .and_then(|href| href.strip_prefix('#'))
                .and_then(|id| self.id_index.get(id).copied())
            {
                if matches!(template.tag_name().name(), "linearGradient" | "radialGradient") {
                    return self.gradient_stops(template, depth + 1);
                }
            }
        }
        stops
    }

    /// Draws a fresh randomized pen, biased by the shape's bounding box.
    fn draw_pen(&mut self, kind: FillKind, bbox: Option<(f64, f64)>) -> Option<Pen> {
        if !self.options.randomize || kind == FillKind::Solid {
            return None;
        }

        let (angle_lo, angle_hi) = match bbox {
            Some((w, h)) if h > 0.0 && w / h >= 4.0 => (-10.0, 10.0),
            Some((w, h)) if w > 0.0 && h / w >= 4.0 => (80.0, 100.0),
            _ => (-60.0, -20.0),
        };
        let hachure_angle = self.rng.gen_range(angle_lo..angle_hi);

        let mut fill_weight = self.rng.gen_range(0.5..3.0);
        let mut hachure_gap = match kind {
            FillKind::Dots => self.rng.gen_range(4.0..7.0),
            FillKind::CrossHatch => self.rng.gen_range(3.0..6.5),
            _ => self.rng.gen_range(2.5..5.5),
        };

        if let Some((w, h)) = bbox {
            let size = (w * h).max(0.0).sqrt();
            if size > 0.0 && size < SMALL_SHAPE_SIZE {
                let k = (size / SMALL_SHAPE_SIZE).clamp(0.35, 1.0);
                fill_weight = (fill_weight * k).max(0.3);
                hachure_gap = (hachure_gap * k).max(1.5);
            }
        }

        Some(Pen {
            hachure_angle,
            hachure_gap,
            fill_weight,
        })
    }
}

pub(crate) fn parse_url_reference(raw: &str) -> Option<String> {
    let rest = raw.strip_prefix("url(")?;
    let end = rest.find(')')?;
    let inner = rest[..end].trim().trim_matches(['"', '\'']);
    inner.strip_prefix('#').map(str::to_string)
}

/// Stop offsets are kept as percentages (`0.5` and `50%` both mean 50).
fn parse_stop_offset(v: &str) -> Option<f64> {
    let v = v.trim();
    if let Some(pct) = v.strip_suffix('%') {
        return pct.trim().parse::<f64>().ok().map(|n| n.clamp(0.0, 100.0));
    }
    let n = v.parse::<f64>().ok()?;
    Some((n * 100.0).clamp(0.0, 100.0))
}

/// Reduces a stop list to one color: average adjacent stops, weight each
/// average by its offset span (`max(1, floor(offset/10))` copies), then a
/// quadratic mean per RGB channel and an arithmetic mean for alpha.
fn reduce_stops(stops: &[(f64, Rgba)]) -> Rgba {
    if stops.len() == 1 {
        return stops[0].1.clone();
    }
    let mut accumulator: Vec<Rgba> = Vec::new();
    let mut prev = &stops[0].1;
    for (offset, color) in stops {
        let avg = Rgba {
            r: ((f64::from(prev.r) + f64::from(color.r)) / 2.0).round() as u8,
            g: ((f64::from(prev.g) + f64::from(color.g)) / 2.0).round() as u8,
            b: ((f64::from(prev.b) + f64::from(color.b)) / 2.0).round() as u8,
            a: (prev.a + color.a) / 2.0,
        };
        let copies = ((offset / 10.0).floor() as usize).max(1);
        for _ in 0..copies {
            accumulator.push(avg.clone());
        }
        prev = color;
    }

    let n = accumulator.len() as f64;
    let quadratic = |component: fn(&Rgba) -> u8| -> u8 {
        let mean_sq = accumulator
            .iter()
            .map(|c| f64::from(component(c)).powi(2))
            .sum::<f64>()
            / n;
        mean_sq.sqrt().round().clamp(0.0, 255.0) as u8
    };
    Rgba {
        r: quadratic(|c| c.r),
        g: quadratic(|c| c.g),
        b: quadratic(|c| c.b),
        a: accumulator.iter().map(|c| c.a).sum::<f64>() / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba_css_forms() {
        assert_eq!(Rgba::black().to_css(), "#000000");
        let c = Rgba { r: 255, g: 0, b: 0, a: 0.5 };
        assert_eq!(c.to_css(), "rgba(255,0,0,0.5)");
        assert_eq!(Rgba::parse("#f00"), Some(Rgba { r: 255, g: 0, b: 0, a: 1.0 }));
    }

    #[test]
    fn url_reference_forms() {
        assert_eq!(parse_url_reference("url(#a)").as_deref(), Some("a"));
        assert_eq!(parse_url_reference("url('#a')").as_deref(), Some("a"));
        assert_eq!(parse_url_reference("url(\"#a\") red").as_deref(), Some("a"));
        assert_eq!(parse_url_reference("red"), None);
    }

    #[test]
    fn stop_offsets_normalize_to_percent() {
        assert_eq!(parse_stop_offset("50%"), Some(50.0));
        assert_eq!(parse_stop_offset("0.5"), Some(50.0));
        assert_eq!(parse_stop_offset("2"), Some(100.0));
    }

    #[test]
    fn two_stop_reduction_is_quadratic_mean() {
        let red = Rgba { r: 255, g: 0, b: 0, a: 1.0 };
        let blue = Rgba { r: 0, g: 0, b: 255, a: 1.0 };
        let out = reduce_stops(&[(0.0, red), (100.0, blue)]);
        // One self-average of red plus ten copies of the red/blue average.
        let expected_r = ((255.0_f64.powi(2) + 10.0 * 128.0_f64.powi(2)) / 11.0).sqrt().round() as u8;
        let expected_b = ((10.0 * 128.0_f64.powi(2)) / 11.0).sqrt().round() as u8;
        assert_eq!(out.r, expected_r);
        assert_eq!(out.b, expected_b);
        assert_eq!(out.g, 0);
        assert!((out.a - 1.0).abs() < 1e-9);
    }
}

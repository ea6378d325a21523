//! The traversal engine.
//!
//! An iterative DFS over the source tree with an explicit work-stack, so
//! deep documents cannot blow the call stack. Each frame carries the
//! cumulative transform, the viewport rectangle for percentage resolution,
//! and the virtual `<use>` inheritance chain. Reference expansion (`use`,
//! markers, clip paths, embedded SVG, sketched patterns) re-enters the
//! walker with a bumped depth counter; [`MAX_REFERENCE_DEPTH`] guards
//! against reference cycles the source format does not forbid.

use crate::css::Stylesheet;
use crate::error::{Error, Result};
use crate::geom::{self, Rect, Size, Transform};
use crate::outdom::{SvgNode, fmt};
use crate::sketch::SketchEngine;
use crate::style::{Rgba, UseContext};
use crate::text::TextMeasurer;
use crate::Options;
use rand::rngs::StdRng;
use rand::{RngCore as _, SeedableRng as _};
use rustc_hash::{FxHashMap, FxHashSet};

pub(crate) const MAX_REFERENCE_DEPTH: u32 = 12;

const SVG_NS: &str = "http://www.w3.org/2000/svg";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

pub(crate) fn href_attribute<'a>(node: roxmltree::Node<'a, '_>) -> Option<&'a str> {
    node.attribute("href")
        .or_else(|| node.attribute((XLINK_NS, "href")))
}

/// Closed dispatch set over the supported element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Svg,
    Group,
    Circle,
    Ellipse,
    Rect,
    Line,
    Polyline,
    Polygon,
    Path,
    Text,
    Image,
    Use,
    ForeignObject,
    Defs,
    Symbol,
    Marker,
    ClipPath,
    Pattern,
    Gradient,
    Style,
    Metadata,
    Unsupported,
}

impl ElementKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "svg" => Self::Svg,
            "g" | "a" => Self::Group,
            "circle" => Self::Circle,
            "ellipse" => Self::Ellipse,
            "rect" => Self::Rect,
            "line" => Self::Line,
            "polyline" => Self::Polyline,
            "polygon" => Self::Polygon,
            "path" => Self::Path,
            "text" => Self::Text,
            "image" => Self::Image,
            "use" => Self::Use,
            "foreignObject" => Self::ForeignObject,
            "defs" => Self::Defs,
            "symbol" => Self::Symbol,
            "marker" => Self::Marker,
            "clipPath" => Self::ClipPath,
            "pattern" => Self::Pattern,
            "linearGradient" | "radialGradient" => Self::Gradient,
            "style" => Self::Style,
            "title" | "desc" | "metadata" => Self::Metadata,
            _ => Self::Unsupported,
        }
    }
}

#[derive(Clone)]
pub(crate) struct Frame<'a, 'i> {
    pub node: roxmltree::Node<'a, 'i>,
    pub transform: Transform,
    pub viewport: Rect,
    pub ctx: UseContext<'a, 'i>,
    pub depth: u32,
    /// Width/height override carried from a `<use>` onto its `svg`/`symbol`
    /// target.
    pub size_override: Option<(Option<f64>, Option<f64>)>,
}

/// One conversion pass. Built fresh per redraw: id index, stylesheet,
/// gradient memo, RNG and output accumulators never survive across passes.
pub struct RenderPass<'a, 'i> {
    pub(crate) doc: &'a roxmltree::Document<'i>,
    pub(crate) options: &'a Options,
    pub(crate) sketcher: &'a dyn SketchEngine,
    pub(crate) measurer: &'a dyn TextMeasurer,
    pub(crate) stylesheet: Stylesheet,
    pub(crate) id_index: FxHashMap<String, roxmltree::Node<'a, 'i>>,
    pub(crate) gradient_memo: FxHashMap<String, Rgba>,
    pub(crate) rng: StdRng,
    pub(crate) clip_prefix: String,
    pub(crate) clip_serial: u32,
    pub(crate) embed_serial: u32,
    pub(crate) copied_defs: FxHashSet<String>,
    pub(crate) canvas: Size,
    pub(crate) root_font_size: f64,
    pub(crate) defs: Vec<SvgNode>,
    pub(crate) body: Vec<SvgNode>,
}

impl<'a, 'i> RenderPass<'a, 'i> {
    pub fn new(
        doc: &'a roxmltree::Document<'i>,
        options: &'a Options,
        sketcher: &'a dyn SketchEngine,
        measurer: &'a dyn TextMeasurer,
    ) -> Result<Self> {
        let root = doc.root_element();
        if root.tag_name().name() != "svg" {
            return Err(Error::MissingSvgRoot);
        }

        let mut id_index = FxHashMap::default();
        for node in doc.descendants() {
            if let Some(id) = node.attribute("id") {
                id_index.entry(id.to_string()).or_insert(node);
            }
        }

        let root_font_size = root
            .attribute("font-size")
            .and_then(|v| crate::units::parse_dimension("font-size", v).ok())
            .and_then(|(n, unit)| match unit {
                crate::units::LengthUnit::None | crate::units::LengthUnit::Px => Some(n),
                _ => None,
            })
            .unwrap_or(16.0);

        Ok(Self {
            doc,
            options,
            sketcher,
            measurer,
            stylesheet: Stylesheet::collect(doc),
            id_index,
            gradient_memo: FxHashMap::default(),
            rng: StdRng::seed_from_u64(options.seed),
            clip_prefix: "skritch".to_string(),
            clip_serial: 0,
            embed_serial: 0,
            copied_defs: FxHashSet::default(),
            canvas: euclid::size2(300.0, 150.0),
            root_font_size,
            defs: Vec::new(),
            body: Vec::new(),
        })
    }

    /// Runs the full pass and assembles the output document.
    pub fn run(&mut self, width: Option<f64>, height: Option<f64>) -> Result<SvgNode> {
        let root = self.doc.root_element();
        let view_box = parse_view_box(root);

        let (fallback_w, fallback_h) = view_box
            .map(|vb| (vb.size.width, vb.size.height))
            .unwrap_or((300.0, 150.0));
        let w = width
            .or_else(|| root_dimension(root, "width"))
            .unwrap_or(fallback_w);
        let h = height
            .or_else(|| root_dimension(root, "height"))
            .unwrap_or(fallback_h);
        self.canvas = euclid::size2(w, h);

        let (transform, viewport) = match view_box {
            Some(vb) => (
                geom::view_box_transform(vb, w, h, root.attribute("preserveAspectRatio")),
                vb,
            ),
            None => (Transform::identity(), geom::rect(0.0, 0.0, w, h)),
        };

        let mut stack = Vec::new();
        push_children(&mut stack, root, transform, viewport, &None, 0);
        self.walk(stack);

        let mut svg = SvgNode::new("svg")
            .with_attr("xmlns", SVG_NS)
            .with_attr("width", fmt(w))
            .with_attr("height", fmt(h));

        if self.options.pencil_filter {
            self.defs.push(pencil_filter_def());
        }
        if !self.defs.is_empty() {
            let mut defs = SvgNode::new("defs");
            for def in std::mem::take(&mut self.defs) {
                defs.push(def);
            }
            svg.push(defs);
        }
        if let Some(bg) = &self.options.background_color {
            svg.push(
                SvgNode::new("rect")
                    .with_attr("x", "0")
                    .with_attr("y", "0")
                    .with_attr("width", fmt(w))
                    .with_attr("height", fmt(h))
                    .with_attr("fill", bg.clone()),
            );
        }
        let mut content = SvgNode::new("g");
        if self.options.pencil_filter {
            content.set_attr("filter", "url(#pencilTextureFilter)");
        }
        for node in std::mem::take(&mut self.body) {
            content.push(node);
        }
        svg.push(content);
        Ok(svg)
    }

    /// Iterative DFS over a work stack; per-node failures are logged and
    /// the walk continues with siblings (partial output, never a whole-pass
    /// abort).
    pub(crate) fn walk(&mut self, mut stack: Vec<Frame<'a, 'i>>) {
        while let Some(frame) = stack.pop() {
            if let Err(err) = self.process(&frame, &mut stack) {
                tracing::warn!(
                    element = frame.node.tag_name().name(),
                    error = %err,
                    "skipping element"
                );
            }
        }
    }

    fn process(&mut self, frame: &Frame<'a, 'i>, stack: &mut Vec<Frame<'a, 'i>>) -> Result<()> {
        let node = frame.node;
        let kind = ElementKind::from_tag(node.tag_name().name());

        // Symbols are reference-only except when instantiated through a
        // `<use>` expansion that targets exactly this node.
        let use_instantiated = frame
            .ctx
            .as_ref()
            .is_some_and(|ctx| ctx.referenced == node);

        match kind {
            ElementKind::Defs
            | ElementKind::Marker
            | ElementKind::ClipPath
            | ElementKind::Pattern
            | ElementKind::Gradient
            | ElementKind::Style
            | ElementKind::Metadata => return Ok(()),
            ElementKind::Symbol if !use_instantiated => return Ok(()),
            _ => {}
        }

        if self.is_hidden(node, &frame.ctx) {
            return Ok(());
        }

        let local = node
            .attribute("transform")
            .and_then(geom::parse_transform_list);
        let transform = geom::combine(&frame.transform, local.as_ref());

        match kind {
            ElementKind::Svg | ElementKind::Symbol => {
                self.enter_viewport(node, frame, transform, stack)?;
            }
            ElementKind::Group => {
                push_children(
                    stack,
                    node,
                    transform,
                    frame.viewport,
                    &frame.ctx,
                    frame.depth,
                );
            }
            ElementKind::Circle => self.handle_circle(node, frame, &transform)?,
            ElementKind::Ellipse => self.handle_ellipse(node, frame, &transform)?,
            ElementKind::Rect => self.handle_rect(node, frame, &transform)?,
            ElementKind::Line => self.handle_line(node, frame, &transform)?,
            ElementKind::Polyline => self.handle_poly(node, frame, &transform, false)?,
            ElementKind::Polygon => self.handle_poly(node, frame, &transform, true)?,
            ElementKind::Path => self.handle_path(node, frame, &transform)?,
            ElementKind::Text => self.handle_text(node, frame, &transform)?,
            ElementKind::Image => self.handle_image(node, frame, &transform)?,
            ElementKind::Use => self.handle_use(node, frame, &transform)?,
            ElementKind::ForeignObject => self.handle_foreign_object(node, frame, &transform)?,
            ElementKind::Unsupported => {
                tracing::debug!(tag = node.tag_name().name(), "unsupported element");
            }
            _ => {}
        }
        Ok(())
    }

    /// Establishes a nested coordinate system for `svg`/`symbol` roots:
    /// local origin from x/y, then the viewBox mapping onto the (possibly
    /// use-overridden) width/height.
    fn enter_viewport(
        &mut self,
        node: roxmltree::Node<'a, 'i>,
        frame: &Frame<'a, 'i>,
        transform: Transform,
        stack: &mut Vec<Frame<'a, 'i>>,
    ) -> Result<()> {
        let uctx = self.unit_ctx(node, frame.viewport, &frame.ctx);
        let x = self.length_attr(node, "x", 0.0, &uctx)?;
        let y = self.length_attr(node, "y", 0.0, &uctx)?;

        let (override_w, override_h) = frame.size_override.unwrap_or((None, None));
        let w = match override_w {
            Some(w) => w,
            None => self.length_attr(node, "width", frame.viewport.size.width, &uctx)?,
        };
        let h = match override_h {
            Some(h) => h,
            None => self.length_attr(node, "height", frame.viewport.size.height, &uctx)?,
        };
        if w <= 0.0 || h <= 0.0 {
            return Ok(());
        }

        let mut t = geom::combine(&transform, Some(&Transform::translation(x, y)));
        let viewport = match parse_view_box(node) {
            Some(vb) => {
                let vbt =
                    geom::view_box_transform(vb, w, h, node.attribute("preserveAspectRatio"));
                t = geom::combine(&t, Some(&vbt));
                vb
            }
            None => geom::rect(0.0, 0.0, w, h),
        };

        push_children(stack, node, t, viewport, &frame.ctx, frame.depth);
        Ok(())
    }

    fn is_hidden(&self, node: roxmltree::Node<'a, 'i>, ctx: &UseContext<'a, 'i>) -> bool {
        let display = self
            .stylesheet
            .declared_value(node, "display")
            .or_else(|| node.attribute("display").map(str::to_string));
        if display.as_deref().map(str::trim) == Some("none") {
            return true;
        }
        matches!(
            self.effective_attribute(node, "visibility", ctx).as_deref(),
            Some("hidden") | Some("collapse")
        )
    }

    pub(crate) fn next_seed(&mut self) -> u64 {
        if self.options.randomize {
            self.rng.next_u64()
        } else {
            self.options.seed
        }
    }

    pub(crate) fn next_clip_id(&mut self) -> String {
        self.clip_serial += 1;
        format!("{}-clip-{}", self.clip_prefix, self.clip_serial)
    }

    /// Copies (or re-sketches, when `sketchPatterns` is on) a referenced
    /// `<pattern>` definition into the output defs, once per id.
    pub(crate) fn copy_pattern_def(&mut self, id: &str, depth: u32) {
        if !self.copied_defs.insert(id.to_string()) {
            return;
        }
        let Some(node) = self.id_index.get(id).copied() else {
            return;
        };
        if !self.options.sketch_patterns || depth >= MAX_REFERENCE_DEPTH {
            self.defs.push(copy_subtree(node));
            return;
        }

        let mut pattern = SvgNode::new("pattern");
        for attr in node.attributes() {
            pattern.set_attr(attr.name(), attr.value());
        }
        let tile_w = node
            .attribute("width")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(self.canvas.width);
        let tile_h = node
            .attribute("height")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(self.canvas.height);

        let saved = std::mem::take(&mut self.body);
        let mut stack = Vec::new();
        push_children(
            &mut stack,
            node,
            Transform::identity(),
            geom::rect(0.0, 0.0, tile_w, tile_h),
            &None,
            depth + 1,
        );
        self.walk(stack);
        let content = std::mem::replace(&mut self.body, saved);
        for child in content {
            pattern.push(child);
        }
        self.defs.push(pattern);
    }
}

pub(crate) fn push_children<'a, 'i>(
    stack: &mut Vec<Frame<'a, 'i>>,
    node: roxmltree::Node<'a, 'i>,
    transform: Transform,
    viewport: Rect,
    ctx: &UseContext<'a, 'i>,
    depth: u32,
) {
    // Reverse push for document-order visitation off a LIFO stack.
    let children: Vec<_> = node.children().filter(roxmltree::Node::is_element).collect();
    for child in children.into_iter().rev() {
        stack.push(Frame {
            node: child,
            transform,
            viewport,
            ctx: ctx.clone(),
            depth,
            size_override: None,
        });
    }
}

pub(crate) fn parse_view_box(node: roxmltree::Node<'_, '_>) -> Option<Rect> {
    let vb = node.attribute("viewBox")?.parse::<svgtypes::ViewBox>().ok()?;
    Some(geom::rect(vb.x, vb.y, vb.w, vb.h))
}

/// Root width/height attributes; percentages cannot resolve against
/// anything at the document root and fall through to the viewBox size.
fn root_dimension(root: roxmltree::Node<'_, '_>, name: &str) -> Option<f64> {
    let value = root.attribute(name)?;
    if value.trim().ends_with('%') {
        return None;
    }
    let (n, unit) = crate::units::parse_dimension(name, value).ok()?;
    match unit {
        crate::units::LengthUnit::None | crate::units::LengthUnit::Px => Some(n),
        crate::units::LengthUnit::In => Some(n * 96.0),
        crate::units::LengthUnit::Cm => Some(n * 96.0 / 2.54),
        crate::units::LengthUnit::Mm => Some(n * 96.0 / 25.4),
        crate::units::LengthUnit::Pt => Some(n * 96.0 / 72.0),
        crate::units::LengthUnit::Pc => Some(n * 16.0),
        _ => None,
    }
}

/// Deep copy of a source subtree into the output tree (pattern defs,
/// foreignObject passthrough).
pub(crate) fn copy_subtree(node: roxmltree::Node<'_, '_>) -> SvgNode {
    let mut out = SvgNode::new(node.tag_name().name());
    for attr in node.attributes() {
        out.set_attr(attr.name(), attr.value());
    }
    for child in node.children() {
        if child.is_element() {
            out.push(copy_subtree(child));
        } else if child.is_text() {
            if let Some(t) = child.text() {
                out.append_text(t);
            }
        }
    }
    out
}

/// Paper-grain post filter applied to the whole output when enabled.
fn pencil_filter_def() -> SvgNode {
    let mut filter = SvgNode::new("filter")
        .with_attr("id", "pencilTextureFilter")
        .with_attr("x", "0%")
        .with_attr("y", "0%")
        .with_attr("width", "100%")
        .with_attr("height", "100%")
        .with_attr("filterUnits", "objectBoundingBox");
    filter.push(
        SvgNode::new("feTurbulence")
            .with_attr("type", "fractalNoise")
            .with_attr("baseFrequency", "2")
            .with_attr("numOctaves", "5")
            .with_attr("stitchTiles", "stitch")
            .with_attr("result", "t1"),
    );
    filter.push(
        SvgNode::new("feColorMatrix")
            .with_attr("type", "matrix")
            .with_attr("values", "0 0 0 0 0, 0 0 0 0 0, 0 0 0 0 0, 0 0 0 -1.5 1.5")
            .with_attr("result", "t2"),
    );
    filter.push(
        SvgNode::new("feComposite")
            .with_attr("operator", "in")
            .with_attr("in2", "t2")
            .with_attr("in", "SourceGraphic")
            .with_attr("result", "SourceTextured"),
    );
    filter
}

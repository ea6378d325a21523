//! The sketch-engine seam.
//!
//! The interpreter hands fully-resolved draw requests to a [`SketchEngine`];
//! the default implementation drives `roughr` (a rough.js port) through its
//! renderer primitives, mirroring the upstream generator's call ordering so
//! the PRNG stream matches: the stroke opset is produced first (advancing
//! the in-options randomizer), fill opsets reuse the mutated options, and
//! fill layers are emitted before stroke layers.

use crate::geom::Point;
use crate::outdom::{SvgNode, fmt};
use crate::style::{FillKind, Rgba, StyleConfig};
use roughr::core::{OpSet, OpType, Options, OptionsBuilder};
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Fill,
    FillSketch,
    Stroke,
}

#[derive(Debug, Clone)]
pub struct SketchLayer {
    pub kind: LayerKind,
    pub d: String,
}

/// One sketched shape: an ordered list of path layers in paint order.
#[derive(Debug, Clone, Default)]
pub struct Sketch {
    pub layers: Vec<SketchLayer>,
}

pub trait SketchEngine {
    fn circle(&self, cx: f64, cy: f64, diameter: f64, style: &StyleConfig) -> Sketch;
    fn ellipse(&self, cx: f64, cy: f64, width: f64, height: f64, style: &StyleConfig) -> Sketch;
    fn rectangle(&self, x: f64, y: f64, width: f64, height: f64, style: &StyleConfig) -> Sketch;
    fn line(&self, x1: f64, y1: f64, x2: f64, y2: f64, style: &StyleConfig) -> Sketch;
    fn linear_path(&self, points: &[Point], style: &StyleConfig) -> Sketch;
    fn polygon(&self, points: &[Point], style: &StyleConfig) -> Sketch;
    fn path(&self, d: &str, style: &StyleConfig) -> Sketch;
}

/// `roughr`-backed sketcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoughSketcher;

impl SketchEngine for RoughSketcher {
    fn circle(&self, cx: f64, cy: f64, diameter: f64, style: &StyleConfig) -> Sketch {
        self.ellipse(cx, cy, diameter, diameter, style)
    }

    fn ellipse(&self, cx: f64, cy: f64, width: f64, height: f64, style: &StyleConfig) -> Sketch {
        let mut opts = base_options(style);
        let stroke_set = if style.has_stroke() {
            Some(roughr::renderer::ellipse::<f64>(cx, cy, width, height, &mut opts))
        } else {
            None
        };

        let mut layers = Vec::new();
        if style.has_fill() {
            let polys = vec![ellipse_points(cx, cy, width / 2.0, height / 2.0)];
            layers.push(fill_layer(style, polys, &mut opts));
        }
        if let Some(set) = stroke_set {
            layers.push(SketchLayer {
                kind: LayerKind::Stroke,
                d: ops_to_path_d(&set),
            });
        }
        Sketch { layers }
    }

    fn rectangle(&self, x: f64, y: f64, width: f64, height: f64, style: &StyleConfig) -> Sketch {
        let corners = [
            roughr::Point2D::new(x, y),
            roughr::Point2D::new(x + width, y),
            roughr::Point2D::new(x + width, y + height),
            roughr::Point2D::new(x, y + height),
        ];
        polygon_like(&corners, style)
    }

    fn line(&self, x1: f64, y1: f64, x2: f64, y2: f64, style: &StyleConfig) -> Sketch {
        if !style.has_stroke() {
            return Sketch::default();
        }
        let mut opts = base_options(style);
        let set = roughr::renderer::line::<f64>(x1, y1, x2, y2, &mut opts);
        Sketch {
            layers: vec![SketchLayer {
                kind: LayerKind::Stroke,
                d: ops_to_path_d(&set),
            }],
        }
    }

    fn linear_path(&self, points: &[Point], style: &StyleConfig) -> Sketch {
        if !style.has_stroke() || points.len() < 2 {
            return Sketch::default();
        }
        let pts: Vec<roughr::Point2D<f64, euclid::UnknownUnit>> = points
            .iter()
            .map(|p| roughr::Point2D::new(p.x, p.y))
            .collect();
        let mut opts = base_options(style);
        let set = roughr::renderer::linear_path::<f64>(&pts, false, &mut opts);
        Sketch {
            layers: vec![SketchLayer {
                kind: LayerKind::Stroke,
                d: ops_to_path_d(&set),
            }],
        }
    }

    fn polygon(&self, points: &[Point], style: &StyleConfig) -> Sketch {
        let pts: Vec<roughr::Point2D<f64, euclid::UnknownUnit>> = points
            .iter()
            .map(|p| roughr::Point2D::new(p.x, p.y))
            .collect();
        polygon_like(&pts, style)
    }

    fn path(&self, d: &str, style: &StyleConfig) -> Sketch {
        if d.trim().is_empty() {
            return Sketch::default();
        }
        let mut opts = base_options(style);
        let stroke_set = if style.has_stroke() {
            Some(roughr::renderer::svg_path::<f64>(d.to_string(), &mut opts))
        } else {
            None
        };

        let mut layers = Vec::new();
        if style.has_fill() {
            let distance = (1.0 + f64::from(opts.roughness.unwrap_or(1.0))) / 2.0;
            let sets = roughr::points_on_path::points_on_path::<f64>(
                d.to_string(),
                Some(1.0),
                Some(distance),
            );
            if style.fill_style == FillKind::Solid && sets.len() == 1 {
                // Single-subpath solid fill follows the upstream special
                // case: a second perturbed trace of the path with multi-
                // stroke disabled and subsequent move ops merged away.
                let mut fill_opts = opts.clone();
                fill_opts.disable_multi_stroke = Some(true);
                let base_roughness = fill_opts.roughness.unwrap_or(1.0);
                fill_opts.roughness = Some(if base_roughness != 0.0 {
                    base_roughness + 0.8
                } else {
                    0.0
                });
                let mut set = roughr::renderer::svg_path::<f64>(d.to_string(), &mut fill_opts);
                set.ops = set
                    .ops
                    .into_iter()
                    .enumerate()
                    .filter_map(|(idx, op)| {
                        if idx != 0 && op.op == OpType::Move {
                            None
                        } else {
                            Some(op)
                        }
                    })
                    .collect();
                layers.push(SketchLayer {
                    kind: LayerKind::Fill,
                    d: ops_to_path_d(&set),
                });
            } else if style.fill_style == FillKind::Solid {
                let set = roughr::renderer::solid_fill_polygon(&sets, &mut opts);
                layers.push(SketchLayer {
                    kind: LayerKind::Fill,
                    d: ops_to_path_d(&set),
                });
            } else {
                let set = roughr::renderer::pattern_fill_polygons(sets, &mut opts);
                layers.push(SketchLayer {
                    kind: LayerKind::FillSketch,
                    d: ops_to_path_d(&set),
                });
            }
        }
        if let Some(set) = stroke_set {
            layers.push(SketchLayer {
                kind: LayerKind::Stroke,
                d: ops_to_path_d(&set),
            });
        }
        Sketch { layers }
    }
}

fn polygon_like(pts: &[roughr::Point2D<f64, euclid::UnknownUnit>], style: &StyleConfig) -> Sketch {
    if pts.len() < 3 {
        return Sketch::default();
    }
    let mut opts = base_options(style);
    let stroke_set = if style.has_stroke() {
        Some(roughr::renderer::polygon::<f64>(pts, &mut opts))
    } else {
        None
    };

    let mut layers = Vec::new();
    if style.has_fill() {
        let polys = vec![pts.to_vec()];
        layers.push(fill_layer(style, polys, &mut opts));
    }
    if let Some(set) = stroke_set {
        layers.push(SketchLayer {
            kind: LayerKind::Stroke,
            d: ops_to_path_d(&set),
        });
    }
    Sketch { layers }
}

fn fill_layer(
    style: &StyleConfig,
    polys: Vec<Vec<roughr::Point2D<f64, euclid::UnknownUnit>>>,
    opts: &mut Options,
) -> SketchLayer {
    if style.fill_style == FillKind::Solid {
        let set = roughr::renderer::solid_fill_polygon(&polys, opts);
        SketchLayer {
            kind: LayerKind::Fill,
            d: ops_to_path_d(&set),
        }
    } else {
        let set = roughr::renderer::pattern_fill_polygons(polys, opts);
        SketchLayer {
            kind: LayerKind::FillSketch,
            d: ops_to_path_d(&set),
        }
    }
}

fn base_options(style: &StyleConfig) -> Options {
    let mut builder = OptionsBuilder::default();
    builder
        .seed(style.seed)
        .roughness(style.roughness as f32)
        .bowing(style.bowing as f32)
        .stroke_width(style.stroke_width as f32)
        .fill_style(map_fill_kind(style.fill_style))
        .disable_multi_stroke(style.disable_multi_stroke)
        .preserve_vertices(false);
    if let Some(stroke) = &style.stroke {
        builder.stroke(to_srgba(stroke));
    }
    if let Some(fill) = &style.fill {
        builder.fill(to_srgba(fill));
    }
    if let Some(pen) = &style.pen {
        builder
            .hachure_angle(pen.hachure_angle as f32)
            .hachure_gap(pen.hachure_gap as f32)
            .fill_weight(pen.fill_weight as f32);
    }
    if let Some(dash) = &style.dash {
        builder
            .stroke_line_dash(dash.clone())
            .stroke_line_dash_offset(style.dash_offset);
    }
    builder.build().unwrap_or_default()
}

fn map_fill_kind(kind: FillKind) -> roughr::core::FillStyle {
    match kind {
        FillKind::Solid => roughr::core::FillStyle::Solid,
        FillKind::Hachure => roughr::core::FillStyle::Hachure,
        FillKind::ZigZag => roughr::core::FillStyle::ZigZag,
        FillKind::CrossHatch => roughr::core::FillStyle::CrossHatch,
        FillKind::Dots => roughr::core::FillStyle::Dots,
        FillKind::Dashed => roughr::core::FillStyle::Dashed,
        FillKind::ZigZagLine => roughr::core::FillStyle::ZigZagLine,
    }
}

fn to_srgba(color: &Rgba) -> roughr::Srgba {
    roughr::Srgba::new(
        f32::from(color.r) / 255.0,
        f32::from(color.g) / 255.0,
        f32::from(color.b) / 255.0,
        color.a as f32,
    )
}

fn ellipse_points(cx: f64, cy: f64, rx: f64, ry: f64) -> Vec<roughr::Point2D<f64, euclid::UnknownUnit>> {
    let n = 32;
    (0..n)
        .map(|i| {
            let theta = std::f64::consts::TAU * f64::from(i) / f64::from(n);
            roughr::Point2D::new(cx + rx * theta.cos(), cy + ry * theta.sin())
        })
        .collect()
}

/// Rough.js emits path data via `opsToPath(...)` at full float precision;
/// quantizing here would visibly change the sketch, so these numbers are
/// written raw.
fn ops_to_path_d(opset: &OpSet<f64>) -> String {
    let mut out = String::new();
    for op in &opset.ops {
        match op.op {
            OpType::Move => {
                let _ = write!(&mut out, "M{} {} ", op.data[0], op.data[1]);
            }
            OpType::BCurveTo => {
                let _ = write!(
                    &mut out,
                    "C{} {}, {} {}, {} {} ",
                    op.data[0], op.data[1], op.data[2], op.data[3], op.data[4], op.data[5]
                );
            }
            OpType::LineTo => {
                let _ = write!(&mut out, "L{} {} ", op.data[0], op.data[1]);
            }
        }
    }
    out.trim_end().to_string()
}

/// Lowers a sketch into output `<path>` nodes with the layer-appropriate
/// paint attributes.
pub fn sketch_to_nodes(sketch: &Sketch, style: &StyleConfig) -> Vec<SvgNode> {
    let mut out = Vec::new();
    for layer in &sketch.layers {
        if layer.d.is_empty() {
            continue;
        }
        let mut node = SvgNode::new("path").with_attr("d", layer.d.clone());
        match layer.kind {
            LayerKind::Fill => {
                let fill = style
                    .fill
                    .as_ref()
                    .map_or_else(|| "none".to_string(), Rgba::to_css);
                node.set_attr("fill", fill);
                node.set_attr("stroke", "none");
            }
            LayerKind::FillSketch => {
                let stroke = style
                    .fill
                    .as_ref()
                    .map_or_else(|| "none".to_string(), Rgba::to_css);
                let weight = style
                    .pen
                    .map(|p| p.fill_weight)
                    .filter(|w| *w > 0.0)
                    .unwrap_or_else(|| (style.stroke_width / 2.0).max(0.5));
                node.set_attr("fill", "none");
                node.set_attr("stroke", stroke);
                node.set_attr("stroke-width", fmt(weight));
            }
            LayerKind::Stroke => {
                let stroke = style
                    .stroke
                    .as_ref()
                    .map_or_else(|| "none".to_string(), Rgba::to_css);
                node.set_attr("fill", "none");
                node.set_attr("stroke", stroke);
                node.set_attr("stroke-width", fmt(style.stroke_width));
                if let Some(dash) = &style.dash {
                    let list = dash.iter().map(|d| fmt(*d)).collect::<Vec<_>>().join(" ");
                    node.set_attr("stroke-dasharray", list);
                    if style.dash_offset != 0.0 {
                        node.set_attr("stroke-dashoffset", fmt(style.dash_offset));
                    }
                }
                if style.square_cap {
                    node.set_attr("stroke-linecap", "square");
                }
            }
        }
        out.push(node);
    }
    out
}

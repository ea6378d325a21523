//! Per-shape element handlers.
//!
//! Each handler resolves geometry and style, hands a draw request to the
//! sketch engine, and emits the sketched layers (plus any pattern proxy)
//! into the output body. Identity/translation-only transforms keep the
//! native sketch primitives; general transforms reconstruct the shape as a
//! cubic-Bezier path with every control point transformed individually.

use crate::error::{Error, Result};
use crate::geom::{self, Point, Transform};
use crate::outdom::{SvgNode, fmt};
use crate::path;
use crate::sketch::{Sketch, sketch_to_nodes};
use crate::style::StyleConfig;
use crate::text::TextStyle;
use crate::units::{self, ReferenceAxis};
use crate::walk::{Frame, MAX_REFERENCE_DEPTH, RenderPass, href_attribute};
use base64::Engine as _;
use rand::{RngCore as _, SeedableRng as _};
use std::rc::Rc;

impl<'a, 'i> RenderPass<'a, 'i> {
    pub(crate) fn handle_circle(
        &mut self,
        node: roxmltree::Node<'a, 'i>,
        frame: &Frame<'a, 'i>,
        t: &Transform,
    ) -> Result<()> {
        let uctx = self.unit_ctx(node, frame.viewport, &frame.ctx);
        let cx = self.length_attr(node, "cx", 0.0, &uctx)?;
        let cy = self.length_attr(node, "cy", 0.0, &uctx)?;
        let r = self.length_attr(node, "r", 0.0, &uctx)?;
        if r <= 0.0 {
            return Ok(());
        }

        let clip = self.resolve_clip(node, frame, t)?;
        let style = self.resolve_style(node, t, &frame.ctx, frame.viewport, Some((2.0 * r, 2.0 * r)))?;
        let proxy = path::ellipse_path_d(cx, cy, r, r, t);
        let sketch = if geom::is_cheap(t) {
            let c = t.transform_point(geom::point(cx, cy));
            self.sketcher.circle(c.x, c.y, 2.0 * r, &style)
        } else {
            self.sketcher.path(&proxy, &style)
        };
        self.emit_shape(sketch, &style, clip, Some(proxy), frame.depth);
        Ok(())
    }

    pub(crate) fn handle_ellipse(
        &mut self,
        node: roxmltree::Node<'a, 'i>,
        frame: &Frame<'a, 'i>,
        t: &Transform,
    ) -> Result<()> {
        let uctx = self.unit_ctx(node, frame.viewport, &frame.ctx);
        let cx = self.length_attr(node, "cx", 0.0, &uctx)?;
        let cy = self.length_attr(node, "cy", 0.0, &uctx)?;
        let rx = self.length_attr(node, "rx", 0.0, &uctx)?;
        let ry = self.length_attr(node, "ry", 0.0, &uctx)?;
        if rx <= 0.0 || ry <= 0.0 {
            return Ok(());
        }

        let clip = self.resolve_clip(node, frame, t)?;
        let style = self.resolve_style(node, t, &frame.ctx, frame.viewport, Some((2.0 * rx, 2.0 * ry)))?;
        let proxy = path::ellipse_path_d(cx, cy, rx, ry, t);
        let sketch = if geom::is_cheap(t) {
            let c = t.transform_point(geom::point(cx, cy));
            self.sketcher.ellipse(c.x, c.y, 2.0 * rx, 2.0 * ry, &style)
        } else {
            self.sketcher.path(&proxy, &style)
        };
        self.emit_shape(sketch, &style, clip, Some(proxy), frame.depth);
        Ok(())
    }

    pub(crate) fn handle_rect(
        &mut self,
        node: roxmltree::Node<'a, 'i>,
        frame: &Frame<'a, 'i>,
        t: &Transform,
    ) -> Result<()> {
        let uctx = self.unit_ctx(node, frame.viewport, &frame.ctx);
        let x = self.length_attr(node, "x", 0.0, &uctx)?;
        let y = self.length_attr(node, "y", 0.0, &uctx)?;
        let w = self.length_attr(node, "width", 0.0, &uctx)?;
        let h = self.length_attr(node, "height", 0.0, &uctx)?;
        if w <= 0.0 || h <= 0.0 {
            return Ok(());
        }

        // One radius given implies the other; both clamp to half the
        // shorter side.
        let rx_attr = node
            .attribute("rx")
            .map(str::trim)
            .filter(|v| *v != "auto")
            .map(|v| units::to_pixels("rx", v, ReferenceAxis::Horizontal, &uctx))
            .transpose()?;
        let ry_attr = node
            .attribute("ry")
            .map(str::trim)
            .filter(|v| *v != "auto")
            .map(|v| units::to_pixels("ry", v, ReferenceAxis::Vertical, &uctx))
            .transpose()?;
        let limit = w.min(h) / 2.0;
        let rx = rx_attr.or(ry_attr).unwrap_or(0.0).clamp(0.0, limit);
        let ry = ry_attr.or(rx_attr).unwrap_or(0.0).clamp(0.0, limit);

        let clip = self.resolve_clip(node, frame, t)?;
        let mut style = self.resolve_style(node, t, &frame.ctx, frame.viewport, Some((w, h)))?;
        let rounded = rx > 0.0 || ry > 0.0;
        let proxy = path::rect_path_d(x, y, w, h, rx, ry, t);
        let sketch = if !rounded && geom::is_cheap(t) {
            let origin = t.transform_point(geom::point(x, y));
            self.sketcher.rectangle(origin.x, origin.y, w, h, &style)
        } else {
            // Square line caps keep rounded joins inside the nominal bounds.
            style.square_cap = true;
            self.sketcher.path(&proxy, &style)
        };
        self.emit_shape(sketch, &style, clip, Some(proxy), frame.depth);
        Ok(())
    }

    pub(crate) fn handle_line(
        &mut self,
        node: roxmltree::Node<'a, 'i>,
        frame: &Frame<'a, 'i>,
        t: &Transform,
    ) -> Result<()> {
        let uctx = self.unit_ctx(node, frame.viewport, &frame.ctx);
        let x1 = self.length_attr(node, "x1", 0.0, &uctx)?;
        let y1 = self.length_attr(node, "y1", 0.0, &uctx)?;
        let x2 = self.length_attr(node, "x2", 0.0, &uctx)?;
        let y2 = self.length_attr(node, "y2", 0.0, &uctx)?;

        let clip = self.resolve_clip(node, frame, t)?;
        let style = self.resolve_style(
            node,
            t,
            &frame.ctx,
            frame.viewport,
            Some(((x2 - x1).abs(), (y2 - y1).abs())),
        )?;
        let a = t.transform_point(geom::point(x1, y1));
        let b = t.transform_point(geom::point(x2, y2));
        let sketch = self.sketcher.line(a.x, a.y, b.x, b.y, &style);
        self.emit_shape(sketch, &style, clip, None, frame.depth);
        self.place_markers(node, &[a, b], frame, &style)?;
        Ok(())
    }

    pub(crate) fn handle_poly(
        &mut self,
        node: roxmltree::Node<'a, 'i>,
        frame: &Frame<'a, 'i>,
        t: &Transform,
        close: bool,
    ) -> Result<()> {
        let points = parse_points(node.attribute("points").unwrap_or(""))?;
        if points.len() < 2 {
            return Ok(());
        }
        let transformed: Vec<Point> = points.iter().map(|p| t.transform_point(*p)).collect();
        let bbox = bbox_of(&points);

        let clip = self.resolve_clip(node, frame, t)?;
        let style = self.resolve_style(node, t, &frame.ctx, frame.viewport, Some(bbox))?;
        let proxy = path::polygon_path_d(&transformed);

        if close {
            if transformed.len() >= 3 {
                let sketch = self.sketcher.polygon(&transformed, &style);
                self.emit_shape(sketch, &style, clip, Some(proxy), frame.depth);
            }
            // The closing vertex joins the point list so marker-mid sees the
            // closing segment and terminal markers detect the closure.
            let mut marker_points = transformed.clone();
            marker_points.push(transformed[0]);
            self.place_markers(node, &marker_points, frame, &style)?;
        } else {
            // A polyline fills as a polygon in a separate pass before the
            // open stroked-line pass.
            let mut layers = Vec::new();
            if style.has_fill() || style.pattern_fill.is_some() {
                layers.extend(self.sketcher.polygon(&transformed, &style.fill_only()).layers);
            }
            layers.extend(
                self.sketcher
                    .linear_path(&transformed, &style.stroke_only())
                    .layers,
            );
            self.emit_shape(Sketch { layers }, &style, clip, Some(proxy), frame.depth);
            self.place_markers(node, &transformed, frame, &style)?;
        }
        Ok(())
    }

    pub(crate) fn handle_path(
        &mut self,
        node: roxmltree::Node<'a, 'i>,
        frame: &Frame<'a, 'i>,
        t: &Transform,
    ) -> Result<()> {
        let Some(d) = node.attribute("d").filter(|d| !d.trim().is_empty()) else {
            return Ok(());
        };
        let (normalized, vertices) = path::normalize(d, t)?;

        let clip = self.resolve_clip(node, frame, t)?;
        let bbox = if vertices.is_empty() {
            None
        } else {
            Some(bbox_of(&vertices))
        };
        let style = self.resolve_style(node, t, &frame.ctx, frame.viewport, bbox)?;
        let sketch = self.sketcher.path(&normalized, &style);
        self.emit_shape(sketch, &style, clip, Some(normalized), frame.depth);
        self.place_markers(node, &vertices, frame, &style)?;
        Ok(())
    }

    /// Text is re-hosted as a styled clone rather than pixel-redrawn. When a
    /// font-family override combines with an active clip, the clone's font
    /// size shrinks in 1px steps until its measured width fits the original
    /// bounding-box width.
    pub(crate) fn handle_text(
        &mut self,
        node: roxmltree::Node<'a, 'i>,
        frame: &Frame<'a, 'i>,
        t: &Transform,
    ) -> Result<()> {
        let ctx = &frame.ctx;
        let clip = self.resolve_clip(node, frame, t)?;
        let style = self.resolve_style(node, t, ctx, frame.viewport, None)?;

        let original_family = self.effective_attribute(node, "font-family", ctx);
        let font_weight = self.effective_attribute(node, "font-weight", ctx);
        let font_style = self.effective_attribute(node, "font-style", ctx);
        let mut font_size = self.font_size_px(node, ctx);
        let family = self
            .options
            .font_family
            .clone()
            .or_else(|| original_family.clone());

        if self.options.font_family.is_some() && clip.is_some() {
            let content = text_content(node);
            if !content.trim().is_empty() {
                let original = self.measurer.measure(
                    &content,
                    &TextStyle {
                        font_family: original_family.clone(),
                        font_size,
                        font_weight: font_weight.clone(),
                        font_style: font_style.clone(),
                    },
                );
                while font_size > 1.0 {
                    let measured = self.measurer.measure(
                        &content,
                        &TextStyle {
                            font_family: family.clone(),
                            font_size,
                            font_weight: font_weight.clone(),
                            font_style: font_style.clone(),
                        },
                    );
                    if measured.width <= original.width {
                        break;
                    }
                    font_size -= 1.0;
                }
            }
        }

        let mut out = SvgNode::new("text");
        for name in ["x", "y", "dx", "dy"] {
            if let Some(v) = node.attribute(name) {
                out.set_attr(name, v);
            }
        }
        for name in [
            "text-anchor",
            "dominant-baseline",
            "alignment-baseline",
            "baseline-shift",
            "letter-spacing",
            "word-spacing",
        ] {
            if let Some(v) = self.effective_attribute(node, name, ctx) {
                out.set_attr(name, v);
            }
        }
        if let Some(family) = family {
            out.set_attr("font-family", family);
        }
        out.set_attr("font-size", format!("{}px", fmt(font_size)));
        if let Some(weight) = font_weight {
            out.set_attr("font-weight", weight);
        }
        if let Some(font_style) = font_style {
            out.set_attr("font-style", font_style);
        }
        out.set_attr(
            "fill",
            style
                .fill
                .as_ref()
                .map_or_else(|| "none".to_string(), |c| c.to_css()),
        );
        // Text keeps only an explicitly declared stroke; the synthetic
        // shape outline would read as faux-bold here.
        let declared_stroke = self
            .effective_attribute(node, "stroke", ctx)
            .is_some_and(|v| v != "none");
        if declared_stroke {
            if let Some(stroke) = &style.stroke {
                out.set_attr("stroke", stroke.to_css());
                out.set_attr("stroke-width", fmt(style.stroke_width));
            }
        }
        out.set_attr("transform", geom::to_matrix_attr(t));
        clone_text_children(node, &mut out);

        self.emit_node(out, clip);
        Ok(())
    }

    pub(crate) fn handle_image(
        &mut self,
        node: roxmltree::Node<'a, 'i>,
        frame: &Frame<'a, 'i>,
        t: &Transform,
    ) -> Result<()> {
        let Some(href) = href_attribute(node) else {
            return Ok(());
        };
        if let Some(svg_text) = decode_svg_data_url(href) {
            return self.render_embedded_svg(&svg_text, node, frame, t);
        }

        // Raster images are placed as-is at the transformed location; they
        // are never re-sketched.
        let uctx = self.unit_ctx(node, frame.viewport, &frame.ctx);
        let clip = self.resolve_clip(node, frame, t)?;
        let mut image = SvgNode::new("image").with_attr("href", href);
        for name in ["x", "y", "width", "height"] {
            if node.attribute(name).is_some() {
                let v = self.length_attr(node, name, 0.0, &uctx)?;
                image.set_attr(name, fmt(v));
            }
        }
        image.set_attr("transform", geom::to_matrix_attr(t));
        if node.attribute("preserveAspectRatio").is_some() {
            image.set_attr(
                "preserveAspectRatio",
                node.attribute("preserveAspectRatio").unwrap_or_default(),
            );
        }
        self.emit_node(image, clip);
        Ok(())
    }

    /// Embedded SVG data URLs re-enter the traversal on the decoded
    /// document with a nested pass.
    fn render_embedded_svg(
        &mut self,
        text: &str,
        node: roxmltree::Node<'a, 'i>,
        frame: &Frame<'a, 'i>,
        t: &Transform,
    ) -> Result<()> {
        if frame.depth >= MAX_REFERENCE_DEPTH {
            return Err(Error::ReferenceDepth {
                reference: "embedded svg".to_string(),
            });
        }
        let uctx = self.unit_ctx(node, frame.viewport, &frame.ctx);
        let x = self.length_attr(node, "x", 0.0, &uctx)?;
        let y = self.length_attr(node, "y", 0.0, &uctx)?;
        let w = node
            .attribute("width")
            .map(|v| units::to_pixels("width", v, ReferenceAxis::Horizontal, &uctx))
            .transpose()?;
        let h = node
            .attribute("height")
            .map(|v| units::to_pixels("height", v, ReferenceAxis::Vertical, &uctx))
            .transpose()?;

        let doc = roxmltree::Document::parse(text)?;
        let mut pass = RenderPass::new(&doc, self.options, self.sketcher, self.measurer)?;
        self.embed_serial += 1;
        pass.clip_prefix = format!("{}-x{}", self.clip_prefix, self.embed_serial);
        pass.rng = rand::rngs::StdRng::seed_from_u64(self.rng.next_u64());
        let inner = pass.run(w, h)?;

        let transform = geom::combine(t, Some(&Transform::translation(x, y)));
        let mut g = SvgNode::new("g").with_attr("transform", geom::to_matrix_attr(&transform));
        for child in inner.children {
            g.push(child);
        }
        self.body.push(g);
        Ok(())
    }

    /// `<use>` expansion: translate by x/y, push a link onto the virtual
    /// inheritance chain and re-enter the traversal on the target. The
    /// frame-scoped chain restores itself on return and never leaks across
    /// sibling subtrees.
    pub(crate) fn handle_use(
        &mut self,
        node: roxmltree::Node<'a, 'i>,
        frame: &Frame<'a, 'i>,
        t: &Transform,
    ) -> Result<()> {
        let Some(id) = href_attribute(node).and_then(|h| h.strip_prefix('#')) else {
            return Ok(());
        };
        let Some(target) = self.id_index.get(id).copied() else {
            tracing::debug!(reference = %id, "use reference not found");
            return Ok(());
        };
        if frame.depth >= MAX_REFERENCE_DEPTH {
            return Err(Error::ReferenceDepth {
                reference: id.to_string(),
            });
        }

        let uctx = self.unit_ctx(node, frame.viewport, &frame.ctx);
        let x = self.length_attr(node, "x", 0.0, &uctx)?;
        let y = self.length_attr(node, "y", 0.0, &uctx)?;
        let width = node
            .attribute("width")
            .map(|v| units::to_pixels("width", v, ReferenceAxis::Horizontal, &uctx))
            .transpose()?;
        let height = node
            .attribute("height")
            .map(|v| units::to_pixels("height", v, ReferenceAxis::Vertical, &uctx))
            .transpose()?;

        let transform = geom::combine(t, Some(&Transform::translation(x, y)));
        let ctx = Some(Rc::new(crate::style::UseFrame {
            root: node,
            referenced: target,
            parent: frame.ctx.clone(),
        }));
        self.walk(vec![Frame {
            node: target,
            transform,
            viewport: frame.viewport,
            ctx,
            depth: frame.depth + 1,
            size_override: Some((width, height)),
        }]);
        Ok(())
    }

    /// Best-effort passthrough: the subtree is cloned untouched, with a
    /// small fixed set of text-related properties resolved onto the
    /// container.
    pub(crate) fn handle_foreign_object(
        &mut self,
        node: roxmltree::Node<'a, 'i>,
        frame: &Frame<'a, 'i>,
        t: &Transform,
    ) -> Result<()> {
        let mut copy = crate::walk::copy_subtree(node);
        let mut style_parts = Vec::new();
        for name in ["font-family", "font-size", "font-weight", "font-style", "color"] {
            if let Some(v) = self.effective_attribute(node, name, &frame.ctx) {
                style_parts.push(format!("{name}: {v}"));
            }
        }
        if !style_parts.is_empty() {
            copy.set_attr("style", style_parts.join("; "));
        }
        let mut g = SvgNode::new("g").with_attr("transform", geom::to_matrix_attr(t));
        g.push(copy);
        self.body.push(g);
        Ok(())
    }

    /// Emits a sketched shape: its layers, then any pattern proxy painted
    /// only with the pattern, wrapped in a clip group when a clip applies.
    pub(crate) fn emit_shape(
        &mut self,
        sketch: Sketch,
        style: &StyleConfig,
        clip: Option<String>,
        proxy_d: Option<String>,
        depth: u32,
    ) {
        let mut children = sketch_to_nodes(&sketch, style);
        if let (Some(pattern), Some(d)) = (&style.pattern_fill, &proxy_d) {
            self.copy_pattern_def(pattern, depth);
            children.push(
                SvgNode::new("path")
                    .with_attr("d", d.clone())
                    .with_attr("fill", format!("url(#{pattern})"))
                    .with_attr("stroke", "none"),
            );
        }
        if let (Some(pattern), Some(d)) = (&style.pattern_stroke, &proxy_d) {
            self.copy_pattern_def(pattern, depth);
            children.push(
                SvgNode::new("path")
                    .with_attr("d", d.clone())
                    .with_attr("fill", "none")
                    .with_attr("stroke", format!("url(#{pattern})"))
                    .with_attr("stroke-width", fmt(style.stroke_width)),
            );
        }
        if children.is_empty() {
            return;
        }
        match clip {
            Some(id) => {
                let mut g = SvgNode::new("g").with_attr("clip-path", format!("url(#{id})"));
                for child in children {
                    g.push(child);
                }
                self.body.push(g);
            }
            None => {
                for child in children {
                    self.body.push(child);
                }
            }
        }
    }

    fn emit_node(&mut self, node: SvgNode, clip: Option<String>) {
        match clip {
            Some(id) => {
                let mut g = SvgNode::new("g").with_attr("clip-path", format!("url(#{id})"));
                g.push(node);
                self.body.push(g);
            }
            None => self.body.push(node),
        }
    }
}

pub(crate) fn parse_points(value: &str) -> Result<Vec<Point>> {
    if value.trim().is_empty() {
        return Ok(Vec::new());
    }
    let points: Vec<Point> = svgtypes::PointsParser::from(value)
        .map(|(x, y)| geom::point(x, y))
        .collect();
    if points.is_empty() {
        return Err(Error::Points {
            value: value.to_string(),
        });
    }
    Ok(points)
}

fn bbox_of(points: &[Point]) -> (f64, f64) {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    ((max_x - min_x).max(0.0), (max_y - min_y).max(0.0))
}

fn text_content(node: roxmltree::Node<'_, '_>) -> String {
    let mut out = String::new();
    for descendant in node.descendants() {
        if descendant.is_text() {
            if let Some(t) = descendant.text() {
                out.push_str(t);
            }
        }
    }
    out
}

fn clone_text_children(node: roxmltree::Node<'_, '_>, out: &mut SvgNode) {
    for child in node.children() {
        if child.is_text() {
            if let Some(t) = child.text() {
                out.append_text(t);
            }
        } else if child.is_element() && child.tag_name().name() == "tspan" {
            let mut tspan = SvgNode::new("tspan");
            for attr in child.attributes() {
                tspan.set_attr(attr.name(), attr.value());
            }
            clone_text_children(child, &mut tspan);
            out.push(tspan);
        }
    }
}

fn decode_svg_data_url(href: &str) -> Option<String> {
    let rest = href.strip_prefix("data:image/svg+xml")?;
    let (meta, payload) = rest.split_once(',')?;
    if meta.contains("base64") {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim().as_bytes())
            .ok()?;
        String::from_utf8(bytes).ok()
    } else {
        Some(percent_decode(payload))
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(b) = hex {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_parse_both_separator_styles() {
        let a = parse_points("0,0 10,0 10,10").expect("parse ok");
        let b = parse_points("0 0 10 0 10 10").expect("parse ok");
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn svg_data_urls_decode() {
        let plain = decode_svg_data_url("data:image/svg+xml,%3Csvg%3E%3C/svg%3E");
        assert_eq!(plain.as_deref(), Some("<svg></svg>"));
        let b64 = decode_svg_data_url("data:image/svg+xml;base64,PHN2Zz48L3N2Zz4=");
        assert_eq!(b64.as_deref(), Some("<svg></svg>"));
        assert_eq!(decode_svg_data_url("data:image/png;base64,AAAA"), None);
    }
}

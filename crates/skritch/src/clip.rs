//! Clip flattening.
//!
//! `clip-path` references are rewritten into concrete output clip
//! primitives: the referenced `<clipPath>` subtree is walked depth-first and
//! every supported shape is re-emitted as a transformed `<path>` inside a
//! generated output `<clipPath>`. Missing references and empty results fail
//! open: the owning shape draws unclipped rather than vanishing behind an
//! accidental no-op clip.

use crate::error::Result;
use crate::geom::{self, Transform};
use crate::outdom::SvgNode;
use crate::path;
use crate::walk::{Frame, MAX_REFERENCE_DEPTH, RenderPass};

impl<'a, 'i> RenderPass<'a, 'i> {
    /// Resolves a declared `clip-path` on `node`, returning the generated
    /// output clip id to reference, if any.
    pub(crate) fn resolve_clip(
        &mut self,
        node: roxmltree::Node<'a, 'i>,
        frame: &Frame<'a, 'i>,
        transform: &Transform,
    ) -> Result<Option<String>> {
        let value = self
            .stylesheet
            .declared_value(node, "clip-path")
            .or_else(|| node.attribute("clip-path").map(str::to_string));
        match value {
            Some(value) if value.trim() != "none" => {
                Ok(self.apply_clip_path(&value, transform, frame))
            }
            _ => Ok(None),
        }
    }

    pub(crate) fn apply_clip_path(
        &mut self,
        value: &str,
        transform: &Transform,
        frame: &Frame<'a, 'i>,
    ) -> Option<String> {
        let id = crate::style::parse_url_reference(value)?;
        let Some(source) = self.id_index.get(&id).copied() else {
            tracing::debug!(reference = %id, "clip-path reference not found, drawing unclipped");
            return None;
        };
        if source.tag_name().name() != "clipPath" || frame.depth >= MAX_REFERENCE_DEPTH {
            return None;
        }

        let mut shapes: Vec<SvgNode> = Vec::new();
        let top: Vec<_> = source
            .children()
            .filter(roxmltree::Node::is_element)
            .collect();
        let mut stack: Vec<(roxmltree::Node<'a, 'i>, Transform)> =
            top.into_iter().rev().map(|c| (c, *transform)).collect();
        while let Some((child, parent_t)) = stack.pop() {
            let local = child
                .attribute("transform")
                .and_then(geom::parse_transform_list);
            let t = geom::combine(&parent_t, local.as_ref());
            let tag = child.tag_name().name();
            if tag == "g" {
                let grandchildren: Vec<_> =
                    child.children().filter(roxmltree::Node::is_element).collect();
                for gc in grandchildren.into_iter().rev() {
                    stack.push((gc, t));
                }
                continue;
            }
            match self.clip_shape_path(child, tag, &t, frame) {
                Ok(Some(d)) => shapes.push(SvgNode::new("path").with_attr("d", d)),
                Ok(None) => {
                    // Unsupported child kinds terminate this branch without
                    // being traced further.
                    tracing::debug!(kind = tag, "unsupported clip-path child");
                }
                Err(err) => {
                    tracing::debug!(kind = tag, error = %err, "skipping clip-path child");
                }
            }
        }

        if shapes.is_empty() {
            return None;
        }
        let out_id = self.next_clip_id();
        let mut clip = SvgNode::new("clipPath").with_attr("id", out_id.clone());
        for shape in shapes {
            clip.push(shape);
        }
        self.defs.push(clip);
        Some(out_id)
    }

    fn clip_shape_path(
        &self,
        node: roxmltree::Node<'a, 'i>,
        tag: &str,
        t: &Transform,
        frame: &Frame<'a, 'i>,
    ) -> Result<Option<String>> {
        let uctx = self.unit_ctx(node, frame.viewport, &None);
        let d = match tag {
            "rect" => {
                let x = self.length_attr(node, "x", 0.0, &uctx)?;
                let y = self.length_attr(node, "y", 0.0, &uctx)?;
                let w = self.length_attr(node, "width", 0.0, &uctx)?;
                let h = self.length_attr(node, "height", 0.0, &uctx)?;
                if w <= 0.0 || h <= 0.0 {
                    return Ok(None);
                }
                Some(path::rect_path_d(x, y, w, h, 0.0, 0.0, t))
            }
            "circle" => {
                let cx = self.length_attr(node, "cx", 0.0, &uctx)?;
                let cy = self.length_attr(node, "cy", 0.0, &uctx)?;
                let r = self.length_attr(node, "r", 0.0, &uctx)?;
                if r <= 0.0 {
                    return Ok(None);
                }
                Some(path::ellipse_path_d(cx, cy, r, r, t))
            }
            "ellipse" => {
                let cx = self.length_attr(node, "cx", 0.0, &uctx)?;
                let cy = self.length_attr(node, "cy", 0.0, &uctx)?;
                let rx = self.length_attr(node, "rx", 0.0, &uctx)?;
                let ry = self.length_attr(node, "ry", 0.0, &uctx)?;
                if rx <= 0.0 || ry <= 0.0 {
                    return Ok(None);
                }
                Some(path::ellipse_path_d(cx, cy, rx, ry, t))
            }
            "polygon" => {
                let points = crate::shapes::parse_points(node.attribute("points").unwrap_or(""))?;
                if points.len() < 3 {
                    return Ok(None);
                }
                let transformed: Vec<_> =
                    points.iter().map(|p| t.transform_point(*p)).collect();
                Some(path::polygon_path_d(&transformed))
            }
            // TODO: path-clip support (requires clip-rule handling in the
            // raster sink before normalized path data is safe to emit here).
            _ => None,
        };
        Ok(d)
    }
}

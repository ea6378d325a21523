//! Marker placement.
//!
//! Given the ordered vertex sequence of a line/polyline/polygon/normalized
//! path, places `marker-start`, interior `marker-mid` instances and
//! `marker-end`. The placement matrix is `translate(vertex) * rotate(angle)
//! * scale(factor)`; under the default `markerUnits="strokeWidth"` the
//! factor is the element's effective stroke width. Interior markers (and
//! terminal markers on a closed vertex ring) orient along the bisector of
//! the adjacent segment directions rather than a naive tangent, so closure
//! points do not show an orientation snap.

use crate::error::{Error, Result};
use crate::geom::{self, Point, Transform, Vector};
use crate::style::{StyleConfig, parse_url_reference};
use crate::walk::{Frame, MAX_REFERENCE_DEPTH, RenderPass, parse_view_box, push_children};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerPosition {
    Start,
    Mid,
    End,
}

impl<'a, 'i> RenderPass<'a, 'i> {
    pub(crate) fn place_markers(
        &mut self,
        node: roxmltree::Node<'a, 'i>,
        points: &[Point],
        frame: &Frame<'a, 'i>,
        style: &StyleConfig,
    ) -> Result<()> {
        if points.len() < 2 {
            return Ok(());
        }
        let closed = (points[0] - points[points.len() - 1]).square_length() < 1e-12;

        for (attr, position) in [
            ("marker-start", MarkerPosition::Start),
            ("marker-mid", MarkerPosition::Mid),
            ("marker-end", MarkerPosition::End),
        ] {
            let Some(value) = self.effective_attribute(node, attr, &frame.ctx) else {
                continue;
            };
            if value == "none" {
                continue;
            }
            let Some(id) = parse_url_reference(&value) else {
                continue;
            };
            let Some(marker) = self.id_index.get(&id).copied() else {
                tracing::debug!(reference = %id, "marker reference not found");
                continue;
            };
            if marker.tag_name().name() != "marker" {
                continue;
            }

            match position {
                MarkerPosition::Start => {
                    let angle = orient_angle(marker, points, closed, position, 0);
                    self.draw_marker_instance(marker, &id, points[0], angle, style, frame)?;
                }
                MarkerPosition::Mid => {
                    // Interior vertices only exist from three points on;
                    // first and last never receive a mid marker.
                    for i in 1..points.len().saturating_sub(1) {
                        let angle = orient_angle(marker, points, closed, position, i);
                        self.draw_marker_instance(marker, &id, points[i], angle, style, frame)?;
                    }
                }
                MarkerPosition::End => {
                    let last = points.len() - 1;
                    let angle = orient_angle(marker, points, closed, position, last);
                    self.draw_marker_instance(marker, &id, points[last], angle, style, frame)?;
                }
            }
        }
        Ok(())
    }

    fn draw_marker_instance(
        &mut self,
        marker: roxmltree::Node<'a, 'i>,
        id: &str,
        vertex: Point,
        angle: f64,
        style: &StyleConfig,
        frame: &Frame<'a, 'i>,
    ) -> Result<()> {
        if frame.depth >= MAX_REFERENCE_DEPTH {
            return Err(Error::ReferenceDepth {
                reference: id.to_string(),
            });
        }
        let scale = if marker.attribute("markerUnits") == Some("userSpaceOnUse") {
            1.0
        } else {
            style.stroke_width
        };
        if scale <= 0.0 {
            return Ok(());
        }

        let placement = Transform::scale(scale, scale)
            .then(&Transform::rotation(euclid::Angle::radians(angle)))
            .then(&Transform::translation(vertex.x, vertex.y));

        let uctx = self.unit_ctx(marker, frame.viewport, &None);
        let marker_w = self.length_attr(marker, "markerWidth", 3.0, &uctx)?;
        let marker_h = self.length_attr(marker, "markerHeight", 3.0, &uctx)?;
        let ref_x = self.length_attr(marker, "refX", 0.0, &uctx)?;
        let ref_y = self.length_attr(marker, "refY", 0.0, &uctx)?;
        if marker_w <= 0.0 || marker_h <= 0.0 {
            return Ok(());
        }

        let (content, viewport) = match parse_view_box(marker) {
            Some(vb) => {
                let vbt = geom::view_box_transform(
                    vb,
                    marker_w,
                    marker_h,
                    marker.attribute("preserveAspectRatio"),
                );
                // Ref-point translation applies after the viewBox transform.
                let ref_pt = vbt.transform_point(geom::point(ref_x, ref_y));
                (
                    vbt.then(&Transform::translation(-ref_pt.x, -ref_pt.y)),
                    vb,
                )
            }
            None => (
                Transform::translation(-ref_x, -ref_y),
                geom::rect(0.0, 0.0, marker_w, marker_h),
            ),
        };

        let transform = content.then(&placement);
        let mut stack = Vec::new();
        push_children(
            &mut stack,
            marker,
            transform,
            viewport,
            &None,
            frame.depth + 1,
        );
        self.walk(stack);
        Ok(())
    }
}

/// The marker's orientation for one placement, honoring `orient="auto"` and
/// `auto-start-reverse`.
fn orient_angle(
    marker: roxmltree::Node<'_, '_>,
    points: &[Point],
    closed: bool,
    position: MarkerPosition,
    index: usize,
) -> f64 {
    match marker.attribute("orient").map(str::trim).unwrap_or("0") {
        "auto" => auto_angle(points, closed, position, index),
        "auto-start-reverse" => {
            let auto = auto_angle(points, closed, position, index);
            if position == MarkerPosition::Start {
                auto + std::f64::consts::PI
            } else {
                auto
            }
        }
        fixed => fixed.parse::<f64>().unwrap_or(0.0).to_radians(),
    }
}

fn auto_angle(points: &[Point], closed: bool, position: MarkerPosition, index: usize) -> f64 {
    let n = points.len();
    match position {
        MarkerPosition::Start | MarkerPosition::End if closed && n >= 3 => {
            // At a closure point the incoming (closing) and outgoing (first)
            // segments meet; orient along their bisector.
            let incoming = direction(points[n - 2], points[n - 1]);
            let outgoing = direction(points[0], points[1]);
            bisector_angle(incoming, outgoing)
        }
        MarkerPosition::Start => vector_angle(direction(points[0], points[1])),
        MarkerPosition::End => vector_angle(direction(points[n - 2], points[n - 1])),
        MarkerPosition::Mid => {
            let incoming = direction(points[index - 1], points[index]);
            let outgoing = direction(points[index], points[index + 1]);
            bisector_angle(incoming, outgoing)
        }
    }
}

fn direction(a: Point, b: Point) -> Vector {
    let v = b - a;
    if v.square_length() < 1e-12 {
        geom::vector(0.0, 0.0)
    } else {
        v.normalize()
    }
}

fn vector_angle(v: Vector) -> f64 {
    if v.square_length() < 1e-12 {
        0.0
    } else {
        v.y.atan2(v.x)
    }
}

fn bisector_angle(incoming: Vector, outgoing: Vector) -> f64 {
    let sum = incoming + outgoing;
    if sum.square_length() < 1e-12 {
        // Opposed directions: fall back to the perpendicular of the
        // incoming segment.
        vector_angle(incoming) + std::f64::consts::FRAC_PI_2
    } else {
        sum.y.atan2(sum.x)
    }
}

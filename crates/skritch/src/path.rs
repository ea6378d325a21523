//! Path-data normalization.
//!
//! The sketch engine's path input is restricted to `M/L/C/Q/A/Z`: everything
//! is absolutized, `H`/`V` become general line-tos and `S`/`T` shorthands are
//! expanded to explicit `C`/`Q` (shorthand parameter counts are inconsistent
//! further downstream). Coordinates are transformed here so the sketch engine
//! only ever sees output-space geometry.

use crate::error::{Error, Result};
use crate::geom::{self, Point, Transform};
use crate::outdom::fmt;
use std::fmt::Write as _;
use svgtypes::PathSegment;

/// Cubic control-point factor approximating a quarter circle.
pub const KAPPA: f64 = 4.0 / 3.0 * (std::f64::consts::SQRT_2 - 1.0);

#[derive(Debug, Clone, Copy)]
enum Seg {
    Move(Point),
    Line(Point),
    Cubic(Point, Point, Point),
    Quad(Point, Point),
    Arc {
        rx: f64,
        ry: f64,
        rotation: f64,
        large_arc: bool,
        sweep: bool,
        end: Point,
    },
    Close,
}

/// Normalizes `d` and transforms it by `transform`; also returns the vertex
/// sequence for marker placement (a `Z` contributes the subpath start, so a
/// closed path ends on its first point).
pub fn normalize(d: &str, transform: &Transform) -> Result<(String, Vec<Point>)> {
    let segments = parse_absolute(d)?;
    if segments.is_empty() {
        return Err(Error::PathData {
            message: "empty path".to_string(),
        });
    }

    let (sx, sy) = geom::axis_scales(transform);
    let rotation_deg = geom::rotation(transform).to_degrees();
    let flips = transform.determinant() < 0.0;

    let mut out = String::new();
    let mut vertices = Vec::new();
    let mut subpath_start: Option<Point> = None;
    for seg in segments {
        match seg {
            Seg::Move(p) => {
                let p = transform.transform_point(p);
                let _ = write!(out, "M{} {} ", fmt(p.x), fmt(p.y));
                vertices.push(p);
                subpath_start = Some(p);
            }
            Seg::Line(p) => {
                let p = transform.transform_point(p);
                let _ = write!(out, "L{} {} ", fmt(p.x), fmt(p.y));
                vertices.push(p);
            }
            Seg::Cubic(c1, c2, p) => {
                let c1 = transform.transform_point(c1);
                let c2 = transform.transform_point(c2);
                let p = transform.transform_point(p);
                let _ = write!(
                    out,
                    "C{} {} {} {} {} {} ",
                    fmt(c1.x),
                    fmt(c1.y),
                    fmt(c2.x),
                    fmt(c2.y),
                    fmt(p.x),
                    fmt(p.y)
                );
                vertices.push(p);
            }
            Seg::Quad(c, p) => {
                let c = transform.transform_point(c);
                let p = transform.transform_point(p);
                let _ = write!(
                    out,
                    "Q{} {} {} {} ",
                    fmt(c.x),
                    fmt(c.y),
                    fmt(p.x),
                    fmt(p.y)
                );
                vertices.push(p);
            }
            Seg::Arc {
                rx,
                ry,
                rotation,
                large_arc,
                sweep,
                end,
            } => {
                let end = transform.transform_point(end);
                let sweep = if flips { !sweep } else { sweep };
                let _ = write!(
                    out,
                    "A{} {} {} {} {} {} {} ",
                    fmt(rx * sx),
                    fmt(ry * sy),
                    fmt(rotation + rotation_deg),
                    u8::from(large_arc),
                    u8::from(sweep),
                    fmt(end.x),
                    fmt(end.y)
                );
                vertices.push(end);
            }
            Seg::Close => {
                out.push_str("Z ");
                if let Some(start) = subpath_start {
                    vertices.push(start);
                }
            }
        }
    }

    let out = out.trim_end().to_string();
    validate_alphabet(&out)?;
    Ok((out, vertices))
}

/// Parses `d`, converting to absolute coordinates and expanding `H/V/S/T`.
fn parse_absolute(d: &str) -> Result<Vec<Seg>> {
    let mut out: Vec<Seg> = Vec::new();
    let mut cur = geom::point(0.0, 0.0);
    let mut start = geom::point(0.0, 0.0);
    // Reflection state for the smooth shorthands.
    let mut last_cubic_c2: Option<Point> = None;
    let mut last_quad_c1: Option<Point> = None;

    for segment in svgtypes::PathParser::from(d) {
        let segment = segment.map_err(|e| Error::PathData {
            message: e.to_string(),
        })?;
        let mut next_cubic_c2 = None;
        let mut next_quad_c1 = None;
        match segment {
            PathSegment::MoveTo { abs, x, y } => {
                let p = absolutize(cur, abs, x, y);
                out.push(Seg::Move(p));
                cur = p;
                start = p;
            }
            PathSegment::LineTo { abs, x, y } => {
                let p = absolutize(cur, abs, x, y);
                out.push(Seg::Line(p));
                cur = p;
            }
            PathSegment::HorizontalLineTo { abs, x } => {
                let x = if abs { x } else { cur.x + x };
                let p = geom::point(x, cur.y);
                out.push(Seg::Line(p));
                cur = p;
            }
            PathSegment::VerticalLineTo { abs, y } => {
                let y = if abs { y } else { cur.y + y };
                let p = geom::point(cur.x, y);
                out.push(Seg::Line(p));
                cur = p;
            }
            PathSegment::CurveTo {
                abs,
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => {
                let c1 = absolutize(cur, abs, x1, y1);
                let c2 = absolutize(cur, abs, x2, y2);
                let p = absolutize(cur, abs, x, y);
                out.push(Seg::Cubic(c1, c2, p));
                next_cubic_c2 = Some(c2);
                cur = p;
            }
            PathSegment::SmoothCurveTo { abs, x2, y2, x, y } => {
                let c1 = match last_cubic_c2 {
                    Some(prev) => geom::point(2.0 * cur.x - prev.x, 2.0 * cur.y - prev.y),
                    None => cur,
                };
                let c2 = absolutize(cur, abs, x2, y2);
                let p = absolutize(cur, abs, x, y);
                out.push(Seg::Cubic(c1, c2, p));
                next_cubic_c2 = Some(c2);
                cur = p;
            }
            PathSegment::Quadratic { abs, x1, y1, x, y } => {
                let c = absolutize(cur, abs, x1, y1);
                let p = absolutize(cur, abs, x, y);
                out.push(Seg::Quad(c, p));
                next_quad_c1 = Some(c);
                cur = p;
            }
            PathSegment::SmoothQuadratic { abs, x, y } => {
                let c = match last_quad_c1 {
                    Some(prev) => geom::point(2.0 * cur.x - prev.x, 2.0 * cur.y - prev.y),
                    None => cur,
                };
                let p = absolutize(cur, abs, x, y);
                out.push(Seg::Quad(c, p));
                next_quad_c1 = Some(c);
                cur = p;
            }
            PathSegment::EllipticalArc {
                abs,
                rx,
                ry,
                x_axis_rotation,
                large_arc,
                sweep,
                x,
                y,
            } => {
                let p = absolutize(cur, abs, x, y);
                out.push(Seg::Arc {
                    rx: rx.abs(),
                    ry: ry.abs(),
                    rotation: x_axis_rotation,
                    large_arc,
                    sweep,
                    end: p,
                });
                cur = p;
            }
            PathSegment::ClosePath { .. } => {
                out.push(Seg::Close);
                cur = start;
            }
        }
        last_cubic_c2 = next_cubic_c2;
        last_quad_c1 = next_quad_c1;
    }
    Ok(out)
}

fn absolutize(cur: Point, abs: bool, x: f64, y: f64) -> Point {
    if abs {
        geom::point(x, y)
    } else {
        geom::point(cur.x + x, cur.y + y)
    }
}

/// Normalized output may only contain `M/L/C/Q/A/Z` commands and finite
/// numbers; anything else would hand broken geometry to the sketch engine.
fn validate_alphabet(d: &str) -> Result<()> {
    let ok = d.chars().all(|c| {
        c.is_ascii_digit()
            || matches!(c, 'M' | 'L' | 'C' | 'Q' | 'A' | 'Z' | ' ' | '.' | '-' | '+' | 'e' | 'E')
    });
    if !ok || d.contains("NaN") || d.contains("inf") {
        return Err(Error::PathData {
            message: format!("unresolved tokens in normalized path '{d}'"),
        });
    }
    Ok(())
}

// Shape-to-path builders shared by the element handlers and the clip
// flattener. Every emitted control point is transformed individually, which
// keeps shear and rotation exact where a native primitive cannot express
// them.

pub fn ellipse_path_d(cx: f64, cy: f64, rx: f64, ry: f64, t: &Transform) -> String {
    let k = KAPPA;
    let p = |x: f64, y: f64| t.transform_point(geom::point(x, y));
    let mut out = String::new();
    let start = p(cx + rx, cy);
    let _ = write!(out, "M{} {} ", fmt(start.x), fmt(start.y));
    let quadrants = [
        [(cx + rx, cy + k * ry), (cx + k * rx, cy + ry), (cx, cy + ry)],
        [(cx - k * rx, cy + ry), (cx - rx, cy + k * ry), (cx - rx, cy)],
        [(cx - rx, cy - k * ry), (cx - k * rx, cy - ry), (cx, cy - ry)],
        [(cx + k * rx, cy - ry), (cx + rx, cy - k * ry), (cx + rx, cy)],
    ];
    for quadrant in quadrants {
        let [c1, c2, end] = quadrant.map(|(x, y)| p(x, y));
        let _ = write!(
            out,
            "C{} {} {} {} {} {} ",
            fmt(c1.x),
            fmt(c1.y),
            fmt(c2.x),
            fmt(c2.y),
            fmt(end.x),
            fmt(end.y)
        );
    }
    out.push('Z');
    out
}

pub fn rect_path_d(x: f64, y: f64, w: f64, h: f64, rx: f64, ry: f64, t: &Transform) -> String {
    let p = |px: f64, py: f64| t.transform_point(geom::point(px, py));
    let mut out = String::new();
    if rx <= 0.0 && ry <= 0.0 {
        let corners = [p(x, y), p(x + w, y), p(x + w, y + h), p(x, y + h)];
        let _ = write!(out, "M{} {} ", fmt(corners[0].x), fmt(corners[0].y));
        for corner in &corners[1..] {
            let _ = write!(out, "L{} {} ", fmt(corner.x), fmt(corner.y));
        }
        out.push('Z');
        return out;
    }

    let k = KAPPA;
    let line = |out: &mut String, pt: Point| {
        let _ = write!(out, "L{} {} ", fmt(pt.x), fmt(pt.y));
    };
    let cubic = |out: &mut String, c1: Point, c2: Point, end: Point| {
        let _ = write!(
            out,
            "C{} {} {} {} {} {} ",
            fmt(c1.x),
            fmt(c1.y),
            fmt(c2.x),
            fmt(c2.y),
            fmt(end.x),
            fmt(end.y)
        );
    };

    let start = p(x + rx, y);
    let _ = write!(out, "M{} {} ", fmt(start.x), fmt(start.y));
    line(&mut out, p(x + w - rx, y));
    cubic(
        &mut out,
        p(x + w - rx + k * rx, y),
        p(x + w, y + ry - k * ry),
        p(x + w, y + ry),
    );
    line(&mut out, p(x + w, y + h - ry));
    cubic(
        &mut out,
        p(x + w, y + h - ry + k * ry),
        p(x + w - rx + k * rx, y + h),
        p(x + w - rx, y + h),
    );
    line(&mut out, p(x + rx, y + h));
    cubic(
        &mut out,
        p(x + rx - k * rx, y + h),
        p(x, y + h - ry + k * ry),
        p(x, y + h - ry),
    );
    line(&mut out, p(x, y + ry));
    cubic(
        &mut out,
        p(x, y + ry - k * ry),
        p(x + rx - k * rx, y),
        p(x + rx, y),
    );
    out.push('Z');
    out
}

pub fn polygon_path_d(points: &[Point]) -> String {
    let mut out = String::new();
    for (i, pt) in points.iter().enumerate() {
        let cmd = if i == 0 { 'M' } else { 'L' };
        let _ = write!(out, "{cmd}{} {} ", fmt(pt.x), fmt(pt.y));
    }
    out.push('Z');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Transform;

    #[test]
    fn shorthands_are_expanded() {
        let t = Transform::identity();
        let (d, _) = normalize("M0 0 H10 V10 S20 20 30 10 T50 10", &t).expect("normalize ok");
        for forbidden in ["H", "V", "S", "T", "h", "v", "s", "t"] {
            assert!(
                !d.contains(forbidden),
                "normalized path must not contain {forbidden}: {d}"
            );
        }
        assert!(d.starts_with("M0 0 L10 0 L10 10 C"), "got {d}");
    }

    #[test]
    fn relative_commands_become_absolute() {
        let t = Transform::identity();
        let (d, points) = normalize("m10 10 l5 0 l0 5", &t).expect("normalize ok");
        assert_eq!(d, "M10 10 L15 10 L15 15");
        assert_eq!(points.len(), 3);
        assert_eq!(points[2], crate::geom::point(15.0, 15.0));
    }

    #[test]
    fn close_contributes_subpath_start_vertex() {
        let t = Transform::identity();
        let (_, points) = normalize("M0 0 L10 0 L5 8 Z", &t).expect("normalize ok");
        assert_eq!(points.first(), points.last());
        assert_eq!(points.len(), 4);
    }

    #[test]
    fn malformed_path_is_rejected() {
        let t = Transform::identity();
        assert!(normalize("M10 zebra", &t).is_err());
        assert!(normalize("", &t).is_err());
    }
}

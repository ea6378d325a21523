//! Geometry primitives and the affine transform composer.
//!
//! SVG transform lists compose left to right (`transform="A B"` applies `B`
//! first), which in euclid's row-vector convention is `B.then(&A)`. All
//! cumulative transforms in the walker are built through [`combine`] so that
//! convention lives in exactly one place.

use svgtypes::TransformListToken;

pub type Unit = euclid::UnknownUnit;

pub type Point = euclid::Point2D<f64, Unit>;
pub type Vector = euclid::Vector2D<f64, Unit>;
pub type Size = euclid::Size2D<f64, Unit>;
pub type Rect = euclid::Rect<f64, Unit>;
pub type Transform = euclid::Transform2D<f64, Unit, Unit>;

pub fn point(x: f64, y: f64) -> Point {
    euclid::point2(x, y)
}

pub fn vector(x: f64, y: f64) -> Vector {
    euclid::vec2(x, y)
}

pub fn rect(x: f64, y: f64, w: f64, h: f64) -> Rect {
    Rect::new(euclid::point2(x, y), euclid::size2(w, h))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformClass {
    Identity,
    TranslationOnly,
    General,
}

/// `parent` unchanged when there is no local transform, otherwise the local
/// transform followed by the parent one (local space -> parent space ->
/// global space).
pub fn combine(parent: &Transform, local: Option<&Transform>) -> Transform {
    match local {
        None => *parent,
        Some(local) => local.then(parent),
    }
}

pub fn classify(t: &Transform) -> TransformClass {
    let linear_identity = t.m11 == 1.0 && t.m12 == 0.0 && t.m21 == 0.0 && t.m22 == 1.0;
    if !linear_identity {
        TransformClass::General
    } else if t.m31 == 0.0 && t.m32 == 0.0 {
        TransformClass::Identity
    } else {
        TransformClass::TranslationOnly
    }
}

pub fn is_identity(t: &Transform) -> bool {
    classify(t) == TransformClass::Identity
}

/// Identity or translation-only transforms let handlers keep native sketch
/// primitives; anything else forces a path reconstruction.
pub fn is_cheap(t: &Transform) -> bool {
    classify(t) != TransformClass::General
}

/// Area-preserving stroke scale factor: the geometric mean of the two axis
/// scales, so anisotropic transforms do not disproportionately warp stroke
/// thickness.
pub fn stroke_scale(t: &Transform) -> f64 {
    t.determinant().abs().sqrt()
}

/// Rotation of the transform's x axis, in radians.
pub fn rotation(t: &Transform) -> f64 {
    t.m12.atan2(t.m11)
}

/// Per-axis scale factors (lengths of the transformed basis vectors).
pub fn axis_scales(t: &Transform) -> (f64, f64) {
    (t.m11.hypot(t.m12), t.m21.hypot(t.m22))
}

/// Parses an SVG `transform` attribute value into a single matrix.
///
/// Returns `None` for an empty or unparseable list; the caller treats that
/// as "no local transform".
pub fn parse_transform_list(value: &str) -> Option<Transform> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let mut acc = Transform::identity();
    let mut any = false;
    for token in svgtypes::TransformListParser::from(value) {
        let token = token.ok()?;
        let t = match token {
            TransformListToken::Matrix { a, b, c, d, e, f } => Transform::new(a, b, c, d, e, f),
            TransformListToken::Translate { tx, ty } => Transform::translation(tx, ty),
            TransformListToken::Scale { sx, sy } => Transform::scale(sx, sy),
            TransformListToken::Rotate { angle } => {
                Transform::rotation(euclid::Angle::radians(angle.to_radians()))
            }
            TransformListToken::SkewX { angle } => {
                Transform::new(1.0, 0.0, angle.to_radians().tan(), 1.0, 0.0, 0.0)
            }
            TransformListToken::SkewY { angle } => {
                Transform::new(1.0, angle.to_radians().tan(), 0.0, 1.0, 0.0, 0.0)
            }
        };
        acc = t.then(&acc);
        any = true;
    }
    if any { Some(acc) } else { None }
}

/// Maps a viewBox rectangle onto a `width` x `height` viewport.
///
/// Uniform scale with centering by default (`xMidYMid meet`); non-uniform
/// only for `preserveAspectRatio="none"`. Other alignment keywords fall back
/// to the centered default.
pub fn view_box_transform(
    view_box: Rect,
    width: f64,
    height: f64,
    preserve_aspect_ratio: Option<&str>,
) -> Transform {
    let vw = view_box.size.width;
    let vh = view_box.size.height;
    if vw <= 0.0 || vh <= 0.0 || width <= 0.0 || height <= 0.0 {
        return Transform::identity();
    }

    let none = preserve_aspect_ratio
        .and_then(|s| s.parse::<svgtypes::AspectRatio>().ok())
        .is_some_and(|ar| ar.align == svgtypes::Align::None);

    let origin = Transform::translation(-view_box.origin.x, -view_box.origin.y);
    if none {
        return origin.then(&Transform::scale(width / vw, height / vh));
    }

    let s = (width / vw).min(height / vh);
    let tx = (width - vw * s) / 2.0;
    let ty = (height - vh * s) / 2.0;
    origin
        .then(&Transform::scale(s, s))
        .then(&Transform::translation(tx, ty))
}

/// Serializes a transform as an SVG `matrix(...)` attribute value.
pub fn to_matrix_attr(t: &Transform) -> String {
    format!(
        "matrix({} {} {} {} {} {})",
        crate::outdom::fmt(t.m11),
        crate::outdom::fmt(t.m12),
        crate::outdom::fmt(t.m21),
        crate::outdom::fmt(t.m22),
        crate::outdom::fmt(t.m31),
        crate::outdom::fmt(t.m32),
    )
}

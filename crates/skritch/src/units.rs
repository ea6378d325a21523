//! CSS-style dimension resolution.
//!
//! The grammar is deliberately closed: a signed float followed by a known
//! unit token. Unknown tokens are a hard failure; there is no safe fallback
//! pixel value for a dimension we cannot interpret.

use crate::error::{Error, Result};
use crate::geom::{Rect, Size};

const DPI: f64 = 96.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthUnit {
    None,
    Px,
    In,
    Cm,
    Mm,
    Pt,
    Pc,
    Percent,
    Em,
    Ex,
    Rem,
    Ch,
    Vw,
    Vh,
    Vmin,
    Vmax,
}

/// Which dimension of the reference box a percentage resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceAxis {
    Horizontal,
    Vertical,
    Diagonal,
}

/// Maps an attribute name to its percentage reference axis: `x`-like
/// attributes scale by viewport width, `y`-like by height, everything else
/// (stroke-width, radii on the diagonal) by the normalized diagonal.
pub fn axis_for_attribute(name: &str) -> ReferenceAxis {
    match name {
        "x" | "x1" | "x2" | "cx" | "dx" | "width" | "rx" | "markerWidth" | "refX" => {
            ReferenceAxis::Horizontal
        }
        "y" | "y1" | "y2" | "cy" | "dy" | "height" | "ry" | "markerHeight" | "refY" => {
            ReferenceAxis::Vertical
        }
        _ => ReferenceAxis::Diagonal,
    }
}

/// Everything a relative unit can resolve against.
#[derive(Debug, Clone, Copy)]
pub struct UnitContext {
    /// Current viewport rectangle (`%` reference).
    pub viewport: Rect,
    /// Real rendering viewport (`vw`/`vh`/`vmin`/`vmax` reference).
    pub canvas: Size,
    /// Effective font size of the element (`em`, and `ex` x-height base).
    pub font_size: f64,
    /// Document root font size (`rem`).
    pub root_font_size: f64,
    /// Measured advance of the zero glyph (`ch`).
    pub zero_glyph_advance: f64,
    /// Measured x-height (`ex`).
    pub x_height: f64,
}

pub fn parse_dimension(attribute: &str, value: &str) -> Result<(f64, LengthUnit)> {
    let trimmed = value.trim();
    let err = || Error::Dimension {
        attribute: attribute.to_string(),
        value: value.to_string(),
    };

    let (end, number) = split_number(trimmed).ok_or_else(err)?;
    let unit = match trimmed[end..].trim() {
        "" => LengthUnit::None,
        "px" => LengthUnit::Px,
        "in" => LengthUnit::In,
        "cm" => LengthUnit::Cm,
        "mm" => LengthUnit::Mm,
        "pt" => LengthUnit::Pt,
        "pc" => LengthUnit::Pc,
        "%" => LengthUnit::Percent,
        "em" => LengthUnit::Em,
        "ex" => LengthUnit::Ex,
        "rem" => LengthUnit::Rem,
        "ch" => LengthUnit::Ch,
        "vw" => LengthUnit::Vw,
        "vh" => LengthUnit::Vh,
        "vmin" => LengthUnit::Vmin,
        "vmax" => LengthUnit::Vmax,
        _ => return Err(err()),
    };
    Ok((number, unit))
}

/// Resolves a dimension string to pixels against the given references.
pub fn to_pixels(attribute: &str, value: &str, axis: ReferenceAxis, ctx: &UnitContext) -> Result<f64> {
    let (n, unit) = parse_dimension(attribute, value)?;
    let px = match unit {
        LengthUnit::None | LengthUnit::Px => n,
        LengthUnit::In => n * DPI,
        LengthUnit::Cm => n * DPI / 2.54,
        LengthUnit::Mm => n * DPI / 25.4,
        LengthUnit::Pt => n * DPI / 72.0,
        LengthUnit::Pc => n * DPI / 6.0,
        LengthUnit::Percent => {
            let w = ctx.viewport.size.width;
            let h = ctx.viewport.size.height;
            let reference = match axis {
                ReferenceAxis::Horizontal => w,
                ReferenceAxis::Vertical => h,
                ReferenceAxis::Diagonal => (w * w + h * h).sqrt() / std::f64::consts::SQRT_2,
            };
            n / 100.0 * reference
        }
        LengthUnit::Vw => n / 100.0 * ctx.canvas.width,
        LengthUnit::Vh => n / 100.0 * ctx.canvas.height,
        LengthUnit::Vmin => n / 100.0 * ctx.canvas.width.min(ctx.canvas.height),
        LengthUnit::Vmax => n / 100.0 * ctx.canvas.width.max(ctx.canvas.height),
        LengthUnit::Em => n * ctx.font_size,
        LengthUnit::Ex => n * ctx.x_height,
        LengthUnit::Rem => n * ctx.root_font_size,
        LengthUnit::Ch => n * ctx.zero_glyph_advance,
    };
    Ok(px)
}

/// Longest numeric prefix of `s` (sign, decimals, optional exponent).
///
/// The exponent marker is only consumed when followed by a digit, so `2em`
/// splits as `2` + `em` rather than choking on a bogus exponent.
fn split_number(s: &str) -> Option<(usize, f64)> {
    let b = s.as_bytes();
    let mut i = 0;
    if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
        i += 1;
    }
    let mut saw_digit = false;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
        saw_digit = true;
    }
    if i < b.len() && b[i] == b'.' {
        i += 1;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
            saw_digit = true;
        }
    }
    if !saw_digit {
        return None;
    }
    if i < b.len() && (b[i] == b'e' || b[i] == b'E') {
        let mut j = i + 1;
        if j < b.len() && (b[j] == b'+' || b[j] == b'-') {
            j += 1;
        }
        if j < b.len() && b[j].is_ascii_digit() {
            while j < b.len() && b[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    s[..i].parse::<f64>().ok().map(|v| (i, v))
}

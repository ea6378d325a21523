//! Text measurement.
//!
//! The converter is headless, so text width checks (font shrinking under an
//! active clip, `ch`/`ex` unit resolution) go through a [`TextMeasurer`]
//! instead of a rendering surface. The default implementation is a
//! deterministic character-count model; callers with real font metrics can
//! plug in their own.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_family: Option<String>,
    pub font_size: f64,
    pub font_weight: Option<String>,
    pub font_style: Option<String>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: None,
            font_size: 16.0,
            font_weight: None,
            font_style: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TextMetrics {
    pub width: f64,
    pub height: f64,
}

pub trait TextMeasurer {
    fn measure(&self, text: &str, style: &TextStyle) -> TextMetrics;

    /// Advance width of the `0` glyph, the `ch` unit reference.
    fn zero_glyph_advance(&self, font_size: f64) -> f64 {
        font_size * 0.5
    }

    /// The `ex` unit reference.
    fn x_height(&self, font_size: f64) -> f64 {
        font_size * 0.5
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeterministicTextMeasurer {
    pub char_width_factor: f64,
    pub line_height_factor: f64,
}

impl TextMeasurer for DeterministicTextMeasurer {
    fn measure(&self, text: &str, style: &TextStyle) -> TextMetrics {
        let char_width_factor = if self.char_width_factor == 0.0 {
            0.6
        } else {
            self.char_width_factor
        };
        let line_height_factor = if self.line_height_factor == 0.0 {
            1.2
        } else {
            self.line_height_factor
        };

        let font_size = style.font_size.max(1.0);
        let mut max_chars = 0usize;
        let mut lines = 0usize;
        for line in text.split('\n') {
            max_chars = max_chars.max(line.chars().count());
            lines += 1;
        }

        TextMetrics {
            width: max_chars as f64 * font_size * char_width_factor,
            height: lines.max(1) as f64 * font_size * line_height_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_scales_with_font_size() {
        let m = DeterministicTextMeasurer::default();
        let small = m.measure("hello", &TextStyle { font_size: 10.0, ..Default::default() });
        let large = m.measure("hello", &TextStyle { font_size: 20.0, ..Default::default() });
        assert!(large.width > small.width, "larger font must measure wider");
    }

    #[test]
    fn widest_line_wins() {
        let m = DeterministicTextMeasurer::default();
        let a = m.measure("abc\nabcdef", &TextStyle::default());
        let b = m.measure("abcdef", &TextStyle::default());
        assert_eq!(a.width, b.width);
        assert!(a.height > b.height);
    }
}

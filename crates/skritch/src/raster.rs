//! Raster output (feature `raster`): rasterizes the produced SVG with
//! pure-Rust `usvg`/`resvg` and encodes PNG or JPG.

use crate::{Converter, Options};

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error(transparent)]
    Convert(#[from] crate::Error),
    #[error("failed to parse SVG")]
    SvgParse,
    #[error("failed to allocate pixmap for raster rendering")]
    PixmapAlloc,
    #[error("invalid background color '{0}'")]
    Background(String),
    #[error("failed to encode PNG")]
    PngEncode,
    #[error("JPG rendering requires an opaque background color (e.g. white)")]
    JpegOpaqueBackgroundRequired,
    #[error("failed to encode JPG")]
    JpegEncode,
}

pub type Result<T> = std::result::Result<T, RasterError>;

#[derive(Debug, Clone)]
pub struct RasterOptions {
    pub scale: f32,
    pub background: Option<String>,
    pub jpeg_quality: u8,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            background: None,
            jpeg_quality: 90,
        }
    }
}

/// Sketches `svg` with `options` and encodes the result as PNG.
pub fn convert_png(svg: &str, options: &Options, raster: &RasterOptions) -> Result<Vec<u8>> {
    let converter = Converter::new(options.clone())?;
    let sketched = converter.convert_str(svg)?;
    svg_to_png(&sketched, raster)
}

/// Sketches `svg` with `options` and encodes the result as JPG.
pub fn convert_jpeg(svg: &str, options: &Options, raster: &RasterOptions) -> Result<Vec<u8>> {
    let converter = Converter::new(options.clone())?;
    let sketched = converter.convert_str(svg)?;
    svg_to_jpeg(&sketched, raster)
}

pub fn svg_to_png(svg: &str, options: &RasterOptions) -> Result<Vec<u8>> {
    let pixmap = svg_to_pixmap(svg, options.scale, options.background.as_deref())?;
    pixmap.encode_png().map_err(|_| RasterError::PngEncode)
}

pub fn svg_to_jpeg(svg: &str, options: &RasterOptions) -> Result<Vec<u8>> {
    let bg = options.background.as_deref().unwrap_or("white");
    let Some(color) = parse_tiny_skia_color(bg) else {
        return Err(RasterError::Background(bg.to_string()));
    };
    if color.alpha() != 1.0 {
        return Err(RasterError::JpegOpaqueBackgroundRequired);
    }

    let pixmap = svg_to_pixmap(svg, options.scale, Some(bg))?;
    let (w, h) = (pixmap.width(), pixmap.height());

    // tiny-skia renders into an RGBA8 buffer. The destination is opaque (a
    // solid background is always filled for JPG), so alpha can be dropped.
    let rgba = pixmap.data();
    let mut rgb = vec![0u8; (w as usize) * (h as usize) * 3];
    for (src, dst) in rgba.chunks_exact(4).zip(rgb.chunks_exact_mut(3)) {
        dst[0] = src[0];
        dst[1] = src[1];
        dst[2] = src[2];
    }

    let mut out = Vec::new();
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, options.jpeg_quality);
    encoder
        .encode(&rgb, w, h, image::ExtendedColorType::Rgb8)
        .map_err(|_| RasterError::JpegEncode)?;
    Ok(out)
}

fn svg_to_pixmap(svg: &str, scale: f32, background: Option<&str>) -> Result<tiny_skia::Pixmap> {
    let mut opt = usvg::Options::default();
    // Re-hosted text keeps real font families; best-effort system fonts.
    opt.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_str(svg, &opt).map_err(|_| RasterError::SvgParse)?;
    let size = tree.size();
    let w = (size.width() * scale).ceil().max(1.0) as u32;
    let h = (size.height() * scale).ceil().max(1.0) as u32;

    let mut pixmap = tiny_skia::Pixmap::new(w, h).ok_or(RasterError::PixmapAlloc)?;
    if let Some(bg) = background {
        let color =
            parse_tiny_skia_color(bg).ok_or_else(|| RasterError::Background(bg.to_string()))?;
        pixmap.fill(color);
    }
    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );
    Ok(pixmap)
}

fn parse_tiny_skia_color(s: &str) -> Option<tiny_skia::Color> {
    let c = s.trim().parse::<svgtypes::Color>().ok()?;
    tiny_skia::Color::from_rgba(
        f32::from(c.red) / 255.0,
        f32::from(c.green) / 255.0,
        f32::from(c.blue) / 255.0,
        f32::from(c.alpha) / 255.0,
    )
}

use std::path::Path;

use ab_glyph::{Font, FontArc, GlyphId, PxScale, ScaleFont};
use image::{GrayImage, Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use rand::{Rng, rngs::SmallRng};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot read font {path}: {source}")]
    FontRead {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse font {path}")]
    FontParse { path: String },
    #[error("text has no visible extent with font {path}")]
    EmptyLayout { path: String },
}

#[derive(Debug, Error)]
#[error("invalid color spec {0:?}, expected #RRGGBB or #RRGGBB,#RRGGBB")]
pub struct ParseColorError(pub String);

/// A color, or a per-channel range to draw one from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorSpec {
    lo: [u8; 3],
    hi: [u8; 3],
}

impl ColorSpec {
    pub const fn solid(r: u8, g: u8, b: u8) -> Self {
        Self {
            lo: [r, g, b],
            hi: [r, g, b],
        }
    }

    pub fn pick(&self, rng: &mut SmallRng) -> Rgba<u8> {
        let mut px = [0u8, 0, 0, 255];
        for c in 0..3 {
            let (a, b) = (self.lo[c].min(self.hi[c]), self.lo[c].max(self.hi[c]));
            px[c] = if a == b { a } else { rng.random_range(a..=b) };
        }
        Rgba(px)
    }
}

impl std::str::FromStr for ColorSpec {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseColorError(s.to_string());
        let mut parts = s.split(',');
        let lo = parse_hex(parts.next().ok_or_else(err)?).ok_or_else(err)?;
        let hi = match parts.next() {
            Some(part) => parse_hex(part).ok_or_else(err)?,
            None => lo,
        };
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Self { lo, hi })
    }
}

fn parse_hex(s: &str) -> Option<[u8; 3]> {
    let hex = s.trim().strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Background {
    Plain(ColorSpec),
    Noise,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageMode {
    Rgb,
    Gray,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Margins {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl Margins {
    pub const fn uniform(px: u32) -> Self {
        Self {
            top: px,
            right: px,
            bottom: px,
            left: px,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RenderStyle {
    pub font_size: u32,
    pub text_color: ColorSpec,
    pub background: Background,
    pub margins: Margins,
    pub character_spacing: u32,
    pub space_width: f32,
    pub skew_angle: i32,
    pub random_skew: bool,
    pub blur: f32,
    pub random_blur: bool,
    pub stroke_width: u32,
    pub stroke_fill: ColorSpec,
    pub image_mode: ImageMode,
    pub output_mask: bool,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            font_size: 32,
            text_color: ColorSpec::solid(0x28, 0x28, 0x28),
            background: Background::Plain(ColorSpec::solid(0xFF, 0xFF, 0xFF)),
            margins: Margins::uniform(5),
            character_spacing: 0,
            space_width: 1.0,
            skew_angle: 0,
            random_skew: false,
            blur: 0.0,
            random_blur: false,
            stroke_width: 0,
            stroke_fill: ColorSpec::solid(0x28, 0x28, 0x28),
            image_mode: ImageMode::Rgb,
            output_mask: false,
        }
    }
}

impl RenderStyle {
    /// Fixed style used for font trial renders: large, near-black on white,
    /// no skew, no noise, no blur.
    pub fn reference() -> Self {
        Self {
            font_size: 64,
            text_color: ColorSpec::solid(0x00, 0x00, 0x10),
            ..Self::default()
        }
    }
}

pub struct Rendered {
    pub image: RgbaImage,
    pub mask: Option<GrayImage>,
}

impl Rendered {
    /// The top-left corner is inside the margin, so it always holds a
    /// background pixel.
    pub fn is_blank(&self) -> bool {
        let reference = *self.image.get_pixel(0, 0);
        self.image.pixels().all(|p| *p == reference)
    }
}

pub fn render(
    text: &str,
    font_path: &Path,
    style: &RenderStyle,
    rng: &mut SmallRng,
) -> Result<Rendered, RenderError> {
    let data = std::fs::read(font_path).map_err(|source| RenderError::FontRead {
        path: font_path.display().to_string(),
        source,
    })?;
    let font = FontArc::try_from_vec(data).map_err(|_| RenderError::FontParse {
        path: font_path.display().to_string(),
    })?;

    let scale = PxScale::from(style.font_size as f32);
    let scaled = font.as_scaled(scale);

    // One layout pass: x offset per char, total extent.
    let mut placed: Vec<(char, f32)> = Vec::new();
    let mut pen = 0.0f32;
    let mut prev: Option<GlyphId> = None;
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(p) = prev {
            pen += scaled.kern(p, id);
        }
        placed.push((ch, pen));
        pen += if ch == ' ' {
            scaled.h_advance(id) * style.space_width
        } else {
            scaled.h_advance(id) + style.character_spacing as f32
        };
        prev = Some(id);
    }
    let text_w = pen.ceil().max(0.0) as u32;
    let text_h = scaled.height().ceil().max(0.0) as u32;
    if placed.is_empty() || text_w == 0 || text_h == 0 {
        return Err(RenderError::EmptyLayout {
            path: font_path.display().to_string(),
        });
    }

    let pad = style.stroke_width;
    let width = text_w + style.margins.left + style.margins.right + 2 * pad;
    let height = text_h + style.margins.top + style.margins.bottom + 2 * pad;

    let background = match &style.background {
        Background::Plain(spec) => spec.pick(rng),
        Background::Noise => Rgba([255, 255, 255, 255]),
    };
    let mut image = RgbaImage::from_pixel(width, height, background);
    if matches!(style.background, Background::Noise) {
        for px in image.pixels_mut() {
            let v: u8 = rng.random_range(223..=255);
            *px = Rgba([v, v, v, 255]);
        }
    }
    let mut mask = style
        .output_mask
        .then(|| GrayImage::new(width, height));

    let text_color = style.text_color.pick(rng);
    let stroke_color = (style.stroke_width > 0).then(|| style.stroke_fill.pick(rng));

    let x0 = (style.margins.left + pad) as f32;
    let y0 = (style.margins.top + pad) as i32;
    let mut buf = [0u8; 4];
    for &(ch, offset) in &placed {
        if ch == ' ' {
            continue;
        }
        let glyph_str: &str = ch.encode_utf8(&mut buf);
        let x = (x0 + offset).round() as i32;
        if let Some(stroke) = stroke_color {
            let w = style.stroke_width as i32;
            for dx in -w..=w {
                for dy in -w..=w {
                    if dx != 0 || dy != 0 {
                        draw_text_mut(&mut image, stroke, x + dx, y0 + dy, scale, &font, glyph_str);
                    }
                }
            }
        }
        draw_text_mut(&mut image, text_color, x, y0, scale, &font, glyph_str);
        if let Some(mask) = mask.as_mut() {
            draw_text_mut(mask, image::Luma([255u8]), x, y0, scale, &font, glyph_str);
        }
    }

    let max_skew = style.skew_angle.abs();
    let angle = if style.random_skew && max_skew != 0 {
        rng.random_range(-max_skew..=max_skew)
    } else {
        style.skew_angle
    };
    if angle != 0 {
        let theta = (angle as f32).to_radians();
        image = rotate_about_center(&image, theta, Interpolation::Bilinear, background);
        mask =
            mask.map(|m| rotate_about_center(&m, theta, Interpolation::Bilinear, image::Luma([0u8])));
    }

    let sigma = if style.random_blur && style.blur > 0.0 {
        rng.random_range(0.0..=style.blur)
    } else {
        style.blur
    };
    if sigma > 0.0 {
        image = gaussian_blur_f32(&image, sigma);
    }

    Ok(Rendered { image, mask })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn parses_single_color() {
        let spec: ColorSpec = "#000010".parse().unwrap();
        assert_eq!(spec, ColorSpec::solid(0x00, 0x00, 0x10));
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(spec.pick(&mut rng), Rgba([0x00, 0x00, 0x10, 0xFF]));
    }

    #[test]
    fn parses_color_range() {
        let spec: ColorSpec = "#000010,#FFFFFF".parse().unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..32 {
            let Rgba([_, _, b, a]) = spec.pick(&mut rng);
            assert!(b >= 0x10);
            assert_eq!(a, 0xFF);
        }
    }

    #[test]
    fn rejects_malformed_colors() {
        assert!("".parse::<ColorSpec>().is_err());
        assert!("000010".parse::<ColorSpec>().is_err());
        assert!("#00001".parse::<ColorSpec>().is_err());
        assert!("#000010,#FFFFFF,#000000".parse::<ColorSpec>().is_err());
        assert!("#GGGGGG".parse::<ColorSpec>().is_err());
    }

    #[test]
    fn uniform_image_is_blank() {
        let rendered = Rendered {
            image: RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255])),
            mask: None,
        };
        assert!(rendered.is_blank());
    }

    #[test]
    fn any_foreground_pixel_defeats_blank() {
        let mut image = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        image.put_pixel(2, 1, Rgba([0, 0, 16, 255]));
        let rendered = Rendered { image, mask: None };
        assert!(!rendered.is_blank());
    }

    #[test]
    fn missing_font_file_is_a_render_error() {
        let mut rng = SmallRng::seed_from_u64(0);
        let err = render(
            "abc",
            Path::new("no/such/font.ttf"),
            &RenderStyle::reference(),
            &mut rng,
        );
        assert!(matches!(err, Err(RenderError::FontRead { .. })));
    }
}

use crate::config::MarkStyle;
use crate::error::ContractError;
use crate::font::SignatureFace;
use base64::Engine;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use std::sync::{Arc, Mutex};
use tiny_skia::{
    FillRule, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, Stroke, Transform,
};
use ttf_parser::{GlyphId, OutlineBuilder};

// Horizontal lean applied to non-script faces.
const SYNTHETIC_OBLIQUE: f32 = 0.25;
// Fraction of the canvas width a signature may occupy before it is shrunk.
const SIGNATURE_FILL: f32 = 0.9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterMark {
    pub png: Arc<[u8]>,
    pub width_px: u32,
    pub height_px: u32,
}

impl RasterMark {
    pub fn from_png(bytes: Vec<u8>) -> Result<Self, ContractError> {
        let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)
            .map_err(|e| {
                ContractError::RasterizationUnavailable(format!("stroke raster is not a readable png: {e}"))
            })?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(ContractError::RasterizationUnavailable(
                "stroke raster is empty".to_string(),
            ));
        }
        Ok(Self {
            png: Arc::from(bytes),
            width_px: decoded.width(),
            height_px: decoded.height(),
        })
    }

    pub fn data_uri(&self) -> String {
        let payload = base64::engine::general_purpose::STANDARD.encode(&self.png[..]);
        format!("data:image/png;base64,{payload}")
    }

    pub(crate) fn decode_rgba(&self) -> Result<image::RgbaImage, image::ImageError> {
        image::load_from_memory_with_format(&self.png, image::ImageFormat::Png).map(|img| img.to_rgba8())
    }

    fn from_pixmap(pixmap: &Pixmap) -> Result<Self, ContractError> {
        let png = pixmap
            .encode_png()
            .map_err(|e| ContractError::RasterizationUnavailable(format!("png encode failed: {e}")))?;
        Ok(Self {
            png: Arc::from(png),
            width_px: pixmap.width(),
            height_px: pixmap.height(),
        })
    }
}

#[derive(Debug)]
pub struct MarkRasterizer {
    style: MarkStyle,
    face: Option<SignatureFace>,
    checkmark: Mutex<Option<RasterMark>>,
    last_signature: Mutex<Option<(String, RasterMark)>>,
}

impl MarkRasterizer {
    pub fn new(style: MarkStyle, face: Option<SignatureFace>) -> Self {
        Self {
            style,
            face,
            checkmark: Mutex::new(None),
            last_signature: Mutex::new(None),
        }
    }

    pub fn style(&self) -> &MarkStyle {
        &self.style
    }

    pub fn signature_face(&self) -> Option<&SignatureFace> {
        self.face.as_ref()
    }

    pub fn rasterize_checkmark(&self) -> Result<RasterMark, ContractError> {
        if let Ok(cache) = self.checkmark.lock() {
            if let Some(mark) = cache.as_ref() {
                return Ok(mark.clone());
            }
        }
        let mark = draw_checkmark(self.style.checkmark_px)?;
        if let Ok(mut cache) = self.checkmark.lock() {
            *cache = Some(mark.clone());
        }
        Ok(mark)
    }

    pub fn rasterize_signature(&self, text: &str) -> Result<RasterMark, ContractError> {
        if let Ok(cache) = self.last_signature.lock() {
            if let Some((cached_text, mark)) = cache.as_ref() {
                if cached_text == text {
                    return Ok(mark.clone());
                }
            }
        }
        let face = self.face.as_ref().ok_or_else(|| {
            ContractError::RasterizationUnavailable("no signature font available".to_string())
        })?;
        let mark = draw_signature(
            face,
            text,
            self.style.signature_width_px,
            self.style.signature_height_px,
            self.style.signature_font_px,
        )?;
        if let Ok(mut cache) = self.last_signature.lock() {
            *cache = Some((text.to_string(), mark.clone()));
        }
        Ok(mark)
    }

    pub fn signature_font_px(&self, text: &str) -> Result<f32, ContractError> {
        let face = self.face.as_ref().ok_or_else(|| {
            ContractError::RasterizationUnavailable("no signature font available".to_string())
        })?;
        let (outline_face, _, advance_units) = prepare_signature(face, text)?;
        let upem = outline_face.units_per_em().max(1);
        let scale = fitted_scale(upem, advance_units, self.style.signature_width_px, self.style.signature_font_px);
        Ok(scale * upem as f32)
    }
}

fn surface(width: u32, height: u32) -> Result<Pixmap, ContractError> {
    Pixmap::new(width, height).ok_or_else(|| {
        ContractError::RasterizationUnavailable(format!("cannot allocate {width}x{height} surface"))
    })
}

fn ink() -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(0, 0, 0, 255);
    paint.anti_alias = true;
    paint
}

fn draw_checkmark(size_px: u32) -> Result<RasterMark, ContractError> {
    let mut pixmap = surface(size_px, size_px)?;
    let s = size_px as f32;
    let mut pb = PathBuilder::new();
    pb.move_to(0.18 * s, 0.54 * s);
    pb.line_to(0.42 * s, 0.76 * s);
    pb.line_to(0.82 * s, 0.26 * s);
    let path = pb.finish().ok_or_else(|| {
        ContractError::RasterizationUnavailable("checkmark path is empty".to_string())
    })?;
    let stroke = Stroke {
        width: (0.14 * s).max(1.0),
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    pixmap.stroke_path(&path, &ink(), &stroke, Transform::identity(), None);
    RasterMark::from_pixmap(&pixmap)
}

struct ShapedGlyph {
    glyph_id: u16,
    x: f32,
    y: f32,
}

fn shape_line(font_data: &[u8], text: &str) -> Option<(Vec<ShapedGlyph>, f32)> {
    let face = HbFace::from_slice(font_data, 0)?;
    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let infos = output.glyph_infos();
    let positions = output.glyph_positions();
    if infos.len() != positions.len() {
        return None;
    }
    let mut glyphs = Vec::with_capacity(infos.len());
    let mut pen_x = 0.0f32;
    for (info, pos) in infos.iter().zip(positions) {
        glyphs.push(ShapedGlyph {
            glyph_id: info.glyph_id as u16,
            x: pen_x + pos.x_offset as f32,
            y: pos.y_offset as f32,
        });
        pen_x += pos.x_advance as f32;
    }
    Some((glyphs, pen_x))
}

fn prepare_signature<'f>(
    face: &'f SignatureFace,
    text: &str,
) -> Result<(ttf_parser::Face<'f>, Vec<ShapedGlyph>, f32), ContractError> {
    let outline_face = ttf_parser::Face::parse(&face.data, 0).map_err(|e| {
        ContractError::RasterizationUnavailable(format!("signature font {} unreadable: {e}", face.name))
    })?;
    let (glyphs, advance_units) = shape_line(&face.data, text).ok_or_else(|| {
        ContractError::RasterizationUnavailable(format!("signature font {} cannot shape text", face.name))
    })?;
    Ok((outline_face, glyphs, advance_units))
}

// Pixels per font unit; long text shrinks to `SIGNATURE_FILL` of the canvas width.
fn fitted_scale(units_per_em: u16, advance_units: f32, width_px: u32, font_px: f32) -> f32 {
    let scale = font_px / units_per_em.max(1) as f32;
    let max_width = width_px as f32 * SIGNATURE_FILL;
    if advance_units > 0.0 && advance_units * scale > max_width {
        max_width / advance_units
    } else {
        scale
    }
}

fn draw_signature(
    face: &SignatureFace,
    text: &str,
    width_px: u32,
    height_px: u32,
    font_px: f32,
) -> Result<RasterMark, ContractError> {
    let mut pixmap = surface(width_px, height_px)?;
    let (outline_face, glyphs, advance_units) = prepare_signature(face, text)?;
    let scale = fitted_scale(outline_face.units_per_em(), advance_units, width_px, font_px);
    let skew = if face.synthetic_oblique { SYNTHETIC_OBLIQUE } else { 0.0 };

    // Centered horizontally; the em box is centered vertically on the canvas.
    let origin_x = (width_px as f32 - advance_units * scale) / 2.0;
    let em_mid = (outline_face.ascender() as f32 + outline_face.descender() as f32) / 2.0;
    let baseline_y = height_px as f32 / 2.0 + em_mid * scale;

    let paint = ink();
    for glyph in glyphs.iter().filter(|g| g.glyph_id != 0) {
        let mut builder = GlyphPathBuilder::new(scale);
        if outline_face
            .outline_glyph(GlyphId(glyph.glyph_id), &mut builder)
            .is_none()
        {
            continue;
        }
        let Some(path) = builder.finish() else {
            continue;
        };
        let placement = Transform::from_row(
            1.0,
            0.0,
            -skew,
            1.0,
            origin_x + glyph.x * scale,
            baseline_y - glyph.y * scale,
        );
        pixmap.fill_path(&path, &paint, FillRule::Winding, placement, None);
    }
    RasterMark::from_pixmap(&pixmap)
}

fn detect_direction(text: &str) -> HbDirection {
    let rtl = text.chars().any(|ch| {
        matches!(
            ch as u32,
            0x0590..=0x08FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF | 0x1EE00..=0x1EEFF
        )
    });
    if rtl {
        HbDirection::RightToLeft
    } else {
        HbDirection::LeftToRight
    }
}

struct GlyphPathBuilder {
    builder: PathBuilder,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            scale,
        }
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }

    fn pt(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale, -y * self.scale)
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.pt(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.pt(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.pt(x1, y1);
        let (x, y) = self.pt(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.pt(x1, y1);
        let (x2, y2) = self.pt(x2, y2);
        let (x, y) = self.pt(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sans_signature_face, tiny_png};

    fn alpha_at(mark: &RasterMark, x: u32, y: u32) -> u8 {
        mark.decode_rgba().expect("decode").get_pixel(x, y)[3]
    }

    #[test]
    fn checkmark_is_square_transparent_and_inked() {
        let rasterizer = MarkRasterizer::new(MarkStyle::default(), None);
        let mark = rasterizer.rasterize_checkmark().expect("checkmark");
        assert_eq!((mark.width_px, mark.height_px), (24, 24));
        assert_eq!(alpha_at(&mark, 0, 0), 0);
        assert_eq!(alpha_at(&mark, 23, 23), 0);
        let rgba = mark.decode_rgba().expect("decode");
        assert!(rgba.pixels().any(|p| p[3] == 255));
    }

    #[test]
    fn checkmark_is_deterministic_and_cached() {
        let a = MarkRasterizer::new(MarkStyle::default(), None);
        let b = MarkRasterizer::new(MarkStyle::default(), None);
        let first = a.rasterize_checkmark().expect("a");
        assert_eq!(first, b.rasterize_checkmark().expect("b"));
        let again = a.rasterize_checkmark().expect("cached");
        assert!(Arc::ptr_eq(&first.png, &again.png));
    }

    #[test]
    fn zero_sized_surface_is_unavailable() {
        let style = MarkStyle {
            checkmark_px: 0,
            ..MarkStyle::default()
        };
        let err = MarkRasterizer::new(style, None)
            .rasterize_checkmark()
            .expect_err("no surface");
        assert!(matches!(err, ContractError::RasterizationUnavailable(_)));
    }

    #[test]
    fn signature_without_font_is_unavailable() {
        let err = MarkRasterizer::new(MarkStyle::default(), None)
            .rasterize_signature("Maria Rodriguez")
            .expect_err("no font");
        assert!(err.to_string().contains("no signature font"));
    }

    #[test]
    fn signature_uses_fixed_canvas() {
        let rasterizer = MarkRasterizer::new(MarkStyle::default(), Some(sans_signature_face()));
        let mark = rasterizer.rasterize_signature("Maria Rodriguez").expect("signature");
        assert_eq!((mark.width_px, mark.height_px), (400, 100));
        assert_eq!(alpha_at(&mark, 0, 0), 0);
        assert_eq!(alpha_at(&mark, 399, 99), 0);
        let rgba = mark.decode_rgba().expect("decode");
        assert!(rgba.pixels().any(|p| p[3] > 0));
        let again = rasterizer.rasterize_signature("Maria Rodriguez").expect("cached");
        assert!(Arc::ptr_eq(&mark.png, &again.png));
        let other = rasterizer.rasterize_signature("M. Rodriguez").expect("redraw");
        assert_ne!(mark.png, other.png);
    }

    #[test]
    fn long_signatures_shrink_to_fit() {
        let rasterizer = MarkRasterizer::new(MarkStyle::default(), Some(sans_signature_face()));
        assert_eq!(rasterizer.signature_font_px("Ann").expect("short"), 40.0);
        let long = rasterizer
            .signature_font_px("Maria Elena Rodriguez de la Fuente y Montenegro")
            .expect("long");
        assert!(long < 40.0, "expected a shrunk size, got {long}");
        assert!(long > 0.0);

        let face = sans_signature_face();
        let parsed = ttf_parser::Face::parse(&face.data, 0).expect("face");
        let (_, advance) = shape_line(&face.data, "Maria Elena Rodriguez de la Fuente y Montenegro")
            .expect("shape");
        let width = advance * long / parsed.units_per_em() as f32;
        assert!((width - 360.0).abs() < 0.01, "fitted width {width}");
    }

    #[test]
    fn fitted_size_needs_a_face() {
        let err = MarkRasterizer::new(MarkStyle::default(), None)
            .signature_font_px("Ann")
            .expect_err("no font");
        assert!(matches!(err, ContractError::RasterizationUnavailable(_)));
    }

    #[test]
    fn drawn_raster_is_validated_and_exportable() {
        let mark = RasterMark::from_png(tiny_png(6, 3)).expect("png");
        assert_eq!((mark.width_px, mark.height_px), (6, 3));
        assert!(mark.data_uri().starts_with("data:image/png;base64,iVBOR"));
        assert!(RasterMark::from_png(vec![0x89, b'P', b'N', b'G']).is_err());
    }
}

use crate::error::{SlidecastError, SlidecastResult};
use crate::model::{PageImage, Slide};
use crate::text::{TextBrushRgba8, TextLayoutEngine, wrap_to_width};
use std::sync::Arc;

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn validate(&self) -> SlidecastResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SlidecastError::validation("canvas width/height must be > 0"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            // yuv420p output requires even dimensions.
            return Err(SlidecastError::validation(
                "canvas width/height must be even",
            ));
        }
        Ok(())
    }
}

/// A rendered frame as premultiplied RGBA8 pixels.
#[derive(Clone, Debug)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether `data` is premultiplied alpha.
    pub premultiplied: bool,
}

/// Colors, font and metrics for the synthesized slide layout.
///
/// Pixel values are tuned for a 1280x720 canvas; the renderer clamps margins
/// on smaller targets.
#[derive(Clone, Debug)]
pub struct RenderTheme {
    pub font_bytes: Arc<Vec<u8>>,
    /// Background behind letterboxed page images (straight alpha RGBA8).
    pub background: [u8; 4],
    pub gradient_top: [u8; 4],
    pub gradient_bottom: [u8; 4],
    pub title_color: [u8; 4],
    pub body_color: [u8; 4],
    pub muted_color: [u8; 4],
    pub accent_color: [u8; 4],
    pub title_size_px: f32,
    pub body_size_px: f32,
    pub marker_size_px: f32,
    pub margin_px: f32,
    pub line_height_px: f32,
    /// Wrapped narration lines beyond this count are dropped; the cap is a
    /// frame-size constraint, not data loss.
    pub max_note_lines: usize,
}

impl RenderTheme {
    pub fn new(font_bytes: Arc<Vec<u8>>) -> Self {
        Self {
            font_bytes,
            background: [12, 14, 20, 255],
            gradient_top: [30, 36, 52, 255],
            gradient_bottom: [10, 12, 20, 255],
            title_color: [236, 239, 246, 255],
            body_color: [209, 214, 226, 255],
            muted_color: [148, 155, 170, 255],
            accent_color: [96, 165, 250, 255],
            title_size_px: 52.0,
            body_size_px: 30.0,
            marker_size_px: 22.0,
            margin_px: 64.0,
            line_height_px: 44.0,
            max_note_lines: 9,
        }
    }
}

/// Uniform scale-and-center fit of an image into a canvas.
///
/// Returns `(scale, tx, ty)` with `scale = min(cw/iw, ch/ih)`; the image is
/// never cropped or stretched.
pub fn letterbox(
    canvas: Canvas,
    img_width: u32,
    img_height: u32,
) -> SlidecastResult<(f64, f64, f64)> {
    if img_width == 0 || img_height == 0 {
        return Err(SlidecastError::validation(
            "page image width/height must be > 0",
        ));
    }
    let cw = f64::from(canvas.width);
    let ch = f64::from(canvas.height);
    let iw = f64::from(img_width);
    let ih = f64::from(img_height);

    let scale = (cw / iw).min(ch / ih);
    let tx = (cw - iw * scale) / 2.0;
    let ty = (ch - ih * scale) / 2.0;
    Ok((scale, tx, ty))
}

/// Renders one bitmap frame per slide: a letterboxed passthrough of the page
/// image when one exists, a synthesized title/bullet/narration layout
/// otherwise.
///
/// Rendering is deterministic: the same slide, canvas and theme produce a
/// byte-identical frame.
pub struct FrameRenderer {
    theme: RenderTheme,
    text: TextLayoutEngine,
    font_data: Option<vello_cpu::peniko::FontData>,
}

impl FrameRenderer {
    pub fn new(theme: RenderTheme) -> Self {
        let text = TextLayoutEngine::new(theme.font_bytes.clone());
        Self {
            theme,
            text,
            font_data: None,
        }
    }

    pub fn theme(&self) -> &RenderTheme {
        &self.theme
    }

    pub fn render(&mut self, slide: &Slide, canvas: Canvas) -> SlidecastResult<FrameRGBA> {
        canvas.validate()?;
        match &slide.source_image {
            Some(image) => self.render_passthrough(image, canvas),
            None => self.render_layout(slide, canvas),
        }
    }

    fn render_passthrough(
        &mut self,
        image: &PageImage,
        canvas: Canvas,
    ) -> SlidecastResult<FrameRGBA> {
        let (width_u16, height_u16) = canvas_dims_u16(canvas)?;
        let (scale, tx, ty) = letterbox(canvas, image.width, image.height)?;

        let mut pixmap = vello_cpu::Pixmap::new(width_u16, height_u16);
        clear_pixmap(&mut pixmap, premul_rgba8(self.theme.background));

        let mut ctx = vello_cpu::RenderContext::new(width_u16, height_u16);
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);

        let paint = image_paint(image)?;
        ctx.set_transform(
            vello_cpu::kurbo::Affine::translate((tx, ty)) * vello_cpu::kurbo::Affine::scale(scale),
        );
        ctx.set_paint(paint);
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(image.width),
            f64::from(image.height),
        ));

        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);

        Ok(FrameRGBA {
            width: canvas.width,
            height: canvas.height,
            data: pixmap.data_as_u8_slice().to_vec(),
            premultiplied: true,
        })
    }

    fn render_layout(&mut self, slide: &Slide, canvas: Canvas) -> SlidecastResult<FrameRGBA> {
        let (width_u16, height_u16) = canvas_dims_u16(canvas)?;
        let w = canvas.width as f32;
        let h = canvas.height as f32;
        let margin = self.theme.margin_px.min(w / 8.0).min(h / 8.0);
        let content_width = w - 2.0 * margin;

        let mut pixmap = vello_cpu::Pixmap::new(width_u16, height_u16);
        clear_pixmap(&mut pixmap, [0, 0, 0, 0]);

        let mut ctx = vello_cpu::RenderContext::new(width_u16, height_u16);
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        self.draw_gradient(&mut ctx, canvas);

        let title_size = self.theme.title_size_px;
        let title_line_height = title_size * 1.25;
        let title_lines = {
            let text = &mut self.text;
            wrap_to_width(&slide.title, content_width, 2, &mut |s| {
                text.measure(s, title_size)
            })?
        };

        let mut y = margin;
        for line in &title_lines {
            self.draw_text_line(&mut ctx, line, title_size, self.theme.title_color, margin, y)?;
            y += title_line_height;
        }
        if title_lines.is_empty() {
            y += title_line_height;
        }

        // Separator rule under the title block.
        let rule_y = y + 10.0;
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(color_from_rgba(self.theme.muted_color));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            f64::from(margin),
            f64::from(rule_y),
            f64::from(w - margin),
            f64::from(rule_y + 2.0),
        ));

        let body_top = rule_y + 26.0;
        let body_bottom = h - margin - self.theme.marker_size_px * 1.6;
        if !slide.content.is_empty() {
            self.draw_bullets(&mut ctx, slide, margin, content_width, body_top, body_bottom)?;
        } else {
            self.draw_notes(&mut ctx, slide, margin, content_width, body_top, body_bottom)?;
        }

        // Page marker, bottom-right.
        let marker = format!("{}", slide.page_index + 1);
        let marker_size = self.theme.marker_size_px;
        let marker_width = self.text.measure(&marker, marker_size)?;
        self.draw_text_line(
            &mut ctx,
            &marker,
            marker_size,
            self.theme.muted_color,
            w - margin - marker_width,
            h - margin - marker_size * 1.2,
        )?;

        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);

        Ok(FrameRGBA {
            width: canvas.width,
            height: canvas.height,
            data: pixmap.data_as_u8_slice().to_vec(),
            premultiplied: true,
        })
    }

    fn draw_gradient(&self, ctx: &mut vello_cpu::RenderContext, canvas: Canvas) {
        let h = canvas.height;
        let w = f64::from(canvas.width);
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        for row in 0..h {
            let t = if h <= 1 {
                0.0
            } else {
                f64::from(row) / f64::from(h - 1)
            };
            let rgba = lerp_rgba(self.theme.gradient_top, self.theme.gradient_bottom, t);
            ctx.set_paint(color_from_rgba(rgba));
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                0.0,
                f64::from(row),
                w,
                f64::from(row + 1),
            ));
        }
    }

    fn draw_bullets(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        slide: &Slide,
        margin: f32,
        content_width: f32,
        top: f32,
        bottom: f32,
    ) -> SlidecastResult<()> {
        let size = self.theme.body_size_px;
        let indent = size * 0.9;
        let text_width = content_width - indent;
        let mut y = top;

        for entry in &slide.content {
            if y + self.theme.line_height_px > bottom {
                // Remaining entries do not fit the frame.
                break;
            }

            let line = {
                let text = &mut self.text;
                wrap_to_width(entry, text_width, 1, &mut |s| text.measure(s, size))?
            };
            let Some(line) = line.into_iter().next() else {
                continue;
            };

            use vello_cpu::kurbo::Shape as _;
            let dot = vello_cpu::kurbo::Circle::new(
                (f64::from(margin + size * 0.25), f64::from(y + size * 0.55)),
                f64::from(size * 0.12),
            )
            .to_path(0.1);
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint(color_from_rgba(self.theme.accent_color));
            ctx.fill_path(&dot);

            self.draw_text_line(ctx, &line, size, self.theme.body_color, margin + indent, y)?;
            y += self.theme.line_height_px;
        }
        Ok(())
    }

    fn draw_notes(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        slide: &Slide,
        margin: f32,
        content_width: f32,
        top: f32,
        bottom: f32,
    ) -> SlidecastResult<()> {
        let size = self.theme.body_size_px;
        let available_rows =
            (((bottom - top) / self.theme.line_height_px).floor()).max(0.0) as usize;
        let max_lines = self.theme.max_note_lines.min(available_rows);

        let lines = {
            let text = &mut self.text;
            wrap_to_width(slide.notes(), content_width, max_lines, &mut |s| {
                text.measure(s, size)
            })?
        };

        let mut y = top;
        for line in &lines {
            self.draw_text_line(ctx, line, size, self.theme.body_color, margin, y)?;
            y += self.theme.line_height_px;
        }
        Ok(())
    }

    fn draw_text_line(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        text: &str,
        size_px: f32,
        color: [u8; 4],
        x: f32,
        y: f32,
    ) -> SlidecastResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        let layout = self
            .text
            .layout(text, size_px, TextBrushRgba8::from_rgba(color), None)?;
        let font = self.font_data()?;

        ctx.set_transform(vello_cpu::kurbo::Affine::translate((
            f64::from(x),
            f64::from(y),
        )));

        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };

                let brush = run.style().brush;
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    brush.r, brush.g, brush.b, brush.a,
                ));

                let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(&font)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
        Ok(())
    }

    fn font_data(&mut self) -> SlidecastResult<vello_cpu::peniko::FontData> {
        if let Some(font) = &self.font_data {
            return Ok(font.clone());
        }
        let bytes: Vec<u8> = self.theme.font_bytes.as_ref().clone();
        let font = vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(bytes), 0);
        self.font_data = Some(font.clone());
        Ok(font)
    }
}

fn canvas_dims_u16(canvas: Canvas) -> SlidecastResult<(u16, u16)> {
    let w: u16 = canvas
        .width
        .try_into()
        .map_err(|_| SlidecastError::validation("canvas width exceeds u16"))?;
    let h: u16 = canvas
        .height
        .try_into()
        .map_err(|_| SlidecastError::validation("canvas height exceeds u16"))?;
    Ok((w, h))
}

fn color_from_rgba(rgba: [u8; 4]) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3])
}

fn premul_rgba8(rgba: [u8; 4]) -> [u8; 4] {
    let a = rgba[3];
    let af = (a as u16) + 1;
    let premul = |c: u8| -> u8 { (((c as u16) * af) >> 8) as u8 };
    [premul(rgba[0]), premul(rgba[1]), premul(rgba[2]), a]
}

fn clear_pixmap(pixmap: &mut vello_cpu::Pixmap, rgba_premul: [u8; 4]) {
    let data = pixmap.data_as_u8_slice_mut();
    for px in data.chunks_exact_mut(4) {
        px.copy_from_slice(&rgba_premul);
    }
}

fn image_paint(image: &PageImage) -> SlidecastResult<vello_cpu::Image> {
    let pixmap = image_premul_bytes_to_pixmap(&image.rgba8_premul, image.width, image.height)?;
    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(std::sync::Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

fn image_premul_bytes_to_pixmap(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> SlidecastResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| SlidecastError::validation("page image width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| SlidecastError::validation("page image height exceeds u16"))?;
    if rgba8_premul.len() != width as usize * height as usize * 4 {
        return Err(SlidecastError::validation("page image byte length mismatch"));
    }

    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for px in rgba8_premul.chunks_exact(4) {
        let a = px[3];
        may_have_opacities |= a != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a,
        });
    }

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

fn lerp_rgba(a: [u8; 4], b: [u8; 4], t: f64) -> [u8; 4] {
    let mix = |x: u8, y: u8| -> u8 {
        let v = f64::from(x) + (f64::from(y) - f64::from(x)) * t;
        v.round().clamp(0.0, 255.0) as u8
    };
    [
        mix(a[0], b[0]),
        mix(a[1], b[1]),
        mix(a[2], b[2]),
        mix(a[3], b[3]),
    ]
}

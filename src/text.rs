use std::sync::Arc;

use crate::error::{SlidecastError, SlidecastResult};

/// RGBA8 brush color used by Parley text layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrushRgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl TextBrushRgba8 {
    pub fn from_rgba(rgba: [u8; 4]) -> Self {
        Self {
            r: rgba[0],
            g: rgba[1],
            b: rgba[2],
            a: rgba[3],
        }
    }
}

/// Stateful helper for shaping and measuring text with a single theme font.
///
/// The font is registered lazily on first use so image-only render paths
/// never touch font parsing.
pub struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
    font_bytes: Arc<Vec<u8>>,
    family_name: Option<String>,
}

impl TextLayoutEngine {
    pub fn new(font_bytes: Arc<Vec<u8>>) -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            font_bytes,
            family_name: None,
        }
    }

    pub fn font_bytes(&self) -> &Arc<Vec<u8>> {
        &self.font_bytes
    }

    fn family_name(&mut self) -> SlidecastResult<String> {
        if let Some(name) = &self.family_name {
            return Ok(name.clone());
        }

        let families = self.font_ctx.collection.register_fonts(
            parley::fontique::Blob::from(self.font_bytes.as_ref().clone()),
            None,
        );
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            SlidecastError::validation("no font families registered from theme font bytes")
        })?;

        let name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| SlidecastError::validation("registered font family has no name"))?
            .to_string();

        self.family_name = Some(name.clone());
        Ok(name)
    }

    /// Shape and lay out plain text in the theme font.
    pub fn layout(
        &mut self,
        text: &str,
        size_px: f32,
        brush: TextBrushRgba8,
        max_width_px: Option<f32>,
    ) -> SlidecastResult<parley::Layout<TextBrushRgba8>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(SlidecastError::validation(
                "text size_px must be finite and > 0",
            ));
        }

        let family_name = self.family_name()?;

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        if let Some(w) = max_width_px {
            layout.break_all_lines(Some(w));
            layout.align(
                Some(w),
                parley::Alignment::Start,
                parley::AlignmentOptions::default(),
            );
        } else {
            layout.break_all_lines(None);
        }

        Ok(layout)
    }

    /// Advance width of `text` at `size_px`, from real glyph metrics.
    pub fn measure(&mut self, text: &str, size_px: f32) -> SlidecastResult<f32> {
        let layout = self.layout(text, size_px, TextBrushRgba8::default(), None)?;
        let mut width = 0.0f32;
        for line in layout.lines() {
            width = width.max(line.metrics().advance);
        }
        Ok(width)
    }
}

/// Greedily wrap `text` into lines that each fit `max_width` under `measure`,
/// returning at most `max_lines` lines.
///
/// Words are packed first; a single word wider than `max_width` is broken at
/// character boundaries rather than overflowed. Lines beyond `max_lines` are
/// dropped — callers treat the cap as a frame-size constraint.
pub fn wrap_to_width(
    text: &str,
    max_width: f32,
    max_lines: usize,
    measure: &mut dyn FnMut(&str) -> SlidecastResult<f32>,
) -> SlidecastResult<Vec<String>> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    let mut push_line = |lines: &mut Vec<String>, line: String| {
        if lines.len() < max_lines {
            lines.push(line);
        }
    };

    for word in text.split_whitespace() {
        if lines.len() >= max_lines {
            break;
        }

        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };

        if measure(&candidate)? <= max_width {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            push_line(&mut lines, std::mem::take(&mut current));
            if lines.len() >= max_lines {
                break;
            }
        }

        if measure(word)? <= max_width {
            current = word.to_string();
            continue;
        }

        // Word alone exceeds the frame width: force-break at characters.
        for ch in word.chars() {
            if lines.len() >= max_lines {
                break;
            }
            let mut candidate = current.clone();
            candidate.push(ch);
            // A single glyph wider than the frame still occupies one line.
            if current.is_empty() || measure(&candidate)? <= max_width {
                current = candidate;
            } else {
                push_line(&mut lines, std::mem::take(&mut current));
                current.push(ch);
            }
        }
    }

    if !current.is_empty() && lines.len() < max_lines {
        lines.push(current);
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 10 units per character, a stand-in for glyph advances.
    fn char_measure(s: &str) -> SlidecastResult<f32> {
        Ok(s.chars().count() as f32 * 10.0)
    }

    fn wrap(text: &str, max_width: f32, max_lines: usize) -> Vec<String> {
        wrap_to_width(text, max_width, max_lines, &mut char_measure).unwrap()
    }

    #[test]
    fn packs_words_greedily() {
        let lines = wrap("aa bb cc dd", 50.0, 10);
        assert_eq!(lines, vec!["aa bb", "cc dd"]);
    }

    #[test]
    fn fits_single_line_when_possible() {
        let lines = wrap("short text", 200.0, 10);
        assert_eq!(lines, vec!["short text"]);
    }

    #[test]
    fn force_breaks_overlong_word() {
        let lines = wrap("abcdefghij", 30.0, 10);
        assert_eq!(lines, vec!["abc", "def", "ghi", "j"]);
        for line in &lines {
            assert!(char_measure(line).unwrap() <= 30.0);
        }
    }

    #[test]
    fn no_line_ever_exceeds_width() {
        let text = "mixed sizes withaveryveryverylongword and short ones x";
        for width in [20.0f32, 30.0, 50.0, 80.0] {
            for line in wrap(text, width, 100) {
                assert!(
                    char_measure(&line).unwrap() <= width,
                    "line {line:?} exceeds {width}"
                );
            }
        }
    }

    #[test]
    fn truncates_at_max_lines() {
        let lines = wrap("a b c d e f g h", 10.0, 3);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[test]
    fn single_glyph_wider_than_frame_still_lands_on_a_line() {
        // Every character measures 10, frame is 5: one char per line.
        let lines = wrap("ab", 5.0, 10);
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn empty_text_wraps_to_nothing() {
        assert!(wrap("   ", 100.0, 10).is_empty());
    }
}

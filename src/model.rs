use std::sync::Arc;

use anyhow::Context as _;

use crate::error::{SlidecastError, SlidecastResult};

/// Decoded linear narration audio for one slide.
///
/// Samples are normalized to `[-1.0, 1.0]`. Clips are ephemeral: they live only
/// between synthesis and the encoding pass and are never persisted.
#[derive(Clone, Debug)]
pub struct AudioClip {
    /// Interleaved samples (mono in practice, see [`crate::tts::NARRATION_CHANNELS`]).
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
}

impl AudioClip {
    pub fn validate(&self) -> SlidecastResult<()> {
        if self.sample_rate == 0 {
            return Err(SlidecastError::validation("audio sample_rate must be > 0"));
        }
        if self.channels == 0 {
            return Err(SlidecastError::validation("audio channels must be > 0"));
        }
        if !self.samples.len().is_multiple_of(usize::from(self.channels)) {
            return Err(SlidecastError::validation(
                "audio sample count is not aligned to channel count",
            ));
        }
        Ok(())
    }

    /// Clip length in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        let frames = self.samples.len() / usize::from(self.channels);
        (frames as f64) / f64::from(self.sample_rate)
    }
}

/// A rendered document page in premultiplied RGBA8 form.
#[derive(Clone, Debug)]
pub struct PageImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel bytes in row-major premultiplied RGBA8.
    pub rgba8_premul: Arc<Vec<u8>>,
}

/// Decode an encoded page image (PNG/JPEG/...) into premultiplied RGBA8.
pub fn decode_page_image(bytes: &[u8]) -> SlidecastResult<PageImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode page image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(PageImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

/// One unit of the presentation: title, optional bullet content, narration
/// script, optional page image, optional synthesized clip.
///
/// `notes` and `audio_clip` are accessor-guarded: editing the narration script
/// drops any clip synthesized for the previous script, so a stale clip can
/// never reach the recording pass.
#[derive(Clone, Debug)]
pub struct Slide {
    /// 0-based page index; defines presentation order.
    pub page_index: u32,
    pub title: String,
    /// Bullet entries when a structured source was available.
    pub content: Vec<String>,
    notes: String,
    pub source_image: Option<PageImage>,
    audio_clip: Option<AudioClip>,
}

impl Slide {
    pub fn new(page_index: u32, title: impl Into<String>, notes: impl Into<String>) -> Self {
        Self {
            page_index,
            title: title.into(),
            content: Vec::new(),
            notes: notes.into(),
            source_image: None,
            audio_clip: None,
        }
    }

    /// The narration script as it currently stands.
    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Replace the narration script, invalidating any clip synthesized for the
    /// previous script.
    pub fn set_notes(&mut self, notes: impl Into<String>) {
        let notes = notes.into();
        if notes != self.notes {
            self.audio_clip = None;
        }
        self.notes = notes;
    }

    pub fn audio_clip(&self) -> Option<&AudioClip> {
        self.audio_clip.as_ref()
    }

    pub fn set_audio_clip(&mut self, clip: AudioClip) {
        self.audio_clip = Some(clip);
    }
}

/// The analyzed document: title, summary and one slide per source page.
#[derive(Clone, Debug, Default)]
pub struct Presentation {
    pub title: String,
    pub summary: String,
    /// Ordered by `page_index` ascending, contiguous from 0.
    pub slides: Vec<Slide>,
}

impl Presentation {
    /// Check the page-index invariant: contiguous, ascending from 0, no
    /// duplicates. The analysis join produces this shape; the recording pass
    /// asserts it once at entry.
    pub fn validate(&self) -> SlidecastResult<()> {
        for (i, slide) in self.slides.iter().enumerate() {
            if slide.page_index as usize != i {
                return Err(SlidecastError::validation(format!(
                    "slide at position {i} has page_index {} (expected {i})",
                    slide.page_index
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn decode_page_image_dimensions_and_premul() {
        let src_rgba = vec![100u8, 50u8, 200u8, 128u8];
        let img = image::RgbaImage::from_raw(1, 1, src_rgba).unwrap();

        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        let page = decode_page_image(&buf).unwrap();
        assert_eq!(page.width, 1);
        assert_eq!(page.height, 1);
        assert_eq!(
            page.rgba8_premul.as_slice(),
            &[
                ((100u16 * 128 + 127) / 255) as u8,
                ((50u16 * 128 + 127) / 255) as u8,
                ((200u16 * 128 + 127) / 255) as u8,
                128u8
            ]
        );
    }

    #[test]
    fn clip_duration_uses_frames_not_samples() {
        let clip = AudioClip {
            samples: vec![0.0; 48_000],
            sample_rate: 24_000,
            channels: 2,
        };
        assert!((clip.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn editing_notes_drops_stale_clip() {
        let mut slide = Slide::new(0, "Intro", "original script");
        slide.set_audio_clip(AudioClip {
            samples: vec![0.0; 240],
            sample_rate: 24_000,
            channels: 1,
        });
        assert!(slide.audio_clip().is_some());

        slide.set_notes("revised script");
        assert!(slide.audio_clip().is_none());
    }

    #[test]
    fn rewriting_identical_notes_keeps_clip() {
        let mut slide = Slide::new(0, "Intro", "same script");
        slide.set_audio_clip(AudioClip {
            samples: vec![0.0; 240],
            sample_rate: 24_000,
            channels: 1,
        });
        slide.set_notes("same script");
        assert!(slide.audio_clip().is_some());
    }

    #[test]
    fn validate_rejects_gap_in_page_indexes() {
        let pres = Presentation {
            title: "t".to_string(),
            summary: String::new(),
            slides: vec![Slide::new(0, "a", ""), Slide::new(2, "c", "")],
        };
        assert!(pres.validate().is_err());
    }
}

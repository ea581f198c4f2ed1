use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context as _;

use crate::error::{SlidecastError, SlidecastResult};
use crate::model::Presentation;
use crate::timeline::Schedule;
use crate::tts::NARRATION_CHANNELS;

/// The assembled narration audio for a whole recording.
#[derive(Clone, Debug)]
pub struct NarrationTrack {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl NarrationTrack {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        let frames = self.samples.len() / usize::from(self.channels);
        (frames as f64) / f64::from(self.sample_rate)
    }
}

/// Place every slide's clip at its scheduled offset in one mono track.
///
/// Slides are non-overlapping by construction (each hold outlasts its clip),
/// but contributions are summed and clamped all the same so an unexpected
/// overlap degrades to clipping instead of dropped audio.
pub fn narration_track(
    presentation: &Presentation,
    schedule: &Schedule,
    sample_rate: u32,
) -> SlidecastResult<NarrationTrack> {
    if sample_rate == 0 {
        return Err(SlidecastError::validation("mix sample_rate must be > 0"));
    }

    let total_samples = (schedule.total_secs * f64::from(sample_rate)).round() as usize;
    let mut samples = vec![0.0f32; total_samples];

    for (slide, timing) in presentation.slides.iter().zip(&schedule.timings) {
        let clip = slide.audio_clip().ok_or_else(|| {
            SlidecastError::validation(format!(
                "slide {} has no audio clip to mix",
                slide.page_index
            ))
        })?;
        if clip.sample_rate != sample_rate || clip.channels != NARRATION_CHANNELS {
            return Err(SlidecastError::validation(format!(
                "slide {} clip format {}Hz/{}ch does not match the narration track ({sample_rate}Hz/{NARRATION_CHANNELS}ch)",
                slide.page_index, clip.sample_rate, clip.channels
            )));
        }

        let offset = (timing.start_secs * f64::from(sample_rate)).round() as usize;
        for (k, &sample) in clip.samples.iter().enumerate() {
            let Some(slot) = samples.get_mut(offset + k) else {
                break;
            };
            *slot += sample;
        }
    }

    for s in &mut samples {
        *s = s.clamp(-1.0, 1.0);
    }

    Ok(NarrationTrack {
        sample_rate,
        channels: NARRATION_CHANNELS,
        samples,
    })
}

/// Write interleaved `f32` PCM samples as raw little-endian bytes.
pub fn write_f32le(samples: &[f32], out_path: &Path) -> SlidecastResult<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create narration scratch directory '{}'",
                parent.display()
            )
        })?;
    }

    let mut bytes = Vec::<u8>::with_capacity(samples.len() * 4);
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(out_path, bytes)
        .with_context(|| format!("failed to write narration track '{}'", out_path.display()))?;
    Ok(())
}

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A narration track written to disk for the encoder, removed on drop.
///
/// The file must outlive the encoder's final flush; callers drop the guard
/// only after the sink has finished.
pub struct ScratchTrack {
    path: PathBuf,
}

impl ScratchTrack {
    pub fn write(dir: &Path, track: &NarrationTrack) -> SlidecastResult<Self> {
        let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!(
            "slidecast-narration-{}-{n}.f32le",
            std::process::id()
        ));
        write_f32le(&track.samples, &path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchTrack {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove narration scratch file"
            );
        }
    }
}

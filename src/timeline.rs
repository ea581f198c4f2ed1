use std::path::Path;
use std::time::Duration;

use crate::encode::{AudioInput, EncodedArtifact, FrameIndex, RecordingSink, SinkConfig};
use crate::error::{SlidecastError, SlidecastResult};
use crate::mix;
use crate::model::Presentation;
use crate::render::{Canvas, FrameRGBA, FrameRenderer};
use crate::tts::NARRATION_SAMPLE_RATE;

/// Pacing parameters for the sequential slide loop.
#[derive(Clone, Copy, Debug)]
pub struct TimelineConfig {
    pub fps: u32,
    /// Silent interval before the first slide's narration begins; the first
    /// frame is already on screen for its whole duration.
    pub lead_in: Duration,
    /// Trailing-silence pad added to every clip's hold duration.
    pub trailing_margin: Duration,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            lead_in: Duration::from_millis(500),
            trailing_margin: Duration::from_millis(500),
        }
    }
}

impl TimelineConfig {
    pub fn validate(&self) -> SlidecastResult<()> {
        if self.fps == 0 {
            return Err(SlidecastError::validation("timeline fps must be > 0"));
        }
        Ok(())
    }
}

/// On-screen placement of one slide in output time.
#[derive(Clone, Copy, Debug)]
pub struct SlideTiming {
    pub page_index: u32,
    /// Seconds from the start of the output (the lead-in included).
    pub start_secs: f64,
    /// Clip duration plus the trailing margin.
    pub hold_secs: f64,
    pub frames: u64,
}

/// The fully computed presentation schedule.
#[derive(Clone, Debug)]
pub struct Schedule {
    pub fps: u32,
    pub lead_in_secs: f64,
    pub lead_in_frames: u64,
    pub timings: Vec<SlideTiming>,
    pub total_frames: u64,
    pub total_secs: f64,
}

/// Compute per-slide hold durations and frame counts.
///
/// Frame counts come from accumulated boundaries
/// (`round(end*fps) - round(start*fps)`), so rounding cannot drift across a
/// long deck: the per-slide counts always sum to `total_frames`.
pub fn build_schedule(
    presentation: &Presentation,
    config: &TimelineConfig,
) -> SlidecastResult<Schedule> {
    config.validate()?;

    let fps = f64::from(config.fps);
    let lead_in_secs = config.lead_in.as_secs_f64();
    let margin_secs = config.trailing_margin.as_secs_f64();
    let lead_in_frames = (lead_in_secs * fps).round() as u64;

    let mut timings = Vec::with_capacity(presentation.slides.len());
    let mut start_secs = lead_in_secs;
    let mut start_frame = lead_in_frames;

    for slide in &presentation.slides {
        let clip = slide.audio_clip().ok_or_else(|| {
            SlidecastError::validation(format!(
                "slide {} has no audio clip; synthesize narration before recording",
                slide.page_index
            ))
        })?;

        let hold_secs = clip.duration_secs() + margin_secs;
        let end_secs = start_secs + hold_secs;
        let end_frame = (end_secs * fps).round() as u64;

        timings.push(SlideTiming {
            page_index: slide.page_index,
            start_secs,
            hold_secs,
            frames: end_frame.saturating_sub(start_frame),
        });

        start_secs = end_secs;
        start_frame = end_frame;
    }

    Ok(Schedule {
        fps: config.fps,
        lead_in_secs,
        lead_in_frames,
        timings,
        total_frames: start_frame,
        total_secs: start_secs,
    })
}

/// Drives the sequential render-and-hold loop against a [`RecordingSink`].
pub struct Timeline {
    config: TimelineConfig,
}

impl Timeline {
    pub fn new(config: TimelineConfig) -> SlidecastResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Record the presentation into `sink` and return the finished artifact.
    ///
    /// The first slide's frame is rendered before the sink opens, so the
    /// output never starts on a blank frame; it then fills the lead-in
    /// interval while narration is still silent. Every slide holds for its
    /// clip duration plus the configured trailing margin.
    ///
    /// `on_slide` is invoked after each slide finishes with
    /// `(slides_done, slide_total)`.
    #[tracing::instrument(skip_all)]
    pub fn record(
        &self,
        presentation: &Presentation,
        canvas: Canvas,
        renderer: &mut FrameRenderer,
        sink: &mut dyn RecordingSink,
        scratch_dir: &Path,
        on_slide: &mut dyn FnMut(usize, usize),
    ) -> SlidecastResult<EncodedArtifact> {
        canvas.validate()?;
        presentation.validate()?;
        if presentation.slides.is_empty() {
            return Err(SlidecastError::validation(
                "cannot record an empty presentation",
            ));
        }

        let schedule = build_schedule(presentation, &self.config)?;

        // Rendered before the sink opens: the encoder must never see a blank
        // opening frame, and a render failure must precede encoder spawn.
        let first_frame = renderer.render(&presentation.slides[0], canvas)?;

        let track = mix::narration_track(presentation, &schedule, NARRATION_SAMPLE_RATE)?;
        let scratch = mix::ScratchTrack::write(scratch_dir, &track)?;

        sink.begin(SinkConfig {
            width: canvas.width,
            height: canvas.height,
            fps: self.config.fps,
            audio: Some(AudioInput {
                path: scratch.path().to_path_buf(),
                sample_rate: track.sample_rate,
                channels: track.channels,
            }),
        })?;

        let mut next_frame = 0u64;
        for _ in 0..schedule.lead_in_frames {
            sink.push_frame(FrameIndex(next_frame), &first_frame)?;
            next_frame += 1;
        }

        let total = presentation.slides.len();
        for (i, (slide, timing)) in presentation
            .slides
            .iter()
            .zip(&schedule.timings)
            .enumerate()
        {
            let rendered;
            let frame: &FrameRGBA = if i == 0 {
                &first_frame
            } else {
                rendered = renderer.render(slide, canvas)?;
                &rendered
            };

            for _ in 0..timing.frames {
                sink.push_frame(FrameIndex(next_frame), frame)?;
                next_frame += 1;
            }
            tracing::debug!(
                page_index = slide.page_index,
                hold_secs = timing.hold_secs,
                frames = timing.frames,
                "slide recorded"
            );
            on_slide(i + 1, total);
        }

        let artifact = sink.end()?;
        // The narration scratch file outlives the encoder's final flush and
        // is removed exactly once, here.
        drop(scratch);
        Ok(artifact)
    }
}

use std::path::PathBuf;

use crate::analysis::{AnalysisService, join_pages};
use crate::encode::{EncodedArtifact, RecordingSink};
use crate::error::{SlidecastError, SlidecastResult};
use crate::model::{PageImage, Presentation};
use crate::render::{Canvas, FrameRenderer, RenderTheme};
use crate::retry::RetryPolicy;
use crate::timeline::{Timeline, TimelineConfig};
use crate::tts::{NarrationSynthesizer, VoiceService};

/// Run phases in forward order; `Error` is reachable from any non-terminal
/// phase and terminal, as is `Completed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Analyzing,
    Reviewing,
    AudioGenerating,
    VideoRecording,
    Completed,
    Error,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Error)
    }

    /// Forward transitions never skip a phase.
    pub fn can_transition_to(self, next: Phase) -> bool {
        if next == Phase::Error {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Phase::Idle, Phase::Analyzing)
                | (Phase::Analyzing, Phase::Reviewing)
                | (Phase::Reviewing, Phase::AudioGenerating)
                | (Phase::AudioGenerating, Phase::VideoRecording)
                | (Phase::VideoRecording, Phase::Completed)
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Analyzing => "analyzing",
            Phase::Reviewing => "reviewing",
            Phase::AudioGenerating => "audio_generating",
            Phase::VideoRecording => "video_recording",
            Phase::Completed => "completed",
            Phase::Error => "error",
        };
        f.write_str(name)
    }
}

/// Portion of the combined audio+recording progress scale given to narration
/// synthesis; recording fills the remainder.
const SYNTHESIS_SPAN: u8 = 50;

/// Synthesis completion mapped onto the first half of the combined scale.
pub fn synthesis_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return SYNTHESIS_SPAN;
    }
    ((done.min(total) * usize::from(SYNTHESIS_SPAN)) / total) as u8
}

/// Recording completion mapped onto the second half of the combined scale.
pub fn recording_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    SYNTHESIS_SPAN + ((done.min(total) * usize::from(100 - SYNTHESIS_SPAN)) / total) as u8
}

/// Mutable state of one conversion run.
///
/// The job is an explicit value passed through phase transitions; it is
/// discarded after completion or error and a fresh job starts the next run.
#[derive(Clone, Debug)]
pub struct PipelineJob {
    phase: Phase,
    progress_percent: u8,
    status_message: String,
    error: Option<String>,
    artifact: Option<EncodedArtifact>,
}

impl Default for PipelineJob {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineJob {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            progress_percent: 0,
            status_message: "idle".to_string(),
            error: None,
            artifact: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn artifact(&self) -> Option<&EncodedArtifact> {
        self.artifact.as_ref()
    }

    pub fn take_artifact(&mut self) -> Option<EncodedArtifact> {
        self.artifact.take()
    }

    /// Move to the next forward phase.
    ///
    /// Progress restarts at each phase boundary except entering
    /// `VideoRecording`, which continues the combined audio+recording scale
    /// from the synthesis half.
    pub fn advance(mut self, next: Phase, status: impl Into<String>) -> SlidecastResult<Self> {
        if !self.phase.can_transition_to(next) {
            return Err(SlidecastError::validation(format!(
                "illegal phase transition {} -> {next}",
                self.phase
            )));
        }
        self.progress_percent = if next == Phase::VideoRecording {
            self.progress_percent.max(SYNTHESIS_SPAN)
        } else {
            0
        };
        self.phase = next;
        self.status_message = status.into();
        Ok(self)
    }

    /// Record progress, monotonically non-decreasing within the phase.
    pub fn set_progress(&mut self, percent: u8) {
        self.progress_percent = self.progress_percent.max(percent.min(100));
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status_message = status.into();
    }

    /// Terminal failure; no partial artifact is exposed.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.phase = Phase::Error;
        self.status_message = message.clone();
        self.error = Some(message);
        self.artifact = None;
        self
    }

    pub fn complete(self, artifact: EncodedArtifact) -> SlidecastResult<Self> {
        let mut job = self.advance(Phase::Completed, "completed")?;
        job.progress_percent = 100;
        job.artifact = Some(artifact);
        Ok(job)
    }
}

/// The rasterized form of the source document.
///
/// `pages` may be empty for structured sources that were never rasterized;
/// when present it has exactly `page_count` entries.
#[derive(Clone, Debug)]
pub struct RasterizedDocument {
    pub pages: Vec<PageImage>,
    pub page_count: u32,
}

/// Renders source document pages to bitmaps.
pub trait DocumentRasterizer: Send + Sync {
    fn rasterize(&self, document: &[u8]) -> SlidecastResult<RasterizedDocument>;
}

/// Orchestrates one conversion run across analysis, review, synthesis and
/// recording.
pub struct Pipeline<'a> {
    rasterizer: &'a dyn DocumentRasterizer,
    analysis: &'a dyn AnalysisService,
    voice: &'a dyn VoiceService,
    retry: RetryPolicy,
    theme: RenderTheme,
    timeline: TimelineConfig,
    canvas: Canvas,
    scratch_dir: PathBuf,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        rasterizer: &'a dyn DocumentRasterizer,
        analysis: &'a dyn AnalysisService,
        voice: &'a dyn VoiceService,
        theme: RenderTheme,
    ) -> Self {
        Self {
            rasterizer,
            analysis,
            voice,
            retry: RetryPolicy::default(),
            theme,
            timeline: TimelineConfig::default(),
            canvas: Canvas {
                width: 1280,
                height: 720,
            },
            scratch_dir: std::env::temp_dir(),
        }
    }

    pub fn with_canvas(mut self, canvas: Canvas) -> Self {
        self.canvas = canvas;
        self
    }

    pub fn with_timeline(mut self, timeline: TimelineConfig) -> Self {
        self.timeline = timeline;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Run the whole job and return the terminal [`PipelineJob`].
    ///
    /// `review` runs between analysis and synthesis and may edit narration
    /// scripts; `observe` is called after every job mutation. On any failure
    /// the returned job is in `Phase::Error` with a human-readable message
    /// and no artifact.
    pub async fn run(
        &self,
        document: &[u8],
        sink: &mut dyn RecordingSink,
        review: Option<&mut dyn FnMut(&mut Presentation)>,
        observe: &mut dyn FnMut(&PipelineJob),
    ) -> PipelineJob {
        let mut job = PipelineJob::new();
        match self.drive(document, sink, review, observe, &mut job).await {
            Ok(()) => job,
            Err(err) => {
                tracing::error!(error = %err, phase = %job.phase(), "pipeline run failed");
                let job = job.fail(err.to_string());
                observe(&job);
                job
            }
        }
    }

    async fn drive(
        &self,
        document: &[u8],
        sink: &mut dyn RecordingSink,
        review: Option<&mut dyn FnMut(&mut Presentation)>,
        observe: &mut dyn FnMut(&PipelineJob),
        job: &mut PipelineJob,
    ) -> SlidecastResult<()> {
        *job = std::mem::take(job).advance(Phase::Analyzing, "analyzing document")?;
        observe(job);

        let rasterized = self.rasterizer.rasterize(document)?;
        let page_count = rasterized.page_count;
        if !rasterized.pages.is_empty() && rasterized.pages.len() != page_count as usize {
            return Err(SlidecastError::validation(format!(
                "rasterizer returned {} pages for a {page_count}-page document",
                rasterized.pages.len()
            )));
        }

        let response = self.analysis.analyze(document, page_count).await?;
        let mut presentation = join_pages(response, page_count);
        for (slide, page) in presentation.slides.iter_mut().zip(rasterized.pages) {
            slide.source_image = Some(page);
        }
        presentation.validate()?;
        job.set_progress(100);
        job.set_status(format!("analyzed {page_count} pages"));
        observe(job);

        *job = std::mem::take(job).advance(Phase::Reviewing, "reviewing narration")?;
        observe(job);
        if let Some(review) = review {
            review(&mut presentation);
        }

        *job = std::mem::take(job).advance(Phase::AudioGenerating, "synthesizing narration")?;
        observe(job);
        let synthesizer = NarrationSynthesizer::new(self.voice, self.retry);
        let total = presentation.slides.len();
        for i in 0..total {
            // One clip in flight at a time; the retry loop stays sequential.
            let script = presentation.slides[i].notes().to_string();
            let clip = synthesizer.synthesize(&script).await?;
            presentation.slides[i].set_audio_clip(clip);
            job.set_progress(synthesis_progress(i + 1, total));
            job.set_status(format!("synthesized narration {}/{total}", i + 1));
            observe(job);
        }

        *job = std::mem::take(job).advance(Phase::VideoRecording, "recording slides")?;
        observe(job);
        let mut renderer = FrameRenderer::new(self.theme.clone());
        let timeline = Timeline::new(self.timeline)?;
        let mut on_slide = |done: usize, total: usize| {
            job.set_progress(recording_progress(done, total));
            job.set_status(format!("recorded slide {done}/{total}"));
            observe(job);
        };
        let artifact = timeline.record(
            &presentation,
            self.canvas,
            &mut renderer,
            sink,
            &self.scratch_dir,
            &mut on_slide,
        )?;

        *job = std::mem::take(job).complete(artifact)?;
        observe(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_never_skip() {
        assert!(Phase::Idle.can_transition_to(Phase::Analyzing));
        assert!(Phase::Analyzing.can_transition_to(Phase::Reviewing));
        assert!(Phase::Reviewing.can_transition_to(Phase::AudioGenerating));
        assert!(Phase::AudioGenerating.can_transition_to(Phase::VideoRecording));
        assert!(Phase::VideoRecording.can_transition_to(Phase::Completed));

        assert!(!Phase::Idle.can_transition_to(Phase::Reviewing));
        assert!(!Phase::Analyzing.can_transition_to(Phase::AudioGenerating));
        assert!(!Phase::Reviewing.can_transition_to(Phase::VideoRecording));
        assert!(!Phase::AudioGenerating.can_transition_to(Phase::Completed));
        assert!(!Phase::Completed.can_transition_to(Phase::Analyzing));
    }

    #[test]
    fn error_is_reachable_from_non_terminal_only() {
        for phase in [
            Phase::Idle,
            Phase::Analyzing,
            Phase::Reviewing,
            Phase::AudioGenerating,
            Phase::VideoRecording,
        ] {
            assert!(phase.can_transition_to(Phase::Error), "{phase}");
        }
        assert!(!Phase::Completed.can_transition_to(Phase::Error));
        assert!(!Phase::Error.can_transition_to(Phase::Error));
    }

    #[test]
    fn advance_rejects_skips() {
        let job = PipelineJob::new();
        let err = job.advance(Phase::AudioGenerating, "nope").unwrap_err();
        assert!(err.to_string().contains("illegal phase transition"));
    }

    #[test]
    fn progress_is_monotonic_within_a_phase() {
        let mut job = PipelineJob::new()
            .advance(Phase::Analyzing, "analyzing")
            .unwrap();
        job.set_progress(40);
        job.set_progress(20);
        assert_eq!(job.progress_percent(), 40);
    }

    #[test]
    fn combined_scale_is_monotonic_across_audio_and_recording() {
        let total = 4;
        let mut last = 0u8;
        for done in 1..=total {
            let p = synthesis_progress(done, total);
            assert!(p >= last);
            last = p;
        }
        assert_eq!(last, 50);
        for done in 1..=total {
            let p = recording_progress(done, total);
            assert!(p >= last);
            last = p;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn entering_recording_keeps_the_synthesis_half() {
        let mut job = PipelineJob::new()
            .advance(Phase::Analyzing, "a")
            .unwrap()
            .advance(Phase::Reviewing, "r")
            .unwrap()
            .advance(Phase::AudioGenerating, "s")
            .unwrap();
        job.set_progress(synthesis_progress(3, 3));
        let job = job.advance(Phase::VideoRecording, "rec").unwrap();
        assert_eq!(job.progress_percent(), 50);
    }

    #[test]
    fn fail_clears_artifact_and_records_message() {
        let job = PipelineJob::new()
            .advance(Phase::Analyzing, "a")
            .unwrap()
            .fail("voice service down");
        assert_eq!(job.phase(), Phase::Error);
        assert_eq!(job.error(), Some("voice service down"));
        assert!(job.artifact().is_none());
    }
}

use std::sync::Arc;
use std::time::Duration;

use slidecast::encode::{
    AudioInput, EncoderInventory, FfmpegSink, FfmpegSinkOpts, FrameIndex, RecordingSink,
    SinkConfig, negotiate,
};
use slidecast::mix::write_f32le;
use slidecast::model::{AudioClip, Presentation, Slide};
use slidecast::tts::{NARRATION_CHANNELS, NARRATION_SAMPLE_RATE};
use slidecast::{Canvas, FrameRGBA, FrameRenderer, PageImage, RenderTheme, Timeline, TimelineConfig};

/// Skip helper: these tests need a working ffmpeg with at least one
/// negotiable encoder pair.
fn ffmpeg_selection() -> Option<slidecast::encode::EncoderCandidate> {
    let inventory = EncoderInventory::probe().ok()?;
    negotiate(&inventory).ok()
}

fn solid_frame(width: u32, height: u32, rgba: [u8; 4]) -> FrameRGBA {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..width * height {
        data.extend_from_slice(&rgba);
    }
    FrameRGBA {
        width,
        height,
        data,
        premultiplied: true,
    }
}

#[test]
fn sink_produces_a_nonempty_container() {
    let Some(selection) = ffmpeg_selection() else {
        eprintln!("ffmpeg unavailable; skipping sink test");
        return;
    };

    let scratch = tempfile::tempdir().unwrap();
    let audio_path = scratch.path().join("tone.f32le");
    // One second of a quiet ramp at the narration rate.
    let samples: Vec<f32> = (0..NARRATION_SAMPLE_RATE)
        .map(|i| (i as f32 / NARRATION_SAMPLE_RATE as f32) * 0.2)
        .collect();
    write_f32le(&samples, &audio_path).unwrap();

    let mut sink = FfmpegSink::new(FfmpegSinkOpts::new("Sink Test"));
    sink.begin(SinkConfig {
        width: 64,
        height: 64,
        fps: 30,
        audio: Some(AudioInput {
            path: audio_path,
            sample_rate: NARRATION_SAMPLE_RATE,
            channels: NARRATION_CHANNELS,
        }),
    })
    .unwrap();

    let frame = solid_frame(64, 64, [40, 90, 160, 255]);
    for i in 0..30u64 {
        sink.push_frame(FrameIndex(i), &frame).unwrap();
    }

    let artifact = sink.end().unwrap();
    assert!(!artifact.bytes.is_empty());
    assert_eq!(artifact.container, selection.container);
    assert!((artifact.duration_secs - 1.0).abs() < 1e-9);
    assert!(
        artifact
            .suggested_filename
            .ends_with(selection.container.extension())
    );
}

#[test]
fn recorded_artifact_duration_tracks_the_schedule() {
    if ffmpeg_selection().is_none() {
        eprintln!("ffmpeg unavailable; skipping timeline recording test");
        return;
    }

    let scratch = tempfile::tempdir().unwrap();

    let clip = |secs: f64| {
        let n = (secs * f64::from(NARRATION_SAMPLE_RATE)).round() as usize;
        AudioClip {
            samples: vec![0.05; n],
            sample_rate: NARRATION_SAMPLE_RATE,
            channels: NARRATION_CHANNELS,
        }
    };
    let page = |rgba: [u8; 4]| {
        let mut bytes = Vec::with_capacity(8 * 8 * 4);
        for _ in 0..64 {
            bytes.extend_from_slice(&rgba);
        }
        PageImage {
            width: 8,
            height: 8,
            rgba8_premul: Arc::new(bytes),
        }
    };

    let mut first = Slide::new(0, "One", "a");
    first.source_image = Some(page([200, 40, 40, 255]));
    first.set_audio_clip(clip(0.8));
    let mut second = Slide::new(1, "Two", "b");
    second.source_image = Some(page([40, 200, 40, 255]));
    second.set_audio_clip(clip(1.3));

    let presentation = Presentation {
        title: "Timing".to_string(),
        summary: String::new(),
        slides: vec![first, second],
    };

    let config = TimelineConfig {
        fps: 30,
        lead_in: Duration::from_millis(500),
        trailing_margin: Duration::from_millis(500),
    };
    let timeline = Timeline::new(config).unwrap();
    let mut renderer = FrameRenderer::new(RenderTheme::new(Arc::new(Vec::new())));
    let mut sink = FfmpegSink::new(FfmpegSinkOpts::new("Timing"));

    let mut progress = Vec::new();
    let mut on_slide = |done: usize, total: usize| progress.push((done, total));

    let artifact = timeline
        .record(
            &presentation,
            Canvas {
                width: 64,
                height: 64,
            },
            &mut renderer,
            &mut sink,
            scratch.path(),
            &mut on_slide,
        )
        .unwrap();

    // 0.5 lead-in + (0.8 + 0.5) + (1.3 + 0.5) = 3.6 s of held frames.
    assert!((artifact.duration_secs - 3.6).abs() < 1.0 / 30.0);
    assert!(!artifact.bytes.is_empty());
    assert_eq!(progress, vec![(1, 2), (2, 2)]);

    // The narration scratch file was released after the encoder finished.
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

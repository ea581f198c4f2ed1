use std::collections::BTreeSet;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::error::{SlidecastError, SlidecastResult};
use crate::render::FrameRGBA;

/// Absolute 0-based frame index in output timeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameIndex(pub u64);

/// Target video bitrate in bits per second.
///
/// Higher targets destabilize long-running encodes; raise with care.
pub const DEFAULT_VIDEO_BITRATE: u32 = 2_500_000;

/// Output container of the negotiated encoder configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    Webm,
    /// Fragmented MP4, required for streaming the muxed output through a pipe.
    FragmentedMp4,
}

impl Container {
    pub fn extension(self) -> &'static str {
        match self {
            Container::Webm => "webm",
            Container::FragmentedMp4 => "mp4",
        }
    }

    fn mux_format(self) -> &'static str {
        match self {
            Container::Webm => "webm",
            Container::FragmentedMp4 => "mp4",
        }
    }
}

/// One container/codec pair the sink is willing to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncoderCandidate {
    pub container: Container,
    pub video_encoder: &'static str,
    pub audio_encoder: &'static str,
}

/// Preference order: royalty-free WebM first, then the widely-supported MP4
/// fallback.
pub const ENCODER_PREFERENCES: [EncoderCandidate; 3] = [
    EncoderCandidate {
        container: Container::Webm,
        video_encoder: "libvpx-vp9",
        audio_encoder: "libopus",
    },
    EncoderCandidate {
        container: Container::Webm,
        video_encoder: "libvpx",
        audio_encoder: "libopus",
    },
    EncoderCandidate {
        container: Container::FragmentedMp4,
        video_encoder: "libx264",
        audio_encoder: "aac",
    },
];

/// The set of encoder names the runtime ffmpeg build provides.
#[derive(Clone, Debug, Default)]
pub struct EncoderInventory {
    names: BTreeSet<String>,
}

impl EncoderInventory {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Query `ffmpeg -encoders` once and parse the available encoder names.
    pub fn probe() -> SlidecastResult<Self> {
        let out = Command::new("ffmpeg")
            .args(["-hide_banner", "-encoders"])
            .output()
            .map_err(|e| {
                SlidecastError::encoder_unsupported(format!(
                    "ffmpeg is required for encoding but could not be invoked: {e}"
                ))
            })?;
        if !out.status.success() {
            return Err(SlidecastError::encoder_unsupported(format!(
                "ffmpeg -encoders failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(Self::from_names(parse_encoder_names(
            &String::from_utf8_lossy(&out.stdout),
        )))
    }

    pub fn supports(&self, encoder: &str) -> bool {
        self.names.contains(encoder)
    }
}

/// Parse the name column of `ffmpeg -encoders` output.
fn parse_encoder_names(output: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut past_header = false;
    for line in output.lines() {
        if !past_header {
            if line.trim_start().starts_with("----") {
                past_header = true;
            }
            continue;
        }
        let mut tokens = line.split_whitespace();
        let (Some(_flags), Some(name)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        names.push(name.to_string());
    }
    names
}

/// Select the first preference-ordered candidate the inventory supports.
pub fn negotiate(inventory: &EncoderInventory) -> SlidecastResult<EncoderCandidate> {
    for candidate in ENCODER_PREFERENCES {
        if inventory.supports(candidate.video_encoder) && inventory.supports(candidate.audio_encoder)
        {
            tracing::debug!(
                video = candidate.video_encoder,
                audio = candidate.audio_encoder,
                container = candidate.container.extension(),
                "negotiated encoder configuration"
            );
            return Ok(candidate);
        }
    }
    let tried = ENCODER_PREFERENCES
        .iter()
        .map(|c| format!("{}+{}", c.video_encoder, c.audio_encoder))
        .collect::<Vec<_>>()
        .join(", ");
    Err(SlidecastError::encoder_unsupported(format!(
        "none of the candidate encoder pairs are available (tried {tried})"
    )))
}

/// Raw PCM narration input for the sink.
#[derive(Clone, Debug)]
pub struct AudioInput {
    /// Path to interleaved `f32le` PCM data.
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Configuration provided to a [`RecordingSink`] at the start of a recording.
#[derive(Clone, Debug)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub audio: Option<AudioInput>,
}

impl SinkConfig {
    pub fn validate(&self) -> SlidecastResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SlidecastError::validation(
                "sink width/height must be non-zero",
            ));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(SlidecastError::validation(
                "sink width/height must be even (required for yuv420p output)",
            ));
        }
        if self.fps == 0 {
            return Err(SlidecastError::validation("sink fps must be non-zero"));
        }
        if let Some(audio) = &self.audio {
            if audio.sample_rate == 0 {
                return Err(SlidecastError::validation(
                    "audio sample_rate must be non-zero when audio is enabled",
                ));
            }
            if audio.channels == 0 {
                return Err(SlidecastError::validation(
                    "audio channels must be non-zero when audio is enabled",
                ));
            }
        }
        Ok(())
    }
}

/// The finished muxed output: one video track, one audio track.
#[derive(Clone, Debug)]
pub struct EncodedArtifact {
    pub bytes: Vec<u8>,
    pub container: Container,
    pub suggested_filename: String,
    pub duration_secs: f64,
}

/// Sink contract for consuming rendered frames in timeline order.
///
/// `push_frame` is called with strictly increasing [`FrameIndex`] values
/// between `begin` and `end`.
pub trait RecordingSink {
    fn begin(&mut self, cfg: SinkConfig) -> SlidecastResult<()>;
    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> SlidecastResult<()>;
    fn end(&mut self) -> SlidecastResult<EncodedArtifact>;
}

/// Derive a filesystem-safe output filename from the presentation title.
pub fn suggested_filename(title: &str, container: Container) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_matches('-');
    let stem = if slug.is_empty() { "presentation" } else { slug };
    format!("{stem}.{}", container.extension())
}

/// Options for [`FfmpegSink`].
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    /// Presentation title, used for the suggested output filename.
    pub title: String,
    /// Background color used to flatten alpha (RGBA8, straight alpha).
    pub bg_rgba: [u8; 4],
    /// Video track bitrate in bits per second.
    pub video_bitrate: u32,
}

impl FfmpegSinkOpts {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            bg_rgba: [0, 0, 0, 255],
            video_bitrate: DEFAULT_VIDEO_BITRATE,
        }
    }
}

/// Sink that spawns the system `ffmpeg`, streams raw frames to its stdin and
/// collects the muxed container from its stdout.
///
/// Encoded chunks are accumulated as they arrive and concatenated into one
/// blob only at `end`; empty reads are never appended.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,

    selection: Option<EncoderCandidate>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<Vec<u8>>>>>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    scratch: Vec<u8>,
    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
    frames_pushed: u64,
}

impl FfmpegSink {
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            selection: None,
            child: None,
            stdin: None,
            stdout_drain: None,
            stderr_drain: None,
            scratch: Vec::new(),
            cfg: None,
            last_idx: None,
            frames_pushed: 0,
        }
    }

    /// The encoder configuration negotiated in `begin`, if any.
    pub fn selection(&self) -> Option<EncoderCandidate> {
        self.selection
    }
}

impl RecordingSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> SlidecastResult<()> {
        cfg.validate()?;

        let inventory = EncoderInventory::probe()?;
        let selection = negotiate(&inventory)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
        ]);

        if let Some(audio) = cfg.audio.as_ref() {
            cmd.args([
                "-f",
                "f32le",
                "-ar",
                &audio.sample_rate.to_string(),
                "-ac",
                &audio.channels.to_string(),
                "-i",
            ])
            .arg(&audio.path);
        }

        cmd.args([
            "-c:v",
            selection.video_encoder,
            "-b:v",
            &self.opts.video_bitrate.to_string(),
            "-pix_fmt",
            "yuv420p",
        ]);

        if cfg.audio.is_some() {
            cmd.args(["-c:a", selection.audio_encoder, "-shortest"]);
        } else {
            cmd.arg("-an");
        }

        if selection.container == Container::FragmentedMp4 {
            cmd.args(["-movflags", "frag_keyframe+empty_moov"]);
        }
        cmd.args(["-f", selection.container.mux_format(), "pipe:1"]);

        let mut child = cmd.spawn().map_err(|e| {
            SlidecastError::encoder_runtime(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            SlidecastError::encoder_runtime("failed to open ffmpeg stdin (unexpected)")
        })?;
        let mut stdout = child.stdout.take().ok_or_else(|| {
            SlidecastError::encoder_runtime("failed to open ffmpeg stdout (unexpected)")
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            SlidecastError::encoder_runtime("failed to open ffmpeg stderr (unexpected)")
        })?;

        let stdout_drain = std::thread::spawn(move || {
            let mut chunks: Vec<Vec<u8>> = Vec::new();
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = stdout.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                chunks.push(buf[..n].to_vec());
            }
            Ok(chunks)
        });
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        self.scratch = vec![0u8; (cfg.width * cfg.height * 4) as usize];
        self.selection = Some(selection);
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stdout_drain = Some(stdout_drain);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_idx = None;
        self.frames_pushed = 0;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> SlidecastResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| SlidecastError::encoder_runtime("ffmpeg sink not started"))?;
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(SlidecastError::encoder_runtime(
                "ffmpeg sink received out-of-order frame index",
            ));
        }
        self.last_idx = Some(idx);

        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(SlidecastError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        if frame.data.len() != self.scratch.len() {
            return Err(SlidecastError::validation(
                "frame.data size mismatch with width*height*4",
            ));
        }

        flatten_to_opaque_rgba8(
            &mut self.scratch,
            &frame.data,
            frame.premultiplied,
            self.opts.bg_rgba,
        )?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(SlidecastError::encoder_runtime(
                "ffmpeg sink is already finalized",
            ));
        };

        use std::io::Write as _;
        stdin.write_all(&self.scratch).map_err(|e| {
            SlidecastError::encoder_runtime(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        self.frames_pushed += 1;
        Ok(())
    }

    fn end(&mut self) -> SlidecastResult<EncodedArtifact> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| SlidecastError::encoder_runtime("ffmpeg sink not started"))?;

        let status = child.wait().map_err(|e| {
            SlidecastError::encoder_runtime(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;

        let chunks = match self.stdout_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| SlidecastError::encoder_runtime("ffmpeg stdout drain thread panicked"))?
                .map_err(|e| {
                    SlidecastError::encoder_runtime(format!("ffmpeg stdout read failed: {e}"))
                })?,
            None => Vec::new(),
        };
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| SlidecastError::encoder_runtime("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| {
                    SlidecastError::encoder_runtime(format!("ffmpeg stderr read failed: {e}"))
                })?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(SlidecastError::encoder_runtime(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }

        let cfg = self
            .cfg
            .take()
            .ok_or_else(|| SlidecastError::encoder_runtime("ffmpeg sink not started"))?;
        let selection = self
            .selection
            .ok_or_else(|| SlidecastError::encoder_runtime("ffmpeg sink has no negotiated encoder"))?;

        Ok(EncodedArtifact {
            bytes: chunks.concat(),
            container: selection.container,
            suggested_filename: suggested_filename(&self.opts.title, selection.container),
            duration_secs: (self.frames_pushed as f64) / f64::from(cfg.fps),
        })
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        // Reclaim the child on abandoned recordings.
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(FrameIndex, FrameRGBA)>,
    last_idx: Option<FrameIndex>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<&SinkConfig> {
        self.cfg.as_ref()
    }

    pub fn frames(&self) -> &[(FrameIndex, FrameRGBA)] {
        &self.frames
    }
}

impl RecordingSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> SlidecastResult<()> {
        cfg.validate()?;
        self.cfg = Some(cfg);
        self.frames.clear();
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> SlidecastResult<()> {
        if self.cfg.is_none() {
            return Err(SlidecastError::encoder_runtime("in-memory sink not started"));
        }
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(SlidecastError::encoder_runtime(
                "in-memory sink received out-of-order frame index",
            ));
        }
        self.last_idx = Some(idx);
        self.frames.push((idx, frame.clone()));
        Ok(())
    }

    fn end(&mut self) -> SlidecastResult<EncodedArtifact> {
        let cfg = self
            .cfg
            .clone()
            .ok_or_else(|| SlidecastError::encoder_runtime("in-memory sink not started"))?;
        Ok(EncodedArtifact {
            bytes: Vec::new(),
            container: Container::Webm,
            suggested_filename: suggested_filename("in-memory", Container::Webm),
            duration_secs: (self.frames.len() as f64) / f64::from(cfg.fps),
        })
    }
}

fn flatten_to_opaque_rgba8(
    dst: &mut [u8],
    src: &[u8],
    src_is_premul: bool,
    bg_rgba: [u8; 4],
) -> SlidecastResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(SlidecastError::validation(
            "flatten_to_opaque_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    let bg_r = bg_rgba[0] as u16;
    let bg_g = bg_rgba[1] as u16;
    let bg_b = bg_rgba[2] as u16;

    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = s[3] as u16;
        if a == 255 {
            d.copy_from_slice(s);
            d[3] = 255;
            continue;
        }

        let inv = 255u16 - a;

        let (r, g, b) = if src_is_premul {
            (
                s[0] as u16 + mul_div255(bg_r, inv),
                s[1] as u16 + mul_div255(bg_g, inv),
                s[2] as u16 + mul_div255(bg_b, inv),
            )
        } else {
            (
                mul_div255(s[0] as u16, a) + mul_div255(bg_r, inv),
                mul_div255(s[1] as u16, a) + mul_div255(bg_g, inv),
                mul_div255(s[2] as u16, a) + mul_div255(bg_b, inv),
            )
        };

        d[0] = r.min(255) as u8;
        d[1] = g.min(255) as u8;
        d[2] = b.min(255) as u8;
        d[3] = 255;
    }

    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

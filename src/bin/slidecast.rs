use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use slidecast::{
    AnalysisResponse, AnalysisService, Canvas, DocumentRasterizer, EncoderInventory, FfmpegSink,
    FfmpegSinkOpts, HttpVoiceService, Phase, Pipeline, RasterizedDocument, RenderTheme,
    SlidecastResult, TimelineConfig, decode_page_image, negotiate, parse_response,
};

#[derive(Parser, Debug)]
#[command(name = "slidecast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an analyzed document into a narrated video (requires `ffmpeg` on PATH).
    Render(RenderArgs),
    /// Print the encoder configuration negotiated against the local ffmpeg.
    Encoders,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Analysis response JSON ({presentationTitle, summary, slides}).
    #[arg(long = "analysis")]
    analysis_path: PathBuf,

    /// Directory of rendered page images (sorted by filename). Omit for
    /// structured sources without page captures.
    #[arg(long)]
    pages: Option<PathBuf>,

    /// Output file path. Defaults to a filename derived from the title.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Voice service endpoint URL.
    #[arg(long = "voice-endpoint")]
    voice_endpoint: String,

    /// Voice name requested from the service.
    #[arg(long, default_value = "narrator")]
    voice: String,

    /// TTF/OTF font used for synthesized slide layouts. Defaults to the
    /// first font found in the system font directories.
    #[arg(long)]
    font: Option<PathBuf>,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Silent lead-in before the first slide's narration, in milliseconds.
    #[arg(long = "lead-in-ms", default_value_t = 500)]
    lead_in_ms: u64,

    /// Trailing-silence pad per slide, in milliseconds.
    #[arg(long = "margin-ms", default_value_t = 500)]
    margin_ms: u64,
}

/// Loads pre-rendered page images from a directory, standing in for the
/// document rasterizer.
struct DirectoryRasterizer {
    dir: Option<PathBuf>,
    /// Page count for structured sources without page captures.
    fallback_page_count: u32,
}

impl DocumentRasterizer for DirectoryRasterizer {
    fn rasterize(&self, _document: &[u8]) -> SlidecastResult<RasterizedDocument> {
        let Some(dir) = &self.dir else {
            return Ok(RasterizedDocument {
                pages: Vec::new(),
                page_count: self.fallback_page_count,
            });
        };

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("read pages directory '{}'", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("png") | Some("jpg") | Some("jpeg")
                )
            })
            .collect();
        paths.sort();

        let mut pages = Vec::with_capacity(paths.len());
        for path in &paths {
            let bytes = std::fs::read(path)
                .with_context(|| format!("read page image '{}'", path.display()))?;
            pages.push(decode_page_image(&bytes)?);
        }

        let page_count = pages.len() as u32;
        Ok(RasterizedDocument { pages, page_count })
    }
}

/// Serves a pre-generated analysis response from disk.
struct FileAnalysis {
    raw: String,
}

#[async_trait::async_trait]
impl AnalysisService for FileAnalysis {
    async fn analyze(
        &self,
        _document: &[u8],
        _page_count: u32,
    ) -> SlidecastResult<AnalysisResponse> {
        parse_response(&self.raw)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args).await,
        Command::Encoders => cmd_encoders(),
    }
}

fn cmd_encoders() -> anyhow::Result<()> {
    let inventory = EncoderInventory::probe()?;
    let selection = negotiate(&inventory)?;
    println!(
        "{} + {} -> .{}",
        selection.video_encoder,
        selection.audio_encoder,
        selection.container.extension()
    );
    Ok(())
}

async fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&args.analysis_path).with_context(|| {
        format!("read analysis response '{}'", args.analysis_path.display())
    })?;
    let response = parse_response(&raw)?;
    let title = response.presentation_title.clone();

    let font_path = match args.font {
        Some(path) => path,
        None => find_system_font().context(
            "no usable font found; pass --font with a TTF/OTF path",
        )?,
    };
    let font_bytes = std::fs::read(&font_path)
        .with_context(|| format!("read font '{}'", font_path.display()))?;
    tracing::info!(font = %font_path.display(), "using layout font");

    let rasterizer = DirectoryRasterizer {
        dir: args.pages,
        fallback_page_count: response.slides.len() as u32,
    };
    let analysis = FileAnalysis { raw: raw.clone() };
    let voice = HttpVoiceService::new(&args.voice_endpoint, &args.voice);

    let pipeline = Pipeline::new(
        &rasterizer,
        &analysis,
        &voice,
        RenderTheme::new(Arc::new(font_bytes)),
    )
    .with_canvas(Canvas {
        width: args.width,
        height: args.height,
    })
    .with_timeline(TimelineConfig {
        fps: args.fps,
        lead_in: std::time::Duration::from_millis(args.lead_in_ms),
        trailing_margin: std::time::Duration::from_millis(args.margin_ms),
    });

    let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(&title));
    let mut observe = |job: &slidecast::PipelineJob| {
        tracing::info!(
            phase = %job.phase(),
            progress = job.progress_percent(),
            "{}",
            job.status_message()
        );
    };

    let mut job = pipeline
        .run(raw.as_bytes(), &mut sink, None, &mut observe)
        .await;

    if job.phase() == Phase::Error {
        anyhow::bail!(
            "render failed: {}",
            job.error().unwrap_or("unknown error")
        );
    }

    let artifact = job
        .take_artifact()
        .context("completed run produced no artifact (unexpected)")?;
    let out_path = args
        .out
        .unwrap_or_else(|| PathBuf::from(&artifact.suggested_filename));
    std::fs::write(&out_path, &artifact.bytes)
        .with_context(|| format!("write output '{}'", out_path.display()))?;

    tracing::info!(
        out = %out_path.display(),
        duration_secs = artifact.duration_secs,
        bytes = artifact.bytes.len(),
        "render complete"
    );
    Ok(())
}

/// First TTF/OTF found under the common system font directories.
fn find_system_font() -> Option<PathBuf> {
    let mut roots: Vec<PathBuf> = vec![
        PathBuf::from("/usr/share/fonts"),
        PathBuf::from("/usr/local/share/fonts"),
        PathBuf::from("/System/Library/Fonts"),
        PathBuf::from("/Library/Fonts"),
        PathBuf::from("C:\\Windows\\Fonts"),
    ];
    if let Some(home) = std::env::var_os("HOME") {
        roots.push(Path::new(&home).join(".local/share/fonts"));
        roots.push(Path::new(&home).join(".fonts"));
    }

    for root in roots {
        if let Some(found) = find_font_under(&root) {
            return Some(found);
        }
    }
    None
}

fn find_font_under(dir: &Path) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in &entries {
        if path.is_dir() {
            if let Some(found) = find_font_under(path) {
                return Some(found);
            }
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("ttf") | Some("otf")
        ) {
            return Some(path.clone());
        }
    }
    None
}

//! Slidecast converts an analyzed slide document — page images, titles and
//! narration scripts — into a single narrated video: synthesized speech per
//! slide, one rendered frame per slide held for the clip's duration plus a
//! trailing margin, muxed by `ffmpeg` into the first negotiable
//! container/codec configuration.

#![forbid(unsafe_code)]

pub mod analysis;
pub mod encode;
pub mod error;
pub mod mix;
pub mod model;
pub mod pipeline;
pub mod render;
pub mod retry;
pub mod text;
pub mod timeline;
pub mod tts;

pub use analysis::{AnalysisResponse, AnalysisService, join_pages, parse_response};
pub use encode::{
    Container, EncodedArtifact, EncoderInventory, FfmpegSink, FfmpegSinkOpts, FrameIndex,
    InMemorySink, RecordingSink, SinkConfig, negotiate,
};
pub use error::{SlidecastError, SlidecastResult};
pub use model::{AudioClip, PageImage, Presentation, Slide, decode_page_image};
pub use pipeline::{DocumentRasterizer, Phase, Pipeline, PipelineJob, RasterizedDocument};
pub use render::{Canvas, FrameRGBA, FrameRenderer, RenderTheme};
pub use retry::RetryPolicy;
pub use timeline::{Schedule, Timeline, TimelineConfig, build_schedule};
pub use tts::{HttpVoiceService, NarrationSynthesizer, VoiceService};

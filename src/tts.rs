use base64::Engine as _;

use crate::error::{SlidecastError, SlidecastResult};
use crate::model::AudioClip;
use crate::retry::{self, RetryPolicy};

/// Sample rate of synthesized narration audio.
pub const NARRATION_SAMPLE_RATE: u32 = 24_000;
/// Narration is always mono.
pub const NARRATION_CHANNELS: u16 = 1;

/// Spoken in place of an empty narration script; synthesis is never invoked
/// with an empty string.
pub const PLACEHOLDER_SCRIPT: &str = "This slide has no narration.";

/// Upstream voice service returning raw 16-bit little-endian PCM at
/// [`NARRATION_SAMPLE_RATE`], mono.
#[async_trait::async_trait]
pub trait VoiceService: Send + Sync {
    async fn synthesize_raw(&self, text: &str) -> SlidecastResult<Vec<u8>>;
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoiceResponse {
    #[serde(default)]
    audio_content: Option<String>,
    #[serde(default)]
    block_reason: Option<String>,
}

/// HTTP voice service speaking a small JSON contract: POST
/// `{"text", "voice"}`, receive `{"audioContent": "<base64 pcm16le>"}` or a
/// `blockReason` on content-safety rejection.
pub struct HttpVoiceService {
    client: reqwest::Client,
    endpoint: String,
    voice: String,
}

impl HttpVoiceService {
    pub fn new(endpoint: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            voice: voice.into(),
        }
    }
}

#[async_trait::async_trait]
impl VoiceService for HttpVoiceService {
    async fn synthesize_raw(&self, text: &str) -> SlidecastResult<Vec<u8>> {
        let request = VoiceRequest {
            text,
            voice: &self.voice,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| SlidecastError::synthesis(format!("voice service request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SlidecastError::synthesis(format!(
                "voice service returned {status}: {}",
                body.trim()
            )));
        }

        let body: VoiceResponse = response
            .json()
            .await
            .map_err(|e| SlidecastError::synthesis(format!("voice service body unreadable: {e}")))?;

        if let Some(reason) = body.block_reason {
            return Err(SlidecastError::synthesis(format!(
                "voice service rejected the script: {reason}"
            )));
        }

        let encoded = body
            .audio_content
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SlidecastError::synthesis("voice service returned no audio payload"))?;

        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| SlidecastError::synthesis(format!("audio payload is not valid base64: {e}")))
    }
}

/// Turns a narration script into a decoded [`AudioClip`], retrying transient
/// upstream failures with exponential backoff.
pub struct NarrationSynthesizer<'a> {
    service: &'a dyn VoiceService,
    retry: RetryPolicy,
}

impl<'a> NarrationSynthesizer<'a> {
    pub fn new(service: &'a dyn VoiceService, retry: RetryPolicy) -> Self {
        Self { service, retry }
    }

    /// Synthesize `text`, substituting the placeholder phrase for
    /// empty/whitespace-only scripts.
    ///
    /// Content-safety rejections are retried along with every other failure;
    /// the final error after the policy is exhausted is surfaced.
    pub async fn synthesize(&self, text: &str) -> SlidecastResult<AudioClip> {
        let script = if text.trim().is_empty() {
            PLACEHOLDER_SCRIPT
        } else {
            text
        };

        let payload =
            retry::with_backoff(&self.retry, || self.service.synthesize_raw(script)).await?;
        decode_pcm16(&payload)
    }
}

/// Decode 16-bit little-endian PCM into normalized f32 samples.
///
/// Decoding works on an owned copy of the payload; the transport buffer is
/// not guaranteed 2-byte aligned and must never be reinterpreted in place.
pub fn decode_pcm16(payload: &[u8]) -> SlidecastResult<AudioClip> {
    if payload.is_empty() {
        return Err(SlidecastError::synthesis(
            "voice service returned an empty audio payload",
        ));
    }
    if !payload.len().is_multiple_of(2) {
        return Err(SlidecastError::synthesis(
            "audio payload has an odd byte length, expected 16-bit samples",
        ));
    }

    let bytes = payload.to_vec();
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();

    Ok(AudioClip {
        samples,
        sample_rate: NARRATION_SAMPLE_RATE,
        channels: NARRATION_CHANNELS,
    })
}

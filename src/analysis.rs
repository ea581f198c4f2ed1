use std::collections::BTreeMap;

use crate::error::{SlidecastError, SlidecastResult};
use crate::model::{Presentation, Slide};

/// Narration text given to pages the analysis service said nothing about.
pub const PLACEHOLDER_NOTES: &str = "No narration was provided for this page.";

/// Wire contract of the document analysis service.
///
/// The slide list may arrive partial and unordered; [`join_pages`] is the only
/// supported way to turn it into a [`Presentation`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub presentation_title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub slides: Vec<AnalysisSlide>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSlide {
    pub page_index: u32,
    #[serde(default)]
    pub title: String,
    /// Bullet entries, present when the source was a structured slide
    /// archive rather than a rasterized document.
    #[serde(default)]
    pub content: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

/// Produces titles and narration scripts for a rendered document.
#[async_trait::async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(
        &self,
        document: &[u8],
        page_count: u32,
    ) -> SlidecastResult<AnalysisResponse>;
}

/// Parse a raw analysis payload, surfacing malformed JSON as a validation
/// failure instead of substituting an empty presentation.
pub fn parse_response(raw: &str) -> SlidecastResult<AnalysisResponse> {
    serde_json::from_str(raw)
        .map_err(|e| SlidecastError::validation(format!("malformed analysis payload: {e}")))
}

/// Outer-join the analysis slides against the known page count.
///
/// The response is treated as a partial, unordered mapping keyed by
/// `pageIndex`. Pages the service skipped get a deterministic placeholder
/// title/notes pair, so the final slide count always equals `page_count` and
/// no page is silently dropped. Entries beyond the page count are discarded
/// with a warning.
pub fn join_pages(response: AnalysisResponse, page_count: u32) -> Presentation {
    let mut by_index: BTreeMap<u32, AnalysisSlide> = BTreeMap::new();
    for slide in response.slides {
        if slide.page_index >= page_count {
            tracing::warn!(
                page_index = slide.page_index,
                page_count,
                "analysis returned a slide beyond the document page count, dropping"
            );
            continue;
        }
        if by_index.contains_key(&slide.page_index) {
            tracing::warn!(
                page_index = slide.page_index,
                "analysis returned a duplicate page index, keeping the first"
            );
            continue;
        }
        by_index.insert(slide.page_index, slide);
    }

    let slides = (0..page_count)
        .map(|idx| match by_index.remove(&idx) {
            Some(s) => {
                let title = if s.title.trim().is_empty() {
                    placeholder_title(idx)
                } else {
                    s.title
                };
                let mut slide = Slide::new(idx, title, s.notes);
                slide.content = s.content;
                slide
            }
            None => Slide::new(idx, placeholder_title(idx), PLACEHOLDER_NOTES),
        })
        .collect();

    Presentation {
        title: response.presentation_title,
        summary: response.summary,
        slides,
    }
}

fn placeholder_title(page_index: u32) -> String {
    format!("Page {}", page_index + 1)
}

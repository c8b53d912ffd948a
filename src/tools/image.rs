use super::{Analysis, ContentFindings, Tool, ToolContext, CONTENT_ANALYSIS, IMAGE_ANALYSIS};
use crate::error::ToolError;
use crate::models::{clamp_confidence, ToolDescriptor};
use crate::services::{ImageClassifier, ImageRef};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_MAX_IMAGES: usize = 5;

/// Looks for manipulated or AI-generated imagery on the page.
///
/// Each image is one classifier call, and each call spends one unit of the
/// shared quota.
pub struct ImageTool {
    descriptor: ToolDescriptor,
    classifier: Arc<dyn ImageClassifier>,
    max_images: usize,
}

impl ImageTool {
    pub fn new(classifier: Arc<dyn ImageClassifier>, max_images: usize) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                IMAGE_ANALYSIS,
                "Check page images for deepfakes, fake endorsements and manipulation",
                1,
            )
            .depends_on(CONTENT_ANALYSIS),
            classifier,
            max_images: max_images.max(1),
        }
    }

    /// The target's own image first, then page images, without duplicates.
    fn candidates(&self, ctx: &ToolContext<'_>) -> Result<Vec<ImageRef>, ToolError> {
        let content: ContentFindings = ctx.findings(CONTENT_ANALYSIS)?;
        let mut images: Vec<ImageRef> = Vec::new();
        let supplied = ctx.target.image_url.iter().map(|src| ImageRef {
            src: src.clone(),
            alt: String::new(),
        });
        for image in supplied.chain(content.page.images) {
            if !images.iter().any(|i| i.src == image.src) {
                images.push(image);
            }
        }
        images.truncate(self.max_images);
        Ok(images)
    }
}

#[async_trait]
impl Tool for ImageTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn analyze(&self, ctx: &ToolContext<'_>) -> Result<Analysis, ToolError> {
        let images = self.candidates(ctx)?;
        if images.is_empty() {
            return Err(ToolError::Unavailable("no images to analyze".to_string()));
        }

        info!("🖼️  Analyzing {} image(s)", images.len());
        let mut suspicious = Vec::new();
        let mut failures = Vec::new();
        let mut last_error = None;
        let mut confidence = 0u8;

        for image in &images {
            match self.classifier.classify_image(image).await {
                Ok(verdict) if verdict.suspicious => {
                    confidence = confidence.max(clamp_confidence(verdict.confidence));
                    suspicious.push(json!({
                        "src": image.src,
                        "confidence": clamp_confidence(verdict.confidence),
                        "reason": verdict.reason,
                        "deepfake_indicators": verdict.deepfake_indicators,
                    }));
                }
                Ok(_) => {}
                Err(err) => {
                    debug!("Image {} failed: {}", image.src, err);
                    failures.push(json!({ "src": image.src, "error": err.to_string() }));
                    last_error = Some(err);
                }
            }
        }

        if failures.len() == images.len() {
            if let Some(err) = last_error {
                return Err(err);
            }
        }

        Ok(Analysis::new(
            confidence,
            json!({
                "analyzed_count": images.len() - failures.len(),
                "suspicious_images": suspicious,
                "failed_images": failures,
            }),
        ))
    }
}

use super::{Analysis, ContentFindings, Tool, ToolContext, CONTENT_ANALYSIS, TEXT_ANALYSIS};
use crate::error::ToolError;
use crate::models::{clamp_confidence, ToolDescriptor};
use crate::services::page::truncate_chars;
use crate::services::{Likelihood, TextClassifier, TextVerdict};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Characters of text sent to the classifier.
pub const MAX_CLASSIFIER_CHARS: usize = 1500;

/// Classifies the page text for scam language and social engineering.
pub struct TextTool {
    descriptor: ToolDescriptor,
    classifier: Arc<dyn TextClassifier>,
}

impl TextTool {
    pub fn new(classifier: Arc<dyn TextClassifier>) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                TEXT_ANALYSIS,
                "Classify the page text for scam language and manipulation tactics",
                1,
            )
            .depends_on(CONTENT_ANALYSIS),
            classifier,
        }
    }
}

#[async_trait]
impl Tool for TextTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn analyze(&self, ctx: &ToolContext<'_>) -> Result<Analysis, ToolError> {
        let supplied = ctx
            .target
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let text = match supplied {
            Some(text) => text,
            None => {
                let content: ContentFindings = ctx.findings(CONTENT_ANALYSIS)?;
                format!("{}\n{}", content.page.title, content.page.text)
                    .trim()
                    .to_string()
            }
        };
        if text.is_empty() {
            return Err(ToolError::Unavailable(
                "no text content available".to_string(),
            ));
        }

        let sample = truncate_chars(&text, MAX_CLASSIFIER_CHARS);
        let verdict = self.classifier.classify_text(&sample).await?;

        Ok(Analysis::new(
            verdict_confidence(&verdict),
            json!({
                "scam_likelihood": verdict.scam_likelihood,
                "classifier_confidence": clamp_confidence(verdict.confidence),
                "red_flags": verdict.red_flags,
                "social_engineering_tactics": verdict.social_engineering_tactics,
                "overall_assessment": verdict.overall_assessment,
                "analyzed_chars": sample.chars().count(),
            }),
        ))
    }
}

/// Risk confidence: the likelihood level scaled by the classifier's certainty.
pub fn verdict_confidence(verdict: &TextVerdict) -> u8 {
    let base = match verdict.scam_likelihood {
        Likelihood::Low => 15.0,
        Likelihood::Medium => 55.0,
        Likelihood::High => 95.0,
    };
    let certainty = f64::from(clamp_confidence(verdict.confidence)) / 100.0;
    clamp_confidence(base * certainty)
}

use super::{host_matches_suffix, Analysis, Tool, ToolContext, REPUTATION_LOOKUP};
use crate::error::ToolError;
use crate::models::ToolDescriptor;
use crate::services::ReputationService;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Checks the URL against a threat reputation database.
pub struct ReputationTool {
    descriptor: ToolDescriptor,
    service: Arc<dyn ReputationService>,
    excluded_suffixes: Vec<String>,
}

impl ReputationTool {
    pub fn new(service: Arc<dyn ReputationService>, excluded_suffixes: Vec<String>) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                REPUTATION_LOOKUP,
                "Check the URL against known malware and phishing lists",
                0,
            ),
            service,
            excluded_suffixes,
        }
    }
}

#[async_trait]
impl Tool for ReputationTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn analyze(&self, ctx: &ToolContext<'_>) -> Result<Analysis, ToolError> {
        let host = ctx
            .target
            .host()
            .ok_or_else(|| ToolError::Unavailable(format!("no host in {}", ctx.target.url)))?;

        if let Some(suffix) = self
            .excluded_suffixes
            .iter()
            .find(|s| host_matches_suffix(&host, s))
        {
            return Err(ToolError::Unavailable(format!(
                "{} is excluded from reputation checks ({})",
                host, suffix
            )));
        }

        let report = self.service.check(&ctx.target.url).await?;
        Ok(Analysis::new(
            report.raw_score,
            json!({
                "threats_found": report.threats_found,
                "threat_count": report.threats_found.len(),
                "is_safe": report.threats_found.is_empty(),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{Target, ToolStatus};
    use crate::services::ReputationReport;
    use std::collections::BTreeMap;

    struct FakeReputation(Result<ReputationReport, ToolError>);

    #[async_trait]
    impl ReputationService for FakeReputation {
        async fn check(&self, _url: &str) -> Result<ReputationReport, ToolError> {
            self.0.clone()
        }
    }

    fn tool(result: Result<ReputationReport, ToolError>) -> ReputationTool {
        ReputationTool::new(
            Arc::new(FakeReputation(result)),
            vec![".gov".to_string(), ".mil".to_string(), "localhost".to_string()],
        )
    }

    #[tokio::test]
    async fn test_threats_become_confidence() {
        let tool = tool(Ok(ReputationReport {
            threats_found: vec!["MALWARE".to_string()],
            raw_score: 90,
        }));
        let target = Target::new("https://bad.example.net/x");
        let prior = BTreeMap::new();
        let result = tool.execute(&ToolContext::new(&target, &prior)).await;
        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.confidence, 90);
        assert_eq!(result.findings["is_safe"], false);
    }

    #[tokio::test]
    async fn test_excluded_domain_is_error() {
        let tool = tool(Ok(ReputationReport::default()));
        let target = Target::new("https://www.irs.gov/refund");
        let prior = BTreeMap::new();
        let result = tool.execute(&ToolContext::new(&target, &prior)).await;
        assert_eq!(result.status, ToolStatus::Error);
        assert_eq!(result.error_kind, Some(ErrorKind::Unavailable));
        assert!(!result.is_scored());
    }

    #[tokio::test]
    async fn test_missing_key_is_error() {
        let tool = tool(Err(ToolError::Configuration("missing key".to_string())));
        let target = Target::new("https://example.com");
        let prior = BTreeMap::new();
        let result = tool.execute(&ToolContext::new(&target, &prior)).await;
        assert_eq!(result.error_kind, Some(ErrorKind::Configuration));
        assert_eq!(result.confidence, 0);
    }
}

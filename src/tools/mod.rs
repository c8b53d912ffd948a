//! Investigation tools.
//!
//! A tool exposes a static [`ToolDescriptor`] and an async `analyze` step.
//! The provided [`Tool::execute`] wraps `analyze` so that every outcome,
//! including collaborator failures, comes back as a [`ToolResult`].

pub mod content;
pub mod domain;
pub mod image;
pub mod reputation;
pub mod text;

pub use content::{ContentFindings, ContentTool};
pub use domain::DomainTool;
pub use image::ImageTool;
pub use reputation::ReputationTool;
pub use text::TextTool;

use crate::error::ToolError;
use crate::models::{Target, ToolDescriptor, ToolResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub const REPUTATION_LOOKUP: &str = "reputation_lookup";
pub const DOMAIN_ANALYSIS: &str = "domain_analysis";
pub const CONTENT_ANALYSIS: &str = "content_analysis";
pub const IMAGE_ANALYSIS: &str = "image_analysis";
pub const TEXT_ANALYSIS: &str = "text_analysis";

/// What a tool hands back on success.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// Risk confidence, 0-100.
    pub confidence: u8,
    pub findings: Value,
}

impl Analysis {
    pub fn new(confidence: u8, findings: Value) -> Self {
        Self {
            confidence: confidence.min(100),
            findings,
        }
    }
}

/// Inputs available to a tool while it runs.
#[derive(Debug, Clone, Copy)]
pub struct ToolContext<'a> {
    pub target: &'a Target,
    /// Results of the tools that already ran in this investigation.
    pub prior: &'a BTreeMap<String, ToolResult>,
}

impl<'a> ToolContext<'a> {
    pub fn new(target: &'a Target, prior: &'a BTreeMap<String, ToolResult>) -> Self {
        Self { target, prior }
    }

    /// Typed findings of a successful earlier tool.
    pub fn findings<T: DeserializeOwned>(&self, tool: &str) -> Result<T, ToolError> {
        let result = self
            .prior
            .get(tool)
            .filter(|r| r.is_success())
            .ok_or_else(|| ToolError::Unavailable(format!("no successful {} result", tool)))?;
        serde_json::from_value(result.findings.clone()).map_err(|e| {
            ToolError::malformed(
                format!("{} findings: {}", tool, e),
                result.findings.to_string(),
            )
        })
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Run the analysis proper.
    async fn analyze(&self, ctx: &ToolContext<'_>) -> Result<Analysis, ToolError>;

    /// Run the tool, converting every failure into an `Error` result.
    async fn execute(&self, ctx: &ToolContext<'_>) -> ToolResult {
        let start = Instant::now();
        let name = self.name();
        let result = match self.analyze(ctx).await {
            Ok(analysis) => {
                debug!("{} finished with confidence {}", name, analysis.confidence);
                ToolResult::success(name, analysis.confidence, analysis.findings)
            }
            Err(err) => {
                warn!("{} failed: {}", name, err);
                let result = ToolResult::error(name, &err);
                if self.descriptor().neutral_on_error {
                    result.as_neutral()
                } else {
                    result
                }
            }
        };
        result.with_duration(start.elapsed().as_millis() as u64)
    }
}

struct Registered {
    tool: Arc<dyn Tool>,
    /// Copy of the tool's descriptor; scoring flags may be overridden here.
    descriptor: ToolDescriptor,
}

/// Named set of tools, kept in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Registered>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let descriptor = tool.descriptor().clone();
        match self
            .entries
            .iter_mut()
            .find(|e| e.descriptor.name == descriptor.name)
        {
            Some(existing) => {
                existing.tool = tool;
                existing.descriptor = descriptor;
            }
            None => self.entries.push(Registered { tool, descriptor }),
        }
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Count Error results of the named tools as neutral zeros.
    pub fn set_neutral_on_error(&mut self, names: &[String]) {
        for entry in &mut self.entries {
            if names.contains(&entry.descriptor.name) {
                entry.descriptor.neutral_on_error = true;
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.entries
            .iter()
            .find(|e| e.descriptor.name == name)
            .map(|e| &e.tool)
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.entries
            .iter()
            .find(|e| e.descriptor.name == name)
            .map(|e| &e.descriptor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptor(name).is_some()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.entries.iter().map(|e| e.descriptor.clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.descriptor.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether `host` is `suffix` itself or lies under it.
pub(crate) fn host_matches_suffix(host: &str, suffix: &str) -> bool {
    let suffix = suffix.trim_start_matches('.').to_lowercase();
    if suffix.is_empty() {
        return false;
    }
    host == suffix || host.ends_with(&format!(".{}", suffix))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted tools shared by planner and orchestrator tests.

    use super::*;
    use crate::ratelimit::RateLimiter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub enum Behavior {
        Succeed(u8),
        Fail(ToolError),
        Panic,
        Sleep(std::time::Duration),
        /// Take this many limiter admissions, then succeed.
        Spend(Arc<RateLimiter>, u32),
    }

    pub struct ScriptedTool {
        pub descriptor: ToolDescriptor,
        pub behavior: Behavior,
        pub calls: AtomicUsize,
    }

    impl ScriptedTool {
        pub fn new(name: &str, cost: u32, deps: &[&str], behavior: Behavior) -> Arc<Self> {
            let mut descriptor = ToolDescriptor::new(name, "scripted", cost);
            for dep in deps {
                descriptor = descriptor.depends_on(dep);
            }
            Arc::new(Self {
                descriptor,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Tool for ScriptedTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn analyze(&self, _ctx: &ToolContext<'_>) -> Result<Analysis, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Succeed(c) => Ok(Analysis::new(*c, serde_json::json!({ "raw": c }))),
                Behavior::Fail(err) => Err(err.clone()),
                Behavior::Panic => panic!("scripted panic"),
                Behavior::Sleep(d) => {
                    tokio::time::sleep(*d).await;
                    Ok(Analysis::new(1, Value::Null))
                }
                Behavior::Spend(limiter, calls) => {
                    for _ in 0..*calls {
                        limiter.acquire().await;
                    }
                    Ok(Analysis::new(10, Value::Null))
                }
            }
        }
    }

    /// The five standard tool names with their standard costs and dependencies.
    pub fn standard_registry(
        behaviors: impl Fn(&str) -> Behavior,
    ) -> (ToolRegistry, Vec<Arc<ScriptedTool>>) {
        let specs: [(&str, u32, &[&str]); 5] = [
            (REPUTATION_LOOKUP, 0, &[]),
            (DOMAIN_ANALYSIS, 0, &[]),
            (CONTENT_ANALYSIS, 0, &[]),
            (IMAGE_ANALYSIS, 1, &[CONTENT_ANALYSIS]),
            (TEXT_ANALYSIS, 1, &[CONTENT_ANALYSIS]),
        ];
        let mut registry = ToolRegistry::new();
        let mut tools = Vec::new();
        for (name, cost, deps) in specs {
            let tool = ScriptedTool::new(name, cost, deps, behaviors(name));
            registry.register(tool.clone());
            tools.push(tool);
        }
        (registry, tools)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::models::ToolStatus;

    #[tokio::test]
    async fn test_execute_converts_errors() {
        let tool = ScriptedTool::new(
            "reputation_lookup",
            0,
            &[],
            Behavior::Fail(ToolError::Configuration("no key".to_string())),
        );
        let target = Target::new("https://example.com");
        let prior = BTreeMap::new();
        let result = tool.execute(&ToolContext::new(&target, &prior)).await;
        assert_eq!(result.status, ToolStatus::Error);
        assert_eq!(result.confidence, 0);
        assert!(result.error.unwrap().contains("no key"));
    }

    #[tokio::test]
    async fn test_execute_success() {
        let tool = ScriptedTool::new("domain_analysis", 0, &[], Behavior::Succeed(40));
        let target = Target::new("https://example.com");
        let prior = BTreeMap::new();
        let result = tool.execute(&ToolContext::new(&target, &prior)).await;
        assert!(result.is_success());
        assert_eq!(result.confidence, 40);
        assert_eq!(tool.calls(), 1);
    }

    #[test]
    fn test_registry_replaces_and_keeps_order() {
        let mut registry = ToolRegistry::new()
            .with(ScriptedTool::new("a", 0, &[], Behavior::Succeed(1)))
            .with(ScriptedTool::new("b", 0, &[], Behavior::Succeed(1)));
        registry.register(ScriptedTool::new("a", 2, &[], Behavior::Succeed(1)));
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.descriptor("a").unwrap().external_cost, 2);
    }

    #[test]
    fn test_set_neutral_on_error() {
        let (mut registry, _) = standard_registry(|_| Behavior::Succeed(0));
        registry.set_neutral_on_error(&["domain_analysis".to_string()]);
        assert!(registry.descriptor(DOMAIN_ANALYSIS).unwrap().neutral_on_error);
        assert!(!registry.descriptor(CONTENT_ANALYSIS).unwrap().neutral_on_error);
    }

    #[test]
    fn test_context_findings_requires_success() {
        let target = Target::new("https://example.com");
        let mut prior = BTreeMap::new();
        prior.insert(
            "content_analysis".to_string(),
            ToolResult::skipped("content_analysis", "dependency".to_string()),
        );
        let ctx = ToolContext::new(&target, &prior);
        let err = ctx.findings::<Value>("content_analysis").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unavailable);
    }

    #[test]
    fn test_host_matches_suffix() {
        assert!(host_matches_suffix("irs.gov", ".gov"));
        assert!(host_matches_suffix("localhost", "localhost"));
        assert!(host_matches_suffix("app.localhost", "localhost"));
        assert!(!host_matches_suffix("notlocalhost", "localhost"));
        assert!(!host_matches_suffix("example.com", ""));
    }
}

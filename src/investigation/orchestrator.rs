//! Plan execution with per-tool fault isolation.

use crate::error::ToolError;
use crate::models::{InvestigationPlan, Target, ToolResult, ToolStatus};
use crate::tools::{ToolContext, ToolRegistry};
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default time budget of a single tool.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Results collected while a plan runs.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub results: BTreeMap<String, ToolResult>,
    /// Tool names in the order their results were recorded.
    pub order: Vec<String>,
}

impl Execution {
    pub(crate) fn record(&mut self, result: ToolResult) {
        self.order.push(result.tool_name.clone());
        self.results.insert(result.tool_name.clone(), result);
    }

    /// Results in execution order.
    pub fn ordered(&self) -> impl Iterator<Item = &ToolResult> {
        self.order.iter().filter_map(|name| self.results.get(name))
    }
}

/// Runs the tools of a plan one after another.
pub struct Orchestrator<'r> {
    registry: &'r ToolRegistry,
    tool_timeout: Duration,
    deadline: Option<Duration>,
}

impl<'r> Orchestrator<'r> {
    pub fn new(registry: &'r ToolRegistry) -> Self {
        Self {
            registry,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            deadline: None,
        }
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Overall budget; entries not started when it runs out become errors.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub async fn execute(&self, target: &Target, plan: &InvestigationPlan) -> Execution {
        let mut execution = Execution::default();
        self.execute_into(target, plan, &mut execution).await;
        execution
    }

    /// Execute `plan`, recording each result into `execution` as soon as it
    /// is known so a caller keeps partial results.
    pub async fn execute_into(
        &self,
        target: &Target,
        plan: &InvestigationPlan,
        execution: &mut Execution,
    ) {
        let started = Instant::now();
        let deadline = self.deadline.map(|d| started + d);

        for name in &plan.tools {
            if execution.results.contains_key(name) {
                debug!("{} already ran in this investigation", name);
                continue;
            }

            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let result = self.run_one(target, name, remaining, execution).await;
            info!(
                "{} {} → {} (confidence {}, {} ms)",
                result.status.emoji(),
                name,
                result.status,
                result.confidence,
                result.duration_ms
            );
            execution.record(result);
        }
    }

    async fn run_one(
        &self,
        target: &Target,
        name: &str,
        remaining: Option<Duration>,
        execution: &Execution,
    ) -> ToolResult {
        let (Some(tool), Some(descriptor)) =
            (self.registry.get(name), self.registry.descriptor(name))
        else {
            return ToolResult::error(
                name,
                &ToolError::Unavailable(format!("unknown tool '{}'", name)),
            );
        };

        if let Some(reason) = unmet_dependency(&descriptor.dependencies, &execution.results) {
            info!("⏭️  Skipping {}: {}", name, reason);
            return ToolResult::skipped(name, reason);
        }

        if remaining == Some(Duration::ZERO) {
            warn!("Deadline exceeded before {} started", name);
            let result = ToolResult::error(
                name,
                &ToolError::Fault("investigation deadline exceeded".to_string()),
            );
            return if descriptor.neutral_on_error {
                result.as_neutral()
            } else {
                result
            };
        }

        let (budget, limited_by_deadline) = match remaining {
            Some(left) if left < self.tool_timeout => (left, true),
            _ => (self.tool_timeout, false),
        };

        debug!("Running {} (budget {:?})", name, budget);
        let started = Instant::now();
        let ctx = ToolContext::new(target, &execution.results);
        let outcome = tokio::time::timeout(
            budget,
            AssertUnwindSafe(async { tool.execute(&ctx).await }).catch_unwind(),
        )
        .await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => ToolResult::error(
                name,
                &ToolError::Fault(format!("tool panicked: {}", panic_message(&*panic))),
            ),
            Err(_) if limited_by_deadline => ToolResult::error(
                name,
                &ToolError::Fault("investigation deadline exceeded".to_string()),
            ),
            Err(_) => ToolResult::error(
                name,
                &ToolError::Fault(format!("timed out after {:?}", budget)),
            ),
        };

        let result = if descriptor.neutral_on_error {
            result.as_neutral()
        } else {
            result
        };
        result.with_duration(started.elapsed().as_millis() as u64)
    }
}

/// Why a tool cannot run, if one of its dependencies did not succeed.
fn unmet_dependency(
    dependencies: &[String],
    results: &BTreeMap<String, ToolResult>,
) -> Option<String> {
    dependencies.iter().find_map(|dep| match results.get(dep) {
        None => Some(format!("dependency '{}' did not run", dep)),
        Some(r) if r.status != ToolStatus::Success => Some(format!(
            "dependency '{}' finished with status {}",
            dep, r.status
        )),
        Some(_) => None,
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

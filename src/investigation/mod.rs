//! Investigation lifecycle.
//!
//! An [`Investigator`] owns the tool registry, the planner and the scoring
//! table. Each call to [`Investigator::investigate`] walks one target
//! through Created → Planned → Executing → Aggregated → Classified →
//! Reported and always returns a report, even when tools fail.

pub mod orchestrator;
pub mod planner;

pub use orchestrator::{Execution, Orchestrator, DEFAULT_TOOL_TIMEOUT};
pub use planner::{InvestigationPlanner, PlanSignals, TriggerRule};

use crate::analysis::{aggregate, classify, ScoringWeights};
use crate::models::{InvestigationPhase, InvestigationPlan, InvestigationReport, Target};
use crate::ratelimit::RateLimiter;
use crate::services::PlanAdvisor;
use crate::tools::ToolRegistry;
use chrono::Utc;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Forward-only phase tracking for one investigation.
#[derive(Debug)]
struct PhaseTracker {
    phase: InvestigationPhase,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            phase: InvestigationPhase::Created,
        }
    }

    fn advance(&mut self, next: InvestigationPhase) {
        if next > self.phase {
            debug!("Investigation phase: {:?} → {:?}", self.phase, next);
            self.phase = next;
        } else {
            warn!("Ignoring backward phase transition {:?} → {:?}", self.phase, next);
        }
    }
}

pub struct Investigator {
    registry: ToolRegistry,
    planner: InvestigationPlanner,
    advisor: Option<Arc<dyn PlanAdvisor>>,
    limiter: Option<Arc<RateLimiter>>,
    weights: ScoringWeights,
    tool_timeout: Duration,
    deadline: Option<Duration>,
}

impl Investigator {
    pub fn new(registry: ToolRegistry, triggers: Vec<TriggerRule>) -> Self {
        let planner = InvestigationPlanner::new(registry.descriptors(), triggers);
        Self {
            registry,
            planner,
            advisor: None,
            limiter: None,
            weights: ScoringWeights::default(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            deadline: None,
        }
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn PlanAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    /// Shared quota limiter; reports then carry the admissions of each run.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Plan for `target`, consulting the advisor when one is configured.
    pub async fn plan(&self, target: &Target, restrict: Option<Vec<String>>) -> InvestigationPlan {
        let advice = match &self.advisor {
            Some(advisor) => {
                info!("🧭 Asking plan advisor");
                let descriptors = self.planner.tools();
                Some(
                    advisor
                        .advise(target, descriptors)
                        .await
                        .map_err(|e| e.to_string()),
                )
            }
            None => None,
        };
        self.planner.plan(target, &PlanSignals { restrict, advice })
    }

    /// Investigate with every tool the planner picks.
    pub async fn investigate(&self, target: Target) -> InvestigationReport {
        self.investigate_with(target, None).await
    }

    /// Investigate, restricting candidates to `restrict` when given.
    pub async fn investigate_with(
        &self,
        target: Target,
        restrict: Option<Vec<String>>,
    ) -> InvestigationReport {
        let plan = self.plan(&target, restrict).await;
        self.run_plan(target, plan).await
    }

    /// Execute an existing plan and build the report.
    pub async fn run_plan(&self, target: Target, plan: InvestigationPlan) -> InvestigationReport {
        let started_at = Utc::now();
        let mut phases = PhaseTracker::new();
        phases.advance(InvestigationPhase::Planned);

        info!("🔍 Investigating {}", target.url);
        phases.advance(InvestigationPhase::Executing);

        let orchestrator = Orchestrator::new(&self.registry)
            .with_tool_timeout(self.tool_timeout)
            .with_deadline(self.deadline);
        let admitted_before = self.limiter.as_ref().map(|l| l.total_admitted());
        let mut execution = Execution::default();
        let completed = run_guarded(orchestrator.execute_into(&target, &plan, &mut execution)).await;
        if !completed {
            error!(
                "Execution aborted unexpectedly; reporting {} completed result(s)",
                execution.results.len()
            );
        }

        let quota_used = match (&self.limiter, admitted_before) {
            (Some(limiter), Some(before)) => {
                let used = limiter.total_admitted().saturating_sub(before);
                info!(
                    "📈 Quota: {} call(s) this run (estimated {}), {} in the current window",
                    used,
                    plan.estimated_cost,
                    limiter.in_flight_window().await
                );
                Some(used)
            }
            _ => None,
        };

        let score = aggregate(execution.ordered(), &self.weights);
        phases.advance(InvestigationPhase::Aggregated);

        let risk_level = classify(score.normalized_probability);
        phases.advance(InvestigationPhase::Classified);
        info!(
            "{} Risk: {} ({}%)",
            risk_level.emoji(),
            risk_level,
            score.normalized_probability
        );

        phases.advance(InvestigationPhase::Reported);
        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        InvestigationReport {
            target,
            plan,
            results: execution.results,
            execution_order: execution.order,
            score,
            risk_level,
            recommendation: risk_level.recommendation().to_string(),
            phase: phases.phase,
            started_at,
            completed_at,
            duration_seconds,
            quota_used,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Drive an execution that records into caller-owned state. Returns false
/// if it panicked; whatever it recorded before the panic is kept.
async fn run_guarded<F: Future<Output = ()>>(run: F) -> bool {
    AssertUnwindSafe(run).catch_unwind().await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::models::{RiskLevel, ToolDescriptor, ToolResult, ToolStatus};
    use crate::services::PlanAdvice;
    use crate::tools::testing::{standard_registry, Behavior};
    use crate::tools::{
        CONTENT_ANALYSIS, DOMAIN_ANALYSIS, IMAGE_ANALYSIS, REPUTATION_LOOKUP, TEXT_ANALYSIS,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedAdvisor {
        reply: Result<PlanAdvice, ToolError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PlanAdvisor for FixedAdvisor {
        async fn advise(
            &self,
            _target: &Target,
            _tools: &[ToolDescriptor],
        ) -> Result<PlanAdvice, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    #[tokio::test]
    async fn test_weighted_scenario_end_to_end() {
        let (registry, _) = standard_registry(|name| match name {
            REPUTATION_LOOKUP => Behavior::Succeed(90),
            DOMAIN_ANALYSIS => Behavior::Succeed(0),
            _ => Behavior::Succeed(10),
        });
        let investigator = Investigator::new(registry, Vec::new());
        let plan =
            InvestigationPlan::from_tools(&[REPUTATION_LOOKUP, DOMAIN_ANALYSIS, CONTENT_ANALYSIS]);

        let report = investigator
            .run_plan(Target::new("https://example.com"), plan)
            .await;

        assert_eq!(report.score.normalized_probability, 40);
        assert_eq!(report.risk_level, RiskLevel::Moderate);
        assert_eq!(report.recommendation, RiskLevel::Moderate.recommendation());
        assert_eq!(report.phase, InvestigationPhase::Reported);
        assert_eq!(report.execution_order.len(), 3);
    }

    #[tokio::test]
    async fn test_image_without_content_is_skipped() {
        let (registry, _) = standard_registry(|_| Behavior::Succeed(100));
        let investigator = Investigator::new(registry, Vec::new());
        let plan = InvestigationPlan::from_tools(&[REPUTATION_LOOKUP, IMAGE_ANALYSIS]);

        let report = investigator
            .run_plan(Target::new("https://example.com"), plan)
            .await;

        assert_eq!(report.results[IMAGE_ANALYSIS].status, ToolStatus::Skipped);
        assert!(report
            .score
            .contributing_factors
            .iter()
            .all(|f| f.tool_name != IMAGE_ANALYSIS));
        // Only reputation's weight counts.
        assert!((report.score.max_possible_weighted_sum - 35.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_all_failures_still_report() {
        let (registry, _) = standard_registry(|_| {
            Behavior::Fail(ToolError::TransientNetwork("offline".to_string()))
        });
        let investigator = Investigator::new(registry, Vec::new());
        let report = investigator
            .investigate(Target::new("https://example.com"))
            .await;

        assert_eq!(report.results.len(), 5);
        assert_eq!(report.score.normalized_probability, 0);
        assert_eq!(report.risk_level, RiskLevel::Minimal);
        assert_eq!(report.count_by_status(ToolStatus::Error), 3);
        assert_eq!(report.count_by_status(ToolStatus::Skipped), 2);
        assert_eq!(report.phase, InvestigationPhase::Reported);
    }

    #[tokio::test]
    async fn test_advisor_plan_is_used() {
        let (registry, tools) = standard_registry(|_| Behavior::Succeed(50));
        let advisor = Arc::new(FixedAdvisor {
            reply: Ok(PlanAdvice {
                tools: vec![TEXT_ANALYSIS.to_string()],
                rationale: "text-heavy page".to_string(),
                priority: None,
            }),
            calls: AtomicUsize::new(0),
        });
        let investigator = Investigator::new(registry, Vec::new()).with_advisor(advisor.clone());

        let report = investigator
            .investigate(Target::new("https://example.com"))
            .await;

        assert_eq!(advisor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.execution_order, vec![CONTENT_ANALYSIS, TEXT_ANALYSIS]);
        let reputation = tools
            .iter()
            .find(|t| t.descriptor.name == REPUTATION_LOOKUP)
            .unwrap();
        assert_eq!(reputation.calls(), 0);
    }

    #[tokio::test]
    async fn test_advisor_failure_uses_default_plan() {
        let (registry, _) = standard_registry(|_| Behavior::Succeed(50));
        let advisor = Arc::new(FixedAdvisor {
            reply: Err(ToolError::malformed("model reply: eof", "")),
            calls: AtomicUsize::new(0),
        });
        let investigator = Investigator::new(registry, vec![TriggerRule::deepfake()])
            .with_advisor(advisor);

        let report = investigator
            .investigate(Target::new("https://example.com"))
            .await;

        assert_eq!(report.execution_order.len(), 5);
        assert!(report.plan.rationale.contains("planning fault"));
        assert_eq!(report.score.normalized_probability, 50);
    }

    #[tokio::test]
    async fn test_report_counts_quota_used_by_tools() {
        let limiter = Arc::new(RateLimiter::new(10, Duration::from_secs(60)));
        // Admissions made before the run are not attributed to it.
        limiter.acquire().await;
        let spending = limiter.clone();
        let (registry, _) = standard_registry(move |name| match name {
            IMAGE_ANALYSIS => Behavior::Spend(spending.clone(), 2),
            TEXT_ANALYSIS => Behavior::Spend(spending.clone(), 1),
            _ => Behavior::Succeed(20),
        });
        let investigator =
            Investigator::new(registry, Vec::new()).with_rate_limiter(limiter.clone());

        let report = investigator
            .investigate(Target::new("https://example.com"))
            .await;

        assert_eq!(report.plan.estimated_cost, 2);
        assert_eq!(report.quota_used, Some(3));
        assert_eq!(limiter.total_admitted(), 4);
    }

    #[tokio::test]
    async fn test_quota_is_absent_without_limiter() {
        let (registry, _) = standard_registry(|_| Behavior::Succeed(20));
        let report = Investigator::new(registry, Vec::new())
            .investigate(Target::new("https://example.com"))
            .await;
        assert_eq!(report.quota_used, None);
    }

    fn abort_execution() {
        panic!("execution aborted");
    }

    #[tokio::test]
    async fn test_guarded_run_keeps_partial_results() {
        let mut execution = Execution::default();
        let completed = run_guarded(async {
            execution.record(ToolResult::success(REPUTATION_LOOKUP, 80, serde_json::json!({})));
            abort_execution();
        })
        .await;

        assert!(!completed);
        assert_eq!(execution.order, vec![REPUTATION_LOOKUP]);
        let score = aggregate(execution.ordered(), &ScoringWeights::default());
        assert_eq!(score.normalized_probability, 80);
        assert_eq!(classify(score.normalized_probability), RiskLevel::Extreme);
    }

    #[tokio::test]
    async fn test_guarded_run_reports_completion() {
        let mut execution = Execution::default();
        let completed = run_guarded(async {
            execution.record(ToolResult::success(DOMAIN_ANALYSIS, 5, serde_json::json!({})));
        })
        .await;
        assert!(completed);
        assert_eq!(execution.results.len(), 1);
    }

    #[test]
    fn test_phase_tracker_is_forward_only() {
        let mut tracker = PhaseTracker::new();
        tracker.advance(InvestigationPhase::Executing);
        tracker.advance(InvestigationPhase::Planned);
        assert_eq!(tracker.phase, InvestigationPhase::Executing);
    }
}

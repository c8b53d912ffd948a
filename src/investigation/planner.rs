//! Tool selection and ordering.
//!
//! The planner turns optional signals (plan advice, a caller restriction)
//! into an [`InvestigationPlan`] whose tools all have their dependencies
//! scheduled strictly earlier. Trigger rules force tools in regardless of
//! what the signals asked for. Any planning fault degrades to the default
//! plan: every registered tool in dependency order.

use crate::error::PlanningError;
use crate::models::{InvestigationPlan, PlanSource, Priority, Target, ToolDescriptor};
use crate::services::PlanAdvice;
use crate::tools::IMAGE_ANALYSIS;
use regex::{Regex, RegexBuilder};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Keywords that call for image analysis even when nothing else asked for it.
pub const DEEPFAKE_KEYWORDS: [&str; 9] = [
    "deepfake",
    "ai-generated",
    "synthetic",
    "face-swap",
    "fake-video",
    "artificial",
    "generated",
    "manipulated",
    "synthetic-media",
];

/// Forces `tool` into the plan when any keyword appears in the target.
#[derive(Debug, Clone)]
pub struct TriggerRule {
    pub tool: String,
    pub keywords: Vec<String>,
    /// None when no usable keyword was given; such a rule never fires.
    pattern: Option<Regex>,
}

impl TriggerRule {
    pub fn new(tool: &str, keywords: &[String]) -> Result<Self, regex::Error> {
        let alternation = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("|");
        let pattern = if alternation.is_empty() {
            None
        } else {
            Some(
                RegexBuilder::new(&alternation)
                    .case_insensitive(true)
                    .build()?,
            )
        };
        Ok(Self {
            tool: tool.to_string(),
            keywords: keywords.to_vec(),
            pattern,
        })
    }

    /// Deepfake vocabulary forcing image analysis.
    pub fn deepfake() -> Self {
        let keywords: Vec<String> = DEEPFAKE_KEYWORDS.iter().map(|k| k.to_string()).collect();
        Self::new(IMAGE_ANALYSIS, &keywords).expect("escaped literal keywords form a valid pattern")
    }

    /// Keywords found in `haystack`, deduplicated, in order of appearance.
    pub fn matches(&self, haystack: &str) -> Vec<String> {
        let Some(pattern) = &self.pattern else {
            return Vec::new();
        };
        let mut found: Vec<String> = Vec::new();
        for m in pattern.find_iter(haystack) {
            let keyword = m.as_str().to_lowercase();
            if !found.contains(&keyword) {
                found.push(keyword);
            }
        }
        found
    }
}

/// Signals the planner may use beyond the target itself.
#[derive(Debug, Clone, Default)]
pub struct PlanSignals {
    /// Only these tools (plus their dependencies and triggered tools).
    pub restrict: Option<Vec<String>>,
    /// Outcome of asking the plan advisor, when it was asked.
    pub advice: Option<Result<PlanAdvice, String>>,
}

impl PlanSignals {
    pub fn restricted(tools: Vec<String>) -> Self {
        Self {
            restrict: Some(tools),
            advice: None,
        }
    }
}

pub struct InvestigationPlanner {
    tools: Vec<ToolDescriptor>,
    triggers: Vec<TriggerRule>,
}

impl InvestigationPlanner {
    pub fn new(tools: Vec<ToolDescriptor>, triggers: Vec<TriggerRule>) -> Self {
        Self { tools, triggers }
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Build a plan, falling back to the default plan on any planning fault.
    pub fn plan(&self, target: &Target, signals: &PlanSignals) -> InvestigationPlan {
        match self.try_plan(target, signals) {
            Ok(plan) => {
                info!(
                    "📋 Plan ({:?}): {} [cost {}]",
                    plan.source,
                    plan.tools.join(" → "),
                    plan.estimated_cost
                );
                plan
            }
            Err(err) => {
                warn!("Planning failed, using fallback plan: {}", err);
                // A caller restriction outlives bad advice.
                let mut plan = match (&signals.advice, &signals.restrict) {
                    (Some(_), Some(restrict)) => self
                        .try_plan(target, &PlanSignals::restricted(restrict.clone()))
                        .unwrap_or_else(|_| self.default_plan(target)),
                    _ => self.default_plan(target),
                };
                plan.rationale = format!("{} (planning fault: {})", plan.rationale, err);
                plan
            }
        }
    }

    /// Every registered tool in dependency order, plus trigger effects.
    pub fn default_plan(&self, target: &Target) -> InvestigationPlan {
        let names: Vec<String> = self.tools.iter().map(|t| t.name.clone()).collect();
        let (priority, triggered) = self.fire_triggers(target, &mut names.clone());
        let tools = self.order_with_dependencies(&names).unwrap_or_else(|err| {
            warn!("Registered tools are not orderable ({}); using registration order", err);
            names
        });
        self.finish(
            tools,
            "Default comprehensive investigation plan".to_string(),
            priority.unwrap_or(Priority::Medium),
            PlanSource::Default,
            triggered,
        )
    }

    /// Build a plan, reporting faults instead of falling back.
    pub fn try_plan(
        &self,
        target: &Target,
        signals: &PlanSignals,
    ) -> Result<InvestigationPlan, PlanningError> {
        let (mut candidates, rationale, priority, source) = match &signals.advice {
            Some(Err(message)) => return Err(PlanningError::Advisor(message.clone())),
            Some(Ok(advice)) => {
                let mut tools = self.known(&advice.tools);
                if let Some(restrict) = &signals.restrict {
                    tools.retain(|t| restrict.contains(t));
                }
                (
                    tools,
                    advice.rationale.clone(),
                    advice.priority.unwrap_or(Priority::Medium),
                    PlanSource::Advisor,
                )
            }
            None => match &signals.restrict {
                Some(restrict) => (
                    self.known(restrict),
                    format!("Restricted to: {}", restrict.join(", ")),
                    Priority::Medium,
                    PlanSource::Restricted,
                ),
                None => return Ok(self.default_plan(target)),
            },
        };

        if candidates.is_empty() {
            return Err(PlanningError::NoValidTools);
        }

        let (trigger_priority, triggered) = self.fire_triggers(target, &mut candidates);
        let tools = self.order_with_dependencies(&candidates)?;
        Ok(self.finish(
            tools,
            rationale,
            trigger_priority.unwrap_or(priority),
            source,
            triggered,
        ))
    }

    /// Registered tools named in `names`, first occurrence only.
    fn known(&self, names: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let name = name.trim();
            if self.descriptor(name).is_none() {
                warn!("Ignoring unknown tool in plan signal: {}", name);
                continue;
            }
            if !out.iter().any(|n| n == name) {
                out.push(name.to_string());
            }
        }
        out
    }

    /// Apply trigger rules: force-include their tools, report which fired.
    fn fire_triggers(
        &self,
        target: &Target,
        candidates: &mut Vec<String>,
    ) -> (Option<Priority>, Vec<String>) {
        let haystack = target.searchable_text();
        let mut triggered = Vec::new();

        for rule in &self.triggers {
            if self.descriptor(&rule.tool).is_none() {
                continue;
            }
            let matched = rule.matches(&haystack);
            if matched.is_empty() {
                continue;
            }
            info!(
                "🎯 Trigger for {} fired on: {}",
                rule.tool,
                matched.join(", ")
            );
            if !candidates.contains(&rule.tool) {
                candidates.push(rule.tool.clone());
            }
            if !triggered.contains(&rule.tool) {
                triggered.push(rule.tool.clone());
            }
        }

        let priority = (!triggered.is_empty()).then_some(Priority::High);
        (priority, triggered)
    }

    /// Insert missing dependencies and order every tool after its
    /// dependencies, otherwise keeping candidate order.
    pub fn order_with_dependencies(
        &self,
        candidates: &[String],
    ) -> Result<Vec<String>, PlanningError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            planner: &InvestigationPlanner,
            name: &str,
            marks: &mut HashMap<String, Mark>,
            order: &mut Vec<String>,
        ) -> Result<(), PlanningError> {
            match marks.get(name) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    return Err(PlanningError::DependencyCycle(name.to_string()))
                }
                None => {}
            }
            let Some(descriptor) = planner.descriptor(name) else {
                // Unregistered dependency: the tool needing it gets skipped at run time.
                debug!("Dependency {} is not registered", name);
                return Ok(());
            };
            marks.insert(name.to_string(), Mark::Visiting);
            for dep in &descriptor.dependencies {
                visit(planner, dep, marks, order)?;
            }
            marks.insert(name.to_string(), Mark::Done);
            order.push(name.to_string());
            Ok(())
        }

        let mut marks = HashMap::new();
        let mut order = Vec::new();
        for name in candidates {
            visit(self, name, &mut marks, &mut order)?;
        }
        Ok(order)
    }

    fn finish(
        &self,
        tools: Vec<String>,
        rationale: String,
        priority: Priority,
        source: PlanSource,
        triggered: Vec<String>,
    ) -> InvestigationPlan {
        let estimated_cost = tools
            .iter()
            .filter_map(|t| self.descriptor(t))
            .map(|d| d.external_cost)
            .sum();
        InvestigationPlan {
            tools,
            rationale,
            priority,
            estimated_cost,
            source,
            triggered,
        }
    }

    fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }
}

/// True when every tool in `plan` comes after all of its registered dependencies.
pub fn is_dependency_ordered(plan: &[String], tools: &[ToolDescriptor]) -> bool {
    let mut seen: HashSet<&str> = HashSet::new();
    for name in plan {
        if let Some(descriptor) = tools.iter().find(|t| &t.name == name) {
            let registered_deps = descriptor
                .dependencies
                .iter()
                .filter(|d| tools.iter().any(|t| &t.name == *d));
            for dep in registered_deps {
                if !seen.contains(dep.as_str()) {
                    return false;
                }
            }
        }
        seen.insert(name.as_str());
    }
    true
}

//! Markdown and JSON report generation.
//!
//! This module renders an [`InvestigationReport`] for people (Markdown)
//! and for machines (JSON).

use crate::analysis::ScoringWeights;
use crate::models::{InvestigationPlan, InvestigationReport, ToolResult, ToolStatus};
use anyhow::Result;
use serde_json::Value;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &InvestigationReport, weights: &ScoringWeights) -> String {
    let mut output = String::new();

    output.push_str("# Scam Investigation Report\n\n");
    output.push_str(&generate_metadata_section(report));
    output.push_str(&generate_verdict_section(report));
    output.push_str(&generate_score_section(report, weights));
    output.push_str(&generate_plan_section(&report.plan, report.quota_used));
    output.push_str(&generate_tools_section(report));
    output.push_str(&generate_footer(report));

    output
}

fn generate_metadata_section(report: &InvestigationReport) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **URL:** {}\n", report.target.url));
    section.push_str(&format!(
        "- **Started:** {}\n",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        report.duration_seconds
    ));
    section.push_str(&format!(
        "- **Tools:** {} run, {} failed, {} skipped\n",
        report.count_by_status(ToolStatus::Success),
        report.count_by_status(ToolStatus::Error),
        report.count_by_status(ToolStatus::Skipped)
    ));
    section.push('\n');

    section
}

fn generate_verdict_section(report: &InvestigationReport) -> String {
    let mut section = String::new();

    section.push_str("## Verdict\n\n");
    section.push_str(&format!(
        "{} **{} risk** ({}% scam probability)\n\n",
        report.risk_level.emoji(),
        report.risk_level,
        report.score.normalized_probability
    ));
    section.push_str(&format!("> {}\n\n", report.recommendation));

    section
}

fn generate_score_section(report: &InvestigationReport, weights: &ScoringWeights) -> String {
    let mut section = String::new();

    section.push_str("## Score Breakdown\n\n");
    section.push_str("| Tool | Status | Confidence | Weight | Counted |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|\n");

    for result in report.ordered_results() {
        section.push_str(&format!(
            "| {} | {} {} | {} | {:.2} | {} |\n",
            result.tool_name,
            result.status.emoji(),
            result.status,
            result.confidence,
            weights.weight_for(&result.tool_name),
            if result.is_scored() { "yes" } else { "no" }
        ));
    }

    section.push_str(&format!(
        "\n**Weighted sum:** {:.2} of {:.2} possible\n\n",
        report.score.weighted_sum, report.score.max_possible_weighted_sum
    ));

    if !report.score.contributing_factors.is_empty() {
        section.push_str("**Contributing factors:** ");
        let factors: Vec<String> = report
            .score
            .contributing_factors
            .iter()
            .map(|f| format!("{} ({})", f.tool_name, f.confidence))
            .collect();
        section.push_str(&factors.join(", "));
        section.push_str("\n\n");
    }

    section
}

fn generate_plan_section(plan: &InvestigationPlan, quota_used: Option<u64>) -> String {
    let mut section = String::new();

    section.push_str("## Investigation Plan\n\n");
    section.push_str(&format!("- **Source:** {:?}\n", plan.source));
    section.push_str(&format!("- **Priority:** {}\n", plan.priority));
    match quota_used {
        Some(used) => section.push_str(&format!(
            "- **Quota:** {} used of {} estimated\n",
            used, plan.estimated_cost
        )),
        None => section.push_str(&format!("- **Estimated cost:** {}\n", plan.estimated_cost)),
    }
    section.push_str(&format!("- **Order:** {}\n", plan.tools.join(" → ")));
    if !plan.triggered.is_empty() {
        section.push_str(&format!(
            "- **Triggered:** {}\n",
            plan.triggered.join(", ")
        ));
    }
    if !plan.rationale.is_empty() {
        section.push_str(&format!("- **Rationale:** {}\n", plan.rationale));
    }
    section.push('\n');

    section
}

fn generate_tools_section(report: &InvestigationReport) -> String {
    let mut section = String::new();

    section.push_str("## Tool Results\n\n");
    for result in report.ordered_results() {
        section.push_str(&generate_tool_block(result));
    }

    section
}

/// Generate the block for a single tool result.
fn generate_tool_block(result: &ToolResult) -> String {
    let mut block = String::new();

    block.push_str(&format!(
        "### {} {}\n\n",
        result.status.emoji(),
        result.tool_name
    ));
    block.push_str(&format!(
        "*Status: {} | Confidence: {} | {} ms*\n\n",
        result.status, result.confidence, result.duration_ms
    ));

    if let Some(error) = &result.error {
        let label = match result.status {
            ToolStatus::Skipped => "Skipped",
            _ => "Error",
        };
        block.push_str(&format!("**{}:** {}\n\n", label, error));
    }

    for line in highlight_findings(&result.findings) {
        block.push_str(&format!("- {}\n", line));
    }

    if !result.findings.is_null() {
        if let Ok(pretty) = serde_json::to_string_pretty(&result.findings) {
            block.push_str("\n<details>\n<summary>Findings</summary>\n\n```json\n");
            block.push_str(&pretty);
            block.push_str("\n```\n</details>\n\n");
        }
    }

    if let Some(raw) = &result.diagnostics {
        block.push_str("<details>\n<summary>Raw upstream response</summary>\n\n```\n");
        block.push_str(raw);
        block.push_str("\n```\n</details>\n\n");
    }

    block.push_str("---\n\n");
    block
}

/// Human-readable bullet points pulled from well-known findings fields.
fn highlight_findings(findings: &Value) -> Vec<String> {
    let mut lines = Vec::new();

    let string_list = |key: &str| -> Vec<String> {
        findings
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };

    for threat in string_list("threats_found") {
        lines.push(format!("Threat: {}", threat));
    }
    for indicator in string_list("risk_indicators") {
        lines.push(indicator);
    }
    for element in string_list("suspicious_elements") {
        lines.push(element);
    }
    for flag in string_list("red_flags") {
        lines.push(format!("Red flag: {}", flag));
    }
    if let Some(images) = findings.get("suspicious_images").and_then(Value::as_array) {
        for image in images {
            if let Some(src) = image.get("src").and_then(Value::as_str) {
                lines.push(format!("Suspicious image: {}", src));
            }
        }
    }
    if let Some(assessment) = findings
        .get("overall_assessment")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        lines.push(format!("Assessment: {}", assessment));
    }

    lines
}

fn generate_footer(report: &InvestigationReport) -> String {
    format!(
        "*Report generated by scamprobe v{} at {}*\n",
        report.version,
        report.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Generate a JSON report.
pub fn generate_json_report(report: &InvestigationReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::models::{
        AggregatedScore, ContributingFactor, InvestigationPhase, RiskLevel, Target,
    };
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn create_test_report() -> InvestigationReport {
        let mut results = BTreeMap::new();
        results.insert(
            "reputation_lookup".to_string(),
            ToolResult::success(
                "reputation_lookup",
                80,
                json!({ "threats_found": ["SOCIAL_ENGINEERING"], "is_safe": false }),
            ),
        );
        results.insert(
            "text_analysis".to_string(),
            ToolResult::error(
                "text_analysis",
                &ToolError::malformed("model reply: expected value", "I think it's a scam"),
            ),
        );
        results.insert(
            "image_analysis".to_string(),
            ToolResult::skipped(
                "image_analysis",
                "dependency 'content_analysis' did not run".to_string(),
            ),
        );

        InvestigationReport {
            target: Target::new("https://paypa1-verify.example.com"),
            plan: InvestigationPlan::from_tools(&[
                "reputation_lookup",
                "text_analysis",
                "image_analysis",
            ]),
            results,
            execution_order: vec![
                "reputation_lookup".to_string(),
                "text_analysis".to_string(),
                "image_analysis".to_string(),
            ],
            score: AggregatedScore {
                weighted_sum: 28.0,
                max_possible_weighted_sum: 35.0,
                normalized_probability: 80,
                contributing_factors: vec![ContributingFactor {
                    tool_name: "reputation_lookup".to_string(),
                    confidence: 80,
                }],
            },
            risk_level: RiskLevel::Extreme,
            recommendation: RiskLevel::Extreme.recommendation().to_string(),
            phase: InvestigationPhase::Reported,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration_seconds: 1.5,
            quota_used: Some(3),
            version: "1.0.0".to_string(),
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report, &ScoringWeights::default());

        assert!(markdown.contains("# Scam Investigation Report"));
        assert!(markdown.contains("https://paypa1-verify.example.com"));
        assert!(markdown.contains("**Extreme risk** (80% scam probability)"));
        assert!(markdown.contains("| reputation_lookup | ✅ Success | 80 | 0.35 | yes |"));
        assert!(markdown.contains("Threat: SOCIAL_ENGINEERING"));
        assert!(markdown.contains("I think it's a scam"));
        assert!(markdown.contains("**Skipped:** dependency"));
        assert!(markdown.contains("1 run, 1 failed, 1 skipped"));
        assert!(markdown.contains("- **Quota:** 3 used of 0 estimated"));
    }

    #[test]
    fn test_plan_section_without_limiter() {
        let mut report = create_test_report();
        report.quota_used = None;
        let markdown = generate_markdown_report(&report, &ScoringWeights::default());
        assert!(markdown.contains("- **Estimated cost:** 0"));
        assert!(!markdown.contains("**Quota:**"));
    }

    #[test]
    fn test_tool_sections_follow_execution_order() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report, &ScoringWeights::default());
        let rep = markdown.find("### ✅ reputation_lookup").unwrap();
        let text = markdown.find("### ❌ text_analysis").unwrap();
        assert!(rep < text);
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["risk_level"], "extreme");
        assert_eq!(parsed["score"]["normalized_probability"], 80);
        assert_eq!(parsed["results"]["text_analysis"]["error_kind"], "malformed_response");
        assert_eq!(parsed["results"]["image_analysis"]["status"], "skipped");
        assert_eq!(parsed["quota_used"], 3);
        assert_eq!(parsed["plan"]["estimated_cost"], 0);
    }
}

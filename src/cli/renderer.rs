use colored::{control, ColoredString, Colorize};

use crate::core::formatter::{format_cost, format_counts, format_day, format_tokens};
use crate::core::models::cost::{CountBreakdown, DailyEntry, DailyReport};

/// Render a daily report as a colored (or plain) string.
///
/// Layout:
/// ```text
///  Codex (Feb 10 - Feb 20)
///   Total     $12.34 (1.2M in / 98.0K out)
///   Days:
///     Feb 13      $3.45    (250.0K in / 12.0K out)  gpt-5, gpt-5.2
/// ```
pub fn render_daily(
    report: &DailyReport,
    title: &str,
    since: &str,
    until: &str,
    show_detailed: bool,
    use_color: bool,
) -> String {
    control::set_override(use_color);

    let mut lines: Vec<String> = Vec::new();
    let header = format!(" {} ({} - {})", title, format_day(since), format_day(until));
    lines.push(header.bold().to_string());

    let Some(summary) = &report.summary else {
        lines.push(format!("  {}", "No usage in this range".dimmed()));
        return lines.join("\n");
    };

    lines.push(format!(
        "  {}     {} ({} in / {} out)",
        "Total".cyan(),
        color_cost(summary.total_cost_usd),
        format_tokens(summary.total_input_tokens),
        format_tokens(summary.total_output_tokens)
    ));
    if let Some(reasoning) = summary.total_reasoning_output_tokens {
        lines.push(format!("  {} {}", "Reasoning".cyan(), format_tokens(reasoning)));
    }

    lines.push(format!("  {}:", "Days".cyan()));
    for entry in &report.data {
        render_entry(&mut lines, entry, show_detailed);
    }

    lines.join("\n")
}

fn render_entry(lines: &mut Vec<String>, entry: &DailyEntry, show_detailed: bool) {
    lines.push(format!(
        "    {:<11} {:<8} ({} in / {} out)  {}",
        format_day(&entry.date),
        format_cost(entry.cost_usd),
        format_tokens(entry.input_tokens),
        format_tokens(entry.output_tokens),
        entry.models_used.join(", ").dimmed()
    ));
    if !show_detailed {
        return;
    }

    for model in entry.model_breakdowns.iter().flatten() {
        let written = model
            .cache_creation_tokens
            .map(|n| format!(" / {} written", format_tokens(n)))
            .unwrap_or_default();
        lines.push(format!(
            "      {:<22} {:<8} ({} in / {} cached{} / {} out)",
            model.model_name,
            format_cost(model.cost_usd),
            format_tokens(model.input_tokens),
            format_tokens(model.cache_read_tokens),
            written,
            format_tokens(model.output_tokens)
        ));
    }

    let context: [(&str, &Option<Vec<CountBreakdown>>); 5] = [
        ("Approval", &entry.approval_policy_breakdowns),
        ("Sandbox", &entry.sandbox_mode_breakdowns),
        ("Effort", &entry.effort_breakdowns),
        ("Risky", &entry.risky_skill_breakdowns),
        ("Forbidden", &entry.forbidden_skill_breakdowns),
    ];
    for (label, counts) in context {
        if let Some(counts) = counts {
            let text = format_counts(counts.iter().map(|c| (c.name.as_str(), c.count)));
            let padded = format!("{:<9}", label);
            lines.push(format!("      {} {}", padded.dimmed(), text));
        }
    }
}

fn color_cost(cost: Option<f64>) -> ColoredString {
    let text = format_cost(cost);
    match cost {
        Some(_) => text.green(),
        None => text.dimmed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::cost::{ModelBreakdown, ReportSummary};

    fn make_report() -> DailyReport {
        DailyReport {
            data: vec![DailyEntry {
                date: "2025-02-13".to_string(),
                input_tokens: 250_000,
                output_tokens: 12_000,
                total_tokens: 262_000,
                cost_usd: Some(3.45),
                models_used: vec!["gpt-4.1".to_string(), "gpt-4.1-mini".to_string()],
                model_breakdowns: Some(vec![ModelBreakdown {
                    model_name: "gpt-4.1".to_string(),
                    cost_usd: Some(3.45),
                    input_tokens: 250_000,
                    output_tokens: 12_000,
                    cache_read_tokens: 1_000,
                    cache_creation_tokens: None,
                    reasoning_output_tokens: 0,
                    total_tokens: 262_000,
                }]),
                reasoning_output_tokens: None,
                approval_policy_breakdowns: Some(vec![CountBreakdown {
                    name: "never".to_string(),
                    count: 3,
                }]),
                sandbox_mode_breakdowns: None,
                effort_breakdowns: None,
                risky_skill_breakdowns: None,
                forbidden_skill_breakdowns: None,
            }],
            summary: Some(ReportSummary {
                total_input_tokens: 250_000,
                total_output_tokens: 12_000,
                total_tokens: 262_000,
                total_cost_usd: Some(3.45),
                total_reasoning_output_tokens: Some(4_000),
            }),
        }
    }

    #[test]
    fn render_contains_totals_and_days() {
        let output = render_daily(&make_report(), "Codex", "2025-02-10", "2025-02-20", false, false);
        assert!(output.contains("Codex (Feb 10 - Feb 20)"));
        assert!(output.contains("$3.45 (250.0K in / 12.0K out)"));
        assert!(output.contains("Reasoning 4.0K"));
        assert!(output.contains("Feb 13"));
        assert!(output.contains("gpt-4.1, gpt-4.1-mini"));
        assert!(!output.contains("Approval"));
    }

    #[test]
    fn detailed_render_lists_models_and_context() {
        let output = render_daily(&make_report(), "Codex", "2025-02-10", "2025-02-20", true, false);
        assert!(output.contains("1.0K cached"));
        assert!(output.contains("Approval  never ×3"));
    }

    #[test]
    fn detailed_render_shows_cache_writes_when_present() {
        let mut report = make_report();
        if let Some(models) = report.data[0].model_breakdowns.as_mut() {
            models[0].model_name = "claude-opus-4-5".to_string();
            models[0].cache_creation_tokens = Some(2_000);
        }
        let output = render_daily(&report, "Claude", "2025-02-10", "2025-02-20", true, false);
        assert!(output.contains("Claude (Feb 10 - Feb 20)"));
        assert!(output.contains("1.0K cached / 2.0K written / 12.0K out"));
    }

    #[test]
    fn render_empty_report() {
        let output = render_daily(&DailyReport::default(), "Codex", "2025-02-10", "2025-02-20", true, false);
        assert!(output.contains("No usage in this range"));
    }

    #[test]
    fn render_no_ansi_when_color_false() {
        let output = render_daily(&make_report(), "Codex", "2025-02-10", "2025-02-20", true, false);
        assert!(!output.contains('\x1b'), "output should not contain ANSI codes");
    }
}

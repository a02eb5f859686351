use crate::core::cost::cache::{CountMap, ScanCache, TokenCounts};
use crate::core::cost::day::DayRange;
use crate::core::models::cost::{
    CountBreakdown, DailyEntry, DailyReport, ModelBreakdown, ReportSummary,
};

/// Project the cache onto `[range.since, range.until]`. `pricing` maps a
/// model's day counters to USD, or None when unpriced. Token sums saturate.
pub fn build_report<P>(cache: &ScanCache, range: &DayRange, pricing: P) -> DailyReport
where
    P: Fn(&str, &TokenCounts) -> Option<f64>,
{
    let mut data = Vec::new();
    let mut total_input = 0u64;
    let mut total_output = 0u64;
    let mut total_tokens = 0u64;
    let mut total_reasoning = 0u64;
    let mut total_cost = 0.0;
    let mut cost_seen = false;

    for (day, models) in cache.days.iter().filter(|(day, _)| range.contains(day)) {
        let mut day_input = 0u64;
        let mut day_output = 0u64;
        let mut day_reasoning = 0u64;
        let mut day_cost = 0.0;
        let mut day_cost_seen = false;
        let mut breakdowns = Vec::with_capacity(models.len());

        for (model, counts) in models {
            day_input = day_input.saturating_add(counts.input);
            day_output = day_output.saturating_add(counts.output);
            day_reasoning = day_reasoning.saturating_add(counts.reasoning_output);

            let cost = pricing(model.as_str(), counts);
            if let Some(c) = cost {
                day_cost += c;
                day_cost_seen = true;
            }
            breakdowns.push(ModelBreakdown {
                model_name: model.to_string(),
                cost_usd: cost,
                input_tokens: counts.input,
                output_tokens: counts.output,
                cache_read_tokens: counts.cached_input,
                cache_creation_tokens: (counts.cache_creation > 0).then_some(counts.cache_creation),
                reasoning_output_tokens: counts.reasoning_output,
                total_tokens: counts.input.saturating_add(counts.output),
            });
        }

        // Highest cost first, unpriced last; ties keep model order.
        breakdowns.sort_by(|a, b| {
            b.cost_usd
                .unwrap_or(-1.0)
                .total_cmp(&a.cost_usd.unwrap_or(-1.0))
        });

        let entry_cost = day_cost_seen.then_some(day_cost);
        let context = cache.context_days.get(day);
        data.push(DailyEntry {
            date: day.to_string(),
            input_tokens: day_input,
            output_tokens: day_output,
            total_tokens: day_input.saturating_add(day_output),
            cost_usd: entry_cost,
            models_used: models.keys().map(|m| m.to_string()).collect(),
            model_breakdowns: (!breakdowns.is_empty()).then_some(breakdowns),
            reasoning_output_tokens: (day_reasoning > 0).then_some(day_reasoning),
            approval_policy_breakdowns: context.and_then(|c| count_breakdowns(&c.approval_policies)),
            sandbox_mode_breakdowns: context.and_then(|c| count_breakdowns(&c.sandbox_modes)),
            effort_breakdowns: context.and_then(|c| count_breakdowns(&c.effort_levels)),
            risky_skill_breakdowns: context.and_then(|c| count_breakdowns(&c.risky_skills)),
            forbidden_skill_breakdowns: context.and_then(|c| count_breakdowns(&c.forbidden_skills)),
        });

        total_input = total_input.saturating_add(day_input);
        total_output = total_output.saturating_add(day_output);
        total_tokens = total_tokens.saturating_add(day_input.saturating_add(day_output));
        total_reasoning = total_reasoning.saturating_add(day_reasoning);
        if let Some(c) = entry_cost {
            total_cost += c;
            cost_seen = true;
        }
    }

    let summary = (!data.is_empty()).then(|| ReportSummary {
        total_input_tokens: total_input,
        total_output_tokens: total_output,
        total_tokens,
        total_cost_usd: cost_seen.then_some(total_cost),
        total_reasoning_output_tokens: (total_reasoning > 0).then_some(total_reasoning),
    });

    DailyReport { data, summary }
}

/// Positive counts, most frequent first, ties by name.
fn count_breakdowns(map: &CountMap) -> Option<Vec<CountBreakdown>> {
    let mut values: Vec<CountBreakdown> = map
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(name, count)| CountBreakdown {
            name: name.to_string(),
            count: *count,
        })
        .collect();
    values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    (!values.is_empty()).then_some(values)
}

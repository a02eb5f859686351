use serde::Serialize;

/// Daily token usage and cost for a date range, newest data last.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyReport {
    pub data: Vec<DailyEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ReportSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyEntry {
    pub date: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    /// Unknown unless at least one model on this day has a price.
    #[serde(rename = "costUSD", skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    pub models_used: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_breakdowns: Option<Vec<ModelBreakdown>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_policy_breakdowns: Option<Vec<CountBreakdown>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_mode_breakdowns: Option<Vec<CountBreakdown>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort_breakdowns: Option<Vec<CountBreakdown>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risky_skill_breakdowns: Option<Vec<CountBreakdown>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forbidden_skill_breakdowns: Option<Vec<CountBreakdown>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelBreakdown {
    pub model_name: String,
    #[serde(rename = "costUSD", skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_creation_tokens: Option<u64>,
    pub reasoning_output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountBreakdown {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
    #[serde(rename = "totalCostUSD", skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_reasoning_output_tokens: Option<u64>,
}

use chrono::NaiveDate;

/// Returns "1.2M", "3.4K" or the plain count below a thousand.
pub fn format_tokens(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        format!("{}", count)
    }
}

/// Returns "$12.34", or "n/a" when the cost is unknown.
pub fn format_cost(cost: Option<f64>) -> String {
    match cost {
        Some(c) => format!("${:.2}", c),
        None => "n/a".to_string(),
    }
}

/// Returns "Feb 13" for "2025-02-13"; anything unparseable is returned as is.
pub fn format_day(day: &str) -> String {
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map(|d| d.format("%b %d").to_string())
        .unwrap_or_else(|_| day.to_string())
}

/// Returns "name ×count" pairs joined by ", ".
pub fn format_counts<'a, I>(counts: I) -> String
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    counts
        .into_iter()
        .map(|(name, count)| format!("{} ×{}", name, count))
        .collect::<Vec<_>>()
        .join(", ")
}
